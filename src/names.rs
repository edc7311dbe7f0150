//! Playful default names for new sessions.

use rand::Rng;
use rand::seq::SliceRandom;

const ADJECTIVES: &[&str] = &[
    "Giggling", "Dancing", "Sleepy", "Bouncing", "Sneaky", "Fluffy", "Grumpy", "Sparkly",
    "Wobbly", "Dizzy", "Cheerful", "Mysterious", "Quirky", "Zany", "Bubbly", "Jolly",
    "Peppy", "Zippy", "Funky", "Goofy", "Cheeky", "Frisky", "Merry", "Whimsical",
    "Radiant", "Twinkling", "Glowing", "Dazzling", "Luminous", "Gleeful", "Jovial",
];

const NOUNS: &[&str] = &[
    "Penguin", "Taco", "Dragon", "Unicorn", "Robot", "Ninja", "Wizard", "Pickle",
    "Donut", "Llama", "Panda", "Koala", "Sloth", "Narwhal", "Platypus", "Axolotl",
    "Hedgehog", "Otter", "Quokka", "Pangolin", "Meerkat", "Gecko", "Octopus", "Seahorse",
    "Mushroom", "Cactus", "Waffle", "Pretzel", "Dumpling", "Comet", "Nebula", "Quasar",
];

/// Attempts at a unique name before falling back to a numbered one.
pub const MAX_ATTEMPTS: usize = 10;

/// Pick an "Adjective Noun" name not already in `existing` (case-insensitive).
///
/// After [`MAX_ATTEMPTS`] collisions the name is `Session N`, where `N` is one
/// more than the number of existing sessions.
pub fn generate_session_name<S: AsRef<str>>(existing: &[S]) -> String {
    generate_session_name_with(&mut rand::thread_rng(), existing)
}

/// [`generate_session_name`] with a caller-supplied random source.
pub fn generate_session_name_with<R: Rng + ?Sized, S: AsRef<str>>(
    rng: &mut R,
    existing: &[S],
) -> String {
    let taken: Vec<String> = existing.iter().map(|n| n.as_ref().to_lowercase()).collect();
    for _ in 0..MAX_ATTEMPTS {
        let (Some(adjective), Some(noun)) = (ADJECTIVES.choose(rng), NOUNS.choose(rng)) else {
            break;
        };
        let name = format!("{adjective} {noun}");
        if !taken.contains(&name.to_lowercase()) {
            return name;
        }
    }
    format!("Session {}", existing.len() + 1)
}
