use std::sync::{Arc, Mutex, MutexGuard};

/// A shared, mutable HTML fragment.
///
/// This is the container a rendered message lives in.  Clones share the same
/// buffer, so a renderer can hold onto one while the diagram worker rewrites
/// containers inside it.
#[derive(Debug, Clone, Default)]
pub struct Fragment {
    html: Arc<Mutex<String>>,
}

impl Fragment {
    /// Create a fragment holding `html`.
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            html: Arc::new(Mutex::new(html.into())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, String> {
        // A panic while holding the lock leaves a complete string behind.
        self.html.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A copy of the current HTML.
    pub fn html(&self) -> String {
        self.lock().clone()
    }

    /// Replace the whole fragment.
    pub fn set_html(&self, html: impl Into<String>) {
        *self.lock() = html.into();
    }

    /// Append markup at the end.
    pub fn append_html(&self, html: &str) {
        self.lock().push_str(html);
    }

    /// Run `f` with exclusive access to the HTML.
    pub fn update<R>(&self, f: impl FnOnce(&mut String) -> R) -> R {
        f(&mut self.lock())
    }

    /// Returns true if both handles point at the same buffer.
    pub fn same_as(&self, other: &Fragment) -> bool {
        Arc::ptr_eq(&self.html, &other.html)
    }
}

impl From<String> for Fragment {
    fn from(html: String) -> Self {
        Self::new(html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_contents() {
        let a = Fragment::new("<p>a</p>");
        let b = a.clone();
        b.append_html("<p>b</p>");
        assert_eq!(a.html(), "<p>a</p><p>b</p>");
        assert!(a.same_as(&b));
        assert!(!a.same_as(&Fragment::new("")));
        let len = a.update(|html| {
            html.clear();
            html.len()
        });
        assert_eq!(len, 0);
        assert_eq!(b.html(), "");
    }
}
