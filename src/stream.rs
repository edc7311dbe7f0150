//! Incremental decoding of streamed reply bodies.
//!
//! The backend streams the assistant's reply as raw UTF-8 text.  Chunk
//! boundaries fall wherever the network puts them, including in the middle of
//! a multi-byte character, so decoding carries incomplete sequences from one
//! chunk to the next.

use std::time::Instant;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use crate::error::Result;
use crate::observability::{STREAM_BYTES, STREAM_CHUNKS, STREAM_DURATION, STREAM_ERRORS};

const REPLACEMENT: char = '\u{FFFD}';

/// A streaming UTF-8 decoder.
///
/// Bytes that end in an incomplete sequence are held back until the next call
/// to [`decode`](Self::decode).  Invalid sequences decode to U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next chunk, returning every complete character it finishes.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    // valid_up_to guarantees the prefix is well formed.
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match err.error_len() {
                        Some(len) => {
                            out.push(REPLACEMENT);
                            self.pending.drain(..valid + len);
                        }
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush the decoder at end of stream.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            REPLACEMENT.to_string()
        }
    }

    /// Returns true if bytes are held back waiting for the rest of a character.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// One decoded piece of a streamed reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Text decoded from this chunk.
    pub delta: String,
    /// All text decoded so far, including `delta`.
    pub accumulated: String,
}

/// Turn a byte stream into a stream of decoded text chunks.
///
/// Chunks that decode to nothing (a lone fragment of a character) produce no
/// item.  Errors from the byte stream pass through unchanged.
pub fn decode_text_stream<S>(byte_stream: S) -> impl Stream<Item = Result<TextChunk>>
where
    S: Stream<Item = Result<Bytes>> + Unpin,
{
    let state = (byte_stream, Utf8ChunkDecoder::new(), String::new(), false);
    stream::unfold(
        state,
        |(mut stream, mut decoder, mut accumulated, mut done)| async move {
            loop {
                if done {
                    return None;
                }
                let delta = match stream.next().await {
                    Some(Ok(bytes)) => {
                        STREAM_BYTES.count(bytes.len() as u64);
                        decoder.decode(&bytes)
                    }
                    Some(Err(err)) => {
                        done = true;
                        return Some((Err(err), (stream, decoder, accumulated, done)));
                    }
                    None => {
                        done = true;
                        decoder.finish()
                    }
                };
                if delta.is_empty() {
                    continue;
                }
                accumulated.push_str(&delta);
                let chunk = TextChunk {
                    delta,
                    accumulated: accumulated.clone(),
                };
                return Some((Ok(chunk), (stream, decoder, accumulated, done)));
            }
        },
    )
}

/// Drain a reply stream, invoking `on_chunk(delta, accumulated)` once per
/// decoded chunk in arrival order, and return the full text.
///
/// The next chunk is not read until `on_chunk` returns.
pub async fn collect_text<S>(
    byte_stream: S,
    mut on_chunk: Option<&mut dyn FnMut(&str, &str)>,
) -> Result<String>
where
    S: Stream<Item = Result<Bytes>> + Unpin,
{
    let started = Instant::now();
    let chunks = decode_text_stream(byte_stream);
    futures::pin_mut!(chunks);
    let mut full = String::new();
    while let Some(chunk) = chunks.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                STREAM_ERRORS.click();
                tracing::warn!(error = %err, received = full.len(), "reply stream failed");
                return Err(err);
            }
        };
        STREAM_CHUNKS.click();
        if let Some(handler) = on_chunk.as_mut() {
            handler(&chunk.delta, &chunk.accumulated);
        }
        full = chunk.accumulated;
    }
    STREAM_DURATION.add(started.elapsed().as_secs_f64());
    Ok(full)
}
