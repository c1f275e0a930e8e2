//! Cumulative output capture for a running script
//!
//! Bytes arrive from the merged stdout/stderr pipe in arbitrary chunks.
//! [`Utf8Accumulator`] decodes them incrementally, holding back a multi-byte
//! sequence split across two reads until the rest of it arrives.
//!
//! [`SharedOutput`] is the buffer shared between the reader thread and the
//! wait thread. Emission happens while its lock is held, so every progress
//! event is ordered before the terminal event and nothing is emitted after it.

use parking_lot::Mutex;
use std::sync::Arc;

/// Incremental UTF-8 decoder with a growing transcript
#[derive(Debug, Default, Clone)]
pub struct Utf8Accumulator {
    text: String,
    /// Incomplete trailing sequence from the last chunk
    pending: Vec<u8>,
}

impl Utf8Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `bytes` onto the transcript. Invalid sequences become U+FFFD.
    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);

        let mut consumed = 0;
        while consumed < self.pending.len() {
            match std::str::from_utf8(&self.pending[consumed..]) {
                Ok(valid) => {
                    self.text.push_str(valid);
                    consumed = self.pending.len();
                }
                Err(e) => {
                    let valid_end = consumed + e.valid_up_to();
                    self.text
                        .push_str(&String::from_utf8_lossy(&self.pending[consumed..valid_end]));
                    consumed = valid_end;
                    match e.error_len() {
                        Some(bad) => {
                            self.text.push(char::REPLACEMENT_CHARACTER);
                            consumed += bad;
                        }
                        // Truncated sequence at the end: wait for the next chunk
                        None => break,
                    }
                }
            }
        }

        self.pending.drain(..consumed);
    }

    /// Flush any dangling partial sequence (end of stream)
    pub fn finish(&mut self) {
        if !self.pending.is_empty() {
            self.text.push_str(&String::from_utf8_lossy(&self.pending));
            self.pending.clear();
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.pending.is_empty()
    }
}

#[derive(Debug, Default)]
struct CaptureState {
    decoder: Utf8Accumulator,
    finished: bool,
}

/// Transcript shared by the reader and wait threads of one execution
#[derive(Debug, Clone, Default)]
pub(crate) struct SharedOutput {
    state: Arc<Mutex<CaptureState>>,
}

impl SharedOutput {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and hand the full transcript to `emit`.
    ///
    /// Returns false once the run has been finished; the chunk is dropped.
    pub(crate) fn append_and_emit(&self, chunk: &[u8], emit: impl FnOnce(&str)) -> bool {
        let mut state = self.state.lock();
        if state.finished {
            return false;
        }
        state.decoder.push(chunk);
        emit(state.decoder.as_str());
        true
    }

    /// Seal the transcript and pass it to `emit` exactly once.
    ///
    /// Later calls (and later appends) do nothing.
    pub(crate) fn finish_and_emit(&self, emit: impl FnOnce(String)) -> bool {
        let mut state = self.state.lock();
        if state.finished {
            return false;
        }
        state.finished = true;
        state.decoder.finish();
        emit(state.decoder.as_str().to_string());
        true
    }

    #[cfg(test)]
    pub(crate) fn snapshot(&self) -> String {
        self.state.lock().decoder.as_str().to_string()
    }
}
