//! Loop detection over the trailing text of a stream.

use std::collections::{HashSet, VecDeque};

pub const DEFAULT_WINDOW: usize = 200;
pub const DEFAULT_NGRAM: usize = 16;

/// Tracks the last `window` characters of emitted text and reports how
/// repetitive they are.
///
/// The ratio is `(n - distinct) / n` over all character n-grams of the
/// window: 0.0 for text with no repeated n-gram, approaching 1.0 when a
/// short phrase loops.
#[derive(Debug, Clone)]
pub struct RepetitionDetector {
    window: usize,
    ngram: usize,
    tail: VecDeque<char>,
}

impl RepetitionDetector {
    /// `ngram` is clamped to `1..=window`.
    pub fn new(window: usize, ngram: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            ngram: ngram.clamp(1, window),
            tail: VecDeque::with_capacity(window),
        }
    }

    pub fn push_str(&mut self, text: &str) {
        for c in text.chars() {
            if self.tail.len() == self.window {
                self.tail.pop_front();
            }
            self.tail.push_back(c);
        }
    }

    pub fn is_full(&self) -> bool {
        self.tail.len() == self.window
    }

    /// `None` until the window has filled.
    pub fn ratio(&self) -> Option<f64> {
        if !self.is_full() {
            return None;
        }
        let chars: Vec<char> = self.tail.iter().copied().collect();
        let total = chars.len() - self.ngram + 1;
        let distinct: HashSet<&[char]> = chars.windows(self.ngram).collect();
        Some((total - distinct.len()) as f64 / total as f64)
    }
}

impl Default for RepetitionDetector {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_NGRAM)
    }
}
