//! Character-window text splitter used at ingestion time.

use crate::core::config::RetrievalConfig;

/// Break candidates, strongest first.
const SEPARATORS: [&str; 6] = ["\n\n", "\n", ". ", "! ", "? ", " "];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Overlapping chunks of at most `chunk_size` characters, cut at the
    /// strongest separator found in the back half of each window.
    pub fn split(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < total {
            let window_end = (start + self.chunk_size).min(total);
            let cut = if window_end < total {
                find_break(&chars[start..window_end])
                    .map(|offset| start + offset)
                    .unwrap_or(window_end)
            } else {
                window_end
            };

            let chunk: String = chars[start..cut].iter().collect();
            let chunk = chunk.trim();
            if !chunk.is_empty() {
                chunks.push(chunk.to_string());
            }

            if cut >= total {
                break;
            }

            let next = cut.saturating_sub(self.chunk_overlap);
            start = if next > start { next } else { cut };
        }

        chunks
    }
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default())
    }
}

/// End offset (exclusive, separator included) of the best break in `window`.
fn find_break(window: &[char]) -> Option<usize> {
    let min_end = window.len() / 2;

    for separator in SEPARATORS {
        let sep: Vec<char> = separator.chars().collect();
        if sep.len() > window.len() {
            continue;
        }
        let found = (min_end..=window.len() - sep.len())
            .rev()
            .find(|&i| window[i..i + sep.len()] == sep[..]);
        if let Some(i) = found {
            return Some(i + sep.len());
        }
    }

    None
}
