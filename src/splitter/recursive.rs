//! Recursive, boundary-aware text chunking.
//!
//! The splitter walks a separator hierarchy from coarse (paragraph breaks) to
//! fine (individual characters), always cutting at the highest-priority
//! boundary actually present in the text. Fenced code blocks are swapped for
//! placeholders before splitting so a block is never cut mid-fence.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;
use unicode_segmentation::UnicodeSegmentation;

use super::{Splitter, SplitterError};

/// Default separator hierarchy, highest priority first.
///
/// Paragraph > line > sentence terminators (CJK then Latin) > clause
/// punctuation > whitespace > character. The trailing empty string is the
/// character-level last resort and is always reachable.
pub const DEFAULT_SEPARATORS: &[&str] = &[
    "\n\n", "\n", "。", "！", "？", ".", "!", "?", ";", ",", " ", "",
];

/// Soft ceiling multiplier applied when stitching overlap onto a chunk.
const OVERLAP_CEILING: f64 = 1.2;

static CODE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```.*?```").unwrap_or_else(|err| panic!("code block regex: {err}"))
});

/// Recursive text splitter with overlap stitching and code-fence protection.
///
/// Construct through [`builder`](Self::builder):
///
/// ```rust
/// use ragsift::splitter::{RecursiveSplitter, Splitter};
///
/// let splitter = RecursiveSplitter::builder()
///     .chunk_size(200)
///     .chunk_overlap(20)
///     .build()
///     .unwrap();
/// let chunks = splitter.split_text("One paragraph.\n\nAnother paragraph.").unwrap();
/// assert!(!chunks.is_empty());
/// ```
///
/// Sizes count grapheme clusters, not bytes, so CJK text and combining
/// sequences are never cut inside a character.
#[derive(Clone, Debug)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
    keep_separator: bool,
}

impl RecursiveSplitter {
    /// Creates a builder with default configuration.
    pub fn builder() -> RecursiveSplitterBuilder {
        RecursiveSplitterBuilder::default()
    }

    /// Target chunk size in characters.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Overlap between adjacent chunks in characters.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// The separator hierarchy in effect, highest priority first.
    pub fn separators(&self) -> &[String] {
        &self.separators
    }

    /// Replaces every fenced code block with a placeholder, returning the
    /// rewritten text and the extracted blocks in order.
    fn protect_code_blocks(&self, text: &str) -> (String, Vec<String>) {
        let mut blocks = Vec::new();
        let mut rewritten = String::with_capacity(text.len());
        let mut cursor = 0usize;

        for m in CODE_BLOCK.find_iter(text) {
            rewritten.push_str(&text[cursor..m.start()]);
            rewritten.push_str(&placeholder(blocks.len()));
            blocks.push(m.as_str().to_string());
            cursor = m.end();
        }
        rewritten.push_str(&text[cursor..]);

        (rewritten, blocks)
    }

    /// Splits `text` on `separator`, re-appending the separator to every
    /// fragment but the last when `keep_separator` is set so concatenation
    /// reproduces the source.
    fn split_with_separator(&self, text: &str, separator: &str) -> Vec<String> {
        if separator.is_empty() {
            return text.graphemes(true).map(str::to_string).collect();
        }

        let fragments: Vec<&str> = text.split(separator).collect();
        if !self.keep_separator {
            return fragments.into_iter().map(str::to_string).collect();
        }

        let last = fragments.len().saturating_sub(1);
        fragments
            .into_iter()
            .enumerate()
            .map(|(i, fragment)| {
                if i < last {
                    format!("{fragment}{separator}")
                } else {
                    fragment.to_string()
                }
            })
            .collect()
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        // Find the first tier that actually occurs; the empty string always
        // "occurs" and means character-level splitting.
        let mut separator: &str = separators.last().map(String::as_str).unwrap_or("");
        let mut remaining: &[String] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = "";
                remaining = &[];
                break;
            }
            if text.contains(sep.as_str()) {
                separator = sep;
                remaining = &separators[i + 1..];
                break;
            }
        }
        debug!(tier = ?separator, input_chars = char_len(text), "splitting at tier");

        let fragments = self.split_with_separator(text, separator);

        // Greedy coalescing: accumulate fragments until the next one would
        // overflow chunk_size.
        let mut chunks: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut current_len = 0usize;

        for fragment in fragments {
            let fragment_len = char_len(&fragment);

            if current_len + fragment_len <= self.chunk_size {
                current.push_str(&fragment);
                current_len += fragment_len;
                continue;
            }

            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }

            if fragment_len > self.chunk_size {
                if remaining.is_empty() {
                    // No finer tier left: hard-slice at chunk_size boundaries.
                    chunks.extend(hard_slice(&fragment, self.chunk_size));
                } else {
                    chunks.extend(self.split_recursive(&fragment, remaining));
                }
            } else {
                current.push_str(&fragment);
                current_len = fragment_len;
            }
        }
        if !current.is_empty() {
            chunks.push(current);
        }

        if self.chunk_overlap > 0 && chunks.len() > 1 {
            self.add_overlap(chunks)
        } else {
            chunks
        }
    }

    /// Stitches overlap onto adjacent chunks.
    ///
    /// The first chunk gains a trailing slice of its successor, the last a
    /// leading slice of its predecessor, interior chunks both. Each addition
    /// is skipped when it would push the chunk past `chunk_size * 1.2`.
    fn add_overlap(&self, chunks: Vec<String>) -> Vec<String> {
        let ceiling = self.chunk_size as f64 * OVERLAP_CEILING;
        let within = |len: usize| (len as f64) <= ceiling;
        let last = chunks.len() - 1;

        chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| {
                let chunk_len = char_len(chunk);

                if i == 0 {
                    let next = prefix(&chunks[i + 1], self.chunk_overlap);
                    if within(chunk_len + char_len(next)) {
                        return format!("{chunk}{next}");
                    }
                    return chunk.clone();
                }

                if i == last {
                    let prev = suffix(&chunks[i - 1], self.chunk_overlap);
                    if within(char_len(prev) + chunk_len) {
                        return format!("{prev}{chunk}");
                    }
                    return chunk.clone();
                }

                let prev = suffix(&chunks[i - 1], self.chunk_overlap);
                let mut stitched = if within(char_len(prev) + chunk_len) {
                    format!("{prev}{chunk}")
                } else {
                    chunk.clone()
                };
                let next = prefix(&chunks[i + 1], self.chunk_overlap);
                if within(char_len(&stitched) + char_len(next)) {
                    stitched.push_str(next);
                }
                stitched
            })
            .collect()
    }
}

impl Splitter for RecursiveSplitter {
    fn split_text(&self, text: &str) -> Result<Vec<String>, SplitterError> {
        if text.is_empty() {
            return Err(SplitterError::EmptyInput);
        }

        let (protected, blocks) = self.protect_code_blocks(text);

        let chunks = self.split_recursive(&protected, &self.separators);

        // Restore fenced blocks, then prune chunks that end up blank.
        let restored: Vec<String> = chunks
            .into_iter()
            .map(|chunk| {
                let mut restored = chunk;
                for (i, block) in blocks.iter().enumerate() {
                    if restored.contains(&placeholder(i)) {
                        restored = restored.replace(&placeholder(i), block);
                    }
                }
                restored
            })
            .filter(|chunk| !chunk.trim().is_empty())
            .collect();

        debug!(
            chunks = restored.len(),
            code_blocks = blocks.len(),
            "split complete"
        );
        Ok(restored)
    }
}

/// Builder for [`RecursiveSplitter`].
#[derive(Clone, Debug)]
pub struct RecursiveSplitterBuilder {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Option<Vec<String>>,
    keep_separator: bool,
}

impl Default for RecursiveSplitterBuilder {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            separators: None,
            keep_separator: true,
        }
    }
}

impl RecursiveSplitterBuilder {
    /// Target chunk size in characters. Defaults to 1000.
    #[must_use]
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Overlap between adjacent chunks in characters. Defaults to 200.
    #[must_use]
    pub fn chunk_overlap(mut self, chunk_overlap: usize) -> Self {
        self.chunk_overlap = chunk_overlap;
        self
    }

    /// Custom separator hierarchy, highest priority first.
    ///
    /// The character-level tier (empty string) is appended automatically when
    /// missing so splitting can always terminate.
    #[must_use]
    pub fn separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.separators = Some(separators.into_iter().map(Into::into).collect());
        self
    }

    /// Whether fragments keep their trailing separator. Defaults to true.
    #[must_use]
    pub fn keep_separator(mut self, keep: bool) -> Self {
        self.keep_separator = keep;
        self
    }

    /// Validates the configuration and builds the splitter.
    pub fn build(self) -> Result<RecursiveSplitter, SplitterError> {
        if self.chunk_size == 0 {
            return Err(SplitterError::InvalidConfig(
                "chunk_size must be positive".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(SplitterError::InvalidConfig(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }

        let mut separators = self
            .separators
            .unwrap_or_else(|| DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect());
        if separators.last().is_none_or(|sep| !sep.is_empty()) {
            separators.push(String::new());
        }

        Ok(RecursiveSplitter {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            separators,
            keep_separator: self.keep_separator,
        })
    }
}

fn placeholder(index: usize) -> String {
    format!("__CODE_BLOCK_{index}__")
}

/// Number of grapheme clusters in `s`.
fn char_len(s: &str) -> usize {
    s.graphemes(true).count()
}

/// First `n` grapheme clusters of `s`.
fn prefix(s: &str, n: usize) -> &str {
    match s.grapheme_indices(true).nth(n) {
        Some((byte, _)) => &s[..byte],
        None => s,
    }
}

/// Last `n` grapheme clusters of `s`.
fn suffix(s: &str, n: usize) -> &str {
    let total = char_len(s);
    if n >= total {
        return s;
    }
    match s.grapheme_indices(true).nth(total - n) {
        Some((byte, _)) => &s[byte..],
        None => s,
    }
}

/// Slices `s` into pieces of exactly `n` grapheme clusters; the final piece
/// may be shorter.
fn hard_slice(s: &str, n: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut count = 0usize;

    for grapheme in s.graphemes(true) {
        current.push_str(grapheme);
        count += 1;
        if count == n {
            pieces.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}
