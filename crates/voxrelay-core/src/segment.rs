//! Long-text segmentation into provider-sized chunks.
//!
//! Text is tokenized into characters and atomic pause markers, each with a
//! unit cost (see [`crate::text_prep::unit_length`]). Chunks are cut where the
//! running cost would exceed the budget, pulled back to the best punctuation
//! boundary within [`LOOKBACK_UNITS`].
//!
//! Chunks are exact slices of the input. Concatenating them reproduces it,
//! minus any whitespace-only stretch that would have formed a chunk by itself.

use serde::Serialize;

use crate::text_prep::{char_units, pause_markers};

/// How far back from the overflow point to look for a natural boundary.
pub const LOOKBACK_UNITS: usize = 300;

/// Boundary classes, highest priority first.
const BOUNDARY_CLASSES: &[&[char]] = &[
    &['\n', '\r'],
    &['。', '！', '？', '.', '!', '?'],
    &['；', ';'],
    &['，', '：', ',', ':'],
    &['、', '…', '―', '─', '-', '—', '–'],
    &[' ', '\t', '\u{3000}'],
];

/// A slice of the input submitted as one synthesis request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextChunk {
    pub index: usize,
    pub text: String,
}

impl TextChunk {
    /// Budget cost of this chunk.
    pub fn units(&self) -> usize {
        crate::text_prep::unit_length(&self.text)
    }
}

#[derive(Debug, Clone, Copy)]
struct Token {
    start: usize,
    end: usize,
    units: usize,
    /// `None` for pause markers, which never act as boundaries.
    ch: Option<char>,
}

fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::with_capacity(text.len());
    let mut cursor = 0;

    let push_chars = |tokens: &mut Vec<Token>, from: usize, to: usize| {
        for (offset, c) in text[from..to].char_indices() {
            let start = from + offset;
            tokens.push(Token {
                start,
                end: start + c.len_utf8(),
                units: char_units(c),
                ch: Some(c),
            });
        }
    };

    for marker in pause_markers(text) {
        push_chars(&mut tokens, cursor, marker.span.start);
        tokens.push(Token {
            start: marker.span.start,
            end: marker.span.end,
            units: marker.units(),
            ch: None,
        });
        cursor = marker.span.end;
    }
    push_chars(&mut tokens, cursor, text.len());

    tokens
}

/// Split `text` into chunks whose unit length never exceeds `budget`.
///
/// Blank input yields no chunks, and no chunk is ever whitespace only. Text
/// within budget comes back as a single chunk. A pause marker that alone costs more than `budget` is emitted as its
/// own chunk, the one case where a chunk may exceed the budget.
pub fn segment(text: &str, budget: usize) -> Vec<TextChunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let tokens = tokenize(text);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < tokens.len() {
        let mut used: usize = 0;
        let mut end = start;
        while end < tokens.len() && used.saturating_add(tokens[end].units) <= budget {
            used = used.saturating_add(tokens[end].units);
            end += 1;
        }

        if end < tokens.len() {
            end = if end == start {
                // A single token wider than the whole budget
                start + 1
            } else {
                find_boundary(&tokens, start, end).unwrap_or(end)
            };
        }

        let slice = &text[tokens[start].start..tokens[end - 1].end];
        // Whitespace alone is nothing to synthesize
        if !slice.trim().is_empty() {
            chunks.push(TextChunk {
                index: chunks.len(),
                text: slice.to_string(),
            });
        }
        start = end;
    }

    chunks
}

/// Search backward from `end` (exclusive) for the best split position.
///
/// Returns the token index just after the matched boundary character.
fn find_boundary(tokens: &[Token], start: usize, end: usize) -> Option<usize> {
    for class in BOUNDARY_CLASSES {
        let mut looked: usize = 0;
        for j in (start..end).rev() {
            looked = looked.saturating_add(tokens[j].units);
            if looked > LOOKBACK_UNITS {
                break;
            }
            if tokens[j].ch.is_some_and(|c| class.contains(&c)) {
                return Some(j + 1);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text_prep::{strip_pause_markers, unit_length};

    fn texts(chunks: &[TextChunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.text.as_str()).collect()
    }

    fn joined(chunks: &[TextChunk]) -> String {
        chunks.iter().map(|c| c.text.as_str()).collect()
    }

    fn squeezed(text: &str) -> String {
        text.split_whitespace().collect()
    }

    #[test]
    fn blank_input_yields_nothing() {
        assert!(segment("", 100).is_empty());
        assert!(segment("  \n\t ", 100).is_empty());
    }

    #[test]
    fn short_text_not_split() {
        let chunks = segment("Hello world.", 200);
        assert_eq!(texts(&chunks), vec!["Hello world."]);
        assert_eq!(chunks[0].index, 0);
    }

    #[test]
    fn prefers_sentence_terminator_over_comma() {
        let text = "One two. Three, four five six";
        let chunks = segment(text, 20);
        assert_eq!(texts(&chunks), vec!["One two.", " Three,", " four five six"]);
    }

    #[test]
    fn line_break_beats_sentence_terminator() {
        let text = "First line.\nSecond. Third part here";
        let chunks = segment(text, 25);
        assert_eq!(chunks[0].text, "First line.\n");
    }

    #[test]
    fn falls_back_to_whitespace() {
        let text = "word ".repeat(50);
        let chunks = segment(&text, 32);
        assert!(chunks.len() > 1);
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.text.ends_with(' '), "chunk: {:?}", chunk.text);
            assert!(chunk.units() <= 32);
        }
        assert_eq!(joined(&chunks), text);
    }

    #[test]
    fn hard_splits_without_boundaries() {
        let text = "a".repeat(300);
        let chunks = segment(&text, 100);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.text.len() == 100));
    }

    #[test]
    fn boundary_outside_lookback_is_ignored() {
        // The only terminator sits 400 units before the overflow point
        let text = format!("a.{}", "b".repeat(500));
        let chunks = segment(&text, 402);
        assert_eq!(chunks[0].text.len(), 402);
    }

    #[test]
    fn wide_characters_count_double() {
        let text = "你好世界".repeat(10); // 40 chars, 80 units
        let chunks = segment(&text, 30);
        for chunk in &chunks {
            assert!(chunk.units() <= 30);
        }
        assert_eq!(chunks[0].text.chars().count(), 15);
        assert_eq!(joined(&chunks), text);
    }

    #[test]
    fn chinese_punctuation_is_a_boundary() {
        let text = "今天天气很好。我们去公园散步吧";
        let chunks = segment(text, 20);
        assert_eq!(chunks[0].text, "今天天气很好。");
    }

    #[test]
    fn pause_markers_are_never_split() {
        let marker = r#"<break time="1s"/>"#;
        let text = format!("{}{}{}", "x".repeat(8), marker, "y".repeat(8));
        // 8 + 11 + 8 = 27 units
        let chunks = segment(&text, 19);
        assert_eq!(texts(&chunks), vec![format!("{}{}", "x".repeat(8), marker).as_str(), "yyyyyyyy"]);
        assert!(chunks.iter().all(|c| c.units() <= 19));
    }

    #[test]
    fn oversized_marker_becomes_own_chunk() {
        let marker = r#"<break time="10s"/>"#; // 110 units
        let text = format!("ab{marker}cd");
        let chunks = segment(&text, 50);
        assert_eq!(texts(&chunks), vec!["ab", marker, "cd"]);
    }

    #[test]
    fn huge_marker_does_not_overflow_budget() {
        let marker = r#"<break time="99999999999999999999999s"/>"#;
        let text = format!("a{marker}b");
        let chunks = segment(&text, 5000);
        assert_eq!(texts(&chunks), vec!["a", marker, "b"]);
        assert_eq!(chunks[1].units(), usize::MAX);
        assert_eq!(segment(marker, usize::MAX).len(), 1);
    }

    #[test]
    fn whitespace_only_stretch_is_dropped() {
        let text = format!("abcdefghi\n{}\nxyz", " ".repeat(10));
        let chunks = segment(&text, 10);
        assert_eq!(texts(&chunks), vec!["abcdefghi\n", "\nxyz"]);
        assert!(chunks.iter().all(|c| !c.text.trim().is_empty()));
        assert_eq!(chunks[1].index, 1);
    }

    #[test]
    fn concatenation_reconstitutes_input() {
        let text = "The quick brown fox, jumping; over the lazy dog. Pack my box\nwith five dozen liquor jugs! 你好，世界。<break time=\"0.4s\"/>How vexingly quick daft zebras jump?";
        for budget in [5, 12, 17, 40, 80, 400] {
            let chunks = segment(text, budget);
            assert_eq!(squeezed(&joined(&chunks)), squeezed(text), "budget {budget}");
            assert_eq!(
                squeezed(&strip_pause_markers(&joined(&chunks))),
                squeezed(&strip_pause_markers(text))
            );
            for chunk in &chunks {
                assert!(unit_length(&chunk.text) <= budget, "budget {budget}: {:?}", chunk.text);
            }
        }
    }

    #[test]
    fn chunk_indices_are_sequential() {
        let chunks = segment(&"abc. ".repeat(40), 23);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
        }
    }

    #[test]
    fn segmentation_is_idempotent() {
        let text = "Sentence one. Sentence two, with a clause; and more! ".repeat(30);
        assert_eq!(segment(&text, 70), segment(&text, 70));
    }

    #[test]
    fn long_text_splits_at_sentence_terminators() {
        let sentence = "The quick brown fox jumps over the lazy dog again. ";
        let text: String = sentence.repeat(240).chars().take(12_000).collect();
        assert_eq!(text.chars().count(), 12_000);

        let chunks = segment(&text, 5000);
        assert!(chunks.len() >= 3, "got {} chunks", chunks.len());
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.units() <= 5000);
            assert!(chunk.text.ends_with('.'), "chunk ends with {:?}", chunk.text.chars().last());
        }
        assert_eq!(joined(&chunks), text);
    }
}
