//! Text helpers for channel names and categories

use std::cmp::Ordering;

/// Characters treated as interchangeable separators when folding names
const SEPARATORS: &[char] = &['-', '_', '.', '·', '・', ':', '\'', '"', '/', '|', ',', '、'];

/// Convert full-width ASCII variants to their half-width forms and the
/// ideographic space to a regular space
pub fn to_half_width(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '\u{3000}' => ' ',
            '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
            _ => c,
        })
        .collect()
}

/// Collapse runs of whitespace into single spaces and trim the ends
pub fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Comparison form of a name: half-width, lowercase, without whitespace or
/// separator punctuation. `"CCTV-1"`, `"cctv 1"` and `"ＣＣＴＶ１"` all fold to
/// `"cctv1"`; `"CCTV5+"` keeps its `+`.
pub fn fold(input: &str) -> String {
    to_half_width(input)
        .chars()
        .filter(|c| !c.is_whitespace() && !SEPARATORS.contains(c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Detect UTF-8 text that was decoded as Latin-1 somewhere upstream.
///
/// CJK characters encode as a lead byte in `0xE4..=0xE9` followed by
/// continuation bytes in `0x80..=0xBF`; mis-decoded, that is one of
/// `ä å æ ç è é` directly followed by a character from U+0080..=U+00BF.
pub fn looks_garbled(input: &str) -> bool {
    let chars: Vec<char> = input.chars().collect();
    chars.windows(2).any(|pair| {
        matches!(pair[0], '\u{E4}'..='\u{E9}') && matches!(pair[1], '\u{80}'..='\u{BF}')
    })
}

/// Order names so embedded numbers compare numerically: `CCTV-2` < `CCTV-10`
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = Chunks::new(a);
    let mut right = Chunks::new(b);
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x, y) {
                    (Chunk::Number(n), Chunk::Number(m)) => compare_digits(n, m),
                    (Chunk::Number(_), Chunk::Text(_)) => Ordering::Less,
                    (Chunk::Text(_), Chunk::Number(_)) => Ordering::Greater,
                    (Chunk::Text(s), Chunk::Text(t)) => s.to_lowercase().cmp(&t.to_lowercase()),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn compare_digits(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

enum Chunk<'a> {
    Number(&'a str),
    Text(&'a str),
}

struct Chunks<'a> {
    rest: &'a str,
}

impl<'a> Chunks<'a> {
    fn new(input: &'a str) -> Self {
        Self { rest: input }
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.rest.chars().next()?;
        let is_digit = first.is_ascii_digit();
        let end = self
            .rest
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() != is_digit)
            .map(|(i, _)| i)
            .unwrap_or(self.rest.len());
        let (chunk, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(if is_digit {
            Chunk::Number(chunk)
        } else {
            Chunk::Text(chunk)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_width_conversion() {
        assert_eq!(to_half_width("ＣＣＴＶ－１"), "CCTV-1");
        assert_eq!(to_half_width("凤凰\u{3000}卫视"), "凤凰 卫视");
    }

    #[test]
    fn test_fold_variants_agree() {
        assert_eq!(fold("CCTV-1"), "cctv1");
        assert_eq!(fold("cctv 1"), "cctv1");
        assert_eq!(fold("ＣＣＴＶ１"), "cctv1");
        assert_eq!(fold("CCTV5+"), "cctv5+");
        assert_ne!(fold("CCTV5+"), fold("CCTV5"));
        assert_eq!(fold(&fold("Phoenix · TV")), fold("Phoenix · TV"));
    }

    #[test]
    fn test_garbled_detection() {
        // "央视" encoded as UTF-8 and decoded as Latin-1
        let garbled: String = "央视".as_bytes().iter().map(|b| *b as char).collect();
        assert!(looks_garbled(&garbled));
        assert!(!looks_garbled("央视"));
        assert!(!looks_garbled("Télé Monte Carlo"));
    }

    #[test]
    fn test_natural_ordering() {
        let mut names = vec!["CCTV-10", "CCTV-2", "CCTV-1", "cctv-5+", "CCTV-5"];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(names, vec!["CCTV-1", "CCTV-2", "CCTV-5", "cctv-5+", "CCTV-10"]);
        assert_eq!(natural_cmp("a007", "a7"), Ordering::Equal);
    }
}
