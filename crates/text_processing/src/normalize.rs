//! Text normalisation
//!
//! Matching runs on a normalised copy of the utterance. Normalisation maps
//! each char to exactly one char so offsets found in the normalised text
//! are valid offsets into the original.

/// Fold full-width ASCII and ideographic space, then lower-case
pub fn normalize(text: &str) -> String {
    text.chars().map(normalize_char).collect()
}

fn normalize_char(c: char) -> char {
    let folded = match c {
        '\u{3000}' => ' ',
        '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
        _ => c,
    };
    // Multi-char lowercase expansions keep their first char
    folded.to_lowercase().next().unwrap_or(folded)
}

/// Normalised text with whitespace and punctuation removed, used to
/// recognise repeated queries
pub fn canonical_query(text: &str) -> String {
    normalize(text)
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// Stable FNV-1a hash of the canonical query
pub fn query_hash(text: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;

    canonical_query(text)
        .bytes()
        .fold(OFFSET, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(PRIME))
}

/// Convert a byte offset in `text` to a char offset
pub fn char_offset(text: &str, byte_offset: usize) -> usize {
    text.char_indices()
        .take_while(|(i, _)| *i < byte_offset)
        .count()
}

/// Substring by char offsets
pub fn char_slice(text: &str, start: usize, end: usize) -> String {
    text.chars().skip(start).take(end.saturating_sub(start)).collect()
}

/// Whether the keyword consists only of ASCII alphanumerics
pub fn is_ascii_word(keyword: &str) -> bool {
    !keyword.is_empty() && keyword.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Find `keyword` in normalised `text`, returning a char span
///
/// ASCII keywords must sit on word boundaries so "pc" does not fire
/// inside "spec"; CJK keywords match anywhere.
pub fn find_keyword(text: &str, keyword: &str) -> Option<(usize, usize)> {
    if keyword.is_empty() {
        return None;
    }
    let ascii = is_ascii_word(keyword);

    for (byte_start, _) in text.match_indices(keyword) {
        let byte_end = byte_start + keyword.len();
        if ascii {
            let before = text[..byte_start].chars().next_back();
            let after = text[byte_end..].chars().next();
            if before.map_or(false, |c| c.is_ascii_alphanumeric())
                || after.map_or(false, |c| c.is_ascii_alphanumeric())
            {
                continue;
            }
        }
        let start = char_offset(text, byte_start);
        return Some((start, start + keyword.chars().count()));
    }
    None
}
