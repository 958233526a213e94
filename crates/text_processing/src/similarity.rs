//! String similarity measures used for example-phrase scoring

use std::collections::HashSet;

/// Calculate Levenshtein edit distance between two strings
pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let s1_chars: Vec<char> = s1.chars().collect();
    let s2_chars: Vec<char> = s2.chars().collect();
    let len1 = s1_chars.len();
    let len2 = s2_chars.len();

    if len1 == 0 {
        return len2;
    }
    if len2 == 0 {
        return len1;
    }

    // Two rows instead of the full matrix
    let mut prev_row: Vec<usize> = (0..=len2).collect();
    let mut curr_row: Vec<usize> = vec![0; len2 + 1];

    for i in 1..=len1 {
        curr_row[0] = i;
        for j in 1..=len2 {
            let cost = usize::from(s1_chars[i - 1] != s2_chars[j - 1]);
            curr_row[j] = (prev_row[j] + 1)
                .min(curr_row[j - 1] + 1)
                .min(prev_row[j - 1] + cost);
        }
        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[len2]
}

/// Edit distance scaled to [0, 1], 1 meaning identical
pub fn levenshtein_similarity(s1: &str, s2: &str) -> f32 {
    let longest = s1.chars().count().max(s2.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein_distance(s1, s2) as f32 / longest as f32
}

fn char_bigrams(s: &str) -> HashSet<(char, char)> {
    let chars: Vec<char> = s.chars().filter(|c| !c.is_whitespace()).collect();
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Dice coefficient over char bigrams
///
/// Works without word segmentation, which matters for CJK text.
pub fn bigram_dice(s1: &str, s2: &str) -> f32 {
    let a = char_bigrams(s1);
    let b = char_bigrams(s2);
    if a.is_empty() || b.is_empty() {
        return if s1.trim() == s2.trim() && !s1.trim().is_empty() {
            1.0
        } else {
            0.0
        };
    }
    let shared = a.intersection(&b).count();
    2.0 * shared as f32 / (a.len() + b.len()) as f32
}

/// Best of bigram overlap and edit similarity
pub fn phrase_similarity(text: &str, example: &str) -> f32 {
    bigram_dice(text, example).max(levenshtein_similarity(text, example))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_distance() {
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("遊戲筆電", "遊戲電腦"), 2);
    }

    #[test]
    fn test_levenshtein_similarity_bounds() {
        assert_eq!(levenshtein_similarity("abc", "abc"), 1.0);
        assert_eq!(levenshtein_similarity("", ""), 1.0);
        assert_eq!(levenshtein_similarity("ab", "cd"), 0.0);
    }

    #[test]
    fn test_bigram_dice() {
        assert_eq!(bigram_dice("隨便推薦", "隨便推薦"), 1.0);
        assert!(bigram_dice("隨便推薦一台", "隨便推薦") > 0.7);
        assert_eq!(bigram_dice("遊戲", "文書"), 0.0);
        assert_eq!(bigram_dice("好", "好"), 1.0);
    }

    #[test]
    fn test_phrase_similarity_is_max() {
        let s = phrase_similarity("我想打電動", "想打電動");
        assert!(s >= bigram_dice("我想打電動", "想打電動"));
        assert!(s >= levenshtein_similarity("我想打電動", "想打電動"));
    }
}
