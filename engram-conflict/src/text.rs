//! Surface-text helpers shared by the detectors.

use std::collections::HashSet;

/// Content words of a text: lowercased ASCII alphanumeric runs plus
/// individual CJK characters.
pub fn content_words(text: &str) -> HashSet<String> {
    let mut words = HashSet::new();
    let mut current = String::new();
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            current.push(c.to_ascii_lowercase());
        } else {
            if !current.is_empty() {
                words.insert(std::mem::take(&mut current));
            }
            if is_cjk(c) {
                words.insert(c.to_string());
            }
        }
    }
    if !current.is_empty() {
        words.insert(current);
    }
    words
}

/// Jaccard similarity of the two texts' content-word sets.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let wa = content_words(a);
    let wb = content_words(b);
    if wa.is_empty() && wb.is_empty() {
        return 1.0;
    }
    if wa.is_empty() || wb.is_empty() {
        return 0.0;
    }
    let intersection = wa.intersection(&wb).count() as f64;
    let union = wa.union(&wb).count() as f64;
    intersection / union
}

/// Jaccard over character sets, for short fact keys/values.
pub fn char_similarity(a: &str, b: &str) -> f64 {
    let ca: HashSet<char> = a.to_lowercase().chars().filter(|c| !c.is_whitespace()).collect();
    let cb: HashSet<char> = b.to_lowercase().chars().filter(|c| !c.is_whitespace()).collect();
    if ca.is_empty() && cb.is_empty() {
        return 1.0;
    }
    if ca.is_empty() || cb.is_empty() {
        return 0.0;
    }
    ca.intersection(&cb).count() as f64 / ca.union(&cb).count() as f64
}

pub(crate) fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0xF900..=0xFAFF
        | 0x3040..=0x30FF | 0xAC00..=0xD7AF
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_texts_score_one() {
        assert!((jaccard_similarity("hello world", "hello world") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn disjoint_texts_score_zero() {
        assert_eq!(jaccard_similarity("alpha beta", "gamma delta"), 0.0);
    }

    #[test]
    fn cjk_words_are_per_char() {
        let words = content_words("我喜欢Python");
        assert!(words.contains("我"));
        assert!(words.contains("喜"));
        assert!(words.contains("python"));
    }

    #[test]
    fn reordered_words_still_overlap() {
        let sim = jaccard_similarity("Python是我最喜欢的语言", "我最喜欢的语言是Python");
        assert!(sim > 0.9, "reordering keeps the same word set: {sim}");
    }
}
