/// Estimate the token cost of `text`.
///
/// CJK characters cost 1.5 each, alphanumeric words 1.3 each, and any
/// other non-whitespace character 0.5, rounded up as a whole. Empty text
/// costs 0; any non-empty text costs at least 1.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }

    let mut cjk_chars = 0usize;
    let mut other_chars = 0usize;
    let mut word_count = 0usize;
    let mut in_word = false;

    for c in text.chars() {
        if is_cjk(c) {
            cjk_chars += 1;
            in_word = false;
        } else if c.is_ascii_alphanumeric() {
            if !in_word {
                word_count += 1;
                in_word = true;
            }
        } else {
            in_word = false;
            if !c.is_whitespace() {
                other_chars += 1;
            }
        }
    }

    let estimate =
        1.5 * cjk_chars as f64 + 1.3 * word_count as f64 + 0.5 * other_chars as f64;
    (estimate.ceil() as usize).max(1)
}

/// CJK unified ideographs plus the common extension blocks.
fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x4E00..=0x9FFF      // CJK Unified Ideographs
        | 0x3400..=0x4DBF    // Extension A
        | 0x20000..=0x2A6DF  // Extension B
        | 0xF900..=0xFAFF    // Compatibility Ideographs
        | 0x3040..=0x30FF    // Hiragana + Katakana
        | 0xAC00..=0xD7AF    // Hangul Syllables
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn single_word() {
        // 1 word * 1.3 -> ceil = 2
        assert_eq!(estimate_tokens("hello"), 2);
    }

    #[test]
    fn cjk_chars_cost_more() {
        // 4 CJK chars * 1.5 = 6
        assert_eq!(estimate_tokens("我爱北京"), 6);
    }

    #[test]
    fn punctuation_costs_half() {
        // 2 words * 1.3 + 1 other * 0.5 = 3.1 -> 4
        assert_eq!(estimate_tokens("hello, world"), 4);
    }

    #[test]
    fn minimum_one_for_nonempty() {
        assert_eq!(estimate_tokens("."), 1);
        assert_eq!(estimate_tokens(" "), 1);
    }
}
