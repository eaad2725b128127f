//! Index-time text normalization.
//!
//! ASCII is lowercased and split on non-alphanumerics; CJK characters are
//! emitted individually AND as overlapping bigrams so multi-character
//! words are searchable without a segmenter.

/// Normalize text into a space-joined token stream.
pub fn normalize_text(text: &str) -> String {
    let mut tokens: Vec<String> = Vec::new();
    let mut ascii_run = String::new();
    let mut cjk_run: Vec<char> = Vec::new();

    fn flush_ascii(run: &mut String, tokens: &mut Vec<String>) {
        if !run.is_empty() {
            tokens.push(std::mem::take(run));
        }
    }
    fn flush_cjk(run: &mut Vec<char>, tokens: &mut Vec<String>) {
        if run.is_empty() {
            return;
        }
        for c in run.iter() {
            tokens.push(c.to_string());
        }
        for pair in run.windows(2) {
            tokens.push(format!("{}{}", pair[0], pair[1]));
        }
        run.clear();
    }

    for c in text.chars() {
        if is_cjk(c) {
            flush_ascii(&mut ascii_run, &mut tokens);
            cjk_run.push(c);
        } else if c.is_ascii_alphanumeric() {
            flush_cjk(&mut cjk_run, &mut tokens);
            ascii_run.push(c.to_ascii_lowercase());
        } else {
            flush_ascii(&mut ascii_run, &mut tokens);
            flush_cjk(&mut cjk_run, &mut tokens);
        }
    }
    flush_ascii(&mut ascii_run, &mut tokens);
    flush_cjk(&mut cjk_run, &mut tokens);

    tokens.join(" ")
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0xF900..=0xFAFF
        | 0x3040..=0x30FF | 0xAC00..=0xD7AF
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_is_lowercased_and_split() {
        assert_eq!(normalize_text("Hello, World!"), "hello world");
    }

    #[test]
    fn cjk_gets_chars_and_bigrams() {
        assert_eq!(normalize_text("北京"), "北 京 北京");
        assert_eq!(normalize_text("明略科技"), "明 略 科 技 明略 略科 科技");
    }

    #[test]
    fn mixed_text_keeps_both_schemes() {
        let out = normalize_text("我用Rust");
        assert!(out.contains("我 用 我用"));
        assert!(out.contains("rust"));
    }

    #[test]
    fn empty_is_empty() {
        assert_eq!(normalize_text(""), "");
    }
}
