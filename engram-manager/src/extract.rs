//! Structured-information extraction on ingest: pinned quotes, profile
//! facts, and per-sentence type/importance classification.

use regex::Regex;
use std::sync::OnceLock;

use engram_core::memory::MemoryType;

/// One extracted unit ready to become a memory record.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedItem {
    pub content: String,
    pub memory_type: MemoryType,
    pub importance: f64,
}

fn pinned_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"「([^」]+)」|『([^』]+)』|(?:请?记住|remember)[:：]?\s*(.+)"#)
            .expect("static pattern")
    })
}

fn profile_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"我叫|我是|我今年|我来自|我的职业|我住在|(?i)my name is|(?i)i am \d+ years")
            .expect("static pattern")
    })
}

fn temporal_marker() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\d{4}年|\d{1,2}月\d{1,2}日|昨天|今天|明天|去年|明年|上周|下周|每天|每周")
            .expect("static pattern")
    })
}

/// Distill free-form input into ordered `(content, type, importance)`
/// items. Pinned quotes first, then profile facts, then classified
/// sentences. Empty output means the caller should store the whole
/// input as one short-term record.
pub fn extract_structured_info(text: &str) -> Vec<ExtractedItem> {
    let mut items = Vec::new();

    // Pinned quotes: explicit "remember this" content.
    for captures in pinned_pattern().captures_iter(text) {
        let quoted = captures
            .get(1)
            .or_else(|| captures.get(2))
            .or_else(|| captures.get(3))
            .map(|m| m.as_str().trim());
        if let Some(content) = quoted {
            if !content.is_empty() {
                items.push(ExtractedItem {
                    content: content.to_string(),
                    memory_type: MemoryType::Pinned,
                    importance: 0.95,
                });
            }
        }
    }

    // Sentence-level pass.
    for sentence in split_sentences(text) {
        // Skip content already captured as a pinned quote.
        if items
            .iter()
            .any(|i| i.memory_type == MemoryType::Pinned && sentence.contains(&i.content))
        {
            continue;
        }

        if profile_pattern().is_match(&sentence) {
            items.push(ExtractedItem {
                content: sentence,
                memory_type: MemoryType::Profile,
                importance: 0.9,
            });
            continue;
        }

        let memory_type = classify_sentence(&sentence);
        let importance = sentence_importance(&sentence);
        items.push(ExtractedItem {
            content: sentence,
            memory_type,
            importance,
        });
    }

    items
}

fn split_sentences(text: &str) -> Vec<String> {
    text.split(['。', '！', '？', '!', '?', '\n', ';', '；'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Keyword cues pick the tier; short-term is the default.
fn classify_sentence(sentence: &str) -> MemoryType {
    const LONG_TERM_CUES: [&str; 8] = [
        "喜欢", "讨厌", "爱好", "永远", "一直", "总是", "always", "never",
    ];
    const MID_TERM_CUES: [&str; 8] = [
        "最近", "这周", "下周", "这个月", "下个月", "计划", "打算", "this week",
    ];

    let lower = sentence.to_lowercase();
    if LONG_TERM_CUES.iter().any(|cue| lower.contains(cue)) {
        return MemoryType::LongTerm;
    }
    if MID_TERM_CUES.iter().any(|cue| lower.contains(cue)) {
        return MemoryType::MidTerm;
    }
    MemoryType::ShortTerm
}

/// Length sanity, keyword presence, and temporal markers.
fn sentence_importance(sentence: &str) -> f64 {
    const IMPORTANT_CUES: [&str; 8] = [
        "重要", "必须", "一定", "记住", "喜欢", "讨厌", "important", "must",
    ];

    let chars = sentence.chars().count();
    let mut importance: f64 = if chars < 4 {
        0.3
    } else if chars > 200 {
        0.4
    } else {
        0.5
    };

    let lower = sentence.to_lowercase();
    if IMPORTANT_CUES.iter().any(|cue| lower.contains(cue)) {
        importance += 0.2;
    }
    if temporal_marker().is_match(sentence) {
        importance += 0.1;
    }
    importance.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_fact_is_classified_profile() {
        let items = extract_structured_info("我叫张三，在明略科技工作");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].memory_type, MemoryType::Profile);
        assert!(items[0].content.contains("明略科技"));
    }

    #[test]
    fn quoted_text_is_pinned() {
        let items = extract_structured_info("请记住：每天早上七点提醒我喝水");
        assert!(items
            .iter()
            .any(|i| i.memory_type == MemoryType::Pinned && i.content.contains("七点")));
    }

    #[test]
    fn preference_sentences_are_long_term() {
        let items = extract_structured_info("我喜欢Python");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].memory_type, MemoryType::LongTerm);
        assert!(items[0].importance > 0.5);
    }

    #[test]
    fn plans_are_mid_term() {
        let items = extract_structured_info("我计划下周去北京出差");
        assert_eq!(items[0].memory_type, MemoryType::MidTerm);
    }

    #[test]
    fn multiple_sentences_split() {
        let items = extract_structured_info("今天天气不错。我喜欢晴天！");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].memory_type, MemoryType::ShortTerm);
        assert_eq!(items[1].memory_type, MemoryType::LongTerm);
    }

    #[test]
    fn temporal_markers_raise_importance() {
        let plain = extract_structured_info("要开一个评审会")[0].importance;
        let dated = extract_structured_info("明天要开一个评审会")[0].importance;
        assert!(dated > plain);
    }

    #[test]
    fn empty_text_extracts_nothing() {
        assert!(extract_structured_info("").is_empty());
    }
}
