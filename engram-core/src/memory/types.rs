use serde::{Deserialize, Serialize};

/// The closed set of memory tiers. Drives lifecycle transitions and the
/// rerank type weight; `Pinned` and `Profile` are exempt from every
/// automatic lifecycle action and deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MemoryType {
    ShortTerm,
    MidTerm,
    LongTerm,
    Pinned,
    Profile,
}

impl MemoryType {
    /// All variants, in lifecycle order.
    pub const ALL: [MemoryType; 5] = [
        MemoryType::ShortTerm,
        MemoryType::MidTerm,
        MemoryType::LongTerm,
        MemoryType::Pinned,
        MemoryType::Profile,
    ];

    /// Whether this tier is exempt from automatic lifecycle transitions,
    /// eviction, and compression.
    pub fn is_protected(self) -> bool {
        matches!(self, MemoryType::Pinned | MemoryType::Profile)
    }

    /// The single rerank weight table used across the system.
    pub fn rerank_weight(self) -> f64 {
        match self {
            MemoryType::Pinned => 1.5,
            MemoryType::Profile => 1.3,
            MemoryType::LongTerm => 1.2,
            MemoryType::MidTerm => 1.0,
            MemoryType::ShortTerm => 0.8,
        }
    }

    /// Selection priority when distilling under a token budget.
    /// Lower sorts first.
    pub fn distill_priority(self) -> u8 {
        match self {
            MemoryType::Pinned => 0,
            MemoryType::Profile => 1,
            MemoryType::LongTerm => 2,
            MemoryType::MidTerm => 3,
            MemoryType::ShortTerm => 4,
        }
    }

    /// The serialized name, matching the persisted JSON representation.
    pub fn as_str(self) -> &'static str {
        match self {
            MemoryType::ShortTerm => "shortTerm",
            MemoryType::MidTerm => "midTerm",
            MemoryType::LongTerm => "longTerm",
            MemoryType::Pinned => "pinned",
            MemoryType::Profile => "profile",
        }
    }
}

impl std::str::FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shortTerm" => Ok(MemoryType::ShortTerm),
            "midTerm" => Ok(MemoryType::MidTerm),
            "longTerm" => Ok(MemoryType::LongTerm),
            "pinned" => Ok(MemoryType::Pinned),
            "profile" => Ok(MemoryType::Profile),
            other => Err(format!("unknown memory type: {other}")),
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protected_tiers() {
        assert!(MemoryType::Pinned.is_protected());
        assert!(MemoryType::Profile.is_protected());
        assert!(!MemoryType::ShortTerm.is_protected());
        assert!(!MemoryType::MidTerm.is_protected());
        assert!(!MemoryType::LongTerm.is_protected());
    }

    #[test]
    fn rerank_weights_are_ordered() {
        assert!(MemoryType::Pinned.rerank_weight() > MemoryType::Profile.rerank_weight());
        assert!(MemoryType::Profile.rerank_weight() > MemoryType::LongTerm.rerank_weight());
        assert!(MemoryType::LongTerm.rerank_weight() > MemoryType::MidTerm.rerank_weight());
        assert!(MemoryType::MidTerm.rerank_weight() > MemoryType::ShortTerm.rerank_weight());
    }

    #[test]
    fn round_trips_through_str() {
        for t in MemoryType::ALL {
            assert_eq!(t.as_str().parse::<MemoryType>().unwrap(), t);
        }
    }

    #[test]
    fn serde_uses_camel_case() {
        let json = serde_json::to_string(&MemoryType::ShortTerm).unwrap();
        assert_eq!(json, "\"shortTerm\"");
    }
}
