//! Property tests for the token estimator and budget allocation.

use proptest::prelude::*;

use engram_core::config::BudgetConfig;
use engram_tokens::{estimate_tokens, BudgetManager};

proptest! {
    /// Estimation is additive across whitespace-joined concatenation,
    /// within ceiling rounding.
    #[test]
    fn estimate_is_additive(a in "[a-z]{1,12}( [a-z]{1,12}){0,8}", b in "[a-z]{1,12}( [a-z]{1,12}){0,8}") {
        let joined = format!("{a} {b}");
        let whole = estimate_tokens(&joined) as i64;
        let parts = (estimate_tokens(&a) + estimate_tokens(&b)) as i64;
        prop_assert!((whole - parts).abs() <= 1, "whole={whole} parts={parts}");
    }

    /// Estimates never drop below 1 for non-empty input.
    #[test]
    fn estimate_is_positive(s in ".{1,64}") {
        prop_assert!(estimate_tokens(&s) >= 1);
    }

    /// CJK text is charged per character.
    #[test]
    fn cjk_scales_per_char(n in 1usize..40) {
        let s: String = std::iter::repeat('北').take(n).collect();
        prop_assert_eq!(estimate_tokens(&s), ((1.5 * n as f64).ceil() as usize).max(1));
    }

    /// Allocation ratios always sum to 1.0 regardless of overrides.
    #[test]
    fn ratios_renormalize(pinned in 0.0f64..5.0, long in 0.0f64..5.0) {
        let mut config = BudgetConfig::default();
        config.ratio_overrides.insert("pinned".to_string(), pinned);
        config.ratio_overrides.insert("longTerm".to_string(), long);
        let alloc = BudgetManager::new(config).allocate_budget("u1");
        let sum: f64 = alloc.ratios.values().sum();
        prop_assert!((sum - 1.0).abs() < 1e-9);
    }
}
