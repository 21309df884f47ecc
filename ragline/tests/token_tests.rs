//! Property tests for token counting and budget fitting.

use proptest::prelude::*;
use ragline::token::{CharRatioTokenCounter, TokenCounter};

fn arb_counter() -> impl Strategy<Value = CharRatioTokenCounter> {
    (1usize..8).prop_map(CharRatioTokenCounter::new)
}

/// **Property: token-budget fitting**
/// The fitted text is a prefix within budget, and text already within budget
/// comes back unchanged.
mod prop_fit_to_budget {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(300))]

        #[test]
        fn fitted_text_is_a_prefix_within_budget(
            text in "\\PC{0,300}",
            budget in 0usize..120,
            counter in arb_counter(),
        ) {
            let fitted = counter.fit_to_budget(&text, budget);
            prop_assert!(counter.count(fitted) <= budget);
            prop_assert!(text.starts_with(fitted));
        }

        #[test]
        fn fitted_prefix_is_the_longest_possible(
            text in "\\PC{1,200}",
            budget in 0usize..60,
            counter in arb_counter(),
        ) {
            let fitted = counter.fit_to_budget(&text, budget);
            if fitted.len() < text.len() {
                let next_char = text[fitted.len()..].chars().next().unwrap();
                let longer = &text[..fitted.len() + next_char.len_utf8()];
                prop_assert!(counter.count(longer) > budget);
            }
        }

        #[test]
        fn text_within_budget_is_unchanged(text in "\\PC{0,200}", counter in arb_counter()) {
            let budget = counter.count(&text);
            prop_assert_eq!(counter.fit_to_budget(&text, budget), text.as_str());
        }

        #[test]
        fn count_is_monotone_under_concatenation(
            a in "\\PC{0,100}",
            b in "\\PC{0,100}",
            counter in arb_counter(),
        ) {
            let joined = format!("{a}{b}");
            prop_assert!(counter.count(&joined) >= counter.count(&a).max(counter.count(&b)));
        }
    }
}

#[test]
fn empty_text_counts_zero() {
    assert_eq!(CharRatioTokenCounter::default().count(""), 0);
}

#[test]
fn emoji_and_combining_marks_do_not_panic() {
    let counter = CharRatioTokenCounter::default();
    let text = "👩‍👩‍👧‍👦 café naïve 日本語 🇯🇵";
    for budget in 0..=counter.count(text) {
        let fitted = counter.fit_to_budget(text, budget);
        assert!(counter.count(fitted) <= budget);
    }
}
