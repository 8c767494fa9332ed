//! Property tests for the limit admission rule.

use proptest::prelude::*;
use rust_decimal::Decimal;

use super::evaluator::LimitEvaluator;

fn cents() -> impl Strategy<Value = Decimal> {
    (0i64..10_000_000).prop_map(|c| Decimal::new(c, 2))
}

proptest! {
    #[test]
    fn prop_reaching_limit_exactly_is_rejected(spent in cents(), proposed in 1i64..1_000_000) {
        let proposed = Decimal::new(proposed, 2);
        let limit_amount = spent + proposed;
        prop_assert!(!LimitEvaluator::admits(spent, proposed, limit_amount));
    }

    #[test]
    fn prop_one_cent_below_limit_is_admitted(spent in cents(), proposed in 1i64..1_000_000) {
        let proposed = Decimal::new(proposed, 2);
        let limit_amount = spent + proposed + Decimal::new(1, 2);
        prop_assert!(LimitEvaluator::admits(spent, proposed, limit_amount));
    }

    #[test]
    fn prop_admission_is_monotone_in_amount(spent in cents(), a in cents(), b in cents(), limit in cents()) {
        let (small, large) = if a <= b { (a, b) } else { (b, a) };
        if LimitEvaluator::admits(spent, large, limit) {
            prop_assert!(LimitEvaluator::admits(spent, small, limit));
        }
    }
}
