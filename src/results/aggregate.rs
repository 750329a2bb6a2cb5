//! Per-assertion aggregation.

#![allow(missing_docs)]

use crate::core::errors::{FlickerError, Result};
use crate::results::assertion::{AssertionResult, AssertionStatus, InvocationGroup};

/// Running total of every result folded in under one assertion name.
///
/// The first result fixes the invocation group; folding a result of another
/// group is a caller bug and fails with `InvocationGroupMismatch`. Results
/// are not deduplicated.
#[derive(Debug, Clone, Default)]
pub struct AggregatedFlickerResult {
    results: Vec<AssertionResult>,
    group: Option<InvocationGroup>,
    passes: usize,
    failures: usize,
    assumption_violations: usize,
}

impl AggregatedFlickerResult {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_result(&mut self, result: AssertionResult) -> Result<()> {
        if let Some(group) = self.group {
            if group != result.group() {
                return Err(FlickerError::InvocationGroupMismatch {
                    assertion: result.name().to_string(),
                    expected: group.to_string(),
                    found: result.group().to_string(),
                });
            }
        }
        self.group = Some(result.group());
        match result.status() {
            AssertionStatus::Pass => self.passes += 1,
            AssertionStatus::Fail => self.failures += 1,
            AssertionStatus::AssumptionViolation => self.assumption_violations += 1,
        }
        self.results.push(result);
        Ok(())
    }

    #[must_use]
    pub fn results(&self) -> &[AssertionResult] {
        &self.results
    }

    #[must_use]
    pub const fn group(&self) -> Option<InvocationGroup> {
        self.group
    }

    #[must_use]
    pub const fn passes(&self) -> usize {
        self.passes
    }

    #[must_use]
    pub const fn failures(&self) -> usize {
        self.failures
    }

    #[must_use]
    pub const fn assumption_violations(&self) -> usize {
        self.assumption_violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn mismatched_group_is_rejected() {
        let mut agg = AggregatedFlickerResult::new();
        agg.add_result(AssertionResult::pass("a", InvocationGroup::Blocking))
            .unwrap();
        let err = agg
            .add_result(AssertionResult::pass("a", InvocationGroup::NonBlocking))
            .unwrap_err();
        assert_eq!(err.code(), "FLK-4001");
        assert!(err.is_contract_violation());
        assert_eq!(agg.results().len(), 1);
    }

    #[test]
    fn same_result_twice_is_counted_twice() {
        let mut agg = AggregatedFlickerResult::new();
        let r = AssertionResult::fail("a", InvocationGroup::Blocking, vec![]);
        agg.add_result(r.clone()).unwrap();
        agg.add_result(r).unwrap();
        assert_eq!(agg.results().len(), 2);
        assert_eq!(agg.failures(), 2);
        assert_eq!(agg.passes(), 0);
    }

    fn status() -> impl Strategy<Value = AssertionStatus> {
        prop_oneof![
            Just(AssertionStatus::Pass),
            Just(AssertionStatus::Fail),
            Just(AssertionStatus::AssumptionViolation),
        ]
    }

    proptest! {
        #[test]
        fn counts_match_folded_statuses(statuses in prop::collection::vec(status(), 0..40)) {
            let mut agg = AggregatedFlickerResult::new();
            for s in &statuses {
                agg.add_result(AssertionResult::new("x", *s, InvocationGroup::Blocking, vec![])).unwrap();
            }
            let count = |want| statuses.iter().filter(|s| **s == want).count();
            prop_assert_eq!(agg.results().len(), statuses.len());
            prop_assert_eq!(agg.passes(), count(AssertionStatus::Pass));
            prop_assert_eq!(agg.failures(), count(AssertionStatus::Fail));
            prop_assert_eq!(agg.assumption_violations(), count(AssertionStatus::AssumptionViolation));
        }
    }
}
