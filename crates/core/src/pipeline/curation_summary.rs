use std::collections::BTreeMap;

use crate::shared::rejection::Rejection;

/// Outcome counts of one run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CurationSummary {
    pub created: usize,
    pub matched: usize,
    /// Rejections keyed by [`Rejection::kind`].
    pub rejected: BTreeMap<&'static str, usize>,
    /// Identities in the database when the run ended.
    pub identities: usize,
}

impl CurationSummary {
    pub fn record_accepted(&mut self, created: bool) {
        if created {
            self.created += 1;
        } else {
            self.matched += 1;
        }
    }

    pub fn record_rejected(&mut self, rejection: &Rejection) {
        *self.rejected.entry(rejection.kind()).or_default() += 1;
    }

    pub fn accepted(&self) -> usize {
        self.created + self.matched
    }

    pub fn total_rejected(&self) -> usize {
        self.rejected.values().sum()
    }

    pub fn processed(&self) -> usize {
        self.accepted() + self.total_rejected()
    }

    pub fn rejected_of(&self, kind: &str) -> usize {
        self.rejected.get(kind).copied().unwrap_or(0)
    }
}
