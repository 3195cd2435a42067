//! Optimistic concurrency expectations for versioned records.

use crate::error::{DomainError, DomainResult};

/// Optimistic concurrency expectation for a record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ExpectedVersion {
    /// Skip version checking (last writer wins).
    #[default]
    Any,
    /// Require the record to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual})"
            )))
        }
    }
}

impl From<Option<u64>> for ExpectedVersion {
    fn from(value: Option<u64>) -> Self {
        value.map_or(ExpectedVersion::Any, ExpectedVersion::Exact)
    }
}
