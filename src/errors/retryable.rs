//! Retry-classified error aggregation.

use std::fmt;
use std::time::Duration;

use super::{Error, Result};

/// Backoff applied when a referenced resource is missing or not yet admitted.
pub const REFERENCE_BACKOFF: Duration = Duration::from_secs(2);

/// Backoff applied to transient object store failures.
pub const STORE_BACKOFF: Duration = Duration::from_secs(5);

/// Backoff applied after losing an optimistic-concurrency race.
pub const CONFLICT_BACKOFF: Duration = Duration::from_secs(1);

/// A list of independent faults found in a single validation or reconcile pass.
///
/// The aggregate is retryable only when every member is retryable. A single
/// terminal member makes the whole aggregate terminal, since a requeue would
/// not fix it without a spec edit.
#[derive(Debug)]
pub struct ErrorAggregate {
    errors: Vec<Error>,
}

impl ErrorAggregate {
    /// Collapse `errors` into a result.
    ///
    /// Empty is `Ok`, a single error is returned as-is, and two or more are
    /// wrapped. Nested aggregates are flattened.
    pub fn maybe(errors: Vec<Error>) -> Result<()> {
        let mut flat = Vec::with_capacity(errors.len());
        for error in errors {
            match error {
                Error::Aggregate(inner) => flat.extend(inner.errors),
                other => flat.push(other),
            }
        }

        match flat.len() {
            0 => Ok(()),
            1 => Err(flat.remove(0)),
            _ => Err(Error::Aggregate(Self { errors: flat })),
        }
    }

    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn is_retryable(&self) -> bool {
        self.after().is_some()
    }

    /// Largest backoff across members, or `None` if any member is terminal.
    pub fn after(&self) -> Option<Duration> {
        let mut max = Duration::ZERO;
        for error in &self.errors {
            max = max.max(error.retry_after()?);
        }
        Some(max)
    }
}

impl fmt::Display for ErrorAggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.len() == 1 {
            return write!(f, "{}", self.errors[0]);
        }
        write!(f, "[")?;
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", error)?;
        }
        write!(f, "]")
    }
}

impl std::error::Error for ErrorAggregate {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_ok() {
        assert!(ErrorAggregate::maybe(Vec::new()).is_ok());
    }

    #[test]
    fn single_error_is_not_wrapped() {
        let err = ErrorAggregate::maybe(vec![Error::validation("bad")]).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn all_retryable_uses_max_backoff() {
        let err = ErrorAggregate::maybe(vec![
            Error::reference("Service", "default/a", "missing"),
            Error::store("timeout"),
        ])
        .unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(err.retry_after(), Some(STORE_BACKOFF));
    }

    #[test]
    fn terminal_member_makes_aggregate_terminal() {
        let err = ErrorAggregate::maybe(vec![
            Error::reference("Service", "default/a", "missing"),
            Error::validation("duplicate port 80"),
        ])
        .unwrap_err();

        assert!(!err.is_retryable());
        assert_eq!(err.retry_after(), None);
        assert_eq!(err.reason(), "Invalid");
    }

    #[test]
    fn nested_aggregates_are_flattened() {
        let inner = ErrorAggregate::maybe(vec![Error::validation("a"), Error::validation("b")])
            .unwrap_err();
        let err = ErrorAggregate::maybe(vec![inner, Error::validation("c")]).unwrap_err();

        match err {
            Error::Aggregate(agg) => assert_eq!(agg.len(), 3),
            other => panic!("expected aggregate, got {other:?}"),
        }
    }

    #[test]
    fn display_lists_every_member() {
        let err = ErrorAggregate::maybe(vec![Error::validation("a"), Error::validation("b")])
            .unwrap_err();
        assert_eq!(err.to_string(), "[Validation error: a, Validation error: b]");
    }
}
