use thiserror::Error;

/// A failure reported by an upstream client. Clients convert their own
/// transport and status errors into this type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    #[error("upstream responded with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("upstream request failed: {0}")]
    Transport(String),
}

/// Why a single key failed to resolve. A failed batch call is attributed to
/// every key resolved against that batch, so this type is cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("column {column_id:?} does not exist for machine {machine_id:?}")]
    ColumnNotFound {
        column_id: String,
        machine_id: String,
    },

    #[error("no metadata matching {lookup_value:?} for machine {machine_id:?}")]
    MetadataNotFound {
        lookup_value: String,
        machine_id: String,
    },

    #[error("request was cancelled")]
    Cancelled,
}

/// The result of one key: a value, an explicit absence, or a failure.
/// Absence is not an error; a grouped sum with no matching group resolves
/// to `Missing` without any call failing.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<V> {
    Value(V),
    Missing,
    Failed(LoadError),
}

impl<V> Outcome<V> {
    #[inline]
    pub fn is_value(&self) -> bool {
        matches!(self, Outcome::Value(..))
    }

    #[inline]
    pub fn is_missing(&self) -> bool {
        matches!(self, Outcome::Missing)
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(..))
    }

    pub fn value(&self) -> Option<&V> {
        match self {
            Outcome::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&LoadError> {
        match self {
            Outcome::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Convert into the `(value, failure)` shape: `Ok(Some(..))` for a value,
    /// `Ok(None)` for an absence, `Err(..)` for a failure. The caller decides
    /// whether an absence is worth surfacing.
    pub fn into_result(self) -> Result<Option<V>, LoadError> {
        match self {
            Outcome::Value(value) => Ok(Some(value)),
            Outcome::Missing => Ok(None),
            Outcome::Failed(err) => Err(err),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(V) -> U) -> Outcome<U> {
        match self {
            Outcome::Value(value) => Outcome::Value(f(value)),
            Outcome::Missing => Outcome::Missing,
            Outcome::Failed(err) => Outcome::Failed(err),
        }
    }
}

impl<V> From<Result<Option<V>, UpstreamError>> for Outcome<V> {
    fn from(result: Result<Option<V>, UpstreamError>) -> Self {
        match result {
            Ok(Some(value)) => Outcome::Value(value),
            Ok(None) => Outcome::Missing,
            Err(err) => Outcome::Failed(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn into_result_keeps_absence_and_failure_apart() {
        assert_eq!(Outcome::Value(3).into_result(), Ok(Some(3)));
        assert_eq!(Outcome::<i32>::Missing.into_result(), Ok(None));
        assert_eq!(
            Outcome::<i32>::Failed(LoadError::Cancelled).into_result(),
            Err(LoadError::Cancelled)
        );
    }

    #[test]
    fn upstream_errors_convert() {
        let outcome: Outcome<i32> = Err(UpstreamError::Status {
            status: 503,
            message: "unavailable".into(),
        })
        .into();

        assert_eq!(
            outcome.error().map(ToString::to_string).as_deref(),
            Some("upstream responded with status 503: unavailable")
        );
    }
}
