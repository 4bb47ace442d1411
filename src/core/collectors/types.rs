use super::error::CollectorError;

/// A convenient type alias for results returned by collectors.
///
/// Running a command, talking to a service, parsing its reply or naming the
/// resulting metrics can all fail; the error type is always our
/// domain-specific `CollectorError`.
pub type CollectorResult<T> = std::result::Result<T, CollectorError>;
