use thiserror::Error;

/// A single candidate address failed to load or settle within its timeouts.
///
/// Recovered locally by the acquisition loop: the next candidate is tried,
/// and only the last one of these survives into the terminal error.
#[derive(Debug, Error)]
#[error("navigation to {url} failed: {reason}")]
pub struct NavigationError {
    pub url: String,
    pub reason: String,
}

impl NavigationError {
    pub fn new(url: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

/// Every candidate address was tried and none produced a document.
///
/// Carries the last candidate's failure as its source so the HTTP layer can
/// report a concrete cause.
#[derive(Debug, Error)]
#[error("failed to load site after {attempts} candidate attempt(s): {last}")]
pub struct AcquisitionError {
    pub attempts: usize,
    #[source]
    pub last: NavigationError,
}
