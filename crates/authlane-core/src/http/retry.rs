/// Per-attempt retry mark.
///
/// Travels with a single logical request through the client. A request that
/// already went through a refresh is no longer eligible, which bounds every
/// request to one replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Attempt {
    retried: bool,
}

impl Attempt {
    /// The first dispatch of a request.
    pub fn first() -> Self {
        Self::default()
    }

    pub fn is_retry_eligible(self) -> bool {
        !self.retried
    }

    #[must_use]
    pub fn mark_retried(self) -> Self {
        Self { retried: true }
    }
}
