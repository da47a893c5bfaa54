use std::time::{Duration, Instant};

/// Measures the round-trip delay between a parameter set leaving and its aggregate arriving.
#[derive(Debug, Default, Clone)]
pub struct DelayProbe {
    sent_at: Option<Instant>,
}

impl DelayProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the moment the last unit of a parameter set was sent.
    #[inline]
    pub fn mark_sent(&mut self, at: Instant) {
        self.sent_at = Some(at);
    }

    /// Records the arrival of an aggregated result and consumes the pending send timestamp.
    ///
    /// # Returns
    /// The elapsed time since the matching send, or `None` if nothing was pending.
    pub fn mark_received(&mut self, at: Instant) -> Option<Duration> {
        self.sent_at
            .take()
            .map(|sent_at| at.saturating_duration_since(sent_at))
    }

    /// Whether a send timestamp is waiting for its aggregate.
    pub fn is_pending(&self) -> bool {
        self.sent_at.is_some()
    }
}
