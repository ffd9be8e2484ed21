use std::time::Duration;

use crate::client::CloseReason;

/// What to do after the client reports `closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    RetryAfter(Duration),
    Stop,
}

/// Fixed-delay reconnect with a single terminal reason.
///
/// Every close other than an explicit logout is treated as transient: the
/// stored credentials are still valid, so the same session is resumed after
/// `delay`. There is no attempt limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(3))
    }
}

impl ReconnectPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn decide(&self, reason: &CloseReason) -> ReconnectDecision {
        if reason.is_terminal() {
            ReconnectDecision::Stop
        } else {
            ReconnectDecision::RetryAfter(self.delay)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logout_stops() {
        let policy = ReconnectPolicy::default();
        assert_eq!(
            policy.decide(&CloseReason::LoggedOut),
            ReconnectDecision::Stop
        );
    }

    #[test]
    fn everything_else_retries_with_fixed_delay() {
        let policy = ReconnectPolicy::fixed(Duration::from_millis(250));
        let reasons = [
            CloseReason::ConnectionClosed,
            CloseReason::ConnectionLost,
            CloseReason::ConnectionReplaced,
            CloseReason::RestartRequired,
            CloseReason::BadSession,
            CloseReason::Other {
                code: None,
                message: "stream error".into(),
            },
        ];
        for reason in &reasons {
            // Repeated failures never change the answer.
            for _ in 0..3 {
                assert_eq!(
                    policy.decide(reason),
                    ReconnectDecision::RetryAfter(Duration::from_millis(250)),
                    "{reason}"
                );
            }
        }
    }
}
