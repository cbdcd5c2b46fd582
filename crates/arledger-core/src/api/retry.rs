//! Recovery policy for rejected access tokens.

use crate::error::{Error, Result};

/// Limits on recovering one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Consecutive refreshes before escalating to a full reauthorization.
    pub max_refreshes: u32,
    /// Sends allowed over the whole request, never reset.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_refreshes: 5,
            max_attempts: 20,
        }
    }
}

/// Next step after the API rejects the access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Exchange the refresh token for a new pair.
    Refresh,
    /// Run the interactive authorization again.
    Reauthorize,
}

/// Counters for one logical request.
#[derive(Debug, Clone)]
pub struct RetryCounter {
    policy: RetryPolicy,
    attempts: u32,
    refreshes: u32,
    total_refreshes: u32,
    reauthorizations: u32,
}

impl RetryCounter {
    /// Starts a fresh counter.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            refreshes: 0,
            total_refreshes: 0,
            reauthorizations: 0,
        }
    }

    /// Counts one send.
    ///
    /// # Errors
    ///
    /// Returns `Error::RetryBudgetExhausted` once the lifetime budget is spent.
    pub fn record_attempt(&mut self) -> Result<()> {
        if self.attempts >= self.policy.max_attempts {
            return Err(Error::RetryBudgetExhausted(self.attempts));
        }
        self.attempts += 1;
        Ok(())
    }

    /// Decides how to recover from a rejected token and records the choice.
    ///
    /// Refreshes until `max_refreshes` consecutive refreshes have failed to
    /// help, then asks for a reauthorization and starts counting again.
    pub const fn next_recovery(&mut self) -> Recovery {
        if self.refreshes >= self.policy.max_refreshes {
            self.record_reauthorization();
            Recovery::Reauthorize
        } else {
            self.refreshes += 1;
            self.total_refreshes += 1;
            Recovery::Refresh
        }
    }

    /// Records a reauthorization forced by a failed refresh.
    pub const fn escalate(&mut self) {
        self.record_reauthorization();
    }

    const fn record_reauthorization(&mut self) {
        self.refreshes = 0;
        self.reauthorizations += 1;
    }

    /// Sends so far.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Refreshes since the last reauthorization.
    #[must_use]
    pub const fn refreshes(&self) -> u32 {
        self.refreshes
    }

    /// Refreshes over the whole request.
    #[must_use]
    pub const fn total_refreshes(&self) -> u32 {
        self.total_refreshes
    }

    /// Reauthorizations over the whole request.
    #[must_use]
    pub const fn reauthorizations(&self) -> u32 {
        self.reauthorizations
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_five_refreshes_then_reauthorize() {
        let mut counter = RetryCounter::new(RetryPolicy::default());
        for expected in 1..=5 {
            assert_eq!(counter.next_recovery(), Recovery::Refresh);
            assert_eq!(counter.refreshes(), expected);
        }

        assert_eq!(counter.next_recovery(), Recovery::Reauthorize);
        assert_eq!(counter.refreshes(), 0);
        assert_eq!(counter.reauthorizations(), 1);

        assert_eq!(counter.next_recovery(), Recovery::Refresh);
        assert_eq!(counter.total_refreshes(), 6);
    }

    #[test]
    fn test_escalation_resets_refresh_count() {
        let mut counter = RetryCounter::new(RetryPolicy::default());
        counter.next_recovery();
        counter.next_recovery();
        counter.escalate();
        assert_eq!(counter.refreshes(), 0);
        assert_eq!(counter.reauthorizations(), 1);
        assert_eq!(counter.total_refreshes(), 2);
    }

    #[test]
    fn test_attempt_budget_survives_reauthorization() {
        let policy = RetryPolicy {
            max_refreshes: 1,
            max_attempts: 3,
        };
        let mut counter = RetryCounter::new(policy);

        counter.record_attempt().unwrap();
        counter.next_recovery();
        counter.record_attempt().unwrap();
        assert_eq!(counter.next_recovery(), Recovery::Reauthorize);
        counter.record_attempt().unwrap();

        let err = counter.record_attempt().unwrap_err();
        assert!(matches!(err, Error::RetryBudgetExhausted(3)));
        assert_eq!(counter.attempts(), 3);
    }
}
