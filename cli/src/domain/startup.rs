//! Bounded wait for a cold-starting agent.
//!
//! The wait is a counter plus the last observed runtime; the caller owns the
//! timer and sleeps one interval before every poll.

use std::time::Duration;

use dispatch_common::{AgentRuntime, RuntimeState};

/// How long a request may wait for its agent to come up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            interval: Duration::from_secs(1),
        }
    }
}

impl WaitPolicy {
    /// Upper bound of the added latency.
    #[must_use]
    pub fn budget(&self) -> Duration {
        self.interval * self.attempts
    }
}

/// What to do after a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStep {
    Forward(u16),
    Retry,
    /// Budget spent and still not running.
    Exhausted,
    /// The start failed; no point waiting further.
    Failed,
}

/// Pure transition: `polls` is the number of polls made including this one.
#[must_use]
pub fn next_step(policy: &WaitPolicy, polls: u32, observed: &AgentRuntime) -> WaitStep {
    if let Some(port) = observed.running_port() {
        return WaitStep::Forward(port);
    }
    if observed.state == RuntimeState::Failed {
        return WaitStep::Failed;
    }
    if polls >= policy.attempts {
        WaitStep::Exhausted
    } else {
        WaitStep::Retry
    }
}

#[derive(Debug, Clone)]
pub struct StartupWait {
    policy: WaitPolicy,
    polls: u32,
}

impl StartupWait {
    #[must_use]
    pub fn new(policy: WaitPolicy) -> Self {
        Self { policy, polls: 0 }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.policy.interval
    }

    #[must_use]
    pub fn polls(&self) -> u32 {
        self.polls
    }

    /// `true` once no poll is left. A zero-attempt policy starts exhausted.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.polls >= self.policy.attempts
    }

    /// Records one poll result.
    pub fn observe(&mut self, observed: &AgentRuntime) -> WaitStep {
        self.polls = self.polls.saturating_add(1);
        next_step(&self.policy, self.polls, observed)
    }
}
