//! Delayed-callback scheduling.
//!
//! The engine does not own an event loop. It asks a [`Scheduler`] for a
//! [`TimerToken`] and the host hands the token back when the timer fires.
//! Cancelling a token means a late delivery of it is simply ignored.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Handle for a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimerToken(pub u64);

impl fmt::Display for TimerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// One-shot and periodic timer registration.
pub trait Scheduler {
    /// Fire `token` once after `delay_ms`.
    fn schedule_once(&mut self, delay_ms: u64) -> TimerToken;

    /// Fire `token` every `interval_ms` until cancelled.
    fn schedule_repeating(&mut self, interval_ms: u64) -> TimerToken;

    /// Cancel a pending timer. Returns false if it was unknown or already fired.
    fn cancel(&mut self, token: TimerToken) -> bool;
}

#[derive(Debug, Clone, Copy)]
struct PendingTimer {
    due_ms: u64,
    interval_ms: Option<u64>,
}

/// A scheduler driven by an explicit virtual time, for tests and replays.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    now_ms: u64,
    next_id: u64,
    pending: BTreeMap<TimerToken, PendingTimer>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of timers still pending.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Whether `token` is still pending.
    pub fn is_pending(&self, token: TimerToken) -> bool {
        self.pending.contains_key(&token)
    }

    /// Advance virtual time and return every token that fired, in due order.
    ///
    /// A repeating timer fires once per elapsed interval.
    pub fn advance(&mut self, ms: u64) -> Vec<TimerToken> {
        let target = self.now_ms + ms;
        let mut fired = Vec::new();

        loop {
            let next = self
                .pending
                .iter()
                .filter(|(_, timer)| timer.due_ms <= target)
                .min_by_key(|(token, timer)| (timer.due_ms, **token))
                .map(|(token, timer)| (*token, *timer));

            let Some((token, timer)) = next else { break };
            self.now_ms = timer.due_ms;
            fired.push(token);

            match timer.interval_ms {
                Some(interval) => {
                    if let Some(entry) = self.pending.get_mut(&token) {
                        entry.due_ms += interval.max(1);
                    }
                }
                None => {
                    self.pending.remove(&token);
                }
            }
        }

        self.now_ms = target;
        fired
    }

    fn register(&mut self, delay_ms: u64, interval_ms: Option<u64>) -> TimerToken {
        self.next_id += 1;
        let token = TimerToken(self.next_id);
        self.pending.insert(
            token,
            PendingTimer {
                due_ms: self.now_ms + delay_ms,
                interval_ms,
            },
        );
        token
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_once(&mut self, delay_ms: u64) -> TimerToken {
        self.register(delay_ms, None)
    }

    fn schedule_repeating(&mut self, interval_ms: u64) -> TimerToken {
        self.register(interval_ms, Some(interval_ms))
    }

    fn cancel(&mut self, token: TimerToken) -> bool {
        self.pending.remove(&token).is_some()
    }
}
