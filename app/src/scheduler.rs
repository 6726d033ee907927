//! Timers on the tokio runtime.
//!
//! Each timer is a spawned task that sleeps and then sends its token down a
//! channel; the game loop receives fired tokens alongside terminal input.

use hexmemo_engine::{Scheduler, TimerToken};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub struct TokioScheduler {
    next_id: u64,
    tx: mpsc::UnboundedSender<TimerToken>,
    tasks: HashMap<TimerToken, JoinHandle<()>>,
}

impl TokioScheduler {
    /// Create a scheduler and the receiver its timers fire into.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerToken>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            next_id: 0,
            tx,
            tasks: HashMap::new(),
        };
        (scheduler, rx)
    }

    fn next_token(&mut self) -> TimerToken {
        self.next_id += 1;
        TimerToken(self.next_id)
    }

    /// Drop bookkeeping for a one-shot timer that has fired.
    pub fn fired(&mut self, token: TimerToken) {
        if self.tasks.get(&token).is_some_and(JoinHandle::is_finished) {
            self.tasks.remove(&token);
        }
    }

    pub fn pending_count(&self) -> usize {
        self.tasks.values().filter(|task| !task.is_finished()).count()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_once(&mut self, delay_ms: u64) -> TimerToken {
        let token = self.next_token();
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            let _ = tx.send(token);
        });
        self.tasks.insert(token, task);
        token
    }

    fn schedule_repeating(&mut self, interval_ms: u64) -> TimerToken {
        let token = self.next_token();
        let tx = self.tx.clone();
        let period = Duration::from_millis(interval_ms.max(1));
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                interval.tick().await;
                if tx.send(token).is_err() {
                    break;
                }
            }
        });
        self.tasks.insert(token, task);
        token
    }

    fn cancel(&mut self, token: TimerToken) -> bool {
        match self.tasks.remove(&token) {
            Some(task) => {
                let live = !task.is_finished();
                task.abort();
                tracing::trace!(%token, live, "timer cancelled");
                live
            }
            None => false,
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for task in self.tasks.values() {
            task.abort();
        }
    }
}
