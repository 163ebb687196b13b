//! The retransmission timer.
//!
//! A single logical one-shot per engine. Each arming spawns a sleep task
//! stamped with a fresh epoch; the expiry stimulus carries its epoch and is
//! discarded unless it matches the current one, so a cancelled or restarted
//! timer can never deliver a stale expiry. Delivery is at-least-once after
//! the deadline.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::engine::Stimulus;

pub(crate) struct FopTimer {
    t1_initial: Duration,
    epoch: u64,
    armed: bool,
    task: Option<JoinHandle<()>>,
    stimulus_tx: mpsc::UnboundedSender<Stimulus>,
}

impl FopTimer {
    pub fn new(t1_initial: Duration, stimulus_tx: mpsc::UnboundedSender<Stimulus>) -> Self {
        Self {
            t1_initial,
            epoch: 0,
            armed: false,
            task: None,
            stimulus_tx,
        }
    }

    pub fn set_initial(&mut self, t1_initial: Duration) {
        self.t1_initial = t1_initial;
    }

    pub fn initial(&self) -> Duration {
        self.t1_initial
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// (Re)arm the timer to T1 from now.
    pub fn restart(&mut self) {
        self.drop_task();
        self.epoch += 1;
        self.armed = true;
        let epoch = self.epoch;
        let t1 = self.t1_initial;
        let tx = self.stimulus_tx.clone();
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(t1).await;
            let _ = tx.send(Stimulus::TimerExpired { epoch: Some(epoch) });
        }));
        tracing::trace!(epoch, t1_secs = t1.as_secs_f64(), "timer restarted");
    }

    /// Disarm the timer. Idempotent.
    pub fn cancel(&mut self) {
        self.drop_task();
        self.epoch += 1;
        self.armed = false;
        tracing::trace!(epoch = self.epoch, "timer cancelled");
    }

    /// Whether an expiry stimulus should be acted on. `None` is an
    /// externally injected expiry, valid whenever the timer is armed.
    pub fn accepts(&self, epoch: Option<u64>) -> bool {
        self.armed && epoch.map_or(true, |e| e == self.epoch)
    }

    /// Mark the one-shot as consumed after a genuine expiry.
    pub fn disarm(&mut self) {
        self.armed = false;
        self.drop_task();
    }

    fn drop_task(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for FopTimer {
    fn drop(&mut self) {
        self.drop_task();
    }
}
