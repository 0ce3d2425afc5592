use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

/// At most one pending timer of one kind for one device.
///
/// Scheduling aborts the previous timer. Each fire carries the generation it
/// was armed with; a fire that was already queued when the timer got
/// re-armed or cancelled no longer matches and is dropped by
/// [`ScheduledTask::take_if_current`].
#[derive(Debug)]
pub struct ScheduledTask {
    label: &'static str,
    handle: Option<JoinHandle<()>>,
    generation: u64,
}

impl ScheduledTask {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            handle: None,
            generation: 0,
        }
    }

    /// Arm the timer, replacing any pending one. `make` builds the message
    /// delivered to `tx` on expiry from the new generation.
    pub fn schedule<M, F>(&mut self, delay: Duration, tx: &mpsc::Sender<M>, make: F) -> u64
    where
        M: Send + 'static,
        F: FnOnce(u64) -> M + Send + 'static,
    {
        self.abort();
        self.generation += 1;
        let generation = self.generation;
        let tx = tx.clone();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(make(generation)).await;
        }));
        trace!(timer = self.label, generation, ?delay, "timer armed");
        generation
    }

    /// Cancel the pending timer, if any. Returns whether one was armed.
    pub fn cancel(&mut self) -> bool {
        let armed = self.handle.is_some();
        self.abort();
        self.generation += 1;
        if armed {
            trace!(timer = self.label, "timer cancelled");
        }
        armed
    }

    /// Accept a fire: true only for the generation currently armed, which is then disarmed.
    pub fn take_if_current(&mut self, generation: u64) -> bool {
        if self.handle.is_some() && generation == self.generation {
            self.handle = None;
            true
        } else {
            trace!(timer = self.label, generation, current = self.generation, "stale fire ignored");
            false
        }
    }

    /// Whether a timer is armed and its fire has not been accepted yet.
    pub fn is_pending(&self) -> bool {
        self.handle.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn abort(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn rescheduling_replaces_the_pending_timer() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut task = ScheduledTask::new("poll");
        let first = task.schedule(Duration::from_secs(20), &tx, |g| g);
        let second = task.schedule(Duration::from_secs(2), &tx, |g| g);
        assert_ne!(first, second);
        assert!(task.is_pending());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(rx.try_recv().ok(), Some(second));
        assert!(rx.try_recv().is_err());
        assert!(!task.take_if_current(first));
        assert!(task.take_if_current(second));
        assert!(!task.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn queued_fire_is_stale_after_cancel() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut task = ScheduledTask::new("reconnect");
        let gen = task.schedule(Duration::from_secs(10), &tx, |g| g);
        tokio::time::sleep(Duration::from_secs(11)).await;
        let fired = rx.recv().await.unwrap();
        assert_eq!(fired, gen);

        assert!(task.cancel());
        assert!(!task.take_if_current(fired));
        assert!(!task.cancel());
    }
}
