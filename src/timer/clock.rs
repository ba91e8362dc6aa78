use std::sync::{Arc, Mutex, PoisonError};

use tokio::{
    task::JoinHandle,
    time::{self, Duration, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

/// Whole-second counter driven by a tokio interval.
///
/// The count only changes through ticks or an explicit [`Clock::set`];
/// stopping and restarting resumes from the current value.
pub struct Clock {
    count: Arc<Mutex<u64>>,
    interval: Duration,
    running: Option<Ticker>,
}

struct Ticker {
    cancel: CancellationToken,
    _handle: JoinHandle<()>,
}

impl Clock {
    pub fn new(interval: Duration) -> Self {
        Self::with_initial(interval, 0)
    }

    pub fn with_initial(interval: Duration, initial: u64) -> Self {
        Self {
            count: Arc::new(Mutex::new(initial)),
            interval,
            running: None,
        }
    }

    pub fn count(&self) -> u64 {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Overwrites the count. Used when the session adopts a stored value.
    pub fn set(&self, seconds: u64) {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner) = seconds;
    }

    /// Starts ticking; `on_tick` receives the new cumulative count once per
    /// interval. Must be called inside a tokio runtime. No-op while running.
    pub fn start<F>(&mut self, mut on_tick: F)
    where
        F: FnMut(u64) + Send + 'static,
    {
        if self.running.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let count = self.count.clone();
        let interval = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let value = {
                            let mut guard = count.lock().unwrap_or_else(PoisonError::into_inner);
                            // stop() cancels before reading the count, so checking under
                            // the lock keeps the returned final value exact.
                            if token.is_cancelled() {
                                break;
                            }
                            *guard = guard.saturating_add(1);
                            *guard
                        };
                        on_tick(value);
                    }
                }
            }
        });

        self.running = Some(Ticker {
            cancel,
            _handle: handle,
        });
    }

    /// Halts ticking and returns the final count. No-op when not running.
    pub fn stop(&mut self) -> u64 {
        if let Some(ticker) = self.running.take() {
            ticker.cancel.cancel();
        }
        self.count()
    }
}

impl Drop for Clock {
    fn drop(&mut self) {
        if let Some(ticker) = self.running.take() {
            ticker.cancel.cancel();
        }
    }
}
