//! Background tasks driving a [`StatsProcessor`].
//!
//! The cycle task runs the nearby computation on a fixed cadence. Deadlines
//! advance by whole intervals from an aligned start, so a slow cycle skips
//! ticks instead of drifting. A failing cycle is retried with exponential
//! backoff. The GC task sweeps idle athletes on its own coarse interval.

use crate::error::{CycleError, EngineError};
use crate::processor::StatsProcessor;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Logs a message at most once per window, counting the repeats in between.
#[derive(Debug)]
pub struct ErrorThrottle {
    window: Duration,
    seen: HashMap<String, (Instant, u64)>,
}

impl ErrorThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: HashMap::new(),
        }
    }

    /// Report an error at `now`. Returns true if it was logged.
    pub fn report(&mut self, message: &str, now: Instant) -> bool {
        match self.seen.get_mut(message) {
            Some((last, suppressed)) if now.duration_since(*last) < self.window => {
                *suppressed += 1;
                false
            }
            Some((last, suppressed)) => {
                tracing::error!("Stats cycle failed: {} ({} repeats suppressed)", message, suppressed);
                *last = now;
                *suppressed = 0;
                true
            }
            None => {
                tracing::error!("Stats cycle failed: {}", message);
                self.seen.insert(message.to_string(), (now, 0));
                true
            }
        }
    }
}

/// Delay added after `failures` consecutive failed cycles.
pub fn backoff_delay(interval: Duration, failures: u32, max: Duration) -> Duration {
    let factor = 2u32.saturating_pow(failures.min(16));
    interval.saturating_mul(factor).min(max)
}

/// Owns a shared processor and its background tasks.
pub struct StatsEngine {
    processor: Arc<Mutex<StatsProcessor>>,
    running: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl StatsEngine {
    pub fn new(processor: StatsProcessor) -> Self {
        Self {
            processor: Arc::new(Mutex::new(processor)),
            running: Arc::new(AtomicBool::new(false)),
            tasks: Vec::new(),
        }
    }

    /// Shared handle to the processor.
    pub fn processor(&self) -> Arc<Mutex<StatsProcessor>> {
        Arc::clone(&self.processor)
    }

    /// Lock the processor for queries or commands.
    pub fn lock(&self) -> MutexGuard<'_, StatsProcessor> {
        lock(&self.processor)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn the cycle and GC tasks on the current tokio runtime.
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(EngineError::AlreadyRunning);
        }
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| EngineError::NoRuntime(e.to_string()))?;
        self.running.store(true, Ordering::SeqCst);

        let config = self.lock().config().clone();
        tracing::info!(
            "Starting stats engine (cycle {}ms, gc {}s)",
            config.nearby.interval_ms,
            config.registry.gc_interval_secs
        );

        let interval = Duration::from_millis(config.nearby.interval_ms.max(1));
        let max_backoff = Duration::from_secs(config.cycle.max_backoff_secs);
        let throttle_window = Duration::from_secs(config.cycle.error_throttle_secs);
        let processor = Arc::clone(&self.processor);
        let running = Arc::clone(&self.running);
        self.tasks.push(handle.spawn(async move {
            cycle_loop(processor, running, interval, max_backoff, throttle_window).await;
        }));

        let gc_interval = Duration::from_secs(config.registry.gc_interval_secs.max(1));
        let processor = Arc::clone(&self.processor);
        let running = Arc::clone(&self.running);
        self.tasks.push(handle.spawn(async move {
            let mut ticker = tokio::time::interval(gc_interval);
            ticker.tick().await;
            while running.load(Ordering::SeqCst) {
                ticker.tick().await;
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                let removed = lock(&processor).gc_athlete_data();
                if !removed.is_empty() {
                    tracing::debug!("GC removed {} idle athletes", removed.len());
                }
            }
        }));

        Ok(())
    }

    /// Stop the background tasks.
    pub fn stop(&mut self) {
        if self.running.swap(false, Ordering::SeqCst) {
            tracing::info!("Stopping stats engine");
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for StatsEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock(processor: &Mutex<StatsProcessor>) -> MutexGuard<'_, StatsProcessor> {
    processor.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn cycle_loop(
    processor: Arc<Mutex<StatsProcessor>>,
    running: Arc<AtomicBool>,
    interval: Duration,
    max_backoff: Duration,
    throttle_window: Duration,
) {
    let mut throttle = ErrorThrottle::new(throttle_window);
    let mut failures: u32 = 0;

    // Align the first deadline to a whole interval of engine time.
    let interval_secs = interval.as_secs_f64();
    let into_interval = lock(&processor).now() % interval_secs;
    let mut target = Instant::now() - Duration::from_secs_f64(into_interval);

    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        target += interval;
        let mut skipped = 0u64;
        while now > target {
            target += interval;
            skipped += 1;
        }
        if skipped > 0 {
            tracing::warn!("Stats cycle skipped: {}", skipped);
        }
        tokio::time::sleep_until(target).await;
        if !running.load(Ordering::SeqCst) {
            break;
        }

        let result = {
            let mut guard = lock(&processor);
            if guard.watching().is_none() {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| guard.run_cycle())) {
                Ok(result) => result,
                Err(payload) => Err(CycleError::Panicked(panic_message(payload.as_ref()))),
            }
        };

        match result {
            Ok(()) => failures = 0,
            Err(e) => {
                throttle.report(&e.to_string(), Instant::now());
                failures = failures.saturating_add(1);
                target += backoff_delay(interval, failures, max_backoff);
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
