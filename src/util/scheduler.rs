//! Drift-corrected fixed interval scheduler
//!
//! Ticks are scheduled against ideal boundaries `start + n * interval`
//! rather than `last tick + interval`, so time spent in the tick callback
//! and timer jitter do not accumulate. A tick that overruns its slot is
//! followed immediately by the next one until the schedule catches up.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// Bookkeeping of ideal tick boundaries
#[derive(Debug, Clone)]
pub struct DriftClock {
    interval: Duration,
    /// Set when the first tick begins
    start: Option<Instant>,
    total_ticks: u64,
    next: Option<Instant>,
}

impl DriftClock {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            start: None,
            total_ticks: 0,
            next: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Ticks completed so far
    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }

    /// When the next tick is due; `None` before the first tick
    pub fn deadline(&self) -> Option<Instant> {
        self.next
    }

    /// Mark the start of a tick
    pub fn begin(&mut self, now: Instant) {
        self.start.get_or_insert(now);
    }

    /// Mark the end of a tick at `now` and return the delay until the next
    /// one, zero if the callback overran.
    pub fn finish(&mut self, now: Instant) -> Duration {
        let start = *self.start.get_or_insert(now);
        let ideal = start + self.offset(self.total_ticks + 1);
        let delay = ideal.saturating_duration_since(now);

        self.total_ticks += 1;
        self.next = Some(now + delay);
        delay
    }

    fn offset(&self, ticks: u64) -> Duration {
        let nanos = self.interval.as_nanos().saturating_mul(u128::from(ticks));
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

/// Cancels a running [`Scheduler`]. Dropping it stops the scheduler too.
#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    /// Cancel the pending tick. A tick already running completes.
    pub fn stop(&self) {
        let _ = self.tx.send(true);
    }
}

/// Repeating timer driving the simulation
pub struct Scheduler {
    clock: DriftClock,
    stop_rx: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(interval: Duration) -> (Self, StopHandle) {
        let (tx, stop_rx) = watch::channel(false);
        let scheduler = Self {
            clock: DriftClock::new(interval),
            stop_rx,
        };
        (scheduler, StopHandle { tx })
    }

    pub fn clock(&self) -> &DriftClock {
        &self.clock
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop_rx.borrow()
    }

    /// Wait until the next tick is due. Returns false once stopped.
    ///
    /// Cancel safe: nothing is recorded until [`Scheduler::begin_tick`], so
    /// this can sit in a `select!` next to other event sources.
    pub async fn wait(&mut self) -> bool {
        if self.is_stopped() {
            return false;
        }
        let Some(deadline) = self.clock.deadline() else {
            return true;
        };

        tokio::select! {
            _ = sleep_until(deadline) => !self.is_stopped(),
            // Either a stop request or the handle was dropped
            _ = self.stop_rx.changed() => false,
        }
    }

    pub fn begin_tick(&mut self) {
        self.clock.begin(Instant::now());
    }

    /// Returns the delay until the next tick
    pub fn finish_tick(&mut self) -> Duration {
        let delay = self.clock.finish(Instant::now());
        if delay.is_zero() {
            debug!(tick = self.clock.total_ticks(), "Tick overran its slot, catching up");
        }
        delay
    }

    /// Invoke `on_tick` with the tick index until stopped
    pub async fn run<F>(mut self, mut on_tick: F)
    where
        F: FnMut(u64),
    {
        while self.wait().await {
            self.begin_tick();
            on_tick(self.clock.total_ticks());
            self.finish_tick();
        }
        debug!(ticks = self.clock.total_ticks(), "Scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use std::sync::{Arc, Mutex};

    const INTERVAL: Duration = Duration::from_millis(50);

    #[test]
    fn test_jitter_does_not_drift() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut clock = DriftClock::new(INTERVAL);
        let origin = Instant::now();
        let mut now = origin;
        let mut starts = Vec::new();

        for _ in 0..1000 {
            clock.begin(now);
            starts.push(now);
            // Callback takes up to half an interval
            now += Duration::from_micros(rng.gen_range(0..=25_000));
            now += clock.finish(now);
            // Timer wakes up late by up to a quarter interval
            now += Duration::from_micros(rng.gen_range(0..=12_500));
        }

        let span = starts[starts.len() - 1] - starts[0];
        let average = span / (starts.len() as u32 - 1);
        let error = average.as_secs_f64() - INTERVAL.as_secs_f64();
        assert!(error.abs() < 0.0001, "average period {:?}", average);
        assert_eq!(clock.total_ticks(), 1000);
    }

    #[test]
    fn test_overrun_catches_up() {
        let mut clock = DriftClock::new(INTERVAL);
        let start = Instant::now();

        clock.begin(start);
        // 2.5 intervals spent in the first callback
        let delay = clock.finish(start + INTERVAL * 5 / 2);
        assert_eq!(delay, Duration::ZERO);

        let now = start + INTERVAL * 5 / 2;
        clock.begin(now);
        assert_eq!(clock.finish(now), Duration::ZERO);

        clock.begin(now);
        assert_eq!(clock.finish(now), INTERVAL / 2);
        assert_eq!(clock.deadline(), Some(start + INTERVAL * 3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_on_boundaries() {
        let (scheduler, stop) = Scheduler::new(INTERVAL);
        let origin = Instant::now();
        let mut seen = Vec::new();

        scheduler
            .run(|tick| {
                seen.push((tick, Instant::now() - origin));
                if tick == 4 {
                    stop.stop();
                }
            })
            .await;

        let expected: Vec<(u64, Duration)> = (0..5).map(|n| (n, INTERVAL * n as u32)).collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_tick() {
        let (scheduler, stop) = Scheduler::new(INTERVAL);
        let count = Arc::new(Mutex::new(0u32));
        let counter = count.clone();

        let task = tokio::spawn(scheduler.run(move |_| *counter.lock().unwrap() += 1));

        tokio::time::sleep(Duration::from_millis(125)).await;
        stop.stop();
        task.await.unwrap();

        // Ticks at 0, 50 and 100 ms
        assert_eq!(*count.lock().unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_pending_until_stopped() {
        let (mut scheduler, stop) = Scheduler::new(INTERVAL);
        assert!(scheduler.wait().await);
        scheduler.begin_tick();
        assert_eq!(scheduler.finish_tick(), INTERVAL);

        let mut wait = tokio_test::task::spawn(scheduler.wait());
        tokio_test::assert_pending!(wait.poll());
        stop.stop();
        assert!(wait.is_woken());
        tokio_test::assert_ready_eq!(wait.poll(), false);
    }
}
