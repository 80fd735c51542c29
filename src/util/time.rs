//! Process uptime and tick budget measurement

use std::sync::OnceLock;
use std::time::{Duration, Instant};

static STARTED_AT: OnceLock<Instant> = OnceLock::new();

/// Record the process start. Later calls keep the first instant.
pub fn init_server_time() {
    STARTED_AT.get_or_init(Instant::now);
}

/// Whole seconds since [`init_server_time`], zero if it was never called
pub fn uptime_secs() -> u64 {
    STARTED_AT.get().map_or(0, |at| at.elapsed().as_secs())
}

/// Wall time spent on one tick, compared against the tick interval
#[derive(Debug, Clone, Copy)]
pub struct TickBudget {
    started: Instant,
    budget: Duration,
}

impl TickBudget {
    pub fn start(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time spent beyond the budget, if any
    pub fn overrun(&self) -> Option<Duration> {
        self.elapsed()
            .checked_sub(self.budget)
            .filter(|over| !over.is_zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uptime_starts_near_zero() {
        init_server_time();
        assert!(uptime_secs() < 5);
    }

    #[test]
    fn test_generous_budget_not_overrun() {
        let budget = TickBudget::start(Duration::from_secs(60));
        assert!(budget.overrun().is_none());

        let tight = TickBudget::start(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(2));
        assert!(tight.overrun().unwrap() >= Duration::from_millis(1));
    }
}
