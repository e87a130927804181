//! Fixed-rate tick pacing with sleep compensation
//!
//! A zone pool measures the real time between the starts of two
//! consecutive ticks and asks the pacer how long to sleep before the next
//! one. Time left over from a short tick is carried into the next budget,
//! so the average tick period converges on the nominal interval even when
//! individual ticks take uneven amounts of work. A tick that blows its
//! budget is reported as an overrun and the carry is reset, which stops a
//! single slow tick from compressing the ticks that follow it.

use std::time::Duration;

/// Default tick rate of a zone pool, in ticks per second
pub const TICK_RATE: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickPacer {
    interval: Duration,
    carry: Duration,
}

impl TickPacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            carry: Duration::ZERO,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sleep credit carried into the next budget
    pub fn carry(&self) -> Duration {
        self.carry
    }

    /// Computes the sleep before the next tick
    ///
    /// `elapsed` is the time since the start of the previous tick. Returns
    /// `None` when the tick overran its budget; the caller should start the
    /// next tick immediately.
    pub fn next_sleep(&mut self, elapsed: Duration) -> Option<Duration> {
        let budget = self.interval + self.carry;
        match budget.checked_sub(elapsed) {
            Some(remaining) => {
                self.carry = remaining;
                Some(remaining)
            }
            None => {
                self.carry = Duration::ZERO;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn test_short_tick_sleeps_remainder() {
        let mut pacer = TickPacer::new(50 * MS);
        assert_eq!(pacer.next_sleep(10 * MS), Some(40 * MS));
        assert_eq!(pacer.carry(), 40 * MS);
    }

    #[test]
    fn test_overrun_resets_carry() {
        let mut pacer = TickPacer::new(50 * MS);
        pacer.next_sleep(20 * MS);
        assert_eq!(pacer.carry(), 30 * MS);

        // 90ms against a budget of 80ms
        assert_eq!(pacer.next_sleep(90 * MS), None);
        assert_eq!(pacer.carry(), Duration::ZERO);

        // Next budget is the bare interval again
        assert_eq!(pacer.next_sleep(60 * MS), None);
        assert_eq!(pacer.next_sleep(50 * MS), Some(Duration::ZERO));
    }

    #[test]
    fn test_exact_budget_is_not_an_overrun() {
        let mut pacer = TickPacer::new(50 * MS);
        assert_eq!(pacer.next_sleep(50 * MS), Some(Duration::ZERO));
    }

    /// Drives the pacer as the zone pool loop does, with simulated work
    /// alternating between 10ms and 45ms, and checks the average period
    /// between tick starts.
    #[test]
    fn test_average_period_converges_on_interval() {
        let interval = 50 * MS;
        let mut pacer = TickPacer::new(interval);
        let work = [10 * MS, 45 * MS];

        // The first tick is measured from startup with no prior sleep
        let mut elapsed = work[0];
        let mut total = Duration::ZERO;
        let ticks = 100;

        for tick in 0..ticks {
            let sleep = pacer.next_sleep(elapsed).unwrap_or(Duration::ZERO);
            // Time from this tick start to the next one: this tick's work
            // plus the sleep that follows it
            elapsed = work[tick % 2] + sleep;
            total += elapsed;
        }

        let average_ms = total.as_secs_f64() * 1000.0 / ticks as f64;
        assert_approx_eq!(average_ms, 50.0, 1.0);
    }
}
