//! Fixed-interval repeating timer used to gate listener creation on
//! activation status (component G).
//!
//! Grounded on the teacher's `flux_timing::Repeater`, reimplemented over
//! `std::time::Instant` rather than the teacher's TSC-calibrated clock: that
//! clock is built for sub-microsecond trading-loop measurements, which is the
//! wrong tool for a multi-second firmware heartbeat. The `fired`/`reset`/
//! `force_fire` surface is kept identical.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct Repeater {
    interval: Duration,
    last_acted: Option<Instant>,
}

impl Repeater {
    pub fn every(interval: Duration) -> Self {
        Self { interval, last_acted: None }
    }

    /// Returns `true` at most once per `interval`, resetting the clock each
    /// time it fires.
    pub fn fired(&mut self) -> bool {
        match self.last_acted {
            None => {
                self.last_acted = Some(Instant::now());
                true
            }
            Some(last) if last.elapsed() >= self.interval => {
                self.last_acted = Some(Instant::now());
                true
            }
            Some(_) => false,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn reset(&mut self) {
        self.last_acted = Some(Instant::now());
    }

    /// Force the next `fired()` call to return `true` regardless of elapsed
    /// time.
    pub fn force_fire(&mut self) {
        self.last_acted = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_immediately_on_first_call() {
        let mut r = Repeater::every(Duration::from_secs(2));
        assert!(r.fired());
        assert!(!r.fired());
    }

    #[test]
    fn force_fire_makes_the_next_call_fire() {
        let mut r = Repeater::every(Duration::from_secs(2));
        assert!(r.fired());
        r.force_fire();
        assert!(r.fired());
    }
}
