use crate::stack::TimeSource;

/// A simulated wall clock counting whole seconds over a fixed run length.
///
/// `current_time` reports the second the simulation is in; `tick` moves to
/// the next one.
///
/// # Examples
///
/// ```
/// use drlc_client::sim::clock::SimClock;
/// use drlc_client::stack::TimeSource;
///
/// let mut clock = SimClock::new(1_000, 3);
/// let mut seen = Vec::new();
///
/// clock.run(|now| seen.push(now));
/// assert_eq!(seen, vec![1_001, 1_002, 1_003]);
/// assert_eq!(clock.current_time(), 1_003);
/// ```
#[derive(Debug, Clone)]
pub struct SimClock {
    /// Current second since epoch
    current: u32,
    /// Seconds left to run
    remaining: u32,
}

impl SimClock {
    /// Creates a clock at `start_time` that can advance `seconds` times.
    ///
    /// # Arguments
    ///
    /// * `start_time` - Seconds since epoch at the beginning of the run
    /// * `seconds` - Number of one-second ticks before the clock is exhausted
    pub fn new(start_time: u32, seconds: u32) -> Self {
        Self {
            current: start_time,
            remaining: seconds,
        }
    }

    /// Advances the clock by one second.
    ///
    /// # Returns
    ///
    /// * `Some(now)` - The new current time
    /// * `None` - If the run length is exhausted or the time would overflow
    pub fn tick(&mut self) -> Option<u32> {
        if self.remaining == 0 {
            return None;
        }
        let next = self.current.checked_add(1)?;
        self.remaining -= 1;
        self.current = next;
        Some(next)
    }

    /// Calls `f` with the new time for each remaining second.
    pub fn run(&mut self, mut f: impl FnMut(u32)) {
        while let Some(now) = self.tick() {
            f(now);
        }
    }

    /// Seconds left before the clock is exhausted.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}

impl TimeSource for SimClock {
    fn current_time(&self) -> u32 {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_clock() {
        let clock = SimClock::new(500, 5);
        assert_eq!(clock.current_time(), 500);
        assert_eq!(clock.remaining(), 5);
    }

    #[test]
    fn test_tick() {
        let mut clock = SimClock::new(10, 2);
        assert_eq!(clock.tick(), Some(11));
        assert_eq!(clock.tick(), Some(12));
        assert_eq!(clock.tick(), None);
        assert_eq!(clock.current_time(), 12);
    }

    #[test]
    fn test_empty_clock() {
        let mut clock = SimClock::new(0, 0);
        assert_eq!(clock.tick(), None);

        let mut was_called = false;
        clock.run(|_| was_called = true);
        assert!(!was_called);
    }

    #[test]
    fn stops_before_overflow() {
        let mut clock = SimClock::new(u32::MAX - 1, 10);
        assert_eq!(clock.tick(), Some(u32::MAX));
        assert_eq!(clock.tick(), None);
    }
}
