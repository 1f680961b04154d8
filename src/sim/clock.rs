use chrono::{DateTime, TimeDelta, Utc};

/// A simulation clock that tracks control steps and their wall-clock
/// timestamps.
///
/// # Examples
///
/// ```
/// use agent_rtc::sim::clock::StepClock;
/// use chrono::DateTime;
///
/// let mut clock = StepClock::new(DateTime::UNIX_EPOCH, 900.0, 3);
/// let mut steps = Vec::new();
///
/// clock.run(|step, _| steps.push(step));
/// assert_eq!(steps, vec![0, 1, 2]);
/// ```
#[derive(Debug, Clone)]
pub struct StepClock {
    /// Timestamp of step 0
    start: DateTime<Utc>,
    /// Step length in seconds
    step_seconds: f64,
    /// Current step of the simulation
    current: usize,
    /// Total steps to run in the simulation
    total: usize,
}

impl StepClock {
    /// Creates a new clock.
    ///
    /// # Arguments
    ///
    /// * `start` - Timestamp of the first step
    /// * `step_seconds` - Length of one control step
    /// * `total` - The total number of steps the clock will run
    pub fn new(start: DateTime<Utc>, step_seconds: f64, total: usize) -> Self {
        Self {
            start,
            step_seconds,
            current: 0,
            total,
        }
    }

    /// Timestamp at which `step` begins.
    pub fn timestamp(&self, step: usize) -> DateTime<Utc> {
        let millis = (step as f64 * self.step_seconds * 1000.0).round() as i64;
        self.start + TimeDelta::milliseconds(millis)
    }

    /// Advances the clock by one step.
    ///
    /// # Returns
    ///
    /// * `Some((step, timestamp))` - The step before advancing and its start time
    /// * `None` - If the clock has reached its total steps
    pub fn tick(&mut self) -> Option<(usize, DateTime<Utc>)> {
        if self.current < self.total {
            let step = self.current;
            self.current += 1;
            Some((step, self.timestamp(step)))
        } else {
            None
        }
    }

    /// Runs a function for each remaining step in the clock.
    pub fn run(&mut self, mut f: impl FnMut(usize, DateTime<Utc>)) {
        while let Some((step, ts)) = self.tick() {
            f(step, ts);
        }
    }
}
