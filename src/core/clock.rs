use crate::domain::model::ClockResponse;
use crate::domain::ports::SimultonInstance;
use std::time::Instant;

/// Clock counting simulated time.
///
/// Virtual time is `accumulated + (now - last_start) * rate` while running and
/// `accumulated` while paused. The wall clock is passed in by the caller.
#[derive(Debug, Clone)]
pub struct Clock {
    id: String,
    name: String,
    // 上次暫停前累積的模擬時間 (秒)
    accumulated: f64,
    last_start: Option<Instant>,
    rate: f64,
}

impl Clock {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            accumulated: 0.0,
            last_start: None,
            rate: 0.0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.last_start.is_some()
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Starts (or re-rates) the clock. A non-positive rate is ignored.
    pub fn on_running(&mut self, rate: f64, now: Instant) {
        if rate <= 0.0 {
            tracing::warn!("Clock {} ignoring non-positive rate {}", self.id, rate);
            return;
        }
        if self.last_start.is_some() {
            if rate == self.rate {
                return;
            }
            // 先用舊速率結算已經過的時間
            self.fold(now);
        }
        self.last_start = Some(now);
        self.rate = rate;
    }

    pub fn on_paused(&mut self, now: Instant) {
        if self.last_start.is_none() {
            return;
        }
        self.fold(now);
        self.last_start = None;
    }

    fn fold(&mut self, now: Instant) {
        self.accumulated = self.time(now);
    }

    pub fn time(&self, now: Instant) -> f64 {
        match self.last_start {
            Some(start) => {
                let wall = now.saturating_duration_since(start).as_secs_f64();
                self.accumulated + wall * self.rate
            }
            None => self.accumulated,
        }
    }

    pub fn to_response(&self, now: Instant) -> ClockResponse {
        ClockResponse {
            id: self.id.clone(),
            name: self.name.clone(),
            time: self.time(now),
        }
    }
}

impl SimultonInstance for Clock {
    fn on_running(&mut self, rate: f64, now: Instant) {
        Clock::on_running(self, rate, now);
    }

    fn on_paused(&mut self, now: Instant) {
        Clock::on_paused(self, now);
    }
}
