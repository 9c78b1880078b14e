use crate::domain::model::{SimultonKind, SimultonRequest, SimultonResponse, SimultonState};
use crate::domain::ports::SimultonInstance;
use crate::utils::error::{Result, SimError};
use crate::utils::validation::validate_rate;
use rand::Rng;
use std::collections::BTreeMap;
use std::time::Instant;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Instance ids look like `Clock#qwertyui`.
pub fn new_instance_id(kind: SimultonKind) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..8)
        .map(|_| char::from(rng.gen_range(b'a'..=b'z')))
        .collect();
    format!("{}#{}", kind.title(), suffix)
}

/// Simulation entity behind a simulton REST API: state, rate and the
/// instances the API hands out.
#[derive(Debug)]
pub struct SimultonCore<T: SimultonInstance> {
    kind: SimultonKind,
    port: Option<u16>,
    state: SimultonState,
    rate: f64,
    instances: BTreeMap<String, T>,
}

impl<T: SimultonInstance> SimultonCore<T> {
    pub fn new(kind: SimultonKind, port: Option<u16>) -> Self {
        Self {
            kind,
            port,
            state: SimultonState::Init,
            rate: 0.0,
            instances: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> SimultonKind {
        self.kind
    }

    pub fn state(&self) -> SimultonState {
        self.state
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn is_running(&self) -> bool {
        self.state == SimultonState::Running
    }

    pub fn on_startup(&mut self) {
        self.set_state(SimultonState::Paused, Instant::now());
    }

    /// Applies a state change request, fanning it out to the instances.
    pub fn apply(&mut self, req: &SimultonRequest, now: Instant) -> Result<()> {
        if let Some(rate) = req.rate {
            validate_rate("rate", rate)?;
        }
        let rate = req.rate.unwrap_or(self.rate);
        match req.state {
            SimultonState::Init => {
                return Err(SimError::invalid_state("cannot go back to INIT"));
            }
            SimultonState::Running if rate <= 0.0 => {
                return Err(SimError::invalid_state("RUNNING needs a positive rate"));
            }
            _ => {}
        }
        if self.state == SimultonState::Shutting && req.state != SimultonState::Shutting {
            return Err(SimError::invalid_state("simulton is shutting down"));
        }

        if rate != self.rate {
            tracing::info!("{} simulton rate {} -> {}", self.kind, self.rate, rate);
            self.rate = rate;
            if self.is_running() {
                for instance in self.instances.values_mut() {
                    instance.on_running(rate, now);
                }
            }
        }
        self.set_state(req.state, now);
        Ok(())
    }

    fn set_state(&mut self, state: SimultonState, now: Instant) {
        if self.state == state {
            return;
        }
        tracing::info!("{} simulton state {} -> {}", self.kind, self.state, state);
        self.state = state;
        match state {
            SimultonState::Running => {
                for instance in self.instances.values_mut() {
                    instance.on_running(self.rate, now);
                }
            }
            SimultonState::Paused | SimultonState::Shutting => {
                for instance in self.instances.values_mut() {
                    instance.on_paused(now);
                }
            }
            SimultonState::Init => {}
        }
    }

    /// Registers a new instance, which immediately follows the current state.
    pub fn add_instance(&mut self, id: String, mut instance: T, now: Instant) -> &T {
        if self.is_running() {
            instance.on_running(self.rate, now);
        }
        self.instances.entry(id).or_insert(instance)
    }

    pub fn new_instance_id(&self) -> String {
        loop {
            let id = new_instance_id(self.kind);
            if !self.instances.contains_key(&id) {
                return id;
            }
        }
    }

    pub fn instance(&self, id: &str) -> Result<&T> {
        self.instances
            .get(id)
            .ok_or_else(|| SimError::not_found(format!("{} {}", self.kind, id)))
    }

    pub fn instance_mut(&mut self, id: &str) -> Result<&mut T> {
        let kind = self.kind;
        self.instances
            .get_mut(id)
            .ok_or_else(|| SimError::not_found(format!("{} {}", kind, id)))
    }

    pub fn remove_instance(&mut self, id: &str) -> Result<T> {
        self.instances
            .remove(id)
            .ok_or_else(|| SimError::not_found(format!("{} {}", self.kind, id)))
    }

    pub fn instances(&self) -> impl Iterator<Item = (&String, &T)> {
        self.instances.iter()
    }

    pub fn to_response(&self) -> SimultonResponse {
        SimultonResponse {
            description: self.kind.description().to_string(),
            port: self.port,
            rate: self.rate,
            state: self.state,
            title: self.kind.title().to_string(),
            version: VERSION.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::Clock;
    use std::time::Duration;

    fn running(rate: f64) -> SimultonRequest {
        SimultonRequest {
            state: SimultonState::Running,
            rate: Some(rate),
        }
    }

    fn paused() -> SimultonRequest {
        SimultonRequest {
            state: SimultonState::Paused,
            rate: None,
        }
    }

    #[test]
    fn test_instance_id_format() {
        let id = new_instance_id(SimultonKind::Clock);
        let (prefix, suffix) = id.split_once('#').unwrap();
        assert_eq!(prefix, "Clock");
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_lowercase()));
    }

    #[test]
    fn test_startup_moves_to_paused() {
        let mut core: SimultonCore<Clock> = SimultonCore::new(SimultonKind::Clock, Some(9500));
        assert_eq!(core.state(), SimultonState::Init);
        core.on_startup();
        let resp = core.to_response();
        assert_eq!(resp.state, SimultonState::Paused);
        assert_eq!(resp.port, Some(9500));
        assert_eq!(resp.title, "Clock");
        assert_eq!(resp.rate, 0.0);
    }

    #[test]
    fn test_running_requires_positive_rate() {
        let mut core: SimultonCore<Clock> = SimultonCore::new(SimultonKind::Clock, None);
        core.on_startup();
        let req = SimultonRequest {
            state: SimultonState::Running,
            rate: None,
        };
        assert!(core.apply(&req, Instant::now()).is_err());
        assert!(core.apply(&running(-1.0), Instant::now()).is_err());
        assert_eq!(core.state(), SimultonState::Paused);
    }

    #[test]
    fn test_state_fans_out_to_clocks() {
        let t0 = Instant::now();
        let mut core: SimultonCore<Clock> = SimultonCore::new(SimultonKind::Clock, None);
        core.on_startup();
        let id = core.new_instance_id();
        core.add_instance(id.clone(), Clock::new(id.clone(), "a"), t0);

        core.apply(&running(2.0), t0).unwrap();
        assert!(core.instance(&id).unwrap().is_running());

        core.apply(&paused(), t0 + Duration::from_secs(3)).unwrap();
        let clock = core.instance(&id).unwrap();
        assert!(!clock.is_running());
        assert!((clock.time(t0 + Duration::from_secs(60)) - 6.0).abs() < 1e-9);
        // 暫停後保留速率
        assert_eq!(core.rate(), 2.0);
    }

    #[test]
    fn test_instance_added_while_running_starts() {
        let t0 = Instant::now();
        let mut core: SimultonCore<Clock> = SimultonCore::new(SimultonKind::Clock, None);
        core.on_startup();
        core.apply(&running(1.0), t0).unwrap();
        let clock = core.add_instance("c".to_string(), Clock::new("c", "c"), t0);
        assert!(clock.is_running());
    }

    #[test]
    fn test_shutting_is_final() {
        let mut core: SimultonCore<Clock> = SimultonCore::new(SimultonKind::Clock, None);
        core.on_startup();
        let req = SimultonRequest {
            state: SimultonState::Shutting,
            rate: None,
        };
        core.apply(&req, Instant::now()).unwrap();
        assert!(core.apply(&running(1.0), Instant::now()).is_err());
    }

    #[test]
    fn test_missing_instance() {
        let mut core: SimultonCore<Clock> = SimultonCore::new(SimultonKind::Clock, None);
        assert!(matches!(core.instance("nope"), Err(SimError::NotFound { .. })));
        assert!(core.remove_instance("nope").is_err());
    }
}
