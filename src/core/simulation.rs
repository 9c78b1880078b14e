use crate::core::pubsub::Broadcaster;
use crate::domain::model::{
    NewSimultonParams, SimulationRequest, SimulationResponse, SimulationState, SimultonResponse,
};
use crate::domain::ports::{SimultonFactory, SimultonHandle};
use crate::utils::error::{Result, SimError};
use crate::utils::validation::validate_rate;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// The parent of all simultons: owns the simulation state and rate, and
/// tells every simulton (and every broadcast listener) when they change.
pub struct Simulation {
    state: SimulationState,
    rate: f64,
    simultons: BTreeMap<u16, Box<dyn SimultonHandle>>,
    /// None 代表埠已用盡
    next_port: Option<u16>,
    broadcaster: Broadcaster,
    factory: Arc<dyn SimultonFactory>,
}

impl Simulation {
    pub fn new(base_port: u16, broadcaster: Broadcaster, factory: Arc<dyn SimultonFactory>) -> Self {
        Self {
            state: SimulationState::Init,
            // 以暫停狀態開始
            rate: 0.0,
            simultons: BTreeMap::new(),
            next_port: Some(base_port),
            broadcaster,
            factory,
        }
    }

    pub fn state(&self) -> SimulationState {
        self.state
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn is_paused(&self) -> bool {
        self.state == SimulationState::Paused
    }

    pub fn next_port(&self) -> Option<u16> {
        self.next_port
    }

    pub fn factory(&self) -> Arc<dyn SimultonFactory> {
        self.factory.clone()
    }

    pub fn to_response(&self) -> SimulationResponse {
        SimulationResponse {
            state: self.state,
            rate: self.rate,
        }
    }

    pub async fn on_startup(&mut self) -> Result<()> {
        self.set_state(SimulationState::Paused).await
    }

    /// Applies a PUT on the simulation: rate first, then state.
    pub async fn apply(&mut self, req: &SimulationRequest) -> Result<SimulationResponse> {
        let rate = req.rate.unwrap_or(self.rate);
        validate_rate("rate", rate)?;
        self.check_transition(req.state, rate)?;

        if req.state == self.state {
            self.set_rate(rate).await?;
        } else {
            if rate != self.rate {
                tracing::info!("Simulation rate {} -> {}", self.rate, rate);
                self.rate = rate;
            }
            self.set_state(req.state).await?;
        }
        Ok(self.to_response())
    }

    pub async fn set_rate(&mut self, rate: f64) -> Result<()> {
        validate_rate("rate", rate)?;
        if self.state == SimulationState::Running && rate <= 0.0 {
            return Err(SimError::invalid_state("RUNNING needs a positive rate"));
        }
        if rate == self.rate {
            return Ok(());
        }
        tracing::info!("Simulation rate {} -> {}", self.rate, rate);
        self.rate = rate;
        if self.state == SimulationState::Running {
            // 執行中改變速率: 重新廣播並通知各 simulton
            self.broadcaster.publish(self.to_response());
            self.fan_out_run().await;
        }
        Ok(())
    }

    fn check_transition(&self, target: SimulationState, rate: f64) -> Result<()> {
        match target {
            SimulationState::Init if self.state != SimulationState::Init => {
                return Err(SimError::invalid_state("cannot go back to INIT"));
            }
            SimulationState::Running if rate <= 0.0 => {
                return Err(SimError::invalid_state("RUNNING needs a positive rate"));
            }
            _ => {}
        }
        if self.state == SimulationState::Shutting && target != SimulationState::Shutting {
            return Err(SimError::invalid_state("simulation is shutting down"));
        }
        Ok(())
    }

    pub async fn set_state(&mut self, state: SimulationState) -> Result<()> {
        if self.state == state {
            return Ok(());
        }
        self.check_transition(state, self.rate)?;

        tracing::info!("Simulation state {} -> {}", self.state, state);
        self.state = state;
        let listeners = self.broadcaster.publish(self.to_response());
        tracing::debug!("State change broadcast to {} listeners", listeners);

        match state {
            SimulationState::Running => self.fan_out_run().await,
            SimulationState::Paused => self.fan_out_pause().await,
            SimulationState::Shutting => self.fan_out_shutdown().await,
            SimulationState::Init => {}
        }
        Ok(())
    }

    async fn fan_out_run(&mut self) {
        let rate = self.rate;
        for (port, simulton) in self.simultons.iter_mut() {
            match simulton.run(rate).await {
                Ok(true) => {}
                Ok(false) => tracing::warn!("Simulton {} did not start running", port),
                Err(e) => tracing::warn!("Simulton {} unreachable: {}", port, e),
            }
        }
    }

    async fn fan_out_pause(&mut self) {
        for (port, simulton) in self.simultons.iter_mut() {
            match simulton.pause().await {
                Ok(true) => {}
                Ok(false) => tracing::warn!("Simulton {} did not pause", port),
                Err(e) => tracing::warn!("Simulton {} unreachable: {}", port, e),
            }
        }
    }

    async fn fan_out_shutdown(&mut self) {
        for (port, simulton) in self.simultons.iter_mut() {
            if let Err(e) = simulton.shutdown().await {
                tracing::error!("❌ Simulton {} shutdown failed: {}", port, e);
            }
        }
    }

    /// Launches a new simulton on the next free port.
    pub async fn create_simulton(&mut self, params: &NewSimultonParams) -> Result<SimultonResponse> {
        let port = self.reserve_port()?;
        let simulton = start_simulton(self.factory.as_ref(), params, port).await?;
        self.register(simulton).await
    }

    /// Hands out the next port. A failed launch still uses it up.
    pub fn reserve_port(&mut self) -> Result<u16> {
        if self.state == SimulationState::Shutting {
            return Err(SimError::invalid_state("simulation is shutting down"));
        }
        let port = self
            .next_port
            .ok_or_else(|| SimError::invalid_state("out of simulton ports"))?;
        self.next_port = port.checked_add(1);
        Ok(port)
    }

    /// Adopts a started simulton and brings it in line with the simulation
    /// state. A simulton arriving after SHUTTING is shut down again.
    pub async fn register(
        &mut self,
        mut simulton: Box<dyn SimultonHandle>,
    ) -> Result<SimultonResponse> {
        let port = simulton.port();
        match self.state {
            SimulationState::Shutting => {
                tracing::warn!("Simulton {} arrived while shutting down", port);
                if let Err(e) = simulton.shutdown().await {
                    tracing::error!("❌ Simulton {} shutdown failed: {}", port, e);
                }
                return Err(SimError::invalid_state("simulation is shutting down"));
            }
            SimulationState::Running => match simulton.run(self.rate).await {
                Ok(true) => {}
                Ok(false) => tracing::warn!("New simulton {} did not start running", port),
                Err(e) => tracing::warn!("New simulton {} unreachable: {}", port, e),
            },
            SimulationState::Init | SimulationState::Paused => {}
        }

        let resp = simulton.to_response();
        self.simultons.insert(port, simulton);
        Ok(resp)
    }

    pub fn simultons(&self) -> BTreeMap<u16, SimultonResponse> {
        self.simultons
            .iter()
            .map(|(port, s)| (*port, s.to_response()))
            .collect()
    }

    pub fn simulton(&self, port: u16) -> Result<SimultonResponse> {
        self.simultons
            .get(&port)
            .map(|s| s.to_response())
            .ok_or_else(|| SimError::not_found(format!("simulton on port {}", port)))
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        if self.state != SimulationState::Shutting {
            self.set_state(SimulationState::Shutting).await?;
        }
        Ok(())
    }
}

/// Starts a simulton through the factory without touching the simulation,
/// so callers can run it outside any lock.
pub async fn start_simulton(
    factory: &dyn SimultonFactory,
    params: &NewSimultonParams,
    port: u16,
) -> Result<Box<dyn SimultonHandle>> {
    tracing::info!("Creating {} simulton on port {}", params.kind, port);
    factory.start(params.kind, port).await.map_err(|e| {
        tracing::error!("❌ {} simulton on port {} failed: {}", params.kind, port, e);
        e
    })
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Simulation is {} at {} with {} simultons>",
            self.state,
            self.rate,
            self.simultons.len()
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::model::{SimultonKind, SimultonState};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    pub(crate) type Log = Arc<Mutex<Vec<String>>>;

    pub(crate) struct FakeSimulton {
        port: u16,
        kind: SimultonKind,
        state: SimultonState,
        rate: f64,
        log: Log,
    }

    #[async_trait]
    impl SimultonHandle for FakeSimulton {
        fn port(&self) -> u16 {
            self.port
        }

        fn to_response(&self) -> SimultonResponse {
            SimultonResponse {
                description: self.kind.description().to_string(),
                port: Some(self.port),
                rate: self.rate,
                state: self.state,
                title: self.kind.title().to_string(),
                version: "test".to_string(),
            }
        }

        async fn run(&mut self, rate: f64) -> Result<bool> {
            self.log.lock().unwrap().push(format!("{} run {}", self.port, rate));
            self.state = SimultonState::Running;
            self.rate = rate;
            Ok(true)
        }

        async fn pause(&mut self) -> Result<bool> {
            self.log.lock().unwrap().push(format!("{} pause", self.port));
            self.state = SimultonState::Paused;
            Ok(true)
        }

        async fn shutdown(&mut self) -> Result<()> {
            self.log.lock().unwrap().push(format!("{} shutdown", self.port));
            self.state = SimultonState::Shutting;
            Ok(())
        }
    }

    /// Fails to start simultons on the ports listed in `broken`, and takes
    /// `delay` to start any simulton.
    pub(crate) struct FakeFactory {
        pub(crate) log: Log,
        pub(crate) broken: Vec<u16>,
        pub(crate) delay: Duration,
    }

    #[async_trait]
    impl SimultonFactory for FakeFactory {
        async fn start(&self, kind: SimultonKind, port: u16) -> Result<Box<dyn SimultonHandle>> {
            tokio::time::sleep(self.delay).await;
            if self.broken.contains(&port) {
                return Err(SimError::Unreachable {
                    url: format!("http://127.0.0.1:{}/api/v1/simulton", port),
                    timeout_secs: 1,
                });
            }
            Ok(Box::new(FakeSimulton {
                port,
                kind,
                state: SimultonState::Paused,
                rate: 0.0,
                log: self.log.clone(),
            }))
        }
    }

    pub(crate) fn simulation(broken: Vec<u16>) -> (Simulation, Log, Broadcaster) {
        simulation_with(9500, broken, Duration::ZERO)
    }

    pub(crate) fn simulation_with(
        base_port: u16,
        broken: Vec<u16>,
        delay: Duration,
    ) -> (Simulation, Log, Broadcaster) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let bus = Broadcaster::new();
        let factory = FakeFactory {
            log: log.clone(),
            broken,
            delay,
        };
        (Simulation::new(base_port, bus.clone(), Arc::new(factory)), log, bus)
    }

    fn clock() -> NewSimultonParams {
        NewSimultonParams {
            kind: SimultonKind::Clock,
        }
    }

    fn req(state: SimulationState, rate: Option<f64>) -> SimulationRequest {
        SimulationRequest { state, rate }
    }

    #[tokio::test]
    async fn test_startup_paused_and_broadcast() {
        let (mut sim, _, bus) = simulation(vec![]);
        let mut rx = bus.subscribe();
        assert_eq!(sim.state(), SimulationState::Init);

        sim.on_startup().await.unwrap();
        assert!(sim.is_paused());
        let msg = rx.recv().await.unwrap();
        assert_eq!(
            msg,
            SimulationResponse {
                state: SimulationState::Paused,
                rate: 0.0
            }
        );
    }

    #[tokio::test]
    async fn test_create_simultons_allocates_ports() {
        let (mut sim, _, _) = simulation(vec![]);
        sim.on_startup().await.unwrap();

        let a = sim.create_simulton(&clock()).await.unwrap();
        let b = sim.create_simulton(&clock()).await.unwrap();
        assert_eq!(a.port, Some(9500));
        assert_eq!(b.port, Some(9501));
        assert_eq!(sim.simultons().len(), 2);
        assert_eq!(sim.simulton(9501).unwrap().title, "Clock");
        assert!(matches!(sim.simulton(9502), Err(SimError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_failed_simulton_consumes_port() {
        let (mut sim, _, _) = simulation(vec![9500]);
        sim.on_startup().await.unwrap();

        assert!(sim.create_simulton(&clock()).await.is_err());
        assert!(sim.simultons().is_empty());
        let ok = sim.create_simulton(&clock()).await.unwrap();
        assert_eq!(ok.port, Some(9501));
    }

    #[tokio::test]
    async fn test_state_changes_fan_out() {
        let (mut sim, log, bus) = simulation(vec![]);
        let mut rx = bus.subscribe();
        sim.on_startup().await.unwrap();
        sim.create_simulton(&clock()).await.unwrap();
        sim.create_simulton(&clock()).await.unwrap();

        sim.apply(&req(SimulationState::Running, Some(2.0)))
            .await
            .unwrap();
        sim.apply(&req(SimulationState::Paused, None)).await.unwrap();
        sim.shutdown().await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "9500 run 2",
                "9501 run 2",
                "9500 pause",
                "9501 pause",
                "9500 shutdown",
                "9501 shutdown"
            ]
        );

        let states: Vec<SimulationState> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|m| m.state)
            .collect();
        assert_eq!(
            states,
            vec![
                SimulationState::Paused,
                SimulationState::Running,
                SimulationState::Paused,
                SimulationState::Shutting
            ]
        );
    }

    #[tokio::test]
    async fn test_same_state_is_noop() {
        let (mut sim, log, bus) = simulation(vec![]);
        sim.on_startup().await.unwrap();
        sim.create_simulton(&clock()).await.unwrap();
        let mut rx = bus.subscribe();

        sim.apply(&req(SimulationState::Paused, None)).await.unwrap();
        assert!(rx.try_recv().is_err());
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rate_change_while_running() {
        let (mut sim, log, _) = simulation(vec![]);
        sim.on_startup().await.unwrap();
        sim.create_simulton(&clock()).await.unwrap();
        sim.apply(&req(SimulationState::Running, Some(1.0)))
            .await
            .unwrap();
        let resp = sim
            .apply(&req(SimulationState::Running, Some(4.0)))
            .await
            .unwrap();

        assert_eq!(resp.rate, 4.0);
        assert_eq!(*log.lock().unwrap(), vec!["9500 run 1", "9500 run 4"]);
    }

    #[tokio::test]
    async fn test_new_simulton_joins_running_simulation() {
        let (mut sim, log, _) = simulation(vec![]);
        sim.on_startup().await.unwrap();
        sim.apply(&req(SimulationState::Running, Some(3.0)))
            .await
            .unwrap();
        let resp = sim.create_simulton(&clock()).await.unwrap();

        assert_eq!(resp.state, SimultonState::Running);
        assert_eq!(*log.lock().unwrap(), vec!["9500 run 3"]);
    }

    #[tokio::test]
    async fn test_invalid_transitions() {
        let (mut sim, _, _) = simulation(vec![]);
        sim.on_startup().await.unwrap();

        // 速率為 0 時不能執行
        assert!(sim.apply(&req(SimulationState::Running, None)).await.is_err());
        assert!(sim
            .apply(&req(SimulationState::Paused, Some(-1.0)))
            .await
            .is_err());
        assert!(sim.apply(&req(SimulationState::Init, None)).await.is_err());
        assert!(sim.is_paused());

        sim.shutdown().await.unwrap();
        assert!(sim
            .apply(&req(SimulationState::Running, Some(1.0)))
            .await
            .is_err());
        assert!(sim.create_simulton(&clock()).await.is_err());
        // 重複關閉沒問題
        sim.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_last_port_is_usable() {
        let (mut sim, _, _) = simulation_with(u16::MAX, vec![], Duration::ZERO);
        sim.on_startup().await.unwrap();

        let last = sim.create_simulton(&clock()).await.unwrap();
        assert_eq!(last.port, Some(u16::MAX));
        assert_eq!(sim.next_port(), None);

        let res = sim.create_simulton(&clock()).await;
        assert!(matches!(res, Err(SimError::InvalidState { .. })));
        assert_eq!(sim.simultons().len(), 1);
    }

    #[tokio::test]
    async fn test_register_after_shutdown_stops_simulton() {
        let (mut sim, log, _) = simulation(vec![]);
        sim.on_startup().await.unwrap();

        let port = sim.reserve_port().unwrap();
        let factory = sim.factory();
        let started = start_simulton(factory.as_ref(), &clock(), port).await.unwrap();
        sim.shutdown().await.unwrap();

        assert!(sim.register(started).await.is_err());
        assert!(sim.simultons().is_empty());
        assert_eq!(*log.lock().unwrap(), vec!["9500 shutdown"]);
        assert!(sim.reserve_port().is_err());
    }
}
