use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SimulationState {
    Init,
    Paused,
    Running,
    Shutting,
}

impl fmt::Display for SimulationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SimulationState::Init => "INIT",
            SimulationState::Paused => "PAUSED",
            SimulationState::Running => "RUNNING",
            SimulationState::Shutting => "SHUTTING",
        };
        f.write_str(s)
    }
}

/// 模擬狀態變更請求, rate 0 暫停, 1 正常速度, 2 兩倍速...
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRequest {
    pub state: SimulationState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
}

/// Simulation state, also the payload of every broadcast message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResponse {
    pub state: SimulationState,
    pub rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SimultonState {
    Init,
    Running,
    Paused,
    Shutting,
}

impl fmt::Display for SimultonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SimultonState::Init => "INIT",
            SimultonState::Running => "RUNNING",
            SimultonState::Paused => "PAUSED",
            SimultonState::Shutting => "SHUTTING",
        };
        f.write_str(s)
    }
}

impl From<SimulationState> for SimultonState {
    fn from(state: SimulationState) -> Self {
        match state {
            SimulationState::Init => SimultonState::Init,
            SimulationState::Paused => SimultonState::Paused,
            SimulationState::Running => SimultonState::Running,
            SimulationState::Shutting => SimultonState::Shutting,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimultonRequest {
    pub state: SimultonState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimultonResponse {
    pub description: String,
    pub port: Option<u16>,
    pub rate: f64,
    pub state: SimultonState,
    pub title: String,
    pub version: String,
}

/// Which simulton service the simulation should launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum SimultonKind {
    Clock,
    Elevator,
}

impl SimultonKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimultonKind::Clock => "clock",
            SimultonKind::Elevator => "elevator",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            SimultonKind::Clock => "Clock",
            SimultonKind::Elevator => "Elevator",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SimultonKind::Clock => "Clock API",
            SimultonKind::Elevator => "Elevator API",
        }
    }
}

impl fmt::Display for SimultonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSimultonParams {
    pub kind: SimultonKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewClockParams {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockResponse {
    pub id: String,
    pub name: String,
    pub time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewElevatorParams {
    pub name: String,
    pub floors: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadValue {
    None,
    Some,
    TooMuch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ElevatorState {
    /// Low power state, empty with closed doors.
    Idle,
    DoorsOpening,
    DoorsClosing,
    /// Moving to a destination floor.
    Going,
    DoorsOpened,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElevatorResponse {
    pub id: String,
    pub name: String,
    pub floors: u32,
    pub current_floor: u32,
    pub state: ElevatorState,
    pub load: LoadValue,
    pub destinations: Vec<u32>,
    /// 面板按鈕標籤, 亮燈的以 `*` 標示
    pub panel: Vec<String>,
}

/// Body of `call` and `arrive`: a 1-based floor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorCallParams {
    pub floor: u32,
}

/// Body of `press`: 0-based panel index, floors first then open and close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressParams {
    pub button: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadParams {
    pub kilos: i64,
}

/// JSON carrying a single message in the body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
