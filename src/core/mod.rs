pub mod button;
pub mod clock;
pub mod elevator;
pub mod launcher;
pub mod pubsub;
pub mod simulation;
pub mod simulton;

pub use crate::domain::model::{SimulationState, SimultonState};
pub use crate::domain::ports::{ConfigProvider, SimultonFactory, SimultonHandle};
pub use crate::utils::error::Result;
