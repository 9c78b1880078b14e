use crate::core::button::ButtonWithLedPanel;
use crate::domain::model::ElevatorResponse;
use crate::domain::ports::SimultonInstance;
use crate::utils::error::{Result, SimError};
use crate::utils::validation::validate_range;
use std::fmt;

pub use crate::domain::model::{ElevatorState, LoadValue};

const LABEL_OPEN_DOORS: &str = "< >";
const LABEL_CLOSE_DOORS: &str = "> <";

// kg
const MIN_LOAD: u32 = 1;
const MAX_LOAD: u32 = 700;

const MAX_FLOORS: u32 = 200;

pub struct Elevator {
    id: String,
    name: String,
    floors: u32,
    current_floor: u32,
    current_load: u32,
    destinations: Vec<u32>,
    state: ElevatorState,
    panel: ButtonWithLedPanel,
}

impl Elevator {
    pub fn new(id: impl Into<String>, name: impl Into<String>, floors: u32) -> Result<Self> {
        validate_range("floors", floors, 1, MAX_FLOORS)?;

        // 控制面板: 樓層按鈕 + 開門 + 關門
        let mut labels: Vec<String> = (1..=floors).map(|f| f.to_string()).collect();
        labels.push(LABEL_OPEN_DOORS.to_string());
        labels.push(LABEL_CLOSE_DOORS.to_string());

        Ok(Self {
            id: id.into(),
            name: name.into(),
            floors,
            current_floor: 1,
            current_load: 0,
            destinations: Vec::new(),
            state: ElevatorState::Idle,
            panel: ButtonWithLedPanel::new(labels, None),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn floors(&self) -> u32 {
        self.floors
    }

    pub fn current_floor(&self) -> u32 {
        self.current_floor
    }

    pub fn state(&self) -> ElevatorState {
        self.state
    }

    pub fn destinations(&self) -> &[u32] {
        &self.destinations
    }

    pub fn load(&self) -> LoadValue {
        if self.current_load > MAX_LOAD {
            LoadValue::TooMuch
        } else if self.current_load > MIN_LOAD {
            LoadValue::Some
        } else {
            LoadValue::None
        }
    }

    /// A passenger of `kilos` steps in; only possible with opened doors.
    pub fn step_in(&mut self, kilos: i64) -> bool {
        if kilos <= 0 || self.state != ElevatorState::DoorsOpened {
            return false;
        }
        self.current_load = self
            .current_load
            .saturating_add(u32::try_from(kilos).unwrap_or(u32::MAX));
        true
    }

    pub fn step_out(&mut self, kilos: i64) -> bool {
        if kilos <= 0 || self.state != ElevatorState::DoorsOpened {
            return false;
        }
        self.current_load = self
            .current_load
            .saturating_sub(u32::try_from(kilos).unwrap_or(u32::MAX));
        true
    }

    /// Requests the elevator to go to `floor` (1-based).
    pub fn floor_call(&mut self, floor: u32) -> Result<()> {
        if floor == 0 || floor > self.floors {
            return Err(SimError::validation(format!(
                "Floor {} out of range 1..={}",
                floor, self.floors
            )));
        }
        if floor != self.current_floor && !self.destinations.contains(&floor) {
            self.destinations.push(floor);
            tracing::debug!("Elevator {} destinations {:?}", self.id, self.destinations);
        }
        Ok(())
    }

    /// Presses panel button `index`: floors first, then open and close.
    pub fn press(&mut self, index: usize) -> Result<()> {
        self.panel.click(index)?;
        let floors = self.floors as usize;
        if index < floors {
            let floor = index as u32 + 1;
            self.floor_call(floor)?;
            if floor == self.current_floor {
                self.panel.reset_button(index);
            }
        } else if index == floors {
            self.open_doors();
            self.panel.reset_button(index);
        } else {
            self.close_doors();
            self.panel.reset_button(index);
        }
        Ok(())
    }

    pub fn open_doors(&mut self) -> bool {
        if self.state == ElevatorState::Going {
            return false;
        }
        self.state = ElevatorState::DoorsOpened;
        true
    }

    pub fn close_doors(&mut self) -> bool {
        if self.state != ElevatorState::DoorsOpened {
            return false;
        }
        self.state = if self.destinations.is_empty() {
            ElevatorState::Idle
        } else {
            ElevatorState::Going
        };
        true
    }

    /// The car reached `floor`: drop it from the destinations and open up.
    pub fn arrive(&mut self, floor: u32) -> Result<()> {
        if floor == 0 || floor > self.floors {
            return Err(SimError::validation(format!("No floor {}", floor)));
        }
        self.current_floor = floor;
        self.destinations.retain(|f| *f != floor);
        self.panel.reset_button(floor as usize - 1);
        self.state = ElevatorState::DoorsOpened;
        Ok(())
    }

    pub fn panel_labels(&self) -> Vec<String> {
        self.panel.annotated_labels()
    }

    pub fn to_response(&self) -> ElevatorResponse {
        ElevatorResponse {
            id: self.id.clone(),
            name: self.name.clone(),
            floors: self.floors,
            current_floor: self.current_floor,
            state: self.state,
            load: self.load(),
            destinations: self.destinations.clone(),
            panel: self.panel.annotated_labels(),
        }
    }
}

impl SimultonInstance for Elevator {}

impl fmt::Debug for Elevator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Elevator {} is {:?} on {} floor {:?}>",
            self.name,
            self.state,
            self.current_floor,
            self.panel.annotated_labels()
        )
    }
}
