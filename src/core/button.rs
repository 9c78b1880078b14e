use crate::utils::error::{Result, SimError};
use std::fmt;

pub type ButtonCallback = Box<dyn FnMut(&str) + Send>;
pub type PanelCallback = Box<dyn FnMut(&[usize]) + Send>;

/// Push button with a label, can be enabled/disabled and clicked.
pub struct Button {
    label: String,
    enabled: bool,
    callback: Option<ButtonCallback>,
}

impl Button {
    pub fn new(label: impl Into<String>, callback: Option<ButtonCallback>) -> Self {
        Self {
            label: label.into(),
            enabled: true,
            callback,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Returns whether the click had an effect, i.e. the button was enabled.
    pub fn click(&mut self) -> bool {
        if !self.enabled {
            return false;
        }
        self.fire();
        true
    }

    fn fire(&mut self) {
        if let Some(callback) = self.callback.as_mut() {
            callback(&self.label);
        }
    }

    pub fn annotated_label(&self) -> String {
        if self.enabled {
            self.label.clone()
        } else {
            format!("_{}_", self.label)
        }
    }
}

impl fmt::Debug for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Button '{}'>", self.annotated_label())
    }
}

/// Push button with a feedback LED. The LED goes on when the button is
/// pushed and stays on (button disabled) until reset.
pub struct ButtonWithLed {
    button: Button,
    led_on: bool,
}

impl ButtonWithLed {
    pub fn new(label: impl Into<String>, callback: Option<ButtonCallback>) -> Self {
        Self {
            button: Button::new(label, callback),
            led_on: false,
        }
    }

    pub fn label(&self) -> &str {
        self.button.label()
    }

    pub fn is_enabled(&self) -> bool {
        self.button.is_enabled()
    }

    pub fn click(&mut self) -> bool {
        if !self.button.is_enabled() {
            return false;
        }
        if !self.led_on {
            self.led_on = true;
            self.button.fire();
            self.button.disable();
        }
        true
    }

    pub fn reset(&mut self) {
        self.led_on = false;
        self.button.enable();
    }

    pub fn is_on(&self) -> bool {
        self.led_on
    }

    pub fn annotated_label(&self) -> String {
        let label = self.button.annotated_label();
        if self.led_on {
            format!("*{}*", label)
        } else {
            label
        }
    }
}

impl fmt::Debug for ButtonWithLed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<ButtonWithLed '{}'>", self.annotated_label())
    }
}

/// Panel of N push buttons with feedback LEDs.
pub struct ButtonWithLedPanel {
    buttons: Vec<ButtonWithLed>,
    callback: Option<PanelCallback>,
}

impl ButtonWithLedPanel {
    pub fn new<S: Into<String>>(labels: Vec<S>, callback: Option<PanelCallback>) -> Self {
        let buttons = labels
            .into_iter()
            .map(|label| ButtonWithLed::new(label, None))
            .collect();
        Self { buttons, callback }
    }

    pub fn len(&self) -> usize {
        self.buttons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buttons.is_empty()
    }

    /// Clicks button `index` and reports the lit LEDs to the panel callback.
    pub fn click(&mut self, index: usize) -> Result<Vec<usize>> {
        let count = self.buttons.len();
        let button = self.buttons.get_mut(index).ok_or_else(|| {
            SimError::validation(format!("Button {} out of range 0..{}", index, count))
        })?;
        button.click();

        let leds = self.leds_on();
        if let Some(callback) = self.callback.as_mut() {
            callback(&leds);
        }
        Ok(leds)
    }

    pub fn reset(&mut self) {
        for button in &mut self.buttons {
            button.reset();
        }
    }

    pub fn reset_button(&mut self, index: usize) {
        if let Some(button) = self.buttons.get_mut(index) {
            button.reset();
        }
    }

    pub fn leds_on(&self) -> Vec<usize> {
        self.buttons
            .iter()
            .enumerate()
            .filter(|(_, b)| b.is_on())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn annotated_labels(&self) -> Vec<String> {
        self.buttons.iter().map(|b| b.annotated_label()).collect()
    }
}

impl fmt::Debug for ButtonWithLedPanel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<ButtonWithLedPanel {:?}>", self.annotated_labels())
    }
}
