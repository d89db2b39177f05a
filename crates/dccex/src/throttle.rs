//! Locomotive throttle.
//!
//! Holds the selected address and its live state, sends the matching
//! commands through a [`DccSession`] and persists every change.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::command::{Command, Direction, MAX_ADDRESS, MAX_FUNCTION, MAX_SPEED, MIN_ADDRESS};
use crate::config::ThrottleConfig;
use crate::error::DccError;
use crate::loco::{LocoStore, LocomotiveState};
use crate::session::DccSession;
use crate::store::KeyValueStore;

/// Operator throttle for one locomotive at a time.
#[derive(Debug)]
pub struct Throttle {
    session: Arc<DccSession>,
    locos: LocoStore,
    address: u16,
    state: LocomotiveState,
}

impl Throttle {
    /// Throttle on the configured initial address, with its stored state.
    pub fn new(
        session: Arc<DccSession>,
        store: Arc<dyn KeyValueStore>,
        config: &ThrottleConfig,
    ) -> Self {
        let locos = LocoStore::new(store, config.storage_key.clone());
        let address = config.initial_address.clamp(MIN_ADDRESS, MAX_ADDRESS);
        let state = locos.load(address);
        Self {
            session,
            locos,
            address,
            state,
        }
    }

    pub fn session(&self) -> &Arc<DccSession> {
        &self.session
    }

    pub fn locos(&self) -> &LocoStore {
        &self.locos
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn state(&self) -> &LocomotiveState {
        &self.state
    }

    pub fn speed(&self) -> u8 {
        self.state.speed
    }

    pub fn direction(&self) -> Direction {
        self.state.direction
    }

    pub fn functions(&self) -> &BTreeSet<u8> {
        &self.state.functions
    }

    pub fn is_function_active(&self, function: u8) -> bool {
        self.state.functions.contains(&function)
    }

    pub fn invert_display(&self) -> bool {
        self.state.invert_display
    }

    /// Whether the direction arrow is drawn pointing left.
    ///
    /// Forward points right unless the display is inverted.
    pub fn arrow_points_left(&self) -> bool {
        let forward = self.state.direction.is_forward();
        if self.state.invert_display {
            forward
        } else {
            !forward
        }
    }

    /// Select `address` and load its stored state.
    pub fn set_address(&mut self, address: i64) -> Result<(), DccError> {
        let valid = u16::try_from(address)
            .ok()
            .filter(|a| (MIN_ADDRESS..=MAX_ADDRESS).contains(a))
            .ok_or(DccError::InvalidAddress(address))?;
        self.select(valid);
        Ok(())
    }

    /// Move the address by `delta`, clamped into the valid range.
    pub fn adjust_address_by(&mut self, delta: i64) {
        let next = i64::from(self.address)
            .saturating_add(delta)
            .clamp(i64::from(MIN_ADDRESS), i64::from(MAX_ADDRESS));
        self.select(u16::try_from(next).unwrap_or(MAX_ADDRESS));
    }

    fn select(&mut self, address: u16) {
        self.address = address;
        self.state = self.locos.load(address);
        debug!(address, speed = self.state.speed, "locomotive selected");
    }

    /// Set the speed (clamped to `0..=126`).
    ///
    /// The throttle command is only sent while connected. The state is
    /// persisted either way; a send failure is returned afterwards.
    pub async fn set_speed(&mut self, speed: i64) -> Result<(), DccError> {
        self.state.speed = speed.clamp(0, MAX_SPEED as i64) as u8;
        let sent = self.send_throttle().await;
        self.persist();
        sent
    }

    pub async fn adjust_speed_by(&mut self, delta: i64) -> Result<(), DccError> {
        self.set_speed(self.state.speed as i64 + delta).await
    }

    /// Speed to zero.
    pub async fn brake(&mut self) -> Result<(), DccError> {
        self.set_speed(0).await
    }

    pub async fn set_direction(&mut self, direction: Direction) -> Result<(), DccError> {
        self.state.direction = direction;
        let sent = self.send_throttle().await;
        self.persist();
        sent
    }

    pub async fn toggle_direction(&mut self) -> Result<(), DccError> {
        self.set_direction(self.state.direction.reversed()).await
    }

    async fn send_throttle(&self) -> Result<(), DccError> {
        if !self.session.is_connected() {
            return Ok(());
        }
        self.session
            .send(&Command::throttle(
                self.address,
                self.state.speed,
                self.state.direction,
            ))
            .await
    }

    /// Flip function `function`; the set only changes once the command went out.
    ///
    /// Returns the new on/off state.
    pub async fn toggle_function(&mut self, function: u8) -> Result<bool, DccError> {
        if function > MAX_FUNCTION {
            return Err(DccError::InvalidFunction(function));
        }
        let on = !self.state.functions.contains(&function);
        self.session
            .send(&Command::Function {
                address: self.address,
                function,
                on,
            })
            .await?;
        if on {
            self.state.functions.insert(function);
        } else {
            self.state.functions.remove(&function);
        }
        self.persist();
        Ok(on)
    }

    /// Change how the direction arrow is drawn. Nothing is sent.
    pub fn set_invert_display(&mut self, invert: bool) {
        self.state.invert_display = invert;
        self.persist();
    }

    pub fn toggle_invert_display(&mut self) {
        self.set_invert_display(!self.state.invert_display);
    }

    pub async fn set_track_power(&self, on: bool) -> Result<(), DccError> {
        self.session.set_track_power(on).await
    }

    /// Flip track power; ignored while disconnected.
    pub async fn toggle_track_power(&self) -> Result<(), DccError> {
        if !self.session.is_connected() {
            return Ok(());
        }
        self.session.set_track_power(!self.session.track_power()).await
    }

    pub async fn status(&self) -> Result<(), DccError> {
        self.session.status().await
    }

    pub async fn emergency_stop(&self) -> Result<(), DccError> {
        info!(address = self.address, "emergency stop");
        self.session.emergency_stop().await
    }

    /// Send operator-typed text. Surrounding whitespace is trimmed and empty
    /// input is ignored.
    pub async fn send_raw(&self, text: &str) -> Result<(), DccError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        self.session.send(&Command::Raw(text.to_string())).await
    }

    fn persist(&self) {
        self.locos.save(self.address, &self.state);
    }
}
