//! System state machine module
//!
//! Holds the network state and the data carried across loop iterations, and
//! decides which actions the cooperative loop performs next. It never touches
//! hardware itself; [`crate::device::Device`] executes the actions it returns.

use crate::alert_fetcher::PollTimer;
use crate::alert_pattern::AlertPattern;
use crate::config;
use crate::credentials::Credentials;
use crate::led_control::LedStatus;
use crate::wifi::{RadioStatus, classify};
use alloc::vec::Vec;
use log::{info, warn};

/// Network state - exactly one at any time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkState {
    /// Booting: credentials not read yet, or first association in progress
    Uninitialized,
    /// Running the setup portal, only a restart leaves this state
    Provisioning,
    /// Station associated
    Connected,
    /// Station not associated
    Disconnected,
    /// Station association dropped
    ConnectionLost,
    /// Radio reported a status we cannot interpret
    Fault,
}

/// System events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemEvent {
    /// Credential record read at boot
    CredentialsLoaded(Credentials),
    /// Boot time association succeeded
    WiFiConnected,
    /// Boot time association did not complete within the deadline
    ConnectTimedOut,
    /// Radio status sampled in the steady state loop
    StatusObserved(RadioStatus),
}

/// State transition result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateTransition {
    /// Keep the current state
    Stay,
    /// Move to a new state
    Transition(NetworkState),
}

/// Actions the loop has to execute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Fill the strip with a status color
    UpdateLEDStatus(LedStatus),
    /// Read the credential record
    LoadCredentials,
    /// Associate with the stored network
    StartWiFiConnection,
    /// Wipe the stored credentials after a failed association
    ClearCredentials,
    /// Bring up the access point and the portal services
    StartProvisioning,
    /// Give the portal a chance to deliver a submission
    ServicePortal,
    /// Sample the radio status
    MonitorConnection,
    /// Poll the alert endpoint
    FetchAlerts,
    /// Push the alert pattern to the strip
    RenderAlerts,
    /// Report a state without a corrective action
    ReportState(NetworkState),
}

/// System state machine, the device context owned by the top level loop
pub struct SystemStateMachine {
    current_state: NetworkState,
    previous_state: Option<NetworkState>,
    credentials: Option<Credentials>,
    alert_pattern: AlertPattern,
    poll_timer: PollTimer,
    clear_pending: bool,
    portal_started: bool,
    shown_status: Option<LedStatus>,
    reported_state: Option<NetworkState>,
}

impl SystemStateMachine {
    /// Create new state machine instance
    pub fn new() -> Self {
        Self {
            current_state: NetworkState::Uninitialized,
            previous_state: None,
            credentials: None,
            alert_pattern: AlertPattern::new(),
            poll_timer: PollTimer::new(config::FETCH_INTERVAL_MS),
            clear_pending: false,
            portal_started: false,
            shown_status: None,
            reported_state: None,
        }
    }

    /// Get current state
    pub fn get_current_state(&self) -> NetworkState {
        self.current_state
    }

    /// Get previous state
    pub fn get_previous_state(&self) -> Option<NetworkState> {
        self.previous_state
    }

    /// Credentials read at boot, `None` before they are loaded
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn alert_pattern(&self) -> &AlertPattern {
        &self.alert_pattern
    }

    pub fn alert_pattern_mut(&mut self) -> &mut AlertPattern {
        &mut self.alert_pattern
    }

    pub fn poll_timer(&self) -> &PollTimer {
        &self.poll_timer
    }

    /// Get the LED status for the current state
    pub fn get_led_status(&self) -> Option<LedStatus> {
        match self.current_state {
            NetworkState::Uninitialized => match self.credentials {
                Some(_) => Some(LedStatus::WiFiConnecting),
                None => Some(LedStatus::Starting),
            },
            NetworkState::Provisioning => Some(LedStatus::Provisioning),
            NetworkState::Connected => Some(LedStatus::Operational),
            // Alert data on the strip stays as it is while offline
            NetworkState::Disconnected | NetworkState::ConnectionLost | NetworkState::Fault => {
                None
            }
        }
    }

    /// Handle a system event
    pub fn handle_event(&mut self, event: SystemEvent) -> StateTransition {
        let transition = self.get_state_transition(&event);

        match event {
            SystemEvent::CredentialsLoaded(credentials) => {
                self.credentials = Some(credentials);
            }
            SystemEvent::ConnectTimedOut => {
                self.clear_pending = true;
            }
            _ => {}
        }

        if let StateTransition::Transition(new_state) = transition {
            self.transition_to_state(new_state);
        }

        transition
    }

    /// Actions for one loop iteration at tick `now_ms`
    pub fn update(&mut self, now_ms: u32) -> Vec<Action> {
        let mut actions = Vec::new();

        if let Some(status) = self.get_led_status() {
            if self.shown_status != Some(status) {
                self.shown_status = Some(status);
                actions.push(Action::UpdateLEDStatus(status));
            }
        }

        match self.current_state {
            NetworkState::Uninitialized => match self.credentials {
                None => actions.push(Action::LoadCredentials),
                Some(_) => actions.push(Action::StartWiFiConnection),
            },

            NetworkState::Provisioning => {
                if self.clear_pending {
                    self.clear_pending = false;
                    actions.push(Action::ClearCredentials);
                }
                if self.portal_started {
                    actions.push(Action::ServicePortal);
                } else {
                    self.portal_started = true;
                    actions.push(Action::StartProvisioning);
                }
            }

            NetworkState::Connected => {
                actions.push(Action::MonitorConnection);
                if self.poll_timer.is_due(now_ms) {
                    self.poll_timer.mark(now_ms);
                    actions.push(Action::FetchAlerts);
                    actions.push(Action::RenderAlerts);
                }
            }

            // Classified and reported, but nothing acts on these states
            NetworkState::Disconnected | NetworkState::ConnectionLost | NetworkState::Fault => {
                if self.reported_state != Some(self.current_state) {
                    self.reported_state = Some(self.current_state);
                    actions.push(Action::ReportState(self.current_state));
                }
                actions.push(Action::MonitorConnection);
            }
        }

        actions
    }

    fn transition_to_state(&mut self, new_state: NetworkState) {
        if new_state != self.current_state {
            match new_state {
                NetworkState::Connected => info!("[STATE] Network connected"),
                NetworkState::Provisioning => info!("[STATE] Entering provisioning mode"),
                NetworkState::Disconnected | NetworkState::ConnectionLost | NetworkState::Fault => {
                    warn!("[STATE] Network state: {:?}", new_state);
                }
                NetworkState::Uninitialized => {}
            }

            if new_state == NetworkState::Connected {
                self.reported_state = None;
            }

            self.previous_state = Some(self.current_state);
            self.current_state = new_state;
        }
    }

    fn get_state_transition(&self, event: &SystemEvent) -> StateTransition {
        match (self.current_state, event) {
            // Boot: empty credentials go straight to the portal
            (NetworkState::Uninitialized, SystemEvent::CredentialsLoaded(credentials)) => {
                if credentials.is_configured() {
                    StateTransition::Stay
                } else {
                    StateTransition::Transition(NetworkState::Provisioning)
                }
            }

            // Boot association
            (NetworkState::Uninitialized, SystemEvent::WiFiConnected) => {
                StateTransition::Transition(NetworkState::Connected)
            }
            (NetworkState::Uninitialized, SystemEvent::ConnectTimedOut) => {
                StateTransition::Transition(NetworkState::Provisioning)
            }

            // Steady state classification, provisioning is only left by a restart
            (
                NetworkState::Connected
                | NetworkState::Disconnected
                | NetworkState::ConnectionLost
                | NetworkState::Fault,
                SystemEvent::StatusObserved(status),
            ) => {
                let next = classify(*status);
                if next == self.current_state {
                    StateTransition::Stay
                } else {
                    StateTransition::Transition(next)
                }
            }

            _ => StateTransition::Stay,
        }
    }

    /// Check whether the device is in the connected steady state
    pub fn is_operational(&self) -> bool {
        self.current_state == NetworkState::Connected
    }
}

impl Default for SystemStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
