//! Device context
//!
//! Owns the state machine and every collaborator it drives, and runs one
//! cooperative loop iteration per [`Device::step`]. Nothing here is shared or
//! locked: the loop is the only writer of the alert buffer and network state.

use crate::alert_fetcher::{AlertSource, fetch_alerts};
use crate::config;
use crate::credentials::CredentialStore;
use crate::led_control::LedController;
use crate::portal::Portal;
use crate::state_machine::{Action, SystemEvent, SystemStateMachine};
use crate::wifi::{ConnectOutcome, Radio, connect_with_timeout};
use embedded_hal_async::delay::DelayNs;
use embedded_storage::nor_flash::NorFlash;
use log::{error, info, warn};
use smart_leds::{RGB8, SmartLedsWrite};

/// What the caller has to do after a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    /// New credentials are committed, reset the chip
    Restart,
}

/// Everything one loop iteration needs
pub struct Device<'a, R, F, W, A, P, D> {
    state_machine: SystemStateMachine,
    store: CredentialStore<F>,
    leds: LedController<'a, W>,
    radio: R,
    source: A,
    portal: P,
    delay: D,
}

impl<'a, R, F, W, A, P, D> Device<'a, R, F, W, A, P, D>
where
    R: Radio,
    F: NorFlash,
    W: SmartLedsWrite<Color = RGB8>,
    A: AlertSource,
    P: Portal,
    D: DelayNs,
{
    pub fn new(
        store: CredentialStore<F>,
        leds: LedController<'a, W>,
        radio: R,
        source: A,
        portal: P,
        delay: D,
    ) -> Self {
        Self {
            state_machine: SystemStateMachine::new(),
            store,
            leds,
            radio,
            source,
            portal,
            delay,
        }
    }

    pub fn state_machine(&self) -> &SystemStateMachine {
        &self.state_machine
    }

    pub fn store_mut(&mut self) -> &mut CredentialStore<F> {
        &mut self.store
    }

    pub fn leds(&self) -> &LedController<'a, W> {
        &self.leds
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn source_mut(&mut self) -> &mut A {
        &mut self.source
    }

    pub fn portal_mut(&mut self) -> &mut P {
        &mut self.portal
    }

    /// Run one loop iteration at tick `now_ms`
    pub async fn step(&mut self, now_ms: u32) -> StepOutcome {
        let actions = self.state_machine.update(now_ms);
        for action in actions {
            if self.execute(action).await == StepOutcome::Restart {
                return StepOutcome::Restart;
            }
        }
        StepOutcome::Continue
    }

    async fn execute(&mut self, action: Action) -> StepOutcome {
        match action {
            Action::UpdateLEDStatus(status) => {
                if let Err(e) = self.leds.set_status(status) {
                    warn!("[LED] Status fill failed: {}", e);
                }
            }
            Action::LoadCredentials => {
                let credentials = self.store.read();
                self.state_machine
                    .handle_event(SystemEvent::CredentialsLoaded(credentials));
            }
            Action::StartWiFiConnection => {
                let Some(credentials) = self.state_machine.credentials().cloned() else {
                    return StepOutcome::Continue;
                };
                let event =
                    match connect_with_timeout(&mut self.radio, &credentials, &mut self.delay)
                        .await
                    {
                        ConnectOutcome::Connected { .. } => SystemEvent::WiFiConnected,
                        ConnectOutcome::TimedOut { .. } => SystemEvent::ConnectTimedOut,
                    };
                self.state_machine.handle_event(event);
            }
            Action::ClearCredentials => {
                info!("[STORE] Clearing credentials after failed connection");
                if let Err(e) = self.store.clear() {
                    error!("[STORE] Clear failed: {}", e);
                }
            }
            Action::StartProvisioning => {
                info!("[PORTAL] Starting access point {}", config::AP_SSID);
                if let Err(e) = self
                    .radio
                    .start_access_point(config::AP_SSID, config::AP_PASSWORD)
                {
                    error!("[PORTAL] Access point failed: {}", e);
                }
                if let Err(e) = self.portal.start().await {
                    error!("[PORTAL] Portal services failed: {}", e);
                }
            }
            Action::ServicePortal => {
                if let Some(credentials) = self.portal.poll() {
                    if let Err(e) = self.store.write(&credentials) {
                        error!("[STORE] Saving credentials failed: {}", e);
                    }
                    info!(
                        "[PORTAL] Restarting in {} ms",
                        config::RESTART_DELAY_MS
                    );
                    self.delay.delay_ms(config::RESTART_DELAY_MS).await;
                    return StepOutcome::Restart;
                }
            }
            Action::MonitorConnection => {
                let status = self.radio.status();
                self.state_machine
                    .handle_event(SystemEvent::StatusObserved(status));
            }
            Action::FetchAlerts => {
                // A status check earlier in this step may have seen the link drop
                if self.state_machine.is_operational() {
                    fetch_alerts(&mut self.source, self.state_machine.alert_pattern_mut()).await;
                }
            }
            Action::RenderAlerts => {
                if self.state_machine.is_operational() {
                    if let Err(e) = self.leds.render(self.state_machine.alert_pattern()) {
                        warn!("[LED] Render failed: {}", e);
                    }
                }
            }
            Action::ReportState(state) => {
                warn!("[STATE] {:?}, no corrective action", state);
            }
        }
        StepOutcome::Continue
    }
}
