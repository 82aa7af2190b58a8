//! WiFi module for ESP32-C3 board
//!
//! Owns the radio mode transitions: station association with a deadline, the
//! setup access point, and classification of the radio status into a
//! [`NetworkState`].

use crate::BoardError;
use crate::config;
use crate::credentials::Credentials;
use crate::state_machine::NetworkState;
use embedded_hal_async::delay::DelayNs;
use log::{info, warn};

/// Raw radio status as reported by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioStatus {
    /// Running the setup access point
    AccessPoint,
    /// Station associated
    Connected,
    /// Station was associated and dropped
    ConnectionLost,
    /// Station not associated (yet)
    Disconnected,
    /// Driver stopped, failed or returned something unexpected
    Unknown,
}

/// Radio operations the connection manager needs
pub trait Radio {
    /// Switch to station mode and begin associating with `credentials`
    fn start_station(&mut self, credentials: &Credentials) -> Result<(), BoardError>;

    /// Switch to access point mode
    fn start_access_point(&mut self, ssid: &str, password: &str) -> Result<(), BoardError>;

    /// Current radio status
    fn status(&mut self) -> RadioStatus;
}

/// Result of a boot time association attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected { waited_ms: u32 },
    TimedOut { waited_ms: u32 },
}

/// Associate with the stored network, polling every 500 ms for up to 30 s
///
/// A driver error while starting the station counts as a failed attempt, so a
/// stored credential the driver rejects falls back to provisioning as well.
pub async fn connect_with_timeout<R, D>(
    radio: &mut R,
    credentials: &Credentials,
    delay: &mut D,
) -> ConnectOutcome
where
    R: Radio,
    D: DelayNs,
{
    info!("[WIFI] Connecting to WiFi network: {}", credentials.ssid);

    if let Err(e) = radio.start_station(credentials) {
        warn!("[WIFI] Station start failed: {}", e);
        return ConnectOutcome::TimedOut { waited_ms: 0 };
    }

    let mut waited_ms = 0;
    loop {
        if radio.status() == RadioStatus::Connected {
            info!("[WIFI] Successfully connected after {} ms", waited_ms);
            return ConnectOutcome::Connected { waited_ms };
        }
        if waited_ms >= config::CONNECT_TIMEOUT_MS {
            warn!(
                "[WIFI] Failed to connect to WiFi network within {} ms",
                config::CONNECT_TIMEOUT_MS
            );
            return ConnectOutcome::TimedOut { waited_ms };
        }
        delay.delay_ms(config::CONNECT_POLL_INTERVAL_MS).await;
        waited_ms += config::CONNECT_POLL_INTERVAL_MS;
    }
}

/// Steady state classification of the radio status
pub fn classify(status: RadioStatus) -> NetworkState {
    match status {
        RadioStatus::AccessPoint => NetworkState::Provisioning,
        RadioStatus::Connected => NetworkState::Connected,
        RadioStatus::ConnectionLost => NetworkState::ConnectionLost,
        RadioStatus::Disconnected => NetworkState::Disconnected,
        RadioStatus::Unknown => NetworkState::Fault,
    }
}

#[cfg(feature = "esp32c3")]
pub use board::WiFiManager;

#[cfg(feature = "esp32c3")]
mod board {
    use super::{Radio, RadioStatus};
    use crate::BoardError;
    use crate::credentials::Credentials;
    use esp_wifi::wifi::{
        AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration, WifiController,
    };
    use log::{info, warn};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Mode {
        Idle,
        Station,
        AccessPoint,
    }

    /// WiFi manager on top of the esp-wifi controller
    pub struct WiFiManager<'a> {
        controller: WifiController<'a>,
        mode: Mode,
        was_connected: bool,
    }

    impl<'a> WiFiManager<'a> {
        /// Create a new WiFi manager instance
        pub fn new(controller: WifiController<'a>) -> Self {
            Self {
                controller,
                mode: Mode::Idle,
                was_connected: false,
            }
        }

        fn restart_with(&mut self, configuration: &Configuration) -> Result<(), BoardError> {
            if self.mode != Mode::Idle {
                self.controller.stop().map_err(|_| BoardError::WiFiError)?;
            }
            self.controller
                .set_configuration(configuration)
                .map_err(|_| BoardError::WiFiError)?;
            self.controller.start().map_err(|_| BoardError::WiFiError)
        }
    }

    impl Radio for WiFiManager<'_> {
        fn start_station(&mut self, credentials: &Credentials) -> Result<(), BoardError> {
            let client_config = ClientConfiguration {
                ssid: credentials
                    .ssid
                    .as_str()
                    .try_into()
                    .map_err(|_| BoardError::WiFiError)?,
                password: credentials
                    .password
                    .as_str()
                    .try_into()
                    .map_err(|_| BoardError::WiFiError)?,
                auth_method: AuthMethod::WPA2Personal,
                ..Default::default()
            };

            self.restart_with(&Configuration::Client(client_config))?;
            self.mode = Mode::Station;
            self.was_connected = false;
            self.controller.connect().map_err(|_| BoardError::WiFiError)
        }

        fn start_access_point(&mut self, ssid: &str, password: &str) -> Result<(), BoardError> {
            let ap_config = AccessPointConfiguration {
                ssid: ssid.try_into().map_err(|_| BoardError::WiFiError)?,
                password: password.try_into().map_err(|_| BoardError::WiFiError)?,
                auth_method: AuthMethod::WPA2Personal,
                ..Default::default()
            };

            self.restart_with(&Configuration::AccessPoint(ap_config))?;
            self.mode = Mode::AccessPoint;
            info!("[WIFI] Access point started: {}", ssid);
            Ok(())
        }

        fn status(&mut self) -> RadioStatus {
            match self.mode {
                Mode::AccessPoint => RadioStatus::AccessPoint,
                Mode::Idle => RadioStatus::Unknown,
                Mode::Station => match self.controller.is_connected() {
                    Ok(true) => {
                        self.was_connected = true;
                        RadioStatus::Connected
                    }
                    Ok(false) if self.was_connected => RadioStatus::ConnectionLost,
                    Ok(false) => RadioStatus::Disconnected,
                    Err(e) => {
                        warn!("[WIFI] Controller status error: {:?}", e);
                        RadioStatus::Unknown
                    }
                },
            }
        }
    }
}
