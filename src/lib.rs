#![cfg_attr(not(test), no_std)]
#![allow(async_fn_in_trait)]

//! ESP32-C3 Alert Map Board Library
//!
//! This library provides modules for a self-provisioning status display: it keeps
//! WiFi credentials in flash, runs a setup portal when they are missing or wrong,
//! and once connected polls a remote endpoint for the per-region alert pattern and
//! renders it onto a WS2812 strip.
//!
//! Everything except the `esp32c3` board layer builds on the host, so the state
//! machine and its collaborators are tested without hardware.

extern crate alloc;

pub mod alert_fetcher;
pub mod alert_pattern;
pub mod credentials;
pub mod device;
pub mod http;
pub mod led_control;
pub mod portal;
pub mod state_machine;
pub mod wifi;

/// Project version information
pub const VERSION: &str = "0.1.0-dev";

/// Default configuration constants
pub mod config {
    use smart_leds::RGB8;

    /// Number of alert regions carried in the pattern
    pub const REGIONS_COUNT: usize = 130;

    /// Minimum time between two alert fetches in milliseconds
    pub const FETCH_INTERVAL_MS: u32 = 10_000;

    /// WiFi association timeout in milliseconds
    pub const CONNECT_TIMEOUT_MS: u32 = 30_000;

    /// Interval between two association status checks in milliseconds
    pub const CONNECT_POLL_INTERVAL_MS: u32 = 500;

    /// Delay between saving credentials and restarting, lets the flash commit
    /// and the HTTP response flush
    pub const RESTART_DELAY_MS: u32 = 2_000;

    /// Default LED data GPIO pin
    pub const LED_DATA_PIN: u8 = 4;

    /// Setup access point, read from environment variables at compile time
    pub const AP_SSID: &str = env!("AP_SSID");
    pub const AP_PASSWORD: &str = env!("AP_PASSWORD");

    /// Remote alert endpoint, read from environment variables at compile time
    pub const ALERT_URL: &str = env!("ALERT_URL");

    /// Address of the board on its own access point
    pub const PORTAL_IP: [u8; 4] = [192, 168, 4, 1];

    /// Portal HTTP port
    pub const HTTP_PORT: u16 = 80;

    /// Captive DNS port
    pub const DNS_PORT: u16 = 53;

    /// Flash offset of the 96-byte credential record (start of the `nvs` partition,
    /// which this firmware does not otherwise use)
    pub const CREDENTIALS_FLASH_OFFSET: u32 = 0x9000;

    /// Pixel color for an active region
    pub const ALERT_COLOR: RGB8 = RGB8 { r: 160, g: 0, b: 0 };

    /// Pixel color for an inactive region
    pub const NORMAL_COLOR: RGB8 = RGB8 { r: 0, g: 24, b: 0 };

    /// Status fill colors shown before per-region data is available
    pub const STARTING_COLOR: RGB8 = RGB8 { r: 0, g: 0, b: 48 };
    pub const CONNECTING_COLOR: RGB8 = RGB8 { r: 48, g: 32, b: 0 };
    pub const PROVISIONING_COLOR: RGB8 = RGB8 { r: 40, g: 0, b: 40 };

    /// Region shown by each physical pixel, in strip order. Several pixels may
    /// share a region. Empty means one pixel per region.
    pub const PIXEL_REGIONS: &[u16] = &[];
}

/// Error types for the alert map board
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    /// WiFi connection error
    #[error("WiFi radio error")]
    WiFiError,
    /// Flash read, erase or write failed
    #[error("credential storage error")]
    StorageError,
    /// LED control error
    #[error("LED transmission error")]
    LedError,
    /// Transport level failure while talking to the alert endpoint
    #[error("HTTP transport error")]
    HttpError,
    /// Protocol parsing error
    #[error("malformed HTTP message")]
    ProtocolError,
    /// The compiled-in alert URL cannot be used
    #[error("unsupported alert URL")]
    InvalidUrl,
    /// A pixel points past the end of the region table
    #[error("pixel {pixel} maps to region {region}, outside the region table")]
    InvalidPixelMap { pixel: usize, region: u16 },
    /// Setup portal could not be started
    #[error("setup portal error")]
    PortalError,
}
