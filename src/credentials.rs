//! Credential store
//!
//! Keeps the station SSID and password in one fixed 96-byte record in flash:
//!
//! | bytes  | content                      |
//! |--------|------------------------------|
//! | 0..32  | SSID, zero padded            |
//! | 32..64 | password, zero padded        |
//! | 64..96 | reserved, always zero        |
//!
//! The record owns a whole erase sector, every commit erases it first.

use crate::BoardError;
use embedded_storage::nor_flash::NorFlash;
use heapless::String;
use log::{debug, info, warn};

/// Capacity of one text slot in bytes
pub const SLOT_LEN: usize = 32;

/// Size of the persisted record in bytes
pub const RECORD_LEN: usize = 96;

const SSID_SLOT: core::ops::Range<usize> = 0..SLOT_LEN;
const PASSWORD_SLOT: core::ops::Range<usize> = SLOT_LEN..2 * SLOT_LEN;

/// Station credentials
///
/// An empty SSID or password means "nothing configured".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub ssid: String<SLOT_LEN>,
    pub password: String<SLOT_LEN>,
}

impl Credentials {
    /// Build credentials, keeping at most the first 32 bytes of each field
    pub fn new(ssid: &str, password: &str) -> Self {
        Self {
            ssid: truncated(ssid),
            password: truncated(password),
        }
    }

    /// Both fields present
    pub fn is_configured(&self) -> bool {
        !self.ssid.is_empty() && !self.password.is_empty()
    }

    /// Encode into the persisted layout
    pub fn to_record(&self) -> [u8; RECORD_LEN] {
        let mut record = [0u8; RECORD_LEN];
        let ssid = self.ssid.as_bytes();
        let password = self.password.as_bytes();
        record[SSID_SLOT.start..SSID_SLOT.start + ssid.len()].copy_from_slice(ssid);
        record[PASSWORD_SLOT.start..PASSWORD_SLOT.start + password.len()]
            .copy_from_slice(password);
        record
    }

    /// Decode the persisted layout, trimming trailing whitespace and control bytes
    pub fn from_record(record: &[u8; RECORD_LEN]) -> Self {
        Self {
            ssid: decode_slot(&record[SSID_SLOT]),
            password: decode_slot(&record[PASSWORD_SLOT]),
        }
    }
}

/// Longest prefix of `text` that fits a slot without splitting a character
fn truncated(text: &str) -> String<SLOT_LEN> {
    let mut end = text.len().min(SLOT_LEN);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = String::new();
    // end <= SLOT_LEN, cannot overflow
    let _ = out.push_str(&text[..end]);
    out
}

fn decode_slot(slot: &[u8]) -> String<SLOT_LEN> {
    // 0x00 is padding, 0xFF is erased flash that was never written
    let end = slot
        .iter()
        .position(|&b| b == 0x00 || b == 0xFF)
        .unwrap_or(slot.len());
    let bytes = &slot[..end];
    let text = match core::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => core::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or(""),
    };
    truncated(text.trim_end_matches(|c: char| c.is_whitespace() || c.is_control()))
}

/// Credential store backed by a NOR flash sector
pub struct CredentialStore<F> {
    flash: F,
    offset: u32,
}

impl<F> CredentialStore<F>
where
    F: NorFlash,
{
    /// Create a store over the erase sector starting at `offset`
    pub fn new(flash: F, offset: u32) -> Self {
        Self { flash, offset }
    }

    /// Read the stored credentials
    ///
    /// There is no error path: an unreadable record reads as empty credentials,
    /// which routes the device into provisioning.
    pub fn read(&mut self) -> Credentials {
        let mut record = [0u8; RECORD_LEN];
        match self.flash.read(self.offset, &mut record) {
            Ok(()) => {
                let credentials = Credentials::from_record(&record);
                debug!(
                    "[STORE] Read credentials: ssid={} configured={}",
                    credentials.ssid,
                    credentials.is_configured()
                );
                credentials
            }
            Err(_) => {
                warn!("[STORE] Flash read failed, treating credentials as empty");
                Credentials::default()
            }
        }
    }

    /// Persist credentials; returns once the record is committed to flash
    pub fn write(&mut self, credentials: &Credentials) -> Result<(), BoardError> {
        info!("[STORE] Saving credentials for network: {}", credentials.ssid);
        self.commit(&credentials.to_record())
    }

    /// Overwrite the whole record with zeros
    pub fn clear(&mut self) -> Result<(), BoardError> {
        info!("[STORE] Clearing stored credentials");
        self.commit(&[0u8; RECORD_LEN])
    }

    /// Give the flash back, mostly for inspection in tests
    pub fn release(self) -> F {
        self.flash
    }

    fn commit(&mut self, record: &[u8; RECORD_LEN]) -> Result<(), BoardError> {
        let sector_end = self.offset + F::ERASE_SIZE as u32;
        self.flash
            .erase(self.offset, sector_end)
            .map_err(|_| BoardError::StorageError)?;
        self.flash
            .write(self.offset, record)
            .map_err(|_| BoardError::StorageError)
    }
}
