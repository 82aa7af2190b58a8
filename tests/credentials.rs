mod common;

use alert_board_rs::BoardError;
use alert_board_rs::credentials::{CredentialStore, Credentials, RECORD_LEN};
use common::{FLASH_SECTOR_SIZE, Flash, Operation, STORE_OFFSET};
use pretty_assertions::assert_eq;

fn record(flash: &Flash) -> &[u8] {
    let start = STORE_OFFSET as usize;
    &flash.buf[start..start + RECORD_LEN]
}

#[test]
fn write_then_read_after_reboot() {
    let mut store = CredentialStore::new(Flash::new(2), STORE_OFFSET);
    store
        .write(&Credentials::new("Office WiFi", "correct horse"))
        .unwrap();

    // A fresh store over the same flash stands in for a reboot
    let mut store = CredentialStore::new(store.release(), STORE_OFFSET);
    let credentials = store.read();
    assert_eq!(credentials.ssid.as_str(), "Office WiFi");
    assert_eq!(credentials.password.as_str(), "correct horse");
    assert!(credentials.is_configured());
}

#[test]
fn write_commits_a_zero_padded_record() {
    let mut store = CredentialStore::new(Flash::new(2), STORE_OFFSET);
    store.write(&Credentials::new("net", "pw")).unwrap();
    let flash = store.release();

    assert_eq!(
        flash.operations,
        vec![
            Operation::Erase {
                offset: STORE_OFFSET,
                len: FLASH_SECTOR_SIZE
            },
            Operation::Write {
                offset: STORE_OFFSET,
                len: RECORD_LEN
            },
        ]
    );
    let record = record(&flash);
    assert_eq!(&record[..3], b"net");
    assert!(record[3..32].iter().all(|&b| b == 0));
    assert_eq!(&record[32..34], b"pw");
    assert!(record[34..].iter().all(|&b| b == 0));
    // Neighbouring sectors are untouched
    assert!(flash.buf[..FLASH_SECTOR_SIZE].iter().all(|&b| b == 0xff));
}

#[test]
fn overlong_fields_read_back_truncated() {
    let ssid = "a-very-long-network-name-that-goes-past-32";
    let password = "p".repeat(40);
    let mut store = CredentialStore::new(Flash::new(2), STORE_OFFSET);
    store.write(&Credentials::new(ssid, &password)).unwrap();

    let credentials = store.read();
    assert_eq!(credentials.ssid.as_str(), &ssid[..32]);
    assert_eq!(credentials.password.as_str(), &password[..32]);
}

#[test]
fn clear_zeroes_the_record_and_is_idempotent() {
    let mut store = CredentialStore::new(Flash::new(2), STORE_OFFSET);
    store.write(&Credentials::new("net", "pw")).unwrap();

    store.clear().unwrap();
    assert_eq!(store.read(), Credentials::default());
    store.clear().unwrap();
    assert_eq!(store.read(), Credentials::default());

    let flash = store.release();
    assert!(record(&flash).iter().all(|&b| b == 0));
    assert_eq!(flash.erases(), 3);
}

#[test]
fn factory_erased_flash_is_unconfigured() {
    let mut store = CredentialStore::new(Flash::new(2), STORE_OFFSET);
    let credentials = store.read();
    assert_eq!(credentials, Credentials::default());
    assert!(!credentials.is_configured());
}

#[test]
fn empty_password_is_the_unconfigured_sentinel() {
    let mut store = CredentialStore::new(Flash::new(2), STORE_OFFSET);
    store.write(&Credentials::new("net", "")).unwrap();
    let credentials = store.read();
    assert_eq!(credentials.ssid.as_str(), "net");
    assert!(!credentials.is_configured());
}

#[test]
fn flash_faults_surface_as_storage_errors() {
    let mut store = CredentialStore::new(Flash::new_with_fault(2, 0), STORE_OFFSET);
    assert_eq!(
        store.write(&Credentials::new("net", "pw")),
        Err(BoardError::StorageError)
    );
    assert_eq!(store.clear(), Err(BoardError::StorageError));
    // Reads never fail, they fall back to "nothing configured"
    assert_eq!(store.read(), Credentials::default());
}
