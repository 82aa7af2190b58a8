#![allow(dead_code)]

// filename according to https://doc.rust-lang.org/book/ch11-03-test-organization.html
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use alert_board_rs::BoardError;
use alert_board_rs::alert_fetcher::AlertSource;
use alert_board_rs::config;
use alert_board_rs::credentials::{CredentialStore, Credentials};
use alert_board_rs::device::Device;
use alert_board_rs::led_control::{LedController, PixelMap};
use alert_board_rs::portal::Portal;
use alert_board_rs::wifi::{Radio, RadioStatus};
use embedded_hal_async::delay::DelayNs;
use embedded_storage::nor_flash::{
    ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};
use smart_leds::{RGB8, SmartLedsWrite};

pub const FLASH_SECTOR_SIZE: usize = 4096;
pub const WORD_SIZE: usize = 4;
pub const STORE_OFFSET: u32 = FLASH_SECTOR_SIZE as u32;

#[derive(Default)]
pub struct Flash {
    pub buf: Vec<u8>,
    pub fail_after_operation: usize,
    pub operations: Vec<Operation>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Operation {
    Read { offset: u32, len: usize },
    Write { offset: u32, len: usize },
    Erase { offset: u32, len: usize },
}

impl Flash {
    pub fn new(pages: usize) -> Self {
        Self {
            buf: vec![0xffu8; FLASH_SECTOR_SIZE * pages],
            fail_after_operation: usize::MAX,
            ..Default::default()
        }
    }

    pub fn new_with_fault(pages: usize, fail_after_operation: usize) -> Self {
        Self {
            buf: vec![0xffu8; FLASH_SECTOR_SIZE * pages],
            fail_after_operation,
            ..Default::default()
        }
    }

    pub fn erases(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| matches!(op, Operation::Erase { .. }))
            .count()
    }
}

#[derive(Debug)]
pub struct FlashError;

impl NorFlashError for FlashError {
    fn kind(&self) -> NorFlashErrorKind {
        NorFlashErrorKind::Other
    }
}

impl ErrorType for Flash {
    type Error = FlashError;
}

impl ReadNorFlash for Flash {
    const READ_SIZE: usize = WORD_SIZE;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        assert_eq!(offset % Self::READ_SIZE as u32, 0);

        if self.operations.len() >= self.fail_after_operation {
            return Err(FlashError);
        }
        self.operations.push(Operation::Read {
            offset,
            len: bytes.len(),
        });

        let offset = offset as usize;
        bytes.copy_from_slice(&self.buf[offset..offset + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.buf.len()
    }
}

impl NorFlash for Flash {
    const WRITE_SIZE: usize = WORD_SIZE;

    const ERASE_SIZE: usize = FLASH_SECTOR_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        assert_eq!(from % Self::ERASE_SIZE as u32, 0);
        assert_eq!(to % Self::ERASE_SIZE as u32, 0);

        if self.operations.len() >= self.fail_after_operation {
            return Err(FlashError);
        }
        self.operations.push(Operation::Erase {
            offset: from,
            len: (to - from) as usize,
        });

        for addr in from..to {
            self.buf[addr as usize] = 0xff;
        }
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        assert_eq!(offset % Self::WRITE_SIZE as u32, 0);
        assert_eq!(bytes.len() % Self::WRITE_SIZE, 0);

        if self.operations.len() >= self.fail_after_operation {
            return Err(FlashError);
        }
        self.operations.push(Operation::Write {
            offset,
            len: bytes.len(),
        });

        let offset = offset as usize;
        for (i, &val) in bytes.iter().enumerate() {
            // NOR flash can only flip bits from 1 to 0
            self.buf[offset + i] &= val;
        }
        Ok(())
    }
}

/// Radio that replays a status script, then keeps answering `steady`
pub struct ScriptedRadio {
    pub script: VecDeque<RadioStatus>,
    pub steady: RadioStatus,
    pub station_starts: Vec<Credentials>,
    pub access_points: Vec<(String, String)>,
    pub status_calls: usize,
}

impl ScriptedRadio {
    pub fn new(steady: RadioStatus) -> Self {
        Self {
            script: VecDeque::new(),
            steady,
            station_starts: Vec::new(),
            access_points: Vec::new(),
            status_calls: 0,
        }
    }

    pub fn with_script(mut self, statuses: &[RadioStatus]) -> Self {
        self.script.extend(statuses.iter().copied());
        self
    }
}

impl Radio for ScriptedRadio {
    fn start_station(&mut self, credentials: &Credentials) -> Result<(), BoardError> {
        self.station_starts.push(credentials.clone());
        Ok(())
    }

    fn start_access_point(&mut self, ssid: &str, password: &str) -> Result<(), BoardError> {
        self.access_points
            .push((ssid.to_string(), password.to_string()));
        Ok(())
    }

    fn status(&mut self) -> RadioStatus {
        self.status_calls += 1;
        self.script.pop_front().unwrap_or(self.steady)
    }
}

/// LED writer that keeps every pushed frame
#[derive(Clone, Default)]
pub struct RecordingStrip {
    pub frames: Rc<RefCell<Vec<Vec<RGB8>>>>,
}

impl RecordingStrip {
    pub fn last_frame(&self) -> Option<Vec<RGB8>> {
        self.frames.borrow().last().cloned()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.borrow().len()
    }
}

impl SmartLedsWrite for RecordingStrip {
    type Error = BoardError;
    type Color = RGB8;

    fn write<T, I>(&mut self, iterator: T) -> Result<(), Self::Error>
    where
        T: IntoIterator<Item = I>,
        I: Into<Self::Color>,
    {
        let frame = iterator.into_iter().map(Into::into).collect();
        self.frames.borrow_mut().push(frame);
        Ok(())
    }
}

/// Alert endpoint answering from a queue; an empty queue is a transport error
#[derive(Default)]
pub struct CannedSource {
    pub responses: VecDeque<Result<Vec<u8>, BoardError>>,
    pub requests: usize,
}

impl CannedSource {
    pub fn respond(&mut self, status_line: &str, body: &str) {
        let raw = format!("{status_line}\r\nContent-Type: application/json\r\n\r\n{body}");
        self.responses.push_back(Ok(raw.into_bytes()));
    }

    pub fn fail(&mut self, error: BoardError) {
        self.responses.push_back(Err(error));
    }
}

impl AlertSource for CannedSource {
    async fn get(&mut self, buf: &mut [u8]) -> Result<usize, BoardError> {
        self.requests += 1;
        let raw = self
            .responses
            .pop_front()
            .unwrap_or(Err(BoardError::HttpError))?;
        let len = raw.len().min(buf.len());
        buf[..len].copy_from_slice(&raw[..len]);
        Ok(len)
    }
}

/// Portal whose submissions are injected by the test
#[derive(Default)]
pub struct StubPortal {
    pub starts: usize,
    pub pending: Option<Credentials>,
}

impl StubPortal {
    pub fn submit(&mut self, credentials: Credentials) {
        self.pending = Some(credentials);
    }
}

impl Portal for StubPortal {
    async fn start(&mut self) -> Result<(), BoardError> {
        self.starts += 1;
        Ok(())
    }

    fn poll(&mut self) -> Option<Credentials> {
        self.pending.take()
    }
}

/// Delay that only advances a shared simulated clock
#[derive(Clone, Default)]
pub struct SimDelay {
    pub elapsed_ns: Rc<Cell<u64>>,
}

impl SimDelay {
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ns.get() / 1_000_000
    }
}

impl DelayNs for SimDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns.set(self.elapsed_ns.get() + u64::from(ns));
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.elapsed_ns
            .set(self.elapsed_ns.get() + u64::from(ms) * 1_000_000);
    }
}

pub type TestDevice =
    Device<'static, ScriptedRadio, Flash, RecordingStrip, CannedSource, StubPortal, SimDelay>;

/// Handles kept by the test after the mocks move into the device
pub struct Harness {
    pub device: TestDevice,
    pub strip: RecordingStrip,
    pub delay: SimDelay,
}

/// Flash with `credentials` already committed, or factory erased for `None`
pub fn flash_with(credentials: Option<Credentials>) -> Flash {
    let mut store = CredentialStore::new(Flash::new(2), STORE_OFFSET);
    if let Some(credentials) = credentials {
        store.write(&credentials).unwrap();
    }
    let mut flash = store.release();
    flash.operations.clear();
    flash
}

pub fn harness(
    credentials: Option<Credentials>,
    radio: ScriptedRadio,
    pixel_regions: &'static [u16],
) -> Harness {
    let strip = RecordingStrip::default();
    let delay = SimDelay::default();
    let map = PixelMap::new(pixel_regions, config::REGIONS_COUNT).unwrap();
    let device = Device::new(
        CredentialStore::new(flash_with(credentials), STORE_OFFSET),
        LedController::new(strip.clone(), map),
        radio,
        CannedSource::default(),
        StubPortal::default(),
        delay.clone(),
    );
    Harness {
        device,
        strip,
        delay,
    }
}
