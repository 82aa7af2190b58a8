use crate::BoardError;
use crate::alert_pattern::AlertPattern;
use crate::config;
use log::{debug, info};
use smart_leds::{RGB8, SmartLedsWrite};

/// LED status states for visual feedback before alert data is available
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedStatus {
    /// Booting, credentials not read yet
    Starting,
    /// Associating with the stored network
    WiFiConnecting,
    /// Setup portal running
    Provisioning,
    /// Connected, every region shown as normal until the first fetch
    Operational,
}

impl LedStatus {
    /// Uniform fill color for this status
    pub fn color(self) -> RGB8 {
        match self {
            LedStatus::Starting => config::STARTING_COLOR,
            LedStatus::WiFiConnecting => config::CONNECTING_COLOR,
            LedStatus::Provisioning => config::PROVISIONING_COLOR,
            LedStatus::Operational => config::NORMAL_COLOR,
        }
    }
}

/// Physical pixel to region table
///
/// Many-to-one is allowed: several pixels may show the same region. Validated
/// once when built, so rendering never indexes out of bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelMap<'a> {
    /// Pixel `i` shows region `i`
    Identity(usize),
    /// Pixel `i` shows region `table[i]`
    Table(&'a [u16]),
}

impl<'a> PixelMap<'a> {
    /// Validate `table` against the region count; an empty table is the identity
    pub fn new(table: &'a [u16], region_count: usize) -> Result<Self, BoardError> {
        if table.is_empty() {
            return Ok(PixelMap::Identity(region_count));
        }
        for (pixel, &region) in table.iter().enumerate() {
            if usize::from(region) >= region_count {
                return Err(BoardError::InvalidPixelMap { pixel, region });
            }
        }
        Ok(PixelMap::Table(table))
    }

    /// Number of physical pixels
    pub fn pixel_count(&self) -> usize {
        match self {
            PixelMap::Identity(count) => *count,
            PixelMap::Table(table) => table.len(),
        }
    }

    /// Region shown by `pixel`
    pub fn region(&self, pixel: usize) -> usize {
        match self {
            PixelMap::Identity(_) => pixel,
            PixelMap::Table(table) => usize::from(table[pixel]),
        }
    }
}

/// LED controller: status fills and alert rendering over any smart LED writer
pub struct LedController<'a, W> {
    writer: W,
    map: PixelMap<'a>,
    status: Option<LedStatus>,
}

impl<'a, W> LedController<'a, W>
where
    W: SmartLedsWrite<Color = RGB8>,
{
    /// Create a new LED controller
    pub fn new(writer: W, map: PixelMap<'a>) -> Self {
        info!("[LED] Controller ready for {} pixels", map.pixel_count());
        Self {
            writer,
            map,
            status: None,
        }
    }

    /// Show a coarse status as a uniform fill
    pub fn set_status(&mut self, status: LedStatus) -> Result<(), BoardError> {
        debug!("[LED] Status: {:?}", status);
        self.status = Some(status);
        self.fill(status.color())
    }

    /// Get current status, `None` once alert data has been rendered
    pub fn get_status(&self) -> Option<LedStatus> {
        self.status
    }

    /// Set every pixel to `color` in one push
    pub fn fill(&mut self, color: RGB8) -> Result<(), BoardError> {
        let count = self.map.pixel_count();
        self.writer
            .write(core::iter::repeat_n(color, count))
            .map_err(|_| BoardError::LedError)
    }

    /// Render the alert pattern through the pixel map in one push
    pub fn render(&mut self, pattern: &AlertPattern) -> Result<(), BoardError> {
        self.status = None;
        let map = self.map;
        let pixels = (0..map.pixel_count()).map(|pixel| {
            if pattern.is_active(map.region(pixel)) {
                config::ALERT_COLOR
            } else {
                config::NORMAL_COLOR
            }
        });
        self.writer.write(pixels).map_err(|_| BoardError::LedError)
    }

    pub fn pixel_map(&self) -> &PixelMap<'a> {
        &self.map
    }

    /// Give the writer back, mostly for inspection in tests
    pub fn release(self) -> W {
        self.writer
    }
}

#[cfg(feature = "esp32c3")]
pub use board::RmtLedStrip;

#[cfg(feature = "esp32c3")]
mod board {
    use crate::BoardError;
    use alloc::vec;
    use esp_hal::gpio::Level;
    use esp_hal::rmt::{PulseCode, TxChannel};
    use log::warn;
    use smart_leds::{RGB8, SmartLedsWrite};

    /// Conservative pulse limit for stable operation
    const MAX_SAFE_PULSES: usize = 4000;

    /// WS2812 strip driven by one RMT channel at 10 MHz
    pub struct RmtLedStrip<TX>
    where
        TX: TxChannel,
    {
        channel: Option<TX>,
    }

    impl<TX> RmtLedStrip<TX>
    where
        TX: TxChannel,
    {
        pub fn new(channel: TX) -> Self {
            Self {
                channel: Some(channel),
            }
        }

        /// Forward raw GRB bytes to hardware
        fn forward_raw_stream(&mut self, data: &[u8]) -> Result<(), BoardError> {
            let total_pulses_needed = data.len() * 8 + 1; // 8 pulses per byte + reset

            let actual_data = if total_pulses_needed > MAX_SAFE_PULSES {
                let max_safe_bytes = (MAX_SAFE_PULSES - 1) / 8; // Reserve 1 pulse for reset
                let safe_bytes = max_safe_bytes - max_safe_bytes % 3; // complete LEDs only
                &data[..safe_bytes]
            } else {
                data
            };

            let mut pulses = vec::Vec::with_capacity(actual_data.len() * 8 + 1);
            for &byte in actual_data {
                pulses.extend_from_slice(&byte_to_pulses(byte));
            }

            // Add reset pulse
            pulses.push(PulseCode::new(Level::Low, 800, Level::Low, 0));

            if let Some(channel) = self.channel.take() {
                match channel.transmit(&pulses) {
                    Ok(transaction) => match transaction.wait() {
                        Ok(channel) => {
                            self.channel = Some(channel);
                            Ok(())
                        }
                        Err((e, channel)) => {
                            self.channel = Some(channel);
                            warn!("[LED] RMT transmission did not complete: {:?}", e);
                            Err(BoardError::LedError)
                        }
                    },
                    Err(e) => {
                        warn!("[LED] RMT transmission failed to start: {:?}", e);
                        Err(BoardError::LedError)
                    }
                }
            } else {
                Err(BoardError::LedError)
            }
        }
    }

    impl<TX> SmartLedsWrite for RmtLedStrip<TX>
    where
        TX: TxChannel,
    {
        type Error = BoardError;
        type Color = RGB8;

        fn write<T, I>(&mut self, iterator: T) -> Result<(), Self::Error>
        where
            T: IntoIterator<Item = I>,
            I: Into<Self::Color>,
        {
            let mut data = vec::Vec::new();
            for color in iterator {
                let color: RGB8 = color.into();
                data.extend_from_slice(&[color.g, color.r, color.b]);
            }
            self.forward_raw_stream(&data)
        }
    }

    /// Convert a single byte to RMT pulses
    /// WS2812 timing at 10MHz: 1-bit = 8 high + 4 low cycles, 0-bit = 4 high + 8 low cycles
    fn byte_to_pulses(byte: u8) -> [u32; 8] {
        let mut pulses = [0u32; 8];

        for (i, pulse) in pulses.iter_mut().enumerate() {
            let bit = (byte >> (7 - i)) & 1;
            *pulse = if bit == 1 {
                PulseCode::new(Level::High, 8, Level::Low, 4)
            } else {
                PulseCode::new(Level::High, 4, Level::Low, 8)
            };
        }

        pulses
    }
}
