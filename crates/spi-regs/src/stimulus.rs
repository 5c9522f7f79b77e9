//! Pin-level stimulus for exercising the peripheral in tests and the native runner.
//!
//! This mirrors how a bench drives the pins: chip-select asserted, then for every bit the clock
//! is held low with the data line set up for half a period and raised for the other half. It
//! produces one [`PinSample`] per local clock tick.

use thiserror::Error;

use crate::frame::FRAME_BITS;
use crate::pins::PinSample;

pub type Result<T> = std::result::Result<T, FrameError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("address {0:#x} does not fit the 7-bit address field")]
    AddressOutOfRange(u8),

    #[error("serial clock half-period of {0} ticks is shorter than two ticks")]
    HalfPeriodTooShort(u32),
}

/// Shortest clock phase the decoder can follow. With one tick, the last rising edge reaches the
/// edge detector on the same tick as the chip-select release and is dropped.
pub const MIN_HALF_PERIOD_TICKS: u32 = 2;

/// Released ticks appended after every chip-select window, even when `trail_ticks` is smaller. The
/// release takes one tick to enter the synchronizer and is acted on during the next.
pub const MIN_TRAIL_TICKS: u32 = 2;

/// A 16-bit frame: write-enable, 7-bit address, data byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Frame {
    word: u16,
}

impl Frame {
    pub const MAX_ADDRESS: u8 = 0x7F;

    pub fn new(write_enable: bool, address: u8, data: u8) -> Result<Self> {
        if address > Self::MAX_ADDRESS {
            return Err(FrameError::AddressOutOfRange(address));
        }
        let word = (write_enable as u16) | (u16::from(address) << 1) | (u16::from(data) << 8);
        Ok(Self { word })
    }

    /// A write frame (write-enable set).
    pub fn write(address: u8, data: u8) -> Result<Self> {
        Self::new(true, address, data)
    }

    /// Frame with bit `i` of `word` sent as the `i`-th bit on the wire.
    pub const fn from_word(word: u16) -> Self {
        Self { word }
    }

    pub const fn word(&self) -> u16 {
        self.word
    }

    pub fn write_enable(&self) -> bool {
        self.word & 1 != 0
    }

    pub fn address(&self) -> u8 {
        ((self.word >> 1) & 0x7F) as u8
    }

    pub fn data(&self) -> u8 {
        (self.word >> 8) as u8
    }

    /// Bits in wire order, first bit first.
    pub fn bits(&self) -> [bool; FRAME_BITS as usize] {
        std::array::from_fn(|i| (self.word >> i) & 1 != 0)
    }
}

/// Bus timing, in local clock ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BusTiming {
    /// Ticks per serial clock phase (low or high).
    pub half_period_ticks: u32,
    /// Ticks between chip-select assertion and the first clock-low phase.
    pub lead_ticks: u32,
    /// Idle ticks after chip-select release.
    pub trail_ticks: u32,
}

impl BusTiming {
    pub fn validate(&self) -> Result<()> {
        if self.half_period_ticks < MIN_HALF_PERIOD_TICKS {
            return Err(FrameError::HalfPeriodTooShort(self.half_period_ticks));
        }
        Ok(())
    }
}

impl Default for BusTiming {
    /// 10 MHz local clock against a 50 kHz serial clock, with a long settle after each frame.
    fn default() -> Self {
        Self {
            half_period_ticks: 50,
            lead_ticks: 1,
            trail_ticks: 600,
        }
    }
}

/// Tick-by-tick pin levels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Waveform {
    timing: BusTiming,
    samples: Vec<PinSample>,
}

impl Waveform {
    pub fn new(timing: BusTiming) -> Result<Self> {
        timing.validate()?;
        Ok(Self {
            timing,
            samples: Vec::new(),
        })
    }

    pub fn timing(&self) -> &BusTiming {
        &self.timing
    }

    fn hold(&mut self, pins: PinSample, ticks: u32) {
        let len = self.samples.len() + ticks as usize;
        self.samples.resize(len, pins);
    }

    /// Bus at rest for `ticks`.
    pub fn idle(&mut self, ticks: u32) -> &mut Self {
        self.hold(PinSample::IDLE, ticks);
        self
    }

    /// Hold arbitrary pin levels for `ticks`.
    pub fn pins(&mut self, pins: PinSample, ticks: u32) -> &mut Self {
        self.hold(pins, ticks);
        self
    }

    /// One chip-select window carrying `bits` (any count, for short or over-long frames).
    ///
    /// Chip-select stays released for at least [`MIN_TRAIL_TICKS`], so a waveform that ends with
    /// a frame still delivers it.
    pub fn bits(&mut self, bits: &[bool]) -> &mut Self {
        let half = self.timing.half_period_ticks;
        self.hold(PinSample::new(false, false, false), self.timing.lead_ticks);
        for &bit in bits {
            self.hold(PinSample::new(false, false, bit), half);
            self.hold(PinSample::new(false, true, bit), half);
        }
        self.hold(PinSample::IDLE, self.timing.trail_ticks.max(MIN_TRAIL_TICKS));
        self
    }

    pub fn frame(&mut self, frame: &Frame) -> &mut Self {
        self.bits(&frame.bits())
    }

    pub fn samples(&self) -> &[PinSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn into_samples(self) -> Vec<PinSample> {
        self.samples
    }
}

impl Extend<PinSample> for Waveform {
    fn extend<T: IntoIterator<Item = PinSample>>(&mut self, iter: T) {
        self.samples.extend(iter);
    }
}

impl IntoIterator for Waveform {
    type Item = PinSample;
    type IntoIter = std::vec::IntoIter<PinSample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.into_iter()
    }
}

impl<'a> IntoIterator for &'a Waveform {
    type Item = PinSample;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, PinSample>>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter().copied()
    }
}
