//! Raw input pins, as seen by the peripheral on one local clock tick.
//!
//! The three serial inputs are asynchronous to the local clock. Nothing in the model reads a
//! [`PinSample`] directly except the [`Synchronizer`](crate::sync::Synchronizer), which resamples
//! it into the local clock domain.

/// Bit position of the serial clock in the packed `ui_in` input port.
pub const UI_IN_SCLK_BIT: u8 = 0;
/// Bit position of the serial data line (controller out, peripheral in).
pub const UI_IN_COPI_BIT: u8 = 1;
/// Bit position of the active-low chip-select.
pub const UI_IN_NCS_BIT: u8 = 2;

/// One tick's worth of raw pin levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PinSample {
    /// Chip-select, active low: `false` means a frame is in progress.
    pub cs_n: bool,
    /// Serial clock; a rising edge transfers one bit.
    pub sclk: bool,
    /// Serial data line.
    pub copi: bool,
}

impl PinSample {
    /// Bus at rest: chip-select released, clock and data low.
    pub const IDLE: Self = Self {
        cs_n: true,
        sclk: false,
        copi: false,
    };

    pub const fn new(cs_n: bool, sclk: bool, copi: bool) -> Self {
        Self { cs_n, sclk, copi }
    }

    /// Decode the packed `ui_in` port. Bits 3..=7 are not connected.
    pub const fn from_ui_in(ui_in: u8) -> Self {
        Self {
            cs_n: (ui_in >> UI_IN_NCS_BIT) & 1 != 0,
            sclk: (ui_in >> UI_IN_SCLK_BIT) & 1 != 0,
            copi: (ui_in >> UI_IN_COPI_BIT) & 1 != 0,
        }
    }

    pub const fn to_ui_in(self) -> u8 {
        ((self.cs_n as u8) << UI_IN_NCS_BIT)
            | ((self.sclk as u8) << UI_IN_SCLK_BIT)
            | ((self.copi as u8) << UI_IN_COPI_BIT)
    }
}

impl Default for PinSample {
    fn default() -> Self {
        Self::IDLE
    }
}

impl From<u8> for PinSample {
    fn from(ui_in: u8) -> Self {
        Self::from_ui_in(ui_in)
    }
}
