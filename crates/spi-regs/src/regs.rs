//! Configuration register bank and the commit step that writes it.

use crate::frame::Transaction;

/// Number of registers in the bank.
pub const REGISTER_COUNT: usize = 5;

/// Register addresses as carried in bits 1..=7 of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[repr(u8)]
pub enum Register {
    OutEnableLow = 0,
    OutEnableHigh = 1,
    PwmEnableLow = 2,
    PwmEnableHigh = 3,
    PwmDutyCycle = 4,
}

impl Register {
    pub const ALL: [Register; REGISTER_COUNT] = [
        Register::OutEnableLow,
        Register::OutEnableHigh,
        Register::PwmEnableLow,
        Register::PwmEnableHigh,
        Register::PwmDutyCycle,
    ];

    /// Map a 7-bit address field to a register. Addresses 5..=127 select nothing.
    pub fn from_address(address: u8) -> Option<Self> {
        Self::ALL.get(usize::from(address)).copied()
    }

    pub fn address(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Register::OutEnableLow => "out_enable_low",
            Register::OutEnableHigh => "out_enable_high",
            Register::PwmEnableLow => "pwm_enable_low",
            Register::PwmEnableHigh => "pwm_enable_high",
            Register::PwmDutyCycle => "pwm_duty_cycle",
        }
    }
}

impl std::fmt::Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The five 8-bit outputs consumed by downstream logic.
///
/// Readable at any time; only [`commit`] (and reset) change them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RegisterFile {
    out_enable_low: u8,
    out_enable_high: u8,
    pwm_enable_low: u8,
    pwm_enable_high: u8,
    pwm_duty_cycle: u8,
}

impl RegisterFile {
    pub const fn new() -> Self {
        Self {
            out_enable_low: 0,
            out_enable_high: 0,
            pwm_enable_low: 0,
            pwm_enable_high: 0,
            pwm_duty_cycle: 0,
        }
    }

    pub fn out_enable_low(&self) -> u8 {
        self.out_enable_low
    }

    pub fn out_enable_high(&self) -> u8 {
        self.out_enable_high
    }

    pub fn pwm_enable_low(&self) -> u8 {
        self.pwm_enable_low
    }

    pub fn pwm_enable_high(&self) -> u8 {
        self.pwm_enable_high
    }

    pub fn pwm_duty_cycle(&self) -> u8 {
        self.pwm_duty_cycle
    }

    pub fn get(&self, reg: Register) -> u8 {
        match reg {
            Register::OutEnableLow => self.out_enable_low,
            Register::OutEnableHigh => self.out_enable_high,
            Register::PwmEnableLow => self.pwm_enable_low,
            Register::PwmEnableHigh => self.pwm_enable_high,
            Register::PwmDutyCycle => self.pwm_duty_cycle,
        }
    }

    /// Values in address order.
    pub fn as_array(&self) -> [u8; REGISTER_COUNT] {
        Register::ALL.map(|reg| self.get(reg))
    }

    pub(crate) fn from_array(values: [u8; REGISTER_COUNT]) -> Self {
        let [out_enable_low, out_enable_high, pwm_enable_low, pwm_enable_high, pwm_duty_cycle] =
            values;
        Self {
            out_enable_low,
            out_enable_high,
            pwm_enable_low,
            pwm_enable_high,
            pwm_duty_cycle,
        }
    }

    pub(crate) fn set(&mut self, reg: Register, value: u8) {
        let slot = match reg {
            Register::OutEnableLow => &mut self.out_enable_low,
            Register::OutEnableHigh => &mut self.out_enable_high,
            Register::PwmEnableLow => &mut self.pwm_enable_low,
            Register::PwmEnableHigh => &mut self.pwm_enable_high,
            Register::PwmDutyCycle => &mut self.pwm_duty_cycle,
        };
        *slot = value;
    }
}

/// Why a finished frame did not write a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum RejectReason {
    /// Chip-select was released before 16 bits arrived.
    ShortFrame { bits: u8 },
    /// Bit 0 was clear.
    WriteDisabled,
    /// Address field outside 0..=4.
    InvalidAddress(u8),
}

/// Result of evaluating a finished frame. Local diagnostics only; nothing is sent back on the
/// bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FrameOutcome {
    Committed { register: Register, value: u8 },
    Rejected(RejectReason),
}

impl FrameOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, FrameOutcome::Committed { .. })
    }
}

/// Apply a finished frame to the register file.
///
/// A register is written only for a complete 16-bit frame with the write-enable bit set and an
/// address in `0..=4`. Anything else leaves every register untouched.
pub fn commit(regs: &mut RegisterFile, frame: &Transaction) -> FrameOutcome {
    if !frame.is_complete() {
        return FrameOutcome::Rejected(RejectReason::ShortFrame {
            bits: frame.count(),
        });
    }
    if !frame.write_enable() {
        return FrameOutcome::Rejected(RejectReason::WriteDisabled);
    }
    let address = frame.address();
    let Some(register) = Register::from_address(address) else {
        return FrameOutcome::Rejected(RejectReason::InvalidAddress(address));
    };

    let value = frame.data();
    regs.set(register, value);
    FrameOutcome::Committed { register, value }
}
