//! Frame decoder: assembles serially shifted bits into a 16-bit transaction word.
//!
//! Wire layout, in order of arrival (bit 0 first):
//!
//! ```text
//!  bit:  0    1 ........ 7    8 ........ 15
//!       [WE] [ address (LSB first) ] [ data (LSB first) ]
//! ```
//!
//! The decoder only reacts to edges seen through the [`Synchronizer`]. It is evaluated with the
//! synchronized samples as they stood at the start of the tick, like a clocked register whose
//! next-state logic reads the current flop outputs.

use crate::sync::Synchronizer;

/// Number of bits in a complete frame.
pub const FRAME_BITS: u8 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DecoderState {
    #[default]
    Idle,
    Receiving,
}

impl DecoderState {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Receiving => 1,
        }
    }

    pub(crate) fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Idle),
            1 => Some(Self::Receiving),
            _ => None,
        }
    }
}

/// Bits captured so far in the current (or last) frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Transaction {
    bits: u16,
    count: u8,
}

impl Transaction {
    pub const fn new() -> Self {
        Self { bits: 0, count: 0 }
    }

    /// Rebuild a transaction from its raw parts. `count` must not exceed [`FRAME_BITS`], and no
    /// bit at or above `count` may be set.
    pub fn from_parts(bits: u16, count: u8) -> Option<Self> {
        if count > FRAME_BITS {
            return None;
        }
        if count < FRAME_BITS && bits >> count != 0 {
            return None;
        }
        Some(Self { bits, count })
    }

    /// Store `bit` at position `count` and advance. Once the buffer holds [`FRAME_BITS`] bits it
    /// is frozen and further bits are dropped (returns `false`).
    pub fn capture(&mut self, bit: bool) -> bool {
        if self.is_complete() {
            return false;
        }
        self.bits |= (bit as u16) << self.count;
        self.count += 1;
        true
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    pub fn bits(&self) -> u16 {
        self.bits
    }

    pub fn count(&self) -> u8 {
        self.count
    }

    pub fn is_complete(&self) -> bool {
        self.count == FRAME_BITS
    }

    /// Bit 0, the write-enable flag.
    pub fn write_enable(&self) -> bool {
        self.bits & 1 != 0
    }

    /// Bits 1..=7, the register address.
    pub fn address(&self) -> u8 {
        ((self.bits >> 1) & 0x7F) as u8
    }

    /// Bits 8..=15, the data byte.
    pub fn data(&self) -> u8 {
        (self.bits >> 8) as u8
    }
}

/// Idle/Receiving state machine plus the transaction buffer it fills.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameDecoder {
    state: DecoderState,
    transaction: Transaction,
}

impl FrameDecoder {
    pub const fn new() -> Self {
        Self {
            state: DecoderState::Idle,
            transaction: Transaction::new(),
        }
    }

    pub(crate) fn from_parts(state: DecoderState, transaction: Transaction) -> Self {
        Self { state, transaction }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Advance one tick. Returns the finished transaction when chip-select is released, whether
    /// or not it carries a full frame; the caller decides what to do with it.
    pub fn tick(&mut self, sync: &Synchronizer) -> Option<Transaction> {
        match self.state {
            DecoderState::Idle => {
                if sync.cs_asserted_edge() {
                    self.transaction.clear();
                    self.state = DecoderState::Receiving;
                    tracing::debug!("frame start");
                }
                None
            }
            DecoderState::Receiving => {
                if sync.cs_released_edge() {
                    self.state = DecoderState::Idle;
                    return Some(self.transaction);
                }

                if sync.sclk_rising_edge() {
                    let bit = sync.data_bit();
                    if self.transaction.capture(bit) {
                        tracing::trace!(
                            index = self.transaction.count() - 1,
                            bit,
                            "captured bit"
                        );
                    } else {
                        tracing::trace!("clock pulse past end of frame ignored");
                    }
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pins::PinSample;

    fn frame_of(bits: &[bool]) -> Transaction {
        let mut t = Transaction::new();
        for &b in bits {
            t.capture(b);
        }
        t
    }

    #[test]
    fn earliest_bit_lands_in_position_zero() {
        let t = frame_of(&[
            true, false, false, false, false, false, false, false, // WE=1, address 0
            true, false, true, false, true, false, true, false, // data
        ]);
        assert!(t.is_complete());
        assert!(t.write_enable());
        assert_eq!(t.address(), 0);
        assert_eq!(t.data(), 0x55);
    }

    #[test]
    fn capture_freezes_after_sixteen_bits() {
        let mut t = Transaction::new();
        for _ in 0..FRAME_BITS {
            assert!(t.capture(true));
        }
        assert!(!t.capture(false));
        assert_eq!(t.count(), FRAME_BITS);
        assert_eq!(t.bits(), 0xFFFF);
    }

    #[test]
    fn address_uses_all_seven_bits() {
        let t = frame_of(&[true, false, false, false, false, false, false, true]);
        assert_eq!(t.address(), 0x40);
        assert!(!t.is_complete());
    }

    #[test]
    fn from_parts_rejects_bits_past_count() {
        assert_eq!(Transaction::from_parts(0b1, 1).map(|t| t.count()), Some(1));
        assert!(Transaction::from_parts(0b10, 1).is_none());
        assert!(Transaction::from_parts(0, 17).is_none());
        assert!(Transaction::from_parts(0xFFFF, 16).is_some());
    }

    fn shift(sync: &mut Synchronizer, cs_n: bool, sclk: bool, copi: bool, ticks: usize) {
        for _ in 0..ticks {
            sync.shift(PinSample::new(cs_n, sclk, copi));
        }
    }

    #[test]
    fn start_edge_clears_previous_buffer() {
        let mut dec = FrameDecoder::from_parts(
            DecoderState::Idle,
            Transaction::from_parts(0xABCD, 16).unwrap(),
        );
        let mut sync = Synchronizer::new();
        shift(&mut sync, true, false, false, 2);
        shift(&mut sync, false, false, false, 1);

        assert_eq!(dec.tick(&sync), None);
        assert_eq!(dec.state(), DecoderState::Receiving);
        assert_eq!(*dec.transaction(), Transaction::new());
    }

    #[test]
    fn release_edge_returns_partial_frame() {
        let mut dec = FrameDecoder::new();
        let mut sync = Synchronizer::new();
        shift(&mut sync, true, false, false, 2);
        shift(&mut sync, false, false, false, 1);
        dec.tick(&sync);

        // Clock high for two ticks: the edge reaches the second/third stage comparison.
        shift(&mut sync, false, true, true, 2);
        dec.tick(&sync);
        assert_eq!(dec.transaction().count(), 1);

        shift(&mut sync, true, false, false, 1);
        let done = dec.tick(&sync).expect("frame end");
        assert_eq!(done.count(), 1);
        assert!(done.write_enable());
        assert_eq!(dec.state(), DecoderState::Idle);
    }

    #[test]
    fn idle_decoder_ignores_clock_and_release() {
        let mut dec = FrameDecoder::new();
        let mut sync = Synchronizer::new();
        shift(&mut sync, false, false, false, 2);
        shift(&mut sync, false, true, true, 2);
        assert_eq!(dec.tick(&sync), None);
        shift(&mut sync, true, false, false, 1);
        assert_eq!(dec.tick(&sync), None);
        assert_eq!(dec.state(), DecoderState::Idle);
        assert_eq!(dec.transaction().count(), 0);
    }
}
