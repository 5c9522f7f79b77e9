//! Cycle-stepped model of a receive-only serial register peripheral.
//!
//! An external controller shifts 16-bit frames in over three asynchronous pins (active-low
//! chip-select, serial clock, data). The peripheral resamples the pins into its own clock domain,
//! assembles each frame while chip-select is held, and on release writes the data byte into one
//! of five 8-bit configuration registers:
//!
//! ```text
//! pins -> Synchronizer -> FrameDecoder -> commit -> RegisterFile
//! ```
//!
//! The peripheral never drives the bus and never reports errors to the sender; malformed frames
//! are dropped silently (see [`RejectReason`] for the local diagnostics).
#![forbid(unsafe_code)]

pub mod frame;
pub mod peripheral;
pub mod pins;
pub mod regs;
pub mod snapshot;
pub mod stimulus;
pub mod sync;

pub use frame::{DecoderState, FrameDecoder, Transaction, FRAME_BITS};
pub use peripheral::SpiRegPeripheral;
pub use pins::PinSample;
pub use regs::{commit, FrameOutcome, Register, RegisterFile, RejectReason, REGISTER_COUNT};
pub use snapshot::{IoSnapshot, SnapshotError, SnapshotResult, SnapshotVersion};
pub use stimulus::{BusTiming, Frame, FrameError, Waveform, MIN_HALF_PERIOD_TICKS, MIN_TRAIL_TICKS};
pub use sync::{SyncChain, Synchronizer};
