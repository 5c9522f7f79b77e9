//! Clock-domain-crossing synchronizer for the three serial inputs.
//!
//! Each input is pushed through a short shift chain once per local clock tick. Downstream logic
//! only ever looks at the delayed samples, so every edge it reacts to has survived at least one
//! register stage and the sampling latency is fixed.
//!
//! Sample numbering follows the hardware convention: `sample(1)` is the value captured on the
//! previous tick, `sample(2)` the one before that, and so on up to `DEPTH`.

use crate::pins::PinSample;

/// Chain depth for chip-select.
pub const CS_SYNC_DEPTH: usize = 2;
/// Chain depth for the serial clock. One extra stage so edges are detected between two samples
/// that are both past the first (potentially metastable) flop.
pub const SCLK_SYNC_DEPTH: usize = 3;
/// Chain depth for the serial data line.
pub const COPI_SYNC_DEPTH: usize = 2;

/// History of the last `DEPTH` samples of one signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncChain<const DEPTH: usize> {
    samples: [bool; DEPTH],
}

impl<const DEPTH: usize> SyncChain<DEPTH> {
    pub const fn new() -> Self {
        Self {
            samples: [false; DEPTH],
        }
    }

    /// Insert the newest raw value, dropping the oldest sample.
    pub fn shift(&mut self, raw: bool) {
        self.samples.copy_within(..DEPTH - 1, 1);
        self.samples[0] = raw;
    }

    /// Value sampled `ticks_ago` ticks ago.
    ///
    /// # Panics
    ///
    /// Panics if `ticks_ago` is zero or greater than `DEPTH`; the raw pin is never observable.
    pub fn sample(&self, ticks_ago: usize) -> bool {
        assert!(
            (1..=DEPTH).contains(&ticks_ago),
            "sync chain sample {ticks_ago} outside 1..={DEPTH}"
        );
        self.samples[ticks_ago - 1]
    }

    /// Low at `older`, high at `newer`.
    pub fn rose(&self, newer: usize, older: usize) -> bool {
        !self.sample(older) && self.sample(newer)
    }

    /// High at `older`, low at `newer`.
    pub fn fell(&self, newer: usize, older: usize) -> bool {
        self.sample(older) && !self.sample(newer)
    }

    pub fn clear(&mut self) {
        self.samples = [false; DEPTH];
    }

    /// Pack the history into an integer, `sample(1)` in bit 0.
    pub fn bits(&self) -> u8 {
        self.samples
            .iter()
            .enumerate()
            .fold(0u8, |acc, (i, &s)| acc | ((s as u8) << i))
    }

    /// Inverse of [`SyncChain::bits`]. Returns `None` if bits beyond `DEPTH` are set.
    pub fn from_bits(bits: u8) -> Option<Self> {
        if u32::from(bits) >> DEPTH != 0 {
            return None;
        }
        let mut samples = [false; DEPTH];
        for (i, s) in samples.iter_mut().enumerate() {
            *s = (bits >> i) & 1 != 0;
        }
        Some(Self { samples })
    }
}

impl<const DEPTH: usize> Default for SyncChain<DEPTH> {
    fn default() -> Self {
        Self::new()
    }
}

/// The three synchronizer chains of the peripheral.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Synchronizer {
    pub(crate) cs_n: SyncChain<CS_SYNC_DEPTH>,
    pub(crate) sclk: SyncChain<SCLK_SYNC_DEPTH>,
    pub(crate) copi: SyncChain<COPI_SYNC_DEPTH>,
}

impl Synchronizer {
    pub const fn new() -> Self {
        Self {
            cs_n: SyncChain::new(),
            sclk: SyncChain::new(),
            copi: SyncChain::new(),
        }
    }

    /// Sample all three raw pins. Called exactly once per tick.
    pub fn shift(&mut self, pins: PinSample) {
        self.cs_n.shift(pins.cs_n);
        self.sclk.shift(pins.sclk);
        self.copi.shift(pins.copi);
    }

    pub fn clear(&mut self) {
        self.cs_n.clear();
        self.sclk.clear();
        self.copi.clear();
    }

    pub fn cs_n(&self) -> &SyncChain<CS_SYNC_DEPTH> {
        &self.cs_n
    }

    pub fn sclk(&self) -> &SyncChain<SCLK_SYNC_DEPTH> {
        &self.sclk
    }

    pub fn copi(&self) -> &SyncChain<COPI_SYNC_DEPTH> {
        &self.copi
    }

    /// Chip-select went from released (two ticks ago) to asserted (one tick ago): frame start.
    pub fn cs_asserted_edge(&self) -> bool {
        self.cs_n.fell(1, 2)
    }

    /// Chip-select went from asserted (two ticks ago) to released (one tick ago): frame end.
    pub fn cs_released_edge(&self) -> bool {
        self.cs_n.rose(1, 2)
    }

    /// Serial clock rising edge, compared between the second and third stages.
    pub fn sclk_rising_edge(&self) -> bool {
        self.sclk.rose(2, 3)
    }

    /// Data bit aligned with [`Synchronizer::sclk_rising_edge`].
    pub fn data_bit(&self) -> bool {
        self.copi.sample(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shift_drops_oldest_sample() {
        let mut chain = SyncChain::<3>::new();
        chain.shift(true);
        assert!(chain.sample(1));
        assert!(!chain.sample(2));

        chain.shift(false);
        chain.shift(false);
        assert!(!chain.sample(1));
        assert!(!chain.sample(2));
        assert!(chain.sample(3));

        chain.shift(false);
        assert_eq!(chain.bits(), 0);
    }

    #[test]
    #[should_panic(expected = "outside")]
    fn raw_value_is_not_observable() {
        SyncChain::<2>::new().sample(0);
    }

    #[test]
    fn edges_compare_delayed_samples() {
        let mut chain = SyncChain::<3>::new();
        chain.shift(true);
        // Only the first stage has seen the edge.
        assert!(chain.rose(1, 2));
        assert!(!chain.rose(2, 3));

        chain.shift(true);
        assert!(chain.rose(2, 3));
        assert!(!chain.rose(1, 2));

        chain.shift(true);
        assert!(!chain.rose(2, 3));
    }

    #[test]
    fn bits_roundtrip_rejects_excess() {
        let mut chain = SyncChain::<3>::new();
        chain.shift(true);
        chain.shift(false);
        assert_eq!(chain.bits(), 0b010);
        assert_eq!(SyncChain::<3>::from_bits(0b010), Some(chain));
        assert_eq!(SyncChain::<2>::from_bits(0b100), None);
    }

    #[test]
    fn chip_select_edges_need_two_ticks_of_history() {
        let mut sync = Synchronizer::new();
        sync.shift(PinSample::IDLE);
        sync.shift(PinSample::IDLE);
        assert!(!sync.cs_asserted_edge());

        sync.shift(PinSample::new(false, false, false));
        assert!(sync.cs_asserted_edge());
        assert!(!sync.cs_released_edge());

        sync.shift(PinSample::new(false, false, false));
        assert!(!sync.cs_asserted_edge());

        sync.shift(PinSample::IDLE);
        assert!(sync.cs_released_edge());
    }
}
