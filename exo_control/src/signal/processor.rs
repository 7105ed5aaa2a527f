//! Per-input signal processor: offset, calibration and measurement phases.
//!
//! `update` consumes one acquired sample vector and produces one scalar.
//! Behavior depends on the current [`SignalPhase`]:
//!
//! - **Offset** — the mean of the raw samples feeds a running offset
//!   accumulator; the returned value is the running estimate itself,
//!   which only the motor reference sampling path consumes.
//! - **Calibration** — samples are offset-corrected, optionally rectified
//!   and band-passed; the min/max range widens to include each result.
//! - **Measurement** — same conditioning; with normalization enabled the
//!   result is mapped into [-1, +1] from the calibrated range, clamped.

use bitflags::bitflags;

use exo_common::state::SignalPhase;

use super::filters::BandPass;

bitflags! {
    /// Conditioning options of one input.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ProcessingFlags: u8 {
        /// Full-wave rectification after offset correction.
        const RECTIFY = 0x01;
        /// Map measurements into [-1, +1] from the calibrated range.
        const NORMALIZE = 0x02;
    }
}

/// Range below which a calibration is considered degenerate.
const MIN_CALIBRATION_RANGE: f64 = 1e-12;

/// Phase-driven conditioning pipeline for one acquisition channel.
#[derive(Debug)]
pub struct SignalProcessor {
    flags: ProcessingFlags,
    band_pass: BandPass,
    phase: SignalPhase,
    offset: f64,
    offset_sum: f64,
    offset_updates: u64,
    min: f64,
    max: f64,
}

impl SignalProcessor {
    /// Build a processor; cutoffs are relative to the sampling frequency
    /// and fall back to bypass outside `(0, 0.5)`.
    pub fn new(flags: ProcessingFlags, min_frequency: f64, max_frequency: f64) -> Self {
        Self {
            flags,
            band_pass: BandPass::new(min_frequency, max_frequency),
            phase: SignalPhase::Measurement,
            offset: 0.0,
            offset_sum: 0.0,
            offset_updates: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> SignalPhase {
        self.phase
    }

    /// Accumulated offset estimate.
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Calibrated range, when one exists.
    pub fn range(&self) -> Option<(f64, f64)> {
        (self.max - self.min > MIN_CALIBRATION_RANGE).then_some((self.min, self.max))
    }

    /// Number of offset-phase updates accumulated so far.
    pub fn offset_updates(&self) -> u64 {
        self.offset_updates
    }

    /// Switch phase. Filter transients are cleared; entering `Offset`
    /// restarts the offset accumulator, entering `Calibration` restarts
    /// the range.
    pub fn set_phase(&mut self, phase: SignalPhase) {
        self.band_pass.reset();
        match phase {
            SignalPhase::Offset => {
                self.offset = 0.0;
                self.offset_sum = 0.0;
                self.offset_updates = 0;
            }
            SignalPhase::Calibration => {
                self.min = f64::INFINITY;
                self.max = f64::NEG_INFINITY;
            }
            SignalPhase::Measurement => {}
        }
        self.phase = phase;
    }

    /// Consume one sample vector, produce one scalar.
    pub fn update(&mut self, samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }

        if self.phase == SignalPhase::Offset {
            let mean = samples.iter().sum::<f64>() / samples.len() as f64;
            self.offset_sum += mean;
            self.offset_updates += 1;
            self.offset = self.offset_sum / self.offset_updates as f64;
            return self.offset;
        }

        let mut sum = 0.0;
        for &sample in samples {
            let mut value = sample - self.offset;
            if self.flags.contains(ProcessingFlags::RECTIFY) {
                value = value.abs();
            }
            sum += self.band_pass.apply(value);
        }
        let output = sum / samples.len() as f64;

        match self.phase {
            SignalPhase::Calibration => {
                self.min = self.min.min(output);
                self.max = self.max.max(output);
                output
            }
            SignalPhase::Measurement => {
                if self.flags.contains(ProcessingFlags::NORMALIZE) {
                    self.normalize(output)
                } else {
                    output
                }
            }
            SignalPhase::Offset => unreachable!("offset handled above"),
        }
    }

    fn normalize(&self, value: f64) -> f64 {
        let range = self.max - self.min;
        if range <= MIN_CALIBRATION_RANGE {
            return 0.0;
        }
        ((value - self.min) / range * 2.0 - 1.0).clamp(-1.0, 1.0)
    }

    /// Drop all accumulated state and return to measurement phase.
    pub fn reset(&mut self) {
        self.band_pass.reset();
        self.phase = SignalPhase::Measurement;
        self.offset = 0.0;
        self.offset_sum = 0.0;
        self.offset_updates = 0;
        self.min = f64::INFINITY;
        self.max = f64::NEG_INFINITY;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain() -> SignalProcessor {
        SignalProcessor::new(ProcessingFlags::empty(), 0.0, 0.0)
    }

    #[test]
    fn offset_pass_zeroes_constant_input() {
        let mut processor = plain();
        processor.set_phase(SignalPhase::Offset);
        for _ in 0..200 {
            // The offset phase exposes the running estimate only.
            assert!((processor.update(&[2.5, 2.5]) - 2.5).abs() < 1e-12);
        }
        assert_eq!(processor.offset_updates(), 200);
        processor.set_phase(SignalPhase::Measurement);
        let out = processor.update(&[2.5]);
        assert!(out.abs() < 1e-12, "residual {out}");
    }

    #[test]
    fn offset_accumulates_running_mean() {
        let mut processor = plain();
        processor.set_phase(SignalPhase::Offset);
        processor.update(&[1.0]);
        processor.update(&[3.0]);
        assert!((processor.offset() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn calibration_widens_monotonically() {
        let mut processor = plain();
        processor.set_phase(SignalPhase::Calibration);
        processor.update(&[0.5]);
        processor.update(&[-1.5]);
        processor.update(&[0.25]);
        let (min, max) = processor.range().unwrap();
        assert_eq!(min, -1.5);
        assert_eq!(max, 0.5);
    }

    #[test]
    fn normalization_maps_calibrated_range() {
        let mut processor = SignalProcessor::new(ProcessingFlags::NORMALIZE, 0.0, 0.0);
        processor.set_phase(SignalPhase::Calibration);
        processor.update(&[-1.0]);
        processor.update(&[1.0]);
        processor.set_phase(SignalPhase::Measurement);
        // With min = -1 and max = +1 the mapping is the identity, clamped.
        assert!((processor.update(&[0.25]) - 0.25).abs() < 1e-12);
        assert_eq!(processor.update(&[4.0]), 1.0);
        assert_eq!(processor.update(&[-4.0]), -1.0);
    }

    #[test]
    fn degenerate_range_normalizes_to_zero() {
        let mut processor = SignalProcessor::new(ProcessingFlags::NORMALIZE, 0.0, 0.0);
        processor.set_phase(SignalPhase::Calibration);
        processor.update(&[0.7]);
        processor.set_phase(SignalPhase::Measurement);
        assert_eq!(processor.update(&[0.7]), 0.0);
    }

    #[test]
    fn rectification_folds_negative_excursions() {
        let mut processor = SignalProcessor::new(ProcessingFlags::RECTIFY, 0.0, 0.0);
        assert_eq!(processor.update(&[-0.5]), 0.5);
        assert_eq!(processor.update(&[0.5]), 0.5);
    }

    #[test]
    fn empty_sample_vector_is_inert() {
        let mut processor = plain();
        processor.set_phase(SignalPhase::Offset);
        assert_eq!(processor.update(&[]), 0.0);
        assert_eq!(processor.offset_updates(), 0);
    }

    #[test]
    fn reset_returns_to_measurement() {
        let mut processor = plain();
        processor.set_phase(SignalPhase::Offset);
        processor.update(&[5.0]);
        processor.reset();
        assert_eq!(processor.phase(), SignalPhase::Measurement);
        assert_eq!(processor.offset(), 0.0);
        assert_eq!(processor.update(&[5.0]), 5.0);
    }
}
