//! CV reader: smoothing, calibration and range mapping of the analog
//! controls.
//!
//! Once per block the raw ADC values are one-pole smoothed (pot 0.1, slider
//! 0.025, CV 0.7 applied twice), calibrated, range-mapped and summed into
//! the IO block.
//!
//! The reader also owns the lock/limbo machinery behind switch-held property
//! edits: while a switch is held the pot and slider feed property edits, so
//! the values reported to the generators freeze at their pre-press levels;
//! on release the frozen value chases the live one at a fixed rate until
//! they meet, which keeps the parameter from jumping to wherever the slider
//! was left.

use crate::chain::{ChainState, LoopStatus};
use crate::io_buffer::{Block, CV_SLIDER_MAX};
use cadena_dsp::{one_pole, BLOCK_SIZE, SAMPLE_RATE};
use cadena_settings::{Settings, NUM_CHANNELS};

/// Raw analog readings delivered by the ADC driver, all normalized to 0..1
/// (CV centered on 0.5).
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalogInputs {
    pub pot: [f32; NUM_CHANNELS],
    pub slider: [f32; NUM_CHANNELS],
    pub cv: [f32; NUM_CHANNELS],
}

/// Limbo chase rate: full-scale units of travel per second (a frozen value
/// a full throw away takes one second to catch up).
const LIMBO_RATE: f32 = 1.0;

/// Distance at which a limbo value snaps to the live one.
const LIMBO_RELEASE_DISTANCE: f32 = 0.01;

/// Per-channel control conditioning.
#[derive(Debug, Clone)]
pub struct CvReader {
    lp_cv: [f32; NUM_CHANNELS],
    lp_cv_2: [f32; NUM_CHANNELS],
    lp_slider: [f32; NUM_CHANNELS],
    lp_pot: [f32; NUM_CHANNELS],

    locked: u8,
    pot_limbo: u8,
    slider_limbo: u8,
    locked_pot: [f32; NUM_CHANNELS],
    locked_slider: [f32; NUM_CHANNELS],
}

impl Default for CvReader {
    fn default() -> Self {
        Self::new()
    }
}

impl CvReader {
    pub fn new() -> Self {
        Self {
            lp_cv: [0.0; NUM_CHANNELS],
            lp_cv_2: [0.0; NUM_CHANNELS],
            lp_slider: [0.0; NUM_CHANNELS],
            lp_pot: [0.0; NUM_CHANNELS],
            locked: 0,
            pot_limbo: 0,
            slider_limbo: 0,
            locked_pot: [0.0; NUM_CHANNELS],
            locked_slider: [0.0; NUM_CHANNELS],
        }
    }

    /// Smooth, calibrate and range-map one block of controls.
    pub fn read(
        &mut self,
        inputs: &AnalogInputs,
        settings: &Settings,
        chain: &ChainState,
        block: &mut Block,
    ) {
        for i in 0..NUM_CHANNELS {
            one_pole(&mut self.lp_pot[i], inputs.pot[i], 0.1);
            one_pole(&mut self.lp_cv[i], inputs.cv[i], 0.7);
            one_pole(&mut self.lp_cv_2[i], self.lp_cv[i], 0.7);
            one_pole(&mut self.lp_slider[i], inputs.slider[i], 0.025);

            self.update_pot_limbo(i);
            self.update_slider_limbo(i);

            let cv = settings.calibration(i).cv(self.lp_cv_2[i]);
            let mut slider = self.effective_slider(i);
            let word = settings.state().word(i);

            // In slow-LFO mode, a self-looping unpatched ramp gets a slider
            // throw from about a minute up to C1 instead of ~6 s up.
            if settings.multimode() == cadena_settings::MultiMode::SlowLfo
                && word.type_bits() == 0
                && chain.loop_status(i) == LoopStatus::SelfLoop
                && !chain.local_channel(i).input_patched()
            {
                const SLIDER_MAX: f32 = 48.0 / 96.0 + 0.5;
                const SLIDER_MIN: f32 = -84.0 / 96.0 + 0.5;
                slider = (SLIDER_MAX - SLIDER_MIN) * slider + SLIDER_MIN;
            }

            // Bipolar non-ramp channels center the slider on zero.
            if word.bipolar() && word.type_bits() != 0 {
                slider = 2.0 * slider - 1.0;
            }

            block.pot[i] = self.effective_pot(i);
            block.slider[i] = slider;
            block.cv[i] = cv;
            block.cv_slider[i] = (cv + slider).clamp(-1.0, CV_SLIDER_MAX);
        }
    }

    /// Freeze the pot and slider at their current values; the live values
    /// now drive property edits.
    pub fn lock(&mut self, channel: usize) {
        if self.locked & (1 << channel) == 0 {
            self.locked |= 1 << channel;
            self.locked_pot[channel] = self.lp_pot[channel];
            self.locked_slider[channel] = self.lp_slider[channel];
        }
    }

    /// Release a lock; the frozen values enter limbo and chase the live
    /// ones.
    pub fn unlock(&mut self, channel: usize) {
        if self.locked & (1 << channel) != 0 {
            self.locked &= !(1 << channel);
            self.pot_limbo |= 1 << channel;
            self.slider_limbo |= 1 << channel;
        }
    }

    #[inline]
    pub fn is_locked(&self, channel: usize) -> bool {
        self.locked & (1 << channel) != 0
    }

    #[inline]
    pub fn pot_in_limbo(&self, channel: usize) -> bool {
        self.pot_limbo & (1 << channel) != 0
    }

    #[inline]
    pub fn slider_in_limbo(&self, channel: usize) -> bool {
        self.slider_limbo & (1 << channel) != 0
    }

    #[inline]
    pub fn lp_pot(&self, channel: usize) -> f32 {
        self.lp_pot[channel]
    }

    #[inline]
    pub fn lp_slider(&self, channel: usize) -> f32 {
        self.lp_slider[channel]
    }

    #[inline]
    pub fn locked_pot(&self, channel: usize) -> f32 {
        self.locked_pot[channel]
    }

    #[inline]
    pub fn locked_slider(&self, channel: usize) -> f32 {
        self.locked_slider[channel]
    }

    fn effective_pot(&self, channel: usize) -> f32 {
        if self.is_locked(channel) || self.pot_in_limbo(channel) {
            self.locked_pot[channel]
        } else {
            self.lp_pot[channel]
        }
    }

    fn effective_slider(&self, channel: usize) -> f32 {
        if self.is_locked(channel) || self.slider_in_limbo(channel) {
            self.locked_slider[channel]
        } else {
            self.lp_slider[channel]
        }
    }

    fn update_pot_limbo(&mut self, channel: usize) {
        if !self.pot_in_limbo(channel) {
            return;
        }
        let distance = self.locked_pot[channel] - self.lp_pot[channel];
        if distance.abs() <= LIMBO_RELEASE_DISTANCE {
            self.pot_limbo &= !(1 << channel);
            return;
        }
        let step = LIMBO_RATE * BLOCK_SIZE as f32 / SAMPLE_RATE;
        self.locked_pot[channel] -= step * distance.signum();
    }

    fn update_slider_limbo(&mut self, channel: usize) {
        if !self.slider_in_limbo(channel) {
            return;
        }
        let distance = self.locked_slider[channel] - self.lp_slider[channel];
        if distance.abs() <= LIMBO_RELEASE_DISTANCE {
            self.slider_limbo &= !(1 << channel);
            return;
        }
        let step = LIMBO_RATE * BLOCK_SIZE as f32 / SAMPLE_RATE;
        self.locked_slider[channel] -= step * distance.signum();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadena_settings::Settings;

    fn read_n(
        reader: &mut CvReader,
        inputs: &AnalogInputs,
        settings: &Settings,
        chain: &ChainState,
        block: &mut Block,
        n: usize,
    ) {
        for _ in 0..n {
            reader.read(inputs, settings, chain, block);
        }
    }

    #[test]
    fn smoothing_settles_on_input() {
        let settings = Settings::default();
        let chain = ChainState::new(&settings);
        let mut reader = CvReader::new();
        let mut block = Block::default();
        let mut inputs = AnalogInputs::default();
        inputs.pot[0] = 0.8;
        inputs.slider[0] = 0.4;

        read_n(&mut reader, &inputs, &settings, &chain, &mut block, 500);
        assert!((block.pot[0] - 0.8).abs() < 0.01);
        assert!((block.slider[0] - 0.4).abs() < 0.01);
    }

    #[test]
    fn combined_value_is_clamped() {
        let mut settings = Settings::default();
        // Unity CV path for a direct sum.
        settings.mutable_calibration(0).adc_scale = 1.0;
        settings.mutable_calibration(0).adc_offset = 0.0;
        let chain = ChainState::new(&settings);
        let mut reader = CvReader::new();
        let mut block = Block::default();
        let mut inputs = AnalogInputs::default();
        inputs.cv[0] = 5.0;
        inputs.slider[0] = 1.0;

        read_n(&mut reader, &inputs, &settings, &chain, &mut block, 1000);
        assert_eq!(block.cv_slider[0], CV_SLIDER_MAX);
        inputs.cv[0] = -5.0;
        inputs.slider[0] = 0.0;
        read_n(&mut reader, &inputs, &settings, &chain, &mut block, 1000);
        assert_eq!(block.cv_slider[0], -1.0);
    }

    #[test]
    fn locked_channel_freezes_reported_values() {
        let settings = Settings::default();
        let chain = ChainState::new(&settings);
        let mut reader = CvReader::new();
        let mut block = Block::default();
        let mut inputs = AnalogInputs::default();
        inputs.slider[2] = 0.5;
        read_n(&mut reader, &inputs, &settings, &chain, &mut block, 1000);

        reader.lock(2);
        inputs.slider[2] = 1.0;
        read_n(&mut reader, &inputs, &settings, &chain, &mut block, 1000);
        // The live value moved, the reported one did not.
        assert!((reader.lp_slider(2) - 1.0).abs() < 0.01);
        assert!((block.slider[2] - 0.5).abs() < 0.01);
    }

    #[test]
    fn limbo_chases_live_value_then_releases() {
        let settings = Settings::default();
        let chain = ChainState::new(&settings);
        let mut reader = CvReader::new();
        let mut block = Block::default();
        let mut inputs = AnalogInputs::default();
        inputs.slider[1] = 0.2;
        read_n(&mut reader, &inputs, &settings, &chain, &mut block, 1000);

        reader.lock(1);
        inputs.slider[1] = 0.9;
        read_n(&mut reader, &inputs, &settings, &chain, &mut block, 1000);
        reader.unlock(1);
        assert!(reader.slider_in_limbo(1));

        // 0.7 of travel at 1 unit/s is ~0.7 s, i.e. ~2750 blocks.
        read_n(&mut reader, &inputs, &settings, &chain, &mut block, 3500);
        assert!(!reader.slider_in_limbo(1));
        assert!((block.slider[1] - 0.9).abs() < 0.02);
    }

    #[test]
    fn bipolar_step_recenters_slider() {
        let mut settings = Settings::default();
        // Type step (1), bipolar bit set.
        settings.mutable_state().segment_configuration[3] = 0b1001;
        let chain = ChainState::new(&settings);
        let mut reader = CvReader::new();
        let mut block = Block::default();
        let mut inputs = AnalogInputs::default();
        inputs.slider[3] = 0.25;
        read_n(&mut reader, &inputs, &settings, &chain, &mut block, 1000);
        assert!((block.slider[3] - (-0.5)).abs() < 0.02);
    }
}
