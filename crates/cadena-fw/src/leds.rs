//! LED frame buffer.
//!
//! The UI renders into this frame once per millisecond; the driver shifts it
//! out to the LED latches afterwards. Each channel has a bicolor UI LED and
//! a green slider LED.

use cadena_settings::NUM_CHANNELS;

/// Colors of the bicolor channel LEDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LedColor {
    #[default]
    Off,
    Green,
    Yellow,
    Red,
}

/// One refresh worth of LED state.
#[derive(Debug, Clone, Copy, Default)]
pub struct LedFrame {
    pub channel: [LedColor; NUM_CHANNELS],
    pub slider: [LedColor; NUM_CHANNELS],
}

impl LedFrame {
    pub fn clear(&mut self) {
        self.channel = [LedColor::Off; NUM_CHANNELS];
        self.slider = [LedColor::Off; NUM_CHANNELS];
    }

    #[inline]
    pub fn set_channel(&mut self, i: usize, color: LedColor) {
        self.channel[i] = color;
    }

    #[inline]
    pub fn set_slider(&mut self, i: usize, color: LedColor) {
        self.slider[i] = color;
    }
}

/// Driver-side sink for finished frames.
pub trait LedDriver {
    fn write(&mut self, frame: &LedFrame);
}

/// Discards frames; used when no LED hardware is attached (tests).
#[derive(Debug, Default)]
pub struct NullLedDriver;

impl LedDriver for NullLedDriver {
    fn write(&mut self, _frame: &LedFrame) {}
}
