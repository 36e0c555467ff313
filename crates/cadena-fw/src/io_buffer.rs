//! Per-block IO exchange with the drivers.
//!
//! A [`Block`] is the complete interface between the core and the outside
//! world for one processing block: smoothed analog controls and gate flags
//! in, DAC codes out. The [`IoBuffer`] double-buffers blocks between the DAC
//! interrupt (which consumes one frame every ~32 us) and the main loop
//! (which renders a whole block at a time).

use cadena_dsp::{GateFlags, BLOCK_SIZE};
use cadena_settings::NUM_CHANNELS;

/// One block of module IO.
#[derive(Debug, Clone, Copy)]
pub struct Block {
    /// Smoothed pot positions, 0..1.
    pub pot: [f32; NUM_CHANNELS],
    /// Smoothed slider positions, 0..1 (locked value while a switch edit is
    /// in progress).
    pub slider: [f32; NUM_CHANNELS],
    /// Calibrated CV inputs, about -1..+2.
    pub cv: [f32; NUM_CHANNELS],
    /// Combined CV + slider, range-mapped and clamped to [-1, 1.999995].
    pub cv_slider: [f32; NUM_CHANNELS],
    /// Normalization probe result per channel.
    pub input_patched: [bool; NUM_CHANNELS],
    /// Per-sample gate flags.
    pub input: [[GateFlags; BLOCK_SIZE]; NUM_CHANNELS],
    /// Per-sample DAC codes.
    pub output: [[u16; BLOCK_SIZE]; NUM_CHANNELS],
}

impl Default for Block {
    fn default() -> Self {
        Self {
            pot: [0.0; NUM_CHANNELS],
            slider: [0.0; NUM_CHANNELS],
            cv: [0.0; NUM_CHANNELS],
            cv_slider: [0.0; NUM_CHANNELS],
            input_patched: [false; NUM_CHANNELS],
            input: [[GateFlags::LOW; BLOCK_SIZE]; NUM_CHANNELS],
            output: [[0; BLOCK_SIZE]; NUM_CHANNELS],
        }
    }
}

/// Ceiling of the combined control range, one LSB below 2.0 so ratio
/// lookups never evaluate exactly at the table boundary.
pub const CV_SLIDER_MAX: f32 = 1.999_995;

impl Block {
    /// Combined CV + slider with a remapped slider throw and a scaled CV.
    ///
    /// `slider_offset`/`slider_scale` remap the slider from 0..1 to the
    /// wanted span; `cv_offset`/`cv_scale` do the same for the CV (scale 0
    /// mutes it, negative scales invert, a pot value attenuverts).
    #[inline]
    pub fn cv_slider_alt(
        &self,
        channel: usize,
        slider_offset: f32,
        slider_scale: f32,
        cv_offset: f32,
        cv_scale: f32,
    ) -> f32 {
        let slider = self.slider[channel] * slider_scale + slider_offset;
        let cv = self.cv[channel] * cv_scale + cv_offset;
        (cv + slider).clamp(-1.0, CV_SLIDER_MAX)
    }
}

/// A slice of one block, handed to the DAC interrupt: the block plus the
/// index of the frame to consume/fill.
pub struct Slice<'a> {
    pub block: &'a mut Block,
    pub frame: usize,
}

/// Double-buffered block exchange between the sample-rate interrupt and the
/// main loop.
///
/// Contract: [`IoBuffer::next_slice`] is called only from the interrupt,
/// [`IoBuffer::process`] only from the main loop; the interrupt strictly
/// preempts, so each side sees the other's writes at block granularity.
pub struct IoBuffer {
    blocks: [Block; 2],
    io_block: usize,
    io_frame: usize,
    render_block: usize,
    blocks_consumed: usize,
    blocks_rendered: usize,
}

impl Default for IoBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl IoBuffer {
    pub fn new() -> Self {
        Self {
            blocks: [Block::default(); 2],
            io_block: 0,
            io_frame: 0,
            render_block: 1,
            blocks_consumed: 0,
            blocks_rendered: 1,
        }
    }

    /// Interrupt side: advance to the next frame, flipping blocks at the
    /// block boundary.
    pub fn next_slice(&mut self, frames: usize) -> Slice<'_> {
        if self.io_frame >= BLOCK_SIZE {
            self.io_frame = 0;
            self.io_block = 1 - self.io_block;
            self.blocks_consumed += 1;
        }
        let frame = self.io_frame;
        self.io_frame += frames;
        Slice {
            block: &mut self.blocks[self.io_block],
            frame,
        }
    }

    /// True right after a block flip, when per-block inputs should be
    /// refreshed.
    #[inline]
    pub fn new_block(&self) -> bool {
        self.io_frame <= 1
    }

    /// Main-loop side: if the interrupt has moved on from a block, hand it
    /// to `render` for processing.
    pub fn process(&mut self, mut render: impl FnMut(&mut Block)) {
        if self.blocks_rendered <= self.blocks_consumed {
            let block = 1 - self.io_block;
            self.render_block = block;
            render(&mut self.blocks[block]);
            self.blocks_rendered += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cv_slider_alt_identity_mapping() {
        let mut block = Block::default();
        block.slider[0] = 0.5;
        block.cv[0] = 0.25;
        let v = block.cv_slider_alt(0, 0.0, 1.0, 0.0, 1.0);
        assert!((v - 0.75).abs() < 1e-6);
    }

    #[test]
    fn cv_slider_alt_clamps() {
        let mut block = Block::default();
        block.slider[1] = 1.0;
        block.cv[1] = 1.9;
        let v = block.cv_slider_alt(1, 1.0, 1.0, 0.0, 1.0);
        assert_eq!(v, CV_SLIDER_MAX);
        block.cv[1] = -3.0;
        let v = block.cv_slider_alt(1, 0.0, 0.0, 0.0, 1.0);
        assert_eq!(v, -1.0);
    }

    #[test]
    fn interrupt_fills_then_main_loop_processes() {
        let mut io = IoBuffer::new();
        let mut processed = 0;
        for _ in 0..BLOCK_SIZE + 1 {
            let _ = io.next_slice(1);
        }
        io.process(|_| processed += 1);
        io.process(|_| processed += 1);
        // One block consumed: exactly one render.
        assert_eq!(processed, 1);
    }
}
