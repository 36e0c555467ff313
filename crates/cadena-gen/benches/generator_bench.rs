//! Benchmarks for the segment generator hot path.
//!
//! The whole audio budget is ~256 us per 8-sample block for six channels, so
//! per-block cost of the common modes is the number that matters.

use cadena_dsp::GateFlags;
use cadena_gen::{Configuration, FreqRange, Output, SegmentGenerator, SegmentType};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn config(segment_type: SegmentType, looped: bool) -> Configuration {
    Configuration {
        segment_type,
        looped,
        bipolar: false,
        range: FreqRange::Default,
    }
}

fn bench_process(c: &mut Criterion) {
    let gates = [GateFlags::LOW; 8];
    let mut out = [Output::default(); 8];

    let mut lfo = SegmentGenerator::default();
    lfo.configure(false, &[config(SegmentType::Ramp, true)]);
    lfo.set_segment_parameters(0, 0.5, 0.5);
    c.bench_function("free_running_lfo_block", |b| {
        b.iter(|| {
            lfo.process(black_box(&gates), black_box(&mut out));
        })
    });

    let mut envelope = SegmentGenerator::default();
    envelope.configure(
        true,
        &[
            config(SegmentType::Ramp, false),
            config(SegmentType::Hold, false),
            config(SegmentType::Ramp, false),
        ],
    );
    for i in 0..3 {
        envelope.set_segment_parameters(i, 0.4, 0.5);
    }
    c.bench_function("multi_segment_block", |b| {
        b.iter(|| {
            envelope.process(black_box(&gates), black_box(&mut out));
        })
    });

    let mut sequencer = SegmentGenerator::default();
    sequencer.configure(
        true,
        &[
            config(SegmentType::Hold, false),
            config(SegmentType::Step, false),
            config(SegmentType::Step, false),
            config(SegmentType::Step, false),
        ],
    );
    for i in 0..4 {
        sequencer.set_segment_parameters(i, 0.4, 0.1);
    }
    c.bench_function("sequencer_block", |b| {
        b.iter(|| {
            sequencer.process(black_box(&gates), black_box(&mut out));
        })
    });
}

criterion_group!(benches, bench_process);
criterion_main!(benches);
