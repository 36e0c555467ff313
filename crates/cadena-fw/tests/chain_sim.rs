//! Multi-module chain simulation.
//!
//! Wires two or three modules together with queue-backed serial links and
//! runs their update loops in lockstep: discovery, mirror convergence,
//! segment linkage across module boundaries, request propagation, and the
//! reinit wave.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use cadena_dsp::BLOCK_SIZE;
use cadena_fw::chain::{ChainState, ChainStatus};
use cadena_fw::io_buffer::Block;
use cadena_fw::link::{Frame, SerialLink};
use cadena_gen::{Output, ProcessMode, SegmentGenerator};
use cadena_settings::{Settings, NUM_CHANNELS};

type Queue = Rc<RefCell<VecDeque<Frame>>>;

/// One endpoint of a bidirectional junction between two modules.
struct QueueLink {
    tx: Queue,
    rx: Queue,
}

impl SerialLink for QueueLink {
    fn transmit(&mut self, frame: &Frame) {
        self.tx.borrow_mut().push_back(*frame);
    }

    fn receive(&mut self) -> Option<Frame> {
        self.rx.borrow_mut().pop_front()
    }
}

fn junction() -> (QueueLink, QueueLink) {
    let a_to_b: Queue = Rc::new(RefCell::new(VecDeque::new()));
    let b_to_a: Queue = Rc::new(RefCell::new(VecDeque::new()));
    (
        QueueLink {
            tx: a_to_b.clone(),
            rx: b_to_a.clone(),
        },
        QueueLink {
            tx: b_to_a,
            rx: a_to_b,
        },
    )
}

fn dangling() -> QueueLink {
    QueueLink {
        tx: Rc::new(RefCell::new(VecDeque::new())),
        rx: Rc::new(RefCell::new(VecDeque::new())),
    }
}

struct Module {
    chain: ChainState,
    settings: Settings,
    generators: [SegmentGenerator; NUM_CHANNELS],
    block: Block,
    out: [Output; BLOCK_SIZE],
    left: QueueLink,
    right: QueueLink,
}

impl Module {
    fn new(left: QueueLink, right: QueueLink) -> Self {
        let settings = Settings::default();
        let chain = ChainState::new(&settings);
        Self {
            chain,
            settings,
            generators: core::array::from_fn(|i| SegmentGenerator::new(0xc0de ^ i as u32)),
            block: Block::default(),
            out: [Output::default(); BLOCK_SIZE],
            left,
            right,
        }
    }

    fn step(&mut self) {
        self.chain.update(
            &mut self.left,
            &mut self.right,
            &self.block,
            &mut self.settings,
            &mut self.generators,
            &mut self.out,
        );
    }
}

fn make_chain(n: usize) -> Vec<Module> {
    let mut lefts = vec![dangling()];
    let mut rights = Vec::new();
    for _ in 0..n - 1 {
        let (right, left) = junction();
        rights.push(right);
        lefts.push(left);
    }
    rights.push(dangling());

    lefts
        .into_iter()
        .zip(rights)
        .map(|(left, right)| Module::new(left, right))
        .collect()
}

fn run(modules: &mut [Module], steps: usize) {
    for _ in 0..steps {
        for module in modules.iter_mut() {
            module.step();
        }
    }
}

/// Discovery plus the unpatch-counter settling window.
fn bring_up(modules: &mut [Module]) {
    run(modules, 8100);
    for (i, module) in modules.iter().enumerate() {
        assert_eq!(module.chain.status(), ChainStatus::Ready, "module {i}");
    }
    run(modules, 2200);
}

#[test]
fn three_modules_discover_each_other() {
    let mut modules = make_chain(3);
    run(&mut modules, 8100);
    for (i, module) in modules.iter().enumerate() {
        assert_eq!(module.chain.status(), ChainStatus::Ready);
        assert_eq!(module.chain.index(), i);
        assert_eq!(module.chain.size(), 3, "module {i}");
    }
}

#[test]
fn solo_module_discovers_alone() {
    let mut modules = make_chain(1);
    run(&mut modules, 8100);
    assert_eq!(modules[0].chain.status(), ChainStatus::Ready);
    assert_eq!(modules[0].chain.size(), 1);
}

#[test]
fn mirrors_converge_after_an_edit() {
    let mut modules = make_chain(3);
    bring_up(&mut modules);

    // Edit a channel on module 2: set its loop bit and switch it to hold.
    modules[2].settings.mutable_state().segment_configuration[1] = 0b0110;
    // 12 chain cycles of 4 phases each.
    run(&mut modules, 48);

    let expected = modules[2].chain.local_channel(1).flags;
    assert_eq!(
        modules[0].chain.channel_state(13).flags,
        expected,
        "module 0 mirror of module 2 channel 1"
    );
    assert_eq!(
        modules[1].chain.channel_state(13).flags,
        expected,
        "module 1 mirror of module 2 channel 1"
    );
}

#[test]
fn group_extends_across_the_module_boundary() {
    let mut modules = make_chain(2);
    // Patch channel 3 of module 0 before bring-up so the unpatch counters
    // of the other channels expire while it stays patched.
    modules[0].block.input_patched[3] = true;
    bring_up(&mut modules);

    // Module 0: channels 0..2 free-run, channel 3 owns a group reaching all
    // the way to the end of the chain.
    assert_eq!(modules[0].generators[3].mode(), ProcessMode::MultiSegment);
    assert_eq!(modules[0].generators[3].num_segments(), 9);
    for i in 4..NUM_CHANNELS {
        assert_eq!(
            modules[0].generators[i].mode(),
            ProcessMode::Slave,
            "module 0 channel {i}"
        );
    }
    // Module 1: every channel extends the neighbor's group.
    for i in 0..NUM_CHANNELS {
        assert_eq!(
            modules[1].generators[i].mode(),
            ProcessMode::Slave,
            "module 1 channel {i}"
        );
    }
}

#[test]
fn type_request_applies_on_every_module() {
    let mut modules = make_chain(2);
    bring_up(&mut modules);

    // Press and release the switch of absolute channel 8 (module 1,
    // channel 2) for ~100 cycles: a short press, which cycles the type.
    let before = modules[1].settings.state().segment_configuration[2] & 0x3;
    modules[1].chain.set_local_switch_pressed(1 << 2);
    run(&mut modules, 100 * 4);
    modules[1].chain.set_local_switch_pressed(0);
    run(&mut modules, 16);

    let after = modules[1].settings.state().segment_configuration[2] & 0x3;
    assert_eq!(after, (before + 1) % 3, "segment type did not cycle");
}

#[test]
fn long_press_toggles_self_loop() {
    let mut modules = make_chain(2);
    bring_up(&mut modules);

    assert!(!modules[0].settings.state().word(0).looped());
    // Hold the switch of absolute channel 0 for ~1 s, then release.
    modules[0].chain.set_local_switch_pressed(1);
    run(&mut modules, 1000 * 4);
    modules[0].chain.set_local_switch_pressed(0);
    run(&mut modules, 16);

    assert!(
        modules[0].settings.state().word(0).looped(),
        "self-loop was not set"
    );
}

#[test]
fn reinit_wave_reconverges_the_chain() {
    let mut modules = make_chain(3);
    bring_up(&mut modules);

    modules[0].chain.start_reinit();
    // Reinit broadcast (2000) + discovery (8000) + slack.
    run(&mut modules, 12_000);

    for (i, module) in modules.iter().enumerate() {
        assert_eq!(module.chain.status(), ChainStatus::Ready, "module {i}");
        assert_eq!(module.chain.index(), i);
        assert_eq!(module.chain.size(), 3);
    }
}

#[test]
fn slave_channels_render_neighbor_progress() {
    let mut modules = make_chain(2);
    modules[0].block.input_patched[3] = true;
    bring_up(&mut modules);

    // Drive module 1 channel 0 (a slave of module 0's group): it renders
    // from the progress pre-filled into the output buffer.
    let gates = [cadena_dsp::GateFlags::LOW; BLOCK_SIZE];
    let mut out = [Output::default(); BLOCK_SIZE];
    for o in out.iter_mut() {
        o.segment = 3;
        o.phase = 0.25;
    }
    modules[1].generators[0].process(&gates, &mut out);
    assert!((out[0].value - 0.75).abs() < 1e-6);
}
