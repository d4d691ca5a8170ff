use criterion::{criterion_group, criterion_main, Criterion};

use std::rc::Rc;

use alpidesim::chip::pixel::PixelHit;
use alpidesim::chip::{Alpide, ControlRequest};
use alpidesim::config::chip::ChipConfig;

/// One trigger with a 256-pixel frame, simulated to completion
fn bench_frame_readout(c: &mut Criterion) {
    let cfg = ChipConfig {
        strobe_length_ns: 100,
        ..ChipConfig::default()
    };
    c.bench_function("frame_readout_256_pixels", |b| {
        b.iter(|| {
            let (stats_send, _stats_recv) = flume::unbounded();
            let mut chip = Alpide::new(&cfg, stats_send);
            for index in 0..256_u16 {
                chip.pixel_input(Rc::new(PixelHit::new(
                    0,
                    (index * 7) % 1024,
                    (index * 3) % 512,
                    0,
                    5_000,
                )));
            }
            chip.control_input(ControlRequest::trigger(0)).unwrap();
            for _ in 0..2_000 {
                let _ = chip.on_cycle();
            }
            chip
        })
    });
}

/// The idle cycle cost of the full chip model
fn bench_idle_cycles(c: &mut Criterion) {
    let cfg = ChipConfig::default();
    c.bench_function("idle_cycles_10k", |b| {
        b.iter(|| {
            let (stats_send, _stats_recv) = flume::unbounded();
            let mut chip = Alpide::new(&cfg, stats_send);
            for _ in 0..10_000 {
                let _ = chip.on_cycle();
            }
            chip
        })
    });
}

criterion_group!(benches, bench_frame_readout, bench_idle_cycles);
criterion_main!(benches);
