//! Frame readout scenarios: framing, clustering, output delay, round trip

mod util;

use alpidesim::analyze::event_builder::AlpideEventBuilder;
use alpidesim::config::chip::ChipConfig;
use alpidesim::words::data_word::AlpideDataWord;
use pretty_assertions::assert_eq;
use util::*;

fn triggered_cfg() -> ChipConfig {
    ChipConfig {
        strobe_length_ns: 100,
        dtu_delay_cycles: 0,
        ..ChipConfig::default()
    }
}

#[test]
fn single_pixel_frame_byte_sequence() {
    let cfg = triggered_cfg();
    let (mut chip, _stats) = test_chip(&cfg);
    chip.pixel_input(hit(100, 200, 0, 5_000));

    // Trigger at t = 50 ns
    let _ = run_collect_serial(&mut chip, 2);
    trigger(&mut chip);
    let words = run_collect_frames(&mut chip, 400);

    let bytes: Vec<[u8; 3]> = words.iter().map(AlpideDataWord::to_bytes).collect();
    assert_eq!(bytes.len(), 4, "words: {words:?}");
    // CHIP_HEADER for chip 0, bunch counter 2 -> BC[10:3] = 0
    assert_eq!(bytes[0], [0xA0, 0x00, 0xFF]);
    // REGION_HEADER for region 3
    assert_eq!(bytes[1], [0xC3, 0xFF, 0xFF]);
    // DATA_SHORT with encoder 2, address (200 << 1) | ((100 & 1) ^ (200 & 1)) = 400
    assert_eq!(bytes[2], [0x49, 0x90, 0xFF]);
    // CHIP_TRAILER with no flags
    assert_eq!(bytes[3], [0xB0, 0xFF, 0xFF]);
}

#[test]
fn two_adjacent_pixels_pack_into_one_data_long() {
    let cfg = triggered_cfg();
    let (mut chip, _stats) = test_chip(&cfg);
    // Region 5, encoder 7, priority encoder addresses 10 and 11
    chip.pixel_input(hit(175, 5, 0, 5_000));
    chip.pixel_input(hit(174, 5, 0, 5_000));

    trigger(&mut chip);
    let words = run_collect_frames(&mut chip, 400);

    assert_eq!(words.len(), 4, "words: {words:?}");
    match &words[2] {
        AlpideDataWord::DataLong {
            encoder_id,
            addr,
            hitmap,
            ..
        } => {
            assert_eq!(*encoder_id, 7);
            assert_eq!(*addr, 10);
            assert_eq!(*hitmap, 0b000_0001);
        }
        other => panic!("expected DATA LONG, got {other}"),
    }
}

#[test]
fn clustering_disabled_yields_two_data_shorts() {
    let cfg = ChipConfig {
        enable_clustering: false,
        ..triggered_cfg()
    };
    let (mut chip, _stats) = test_chip(&cfg);
    chip.pixel_input(hit(175, 5, 0, 5_000));
    chip.pixel_input(hit(174, 5, 0, 5_000));

    trigger(&mut chip);
    let words = run_collect_frames(&mut chip, 400);

    assert_eq!(words.len(), 5, "words: {words:?}");
    assert!(matches!(words[2], AlpideDataWord::DataShort { addr: 10, .. }));
    assert!(matches!(words[3], AlpideDataWord::DataShort { addr: 11, .. }));
}

#[test]
fn dtu_delay_shifts_the_stream_by_whole_words() {
    let first_header_index = |dtu_delay_cycles: usize| -> usize {
        let cfg = ChipConfig {
            dtu_delay_cycles,
            ..triggered_cfg()
        };
        let (mut chip, _stats) = test_chip(&cfg);
        chip.pixel_input(hit(0, 0, 0, 5_000));
        trigger(&mut chip);
        run_collect_serial(&mut chip, 400)
            .iter()
            .position(|word| matches!(word, AlpideDataWord::ChipHeader { .. }))
            .expect("no chip header emitted")
    };

    let baseline = first_header_index(0);
    assert_eq!(first_header_index(3), baseline + 3);
}

#[test]
fn regions_are_emitted_in_ascending_order() {
    let cfg = triggered_cfg();
    let (mut chip, _stats) = test_chip(&cfg);
    // One pixel in each of regions 7, 3, 21 (insertion order scrambled)
    chip.pixel_input(hit(7 * 32 + 4, 100, 0, 5_000));
    chip.pixel_input(hit(3 * 32 + 4, 100, 0, 5_000));
    chip.pixel_input(hit(21 * 32 + 4, 100, 0, 5_000));

    trigger(&mut chip);
    let words = run_collect_frames(&mut chip, 600);

    let regions: Vec<u8> = words
        .iter()
        .filter_map(|word| match word {
            AlpideDataWord::RegionHeader { region_id } => Some(*region_id),
            _ => None,
        })
        .collect();
    assert_eq!(regions, vec![3, 7, 21]);
}

#[test]
fn emitted_stream_round_trips_through_the_event_builder() {
    let cfg = triggered_cfg();
    let (mut chip, _stats) = test_chip(&cfg);
    let injected: Vec<(u16, u16)> = (0..40_u16)
        .map(|i| ((i * 67) % 1024, (i * 41) % 512))
        .collect();
    for &(col, row) in &injected {
        chip.pixel_input(hit(col, row, 0, 10_000));
    }

    trigger(&mut chip);
    let mut builder = AlpideEventBuilder::new();
    for word in run_collect_serial(&mut chip, 2_000) {
        builder.input_word(word.to_bytes());
    }

    assert_eq!(builder.num_completed_frames(), 1);
    assert_eq!(builder.protocol_errors(), 0);
    let frame = &builder.frames()[0];
    let expected: std::collections::BTreeSet<(u16, u16)> = injected.into_iter().collect();
    assert_eq!(frame.pixels(), &expected);
    assert!(frame.readout_flags().unwrap().is_clear());
}

#[test]
fn pixels_within_a_region_follow_priority_encoder_order() {
    let cfg = ChipConfig {
        enable_clustering: false,
        ..triggered_cfg()
    };
    let (mut chip, _stats) = test_chip(&cfg);
    // All hits in region 0, encoder 0, scrambled insertion order
    for &(col, row) in &[(1_u16, 3_u16), (0, 0), (1, 0), (0, 2)] {
        chip.pixel_input(hit(col, row, 0, 5_000));
    }

    trigger(&mut chip);
    let words = run_collect_frames(&mut chip, 600);

    let addrs: Vec<u16> = words
        .iter()
        .filter_map(|word| match word {
            AlpideDataWord::DataShort { addr, .. } => Some(*addr),
            _ => None,
        })
        .collect();
    let mut sorted = addrs.clone();
    sorted.sort_unstable();
    assert_eq!(addrs, sorted, "addresses must come out in ascending order");
    assert_eq!(addrs.len(), 4);
}
