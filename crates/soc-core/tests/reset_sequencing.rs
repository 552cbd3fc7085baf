//! Power-on reset and external reset synchronization, edge by edge.

#![allow(clippy::pedantic, clippy::nursery)]

use log as _;
use proptest::prelude::*;
use rstest::rstest;
use serde as _;
use soc_core::{
    assemble, DomainCrossing, PlatformConfig, PorState, PowerOnReset, ResetPolicy,
    ResetSequencer, ResetSynchronizer, POR_COUNTER_WIDTH, POR_RESET_CYCLES,
};
use thiserror as _;
use toml as _;

fn board_sequencer() -> ResetSequencer {
    assemble(&PlatformConfig::default())
        .expect("board assembles")
        .reset_sequencer()
        .expect("board POR fits its counter")
}

fn crossing(stages: u8) -> DomainCrossing {
    DomainCrossing {
        name: "ext_reset".into(),
        from: None,
        to: "por".into(),
        stages,
    }
}

#[test]
fn board_reset_releases_after_exactly_4095_edges_and_stays_released() {
    let mut sequencer = board_sequencer();
    assert!(sequencer.system_reset());
    assert_eq!(sequencer.por().state(), PorState::Counting(POR_RESET_CYCLES));

    for edge in 1..=4094_u64 {
        sequencer.tick();
        assert!(sequencer.system_reset(), "released early at edge {edge}");
    }
    sequencer.tick();
    assert!(!sequencer.system_reset());
    assert_eq!(sequencer.released_at(), Some(4095));

    sequencer.run(10_000);
    assert!(!sequencer.system_reset());
    assert_eq!(sequencer.por().state(), PorState::Stable);
}

#[test]
fn domain_resets_follow_their_policy() {
    let mut sequencer = board_sequencer();
    assert!(sequencer.domain_reset(ResetPolicy::Synchronous));
    assert!(!sequencer.domain_reset(ResetPolicy::ResetLess));

    sequencer.run(u64::from(POR_RESET_CYCLES));
    assert!(!sequencer.domain_reset(ResetPolicy::Synchronous));
    assert!(!sequencer.domain_reset(ResetPolicy::ResetLess));
}

#[test]
fn glitch_between_edges_has_no_effect() {
    let mut sequencer = board_sequencer();
    sequencer.run(4095);
    assert!(!sequencer.system_reset());

    sequencer.set_external_request(true);
    sequencer.set_external_request(false);
    sequencer.run(16);

    assert!(!sequencer.system_reset());
    assert_eq!(sequencer.released_at(), Some(4095));
}

#[rstest]
#[case(2)]
#[case(3)]
#[case(5)]
fn external_request_retriggers_after_synchronizer_latency(#[case] stages: u8) {
    let por = PowerOnReset::new(10, 4).expect("fits");
    let mut sequencer =
        ResetSequencer::with_external_reset(por, ResetSynchronizer::for_crossing(&crossing(stages)));
    sequencer.run(10);
    assert!(!sequencer.system_reset());

    sequencer.set_external_request(true);
    for _ in 1..stages {
        sequencer.tick();
        assert!(!sequencer.system_reset(), "request visible before {stages} stages");
    }
    sequencer.tick();
    assert!(sequencer.system_reset());
    assert!(sequencer.domain_reset(ResetPolicy::Asynchronous));

    // Held at the initial value while the request stays asserted.
    sequencer.run(50);
    assert_eq!(sequencer.por().counter(), 10);

    sequencer.set_external_request(false);
    let deasserted_at = sequencer.edges();
    sequencer.run(u64::from(stages) + 10);
    assert!(!sequencer.system_reset());
    // The edge that first sees the request low already counts down.
    assert_eq!(
        sequencer.released_at(),
        Some(deasserted_at + u64::from(stages) + 9)
    );
}

#[test]
fn power_on_only_sequencer_ignores_external_requests() {
    let por = PowerOnReset::new(POR_RESET_CYCLES, POR_COUNTER_WIDTH).expect("fits");
    let mut sequencer = ResetSequencer::power_on_only(por);
    sequencer.run(4095);
    sequencer.set_external_request(true);
    sequencer.run(8);
    assert!(!sequencer.system_reset());
}

proptest! {
    #[test]
    fn por_releases_after_programmed_delay(cycles in 1_u32..4096) {
        let por = PowerOnReset::new(cycles, POR_COUNTER_WIDTH).expect("fits 12 bits");
        let mut sequencer = ResetSequencer::power_on_only(por);
        sequencer.run(u64::from(cycles) - 1);
        prop_assert!(sequencer.system_reset());
        sequencer.tick();
        prop_assert!(!sequencer.system_reset());
        prop_assert_eq!(sequencer.released_at(), Some(u64::from(cycles)));
    }

    #[test]
    fn reset_never_reasserts_without_a_sampled_request(
        cycles in 1_u32..64,
        glitches in prop::collection::vec(any::<bool>(), 0..128),
    ) {
        let por = PowerOnReset::new(cycles, 8).expect("fits");
        let mut sequencer =
            ResetSequencer::with_external_reset(por, ResetSynchronizer::for_crossing(&crossing(2)));
        let mut released = false;
        for pulse in glitches {
            if pulse {
                sequencer.set_external_request(true);
                sequencer.set_external_request(false);
            }
            sequencer.tick();
            if released {
                prop_assert!(!sequencer.system_reset());
            }
            released |= !sequencer.system_reset();
        }
    }
}
