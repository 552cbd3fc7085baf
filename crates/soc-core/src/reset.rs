//! Power-on reset generation and reset domain crossings.
//!
//! The POR counter lives in the `por` domain, clocked from the system clock.
//! `system_reset` is asserted while the counter is non-zero. External reset
//! requests arrive on an arbitrary edge and are only allowed to touch the
//! counter after passing a multi-stage synchronizer declared in a
//! [`CrossingArena`].

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::clock::{ClockTree, ResetPolicy};
use crate::error::ClockError;

/// Default power-on reset delay in system clock cycles.
pub const POR_RESET_CYCLES: u32 = 4095;

/// Default POR counter register width in bits.
pub const POR_COUNTER_WIDTH: u8 = 12;

/// Minimum synchronizer depth accepted for a domain crossing.
pub const MIN_SYNC_STAGES: u8 = 2;

/// Observable state of the power-on reset counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PorState {
    /// Counter is running down; holds the cycles still to go.
    Counting(u32),
    /// Counter reached zero; terminal for this power cycle.
    Stable,
}

/// Power-on reset down-counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PowerOnReset {
    initial: u32,
    counter: u32,
}

impl PowerOnReset {
    /// Creates a counter loaded with `cycles`, checked against `width` bits.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::CounterOverflow`] when `cycles` does not fit.
    pub fn new(cycles: u32, width: u8) -> Result<Self, ClockError> {
        let limit = 1_u64.checked_shl(u32::from(width)).unwrap_or(u64::MAX);
        if width == 0 || u64::from(cycles) >= limit {
            return Err(ClockError::CounterOverflow { cycles, width });
        }
        Ok(Self {
            initial: cycles,
            counter: cycles,
        })
    }

    /// Current counter value.
    #[must_use]
    pub const fn counter(&self) -> u32 {
        self.counter
    }

    /// Value loaded at power-on and on re-trigger.
    #[must_use]
    pub const fn initial(&self) -> u32 {
        self.initial
    }

    /// Current state machine state.
    #[must_use]
    pub const fn state(&self) -> PorState {
        if self.counter == 0 {
            PorState::Stable
        } else {
            PorState::Counting(self.counter)
        }
    }

    /// System reset level derived from the counter.
    #[must_use]
    pub const fn system_reset(&self) -> bool {
        self.counter != 0
    }

    /// Advances one system clock edge.
    pub fn tick(&mut self) {
        if self.counter != 0 {
            self.counter -= 1;
        }
    }

    /// Holds the counter at its initial value for this edge.
    fn hold(&mut self) {
        self.counter = self.initial;
    }
}

/// Declared single-bit signal crossing into a clock domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DomainCrossing {
    /// Signal name.
    pub name: String,
    /// Source domain, or `None` for a board-level asynchronous input.
    pub from: Option<String>,
    /// Destination domain whose reset is driven.
    pub to: String,
    /// Synchronizer depth.
    pub stages: u8,
}

/// Index of a crossing inside its [`CrossingArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CrossingId(usize);

/// Arena of every reset crossing in the design, validated on insertion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CrossingArena {
    crossings: Vec<DomainCrossing>,
}

impl CrossingArena {
    /// Creates an empty arena.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            crossings: Vec::new(),
        }
    }

    /// Declares a reset crossing of `width` bits into domain `to`.
    ///
    /// # Errors
    ///
    /// Rejects duplicate names, unknown or reset-less destinations, same-domain
    /// crossings, multi-bit signals and synchronizers shallower than
    /// [`MIN_SYNC_STAGES`].
    pub fn declare(
        &mut self,
        tree: &ClockTree,
        crossing: DomainCrossing,
        width: u8,
    ) -> Result<CrossingId, ClockError> {
        if self.crossings.iter().any(|c| c.name == crossing.name) {
            return Err(ClockError::DuplicateCrossing(crossing.name));
        }
        if width != 1 {
            return Err(ClockError::MultiBitCrossing {
                name: crossing.name,
                width,
            });
        }
        if crossing.stages < MIN_SYNC_STAGES {
            return Err(ClockError::ShallowSynchronizer {
                name: crossing.name,
                stages: crossing.stages,
                minimum: MIN_SYNC_STAGES,
            });
        }
        if let Some(from) = &crossing.from {
            tree.domain(from)?;
            if *from == crossing.to {
                return Err(ClockError::SameDomainCrossing {
                    domain: crossing.to,
                    name: crossing.name,
                });
            }
        }
        if !tree.domain(&crossing.to)?.reset_policy.has_reset() {
            return Err(ClockError::ResetLessTarget {
                name: crossing.name,
                domain: crossing.to,
            });
        }

        debug!(
            "reset crossing {} -> {} through {} stages",
            crossing.name, crossing.to, crossing.stages
        );
        self.crossings.push(crossing);
        Ok(CrossingId(self.crossings.len() - 1))
    }

    /// Crossing by id.
    #[must_use]
    pub fn get(&self, id: CrossingId) -> Option<&DomainCrossing> {
        self.crossings.get(id.0)
    }

    /// First crossing driving the reset of `domain`.
    #[must_use]
    pub fn driving(&self, domain: &str) -> Option<CrossingId> {
        self.crossings
            .iter()
            .position(|c| c.to == domain)
            .map(CrossingId)
    }

    /// Every declared crossing, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &DomainCrossing> {
        self.crossings.iter()
    }

    /// Checks that every asynchronous-reset domain is fed by a crossing.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::UnsynchronizedReset`] naming the first bare domain.
    pub fn check_coverage(&self, tree: &ClockTree) -> Result<(), ClockError> {
        tree.domains()
            .iter()
            .filter(|d| d.reset_policy == ResetPolicy::Asynchronous)
            .find(|d| self.driving(&d.name).is_none())
            .map_or(Ok(()), |d| {
                Err(ClockError::UnsynchronizedReset(d.name.clone()))
            })
    }
}

/// Flip-flop chain resolving an asynchronous request into a clock domain.
///
/// The request is sampled on each destination clock edge; a level that rises
/// and falls between two edges is never observed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResetSynchronizer {
    stages: Vec<bool>,
    request: bool,
}

impl ResetSynchronizer {
    /// Builds the synchronizer for a validated crossing.
    #[must_use]
    pub fn for_crossing(crossing: &DomainCrossing) -> Self {
        Self {
            stages: vec![false; usize::from(crossing.stages)],
            request: false,
        }
    }

    /// Drives the raw asynchronous request level between clock edges.
    pub fn set_request(&mut self, level: bool) {
        if level != self.request {
            trace!("external reset request -> {level}");
        }
        self.request = level;
    }

    /// Raw request level as currently driven.
    #[must_use]
    pub const fn request(&self) -> bool {
        self.request
    }

    /// Synchronized output, valid in the destination domain.
    #[must_use]
    pub fn output(&self) -> bool {
        self.stages.last().copied().unwrap_or(false)
    }

    /// Number of flip-flop stages.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stages.len()
    }

    /// Shifts the chain on a destination clock edge.
    pub fn clock_edge(&mut self) {
        self.stages.rotate_right(1);
        if let Some(first) = self.stages.first_mut() {
            *first = self.request;
        }
    }
}

/// Combined POR counter and external-reset synchronizer for one power cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResetSequencer {
    por: PowerOnReset,
    sync: Option<ResetSynchronizer>,
    edges: u64,
    released_at: Option<u64>,
}

impl ResetSequencer {
    /// Creates a sequencer with no external reset input (power-on only).
    #[must_use]
    pub const fn power_on_only(por: PowerOnReset) -> Self {
        Self {
            por,
            sync: None,
            edges: 0,
            released_at: None,
        }
    }

    /// Creates a sequencer whose counter can be re-triggered by `sync`.
    #[must_use]
    pub const fn with_external_reset(por: PowerOnReset, sync: ResetSynchronizer) -> Self {
        Self {
            por,
            sync: Some(sync),
            edges: 0,
            released_at: None,
        }
    }

    /// POR counter.
    #[must_use]
    pub const fn por(&self) -> &PowerOnReset {
        &self.por
    }

    /// Level of the system domain reset.
    #[must_use]
    pub const fn system_reset(&self) -> bool {
        self.por.system_reset()
    }

    /// Number of system clock edges seen since power-on.
    #[must_use]
    pub const fn edges(&self) -> u64 {
        self.edges
    }

    /// Edge count at which `system_reset` last deasserted.
    #[must_use]
    pub const fn released_at(&self) -> Option<u64> {
        self.released_at
    }

    /// Drives the raw external reset request; ignored without an input.
    pub fn set_external_request(&mut self, level: bool) {
        if let Some(sync) = &mut self.sync {
            sync.set_request(level);
        }
    }

    /// Reset level seen by logic in a domain with the given policy.
    #[must_use]
    pub fn domain_reset(&self, policy: ResetPolicy) -> bool {
        match policy {
            ResetPolicy::ResetLess => false,
            ResetPolicy::Synchronous => self.system_reset(),
            ResetPolicy::Asynchronous => self.sync.as_ref().is_some_and(ResetSynchronizer::output),
        }
    }

    /// Advances one system clock edge.
    pub fn tick(&mut self) {
        let was_reset = self.system_reset();

        let retrigger = self.sync.as_mut().is_some_and(|sync| {
            sync.clock_edge();
            sync.output()
        });
        if retrigger {
            self.por.hold();
        } else {
            self.por.tick();
        }
        self.edges += 1;

        if was_reset && !self.system_reset() {
            debug!("system reset released after {} edges", self.edges);
            self.released_at = Some(self.edges);
        } else if !was_reset && self.system_reset() {
            debug!("external reset re-triggered POR at edge {}", self.edges);
        }
    }

    /// Advances `edges` clock edges.
    pub fn run(&mut self, edges: u64) {
        for _ in 0..edges {
            self.tick();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CrossingArena, DomainCrossing, PorState, PowerOnReset, ResetSequencer, ResetSynchronizer,
        MIN_SYNC_STAGES, POR_COUNTER_WIDTH, POR_RESET_CYCLES,
    };
    use crate::clock::{ClockDomain, ClockTree, Oscillator, ResetPolicy};
    use crate::error::ClockError;

    fn board_tree() -> ClockTree {
        ClockTree::new(
            Oscillator {
                name: "clk12".into(),
                frequency_hz: 12_000_000,
            },
            vec![
                ClockDomain::oscillator("sys", ResetPolicy::Synchronous),
                ClockDomain::oscillator("sys_ps", ResetPolicy::ResetLess),
                ClockDomain::alias("por", "sys", ResetPolicy::Asynchronous),
            ],
            Vec::new(),
        )
        .expect("board tree")
    }

    fn ext_reset(stages: u8) -> DomainCrossing {
        DomainCrossing {
            name: "ext_reset".into(),
            from: None,
            to: "por".into(),
            stages,
        }
    }

    #[test]
    fn por_counts_down_and_holds_at_zero() {
        let mut por = PowerOnReset::new(3, 2).expect("fits");
        assert_eq!(por.state(), PorState::Counting(3));
        por.tick();
        por.tick();
        assert_eq!(por.state(), PorState::Counting(1));
        assert!(por.system_reset());
        por.tick();
        assert_eq!(por.state(), PorState::Stable);
        por.tick();
        assert_eq!(por.counter(), 0);
        assert!(!por.system_reset());
    }

    #[test]
    fn por_delay_must_fit_counter_width() {
        assert!(PowerOnReset::new(POR_RESET_CYCLES, POR_COUNTER_WIDTH).is_ok());
        assert_eq!(
            PowerOnReset::new(4096, POR_COUNTER_WIDTH),
            Err(ClockError::CounterOverflow {
                cycles: 4096,
                width: 12,
            })
        );
        assert!(PowerOnReset::new(1, 0).is_err());
        assert!(PowerOnReset::new(u32::MAX, 64).is_ok());
    }

    #[test]
    fn board_default_releases_after_4095_edges() {
        let por = PowerOnReset::new(POR_RESET_CYCLES, POR_COUNTER_WIDTH).expect("fits");
        let mut sequencer = ResetSequencer::power_on_only(por);

        sequencer.run(4094);
        assert!(sequencer.system_reset());
        sequencer.tick();
        assert!(!sequencer.system_reset());
        assert_eq!(sequencer.released_at(), Some(4095));
    }

    #[test]
    fn synchronizer_delays_by_stage_count() {
        let mut sync = ResetSynchronizer::for_crossing(&ext_reset(3));
        sync.set_request(true);
        sync.clock_edge();
        sync.clock_edge();
        assert!(!sync.output());
        sync.clock_edge();
        assert!(sync.output());

        sync.set_request(false);
        sync.clock_edge();
        sync.clock_edge();
        assert!(sync.output());
        sync.clock_edge();
        assert!(!sync.output());
    }

    #[test]
    fn pulse_between_edges_is_never_sampled() {
        let mut sync = ResetSynchronizer::for_crossing(&ext_reset(MIN_SYNC_STAGES));
        sync.set_request(true);
        sync.set_request(false);
        for _ in 0..4 {
            sync.clock_edge();
            assert!(!sync.output());
        }
    }

    #[test]
    fn reset_less_domain_never_sees_reset() {
        let por = PowerOnReset::new(5, 4).expect("fits");
        let sequencer = ResetSequencer::power_on_only(por);
        assert!(sequencer.domain_reset(ResetPolicy::Synchronous));
        assert!(!sequencer.domain_reset(ResetPolicy::ResetLess));
        assert!(!sequencer.domain_reset(ResetPolicy::Asynchronous));
    }

    #[test]
    fn arena_rejects_unsafe_crossings() {
        let tree = board_tree();
        let mut arena = CrossingArena::new();

        assert_eq!(
            arena.declare(&tree, ext_reset(1), 1),
            Err(ClockError::ShallowSynchronizer {
                name: "ext_reset".into(),
                stages: 1,
                minimum: 2,
            })
        );
        assert_eq!(
            arena.declare(&tree, ext_reset(2), 4),
            Err(ClockError::MultiBitCrossing {
                name: "ext_reset".into(),
                width: 4,
            })
        );
        assert_eq!(
            arena.declare(
                &tree,
                DomainCrossing {
                    name: "ps_reset".into(),
                    from: None,
                    to: "sys_ps".into(),
                    stages: 2,
                },
                1
            ),
            Err(ClockError::ResetLessTarget {
                name: "ps_reset".into(),
                domain: "sys_ps".into(),
            })
        );
        assert_eq!(
            arena.declare(
                &tree,
                DomainCrossing {
                    name: "loop".into(),
                    from: Some("por".into()),
                    to: "por".into(),
                    stages: 2,
                },
                1
            ),
            Err(ClockError::SameDomainCrossing {
                name: "loop".into(),
                domain: "por".into(),
            })
        );

        let id = arena.declare(&tree, ext_reset(2), 1).expect("valid crossing");
        assert_eq!(arena.get(id).map(|c| c.stages), Some(2));
        assert_eq!(arena.driving("por"), Some(id));
        assert_eq!(
            arena.declare(&tree, ext_reset(2), 1),
            Err(ClockError::DuplicateCrossing("ext_reset".into()))
        );
    }

    #[test]
    fn async_domain_without_crossing_fails_coverage() {
        let tree = board_tree();
        let mut arena = CrossingArena::new();
        assert_eq!(
            arena.check_coverage(&tree),
            Err(ClockError::UnsynchronizedReset("por".into()))
        );
        arena.declare(&tree, ext_reset(2), 1).expect("valid");
        assert_eq!(arena.check_coverage(&tree), Ok(()));
    }
}
