//! Scenario runner - executes the built-in engine-property scenarios.

use crate::layouts;
use crate::programs::{BondMarker, Broadcaster, ChainWalker, Idle, RandomWalker};
use crate::scenarios::ScenarioId;

use amoebot_core::{
    AmoebotSystem, AttributeValue, CoreError, Direction, GridPos, RoundError, RoundReport,
    SystemSnapshot,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;
use tracing::{debug, info};

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether the scenario passed all assertions
    pub passed: bool,

    /// Rounds attempted (committed + rejected)
    pub rounds_run: u64,

    /// Number of particles in the system
    pub particle_count: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during the run
    pub metrics: ScenarioMetrics,

    /// Per-round snapshots, captured when frame export is enabled
    pub frames: Vec<SystemSnapshot>,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default)]
pub struct ScenarioMetrics {
    /// Total geometry changes applied
    pub moved_total: u64,

    /// Rounds rejected by the movement validator
    pub rounds_rejected: u64,

    /// Total beeps sent
    pub beeps_sent: u64,

    /// Circuits in the last committed round
    pub circuits_last: usize,
}

/// Runs engine-property scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Number of particles (where the scenario is size-parametric)
    particles: usize,

    /// Round budget for open-ended scenarios
    rounds: u64,

    /// Capture a snapshot after every committed round
    capture_frames: bool,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64, particles: usize) -> Self {
        Self {
            seed,
            particles: particles.max(2),
            rounds: 40,
            capture_frames: false,
        }
    }

    /// Sets the round budget.
    pub fn with_rounds(mut self, rounds: u64) -> Self {
        self.rounds = rounds;
        self
    }

    /// Enables per-round snapshot capture.
    pub fn with_frames(mut self, capture: bool) -> Self {
        self.capture_frames = capture;
        self
    }

    fn rng(&self) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.seed)
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);
        match scenario {
            ScenarioId::NoOpRound => self.run_noop_round(),
            ScenarioId::ChainMarch => self.run_chain_march(),
            ScenarioId::Broadcast => self.run_broadcast(),
            ScenarioId::SingletonEcho => self.run_singleton_echo(),
            ScenarioId::RandomWalk => self.run_random_walk(),
        }
    }

    fn result(
        &self,
        scenario: ScenarioId,
        system: &AmoebotSystem,
        rounds_run: u64,
        metrics: ScenarioMetrics,
        frames: Vec<SystemSnapshot>,
        failure_reason: Option<String>,
    ) -> ScenarioResult {
        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: failure_reason.is_none(),
            rounds_run,
            particle_count: system.particle_count(),
            failure_reason,
            metrics,
            frames,
        }
    }

    fn record(
        &self,
        report: RoundReport,
        system: &AmoebotSystem,
        metrics: &mut ScenarioMetrics,
        frames: &mut Vec<SystemSnapshot>,
    ) {
        metrics.moved_total += report.moved as u64;
        metrics.beeps_sent += report.beeps_sent as u64;
        metrics.circuits_last = report.circuits;
        if self.capture_frames {
            frames.push(system.snapshot());
        }
    }

    /// SIM-001: one-sided marks on idle particles commit as a no-op.
    fn run_noop_round(&self) -> ScenarioResult {
        let mut rng = self.rng();
        let mut system = AmoebotSystem::with_defaults();
        layouts::line(&mut system, 3, Direction::East, &mut rng, |index, fwd| {
            match index {
                // Both ends mark the bond toward the middle particle.
                0 => BondMarker::new(vec![fwd], 1),
                2 => BondMarker::new(vec![fwd.opposite()], 1),
                _ => Box::new(Idle),
            }
        })
        .expect("line placement on an empty grid");

        let before = system.snapshot();
        let mut metrics = ScenarioMetrics::default();
        let mut frames = Vec::new();

        let failure = match system.run_round() {
            Ok(report) => {
                self.record(report, &system, &mut metrics, &mut frames);
                let after = system.snapshot();
                if report.moved != 0 {
                    Some(format!("no-op round moved {} particles", report.moved))
                } else if !same_geometry(&before, &after) {
                    Some("no-op round changed geometry".to_string())
                } else {
                    None
                }
            }
            Err(err) => Some(format!("no-op round rejected: {}", err)),
        };

        self.result(ScenarioId::NoOpRound, &system, 1, metrics, frames, failure)
    }

    /// SIM-002: a bonded chain marches by push/pull handovers.
    fn run_chain_march(&self) -> ScenarioResult {
        const GOAL: u64 = 3;
        let n = self.particles;
        let mut rng = self.rng();
        let mut system = AmoebotSystem::with_defaults();
        let ids = layouts::line(&mut system, n, Direction::East, &mut rng, |_, fwd| {
            ChainWalker::new(fwd, GOAL)
        })
        .expect("line placement on an empty grid");

        let budget = 2 * GOAL + 2 * n as u64 + 6;
        let mut metrics = ScenarioMetrics::default();
        let mut frames = Vec::new();
        let mut rounds_run = 0;
        let mut failure = None;

        while !system.is_done() && rounds_run < budget {
            match system.run_round() {
                Ok(report) => {
                    self.record(report, &system, &mut metrics, &mut frames);
                    rounds_run += 1;
                }
                Err(err) => {
                    failure = Some(format!("chain round rejected: {}", err));
                    break;
                }
            }
        }

        if failure.is_none() {
            if !system.is_done() {
                failure = Some(format!("chain did not finish within {} rounds", budget));
            } else {
                for (index, id) in ids.iter().enumerate() {
                    let p = system.particle(*id).expect("chain member exists");
                    let expected = GridPos::new(index as i32 + GOAL as i32, 0);
                    if p.is_expanded() || p.body.head() != expected {
                        failure = Some(format!(
                            "particle {} ended at {} instead of {}",
                            index,
                            p.body.head(),
                            expected
                        ));
                        break;
                    }
                    if p.attributes().value_by_name("steps")
                        != Some(&AttributeValue::Uint(GOAL))
                    {
                        failure = Some(format!("particle {} step count is off", index));
                        break;
                    }
                }
            }
        }

        self.result(ScenarioId::ChainMarch, &system, rounds_run, metrics, frames, failure)
    }

    /// SIM-003: one beep on the global circuit reaches every connected
    /// particle exactly one round later; a disconnected particle hears
    /// nothing.
    fn run_broadcast(&self) -> ScenarioResult {
        let mut rng = self.rng();
        let mut system = AmoebotSystem::with_defaults();
        let connected = layouts::disc(&mut system, 10, &mut rng, |index| {
            Broadcaster::new(index == 0)
        })
        .expect("disc placement on an empty grid");
        let isolated = system
            .add_particle(
                GridPos::new(50, 0),
                layouts::random_compass(&mut rng),
                Broadcaster::new(false),
            )
            .expect("isolated cell is free");

        let mut metrics = ScenarioMetrics::default();
        let mut frames = Vec::new();
        let mut failure = None;

        // Round 1: the leader sends; nothing is received yet.
        match system.run_round() {
            Ok(report) => {
                self.record(report, &system, &mut metrics, &mut frames);
                let heard_early = connected.iter().any(|id| {
                    system.particle(*id).unwrap().attributes().value_by_name("heard")
                        == Some(&AttributeValue::Bool(true))
                });
                if heard_early {
                    failure = Some("beep visible in the round it was sent".to_string());
                }
            }
            Err(err) => failure = Some(format!("round 1 rejected: {}", err)),
        }

        // Round 2: every connected particle hears it.
        if failure.is_none() {
            match system.run_round() {
                Ok(report) => {
                    self.record(report, &system, &mut metrics, &mut frames);
                    for id in &connected {
                        let heard = system
                            .particle(*id)
                            .unwrap()
                            .attributes()
                            .value_by_name("heard");
                        if heard != Some(&AttributeValue::Bool(true)) {
                            failure =
                                Some(format!("connected particle {} missed the beep", id));
                            break;
                        }
                    }
                    let silent = system
                        .particle(isolated)
                        .unwrap()
                        .attributes()
                        .value_by_name("heard");
                    if failure.is_none() && silent == Some(&AttributeValue::Bool(true)) {
                        failure = Some("disconnected particle heard a beep".to_string());
                    }
                }
                Err(err) => failure = Some(format!("round 2 rejected: {}", err)),
            }
        }

        self.result(ScenarioId::Broadcast, &system, 2, metrics, frames, failure)
    }

    /// SIM-004: a lone particle's send echoes back to it next round.
    fn run_singleton_echo(&self) -> ScenarioResult {
        let mut rng = self.rng();
        let mut system = AmoebotSystem::with_defaults();
        system
            .add_particle(
                GridPos::ORIGIN,
                layouts::random_compass(&mut rng),
                Broadcaster::new(true),
            )
            .expect("empty grid");

        let mut metrics = ScenarioMetrics::default();
        let mut frames = Vec::new();
        let mut rounds_run = 0;
        let mut failure = None;

        while !system.is_done() && rounds_run < 5 {
            match system.run_round() {
                Ok(report) => {
                    self.record(report, &system, &mut metrics, &mut frames);
                    rounds_run += 1;
                }
                Err(err) => {
                    failure = Some(format!("echo round rejected: {}", err));
                    break;
                }
            }
        }

        if failure.is_none() && rounds_run != 2 {
            failure = Some(format!("echo took {} rounds instead of 2", rounds_run));
        }

        self.result(ScenarioId::SingletonEcho, &system, rounds_run, metrics, frames, failure)
    }

    /// SIM-005: fuzzed requests; the occupancy invariant must hold after
    /// every committed round, conflicts or not.
    fn run_random_walk(&self) -> ScenarioResult {
        let walker_seed = self.seed.wrapping_mul(0x9e3779b97f4a7c15);
        let mut rng = self.rng();
        let mut system = AmoebotSystem::with_defaults();
        layouts::disc(&mut system, self.particles, &mut rng, |index| {
            RandomWalker::new(ChaCha8Rng::seed_from_u64(
                walker_seed.wrapping_add(index as u64),
            ))
        })
        .expect("disc placement on an empty grid");

        let mut metrics = ScenarioMetrics::default();
        let mut frames = Vec::new();
        let mut failure = None;

        for round in 0..self.rounds {
            match system.run_round() {
                Ok(report) => {
                    self.record(report, &system, &mut metrics, &mut frames);
                }
                Err(RoundError {
                    source: CoreError::Movement(reason),
                    ..
                }) => {
                    debug!(round, %reason, "movement batch rejected");
                    metrics.rounds_rejected += 1;
                }
                Err(err) => {
                    failure = Some(format!("unexpected failure: {}", err));
                    break;
                }
            }
            if failure.is_none() {
                if let Err(violation) = audit_snapshot(&system.snapshot()) {
                    failure = Some(violation);
                    break;
                }
            }
        }

        self.result(ScenarioId::RandomWalk, &system, self.rounds, metrics, frames, failure)
    }
}

/// Checks the occupancy invariants on a snapshot: no cell is claimed twice
/// and every expanded body is a pair of adjacent cells.
pub fn audit_snapshot(snapshot: &SystemSnapshot) -> Result<(), String> {
    let cells = snapshot.occupied_cells();
    let unique: HashSet<_> = cells.iter().collect();
    if unique.len() != cells.len() {
        return Err(format!("round {}: occupancy collision", snapshot.round));
    }
    for p in &snapshot.particles {
        if let Some(tail) = p.tail {
            if !p.head.is_adjacent_to(tail) {
                return Err(format!(
                    "round {}: particle {} body is torn",
                    snapshot.round, p.id
                ));
            }
        }
    }
    Ok(())
}

fn same_geometry(a: &SystemSnapshot, b: &SystemSnapshot) -> bool {
    a.particles.len() == b.particles.len()
        && a.particles
            .iter()
            .zip(&b.particles)
            .all(|(x, y)| x.head == y.head && x.tail == y.tail)
}
