//! The round scheduler and system container.
//!
//! `AmoebotSystem` is the single authority over the two system-wide mutable
//! structures: the grid occupancy map and the per-round circuit graph. Each
//! round runs two phases over every particle (movement, then
//! communication), validates and applies the movement batch, builds
//! circuits and propagates beeps, and finally commits every attribute store
//! in one step. No partial commit is ever observable: a rejected round
//! leaves geometry, bonds, and committed attributes untouched.

use crate::circuit::{self, CircuitInput};
use crate::error::{CoreError, RoundError};
use crate::grid::{Compass, GridPos};
use crate::movement::{self, MovePlan};
use crate::particle::{Particle, ParticleId};
use crate::program::{ParticleContext, ParticleProgram};
use crate::snapshot::{ObjectSnapshot, ParticleSnapshot, SystemSnapshot};

use std::collections::HashMap;
use tracing::{debug, warn};

/// System-wide parameters, fixed at construction.
#[derive(Debug, Clone)]
pub struct SystemConfig {
    /// Pins per boundary edge, identical for every particle.
    pub pin_count: u8,

    /// Default round budget for [`AmoebotSystem::run`].
    pub max_rounds: u64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            pin_count: 2,
            max_rounds: 1000,
        }
    }
}

/// The phase an activation runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Movement,
    Communication,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Init => write!(f, "init"),
            Phase::Movement => write!(f, "movement"),
            Phase::Communication => write!(f, "communication"),
        }
    }
}

/// What occupies a grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occupant {
    Particle(ParticleId),
    /// A static, non-movable obstacle.
    Object(u64),
}

/// Per-round metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoundReport {
    /// The committed round number (1-based).
    pub round: u64,

    /// Particles whose geometry changed.
    pub moved: usize,

    /// Distinct circuits this round.
    pub circuits: usize,

    /// Partition sets that sent a beep.
    pub beeps_sent: usize,

    /// Partition sets that received a beep.
    pub sets_received: usize,

    /// True once every program reports terminal status.
    pub all_done: bool,
}

/// How a [`AmoebotSystem::run`] loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every particle reported terminal status.
    Terminated { rounds: u64 },

    /// The round budget ran out first.
    BudgetExhausted { rounds: u64 },
}

impl RunOutcome {
    /// Rounds executed by the loop.
    pub fn rounds(&self) -> u64 {
        match self {
            RunOutcome::Terminated { rounds } | RunOutcome::BudgetExhausted { rounds } => *rounds,
        }
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, RunOutcome::Terminated { .. })
    }
}

/// The particle system and its synchronous round driver.
pub struct AmoebotSystem {
    config: SystemConfig,
    pub(crate) particles: HashMap<ParticleId, Particle>,
    programs: HashMap<ParticleId, Box<dyn ParticleProgram>>,
    /// Creation order; activation and reporting sweep in this order.
    order: Vec<ParticleId>,
    pub(crate) occupancy: HashMap<GridPos, Occupant>,
    objects: HashMap<u64, GridPos>,
    next_object: u64,
    created: u64,
    rounds_completed: u64,
}

impl AmoebotSystem {
    /// Creates an empty system with the given configuration.
    pub fn new(config: SystemConfig) -> Self {
        Self {
            config,
            particles: HashMap::new(),
            programs: HashMap::new(),
            order: Vec::new(),
            occupancy: HashMap::new(),
            objects: HashMap::new(),
            next_object: 0,
            created: 0,
            rounds_completed: 0,
        }
    }

    /// Creates an empty system with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(SystemConfig::default())
    }

    /// The system configuration.
    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    /// Pins per boundary edge.
    pub fn pin_count(&self) -> u8 {
        self.config.pin_count
    }

    /// Rounds committed so far.
    pub fn rounds_completed(&self) -> u64 {
        self.rounds_completed
    }

    /// Number of particles in the system.
    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    /// Number of static objects in the system.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Particle ids in creation order.
    pub fn particle_ids(&self) -> &[ParticleId] {
        &self.order
    }

    /// Read access to a particle.
    pub fn particle(&self, id: ParticleId) -> Option<&Particle> {
        self.particles.get(&id)
    }

    /// What occupies the given cell, if anything.
    pub fn occupant_at(&self, cell: GridPos) -> Option<Occupant> {
        self.occupancy.get(&cell).copied()
    }

    /// True once every program reports terminal status.
    pub fn is_done(&self) -> bool {
        self.programs.values().all(|p| p.is_done())
    }

    // ========================================================================
    // CONSTRUCTION
    // ========================================================================

    /// Adds a contracted particle at `cell` and runs its program's
    /// `on_init` hook.
    pub fn add_particle(
        &mut self,
        cell: GridPos,
        compass: Compass,
        mut program: Box<dyn ParticleProgram>,
    ) -> Result<ParticleId, CoreError> {
        if self.occupancy.contains_key(&cell) {
            return Err(CoreError::CellOccupied(cell));
        }
        let id = ParticleId::from_seed(self.created);
        self.created += 1;

        self.particles.insert(id, Particle::new(id, cell, compass));
        self.occupancy.insert(cell, Occupant::Particle(id));
        self.order.push(id);

        let mut ctx = ParticleContext::new(self, id, Phase::Init);
        if let Err(err) = program.on_init(&mut ctx) {
            // Roll the half-constructed particle back out.
            self.particles.remove(&id);
            self.occupancy.remove(&cell);
            self.order.retain(|p| *p != id);
            return Err(err);
        }
        self.programs.insert(id, program);
        Ok(id)
    }

    /// Adds a static object at `cell`.
    pub fn add_object(&mut self, cell: GridPos) -> Result<u64, CoreError> {
        if self.occupancy.contains_key(&cell) {
            return Err(CoreError::CellOccupied(cell));
        }
        let id = self.next_object;
        self.next_object += 1;
        self.objects.insert(id, cell);
        self.occupancy.insert(cell, Occupant::Object(id));
        Ok(id)
    }

    /// Removes a particle and everything it occupies.
    pub fn remove_particle(&mut self, id: ParticleId) -> Result<(), CoreError> {
        let particle = self
            .particles
            .remove(&id)
            .ok_or(CoreError::UnknownParticle(id))?;
        for cell in particle.body.cells() {
            self.occupancy.remove(&cell);
        }
        self.programs.remove(&id);
        self.order.retain(|p| *p != id);
        Ok(())
    }

    // ========================================================================
    // ROUND DRIVER
    // ========================================================================

    /// Executes one synchronous round: movement phase, movement commit,
    /// communication phase, beep propagation, attribute commit.
    ///
    /// On any failure the whole round is rejected: requests and planned
    /// writes are dropped and the committed state is left untouched.
    pub fn run_round(&mut self) -> Result<RoundReport, RoundError> {
        let round = self.rounds_completed + 1;

        // Phase 1: movement requests, then the joint commit.
        self.run_phase(round, Phase::Movement)?;
        let plan = match movement::resolve(&self.particles, &self.order, &self.occupancy) {
            Ok(plan) => plan,
            Err(err) => {
                warn!(round, error = %err, "movement commit rejected");
                let particle = err.particle();
                self.reject_round();
                return Err(RoundError {
                    round,
                    phase: Phase::Movement,
                    particle: Some(particle),
                    source: err.into(),
                });
            }
        };
        let moved = plan.moved();
        self.apply_moves(plan);

        // Phase 2: communication over the new geometry.
        self.run_phase(round, Phase::Communication)?;
        let inputs: Vec<CircuitInput<'_>> = self
            .order
            .iter()
            .map(|id| {
                let p = &self.particles[id];
                CircuitInput {
                    id: p.id,
                    body: p.body,
                    compass: p.compass,
                    bonds: &p.bonds,
                    config: p.pending_config.as_ref(),
                }
            })
            .collect();
        let mut results = circuit::propagate(self.config.pin_count, &inputs);
        drop(inputs);

        for id in &self.order {
            let p = self.particles.get_mut(id).expect("ordered particle exists");
            p.prev_beeps = results.received.remove(id).unwrap_or_default();
            p.pending_config = None;
        }

        // Whole-store commit: every planned value becomes current at once.
        for p in self.particles.values_mut() {
            p.attrs.commit_round();
        }

        self.rounds_completed = round;
        let report = RoundReport {
            round,
            moved,
            circuits: results.circuit_count,
            beeps_sent: results.beeps_sent,
            sets_received: results.sets_received,
            all_done: self.is_done(),
        };
        debug!(
            round,
            moved,
            circuits = report.circuits,
            beeps = report.beeps_sent,
            "round committed"
        );
        Ok(report)
    }

    /// Drives rounds until every program is done or the budget runs out.
    ///
    /// `budget` overrides the configured `max_rounds`.
    pub fn run(&mut self, budget: Option<u64>) -> Result<RunOutcome, RoundError> {
        let budget = budget.unwrap_or(self.config.max_rounds);
        let mut rounds = 0;
        loop {
            if self.is_done() {
                return Ok(RunOutcome::Terminated { rounds });
            }
            if rounds >= budget {
                return Ok(RunOutcome::BudgetExhausted { rounds });
            }
            self.run_round()?;
            rounds += 1;
        }
    }

    /// A read-only snapshot of geometry and committed attributes.
    pub fn snapshot(&self) -> SystemSnapshot {
        let particles = self
            .order
            .iter()
            .map(|id| {
                let p = &self.particles[id];
                ParticleSnapshot {
                    id: p.id,
                    head: p.body.head(),
                    tail: p.body.is_expanded().then(|| p.body.tail()),
                    attributes: p
                        .attrs
                        .iter_current()
                        .map(|(name, value)| (name.to_string(), value.clone()))
                        .collect(),
                }
            })
            .collect();
        let mut objects: Vec<ObjectSnapshot> = self
            .objects
            .iter()
            .map(|(&id, &cell)| ObjectSnapshot { id, cell })
            .collect();
        objects.sort_by_key(|o| o.id);
        SystemSnapshot {
            round: self.rounds_completed,
            particles,
            objects,
        }
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    fn run_phase(&mut self, round: u64, phase: Phase) -> Result<(), RoundError> {
        let ids = self.order.clone();
        for id in ids {
            let Some(mut program) = self.programs.remove(&id) else {
                continue;
            };
            let mut ctx = ParticleContext::new(self, id, phase);
            let result = match phase {
                Phase::Movement => program.on_move_phase(&mut ctx),
                Phase::Communication => program.on_beep_phase(&mut ctx),
                Phase::Init => unreachable!("init runs from add_particle"),
            };
            self.programs.insert(id, program);
            if let Err(source) = result {
                warn!(round, %phase, particle = %id, error = %source, "activation failed");
                self.reject_round();
                return Err(RoundError {
                    round,
                    phase,
                    particle: Some(id),
                    source,
                });
            }
        }
        Ok(())
    }

    /// Drops every per-round declaration and planned write.
    fn reject_round(&mut self) {
        for p in self.particles.values_mut() {
            p.pending_move = None;
            p.pending_config = None;
            p.attrs.discard_planned();
        }
    }

    /// Applies a validated movement plan: geometry for the whole system
    /// changes in one step.
    fn apply_moves(&mut self, plan: MovePlan) {
        // Vacate first so handover cells are free before re-insertion.
        for (id, _) in &plan.new_bodies {
            let p = &self.particles[id];
            for cell in p.body.cells() {
                self.occupancy.remove(&cell);
            }
        }
        for (id, new_body) in &plan.new_bodies {
            let p = self.particles.get_mut(id).expect("moved particle exists");
            p.bonds = movement::migrate_marks(&p.bonds, p.body, *new_body);
            p.body = *new_body;
            for cell in new_body.cells() {
                let previous = self.occupancy.insert(cell, Occupant::Particle(*id));
                debug_assert!(previous.is_none(), "movement commit produced a collision");
            }
        }
        for p in self.particles.values_mut() {
            p.pending_move = None;
        }
        self.prune_marks();
    }

    /// Drops bond marks whose edge no longer faces a particle; geometry
    /// changes would otherwise leave dangling marks that trip the next
    /// round's symmetry audit.
    fn prune_marks(&mut self) {
        let ids = self.order.clone();
        for id in ids {
            let p = &self.particles[&id];
            let stale: Vec<_> = p
                .bonds
                .keys()
                .filter(|edge| {
                    if !p.body.has_edge(**edge) {
                        return true;
                    }
                    let facing = p.body.cell_on(edge.side).neighbor(edge.dir);
                    !matches!(
                        self.occupancy.get(&facing),
                        Some(Occupant::Particle(other)) if *other != id
                    )
                })
                .copied()
                .collect();
            if !stale.is_empty() {
                let p = self.particles.get_mut(&id).expect("particle exists");
                for edge in stale {
                    p.bonds.remove(&edge);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::AttributeValue;
    use crate::error::CoreError;
    use crate::grid::Direction;
    use crate::movement::MovementError;
    use crate::pins::PartitionSetId;

    /// Program that does nothing and never finishes.
    struct Idle;
    impl ParticleProgram for Idle {}

    /// Expands once in a fixed local direction, then idles.
    struct ExpandOnce {
        dir: Direction,
        fired: bool,
    }

    impl ExpandOnce {
        fn new(dir: Direction) -> Box<Self> {
            Box::new(Self { dir, fired: false })
        }
    }

    impl ParticleProgram for ExpandOnce {
        fn on_move_phase(&mut self, p: &mut ParticleContext<'_>) -> Result<(), CoreError> {
            if !self.fired {
                self.fired = true;
                p.expand(self.dir)?;
            }
            Ok(())
        }
    }

    fn line_system(n: usize) -> (AmoebotSystem, Vec<ParticleId>) {
        let mut system = AmoebotSystem::with_defaults();
        let ids = (0..n)
            .map(|i| {
                system
                    .add_particle(GridPos::new(i as i32, 0), Compass::identity(), Box::new(Idle))
                    .unwrap()
            })
            .collect();
        (system, ids)
    }

    #[test]
    fn test_add_particle_rejects_occupied_cell() {
        let (mut system, _) = line_system(1);
        let err = system
            .add_particle(GridPos::ORIGIN, Compass::identity(), Box::new(Idle))
            .unwrap_err();
        assert!(matches!(err, CoreError::CellOccupied(_)));
    }

    #[test]
    fn test_remove_particle_clears_occupancy() {
        let (mut system, ids) = line_system(2);
        system.remove_particle(ids[0]).unwrap();
        assert_eq!(system.particle_count(), 1);
        assert_eq!(system.occupant_at(GridPos::ORIGIN), None);
        assert!(matches!(
            system.remove_particle(ids[0]),
            Err(CoreError::UnknownParticle(_))
        ));
    }

    #[test]
    fn test_noop_round_commits_without_change() {
        let (mut system, _) = line_system(3);
        let before = system.snapshot();
        let report = system.run_round().unwrap();
        assert_eq!(report.moved, 0);
        assert_eq!(report.round, 1);

        let after = system.snapshot();
        for (a, b) in before.particles.iter().zip(&after.particles) {
            assert_eq!(a.head, b.head);
            assert_eq!(a.tail, b.tail);
        }
    }

    #[test]
    fn test_expansion_commits_geometry() {
        let mut system = AmoebotSystem::with_defaults();
        let id = system
            .add_particle(
                GridPos::ORIGIN,
                Compass::identity(),
                ExpandOnce::new(Direction::East),
            )
            .unwrap();

        let report = system.run_round().unwrap();
        assert_eq!(report.moved, 1);
        let p = system.particle(id).unwrap();
        assert!(p.is_expanded());
        assert_eq!(p.body.head(), GridPos::new(1, 0));
        assert_eq!(
            system.occupant_at(GridPos::new(1, 0)),
            Some(Occupant::Particle(id))
        );
        assert_eq!(
            system.occupant_at(GridPos::ORIGIN),
            Some(Occupant::Particle(id))
        );
    }

    #[test]
    fn test_rejected_round_leaves_state_untouched() {
        // Two adjacent particles expanding into each other's cells.
        let mut system = AmoebotSystem::with_defaults();
        system
            .add_particle(
                GridPos::ORIGIN,
                Compass::identity(),
                ExpandOnce::new(Direction::East),
            )
            .unwrap();
        system
            .add_particle(
                GridPos::new(1, 0),
                Compass::identity(),
                ExpandOnce::new(Direction::East),
            )
            .unwrap();

        let err = system.run_round().unwrap_err();
        assert_eq!(err.round, 1);
        assert_eq!(err.phase, Phase::Movement);
        assert!(matches!(
            err.source,
            CoreError::Movement(MovementError::TargetOccupied { .. })
        ));

        assert_eq!(system.rounds_completed(), 0);
        for id in system.particle_ids() {
            assert!(!system.particle(*id).unwrap().is_expanded());
        }

        // The system stays drivable after a rejection.
        let report = system.run_round().unwrap();
        assert_eq!(report.moved, 0);
    }

    #[test]
    fn test_expansion_into_object_rejected() {
        let mut system = AmoebotSystem::with_defaults();
        system
            .add_particle(
                GridPos::ORIGIN,
                Compass::identity(),
                ExpandOnce::new(Direction::East),
            )
            .unwrap();
        system.add_object(GridPos::new(1, 0)).unwrap();

        let err = system.run_round().unwrap_err();
        assert!(matches!(
            err.source,
            CoreError::Movement(MovementError::TargetOccupied { .. })
        ));
        assert_eq!(system.object_count(), 1);
    }

    #[test]
    fn test_attribute_commit_is_atomic_across_particles() {
        /// Writes its value, and reads the neighbor's committed value.
        struct Writer {
            seen: Vec<i64>,
        }
        impl ParticleProgram for Writer {
            fn on_init(&mut self, p: &mut ParticleContext<'_>) -> Result<(), CoreError> {
                p.declare_attr("x", 0i64)?;
                Ok(())
            }
            fn on_move_phase(&mut self, p: &mut ParticleContext<'_>) -> Result<(), CoreError> {
                let h = p.declare_attr("x", 0i64)?;
                let next = p.read(&h)? + 1;
                p.write(&h, next)?;
                // The neighbor's write this round must stay invisible.
                for dir in [Direction::East, Direction::West] {
                    if let Some(AttributeValue::Int(v)) = p.neighbor_attr(dir, "x") {
                        self.seen.push(v);
                    }
                }
                Ok(())
            }
        }

        let mut system = AmoebotSystem::with_defaults();
        for i in 0..2 {
            system
                .add_particle(
                    GridPos::new(i, 0),
                    Compass::identity(),
                    Box::new(Writer { seen: Vec::new() }),
                )
                .unwrap();
        }

        system.run_round().unwrap();
        system.run_round().unwrap();

        for id in system.particle_ids() {
            let p = system.particle(*id).unwrap();
            assert_eq!(
                p.attributes().value_by_name("x"),
                Some(&AttributeValue::Int(2))
            );
        }
    }

    #[test]
    fn test_beep_visible_only_next_round() {
        /// Sends a beep on the global circuit in round 1 and records when
        /// it hears one.
        struct Beeper {
            send: bool,
            heard_in_round: Option<u64>,
        }
        impl ParticleProgram for Beeper {
            fn on_beep_phase(&mut self, p: &mut ParticleContext<'_>) -> Result<(), CoreError> {
                if p.received_beep(PartitionSetId(0)) && self.heard_in_round.is_none() {
                    self.heard_in_round = Some(p.round() + 1);
                    let h = p.declare_attr("heard_round", 0u64)?;
                    p.write(&h, p.round() + 1)?;
                }
                let mut cfg = p.pin_config();
                let ps = cfg.global_set()?;
                if self.send {
                    self.send = false;
                    cfg.send_beep(ps)?;
                }
                p.declare_config(cfg)?;
                Ok(())
            }
        }

        let mut system = AmoebotSystem::with_defaults();
        for i in 0..3 {
            system
                .add_particle(
                    GridPos::new(i, 0),
                    Compass::identity(),
                    Box::new(Beeper {
                        send: i == 0,
                        heard_in_round: None,
                    }),
                )
                .unwrap();
        }

        let report = system.run_round().unwrap();
        assert_eq!(report.beeps_sent, 1);
        // Nothing heard during the sending round.
        for id in system.particle_ids() {
            assert_eq!(
                system.particle(*id).unwrap().attributes().value_by_name("heard_round"),
                None
            );
        }

        system.run_round().unwrap();
        for id in system.particle_ids() {
            assert_eq!(
                system.particle(*id).unwrap().attributes().value_by_name("heard_round"),
                Some(&AttributeValue::Uint(2))
            );
        }
    }

    #[test]
    fn test_neighbor_planned_read_is_explicit_and_distinct() {
        /// Writes a new value, then inspects the west neighbor through both
        /// accessors and records what each returned.
        struct PlannedPeek;
        impl ParticleProgram for PlannedPeek {
            fn on_init(&mut self, p: &mut ParticleContext<'_>) -> Result<(), CoreError> {
                p.declare_attr("v", 0i64)?;
                p.declare_attr("saw_committed", -1i64)?;
                p.declare_attr("saw_planned", -1i64)?;
                Ok(())
            }
            fn on_move_phase(&mut self, p: &mut ParticleContext<'_>) -> Result<(), CoreError> {
                let v = p.declare_attr("v", 0i64)?;
                p.write(&v, 5)?;
                if let Some(AttributeValue::Int(seen)) = p.neighbor_attr(Direction::West, "v") {
                    let h = p.declare_attr("saw_committed", -1i64)?;
                    p.write(&h, seen)?;
                }
                if let Some(AttributeValue::Int(seen)) =
                    p.neighbor_attr_planned(Direction::West, "v")
                {
                    let h = p.declare_attr("saw_planned", -1i64)?;
                    p.write(&h, seen)?;
                }
                Ok(())
            }
        }

        let mut system = AmoebotSystem::with_defaults();
        let mut ids = Vec::new();
        for i in 0..2 {
            ids.push(
                system
                    .add_particle(GridPos::new(i, 0), Compass::identity(), Box::new(PlannedPeek))
                    .unwrap(),
            );
        }

        system.run_round().unwrap();
        // The east particle activates after its west neighbor wrote: the
        // committed accessor still sees 0 while the planned accessor leaks
        // the in-flight 5.
        let east = system.particle(ids[1]).unwrap();
        assert_eq!(
            east.attributes().value_by_name("saw_committed"),
            Some(&AttributeValue::Int(0))
        );
        assert_eq!(
            east.attributes().value_by_name("saw_planned"),
            Some(&AttributeValue::Int(5))
        );
    }

    #[test]
    fn test_run_terminates_when_all_done() {
        struct DoneAfter {
            rounds: u64,
        }
        impl ParticleProgram for DoneAfter {
            fn on_move_phase(&mut self, _p: &mut ParticleContext<'_>) -> Result<(), CoreError> {
                self.rounds = self.rounds.saturating_sub(1);
                Ok(())
            }
            fn is_done(&self) -> bool {
                self.rounds == 0
            }
        }

        let mut system = AmoebotSystem::with_defaults();
        for i in 0..3 {
            system
                .add_particle(
                    GridPos::new(i, 0),
                    Compass::identity(),
                    Box::new(DoneAfter { rounds: (i + 1) as u64 }),
                )
                .unwrap();
        }

        let outcome = system.run(Some(100)).unwrap();
        assert_eq!(outcome, RunOutcome::Terminated { rounds: 3 });
    }

    #[test]
    fn test_run_reports_budget_exhaustion() {
        let (mut system, _) = line_system(2);
        let outcome = system.run(Some(5)).unwrap();
        assert_eq!(outcome, RunOutcome::BudgetExhausted { rounds: 5 });
        assert_eq!(system.rounds_completed(), 5);
    }

    #[test]
    fn test_ownership_violation_fails_round() {
        use crate::attributes::{AttrHandle, AttributeError};
        use std::cell::RefCell;
        use std::rc::Rc;

        type Shared = Rc<RefCell<Option<AttrHandle<u64>>>>;

        /// Declares a cell and leaks its handle to the thief.
        struct Owner {
            shared: Shared,
        }
        impl ParticleProgram for Owner {
            fn on_init(&mut self, p: &mut ParticleContext<'_>) -> Result<(), CoreError> {
                *self.shared.borrow_mut() = Some(p.declare_attr("x", 0u64)?);
                Ok(())
            }
        }

        /// Writes through a handle it does not own.
        struct Thief {
            shared: Shared,
        }
        impl ParticleProgram for Thief {
            fn on_move_phase(&mut self, p: &mut ParticleContext<'_>) -> Result<(), CoreError> {
                let handle = self.shared.borrow().as_ref().copied().expect("owner ran first");
                p.write(&handle, 99)?;
                Ok(())
            }
        }

        let shared: Shared = Rc::new(RefCell::new(None));
        let mut system = AmoebotSystem::with_defaults();
        let owner = system
            .add_particle(
                GridPos::ORIGIN,
                Compass::identity(),
                Box::new(Owner { shared: shared.clone() }),
            )
            .unwrap();
        let thief = system
            .add_particle(
                GridPos::new(1, 0),
                Compass::identity(),
                Box::new(Thief { shared }),
            )
            .unwrap();

        let err = system.run_round().unwrap_err();
        assert_eq!(err.particle, Some(thief));
        assert!(matches!(
            err.source,
            CoreError::Attribute(AttributeError::NotOwner { .. })
        ));

        // Rejected before any mutation: the owner's cell is untouched.
        let p = system.particle(owner).unwrap();
        assert_eq!(
            p.attributes().value_by_name("x"),
            Some(&AttributeValue::Uint(0))
        );
    }
}
