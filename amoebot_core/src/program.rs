//! The agent-program contract and the per-activation capability handle.
//!
//! An algorithm is a value implementing [`ParticleProgram`], constructed
//! once per particle. The scheduler activates it once per phase per round,
//! passing a [`ParticleContext`] scoped to that particle: geometry queries
//! over committed state, declarative bond/movement requests, attribute
//! access, and the partition-set/beep surface. All directions taken and
//! returned by the context are in the particle's own compass frame.

use crate::attributes::{AttrHandle, AttrValue, AttributeError, AttributeValue};
use crate::error::CoreError;
use crate::grid::{Direction, GridPos};
use crate::movement::{MoveRequest, MovementError};
use crate::particle::{BondMark, EdgeRef, Particle, ParticleId, Side};
use crate::pins::{PartitionSetId, PinConfiguration};
use crate::scheduler::{AmoebotSystem, Occupant, Phase};

/// Behavior of one particle, invoked by the round scheduler.
///
/// `on_init` runs once when the particle joins the system (the place to
/// declare attribute cells); the two phase hooks run once per round each.
/// Every hook defaults to a no-op so programs implement only what they use.
pub trait ParticleProgram {
    /// Construction-time hook; declare attributes here.
    fn on_init(&mut self, p: &mut ParticleContext<'_>) -> Result<(), CoreError> {
        let _ = p;
        Ok(())
    }

    /// Movement phase: issue at most one geometric request.
    fn on_move_phase(&mut self, p: &mut ParticleContext<'_>) -> Result<(), CoreError> {
        let _ = p;
        Ok(())
    }

    /// Communication phase: read last round's beeps, declare a pin
    /// grouping, mark sends.
    fn on_beep_phase(&mut self, p: &mut ParticleContext<'_>) -> Result<(), CoreError> {
        let _ = p;
        Ok(())
    }

    /// Terminal status; the run loop halts once every program reports true.
    fn is_done(&self) -> bool {
        false
    }
}

/// Capability handle for one activation of one particle.
pub struct ParticleContext<'a> {
    system: &'a mut AmoebotSystem,
    id: ParticleId,
    phase: Phase,
}

impl<'a> ParticleContext<'a> {
    pub(crate) fn new(system: &'a mut AmoebotSystem, id: ParticleId, phase: Phase) -> Self {
        Self { system, id, phase }
    }

    /// The activating particle's identity.
    pub fn id(&self) -> ParticleId {
        self.id
    }

    /// The phase this activation runs in.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Rounds committed so far.
    pub fn round(&self) -> u64 {
        self.system.rounds_completed()
    }

    fn me(&self) -> &Particle {
        &self.system.particles[&self.id]
    }

    fn me_mut(&mut self) -> &mut Particle {
        self.system
            .particles
            .get_mut(&self.id)
            .expect("context particle exists")
    }

    fn require_phase(&self, expected: Phase, op: &'static str) -> Result<(), CoreError> {
        if self.phase != expected {
            return Err(CoreError::WrongPhase { op, phase: self.phase });
        }
        Ok(())
    }

    // ========================================================================
    // GEOMETRY QUERIES (committed state)
    // ========================================================================

    /// True if this particle currently spans two cells.
    pub fn is_expanded(&self) -> bool {
        self.me().is_expanded()
    }

    /// The head cell (grid frame).
    pub fn head(&self) -> GridPos {
        self.me().body.head()
    }

    /// The tail cell (grid frame; equals the head when contracted).
    pub fn tail(&self) -> GridPos {
        self.me().body.tail()
    }

    /// Local direction from head to tail, if expanded.
    pub fn tail_direction(&self) -> Option<Direction> {
        let me = self.me();
        me.body.tail_direction().map(|d| me.compass.to_local(d))
    }

    /// True if a particle occupies the cell across the head-side edge in
    /// the given local direction.
    pub fn has_neighbor(&self, dir: Direction) -> bool {
        self.neighbor_at(dir).is_some()
    }

    /// Like [`has_neighbor`](Self::has_neighbor) for an explicit side.
    pub fn has_neighbor_on(&self, side: Side, dir: Direction) -> bool {
        self.neighbor_at_on(side, dir).is_some()
    }

    /// The particle across the head-side edge in the given local direction.
    pub fn neighbor_at(&self, dir: Direction) -> Option<ParticleId> {
        self.neighbor_at_on(Side::Head, dir)
    }

    /// The particle across an explicit edge of this particle's body.
    pub fn neighbor_at_on(&self, side: Side, dir: Direction) -> Option<ParticleId> {
        let me = self.me();
        let cell = me.body.cell_on(side).neighbor(me.compass.to_global(dir));
        match self.system.occupancy.get(&cell) {
            Some(Occupant::Particle(other)) if *other != self.id => Some(*other),
            _ => None,
        }
    }

    /// Whether the neighbor in the given local direction is expanded.
    pub fn neighbor_is_expanded(&self, dir: Direction) -> Option<bool> {
        self.neighbor_is_expanded_on(Side::Head, dir)
    }

    /// Like [`neighbor_is_expanded`](Self::neighbor_is_expanded) for an
    /// explicit side.
    pub fn neighbor_is_expanded_on(&self, side: Side, dir: Direction) -> Option<bool> {
        let other = self.neighbor_at_on(side, dir)?;
        Some(self.system.particles[&other].is_expanded())
    }

    /// True if the cell across the given head-side edge holds a static
    /// object.
    pub fn object_at(&self, dir: Direction) -> bool {
        let me = self.me();
        let cell = me.body.head().neighbor(me.compass.to_global(dir));
        matches!(self.system.occupancy.get(&cell), Some(Occupant::Object(_)))
    }

    // ========================================================================
    // BONDS & MOVEMENT (declarative, movement phase)
    // ========================================================================

    fn edge(&self, side: Side, dir: Direction) -> Result<EdgeRef, CoreError> {
        let me = self.me();
        let edge = EdgeRef::new(side, me.compass.to_global(dir));
        if !me.has_edge(edge) {
            return Err(MovementError::InvalidEdge {
                particle: self.id,
                edge,
            }
            .into());
        }
        Ok(edge)
    }

    /// The stored mark on one of this particle's edges.
    pub fn bond_mark_on(&self, side: Side, dir: Direction) -> Result<BondMark, CoreError> {
        let edge = self.edge(side, dir)?;
        Ok(self.me().bond_mark(edge))
    }

    /// Marks the head-side bond in the given local direction for joint
    /// movement.
    pub fn mark_bond(&mut self, dir: Direction) -> Result<(), CoreError> {
        self.mark_bond_on(Side::Head, dir)
    }

    /// Marks a bond on an explicit side of an expanded particle.
    pub fn mark_bond_on(&mut self, side: Side, dir: Direction) -> Result<(), CoreError> {
        self.require_phase(Phase::Movement, "mark_bond")?;
        let edge = self.edge(side, dir)?;
        self.me_mut().set_bond_mark(edge, BondMark::Marked);
        Ok(())
    }

    /// Releases a bond, removing it from movement coupling and circuit
    /// connectivity. `tail_side` selects which occupied cell the release
    /// applies to (expanded particles must specify).
    pub fn release_bond(&mut self, dir: Direction, tail_side: bool) -> Result<(), CoreError> {
        self.require_phase(Phase::Movement, "release_bond")?;
        let side = if tail_side { Side::Tail } else { Side::Head };
        let edge = self.edge(side, dir)?;
        self.me_mut().set_bond_mark(edge, BondMark::Released);
        Ok(())
    }

    /// Restores a previously marked or released bond to the default state.
    pub fn reset_bond(&mut self, dir: Direction, tail_side: bool) -> Result<(), CoreError> {
        self.require_phase(Phase::Movement, "reset_bond")?;
        let side = if tail_side { Side::Tail } else { Side::Head };
        let edge = self.edge(side, dir)?;
        self.me_mut().set_bond_mark(edge, BondMark::Bonded);
        Ok(())
    }

    fn record_move(&mut self, request: MoveRequest) -> Result<(), CoreError> {
        if self.me().pending_move.is_some() {
            return Err(MovementError::RequestAlreadyIssued { particle: self.id }.into());
        }
        self.me_mut().pending_move = Some(request);
        Ok(())
    }

    /// Requests expansion one cell in the given local direction.
    pub fn expand(&mut self, dir: Direction) -> Result<(), CoreError> {
        self.require_phase(Phase::Movement, "expand")?;
        if self.is_expanded() {
            return Err(MovementError::NotContracted { particle: self.id }.into());
        }
        let global = self.me().compass.to_global(dir);
        self.record_move(MoveRequest::Expand { dir: global })
    }

    /// Requests contraction that vacates the head cell.
    pub fn contract_head(&mut self) -> Result<(), CoreError> {
        self.require_phase(Phase::Movement, "contract_head")?;
        if !self.is_expanded() {
            return Err(MovementError::NotExpanded { particle: self.id }.into());
        }
        self.record_move(MoveRequest::ContractHead)
    }

    /// Requests contraction that vacates the tail cell.
    pub fn contract_tail(&mut self) -> Result<(), CoreError> {
        self.require_phase(Phase::Movement, "contract_tail")?;
        if !self.is_expanded() {
            return Err(MovementError::NotExpanded { particle: self.id }.into());
        }
        self.record_move(MoveRequest::ContractTail)
    }

    // ========================================================================
    // ATTRIBUTES
    // ========================================================================

    /// Declares (or resolves) a named attribute cell on this particle.
    pub fn declare_attr<T: AttrValue>(
        &mut self,
        name: &str,
        initial: T,
    ) -> Result<AttrHandle<T>, CoreError> {
        Ok(self.me_mut().attrs.declare(name, initial)?)
    }

    /// Committed value of an attribute cell (any owner).
    pub fn read<T: AttrValue>(&self, handle: &AttrHandle<T>) -> Result<T, CoreError> {
        let owner = self
            .system
            .particles
            .get(&handle.owner())
            .ok_or(CoreError::UnknownParticle(handle.owner()))?;
        Ok(owner.attrs.read_current(handle)?)
    }

    /// In-flight value of an attribute cell this particle owns.
    pub fn read_planned<T: AttrValue>(&self, handle: &AttrHandle<T>) -> Result<T, CoreError> {
        let owner = self
            .system
            .particles
            .get(&handle.owner())
            .ok_or(CoreError::UnknownParticle(handle.owner()))?;
        Ok(owner.attrs.read_planned(handle)?)
    }

    /// Writes the planned value of an attribute cell. Only the owning
    /// particle may write; anything else is an ownership violation.
    pub fn write<T: AttrValue>(&mut self, handle: &AttrHandle<T>, value: T) -> Result<(), CoreError> {
        if handle.owner() != self.id {
            return Err(AttributeError::NotOwner {
                writer: self.id,
                owner: handle.owner(),
            }
            .into());
        }
        Ok(self.me_mut().attrs.write_planned(handle, value)?)
    }

    /// Committed attribute of the neighbor across the given head-side edge,
    /// looked up by name (read-only snapshot).
    pub fn neighbor_attr(&self, dir: Direction, name: &str) -> Option<AttributeValue> {
        let other = self.neighbor_at(dir)?;
        self.system.particles[&other].attrs.value_by_name(name).cloned()
    }

    /// Planned-or-committed attribute of a neighbor. This deliberately
    /// breaks the synchrony guarantee; prefer [`neighbor_attr`](Self::neighbor_attr).
    pub fn neighbor_attr_planned(&self, dir: Direction, name: &str) -> Option<AttributeValue> {
        let other = self.neighbor_at(dir)?;
        self.system.particles[&other]
            .attrs
            .planned_by_name(name)
            .cloned()
    }

    // ========================================================================
    // PARTITION SETS & BEEPS (communication phase)
    // ========================================================================

    /// A fresh all-singleton pin configuration for the current body.
    pub fn pin_config(&self) -> PinConfiguration {
        let me = self.me();
        let tail_dir_local = me.body.tail_direction().map(|d| me.compass.to_local(d));
        PinConfiguration::new(self.system.pin_count(), me.body, tail_dir_local)
    }

    /// Declares this round's pin grouping, replacing any earlier
    /// declaration this phase.
    pub fn declare_config(&mut self, config: PinConfiguration) -> Result<(), CoreError> {
        self.require_phase(Phase::Communication, "declare_config")?;
        self.me_mut().pending_config = Some(config);
        Ok(())
    }

    /// Whether the partition set declared under this id in the *previous*
    /// round's configuration received a beep.
    pub fn received_beep(&self, set: PartitionSetId) -> bool {
        self.me().prev_beeps.get(set.0).copied().unwrap_or(false)
    }
}
