//! Error taxonomy for the round engine.
//!
//! Per-concern errors (`AttributeError`, `PinError`, `MovementError`) unify
//! under [`CoreError`]; the scheduler wraps failures in a [`RoundError`]
//! carrying round number, phase, and the offending particle so a failing
//! run can be reproduced.

use crate::attributes::AttributeError;
use crate::grid::GridPos;
use crate::movement::MovementError;
use crate::particle::ParticleId;
use crate::pins::PinError;
use crate::scheduler::Phase;

use thiserror::Error;

/// Any error the engine can raise.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Attribute(#[from] AttributeError),

    #[error(transparent)]
    Pin(#[from] PinError),

    #[error(transparent)]
    Movement(#[from] MovementError),

    /// Particle or object placed on an occupied cell.
    #[error("cell {0} is already occupied")]
    CellOccupied(GridPos),

    /// Lookup of a particle the system does not contain.
    #[error("unknown particle {0}")]
    UnknownParticle(ParticleId),

    /// An operation issued outside its phase (e.g. a movement request
    /// during the communication phase).
    #[error("{op} is not allowed during the {phase} phase")]
    WrongPhase { op: &'static str, phase: Phase },
}

/// A round-level failure with enough identity to reproduce it.
#[derive(Debug)]
pub struct RoundError {
    /// The round that was rejected (1-based).
    pub round: u64,

    /// The phase the failure surfaced in.
    pub phase: Phase,

    /// The offending particle, when attributable.
    pub particle: Option<ParticleId>,

    /// The underlying error.
    pub source: CoreError,
}

impl std::fmt::Display for RoundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "round {}, {} phase", self.round, self.phase)?;
        if let Some(particle) = self.particle {
            write!(f, ", particle {}", particle)?;
        }
        write!(f, ": {}", self.source)
    }
}

impl std::error::Error for RoundError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}
