//! Amoebot Core - Synchronous Round Engine for Programmable Matter
//!
//! This library simulates the amoebot model: simple particles on the
//! triangular grid that communicate through reconfigurable circuits
//! ("beeps") and reshape the system through coordinated expansions and
//! contractions. It solves three coordination problems every round:
//! 1. **Shared medium**: which bonded particles are wired into one circuit
//!    this round, given every particle's pin grouping
//! 2. **Joint movement**: whether a batch of expansion/contraction requests
//!    is realizable without breaking grid or bond consistency
//! 3. **Synchrony**: state written this round becomes visible only at the
//!    next round boundary, for every particle at once

pub mod attributes;
pub mod circuit;
pub mod error;
pub mod grid;
pub mod movement;
pub mod particle;
pub mod pins;
pub mod program;
pub mod scheduler;
pub mod snapshot;

// Re-export key types for convenience
pub use attributes::{AttrHandle, AttrKind, AttrValue, AttributeError, AttributeValue};
pub use error::{CoreError, RoundError};
pub use grid::{Compass, Direction, GridPos, DIRECTION_COUNT};
pub use movement::{MoveRequest, MovementError};
pub use particle::{Body, BondMark, EdgeRef, Particle, ParticleId, Side};
pub use pins::{PartitionSetId, Pin, PinConfiguration, PinError};
pub use program::{ParticleContext, ParticleProgram};
pub use scheduler::{
    AmoebotSystem, Occupant, Phase, RoundReport, RunOutcome, SystemConfig,
};
pub use snapshot::{ObjectSnapshot, ParticleSnapshot, SystemSnapshot};
