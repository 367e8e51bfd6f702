//! Read-only per-round snapshots.
//!
//! Rendering and persistence collaborators never touch live system state;
//! they consume these serializable views of geometry and committed
//! attribute values, captured once per round.

use crate::attributes::AttributeValue;
use crate::grid::GridPos;
use crate::particle::ParticleId;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One particle's committed state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticleSnapshot {
    /// Stable identity.
    pub id: ParticleId,

    /// Head cell.
    pub head: GridPos,

    /// Tail cell, present only while expanded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tail: Option<GridPos>,

    /// Committed attribute values by name.
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl ParticleSnapshot {
    /// True if the particle spanned two cells when captured.
    pub fn is_expanded(&self) -> bool {
        self.tail.is_some()
    }
}

/// A static object's position.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ObjectSnapshot {
    pub id: u64,
    pub cell: GridPos,
}

/// The whole system as of one committed round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSnapshot {
    /// Rounds committed when the snapshot was taken.
    pub round: u64,

    /// Particles in creation order.
    pub particles: Vec<ParticleSnapshot>,

    /// Static objects by id.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub objects: Vec<ObjectSnapshot>,
}

impl SystemSnapshot {
    /// Every occupied cell across particles and objects.
    pub fn occupied_cells(&self) -> Vec<GridPos> {
        let mut cells = Vec::new();
        for p in &self.particles {
            cells.push(p.head);
            if let Some(tail) = p.tail {
                cells.push(tail);
            }
        }
        cells.extend(self.objects.iter().map(|o| o.cell));
        cells
    }
}
