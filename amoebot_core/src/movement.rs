//! Joint-movement validation and application.
//!
//! Programs record at most one geometric request per round; the scheduler
//! hands the full batch to [`resolve`], which checks joint feasibility and
//! produces the new geometry. Either every request applies or none does:
//! a single conflict rejects the round's movement commit with a reason
//! naming the offending particle.
//!
//! Feasibility, for the batch as a whole:
//! 1. every bond marked by a moving particle is marked by both endpoints;
//! 2. an expansion target is empty, or vacated this same round by a
//!    neighbor the expander holds a marked bond to (push/pull handover);
//! 3. no two particles claim the same final cell;
//! 4. a contraction keeps exactly the specified end, and the vacated
//!    cell's bond marks transfer to the remaining cell where the neighbor
//!    is still adjacent.

use crate::grid::{Direction, GridPos};
use crate::particle::{Body, BondMark, EdgeRef, Particle, ParticleId, Side};
use crate::scheduler::Occupant;

use std::collections::HashMap;
use thiserror::Error;
use tracing::trace;

/// A declarative geometric request, recorded during the movement phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveRequest {
    /// Expand the contracted body one cell in the given global direction.
    Expand { dir: Direction },

    /// Contract by vacating the head cell; the particle survives at its tail.
    ContractHead,

    /// Contract by vacating the tail cell; the particle survives at its head.
    ContractTail,
}

/// The validated outcome of a movement phase.
#[derive(Debug, Default)]
pub(crate) struct MovePlan {
    /// New bodies for every particle that moves, in activation order.
    pub new_bodies: Vec<(ParticleId, Body)>,
}

impl MovePlan {
    pub fn moved(&self) -> usize {
        self.new_bodies.len()
    }
}

/// Validates the round's request batch against the committed geometry.
pub(crate) fn resolve(
    particles: &HashMap<ParticleId, Particle>,
    order: &[ParticleId],
    occupancy: &HashMap<GridPos, Occupant>,
) -> Result<MovePlan, MovementError> {
    // Rule 1: a moving particle's marked bonds must be marked back.
    for &id in order {
        let particle = &particles[&id];
        if particle.pending_move.is_none() {
            continue;
        }
        for (edge, facing) in particle.edges() {
            if particle.bond_mark(edge) != BondMark::Marked {
                continue;
            }
            let neighbor = match occupancy.get(&facing) {
                Some(Occupant::Particle(other)) if *other != id => &particles[other],
                _ => {
                    return Err(MovementError::MarkedNonNeighbor { particle: id, edge });
                }
            };
            let facing_side = neighbor
                .body
                .side_at(facing)
                .expect("occupancy names an occupied cell");
            let neighbor_edge = EdgeRef::new(facing_side, edge.dir.opposite());
            if neighbor.bond_mark(neighbor_edge) != BondMark::Marked {
                return Err(MovementError::BondMarkMismatch {
                    particle: id,
                    neighbor: neighbor.id,
                    edge,
                });
            }
        }
    }

    // Cells vacated this round by contractions.
    let mut vacated: HashMap<GridPos, ParticleId> = HashMap::new();
    for &id in order {
        let particle = &particles[&id];
        match particle.pending_move {
            Some(MoveRequest::ContractHead) => {
                vacated.insert(particle.body.head(), id);
            }
            Some(MoveRequest::ContractTail) => {
                vacated.insert(particle.body.tail(), id);
            }
            _ => {}
        }
    }

    // Rules 2 and 3: expansion targets.
    let mut claims: HashMap<GridPos, ParticleId> = HashMap::new();
    let mut plan = MovePlan::default();
    for &id in order {
        let particle = &particles[&id];
        let Some(request) = particle.pending_move else {
            continue;
        };
        let new_body = match request {
            MoveRequest::Expand { dir } => {
                debug_assert!(!particle.is_expanded(), "expand checked at request time");
                let cell = particle.body.head();
                let target = cell.neighbor(dir);

                if let Some(first) = claims.insert(target, id) {
                    return Err(MovementError::CollidingClaims {
                        first,
                        second: id,
                        cell: target,
                    });
                }

                match occupancy.get(&target) {
                    None => {}
                    Some(Occupant::Object(_)) => {
                        return Err(MovementError::TargetOccupied { particle: id, cell: target });
                    }
                    Some(Occupant::Particle(other)) => {
                        if vacated.get(&target) != Some(other) {
                            return Err(MovementError::TargetOccupied {
                                particle: id,
                                cell: target,
                            });
                        }
                        // Handover: the vacating neighbor must be held by a
                        // marked bond across the entry edge. Rule 1 already
                        // guaranteed the neighbor marks it back.
                        let entry_edge = EdgeRef::new(Side::Head, dir);
                        if particle.bond_mark(entry_edge) != BondMark::Marked {
                            return Err(MovementError::UnmarkedHandover {
                                particle: id,
                                neighbor: *other,
                                cell: target,
                            });
                        }
                    }
                }
                Body::expanded(target, cell)
            }
            MoveRequest::ContractHead => {
                debug_assert!(particle.is_expanded(), "contract checked at request time");
                Body::contracted(particle.body.tail())
            }
            MoveRequest::ContractTail => {
                debug_assert!(particle.is_expanded(), "contract checked at request time");
                Body::contracted(particle.body.head())
            }
        };
        trace!(particle = %id, ?request, "movement request validated");
        plan.new_bodies.push((id, new_body));
    }

    // An expansion may not claim a cell a contracting particle keeps; those
    // cells never enter `vacated`, so the occupancy check above covers them.
    Ok(plan)
}

/// Re-keys a particle's bond marks after its body changed.
///
/// Expansion: the old cell becomes the tail; its marks keep their direction
/// and move to the tail side, except across the now-internal edge.
/// Contraction: marks on the surviving cell persist; marks on the vacated
/// cell transfer toward the same neighbor cell when it is still adjacent to
/// the survivor, and are dropped otherwise.
pub(crate) fn migrate_marks(
    bonds: &HashMap<EdgeRef, BondMark>,
    old: Body,
    new: Body,
) -> HashMap<EdgeRef, BondMark> {
    let mut out = HashMap::new();
    match (old, new) {
        (Body::Contracted { cell }, Body::Expanded { head, .. }) => {
            let internal = cell
                .direction_to(head)
                .expect("expansion target is adjacent");
            for (edge, &mark) in bonds {
                debug_assert_eq!(edge.side, Side::Head);
                if edge.dir == internal {
                    continue;
                }
                out.insert(EdgeRef::new(Side::Tail, edge.dir), mark);
            }
        }
        (Body::Expanded { .. }, Body::Contracted { cell }) => {
            let survivor_side = old.side_at(cell).expect("contraction keeps an old cell");
            let vacated_cell = match survivor_side {
                Side::Head => old.tail(),
                Side::Tail => old.head(),
            };
            for (edge, &mark) in bonds {
                if edge.side == survivor_side {
                    out.insert(EdgeRef::new(Side::Head, edge.dir), mark);
                }
            }
            for (edge, &mark) in bonds {
                if edge.side == survivor_side {
                    continue;
                }
                let neighbor_cell = vacated_cell.neighbor(edge.dir);
                if let Some(dir) = cell.direction_to(neighbor_cell) {
                    out.entry(EdgeRef::new(Side::Head, dir)).or_insert(mark);
                }
            }
        }
        _ => {
            out.extend(bonds.iter().map(|(e, m)| (*e, *m)));
        }
    }
    out
}

// ============================================================================
// ERRORS
// ============================================================================

/// A movement conflict; rejects the round's movement commit.
#[derive(Debug, Clone, Error)]
pub enum MovementError {
    /// Expansion requested by an already-expanded particle.
    #[error("particle {particle} is expanded and cannot expand again")]
    NotContracted { particle: ParticleId },

    /// Contraction requested by a contracted particle.
    #[error("particle {particle} is contracted and cannot contract")]
    NotExpanded { particle: ParticleId },

    /// More than one geometric request in a single round.
    #[error("particle {particle} already issued a movement request this round")]
    RequestAlreadyIssued { particle: ParticleId },

    /// Bond operation addressed an edge the body does not have.
    #[error("particle {particle} has no edge {edge}")]
    InvalidEdge { particle: ParticleId, edge: EdgeRef },

    /// A moving particle marked a bond on an edge with no particle behind it.
    #[error("particle {particle} marked bond {edge} toward an unoccupied cell")]
    MarkedNonNeighbor { particle: ParticleId, edge: EdgeRef },

    /// A moving particle's marked bond is not marked by the other endpoint.
    #[error("bond {edge} of particle {particle} is not marked back by {neighbor}")]
    BondMarkMismatch {
        particle: ParticleId,
        neighbor: ParticleId,
        edge: EdgeRef,
    },

    /// Expansion into a cell that is neither empty nor vacated this round.
    #[error("particle {particle} cannot expand into occupied cell {cell}")]
    TargetOccupied { particle: ParticleId, cell: GridPos },

    /// Expansion into a vacated cell without a marked bond to the vacating
    /// neighbor.
    #[error("particle {particle} entered {cell} vacated by {neighbor} without a marked bond")]
    UnmarkedHandover {
        particle: ParticleId,
        neighbor: ParticleId,
        cell: GridPos,
    },

    /// Two particles claim the same final cell.
    #[error("particles {first} and {second} both claim cell {cell}")]
    CollidingClaims {
        first: ParticleId,
        second: ParticleId,
        cell: GridPos,
    },
}

impl MovementError {
    /// The particle the conflict is attributed to.
    pub fn particle(&self) -> ParticleId {
        match self {
            MovementError::NotContracted { particle }
            | MovementError::NotExpanded { particle }
            | MovementError::RequestAlreadyIssued { particle }
            | MovementError::InvalidEdge { particle, .. }
            | MovementError::MarkedNonNeighbor { particle, .. }
            | MovementError::BondMarkMismatch { particle, .. }
            | MovementError::TargetOccupied { particle, .. }
            | MovementError::UnmarkedHandover { particle, .. } => *particle,
            MovementError::CollidingClaims { second, .. } => *second,
        }
    }
}
