//! Particle identity, body geometry, and the bond relation.

use crate::attributes::AttributeStore;
use crate::grid::{Compass, Direction, GridPos};
use crate::movement::MoveRequest;
use crate::pins::PinConfiguration;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Unique identifier for a particle.
///
/// Uses UUID v4 for global uniqueness without coordination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticleId(pub Uuid);

impl ParticleId {
    /// Creates a new random ParticleId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a ParticleId from a UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Creates a deterministic ParticleId from a seed (for simulation).
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ParticleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ParticleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Which of a particle's occupied cells an edge or pin belongs to.
///
/// Contracted particles only have a head; for them `Head` addresses the
/// single occupied cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Side {
    Head,
    Tail,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Head => write!(f, "H"),
            Side::Tail => write!(f, "T"),
        }
    }
}

/// The grid cells a particle occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Body {
    /// One cell.
    Contracted { cell: GridPos },

    /// Two adjacent cells joined by the implicit internal bond.
    Expanded { head: GridPos, tail: GridPos },
}

impl Body {
    /// A contracted body at the given cell.
    pub fn contracted(cell: GridPos) -> Self {
        Body::Contracted { cell }
    }

    /// An expanded body; head and tail must be adjacent.
    pub fn expanded(head: GridPos, tail: GridPos) -> Self {
        debug_assert!(head.is_adjacent_to(tail));
        Body::Expanded { head, tail }
    }

    /// True if the body spans two cells.
    pub fn is_expanded(self) -> bool {
        matches!(self, Body::Expanded { .. })
    }

    /// The head cell (for a contracted body, the single cell).
    pub fn head(self) -> GridPos {
        match self {
            Body::Contracted { cell } => cell,
            Body::Expanded { head, .. } => head,
        }
    }

    /// The tail cell (for a contracted body, the single cell).
    pub fn tail(self) -> GridPos {
        match self {
            Body::Contracted { cell } => cell,
            Body::Expanded { tail, .. } => tail,
        }
    }

    /// The cell addressed by the given side.
    pub fn cell_on(self, side: Side) -> GridPos {
        match side {
            Side::Head => self.head(),
            Side::Tail => self.tail(),
        }
    }

    /// Global direction from head to tail, if expanded.
    pub fn tail_direction(self) -> Option<Direction> {
        match self {
            Body::Contracted { .. } => None,
            Body::Expanded { head, tail } => head.direction_to(tail),
        }
    }

    /// Iterates over the occupied cells (head first).
    pub fn cells(self) -> impl Iterator<Item = GridPos> {
        let tail = match self {
            Body::Contracted { .. } => None,
            Body::Expanded { tail, .. } => Some(tail),
        };
        std::iter::once(self.head()).chain(tail)
    }

    /// True if the body occupies the given cell.
    pub fn occupies(self, cell: GridPos) -> bool {
        self.cells().any(|c| c == cell)
    }

    /// The side whose cell equals `cell`, if any.
    pub fn side_at(self, cell: GridPos) -> Option<Side> {
        if self.head() == cell {
            Some(Side::Head)
        } else if self.is_expanded() && self.tail() == cell {
            Some(Side::Tail)
        } else {
            None
        }
    }

    /// True if `edge` is a boundary edge of this body (the internal edge
    /// pair of an expanded body is excluded).
    pub fn has_edge(self, edge: EdgeRef) -> bool {
        match self {
            Body::Contracted { .. } => edge.side == Side::Head,
            Body::Expanded { .. } => {
                let internal = self
                    .tail_direction()
                    .expect("expanded body has a tail direction");
                match edge.side {
                    Side::Head => edge.dir != internal,
                    Side::Tail => edge.dir != internal.opposite(),
                }
            }
        }
    }

    /// All boundary edges with the cell each borders.
    pub fn edges(self) -> Vec<(EdgeRef, GridPos)> {
        let mut out = Vec::with_capacity(10);
        let sides: &[Side] = if self.is_expanded() {
            &[Side::Head, Side::Tail]
        } else {
            &[Side::Head]
        };
        for &side in sides {
            let cell = self.cell_on(side);
            for dir in Direction::ALL {
                let edge = EdgeRef::new(side, dir);
                if self.has_edge(edge) {
                    out.push((edge, cell.neighbor(dir)));
                }
            }
        }
        out
    }
}

/// State of one side of a bond, as held by one endpoint.
///
/// Adjacent particles are bonded by default. `Marked` opts the bond into
/// joint movement; `Released` removes it from both movement coupling and
/// circuit connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BondMark {
    #[default]
    Bonded,
    Marked,
    Released,
}

/// Addresses one boundary edge of a particle: occupied cell plus the
/// global direction the edge faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeRef {
    pub side: Side,
    pub dir: Direction,
}

impl EdgeRef {
    pub fn new(side: Side, dir: Direction) -> Self {
        Self { side, dir }
    }
}

impl std::fmt::Display for EdgeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.side, self.dir)
    }
}

/// A particle of the system: identity, orientation, geometry, bond marks,
/// attribute store, and the per-round communication scratch state.
#[derive(Debug)]
pub struct Particle {
    /// Stable identity.
    pub id: ParticleId,

    /// Orientation, fixed at creation.
    pub compass: Compass,

    /// Occupied cell(s).
    pub body: Body,

    /// Non-default bond marks, keyed by boundary edge. Absent edges are
    /// `BondMark::Bonded`.
    pub(crate) bonds: HashMap<EdgeRef, BondMark>,

    /// Versioned attribute cells owned by this particle.
    pub(crate) attrs: AttributeStore,

    /// Received flags of the previous round's partition sets, by
    /// declaration index.
    pub(crate) prev_beeps: Vec<bool>,

    /// Geometric request recorded this round, if any.
    pub(crate) pending_move: Option<MoveRequest>,

    /// Pin grouping declared this communication phase, if any.
    pub(crate) pending_config: Option<PinConfiguration>,
}

impl Particle {
    pub(crate) fn new(id: ParticleId, cell: GridPos, compass: Compass) -> Self {
        Self {
            id,
            compass,
            body: Body::contracted(cell),
            bonds: HashMap::new(),
            attrs: AttributeStore::new(id),
            prev_beeps: Vec::new(),
            pending_move: None,
            pending_config: None,
        }
    }

    /// True if the particle currently spans two cells.
    pub fn is_expanded(&self) -> bool {
        self.body.is_expanded()
    }

    /// The stored mark for a boundary edge (default `Bonded`).
    pub fn bond_mark(&self, edge: EdgeRef) -> BondMark {
        self.bonds.get(&edge).copied().unwrap_or_default()
    }

    pub(crate) fn set_bond_mark(&mut self, edge: EdgeRef, mark: BondMark) {
        if mark == BondMark::default() {
            self.bonds.remove(&edge);
        } else {
            self.bonds.insert(edge, mark);
        }
    }

    /// True if `edge` is a boundary edge of the current body.
    pub fn has_edge(&self, edge: EdgeRef) -> bool {
        self.body.has_edge(edge)
    }

    /// All boundary edges of the current body with the cell each borders.
    pub fn edges(&self) -> Vec<(EdgeRef, GridPos)> {
        self.body.edges()
    }

    /// Access to the particle's attribute store.
    pub fn attributes(&self) -> &AttributeStore {
        &self.attrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_particle_id_from_seed_is_deterministic() {
        assert_eq!(ParticleId::from_seed(7), ParticleId::from_seed(7));
        assert_ne!(ParticleId::from_seed(7), ParticleId::from_seed(8));
    }

    #[test]
    fn test_contracted_body() {
        let body = Body::contracted(GridPos::new(2, -1));
        assert!(!body.is_expanded());
        assert_eq!(body.head(), body.tail());
        assert_eq!(body.cells().count(), 1);
        assert_eq!(body.tail_direction(), None);
    }

    #[test]
    fn test_expanded_body() {
        let head = GridPos::new(1, 0);
        let tail = GridPos::ORIGIN;
        let body = Body::expanded(head, tail);
        assert!(body.is_expanded());
        assert_eq!(body.tail_direction(), Some(Direction::West));
        assert_eq!(body.side_at(head), Some(Side::Head));
        assert_eq!(body.side_at(tail), Some(Side::Tail));
        assert_eq!(body.side_at(GridPos::new(5, 5)), None);
    }

    #[test]
    fn test_contracted_edges() {
        let p = Particle::new(ParticleId::from_seed(0), GridPos::ORIGIN, Compass::identity());
        let edges = p.edges();
        assert_eq!(edges.len(), 6);
        for (edge, _) in &edges {
            assert_eq!(edge.side, Side::Head);
        }
    }

    #[test]
    fn test_expanded_edges_skip_internal_pair() {
        let mut p = Particle::new(ParticleId::from_seed(0), GridPos::ORIGIN, Compass::identity());
        p.body = Body::expanded(GridPos::new(1, 0), GridPos::ORIGIN);
        let edges = p.edges();
        assert_eq!(edges.len(), 10);
        // Head faces West toward the tail; that edge is internal.
        assert!(!p.has_edge(EdgeRef::new(Side::Head, Direction::West)));
        assert!(!p.has_edge(EdgeRef::new(Side::Tail, Direction::East)));
    }

    #[test]
    fn test_bond_marks_default_to_bonded() {
        let mut p = Particle::new(ParticleId::from_seed(0), GridPos::ORIGIN, Compass::identity());
        let edge = EdgeRef::new(Side::Head, Direction::East);
        assert_eq!(p.bond_mark(edge), BondMark::Bonded);

        p.set_bond_mark(edge, BondMark::Marked);
        assert_eq!(p.bond_mark(edge), BondMark::Marked);

        // Resetting to the default removes the entry
        p.set_bond_mark(edge, BondMark::Bonded);
        assert!(p.bonds.is_empty());
    }
}
