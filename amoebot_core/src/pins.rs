//! Pin addressing and per-round partition-set declaration.
//!
//! Pins are addressed in the particle's local frame as (side, direction,
//! offset). A configuration starts with every pin in its own implicit
//! singleton set; programs group pins into declared partition sets, mark
//! sets to send a beep, and hand the finished configuration to the
//! scheduler once per communication phase. Configurations carry no
//! identity across rounds.

use crate::grid::Direction;
use crate::particle::{Body, Side};

use std::collections::HashMap;
use thiserror::Error;

/// A pin address in the declaring particle's local frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pin {
    pub side: Side,
    pub dir: Direction,
    pub offset: u8,
}

impl Pin {
    /// A head-side pin (the common case; contracted particles only have
    /// head-side pins).
    pub fn new(dir: Direction, offset: u8) -> Self {
        Self {
            side: Side::Head,
            dir,
            offset,
        }
    }

    /// A pin on an explicit side of an expanded particle.
    pub fn on(side: Side, dir: Direction, offset: u8) -> Self {
        Self { side, dir, offset }
    }
}

impl std::fmt::Display for Pin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.side, self.dir, self.offset)
    }
}

/// Identifier of a declared partition set, valid for the round in which the
/// configuration was declared (declaration index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartitionSetId(pub usize);

#[derive(Debug, Clone)]
pub(crate) struct PartitionSet {
    pub label: Option<String>,
    pub pins: Vec<Pin>,
    pub send: bool,
}

/// A particle's pin grouping for one communication phase.
///
/// Obtained from [`crate::program::ParticleContext::pin_config`], which
/// seeds it with the system pin count and the particle's current shape.
#[derive(Debug, Clone)]
pub struct PinConfiguration {
    pin_count: u8,
    expanded: bool,
    /// Local direction from head to tail, if expanded.
    tail_dir: Option<Direction>,
    sets: Vec<PartitionSet>,
    assigned: HashMap<Pin, usize>,
}

impl PinConfiguration {
    pub(crate) fn new(pin_count: u8, body: Body, tail_dir_local: Option<Direction>) -> Self {
        Self {
            pin_count,
            expanded: body.is_expanded(),
            tail_dir: tail_dir_local,
            sets: Vec::new(),
            assigned: HashMap::new(),
        }
    }

    /// Pins per edge in this system.
    pub fn pin_count(&self) -> u8 {
        self.pin_count
    }

    /// Number of declared partition sets so far.
    pub fn set_count(&self) -> usize {
        self.sets.len()
    }

    /// True if `pin` exists on the particle's current body: the offset is in
    /// range, contracted particles only expose head-side pins, and the
    /// internal edge pair of an expanded body carries none.
    pub fn is_valid_pin(&self, pin: Pin) -> bool {
        if pin.offset >= self.pin_count {
            return false;
        }
        if !self.expanded {
            return pin.side == Side::Head;
        }
        let internal = self.tail_dir.expect("expanded body has a tail direction");
        match pin.side {
            Side::Head => pin.dir != internal,
            Side::Tail => pin.dir != internal.opposite(),
        }
    }

    /// Every pin of the current body, head side first, in direction order.
    pub fn valid_pins(&self) -> Vec<Pin> {
        let sides: &[Side] = if self.expanded {
            &[Side::Head, Side::Tail]
        } else {
            &[Side::Head]
        };
        let mut out = Vec::new();
        for &side in sides {
            for dir in Direction::ALL {
                for offset in 0..self.pin_count {
                    let pin = Pin::on(side, dir, offset);
                    if self.is_valid_pin(pin) {
                        out.push(pin);
                    }
                }
            }
        }
        out
    }

    /// Groups the given pins into a new partition set.
    ///
    /// Each pin may belong to at most one declared set; grouping a pin a
    /// second time, or naming a pin the body does not have, is fatal.
    pub fn make_set(&mut self, pins: &[Pin]) -> Result<PartitionSetId, PinError> {
        self.insert_set(None, pins)
    }

    /// Like [`make_set`](Self::make_set) with a debug label.
    pub fn labeled_set(&mut self, label: &str, pins: &[Pin]) -> Result<PartitionSetId, PinError> {
        self.insert_set(Some(label.to_string()), pins)
    }

    /// Groups every pin of the body into one set (the broadcast circuit).
    pub fn global_set(&mut self) -> Result<PartitionSetId, PinError> {
        let pins = self.valid_pins();
        self.insert_set(Some("global".to_string()), &pins)
    }

    /// Groups one pin per listed local direction at the given lane offset,
    /// mirrored so the lane stays continuous across particles: directions in
    /// the upper half-plane use `offset`, the lower half `P-1-offset`.
    pub fn star_set(&mut self, dirs: &[Direction], offset: u8) -> Result<PartitionSetId, PinError> {
        if offset >= self.pin_count {
            let dir = dirs.first().copied().unwrap_or(Direction::East);
            return Err(PinError::InvalidPin {
                pin: Pin::new(dir, offset),
            });
        }
        let mut pins = Vec::new();
        for &dir in dirs {
            let lane = self.mirrored_offset(dir, offset);
            for side in [Side::Head, Side::Tail] {
                let pin = Pin::on(side, dir, lane);
                if self.is_valid_pin(pin) {
                    pins.push(pin);
                } else if side == Side::Head && !self.expanded {
                    // Contracted bodies have every direction on the head side;
                    // an invalid head pin means the offset itself is bad.
                    return Err(PinError::InvalidPin { pin });
                }
            }
        }
        self.insert_set(None, &pins)
    }

    /// A two-pin wire along one axis: pin `offset` toward `axis` grouped
    /// with the mirrored pin on the opposite edge.
    pub fn lane_set(&mut self, axis: Direction, offset: u8) -> Result<PartitionSetId, PinError> {
        self.star_set(&[axis, axis.opposite()], offset)
    }

    /// Marks a declared set to send a beep this round.
    pub fn send_beep(&mut self, set: PartitionSetId) -> Result<(), PinError> {
        let entry = self.sets.get_mut(set.0).ok_or(PinError::UnknownSet(set))?;
        entry.send = true;
        Ok(())
    }

    fn mirrored_offset(&self, dir: Direction, offset: u8) -> u8 {
        if dir.index() < 3 {
            offset
        } else {
            self.pin_count.saturating_sub(1).saturating_sub(offset)
        }
    }

    fn insert_set(
        &mut self,
        label: Option<String>,
        pins: &[Pin],
    ) -> Result<PartitionSetId, PinError> {
        for &pin in pins {
            if !self.is_valid_pin(pin) {
                return Err(PinError::InvalidPin { pin });
            }
            if self.assigned.contains_key(&pin) {
                return Err(PinError::AlreadyGrouped { pin });
            }
        }
        // Duplicates within the argument list are also double references
        for (i, &pin) in pins.iter().enumerate() {
            if pins[..i].contains(&pin) {
                return Err(PinError::AlreadyGrouped { pin });
            }
        }

        let id = self.sets.len();
        for &pin in pins {
            self.assigned.insert(pin, id);
        }
        self.sets.push(PartitionSet {
            label,
            pins: pins.to_vec(),
            send: false,
        });
        Ok(PartitionSetId(id))
    }

    /// Declared sets followed by an implicit singleton per unassigned pin.
    ///
    /// Indices of the returned list line up with [`PartitionSetId`] for the
    /// declared prefix, which is what received flags are reported against.
    pub(crate) fn resolved_sets(&self) -> Vec<PartitionSet> {
        let mut out = self.sets.clone();
        for pin in self.valid_pins() {
            if !self.assigned.contains_key(&pin) {
                out.push(PartitionSet {
                    label: None,
                    pins: vec![pin],
                    send: false,
                });
            }
        }
        out
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Declaration-time circuit errors. Fatal to the declaring call.
#[derive(Debug, Clone, Error)]
pub enum PinError {
    /// A pin was referenced by more than one partition set.
    #[error("pin {pin} referenced by more than one partition set")]
    AlreadyGrouped { pin: Pin },

    /// The pin does not exist on the particle's current body.
    #[error("pin {pin} does not exist on this particle")]
    InvalidPin { pin: Pin },

    /// The partition set id does not name a declared set.
    #[error("unknown partition set {0:?}")]
    UnknownSet(PartitionSetId),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridPos;

    fn contracted_config(pin_count: u8) -> PinConfiguration {
        PinConfiguration::new(pin_count, Body::contracted(GridPos::ORIGIN), None)
    }

    fn expanded_config(pin_count: u8) -> PinConfiguration {
        // Head east of tail; head-to-tail direction is West.
        let body = Body::expanded(GridPos::new(1, 0), GridPos::ORIGIN);
        PinConfiguration::new(pin_count, body, Some(Direction::West))
    }

    #[test]
    fn test_contracted_pin_inventory() {
        let cfg = contracted_config(2);
        assert_eq!(cfg.valid_pins().len(), 12);
        assert!(cfg.is_valid_pin(Pin::new(Direction::East, 1)));
        assert!(!cfg.is_valid_pin(Pin::new(Direction::East, 2)));
        assert!(!cfg.is_valid_pin(Pin::on(Side::Tail, Direction::East, 0)));
    }

    #[test]
    fn test_expanded_pin_inventory_excludes_internal_edges() {
        let cfg = expanded_config(2);
        assert_eq!(cfg.valid_pins().len(), 20);
        assert!(!cfg.is_valid_pin(Pin::on(Side::Head, Direction::West, 0)));
        assert!(!cfg.is_valid_pin(Pin::on(Side::Tail, Direction::East, 0)));
        assert!(cfg.is_valid_pin(Pin::on(Side::Tail, Direction::West, 1)));
    }

    #[test]
    fn test_make_set_rejects_double_reference() {
        let mut cfg = contracted_config(2);
        cfg.make_set(&[Pin::new(Direction::East, 0)]).unwrap();
        let err = cfg
            .make_set(&[Pin::new(Direction::East, 0), Pin::new(Direction::West, 0)])
            .unwrap_err();
        assert!(matches!(err, PinError::AlreadyGrouped { .. }));

        let err = cfg
            .make_set(&[Pin::new(Direction::NorthEast, 1), Pin::new(Direction::NorthEast, 1)])
            .unwrap_err();
        assert!(matches!(err, PinError::AlreadyGrouped { .. }));
    }

    #[test]
    fn test_make_set_rejects_nonexistent_pin() {
        let mut cfg = contracted_config(1);
        let err = cfg.make_set(&[Pin::new(Direction::East, 3)]).unwrap_err();
        assert!(matches!(err, PinError::InvalidPin { .. }));
    }

    #[test]
    fn test_global_set_spans_all_pins() {
        let mut cfg = contracted_config(2);
        let id = cfg.global_set().unwrap();
        assert_eq!(id, PartitionSetId(0));
        let resolved = cfg.resolved_sets();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].pins.len(), 12);
    }

    #[test]
    fn test_singletons_fill_unassigned_pins() {
        let mut cfg = contracted_config(1);
        cfg.make_set(&[Pin::new(Direction::East, 0), Pin::new(Direction::West, 0)])
            .unwrap();
        let resolved = cfg.resolved_sets();
        // 1 declared set + 4 leftover singletons
        assert_eq!(resolved.len(), 5);
        assert!(resolved[1..].iter().all(|s| s.pins.len() == 1));
    }

    #[test]
    fn test_star_set_mirrors_lane_offsets() {
        let mut cfg = contracted_config(2);
        let id = cfg
            .star_set(&[Direction::East, Direction::West], 0)
            .unwrap();
        let resolved = cfg.resolved_sets();
        let pins = &resolved[id.0].pins;
        assert!(pins.contains(&Pin::new(Direction::East, 0)));
        // West is in the lower half-plane, so lane 0 mirrors to pin 1
        assert!(pins.contains(&Pin::new(Direction::West, 1)));
    }

    #[test]
    fn test_send_beep_requires_declared_set() {
        let mut cfg = contracted_config(1);
        let id = cfg.global_set().unwrap();
        cfg.send_beep(id).unwrap();
        assert!(cfg.resolved_sets()[0].send);
        assert!(matches!(
            cfg.send_beep(PartitionSetId(7)),
            Err(PinError::UnknownSet(_))
        ));
    }
}
