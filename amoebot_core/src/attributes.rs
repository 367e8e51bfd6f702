//! Double-buffered, typed attribute cells.
//!
//! Every particle owns a store of named attribute cells. Reads through the
//! `current` accessors always see the value as of the last committed round;
//! writes land in a `planned` shadow slot that becomes current only when the
//! scheduler commits the round for the whole system at once. The separate
//! planned accessors exist so the synchrony-breaking read stays visible at
//! call sites instead of being the default.

use crate::grid::Direction;
use crate::particle::ParticleId;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::marker::PhantomData;
use thiserror::Error;

// ============================================================================
// VALUES
// ============================================================================

/// The kinds an attribute cell can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttrKind {
    Bool,
    Int,
    Uint,
    Dir,
    Text,
}

/// A dynamically-tagged attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Dir(Direction),
    Text(String),
}

impl AttributeValue {
    /// The kind tag of this value.
    pub fn kind(&self) -> AttrKind {
        match self {
            AttributeValue::Bool(_) => AttrKind::Bool,
            AttributeValue::Int(_) => AttrKind::Int,
            AttributeValue::Uint(_) => AttrKind::Uint,
            AttributeValue::Dir(_) => AttrKind::Dir,
            AttributeValue::Text(_) => AttrKind::Text,
        }
    }
}

/// Conversion between Rust types and tagged attribute values.
pub trait AttrValue: Sized {
    const KIND: AttrKind;

    fn into_value(self) -> AttributeValue;
    fn from_value(value: &AttributeValue) -> Option<Self>;
}

impl AttrValue for bool {
    const KIND: AttrKind = AttrKind::Bool;

    fn into_value(self) -> AttributeValue {
        AttributeValue::Bool(self)
    }

    fn from_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl AttrValue for i64 {
    const KIND: AttrKind = AttrKind::Int;

    fn into_value(self) -> AttributeValue {
        AttributeValue::Int(self)
    }

    fn from_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl AttrValue for u64 {
    const KIND: AttrKind = AttrKind::Uint;

    fn into_value(self) -> AttributeValue {
        AttributeValue::Uint(self)
    }

    fn from_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Uint(v) => Some(*v),
            _ => None,
        }
    }
}

impl AttrValue for Direction {
    const KIND: AttrKind = AttrKind::Dir;

    fn into_value(self) -> AttributeValue {
        AttributeValue::Dir(self)
    }

    fn from_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Dir(v) => Some(*v),
            _ => None,
        }
    }
}

impl AttrValue for String {
    const KIND: AttrKind = AttrKind::Text;

    fn into_value(self) -> AttributeValue {
        AttributeValue::Text(self)
    }

    fn from_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Text(v) => Some(v.clone()),
            _ => None,
        }
    }
}

// ============================================================================
// HANDLES
// ============================================================================

/// A typed handle to one attribute cell.
///
/// Handles are stable across rounds: re-declaring the same name yields a
/// handle to the same slot. The owner is baked in so writes from any other
/// particle can be rejected.
#[derive(Debug)]
pub struct AttrHandle<T> {
    owner: ParticleId,
    slot: usize,
    _kind: PhantomData<fn() -> T>,
}

impl<T> AttrHandle<T> {
    /// The particle this handle's cell belongs to.
    pub fn owner(&self) -> ParticleId {
        self.owner
    }
}

impl<T> Clone for AttrHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for AttrHandle<T> {}

// ============================================================================
// STORE
// ============================================================================

#[derive(Debug)]
struct AttributeCell {
    name: String,
    current: AttributeValue,
    planned: Option<AttributeValue>,
}

/// The per-particle collection of versioned attribute cells.
#[derive(Debug)]
pub struct AttributeStore {
    owner: ParticleId,
    cells: Vec<AttributeCell>,
    index: HashMap<String, usize>,
}

impl AttributeStore {
    pub(crate) fn new(owner: ParticleId) -> Self {
        Self {
            owner,
            cells: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// The particle owning this store.
    pub fn owner(&self) -> ParticleId {
        self.owner
    }

    /// Number of declared cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Declares a named cell, or resolves an existing one.
    ///
    /// Idempotent: redeclaring a name returns a handle to the same slot and
    /// leaves the stored value untouched. Redeclaring with a different kind
    /// is an error.
    pub fn declare<T: AttrValue>(
        &mut self,
        name: &str,
        initial: T,
    ) -> Result<AttrHandle<T>, AttributeError> {
        if let Some(&slot) = self.index.get(name) {
            let actual = self.cells[slot].current.kind();
            if actual != T::KIND {
                return Err(AttributeError::KindMismatch {
                    name: name.to_string(),
                    requested: T::KIND,
                    actual,
                });
            }
            return Ok(self.handle(slot));
        }

        let slot = self.cells.len();
        self.cells.push(AttributeCell {
            name: name.to_string(),
            current: initial.into_value(),
            planned: None,
        });
        self.index.insert(name.to_string(), slot);
        Ok(self.handle(slot))
    }

    fn handle<T>(&self, slot: usize) -> AttrHandle<T> {
        AttrHandle {
            owner: self.owner,
            slot,
            _kind: PhantomData,
        }
    }

    fn cell<T>(&self, handle: &AttrHandle<T>) -> Result<&AttributeCell, AttributeError> {
        if handle.owner != self.owner {
            return Err(AttributeError::ForeignHandle {
                holder: self.owner,
                owner: handle.owner,
            });
        }
        self.cells
            .get(handle.slot)
            .ok_or(AttributeError::StaleHandle { slot: handle.slot })
    }

    /// The committed value as of the last round boundary.
    pub fn read_current<T: AttrValue>(&self, handle: &AttrHandle<T>) -> Result<T, AttributeError> {
        let cell = self.cell(handle)?;
        T::from_value(&cell.current).ok_or(AttributeError::KindMismatch {
            name: cell.name.clone(),
            requested: T::KIND,
            actual: cell.current.kind(),
        })
    }

    /// The in-flight value written this round, defaulting to the committed
    /// value if the cell is untouched.
    pub fn read_planned<T: AttrValue>(&self, handle: &AttrHandle<T>) -> Result<T, AttributeError> {
        let cell = self.cell(handle)?;
        let value = cell.planned.as_ref().unwrap_or(&cell.current);
        T::from_value(value).ok_or(AttributeError::KindMismatch {
            name: cell.name.clone(),
            requested: T::KIND,
            actual: value.kind(),
        })
    }

    /// Records a planned write; visible through `read_planned` only until
    /// the round commits.
    pub fn write_planned<T: AttrValue>(
        &mut self,
        handle: &AttrHandle<T>,
        value: T,
    ) -> Result<(), AttributeError> {
        self.cell(handle)?;
        self.cells[handle.slot].planned = Some(value.into_value());
        Ok(())
    }

    /// Committed value looked up by name (snapshot reads across particles).
    pub fn value_by_name(&self, name: &str) -> Option<&AttributeValue> {
        let slot = *self.index.get(name)?;
        Some(&self.cells[slot].current)
    }

    /// Planned-or-current value looked up by name. This is the explicit
    /// synchrony-breaking accessor; see the module docs.
    pub fn planned_by_name(&self, name: &str) -> Option<&AttributeValue> {
        let slot = *self.index.get(name)?;
        let cell = &self.cells[slot];
        Some(cell.planned.as_ref().unwrap_or(&cell.current))
    }

    /// Iterates over `(name, committed value)` pairs in declaration order.
    pub fn iter_current(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.cells.iter().map(|c| (c.name.as_str(), &c.current))
    }

    /// Promotes every planned value to current.
    pub(crate) fn commit_round(&mut self) {
        for cell in &mut self.cells {
            if let Some(value) = cell.planned.take() {
                cell.current = value;
            }
        }
    }

    /// Drops every planned value without committing (round rejection).
    pub(crate) fn discard_planned(&mut self) {
        for cell in &mut self.cells {
            cell.planned = None;
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Errors raised by the attribute store.
#[derive(Debug, Clone, Error)]
pub enum AttributeError {
    /// Declared or read with a kind that does not match the stored cell.
    #[error("attribute {name:?} holds {actual:?}, not {requested:?}")]
    KindMismatch {
        name: String,
        requested: AttrKind,
        actual: AttrKind,
    },

    /// Handle presented to a store that does not own it.
    #[error("attribute handle owned by {owner} presented to particle {holder}")]
    ForeignHandle { holder: ParticleId, owner: ParticleId },

    /// Handle outlived its cell (owner was removed and re-added).
    #[error("stale attribute handle (slot {slot})")]
    StaleHandle { slot: usize },

    /// Write attempted by a particle that does not own the cell.
    #[error("particle {writer} may not write attribute owned by {owner}")]
    NotOwner { writer: ParticleId, owner: ParticleId },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> AttributeStore {
        AttributeStore::new(ParticleId::from_seed(1))
    }

    #[test]
    fn test_declare_and_read() {
        let mut attrs = store();
        let h = attrs.declare("phase", 0u64).unwrap();
        assert_eq!(attrs.read_current(&h).unwrap(), 0);
        assert_eq!(attrs.read_planned(&h).unwrap(), 0);
    }

    #[test]
    fn test_declare_is_idempotent() {
        let mut attrs = store();
        let h1 = attrs.declare("phase", 3u64).unwrap();
        attrs.write_planned(&h1, 9).unwrap();
        attrs.commit_round();

        // Redeclaring resolves the same cell and keeps the stored value
        let h2 = attrs.declare("phase", 3u64).unwrap();
        assert_eq!(attrs.read_current(&h2).unwrap(), 9);
        assert_eq!(attrs.len(), 1);
    }

    #[test]
    fn test_declare_kind_mismatch() {
        let mut attrs = store();
        attrs.declare("phase", 0u64).unwrap();
        let err = attrs.declare::<bool>("phase", false).unwrap_err();
        assert!(matches!(err, AttributeError::KindMismatch { .. }));
    }

    #[test]
    fn test_write_is_invisible_until_commit() {
        let mut attrs = store();
        let h = attrs.declare("leader", false).unwrap();

        attrs.write_planned(&h, true).unwrap();
        assert!(!attrs.read_current(&h).unwrap());
        assert!(attrs.read_planned(&h).unwrap());

        attrs.commit_round();
        assert!(attrs.read_current(&h).unwrap());
    }

    #[test]
    fn test_commit_promotes_every_cell() {
        let mut attrs = store();
        let a = attrs.declare("a", 1i64).unwrap();
        let b = attrs.declare("b", 2i64).unwrap();
        attrs.write_planned(&a, 10).unwrap();
        attrs.write_planned(&b, 20).unwrap();

        attrs.commit_round();
        assert_eq!(attrs.read_current(&a).unwrap(), 10);
        assert_eq!(attrs.read_current(&b).unwrap(), 20);
    }

    #[test]
    fn test_discard_planned() {
        let mut attrs = store();
        let h = attrs.declare("a", 1i64).unwrap();
        attrs.write_planned(&h, 10).unwrap();
        attrs.discard_planned();
        attrs.commit_round();
        assert_eq!(attrs.read_current(&h).unwrap(), 1);
    }

    #[test]
    fn test_foreign_handle_rejected() {
        let mine = store();
        let mut theirs = AttributeStore::new(ParticleId::from_seed(2));
        let h = theirs.declare("x", 0u64).unwrap();
        assert!(matches!(
            mine.read_current(&h),
            Err(AttributeError::ForeignHandle { .. })
        ));
    }

    #[test]
    fn test_lookup_by_name() {
        let mut attrs = store();
        let h = attrs.declare("dir", Direction::NorthEast).unwrap();
        assert_eq!(
            attrs.value_by_name("dir"),
            Some(&AttributeValue::Dir(Direction::NorthEast))
        );
        attrs.write_planned(&h, Direction::West).unwrap();
        assert_eq!(
            attrs.value_by_name("dir"),
            Some(&AttributeValue::Dir(Direction::NorthEast))
        );
        assert_eq!(
            attrs.planned_by_name("dir"),
            Some(&AttributeValue::Dir(Direction::West))
        );
        assert_eq!(attrs.value_by_name("missing"), None);
    }
}
