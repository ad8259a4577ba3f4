//! # Model positions
//!
//! A position is a root name plus a path of offsets. Every entry but the
//! last selects a child element by offset; the last entry is an offset
//! inside the resulting parent. Offsets count characters of text nodes and
//! one per element.
//!
//! Positions are plain values. They are not updated by document changes;
//! the `get_transformed_by_*` functions compute where a position ends up
//! after an insertion, a deletion or a move.

use crate::tree::Tree;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub root: String,
    pub path: Vec<usize>,
}

/// Relation between two positions in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionRelation {
    Before,
    After,
    Same,
    /// The positions are in different roots.
    Different,
}

/// Result of comparing two offset arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayRelation {
    Same,
    /// The first array is a prefix of the second.
    Prefix,
    /// The second array is a prefix of the first.
    Extension,
    /// The arrays differ first at the given index.
    Diff(usize),
}

pub fn compare_arrays(a: &[usize], b: &[usize]) -> ArrayRelation {
    let min = a.len().min(b.len());
    for i in 0..min {
        if a[i] != b[i] {
            return ArrayRelation::Diff(i);
        }
    }
    match a.len().cmp(&b.len()) {
        Ordering::Equal => ArrayRelation::Same,
        Ordering::Less => ArrayRelation::Prefix,
        Ordering::Greater => ArrayRelation::Extension,
    }
}

impl Position {
    pub fn new(root: impl Into<String>, path: Vec<usize>) -> Self {
        Self { root: root.into(), path }
    }

    /// Position at `offset` directly inside the root.
    pub fn at(root: impl Into<String>, offset: usize) -> Self {
        Self::new(root, vec![offset])
    }

    pub fn offset(&self) -> usize {
        self.path.last().copied().unwrap_or(0)
    }

    pub fn with_offset(&self, offset: usize) -> Self {
        let mut path = self.path.clone();
        match path.last_mut() {
            Some(last) => *last = offset,
            None => path.push(offset),
        }
        Self::new(self.root.clone(), path)
    }

    pub fn parent_path(&self) -> &[usize] {
        &self.path[..self.path.len().saturating_sub(1)]
    }

    /// Position at `offset` inside the node this position points at.
    pub fn child(&self, offset: usize) -> Self {
        let mut path = self.path.clone();
        path.push(offset);
        Self::new(self.root.clone(), path)
    }

    /// Position before the parent of this position.
    pub fn parent_position(&self) -> Option<Self> {
        if self.path.len() < 2 {
            return None;
        }
        Some(Self::new(self.root.clone(), self.parent_path().to_vec()))
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }

    pub fn get_shifted_by(&self, shift: isize) -> Self {
        let offset = (self.offset() as isize + shift).max(0) as usize;
        self.with_offset(offset)
    }

    pub fn is_at_start(&self) -> bool {
        self.offset() == 0
    }

    pub fn is_at_end(&self, tree: &Tree) -> bool {
        tree.resolve_parent(self)
            .map(|parent| tree.max_offset(parent) == self.offset())
            .unwrap_or(false)
    }

    pub fn has_same_parent_as(&self, other: &Position) -> bool {
        self.root == other.root && self.parent_path() == other.parent_path()
    }

    pub fn compare(&self, other: &Position) -> PositionRelation {
        if self.root != other.root {
            return PositionRelation::Different;
        }
        match compare_arrays(&self.path, &other.path) {
            ArrayRelation::Same => PositionRelation::Same,
            ArrayRelation::Prefix => PositionRelation::Before,
            ArrayRelation::Extension => PositionRelation::After,
            ArrayRelation::Diff(i) => {
                if self.path[i] < other.path[i] {
                    PositionRelation::Before
                } else {
                    PositionRelation::After
                }
            }
        }
    }

    pub fn is_before(&self, other: &Position) -> bool {
        self.compare(other) == PositionRelation::Before
    }

    pub fn is_after(&self, other: &Position) -> bool {
        self.compare(other) == PositionRelation::After
    }

    /// Longest common prefix of both paths, or `None` across roots.
    pub fn get_common_path(&self, other: &Position) -> Option<Vec<usize>> {
        if self.root != other.root {
            return None;
        }
        let common = match compare_arrays(&self.path, &other.path) {
            ArrayRelation::Same => self.path.len(),
            ArrayRelation::Prefix => self.path.len(),
            ArrayRelation::Extension => other.path.len(),
            ArrayRelation::Diff(i) => i,
        };
        Some(self.path[..common].to_vec())
    }

    /// Position after `how_many` offsets were inserted at `insert_position`.
    ///
    /// When the insertion happens exactly at this position the position is
    /// shifted only if `insert_before` is set, meaning the inserted content
    /// lands before it.
    pub fn get_transformed_by_insertion(&self, insert_position: &Position, how_many: usize, insert_before: bool) -> Position {
        let mut transformed = self.clone();
        if self.root != insert_position.root {
            return transformed;
        }

        match compare_arrays(insert_position.parent_path(), self.parent_path()) {
            ArrayRelation::Same => {
                let offset = insert_position.offset();
                if offset < self.offset() || (offset == self.offset() && insert_before) {
                    let new_offset = self.offset() + how_many;
                    transformed = transformed.with_offset(new_offset);
                }
            }
            ArrayRelation::Prefix => {
                let i = insert_position.path.len() - 1;
                if insert_position.offset() <= self.path[i] {
                    transformed.path[i] += how_many;
                }
            }
            _ => {}
        }

        transformed
    }

    /// Position after `how_many` offsets starting at `delete_position` were
    /// removed. `None` when this position was inside the removed content.
    pub fn get_transformed_by_deletion(&self, delete_position: &Position, how_many: usize) -> Option<Position> {
        let mut transformed = self.clone();
        if self.root != delete_position.root {
            return Some(transformed);
        }

        let offset = delete_position.offset();
        match compare_arrays(delete_position.parent_path(), self.parent_path()) {
            ArrayRelation::Same => {
                if offset < self.offset() {
                    if offset + how_many > self.offset() {
                        return None;
                    }
                    transformed = transformed.with_offset(self.offset() - how_many);
                }
            }
            ArrayRelation::Prefix => {
                let i = delete_position.path.len() - 1;
                if offset <= self.path[i] {
                    if offset + how_many > self.path[i] {
                        return None;
                    }
                    transformed.path[i] -= how_many;
                }
            }
            _ => {}
        }

        Some(transformed)
    }

    /// Position after `how_many` offsets were moved from `source` to
    /// `target`. `target` is expressed in coordinates from before the move.
    ///
    /// A position inside the moved content follows it. With `sticky` set a
    /// position right before the first moved node follows the content too.
    pub fn get_transformed_by_move(
        &self,
        source: &Position,
        target: &Position,
        how_many: usize,
        insert_before: bool,
        sticky: bool,
    ) -> Position {
        let target = target
            .get_transformed_by_deletion(source, how_many)
            .unwrap_or_else(|| target.clone());

        if how_many > 0 && sticky && self == source {
            return self.get_combined(source, &target);
        }

        match self.get_transformed_by_deletion(source, how_many) {
            None => self.get_combined(source, &target),
            Some(transformed) => transformed.get_transformed_by_insertion(&target, how_many, insert_before),
        }
    }

    /// Re-roots this position from `source` onto `target`. This position
    /// must be at or inside content that starts at `source`.
    pub fn get_combined(&self, source: &Position, target: &Position) -> Position {
        let i = source.path.len() - 1;
        let mut combined = target.clone();
        let last = combined.path.len() - 1;
        combined.path[last] += self.path[i] - source.path[i];
        combined.path.extend_from_slice(&self.path[i + 1..]);
        combined
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{:?}", self.root, self.path)
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.compare(other) {
            PositionRelation::Before => Some(Ordering::Less),
            PositionRelation::After => Some(Ordering::Greater),
            PositionRelation::Same => Some(Ordering::Equal),
            PositionRelation::Different => None,
        }
    }
}
