//! # Model ranges
//!
//! A range is an ordered pair of positions in the same root. Ranges are
//! plain values like positions; documents keep live ranges (selection,
//! markers) current by transforming them after every operation.

use crate::error::ModelResult;
use crate::position::Position;
use crate::tree::{NodeId, Tree};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    /// Creates a range, swapping the boundaries if `end` precedes `start`.
    pub fn new(start: Position, end: Position) -> Self {
        if end.is_before(&start) {
            Self { start: end, end: start }
        } else {
            Self { start, end }
        }
    }

    pub fn collapsed(position: Position) -> Self {
        Self {
            start: position.clone(),
            end: position,
        }
    }

    pub fn from_position_and_shift(position: &Position, shift: usize) -> Self {
        Self::new(position.clone(), position.get_shifted_by(shift as isize))
    }

    /// Range covering exactly one node.
    pub fn on(tree: &Tree, id: NodeId) -> ModelResult<Self> {
        let start = tree.position_before(id)?;
        Ok(Self::from_position_and_shift(&start, tree.offset_size(id)))
    }

    /// Range covering the whole content of an element.
    pub fn in_element(tree: &Tree, id: NodeId) -> ModelResult<Self> {
        Ok(Self::new(tree.position_in(id, 0)?, tree.position_at_end(id)?))
    }

    pub fn root(&self) -> &str {
        &self.start.root
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }

    /// Both boundaries share a parent.
    pub fn is_flat(&self) -> bool {
        self.start.has_same_parent_as(&self.end)
    }

    /// Offset length of a flat range.
    pub fn flat_len(&self) -> usize {
        self.end.offset().saturating_sub(self.start.offset())
    }

    /// Strictly inside the range.
    pub fn contains_position(&self, position: &Position) -> bool {
        position.is_after(&self.start) && position.is_before(&self.end)
    }

    /// With `loose` set, shared boundaries also count as contained.
    pub fn contains_range(&self, other: &Range, loose: bool) -> bool {
        let loose = loose && !other.is_collapsed();
        let contains_start = self.contains_position(&other.start) || (loose && self.start == other.start);
        let contains_end = self.contains_position(&other.end) || (loose && self.end == other.end);
        contains_start && contains_end
    }

    pub fn is_intersecting(&self, other: &Range) -> bool {
        self.start.is_before(&other.end) && self.end.is_after(&other.start)
    }

    pub fn get_intersection(&self, other: &Range) -> Option<Range> {
        if !self.is_intersecting(other) {
            return None;
        }
        let start = if self.start.is_before(&other.start) {
            other.start.clone()
        } else {
            self.start.clone()
        };
        let end = if self.end.is_after(&other.end) {
            other.end.clone()
        } else {
            self.end.clone()
        };
        Some(Range::new(start, end))
    }

    /// Parts of this range not covered by `other`; zero, one or two ranges.
    pub fn get_difference(&self, other: &Range) -> Vec<Range> {
        if !self.is_intersecting(other) {
            return vec![self.clone()];
        }
        let mut ranges = Vec::new();
        if self.contains_position(&other.start) {
            ranges.push(Range::new(self.start.clone(), other.start.clone()));
        }
        if self.contains_position(&other.end) {
            ranges.push(Range::new(other.end.clone(), self.end.clone()));
        }
        ranges
    }

    /// Union of two intersecting or touching ranges.
    pub fn get_joined(&self, other: &Range) -> Option<Range> {
        let joinable = self.is_intersecting(other) || self.end == other.start || other.end == self.start;
        if !joinable {
            return None;
        }
        let start = if other.start.is_before(&self.start) {
            other.start.clone()
        } else {
            self.start.clone()
        };
        let end = if other.end.is_after(&self.end) {
            other.end.clone()
        } else {
            self.end.clone()
        };
        Some(Range::new(start, end))
    }

    /// Smallest set of flat ranges covering this range, in document order.
    pub fn minimal_flat_ranges(&self, tree: &Tree) -> ModelResult<Vec<Range>> {
        let mut ranges = Vec::new();
        let diff_at = self.start.get_common_path(&self.end).map(|p| p.len()).unwrap_or(0);
        let mut pos = self.start.clone();

        while pos.path.len() > diff_at + 1 {
            let parent = tree.resolve_parent(&pos)?;
            let how_many = tree.max_offset(parent).saturating_sub(pos.offset());
            if how_many != 0 {
                ranges.push(Range::from_position_and_shift(&pos, how_many));
            }
            pos.path.pop();
            if let Some(last) = pos.path.last_mut() {
                *last += 1;
            }
        }

        while pos.path.len() <= self.end.path.len() {
            let offset = self.end.path[pos.path.len() - 1];
            let how_many = offset.saturating_sub(pos.offset());
            if how_many != 0 {
                ranges.push(Range::from_position_and_shift(&pos, how_many));
            }
            pos = pos.with_offset(offset);
            pos.path.push(0);
        }

        Ok(ranges)
    }

    /// Range after `how_many` offsets were inserted at `position`.
    ///
    /// With `spread` set and the insertion strictly inside the range, the
    /// result is split in two so the inserted content is left out. With
    /// `spread_only_on_same_level`, only insertions sharing a parent with
    /// both boundaries spread the range.
    pub fn get_transformed_by_insertion(
        &self,
        position: &Position,
        how_many: usize,
        spread: bool,
        spread_only_on_same_level: bool,
    ) -> Vec<Range> {
        let same_level = position.has_same_parent_as(&self.start) && position.has_same_parent_as(&self.end);
        if spread && self.contains_position(position) && (same_level || !spread_only_on_same_level) {
            return vec![
                Range::new(self.start.clone(), position.clone()),
                Range::new(
                    position.get_shifted_by(how_many as isize),
                    self.end.get_transformed_by_insertion(position, how_many, false),
                ),
            ];
        }

        let start = self.start.get_transformed_by_insertion(position, how_many, true);
        let end = self.end.get_transformed_by_insertion(position, how_many, self.is_collapsed());
        vec![Range::new(start, end)]
    }

    /// Range after content was deleted, `None` when it was entirely removed.
    pub fn get_transformed_by_deletion(&self, position: &Position, how_many: usize) -> Option<Range> {
        let start = self.start.get_transformed_by_deletion(position, how_many);
        let end = self.end.get_transformed_by_deletion(position, how_many);
        match (start, end) {
            (None, None) => None,
            (start, end) => Some(Range::new(
                start.unwrap_or_else(|| position.clone()),
                end.unwrap_or_else(|| position.clone()),
            )),
        }
    }

    /// Ranges after `how_many` offsets were moved from `source` to `target`
    /// (target in pre-removal coordinates).
    ///
    /// The part of this range that was moved follows the moved content, so
    /// the result holds up to three ranges. With `spread` set, content moved
    /// into the middle of this range is excluded from it.
    pub fn get_transformed_by_move(&self, source: &Position, target: &Position, how_many: usize, spread: bool) -> Vec<Range> {
        if self.is_collapsed() {
            let position = self.start.get_transformed_by_move(source, target, how_many, true, false);
            return vec![Range::collapsed(position)];
        }

        let move_range = Range::from_position_and_shift(source, how_many);
        let insert_position = target
            .get_transformed_by_deletion(source, how_many)
            .unwrap_or_else(|| target.clone());

        if self.contains_position(target)
            && !spread
            && (move_range.contains_position(&self.start) || move_range.contains_position(&self.end))
        {
            let start = self.start.get_transformed_by_move(source, target, how_many, true, false);
            let end = self.end.get_transformed_by_move(source, target, how_many, false, false);
            return vec![Range::new(start, end)];
        }

        let difference_set = self.get_difference(&move_range);
        let common = self.get_intersection(&move_range);

        let deleted = |p: &Position| p.get_transformed_by_deletion(source, how_many).unwrap_or_else(|| p.clone());
        let difference = match difference_set.as_slice() {
            [single] => Some(Range::new(deleted(&single.start), deleted(&single.end))),
            [_, _] => Some(Range::new(self.start.clone(), deleted(&self.end))),
            _ => None,
        };

        let mut result = match difference {
            Some(difference) => {
                difference.get_transformed_by_insertion(&insert_position, how_many, common.is_some() || spread, true)
            }
            None => Vec::new(),
        };

        if let Some(common) = common {
            let moved = Range::new(
                common.start.get_combined(source, &insert_position),
                common.end.get_combined(source, &insert_position),
            );
            if result.len() == 2 {
                result.insert(1, moved);
            } else {
                result.push(moved);
            }
        }

        result
    }
}
