//! Log of every operation applied to a document, indexed by version.

use crate::operation::Operation;

#[derive(Debug, Clone, Default)]
pub struct History {
    operations: Vec<Operation>,
    /// Version of the first stored operation.
    base: u64,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an operation. Its base version must follow the previous one.
    pub fn add_operation(&mut self, operation: Operation) {
        if self.operations.is_empty() {
            self.base = operation.base_version.unwrap_or(0);
        }
        self.operations.push(operation);
    }

    /// Operations with `from <= baseVersion < to`.
    pub fn get_operations(&self, from: u64, to: u64) -> &[Operation] {
        let start = from.saturating_sub(self.base) as usize;
        let end = (to.saturating_sub(self.base) as usize).min(self.operations.len());
        if start >= end {
            return &[];
        }
        &self.operations[start..end]
    }

    /// Everything applied since `version`.
    pub fn operations_since(&self, version: u64) -> &[Operation] {
        self.get_operations(version, u64::MAX)
    }

    pub fn get_operation(&self, version: u64) -> Option<&Operation> {
        self.get_operations(version, version + 1).first()
    }

    pub fn last_operation(&self) -> Option<&Operation> {
        self.operations.last()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn reset(&mut self) {
        self.operations.clear();
        self.base = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_ranges() {
        let mut history = History::new();
        for v in 0..4 {
            history.add_operation(Operation::no_op(Some(v)));
        }
        assert_eq!(history.get_operations(1, 3).len(), 2);
        assert_eq!(history.operations_since(2).len(), 2);
        assert_eq!(history.get_operation(3).and_then(|op| op.base_version), Some(3));
        assert!(history.get_operations(3, 1).is_empty());
        assert!(history.get_operation(9).is_none());
    }
}
