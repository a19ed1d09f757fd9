//! Undo/redo history of reversible actions.

use std::collections::VecDeque;

/// Oldest entries are dropped beyond this many.
pub const HISTORY_CAPACITY: usize = 200;

/// An edit that can be applied and reverted on a target.
pub trait Reversible<T> {
    fn forward(&self, target: &mut T);
    fn backward(&self, target: &mut T);

    fn label(&self) -> &str {
        ""
    }
}

#[derive(Debug)]
pub struct History<A> {
    undo: VecDeque<A>,
    redo: Vec<A>,
    capacity: usize,
}

impl<A> Default for History<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> History<A> {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Runs the action's forward effect, records it and clears redo.
    pub fn commit<T>(&mut self, target: &mut T, action: A)
    where
        A: Reversible<T>,
    {
        action.forward(target);
        tracing::debug!("[history] commit {}", action.label());
        self.undo.push_back(action);
        while self.undo.len() > self.capacity {
            self.undo.pop_front();
        }
        self.redo.clear();
    }

    /// Reverts the latest action. Returns false when there is nothing to undo.
    pub fn undo<T>(&mut self, target: &mut T) -> bool
    where
        A: Reversible<T>,
    {
        let Some(action) = self.undo.pop_back() else {
            return false;
        };
        action.backward(target);
        tracing::debug!("[history] undo {}", action.label());
        self.redo.push(action);
        true
    }

    /// Reapplies the latest undone action.
    pub fn redo<T>(&mut self, target: &mut T) -> bool
    where
        A: Reversible<T>,
    {
        let Some(action) = self.redo.pop() else {
            return false;
        };
        action.forward(target);
        tracing::debug!("[history] redo {}", action.label());
        self.undo.push_back(action);
        true
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Pushes a value; undo pops it.
    struct Push(i32);

    impl Reversible<Vec<i32>> for Push {
        fn forward(&self, target: &mut Vec<i32>) {
            target.push(self.0);
        }

        fn backward(&self, target: &mut Vec<i32>) {
            target.pop();
        }
    }

    fn add(n: i32) -> Push {
        Push(n)
    }

    #[test]
    fn test_commit_undo_redo() {
        let mut history = History::new();
        let mut state = Vec::new();
        history.commit(&mut state, add(1));
        history.commit(&mut state, add(2));
        assert_eq!(state, vec![1, 2]);

        assert!(history.undo(&mut state));
        assert_eq!(state, vec![1]);
        assert!(history.redo(&mut state));
        assert_eq!(state, vec![1, 2]);
        assert!(!history.redo(&mut state));
    }

    #[test]
    fn test_commit_clears_redo() {
        let mut history = History::new();
        let mut state = Vec::new();
        history.commit(&mut state, add(1));
        history.undo(&mut state);
        assert!(history.can_redo());
        history.commit(&mut state, add(5));
        assert!(!history.can_redo());
        assert_eq!(state, vec![5]);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let mut history = History::new();
        let mut state = Vec::new();
        for i in 0..250 {
            history.commit(&mut state, add(i));
        }
        assert_eq!(history.undo_len(), HISTORY_CAPACITY);
        while history.undo(&mut state) {}
        // The 50 oldest pushes can no longer be undone.
        assert_eq!(state, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_clear() {
        let mut history = History::new();
        let mut state = Vec::new();
        history.commit(&mut state, add(1));
        history.undo(&mut state);
        history.commit(&mut state, add(2));
        history.clear();
        assert!(!history.can_undo() && !history.can_redo());
        assert!(!history.undo(&mut state));
    }
}
