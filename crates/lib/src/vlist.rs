//! In-memory movable-list simulator.
//!
//! The movable-list diff interleaves deletes, moves, and inserts whose
//! indices are only meaningful against the list as it evolves. This simulator
//! validates that index arithmetic without touching the live document; the
//! diff mirrors every op it emits onto it and reads follow-up indices back.
//!
//! `mov` uses the engine's convention: the element is removed from `from`
//! and re-inserted at `to` evaluated against the shortened list.

#[derive(Debug, Clone, Default)]
pub struct VirtualMovableList<T> {
    items: Vec<T>,
}

impl<T> VirtualMovableList<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn from_items(items: Vec<T>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    /// Insert at `index`, clamped to the current length.
    pub fn insert(&mut self, index: usize, item: T) {
        let index = index.min(self.items.len());
        self.items.insert(index, item);
    }

    /// Remove and return the element at `index`, if in range.
    pub fn delete(&mut self, index: usize) -> Option<T> {
        if index < self.items.len() {
            Some(self.items.remove(index))
        } else {
            None
        }
    }

    /// Move the element at `from` to position `to`. Out-of-range `from` is a
    /// no-op; `to` is clamped.
    pub fn mov(&mut self, from: usize, to: usize) {
        if from >= self.items.len() {
            return;
        }
        let item = self.items.remove(from);
        let to = to.min(self.items.len());
        self.items.insert(to, item);
    }

    /// Index of the first element matching the predicate.
    pub fn position(&self, mut pred: impl FnMut(&T) -> bool) -> Option<usize> {
        self.items.iter().position(|item| pred(item))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }
}
