//! Slot table handing out small reusable integer ids
//!
//! Used for user-facing handles in the session layer, for proxy ids inside a
//! connection, and as the storage behind [`GlobalTable`](crate::GlobalTable).
//! Freed slots are reused lowest-first; growing the table never moves a live
//! entry, so an id stays valid from insertion until its removal.

use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub struct IdTable<T> {
    slots: Vec<Option<T>>,
    free: BTreeSet<u32>,
}

impl<T> IdTable<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: BTreeSet::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: BTreeSet::new(),
        }
    }

    /// The id the next [`insert`](Self::insert) will hand out.
    pub fn next_id(&self) -> u32 {
        self.free
            .first()
            .copied()
            .unwrap_or(self.slots.len() as u32)
    }

    /// Store `value` in the lowest free slot and return its id.
    pub fn insert(&mut self, value: T) -> u32 {
        let id = self.next_id();
        self.fill(id, value);
        id
    }

    /// Reserve the next id for a fallible constructor.
    ///
    /// Nothing is stored when `build` fails.
    pub fn try_insert_with<E>(
        &mut self,
        build: impl FnOnce(u32) -> Result<T, E>,
    ) -> Result<u32, E> {
        let id = self.next_id();
        let value = build(id)?;
        self.fill(id, value);
        Ok(id)
    }

    /// Store `value` at a specific id, padding the table with empty slots.
    ///
    /// Returns the value previously stored there, if any.
    pub fn insert_at(&mut self, id: u32, value: T) -> Option<T> {
        let index = id as usize;
        while self.slots.len() < index {
            let pad = self.slots.len() as u32;
            self.slots.push(None);
            self.free.insert(pad);
        }
        if index == self.slots.len() {
            self.slots.push(Some(value));
            None
        } else {
            self.free.remove(&id);
            self.slots[index].replace(value)
        }
    }

    pub fn get(&self, id: u32) -> Option<&T> {
        self.slots.get(id as usize).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut T> {
        self.slots.get_mut(id as usize).and_then(Option::as_mut)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.get(id).is_some()
    }

    /// Free the slot for reuse and hand back its value.
    pub fn remove(&mut self, id: u32) -> Option<T> {
        let value = self.slots.get_mut(id as usize)?.take()?;
        self.free.insert(id);
        Some(value)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of slots, empty ones included.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Live entries in id order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_ref().map(|value| (id as u32, value)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u32, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_mut().map(|value| (id as u32, value)))
    }

    pub fn ids(&self) -> Vec<u32> {
        self.iter().map(|(id, _)| id).collect()
    }

    /// Empty the table, returning every live entry in id order.
    pub fn drain(&mut self) -> Vec<(u32, T)> {
        let slots = std::mem::take(&mut self.slots);
        self.free.clear();
        slots
            .into_iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.map(|value| (id as u32, value)))
            .collect()
    }

    fn fill(&mut self, id: u32, value: T) {
        if (id as usize) < self.slots.len() {
            self.free.remove(&id);
            self.slots[id as usize] = Some(value);
        } else {
            self.slots.push(Some(value));
        }
    }
}

impl<T> Default for IdTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
