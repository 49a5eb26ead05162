use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::marker::PhantomData;

/// Typed generational handle. The phantom parameter ties a handle to the
/// pool it came from, so a dynamic-body handle cannot be used to index the
/// static-body pool.
#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Handle<T> {
    index: u32,
    generation: u32,
    #[serde(skip)]
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    pub fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    /// Sentinel handle that never resolves.
    pub fn null() -> Self {
        Self::new(u32::MAX, 0)
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn is_null(&self) -> bool {
        self.index == u32::MAX
    }
}

// Manual impls: derives would put a `T: Trait` bound on the phantom type.
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> std::hash::Hash for Handle<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> std::fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handle({}v{})", self.index, self.generation)
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::null()
    }
}

/// Generational pool that hands out stable handles while preventing
/// use-after-free: freeing a slot bumps its generation, so handles minted
/// before the free fail lookup instead of aliasing the reborn slot.
pub struct Pool<T> {
    items: Vec<Option<T>>,
    generations: Vec<u32>,
    free_list: VecDeque<u32>,
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Pool<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            generations: Vec::new(),
            free_list: VecDeque::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            generations: Vec::with_capacity(capacity),
            free_list: VecDeque::new(),
        }
    }

    pub fn insert(&mut self, item: T) -> Handle<T> {
        if let Some(index) = self.free_list.pop_front() {
            let generation = self.generations[index as usize];
            self.items[index as usize] = Some(item);
            return Handle::new(index, generation);
        }

        let index = self.items.len() as u32;
        self.items.push(Some(item));
        self.generations.push(0);
        Handle::new(index, 0)
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        if self.is_valid(handle) {
            self.items
                .get(handle.index as usize)
                .and_then(|slot| slot.as_ref())
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        if self.is_valid(handle) {
            self.items
                .get_mut(handle.index as usize)
                .and_then(|slot| slot.as_mut())
        } else {
            None
        }
    }

    /// Disjoint mutable borrow of two distinct slots.
    pub fn get2_mut(&mut self, a: Handle<T>, b: Handle<T>) -> Option<(&mut T, &mut T)> {
        if a.index == b.index {
            return None;
        }
        if !self.is_valid(a) || !self.is_valid(b) {
            return None;
        }

        let (first, second, flipped) = if a.index < b.index {
            (a, b, false)
        } else {
            (b, a, true)
        };

        let second_index = second.index as usize;
        if second_index >= self.items.len() {
            return None;
        }

        let (left, right) = self.items.split_at_mut(second_index);
        let first_slot = left
            .get_mut(first.index as usize)
            .and_then(|slot| slot.as_mut())?;
        let second_slot = right.get_mut(0).and_then(|slot| slot.as_mut())?;

        if flipped {
            Some((second_slot, first_slot))
        } else {
            Some((first_slot, second_slot))
        }
    }

    pub fn remove(&mut self, handle: Handle<T>) -> Option<T> {
        if !self.is_valid(handle) {
            return None;
        }
        let slot = self.items.get_mut(handle.index as usize)?;
        if slot.is_some() {
            self.generations[handle.index as usize] =
                self.generations[handle.index as usize].wrapping_add(1);
            self.free_list.push_back(handle.index);
        }
        slot.take()
    }

    /// Frees a slot by raw index, bypassing the generation check. Used by the
    /// BVH rebuild pass to reclaim killed bodies it just walked over.
    pub(crate) fn remove_at(&mut self, index: u32) -> Option<T> {
        let slot = self.items.get_mut(index as usize)?;
        if slot.is_some() {
            self.generations[index as usize] = self.generations[index as usize].wrapping_add(1);
            self.free_list.push_back(index);
        }
        slot.take()
    }

    /// Reconstructs the live handle for an occupied slot index.
    pub fn handle_at(&self, index: u32) -> Option<Handle<T>> {
        match self.items.get(index as usize) {
            Some(Some(_)) => Some(Handle::new(index, self.generations[index as usize])),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter().filter_map(|slot| slot.as_ref())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.items.iter_mut().filter_map(|slot| slot.as_mut())
    }

    /// Iterates `(handle, &item)` over occupied slots; rebuild passes use
    /// this to mirror pool contents into the BVH.
    pub fn iter_with_handles(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.items.iter().enumerate().filter_map(|(index, slot)| {
            slot.as_ref()
                .map(|item| (Handle::new(index as u32, self.generations[index]), item))
        })
    }

    pub fn iter_with_handles_mut(&mut self) -> impl Iterator<Item = (Handle<T>, &mut T)> {
        let generations = &self.generations;
        self.items.iter_mut().enumerate().filter_map(move |(index, slot)| {
            slot.as_mut()
                .map(|item| (Handle::new(index as u32, generations[index]), item))
        })
    }

    pub fn handles(&self) -> impl Iterator<Item = Handle<T>> + '_ {
        self.items.iter().enumerate().filter_map(|(index, slot)| {
            slot.as_ref()
                .map(|_| Handle::new(index as u32, self.generations[index]))
        })
    }

    /// Number of live items.
    pub fn len(&self) -> usize {
        self.items.len() - self.free_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total slot count including free slots; the upper bound of raw indices.
    pub fn slot_count(&self) -> usize {
        self.items.len()
    }

    /// Raw slot storage. The parallel phase drivers index this with disjoint
    /// ranges per worker.
    pub(crate) fn slots_mut(&mut self) -> &mut [Option<T>] {
        &mut self.items
    }

    pub(crate) fn slots(&self) -> &[Option<T>] {
        &self.items
    }

    fn is_valid(&self, handle: Handle<T>) -> bool {
        self.generations
            .get(handle.index as usize)
            .copied()
            .map(|generation| generation == handle.generation)
            .unwrap_or(false)
    }
}
