//! An [OrderedMap] is a hash map which remembers the order in which keys were inserted or last reinserted.
//!
//! This is implemented as a vec-backed linked list plus an auxiliary hash-based index.  Slots vacated by removal are
//! chained into a free list and handed out again by later insertions, so a map under sustained eviction pressure stops
//! allocating once it reaches its high-water size.
//!
//! Unlike a classic Lru, reading an entry never changes the order.  Callers decide when something is fresh by calling
//! [OrderedMap::reinsert] explicitly, and decide what to evict by looking at [OrderedMap::eldest].
//!
//! There is no internal locking; owners are expected to put the map behind their own lock.
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

use ahash::RandomState;

struct OccupiedEntry<K, V> {
    key: K,
    item: V,
    /// Neighbour on the newest side.
    prev: Option<usize>,
    /// Neighbour on the eldest side.
    next: Option<usize>,
}

struct EmptyEntry {
    next_empty: Option<usize>,
}

enum MapEntry<K, V> {
    /// This slot is free, possibly pointing at the next free slot.
    Empty(EmptyEntry),
    /// This slot is occupied, and doubly linked to its neighbours.
    Occupied(OccupiedEntry<K, V>),
}

impl<K, V> MapEntry<K, V> {
    fn as_occupied_mut(&mut self) -> &mut OccupiedEntry<K, V> {
        match self {
            Self::Occupied(ref mut x) => x,
            _ => panic!("Entry should be occupied"),
        }
    }

    fn as_occupied(&self) -> &OccupiedEntry<K, V> {
        match self {
            Self::Occupied(ref x) => x,
            _ => panic!("Entry should be occupied"),
        }
    }

    fn as_empty(&self) -> &EmptyEntry {
        match self {
            Self::Empty(ref x) => x,
            _ => panic!("Entry should be empty"),
        }
    }
}

pub struct OrderedMap<K, V> {
    entries: Vec<MapEntry<K, V>>,
    /// Points at the slot of the key.
    index: HashMap<K, usize, RandomState>,
    /// Most recently (re)inserted slot.
    entries_head: Option<usize>,
    /// Eldest slot.
    entries_tail: Option<usize>,
    empty_head: Option<usize>,
}

impl<K: Hash + Eq + Clone, V> Default for OrderedMap<K, V> {
    fn default() -> Self {
        OrderedMap::new()
    }
}

impl<K: Hash + Eq + Clone, V> OrderedMap<K, V> {
    pub fn new() -> OrderedMap<K, V> {
        OrderedMap::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> OrderedMap<K, V> {
        OrderedMap {
            entries: Vec::with_capacity(capacity),
            index: HashMap::with_capacity_and_hasher(capacity, RandomState::new()),
            entries_head: None,
            entries_tail: None,
            empty_head: None,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.contains_key(key)
    }

    /// Detach an occupied slot from the list, patching up the head and tail as needed.
    fn unlink_index(&mut self, index: usize) {
        let (prev, next) = {
            let e = self.entries[index].as_occupied();
            (e.prev, e.next)
        };

        match prev {
            Some(p) => self.entries[p].as_occupied_mut().next = next,
            None => self.entries_head = next,
        }
        match next {
            Some(n) => self.entries[n].as_occupied_mut().prev = prev,
            None => self.entries_tail = prev,
        }

        let e = self.entries[index].as_occupied_mut();
        e.prev = None;
        e.next = None;
    }

    /// Link a detached occupied slot in as the newest entry.
    fn link_at_head(&mut self, index: usize) {
        let old_head = self.entries_head;
        {
            let e = self.entries[index].as_occupied_mut();
            e.prev = None;
            e.next = old_head;
        }

        match old_head {
            Some(h) => self.entries[h].as_occupied_mut().prev = Some(index),
            // First entry: it is also the eldest.
            None => self.entries_tail = Some(index),
        }
        self.entries_head = Some(index);
    }

    /// Find an available empty slot, or make one if necessary.
    fn find_empty(&mut self) -> usize {
        if let Some(e) = self.empty_head {
            self.empty_head = self.entries[e].as_empty().next_empty;
            return e;
        }

        self.entries
            .push(MapEntry::Empty(EmptyEntry { next_empty: None }));
        self.entries.len() - 1
    }

    /// Unlink a slot and put it on the free list.  The index map is the caller's problem.
    fn become_empty(&mut self, index: usize) -> (K, V) {
        self.unlink_index(index);
        let mut old = MapEntry::Empty(EmptyEntry {
            next_empty: self.empty_head,
        });
        std::mem::swap(&mut old, &mut self.entries[index]);
        self.empty_head = Some(index);
        match old {
            MapEntry::Occupied(OccupiedEntry { key, item, .. }) => (key, item),
            _ => panic!("Should have been occupied"),
        }
    }

    /// Add a new entry at the newest end.
    ///
    /// If the key is already present, the map is left untouched and the value is handed back.
    pub fn add(&mut self, key: K, value: V) -> Result<(), V> {
        if self.index.contains_key(&key) {
            return Err(value);
        }

        let ind = self.find_empty();
        self.entries[ind] = MapEntry::Occupied(OccupiedEntry {
            key: key.clone(),
            item: value,
            prev: None,
            next: None,
        });
        self.link_at_head(ind);
        self.index.insert(key, ind);
        Ok(())
    }

    /// Move an existing key to the newest end without touching its value.  Returns whether the key was present.
    pub fn reinsert<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let ind = match self.index.get(key) {
            Some(&i) => i,
            None => return false,
        };

        if Some(ind) != self.entries_head {
            self.unlink_index(ind);
            self.link_at_head(ind);
        }
        true
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let ind = *self.index.get(key)?;
        Some(&self.entries[ind].as_occupied().item)
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let ind = *self.index.get(key)?;
        Some(&mut self.entries[ind].as_occupied_mut().item)
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let ind = self.index.remove(key)?;
        Some(self.become_empty(ind).1)
    }

    /// Peek at the value which has gone longest without being (re)inserted.
    pub fn eldest(&self) -> Option<&V> {
        let t = self.entries_tail?;
        Some(&self.entries[t].as_occupied().item)
    }

    pub fn eldest_key(&self) -> Option<&K> {
        let t = self.entries_tail?;
        Some(&self.entries[t].as_occupied().key)
    }

    pub fn remove_eldest(&mut self) -> Option<(K, V)> {
        let t = self.entries_tail?;
        let (key, item) = self.become_empty(t);
        self.index.remove(&key);
        Some((key, item))
    }

    /// Drop every entry, including the free list.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
        self.entries_head = None;
        self.entries_tail = None;
        self.empty_head = None;
    }

    /// Iterator visiting entries from eldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        let mut ind = self.entries_tail;
        std::iter::from_fn(move || {
            let cur = ind?;
            let ret = self.entries[cur].as_occupied();
            ind = ret.prev;
            Some((&ret.key, &ret.item))
        })
    }
}
