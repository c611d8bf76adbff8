//! Open-addressed hash table for the Dict value.
//!
//! Parallel (state, hash, key, value) arrays with linear probing and
//! tombstones. Slot order is observable: iteration opcodes walk slots
//! and skip empties, carrying the slot offset in the Index cursor.
//!
//! Key hashing and equality are deep (structural) and may need to read
//! other heap objects, so operations take the `Heap` explicitly. The heap
//! hands the table out by value during mutation (`Heap::with_dict_mut`)
//! precisely so these borrows never alias.

use crate::heap::Heap;
use crate::value::{Value, value_eq, value_hash};

const EMPTY: u8 = 0;
const FULL: u8 = 1;
const TOMB: u8 = 2;

const MIN_CAP: usize = 8;

#[derive(Debug, Clone, Default)]
pub struct Dict {
    state: Vec<u8>,
    hashes: Vec<u64>,
    keys: Vec<Value>,
    values: Vec<Value>,
    count: usize,
    used: usize,
    /// Default consulted on subscript miss; called if callable.
    pub dflt: Option<Box<Value>>,
}

impl Dict {
    pub fn new() -> Self {
        Dict::default()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of slots; the valid range of iteration offsets.
    pub fn capacity(&self) -> usize {
        self.state.len()
    }

    /// The (key, value) stored at a slot, if the slot is full. Used by
    /// the iteration opcodes.
    pub fn slot(&self, i: usize) -> Option<(&Value, &Value)> {
        (i < self.state.len() && self.state[i] == FULL)
            .then(|| (&self.keys[i], &self.values[i]))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        (0..self.state.len()).filter_map(|i| self.slot(i))
    }

    fn probe(&self, heap: &Heap, key: &Value, hash: u64) -> Result<usize, usize> {
        debug_assert!(!self.state.is_empty());
        let mask = self.state.len() - 1;
        let mut i = (hash as usize) & mask;
        let mut first_tomb = None;
        loop {
            match self.state[i] {
                EMPTY => return Err(first_tomb.unwrap_or(i)),
                TOMB => {
                    first_tomb.get_or_insert(i);
                }
                _ => {
                    if self.hashes[i] == hash && value_eq(heap, &self.keys[i], key) {
                        return Ok(i);
                    }
                }
            }
            i = (i + 1) & mask;
        }
    }

    pub fn get<'a>(&'a self, heap: &Heap, key: &Value) -> Option<&'a Value> {
        if self.count == 0 {
            return None;
        }
        let hash = value_hash(heap, key);
        self.probe(heap, key, hash).ok().map(|i| &self.values[i])
    }

    pub fn contains(&self, heap: &Heap, key: &Value) -> bool {
        self.get(heap, key).is_some()
    }

    /// Insert or replace. Returns the previous value if the key was
    /// present.
    pub fn insert(&mut self, heap: &Heap, key: Value, value: Value) -> Option<Value> {
        self.reserve(heap);
        let hash = value_hash(heap, &key);
        match self.probe(heap, &key, hash) {
            Ok(i) => Some(std::mem::replace(&mut self.values[i], value)),
            Err(i) => {
                if self.state[i] == EMPTY {
                    self.used += 1;
                }
                self.state[i] = FULL;
                self.hashes[i] = hash;
                self.keys[i] = key;
                self.values[i] = value;
                self.count += 1;
                None
            }
        }
    }

    pub fn remove(&mut self, heap: &Heap, key: &Value) -> Option<Value> {
        if self.count == 0 {
            return None;
        }
        let hash = value_hash(heap, key);
        let i = self.probe(heap, key, hash).ok()?;
        self.state[i] = TOMB;
        self.keys[i] = Value::nil();
        self.count -= 1;
        Some(std::mem::replace(&mut self.values[i], Value::nil()))
    }

    /// Keys in slot order, cloned out.
    pub fn keys(&self) -> Vec<Value> {
        self.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.iter().map(|(_, v)| v.clone()).collect()
    }

    fn reserve(&mut self, _heap: &Heap) {
        if self.state.is_empty() {
            self.rehash(MIN_CAP);
        } else if (self.used + 1) * 4 > self.state.len() * 3 {
            let cap = if self.count * 2 >= self.used {
                self.state.len() * 2
            } else {
                // Mostly tombstones: rehash in place.
                self.state.len()
            };
            self.rehash(cap);
        }
    }

    /// Rebuild at `cap` slots using the stored hashes.
    fn rehash(&mut self, cap: usize) {
        let old_state = std::mem::replace(&mut self.state, vec![EMPTY; cap]);
        let old_hashes = std::mem::replace(&mut self.hashes, vec![0; cap]);
        let old_keys = std::mem::replace(&mut self.keys, vec![Value::nil(); cap]);
        let old_values = std::mem::replace(&mut self.values, vec![Value::nil(); cap]);
        self.count = 0;
        self.used = 0;
        let mask = cap - 1;
        for i in 0..old_state.len() {
            if old_state[i] != FULL {
                continue;
            }
            let hash = old_hashes[i];
            let mut j = (hash as usize) & mask;
            while self.state[j] == FULL {
                j = (j + 1) & mask;
            }
            self.state[j] = FULL;
            self.hashes[j] = hash;
            self.keys[j] = old_keys[i].clone();
            self.values[j] = old_values[i].clone();
            self.count += 1;
            self.used += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let heap = Heap::new();
        let mut d = Dict::new();
        assert!(d.insert(&heap, Value::str("a"), Value::int(1)).is_none());
        assert!(d.insert(&heap, Value::int(2), Value::str("b")).is_none());
        assert_eq!(d.len(), 2);

        match d.get(&heap, &Value::str("a")).map(|v| &v.raw) {
            Some(crate::value::Raw::Int(1)) => {}
            other => panic!("expected 1, got {other:?}"),
        }

        let old = d.insert(&heap, Value::str("a"), Value::int(9));
        assert!(old.is_some());
        assert_eq!(d.len(), 2);

        assert!(d.remove(&heap, &Value::str("a")).is_some());
        assert!(d.get(&heap, &Value::str("a")).is_none());
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn test_growth_keeps_entries() {
        let heap = Heap::new();
        let mut d = Dict::new();
        for i in 0..200 {
            d.insert(&heap, Value::int(i), Value::int(i * i));
        }
        assert_eq!(d.len(), 200);
        for i in 0..200 {
            let v = d.get(&heap, &Value::int(i)).expect("key survived growth");
            assert!(value_eq(&heap, v, &Value::int(i * i)));
        }
    }

    #[test]
    fn test_cross_numeric_keys_collide() {
        let heap = Heap::new();
        let mut d = Dict::new();
        d.insert(&heap, Value::int(3), Value::str("x"));
        // 3 and 3.0 are == so they are the same key.
        assert!(d.get(&heap, &Value::real(3.0)).is_some());
    }

    #[test]
    fn test_tombstone_reuse() {
        let heap = Heap::new();
        let mut d = Dict::new();
        for i in 0..50 {
            d.insert(&heap, Value::int(i), Value::int(i));
        }
        for i in 0..50 {
            d.remove(&heap, &Value::int(i));
        }
        assert_eq!(d.len(), 0);
        for i in 0..50 {
            d.insert(&heap, Value::int(i), Value::int(-i));
        }
        assert_eq!(d.len(), 50);
    }
}
