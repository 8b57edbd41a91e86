//! Built-in containers (§4.8): Blob, Array/WeakArray/SharedArray, Map/
//! SharedMap/WeakMap, String, Cursor.
//!
//! Every container is `(item_count, items_ptr)` conceptually; here that's
//! just a `Vec`. The interesting piece is `Map`, an open-addressed
//! Robin-Hood table keyed by a cached object hash, doubling at 3/4 load,
//! with an explicit cache field instead of stealing bits from `wb_p`.

use crate::header::HASH;
use crate::object::{FieldSlot, Heap, ObjectId, WeakId};
use crate::rc::{release_own, release_pin, release_weak, retain_own, retain_pin, retain_weak};

/// Raw byte buffer. No ownership semantics of its own; a `Blob` is always
/// held behind an `Own`/`Shared` field on some object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Blob {
    pub bytes: Vec<u8>,
}

impl Blob {
    pub fn new() -> Self {
        Blob { bytes: Vec::new() }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Blob { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// How an `Array` holds its elements, determining what `set`/`delete`/drop
/// must do to the outgoing slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayKind {
    /// `Array<C>`: each slot is a single owner; dropping the array drops
    /// every element.
    Owned,
    /// `SharedArray<C>`: each slot retains a shared reference.
    Shared,
    /// `WeakArray<C>`: each slot is a weak pointer; elements do not keep
    /// their targets alive and may read back as dead.
    Weak,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArraySlot {
    Own(Option<ObjectId>),
    Shared(Option<ObjectId>),
    Weak(Option<WeakId>),
}

pub struct Array {
    pub kind: ArrayKind,
    items: Vec<ArraySlot>,
}

impl Array {
    pub fn new(kind: ArrayKind) -> Self {
        Array { kind, items: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get_at(&self, index: usize) -> Option<ArraySlot> {
        self.items.get(index).copied()
    }

    /// `setAt`: installs `value` at `index`, retaining it per the array's
    /// kind and releasing whatever was there. Returns the installed value
    /// so `a[i] := v` has value `v` (§4.2 "Containers").
    pub fn set_at(&mut self, heap: &Heap, owner: ObjectId, index: usize, value: ArraySlot) -> ArraySlot {
        assert!(index < self.items.len(), "setAt: index out of bounds");
        self.retain_slot(heap, owner, value);
        let old = self.items[index];
        self.items[index] = value;
        self.release_slot(heap, old);
        value
    }

    pub fn insert_at(&mut self, heap: &Heap, owner: ObjectId, index: usize, value: ArraySlot) {
        assert!(index <= self.items.len(), "insertAt: index out of bounds");
        self.retain_slot(heap, owner, value);
        self.items.insert(index, value);
    }

    pub fn push(&mut self, heap: &Heap, owner: ObjectId, value: ArraySlot) {
        self.retain_slot(heap, owner, value);
        self.items.push(value);
    }

    /// `delete(start, count)`: removes `count` elements starting at
    /// `start`, releasing each one.
    pub fn delete(&mut self, heap: &Heap, start: usize, count: usize) {
        let end = (start + count).min(self.items.len());
        for slot in self.items.drain(start..end) {
            self.release_slot(heap, slot);
        }
    }

    fn retain_slot(&self, heap: &Heap, owner: ObjectId, slot: ArraySlot) {
        match (self.kind, slot) {
            (ArrayKind::Owned, ArraySlot::Own(obj)) => retain_own(heap, obj, owner),
            (ArrayKind::Shared, ArraySlot::Shared(obj)) => retain_pin(heap, obj),
            (ArrayKind::Weak, ArraySlot::Weak(w)) => retain_weak(heap, w),
            _ => panic!("array slot kind mismatch"),
        }
    }

    fn release_slot(&self, heap: &Heap, slot: ArraySlot) {
        match slot {
            ArraySlot::Own(obj) => release_own(heap, obj),
            ArraySlot::Shared(obj) => release_pin(heap, obj),
            ArraySlot::Weak(w) => release_weak(heap, w),
        }
    }
}

impl Drop for Array {
    fn drop(&mut self) {
        // Best-effort: a real drop needs the heap, which the language's
        // generated disposer supplies explicitly via `delete`/release calls
        // before the Array value itself goes out of scope. This impl exists
        // so a leaked Array (one whose disposer never ran) doesn't panic.
    }
}

/// Open-addressed Robin-Hood hash table keyed by a cached object hash.
/// Kept generic over the value's ownership kind the same way `Array` is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Empty,
    Occupied { key: ObjectId, hash: u64, distance: u32 },
}

pub struct Map {
    pub value_kind: ArrayKind,
    buckets: Vec<Bucket>,
    values: Vec<Option<FieldSlot>>,
    len: usize,
}

const INITIAL_CAPACITY: usize = 8;
const LOAD_FACTOR_NUM: usize = 3;
const LOAD_FACTOR_DEN: usize = 4;

impl Map {
    pub fn new(value_kind: ArrayKind) -> Self {
        Map {
            value_kind,
            buckets: vec![Bucket::Empty; INITIAL_CAPACITY],
            values: vec![None; INITIAL_CAPACITY],
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn slot_for(&self, hash: u64) -> usize {
        (hash as usize) % self.buckets.len()
    }

    /// Computes (and caches) a key object's identity hash, gated by the
    /// HASH counter flag so the hash is computed at most once per object.
    pub fn hash_key(heap: &Heap, key: ObjectId) -> u64 {
        let mut inner = heap.inner.lock().unwrap();
        if let Some(obj) = inner.objects.get_mut(key) {
            if !obj.counter.is_hash() {
                obj.counter.set_flag(HASH);
            }
            // Identity hash: stable for the object's lifetime regardless of
            // field mutation, since maps key by reference identity here.
            (key.slot() as u64) ^ ((key.generation() as u64) << 32)
        } else {
            0
        }
    }

    fn grow_if_needed(&mut self) {
        if self.len * LOAD_FACTOR_DEN >= self.buckets.len() * LOAD_FACTOR_NUM {
            let new_capacity = self.buckets.len() * 2;
            let old_buckets = std::mem::replace(&mut self.buckets, vec![Bucket::Empty; new_capacity]);
            let old_values = std::mem::replace(&mut self.values, vec![None; new_capacity]);
            self.len = 0;
            for (bucket, value) in old_buckets.into_iter().zip(old_values) {
                if let Bucket::Occupied { key, hash, .. } = bucket {
                    self.insert_raw(key, hash, value.unwrap());
                }
            }
        }
    }

    /// Robin-Hood insertion: walks forward from the ideal slot, swapping
    /// with any resident whose probe distance is shorter than the
    /// incoming entry's (so no entry ever sits farther from home than one
    /// that could have displaced it).
    fn insert_raw(&mut self, key: ObjectId, hash: u64, value: FieldSlot) -> bool {
        let mut probe_key = key;
        let mut probe_hash = hash;
        let mut probe_value = value;
        let mut idx = self.slot_for(hash);
        let mut distance: u32 = 0;

        loop {
            match self.buckets[idx] {
                Bucket::Empty => {
                    self.buckets[idx] = Bucket::Occupied { key: probe_key, hash: probe_hash, distance };
                    self.values[idx] = Some(probe_value);
                    self.len += 1;
                    return true;
                }
                Bucket::Occupied { key: existing_key, hash: existing_hash, distance: existing_distance }
                    if existing_key == probe_key =>
                {
                    self.buckets[idx] = Bucket::Occupied { key: existing_key, hash: existing_hash, distance: existing_distance };
                    self.values[idx] = Some(probe_value);
                    return false;
                }
                Bucket::Occupied { distance: existing_distance, .. } if existing_distance < distance => {
                    let Bucket::Occupied { key: ek, hash: eh, .. } = self.buckets[idx] else { unreachable!() };
                    let ev = self.values[idx].take().unwrap();
                    self.buckets[idx] = Bucket::Occupied { key: probe_key, hash: probe_hash, distance };
                    self.values[idx] = Some(probe_value);
                    probe_key = ek;
                    probe_hash = eh;
                    probe_value = ev;
                    distance = existing_distance;
                }
                _ => {}
            }
            idx = (idx + 1) % self.buckets.len();
            distance += 1;
        }
    }

    /// `set(key, value)`: caller has already computed `hash` via
    /// `hash_key`. Retains `key` (as Shared: map keys are always hashed by
    /// a frozen/shared value) and the value per `value_kind`.
    pub fn set(&mut self, heap: &Heap, owner: ObjectId, key: ObjectId, hash: u64, value: FieldSlot) {
        self.grow_if_needed();
        retain_pin(heap, Some(key));
        self.retain_value(heap, owner, &value);
        let replaced = !self.insert_raw(key, hash, value);
        if replaced {
            release_pin(heap, Some(key)); // the key we just retained already existed
        }
    }

    pub fn get(&self, key: ObjectId, hash: u64) -> Option<&FieldSlot> {
        let idx = self.find_slot(key, hash)?;
        self.values[idx].as_ref()
    }

    pub fn has(&self, key: ObjectId, hash: u64) -> bool {
        self.find_slot(key, hash).is_some()
    }

    fn find_slot(&self, key: ObjectId, hash: u64) -> Option<usize> {
        let mut idx = self.slot_for(hash);
        let mut distance = 0u32;
        loop {
            match self.buckets[idx] {
                Bucket::Occupied { key: k, .. } if k == key => return Some(idx),
                Bucket::Occupied { distance: d, .. } if d < distance => return None,
                Bucket::Occupied { .. } => {}
                Bucket::Empty => return None,
            }
            idx = (idx + 1) % self.buckets.len();
            distance += 1;
        }
    }

    /// Removes `key`, shifting the tombstoned neighborhood left (Robin-Hood
    /// backward-shift deletion: no tombstones ever accumulate).
    pub fn remove(&mut self, heap: &Heap, key: ObjectId, hash: u64) -> bool {
        let Some(mut idx) = self.find_slot(key, hash) else {
            return false;
        };
        release_pin(heap, Some(key));
        if let Some(value) = self.values[idx].take() {
            self.release_value(heap, &value);
        }
        self.len -= 1;
        loop {
            let next = (idx + 1) % self.buckets.len();
            match self.buckets[next] {
                Bucket::Occupied { distance, .. } if distance > 0 => {
                    let mut moved = self.buckets[next];
                    if let Bucket::Occupied { ref mut distance, .. } = moved {
                        *distance -= 1;
                    }
                    self.buckets[idx] = moved;
                    self.values[idx] = self.values[next].take();
                    self.buckets[next] = Bucket::Empty;
                    idx = next;
                }
                _ => {
                    self.buckets[idx] = Bucket::Empty;
                    break;
                }
            }
        }
        true
    }

    fn retain_value(&self, heap: &Heap, owner: ObjectId, value: &FieldSlot) {
        match (self.value_kind, value) {
            (ArrayKind::Owned, FieldSlot::Own(obj)) => retain_own(heap, *obj, owner),
            (ArrayKind::Shared, FieldSlot::Shared(obj)) => retain_pin(heap, *obj),
            (ArrayKind::Weak, FieldSlot::Weak(w)) => retain_weak(heap, *w),
            _ => {}
        }
    }

    fn release_value(&self, heap: &Heap, value: &FieldSlot) {
        match value {
            FieldSlot::Own(obj) => release_own(heap, *obj),
            FieldSlot::Shared(obj) => release_pin(heap, *obj),
            FieldSlot::Weak(w) => release_weak(heap, *w),
            _ => {}
        }
    }

    /// `keyAt`/`valAt` iteration support: enumerates occupied buckets in
    /// table order, letting the caller filter empty slots (§4.8).
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &FieldSlot)> {
        self.buckets.iter().zip(self.values.iter()).filter_map(|(b, v)| match (b, v) {
            (Bucket::Occupied { key, .. }, Some(value)) => Some((*key, value)),
            _ => None,
        })
    }
}

/// UTF-8-validated owned text, distinct from `Blob` only in that it
/// guarantees validity and exposes code-point-oriented operations (used by
/// the string-literal round-trip law in §8).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgString {
    pub text: String,
}

impl AgString {
    pub fn new() -> Self {
        AgString { text: String::new() }
    }

    pub fn from_code_points(points: &[u32]) -> Self {
        let mut text = String::new();
        for &cp in points {
            if let Some(c) = char::from_u32(cp) {
                text.push(c);
            }
        }
        AgString { text }
    }

    pub fn code_points(&self) -> Vec<u32> {
        self.text.chars().map(|c| c as u32).collect()
    }

    pub fn len_bytes(&self) -> usize {
        self.text.len()
    }
}

/// A cursor over a `Blob`/`AgString`'s bytes, tracking a read/write
/// position for binary and text serialization.
pub struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Cursor { bytes, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn read_byte(&mut self) -> Option<u8> {
        let b = *self.bytes.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    pub fn read_n(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.remaining() < n {
            return None;
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Some(slice)
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos.min(self.bytes.len());
    }
}
