//! Insertion-order-preserving, string-keyed container (spec §4.3.c).
//! colyseus's `MapSchema<T>` backs onto an ordered map so that index-change
//! hints — which refer to a key's ordinal position in a *snapshot* of the
//! map taken before the current patch, not anything stable across patches —
//! can be resolved; [`indexmap::IndexMap`] is the direct Rust equivalent
//! (also reached for by other codecs in this pack for the same reason:
//! plain insertion order with O(1) key lookup).

use crate::schema_object::fire_on_remove;
use crate::value::Elem;
use indexmap::IndexMap;

type Listener = Box<dyn FnMut(&MapContainer, &Elem, &str)>;

#[derive(Default)]
pub struct MapContainer {
    entries: IndexMap<String, Elem>,
    on_add: Option<Listener>,
    on_change: Option<Listener>,
    on_remove: Option<Listener>,
}

impl MapContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Elem> {
        self.entries.get(key)
    }

    /// Raw mutable access, bypassing `on_add`/`on_change`. Used internally by
    /// the reconciler to reach into an already-present schema child before
    /// issuing the record-completing [`MapContainer::put`] call that fires
    /// listeners.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Elem> {
        self.entries.get_mut(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Elem)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// A snapshot of the current insertion order, taken once before a
    /// patch's per-entry loop starts (spec §4.3.c: `INDEX_CHANGE` and the
    /// compact "map index" key form both resolve against *this* snapshot,
    /// not the live map, which may have already been mutated earlier in
    /// the same record).
    pub fn keys_snapshot(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn set_on_add(&mut self, cb: Listener) {
        self.on_add = Some(cb);
    }

    pub fn set_on_change(&mut self, cb: Listener) {
        self.on_change = Some(cb);
    }

    pub fn set_on_remove(&mut self, cb: Listener) {
        self.on_remove = Some(cb);
    }

    /// Write `value` at `new_key`. When `rename_from` names a still-bound
    /// key other than `new_key`, that binding is relocated first —
    /// preserving its ordinal position — so a rename plus a same-record
    /// value update lands the renamed entry exactly where the old key sat
    /// (spec §8 scenario 6). `is_new` selects `on_add` vs `on_change`,
    /// computed by the reconciler's classification rule rather than
    /// inferred from whether `new_key` already existed.
    pub fn put(&mut self, new_key: &str, rename_from: Option<&str>, value: Elem, is_new: bool) {
        if let Some(old_key) = rename_from {
            if old_key != new_key {
                if let Some(index) = self.entries.get_index_of(old_key) {
                    if let Some(existing) = self.entries.shift_remove(old_key) {
                        let index = index.min(self.entries.len());
                        self.entries.shift_insert(index, new_key.to_string(), existing);
                    }
                }
            }
        }
        self.entries.insert(new_key.to_string(), value);
        self.fire(new_key, if is_new { Event::Add } else { Event::Change });
    }

    /// Convenience wrapper over [`MapContainer::put`] for callers (and
    /// tests) that only ever add fresh, unrenamed keys.
    pub fn set(&mut self, key: &str, value: Elem) {
        let is_new = !self.entries.contains_key(key);
        self.put(key, None, value, is_new);
    }

    /// Remove whichever binding sits at `key` without firing any
    /// listener — used when the caller (the reconciler, on a `NIL`
    /// mid-record) has already decided to fire `on_remove` itself with
    /// the element it extracted, and just needs the stale binding gone.
    pub fn take_silently(&mut self, key: &str) -> Option<Elem> {
        self.entries.shift_remove(key)
    }

    /// Fire the `on_remove` listener only, without touching the map —
    /// paired with [`MapContainer::take_silently`].
    pub fn notify_removed(&mut self, key: &str, elem: &Elem) {
        self.fire_removed(key, elem);
    }

    /// Erase `key`, firing the element's own `on_remove` (if it is a
    /// schema instance) and then the container's `on_remove` listener.
    pub fn remove(&mut self, key: &str) {
        if let Some(mut removed) = self.entries.shift_remove(key) {
            if let Some(child) = removed.as_schema_mut() {
                fire_on_remove(child);
            }
            self.fire_removed(key, &removed);
        }
    }

    pub fn remove_all(&mut self) {
        let keys: Vec<String> = self.entries.keys().cloned().collect();
        for key in keys {
            self.remove(&key);
        }
    }

    fn fire(&mut self, key: &str, event: Event) {
        let slot = match event {
            Event::Add => &mut self.on_add,
            Event::Change => &mut self.on_change,
        };
        if let Some(mut cb) = slot.take() {
            cb(self, &self.entries[key], key);
            let slot = match event {
                Event::Add => &mut self.on_add,
                Event::Change => &mut self.on_change,
            };
            *slot = Some(cb);
        }
    }

    fn fire_removed(&mut self, key: &str, elem: &Elem) {
        if let Some(mut cb) = self.on_remove.take() {
            cb(self, elem, key);
            self.on_remove = Some(cb);
        }
    }
}

enum Event {
    Add,
    Change,
}
