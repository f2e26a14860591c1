//! Ordered, zero-based, contiguous container (spec §4.3.b). Modeled on
//! colyseus's `ArraySchema<T>`, minus the C++ template parameter: every
//! element is an [`Elem`], and which variant is live in a given field is
//! pinned by that field's table entry rather than by `T`.

use crate::schema_object::fire_on_remove;
use crate::value::Elem;

type Listener = Box<dyn FnMut(&ArrayContainer, &Elem, usize)>;

#[derive(Default)]
pub struct ArrayContainer {
    elems: Vec<Elem>,
    on_add: Option<Listener>,
    on_change: Option<Listener>,
    on_remove: Option<Listener>,
}

impl ArrayContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.elems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Elem> {
        self.elems.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Elem> {
        self.elems.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Elem> {
        self.elems.iter()
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

    /// Move whichever element sits at `from` out of its slot, leaving a
    /// copy behind (spec §4.3.b: "take the element at `from_index` from
    /// the current sequence" — see [`Elem::take_for_move`] for why the
    /// source slot isn't left empty). `None` if `from` is out of bounds.
    pub fn take_for_move(&mut self, from: usize) -> Option<Elem> {
        self.elems.get_mut(from).map(Elem::take_for_move)
    }

    /// Write `value` at `index`, appending if `index == len()`. `is_new`
    /// selects which listener fires — computed by the reconciler from
    /// spec §4.3.b's classification rule, not inferred from `index` here,
    /// since a reused (moved) element can legitimately land at a fresh
    /// index without being "new". The reconciler has already rejected
    /// `index > len()` (spec §7 `InvalidSetAtIndex`) before calling this.
    pub fn set_at(&mut self, index: usize, value: Elem, is_new: bool) {
        if index == self.elems.len() {
            self.elems.push(value);
        } else {
            self.elems[index] = value;
        }
        self.fire(index, if is_new { Event::Add } else { Event::Change });
    }

    /// Shrink to `new_len`, firing `on_remove` for every discarded tail
    /// element (and, recursively, for any schema children it owns), in
    /// ascending index order, before any per-change record in the same
    /// patch is applied — spec §4.3.b's shrink-before-changes ordering.
    pub fn truncate(&mut self, new_len: usize) {
        if new_len >= self.elems.len() {
            return;
        }
        for index in new_len..self.elems.len() {
            let mut elem = std::mem::replace(&mut self.elems[index], Elem::Number(0.0));
            if let Some(child) = elem.as_schema_mut() {
                fire_on_remove(child);
            }
            self.fire_removed(index, &elem);
        }
        self.elems.truncate(new_len);
    }

    /// Fire `on_remove` for a single element in place (spec §4.3.b step 5:
    /// a `NIL` inside the per-change loop removes that element but, per
    /// the spec's own documented ambiguity, does not itself shrink the
    /// sequence — a later shrink pass or overwrite governs final length).
    pub fn notify_removed_in_place(&mut self, index: usize, elem: &Elem) {
        self.fire_removed(index, elem);
    }

    pub fn remove_all(&mut self) {
        self.truncate(0);
    }

    fn fire(&mut self, index: usize, event: Event) {
        let slot = match event {
            Event::Add => &mut self.on_add,
            Event::Change => &mut self.on_change,
        };
        if let Some(mut cb) = slot.take() {
            cb(self, &self.elems[index], index);
            let slot = match event {
                Event::Add => &mut self.on_add,
                Event::Change => &mut self.on_change,
            };
            *slot = Some(cb);
        }
    }

    fn fire_removed(&mut self, index: usize, elem: &Elem) {
        if let Some(mut cb) = self.on_remove.take() {
            cb(self, elem, index);
            self.on_remove = Some(cb);
        }
    }
}

enum Event {
    Add,
    Change,
}
