//! The single dynamically-typed storage cell every container slot and
//! every `ref` field reduces to.
//!
//! The original C++ decoder reaches for `ArraySchema<char*>` /
//! `MapSchema<char*>` as a common representation it type-puns every
//! concrete element type through (see `ArraySchemaTypes.hpp`:
//! `(ArraySchema<char*> *)this->arrayOfSchemas`) so that one generic
//! decode routine can operate on a container regardless of what it
//! actually holds. `Elem` is the safe Rust analog of that pun: one enum
//! wide enough to represent any wire-kind's storage, used uniformly by
//! [`crate::container::ArrayContainer`] and [`crate::container::MapContainer`].
//! A given field's container only ever holds one variant in practice,
//! guaranteed by the field table's declared kind, not by the type system.

use crate::schema_object::SchemaObject;
use std::fmt::{self, Debug, Formatter};

pub enum Elem {
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    /// Tagged variable-width `number`, normalized to `f64` (spec §4.1/§9).
    Number(f64),
    Str(String),
    /// A nested schema instance, or an empty slot (`NIL`/not-yet-decoded).
    Schema(Option<Box<dyn SchemaObject>>),
}

impl Debug for Elem {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Elem::Bool(v) => write!(f, "Bool({v:?})"),
            Elem::I8(v) => write!(f, "I8({v:?})"),
            Elem::U8(v) => write!(f, "U8({v:?})"),
            Elem::I16(v) => write!(f, "I16({v:?})"),
            Elem::U16(v) => write!(f, "U16({v:?})"),
            Elem::I32(v) => write!(f, "I32({v:?})"),
            Elem::U32(v) => write!(f, "U32({v:?})"),
            Elem::I64(v) => write!(f, "I64({v:?})"),
            Elem::U64(v) => write!(f, "U64({v:?})"),
            Elem::F32(v) => write!(f, "F32({v:?})"),
            Elem::F64(v) => write!(f, "F64({v:?})"),
            Elem::Number(v) => write!(f, "Number({v:?})"),
            Elem::Str(v) => write!(f, "Str({v:?})"),
            Elem::Schema(Some(_)) => write!(f, "Schema(Some(..))"),
            Elem::Schema(None) => write!(f, "Schema(None)"),
        }
    }
}

impl Elem {
    pub fn is_nil(&self) -> bool {
        matches!(self, Elem::Schema(None))
    }

    pub fn as_schema(&self) -> Option<&dyn SchemaObject> {
        match self {
            Elem::Schema(Some(s)) => Some(s.as_ref()),
            _ => None,
        }
    }

    pub fn as_schema_mut(&mut self) -> Option<&mut (dyn SchemaObject + 'static)> {
        match self {
            Elem::Schema(Some(s)) => Some(s.as_mut()),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match *self {
            Elem::Number(v) => Some(v),
            Elem::F32(v) => Some(v as f64),
            Elem::F64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Elem::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Pull this cell's value out for reuse at another slot, matching
    /// spec §4.3.b's "take the element at `from_index` from the current
    /// sequence": a schema child's identity must move (only one slot may
    /// own the `Box`), so the source cell is left holding `Schema(None)`;
    /// every other variant is trivially `Copy`/cheap to clone, so the
    /// source cell is left with an identical copy rather than a hole —
    /// an array has no "empty primitive" to backfill with.
    pub fn take_for_move(&mut self) -> Elem {
        match self {
            Elem::Schema(opt) => Elem::Schema(opt.take()),
            Elem::Bool(v) => Elem::Bool(*v),
            Elem::I8(v) => Elem::I8(*v),
            Elem::U8(v) => Elem::U8(*v),
            Elem::I16(v) => Elem::I16(*v),
            Elem::U16(v) => Elem::U16(*v),
            Elem::I32(v) => Elem::I32(*v),
            Elem::U32(v) => Elem::U32(*v),
            Elem::I64(v) => Elem::I64(*v),
            Elem::U64(v) => Elem::U64(*v),
            Elem::F32(v) => Elem::F32(*v),
            Elem::F64(v) => Elem::F64(*v),
            Elem::Number(v) => Elem::Number(*v),
            Elem::Str(v) => Elem::Str(v.clone()),
        }
    }
}
