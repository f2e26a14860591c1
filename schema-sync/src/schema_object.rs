//! Field-table metadata and the `SchemaObject` trait every `#[derive(Schema)]`
//! type implements (spec §3/§4.2).
//!
//! binschema's analog is `KnownSchema` (see
//! `examples/gretchenfrage-notminecraft/binschema/src/known_schema.rs`):
//! a trait a derive macro implements so generic coder code can walk a type's
//! shape without the type itself knowing about the wire format. `SchemaObject`
//! plays the same role here, but the shape it exposes is a dense field table
//! keyed by wire index rather than a self-describing schema tree, since the
//! colyseus wire format has no self-describing type information at all —
//! the field table is the only thing standing between a field index byte and
//! a concrete Rust field.
//!
//! The C++ original walks a *virtual* override chain: each subtype in an
//! inheritance chain overrides only the accessors for fields it declares, and
//! falls through to the base class's `return 0`/`return ""` default for
//! everything else (see `InheritedTypes.hpp`). `#[derive(Schema)]` flattens
//! that chain into one generated match per accessor, covering every field the
//! type owns including inherited ones, so the fallback default below should
//! never actually execute for correctly generated code — it exists as a
//! guard against a field table/accessor mismatch, not a feature.

use crate::container::{ArrayContainer, MapContainer};
use std::any::{Any, TypeId};

/// The wire-level shape of one field, independent of how it is stored on the
/// Rust side. Sixteen variants: thirteen primitive forms plus the three
/// structural forms (`ref`, `array`, `map`) from spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireKind {
    String,
    Boolean,
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Float32,
    Float64,
    Number,
    Ref,
    Array,
    Map,
}

impl WireKind {
    /// Lowercase wire-kind name for trace lines (SPEC_FULL §10.2's
    /// `field 3 (x) = number` shape).
    pub fn label(self) -> &'static str {
        match self {
            WireKind::String => "string",
            WireKind::Boolean => "boolean",
            WireKind::Int8 => "int8",
            WireKind::Uint8 => "uint8",
            WireKind::Int16 => "int16",
            WireKind::Uint16 => "uint16",
            WireKind::Int32 => "int32",
            WireKind::Uint32 => "uint32",
            WireKind::Int64 => "int64",
            WireKind::Uint64 => "uint64",
            WireKind::Float32 => "float32",
            WireKind::Float64 => "float64",
            WireKind::Number => "number",
            WireKind::Ref => "ref",
            WireKind::Array => "array",
            WireKind::Map => "map",
        }
    }
}

/// One row of a schema type's field table: the dense field index is the
/// row's position in the `FieldTable` slice, not a member of this struct.
pub struct FieldDef {
    pub name: &'static str,
    pub kind: WireKind,
    /// For `Array`/`Map`, the wire-kind of each element/value, when it is a
    /// primitive rather than a nested schema.
    pub child_primitive: Option<WireKind>,
    /// For `Ref`/`Array`/`Map` of schema type, the declared child schema's
    /// identity, used to look up a constructor through [`SchemaObject::factory`].
    pub child_schema: Option<TypeId>,
}

pub type FieldTable = &'static [FieldDef];

/// A decoded, mutable schema instance. Implemented by `#[derive(Schema)]`
/// types; consumed by [`crate::reconciler::decode`].
pub trait SchemaObject: Any {
    fn field_table(&self) -> FieldTable;

    /// Construct a blank instance of the schema type identified by `identity`,
    /// if this type's factory knows how to build one. Mirrors the C++
    /// factory's `createInstance(unsigned char typeId)`, but keyed by
    /// declared field identity (`TypeId`) rather than a registered small
    /// integer, since Rust has no stable equivalent of RTTI type codes to
    /// serialize — the identity never crosses the wire, only the field index
    /// does, and the field table already pins each `ref`/container field to
    /// exactly one declared child identity.
    fn factory(&self, identity: TypeId) -> Option<Box<dyn SchemaObject>>;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    /// Unbox into `Box<dyn Any>` so a caller holding only `Box<dyn SchemaObject>`
    /// can `downcast` to the concrete child type the factory built (object-safe
    /// since `self: Box<Self>` only appears behind the box).
    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    fn get_bool(&self, field: usize) -> bool {
        unreachable_field(field)
    }
    fn set_bool(&mut self, field: usize, _value: bool) {
        unreachable_field(field)
    }
    fn get_i8(&self, field: usize) -> i8 {
        unreachable_field(field)
    }
    fn set_i8(&mut self, field: usize, _value: i8) {
        unreachable_field(field)
    }
    fn get_u8(&self, field: usize) -> u8 {
        unreachable_field(field)
    }
    fn set_u8(&mut self, field: usize, _value: u8) {
        unreachable_field(field)
    }
    fn get_i16(&self, field: usize) -> i16 {
        unreachable_field(field)
    }
    fn set_i16(&mut self, field: usize, _value: i16) {
        unreachable_field(field)
    }
    fn get_u16(&self, field: usize) -> u16 {
        unreachable_field(field)
    }
    fn set_u16(&mut self, field: usize, _value: u16) {
        unreachable_field(field)
    }
    fn get_i32(&self, field: usize) -> i32 {
        unreachable_field(field)
    }
    fn set_i32(&mut self, field: usize, _value: i32) {
        unreachable_field(field)
    }
    fn get_u32(&self, field: usize) -> u32 {
        unreachable_field(field)
    }
    fn set_u32(&mut self, field: usize, _value: u32) {
        unreachable_field(field)
    }
    fn get_i64(&self, field: usize) -> i64 {
        unreachable_field(field)
    }
    fn set_i64(&mut self, field: usize, _value: i64) {
        unreachable_field(field)
    }
    fn get_u64(&self, field: usize) -> u64 {
        unreachable_field(field)
    }
    fn set_u64(&mut self, field: usize, _value: u64) {
        unreachable_field(field)
    }
    fn get_f32(&self, field: usize) -> f32 {
        unreachable_field(field)
    }
    fn set_f32(&mut self, field: usize, _value: f32) {
        unreachable_field(field)
    }
    fn get_f64(&self, field: usize) -> f64 {
        unreachable_field(field)
    }
    fn set_f64(&mut self, field: usize, _value: f64) {
        unreachable_field(field)
    }
    fn get_number(&self, field: usize) -> f64 {
        unreachable_field(field)
    }
    fn set_number(&mut self, field: usize, _value: f64) {
        unreachable_field(field)
    }
    fn get_string(&self, field: usize) -> String {
        unreachable_field(field)
    }
    fn set_string(&mut self, field: usize, _value: String) {
        unreachable_field(field)
    }

    /// Replace field `field`'s child instance, returning whatever was there
    /// before (used by the reconciler to decide add-vs-change, and to let a
    /// displaced child finish out any pending listener bookkeeping).
    fn take_ref(&mut self, field: usize) -> Option<Box<dyn SchemaObject>> {
        unreachable_field(field)
    }
    fn put_ref(&mut self, field: usize, value: Option<Box<dyn SchemaObject>>) {
        let _ = value;
        unreachable_field(field)
    }
    fn get_ref(&self, field: usize) -> Option<&dyn SchemaObject> {
        unreachable_field(field)
    }

    fn get_array_mut(&mut self, field: usize) -> &mut ArrayContainer {
        unreachable_field(field)
    }
    fn get_array(&self, field: usize) -> &ArrayContainer {
        unreachable_field(field)
    }
    fn get_map_mut(&mut self, field: usize) -> &mut MapContainer {
        unreachable_field(field)
    }
    fn get_map(&self, field: usize) -> &MapContainer {
        unreachable_field(field)
    }

    /// Called after every field write that produced a visible change,
    /// batched per record the way spec §5 requires (one call per decoded
    /// structure, not per field).
    fn on_change_listener(&mut self) -> &mut Option<Box<dyn FnMut(&dyn SchemaObject, &[DataChange])>>;
    /// Called once, when this instance itself is detached from its parent
    /// (an enclosing `ref`/array/map slot is cleared or overwritten).
    fn on_remove_listener(&mut self) -> &mut Option<Box<dyn FnMut(&dyn SchemaObject)>>;
}

/// Storage for a schema instance's two listener slots. A `#[derive(Schema)]`
/// struct embeds one field of this type (since a derive macro cannot inject
/// fields into the struct it's attached to) and the derive wires
/// `on_change_listener`/`on_remove_listener` to it.
#[derive(Default)]
pub struct Listeners {
    on_change: Option<Box<dyn FnMut(&dyn SchemaObject, &[DataChange])>>,
    on_remove: Option<Box<dyn FnMut(&dyn SchemaObject)>>,
}

impl Listeners {
    pub fn on_change_mut(&mut self) -> &mut Option<Box<dyn FnMut(&dyn SchemaObject, &[DataChange])>> {
        &mut self.on_change
    }

    pub fn on_remove_mut(&mut self) -> &mut Option<Box<dyn FnMut(&dyn SchemaObject)>> {
        &mut self.on_remove
    }
}

fn unreachable_field<T>(field: usize) -> T {
    unreachable!(
        "field index {field} missing from a #[derive(Schema)] accessor match; \
         the field table and the generated accessors have drifted out of sync"
    )
}

/// One changed field, reported without its value: listeners read the new
/// value back off the instance through its typed accessor (spec §6), the
/// same way the C++ `DataChange` carries only a field name plus a `Schema::`
/// tagged union value — we drop the redundant value copy since the accessor
/// is already one call away and avoids duplicating the `Elem` representation
/// inside every change record.
#[derive(Debug, Clone, Copy)]
pub struct DataChange {
    pub field: &'static str,
}

/// Fire `instance`'s on_change listener, if any, with the batched changes
/// for one decoded record. Takes the listener out of its slot before
/// invoking it so the callback can observe `instance` by shared reference
/// without aliasing the `Option` it's stored in.
pub fn fire_on_change(instance: &mut dyn SchemaObject, changes: &[DataChange]) {
    if changes.is_empty() {
        return;
    }
    if let Some(mut cb) = instance.on_change_listener().take() {
        cb(instance, changes);
        *instance.on_change_listener() = Some(cb);
    }
}

/// Fire `instance`'s on_remove listener, if any, then recurse into any
/// `ref`/array/map fields it owns so grandchildren also see their removal
/// (spec §6: removal fires bottom-up through whatever was still attached).
pub fn fire_on_remove(instance: &mut dyn SchemaObject) {
    for (index, field) in instance.field_table().iter().enumerate() {
        match field.kind {
            WireKind::Ref => {
                if let Some(child) = instance.take_ref(index) {
                    let mut child = child;
                    fire_on_remove(child.as_mut());
                }
            }
            WireKind::Array => {
                instance.get_array_mut(index).remove_all();
            }
            WireKind::Map => {
                instance.get_map_mut(index).remove_all();
            }
            _ => {}
        }
    }
    if let Some(mut cb) = instance.on_remove_listener().take() {
        cb(instance);
        *instance.on_remove_listener() = Some(cb);
    }
}
