//! The recursive patch-application algorithm (spec §4.3): reads one field
//! record after another off a [`Decoder`], routes each to the right typed
//! accessor by consulting the target's field table, and fires listeners as
//! it goes. Single-threaded, synchronous, never suspends mid-structure.

use crate::decoder::{Decoder, END_OF_STRUCTURE, INDEX_CHANGE, NIL};
use crate::do_if_err::DoIfErr;
use crate::error::{ensure, Result};
use crate::schema_object::{fire_on_change, fire_on_remove, DataChange, SchemaObject, WireKind};
use crate::trace::{trace_log, trace_pop, trace_push, Trace};
use crate::value::Elem;
use std::any::TypeId;

/// Apply one patch to `root` in place. `bytes` is the full patch; decoding
/// stops either at an explicit `END_OF_STRUCTURE` sentinel or at end of
/// input, whichever the root structure's record loop hits first (spec §8:
/// a well-formed top-level patch consumes every byte).
pub fn decode(root: &mut dyn SchemaObject, bytes: &[u8]) -> Result<()> {
    decode_with_trace(root, bytes, None)
}

/// As [`decode`], but also emits a one-line-per-field/container-operation
/// trace to `trace` when present (SPEC_FULL §10.2 — this crate's only
/// logging). The sink is threaded through every recursive call rather than
/// stored anywhere, so a trace-less call carries no extra state.
pub fn decode_with_trace(
    root: &mut dyn SchemaObject,
    bytes: &[u8],
    trace: Option<&mut dyn std::fmt::Write>,
) -> Result<()> {
    let mut decoder = Decoder::new(bytes);
    let mut trace = trace.map(Trace::new);
    decode_structure(root, &mut decoder, trace.as_mut())
}

/// Decode field records into `instance` until `END_OF_STRUCTURE` or input
/// end, batching the touched field names into one `on_change` call (spec
/// §5: listeners fire after the structure's own records are fully applied,
/// not per field).
fn decode_structure(
    instance: &mut dyn SchemaObject,
    decoder: &mut Decoder,
    mut trace: Option<&mut Trace<'_>>,
) -> Result<()> {
    let mut changes: Vec<DataChange> = Vec::new();
    loop {
        if decoder.is_finished() || decoder.eat_if(END_OF_STRUCTURE)? {
            break;
        }
        let field_index = decoder.decode_u8()? as usize;
        decode_field(instance, decoder, field_index, &mut changes, trace.as_deref_mut())
            .do_if_err(|| changes.clear())?;
    }
    fire_on_change(instance, &changes);
    Ok(())
}

fn decode_field(
    instance: &mut dyn SchemaObject,
    decoder: &mut Decoder,
    field_index: usize,
    changes: &mut Vec<DataChange>,
    mut trace: Option<&mut Trace<'_>>,
) -> Result<()> {
    let offset = decoder.position();
    let field = instance.field_table().get(field_index).ok_or_else(|| {
        crate::error::error!(UnknownFieldIndex, offset, None, "index {}", field_index)
    })?;
    let name = field.name;
    let kind = field.kind;
    let child_primitive = field.child_primitive;
    let child_schema = field.child_schema;

    trace_log!(trace, "field {} ({}) = {}", field_index, name, kind.label());

    let changed = match kind {
        WireKind::Boolean => {
            instance.set_bool(field_index, decoder.decode_bool()?);
            true
        }
        WireKind::Int8 => {
            instance.set_i8(field_index, decoder.decode_i8()?);
            true
        }
        WireKind::Uint8 => {
            instance.set_u8(field_index, decoder.decode_u8()?);
            true
        }
        WireKind::Int16 => {
            instance.set_i16(field_index, decoder.decode_i16()?);
            true
        }
        WireKind::Uint16 => {
            instance.set_u16(field_index, decoder.decode_u16()?);
            true
        }
        WireKind::Int32 => {
            instance.set_i32(field_index, decoder.decode_i32()?);
            true
        }
        WireKind::Uint32 => {
            instance.set_u32(field_index, decoder.decode_u32()?);
            true
        }
        WireKind::Int64 => {
            instance.set_i64(field_index, decoder.decode_i64()?);
            true
        }
        WireKind::Uint64 => {
            instance.set_u64(field_index, decoder.decode_u64()?);
            true
        }
        WireKind::Float32 => {
            instance.set_f32(field_index, decoder.decode_f32()?);
            true
        }
        WireKind::Float64 => {
            instance.set_f64(field_index, decoder.decode_f64()?);
            true
        }
        WireKind::Number => {
            instance.set_number(field_index, decoder.decode_number()?);
            true
        }
        WireKind::String => {
            instance.set_string(field_index, decoder.decode_string()?);
            true
        }
        WireKind::Ref => {
            decode_ref_field(instance, decoder, field_index, name, child_schema, offset, trace.as_deref_mut())?;
            true
        }
        // spec §4.3.b/§4.3.c: an array/map field is only marked changed when
        // its record actually carries changes/entries.
        WireKind::Array => decode_array_field(
            instance,
            decoder,
            field_index,
            child_primitive,
            child_schema,
            offset,
            trace.as_deref_mut(),
        )?,
        WireKind::Map => decode_map_field(
            instance,
            decoder,
            field_index,
            child_primitive,
            child_schema,
            trace.as_deref_mut(),
        )?,
    };
    if changed {
        changes.push(DataChange { field: name });
    }
    Ok(())
}

/// `ref` field: `NIL` detaches whatever was there (firing its on_remove
/// chain), otherwise build-or-reuse the child and recurse into it.
fn decode_ref_field(
    instance: &mut dyn SchemaObject,
    decoder: &mut Decoder,
    field_index: usize,
    field_name: &'static str,
    child_schema: Option<TypeId>,
    offset: usize,
    mut trace: Option<&mut Trace<'_>>,
) -> Result<()> {
    if decoder.eat_if(NIL)? {
        trace_log!(trace, "ref {} = nil", field_name);
        if let Some(mut previous) = instance.take_ref(field_index) {
            fire_on_remove(previous.as_mut());
        }
        return Ok(());
    }
    let identity = child_schema.ok_or_else(|| {
        crate::error::error!(
            FactoryMiss,
            offset,
            Some(field_name),
            "field has no declared child schema"
        )
    })?;
    let mut child = match instance.take_ref(field_index) {
        Some(existing) => existing,
        None => instance
            .factory(identity)
            .ok_or_else(|| crate::error::error!(FactoryMiss, offset, Some(field_name)))?,
    };
    trace_push!(trace, "ref {}", field_name);
    decode_structure(child.as_mut(), decoder, trace.as_deref_mut())?;
    trace_pop!(trace);
    instance.put_ref(field_index, Some(child));
    Ok(())
}

/// `array` field (spec §4.3.b). Reads `new_length` then `num_changes` as
/// two `number`s; shrinks (firing `on_remove` in ascending index order)
/// before the exactly-`num_changes`-long per-change loop runs.
fn decode_array_field(
    instance: &mut dyn SchemaObject,
    decoder: &mut Decoder,
    field_index: usize,
    child_primitive: Option<WireKind>,
    child_schema: Option<TypeId>,
    offset: usize,
    mut trace: Option<&mut Trace<'_>>,
) -> Result<bool> {
    let new_len = decoder.decode_number()? as usize;
    let num_changes = decoder.decode_number()? as usize;
    trace_log!(trace, "array len={} changes={}", new_len, num_changes);
    if new_len < instance.get_array_mut(field_index).len() {
        trace_log!(trace, "array truncate to {}", new_len);
        instance.get_array_mut(field_index).truncate(new_len);
    }
    let is_schema_child = child_schema.is_some();

    for _ in 0..num_changes {
        let new_index = decoder.decode_number()? as usize;

        // A redundant `u8` sentinel follows `INDEX_CHANGE` in the wire
        // format (preserved for compatibility with the original encoder,
        // which always emits it even though the peek already disambiguated
        // the byte — spec §4.1/§6). `from_index` is kept signed: the
        // wire's negative-fixint range can legally encode `-1` here (spec
        // §4.3.b step 2/3), distinct from "no index-change at all" —
        // decoding through the lossy `f64 as usize` cast used elsewhere
        // would saturate `-1.0` to `0` and misclassify the record.
        let from_index: Option<i64> = if decoder.eat_if(INDEX_CHANGE)? {
            decoder.decode_u8()?;
            Some(decoder.decode_number()? as i64)
        } else {
            None
        };

        let array_len = instance.get_array_mut(field_index).len();
        let change_offset = decoder.position();
        ensure!(
            new_index <= array_len,
            InvalidSetAtIndex,
            change_offset,
            None,
            "index {} is past the array's length {}",
            new_index,
            array_len,
        );

        // spec §4.3.b step 3: two distinct, both-reachable disjuncts — no
        // index-change at all (classified by whether `new_index` names a
        // currently-absent slot), or an index-change whose `from_index` is
        // the wire's `-1` sentinel.
        let mut is_new = match from_index {
            None => new_index >= array_len,
            Some(-1) => true,
            Some(_) => false,
        };

        let existing: Option<Elem> = if is_new && is_schema_child {
            None
        } else if let Some(from) = from_index.filter(|&f| f >= 0) {
            let from = from as usize;
            trace_log!(trace, "array[{}] move from {}", new_index, from);
            instance.get_array_mut(field_index).take_for_move(from)
        } else if from_index.is_none() {
            let mut taken = if new_index < array_len {
                instance.get_array_mut(field_index).take_for_move(new_index)
            } else {
                None
            };
            if is_schema_child && taken.as_ref().map_or(true, Elem::is_nil) {
                is_new = true;
                taken = None;
            }
            taken
        } else {
            // from_index == Some(-1) and this is a primitive slot (the
            // schema-child case already returned `None` above via the
            // `is_new && is_schema_child` branch): nothing to reuse.
            None
        };

        if decoder.eat_if(NIL)? {
            trace_log!(trace, "array[{}] remove", new_index);
            let mut removed = existing.unwrap_or(Elem::Schema(None));
            if let Some(child) = removed.as_schema_mut() {
                fire_on_remove(child);
            }
            // spec §4.3.b step 5: the slot is not explicitly cleared here —
            // a later shrink pass (or overwrite) governs final length.
            instance
                .get_array_mut(field_index)
                .notify_removed_in_place(new_index, &removed);
            continue;
        }

        let existing_box = match existing {
            Some(Elem::Schema(boxed)) => boxed,
            _ => None,
        };
        trace_log!(trace, "array[{}] {}", new_index, if is_new { "add" } else { "change" });
        let elem = decode_structural_or_primitive(
            instance,
            decoder,
            child_primitive,
            child_schema,
            existing_box,
            change_offset,
            trace.as_deref_mut(),
        )?;
        instance.get_array_mut(field_index).set_at(new_index, elem, is_new);
    }
    Ok(num_changes > 0)
}

/// `map` field (spec §4.3.c). Reads `length` as one `number`, snapshots the
/// current key order once, then runs up to `length` entries — breaking
/// early at end of input or `END_OF_STRUCTURE`, since (unlike `array`) a
/// map record has no terminator of its own beyond its declared count.
fn decode_map_field(
    instance: &mut dyn SchemaObject,
    decoder: &mut Decoder,
    field_index: usize,
    child_primitive: Option<WireKind>,
    child_schema: Option<TypeId>,
    mut trace: Option<&mut Trace<'_>>,
) -> Result<bool> {
    let length = decoder.decode_number()? as usize;
    trace_log!(trace, "map len={}", length);
    let previous_keys = instance.get_map_mut(field_index).keys_snapshot();

    for _ in 0..length {
        if decoder.is_finished() || decoder.peek_is(END_OF_STRUCTURE) {
            break;
        }

        // `previous_key` stays `""` unless an index-change record resolves
        // it to an actual (possibly itself empty) key, mirroring the source's
        // own initialize-to-empty-string convention — needed because the
        // classification below must tell "no index-change at all" apart
        // from "index-change present but `previous_key` happens to be ''".
        let mut had_index_change = false;
        let mut previous_key = String::new();
        if decoder.eat_if(INDEX_CHANGE)? {
            had_index_change = true;
            let ordinal = decoder.decode_number()? as usize;
            previous_key = previous_keys.get(ordinal).cloned().unwrap_or_default();
        }

        let mut has_map_index = false;
        let new_key = if decoder.peek_is_number_prefix() {
            has_map_index = true;
            let ordinal = decoder.decode_number()? as usize;
            previous_keys.get(ordinal).cloned().unwrap_or_default()
        } else {
            decoder.decode_string()?
        };
        let entry_offset = decoder.position();

        let key_absent = !instance.get_map_mut(field_index).contains_key(&new_key);
        // spec §4.3.c step 3: two distinct, both-reachable disjuncts — no
        // index-change at all (classified by key presence), or an
        // index-change whose resolved `previous_key` is empty together
        // with the compact map-index key form.
        let is_new = if had_index_change {
            has_map_index && previous_key.is_empty()
        } else {
            key_absent
        };

        let renamed = had_index_change && !previous_key.is_empty() && previous_key != new_key;
        let lookup_key = if previous_key.is_empty() { new_key.clone() } else { previous_key.clone() };
        let existing: Option<Box<dyn SchemaObject>> = if is_new {
            None
        } else {
            match instance.get_map_mut(field_index).get_mut(&lookup_key) {
                Some(Elem::Schema(inner)) => inner.take(),
                _ => None,
            }
        };

        if decoder.eat_if(NIL)? {
            trace_log!(trace, "map remove {:?}", new_key);
            let map = instance.get_map_mut(field_index);
            if let Some(mut child) = existing {
                fire_on_remove(child.as_mut());
                map.take_silently(&lookup_key);
                map.notify_removed(&new_key, &Elem::Schema(Some(child)));
            } else {
                let removed = map.take_silently(&lookup_key).unwrap_or(Elem::Schema(None));
                map.notify_removed(&new_key, &removed);
            }
            continue;
        }

        if renamed {
            trace_log!(trace, "map rename {:?} -> {:?}", previous_key, new_key);
        } else {
            trace_log!(trace, "map {} {:?}", if is_new { "add" } else { "change" }, new_key);
        }
        let elem = decode_structural_or_primitive(
            instance,
            decoder,
            child_primitive,
            child_schema,
            existing,
            entry_offset,
            trace.as_deref_mut(),
        )?;
        let rename_from = renamed.then(|| previous_key.as_str());
        instance
            .get_map_mut(field_index)
            .put(&new_key, rename_from, elem, is_new);
    }
    Ok(length > 0)
}

/// Decode one array-element or map-value payload shared by §4.3.b step 6
/// and §4.3.c step 6: a schema-typed slot reuses `existing` (or asks the
/// owning instance's factory for a fresh one) and recurses structurally;
/// a primitive-typed slot is read fresh off the wire every time, whether
/// or not this change is a reorder/rename (spec §9: the per-change record
/// always carries a full payload for primitives).
fn decode_structural_or_primitive(
    instance: &dyn SchemaObject,
    decoder: &mut Decoder,
    child_primitive: Option<WireKind>,
    child_schema: Option<TypeId>,
    existing: Option<Box<dyn SchemaObject>>,
    offset: usize,
    mut trace: Option<&mut Trace<'_>>,
) -> Result<Elem> {
    if let Some(identity) = child_schema {
        let mut child = match existing {
            Some(existing) => existing,
            None => instance
                .factory(identity)
                .ok_or_else(|| crate::error::error!(FactoryMiss, offset, None))?,
        };
        trace_push!(trace, "element");
        decode_structure(child.as_mut(), decoder, trace.as_deref_mut())?;
        trace_pop!(trace);
        Ok(Elem::Schema(Some(child)))
    } else {
        decode_primitive_elem(decoder, child_primitive, offset)
    }
}

fn decode_primitive_elem(decoder: &mut Decoder, child_primitive: Option<WireKind>, offset: usize) -> Result<Elem> {
    match child_primitive {
        Some(WireKind::Boolean) => Ok(Elem::Bool(decoder.decode_bool()?)),
        Some(WireKind::Int8) => Ok(Elem::I8(decoder.decode_i8()?)),
        Some(WireKind::Uint8) => Ok(Elem::U8(decoder.decode_u8()?)),
        Some(WireKind::Int16) => Ok(Elem::I16(decoder.decode_i16()?)),
        Some(WireKind::Uint16) => Ok(Elem::U16(decoder.decode_u16()?)),
        Some(WireKind::Int32) => Ok(Elem::I32(decoder.decode_i32()?)),
        Some(WireKind::Uint32) => Ok(Elem::U32(decoder.decode_u32()?)),
        Some(WireKind::Int64) => Ok(Elem::I64(decoder.decode_i64()?)),
        Some(WireKind::Uint64) => Ok(Elem::U64(decoder.decode_u64()?)),
        Some(WireKind::Float32) => Ok(Elem::F32(decoder.decode_f32()?)),
        Some(WireKind::Float64) => Ok(Elem::F64(decoder.decode_f64()?)),
        Some(WireKind::Number) | None => Ok(Elem::Number(decoder.decode_number()?)),
        Some(WireKind::String) => Ok(Elem::Str(decoder.decode_string()?)),
        Some(other) => Err(crate::error::error!(
            UnknownWireKind,
            offset,
            None,
            "{:?} is not a valid array/map element kind",
            other,
        )),
    }
}
