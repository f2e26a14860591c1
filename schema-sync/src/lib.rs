//! A client-side decoder for a stateful networked-game state-synchronization
//! wire protocol: a MessagePack-flavored binary codec with sentinel bytes,
//! schema-driven field dispatch via per-type field tables, and a recursive
//! reconciler that applies patches to a schema instance tree in place,
//! firing add/change/remove listeners as it goes.
//!
//! Shaped after binschema's module layout (`decoder`/`encoder`/`schema`/
//! `known_schema` split) but specialized to one direction — decode only —
//! since a client in this protocol only ever receives patches, never
//! produces them.

pub mod container;
mod decoder;
mod do_if_err;
pub mod error;
mod reconciler;
mod schema_object;
mod trace;
mod value;

pub use container::{ArrayContainer, MapContainer};
pub use decoder::{Decoder, END_OF_STRUCTURE, INDEX_CHANGE, NIL};
pub use error::{Error, ErrorKind, Result};
pub use reconciler::{decode, decode_with_trace};
pub use schema_object::{
    fire_on_change, fire_on_remove, DataChange, FieldDef, FieldTable, Listeners, SchemaObject, WireKind,
};
pub use trace::Trace;
pub use value::Elem;

#[cfg(feature = "derive")]
pub use schema_sync_derive::Schema;
