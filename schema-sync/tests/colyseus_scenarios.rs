//! End-to-end scenarios replaying literal patch byte sequences against
//! concrete `#[derive(Schema)]` types, modeled on `original_source/decoders/cpp`'s
//! `PrimitiveTypes`/`ArraySchemaTypes`+`IAmAChild`/`MapSchemaTypes`/
//! `ChildSchemaTypes`/`InheritedTypes`+`Entity`/`Player`/`Bot`/`State` usage
//! fixtures. Each byte sequence is hand-assembled from the wire format in
//! `src/decoder.rs` rather than captured from a live server, since this
//! crate only ever sits on the receiving end of the wire.

use schema_sync::{decode, ArrayContainer, Listeners, MapContainer, SchemaObject};
use schema_sync_derive::Schema;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Schema, Default)]
struct PrimitiveTypes {
    #[schema(index = 0)]
    bool_value: bool,
    #[schema(index = 1)]
    int_value: i32,
    #[schema(index = 2)]
    string_value: String,
    listeners: Listeners,
}

#[test]
fn primitive_fields_round_trip_and_batch_into_one_change() {
    let mut instance = PrimitiveTypes::default();
    let touched: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));
    let touched_clone = touched.clone();
    *instance.on_change_listener() = Some(Box::new(move |_, changes| {
        touched_clone.borrow_mut().extend(changes.iter().map(|c| c.field));
    }));

    // field 0 (bool) = true; field 1 (i32) = 42; field 2 (string) = "hi"; end.
    let bytes = [0x00u8, 0x01, 0x01, 0x2a, 0x00, 0x00, 0x00, 0x02, 0xa2, b'h', b'i', 0xc1];
    decode(&mut instance, &bytes).unwrap();

    assert!(instance.bool_value);
    assert_eq!(instance.int_value, 42);
    assert_eq!(instance.string_value, "hi");
    assert_eq!(*touched.borrow(), vec!["bool_value", "int_value", "string_value"]);
}

#[derive(Schema, Default)]
struct IAmAChild {
    #[schema(index = 0)]
    value: i32,
    listeners: Listeners,
}

/// One `IAmAChild` record: its own field-index byte (0), the `i32` payload,
/// then `END_OF_STRUCTURE`.
fn child_record(value: i32) -> Vec<u8> {
    let mut out = vec![0x00];
    out.extend_from_slice(&value.to_le_bytes());
    out.push(0xc1);
    out
}

#[derive(Schema, Default)]
struct ArraySchemaTypes {
    #[schema(index = 0, child_schema = IAmAChild)]
    array_of_children: ArrayContainer,
    #[schema(index = 1, child = Number)]
    array_of_numbers: ArrayContainer,
    #[schema(index = 2, child = String)]
    array_of_strings: ArrayContainer,
    listeners: Listeners,
}

#[test]
fn array_of_schema_children_appends_and_recurses() {
    let mut instance = ArraySchemaTypes::default();
    let mut bytes = vec![0x00, 0x02, 0x02]; // field 0 (array), new_length=2, num_changes=2
    bytes.push(0x00); // new_index = 0
    bytes.extend(child_record(10));
    bytes.push(0x01); // new_index = 1
    bytes.extend(child_record(20));
    bytes.push(0xc1); // root end of structure
    decode(&mut instance, &bytes).unwrap();

    assert_eq!(instance.array_of_children.len(), 2);
    let first = instance.array_of_children.get(0).unwrap().as_schema().unwrap();
    assert_eq!(first.as_any().downcast_ref::<IAmAChild>().unwrap().value, 10);
    let second = instance.array_of_children.get(1).unwrap().as_schema().unwrap();
    assert_eq!(second.as_any().downcast_ref::<IAmAChild>().unwrap().value, 20);
}

#[test]
fn array_shrink_fires_remove_in_ascending_order_before_changes_apply() {
    let mut instance = ArraySchemaTypes::default();
    let mut grow = vec![0x00, 0x03, 0x03]; // new_length=3, num_changes=3
    grow.push(0x00);
    grow.extend(child_record(10));
    grow.push(0x01);
    grow.extend(child_record(20));
    grow.push(0x02);
    grow.extend(child_record(30));
    grow.push(0xc1);
    decode(&mut instance, &grow).unwrap();

    let removed_order: Rc<RefCell<Vec<usize>>> = Rc::new(RefCell::new(Vec::new()));
    let removed_clone = removed_order.clone();
    instance
        .array_of_children
        .set_on_remove(Box::new(move |_, _, index| removed_clone.borrow_mut().push(index)));

    // field 0, new_length=1, num_changes=0, root end. Discards indices 1 and 2.
    let shrink = [0x00, 0x01, 0x00, 0xc1];
    decode(&mut instance, &shrink).unwrap();

    assert_eq!(instance.array_of_children.len(), 1);
    let remaining = instance.array_of_children.get(0).unwrap().as_schema().unwrap();
    assert_eq!(remaining.as_any().downcast_ref::<IAmAChild>().unwrap().value, 10);
    assert_eq!(*removed_order.borrow(), vec![1, 2]);
}

#[test]
fn array_index_change_moves_an_element_without_refiring_add() {
    let mut instance = ArraySchemaTypes::default();
    let mut grow = vec![0x00, 0x02, 0x02];
    grow.push(0x00);
    grow.extend(child_record(10));
    grow.push(0x01);
    grow.extend(child_record(20));
    grow.push(0xc1);
    decode(&mut instance, &grow).unwrap();

    let adds = Rc::new(RefCell::new(0));
    let changes = Rc::new(RefCell::new(0));
    let adds_clone = adds.clone();
    let changes_clone = changes.clone();
    instance.array_of_children.set_on_add(Box::new(move |_, _, _| *adds_clone.borrow_mut() += 1));
    instance.array_of_children.set_on_change(Box::new(move |_, _, _| *changes_clone.borrow_mut() += 1));

    // Move the element at index 1 to index 0 (spec §4.3.b step 4: taken
    // "from the *current* sequence", so the source slot (1) is left hollow —
    // nothing in this record asks for it to be backfilled or shrunk).
    let mut bytes = vec![0x00, 0x02, 0x01]; // new_length=2 (unchanged), num_changes=1
    bytes.push(0x00); // new_index = 0
    bytes.extend([0xd4, 0x00, 0x01]); // INDEX_CHANGE, sentinel byte, from=1
    bytes.extend(child_record(99));
    bytes.push(0xc1);
    decode(&mut instance, &bytes).unwrap();

    let at0 = instance.array_of_children.get(0).unwrap().as_schema().unwrap();
    assert_eq!(at0.as_any().downcast_ref::<IAmAChild>().unwrap().value, 99);
    assert!(instance.array_of_children.get(1).unwrap().as_schema().is_none());
    assert_eq!(instance.array_of_children.len(), 2);
    assert_eq!(*adds.borrow(), 0);
    assert_eq!(*changes.borrow(), 1);
}

#[test]
fn array_index_change_with_from_index_negative_one_constructs_fresh() {
    // spec §4.3.b step 2/3: `from_index == -1` after an `INDEX_CHANGE`
    // marker is a distinct, reachable `is_new` disjunct from "no
    // index-change at all" — the wire's negative-fixint byte `0xff`
    // legally encodes it. A naive `f64 as usize` cast on `from_index`
    // would saturate `-1.0` to `0`, wrongly treating this as "move from
    // index 0" instead of constructing fresh.
    let mut instance = ArraySchemaTypes::default();
    let mut seed = vec![0x00, 0x01, 0x01]; // new_length=1, num_changes=1
    seed.push(0x00); // new_index = 0
    seed.extend(child_record(10));
    seed.push(0xc1);
    decode(&mut instance, &seed).unwrap();

    let adds = Rc::new(RefCell::new(0));
    let changes = Rc::new(RefCell::new(0));
    let adds_clone = adds.clone();
    let changes_clone = changes.clone();
    instance.array_of_children.set_on_add(Box::new(move |_, _, _| *adds_clone.borrow_mut() += 1));
    instance.array_of_children.set_on_change(Box::new(move |_, _, _| *changes_clone.borrow_mut() += 1));

    let mut bytes = vec![0x00, 0x02, 0x01]; // new_length=2, num_changes=1
    bytes.push(0x01); // new_index = 1
    bytes.extend([0xd4, 0x00, 0xff]); // INDEX_CHANGE, sentinel byte, from=-1
    bytes.extend(child_record(77));
    bytes.push(0xc1);
    decode(&mut instance, &bytes).unwrap();

    assert_eq!(instance.array_of_children.len(), 2);
    let first = instance.array_of_children.get(0).unwrap().as_schema().unwrap();
    assert_eq!(first.as_any().downcast_ref::<IAmAChild>().unwrap().value, 10);
    let second = instance.array_of_children.get(1).unwrap().as_schema().unwrap();
    assert_eq!(second.as_any().downcast_ref::<IAmAChild>().unwrap().value, 77);
    assert_eq!(*adds.borrow(), 1);
    assert_eq!(*changes.borrow(), 0);
}

#[test]
fn array_of_primitive_numbers_and_strings_decodes_without_a_child_schema() {
    // spec §8 scenario 2: an array field whose elements are `number`/`string`
    // primitives, not nested schema instances — `decode_primitive_elem`'s
    // string/number paths, not the schema-recursion path `array_of_children`
    // above already covers.
    let mut instance = ArraySchemaTypes::default();
    let bytes = [
        0x01, 0x02, 0x02, // field 1 (array_of_numbers), new_length=2, num_changes=2
        0x00, 0x0a, // index 0 = 10
        0x01, 0x14, // index 1 = 20
        0x02, 0x02, 0x02, // field 2 (array_of_strings), new_length=2, num_changes=2
        0x00, 0xa2, b'a', b'b', // index 0 = "ab"
        0x01, 0xa2, b'c', b'd', // index 1 = "cd"
        0xc1,
    ];
    decode(&mut instance, &bytes).unwrap();

    assert_eq!(instance.array_of_numbers.get(0).unwrap().as_number(), Some(10.0));
    assert_eq!(instance.array_of_numbers.get(1).unwrap().as_number(), Some(20.0));
    assert_eq!(instance.array_of_strings.get(0).unwrap().as_str(), Some("ab"));
    assert_eq!(instance.array_of_strings.get(1).unwrap().as_str(), Some("cd"));
}

#[derive(Schema, Default)]
struct MapSchemaTypes {
    #[schema(index = 0, child = Number)]
    scores: MapContainer,
    #[schema(index = 1, child_schema = Entity)]
    map_of_schemas: MapContainer,
    listeners: Listeners,
}

#[test]
fn map_add_then_change_and_explicit_removal() {
    let mut instance = MapSchemaTypes::default();

    // field 0, length=2, "hp"->10, "mp"->5, root end.
    let add_both = [0x00, 0x02, 0xa2, b'h', b'p', 0x0a, 0xa2, b'm', b'p', 0x05, 0xc1];
    decode(&mut instance, &add_both).unwrap();
    assert_eq!(instance.scores.get("hp").unwrap().as_number(), Some(10.0));
    assert_eq!(instance.scores.get("mp").unwrap().as_number(), Some(5.0));

    let adds = Rc::new(RefCell::new(0));
    let changes = Rc::new(RefCell::new(0));
    let adds_clone = adds.clone();
    let changes_clone = changes.clone();
    instance.scores.set_on_add(Box::new(move |_, _, _| *adds_clone.borrow_mut() += 1));
    instance.scores.set_on_change(Box::new(move |_, _, _| *changes_clone.borrow_mut() += 1));

    // field 0, length=1, "hp"->8 (change, key already present).
    let overwrite = [0x00, 0x01, 0xa2, b'h', b'p', 0x08, 0xc1];
    decode(&mut instance, &overwrite).unwrap();
    assert_eq!(instance.scores.get("hp").unwrap().as_number(), Some(8.0));
    assert_eq!(*adds.borrow(), 0);
    assert_eq!(*changes.borrow(), 1);

    // field 0, length=1, "mp" -> NIL (explicit removal).
    let remove_mp = [0x00, 0x01, 0xa2, b'm', b'p', 0xc0, 0xc1];
    decode(&mut instance, &remove_mp).unwrap();
    assert!(instance.scores.get("mp").is_none());
    assert_eq!(instance.scores.len(), 1);
}

#[test]
fn map_rename_via_index_change_preserves_ordinal_position() {
    // spec §8 scenario 6: {a:1, b:2} renaming "a" -> "c" keeps "c" at
    // position 0 and "b" at position 1, and fires on_change (not on_add).
    let mut instance = MapSchemaTypes::default();
    let seed = [0x00, 0x02, 0xa1, b'a', 0x01, 0xa1, b'b', 0x02, 0xc1];
    decode(&mut instance, &seed).unwrap();

    let adds = Rc::new(RefCell::new(0));
    let changes: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let adds_clone = adds.clone();
    let changes_clone = changes.clone();
    instance.scores.set_on_add(Box::new(move |_, _, _| *adds_clone.borrow_mut() += 1));
    instance
        .scores
        .set_on_change(Box::new(move |_, _, key| changes_clone.borrow_mut().push(key.to_string())));

    // field 0, length=1: INDEX_CHANGE(prev_ord=0), new_key="c" (string), value=9.
    let rename = [0x00, 0x01, 0xd4, 0x00, 0xa1, b'c', 0x09, 0xc1];
    decode(&mut instance, &rename).unwrap();

    assert!(instance.scores.get("a").is_none());
    assert_eq!(instance.scores.get("c").unwrap().as_number(), Some(9.0));
    let keys: Vec<&str> = instance.scores.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["c", "b"]);
    assert_eq!(*adds.borrow(), 0);
    assert_eq!(*changes.borrow(), vec!["c".to_string()]);
}

#[test]
fn map_of_schema_children_decodes_each_value_as_a_nested_structure() {
    // spec §8 scenario 3: a map field whose values are nested schema
    // instances (`decode_structural_or_primitive`'s schema branch inside
    // `decode_map_field`, untouched by the `scores` (`Number`-valued map)
    // tests above).
    let mut instance = MapSchemaTypes::default();
    let bytes = [
        0x01, // field 1 (map_of_schemas)
        0x02, // length = 2
        0xa3, b'o', b'n', b'e', // key "one"
        0x00, 0x64, // Entity::x = 100
        0x01, 0xcc, 0xc8, // Entity::y = 200
        0xc1, // end of the "one" Entity structure
        0xa3, b't', b'w', b'o', // key "two"
        0x00, 0xcd, 0x2c, 0x01, // Entity::x = 300
        0x01, 0xcd, 0x90, 0x01, // Entity::y = 400
        0xc1, // end of the "two" Entity structure
        0xc1, // root end of structure
    ];
    decode(&mut instance, &bytes).unwrap();

    let one = instance.map_of_schemas.get("one").unwrap().as_schema().unwrap();
    let one = one.as_any().downcast_ref::<Entity>().unwrap();
    assert_eq!(one.x, 100.0);
    assert_eq!(one.y, 200.0);

    let two = instance.map_of_schemas.get("two").unwrap().as_schema().unwrap();
    let two = two.as_any().downcast_ref::<Entity>().unwrap();
    assert_eq!(two.x, 300.0);
    assert_eq!(two.y, 400.0);
}

#[derive(Schema, Default)]
struct ChildSchemaTypes {
    #[schema(index = 0)]
    child: Option<Box<IAmAChild>>,
    listeners: Listeners,
}

#[test]
fn nil_on_a_ref_field_detaches_and_fires_on_remove() {
    let mut instance = ChildSchemaTypes::default();
    let mut set = vec![0x00]; // field 0: a schema record
    set.extend(child_record(99));
    decode(&mut instance, &set).unwrap();
    assert_eq!(instance.child.as_ref().unwrap().value, 99);

    let removed = Rc::new(RefCell::new(false));
    let removed_clone = removed.clone();
    *instance.child.as_mut().unwrap().on_remove_listener() =
        Some(Box::new(move |_| *removed_clone.borrow_mut() = true));

    let clear = [0x00, 0xc0]; // field 0: NIL
    decode(&mut instance, &clear).unwrap();
    assert!(instance.child.is_none());
    assert!(*removed.borrow());
}

// `Entity`/`Player`/`Bot` reproduce `original_source/decoders/cpp`'s
// `Entity.hpp`/`Player.hpp`/`Bot.hpp` composition: `Player extends Entity`
// adds `name`, `Bot extends Player` adds `power`, so `Bot`'s full field
// table is `{x, y, name, power}` in that order.
#[derive(Schema, Default)]
struct Entity {
    #[schema(index = 0, number)]
    x: f64,
    #[schema(index = 1, number)]
    y: f64,
    listeners: Listeners,
}

#[derive(Schema, Default)]
#[schema(extends = Entity)]
struct Player {
    base: Entity,
    #[schema(index = 2)]
    name: String,
}

#[derive(Schema, Default)]
#[schema(extends = Player)]
struct Bot {
    base: Player,
    #[schema(index = 3, number)]
    power: f64,
}

#[derive(Schema, Default)]
struct State {
    // Declared as `Entity` but, per spec §4.3.a/§9, the wire never tags
    // which concrete subtype a `ref` field holds — a host factory may hand
    // back a `Player` or `Bot` here, so the field is stored behind `dyn
    // SchemaObject` rather than the concrete `Entity` the schema declares.
    #[schema(index = 0, child_schema = Entity)]
    any: Option<Box<dyn SchemaObject>>,
    listeners: Listeners,
}

#[test]
fn inherited_field_reads_delegate_through_the_base_and_host_chosen_subtype_survives() {
    // `State::any`'s static field type is `Entity`; a `Bot` — two levels
    // down the inheritance chain — can still live under that slot because
    // the wire never tags which concrete subtype a `ref` field holds — host
    // code pre-populates it with the concrete instance it wants, matching
    // colyseus's own factory contract (see the derive crate's module docs
    // and `original_source/decoders/cpp/usage_inherited_types.cpp`).
    let mut state = State::default();
    let bot: Box<dyn SchemaObject> = Box::new(Bot::default());
    state.put_ref(0, Some(bot));

    let bytes = [
        0x00, // field 0 (any)
        0x00, 0x07, // Entity::x = 7 (base field index 0)
        0x01, 0x08, // Entity::y = 8 (base field index 1)
        0x02, 0xa3, b'r', b'e', b'x', // Player::name = "rex" (base field index 2)
        0x03, 0x09, // Bot::power = 9 (own field index 3)
        0xc1, // end of the Bot structure
        0xc1, // end of State's structure
    ];
    decode(&mut state, &bytes).unwrap();

    let any = state.get_ref(0).unwrap();
    let bot = any.as_any().downcast_ref::<Bot>().unwrap();
    assert_eq!(bot.base.base.x, 7.0);
    assert_eq!(bot.base.base.y, 8.0);
    assert_eq!(bot.base.name, "rex");
    assert_eq!(bot.power, 9.0);
}
