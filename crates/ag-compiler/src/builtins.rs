//! Built-in class metadata (§4.8, §6 "Middle-end interface consumed by
//! codegen"). The resolver seeds its class table with these before
//! resolving user declarations, so `Array`, `Map`, `String`, and friends
//! resolve as ordinary (if special-cased) classes rather than magic names
//! the checker has to special-case at every use site.

use std::collections::HashMap;

use crate::ast::ClassId;

/// The root of the class hierarchy every user class implicitly extends,
/// mirroring the runtime's `Object` header that every allocation carries
/// (ag-runtime's `header::Counter`/`object::Object`).
pub const OBJECT_CLASS: ClassId = ClassId(0);
pub const BLOB_CLASS: ClassId = ClassId(1);
pub const ARRAY_CLASS: ClassId = ClassId(2);
pub const SHARED_ARRAY_CLASS: ClassId = ClassId(3);
pub const WEAK_ARRAY_CLASS: ClassId = ClassId(4);
pub const MAP_CLASS: ClassId = ClassId(5);
pub const SHARED_MAP_CLASS: ClassId = ClassId(6);
pub const WEAK_MAP_CLASS: ClassId = ClassId(7);
pub const STRING_CLASS: ClassId = ClassId(8);
pub const CURSOR_CLASS: ClassId = ClassId(9);

/// First `ClassId` available to user declarations; the resolver's class
/// table allocates from here.
pub const FIRST_USER_CLASS: u32 = 10;

#[derive(Debug, Clone, Copy)]
pub struct BuiltinClass {
    pub id: ClassId,
    pub name: &'static str,
    /// Matches `ag_runtime::containers::ArrayKind`/the Map value-kind split
    /// (§4.8): `None` for classes that aren't one of the container flavors.
    pub container_kind: Option<ContainerKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Blob,
    Array,
    SharedArray,
    WeakArray,
    Map,
    SharedMap,
    WeakMap,
    String,
    Cursor,
}

pub fn builtin_classes() -> &'static [BuiltinClass] {
    &[
        BuiltinClass { id: OBJECT_CLASS, name: "Object", container_kind: None },
        BuiltinClass { id: BLOB_CLASS, name: "Blob", container_kind: Some(ContainerKind::Blob) },
        BuiltinClass { id: ARRAY_CLASS, name: "Array", container_kind: Some(ContainerKind::Array) },
        BuiltinClass { id: SHARED_ARRAY_CLASS, name: "SharedArray", container_kind: Some(ContainerKind::SharedArray) },
        BuiltinClass { id: WEAK_ARRAY_CLASS, name: "WeakArray", container_kind: Some(ContainerKind::WeakArray) },
        BuiltinClass { id: MAP_CLASS, name: "Map", container_kind: Some(ContainerKind::Map) },
        BuiltinClass { id: SHARED_MAP_CLASS, name: "SharedMap", container_kind: Some(ContainerKind::SharedMap) },
        BuiltinClass { id: WEAK_MAP_CLASS, name: "WeakMap", container_kind: Some(ContainerKind::WeakMap) },
        BuiltinClass { id: STRING_CLASS, name: "String", container_kind: Some(ContainerKind::String) },
        BuiltinClass { id: CURSOR_CLASS, name: "Cursor", container_kind: Some(ContainerKind::Cursor) },
    ]
}

pub fn builtin_class_by_name(name: &str) -> Option<&'static BuiltinClass> {
    builtin_classes().iter().find(|c| c.name == name)
}

/// Platform (FFI) function table: name -> linked symbol, consulted by
/// `crate::ffi` when a `Function` has no AST body (`is_platform`).
pub fn platform_symbol_table() -> HashMap<&'static str, &'static str> {
    let mut m = HashMap::new();
    m.insert("ag_blob_len", "ag_blob_len");
    m.insert("ag_array_get_at", "ag_array_get_at");
    m.insert("ag_array_set_at", "ag_array_set_at");
    m.insert("ag_array_insert_at", "ag_array_insert_at");
    m.insert("ag_array_delete", "ag_array_delete");
    m.insert("ag_map_set", "ag_map_set");
    m.insert("ag_map_get", "ag_map_get");
    m.insert("ag_map_has", "ag_map_has");
    m.insert("ag_map_remove", "ag_map_remove");
    m.insert("ag_string_from_code_points", "ag_string_from_code_points");
    m.insert("ag_string_code_points", "ag_string_code_points");
    m
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_classes_are_found_by_name() {
        assert_eq!(builtin_class_by_name("Array").unwrap().id, ARRAY_CLASS);
        assert_eq!(builtin_class_by_name("Map").unwrap().id, MAP_CLASS);
        assert!(builtin_class_by_name("NoSuchClass").is_none());
    }

    #[test]
    fn user_classes_start_after_builtins() {
        let max_builtin = builtin_classes().iter().map(|c| c.id.0).max().unwrap();
        assert!(FIRST_USER_CLASS > max_builtin);
    }
}
