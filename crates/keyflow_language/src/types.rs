//! Sorts, nominal record types, and the type table.
//!
//! Every value in a program carries a [`Sort`]; pointer-sorted values
//! additionally carry a nominal record type. Record types live in a
//! [`TypeTable`] and are referenced by [`TypeId`]; two types are equal iff
//! their handles are equal. The built-in types (`void`, `bool`, `data_t`,
//! and the type of the `null` literal) are pre-registered at fixed handles.
//!
//! ## Example
//!
//! ```
//! use keyflow_language::types::{Sort, TypeTable};
//!
//! let mut types = TypeTable::new();
//! let node = types.declare("Node", vec![
//!     ("val".to_string(), TypeTable::DATA),
//! ]);
//! // Recursive fields are tied after declaration.
//! types.add_field(node, "next", node);
//!
//! assert_eq!(types.get(node).sort, Sort::Ptr);
//! assert_eq!(types.get(node).field("next"), Some(node));
//! assert_eq!(types.get(node).field("missing"), None);
//! ```

use std::fmt;

/// The sort of a value.
///
/// `Data` is totally ordered with distinguished `MIN` and `MAX` constants;
/// `Ptr` has the distinguished `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Sort {
    Void,
    Bool,
    Data,
    Ptr,
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sort::Void => write!(f, "void"),
            Sort::Bool => write!(f, "bool"),
            Sort::Data => write!(f, "data"),
            Sort::Ptr => write!(f, "ptr"),
        }
    }
}

/// Handle to a type declaration in a [`TypeTable`].
///
/// Nominal equality: two types are the same iff their handles are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId {
    /// Internal index, for dense side tables.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A declared record type: a name, a sort, and an ordered field list.
#[derive(Debug, Clone)]
pub struct RecordType {
    pub name: String,
    pub sort: Sort,
    /// Field declarations in declaration order.
    pub fields: Vec<(String, TypeId)>,
}

impl RecordType {
    /// Looks up a field's type by name.
    pub fn field(&self, name: &str) -> Option<TypeId> {
        self.fields
            .iter()
            .find(|(f, _)| f == name)
            .map(|(_, ty)| *ty)
    }

    /// Returns `true` if the type declares the named field.
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }
}

/// The table of all type declarations of a program.
///
/// Built-ins are pre-registered: [`TypeTable::VOID`], [`TypeTable::BOOL`],
/// [`TypeTable::DATA`], and [`TypeTable::NULL`] (the type of the `null`
/// literal, assignable and comparable to every pointer type).
#[derive(Debug, Clone)]
pub struct TypeTable {
    types: Vec<RecordType>,
}

impl TypeTable {
    pub const VOID: TypeId = TypeId(0);
    pub const BOOL: TypeId = TypeId(1);
    pub const DATA: TypeId = TypeId(2);
    pub const NULL: TypeId = TypeId(3);

    /// Creates a table with only the built-in types registered.
    pub fn new() -> Self {
        let builtin = |name: &str, sort| RecordType {
            name: name.to_string(),
            sort,
            fields: Vec::new(),
        };
        TypeTable {
            types: vec![
                builtin("void", Sort::Void),
                builtin("bool", Sort::Bool),
                builtin("data_t", Sort::Data),
                builtin("nullptr", Sort::Ptr),
            ],
        }
    }

    /// Declares a new record type of pointer sort and returns its handle.
    pub fn declare(&mut self, name: &str, fields: Vec<(String, TypeId)>) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(RecordType {
            name: name.to_string(),
            sort: Sort::Ptr,
            fields,
        });
        id
    }

    /// Appends a field to an already declared type.
    ///
    /// Needed to tie recursive fields (`Node.next: Node`).
    pub fn add_field(&mut self, ty: TypeId, name: &str, field_ty: TypeId) {
        self.types[ty.index()]
            .fields
            .push((name.to_string(), field_ty));
    }

    /// Returns the declaration behind a handle.
    pub fn get(&self, id: TypeId) -> &RecordType {
        &self.types[id.index()]
    }

    /// The sort of a type.
    pub fn sort(&self, id: TypeId) -> Sort {
        self.get(id).sort
    }

    /// Returns `true` if a value of type `from` may be assigned to a target
    /// of type `to`.
    ///
    /// Non-pointer sorts are assignable iff the sorts agree; pointers are
    /// assignable iff the nominal types agree or the source is `null`.
    pub fn assignable(&self, to: TypeId, from: TypeId) -> bool {
        if self.sort(to) != Sort::Ptr {
            self.sort(to) == self.sort(from)
        } else {
            to != Self::NULL && (to == from || from == Self::NULL)
        }
    }

    /// Returns `true` if values of the two types may be compared.
    pub fn comparable(&self, lhs: TypeId, rhs: TypeId) -> bool {
        if lhs == rhs {
            true
        } else if self.sort(lhs) == Sort::Ptr && rhs == Self::NULL {
            true
        } else {
            self.sort(rhs) == Sort::Ptr && lhs == Self::NULL
        }
    }

    /// Iterates over all declared types with their handles.
    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &RecordType)> {
        self.types
            .iter()
            .enumerate()
            .map(|(i, ty)| (TypeId(i as u32), ty))
    }
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_table() -> (TypeTable, TypeId) {
        let mut types = TypeTable::new();
        let node = types.declare("Node", vec![("val".to_string(), TypeTable::DATA)]);
        types.add_field(node, "next", node);
        (types, node)
    }

    #[test]
    fn builtins_have_expected_sorts() {
        let types = TypeTable::new();
        assert_eq!(types.sort(TypeTable::VOID), Sort::Void);
        assert_eq!(types.sort(TypeTable::BOOL), Sort::Bool);
        assert_eq!(types.sort(TypeTable::DATA), Sort::Data);
        assert_eq!(types.sort(TypeTable::NULL), Sort::Ptr);
    }

    #[test]
    fn declared_types_are_nominal() {
        let mut types = TypeTable::new();
        let a = types.declare("Node", vec![]);
        let b = types.declare("Node", vec![]);
        assert_ne!(a, b);
    }

    #[test]
    fn recursive_field_lookup() {
        let (types, node) = node_table();
        assert_eq!(types.get(node).field("next"), Some(node));
        assert_eq!(types.get(node).field("val"), Some(TypeTable::DATA));
        assert!(!types.get(node).has_field("prev"));
    }

    #[test]
    fn null_is_assignable_to_pointers() {
        let (types, node) = node_table();
        assert!(types.assignable(node, TypeTable::NULL));
        assert!(!types.assignable(TypeTable::NULL, node));
        assert!(types.assignable(node, node));
    }

    #[test]
    fn distinct_record_types_are_not_assignable() {
        let mut types = TypeTable::new();
        let a = types.declare("A", vec![]);
        let b = types.declare("B", vec![]);
        assert!(!types.assignable(a, b));
    }

    #[test]
    fn null_is_comparable_to_pointers() {
        let (types, node) = node_table();
        assert!(types.comparable(node, TypeTable::NULL));
        assert!(types.comparable(TypeTable::NULL, node));
        assert!(!types.comparable(TypeTable::DATA, node));
    }
}
