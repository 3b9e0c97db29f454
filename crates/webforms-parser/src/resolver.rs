//! Type resolution capability.
//!
//! The parser never reflects over real types; it asks a `TypeResolver`
//! supplied by the host. [`crate::catalog::TypeCatalog`] is a ready-made
//! in-memory implementation.

use serde::Serialize;
use std::fmt;

/// Interface implemented by controls that accept arbitrary attributes.
pub const ATTRIBUTE_ACCESSOR: &str = "IAttributeAccessor";

/// A (possibly constructed generic) type, identified by namespace and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TypeRef {
    pub namespace: String,
    pub name: String,
    pub type_args: Vec<TypeRef>,
}

impl TypeRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            type_args: Vec::new(),
        }
    }

    /// Split a dotted name (`My.Namespace.Type`) at its last dot.
    pub fn parse(full_name: &str) -> Self {
        match full_name.rsplit_once('.') {
            Some((namespace, name)) => Self::new(namespace, name),
            None => Self::new("", full_name),
        }
    }

    pub fn is_generic(&self) -> bool {
        !self.type_args.is_empty()
    }

    pub fn full_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.namespace.is_empty() {
            write!(f, "{}.", self.namespace)?;
        }
        f.write_str(&self.name)?;
        if self.is_generic() {
            let args: Vec<String> = self.type_args.iter().map(TypeRef::full_name).collect();
            write!(f, "<{}>", args.join(", "))?;
        }
        Ok(())
    }
}

/// An open generic type definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenericType {
    pub namespace: String,
    pub name: String,
    pub arity: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MemberKind {
    Property,
    Event,
    Method,
}

/// How a property is populated from nested markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum MemberCapability {
    #[default]
    None,
    /// Filled by an inline sub-tree compiled into a template.
    Template,
    /// A collection filled by nested elements.
    Collection,
}

/// Converter attached to a property; the code generator applies it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Converter {
    Named(String),
    Type(TypeRef),
}

/// A member of a resolved type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Member {
    pub name: String,
    pub kind: MemberKind,
    /// Property type, event handler type, or method return type.
    pub ty: TypeRef,
    pub writable: bool,
    pub capability: MemberCapability,
    pub converter: Option<Converter>,
}

impl Member {
    pub fn property(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            kind: MemberKind::Property,
            ty,
            writable: true,
            capability: MemberCapability::None,
            converter: None,
        }
    }

    pub fn event(name: impl Into<String>) -> Self {
        Self {
            kind: MemberKind::Event,
            writable: false,
            ..Self::property(name, TypeRef::new("System", "EventHandler"))
        }
    }

    pub fn method(name: impl Into<String>) -> Self {
        Self {
            kind: MemberKind::Method,
            writable: false,
            ..Self::property(name, TypeRef::new("System", "Void"))
        }
    }

    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    pub fn with_capability(mut self, capability: MemberCapability) -> Self {
        self.capability = capability;
        self
    }

    pub fn with_converter(mut self, converter: Converter) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn is_writable_property(&self) -> bool {
        self.kind == MemberKind::Property && self.writable
    }

    pub fn is_template(&self) -> bool {
        self.kind == MemberKind::Property && self.capability == MemberCapability::Template
    }

    pub fn is_collection(&self) -> bool {
        self.kind == MemberKind::Property && self.capability == MemberCapability::Collection
    }
}

/// Type and member lookup supplied by the host.
///
/// Name lookups are expected to be case-insensitive, matching markup
/// conventions. Implementations are shared across parallel parses, so
/// they must be safe for concurrent reads.
pub trait TypeResolver: Send + Sync {
    /// Resolve a non-generic type.
    fn resolve(&self, namespace: &str, name: &str) -> Option<TypeRef>;

    /// Resolve a generic type definition with the given arity.
    fn resolve_generic(&self, namespace: &str, name: &str, arity: usize) -> Option<GenericType>;

    /// Construct `generic` with concrete type arguments.
    fn construct_generic(&self, generic: &GenericType, type_args: Vec<TypeRef>) -> TypeRef {
        TypeRef {
            namespace: generic.namespace.clone(),
            name: generic.name.clone(),
            type_args,
        }
    }

    /// Find a member by name, including inherited members.
    fn member_of(&self, ty: &TypeRef, name: &str) -> Option<Member>;

    /// Whether `ty` is, derives from, or implements the named type.
    fn is_assignable_to(&self, ty: &TypeRef, interface: &str) -> bool;

    /// Look up a view compiled into a referenced assembly by its
    /// project-relative path (e.g. `Controls/Header.ascx`).
    fn resolve_view(&self, _path: &str) -> Option<TypeRef> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_full_name() {
        assert_eq!(TypeRef::parse("My.App.Base"), TypeRef::new("My.App", "Base"));
        assert_eq!(TypeRef::parse("Base"), TypeRef::new("", "Base"));
    }

    #[test]
    fn test_display_generic() {
        let ty = TypeRef {
            type_args: vec![TypeRef::new("My", "Item")],
            ..TypeRef::new("UI", "Repeater")
        };
        assert_eq!(ty.to_string(), "UI.Repeater<My.Item>");
    }

    #[test]
    fn test_member_capabilities() {
        let items = Member::property("Items", TypeRef::new("UI", "ItemCollection"))
            .read_only()
            .with_capability(MemberCapability::Collection);
        assert!(items.is_collection());
        assert!(!items.is_writable_property());
        assert!(!Member::event("Click").is_template());
    }
}
