use std::fmt;

use serde::{Deserialize, Serialize};

/// The package every builtin type and function lives under.
///
/// Importing this package exposes the short form of each of its declarations
/// (`Iter` for `@builtin::Iter` and so on) through the environment's alias
/// table.
pub const BUILTIN_PACK: &str = "builtin";

/// A fully-qualified name: optional package, optional namespace, local name.
///
/// `@fmt::Buffer::write` has package `fmt`, namespace `Buffer` and local name
/// `write`. Methods use the owning type's name as their namespace. Equality
/// and hashing are structural, so a `Name` can key environment tables
/// directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Name {
    /// Package the name lives in, e.g. `fmt` in `@fmt::Buffer`. Absent for
    /// names declared in the current compilation unit.
    pub pack: Option<String>,
    /// Namespace inside the package; for methods this is the owning type.
    pub ns: Option<String>,
    /// The local (rightmost) component.
    pub name: String,
}

impl Name {
    /// A bare local name with no package or namespace.
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            pack: None,
            ns: None,
            name: name.into(),
        }
    }

    /// A namespace-qualified name in the current unit, e.g. `Buffer::write`.
    pub fn namespaced(ns: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            pack: None,
            ns: Some(ns.into()),
            name: name.into(),
        }
    }

    /// A fully-qualified name.
    pub fn qualified(pack: impl Into<String>, ns: Option<String>, name: impl Into<String>) -> Self {
        Self {
            pack: Some(pack.into()),
            ns,
            name: name.into(),
        }
    }

    /// The builtin package's name for `name`, e.g. `@builtin::Iter`.
    pub fn builtin(name: impl Into<String>) -> Self {
        Self {
            pack: Some(BUILTIN_PACK.to_owned()),
            ns: None,
            name: name.into(),
        }
    }

    /// The name of `method` on the type named `owner`: the owner's package,
    /// the owner's local name as namespace, and the method as local name.
    pub fn method(owner: &Self, method: impl Into<String>) -> Self {
        Self {
            pack: owner.pack.clone(),
            ns: Some(owner.name.clone()),
            name: method.into(),
        }
    }

    /// True iff the name has neither package nor namespace. Standalone names
    /// are candidates for local-scope and type-variable lookup.
    #[must_use]
    pub fn is_standalone(&self) -> bool {
        self.pack.is_none() && self.ns.is_none()
    }

    /// Returns a copy promoted into `pack`.
    #[must_use]
    pub fn pack(&self, pack: impl Into<String>) -> Self {
        Self {
            pack: Some(pack.into()),
            ns: self.ns.clone(),
            name: self.name.clone(),
        }
    }

    /// Returns a copy with the package stripped.
    #[must_use]
    pub fn unpack(&self) -> Self {
        Self {
            pack: None,
            ns: self.ns.clone(),
            name: self.name.clone(),
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(pack) = &self.pack {
            write!(f, "@{pack}::")?;
        }
        if let Some(ns) = &self.ns {
            write!(f, "{ns}::")?;
        }
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_forms() {
        assert_eq!(Name::local("x").to_string(), "x");
        assert_eq!(Name::namespaced("Buffer", "write").to_string(), "Buffer::write");
        assert_eq!(
            Name::qualified("fmt", Some("Buffer".to_owned()), "write").to_string(),
            "@fmt::Buffer::write"
        );
        assert_eq!(Name::builtin("Iter").to_string(), "@builtin::Iter");
    }

    #[test]
    fn standalone_names_have_no_qualifiers() {
        assert!(Name::local("x").is_standalone());
        assert!(!Name::namespaced("Buffer", "write").is_standalone());
        assert!(!Name::builtin("Iter").is_standalone());
    }

    #[test]
    fn pack_and_unpack_round_trip() {
        let n = Name::local("helper");
        let packed = n.pack("util");
        assert_eq!(packed.pack.as_deref(), Some("util"));
        assert_eq!(packed.unpack(), n);
    }

    #[test]
    fn method_name_uses_owner_namespace() {
        let owner = Name::qualified("collections", None, "Map");
        let m = Name::method(&owner, "get");
        assert_eq!(m.to_string(), "@collections::Map::get");
    }
}
