//! Package interface records.
//!
//! A dependency's compiled interface arrives as a [`PackDetail`]: every
//! exported function, struct, enum, trait, abstract type and impl, already
//! decoded from the package loader's storage format (loading from disk is
//! the loader's job, not ours). `Env::load` ingests these records. All
//! records are serde-serializable and round-trip through postcard.

use serde::{Deserialize, Serialize};

use crate::{
    name::{BUILTIN_PACK, Name},
    ty::{Type, Tyvar},
};

/// One parameter of an exported function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDetail {
    pub name: String,
    pub ty: Type,
    /// True when the parameter declares a default, so a call may omit it.
    pub has_default: bool,
}

/// One exported function. Methods carry their owning type as the name's
/// namespace; their types may reference `Self`, resolved at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FnDetail {
    pub name: Name,
    pub args: Vec<ParamDetail>,
    /// Keyword (labelled) parameters, matched by name at call sites.
    pub kwargs: Vec<ParamDetail>,
    pub ret: Type,
}

/// One field of an exported struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDetail {
    pub name: String,
    pub ty: Type,
    pub mutable: bool,
}

/// One exported struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructDetail {
    pub name: Name,
    pub tyvars: Vec<Tyvar>,
    pub fields: Vec<FieldDetail>,
}

/// One variant of an exported enum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumVariantDetail {
    pub name: String,
    pub args: Vec<Type>,
}

/// One exported enum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumDetail {
    pub name: Name,
    pub tyvars: Vec<Tyvar>,
    pub variants: Vec<EnumVariantDetail>,
}

/// One method requirement of an exported trait.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDetail {
    pub name: String,
    pub ty: Type,
}

/// One exported trait.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitDetail {
    pub name: Name,
    pub methods: Vec<MethodDetail>,
}

/// One exported abstract type (representation hidden).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbstractDetail {
    pub name: Name,
    pub tyvars: Vec<Tyvar>,
}

/// One exported trait implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImplDetail {
    pub trait_name: Name,
    pub target: Name,
}

/// The complete interface of one dependency package.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackDetail {
    /// The package's canonical full name, e.g. `quill-lang/collections`.
    pub fullname: String,
    /// The short name the current unit imports the package as; every
    /// declaration is registered under this package name.
    pub referred: String,
    pub fns: Vec<FnDetail>,
    pub structs: Vec<StructDetail>,
    pub enums: Vec<EnumDetail>,
    pub traits: Vec<TraitDetail>,
    pub abstracts: Vec<AbstractDetail>,
    pub impls: Vec<ImplDetail>,
}

impl PackDetail {
    /// True for the standard builtin package, whose declarations are also
    /// exposed under their short names.
    #[must_use]
    pub fn is_builtin(&self) -> bool {
        self.fullname == BUILTIN_PACK
    }
}

impl Default for ParamDetail {
    fn default() -> Self {
        Self {
            name: String::new(),
            ty: Type::Unknown,
            has_default: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PackDetail {
        PackDetail {
            fullname: "quill-lang/collections".to_owned(),
            referred: "collections".to_owned(),
            fns: vec![FnDetail {
                name: Name::namespaced("Map", "get"),
                args: vec![ParamDetail {
                    name: "self".to_owned(),
                    ty: Type::Named(Name::local("Self"), vec![]),
                    has_default: false,
                }],
                kwargs: vec![],
                ret: Type::Option(Box::new(Type::Typevar(Tyvar::new("V")))),
            }],
            structs: vec![StructDetail {
                name: Name::local("Map"),
                tyvars: vec![Tyvar::new("K"), Tyvar::new("V")],
                fields: vec![],
            }],
            enums: vec![],
            traits: vec![],
            abstracts: vec![],
            impls: vec![],
        }
    }

    #[test]
    fn interface_round_trips_through_postcard() {
        let pack = sample();
        let bytes = postcard::to_allocvec(&pack).expect("interface serialization should not fail");
        let back: PackDetail = postcard::from_bytes(&bytes).expect("interface deserialization should not fail");
        assert_eq!(back, pack);
    }

    #[test]
    fn only_the_builtin_package_is_builtin() {
        assert!(!sample().is_builtin());
        let builtin = PackDetail {
            fullname: BUILTIN_PACK.to_owned(),
            referred: BUILTIN_PACK.to_owned(),
            ..PackDetail::default()
        };
        assert!(builtin.is_builtin());
    }
}
