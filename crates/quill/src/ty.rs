//! The type algebra.
//!
//! [`Type`] is a plain value; the mutable state of inference lives in the
//! [`Weaks`] table of weak cells (inference metavariables). A weak cell is
//! referenced by index so cloned types and cloned environment scopes all see
//! the same resolution. Aliasing two free cells is a union-find union;
//! resolving a cell writes its root slot exactly once.

use std::{cell::RefCell, fmt, rc::Rc};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::name::Name;

/// A declared type parameter together with its recorded trait bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tyvar {
    pub name: String,
    pub traits: Vec<Name>,
}

impl Tyvar {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            traits: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_traits(name: impl Into<String>, traits: Vec<Name>) -> Self {
        Self {
            name: name.into(),
            traits,
        }
    }
}

/// Index of a weak cell in the shared [`Weaks`] table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeakId(u32);

impl WeakId {
    fn new(index: usize) -> Self {
        Self(u32::try_from(index).expect("weak cell count exceeds u32"))
    }

    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A type of the language.
///
/// `Named` is a user-declared reference not yet resolved against the
/// environment; resolution replaces it with `Struct`, `Enum` or `Abstract`.
/// `Weak` is an inference metavariable. The `MayError`/`HasError`/
/// `VirtualBase` wrappers are recorded for downstream phases but unification
/// only looks through to their payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Type {
    Int,
    Long,
    Float,
    Double,
    Bool,
    Char,
    String,
    Byte,
    Bytes,
    Unit,
    Error,
    Unknown,
    Option(Box<Type>),
    FixedArray(Box<Type>),
    Tuple(Vec<Type>),
    Function(Vec<Type>, Box<Type>),
    Named(Name, Vec<Type>),
    Struct(Name, Vec<Type>),
    Enum(Name, Vec<Type>),
    Abstract(Name, Vec<Type>),
    Typevar(Tyvar),
    Weak(WeakId),
    MayError(Box<Type>),
    HasError(Box<Type>, Box<Type>),
    VirtualBase(Box<Type>),
}

impl Type {
    /// Bottom-up structural rewrite: children are rebuilt first, then `f` is
    /// applied to each rebuilt node. `t.map(&mut |t| t)` returns `t`
    /// unchanged.
    pub fn map(&self, f: &mut impl FnMut(Self) -> Self) -> Self {
        let rebuilt = match self {
            Self::Option(t) => Self::Option(Box::new(t.map(f))),
            Self::FixedArray(t) => Self::FixedArray(Box::new(t.map(f))),
            Self::Tuple(ts) => Self::Tuple(ts.iter().map(|t| t.map(f)).collect()),
            Self::Function(params, ret) => Self::Function(
                params.iter().map(|t| t.map(f)).collect(),
                Box::new(ret.map(f)),
            ),
            Self::Named(n, args) => Self::Named(n.clone(), args.iter().map(|t| t.map(f)).collect()),
            Self::Struct(n, args) => Self::Struct(n.clone(), args.iter().map(|t| t.map(f)).collect()),
            Self::Enum(n, args) => Self::Enum(n.clone(), args.iter().map(|t| t.map(f)).collect()),
            Self::Abstract(n, args) => Self::Abstract(n.clone(), args.iter().map(|t| t.map(f)).collect()),
            Self::MayError(t) => Self::MayError(Box::new(t.map(f))),
            Self::HasError(t, e) => Self::HasError(Box::new(t.map(f)), Box::new(e.map(f))),
            Self::VirtualBase(t) => Self::VirtualBase(Box::new(t.map(f))),
            _ => self.clone(),
        };
        f(rebuilt)
    }

    /// Pre-order traversal of the type and all its structural children.
    pub fn visit(&self, f: &mut impl FnMut(&Self)) {
        f(self);
        match self {
            Self::Option(t) | Self::FixedArray(t) | Self::MayError(t) | Self::VirtualBase(t) => t.visit(f),
            Self::Tuple(ts) | Self::Named(_, ts) | Self::Struct(_, ts) | Self::Enum(_, ts) | Self::Abstract(_, ts) => {
                for t in ts {
                    t.visit(f);
                }
            }
            Self::Function(params, ret) => {
                for t in params {
                    t.visit(f);
                }
                ret.visit(f);
            }
            Self::HasError(t, e) => {
                t.visit(f);
                e.visit(f);
            }
            _ => {}
        }
    }

    /// Replaces every reachable `Unknown` with a fresh free weak cell. Fresh
    /// cells are never shared between calls.
    #[must_use]
    pub fn weaken(&self, weaks: &Weaks) -> Self {
        self.map(&mut |t| if matches!(t, Self::Unknown) { weaks.fresh_ty() } else { t })
    }

    /// Collapses every resolved weak cell to its payload, following chains
    /// through the union-find roots. Free cells stay as their canonical root
    /// so sharing survives until [`Type::finalize`].
    #[must_use]
    pub fn deweak(&self, weaks: &Weaks) -> Self {
        self.map(&mut |t| match t {
            Self::Weak(id) => match weaks.probe(id) {
                Some(payload) => payload.deweak(weaks),
                None => Self::Weak(weaks.find(id)),
            },
            other => other,
        })
    }

    /// Like [`Type::deweak`], but free cells collapse to `Unknown`. After
    /// finalizing, no `Weak` node remains reachable.
    #[must_use]
    pub fn finalize(&self, weaks: &Weaks) -> Self {
        self.map(&mut |t| match t {
            Self::Weak(id) => match weaks.probe(id) {
                Some(payload) => payload.finalize(weaks),
                None => Self::Unknown,
            },
            other => other,
        })
    }

    /// True when any `Weak` node is structurally reachable.
    #[must_use]
    pub fn contains_weak(&self) -> bool {
        let mut found = false;
        self.visit(&mut |t| found |= matches!(t, Self::Weak(_)));
        found
    }

    /// Best-effort canonical name of the type. Builtins map into the
    /// `@builtin` package; `Unknown`, `Typevar`, `Tuple`, `Function` and
    /// unresolved weak cells have none; wrappers delegate to their payload.
    #[must_use]
    pub fn name(&self) -> Option<Name> {
        match self {
            Self::Int => Some(Name::builtin("Int")),
            Self::Long => Some(Name::builtin("Long")),
            Self::Float => Some(Name::builtin("Float")),
            Self::Double => Some(Name::builtin("Double")),
            Self::Bool => Some(Name::builtin("Bool")),
            Self::Char => Some(Name::builtin("Char")),
            Self::String => Some(Name::builtin("String")),
            Self::Byte => Some(Name::builtin("Byte")),
            Self::Bytes => Some(Name::builtin("Bytes")),
            Self::Unit => Some(Name::builtin("Unit")),
            Self::Error => Some(Name::builtin("Error")),
            Self::Option(_) => Some(Name::builtin("Option")),
            Self::FixedArray(_) => Some(Name::builtin("FixedArray")),
            Self::Named(n, _) | Self::Struct(n, _) | Self::Enum(n, _) | Self::Abstract(n, _) => Some(n.clone()),
            Self::MayError(t) | Self::HasError(t, _) | Self::VirtualBase(t) => t.name(),
            Self::Unknown | Self::Typevar(_) | Self::Tuple(_) | Self::Function(..) | Self::Weak(_) => None,
        }
    }

    /// Rewrites every standalone `Named("Self")` into a reference to `owner`,
    /// used when loading a method signature into its owning type's namespace.
    #[must_use]
    pub fn resolve_self(&self, owner: &Name) -> Self {
        self.map(&mut |t| match t {
            Self::Named(n, args) if n.is_standalone() && n.name == "Self" => Self::Named(owner.clone(), args),
            other => other,
        })
    }

    /// Substitutes in-scope type parameters: `Typevar(a)` and standalone,
    /// argument-free `Named(a)` both rewrite to `subst[a]` when present.
    #[must_use]
    pub fn instantiate(&self, subst: &IndexMap<String, Self>) -> Self {
        self.map(&mut |t| match &t {
            Self::Typevar(v) => subst.get(&v.name).cloned().unwrap_or(t),
            Self::Named(n, args) if n.is_standalone() && args.is_empty() => {
                subst.get(&n.name).cloned().unwrap_or(t)
            }
            _ => t,
        })
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn applied(f: &mut fmt::Formatter<'_>, name: &Name, args: &[Type]) -> fmt::Result {
            write!(f, "{name}")?;
            if !args.is_empty() {
                write!(f, "[")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, "]")?;
            }
            Ok(())
        }

        match self {
            Self::Int => write!(f, "Int"),
            Self::Long => write!(f, "Long"),
            Self::Float => write!(f, "Float"),
            Self::Double => write!(f, "Double"),
            Self::Bool => write!(f, "Bool"),
            Self::Char => write!(f, "Char"),
            Self::String => write!(f, "String"),
            Self::Byte => write!(f, "Byte"),
            Self::Bytes => write!(f, "Bytes"),
            Self::Unit => write!(f, "Unit"),
            Self::Error => write!(f, "Error"),
            Self::Unknown => write!(f, "_"),
            Self::Option(t) => write!(f, "{t}?"),
            Self::FixedArray(t) => write!(f, "FixedArray[{t}]"),
            Self::Tuple(ts) => {
                write!(f, "(")?;
                for (i, t) in ts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{t}")?;
                }
                write!(f, ")")
            }
            Self::Function(params, ret) => {
                write!(f, "(")?;
                for (i, t) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{t}")?;
                }
                write!(f, ") -> {ret}")
            }
            Self::Named(n, args) | Self::Struct(n, args) | Self::Enum(n, args) | Self::Abstract(n, args) => {
                applied(f, n, args)
            }
            Self::Typevar(v) => write!(f, "{}", v.name),
            Self::Weak(id) => write!(f, "?{}", id.0),
            Self::MayError(t) => write!(f, "{t}!"),
            Self::HasError(t, e) => write!(f, "{t}!{e}"),
            Self::VirtualBase(t) => write!(f, "&{t}"),
        }
    }
}

/// The union-find table of weak cells. Each cell is either free or resolved
/// at its root; `parent` links alias chains.
#[derive(Debug, Default)]
struct WeakTable {
    parent: Vec<u32>,
    value: Vec<Option<Type>>,
}

impl WeakTable {
    fn fresh(&mut self) -> WeakId {
        let id = WeakId::new(self.parent.len());
        self.parent.push(id.0);
        self.value.push(None);
        id
    }

    fn find(&mut self, id: WeakId) -> WeakId {
        let mut root = id.0;
        while self.parent[root as usize] != root {
            root = self.parent[root as usize];
        }
        // Path compression: point every node on the walked chain at the root.
        let mut cur = id.0;
        while self.parent[cur as usize] != root {
            let next = self.parent[cur as usize];
            self.parent[cur as usize] = root;
            cur = next;
        }
        WeakId(root)
    }

    fn probe(&mut self, id: WeakId) -> Option<Type> {
        let root = self.find(id);
        self.value[root.index()].clone()
    }

    fn resolve(&mut self, id: WeakId, ty: Type) {
        let root = self.find(id);
        let slot = &mut self.value[root.index()];
        debug_assert!(slot.is_none(), "weak cell resolved twice");
        *slot = Some(ty);
    }

    fn alias(&mut self, a: WeakId, b: WeakId) -> WeakId {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return ra;
        }
        self.parent[rb.index()] = ra.0;
        if let Some(v) = self.value[rb.index()].take() {
            debug_assert!(
                self.value[ra.index()].is_none(),
                "aliased two resolved weak cells"
            );
            self.value[ra.index()] = Some(v);
        }
        ra
    }
}

/// Cloneable handle to the shared weak-cell table.
///
/// Every environment scope clone holds the same table, so resolving a cell in
/// a nested scope is visible to the types already recorded in outer scopes;
/// inference depends on this to propagate resolutions upward.
#[derive(Debug, Clone, Default)]
pub struct Weaks(Rc<RefCell<WeakTable>>);

impl Weaks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh free cell.
    pub fn fresh(&self) -> WeakId {
        self.0.borrow_mut().fresh()
    }

    /// Allocates a fresh free cell wrapped as a type.
    pub fn fresh_ty(&self) -> Type {
        Type::Weak(self.fresh())
    }

    /// The canonical representative of `id`'s alias class.
    pub fn find(&self, id: WeakId) -> WeakId {
        self.0.borrow_mut().find(id)
    }

    /// The resolution stored at `id`'s root, or `None` while the cell is
    /// free.
    pub fn probe(&self, id: WeakId) -> Option<Type> {
        self.0.borrow_mut().probe(id)
    }

    /// Resolves `id`'s root. A cell resolves at most once; refinement of an
    /// already-resolved cell goes through unification of its payload instead.
    pub fn resolve(&self, id: WeakId, ty: Type) {
        self.0.borrow_mut().resolve(id, ty);
    }

    /// Unions the alias classes of `a` and `b`, keeping the resolution of
    /// whichever side has one. Returns the surviving root.
    pub fn alias(&self, a: WeakId, b: WeakId) -> WeakId {
        self.0.borrow_mut().alias(a, b)
    }

    /// True when `ty` structurally mentions a cell in the same alias class
    /// as `id` (the occurs check).
    pub fn occurs(&self, id: WeakId, ty: &Type) -> bool {
        let root = self.find(id);
        let mut found = false;
        ty.visit(&mut |t| {
            if let Type::Weak(other) = t {
                found |= self.find(*other) == root;
            }
        });
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Type {
        Type::Function(
            vec![Type::Int, Type::Tuple(vec![Type::Bool, Type::Option(Box::new(Type::String))])],
            Box::new(Type::FixedArray(Box::new(Type::Unknown))),
        )
    }

    #[test]
    fn map_identity_returns_the_same_type() {
        let t = sample();
        assert_eq!(t.map(&mut |t| t), t);
    }

    #[test]
    fn weaken_replaces_unknown_with_fresh_cells() {
        let weaks = Weaks::new();
        let a = sample().weaken(&weaks);
        let b = sample().weaken(&weaks);
        assert!(!a.contains_weak() || a != b, "fresh cells must not be shared between calls");
        let Type::Function(_, ret_a) = &a else {
            panic!("weaken must preserve structure")
        };
        assert!(ret_a.contains_weak());
    }

    #[test]
    fn deweak_follows_alias_chains() {
        let weaks = Weaks::new();
        let a = weaks.fresh();
        let b = weaks.fresh();
        let c = weaks.fresh();
        weaks.alias(a, b);
        weaks.alias(b, c);
        weaks.resolve(a, Type::Int);
        assert_eq!(Type::Weak(c).deweak(&weaks), Type::Int);
        assert_eq!(Type::Weak(b).finalize(&weaks), Type::Int);
    }

    #[test]
    fn finalize_collapses_free_cells_to_unknown() {
        let weaks = Weaks::new();
        let free = weaks.fresh_ty();
        let t = Type::Tuple(vec![free, Type::Int]);
        assert_eq!(t.finalize(&weaks), Type::Tuple(vec![Type::Unknown, Type::Int]));
    }

    #[test]
    fn resolve_self_rewrites_only_standalone_self() {
        let owner = Name::qualified("collections", None, "Map");
        let t = Type::Function(
            vec![Type::Named(Name::local("Self"), vec![])],
            Box::new(Type::Named(Name::namespaced("other", "Self"), vec![])),
        );
        let r = t.resolve_self(&owner);
        let Type::Function(params, ret) = r else { panic!() };
        assert_eq!(params[0], Type::Named(owner, vec![]));
        assert_eq!(*ret, Type::Named(Name::namespaced("other", "Self"), vec![]));
    }

    #[test]
    fn builtin_names_live_in_the_builtin_package() {
        assert_eq!(Type::Int.name(), Some(Name::builtin("Int")));
        assert_eq!(Type::Unknown.name(), None);
        assert_eq!(Type::Tuple(vec![]).name(), None);
        let s = Type::Struct(Name::local("Pair"), vec![Type::Int]);
        assert_eq!(s.name(), Some(Name::local("Pair")));
    }

    #[test]
    fn occurs_sees_through_aliases() {
        let weaks = Weaks::new();
        let a = weaks.fresh();
        let b = weaks.fresh();
        weaks.alias(a, b);
        let t = Type::FixedArray(Box::new(Type::Weak(b)));
        assert!(weaks.occurs(a, &t));
        assert!(!weaks.occurs(weaks.fresh(), &t));
    }

    #[test]
    fn display_renders_compound_types() {
        let t = Type::Function(
            vec![Type::Int, Type::Option(Box::new(Type::String))],
            Box::new(Type::Tuple(vec![Type::Bool, Type::Unknown])),
        );
        assert_eq!(t.to_string(), "(Int, String?) -> (Bool, _)");
        let s = Type::Struct(Name::builtin("Iter"), vec![Type::Int]);
        assert_eq!(s.to_string(), "@builtin::Iter[Int]");
    }
}
