//! The scoped compilation environment.
//!
//! An [`Env`] owns the tables inference reads and writes: locals, globals,
//! type declarations, function signatures, the `exposed` alias table, and
//! in-scope type variables. Opening a nested scope is `clone()`: the clone
//! gets independent tables (bindings added inside never leak back out) while
//! the [`Weaks`] cell table and [`Diags`] sink stay shared, so type
//! resolutions and diagnostics made in the nested scope are visible
//! everywhere.

use indexmap::{IndexMap, IndexSet};

use crate::{
    ast::{Ast, AstKind, FieldDef, VariantDef},
    diag::Diags,
    name::Name,
    pack::PackDetail,
    ty::{Type, Tyvar, Weaks},
};

/// A local binding in the current scope.
#[derive(Debug, Clone)]
pub struct LocalBinding {
    pub name: String,
    pub mutable: bool,
    pub ty: Type,
}

/// A module-level binding.
#[derive(Debug, Clone)]
pub struct GlobalBinding {
    pub name: Name,
    pub mutable: bool,
    pub ty: Type,
}

/// One named parameter of a function signature.
#[derive(Debug, Clone)]
pub struct ParamSig {
    pub name: String,
    pub ty: Type,
    pub has_default: bool,
}

/// A function's environment entry.
///
/// Positional parameters bind by position; keyword parameters bind by name
/// at call sites and may carry defaults. `ty()` recovers the plain function
/// type over the positional parameters only, since keyword parameters are
/// matched by name, never by position.
#[derive(Debug, Clone)]
pub struct FnSig {
    pub args: Vec<ParamSig>,
    pub kwargs: Vec<ParamSig>,
    pub ret: Type,
}

impl FnSig {
    #[must_use]
    pub fn ty(&self) -> Type {
        Type::Function(
            self.args.iter().map(|p| p.ty.clone()).collect(),
            Box::new(self.ret.clone()),
        )
    }

    /// Applies [`Type::resolve_self`] to every type in the signature.
    #[must_use]
    pub fn resolve_self(&self, owner: &Name) -> Self {
        let fix = |p: &ParamSig| ParamSig {
            name: p.name.clone(),
            ty: p.ty.resolve_self(owner),
            has_default: p.has_default,
        };
        Self {
            args: self.args.iter().map(fix).collect(),
            kwargs: self.kwargs.iter().map(fix).collect(),
            ret: self.ret.resolve_self(owner),
        }
    }
}

/// A struct declaration as the environment sees it.
#[derive(Debug, Clone)]
pub struct StructDef {
    pub name: Name,
    pub tyvars: Vec<Tyvar>,
    pub fields: Vec<FieldDef>,
}

/// An enum declaration as the environment sees it.
#[derive(Debug, Clone)]
pub struct EnumDef {
    pub name: Name,
    pub tyvars: Vec<Tyvar>,
    pub variants: Vec<VariantDef>,
}

/// An abstract type declaration: a named type with hidden representation.
#[derive(Debug, Clone)]
pub struct AbstractDef {
    pub name: Name,
    pub tyvars: Vec<Tyvar>,
}

/// A trait declaration.
#[derive(Debug, Clone)]
pub struct TraitDef {
    pub name: Name,
    pub methods: Vec<(String, Type)>,
}

/// A recorded trait implementation, keyed by trait and implementing type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImplKey {
    pub trait_name: Name,
    pub target: Name,
}

/// Context of the innermost enclosing loop, for `continue`/`break` checking.
#[derive(Debug, Clone)]
pub(crate) struct LoopCtx {
    /// Induction-variable (or binder) names, in declaration order.
    pub vars: Vec<String>,
    /// The type `break`-with-value and the loop's `exit` expression unify
    /// against.
    pub exit: Type,
}

/// The scoped environment. See the module docs for the `clone()` contract.
#[derive(Debug, Clone)]
pub struct Env {
    locals: IndexMap<String, LocalBinding>,
    globals: IndexMap<Name, GlobalBinding>,
    structs: IndexMap<Name, StructDef>,
    enums: IndexMap<Name, EnumDef>,
    abstracts: IndexMap<Name, AbstractDef>,
    traits: IndexMap<Name, TraitDef>,
    impls: IndexSet<ImplKey>,
    fns: IndexMap<Name, FnSig>,
    aliases: IndexMap<Name, Type>,
    /// Short (exposed) name → full name. Chains are path-compressed by
    /// [`Env::resolve`].
    exposed: IndexMap<Name, Name>,
    /// In-scope type variables, each bound to a fresh weak cell for the
    /// duration of the declaring function.
    tyvars: IndexMap<String, Type>,
    tyvar_traits: IndexMap<String, Vec<Name>>,
    pub(crate) curr_fn: Option<Name>,
    pub(crate) curr_ret: Option<Type>,
    pub(crate) curr_for: Option<LoopCtx>,
    ast: Option<Box<Ast>>,
    pub(crate) weaks: Weaks,
    pub(crate) diags: Diags,
}

impl Env {
    /// An environment with no bindings and no bound AST.
    #[must_use]
    pub fn empty(diags: &Diags) -> Self {
        Self {
            locals: IndexMap::new(),
            globals: IndexMap::new(),
            structs: IndexMap::new(),
            enums: IndexMap::new(),
            abstracts: IndexMap::new(),
            traits: IndexMap::new(),
            impls: IndexSet::new(),
            fns: IndexMap::new(),
            aliases: IndexMap::new(),
            exposed: IndexMap::new(),
            tyvars: IndexMap::new(),
            tyvar_traits: IndexMap::new(),
            curr_fn: None,
            curr_ret: None,
            curr_for: None,
            ast: None,
            weaks: Weaks::new(),
            diags: diags.clone(),
        }
    }

    /// `empty` followed by [`Env::bind`].
    #[must_use]
    pub fn new(ast: Ast, diags: &Diags) -> Self {
        let mut env = Self::empty(diags);
        env.bind(ast);
        env
    }

    #[must_use]
    pub fn diags(&self) -> &Diags {
        &self.diags
    }

    #[must_use]
    pub fn weaks(&self) -> &Weaks {
        &self.weaks
    }

    /// Walks the AST's top level and installs every declaration into its
    /// table, then keeps the AST for [`Env::check`]. Binding does not clear
    /// existing entries, so repeated binds merge (later wins per name).
    pub fn bind(&mut self, ast: Ast) {
        match &ast.kind {
            AstKind::Block(items) => {
                for item in items {
                    self.install_kind(&item.kind);
                }
            }
            _ => self.install_kind(&ast.kind),
        }
        self.ast = Some(Box::new(ast));
    }

    pub(crate) fn take_ast(&mut self) -> Ast {
        self.ast.take().map_or_else(Ast::leaf, |b| *b)
    }

    /// Installs one declaration into its table. Non-declarations are
    /// ignored.
    pub(crate) fn install_kind(&mut self, kind: &AstKind) {
        match kind {
            AstKind::GlobalDecl {
                name, mutable, ann, ..
            } => {
                self.globals.insert(
                    name.clone(),
                    GlobalBinding {
                        name: name.clone(),
                        mutable: *mutable,
                        ty: ann.clone().unwrap_or(Type::Unknown),
                    },
                );
            }
            AstKind::StructDecl { name, tyvars, fields } => {
                self.structs.insert(
                    name.clone(),
                    StructDef {
                        name: name.clone(),
                        tyvars: tyvars.clone(),
                        fields: fields.clone(),
                    },
                );
            }
            AstKind::EnumDecl { name, tyvars, variants } => {
                self.enums.insert(
                    name.clone(),
                    EnumDef {
                        name: name.clone(),
                        tyvars: tyvars.clone(),
                        variants: variants.clone(),
                    },
                );
            }
            AstKind::AbstractDecl { name, tyvars } => {
                self.abstracts.insert(
                    name.clone(),
                    AbstractDef {
                        name: name.clone(),
                        tyvars: tyvars.clone(),
                    },
                );
            }
            AstKind::TraitDecl { name, methods } => {
                self.traits.insert(
                    name.clone(),
                    TraitDef {
                        name: name.clone(),
                        methods: methods.clone(),
                    },
                );
            }
            AstKind::FnDecl {
                name,
                tyvars,
                params,
                ret,
                ..
            } => {
                let sig = Self::sig_of(params, ret.as_ref(), tyvars);
                self.fns.insert(name.clone(), sig);
            }
            AstKind::Impl {
                trait_name,
                target,
                fns,
            } => {
                for func in fns {
                    if let AstKind::FnDecl {
                        name,
                        tyvars,
                        params,
                        ret,
                        ..
                    } = &func.kind
                    {
                        let qualified = Name::namespaced(target.name.clone(), name.name.clone());
                        let sig = Self::sig_of(params, ret.as_ref(), tyvars).resolve_self(target);
                        self.fns.insert(qualified, sig);
                    }
                }
                if let Some(trait_name) = trait_name {
                    self.impls.insert(ImplKey {
                        trait_name: trait_name.clone(),
                        target: target.clone(),
                    });
                }
            }
            AstKind::Typealias { name, target } => {
                self.aliases.insert(name.clone(), target.clone());
            }
            AstKind::Fnalias { name, target } => {
                self.exposed.insert(name.clone(), target.clone());
            }
            _ => {}
        }
    }

    /// Builds a signature from `Param` nodes. Missing annotations become
    /// `Unknown` so the declaring function can still be inferred, and
    /// references to the declared type parameters become `Typevar`s so call
    /// sites instantiate them.
    fn sig_of(params: &[Ast], ret: Option<&Type>, tyvars: &[Tyvar]) -> FnSig {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        for p in params {
            if let AstKind::Param {
                name, ann, default, kw, ..
            } = &p.kind
            {
                let sig = ParamSig {
                    name: name.clone(),
                    ty: Self::tyvarify(&ann.clone().unwrap_or(Type::Unknown), tyvars),
                    has_default: default.is_some(),
                };
                if *kw {
                    kwargs.push(sig);
                } else {
                    args.push(sig);
                }
            }
        }
        FnSig {
            args,
            kwargs,
            ret: Self::tyvarify(&ret.cloned().unwrap_or(Type::Unknown), tyvars),
        }
    }

    /// Rewrites standalone, argument-free references to a declared type
    /// parameter into the `Typevar` form carrying its bounds.
    fn tyvarify(ty: &Type, tyvars: &[Tyvar]) -> Type {
        if tyvars.is_empty() {
            return ty.clone();
        }
        ty.map(&mut |t| match &t {
            Type::Named(n, args) if n.is_standalone() && args.is_empty() => {
                match tyvars.iter().find(|tv| tv.name == n.name) {
                    Some(tv) => Type::Typevar(tv.clone()),
                    None => t,
                }
            }
            _ => t,
        })
    }

    /// Registers a type alias in the current scope.
    pub(crate) fn add_alias(&mut self, name: Name, target: Type) {
        self.aliases.insert(name, target);
    }

    /// Ingests a dependency package's interface.
    ///
    /// Every record is registered under the package's `referred` name;
    /// method signatures get `Self` resolved against their owning type. The
    /// builtin package additionally exposes each declaration's short name.
    pub fn load(&mut self, pack: &PackDetail) {
        let referred = pack.referred.as_str();
        let expose = pack.is_builtin();

        for detail in &pack.fns {
            let qualified = detail.name.pack(referred);
            let mut sig = FnSig {
                args: detail
                    .args
                    .iter()
                    .map(|p| ParamSig {
                        name: p.name.clone(),
                        ty: p.ty.clone(),
                        has_default: p.has_default,
                    })
                    .collect(),
                kwargs: detail
                    .kwargs
                    .iter()
                    .map(|p| ParamSig {
                        name: p.name.clone(),
                        ty: p.ty.clone(),
                        has_default: p.has_default,
                    })
                    .collect(),
                ret: detail.ret.clone(),
            };
            if let Some(ns) = &qualified.ns {
                let owner = Name::qualified(referred, None, ns.clone());
                sig = sig.resolve_self(&owner);
            }
            if expose && qualified.ns.is_none() {
                self.exposed.insert(Name::local(qualified.name.clone()), qualified.clone());
            }
            self.fns.insert(qualified, sig);
        }
        for detail in &pack.structs {
            let qualified = detail.name.pack(referred);
            if expose {
                self.exposed.insert(Name::local(qualified.name.clone()), qualified.clone());
            }
            self.structs.insert(
                qualified.clone(),
                StructDef {
                    name: qualified,
                    tyvars: detail.tyvars.clone(),
                    fields: detail
                        .fields
                        .iter()
                        .map(|f| FieldDef {
                            name: f.name.clone(),
                            ty: f.ty.clone(),
                            mutable: f.mutable,
                        })
                        .collect(),
                },
            );
        }
        for detail in &pack.enums {
            let qualified = detail.name.pack(referred);
            if expose {
                self.exposed.insert(Name::local(qualified.name.clone()), qualified.clone());
            }
            self.enums.insert(
                qualified.clone(),
                EnumDef {
                    name: qualified,
                    tyvars: detail.tyvars.clone(),
                    variants: detail
                        .variants
                        .iter()
                        .map(|v| VariantDef {
                            name: v.name.clone(),
                            args: v.args.clone(),
                        })
                        .collect(),
                },
            );
        }
        for detail in &pack.traits {
            let qualified = detail.name.pack(referred);
            if expose {
                self.exposed.insert(Name::local(qualified.name.clone()), qualified.clone());
            }
            self.traits.insert(
                qualified.clone(),
                TraitDef {
                    name: qualified,
                    methods: detail.methods.iter().map(|m| (m.name.clone(), m.ty.clone())).collect(),
                },
            );
        }
        for detail in &pack.abstracts {
            let qualified = detail.name.pack(referred);
            if expose {
                self.exposed.insert(Name::local(qualified.name.clone()), qualified.clone());
            }
            self.abstracts.insert(
                qualified.clone(),
                AbstractDef {
                    name: qualified,
                    tyvars: detail.tyvars.clone(),
                },
            );
        }
        for detail in &pack.impls {
            self.impls.insert(ImplKey {
                trait_name: detail.trait_name.clone(),
                target: detail.target.pack(referred),
            });
        }
    }

    /// Follows `exposed` chains to a fixed point and returns the canonical
    /// name. Terminates on cyclic chains (bounded by the table size) and
    /// memoizes the result for every name on the walked chain.
    pub fn resolve(&mut self, name: &Name) -> Name {
        let Some(first) = self.exposed.get(name) else {
            return name.clone();
        };
        let mut chain = vec![name.clone()];
        let mut cur = first.clone();
        let limit = self.exposed.len();
        for _ in 0..limit {
            match self.exposed.get(&cur) {
                Some(next) if *next != cur => {
                    chain.push(cur.clone());
                    cur = next.clone();
                }
                _ => break,
            }
        }
        for key in chain {
            self.exposed.insert(key, cur.clone());
        }
        cur
    }

    /// The function type of `method` on the type named `owner`, if declared.
    pub fn method_ty(&self, owner: &Name, method: &str) -> Option<Type> {
        self.method_sig(owner, method).map(FnSig::ty)
    }

    /// The full signature of `method` on the type named `owner`.
    pub fn method_sig(&self, owner: &Name, method: &str) -> Option<&FnSig> {
        self.fns.get(&Name::method(owner, method))
    }

    /// Resolves a type reference. Standalone names check in-scope type
    /// variables first, then the alias table, then declared structs, enums
    /// and abstracts. Unknown references yield `Unknown` silently; callers
    /// that require a declared type report the miss themselves.
    pub fn lookup_type(&mut self, name: &Name, args: &[Type]) -> Type {
        let resolved = self.resolve(name);
        if resolved.is_standalone()
            && let Some(bound) = self.tyvars.get(&resolved.name)
        {
            return bound.clone();
        }
        if let Some(target) = self.aliases.get(&resolved) {
            return target.clone();
        }
        if let Some(def) = self.structs.get(&resolved) {
            let args = self.apply_args(args, def.tyvars.len());
            return Type::Struct(def.name.clone(), args);
        }
        if let Some(def) = self.enums.get(&resolved) {
            let args = self.apply_args(args, def.tyvars.len());
            return Type::Enum(def.name.clone(), args);
        }
        if let Some(def) = self.abstracts.get(&resolved) {
            let args = self.apply_args(args, def.tyvars.len());
            return Type::Abstract(def.name.clone(), args);
        }
        Type::Unknown
    }

    /// An unapplied reference to a generic type gets fresh weak cells for
    /// its parameters, so `Map` means `Map[?, ?]` until use pins it down.
    fn apply_args(&self, args: &[Type], param_count: usize) -> Vec<Type> {
        if args.is_empty() && param_count > 0 {
            (0..param_count).map(|_| self.weaks.fresh_ty()).collect()
        } else {
            args.to_vec()
        }
    }

    // --- locals ---

    pub fn add_local(&mut self, name: impl Into<String>, mutable: bool, ty: Type) {
        let name = name.into();
        self.locals.insert(
            name.clone(),
            LocalBinding {
                name,
                mutable,
                ty,
            },
        );
    }

    #[must_use]
    pub fn local_opt(&self, name: &str) -> Option<&LocalBinding> {
        self.locals.get(name)
    }

    /// Replaces the recorded type of an existing local binding.
    pub(crate) fn set_local_ty(&mut self, name: &str, ty: Type) {
        if let Some(binding) = self.locals.get_mut(name) {
            binding.ty = ty;
        }
    }

    // --- type variables ---

    /// Installs a type variable for the current scope, bound to `ty` (a
    /// fresh weak cell for declarations) with its trait bounds recorded.
    pub fn add_tyvar(&mut self, name: impl Into<String>, ty: Type, traits: Vec<Name>) {
        let name = name.into();
        self.tyvars.insert(name.clone(), ty);
        self.tyvar_traits.insert(name, traits);
    }

    #[must_use]
    pub fn tyvar(&self, name: &str) -> Option<&Type> {
        self.tyvars.get(name)
    }

    #[must_use]
    pub fn tyvar_bounds(&self, name: &str) -> &[Name] {
        self.tyvar_traits.get(name).map_or(&[], Vec::as_slice)
    }

    // --- declaration lookups ---

    #[must_use]
    pub fn struct_def(&self, name: &Name) -> Option<&StructDef> {
        self.structs.get(name)
    }

    #[must_use]
    pub fn enum_def(&self, name: &Name) -> Option<&EnumDef> {
        self.enums.get(name)
    }

    #[must_use]
    pub fn abstract_def(&self, name: &Name) -> Option<&AbstractDef> {
        self.abstracts.get(name)
    }

    #[must_use]
    pub fn trait_def(&self, name: &Name) -> Option<&TraitDef> {
        self.traits.get(name)
    }

    #[must_use]
    pub fn fn_sig(&self, name: &Name) -> Option<&FnSig> {
        self.fns.get(name)
    }

    #[must_use]
    pub fn global(&self, name: &Name) -> Option<&GlobalBinding> {
        self.globals.get(name)
    }

    pub(crate) fn set_global_ty(&mut self, name: &Name, ty: Type) {
        if let Some(binding) = self.globals.get_mut(name) {
            binding.ty = ty;
        }
    }

    /// True when an implementation of `trait_name` for `target` is recorded.
    #[must_use]
    pub fn has_impl(&self, trait_name: &Name, target: &Name) -> bool {
        self.impls.contains(&ImplKey {
            trait_name: trait_name.clone(),
            target: target.clone(),
        })
    }
}
