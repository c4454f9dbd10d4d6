//! The AST consumed by binding and inference.
//!
//! Nodes arrive from the external parser with `ty` slots set to `Unknown`;
//! inference fills them in and `Env::check` finalizes them. Every node keeps
//! its source span (`from`/`to`) and any attributes that were attached to it.

use num_bigint::BigInt;
use smallvec::SmallVec;

use crate::{
    diag::Loc,
    name::Name,
    token::IntTy,
    ty::{Type, Tyvar},
};

/// A binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    And,
    Or,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    Assign,
}

impl BinOp {
    /// True for the operators whose result is `Bool` regardless of the
    /// operand type.
    #[must_use]
    pub fn yields_bool(self) -> bool {
        matches!(
            self,
            Self::And | Self::Or | Self::Lt | Self::Le | Self::Gt | Self::Ge | Self::Eq | Self::Ne
        )
    }
}

/// A unary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// One declared struct field.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub ty: Type,
    pub mutable: bool,
}

/// One declared enum variant with its payload types.
#[derive(Debug, Clone)]
pub struct VariantDef {
    pub name: String,
    pub args: Vec<Type>,
}

/// One arm of a `match` expression.
#[derive(Debug, Clone)]
pub struct MatchArm {
    pub pattern: Ast,
    pub body: Ast,
}

/// A single AST node: its kind with payload, source span, attached
/// attributes, and the inferred-type slot filled during `check`.
#[derive(Debug, Clone)]
pub struct Ast {
    pub kind: AstKind,
    pub from: Loc,
    pub to: Loc,
    pub attrs: Vec<String>,
    pub ty: Type,
}

/// Every construct of the language.
///
/// Patterns reuse expression kinds (`VarRef` binds, literals compare,
/// `EnumConstr`/`TupleMake`/`StructInit` destructure); `VarRef("_")` is the
/// wildcard.
#[derive(Debug, Clone)]
pub enum AstKind {
    // --- declarations ---
    FnDecl {
        name: Name,
        tyvars: Vec<Tyvar>,
        params: Vec<Ast>,
        ret: Option<Type>,
        body: Box<Ast>,
    },
    /// One function parameter. `kw` marks keyword (labelled) parameters,
    /// which are matched by name at call sites and may carry a default.
    Param {
        name: String,
        ann: Option<Type>,
        default: Option<Box<Ast>>,
        kw: bool,
    },
    Impl {
        trait_name: Option<Name>,
        target: Name,
        fns: Vec<Ast>,
    },
    StructDecl {
        name: Name,
        tyvars: Vec<Tyvar>,
        fields: Vec<FieldDef>,
    },
    TraitDecl {
        name: Name,
        methods: Vec<(String, Type)>,
    },
    EnumDecl {
        name: Name,
        tyvars: Vec<Tyvar>,
        variants: Vec<VariantDef>,
    },
    AbstractDecl {
        name: Name,
        tyvars: Vec<Tyvar>,
    },
    GlobalDecl {
        name: Name,
        mutable: bool,
        ann: Option<Type>,
        init: Box<Ast>,
    },
    VarDecl {
        name: String,
        mutable: bool,
        ann: Option<Type>,
        init: Box<Ast>,
    },
    /// `let (a, b) = …` tuple destructuring.
    TupleDecl { names: Vec<String>, init: Box<Ast> },
    /// `let {x, y} = …` struct destructuring.
    StructLet {
        struct_name: Name,
        fields: Vec<String>,
        init: Box<Ast>,
    },
    /// `let Variant(a, b) = …` irrefutable enum destructuring.
    EnumLet {
        enum_name: Name,
        variant: String,
        binders: Vec<String>,
        init: Box<Ast>,
    },
    Typealias { name: Name, target: Type },
    Fnalias { name: Name, target: Name },

    // --- expressions ---
    Int { value: BigInt, int_ty: IntTy },
    Double(f64),
    Float(f32),
    Str(String),
    /// Interpolated string; parts alternate between `Str` and expressions.
    Fstr(Vec<Ast>),
    Bool(bool),
    Char(char),
    Byte(u8),
    ByteStr(Vec<u8>),
    /// Array literal.
    Arr(Vec<Ast>),
    Unit,
    /// The empty node; placeholder for absent trees.
    Leaf,
    Block(Vec<Ast>),
    If {
        cond: Box<Ast>,
        then: Box<Ast>,
        els: Option<Box<Ast>>,
    },
    Match {
        subject: Box<Ast>,
        arms: Vec<MatchArm>,
    },
    Is {
        expr: Box<Ast>,
        pattern: Box<Ast>,
    },
    TupleMake(Vec<Ast>),
    TupleAccess { tuple: Box<Ast>, index: u32 },
    Return(Option<Box<Ast>>),
    Break(Option<Box<Ast>>),
    Continue(Vec<Ast>),
    EnumConstr {
        name: Name,
        variant: String,
        args: Vec<Ast>,
    },
    StructInit {
        name: Name,
        fields: Vec<(String, Ast)>,
    },
    /// `{ ..base, field: value }` functional update.
    StructModif {
        base: Box<Ast>,
        fields: Vec<(String, Ast)>,
    },
    FieldRef { base: Box<Ast>, field: String },
    ArrAccess { base: Box<Ast>, index: Box<Ast> },
    /// `xs[a:b]` view of an array.
    View {
        base: Box<Ast>,
        start: Option<Box<Ast>>,
        stop: Option<Box<Ast>>,
    },
    Call {
        callee: Box<Ast>,
        args: Vec<Ast>,
        kwargs: Vec<(String, Ast)>,
    },
    /// `recv.method(args)` method call.
    ChainCall {
        recv: Box<Ast>,
        method: String,
        args: Vec<Ast>,
        kwargs: Vec<(String, Ast)>,
    },
    Unary { op: UnaryOp, expr: Box<Ast> },
    Binary {
        op: BinOp,
        lhs: Box<Ast>,
        rhs: Box<Ast>,
    },
    /// `x += e` and friends; desugared semantics of `x = x op e` with the
    /// target evaluated once.
    BinaryInplace {
        op: BinOp,
        lhs: Box<Ast>,
        rhs: Box<Ast>,
    },
    VarRef(Name),

    // --- control flow ---
    While {
        cond: Box<Ast>,
        body: Box<Ast>,
        exit: Option<Box<Ast>>,
    },
    /// C-style loop: induction variables in `starts`, boolean `stop`,
    /// per-iteration `steps`, and an optional `exit` expression evaluated
    /// when the loop leaves normally.
    For {
        starts: Vec<Ast>,
        stop: Option<Box<Ast>>,
        steps: Vec<Ast>,
        body: Box<Ast>,
        exit: Option<Box<Ast>>,
    },
    /// `for x in xs` / `for k, v in m` iteration through `iter`/`iter2`.
    ForIn {
        vars: SmallVec<[String; 2]>,
        iter: Box<Ast>,
        body: Box<Ast>,
    },
    Guard {
        cond: Box<Ast>,
        els: Option<Box<Ast>>,
    },
    /// `a..=b` inclusive range.
    IncRange { lo: Box<Ast>, hi: Box<Ast> },
    /// `a..<b` exclusive range.
    ExcRange { lo: Box<Ast>, hi: Box<Ast> },
    /// Opaque foreign function body.
    FFIBody(String),
    Test { name: Option<String>, body: Box<Ast> },
}

impl Ast {
    pub fn new(kind: AstKind, from: Loc, to: Loc) -> Self {
        Self {
            kind,
            from,
            to,
            attrs: Vec::new(),
            ty: Type::Unknown,
        }
    }

    /// A node with no source position, for synthesized trees.
    pub fn synthetic(kind: AstKind) -> Self {
        Self::new(kind, Loc::unknown(), Loc::unknown())
    }

    /// The empty placeholder node.
    #[must_use]
    pub fn leaf() -> Self {
        Self::synthetic(AstKind::Leaf)
    }

    /// Calls `f` on each direct child, in source order.
    pub fn for_each_child(&self, f: &mut impl FnMut(&Self)) {
        self.kind.for_each_child(f);
    }

    /// Calls `f` on each direct child, mutably, in source order.
    pub fn for_each_child_mut(&mut self, f: &mut impl FnMut(&mut Self)) {
        self.kind.for_each_child_mut(f);
    }

    /// Pre-order traversal of the whole tree.
    pub fn visit(&self, f: &mut impl FnMut(&Self)) {
        f(self);
        self.for_each_child(&mut |c| c.visit(f));
    }

    /// Rewrites every node's inferred-type slot, recursively.
    pub fn map_types(&mut self, f: &mut impl FnMut(&Type) -> Type) {
        self.ty = f(&self.ty);
        self.for_each_child_mut(&mut |c| c.map_types(f));
    }
}

impl AstKind {
    fn for_each_child(&self, f: &mut impl FnMut(&Ast)) {
        use AstKind::*;
        match self {
            FnDecl { params, body, .. } => {
                for p in params {
                    f(p);
                }
                f(body);
            }
            Param { default, .. } => {
                if let Some(d) = default {
                    f(d);
                }
            }
            Impl { fns, .. } => {
                for func in fns {
                    f(func);
                }
            }
            GlobalDecl { init, .. }
            | VarDecl { init, .. }
            | TupleDecl { init, .. }
            | StructLet { init, .. }
            | EnumLet { init, .. } => f(init),
            Fstr(items) | Arr(items) | Block(items) | TupleMake(items) | Continue(items) => {
                for item in items {
                    f(item);
                }
            }
            If { cond, then, els } => {
                f(cond);
                f(then);
                if let Some(e) = els {
                    f(e);
                }
            }
            Match { subject, arms } => {
                f(subject);
                for arm in arms {
                    f(&arm.pattern);
                    f(&arm.body);
                }
            }
            Is { expr, pattern } => {
                f(expr);
                f(pattern);
            }
            TupleAccess { tuple, .. } => f(tuple),
            Return(e) | Break(e) => {
                if let Some(e) = e {
                    f(e);
                }
            }
            EnumConstr { args, .. } => {
                for a in args {
                    f(a);
                }
            }
            StructInit { fields, .. } => {
                for (_, v) in fields {
                    f(v);
                }
            }
            StructModif { base, fields } => {
                f(base);
                for (_, v) in fields {
                    f(v);
                }
            }
            FieldRef { base, .. } => f(base),
            ArrAccess { base, index } => {
                f(base);
                f(index);
            }
            View { base, start, stop } => {
                f(base);
                if let Some(s) = start {
                    f(s);
                }
                if let Some(s) = stop {
                    f(s);
                }
            }
            Call { callee, args, kwargs } => {
                f(callee);
                for a in args {
                    f(a);
                }
                for (_, a) in kwargs {
                    f(a);
                }
            }
            ChainCall { recv, args, kwargs, .. } => {
                f(recv);
                for a in args {
                    f(a);
                }
                for (_, a) in kwargs {
                    f(a);
                }
            }
            Unary { expr, .. } => f(expr),
            Binary { lhs, rhs, .. } | BinaryInplace { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            While { cond, body, exit } => {
                f(cond);
                f(body);
                if let Some(e) = exit {
                    f(e);
                }
            }
            For {
                starts,
                stop,
                steps,
                body,
                exit,
            } => {
                for s in starts {
                    f(s);
                }
                if let Some(s) = stop {
                    f(s);
                }
                for s in steps {
                    f(s);
                }
                f(body);
                if let Some(e) = exit {
                    f(e);
                }
            }
            ForIn { iter, body, .. } => {
                f(iter);
                f(body);
            }
            Guard { cond, els } => {
                f(cond);
                if let Some(e) = els {
                    f(e);
                }
            }
            IncRange { lo, hi } | ExcRange { lo, hi } => {
                f(lo);
                f(hi);
            }
            Test { body, .. } => f(body),
            StructDecl { .. } | TraitDecl { .. } | EnumDecl { .. } | AbstractDecl { .. } | Typealias { .. }
            | Fnalias { .. } | Int { .. } | Double(_) | Float(_) | Str(_) | Bool(_) | Char(_) | Byte(_)
            | ByteStr(_) | Unit | Leaf | VarRef(_) | FFIBody(_) => {}
        }
    }

    fn for_each_child_mut(&mut self, f: &mut impl FnMut(&mut Ast)) {
        use AstKind::*;
        match self {
            FnDecl { params, body, .. } => {
                for p in params {
                    f(p);
                }
                f(body);
            }
            Param { default, .. } => {
                if let Some(d) = default {
                    f(d);
                }
            }
            Impl { fns, .. } => {
                for func in fns {
                    f(func);
                }
            }
            GlobalDecl { init, .. }
            | VarDecl { init, .. }
            | TupleDecl { init, .. }
            | StructLet { init, .. }
            | EnumLet { init, .. } => f(init),
            Fstr(items) | Arr(items) | Block(items) | TupleMake(items) | Continue(items) => {
                for item in items {
                    f(item);
                }
            }
            If { cond, then, els } => {
                f(cond);
                f(then);
                if let Some(e) = els {
                    f(e);
                }
            }
            Match { subject, arms } => {
                f(subject);
                for arm in arms {
                    f(&mut arm.pattern);
                    f(&mut arm.body);
                }
            }
            Is { expr, pattern } => {
                f(expr);
                f(pattern);
            }
            TupleAccess { tuple, .. } => f(tuple),
            Return(e) | Break(e) => {
                if let Some(e) = e {
                    f(e);
                }
            }
            EnumConstr { args, .. } => {
                for a in args {
                    f(a);
                }
            }
            StructInit { fields, .. } => {
                for (_, v) in fields {
                    f(v);
                }
            }
            StructModif { base, fields } => {
                f(base);
                for (_, v) in fields {
                    f(v);
                }
            }
            FieldRef { base, .. } => f(base),
            ArrAccess { base, index } => {
                f(base);
                f(index);
            }
            View { base, start, stop } => {
                f(base);
                if let Some(s) = start {
                    f(s);
                }
                if let Some(s) = stop {
                    f(s);
                }
            }
            Call { callee, args, kwargs } => {
                f(callee);
                for a in args {
                    f(a);
                }
                for (_, a) in kwargs {
                    f(a);
                }
            }
            ChainCall { recv, args, kwargs, .. } => {
                f(recv);
                for a in args {
                    f(a);
                }
                for (_, a) in kwargs {
                    f(a);
                }
            }
            Unary { expr, .. } => f(expr),
            Binary { lhs, rhs, .. } | BinaryInplace { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            While { cond, body, exit } => {
                f(cond);
                f(body);
                if let Some(e) = exit {
                    f(e);
                }
            }
            For {
                starts,
                stop,
                steps,
                body,
                exit,
            } => {
                for s in starts {
                    f(s);
                }
                if let Some(s) = stop {
                    f(s);
                }
                for s in steps {
                    f(s);
                }
                f(body);
                if let Some(e) = exit {
                    f(e);
                }
            }
            ForIn { iter, body, .. } => {
                f(iter);
                f(body);
            }
            Guard { cond, els } => {
                f(cond);
                if let Some(e) = els {
                    f(e);
                }
            }
            IncRange { lo, hi } | ExcRange { lo, hi } => {
                f(lo);
                f(hi);
            }
            Test { body, .. } => f(body),
            StructDecl { .. } | TraitDecl { .. } | EnumDecl { .. } | AbstractDecl { .. } | Typealias { .. }
            | Fnalias { .. } | Int { .. } | Double(_) | Float(_) | Str(_) | Bool(_) | Char(_) | Byte(_)
            | ByteStr(_) | Unit | Leaf | VarRef(_) | FFIBody(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visit_reaches_every_node() {
        let tree = Ast::synthetic(AstKind::Block(vec![
            Ast::synthetic(AstKind::Binary {
                op: BinOp::Add,
                lhs: Box::new(Ast::synthetic(AstKind::Int {
                    value: 1.into(),
                    int_ty: IntTy::default(),
                })),
                rhs: Box::new(Ast::synthetic(AstKind::Int {
                    value: 2.into(),
                    int_ty: IntTy::default(),
                })),
            }),
            Ast::synthetic(AstKind::Unit),
        ]));
        let mut count = 0;
        tree.visit(&mut |_| count += 1);
        assert_eq!(count, 5);
    }

    #[test]
    fn map_types_rewrites_every_slot() {
        let mut tree = Ast::synthetic(AstKind::If {
            cond: Box::new(Ast::synthetic(AstKind::Bool(true))),
            then: Box::new(Ast::synthetic(AstKind::Unit)),
            els: None,
        });
        tree.map_types(&mut |_| Type::Int);
        let mut all_int = true;
        tree.visit(&mut |n| all_int &= n.ty == Type::Int);
        assert!(all_int);
    }
}
