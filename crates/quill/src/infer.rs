//! Type inference over the AST.
//!
//! `Env::check` drives an inference walk that assigns every node a type,
//! then finalizes the tree so no weak cell survives. Scoping is environment
//! cloning: function bodies, match arms and loop bodies each infer inside a
//! clone whose bindings cannot leak back out, while weak-cell resolutions
//! flow through the shared table.
//!
//! Every diagnostic is non-fatal. Failure-adjacent nodes continue with
//! `Unknown`, which unifies with anything, so one error does not cascade.

use indexmap::IndexMap;

use crate::{
    ast::{Ast, AstKind, BinOp, UnaryOp},
    diag::{DiagKind, Loc},
    env::{Env, FnSig, LoopCtx, ParamSig},
    name::Name,
    ty::{Type, Tyvar},
};

impl Env {
    /// Infers the bound AST and returns it with every type slot finalized:
    /// resolved weak cells collapse to their payload, free ones to
    /// `Unknown`.
    #[must_use]
    pub fn check(mut self) -> Ast {
        let mut ast = self.take_ast();
        self.infer(&mut ast);
        let weaks = self.weaks.clone();
        ast.map_types(&mut |t| t.finalize(&weaks));
        ast
    }

    /// Infers one node, records the result in its `ty` slot, and returns it.
    pub fn infer(&mut self, x: &mut Ast) -> Type {
        let from = x.from;
        let to = x.to;
        let ty = self.infer_kind(&mut x.kind, from, to);
        x.ty = ty.clone();
        ty
    }

    fn infer_kind(&mut self, kind: &mut AstKind, from: Loc, to: Loc) -> Type {
        match kind {
            // --- literals ---
            AstKind::Int { int_ty, .. } => {
                if int_ty.width == 64 {
                    Type::Long
                } else {
                    Type::Int
                }
            }
            AstKind::Double(_) => Type::Double,
            AstKind::Float(_) => Type::Float,
            AstKind::Str(_) => Type::String,
            AstKind::Bool(_) => Type::Bool,
            AstKind::Char(_) => Type::Char,
            AstKind::Byte(_) => Type::Byte,
            AstKind::ByteStr(_) => Type::Bytes,
            AstKind::Unit | AstKind::Leaf => Type::Unit,
            AstKind::Fstr(parts) => {
                // Interpolated parts may have any type; formatting is the
                // backend's concern.
                for part in parts {
                    self.infer(part);
                }
                Type::String
            }
            AstKind::Arr(elems) => {
                let mut elem = self.weaks.fresh_ty();
                for e in elems.iter_mut() {
                    let t = self.infer(e);
                    elem = self.unify(&elem, &t, e.from, e.to);
                }
                Type::FixedArray(Box::new(elem))
            }

            // --- expressions ---
            AstKind::Block(items) => {
                let Some((last, rest)) = items.split_last_mut() else {
                    return Type::Unit;
                };
                for item in rest {
                    self.infer(item);
                }
                self.infer(last)
            }
            AstKind::If { cond, then, els } => {
                let ct = self.infer(cond);
                self.unify(&ct, &Type::Bool, cond.from, cond.to);
                let tt = self.infer(then);
                match els {
                    Some(e) => {
                        let et = self.infer(e);
                        self.unify(&tt, &et, from, to)
                    }
                    None => self.unify(&tt, &Type::Unit, then.from, then.to),
                }
            }
            AstKind::Match { subject, arms } => {
                let st = self.infer(subject);
                let mut result: Option<Type> = None;
                for arm in arms.iter_mut() {
                    let mut child = self.clone();
                    child.bind_pattern(&mut arm.pattern, &st);
                    let bt = child.infer(&mut arm.body);
                    result = Some(match result {
                        None => bt,
                        Some(r) => self.unify(&r, &bt, arm.body.from, arm.body.to),
                    });
                }
                result.unwrap_or(Type::Unit)
            }
            AstKind::Is { expr, pattern } => {
                let t = self.infer(expr);
                let mut child = self.clone();
                child.bind_pattern(pattern, &t);
                Type::Bool
            }
            AstKind::TupleMake(elems) => {
                let tys = elems.iter_mut().map(|e| self.infer(e)).collect();
                Type::Tuple(tys)
            }
            AstKind::TupleAccess { tuple, index } => {
                let index = *index;
                let tt = self.infer(tuple).deweak(&self.weaks);
                match tt {
                    Type::Tuple(ts) => {
                        if let Some(t) = ts.get(index as usize) {
                            t.clone()
                        } else {
                            self.diags.error(
                                DiagKind::NotATuple,
                                format!("tuple index {index} out of range for {}-tuple", ts.len()),
                                from,
                                to,
                            );
                            Type::Unknown
                        }
                    }
                    other => {
                        self.diags.error(
                            DiagKind::NotATuple,
                            format!("expected a tuple, got {other}"),
                            from,
                            to,
                        );
                        Type::Unknown
                    }
                }
            }
            AstKind::Return(value) => {
                let rt = match value {
                    Some(e) => self.infer(e),
                    None => Type::Unit,
                };
                match self.curr_ret.clone() {
                    Some(want) => {
                        self.unify(&want, &rt, from, to);
                    }
                    None => {
                        self.diags
                            .error(DiagKind::ReturnOutsideFn, "return outside of a function", from, to);
                    }
                }
                // The expression diverges, so it fits any context.
                self.weaks.fresh_ty()
            }
            AstKind::Break(value) => {
                let broke = value.as_mut().map(|e| {
                    let t = self.infer(e);
                    (t, e.from, e.to)
                });
                match self.curr_for.clone() {
                    Some(ctx) => {
                        if let Some((t, bf, bt)) = broke {
                            self.unify(&t, &ctx.exit, bf, bt);
                        }
                    }
                    None => {
                        self.diags
                            .error(DiagKind::BreakOutsideLoop, "break outside of a loop", from, to);
                    }
                }
                self.weaks.fresh_ty()
            }
            AstKind::Continue(exprs) => {
                match self.curr_for.clone() {
                    Some(ctx) => {
                        if exprs.len() > ctx.vars.len() {
                            self.diags.error(
                                DiagKind::TooManyContinueValues,
                                format!(
                                    "continue takes at most {} values here, got {}",
                                    ctx.vars.len(),
                                    exprs.len()
                                ),
                                from,
                                to,
                            );
                        }
                        for (i, e) in exprs.iter_mut().enumerate() {
                            let t = self.infer(e);
                            if let Some(var) = ctx.vars.get(i) {
                                let vt = self.local_opt(var).map_or(Type::Unknown, |b| b.ty.clone());
                                self.unify(&t, &vt, e.from, e.to);
                            }
                        }
                    }
                    None => {
                        for e in exprs.iter_mut() {
                            self.infer(e);
                        }
                        self.diags
                            .error(DiagKind::ContinueOutsideLoop, "continue outside of a loop", from, to);
                    }
                }
                self.weaks.fresh_ty()
            }
            AstKind::EnumConstr { name, variant, args } => {
                let name = name.clone();
                let variant = variant.clone();
                let resolved = self.resolve(&name);
                let Some(def) = self.enum_def(&resolved).cloned() else {
                    for a in args.iter_mut() {
                        self.infer(a);
                    }
                    self.diags
                        .error(DiagKind::UnknownType, format!("unknown type: {name}"), from, to);
                    return Type::Unknown;
                };
                let (subst, targs) = self.fresh_args(&def.tyvars);
                let Some(vdef) = def.variants.iter().find(|v| v.name == variant) else {
                    for a in args.iter_mut() {
                        self.infer(a);
                    }
                    self.diags.error(
                        DiagKind::UnknownVariant,
                        format!("enum {} has no variant {variant}", def.name),
                        from,
                        to,
                    );
                    return Type::Enum(def.name.clone(), targs);
                };
                if args.len() != vdef.args.len() {
                    self.diags.error(
                        DiagKind::ArityMismatch,
                        format!("variant {variant} expects {} arguments, got {}", vdef.args.len(), args.len()),
                        from,
                        to,
                    );
                }
                for (a, want) in args.iter_mut().zip(&vdef.args) {
                    let at = self.infer(a);
                    let want = want.instantiate(&subst);
                    self.unify(&at, &want, a.from, a.to);
                }
                for a in args.iter_mut().skip(vdef.args.len()) {
                    self.infer(a);
                }
                Type::Enum(def.name.clone(), targs)
            }
            AstKind::StructInit { name, fields } => {
                let name = name.clone();
                let resolved = self.resolve(&name);
                let Some(def) = self.struct_def(&resolved).cloned() else {
                    for (_, v) in fields.iter_mut() {
                        self.infer(v);
                    }
                    self.diags
                        .error(DiagKind::UnknownType, format!("unknown type: {name}"), from, to);
                    return Type::Unknown;
                };
                let (subst, targs) = self.fresh_args(&def.tyvars);
                let mut seen: Vec<String> = Vec::new();
                for (fname, fexpr) in fields.iter_mut() {
                    let ft = self.infer(fexpr);
                    match def.fields.iter().find(|f| f.name == *fname) {
                        Some(fd) => {
                            let want = fd.ty.instantiate(&subst);
                            self.unify(&ft, &want, fexpr.from, fexpr.to);
                            seen.push(fname.clone());
                        }
                        None => self.diags.error(
                            DiagKind::UnknownField,
                            format!("struct {} has no field {fname}", def.name),
                            fexpr.from,
                            fexpr.to,
                        ),
                    }
                }
                for fd in &def.fields {
                    if !seen.contains(&fd.name) {
                        self.diags.error(
                            DiagKind::MissingField,
                            format!("missing field {} in {} initializer", fd.name, def.name),
                            from,
                            to,
                        );
                    }
                }
                Type::Struct(def.name.clone(), targs)
            }
            AstKind::StructModif { base, fields } => {
                let bt = self.infer(base);
                let bd = bt.deweak(&self.weaks);
                match &bd {
                    Type::Struct(n, targs) => {
                        let resolved = self.resolve(n);
                        let def = self.struct_def(&resolved).cloned();
                        let subst = def.as_ref().map(|d| {
                            d.tyvars
                                .iter()
                                .zip(targs)
                                .map(|(tv, a)| (tv.name.clone(), a.clone()))
                                .collect::<IndexMap<_, _>>()
                        });
                        for (fname, fexpr) in fields.iter_mut() {
                            let ft = self.infer(fexpr);
                            let field = def
                                .as_ref()
                                .and_then(|d| d.fields.iter().find(|f| f.name == *fname).cloned());
                            match (field, &subst) {
                                (Some(fd), Some(subst)) => {
                                    let want = fd.ty.instantiate(subst);
                                    self.unify(&ft, &want, fexpr.from, fexpr.to);
                                }
                                _ => self.diags.error(
                                    DiagKind::UnknownField,
                                    format!("struct {n} has no field {fname}"),
                                    fexpr.from,
                                    fexpr.to,
                                ),
                            }
                        }
                    }
                    other => {
                        for (_, fexpr) in fields.iter_mut() {
                            self.infer(fexpr);
                        }
                        self.diags.error(
                            DiagKind::NotAStruct,
                            format!("expected a struct, got {other}"),
                            base.from,
                            base.to,
                        );
                    }
                }
                bt
            }
            AstKind::FieldRef { base, field } => {
                let field = field.clone();
                let bd = self.infer(base).deweak(&self.weaks);
                match &bd {
                    Type::Struct(n, targs) => {
                        let resolved = self.resolve(n);
                        let Some(def) = self.struct_def(&resolved).cloned() else {
                            self.diags
                                .error(DiagKind::UnknownType, format!("unknown type: {n}"), from, to);
                            return Type::Unknown;
                        };
                        let subst: IndexMap<String, Type> = def
                            .tyvars
                            .iter()
                            .zip(targs)
                            .map(|(tv, a)| (tv.name.clone(), a.clone()))
                            .collect();
                        match def.fields.iter().find(|f| f.name == field) {
                            Some(fd) => fd.ty.instantiate(&subst),
                            None => {
                                self.diags.error(
                                    DiagKind::UnknownField,
                                    format!("struct {} has no field {field}", def.name),
                                    from,
                                    to,
                                );
                                Type::Unknown
                            }
                        }
                    }
                    other => {
                        self.diags.error(
                            DiagKind::NotAStruct,
                            format!("expected a struct, got {other}"),
                            base.from,
                            base.to,
                        );
                        Type::Unknown
                    }
                }
            }
            AstKind::ArrAccess { base, index } => {
                let it = self.infer(index);
                self.unify(&it, &Type::Int, index.from, index.to);
                let bt = self.infer(base);
                match bt.deweak(&self.weaks) {
                    Type::FixedArray(elem) => *elem,
                    Type::Bytes => Type::Byte,
                    Type::String => Type::Char,
                    Type::Weak(_) => {
                        // Unresolved container: constrain it to an array.
                        let elem = self.weaks.fresh_ty();
                        self.unify(&bt, &Type::FixedArray(Box::new(elem.clone())), base.from, base.to);
                        elem
                    }
                    other => {
                        self.diags.error(
                            DiagKind::CannotUnify,
                            format!("type {other} cannot be indexed"),
                            from,
                            to,
                        );
                        Type::Unknown
                    }
                }
            }
            AstKind::View { base, start, stop } => {
                for bound in [start, stop].into_iter().flatten() {
                    let t = self.infer(bound);
                    self.unify(&t, &Type::Int, bound.from, bound.to);
                }
                self.infer(base)
            }
            AstKind::Call { callee, args, kwargs } => {
                // A named callee with a declared signature binds keyword
                // arguments by name.
                if let AstKind::VarRef(name) = &callee.kind
                    && let Some(sig) = self.named_fn_sig(&name.clone())
                {
                    let inst = self.instantiate_sig(&sig);
                    callee.ty = inst.ty();
                    return self.bind_call(&inst, args, kwargs, from, to);
                }
                let ct = self.infer(callee).deweak(&self.weaks);
                if !kwargs.is_empty() {
                    for (_, e) in kwargs.iter_mut() {
                        self.infer(e);
                    }
                    self.diags.error(
                        DiagKind::UnknownKwarg,
                        "named arguments require a callee with a declared signature",
                        from,
                        to,
                    );
                }
                match ct {
                    Type::Function(params, ret) => {
                        if args.len() != params.len() {
                            self.diags.error(
                                DiagKind::ArityMismatch,
                                format!("expected {} arguments, got {}", params.len(), args.len()),
                                from,
                                to,
                            );
                        }
                        for (i, a) in args.iter_mut().enumerate() {
                            let at = self.infer(a);
                            if let Some(want) = params.get(i) {
                                self.unify(&at, want, a.from, a.to);
                            }
                        }
                        *ret
                    }
                    Type::Weak(id) => {
                        // Free callee: it must be a function of the argument
                        // types; the fresh cell is the call's result.
                        let arg_tys: Vec<Type> = args.iter_mut().map(|a| self.infer(a)).collect();
                        let ret = self.weaks.fresh_ty();
                        let fty = Type::Function(arg_tys, Box::new(ret.clone()));
                        self.unify(&Type::Weak(id), &fty, from, to);
                        ret
                    }
                    Type::Unknown => {
                        for a in args.iter_mut() {
                            self.infer(a);
                        }
                        Type::Unknown
                    }
                    other => {
                        for a in args.iter_mut() {
                            self.infer(a);
                        }
                        self.diags.error(
                            DiagKind::CallNonFunction,
                            format!("calling a non-function type {other}"),
                            from,
                            to,
                        );
                        Type::Unit
                    }
                }
            }
            AstKind::ChainCall {
                recv,
                method,
                args,
                kwargs,
            } => {
                let method = method.clone();
                let rt = self.infer(recv);
                let rd = rt.deweak(&self.weaks);
                let owner = rd.name().map(|n| self.resolve(&n));
                let sig = owner.as_ref().and_then(|o| self.method_sig(o, &method).cloned());
                let Some(sig) = sig else {
                    for a in args.iter_mut() {
                        self.infer(a);
                    }
                    for (_, e) in kwargs.iter_mut() {
                        self.infer(e);
                    }
                    self.diags.error(
                        DiagKind::UnknownMethod,
                        format!("type {rd} has no method {method}"),
                        from,
                        to,
                    );
                    return Type::Unknown;
                };
                let inst = self.instantiate_sig(&sig);
                let Some((recv_param, rest)) = inst.args.split_first() else {
                    self.diags.error(
                        DiagKind::ArityMismatch,
                        format!("method {method} takes no receiver"),
                        from,
                        to,
                    );
                    return inst.ret;
                };
                self.unify(&rt, &recv_param.ty, recv.from, recv.to);
                let rest_sig = FnSig {
                    args: rest.to_vec(),
                    kwargs: inst.kwargs.clone(),
                    ret: inst.ret.clone(),
                };
                self.bind_call(&rest_sig, args, kwargs, from, to)
            }
            AstKind::Unary { op, expr } => {
                let op = *op;
                let t = self.infer(expr);
                match op {
                    UnaryOp::Not => {
                        self.unify(&t, &Type::Bool, expr.from, expr.to);
                        Type::Bool
                    }
                    UnaryOp::Neg => t,
                }
            }
            AstKind::Binary { op, lhs, rhs } => {
                let op = *op;
                let lt = self.infer(lhs);
                let rt = self.infer(rhs);
                let joined = self.unify(&lt, &rt, from, to);
                if op.yields_bool() {
                    Type::Bool
                } else if op == BinOp::Assign {
                    Type::Unit
                } else {
                    joined
                }
            }
            AstKind::BinaryInplace { lhs, rhs, .. } => {
                let lt = self.infer(lhs);
                let rt = self.infer(rhs);
                self.unify(&lt, &rt, from, to);
                Type::Unit
            }
            AstKind::VarRef(name) => {
                if name.is_standalone()
                    && let Some(binding) = self.local_opt(&name.name)
                {
                    return binding.ty.clone();
                }
                let name = name.clone();
                let resolved = self.resolve(&name);
                if let Some(sig) = self.fn_sig(&resolved) {
                    return sig.ty();
                }
                if let Some(global) = self.global(&resolved) {
                    return global.ty.clone();
                }
                self.diags
                    .error(DiagKind::UnknownIdent, format!("unknown identifier: {name}"), from, to);
                Type::Unknown
            }

            // --- declarations ---
            AstKind::VarDecl {
                name,
                mutable,
                ann,
                init,
            } => {
                let it = self.infer(init);
                let ty = match ann.clone() {
                    Some(a) => self.unify(&a, &it, from, to),
                    None => it,
                };
                let name = name.clone();
                let mutable = *mutable;
                self.add_local(name, mutable, ty);
                Type::Unit
            }
            AstKind::GlobalDecl { name, ann, init, .. } => {
                let it = self.infer(init);
                let ty = match ann.clone() {
                    Some(a) => self.unify(&a, &it, from, to),
                    None => it,
                };
                let name = name.clone();
                self.set_global_ty(&name, ty);
                Type::Unit
            }
            AstKind::TupleDecl { names, init } => {
                let it = self.infer(init);
                let freshes: Vec<Type> = names.iter().map(|_| self.weaks.fresh_ty()).collect();
                self.unify(&Type::Tuple(freshes.clone()), &it, from, to);
                let names = names.clone();
                for (n, t) in names.into_iter().zip(freshes) {
                    self.add_local(n, false, t);
                }
                Type::Unit
            }
            AstKind::StructLet {
                struct_name,
                fields,
                init,
            } => {
                let it = self.infer(init);
                let struct_name = struct_name.clone();
                let resolved = self.resolve(&struct_name);
                match self.struct_def(&resolved).cloned() {
                    Some(def) => {
                        let (subst, targs) = self.fresh_args(&def.tyvars);
                        self.unify(&Type::Struct(def.name.clone(), targs), &it, from, to);
                        for fname in fields.clone() {
                            match def.fields.iter().find(|f| f.name == fname) {
                                Some(fd) => {
                                    let ty = fd.ty.instantiate(&subst);
                                    self.add_local(fname, false, ty);
                                }
                                None => self.diags.error(
                                    DiagKind::UnknownField,
                                    format!("struct {} has no field {fname}", def.name),
                                    from,
                                    to,
                                ),
                            }
                        }
                    }
                    None => self.diags.error(
                        DiagKind::UnknownType,
                        format!("unknown type: {struct_name}"),
                        from,
                        to,
                    ),
                }
                Type::Unit
            }
            AstKind::EnumLet {
                enum_name,
                variant,
                binders,
                init,
            } => {
                let it = self.infer(init);
                let enum_name = enum_name.clone();
                let variant = variant.clone();
                let resolved = self.resolve(&enum_name);
                match self.enum_def(&resolved).cloned() {
                    Some(def) => {
                        let (subst, targs) = self.fresh_args(&def.tyvars);
                        self.unify(&Type::Enum(def.name.clone(), targs), &it, from, to);
                        match def.variants.iter().find(|v| v.name == variant) {
                            Some(vdef) => {
                                if binders.len() != vdef.args.len() {
                                    self.diags.error(
                                        DiagKind::ArityMismatch,
                                        format!(
                                            "variant {variant} has {} fields, pattern binds {}",
                                            vdef.args.len(),
                                            binders.len()
                                        ),
                                        from,
                                        to,
                                    );
                                }
                                for (binder, want) in binders.clone().into_iter().zip(&vdef.args) {
                                    let ty = want.instantiate(&subst);
                                    self.add_local(binder, false, ty);
                                }
                            }
                            None => self.diags.error(
                                DiagKind::UnknownVariant,
                                format!("enum {} has no variant {variant}", def.name),
                                from,
                                to,
                            ),
                        }
                    }
                    None => self.diags.error(
                        DiagKind::UnknownType,
                        format!("unknown type: {enum_name}"),
                        from,
                        to,
                    ),
                }
                Type::Unit
            }
            AstKind::FnDecl {
                name,
                tyvars,
                params,
                ret,
                body,
            } => {
                let mut inner = self.clone();
                inner.curr_fn = Some(name.clone());
                inner.curr_for = None;
                for tv in tyvars.iter() {
                    let cell = inner.weaks.fresh_ty();
                    inner.add_tyvar(tv.name.clone(), cell, tv.traits.clone());
                }
                for p in params.iter_mut() {
                    let pty = {
                        let AstKind::Param { name: pname, ann, default, .. } = &mut p.kind else {
                            continue;
                        };
                        let pty = ann.clone().unwrap_or(Type::Unknown).weaken(&inner.weaks);
                        if let Some(d) = default {
                            let dt = inner.infer(d);
                            inner.unify(&dt, &pty, d.from, d.to);
                        }
                        let pname = pname.clone();
                        inner.add_local(pname, false, pty.clone());
                        pty
                    };
                    p.ty = pty;
                }
                let rty = ret.clone().unwrap_or(Type::Unknown).weaken(&inner.weaks);
                inner.curr_ret = Some(rty.clone());
                let bt = inner.infer(body);
                inner.unify(&rty, &bt, body.from, body.to);
                Type::Unit
            }
            AstKind::Param { ann, .. } => ann.clone().unwrap_or(Type::Unknown),
            AstKind::Impl { target, fns, .. } => {
                let target = target.clone();
                let mut inner = self.clone();
                let target_ty = inner.lookup_type(&target, &[]);
                if !matches!(target_ty, Type::Unknown) {
                    inner.add_alias(Name::local("Self"), target_ty);
                }
                for func in fns.iter_mut() {
                    inner.infer(func);
                }
                Type::Unit
            }
            AstKind::StructDecl { .. }
            | AstKind::TraitDecl { .. }
            | AstKind::EnumDecl { .. }
            | AstKind::AbstractDecl { .. }
            | AstKind::Typealias { .. }
            | AstKind::Fnalias { .. } => {
                // Top-level declarations were installed by `bind`; nested
                // ones are installed into the current scope here.
                self.install_kind(kind);
                Type::Unit
            }

            // --- control flow ---
            AstKind::While { cond, body, exit } => {
                let ct = self.infer(cond);
                self.unify(&ct, &Type::Bool, cond.from, cond.to);
                let mut inner = self.clone();
                let exit_ty = inner.weaks.fresh_ty();
                inner.curr_for = Some(LoopCtx {
                    vars: Vec::new(),
                    exit: exit_ty.clone(),
                });
                let bt = inner.infer(body);
                inner.unify(&bt, &Type::Unit, body.from, body.to);
                match exit {
                    Some(e) => {
                        let et = inner.infer(e);
                        inner.unify(&et, &exit_ty, e.from, e.to)
                    }
                    None => Type::Unit,
                }
            }
            AstKind::For {
                starts,
                stop,
                steps,
                body,
                exit,
            } => {
                let mut inner = self.clone();
                let mut vars: Vec<String> = Vec::new();
                for s in starts.iter_mut() {
                    if let AstKind::VarDecl { name, .. } = &s.kind {
                        vars.push(name.clone());
                    }
                    inner.infer(s);
                }
                let exit_ty = inner.weaks.fresh_ty();
                inner.curr_for = Some(LoopCtx {
                    vars: vars.clone(),
                    exit: exit_ty.clone(),
                });
                if let Some(s) = stop {
                    let st = inner.infer(s);
                    inner.unify(&st, &Type::Bool, s.from, s.to);
                }
                for step in steps.iter_mut() {
                    inner.infer_step(step, &vars);
                }
                let bt = inner.infer(body);
                inner.unify(&bt, &Type::Unit, body.from, body.to);
                match exit {
                    Some(e) => {
                        let et = inner.infer(e);
                        inner.unify(&et, &exit_ty, e.from, e.to)
                    }
                    None => Type::Unit,
                }
            }
            AstKind::ForIn { vars, iter, body } => {
                let it = self.infer(iter);
                let id = it.deweak(&self.weaks);
                if vars.len() > 2 {
                    self.diags.error(
                        DiagKind::TooManyLoopVars,
                        format!("for-in supports at most two variables, got {}", vars.len()),
                        from,
                        to,
                    );
                }
                let owner = id.name().map(|n| self.resolve(&n));
                let binder_tys: Vec<Type> = if vars.len() <= 1 {
                    let elem = self.weaks.fresh_ty();
                    let expected = Type::Function(
                        vec![it.clone()],
                        Box::new(Type::Struct(Name::builtin("Iter"), vec![elem.clone()])),
                    );
                    match owner.as_ref().and_then(|o| self.method_sig(o, "iter").cloned()) {
                        Some(sig) => {
                            let inst = self.instantiate_sig(&sig);
                            self.unify(&inst.ty(), &expected, iter.from, iter.to);
                        }
                        None => self.diags.error(
                            DiagKind::NotIterable,
                            format!("type {id} has no iter method"),
                            iter.from,
                            iter.to,
                        ),
                    }
                    vec![elem]
                } else {
                    let key = self.weaks.fresh_ty();
                    let value = self.weaks.fresh_ty();
                    let expected = Type::Function(
                        vec![it.clone()],
                        Box::new(Type::Struct(
                            Name::builtin("Iter2"),
                            vec![key.clone(), value.clone()],
                        )),
                    );
                    match owner.as_ref().and_then(|o| self.method_sig(o, "iter2").cloned()) {
                        Some(sig) => {
                            let inst = self.instantiate_sig(&sig);
                            self.unify(&inst.ty(), &expected, iter.from, iter.to);
                        }
                        None => self.diags.error(
                            DiagKind::NotIterable,
                            format!("type {id} has no iter2 method"),
                            iter.from,
                            iter.to,
                        ),
                    }
                    vec![key, value]
                };
                let mut inner = self.clone();
                inner.curr_for = Some(LoopCtx {
                    vars: vars.iter().cloned().collect(),
                    exit: inner.weaks.fresh_ty(),
                });
                for (name, ty) in vars.iter().zip(binder_tys) {
                    inner.add_local(name.clone(), false, ty);
                }
                let bt = inner.infer(body);
                inner.unify(&bt, &Type::Unit, body.from, body.to);
                Type::Unit
            }
            AstKind::Guard { cond, els } => {
                let ct = self.infer(cond);
                self.unify(&ct, &Type::Bool, cond.from, cond.to);
                if let Some(e) = els {
                    self.infer(e);
                }
                Type::Unit
            }
            AstKind::IncRange { lo, hi } | AstKind::ExcRange { lo, hi } => {
                let lt = self.infer(lo);
                let ht = self.infer(hi);
                let joined = self.unify(&lt, &ht, from, to);
                let elem = match joined.deweak(&self.weaks) {
                    t @ (Type::Int | Type::Long) => t,
                    Type::Weak(_) => {
                        // Unconstrained endpoints default to Int.
                        self.unify(&joined, &Type::Int, from, to);
                        Type::Int
                    }
                    other => {
                        self.diags.error(
                            DiagKind::NonIntegralRange,
                            format!("range endpoints must be Int or Long, got {other}"),
                            from,
                            to,
                        );
                        Type::Int
                    }
                };
                Type::Struct(Name::builtin("Iter"), vec![elem])
            }
            AstKind::FFIBody(_) => self.weaks.fresh_ty(),
            AstKind::Test { body, .. } => {
                let mut inner = self.clone();
                inner.curr_fn = None;
                inner.curr_ret = None;
                let bt = inner.infer(body);
                inner.unify(&bt, &Type::Unit, body.from, body.to);
                Type::Unit
            }
        }
    }

    /// One step expression of a C-style loop: it must assign a declared
    /// induction variable, whose recorded type joins with the step's value.
    fn infer_step(&mut self, step: &mut Ast, vars: &[String]) {
        let stepped = {
            let (target, rhs) = match &mut step.kind {
                AstKind::Binary {
                    op: BinOp::Assign,
                    lhs,
                    rhs,
                } => (lhs, rhs),
                AstKind::BinaryInplace { lhs, rhs, .. } => (lhs, rhs),
                _ => {
                    self.diags.error(
                        DiagKind::UnknownInductionVar,
                        "loop step must assign an induction variable",
                        step.from,
                        step.to,
                    );
                    self.infer(step);
                    return;
                }
            };
            let var = match &target.kind {
                AstKind::VarRef(n) if n.is_standalone() && vars.contains(&n.name) => Some(n.name.clone()),
                _ => None,
            };
            match var {
                Some(var) => {
                    let vt = self.local_opt(&var).map_or(Type::Unknown, |b| b.ty.clone());
                    target.ty = vt.clone();
                    let rt = self.infer(rhs);
                    let joined = self.unify(&rt, &vt, rhs.from, rhs.to);
                    self.set_local_ty(&var, joined);
                    true
                }
                None => {
                    self.diags.error(
                        DiagKind::UnknownInductionVar,
                        "unknown induction variable in loop step",
                        target.from,
                        target.to,
                    );
                    self.infer(rhs);
                    false
                }
            }
        };
        if stepped {
            step.ty = Type::Unit;
        }
    }

    /// Binds `pat` against the type the scrutinee was inferred to.
    ///
    /// `VarRef` binds a fresh local (`_` binds nothing), tuple and
    /// constructor patterns destructure, and everything else falls back to
    /// infer-and-unify (literals compare by type).
    pub(crate) fn bind_pattern(&mut self, pat: &mut Ast, expected: &Type) {
        let from = pat.from;
        let to = pat.to;
        match &mut pat.kind {
            AstKind::VarRef(n) if n.is_standalone() => {
                if n.name != "_" {
                    let name = n.name.clone();
                    self.add_local(name, false, expected.clone());
                }
                pat.ty = expected.clone();
            }
            AstKind::TupleMake(elems) => {
                let freshes: Vec<Type> = elems.iter().map(|_| self.weaks.fresh_ty()).collect();
                let joined = self.unify(&Type::Tuple(freshes.clone()), expected, from, to);
                let elem_tys = match joined.deweak(&self.weaks) {
                    Type::Tuple(ts) if ts.len() == elems.len() => ts,
                    _ => freshes,
                };
                for (e, t) in elems.iter_mut().zip(elem_tys) {
                    self.bind_pattern(e, &t);
                }
                pat.ty = expected.clone();
            }
            AstKind::EnumConstr { name, variant, args } => {
                let name = name.clone();
                let variant = variant.clone();
                let resolved = self.resolve(&name);
                let Some(def) = self.enum_def(&resolved).cloned() else {
                    self.diags
                        .error(DiagKind::UnknownType, format!("unknown type: {name}"), from, to);
                    return;
                };
                let (subst, targs) = self.fresh_args(&def.tyvars);
                let et = Type::Enum(def.name.clone(), targs);
                self.unify(&et, expected, from, to);
                match def.variants.iter().find(|v| v.name == variant) {
                    Some(vdef) => {
                        if args.len() != vdef.args.len() {
                            self.diags.error(
                                DiagKind::ArityMismatch,
                                format!(
                                    "variant {variant} has {} fields, pattern binds {}",
                                    vdef.args.len(),
                                    args.len()
                                ),
                                from,
                                to,
                            );
                        }
                        for (a, want) in args.iter_mut().zip(&vdef.args) {
                            let want = want.instantiate(&subst);
                            self.bind_pattern(a, &want);
                        }
                    }
                    None => self.diags.error(
                        DiagKind::UnknownVariant,
                        format!("enum {} has no variant {variant}", def.name),
                        from,
                        to,
                    ),
                }
                pat.ty = et;
            }
            AstKind::StructInit { name, fields } => {
                let name = name.clone();
                let resolved = self.resolve(&name);
                let Some(def) = self.struct_def(&resolved).cloned() else {
                    self.diags
                        .error(DiagKind::UnknownType, format!("unknown type: {name}"), from, to);
                    return;
                };
                let (subst, targs) = self.fresh_args(&def.tyvars);
                let st = Type::Struct(def.name.clone(), targs);
                self.unify(&st, expected, from, to);
                for (fname, fpat) in fields.iter_mut() {
                    match def.fields.iter().find(|f| f.name == *fname) {
                        Some(fd) => {
                            let want = fd.ty.instantiate(&subst);
                            self.bind_pattern(fpat, &want);
                        }
                        None => self.diags.error(
                            DiagKind::UnknownField,
                            format!("struct {} has no field {fname}", def.name),
                            fpat.from,
                            fpat.to,
                        ),
                    }
                }
                pat.ty = st;
            }
            _ => {
                let t = self.infer(pat);
                self.unify(&t, expected, from, to);
            }
        }
    }

    /// Positional-then-keyword argument binding against an instantiated
    /// signature. Positional arguments may be omitted only for parameters
    /// with defaults; keyword arguments match by name, unknown and missing
    /// required ones are reported.
    fn bind_call(&mut self, sig: &FnSig, args: &mut [Ast], kwargs: &mut [(String, Ast)], from: Loc, to: Loc) -> Type {
        let required = sig.args.iter().filter(|p| !p.has_default).count();
        if args.len() < required || args.len() > sig.args.len() {
            self.diags.error(
                DiagKind::ArityMismatch,
                format!("expected {} arguments, got {}", sig.args.len(), args.len()),
                from,
                to,
            );
        }
        for (i, a) in args.iter_mut().enumerate() {
            let at = self.infer(a);
            if let Some(param) = sig.args.get(i) {
                self.unify(&at, &param.ty, a.from, a.to);
            }
        }
        let mut bound: Vec<String> = Vec::new();
        for (kname, kexpr) in kwargs.iter_mut() {
            let kt = self.infer(kexpr);
            match sig.kwargs.iter().find(|p| p.name == *kname) {
                Some(param) => {
                    if bound.contains(kname) {
                        self.diags.error(
                            DiagKind::UnknownKwarg,
                            format!("named argument {kname} given more than once"),
                            kexpr.from,
                            kexpr.to,
                        );
                    }
                    self.unify(&kt, &param.ty, kexpr.from, kexpr.to);
                    bound.push(kname.clone());
                }
                None => self.diags.error(
                    DiagKind::UnknownKwarg,
                    format!("unknown named argument: {kname}"),
                    kexpr.from,
                    kexpr.to,
                ),
            }
        }
        for param in &sig.kwargs {
            if !param.has_default && !bound.contains(&param.name) {
                self.diags.error(
                    DiagKind::MissingKwarg,
                    format!("missing required named argument: {}", param.name),
                    from,
                    to,
                );
            }
        }
        sig.ret.clone()
    }

    /// The declared signature a call through `name` binds against, if the
    /// name is not shadowed by a local.
    fn named_fn_sig(&mut self, name: &Name) -> Option<FnSig> {
        if name.is_standalone() && self.local_opt(&name.name).is_some() {
            return None;
        }
        let resolved = self.resolve(name);
        self.fn_sig(&resolved).cloned()
    }

    /// Fresh weak cells for a declaration's type parameters: the
    /// substitution map for member types and the argument list for the
    /// applied type.
    fn fresh_args(&self, tyvars: &[Tyvar]) -> (IndexMap<String, Type>, Vec<Type>) {
        let mut subst = IndexMap::new();
        let mut args = Vec::with_capacity(tyvars.len());
        for tv in tyvars {
            let cell = self.weaks.fresh_ty();
            subst.insert(tv.name.clone(), cell.clone());
            args.push(cell);
        }
        (subst, args)
    }

    /// Replaces each type variable of a declared signature with a fresh weak
    /// cell, so every call site constrains its own copy.
    fn instantiate_sig(&self, sig: &FnSig) -> FnSig {
        let mut names: Vec<String> = Vec::new();
        let mut scan = |t: &Type| {
            t.visit(&mut |n| {
                if let Type::Typevar(v) = n
                    && !names.contains(&v.name)
                {
                    names.push(v.name.clone());
                }
            });
        };
        for p in &sig.args {
            scan(&p.ty);
        }
        for p in &sig.kwargs {
            scan(&p.ty);
        }
        scan(&sig.ret);
        if names.is_empty() {
            return sig.clone();
        }
        let mut subst = IndexMap::new();
        for n in names {
            subst.insert(n, self.weaks.fresh_ty());
        }
        let fix = |p: &ParamSig| ParamSig {
            name: p.name.clone(),
            ty: p.ty.instantiate(&subst),
            has_default: p.has_default,
        };
        FnSig {
            args: sig.args.iter().map(fix).collect(),
            kwargs: sig.kwargs.iter().map(fix).collect(),
            ret: sig.ret.instantiate(&subst),
        }
    }
}
