//! Structural type unification.
//!
//! `unify` destructively joins two types: free weak cells resolve in place,
//! free/free pairs alias through the union-find table, and every mismatch is
//! reported through the shared sink while unification continues with
//! `Unknown`. `Unknown` itself is the error-recovery wildcard: it joins
//! with anything silently, so one reported error does not cascade.

use crate::{
    diag::{DiagKind, Loc},
    env::Env,
    name::Name,
    ty::{Type, Tyvar, WeakId},
};

/// Bound on recursive resolution so cyclic alias declarations terminate with
/// a diagnostic instead of blowing the stack.
const MAX_UNIFY_DEPTH: u16 = 64;

impl Env {
    /// Joins `x` and `y`, mutating weak cells in place, and returns the
    /// joined form. Mismatches are reported against the `from..to` span.
    pub fn unify(&mut self, x: &Type, y: &Type, from: Loc, to: Loc) -> Type {
        self.unify_at(x, y, from, to, MAX_UNIFY_DEPTH)
    }

    fn unify_at(&mut self, x: &Type, y: &Type, from: Loc, to: Loc, depth: u16) -> Type {
        use Type::*;

        let Some(depth) = depth.checked_sub(1) else {
            self.diags.error(
                DiagKind::CannotUnify,
                format!("type resolution too deep while unifying {x} with {y}"),
                from,
                to,
            );
            return Unknown;
        };

        match (x, y) {
            // Unknown marks error recovery and missing annotations; it joins
            // with anything and never reports.
            (Unknown, other) | (other, Unknown) => other.clone(),

            (Weak(a), Weak(b)) => self.unify_weak_pair(*a, *b, from, to, depth),
            (Weak(a), other) | (other, Weak(a)) => self.unify_weak(*a, other, from, to, depth),

            (Int, Int) | (Long, Long) | (Float, Float) | (Double, Double) | (Bool, Bool) | (Char, Char)
            | (String, String) | (Byte, Byte) | (Bytes, Bytes) | (Unit, Unit) | (Error, Error) => x.clone(),

            (Tuple(xs), Tuple(ys)) => {
                if xs.len() != ys.len() {
                    self.diags.error(
                        DiagKind::ArityMismatch,
                        format!("cannot unify {}-tuple with {}-tuple", xs.len(), ys.len()),
                        from,
                        to,
                    );
                }
                // Continue with the left arity either way.
                let joined = xs
                    .iter()
                    .enumerate()
                    .map(|(i, xe)| match ys.get(i) {
                        Some(ye) => self.unify_at(xe, ye, from, to, depth),
                        None => xe.clone(),
                    })
                    .collect();
                Tuple(joined)
            }

            (Option(a), Option(b)) => Option(Box::new(self.unify_at(a, b, from, to, depth))),
            (FixedArray(a), FixedArray(b)) => FixedArray(Box::new(self.unify_at(a, b, from, to, depth))),

            (Function(ps, r), Function(qs, s)) => {
                if ps.len() != qs.len() {
                    self.diags.error(
                        DiagKind::ArityMismatch,
                        format!(
                            "cannot unify function with {} parameters with function with {} parameters",
                            ps.len(),
                            qs.len()
                        ),
                        from,
                        to,
                    );
                }
                let params = ps
                    .iter()
                    .enumerate()
                    .map(|(i, p)| match qs.get(i) {
                        Some(q) => self.unify_at(p, q, from, to, depth),
                        None => p.clone(),
                    })
                    .collect();
                let ret = self.unify_at(r, s, from, to, depth);
                Function(params, Box::new(ret))
            }

            (Named(n, args), other) => match self.lookup_named(n, args, from, to) {
                Some(resolved) => self.unify_at(&resolved, other, from, to, depth),
                None => Unknown,
            },
            (other, Named(n, args)) => match self.lookup_named(n, args, from, to) {
                Some(resolved) => self.unify_at(other, &resolved, from, to, depth),
                None => Unknown,
            },

            // Struct and abstract cross-unify: an abstract type is a struct
            // with a hidden representation, so only the resolved names and
            // the type arguments have to agree.
            (Struct(a, xs), Struct(b, ys))
            | (Struct(a, xs), Abstract(b, ys))
            | (Abstract(a, xs), Struct(b, ys))
            | (Abstract(a, xs), Abstract(b, ys))
            | (Enum(a, xs), Enum(b, ys)) => {
                let ra = self.resolve(a);
                let rb = self.resolve(b);
                if ra != rb {
                    self.diags.error(
                        DiagKind::NameMismatch,
                        format!("cannot unify {x} with {y}"),
                        from,
                        to,
                    );
                    return Unknown;
                }
                let args = self.unify_args(xs, ys, from, to, depth);
                match x {
                    Struct(..) => Struct(ra, args),
                    Enum(..) => Enum(ra, args),
                    _ => Abstract(ra, args),
                }
            }

            (Typevar(a), Typevar(b)) if a.name == b.name => x.clone(),
            (Typevar(v), other) => self.unify_tyvar(v, other, false, from, to, depth),
            (other, Typevar(v)) => self.unify_tyvar(v, other, true, from, to, depth),

            (MayError(a), MayError(b)) => MayError(Box::new(self.unify_at(a, b, from, to, depth))),
            (VirtualBase(a), VirtualBase(b)) => VirtualBase(Box::new(self.unify_at(a, b, from, to, depth))),
            (HasError(a, e), HasError(b, f)) => HasError(
                Box::new(self.unify_at(a, b, from, to, depth)),
                Box::new(self.unify_at(e, f, from, to, depth)),
            ),
            // Mixed wrapper/plain joins unify the payloads and keep the left
            // shape; the wrappers themselves carry no unification content.
            (MayError(a), other) => MayError(Box::new(self.unify_at(a, other, from, to, depth))),
            (other, MayError(a)) => self.unify_at(other, a, from, to, depth),
            (VirtualBase(a), other) => VirtualBase(Box::new(self.unify_at(a, other, from, to, depth))),
            (other, VirtualBase(a)) => self.unify_at(other, a, from, to, depth),
            (HasError(a, e), other) => HasError(
                Box::new(self.unify_at(a, other, from, to, depth)),
                Box::new(e.as_ref().clone()),
            ),
            (other, HasError(a, _)) => self.unify_at(other, a, from, to, depth),

            _ => {
                let xd = x.deweak(&self.weaks);
                let yd = y.deweak(&self.weaks);
                self.diags.error(
                    DiagKind::CannotUnify,
                    format!("cannot unify {xd} with {yd}"),
                    from,
                    to,
                );
                Unknown
            }
        }
    }

    fn unify_args(&mut self, xs: &[Type], ys: &[Type], from: Loc, to: Loc, depth: u16) -> Vec<Type> {
        if xs.len() != ys.len() {
            self.diags.error(
                DiagKind::ArityMismatch,
                format!("expected {} type arguments, got {}", xs.len(), ys.len()),
                from,
                to,
            );
        }
        xs.iter()
            .enumerate()
            .map(|(i, xe)| match ys.get(i) {
                Some(ye) => self.unify_at(xe, ye, from, to, depth),
                None => xe.clone(),
            })
            .collect()
    }

    /// Weak ↔ weak: free pairs alias (one identity from then on); a resolved
    /// side donates its payload; two resolved sides unify their payloads.
    fn unify_weak_pair(&mut self, a: WeakId, b: WeakId, from: Loc, to: Loc, depth: u16) -> Type {
        let ra = self.weaks.find(a);
        let rb = self.weaks.find(b);
        if ra == rb {
            return Type::Weak(ra);
        }
        match (self.weaks.probe(ra), self.weaks.probe(rb)) {
            (Some(va), Some(vb)) => self.unify_at(&va, &vb, from, to, depth),
            _ => Type::Weak(self.weaks.alias(ra, rb)),
        }
    }

    /// Weak ↔ concrete: a free cell resolves to the deweaked concrete side
    /// (occurs-checked); a resolved cell re-unifies its payload.
    fn unify_weak(&mut self, id: WeakId, other: &Type, from: Loc, to: Loc, depth: u16) -> Type {
        match self.weaks.probe(id) {
            Some(payload) => self.unify_at(&payload, other, from, to, depth),
            None => {
                let resolved = other.deweak(&self.weaks);
                if self.weaks.occurs(id, &resolved) {
                    self.diags.error(
                        DiagKind::CannotUnify,
                        format!("cannot construct the infinite type {resolved}"),
                        from,
                        to,
                    );
                    return Type::Unknown;
                }
                self.weaks.resolve(id, resolved);
                Type::Weak(self.weaks.find(id))
            }
        }
    }

    fn unify_tyvar(&mut self, v: &Tyvar, other: &Type, flipped: bool, from: Loc, to: Loc, depth: u16) -> Type {
        let Some(bound) = self.tyvar(&v.name).cloned() else {
            self.diags.error(
                DiagKind::UnknownTypevar,
                format!("unknown type variable: {}", v.name),
                from,
                to,
            );
            return Type::Unknown;
        };
        self.check_tyvar_bounds(v, other, from, to);
        if flipped {
            self.unify_at(other, &bound, from, to, depth)
        } else {
            self.unify_at(&bound, other, from, to, depth)
        }
    }

    /// Verifies that `concrete` satisfies each recorded bound of `v`: either
    /// an impl of the bound trait is recorded for the concrete type's name,
    /// or the concrete side is itself a type variable carrying the bound.
    fn check_tyvar_bounds(&mut self, v: &Tyvar, concrete: &Type, from: Loc, to: Loc) {
        let mut bounds: Vec<Name> = v.traits.clone();
        for b in self.tyvar_bounds(&v.name) {
            if !bounds.contains(b) {
                bounds.push(b.clone());
            }
        }
        if bounds.is_empty() {
            return;
        }
        if let Type::Typevar(w) = concrete {
            let mut theirs: Vec<Name> = w.traits.clone();
            for b in self.tyvar_bounds(&w.name) {
                if !theirs.contains(b) {
                    theirs.push(b.clone());
                }
            }
            for bound in bounds {
                if !theirs.contains(&bound) {
                    self.diags.error(
                        DiagKind::UnmetTraitBound,
                        format!("type variable {} does not carry bound {bound}", w.name),
                        from,
                        to,
                    );
                }
            }
            return;
        }
        let Some(target) = concrete.name() else {
            return;
        };
        for bound in bounds {
            let bound = self.resolve(&bound);
            if !self.has_impl(&bound, &target) && !self.has_impl(&bound, &target.unpack()) {
                self.diags.error(
                    DiagKind::UnmetTraitBound,
                    format!("type {target} does not implement trait {bound}"),
                    from,
                    to,
                );
            }
        }
    }

    /// Resolves a `Named` reference to its declared form, reporting unknown
    /// types and direct self-referential aliases.
    pub(crate) fn lookup_named(&mut self, name: &Name, args: &[Type], from: Loc, to: Loc) -> Option<Type> {
        let resolved = self.lookup_type(name, args);
        match &resolved {
            Type::Unknown => {
                self.diags
                    .error(DiagKind::UnknownType, format!("unknown type: {name}"), from, to);
                None
            }
            Type::Named(rn, _) if rn == name => {
                self.diags.error(
                    DiagKind::UnknownType,
                    format!("type alias {name} resolves to itself"),
                    from,
                    to,
                );
                None
            }
            _ => Some(resolved),
        }
    }
}
