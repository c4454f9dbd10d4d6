#![doc = include_str!("../../../README.md")]

mod ast;
mod diag;
mod env;
mod infer;
mod lexer;
mod name;
mod pack;
mod token;
mod ty;
mod unify;

pub use crate::{
    ast::{Ast, AstKind, BinOp, FieldDef, MatchArm, UnaryOp, VariantDef},
    diag::{DiagKind, DiagSink, Diagnostic, Diags, FileId, Loc, Severity},
    env::{AbstractDef, EnumDef, Env, FnSig, GlobalBinding, ImplKey, LocalBinding, ParamSig, StructDef, TraitDef},
    lexer::{lex, unescape},
    name::{BUILTIN_PACK, Name},
    pack::{
        AbstractDetail, EnumDetail, EnumVariantDetail, FieldDetail, FnDetail, ImplDetail, MethodDetail, PackDetail,
        ParamDetail, StructDetail, TraitDetail,
    },
    token::{IntTy, Keyword, Token, TokenKind},
    ty::{Type, Tyvar, WeakId, Weaks},
};
