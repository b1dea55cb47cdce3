//! Implicit conversions GLSL performs and WGSL refuses.
//!
//! Two families: scalar arguments to component-wise built-ins that also
//! receive a vector are splatted to that vector's width, and integer operands
//! meeting float ones are converted (literals are respelled, everything else
//! wrapped in a conversion). Where inference cannot name both types the
//! expression is left as written.
use crate::ast::{Expr, Function, Stmt, TranslationUnit, UnaryOp, VarDecl};
use crate::context::CompilationContext;
use crate::passes::{rewrite, Rewrite};
use crate::types::{is_componentwise, widest, Env, GlslType, Scalar};

/// Built-ins that need every shape argument at the same width in WGSL.
const SPLATTED: &[&str] = &["clamp", "min", "max", "smoothstep", "step", "mix", "pow", "mod"];

pub fn run(unit: &mut TranslationUnit, cx: &mut CompilationContext) {
    let mut env = cx.env_for(unit);
    rewrite(unit, &mut env, &mut Promotion { ret: None });
}

struct Promotion {
    ret: Option<GlslType>,
}

impl Rewrite for Promotion {
    fn enter_function(&mut self, function: &mut Function, _env: &Env) {
        self.ret = Some(function.ret.clone());
    }

    fn exit_function(&mut self, _function: &mut Function, _env: &Env) {
        self.ret = None;
    }

    fn expr(&mut self, expr: &mut Expr, env: &Env) {
        match expr {
            Expr::Call { name, args } => {
                if env.is_user_function(name) {
                    user_args(name, args, env);
                } else if is_componentwise(name) {
                    builtin_args(name, args, env);
                }
            }
            Expr::Construct { ty, args } => constructor_args(ty, args, env),
            Expr::Binary { op, lhs, rhs } if op.is_arithmetic() || op.is_comparison() => {
                unify(lhs, rhs, env);
            }
            Expr::Assign { lhs, rhs, .. } => {
                if let Some(target) = env.type_of(lhs) {
                    coerce(rhs, &target, env);
                }
            }
            _ => {}
        }
    }

    fn stmt(&mut self, mut stmt: Stmt, env: &Env) -> Vec<Stmt> {
        match &mut stmt {
            Stmt::Decl(decls) => {
                for decl in decls.iter_mut() {
                    coerce_decl(decl, env);
                }
            }
            Stmt::Return(Some(value)) => {
                if let Some(ret) = &self.ret {
                    coerce(value, ret, env);
                }
            }
            _ => {}
        }
        vec![stmt]
    }

    fn global(&mut self, decl: &mut VarDecl, env: &Env) {
        coerce_decl(decl, env);
    }
}

fn coerce_decl(decl: &mut VarDecl, env: &Env) {
    if let Some(init) = decl.init.as_mut() {
        coerce(init, &decl.ty, env);
    }
}

/// Converts `expr` to float when `target` is float-based and `expr` is not.
fn coerce(expr: &mut Expr, target: &GlslType, env: &Env) {
    if !target.is_float_based() {
        return;
    }
    if let Some(ty) = env.type_of(expr) {
        if ty.is_integer_based() {
            to_float(expr, &ty);
        }
    }
}

fn unify(lhs: &mut Expr, rhs: &mut Expr, env: &Env) {
    let (Some(l), Some(r)) = (env.type_of(lhs), env.type_of(rhs)) else {
        return;
    };
    if l.is_float_based() && r.is_integer_based() {
        to_float(rhs, &r);
    } else if r.is_float_based() && l.is_integer_based() {
        to_float(lhs, &l);
    }
}

fn user_args(name: &str, args: &mut [Expr], env: &Env) {
    let candidates: Vec<_> = env
        .functions(name)
        .iter()
        .filter(|sig| sig.params.len() == args.len())
        .collect();
    let [sig] = candidates.as_slice() else {
        return;
    };
    for (arg, param) in args.iter_mut().zip(&sig.params) {
        coerce(arg, param, env);
    }
}

fn builtin_args(name: &str, args: &mut [Expr], env: &Env) {
    let types: Vec<Option<GlslType>> = args.iter().map(|a| env.type_of(a)).collect();
    // `mix` blends by a scalar factor; only its endpoints share a shape.
    let shaped = if name == "mix" { 2.min(args.len()) } else { args.len() };
    let Some(target) = widest(types[..shaped].iter().flatten().cloned()) else {
        return;
    };
    if !target.is_float_based() {
        return;
    }
    for (index, (arg, ty)) in args.iter_mut().zip(&types).enumerate() {
        let Some(ty) = ty else {
            continue;
        };
        if ty.is_integer_based() {
            to_float(arg, ty);
        }
        if index < shaped && ty.is_scalar() && target.is_vector() && SPLATTED.contains(&name) {
            let vector = target.clone();
            arg.replace_with(|old| Expr::construct(vector, vec![old]));
        }
    }
}

fn constructor_args(ty: &GlslType, args: &mut [Expr], env: &Env) {
    // `float(i)` and `vec2(iv)` are themselves conversions.
    if !ty.is_float_based() || ty.is_scalar() {
        return;
    }
    let conversion = args.len() == 1;
    for arg in args.iter_mut() {
        let Some(arg_ty) = env.type_of(arg) else {
            continue;
        };
        if arg_ty.is_integer_based() && (arg_ty.is_scalar() || !conversion) {
            to_float(arg, &arg_ty);
        }
    }
}

/// Rewrites an integer-typed expression of type `ty` into a float one.
pub(crate) fn to_float(expr: &mut Expr, ty: &GlslType) {
    match expr {
        Expr::Int(text) => {
            let respelled = float_literal(text);
            *expr = Expr::Float(respelled);
        }
        Expr::Unary {
            op: UnaryOp::Neg,
            expr: inner,
        } if matches!(**inner, Expr::Int(_)) => to_float(inner, ty),
        _ => {
            let target = GlslType::with_components(Scalar::Float, ty.components().unwrap_or(1));
            expr.replace_with(|old| Expr::construct(target, vec![old]));
        }
    }
}

/// `2` becomes `2.0`, `0x10` becomes `16.0`, `3u` becomes `3.0`.
fn float_literal(text: &str) -> String {
    let digits = text.trim_end_matches(['u', 'U']);
    let value = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => digits.parse::<u64>().ok(),
    };
    match value {
        Some(value) => format!("{value}.0"),
        None => format!("{digits}.0"),
    }
}
