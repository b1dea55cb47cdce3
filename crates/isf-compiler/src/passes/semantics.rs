//! Operator and built-in semantics that differ between GLSL and WGSL.
//!
//! Covers the numeric representation of boolean inputs, explicit `bool`
//! casts, floor-based `mod`, integer operands for bit operations, vector
//! equality, and the built-ins whose WGSL name or shape differs.
use std::collections::HashSet;

use crate::ast::{BinOp, Expr, Stmt, TranslationUnit, UnaryOp, VarDecl};
use crate::context::CompilationContext;
use crate::diagnostics::Stage;
use crate::passes::{rewrite, Rewrite};
use crate::types::{Env, GlslType, Scalar};

pub fn run(unit: &mut TranslationUnit, cx: &mut CompilationContext) {
    let bool_inputs = cx
        .metadata
        .inputs
        .iter()
        .filter(|input| input.kind.is_boolean())
        .map(|input| input.name.clone())
        .collect();
    let mut env = cx.env_for(unit);
    rewrite(unit, &mut env, &mut Semantics { cx, bool_inputs });
}

struct Semantics<'c, 'a> {
    cx: &'c mut CompilationContext<'a>,
    bool_inputs: HashSet<String>,
}

impl Rewrite for Semantics<'_, '_> {
    fn expr(&mut self, expr: &mut Expr, env: &Env) {
        self.wrap_bool_children(expr, env);
        match expr {
            Expr::Call { .. } => self.call(expr, env),
            Expr::Construct { .. } => self.construct(expr, env),
            Expr::Binary { .. } => binary(expr, env),
            Expr::Assign {
                op: Some(op), rhs, ..
            } if op.is_shift() => shift_amount(rhs, env),
            Expr::Assign {
                op: Some(op), rhs, ..
            } if op.is_bitwise() => int_operand(rhs, env),
            Expr::Unary {
                op: UnaryOp::BitNot,
                expr: inner,
            } => int_operand(inner, env),
            _ => {}
        }
    }

    fn stmt(&mut self, mut stmt: Stmt, env: &Env) -> Vec<Stmt> {
        for expr in stmt.exprs_mut() {
            self.wrap_bool(expr, env);
        }
        vec![stmt]
    }

    fn global(&mut self, decl: &mut VarDecl, env: &Env) {
        if let Some(init) = decl.init.as_mut() {
            self.wrap_bool(init, env);
        }
    }
}

impl Semantics<'_, '_> {
    /// Boolean inputs arrive as `i32`; every read becomes `(x != 0)`.
    fn wrap_bool(&self, expr: &mut Expr, env: &Env) {
        let Expr::Ident(name) = expr else {
            return;
        };
        if self.bool_inputs.contains(name.as_str()) && !env.is_declared(name) {
            expr.replace_with(|old| Expr::binary(BinOp::Ne, old, Expr::int("0")));
        }
    }

    fn wrap_bool_children(&self, expr: &mut Expr, env: &Env) {
        if self.is_nonzero_test(expr) {
            return;
        }
        let skip_first = matches!(expr, Expr::Assign { .. });
        for (index, child) in expr.children_mut().into_iter().enumerate() {
            if !(skip_first && index == 0) {
                self.wrap_bool(child, env);
            }
        }
    }

    fn is_nonzero_test(&self, expr: &Expr) -> bool {
        match expr {
            Expr::Binary {
                op: BinOp::Ne,
                lhs,
                rhs,
            } => {
                matches!(rhs.as_ref(), Expr::Int(zero) if zero == "0")
                    && lhs.as_ident().is_some_and(|n| self.bool_inputs.contains(n))
            }
            _ => false,
        }
    }

    fn call(&mut self, expr: &mut Expr, env: &Env) {
        let Expr::Call { name, args } = expr else {
            return;
        };
        if env.is_user_function(name) {
            return;
        }
        let renamed = match (name.as_str(), args.len()) {
            ("atan", 2) => Some("atan2"),
            ("inversesqrt", _) => Some("inverseSqrt"),
            ("dFdx", _) => Some("dpdx"),
            ("dFdy", _) => Some("dpdy"),
            ("roundEven", _) => Some("round"),
            ("faceforward", _) => Some("faceForward"),
            ("mix", 3) if env.type_of(&args[2]).is_some_and(|t| t.is_bool_based()) => {
                Some("select")
            }
            _ => None,
        };
        if let Some(renamed) = renamed {
            *name = renamed.to_string();
            return;
        }

        let replacement = match (name.as_str(), args.len()) {
            ("mod", 2) => {
                let [x, y] = take_pair(args);
                Some(floor_mod(x, y, env))
            }
            ("lessThan", 2) => Some(compare(BinOp::Lt, args)),
            ("lessThanEqual", 2) => Some(compare(BinOp::Le, args)),
            ("greaterThan", 2) => Some(compare(BinOp::Gt, args)),
            ("greaterThanEqual", 2) => Some(compare(BinOp::Ge, args)),
            ("equal", 2) => Some(compare(BinOp::Eq, args)),
            ("notEqual", 2) => Some(compare(BinOp::Ne, args)),
            ("not", 1) => args.pop().map(|arg| Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(arg),
            }),
            ("floatBitsToInt" | "floatBitsToUint" | "intBitsToFloat" | "uintBitsToFloat", 1) => {
                let scalar = match name.as_str() {
                    "floatBitsToInt" => Scalar::Int,
                    "floatBitsToUint" => Scalar::Uint,
                    _ => Scalar::Float,
                };
                let width = env
                    .type_of(&args[0])
                    .and_then(|t| t.components())
                    .unwrap_or(1);
                let target = GlslType::with_components(scalar, width).wgsl();
                *name = format!("bitcast<{target}>");
                None
            }
            ("inverse" | "matrixCompMult" | "outerProduct", _) => {
                let message = format!("`{name}` has no WGSL built-in; the call was left as written");
                self.cx.warn(Stage::Rewrite, message);
                None
            }
            _ => None,
        };
        if let Some(replacement) = replacement {
            *expr = replacement;
        }
    }

    fn construct(&mut self, expr: &mut Expr, env: &Env) {
        let Expr::Construct { ty, args } = expr else {
            return;
        };
        if args.len() != 1 {
            return;
        }
        let arg_ty = env.type_of(&args[0]);
        let replacement = match (&*ty, arg_ty) {
            (GlslType::Scalar(Scalar::Bool) | GlslType::Vector(Scalar::Bool, _), Some(from)) => {
                if from.is_bool_based() {
                    if ty.is_scalar() {
                        args.pop()
                    } else {
                        None
                    }
                } else {
                    args.pop()
                        .map(|arg| Expr::binary(BinOp::Ne, arg, zero_of(&from)))
                }
            }
            (GlslType::Matrix(cols, rows), Some(from)) if from.is_scalar() => {
                let (cols, rows) = (*cols, *rows);
                args.pop().map(|s| diagonal(cols, rows, s))
            }
            (GlslType::Matrix(cols, rows), Some(GlslType::Matrix(c, r)))
                if (*cols, *rows) != (c, r) =>
            {
                let message = format!(
                    "matrix resize from {}x{} to {cols}x{rows} is not a WGSL constructor; left as written",
                    c, r
                );
                self.cx.warn(Stage::Rewrite, message);
                None
            }
            _ => None,
        };
        if let Some(replacement) = replacement {
            *expr = replacement;
        }
    }
}

fn binary(expr: &mut Expr, env: &Env) {
    let Expr::Binary { op, lhs, rhs } = expr else {
        return;
    };
    match *op {
        BinOp::Xor => *op = BinOp::Ne,
        BinOp::Eq | BinOp::Ne => {
            if env.type_of(lhs).is_some_and(|t| t.is_vector()) {
                let reduce = if *op == BinOp::Eq { "all" } else { "any" };
                expr.replace_with(|old| Expr::call(reduce, vec![old]));
            }
        }
        op if op.is_bitwise() => {
            int_operand(lhs, env);
            int_operand(rhs, env);
        }
        op if op.is_shift() => {
            int_operand(lhs, env);
            shift_amount(rhs, env);
        }
        _ => {}
    }
}

/// Float operands of bit operations are truncated to `i32` first.
fn int_operand(expr: &mut Expr, env: &Env) {
    if let Some(ty) = env.type_of(expr) {
        if ty.is_float_based() {
            let target = GlslType::with_components(Scalar::Int, ty.components().unwrap_or(1));
            expr.replace_with(|old| Expr::construct(target, vec![old]));
        }
    }
}

/// WGSL shift amounts are unsigned.
fn shift_amount(expr: &mut Expr, env: &Env) {
    if let Expr::Int(text) = expr {
        if !text.ends_with(['u', 'U']) {
            text.push('u');
        }
        return;
    }
    let ty = env.type_of(expr);
    if ty.as_ref().and_then(GlslType::scalar) == Some(Scalar::Uint) {
        return;
    }
    let width = ty.and_then(|t| t.components()).unwrap_or(1);
    let target = GlslType::with_components(Scalar::Uint, width);
    expr.replace_with(|old| Expr::construct(target, vec![old]));
}

fn take_pair(args: &mut Vec<Expr>) -> [Expr; 2] {
    let y = args.pop().unwrap_or(Expr::float("1.0"));
    let x = args.pop().unwrap_or(Expr::float("0.0"));
    [x, y]
}

/// GLSL `mod(x, y)` is `x - y * floor(x / y)`; WGSL `%` truncates instead.
fn floor_mod(x: Expr, y: Expr, env: &Env) -> Expr {
    if x.is_simple() && y.is_simple() {
        let quotient = Expr::binary(BinOp::Div, x.clone(), y.clone());
        let floored = Expr::call("floor", vec![quotient]);
        return Expr::binary(BinOp::Sub, x, Expr::binary(BinOp::Mul, y, floored));
    }
    let width = [&x, &y]
        .into_iter()
        .filter_map(|e| env.type_of(e).and_then(|t| t.components()))
        .max()
        .unwrap_or(1);
    let helper = match width {
        1 => "isf_mod_f32".to_string(),
        n => format!("isf_mod_vec{n}"),
    };
    Expr::call(helper, vec![x, y])
}

fn compare(op: BinOp, args: &mut Vec<Expr>) -> Expr {
    let [lhs, rhs] = take_pair(args);
    Expr::binary(op, lhs, rhs)
}

fn zero_of(ty: &GlslType) -> Expr {
    let scalar = match ty.scalar() {
        Some(Scalar::Float) => Expr::float("0.0"),
        Some(Scalar::Uint) => Expr::int("0u"),
        _ => Expr::int("0"),
    };
    match ty {
        GlslType::Vector(..) => Expr::construct(ty.clone(), vec![scalar]),
        _ => scalar,
    }
}

fn diagonal(cols: u8, rows: u8, value: Expr) -> Expr {
    let columns = (0..cols)
        .map(|c| {
            let lanes = (0..rows)
                .map(|r| {
                    if r == c {
                        value.clone()
                    } else {
                        Expr::float("0.0")
                    }
                })
                .collect();
            Expr::construct(GlslType::vec(rows), lanes)
        })
        .collect();
    Expr::construct(GlslType::Matrix(cols, rows), columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::InputKind;
    use crate::passes::testing::{squash, Fixture};

    fn lower(body: &str) -> (String, Vec<String>) {
        let fixture = Fixture::new().input("invert", InputKind::Bool);
        let source = format!(
            "void main() {{ vec2 uv = vec2(0.5); vec3 v = vec3(0.0); float f = 1.0; int i = 3; {body} }}"
        );
        let (out, warnings) = fixture.run(&source, &[run]);
        (squash(&out), warnings)
    }

    #[test]
    fn boolean_inputs_compare_against_zero() {
        let (out, _) = lower("if (invert) { f = 0.0; } bool b = !invert && f > 0.5;");
        assert!(out.contains("if (invert != 0) {"), "{out}");
        assert!(out.contains("var b: bool = !(invert != 0) && f > 0.5;"), "{out}");
    }

    #[test]
    fn bool_casts_become_comparisons() {
        let (out, _) = lower("bool b = bool(f); bool c = bool(i);");
        assert!(out.contains("var b: bool = f != 0.0;"), "{out}");
        assert!(out.contains("var c: bool = i != 0;"), "{out}");
    }

    #[test]
    fn mod_uses_floor_formula() {
        let (out, _) = lower("f = mod(f, 0.25); v = mod(v * 2.0, vec3(1.0));");
        assert!(out.contains("f = f - 0.25 * floor(f / 0.25);"), "{out}");
        assert!(out.contains("isf_mod_vec3(v * 2.0, vec3<f32>(1.0))"), "{out}");
        assert!(!out.contains('%'), "{out}");
    }

    #[test]
    fn bit_operations_get_integer_operands() {
        let (out, _) = lower("i = i << 2; int m = int(f) & 3; i = i >> i; int k = f & 1;");
        assert!(out.contains("i = i << 2u;"), "{out}");
        assert!(out.contains("i = i >> u32(i);"), "{out}");
        assert!(out.contains("var k: i32 = i32(f) & 1;"), "{out}");
    }

    #[test]
    fn renames_and_reshapes_builtins() {
        let (out, _) = lower(
            "f = atan(uv.y, uv.x); f = inversesqrt(f); bool e = all(lessThan(uv, vec2(1.0))); \
             bool q = uv == vec2(0.5);",
        );
        assert!(out.contains("atan2(uv.y, uv.x)"), "{out}");
        assert!(out.contains("inverseSqrt(f)"), "{out}");
        assert!(out.contains("all(uv < vec2<f32>(1.0))"), "{out}");
        assert!(out.contains("var q: bool = all(uv == vec2<f32>(0.5));"), "{out}");
    }

    #[test]
    fn scalar_matrix_is_diagonal() {
        let (out, _) = lower("mat2 m = mat2(f);");
        assert!(
            out.contains("mat2x2<f32>(vec2<f32>(f, 0.0), vec2<f32>(0.0, f))"),
            "{out}"
        );
    }

    #[test]
    fn unsupported_builtins_warn() {
        let (_, warnings) = lower("mat2 m = inverse(mat2(1.0));");
        assert!(warnings.iter().any(|w| w.contains("inverse")), "{warnings:?}");
    }
}
