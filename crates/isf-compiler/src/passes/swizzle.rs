//! Swizzle normalisation.
//!
//! `stpq` letters become `xyzw`, and assignments through a multi-component
//! swizzle (which WGSL rejects) become a whole-vector reassignment that reads
//! the untouched components back from the original value.
use crate::ast::{BinOp, Expr, Stmt, Storage, TranslationUnit, UnaryOp, VarDecl};
use crate::context::CompilationContext;
use crate::diagnostics::Stage;
use crate::passes::{rewrite, Rewrite};
use crate::types::{is_swizzle, Env, GlslType};

const XYZW: [char; 4] = ['x', 'y', 'z', 'w'];

pub fn expand_aliases(unit: &mut TranslationUnit, cx: &mut CompilationContext) {
    let mut env = cx.env_for(unit);
    rewrite(unit, &mut env, &mut Aliases);
}

struct Aliases;

impl Rewrite for Aliases {
    fn expr(&mut self, expr: &mut Expr, env: &Env) {
        let Expr::Field { base, name } = expr else {
            return;
        };
        if !name.chars().all(|c| "stpq".contains(c)) || !is_swizzle(name) {
            return;
        }
        if matches!(env.type_of(base), Some(GlslType::Struct(_))) {
            return;
        }
        *name = name.chars().map(|c| XYZW[component(c)]).collect();
    }
}

/// Component index of a swizzle letter from any of the three sets.
fn component(c: char) -> usize {
    match c {
        'x' | 'r' | 's' => 0,
        'y' | 'g' | 't' => 1,
        'z' | 'b' | 'p' => 2,
        _ => 3,
    }
}

pub fn lower_assignments(unit: &mut TranslationUnit, cx: &mut CompilationContext) {
    let mut env = cx.env_for(unit);
    rewrite(unit, &mut env, &mut Assignments { cx });
}

struct Assignments<'c, 'a> {
    cx: &'c mut CompilationContext<'a>,
}

impl Rewrite for Assignments<'_, '_> {
    fn stmt(&mut self, stmt: Stmt, env: &Env) -> Vec<Stmt> {
        if let Stmt::Expr(Expr::Assign { op, lhs, rhs }) = &stmt {
            if let Expr::Field { base, name } = lhs.as_ref() {
                if let Some(stmts) = self.lower(base, name, *op, rhs, env) {
                    return stmts;
                }
            }
        }
        vec![stmt]
    }
}

impl Assignments<'_, '_> {
    fn lower(
        &mut self,
        base: &Expr,
        name: &str,
        op: Option<BinOp>,
        rhs: &Expr,
        env: &Env,
    ) -> Option<Vec<Stmt>> {
        if name.len() < 2 || !is_swizzle(name) {
            return None;
        }
        let Some(GlslType::Vector(scalar, width)) = env.type_of(base) else {
            return None;
        };
        let lanes: Vec<usize> = name.chars().map(component).collect();
        let mut seen = [false; 4];
        for &lane in &lanes {
            if lane >= width as usize || seen[lane] {
                self.cx.warn(
                    Stage::Rewrite,
                    format!("swizzle assignment `.{name}` is not a valid target; left as written"),
                );
                return None;
            }
            seen[lane] = true;
        }
        if !is_pure_lvalue(base) {
            self.cx.warn(
                Stage::Rewrite,
                format!("swizzle assignment `.{name}` on a computed value; left as written"),
            );
            return None;
        }

        let value = match op {
            Some(op) => Expr::binary(op, Expr::field(base.clone(), name), rhs.clone()),
            None => rhs.clone(),
        };
        let value_is_scalar = env.type_of(&value).is_some_and(|t| t.is_scalar());
        let m = lanes.len();

        let start = lanes[0];
        let contiguous = lanes.iter().enumerate().all(|(k, &lane)| lane == start + k);
        if contiguous {
            let middle = if value_is_scalar {
                Expr::construct(GlslType::Vector(scalar, m as u8), vec![value])
            } else {
                value
            };
            let mut args = Vec::new();
            if start > 0 {
                args.push(lanes_of(base, 0..start));
            }
            args.push(middle);
            if start + m < width as usize {
                args.push(lanes_of(base, start + m..width as usize));
            }
            let rebuilt = Expr::construct(GlslType::Vector(scalar, width), args);
            return Some(vec![Stmt::Expr(Expr::assign(base.clone(), rebuilt))]);
        }

        // Scattered lanes: evaluate the value once, then pick per component.
        let value_ty = if value_is_scalar {
            GlslType::Scalar(scalar)
        } else {
            GlslType::Vector(scalar, m as u8)
        };
        let mut stmts = Vec::new();
        let source = if value.is_simple() {
            value
        } else {
            let temp = self.cx.temp("swz");
            stmts.push(Stmt::decl(VarDecl {
                storage: Storage::Const,
                ty: value_ty,
                name: temp.clone(),
                init: Some(value),
            }));
            Expr::ident(temp)
        };
        let args = (0..width as usize)
            .map(|i| match lanes.iter().position(|&lane| lane == i) {
                Some(_) if value_is_scalar => source.clone(),
                Some(k) => Expr::field(source.clone(), XYZW[k].to_string()),
                None => lanes_of(base, i..i + 1),
            })
            .collect();
        let rebuilt = Expr::construct(GlslType::Vector(scalar, width), args);
        stmts.push(Stmt::Expr(Expr::assign(base.clone(), rebuilt)));
        Some(stmts)
    }
}

fn lanes_of(base: &Expr, lanes: std::ops::Range<usize>) -> Expr {
    Expr::field(base.clone(), lanes.map(|i| XYZW[i]).collect::<String>())
}

/// Reading the target twice must not repeat side effects.
pub(crate) fn is_pure_lvalue(expr: &Expr) -> bool {
    match expr {
        Expr::Ident(_) => true,
        Expr::Field { base, .. } | Expr::Deref(base) => is_pure_lvalue(base),
        Expr::Index { base, index } => is_pure_lvalue(base) && is_pure_index(index),
        _ => false,
    }
}

fn is_pure_index(expr: &Expr) -> bool {
    match expr {
        Expr::Unary { op, .. } if op.is_step() => false,
        Expr::Unary { op: UnaryOp::Neg, expr } => is_pure_index(expr),
        Expr::Int(_) | Expr::Ident(_) => true,
        Expr::Binary { lhs, rhs, .. } => is_pure_index(lhs) && is_pure_index(rhs),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::testing::{squash, Fixture};

    fn lower(body: &str) -> String {
        let source = format!("void main() {{ vec4 color = vec4(0.0); vec3 a; vec3 b; float t; {body} }}");
        let passes: &[crate::passes::testing::Pass] = &[expand_aliases, lower_assignments];
        squash(&Fixture::new().run(&source, passes).0)
    }

    #[test]
    fn rgb_assignment_keeps_alpha() {
        let out = lower("color.rgb = mix(a, b, t);");
        assert!(out.contains("color = vec4<f32>(mix(a, b, t), color.w);"), "{out}");
    }

    #[test]
    fn middle_slice_reads_both_ends() {
        let out = lower("color.yz = vec2(1.0, 2.0);");
        assert!(
            out.contains("color = vec4<f32>(color.x, vec2<f32>(1.0, 2.0), color.w);"),
            "{out}"
        );
    }

    #[test]
    fn compound_assignment_reads_current_value() {
        let out = lower("color.xy *= 2.0;");
        assert!(out.contains("color = vec4<f32>(color.xy * 2.0, color.zw);"), "{out}");
    }

    #[test]
    fn scattered_lanes_use_a_temporary() {
        let out = lower("color.wx = a.xy + a.yz;");
        assert!(out.contains("let isf_swz0: vec2<f32> = a.xy + a.yz;"), "{out}");
        assert!(
            out.contains("color = vec4<f32>(isf_swz0.y, color.y, color.z, isf_swz0.x);"),
            "{out}"
        );
    }

    #[test]
    fn single_component_and_stpq() {
        let out = lower("color.x = 1.0; color.st = a.pq;");
        assert!(out.contains("color.x = 1.0;"), "{out}");
        assert!(out.contains("color = vec4<f32>(a.zw, color.zw);"), "{out}");
    }
}
