//! Control-flow lowering to the statement shapes WGSL accepts.
//!
//! Bodies always become blocks, comma expressions at statement level split
//! into separate statements, `do`/`while` becomes `loop` with a `break if`
//! in its continuing block, `for` headers WGSL cannot express move into a
//! `loop`, and `switch` loses its trailing `break`s, fallthrough and any
//! missing `default`.
//!
//! Assignments and `++`/`--` nested inside a larger expression are hoisted
//! into statements of their own ahead of the statement that used them, since
//! WGSL only has them as statements.
use crate::ast::{BinOp, Case, CaseLabel, Expr, Stmt, Storage, TranslationUnit, UnaryOp, VarDecl};
use crate::context::CompilationContext;
use crate::diagnostics::Stage;
use crate::emit::emit_expr;
use crate::passes::swizzle::is_pure_lvalue;
use crate::passes::{rewrite, Rewrite};
use crate::types::{is_swizzle, Env};

pub fn run(unit: &mut TranslationUnit, cx: &mut CompilationContext) {
    let mut env = cx.env_for(unit);
    rewrite(unit, &mut env, &mut Braces { cx });
}

struct Braces<'c, 'a> {
    cx: &'c mut CompilationContext<'a>,
}

impl Rewrite for Braces<'_, '_> {
    fn stmt(&mut self, stmt: Stmt, env: &Env) -> Vec<Stmt> {
        let mut out = Vec::new();
        for stmt in self.shape(stmt) {
            out.extend(self.hoist(stmt, env));
        }
        out
    }
}

impl Braces<'_, '_> {
    fn shape(&mut self, stmt: Stmt) -> Vec<Stmt> {
        match stmt {
            Stmt::Expr(Expr::Comma(items)) => items.into_iter().map(Stmt::Expr).collect(),
            Stmt::If {
                cond,
                then,
                otherwise,
            } => vec![Stmt::If {
                cond,
                then: Box::new(block(*then)),
                otherwise: otherwise.map(|o| match *o {
                    chained @ Stmt::If { .. } => Box::new(chained),
                    other => Box::new(block(other)),
                }),
            }],
            Stmt::While { cond, body } => vec![Stmt::While {
                cond,
                body: Box::new(block(*body)),
            }],
            Stmt::DoWhile { body, cond } => vec![Stmt::Loop {
                body: statements(*body),
                continuing: Vec::new(),
                break_if: Some(negate(cond)),
            }],
            Stmt::For {
                init,
                cond,
                step,
                body,
            } => lower_for(init, cond, step, *body),
            Stmt::Switch { selector, cases } => vec![Stmt::Switch {
                selector,
                cases: self.lower_cases(cases),
            }],
            other => vec![other],
        }
    }

    /// Moves nested side effects out of `stmt` into statements placed before
    /// it. Positions evaluated more than once keep them, with a warning.
    fn hoist(&mut self, mut stmt: Stmt, env: &Env) -> Vec<Stmt> {
        let mut before = Vec::new();
        match &mut stmt {
            Stmt::Expr(expr) if is_effect(expr) => {
                for child in expr.children_mut() {
                    self.extract(child, env, &mut before);
                }
            }
            Stmt::Expr(expr) | Stmt::Return(Some(expr)) => self.extract(expr, env, &mut before),
            Stmt::If { cond, .. } => self.extract(cond, env, &mut before),
            Stmt::Switch { selector, .. } => self.extract(selector, env, &mut before),
            Stmt::Decl(decls) => {
                for init in decls.iter_mut().filter_map(|d| d.init.as_mut()) {
                    self.extract(init, env, &mut before);
                }
            }
            Stmt::While { cond, .. } => self.keep_in_place(cond, "`while` condition"),
            Stmt::Loop {
                break_if: Some(cond),
                ..
            } => self.keep_in_place(cond, "`do`/`while` condition"),
            Stmt::For { cond, step, .. } => {
                if let Some(cond) = cond {
                    self.keep_in_place(cond, "`for` condition");
                }
                if let Some(step) = step {
                    let nested = match &*step {
                        Expr::Comma(items) => items.iter().any(has_nested_effect),
                        single => has_nested_effect(single),
                    };
                    if nested {
                        let message = format!(
                            "nested side effect in `for` step `{}` left as written",
                            emit_expr(step)
                        );
                        self.cx.warn(Stage::Rewrite, message);
                    }
                }
            }
            _ => {}
        }
        before.push(stmt);
        before
    }

    /// Post-order: an effect's operands are hoisted before the effect itself,
    /// which is then replaced by the value it produced.
    fn extract(&mut self, expr: &mut Expr, env: &Env, before: &mut Vec<Stmt>) {
        if !has_effect(expr) {
            return;
        }
        if let Expr::Binary {
            op: BinOp::And | BinOp::Or,
            lhs,
            rhs,
        } = expr
        {
            self.extract(lhs, env, before);
            self.keep_in_place(rhs, "short-circuit operand");
            return;
        }
        for child in expr.children_mut() {
            self.extract(child, env, before);
        }

        let (target, prefix) = match &*expr {
            Expr::Assign { lhs, .. } => (lhs.as_ref().clone(), true),
            Expr::Unary { op, expr: operand } if op.is_step() => (
                operand.as_ref().clone(),
                matches!(op, UnaryOp::PreInc | UnaryOp::PreDec),
            ),
            _ => return,
        };
        if !is_pure_lvalue(&target) {
            let message = format!(
                "side effect on `{}` inside an expression left as written",
                emit_expr(&target)
            );
            self.cx.warn(Stage::Rewrite, message);
            return;
        }
        if prefix {
            // Assignments and pre-steps yield the updated target.
            let effect = std::mem::replace(expr, target);
            before.push(Stmt::Expr(effect));
            return;
        }
        let Some(ty) = env.type_of(&target) else {
            let message = format!(
                "cannot infer the type of `{}` for its `++`/`--`; left as written",
                emit_expr(&target)
            );
            self.cx.warn(Stage::Rewrite, message);
            return;
        };
        let old = self.cx.temp("old");
        before.push(Stmt::decl(VarDecl {
            storage: Storage::Const,
            ty,
            name: old.clone(),
            init: Some(target),
        }));
        let effect = std::mem::replace(expr, Expr::ident(old));
        before.push(Stmt::Expr(effect));
    }

    fn keep_in_place(&mut self, expr: &Expr, position: &str) {
        if has_effect(expr) {
            let message = format!(
                "side effect in {position} `{}` cannot be hoisted; left as written",
                emit_expr(expr)
            );
            self.cx.warn(Stage::Rewrite, message);
        }
    }

    fn lower_cases(&mut self, cases: Vec<Case>) -> Vec<Case> {
        let bodies: Vec<Vec<Stmt>> = cases.iter().map(|c| flatten(c.body.clone())).collect();
        let mut lowered = Vec::with_capacity(cases.len());
        for (index, case) in cases.into_iter().enumerate() {
            // A case that does not end in a jump runs into the next one.
            let mut body = Vec::new();
            let mut next = index;
            loop {
                let Some(part) = bodies.get(next) else {
                    break;
                };
                body.extend(part.iter().cloned());
                if part.last().is_some_and(Stmt::is_jump) {
                    break;
                }
                next += 1;
            }
            if next > index && next < bodies.len() {
                self.cx.warn(
                    Stage::Rewrite,
                    "switch case falls through; the following case body was duplicated",
                );
            }
            if matches!(body.last(), Some(Stmt::Break)) {
                body.pop();
            }
            lowered.push(Case {
                labels: case.labels,
                body,
            });
        }
        let has_default = lowered
            .iter()
            .any(|c| c.labels.iter().any(|l| matches!(l, CaseLabel::Default)));
        if !has_default {
            lowered.push(Case {
                labels: vec![CaseLabel::Default],
                body: Vec::new(),
            });
        }
        lowered
    }
}

fn lower_for(
    init: Option<Box<Stmt>>,
    cond: Option<Expr>,
    step: Option<Expr>,
    body: Stmt,
) -> Vec<Stmt> {
    let init_ok = match init.as_deref() {
        None | Some(Stmt::Decl(_)) => true,
        Some(Stmt::Expr(expr)) => is_update(expr),
        Some(_) => false,
    };
    let step_ok = step.as_ref().map_or(true, is_update);
    if init_ok && step_ok {
        return vec![Stmt::For {
            init,
            cond,
            step,
            body: Box::new(block(body)),
        }];
    }

    let mut outer: Vec<Stmt> = init.map(|s| statements(*s)).unwrap_or_default();
    let mut loop_body = Vec::new();
    if let Some(cond) = cond {
        loop_body.push(Stmt::If {
            cond: negate(cond),
            then: Box::new(Stmt::Block(vec![Stmt::Break])),
            otherwise: None,
        });
    }
    loop_body.extend(statements(body));
    let continuing = match step {
        Some(Expr::Comma(items)) => items.into_iter().map(as_update).collect(),
        Some(step) => vec![as_update(step)],
        None => Vec::new(),
    };
    outer.push(Stmt::Loop {
        body: loop_body,
        continuing,
        break_if: None,
    });
    vec![Stmt::Block(outer)]
}

/// Expressions a WGSL `for` header may hold in its init and update slots.
/// A multi-lane swizzle target is rewritten later as a statement, so it
/// moves into the loop body instead.
fn is_update(expr: &Expr) -> bool {
    match expr {
        Expr::Assign { lhs, .. } => !matches!(
            lhs.as_ref(),
            Expr::Field { name, .. } if name.len() > 1 && is_swizzle(name)
        ),
        Expr::Call { .. } => true,
        Expr::Unary { op, .. } => op.is_step(),
        _ => false,
    }
}

fn is_effect(expr: &Expr) -> bool {
    match expr {
        Expr::Assign { .. } => true,
        Expr::Unary { op, .. } => op.is_step(),
        _ => false,
    }
}

fn has_effect(expr: &Expr) -> bool {
    is_effect(expr) || has_nested_effect(expr)
}

fn has_nested_effect(expr: &Expr) -> bool {
    expr.children().into_iter().any(has_effect)
}

fn as_update(expr: Expr) -> Stmt {
    Stmt::Expr(expr)
}

fn negate(cond: Expr) -> Expr {
    match cond {
        Expr::Unary {
            op: UnaryOp::Not,
            expr,
        } => *expr,
        Expr::Binary {
            op: BinOp::Lt,
            lhs,
            rhs,
        } => Expr::Binary {
            op: BinOp::Ge,
            lhs,
            rhs,
        },
        other => Expr::Unary {
            op: UnaryOp::Not,
            expr: Box::new(other),
        },
    }
}

fn block(stmt: Stmt) -> Stmt {
    match stmt {
        Stmt::Block(_) => stmt,
        other => Stmt::Block(statements(other)),
    }
}

fn statements(stmt: Stmt) -> Vec<Stmt> {
    match stmt {
        Stmt::Block(stmts) => stmts,
        Stmt::Empty => Vec::new(),
        other => vec![other],
    }
}

/// A case body written as `{ ... break; }` behaves like the bare statements.
fn flatten(body: Vec<Stmt>) -> Vec<Stmt> {
    match <[Stmt; 1]>::try_from(body) {
        Ok([Stmt::Block(inner)]) => inner,
        Ok([single]) => vec![single],
        Err(body) => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::testing::{squash, Fixture};

    fn lower(body: &str) -> (String, Vec<String>) {
        let source = format!("void main() {{ int i = 0; float x = 0.0; {body} }}");
        let (out, warnings) = Fixture::new().run(&source, &[run]);
        (squash(&out), warnings)
    }

    #[test]
    fn wraps_single_statement_bodies() {
        let (out, _) = lower("if (x > 0.5) x = 1.0; else if (x > 0.2) x = 2.0; else x = 3.0;");
        assert!(
            out.contains(
                "if (x > 0.5) { x = 1.0; } else if (x > 0.2) { x = 2.0; } else { x = 3.0; }"
            ),
            "{out}"
        );
        let (out, _) = lower("while (x < 1.0) x += 0.1;");
        assert!(out.contains("while (x < 1.0) { x += 0.1; }"), "{out}");
    }

    #[test]
    fn do_while_becomes_loop() {
        let (out, _) = lower("do { x += 1.0; } while (x < 4.0);");
        assert!(
            out.contains("loop { x += 1.0; continuing { break if x >= 4.0; } }"),
            "{out}"
        );
    }

    #[test]
    fn comma_steps_move_into_continuing() {
        let (out, _) = lower("for (i = 0; i < 4; i++, x += 1.0) { x *= 2.0; }");
        assert!(
            out.contains(
                "loop { if (i >= 4) { break; } x *= 2.0; continuing { i++; x += 1.0; } }"
            ),
            "{out}"
        );
    }

    #[test]
    fn simple_for_loops_keep_their_header() {
        let (out, _) = lower("for (int k = 0; k < 3; k++) x += 1.0;");
        assert!(out.contains("for (var k: i32 = 0; k < 3; k++) { x += 1.0; }"), "{out}");
    }

    #[test]
    fn chained_assignment_splits_into_statements() {
        let (out, warnings) = lower("float a; float b; a = b = 1.0;");
        assert!(out.contains("b = 1.0; a = b;"), "{out}");
        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[test]
    fn nested_steps_are_hoisted() {
        let (out, warnings) = lower("int j = i++; int k = ++i * 2; x = float(i--);");
        assert!(out.contains("let isf_old0: i32 = i; i++; var j: i32 = isf_old0;"), "{out}");
        assert!(out.contains("i++; var k: i32 = i * 2;"), "{out}");
        assert!(out.contains("let isf_old1: i32 = i; i--; x = f32(isf_old1);"), "{out}");
        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[test]
    fn repeated_conditions_keep_side_effects_with_a_warning() {
        let (out, warnings) = lower("while (i++ < 4) { x += 1.0; }");
        assert!(out.contains("while ("), "{out}");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("`while` condition"), "{warnings:?}");
    }

    #[test]
    fn swizzle_step_moves_into_continuing() {
        let source = "void main() { vec4 col = vec4(0.0); float x = 0.0; \
            for (int k = 0; k < 3; col.rg += vec2(0.1)) { x += 1.0; } }";
        let passes: &[crate::passes::testing::Pass] =
            &[run, crate::passes::swizzle::lower_assignments];
        let (out, warnings) = Fixture::new().run(source, passes);
        let out = squash(&out);
        assert!(!out.contains("for ("), "{out}");
        assert!(
            out.contains(
                "loop { if (k >= 3) { break; } x += 1.0; continuing { col = vec4<f32>(col.rg + vec2<f32>(0.1), col.zw); } }"
            ),
            "{out}"
        );
        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[test]
    fn switch_cases_drop_breaks_and_gain_default() {
        let (out, warnings) = lower(
            "switch (i) { case 0: x = 1.0; break; case 1: case 2: x = 2.0; break; }",
        );
        assert!(out.contains("case 0: { x = 1.0; }"), "{out}");
        assert!(out.contains("case 1, 2: { x = 2.0; }"), "{out}");
        assert!(out.contains("default: { }"), "{out}");
        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[test]
    fn switch_fallthrough_duplicates_next_body() {
        let (out, warnings) = lower(
            "switch (i) { case 0: x = 1.0; case 1: x += 2.0; break; default: x = 0.0; }",
        );
        assert!(out.contains("case 0: { x = 1.0; x += 2.0; }"), "{out}");
        assert_eq!(warnings.len(), 1);
    }
}
