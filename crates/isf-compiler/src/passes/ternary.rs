//! `c ? a : b` becomes `select(b, a, c)`.
//!
//! The walk is post-order, so nested conditionals are already calls by the
//! time their parent is lowered. Both arms are evaluated, which matches GLSL
//! for the side-effect free expressions shader code uses here.
use crate::ast::{Expr, TranslationUnit};
use crate::context::CompilationContext;
use crate::passes::{rewrite, Rewrite};
use crate::types::Env;

pub fn run(unit: &mut TranslationUnit, cx: &mut CompilationContext) {
    let mut env = cx.env_for(unit);
    rewrite(unit, &mut env, &mut Ternary);
}

struct Ternary;

impl Rewrite for Ternary {
    fn expr(&mut self, expr: &mut Expr, _env: &Env) {
        if !matches!(expr, Expr::Ternary { .. }) {
            return;
        }
        expr.replace_with(|old| match old {
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => Expr::call("select", vec![*otherwise, *then, *cond]),
            other => other,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::testing::{squash, Fixture};

    #[test]
    fn reverses_arguments() {
        let (out, _) = Fixture::new().run(
            "void main() { float x = 1.0; float y = x > 0.5 ? 1.0 : 0.0; }",
            &[run],
        );
        assert!(squash(&out).contains("select(0.0, 1.0, x > 0.5)"), "{out}");
    }

    #[test]
    fn lowers_chains_innermost_first() {
        let (out, _) = Fixture::new().run(
            "void main() { int m = 2; float y = m == 0 ? 0.1 : m == 1 ? 0.2 : m == 2 ? 0.3 : 0.4; }",
            &[run],
        );
        let out = squash(&out);
        assert!(
            out.contains("select(select(select(0.4, 0.3, m == 2), 0.2, m == 1), 0.1, m == 0)"),
            "{out}"
        );
        assert!(!out.contains('?'));
    }

    #[test]
    fn lowers_global_initialisers() {
        let (out, _) = Fixture::new().run("const float k = true ? 1.0 : 2.0;", &[run]);
        assert!(out.contains("select(2.0, 1.0, true)"), "{out}");
    }
}
