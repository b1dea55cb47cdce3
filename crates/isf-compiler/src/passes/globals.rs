//! Module-scope variables.
//!
//! WGSL only accepts constant expressions as module-scope initialisers. A
//! global whose initialiser reads uniforms, calls user functions or samples a
//! texture keeps its declaration without the initialiser, and the assignment
//! is queued for the top of the entry point.
use std::collections::HashSet;

use tracing::debug;

use crate::ast::{Expr, Item, Stmt, Storage, TranslationUnit};
use crate::context::CompilationContext;
use crate::diagnostics::Stage;

/// Built-ins that are never constant-evaluable.
const RUNTIME_BUILTINS: &[&str] = &[
    "textureSampleLevel",
    "textureLoad",
    "textureDimensions",
    "dpdx",
    "dpdy",
    "fwidth",
];

pub fn run(unit: &mut TranslationUnit, cx: &mut CompilationContext) {
    let functions: HashSet<String> = unit.functions().map(|f| f.name.clone()).collect();
    let mut consts: HashSet<String> = HashSet::new();
    for item in &mut unit.items {
        let Item::Global(decls) = item else {
            continue;
        };
        for decl in decls.iter_mut() {
            let constant = decl
                .init
                .as_ref()
                .map_or(false, |init| is_const_expr(init, &consts, &functions));
            if constant {
                if decl.storage == Storage::Const {
                    consts.insert(decl.name.clone());
                }
                continue;
            }
            let Some(init) = decl.init.take() else {
                continue;
            };
            if decl.storage == Storage::Const {
                decl.storage = Storage::Var;
                let message = format!(
                    "`const {}` has a runtime initialiser; it became a private variable set in the entry point",
                    decl.name
                );
                cx.warn(Stage::Rewrite, message);
            }
            cx.deferred_inits
                .push(Stmt::Expr(Expr::assign(Expr::ident(&decl.name), init)));
        }
    }
    debug!(deferred = cx.deferred_inits.len(), "moved runtime global initialisers");
}

fn is_const_expr(expr: &Expr, consts: &HashSet<String>, functions: &HashSet<String>) -> bool {
    let here = match expr {
        Expr::Int(_) | Expr::Float(_) | Expr::Bool(_) => true,
        Expr::Ident(name) => consts.contains(name),
        Expr::Call { name, .. } => {
            !functions.contains(name) && !RUNTIME_BUILTINS.contains(&name.as_str())
        }
        Expr::Construct { .. }
        | Expr::Unary { .. }
        | Expr::Binary { .. }
        | Expr::Field { .. }
        | Expr::Index { .. } => true,
        Expr::Assign { .. }
        | Expr::Ternary { .. }
        | Expr::Comma(_)
        | Expr::Deref(_)
        | Expr::AddrOf(_) => false,
    };
    here && expr
        .children()
        .into_iter()
        .all(|child| is_const_expr(child, consts, functions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::testing::{squash, Fixture};
    use crate::passes::builtins;

    fn lower(source: &str) -> (String, Vec<String>, Vec<Stmt>) {
        let fixture = Fixture::new();
        let mut warnings = Vec::new();
        let layout = crate::layout::analyze(&fixture.metadata, "isf_", &mut warnings);
        let mut cx = CompilationContext::new(&fixture.options, &fixture.metadata, layout, warnings);
        let mut unit = crate::parser::parse(source).unwrap();
        builtins::run(&mut unit, &mut cx);
        run(&mut unit, &mut cx);
        let messages = cx.warnings.iter().map(|w| w.message.clone()).collect();
        (squash(&crate::emit::emit_unit(&unit)), messages, cx.deferred_inits)
    }

    #[test]
    fn constant_initialisers_stay() {
        let (out, warnings, deferred) = lower(
            "const float PI = 3.14159;\n\
             const float TAU = PI * 2.0;\n\
             vec3 tint = vec3(0.5, sin(TAU), 1.0);",
        );
        assert!(warnings.is_empty(), "{warnings:?}");
        assert!(deferred.is_empty());
        assert!(out.contains("const PI: f32 = 3.14159;"), "{out}");
        assert!(out.contains("const TAU: f32 = PI * 2.0;"), "{out}");
        assert!(out.contains("var<private> tint: vec3<f32> = vec3<f32>(0.5, sin(TAU), 1.0);"), "{out}");
    }

    #[test]
    fn runtime_initialisers_move_to_the_entry_point() {
        let (out, warnings, deferred) = lower(
            "float phase = TIME * 0.5;\n\
             const float start = TIME;\n\
             float wave(float x) { return sin(x); }\n\
             float w = wave(1.0);",
        );
        assert!(out.contains("var<private> phase: f32;"), "{out}");
        assert!(out.contains("var<private> start: f32;"), "{out}");
        assert!(out.contains("var<private> w: f32;"), "{out}");
        assert_eq!(warnings.len(), 1);
        let deferred = crate::emit::emit_stmts(&deferred);
        assert_eq!(
            squash(&deferred),
            "phase = isf_uniforms.TIME * 0.5; start = isf_uniforms.TIME; w = wave(1.0);"
        );
    }
}
