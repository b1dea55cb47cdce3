//! Turns the body's `main` into the WGSL fragment entry point.
//!
//! The entry point fills the private stand-ins for `gl_FragCoord` and
//! `isf_FragNormCoord` from its stage inputs, runs the deferred global
//! initialisers and returns `isf_frag_color` wherever `main` returned.
use tracing::debug;

use crate::ast::{BinOp, Expr, Function, Item, Stmt, TranslationUnit, VarDecl};
use crate::context::{CompilationContext, FRAG_COLOR, FRAG_COORD, FRAG_NORM_COORD};
use crate::diagnostics::Stage;
use crate::layout::UNIFORM_VAR;
use crate::types::GlslType;

pub const ENTRY_POINT: &str = "isf_fragment_main";
/// Entry point input carrying `@builtin(position)`.
pub const POSITION: &str = "isf_position";
/// Entry point input carrying the interpolated normalised coordinate.
pub const UV: &str = "isf_uv";

pub fn run(unit: &mut TranslationUnit, cx: &mut CompilationContext) {
    if unit.functions().any(|f| f.entry) {
        return;
    }
    let mut prologue = prologue();
    prologue.append(&mut cx.deferred_inits);

    let main = unit
        .functions_mut()
        .find(|f| f.name == "main" && f.params.is_empty());
    if let Some(main) = main {
        debug!("lowering main into the fragment entry point");
        main.name = ENTRY_POINT.to_string();
        main.ret = GlslType::vec(4);
        main.entry = true;
        for stmt in &mut main.body {
            stmt.visit_stmts_mut(&mut |stmt| {
                if let Stmt::Return(value) = stmt {
                    value.get_or_insert_with(|| Expr::ident(FRAG_COLOR));
                }
            });
        }
        if !matches!(main.body.last(), Some(Stmt::Return(_))) {
            main.body.push(Stmt::Return(Some(Expr::ident(FRAG_COLOR))));
        }
        prologue.append(&mut main.body);
        main.body = prologue;
        return;
    }

    let mut body = prologue;
    let shadertoy = unit.functions().any(|f| {
        f.name == "mainImage" && f.params.len() == 2 && f.params[0].is_by_ref()
    });
    if shadertoy {
        debug!("wrapping mainImage in a fragment entry point");
        let color = cx.temp("color");
        body.push(Stmt::decl(VarDecl::var(color.clone(), GlslType::vec(4), None)));
        body.push(Stmt::Expr(Expr::call(
            "mainImage",
            vec![
                Expr::AddrOf(Box::new(Expr::ident(&color))),
                Expr::field(Expr::ident(FRAG_COORD), "xy"),
            ],
        )));
        body.push(Stmt::Return(Some(Expr::ident(color))));
    } else {
        cx.warn(
            Stage::Rewrite,
            "no `void main()` found; the fragment stage outputs transparent black",
        );
        body.push(Stmt::Return(Some(Expr::ident(FRAG_COLOR))));
    }
    unit.items.push(Item::Function(Function {
        name: ENTRY_POINT.to_string(),
        ret: GlslType::vec(4),
        params: Vec::new(),
        body,
        entry: true,
    }));
}

/// Fills the fragment built-in stand-ins. WGSL positions have a top-left
/// origin, `gl_FragCoord` a bottom-left one.
fn prologue() -> Vec<Stmt> {
    let position = |lane: &str| Expr::field(Expr::ident(POSITION), lane);
    let height = Expr::field(
        Expr::field(Expr::ident(UNIFORM_VAR), "RENDERSIZE"),
        "y",
    );
    vec![
        Stmt::Expr(Expr::assign(
            Expr::ident(FRAG_COORD),
            Expr::construct(
                GlslType::vec(4),
                vec![
                    position("x"),
                    Expr::binary(BinOp::Sub, height, position("y")),
                    position("z"),
                    position("w"),
                ],
            ),
        )),
        Stmt::Expr(Expr::assign(Expr::ident(FRAG_NORM_COORD), Expr::ident(UV))),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::testing::{squash, Fixture};

    const PROLOGUE: &str = "isf_frag_coord = vec4<f32>(isf_position.x, isf_uniforms.RENDERSIZE.y - isf_position.y, isf_position.z, isf_position.w); isf_frag_norm_coord = isf_uv;";

    #[test]
    fn main_becomes_the_entry_point() {
        let (out, _) = Fixture::new().run(
            "void main() { if (isf_frag_coord.x < 1.0) { return; } isf_frag_color = vec4(1.0); }",
            &[run],
        );
        let out = squash(&out);
        assert!(
            out.contains(&format!(
                "@fragment fn isf_fragment_main(@builtin(position) isf_position: vec4<f32>, @location(0) isf_uv: vec2<f32>) -> @location(0) vec4<f32> {{ {PROLOGUE}"
            )),
            "{out}"
        );
        assert!(out.contains("if (isf_frag_coord.x < 1.0) { return isf_frag_color; }"), "{out}");
        assert!(out.ends_with("isf_frag_color = vec4<f32>(1.0); return isf_frag_color; }"), "{out}");
    }

    #[test]
    fn main_image_is_wrapped() {
        let (out, warnings) = Fixture::new().run(
            "void mainImage(out vec4 fragColor, in vec2 fragCoord) { fragColor = vec4(fragCoord, 0.0, 1.0); }",
            &[crate::passes::params::run, run],
        );
        let out = squash(&out);
        assert!(warnings.is_empty(), "{warnings:?}");
        assert!(
            out.contains("var isf_color0: vec4<f32>; mainImage(&isf_color0, isf_frag_coord.xy); return isf_color0; }"),
            "{out}"
        );
    }

    #[test]
    fn existing_entry_point_is_left_alone() {
        let source = "void main() { isf_frag_color = vec4(1.0); }";
        let (once, _) = Fixture::new().run(source, &[run]);
        let (twice, _) = Fixture::new().run(source, &[run, run]);
        assert_eq!(once, twice);
        assert_eq!(twice.matches("fn isf_fragment_main(").count(), 1);
    }

    #[test]
    fn missing_main_still_yields_an_entry_point() {
        let (out, warnings) = Fixture::new().run("float helper() { return 1.0; }", &[run]);
        assert_eq!(warnings.len(), 1);
        assert!(squash(&out).contains("return isf_frag_color; }"), "{out}");
        assert!(out.contains("fn isf_fragment_main("), "{out}");
    }
}
