//! Maps host-provided names onto what the assembled module declares: header
//! inputs and the ISF built-ins become members of the uniform record, the
//! GLSL fragment built-ins become private module-scope variables.
use crate::ast::{Expr, TranslationUnit};
use crate::context::{CompilationContext, FRAG_COLOR, FRAG_COORD, FRAG_NORM_COORD};
use crate::diagnostics::Stage;
use crate::layout::{FieldSource, UNIFORM_VAR};
use crate::passes::{rewrite, Rewrite};
use crate::types::Env;

pub fn run(unit: &mut TranslationUnit, cx: &mut CompilationContext) {
    let mut env = cx.env_for(unit);
    rewrite(unit, &mut env, &mut Builtins { cx });
}

struct Builtins<'c, 'a> {
    cx: &'c mut CompilationContext<'a>,
}

impl Rewrite for Builtins<'_, '_> {
    fn expr(&mut self, expr: &mut Expr, env: &Env) {
        match expr {
            Expr::Ident(name) if !env.is_declared(name) => {
                if let Some(mapped) = self.map(name) {
                    *expr = mapped;
                }
            }
            Expr::Index { base, index } if base.as_ident() == Some("gl_FragData") => {
                if !matches!(index.as_ref(), Expr::Int(text) if text == "0") {
                    self.cx.warn(
                        Stage::Rewrite,
                        "only one colour attachment is supported; gl_FragData writes go to it",
                    );
                }
                *expr = Expr::ident(FRAG_COLOR);
            }
            _ => {}
        }
    }
}

impl Builtins<'_, '_> {
    fn map(&self, name: &str) -> Option<Expr> {
        let fixed = match name {
            "isf_FragNormCoord" => Some(FRAG_NORM_COORD),
            "gl_FragCoord" => Some(FRAG_COORD),
            "gl_FragColor" => Some(FRAG_COLOR),
            _ if self.cx.output_alias.as_deref() == Some(name) => Some(FRAG_COLOR),
            _ => None,
        };
        if let Some(fixed) = fixed {
            return Some(Expr::ident(fixed));
        }
        let field = self.cx.layout.field(name)?;
        // `opacity` and `speed` are host-side unless the header declares them.
        let visible = match &field.source {
            FieldSource::Input(_) => true,
            FieldSource::Builtin => !matches!(name, "opacity" | "speed"),
        };
        visible.then(|| Expr::field(Expr::ident(UNIFORM_VAR), field.member.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::InputKind;
    use crate::passes::testing::{squash, Fixture};

    #[test]
    fn host_names_resolve_to_uniform_members() {
        let (out, warnings) = Fixture::new()
            .input("level", InputKind::Float)
            .input("center", InputKind::Point2D)
            .run(
                "void main() { vec2 uv = isf_FragNormCoord - center;\n\
                 float t = TIME * level + float(FRAMEINDEX);\n\
                 gl_FragColor = vec4(uv, t, gl_FragCoord.x / RENDERSIZE.x); }",
                &[run],
            );
        let out = squash(&out);
        assert!(warnings.is_empty(), "{warnings:?}");
        assert!(out.contains("var uv: vec2<f32> = isf_frag_norm_coord - isf_uniforms.center;"), "{out}");
        assert!(
            out.contains("isf_uniforms.TIME * isf_uniforms.level + f32(isf_uniforms.FRAMEINDEX)"),
            "{out}"
        );
        assert!(
            out.contains("isf_frag_color = vec4<f32>(uv, t, isf_frag_coord.x / isf_uniforms.RENDERSIZE.x);"),
            "{out}"
        );
    }

    #[test]
    fn user_declarations_shadow_host_names() {
        let (out, _) = Fixture::new()
            .input("level", InputKind::Float)
            .run("float f(float level) { return level * TIME; }", &[run]);
        assert!(squash(&out).contains("return level * isf_uniforms.TIME;"), "{out}");
    }

    #[test]
    fn speed_is_only_visible_when_declared() {
        let (out, _) = Fixture::new().run("void main() { float s = speed; }", &[run]);
        assert!(squash(&out).contains("var s: f32 = speed;"), "{out}");

        let (out, _) = Fixture::new()
            .input("speed", InputKind::Float)
            .run("void main() { float s = speed; }", &[run]);
        assert!(squash(&out).contains("var s: f32 = isf_uniforms.speed;"), "{out}");
    }

    #[test]
    fn frag_data_maps_to_the_colour_output() {
        let (out, warnings) = Fixture::new().run(
            "void main() { gl_FragData[0] = vec4(1.0); gl_FragData[1] = vec4(0.0); }",
            &[run],
        );
        let out = squash(&out);
        assert!(out.contains("isf_frag_color = vec4<f32>(1.0);"), "{out}");
        assert!(out.contains("isf_frag_color = vec4<f32>(0.0);"), "{out}");
        assert_eq!(warnings.len(), 1);
    }
}
