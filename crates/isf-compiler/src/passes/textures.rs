//! Lowers the ISF sampling vocabulary and raw GLSL texture calls to explicit
//! `textureSampleLevel` / `textureLoad` calls on the binding pair allocated
//! for each image or pass buffer.
//!
//! Every sample uses an explicit level of detail so the call stays legal in
//! non-uniform control flow. ISF coordinates have a bottom-left origin; with
//! `flip_texture_y` set they pass through the fixed flip helpers.
use crate::ast::{BinOp, Expr, TranslationUnit};
use crate::context::{CompilationContext, FRAG_NORM_COORD};
use crate::diagnostics::Stage;
use crate::layout::{self, sampler_var, texture_var};
use crate::passes::{rewrite, Rewrite};
use crate::types::{Env, GlslType, Scalar};

pub const FLIP_Y: &str = "isf_flip_y";
pub const FLIP_TEXEL: &str = "isf_flip_texel";

pub fn run(unit: &mut TranslationUnit, cx: &mut CompilationContext) {
    let mut env = cx.env_for(unit);
    rewrite(unit, &mut env, &mut Textures { cx });
}

struct Textures<'c, 'a> {
    cx: &'c mut CompilationContext<'a>,
}

#[derive(Clone, Copy)]
enum Access {
    /// Normalised coordinate argument.
    Norm,
    /// Pixel coordinate argument.
    Pixel,
    /// The current fragment.
    This,
    Size,
    /// Normalised coordinate plus explicit level.
    Lod,
    Texel,
}

fn access(name: &str) -> Option<Access> {
    let access = match name {
        "IMG_NORM_PIXEL" | "texture2D" | "texture" => Access::Norm,
        "IMG_PIXEL" | "texture2DRect" => Access::Pixel,
        "IMG_THIS_PIXEL" | "IMG_THIS_NORM_PIXEL" => Access::This,
        "IMG_SIZE" => Access::Size,
        "textureLod" | "texture2DLod" => Access::Lod,
        "texelFetch" => Access::Texel,
        _ => return None,
    };
    Some(access)
}

impl Rewrite for Textures<'_, '_> {
    fn expr(&mut self, expr: &mut Expr, env: &Env) {
        let Expr::Call { name, args } = expr else {
            return;
        };
        if env.is_user_function(name) {
            return;
        }
        let Some(access) = access(name) else {
            return;
        };
        let Some(target) = args.first().and_then(Expr::as_ident) else {
            let message = format!("`{name}` needs an image name as its first argument; left as written");
            self.cx.warn(Stage::Rewrite, message);
            return;
        };
        let Some(binding) = self.resolve(target, env) else {
            let message = format!(
                "`{name}` samples `{target}`, which is not a declared image or pass; left as written"
            );
            self.cx.warn(Stage::Rewrite, message);
            return;
        };
        self.cx.referenced_textures.insert(binding.clone());

        let mut rest = args.drain(1..);
        let first = rest.next();
        let second = rest.next();
        if rest.next().is_some() {
            self.cx.warn(
                Stage::Rewrite,
                format!("extra arguments to `{name}` (bias or offset) were dropped"),
            );
        }
        drop(rest);

        let lowered = match (access, first) {
            (Access::Norm, Some(uv)) => self.sample(&binding, uv, Expr::float("0.0")),
            (Access::Pixel, Some(px)) => {
                let uv = Expr::binary(BinOp::Div, px, size(&binding));
                self.sample(&binding, uv, Expr::float("0.0"))
            }
            (Access::This, _) => {
                self.sample(&binding, Expr::ident(FRAG_NORM_COORD), Expr::float("0.0"))
            }
            (Access::Size, _) => size(&binding),
            (Access::Lod, Some(uv)) => {
                let lod = second.unwrap_or(Expr::float("0.0"));
                self.sample(&binding, uv, lod)
            }
            (Access::Texel, Some(texel)) => {
                let lod = second.unwrap_or(Expr::int("0"));
                self.load(&binding, texel, lod, env)
            }
            (_, None) => {
                let message = format!("`{name}` is missing its coordinate argument");
                self.cx.warn(Stage::Rewrite, message);
                return;
            }
        };
        *expr = lowered;
    }
}

impl Textures<'_, '_> {
    /// Name the binding tables know `name` by.
    fn resolve(&self, name: &str, env: &Env) -> Option<String> {
        if env.is_declared(name) {
            return None;
        }
        if self.cx.layout.texture(name).is_some() {
            return Some(name.to_string());
        }
        let index = self.cx.pass_index(name)?;
        let pass = self.cx.metadata.passes.get(index)?;
        layout::pass_names(index, pass).into_iter().next()
    }

    fn sample(&self, binding: &str, uv: Expr, lod: Expr) -> Expr {
        let uv = if self.cx.options.flip_texture_y {
            Expr::call(FLIP_Y, vec![uv])
        } else {
            uv
        };
        Expr::call(
            "textureSampleLevel",
            vec![
                Expr::ident(texture_var(binding)),
                Expr::ident(sampler_var(binding)),
                uv,
                lod,
            ],
        )
    }

    fn load(&self, binding: &str, texel: Expr, lod: Expr, env: &Env) -> Expr {
        let ivec2 = GlslType::Vector(Scalar::Int, 2);
        let texel = if env.type_of(&texel).as_ref() == Some(&ivec2) {
            texel
        } else {
            Expr::construct(ivec2, vec![texel])
        };
        let texel = if self.cx.options.flip_texture_y {
            Expr::call(FLIP_TEXEL, vec![texel, dimensions(binding)])
        } else {
            texel
        };
        Expr::call(
            "textureLoad",
            vec![Expr::ident(texture_var(binding)), texel, lod],
        )
    }
}

fn dimensions(binding: &str) -> Expr {
    Expr::call("textureDimensions", vec![Expr::ident(texture_var(binding))])
}

fn size(binding: &str) -> Expr {
    Expr::construct(GlslType::vec(2), vec![dimensions(binding)])
}
