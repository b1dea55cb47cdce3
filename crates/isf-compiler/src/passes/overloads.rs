//! Gives every overload of a user function its own name.
//!
//! Each overload becomes `<name>_<param suffixes>` (or `<name>_void`), and
//! call sites pick the variant whose arity matches, breaking ties by the
//! inferred argument types.
use std::collections::HashMap;

use tracing::debug;

use crate::ast::{Expr, TranslationUnit};
use crate::context::CompilationContext;
use crate::diagnostics::Stage;
use crate::passes::{rewrite, Rewrite};
use crate::types::{Env, GlslType};

struct Variant {
    name: String,
    params: Vec<GlslType>,
}

pub fn run(unit: &mut TranslationUnit, cx: &mut CompilationContext) {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for function in unit.functions() {
        *counts.entry(function.name.clone()).or_default() += 1;
    }
    let mut variants: HashMap<String, Vec<Variant>> = HashMap::new();
    for function in unit.functions_mut() {
        if counts.get(&function.name).copied().unwrap_or(0) < 2 || function.name == "main" {
            continue;
        }
        let suffix = if function.params.is_empty() {
            "void".to_string()
        } else {
            function
                .params
                .iter()
                .map(|p| p.ty.suffix())
                .collect::<Vec<_>>()
                .join("_")
        };
        let renamed = format!("{}_{suffix}", function.name);
        variants
            .entry(std::mem::replace(&mut function.name, renamed.clone()))
            .or_default()
            .push(Variant {
                name: renamed,
                params: function.param_types(),
            });
    }
    if variants.is_empty() {
        return;
    }
    debug!(overloaded = variants.len(), "disambiguating overloads");
    let mut env = cx.env_for(unit);
    rewrite(unit, &mut env, &mut Calls { cx, variants });
}

struct Calls<'c, 'a> {
    cx: &'c mut CompilationContext<'a>,
    variants: HashMap<String, Vec<Variant>>,
}

impl Rewrite for Calls<'_, '_> {
    fn expr(&mut self, expr: &mut Expr, env: &Env) {
        let Expr::Call { name, args } = expr else {
            return;
        };
        let Some(variants) = self.variants.get(name.as_str()) else {
            return;
        };
        let arity: Vec<&Variant> = variants
            .iter()
            .filter(|v| v.params.len() == args.len())
            .collect();
        let arg_types: Vec<Option<GlslType>> = args.iter().map(|a| env.type_of(a)).collect();
        let score = |variant: &Variant| {
            variant
                .params
                .iter()
                .zip(&arg_types)
                .filter(|(param, arg)| arg.as_ref() == Some(*param))
                .count()
        };
        let chosen = match arity.as_slice() {
            [] => None,
            [only] => Some(only.name.clone()),
            several => {
                let best = several.iter().map(|v| score(v)).max().unwrap_or(0);
                let mut top = several.iter().filter(|v| score(v) == best);
                let first = top.next().map(|v| v.name.clone());
                if top.next().is_some() {
                    let message = format!(
                        "call to overloaded `{name}` is ambiguous; picked the first candidate"
                    );
                    self.cx.warn(Stage::Rewrite, message);
                }
                first
            }
        };
        match chosen {
            Some(chosen) => *name = chosen,
            None => {
                let message = format!(
                    "no overload of `{name}` takes {} argument(s); call left as written",
                    args.len()
                );
                self.cx.warn(Stage::Rewrite, message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::testing::{squash, Fixture};

    #[test]
    fn renames_overloads_and_calls() {
        let (out, warnings) = Fixture::new().run(
            "float lum(vec3 c) { return dot(c, vec3(0.3, 0.6, 0.1)); }\n\
             float lum(vec4 c) { return lum(c.rgb) * c.a; }\n\
             float lum() { return 0.0; }\n\
             void main() { vec4 c = vec4(1.0); float a = lum(c); float b = lum(c.xyz); float z = lum(); }",
            &[run],
        );
        let out = squash(&out);
        assert!(warnings.is_empty(), "{warnings:?}");
        assert!(out.contains("fn lum_vec3f(c: vec3<f32>) -> f32"), "{out}");
        assert!(out.contains("fn lum_vec4f(c: vec4<f32>) -> f32"), "{out}");
        assert!(out.contains("fn lum_void() -> f32"), "{out}");
        assert!(out.contains("return lum_vec3f(c.rgb) * c.a;"), "{out}");
        assert!(out.contains("var a: f32 = lum_vec4f(c);"), "{out}");
        assert!(out.contains("var b: f32 = lum_vec3f(c.xyz);"), "{out}");
        assert!(out.contains("var z: f32 = lum_void();"), "{out}");
    }

    #[test]
    fn single_definitions_keep_their_name() {
        let (out, _) = Fixture::new().run(
            "float f(float x) { return x; }\nvoid main() { float y = f(1.0); }",
            &[run],
        );
        assert!(out.contains("fn f(x: f32) -> f32"), "{out}");
    }
}
