//! Stitches the lowered body into complete WGSL modules.
//!
//! The assembler performs no rewriting. It prepends the uniform record, the
//! binding declarations, the private stand-ins for GLSL fragment built-ins
//! and the fixed helper library, then appends the already-lowered body.
use std::fmt::Write;

use crate::context::{FRAG_COLOR, FRAG_COORD, FRAG_NORM_COORD};
use crate::layout::{
    sampler_var, texture_var, UniformLayout, TEXTURE_GROUP, UNIFORM_GROUP, UNIFORM_STRUCT,
    UNIFORM_VAR,
};

/// Builds the fragment module around `body`.
///
/// Sections, in order:
///
/// 1. `struct IsfUniforms` with one member per [`UniformField`](crate::UniformField),
///    annotated with its byte offset.
/// 2. The uniform binding and one texture/sampler pair per image, then per
///    referenced pass buffer.
/// 3. Private module-scope variables for the fragment built-ins.
/// 4. [`HELPERS`].
/// 5. The lowered body, entry point included.
pub fn assemble_fragment(body: &str, layout: &UniformLayout) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "// Generated by isf-compiler. Uniform buffer size: {} bytes.\n",
        layout.size
    );

    let _ = writeln!(out, "struct {UNIFORM_STRUCT} {{");
    for field in &layout.fields {
        let _ = writeln!(
            out,
            "    {}: {}, // offset {}",
            field.member,
            field.ty.wgsl(),
            field.offset
        );
    }
    out.push_str("}\n\n");
    let _ = writeln!(
        out,
        "@group({UNIFORM_GROUP}) @binding(0) var<uniform> {UNIFORM_VAR}: {UNIFORM_STRUCT};"
    );

    let pairs = layout
        .textures
        .iter()
        .map(|t| (t.name.as_str(), t.texture, t.sampler))
        .chain(
            layout
                .passes
                .iter()
                .map(|p| (p.name.as_str(), p.texture, p.sampler)),
        );
    for (name, texture, sampler) in pairs {
        let _ = writeln!(
            out,
            "@group({TEXTURE_GROUP}) @binding({texture}) var {}: texture_2d<f32>;",
            texture_var(name)
        );
        let _ = writeln!(
            out,
            "@group({TEXTURE_GROUP}) @binding({sampler}) var {}: sampler;",
            sampler_var(name)
        );
    }

    out.push('\n');
    let _ = writeln!(out, "var<private> {FRAG_COORD}: vec4<f32>;");
    let _ = writeln!(out, "var<private> {FRAG_NORM_COORD}: vec2<f32>;");
    let _ = writeln!(out, "var<private> {FRAG_COLOR}: vec4<f32>;");
    out.push('\n');
    out.push_str(HELPERS);
    out.push('\n');
    out.push_str(body);
    out
}

/// Helper functions for operations WGSL lacks natively. Identical in every
/// unit.
pub const HELPERS: &str = r"fn isf_mod_f32(x: f32, y: f32) -> f32 {
    return x - y * floor(x / y);
}

fn isf_mod_vec2(x: vec2<f32>, y: vec2<f32>) -> vec2<f32> {
    return x - y * floor(x / y);
}

fn isf_mod_vec3(x: vec3<f32>, y: vec3<f32>) -> vec3<f32> {
    return x - y * floor(x / y);
}

fn isf_mod_vec4(x: vec4<f32>, y: vec4<f32>) -> vec4<f32> {
    return x - y * floor(x / y);
}

// ISF images have a bottom-left origin; WGSL textures a top-left one.
fn isf_flip_y(uv: vec2<f32>) -> vec2<f32> {
    return vec2<f32>(uv.x, 1.0 - uv.y);
}

fn isf_flip_texel(texel: vec2<i32>, size: vec2<u32>) -> vec2<i32> {
    return vec2<i32>(texel.x, i32(size.y) - 1 - texel.y);
}
";

/// Full-screen triangle vertex stage, identical for every unit. `uv` has a
/// bottom-left origin to match `isf_FragNormCoord`.
pub const VERTEX_SHADER_WGSL: &str = r"// Generated by isf-compiler. Full-screen triangle.

struct IsfVertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn isf_vertex_main(@builtin(vertex_index) vertex_index: u32) -> IsfVertexOutput {
    var positions = array<vec2<f32>, 3>(
        vec2<f32>(-1.0, -3.0),
        vec2<f32>(3.0, 1.0),
        vec2<f32>(-1.0, 1.0),
    );
    let pos = positions[vertex_index];
    var out: IsfVertexOutput;
    out.position = vec4<f32>(pos, 0.0, 1.0);
    out.uv = pos * 0.5 + vec2<f32>(0.5, 0.5);
    return out;
}
";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout;
    use crate::metadata::{InputDecl, InputKind, IsfMetadata};

    fn layout_with_image() -> UniformLayout {
        let metadata = IsfMetadata {
            inputs: vec![
                InputDecl::new("level", InputKind::Float),
                InputDecl::new("inputImage", InputKind::Image),
            ],
            ..IsfMetadata::default()
        };
        layout::analyze(&metadata, "isf_", &mut Vec::new())
    }

    #[test]
    fn declares_uniforms_bindings_and_helpers() {
        let module = assemble_fragment("// body\n", &layout_with_image());
        assert!(module.contains("struct IsfUniforms {\n    TIME: f32, // offset 0\n"));
        assert!(module.contains("    DATE: vec4<f32>, // offset 32\n"));
        assert!(module.contains("    level: f32, // offset 48\n"));
        assert!(module.contains("@group(0) @binding(0) var<uniform> isf_uniforms: IsfUniforms;"));
        assert!(module.contains("@group(1) @binding(0) var isf_tex_inputImage: texture_2d<f32>;"));
        assert!(module.contains("@group(1) @binding(1) var isf_smp_inputImage: sampler;"));
        assert!(module.contains("var<private> isf_frag_color: vec4<f32>;"));
        assert!(module.contains("fn isf_mod_vec3("));
        assert!(module.ends_with("// body\n"));
    }

    #[test]
    fn vertex_stage_is_fixed() {
        assert!(VERTEX_SHADER_WGSL.contains("@vertex\nfn isf_vertex_main("));
        assert!(VERTEX_SHADER_WGSL.contains("vec2<f32>(-1.0, -3.0)"));
    }
}
