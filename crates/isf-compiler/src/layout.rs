//! Uniform buffer layout and texture binding tables derived from the ISF
//! input list.
//!
//! The uniform record starts with a fixed prefix of host-provided fields and
//! continues with user inputs in declaration order. Offsets follow WGSL's
//! uniform address space rules (scalars align to 4, 2-vectors to 8, 3- and
//! 4-vectors to 16) so the generated `struct IsfUniforms` needs no explicit
//! `@align`/`@size` attributes and its natural size matches `size` here.
use std::collections::{BTreeSet, HashSet};

use serde::Serialize;
use tracing::{debug, warn};

use crate::diagnostics::{Stage, Warning};
use crate::metadata::{InputKind, IsfMetadata, PassDecl};
use crate::passes::reserved;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UniformType {
    #[serde(rename = "f32")]
    F32,
    #[serde(rename = "i32")]
    I32,
    #[serde(rename = "vec2<f32>")]
    Vec2,
    #[serde(rename = "vec3<f32>")]
    Vec3,
    #[serde(rename = "vec4<f32>")]
    Vec4,
}

impl UniformType {
    pub fn wgsl(self) -> &'static str {
        match self {
            Self::F32 => "f32",
            Self::I32 => "i32",
            Self::Vec2 => "vec2<f32>",
            Self::Vec3 => "vec3<f32>",
            Self::Vec4 => "vec4<f32>",
        }
    }

    pub fn size(self) -> u32 {
        match self {
            Self::F32 | Self::I32 => 4,
            Self::Vec2 => 8,
            Self::Vec3 => 12,
            Self::Vec4 => 16,
        }
    }

    pub fn align(self) -> u32 {
        match self {
            Self::F32 | Self::I32 => 4,
            Self::Vec2 => 8,
            Self::Vec3 | Self::Vec4 => 16,
        }
    }

    /// Layout used for a declared input kind; `None` for texture kinds.
    pub fn for_input(kind: &InputKind) -> Option<Self> {
        match kind {
            InputKind::Float | InputKind::Unknown(_) => Some(Self::F32),
            InputKind::Long | InputKind::Bool | InputKind::Event => Some(Self::I32),
            InputKind::Point2D => Some(Self::Vec2),
            InputKind::Color => Some(Self::Vec4),
            InputKind::Image | InputKind::Audio | InputKind::AudioFft => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    Builtin,
    Input(InputKind),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UniformField {
    pub name: String,
    /// Member name inside `IsfUniforms`; differs from `name` only when the
    /// input name is reserved in WGSL.
    pub member: String,
    pub source: FieldSource,
    #[serde(rename = "type")]
    pub ty: UniformType,
    pub offset: u32,
    pub size: u32,
    /// Padding was inserted before this field to honour its alignment.
    pub padded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextureBinding {
    pub name: String,
    pub kind: InputKind,
    pub texture: u32,
    pub sampler: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassBinding {
    pub name: String,
    pub pass_index: usize,
    pub persistent: bool,
    pub float: bool,
    pub texture: u32,
    pub sampler: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct UniformLayout {
    pub fields: Vec<UniformField>,
    /// Total uniform buffer size in bytes, a multiple of 16.
    pub size: u32,
    pub textures: Vec<TextureBinding>,
    pub passes: Vec<PassBinding>,
}

pub const UNIFORM_STRUCT: &str = "IsfUniforms";
pub const UNIFORM_VAR: &str = "isf_uniforms";
pub const UNIFORM_GROUP: u32 = 0;
pub const TEXTURE_GROUP: u32 = 1;

/// Host-provided prefix, in order.
pub const BUILTIN_FIELDS: &[(&str, UniformType)] = &[
    ("TIME", UniformType::F32),
    ("TIMEDELTA", UniformType::F32),
    ("RENDERSIZE", UniformType::Vec2),
    ("PASSINDEX", UniformType::I32),
    ("FRAMEINDEX", UniformType::I32),
    ("opacity", UniformType::F32),
    ("speed", UniformType::F32),
    ("DATE", UniformType::Vec4),
];

pub fn texture_var(name: &str) -> String {
    format!("isf_tex_{name}")
}

pub fn sampler_var(name: &str) -> String {
    format!("isf_smp_{name}")
}

/// Name a pass can be referenced by when it declares no `TARGET`.
pub fn default_pass_name(index: usize) -> String {
    format!("pass{index}")
}

/// Every name code may use to refer to pass `index`.
pub fn pass_names(index: usize, pass: &PassDecl) -> Vec<String> {
    let mut names = vec![default_pass_name(index)];
    if let Some(target) = &pass.target {
        names.insert(0, target.clone());
    }
    names
}

pub fn analyze(metadata: &IsfMetadata, rename_prefix: &str, warnings: &mut Vec<Warning>) -> UniformLayout {
    let mut layout = UniformLayout::default();
    let mut cursor = 0u32;
    let mut push = |layout: &mut UniformLayout, name: &str, member: String, source, ty: UniformType| {
        let offset = round_up(cursor, ty.align());
        layout.fields.push(UniformField {
            name: name.to_string(),
            member,
            source,
            ty,
            offset,
            size: ty.size(),
            padded: offset != cursor,
        });
        cursor = offset + ty.size();
    };

    for (name, ty) in BUILTIN_FIELDS {
        push(&mut layout, name, name.to_string(), FieldSource::Builtin, *ty);
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for input in &metadata.inputs {
        if !seen.insert(input.name.as_str()) {
            record(
                warnings,
                format!("duplicate input `{}` ignored", input.name),
            );
            continue;
        }
        if input.kind.is_texture() {
            let slot = layout.textures.len() as u32;
            layout.textures.push(TextureBinding {
                name: input.name.clone(),
                kind: input.kind.clone(),
                texture: slot * 2,
                sampler: slot * 2 + 1,
            });
            continue;
        }
        if BUILTIN_FIELDS.iter().any(|(name, _)| *name == input.name) {
            if input.name == "speed" && input.kind == InputKind::Float {
                if let Some(field) = layout.fields.iter_mut().find(|f| f.name == "speed") {
                    field.source = FieldSource::Input(InputKind::Float);
                }
            } else {
                record(
                    warnings,
                    format!(
                        "input `{}` collides with a built-in uniform and was dropped",
                        input.name
                    ),
                );
            }
            continue;
        }
        if let InputKind::Unknown(kind) = &input.kind {
            record(
                warnings,
                format!(
                    "input `{}` has unsupported type `{kind}`; laid out as a float",
                    input.name
                ),
            );
        }
        let Some(ty) = UniformType::for_input(&input.kind) else {
            continue;
        };
        let member = if reserved::is_reserved(&input.name) {
            format!("{rename_prefix}{}", input.name)
        } else {
            input.name.clone()
        };
        push(
            &mut layout,
            &input.name,
            member,
            FieldSource::Input(input.kind.clone()),
            ty,
        );
    }

    layout.size = round_up(cursor, 16);
    debug!(
        fields = layout.fields.len(),
        size = layout.size,
        textures = layout.textures.len(),
        "derived uniform layout"
    );
    layout
}

impl UniformLayout {
    pub fn field(&self, name: &str) -> Option<&UniformField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn texture(&self, name: &str) -> Option<&TextureBinding> {
        self.textures.iter().find(|t| t.name == name)
    }

    pub fn pass(&self, name: &str) -> Option<&PassBinding> {
        self.passes.iter().find(|p| p.name == name)
    }

    /// Allocates bindings for passes whose name appears in `referenced`,
    /// after every image binding.
    pub fn bind_passes(&mut self, passes: &[PassDecl], referenced: &BTreeSet<String>) {
        self.passes.clear();
        for (index, pass) in passes.iter().enumerate() {
            let Some(name) = pass_names(index, pass)
                .into_iter()
                .find(|name| referenced.contains(name))
            else {
                continue;
            };
            let slot = (self.textures.len() + self.passes.len()) as u32;
            self.passes.push(PassBinding {
                name,
                pass_index: index,
                persistent: pass.persistent,
                float: pass.float,
                texture: slot * 2,
                sampler: slot * 2 + 1,
            });
        }
        debug!(bound = self.passes.len(), declared = passes.len(), "bound pass buffers");
    }
}

fn round_up(value: u32, align: u32) -> u32 {
    value.div_ceil(align) * align
}

fn record(warnings: &mut Vec<Warning>, message: String) {
    let warning = Warning::new(Stage::Layout, message);
    warn!(%warning, "layout");
    warnings.push(warning);
}
