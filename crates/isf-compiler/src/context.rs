//! Per-compilation state threaded through every rewrite pass.
//!
//! One `CompilationContext` is built for each source unit and dropped when
//! the unit is done, so nothing leaks between compilations and independent
//! units can compile on separate threads.
use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::warn;

use crate::ast::Stmt;
use crate::diagnostics::{Stage, Warning};
use crate::layout::{self, UniformLayout, UniformType, UNIFORM_STRUCT, UNIFORM_VAR};
use crate::metadata::IsfMetadata;
use crate::options::CompilerOptions;
use crate::types::{Env, GlslType, Scalar};

/// Private module-scope variables standing in for GLSL fragment built-ins.
pub const FRAG_COORD: &str = "isf_frag_coord";
pub const FRAG_NORM_COORD: &str = "isf_frag_norm_coord";
pub const FRAG_COLOR: &str = "isf_frag_color";

pub struct CompilationContext<'a> {
    pub options: &'a CompilerOptions,
    pub metadata: &'a IsfMetadata,
    /// Shared with the layout analyzer; pass bindings are added once the
    /// texture pass knows which buffers the body samples.
    pub layout: UniformLayout,
    pub warnings: Vec<Warning>,
    /// Reserved-word renames, old name to new name.
    pub renamed: BTreeMap<String, String>,
    /// Image and pass names the lowered body samples from.
    pub referenced_textures: BTreeSet<String>,
    /// Assignments for module-scope variables whose initialisers had to move
    /// into the entry point.
    pub deferred_inits: Vec<Stmt>,
    /// Global `out` variable the body writes its colour to, if any.
    pub output_alias: Option<String>,
    temp_counter: usize,
}

impl<'a> CompilationContext<'a> {
    pub fn new(
        options: &'a CompilerOptions,
        metadata: &'a IsfMetadata,
        layout: UniformLayout,
        warnings: Vec<Warning>,
    ) -> Self {
        Self {
            options,
            metadata,
            layout,
            warnings,
            renamed: BTreeMap::new(),
            referenced_textures: BTreeSet::new(),
            deferred_inits: Vec::new(),
            output_alias: None,
            temp_counter: 0,
        }
    }

    pub fn warn(&mut self, stage: Stage, message: impl Into<String>) {
        let warning = Warning::new(stage, message);
        warn!(%warning, "rewrite");
        self.warnings.push(warning);
    }

    /// Fresh identifier for compiler-introduced temporaries.
    pub fn temp(&mut self, stem: &str) -> String {
        let name = format!("isf_{stem}{}", self.temp_counter);
        self.temp_counter += 1;
        name
    }

    pub fn pass_index(&self, name: &str) -> Option<usize> {
        self.metadata
            .passes
            .iter()
            .enumerate()
            .find(|(index, pass)| layout::pass_names(*index, pass).iter().any(|n| n == name))
            .map(|(index, _)| index)
    }

    /// Types of every name the host provides, as the GLSL source sees them.
    pub fn implicit_types(&self) -> HashMap<String, GlslType> {
        let mut types = HashMap::new();
        for (name, ty) in layout::BUILTIN_FIELDS {
            if *name != "opacity" && *name != "speed" {
                types.insert(name.to_string(), uniform_glsl_type(*ty));
            }
        }
        for input in &self.metadata.inputs {
            let ty = match &input.kind {
                kind if kind.is_texture() => GlslType::Sampler,
                kind if kind.is_boolean() => GlslType::BOOL,
                kind => match UniformType::for_input(kind) {
                    Some(ty) => uniform_glsl_type(ty),
                    None => continue,
                },
            };
            types.insert(input.name.clone(), ty);
        }
        for (index, pass) in self.metadata.passes.iter().enumerate() {
            for name in layout::pass_names(index, pass) {
                types.entry(name).or_insert(GlslType::Sampler);
            }
        }
        types.insert("isf_FragNormCoord".into(), GlslType::vec(2));
        types.insert("gl_FragCoord".into(), GlslType::vec(4));
        types.insert("gl_FragColor".into(), GlslType::vec(4));
        types.insert(FRAG_COORD.into(), GlslType::vec(4));
        types.insert(FRAG_NORM_COORD.into(), GlslType::vec(2));
        types.insert(FRAG_COLOR.into(), GlslType::vec(4));
        types.insert(UNIFORM_VAR.into(), GlslType::Struct(UNIFORM_STRUCT.into()));
        types
    }

    /// Environment for `unit` with host names and the uniform record known.
    pub fn env_for(&self, unit: &crate::ast::TranslationUnit) -> Env {
        let mut env = Env::for_unit(unit, self.implicit_types());
        let fields = self
            .layout
            .fields
            .iter()
            .map(|f| {
                let ty = uniform_glsl_type(f.ty);
                (f.member.clone(), ty)
            })
            .collect();
        env.declare_struct(UNIFORM_STRUCT, fields);
        env
    }
}

pub fn uniform_glsl_type(ty: UniformType) -> GlslType {
    match ty {
        UniformType::F32 => GlslType::FLOAT,
        UniformType::I32 => GlslType::Scalar(Scalar::Int),
        UniformType::Vec2 => GlslType::vec(2),
        UniformType::Vec3 => GlslType::vec(3),
        UniformType::Vec4 => GlslType::vec(4),
    }
}
