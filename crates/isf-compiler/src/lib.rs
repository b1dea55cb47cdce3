//! Compiles ISF shader effects (a JSON header followed by a GLSL ES fragment
//! body) into WGSL.
//!
//! ```text
//! source ─► metadata::extract ─► preprocess ─► layout::analyze
//!                                     │               │
//!                                     ▼               ▼
//!                               parser::parse ─► passes::run ─► emit ─► assembler
//! ```
//!
//! Each call to [`Compiler::compile`] owns all of its state, so independent
//! units may be compiled on separate threads. Nothing here touches the GPU or
//! the filesystem.
use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use tracing::{debug, warn};

pub mod assembler;
pub mod diagnostics;
pub mod error;
pub mod layout;
pub mod metadata;
pub mod options;
pub mod preprocess;

mod ast;
mod context;
mod emit;
mod lexer;
mod parser;
mod passes;
mod types;

pub use diagnostics::{validate, Finding, Stage, ValidationReport, Warning};
pub use error::CompileError;
pub use layout::{FieldSource, PassBinding, TextureBinding, UniformField, UniformLayout, UniformType};
pub use metadata::{ImportedTexture, InputDecl, InputKind, IsfMetadata, PassDecl};
pub use options::CompilerOptions;
pub use preprocess::MacroDef;

use context::CompilationContext;

/// Everything one compilation produces.
#[derive(Debug, Clone, Serialize)]
pub struct CompilerOutput {
    /// WGSL fragment module; entry point `isf_fragment_main`.
    pub fragment: String,
    /// WGSL vertex module; entry point `isf_vertex_main`. Identical for every unit.
    pub vertex: String,
    pub layout: UniformLayout,
    pub metadata: IsfMetadata,
    /// Macros defined at the end of the body.
    pub macros: Vec<MacroDef>,
    /// Identifiers renamed because WGSL reserves them, old name to new.
    pub renamed: BTreeMap<String, String>,
    pub warnings: Vec<Warning>,
    pub validation: ValidationReport,
}

/// Compiles `source` with default options.
pub fn compile(source: &str) -> Result<CompilerOutput, CompileError> {
    Compiler::default().compile(source)
}

#[derive(Debug, Clone, Default)]
pub struct Compiler {
    options: CompilerOptions,
}

impl Compiler {
    pub fn new(options: CompilerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    pub fn compile(&self, source: &str) -> Result<CompilerOutput, CompileError> {
        let options = &self.options;
        let mut warnings = Vec::new();

        let extracted = metadata::extract(source, options, &mut warnings)?;
        let metadata = extracted.metadata;
        let input_names: HashSet<String> =
            metadata.inputs.iter().map(|input| input.name.clone()).collect();

        let preprocessed = preprocess::preprocess(
            &extracted.body,
            &input_names,
            options.max_macro_passes,
            &mut warnings,
        );
        let layout = layout::analyze(&metadata, &options.rename_prefix, &mut warnings);
        let mut unit = parser::parse(&preprocessed.text)?;
        debug!(items = unit.items.len(), "parsed code body");

        let (body, mut layout, warnings, renamed, referenced_textures) = {
            let mut cx = CompilationContext::new(options, &metadata, layout, warnings);
            passes::run(&mut unit, &mut cx)?;
            let body = emit::emit_unit(&unit);
            (body, cx.layout, cx.warnings, cx.renamed, cx.referenced_textures)
        };
        layout.bind_passes(&metadata.passes, &referenced_textures);

        let fragment = assembler::assemble_fragment(&body, &layout);
        let validation = if options.validate {
            validate(&fragment)
        } else {
            ValidationReport::skipped()
        };
        if !validation.passed {
            warn!(
                findings = validation.findings.len(),
                "emitted module failed validation"
            );
        }
        debug!(
            warnings = warnings.len(),
            uniform_bytes = layout.size,
            textures = layout.textures.len(),
            passes = layout.passes.len(),
            "compiled unit"
        );

        Ok(CompilerOutput {
            fragment,
            vertex: assembler::VERTEX_SHADER_WGSL.to_string(),
            layout,
            metadata,
            macros: preprocessed.macros,
            renamed,
            warnings,
            validation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"/*{ "INPUTS": [] }*/
void main() { gl_FragColor = vec4(isf_FragNormCoord, 0.0, 1.0); }
"#;

    #[test]
    fn minimal_unit_compiles_cleanly() {
        let output = compile(MINIMAL).unwrap();
        assert!(output.validation.passed, "{:?}\n{}", output.validation.findings, output.fragment);
        assert!(output.fragment.contains("fn isf_fragment_main("));
        assert!(output.fragment.contains("isf_frag_color = vec4<f32>(isf_frag_norm_coord, 0.0, 1.0);"));
        assert!(output.vertex.contains("fn isf_vertex_main("));
    }

    #[test]
    fn validation_can_be_switched_off() {
        let compiler = Compiler::new(CompilerOptions {
            validate: false,
            ..CompilerOptions::default()
        });
        let output = compiler.compile(MINIMAL).unwrap();
        assert_eq!(output.validation, ValidationReport::skipped());
    }

    #[test]
    fn syntax_errors_are_fatal() {
        let err = compile("/*{}*/\nvoid main() { float x = ; }").unwrap_err();
        assert!(matches!(err, CompileError::Syntax { .. }), "{err}");
    }
}
