//! Non-fatal diagnostics produced while compiling one unit, plus the
//! post-hoc validator that scans emitted WGSL for GLSL idioms that leaked
//! through the rewrite pipeline.
//!
//! Types:
//!
//! - `Stage` names the pipeline step that raised a warning.
//! - `Warning` is one human-readable, non-fatal finding returned alongside a
//!   usable output.
//! - `ValidationReport` / `Finding` carry the advisory pass/fail verdict of
//!   [`validate`].
//!
//! The validator never fails compilation. It only annotates the result so
//! corpus tooling (the `isfc check` command) can flag units that need work.
use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Metadata,
    Preprocessor,
    Layout,
    Rewrite,
    Assembly,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Metadata => "metadata",
            Stage::Preprocessor => "preprocessor",
            Stage::Layout => "layout",
            Stage::Rewrite => "rewrite",
            Stage::Assembly => "assembly",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub stage: Stage,
    pub message: String,
}

impl Warning {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.stage, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    /// One-based line in the scanned text; zero for whole-module findings.
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ValidationReport {
    pub passed: bool,
    pub findings: Vec<Finding>,
}

impl ValidationReport {
    /// Report used when validation is switched off in the options.
    pub fn skipped() -> Self {
        Self {
            passed: true,
            findings: Vec::new(),
        }
    }
}

const SAMPLING_CALLS: &[&str] = &[
    "texture2D",
    "texture2DRect",
    "texture2DProj",
    "texture",
    "texelFetch",
    "IMG_PIXEL",
    "IMG_NORM_PIXEL",
    "IMG_THIS_PIXEL",
    "IMG_THIS_NORM_PIXEL",
    "IMG_SIZE",
];

const LEAKED_BUILTINS: &[&str] = &[
    "gl_FragColor",
    "gl_FragCoord",
    "gl_FragData",
    "isf_FragNormCoord",
];

const GLSL_TYPE_NAMES: &[&str] = &[
    "float", "int", "uint", "ivec2", "ivec3", "ivec4", "uvec2", "uvec3", "uvec4", "bvec2",
    "bvec3", "bvec4", "mat2", "mat3", "mat4", "sampler2D",
];

const DECLARATION_KEYWORDS: &[&str] = &["uniform", "varying", "attribute", "precision"];

/// Scans emitted WGSL for residual source-dialect idioms.
///
/// This is a text heuristic: it looks for un-lowered sampling calls, GLSL
/// declaration keywords, leaked built-in names, conditional operators,
/// preprocessor lines, unbalanced delimiters and a missing entry point.
pub fn validate(fragment: &str) -> ValidationReport {
    let mut findings = Vec::new();
    let mut depth = [0i64; 3];

    for (index, raw_line) in fragment.lines().enumerate() {
        let line_no = index + 1;
        let line = strip_line_comment(raw_line);
        let trimmed = line.trim_start();

        if trimmed.starts_with('#') {
            findings.push(Finding {
                line: line_no,
                message: format!("preprocessor directive survived: `{}`", trimmed.trim_end()),
            });
        }
        if let Some(keyword) = DECLARATION_KEYWORDS
            .iter()
            .find(|keyword| first_word(trimmed) == Some(**keyword))
        {
            findings.push(Finding {
                line: line_no,
                message: format!("GLSL `{keyword}` declaration survived"),
            });
        }
        if line.contains('?') {
            findings.push(Finding {
                line: line_no,
                message: "conditional operator `?:` survived".to_string(),
            });
        }

        for (word, rest) in words(line) {
            let called = rest.trim_start().starts_with('(');
            if called && SAMPLING_CALLS.contains(&word) {
                findings.push(Finding {
                    line: line_no,
                    message: format!("un-lowered texture call `{word}(`"),
                });
            } else if called && word == "mod" {
                findings.push(Finding {
                    line: line_no,
                    message: "GLSL `mod(` call survived (reserved word in WGSL)".to_string(),
                });
            }
            if LEAKED_BUILTINS.contains(&word) {
                findings.push(Finding {
                    line: line_no,
                    message: format!("GLSL built-in `{word}` survived"),
                });
            }
            if GLSL_TYPE_NAMES.contains(&word) {
                findings.push(Finding {
                    line: line_no,
                    message: format!("GLSL type name `{word}` survived"),
                });
            }
        }

        for ch in line.chars() {
            match ch {
                '{' => depth[0] += 1,
                '}' => depth[0] -= 1,
                '(' => depth[1] += 1,
                ')' => depth[1] -= 1,
                '[' => depth[2] += 1,
                ']' => depth[2] -= 1,
                _ => {}
            }
            if depth.iter().any(|d| *d < 0) {
                findings.push(Finding {
                    line: line_no,
                    message: format!("unbalanced closing `{ch}`"),
                });
                depth.iter_mut().for_each(|d| *d = (*d).max(0));
            }
        }
    }

    for (count, label) in depth.iter().zip(["braces", "parentheses", "brackets"]) {
        if *count != 0 {
            findings.push(Finding {
                line: 0,
                message: format!("unbalanced {label}: {count} left open"),
            });
        }
    }

    if !fragment.contains("@fragment") || !fragment.contains("fn isf_fragment_main(") {
        findings.push(Finding {
            line: 0,
            message: "missing `@fragment fn isf_fragment_main` entry point".to_string(),
        });
    }

    #[cfg(feature = "naga-validate")]
    findings.extend(naga_findings(fragment));

    ValidationReport {
        passed: findings.is_empty(),
        findings,
    }
}

#[cfg(feature = "naga-validate")]
fn naga_findings(fragment: &str) -> Vec<Finding> {
    match naga::front::wgsl::parse_str(fragment) {
        Ok(module) => {
            let mut validator = naga::valid::Validator::new(
                naga::valid::ValidationFlags::all(),
                naga::valid::Capabilities::all(),
            );
            match validator.validate(&module) {
                Ok(_) => Vec::new(),
                Err(err) => vec![Finding {
                    line: 0,
                    message: format!("naga validation failed: {}", err.emit_to_string(fragment)),
                }],
            }
        }
        Err(err) => vec![Finding {
            line: 0,
            message: format!("naga parse failed: {}", err.emit_to_string(fragment)),
        }],
    }
}

fn strip_line_comment(line: &str) -> &str {
    match line.find("//") {
        Some(at) => &line[..at],
        None => line,
    }
}

fn first_word(line: &str) -> Option<&str> {
    words(line).next().map(|(word, _)| word)
}

/// Yields each identifier-like word together with the text that follows it.
fn words(line: &str) -> impl Iterator<Item = (&str, &str)> {
    let bytes = line.as_bytes();
    let mut pos = 0;
    std::iter::from_fn(move || {
        while pos < bytes.len() {
            let b = bytes[pos];
            if b.is_ascii_alphabetic() || b == b'_' {
                let start = pos;
                while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_')
                {
                    pos += 1;
                }
                return Some((&line[start..pos], &line[pos..]));
            }
            if b.is_ascii_digit() {
                while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'.')
                {
                    pos += 1;
                }
                continue;
            }
            pos += 1;
        }
        None
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLEAN: &str = "@fragment\nfn isf_fragment_main() -> @location(0) vec4<f32> {\n    return vec4<f32>(1.0);\n}\n";

    #[test]
    fn clean_module_passes() {
        let report = validate(CLEAN);
        assert!(report.passed, "{:?}", report.findings);
    }

    #[test]
    fn flags_unlowered_texture_call() {
        let source = CLEAN.replace("vec4<f32>(1.0)", "texture2D(inputImage, uv)");
        let report = validate(&source);
        assert!(!report.passed);
        assert!(report
            .findings
            .iter()
            .any(|f| f.line == 3 && f.message.contains("texture2D")));
    }

    #[test]
    fn flags_varying_and_missing_entry() {
        let report = validate("varying vec2 uv;\n");
        let messages: Vec<_> = report.findings.iter().map(|f| f.message.as_str()).collect();
        assert!(messages.iter().any(|m| m.contains("`varying`")));
        assert!(messages.iter().any(|m| m.contains("entry point")));
    }

    #[test]
    fn uniform_address_space_is_not_a_leak() {
        let source = format!("@group(0) @binding(0) var<uniform> isf_uniforms: IsfUniforms;\n{CLEAN}");
        assert!(validate(&source).passed);
    }

    #[test]
    fn flags_unbalanced_braces() {
        let source = format!("{CLEAN}}}\n");
        let report = validate(&source);
        assert!(report
            .findings
            .iter()
            .any(|f| f.message.contains("unbalanced closing `}`")));
    }

    #[test]
    fn comments_are_ignored() {
        let source = format!("// offset 0: float TIME ? texture2D(\n{CLEAN}");
        assert!(validate(&source).passed);
    }
}
