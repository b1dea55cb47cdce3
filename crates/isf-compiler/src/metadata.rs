//! Splits an ISF source unit into its JSON header and GLSL body and lifts the
//! header into typed declarations the layout analyzer and rewrite passes can
//! walk.
//!
//! Types:
//!
//! - `IsfMetadata` keeps the parsed header verbatim (`raw`) next to the typed
//!   views: inputs, passes, imported textures and descriptive fields.
//! - `InputDecl` / `InputKind` describe one declared shader parameter.
//! - `PassDecl` describes one entry of the optional `PASSES` list.
//! - `ImportedTexture` is one entry of the `IMPORTED` table.
//!
//! Functions:
//!
//! - `extract` locates the leading `/*{ ... }*/` header, parses it with a
//!   permissive fallback (trailing commas, typographic or single quotes),
//!   injects the synthetic `speed` input and one image input per imported
//!   texture, and returns the remaining code body.
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::diagnostics::{Stage, Warning};
use crate::error::CompileError;
use crate::options::CompilerOptions;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Float,
    Long,
    Bool,
    Event,
    Point2D,
    Color,
    Image,
    Audio,
    AudioFft,
    Unknown(String),
}

impl InputKind {
    pub fn from_isf(raw: &str) -> Self {
        match raw.trim() {
            "float" => Self::Float,
            "long" => Self::Long,
            "bool" => Self::Bool,
            "event" => Self::Event,
            "point2D" => Self::Point2D,
            "color" => Self::Color,
            "image" => Self::Image,
            "audio" => Self::Audio,
            "audioFFT" => Self::AudioFft,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Inputs bound as a texture/sampler pair rather than a uniform field.
    pub fn is_texture(&self) -> bool {
        matches!(self, Self::Image | Self::Audio | Self::AudioFft)
    }

    /// Inputs whose GLSL-side type is `bool`.
    pub fn is_boolean(&self) -> bool {
        matches!(self, Self::Bool | Self::Event)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputDecl {
    pub name: String,
    pub kind: InputKind,
    pub default: Option<Value>,
    pub min: Option<Value>,
    pub max: Option<Value>,
    pub label: Option<String>,
    pub values: Option<Vec<Value>>,
    pub labels: Option<Vec<String>>,
    /// Added by the compiler rather than declared in the header.
    pub synthetic: bool,
}

impl InputDecl {
    pub fn new(name: impl Into<String>, kind: InputKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            min: None,
            max: None,
            label: None,
            values: None,
            labels: None,
            synthetic: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PassDecl {
    pub target: Option<String>,
    /// Dimension expressions stay textual (`"$WIDTH/2"`); the render graph
    /// evaluates them.
    pub width: Option<String>,
    pub height: Option<String>,
    pub float: bool,
    pub persistent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportedTexture {
    pub name: String,
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct IsfMetadata {
    pub description: Option<String>,
    pub credit: Option<String>,
    pub version: Option<String>,
    pub categories: Vec<String>,
    pub inputs: Vec<InputDecl>,
    pub passes: Vec<PassDecl>,
    pub imported: Vec<ImportedTexture>,
    /// The header exactly as parsed, before any synthesis.
    pub raw: Value,
}

impl IsfMetadata {
    pub fn input(&self, name: &str) -> Option<&InputDecl> {
        self.inputs.iter().find(|input| input.name == name)
    }

    /// Number of passes the render graph runs; absence of `PASSES` means one.
    pub fn pass_count(&self) -> usize {
        self.passes.len().max(1)
    }
}

#[derive(Debug, Clone)]
pub struct ExtractedUnit {
    pub metadata: IsfMetadata,
    pub body: String,
    pub header_found: bool,
}

pub fn extract(
    source: &str,
    options: &CompilerOptions,
    warnings: &mut Vec<Warning>,
) -> Result<ExtractedUnit, CompileError> {
    let Some((header, body)) = split_header(source) else {
        note(warnings, "no ISF JSON header found; compiling with no declared inputs");
        let mut metadata = IsfMetadata {
            raw: Value::Object(Map::new()),
            ..IsfMetadata::default()
        };
        inject_speed(&mut metadata, options);
        return Ok(ExtractedUnit {
            metadata,
            body: source.to_string(),
            header_found: false,
        });
    };

    let raw = parse_header(header, warnings)?;
    let mut metadata = lift_metadata(raw, warnings);
    inject_speed(&mut metadata, options);
    debug!(
        inputs = metadata.inputs.len(),
        passes = metadata.passes.len(),
        imported = metadata.imported.len(),
        "extracted ISF header"
    );

    Ok(ExtractedUnit {
        metadata,
        body,
        header_found: true,
    })
}

/// Finds the first block comment whose contents open with `{` and returns
/// the comment contents plus the source with the comment removed.
fn split_header(source: &str) -> Option<(&str, String)> {
    let mut search_from = 0;
    while let Some(rel) = source[search_from..].find("/*") {
        let start = search_from + rel;
        let content_start = start + 2;
        let end = content_start + source[content_start..].find("*/")?;
        let content = &source[content_start..end];
        if content.trim_start().starts_with('{') {
            // Blank lines stand in for the header so body diagnostics keep
            // the line numbers of the original file.
            let mut body = String::with_capacity(source.len());
            body.push_str(&source[..start]);
            body.extend(std::iter::repeat('\n').take(content.matches('\n').count()));
            body.push_str(&source[end + 2..]);
            return Some((content, body));
        }
        search_from = end + 2;
    }
    None
}

fn parse_header(header: &str, warnings: &mut Vec<Warning>) -> Result<Value, CompileError> {
    let trimmed = header.trim();
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => Ok(value),
        Err(strict_err) => {
            let repaired = repair_json(trimmed);
            match serde_json::from_str::<Value>(&repaired) {
                Ok(value) => {
                    note(warnings, format!("ISF header needed permissive repair: {strict_err}"));
                    Ok(value)
                }
                Err(_) => Err(CompileError::Header(strict_err)),
            }
        }
    }
}

/// Rewrites the common hand-editing mistakes: typographic quotes, single
/// quoted strings, and trailing commas before `}` / `]`.
fn repair_json(input: &str) -> String {
    let normalized: String = input
        .chars()
        .map(|ch| match ch {
            '\u{201C}' | '\u{201D}' | '\u{201E}' => '"',
            '\u{2018}' | '\u{2019}' => '\'',
            other => other,
        })
        .collect();

    let mut out = String::with_capacity(normalized.len());
    let mut chars = normalized.chars().peekable();
    let mut in_string: Option<char> = None;
    while let Some(ch) = chars.next() {
        match in_string {
            Some(quote) => {
                if ch == '\\' {
                    out.push(ch);
                    if let Some(next) = chars.next() {
                        out.push(next);
                    }
                    continue;
                }
                if ch == quote {
                    in_string = None;
                    out.push('"');
                } else if ch == '"' {
                    out.push_str("\\\"");
                } else {
                    out.push(ch);
                }
            }
            None => match ch {
                '"' | '\'' => {
                    in_string = Some(ch);
                    out.push('"');
                }
                ',' => {
                    let mut lookahead = chars.clone();
                    let next = lookahead.find(|c| !c.is_whitespace());
                    if !matches!(next, Some('}') | Some(']')) {
                        out.push(ch);
                    }
                }
                _ => out.push(ch),
            },
        }
    }
    out
}

fn lift_metadata(raw: Value, warnings: &mut Vec<Warning>) -> IsfMetadata {
    let mut metadata = IsfMetadata {
        description: string_field(&raw, "DESCRIPTION"),
        credit: string_field(&raw, "CREDIT"),
        version: raw.get("ISFVSN").and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }),
        categories: raw
            .get("CATEGORIES")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        ..IsfMetadata::default()
    };

    if let Some(inputs) = raw.get("INPUTS") {
        match inputs.as_array() {
            Some(items) => {
                for (index, item) in items.iter().enumerate() {
                    if let Some(input) = lift_input(index, item, warnings) {
                        if metadata.input(&input.name).is_some() {
                            note(warnings, format!("duplicate input '{}' ignored", input.name));
                            continue;
                        }
                        metadata.inputs.push(input);
                    }
                }
            }
            None => note(warnings, "INPUTS is not an array; ignoring it"),
        }
    }

    if let Some(passes) = raw.get("PASSES").and_then(Value::as_array) {
        metadata.passes = passes.iter().map(lift_pass).collect();
    }
    apply_persistent_buffers(&raw, &mut metadata, warnings);

    metadata.imported = lift_imported(&raw, warnings);
    for texture in &metadata.imported {
        if metadata.input(&texture.name).is_none() {
            let mut input = InputDecl::new(texture.name.clone(), InputKind::Image);
            input.synthetic = true;
            metadata.inputs.push(input);
        }
    }

    metadata.raw = raw;
    metadata
}

fn lift_input(index: usize, item: &Value, warnings: &mut Vec<Warning>) -> Option<InputDecl> {
    let Some(name) = item.get("NAME").and_then(Value::as_str) else {
        note(warnings, format!("input #{index} has no NAME; ignoring it"));
        return None;
    };
    let kind = match item.get("TYPE").and_then(Value::as_str) {
        Some(raw) => InputKind::from_isf(raw),
        None => InputKind::Unknown(String::new()),
    };

    Some(InputDecl {
        name: name.to_string(),
        kind,
        default: item.get("DEFAULT").cloned(),
        min: item.get("MIN").cloned(),
        max: item.get("MAX").cloned(),
        label: string_field(item, "LABEL"),
        values: item.get("VALUES").and_then(Value::as_array).cloned(),
        labels: item.get("LABELS").and_then(Value::as_array).map(|labels| {
            labels
                .iter()
                .map(|label| match label {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect()
        }),
        synthetic: false,
    })
}

fn lift_pass(item: &Value) -> PassDecl {
    PassDecl {
        target: string_field(item, "TARGET").filter(|target| !target.is_empty()),
        width: item.get("WIDTH").and_then(dimension),
        height: item.get("HEIGHT").and_then(dimension),
        float: item.get("FLOAT").map(truthy).unwrap_or(false),
        persistent: item.get("PERSISTENT").map(truthy).unwrap_or(false),
    }
}

/// ISF v1 listed persistent targets separately from `PASSES`.
fn apply_persistent_buffers(raw: &Value, metadata: &mut IsfMetadata, warnings: &mut Vec<Warning>) {
    let names: Vec<String> = match raw.get("PERSISTENT_BUFFERS") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::Object(map)) => map.keys().cloned().collect(),
        _ => return,
    };
    for name in names {
        match metadata
            .passes
            .iter_mut()
            .find(|pass| pass.target.as_deref() == Some(name.as_str()))
        {
            Some(pass) => pass.persistent = true,
            None => note(warnings, format!("persistent buffer '{name}' has no matching pass")),
        }
    }
}

fn lift_imported(raw: &Value, warnings: &mut Vec<Warning>) -> Vec<ImportedTexture> {
    match raw.get("IMPORTED") {
        Some(Value::Object(map)) => map
            .iter()
            .map(|(name, entry)| ImportedTexture {
                name: name.clone(),
                path: string_field(entry, "PATH"),
            })
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|entry| match string_field(entry, "NAME") {
                Some(name) => Some(ImportedTexture {
                    name,
                    path: string_field(entry, "PATH"),
                }),
                None => {
                    note(warnings, "imported texture without NAME ignored");
                    None
                }
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn inject_speed(metadata: &mut IsfMetadata, options: &CompilerOptions) {
    if !options.inject_speed_input || metadata.input("speed").is_some() {
        return;
    }
    let mut speed = InputDecl::new("speed", InputKind::Float);
    speed.default = Some(Value::from(1.0));
    speed.min = Some(Value::from(0.0));
    speed.max = Some(Value::from(4.0));
    speed.label = Some("Speed".to_string());
    speed.synthetic = true;
    metadata.inputs.push(speed);
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn dimension(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
        Value::String(s) => matches!(s.trim(), "true" | "TRUE" | "1" | "YES" | "yes"),
        _ => false,
    }
}

fn note(warnings: &mut Vec<Warning>, message: impl Into<String>) {
    let warning = Warning::new(Stage::Metadata, message);
    warn!(%warning, "metadata");
    warnings.push(warning);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> (Result<ExtractedUnit, CompileError>, Vec<Warning>) {
        let mut warnings = Vec::new();
        let result = extract(source, &CompilerOptions::default(), &mut warnings);
        (result, warnings)
    }

    #[test]
    fn splits_header_and_body() {
        let source = r#"/*{
            "DESCRIPTION": "demo",
            "INPUTS": [
                {"NAME": "inputImage", "TYPE": "image"},
                {"NAME": "amount", "TYPE": "float", "DEFAULT": 0.5, "MIN": 0.0, "MAX": 1.0}
            ]
        }*/
void main() { gl_FragColor = vec4(amount); }
"#;
        let (unit, warnings) = run(source);
        let unit = unit.unwrap();
        assert!(warnings.is_empty(), "{warnings:?}");
        assert!(unit.header_found);
        assert_eq!(unit.metadata.description.as_deref(), Some("demo"));
        assert_eq!(unit.metadata.inputs[0].kind, InputKind::Image);
        assert_eq!(unit.metadata.inputs[1].default, Some(Value::from(0.5)));
        assert!(unit.body.trim_start().starts_with("void main()"));
        assert!(!unit.body.contains("DESCRIPTION"));
    }

    #[test]
    fn injects_synthetic_speed_once() {
        let (unit, _) = run("/*{ \"INPUTS\": [] }*/ void main() {}");
        let unit = unit.unwrap();
        let speed = unit.metadata.input("speed").unwrap();
        assert!(speed.synthetic);
        assert_eq!(speed.kind, InputKind::Float);

        let (declared, _) =
            run("/*{ \"INPUTS\": [{\"NAME\": \"speed\", \"TYPE\": \"float\"}] }*/ void main() {}");
        let declared = declared.unwrap();
        assert_eq!(declared.metadata.inputs.len(), 1);
        assert!(!declared.metadata.inputs[0].synthetic);
    }

    #[test]
    fn repairs_trailing_commas_and_smart_quotes() {
        let source = "/*{ \u{201C}INPUTS\u{201D}: [ {'NAME': 'level', 'TYPE': 'float',}, ], }*/\nvoid main() {}";
        let (unit, warnings) = run(source);
        let unit = unit.unwrap();
        assert_eq!(unit.metadata.inputs[0].name, "level");
        assert!(warnings.iter().any(|w| w.message.contains("permissive repair")));
    }

    #[test]
    fn unparsable_header_is_fatal() {
        let (unit, _) = run("/*{ INPUTS: [ }*/ void main() {}");
        assert!(matches!(unit, Err(CompileError::Header(_))));
    }

    #[test]
    fn missing_header_compiles_with_defaults() {
        let (unit, warnings) = run("void main() { gl_FragColor = vec4(1.0); }");
        let unit = unit.unwrap();
        assert!(!unit.header_found);
        assert_eq!(unit.metadata.pass_count(), 1);
        assert!(warnings.iter().any(|w| w.stage == Stage::Metadata));
    }

    #[test]
    fn imported_textures_become_image_inputs() {
        let source = r#"/*{
            "IMPORTED": { "noiseTex": { "PATH": "noise.png" } }
        }*/ void main() {}"#;
        let (unit, _) = run(source);
        let unit = unit.unwrap();
        assert_eq!(unit.metadata.imported[0].path.as_deref(), Some("noise.png"));
        let input = unit.metadata.input("noiseTex").unwrap();
        assert_eq!(input.kind, InputKind::Image);
        assert!(input.synthetic);
    }

    #[test]
    fn lifts_passes_and_persistent_buffers() {
        let source = r#"/*{
            "PERSISTENT_BUFFERS": ["accum"],
            "PASSES": [
                {"TARGET": "accum", "WIDTH": "$WIDTH/2", "HEIGHT": 256, "FLOAT": true},
                {}
            ]
        }*/ void main() {}"#;
        let (unit, warnings) = run(source);
        let passes = unit.unwrap().metadata.passes;
        assert!(warnings.is_empty(), "{warnings:?}");
        assert_eq!(passes.len(), 2);
        assert_eq!(passes[0].target.as_deref(), Some("accum"));
        assert_eq!(passes[0].width.as_deref(), Some("$WIDTH/2"));
        assert_eq!(passes[0].height.as_deref(), Some("256"));
        assert!(passes[0].float && passes[0].persistent);
        assert_eq!(passes[1], PassDecl::default());
    }
}
