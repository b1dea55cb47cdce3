use serde::{Deserialize, Serialize};

/// Knobs that change how a unit is lowered. Every field has a default so a
/// sparse TOML table deserialises cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerOptions {
    /// Cutoff for the macro fixed-point loop.
    pub max_macro_passes: usize,
    /// Prefix applied to identifiers that collide with WGSL reserved words.
    pub rename_prefix: String,
    /// Add a `speed` float input when the header does not declare one.
    pub inject_speed_input: bool,
    /// Convert ISF's bottom-left texture origin to WGSL's top-left origin
    /// when sampling.
    pub flip_texture_y: bool,
    /// Run the post-hoc validator over the emitted fragment stage.
    pub validate: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            max_macro_passes: 32,
            rename_prefix: "isf_".to_string(),
            inject_speed_input: true,
            flip_texture_y: true,
            validate: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_table_keeps_defaults() {
        let options: CompilerOptions =
            serde_json::from_str(r#"{ "max_macro_passes": 4 }"#).unwrap();
        assert_eq!(options.max_macro_passes, 4);
        assert_eq!(options.rename_prefix, "isf_");
        assert!(options.flip_texture_y);
    }
}
