use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories_next::ProjectDirs;
use isf_compiler::CompilerOptions;
use tracing::debug;

pub const ENV_CONFIG_DIR: &str = "ISFC_CONFIG_DIR";
pub const CONFIG_FILE: &str = "isfc.toml";

const QUALIFIER: &str = "org";
const ORGANISATION: &str = "isf-wgsl";
const APPLICATION: &str = "isfc";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Parses a (possibly sparse) options table and checks its values.
pub fn options_from_toml_str(input: &str) -> Result<CompilerOptions, ConfigError> {
    let options: CompilerOptions = toml::from_str(input)?;
    validate(&options)?;
    Ok(options)
}

fn validate(options: &CompilerOptions) -> Result<(), ConfigError> {
    if options.max_macro_passes == 0 {
        return Err(ConfigError::Invalid(
            "max_macro_passes must be at least 1".into(),
        ));
    }

    let prefix = &options.rename_prefix;
    let mut chars = prefix.chars();
    let starts_well = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !starts_well || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ConfigError::Invalid(format!(
            "rename_prefix `{prefix}` is not an identifier prefix"
        )));
    }
    if prefix.starts_with("__") {
        return Err(ConfigError::Invalid(format!(
            "rename_prefix `{prefix}` may not start with `__`, which WGSL reserves"
        )));
    }
    Ok(())
}

/// Default location of the options file, if one can be determined.
pub fn default_config_path() -> Option<PathBuf> {
    if let Some(dir) = env::var_os(ENV_CONFIG_DIR) {
        return Some(PathBuf::from(dir).join(CONFIG_FILE));
    }
    ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION)
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

/// Loads options from `explicit` (which must exist) or from the default
/// location (which may be absent).
pub fn load_options(explicit: Option<&Path>) -> Result<CompilerOptions> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => {
                debug!("no options file found; using defaults");
                return Ok(CompilerOptions::default());
            }
        },
    };
    let contents = fs::read_to_string(&path)
        .with_context(|| format!("failed to read options file at {}", path.display()))?;
    let options = options_from_toml_str(&contents)
        .with_context(|| format!("failed to load options file at {}", path.display()))?;
    debug!(path = %path.display(), "loaded compiler options");
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_file_keeps_defaults() {
        let options = options_from_toml_str("flip_texture_y = false\n").unwrap();
        assert!(!options.flip_texture_y);
        assert_eq!(options.max_macro_passes, 32);
        assert_eq!(options.rename_prefix, "isf_");
    }

    #[test]
    fn empty_file_is_the_default() {
        assert_eq!(options_from_toml_str("").unwrap(), CompilerOptions::default());
    }

    #[test]
    fn rejects_bad_values() {
        let err = options_from_toml_str("max_macro_passes = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "{err}");
        let err = options_from_toml_str("rename_prefix = \"9x\"").unwrap_err();
        assert!(err.to_string().contains("rename_prefix"), "{err}");
        let err = options_from_toml_str("rename_prefix = \"__x\"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "{err}");
    }

    #[test]
    fn rejects_wrong_types() {
        let err = options_from_toml_str("validate = \"yes\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)), "{err}");
    }

    #[test]
    fn explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_options(Some(&dir.path().join("missing.toml"))).is_err());

        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "validate = false\n").unwrap();
        assert!(!load_options(Some(&path)).unwrap().validate);
    }
}
