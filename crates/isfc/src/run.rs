use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use isf_compiler::{Compiler, CompilerOptions, CompilerOutput};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{CheckArgs, CompileArgs, LayoutArgs};

const ISF_EXTENSION: &str = "fs";

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn compile_file(compiler: &Compiler, path: &Path) -> Result<CompilerOutput> {
    let source = fs::read_to_string(path)
        .with_context(|| format!("failed to read shader at {}", path.display()))?;
    compiler
        .compile(&source)
        .with_context(|| format!("failed to compile {}", path.display()))
}

pub fn compile(args: CompileArgs, options: CompilerOptions) -> Result<()> {
    let compiler = Compiler::new(options);
    if let Some(dir) = &args.out_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output directory {}", dir.display()))?;
    }

    for path in &args.files {
        let output = compile_file(&compiler, path)?;
        for warning in &output.warnings {
            warn!(file = %path.display(), "{warning}");
        }
        for finding in &output.validation.findings {
            warn!(file = %path.display(), line = finding.line, "validation: {}", finding.message);
        }
        if args.deny_warnings && !output.warnings.is_empty() {
            bail!(
                "{} produced {} warning(s) and --deny-warnings is set",
                path.display(),
                output.warnings.len()
            );
        }

        let stem = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .with_context(|| format!("{} has no usable file name", path.display()))?;
        let dir = match &args.out_dir {
            Some(dir) => dir.clone(),
            None => path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        };

        let layout = serde_json::to_string_pretty(&output.layout)
            .context("failed to serialise layout report")?;
        let artifacts = [
            (format!("{stem}.frag.wgsl"), output.fragment.as_str()),
            (format!("{stem}.vert.wgsl"), output.vertex.as_str()),
            (format!("{stem}.layout.json"), layout.as_str()),
        ];
        for (name, contents) in artifacts {
            let target = dir.join(name);
            fs::write(&target, contents)
                .with_context(|| format!("failed to write {}", target.display()))?;
        }
        info!(
            file = %path.display(),
            out = %dir.display(),
            warnings = output.warnings.len(),
            "compiled"
        );
    }
    Ok(())
}

#[derive(Debug, Default)]
struct Tally {
    ok: usize,
    warned: usize,
    invalid: usize,
    failed: usize,
}

pub fn check(args: CheckArgs, options: CompilerOptions) -> Result<()> {
    let compiler = Compiler::new(options);
    let mut files = Vec::new();
    for path in &args.paths {
        collect_shaders(path, &mut files)?;
    }

    let mut tally = Tally::default();
    for path in &files {
        match compile_file(&compiler, path) {
            Err(err) => {
                tally.failed += 1;
                println!("error   {}: {:#}", path.display(), err);
            }
            Ok(output) if !output.validation.passed => {
                tally.invalid += 1;
                let first = output
                    .validation
                    .findings
                    .first()
                    .map(|f| f.message.as_str())
                    .unwrap_or_default();
                println!(
                    "invalid {}: {} finding(s), first: {first}",
                    path.display(),
                    output.validation.findings.len()
                );
            }
            Ok(output) if !output.warnings.is_empty() => {
                tally.warned += 1;
                println!(
                    "warn    {}: {} warning(s)",
                    path.display(),
                    output.warnings.len()
                );
            }
            Ok(_) => {
                tally.ok += 1;
                println!("ok      {}", path.display());
            }
        }
    }

    println!(
        "{} unit(s): {} ok, {} with warnings, {} invalid, {} failed",
        files.len(),
        tally.ok,
        tally.warned,
        tally.invalid,
        tally.failed
    );
    if tally.invalid + tally.failed > 0 {
        bail!("{} unit(s) need attention", tally.invalid + tally.failed);
    }
    Ok(())
}

/// Adds `path` if it is a file, or every `.fs` file below it if it is a
/// directory, in sorted order.
fn collect_shaders(path: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    if !path.is_dir() {
        if !path.exists() {
            bail!("{} does not exist", path.display());
        }
        out.push(path.to_path_buf());
        return Ok(());
    }
    let mut entries = fs::read_dir(path)
        .with_context(|| format!("failed to list {}", path.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("failed to list {}", path.display()))?;
    entries.sort();
    for entry in entries {
        if entry.is_dir() {
            collect_shaders(&entry, out)?;
        } else if entry.extension().and_then(|ext| ext.to_str()) == Some(ISF_EXTENSION) {
            out.push(entry);
        }
    }
    Ok(())
}

pub fn layout(args: LayoutArgs, options: CompilerOptions) -> Result<()> {
    let compiler = Compiler::new(options);
    let output = compile_file(&compiler, &args.file)?;
    let json = serde_json::to_string_pretty(&output.layout)
        .context("failed to serialise layout report")?;
    println!("{json}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_isf_files_recursively() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("nested")).unwrap();
        fs::write(root.path().join("b.fs"), "").unwrap();
        fs::write(root.path().join("notes.txt"), "").unwrap();
        fs::write(root.path().join("nested/a.fs"), "").unwrap();

        let mut files = Vec::new();
        collect_shaders(root.path(), &mut files).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(root.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(names, vec![PathBuf::from("b.fs"), PathBuf::from("nested/a.fs")]);
    }

    #[test]
    fn missing_paths_are_errors() {
        let root = tempfile::tempdir().unwrap();
        let mut files = Vec::new();
        assert!(collect_shaders(&root.path().join("absent.fs"), &mut files).is_err());
    }
}
