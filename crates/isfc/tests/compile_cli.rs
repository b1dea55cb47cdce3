use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

const TINT: &str = r#"/*{
    "DESCRIPTION": "Tints the input",
    "INPUTS": [
        { "NAME": "inputImage", "TYPE": "image" },
        { "NAME": "amount", "TYPE": "float", "DEFAULT": 0.5 }
    ]
}*/
void main() {
    vec4 color = IMG_THIS_PIXEL(inputImage);
    color.rgb = mix(color.rgb, vec3(1.0, 0.0, 0.0), amount);
    gl_FragColor = color;
}
"#;

fn isfc(config_dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_isfc"))
        .env("ISFC_CONFIG_DIR", config_dir)
        .env_remove("ISFC_CONFIG")
        .args(args)
        .output()
        .expect("failed to run isfc")
}

#[test]
fn compile_writes_three_artifacts() {
    let root = TempDir::new().unwrap();
    let source = root.path().join("tint.fs");
    let out_dir = root.path().join("out");
    fs::write(&source, TINT).unwrap();

    let output = isfc(
        root.path(),
        &[
            "compile",
            source.to_str().unwrap(),
            "--out-dir",
            out_dir.to_str().unwrap(),
        ],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let fragment = fs::read_to_string(out_dir.join("tint.frag.wgsl")).unwrap();
    assert!(fragment.contains("@fragment"));
    assert!(!fragment.contains("IMG_THIS_PIXEL"));
    let vertex = fs::read_to_string(out_dir.join("tint.vert.wgsl")).unwrap();
    assert!(vertex.contains("@vertex"));

    let layout: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out_dir.join("tint.layout.json")).unwrap())
            .unwrap();
    assert_eq!(layout["size"].as_u64().unwrap() % 16, 0);
    assert_eq!(layout["textures"][0]["name"], "inputImage");
    let fields = layout["fields"].as_array().unwrap();
    assert!(fields.iter().any(|f| f["name"] == "amount"));
}

#[test]
fn check_reports_each_unit_and_fails_on_errors() {
    let root = TempDir::new().unwrap();
    let corpus = root.path().join("corpus");
    fs::create_dir_all(corpus.join("nested")).unwrap();
    fs::write(corpus.join("tint.fs"), TINT).unwrap();
    fs::write(corpus.join("nested/broken.fs"), "/*{ \"INPUTS\": [ }*/ void main() {}").unwrap();

    let output = isfc(root.path(), &["check", corpus.to_str().unwrap()]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!output.status.success());
    assert!(stdout.contains("error"), "{stdout}");
    assert!(stdout.contains("tint.fs"), "{stdout}");
    assert!(stdout.contains("2 unit(s)"), "{stdout}");
}

#[test]
fn layout_prints_json() {
    let root = TempDir::new().unwrap();
    let source = root.path().join("tint.fs");
    fs::write(&source, TINT).unwrap();

    let output = isfc(root.path(), &["layout", source.to_str().unwrap()]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let layout: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(layout["fields"][0]["name"], "TIME");
    assert_eq!(layout["fields"][0]["offset"], 0);
}

#[test]
fn invalid_options_file_is_rejected() {
    let root = TempDir::new().unwrap();
    let source = root.path().join("tint.fs");
    fs::write(&source, TINT).unwrap();
    fs::write(root.path().join("isfc.toml"), "max_macro_passes = 0\n").unwrap();

    let output = isfc(root.path(), &["layout", source.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("max_macro_passes"));
}
