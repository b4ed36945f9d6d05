//! End-to-end runs of the installed binary against scratch projects.

use std::fs;
use std::path::Path;
use std::process::Command;

fn liffey(cwd: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_liffey"))
        .arg("--cwd")
        .arg(cwd)
        .args(args)
        .output()
        .expect("binary runs")
}

#[test]
fn build_emits_chunks_manifest_and_html() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::write(
        dir.path().join("src/index.js"),
        "import { add } from \"./math\";\nconsole.log(add(2, 3));\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("src/math.js"),
        "export function add(a, b) { return a + b; }\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("liffey.config.json"),
        r#"{ "entry": { "main": "src/index.js" } }"#,
    )
    .unwrap();

    let output = liffey(dir.path(), &["build"]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let dist = dir.path().join("dist");
    assert!(dist.join("index.html").is_file());
    let manifest: serde_json::Value =
        serde_json::from_slice(&fs::read(dist.join("chunk-manifest.json")).unwrap()).unwrap();
    let main = &manifest["chunks"]["main"];
    assert_eq!(main["kind"], "initial");
    assert!(dist.join(main["file"].as_str().unwrap()).is_file());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("built 2 module(s)"));
}

#[test]
fn unresolved_import_fails_with_nonzero_exit() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::write(dir.path().join("src/index.js"), "import \"./missing\";\n").unwrap();
    fs::write(
        dir.path().join("liffey.config.json"),
        r#"{ "entry": { "main": "src/index.js" } }"#,
    )
    .unwrap();

    let output = liffey(dir.path(), &["build"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("./missing"), "stderr: {stderr}");
}

#[test]
fn library_build_then_linked_app_build() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("node_modules/react")).unwrap();
    fs::write(
        dir.path().join("node_modules/react/index.js"),
        "module.exports = {};\n",
    )
    .unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::write(dir.path().join("src/index.js"), "import \"react\";\n").unwrap();
    fs::write(
        dir.path().join("liffey.config.json"),
        r#"{ "entry": { "vendor_lib": ["react"] } }"#,
    )
    .unwrap();

    let output = liffey(dir.path(), &["library", "vendor_lib"]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(dir.path().join("dist/vendor_lib.manifest.json").is_file());

    fs::write(
        dir.path().join("liffey.config.json"),
        r#"{
            "entry": { "main": "src/index.js" },
            "externals": "dist/vendor_lib.manifest.json"
        }"#,
    )
    .unwrap();
    let output = liffey(dir.path(), &["build"]);
    assert!(output.status.success());
    // react came from the library, so the app graph is one module.
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("built 1 module(s)"), "stdout: {stdout}");
}

#[test]
fn missing_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = liffey(dir.path(), &["build"]);
    assert!(!output.status.success());
}
