//! End-to-end build scenarios against real project trees on disk.

use liffey_core::{BundlerConfig, Bundler};
use std::fs;
use std::path::Path;

fn load_config(root: &Path, json: &str) -> BundlerConfig {
    let path = root.join("liffey.config.json");
    fs::write(&path, json).unwrap();
    BundlerConfig::load(&path).unwrap()
}

/// Two pages sharing a helper module, plus a page-only module.
fn shared_helper_project(root: &Path) {
    fs::create_dir_all(root.join("src")).unwrap();
    fs::write(
        root.join("src/a.js"),
        "import { fmt } from \"./shared\";\nimport { only } from \"./a-only\";\nconsole.log(fmt(only));\n",
    )
    .unwrap();
    fs::write(
        root.join("src/b.js"),
        "import { fmt } from \"./shared\";\nconsole.log(fmt(2));\n",
    )
    .unwrap();
    fs::write(
        root.join("src/shared.js"),
        "export function fmt(x) { return \"[\" + x + \"]\"; }\n",
    )
    .unwrap();
    fs::write(root.join("src/a-only.js"), "export const only = 1;\n").unwrap();
}

const TWO_ENTRY_CONFIG: &str = r#"{
    "entry": { "a": "src/a.js", "b": "src/b.js" },
    "split": { "groups": [
        { "name": "common", "test": "shared", "minChunks": 2, "chunks": "all" }
    ] }
}"#;

#[test]
fn shared_module_lands_in_exactly_one_chunk() {
    let dir = tempfile::tempdir().unwrap();
    shared_helper_project(dir.path());
    let config = load_config(dir.path(), TWO_ENTRY_CONFIG);

    let result = Bundler::new(config).unwrap().build().unwrap();
    assert!(result.success());

    let manifest = &result.manifest;
    assert_eq!(manifest.chunks.len(), 3);
    let shared_id = result
        .graph
        .iter()
        .find(|(_, m)| m.path.ends_with("shared.js"))
        .map(|(_, m)| m.stable_id.clone())
        .unwrap();
    let holders: Vec<&str> = manifest
        .chunks
        .iter()
        .filter(|(_, e)| e.modules.contains(&shared_id))
        .map(|(name, _)| name.as_str())
        .collect();
    assert_eq!(holders, vec!["common"]);
    assert_eq!(manifest.chunks["common"].kind, "shared");

    // The page-only module stays in its entry chunk.
    let only_id = result
        .graph
        .iter()
        .find(|(_, m)| m.path.ends_with("a-only.js"))
        .map(|(_, m)| m.stable_id.clone())
        .unwrap();
    assert!(manifest.chunks["a"].modules.contains(&only_id));
    assert!(!manifest.chunks["common"].modules.contains(&only_id));
}

#[test]
fn every_emitted_chunk_can_load_first() {
    let dir = tempfile::tempdir().unwrap();
    shared_helper_project(dir.path());
    let config = load_config(dir.path(), TWO_ENTRY_CONFIG);

    let result = Bundler::new(config).unwrap().build().unwrap();
    assert!(result.success());

    // index.html loads shared chunks ahead of initial ones, so each
    // chunk file must define the runtime before calling into it.
    for entry in result.manifest.chunks.values() {
        let code = fs::read_to_string(dir.path().join("dist").join(&entry.file)).unwrap();
        let prelude = code
            .find("window.__liffey")
            .unwrap_or_else(|| panic!("{} lacks the runtime prelude", entry.file));
        let define = code.find("__liffey.define(").unwrap();
        assert!(prelude < define, "{} calls define before the prelude", entry.file);
    }
}

#[test]
fn repeated_builds_are_bit_identical() {
    let dir = tempfile::tempdir().unwrap();
    shared_helper_project(dir.path());

    let first = Bundler::new(load_config(dir.path(), TWO_ENTRY_CONFIG))
        .unwrap()
        .build()
        .unwrap();
    let second = Bundler::new(load_config(dir.path(), TWO_ENTRY_CONFIG))
        .unwrap()
        .build()
        .unwrap();

    assert_eq!(first.manifest, second.manifest);
    for entry in first.manifest.chunks.values() {
        let path = dir.path().join("dist").join(&entry.file);
        assert!(path.is_file(), "missing {}", entry.file);
    }
}

#[test]
fn one_byte_edit_changes_one_module_and_its_chunk() {
    let dir = tempfile::tempdir().unwrap();
    shared_helper_project(dir.path());
    let config = load_config(dir.path(), TWO_ENTRY_CONFIG);

    let bundler = Bundler::new(config).unwrap();
    let first = bundler.build().unwrap();

    fs::write(dir.path().join("src/a-only.js"), "export const only = 2;\n").unwrap();
    let (second, diff) = bundler.rebuild(&first).unwrap();
    assert!(second.success());

    let only_id = second
        .graph
        .iter()
        .find(|(_, m)| m.path.ends_with("a-only.js"))
        .map(|(_, m)| m.stable_id.clone())
        .unwrap();
    assert_eq!(diff.changed_module_ids, vec![only_id]);

    // Only chunk `a` gets a new file name; b and common are untouched.
    let delta = second.manifest.delta(&first.manifest);
    let changed: Vec<&str> = delta.keys().map(String::as_str).collect();
    assert_eq!(changed, vec!["a"]);
    assert_ne!(
        first.manifest.chunks["a"].file,
        second.manifest.chunks["a"].file
    );
    assert_eq!(
        first.manifest.chunks["common"].file,
        second.manifest.chunks["common"].file
    );
}

#[test]
fn persistent_cache_short_circuits_fresh_process() {
    let dir = tempfile::tempdir().unwrap();
    shared_helper_project(dir.path());
    let config_json = r#"{
        "entry": { "a": "src/a.js", "b": "src/b.js" },
        "cache": { "dir": ".liffey-cache" }
    }"#;

    {
        let bundler = Bundler::new(load_config(dir.path(), config_json)).unwrap();
        bundler.build().unwrap();
        assert_eq!(bundler.cache_hits(), 0);
    }

    // A new bundler simulates a fresh process reading the same cache.
    let bundler = Bundler::new(load_config(dir.path(), config_json)).unwrap();
    let result = bundler.build().unwrap();
    assert!(result.success());
    assert_eq!(bundler.cache_hits(), 4);
}

#[test]
fn styles_and_assets_flow_through_the_graph() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::write(
        dir.path().join("src/index.js"),
        "import \"./app.css\";\nconsole.log(\"up\");\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("src/app.css"),
        ".logo { background: url(\"./logo.png\"); }\n",
    )
    .unwrap();
    fs::write(dir.path().join("src/logo.png"), vec![0u8; 64]).unwrap();

    let config = load_config(
        dir.path(),
        r#"{ "entry": { "main": "src/index.js" }, "assets": { "inlineLimit": 16 } }"#,
    );
    let result = Bundler::new(config).unwrap().build().unwrap();
    assert!(result.success());
    assert_eq!(result.graph.len(), 3);

    // 64 bytes is over the 16-byte limit, so the png is emitted, not inlined.
    let logo = result
        .graph
        .iter()
        .find(|(_, m)| m.path.ends_with("logo.png"))
        .and_then(|(_, m)| m.output.as_ref())
        .and_then(|o| o.emitted_asset.as_ref())
        .expect("emitted asset");
    assert!(dir.path().join("dist").join(&logo.file_name).is_file());

    let chunk_file = &result.manifest.chunks["main"].file;
    let code = fs::read_to_string(dir.path().join("dist").join(chunk_file)).unwrap();
    assert!(code.contains("document.createElement(\"style\")"));
    assert!(code.contains(&logo.file_name));
}

#[test]
fn library_manifest_links_application_build() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("node_modules/react")).unwrap();
    fs::write(
        dir.path().join("node_modules/react/index.js"),
        "module.exports = { createElement: function () {} };\n",
    )
    .unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::write(
        dir.path().join("src/index.js"),
        "import React from \"react\";\nconsole.log(React);\n",
    )
    .unwrap();

    // Pass one: library build.
    let lib_config = load_config(
        dir.path(),
        r#"{ "entry": { "vendor_lib": ["react"] } }"#,
    );
    let library = Bundler::new(lib_config)
        .unwrap()
        .build_library("vendor_lib")
        .unwrap();

    // Pass two: application build linking the manifest.
    let app_config = load_config(
        dir.path(),
        r#"{
            "entry": { "main": "src/index.js" },
            "externals": "dist/vendor_lib.manifest.json"
        }"#,
    );
    let result = Bundler::new(app_config).unwrap().build().unwrap();
    assert!(result.success());
    // react stayed out of the application graph.
    assert_eq!(result.graph.len(), 1);

    // index.html loads the library bundle before the entry chunk.
    let html = fs::read_to_string(dir.path().join("dist/index.html")).unwrap();
    let lib_pos = html.find(&library.bundle_file).expect("library script");
    let main_pos = html.find(&result.manifest.chunks["main"].file).unwrap();
    assert!(lib_pos < main_pos);
}

#[test]
fn dynamic_import_emits_async_chunk_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::write(
        dir.path().join("src/index.js"),
        "import(\"./editor\").then(function (m) { m.default(); });\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("src/editor.js"),
        "export default function () { return \"editor\"; }\n",
    )
    .unwrap();

    let config = load_config(dir.path(), r#"{ "entry": { "main": "src/index.js" } }"#);
    let result = Bundler::new(config).unwrap().build().unwrap();
    assert!(result.success());

    let editor = &result.manifest.chunks["editor"];
    assert_eq!(editor.kind, "async");
    assert!(dir.path().join("dist").join(&editor.file).is_file());
    // Async chunks are not referenced from the HTML shell.
    let html = fs::read_to_string(dir.path().join("dist/index.html")).unwrap();
    assert!(!html.contains(&editor.file));
}
