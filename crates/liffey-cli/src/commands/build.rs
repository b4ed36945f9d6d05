//! `liffey build`: one full build pass.

use liffey_core::{Bundler, BundlerConfig};
use miette::{miette, Result};
use std::path::Path;

pub fn run(config_path: &Path) -> Result<()> {
    let config = BundlerConfig::load(config_path).map_err(|e| miette!("{e}"))?;
    let out_dir = config.out_dir_abs();

    let bundler = Bundler::new(config).map_err(|e| miette!("{e}"))?;
    let result = bundler.build().map_err(|e| miette!("{e}"))?;

    if !result.success() {
        for error in &result.diagnostics.errors {
            eprintln!("error: {error}");
        }
        return Err(miette!(
            "build failed with {} error(s)",
            result.diagnostics.errors.len()
        ));
    }

    println!(
        "built {} module(s) into {} chunk(s) at {}",
        result.graph.len(),
        result.chunks.len(),
        out_dir.display()
    );
    for (name, entry) in &result.manifest.chunks {
        println!("  {name} ({}) -> {}", entry.kind, entry.file);
    }
    Ok(())
}
