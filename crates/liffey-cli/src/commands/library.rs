//! `liffey library <name>`: external-library build.

use liffey_core::{Bundler, BundlerConfig};
use miette::{miette, Result};
use std::path::Path;

pub fn run(config_path: &Path, name: &str) -> Result<()> {
    let config = BundlerConfig::load(config_path).map_err(|e| miette!("{e}"))?;
    let bundler = Bundler::new(config).map_err(|e| miette!("{e}"))?;
    let build = bundler.build_library(name).map_err(|e| miette!("{e}"))?;

    println!("library bundle: {}", build.bundle_file);
    println!("link manifest:  {}", build.manifest_path.display());
    println!("point `externals` at the manifest to link application builds against it");
    Ok(())
}
