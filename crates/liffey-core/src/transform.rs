//! Transform pipeline.
//!
//! Each module runs through an ordered loader chain before emit. The
//! chain comes from the first config rule whose `test` regex matches the
//! module path; modules with no matching rule get a default chain for
//! their kind. Loader order within a rule is preserved literally, and
//! the chain (names plus options) is hashed into the persistent cache
//! key so an options change invalidates cached output.
//!
//! Built-in loaders:
//! - `script`: normalizes script sources, wraps `.json` as a module
//! - `style`: turns a stylesheet into a script that injects a style tag
//! - `asset`: inlines small files as data URIs, emits the rest under a
//!   content-hashed name
//! - `banner`: prepends a comment banner (`options.text`)

use crate::config::{AssetOptions, BundlerConfig, LoaderSpec, TransformRule};
use crate::error::{BuildError, Result};
use crate::graph::ModuleKind;
use base64::Engine as _;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The product of a module's loader chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformOutput {
    /// Final code for the module (always script text after the chain).
    pub code: String,
    /// Optional source map, carried through verbatim.
    pub map: Option<String>,
    /// A sidecar file to write into the output directory, for assets
    /// over the inline limit.
    pub emitted_asset: Option<EmittedAsset>,
}

/// An asset file produced by a transform, emitted alongside chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmittedAsset {
    /// Content-hashed output file name.
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Per-invocation context handed to each loader in a chain.
pub struct LoaderContext<'a> {
    pub path: &'a Path,
    pub kind: ModuleKind,
    /// Raw file bytes, before any loader ran.
    pub raw: &'a [u8],
    /// The loader's own options from the matching rule.
    pub options: &'a serde_json::Value,
    pub assets: &'a AssetOptions,
    pub public_path: &'a str,
}

/// A single transform stage.
pub trait Loader: Send + Sync {
    fn name(&self) -> &'static str;

    /// Transform `input`, producing the next stage's input.
    ///
    /// # Errors
    /// Returns [`BuildError::Transform`] on failure; the pipeline stops
    /// at the first failing stage.
    fn run(&self, ctx: &LoaderContext<'_>, input: TransformOutput) -> Result<TransformOutput>;
}

fn stage_error(ctx: &LoaderContext<'_>, stage: &str, cause: impl Into<String>) -> BuildError {
    BuildError::Transform {
        path: ctx.path.to_path_buf(),
        stage: stage.to_string(),
        cause: cause.into(),
    }
}

struct ScriptLoader;

impl Loader for ScriptLoader {
    fn name(&self) -> &'static str {
        "script"
    }

    fn run(&self, ctx: &LoaderContext<'_>, input: TransformOutput) -> Result<TransformOutput> {
        let mut code = input.code;
        if let Some(stripped) = code.strip_prefix('\u{feff}') {
            code = stripped.to_string();
        }
        if code.contains('\r') {
            code = code.replace("\r\n", "\n");
        }
        // JSON sources become a module exporting the parsed value.
        if ctx.path.extension().is_some_and(|e| e == "json") {
            let value: serde_json::Value = serde_json::from_str(&code)
                .map_err(|e| stage_error(ctx, self.name(), e.to_string()))?;
            code = format!("export default {value};\n");
        }
        Ok(TransformOutput {
            code,
            map: input.map,
            emitted_asset: input.emitted_asset,
        })
    }
}

struct StyleLoader;

impl Loader for StyleLoader {
    fn name(&self) -> &'static str {
        "style"
    }

    fn run(&self, _ctx: &LoaderContext<'_>, input: TransformOutput) -> Result<TransformOutput> {
        // A stylesheet becomes a script that injects its text at load
        // time, so styles participate in the graph like any module.
        let literal = serde_json::Value::String(input.code).to_string();
        let code = format!(
            "const css = {literal};\n\
             const el = document.createElement(\"style\");\n\
             el.textContent = css;\n\
             document.head.appendChild(el);\n\
             export default css;\n"
        );
        Ok(TransformOutput {
            code,
            map: input.map,
            emitted_asset: None,
        })
    }
}

struct AssetLoader;

impl Loader for AssetLoader {
    fn name(&self) -> &'static str {
        "asset"
    }

    fn run(&self, ctx: &LoaderContext<'_>, _input: TransformOutput) -> Result<TransformOutput> {
        let size = ctx.raw.len() as u64;
        if size < ctx.assets.inline_limit {
            let encoded = base64::engine::general_purpose::STANDARD.encode(ctx.raw);
            let uri = format!("data:{};base64,{}", mime_for(ctx.path), encoded);
            return Ok(TransformOutput {
                code: format!("export default \"{uri}\";\n"),
                map: None,
                emitted_asset: None,
            });
        }

        let stem = ctx
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("asset");
        let hash = liffey_util::hash::short_hash(ctx.raw);
        let file_name = match ctx.path.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{stem}.{hash}.{ext}"),
            None => format!("{stem}.{hash}"),
        };
        let public = format!("{}{file_name}", ctx.public_path);
        Ok(TransformOutput {
            code: format!("export default \"{public}\";\n"),
            map: None,
            emitted_asset: Some(EmittedAsset {
                file_name,
                bytes: ctx.raw.to_vec(),
            }),
        })
    }
}

struct BannerLoader;

impl Loader for BannerLoader {
    fn name(&self) -> &'static str {
        "banner"
    }

    fn run(&self, ctx: &LoaderContext<'_>, input: TransformOutput) -> Result<TransformOutput> {
        let text = ctx
            .options
            .get("text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| stage_error(ctx, self.name(), "missing 'text' option"))?;
        Ok(TransformOutput {
            code: format!("/*! {text} */\n{}", input.code),
            map: input.map,
            emitted_asset: input.emitted_asset,
        })
    }
}

fn builtin(name: &str) -> Option<&'static dyn Loader> {
    match name {
        "script" => Some(&ScriptLoader),
        "style" => Some(&StyleLoader),
        "asset" => Some(&AssetLoader),
        "banner" => Some(&BannerLoader),
        _ => None,
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        _ => "application/octet-stream",
    }
}

struct CompiledRule {
    test: Regex,
    loaders: Vec<LoaderSpec>,
}

/// Selects and runs loader chains. Stateless per module, safe to share
/// across rayon workers.
pub struct TransformPipeline {
    rules: Vec<CompiledRule>,
    assets: AssetOptions,
    public_path: String,
}

impl TransformPipeline {
    /// Compile the configured rules.
    ///
    /// # Errors
    /// Returns an error for an invalid rule regex. Config validation
    /// normally rejects these first.
    pub fn new(config: &BundlerConfig) -> Result<Self> {
        let rules = config
            .rules
            .iter()
            .map(compile_rule)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            rules,
            assets: config.assets.clone(),
            public_path: config.public_path.clone(),
        })
    }

    /// The loader chain for a module: first matching rule wins, with a
    /// per-kind default when no rule matches.
    #[must_use]
    pub fn chain_for(&self, path: &Path, kind: ModuleKind) -> Vec<LoaderSpec> {
        let text = path.to_string_lossy().replace('\\', "/");
        for rule in &self.rules {
            if rule.test.is_match(&text) {
                return rule.loaders.clone();
            }
        }
        let default = match kind {
            ModuleKind::Script => "script",
            ModuleKind::Style => "style",
            ModuleKind::Asset => "asset",
        };
        vec![LoaderSpec {
            loader: default.to_string(),
            options: serde_json::Value::Null,
        }]
    }

    /// Hash of the chain's names and options for a module, folded into
    /// its cache key so option edits invalidate cached output.
    #[must_use]
    pub fn options_hash(&self, path: &Path, kind: ModuleKind) -> String {
        let chain = self.chain_for(path, kind);
        let mut parts: Vec<Vec<u8>> = Vec::with_capacity(chain.len() * 2);
        for spec in &chain {
            parts.push(spec.loader.clone().into_bytes());
            parts.push(spec.options.to_string().into_bytes());
        }
        let refs: Vec<&[u8]> = parts.iter().map(Vec::as_slice).collect();
        liffey_util::hash::composite_hash(&refs)
    }

    /// Run a module through its chain.
    ///
    /// # Errors
    /// Returns [`BuildError::Transform`] from the first failing stage,
    /// naming that stage.
    pub fn transform(&self, path: &Path, kind: ModuleKind, raw: &[u8]) -> Result<TransformOutput> {
        let chain = self.chain_for(path, kind);
        let mut output = TransformOutput {
            code: String::from_utf8_lossy(raw).into_owned(),
            map: None,
            emitted_asset: None,
        };
        for spec in &chain {
            let ctx = LoaderContext {
                path,
                kind,
                raw,
                options: &spec.options,
                assets: &self.assets,
                public_path: &self.public_path,
            };
            let loader = builtin(&spec.loader)
                .ok_or_else(|| stage_error(&ctx, &spec.loader, "unknown loader"))?;
            output = loader.run(&ctx, output)?;
        }
        Ok(output)
    }
}

fn compile_rule(rule: &TransformRule) -> Result<CompiledRule> {
    let test = Regex::new(&rule.test)
        .map_err(|e| BuildError::other(format!("invalid rule test '{}': {e}", rule.test)))?;
    Ok(CompiledRule {
        test,
        loaders: rule.loaders.clone(),
    })
}
