//! Curated input loading
//!
//! Inputs arrive either as a JSON manifest of `{input_ref, prompt}` objects or
//! as a directory of images. In the directory form, each image's prompt comes
//! from a sibling `<stem>.txt` when present.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Image extensions picked up by a directory scan
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// One `(input_ref, prompt)` pair handed to the submitter
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CuratedInput {
    /// Source asset (path or URI)
    pub input_ref: String,
    /// Text directive; blank means "use the default prompt"
    #[serde(default)]
    pub prompt: String,
}

impl CuratedInput {
    /// Create an input pair
    pub fn new(input_ref: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            input_ref: input_ref.into(),
            prompt: prompt.into(),
        }
    }
}

/// Load inputs from a manifest file or an image directory
///
/// Blank prompts are replaced by `default_prompt`. The returned order is the
/// submission order.
pub fn load_inputs(source: &Path, default_prompt: &str) -> Result<Vec<CuratedInput>> {
    let mut inputs = if source.is_dir() {
        scan_directory(source)?
    } else {
        load_manifest(source)?
    };

    for input in &mut inputs {
        if input.prompt.trim().is_empty() {
            input.prompt = default_prompt.to_string();
        }
    }

    tracing::debug!(source = %source.display(), count = inputs.len(), "Loaded inputs");
    Ok(inputs)
}

/// Parse a JSON manifest: `[{"input_ref": "...", "prompt": "..."}]`
pub fn load_manifest(path: &Path) -> Result<Vec<CuratedInput>> {
    let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
        message: format!("cannot read input manifest {}: {e}", path.display()),
        key: Some("inputs".to_string()),
    })?;
    let inputs: Vec<CuratedInput> = serde_json::from_str(&raw).map_err(|e| Error::Config {
        message: format!("cannot parse input manifest {}: {e}", path.display()),
        key: Some("inputs".to_string()),
    })?;

    if let Some(pos) = inputs.iter().position(|i| i.input_ref.trim().is_empty()) {
        return Err(Error::config(
            "inputs",
            format!("manifest entry {pos} has an empty input_ref"),
        ));
    }
    Ok(inputs)
}

/// Collect images in `dir`, sorted by file name
pub fn scan_directory(dir: &Path) -> Result<Vec<CuratedInput>> {
    let mut images: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_image(p))
        .collect();
    images.sort();

    images
        .into_iter()
        .map(|image| {
            let prompt = sidecar_prompt(&image)?.unwrap_or_default();
            Ok(CuratedInput::new(image.to_string_lossy(), prompt))
        })
        .collect()
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn sidecar_prompt(image: &Path) -> Result<Option<String>> {
    let txt = image.with_extension("txt");
    match std::fs::read_to_string(&txt) {
        Ok(text) => Ok(Some(text.trim().to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
