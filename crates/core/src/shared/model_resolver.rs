use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::shared::constants::MODELS_DIR_NAME;

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("could not determine the platform data directory")]
    NoDataDir,
    #[error("{0} does not exist")]
    NotFound(PathBuf),
    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),
    #[error("model file {name} is missing from {dir}")]
    MissingModel { dir: PathBuf, name: String },
}

impl ModelResolveError {
    /// The path the error refers to, when there is one.
    pub fn path(&self) -> PathBuf {
        match self {
            Self::NoDataDir => PathBuf::new(),
            Self::NotFound(p) | Self::NotADirectory(p) => p.clone(),
            Self::MissingModel { dir, name } => dir.join(name),
        }
    }
}

/// Resolve the models directory: the explicit location when given,
/// otherwise the platform default. Either way it must be an existing
/// directory.
pub fn resolve_models_dir(explicit: Option<&Path>) -> Result<PathBuf, ModelResolveError> {
    let dir = match explicit {
        Some(dir) => dir.to_path_buf(),
        None => default_models_dir()?,
    };
    if !dir.exists() {
        return Err(ModelResolveError::NotFound(dir));
    }
    if !dir.is_dir() {
        return Err(ModelResolveError::NotADirectory(dir));
    }
    Ok(dir)
}

/// Platform-specific default models directory.
///
/// - macOS: `~/Library/Application Support/facetrace/models/`
/// - Linux: `$XDG_DATA_HOME/facetrace/models/` or `~/.local/share/facetrace/models/`
/// - Windows: `%APPDATA%/facetrace/models/`
pub fn default_models_dir() -> Result<PathBuf, ModelResolveError> {
    dirs::data_dir()
        .map(|d| d.join(MODELS_DIR_NAME).join("models"))
        .ok_or(ModelResolveError::NoDataDir)
}

/// Path of a named model file, which must exist inside `dir`.
pub fn model_path(dir: &Path, name: &str) -> Result<PathBuf, ModelResolveError> {
    let path = dir.join(name);
    if path.is_file() {
        Ok(path)
    } else {
        Err(ModelResolveError::MissingModel {
            dir: dir.to_path_buf(),
            name: name.to_string(),
        })
    }
}

/// Like [`model_path`] but absent files are not an error.
pub fn optional_model_path(dir: &Path, name: &str) -> Option<PathBuf> {
    let path = dir.join(name);
    path.is_file().then_some(path)
}
