use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

use crate::normalize_string::NormalizeString;

pub mod file_format;
pub mod float_ext;
pub mod log_setup;
pub mod normalize_string;

pub use file_format::{FileExtensionError, FileFormat};

pub const EPSILON: f64 = 1e-6;

#[derive(Debug, thiserror::Error)]
pub enum SerdeFormatError {
    #[error("YAML serialization failed")]
    Yaml(#[from] serde_yml::Error),
    #[error("JSON serialization failed")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Extension(#[from] FileExtensionError),
    #[error("Failed to read {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type SerdeFormatResult<T> = Result<T, SerdeFormatError>;

pub fn serialize<T: Serialize>(value: &T, format: FileFormat) -> SerdeFormatResult<String> {
    let text = match format {
        FileFormat::Yaml => serde_yml::to_string(value)?,
        FileFormat::Json => serde_json::to_string_pretty(value)?,
    };

    Ok(text.normalize())
}

pub fn deserialize<T: DeserializeOwned + 'static>(
    serialized: &str,
    format: FileFormat,
) -> SerdeFormatResult<T> {
    match format {
        FileFormat::Yaml => Ok(serde_yml::from_str(serialized)?),
        FileFormat::Json => Ok(serde_json::from_str(serialized)?),
    }
}

/// Reads and deserializes a file, picking the format from its extension.
pub fn deserialize_file<T: DeserializeOwned + 'static>(path: impl AsRef<Path>) -> SerdeFormatResult<T> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let format = FileFormat::from_file_name(&display)?;
    let text = std::fs::read_to_string(path).map_err(|source| SerdeFormatError::Io {
        path: display,
        source,
    })?;

    deserialize(&text, format)
}
