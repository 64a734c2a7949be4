//! Configuration documents: parse TOML or JSON into the generic nested
//! value the engine loads, recording where each document came from.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use cfgtree_core::{ConfigTree, NodeId};

/// Errors raised while reading or loading a document
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("TOML float {0} has no JSON representation")]
    NonFiniteFloat(f64),

    #[error("unsupported document format for {0} (expected .toml or .json)")]
    UnsupportedFormat(PathBuf),

    #[error(transparent)]
    Config(#[from] cfgtree_core::Error),
}

/// Document syntax
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Toml,
    Json,
}

impl DocumentFormat {
    /// Pick the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self, DocumentError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Ok(Self::Toml),
            Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(Self::Json),
            _ => Err(DocumentError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

/// A parsed document with provenance
#[derive(Debug, Clone, Serialize)]
pub struct LoadedDocument {
    /// Source file
    pub path: PathBuf,

    /// Syntax the file was parsed as
    pub format: DocumentFormat,

    /// SHA-256 digest of the raw file bytes
    pub digest: String,

    /// Parsed content
    #[serde(skip)]
    pub value: Value,
}

/// Parse document text into a generic nested value.
pub fn parse_str(text: &str, format: DocumentFormat) -> Result<Value, DocumentError> {
    match format {
        DocumentFormat::Toml => {
            let toml_value: toml::Value = toml::from_str(text)?;
            toml_to_json(toml_value)
        }
        DocumentFormat::Json => Ok(serde_json::from_str(text)?),
    }
}

/// Read and parse a document, computing its digest.
pub fn load_file(path: &Path) -> Result<LoadedDocument, DocumentError> {
    let format = DocumentFormat::from_path(path)?;
    let bytes = fs::read(path).map_err(|source| DocumentError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let digest = hex::encode(hasher.finalize());

    let contents = String::from_utf8(bytes)?;
    let value = parse_str(&contents, format)?;
    tracing::debug!(path = %path.display(), digest = %digest, "parsed document");

    Ok(LoadedDocument {
        path: path.to_path_buf(),
        format,
        digest,
        value,
    })
}

/// Read a document and load it into `node`.
pub fn load_into(
    tree: &mut ConfigTree,
    node: NodeId,
    path: &Path,
) -> Result<LoadedDocument, DocumentError> {
    let document = load_file(path)?;
    tree.load_data(node, &document.value)?;
    Ok(document)
}

/// Convert a TOML value to the engine's value model. NaN and infinite
/// floats are rejected.
fn toml_to_json(toml: toml::Value) -> Result<Value, DocumentError> {
    Ok(match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .ok_or(DocumentError::NonFiniteFloat(f))?,
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(toml_to_json)
                .collect::<Result<_, _>>()?,
        ),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(key, value)| Ok((key, toml_to_json(value)?)))
                .collect::<Result<_, DocumentError>>()?,
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_toml_keeps_document_order() {
        let value = parse_str(
            "zeta = 1\nalpha = \"a\"\n[mid]\nlist = [1, 2]\n",
            DocumentFormat::Toml,
        )
        .unwrap();
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
        assert_eq!(value["mid"]["list"], json!([1, 2]));
    }

    #[test]
    fn test_toml_scalars() {
        let value = parse_str(
            "ratio = 0.5\nenabled = true\nwhen = 1979-05-27T07:32:00Z\n",
            DocumentFormat::Toml,
        )
        .unwrap();
        assert_eq!(value["ratio"], json!(0.5));
        assert_eq!(value["enabled"], json!(true));
        assert_eq!(value["when"], json!("1979-05-27T07:32:00Z"));
    }

    #[test]
    fn test_toml_non_finite_floats_rejected() {
        for text in ["ratio = nan\n", "limits = { max = inf }\n", "xs = [1.0, -inf]\n"] {
            assert!(matches!(
                parse_str(text, DocumentFormat::Toml),
                Err(DocumentError::NonFiniteFloat(_))
            ));
        }
    }

    #[test]
    fn test_json() {
        let value = parse_str(r#"{"b": [1], "a": null}"#, DocumentFormat::Json).unwrap();
        assert!(value["a"].is_null());
        assert_eq!(value["b"], json!([1]));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            DocumentFormat::from_path(Path::new("a/b.TOML")).unwrap(),
            DocumentFormat::Toml
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("b.json")).unwrap(),
            DocumentFormat::Json
        );
        assert!(matches!(
            DocumentFormat::from_path(Path::new("b.yaml")),
            Err(DocumentError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_load_file_records_digest() {
        let mut temp = Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(temp, "repo = \"git@example.org:app.git\"").unwrap();

        let document = load_file(temp.path()).unwrap();
        assert_eq!(document.format, DocumentFormat::Toml);
        assert_eq!(document.digest.len(), 64);
        assert_eq!(document.value["repo"], "git@example.org:app.git");
    }

    #[test]
    fn test_missing_file() {
        let err = load_file(Path::new("/nonexistent/cfgtree.toml")).unwrap_err();
        assert!(matches!(err, DocumentError::Io { .. }));
    }
}
