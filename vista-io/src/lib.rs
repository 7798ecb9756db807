use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use vista_core::kind::ViewKind;

pub mod store;
pub mod styles;

pub use store::{JsonStore, LoadOutcome, SourceTier, WriteDurability};
pub use styles::StyleLibrary;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write file {path:?}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse JSON in {path:?}: {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode JSON: {0}")]
    EncodeError(#[source] serde_json::Error),
    #[error("invalid document structure: {0}")]
    InvalidDocument(String),
}

/// 按配置种类读取 JSON 文档。加载永不失败，失败信息写入 [`LoadOutcome`]。
pub trait DocumentLoader {
    fn load(&self, kind: &dyn ViewKind) -> LoadOutcome;
}

/// 写入用户文件，返回实际写入的路径。
pub trait DocumentSaver {
    fn save(&self, kind: &dyn ViewKind, data: &Value) -> Result<PathBuf, IoError>;
}

/// 去掉 UTF-8 BOM。
#[inline]
pub fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}

/// 结构校验：顶层必须是对象，且 `root_key` 指向由对象组成的数组。
pub fn validate_structure(value: &Value, root_key: &str) -> Result<(), IoError> {
    let Some(object) = value.as_object() else {
        return Err(IoError::InvalidDocument(
            "top-level JSON value must be an object".to_string(),
        ));
    };
    let Some(entries) = object.get(root_key) else {
        return Err(IoError::InvalidDocument(format!(
            "missing required top-level key `{root_key}`"
        )));
    };
    let Some(entries) = entries.as_array() else {
        return Err(IoError::InvalidDocument(format!(
            "`{root_key}` must be an array"
        )));
    };
    if let Some(index) = entries.iter().position(|entry| !entry.is_object()) {
        return Err(IoError::InvalidDocument(format!(
            "`{root_key}[{index}]` must be an object"
        )));
    }
    Ok(())
}

/// 读取外部 JSON 文件（用户导入），并做结构校验。
pub fn load_external_file(path: &Path, kind: &dyn ViewKind) -> Result<Value, IoError> {
    let text = std::fs::read_to_string(path).map_err(|source| IoError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value =
        serde_json::from_str(strip_bom(&text)).map_err(|source| IoError::ParseError {
            path: path.to_path_buf(),
            source,
        })?;
    validate_structure(&value, kind.root_key())?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bom_is_stripped_once() {
        assert_eq!(strip_bom("\u{feff}{}"), "{}");
        assert_eq!(strip_bom("{}"), "{}");
    }

    #[test]
    fn structure_validation_rejects_missing_key() {
        assert!(validate_structure(&json!({ "groups": [] }), "groups").is_ok());
        assert!(validate_structure(&json!({ "groups": [{ "id": "g" }] }), "groups").is_ok());

        let err = validate_structure(&json!({ "plans": [] }), "groups").unwrap_err();
        assert!(err.to_string().contains("groups"));
        assert!(validate_structure(&json!([]), "groups").is_err());
        assert!(validate_structure(&json!({ "groups": {} }), "groups").is_err());
        assert!(validate_structure(&json!({ "groups": [1, 2] }), "groups").is_err());
    }
}
