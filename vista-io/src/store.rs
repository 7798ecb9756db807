use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use vista_core::kind::ViewKind;

use crate::{DocumentLoader, DocumentSaver, IoError, strip_bom, validate_structure};

/// 实际提供数据的层级，便于测试断言回退路径。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceTier {
    User(PathBuf),
    Default(PathBuf),
    Skeleton,
}

/// 一次加载的结果。`success == false` 时 `data` 为空骨架，`message` 给出诊断信息。
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub data: Value,
    pub tier: SourceTier,
    pub success: bool,
    pub message: Option<String>,
}

impl LoadOutcome {
    #[inline]
    pub fn is_user(&self) -> bool {
        matches!(self.tier, SourceTier::User(_))
    }

    #[inline]
    pub fn is_default(&self) -> bool {
        matches!(self.tier, SourceTier::Default(_))
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum WriteDurability {
    /// 写临时文件后原子重命名，不做 fsync。
    #[default]
    BestEffort,
    /// 额外同步文件内容。
    Durable,
}

/// 分层 JSON 存储：用户文件 → 默认文件 → 内存骨架。
///
/// 默认文件只读；所有保存只写用户文件。
#[derive(Debug, Clone)]
pub struct JsonStore {
    plugin_root: PathBuf,
    user_root: PathBuf,
    durability: WriteDurability,
}

impl JsonStore {
    pub fn new(plugin_root: impl Into<PathBuf>, user_root: impl Into<PathBuf>) -> Self {
        Self {
            plugin_root: plugin_root.into(),
            user_root: user_root.into(),
            durability: WriteDurability::default(),
        }
    }

    pub fn with_durability(mut self, durability: WriteDurability) -> Self {
        self.durability = durability;
        self
    }

    #[inline]
    pub fn plugin_root(&self) -> &Path {
        &self.plugin_root
    }

    #[inline]
    pub fn user_root(&self) -> &Path {
        &self.user_root
    }

    pub fn default_path(&self, kind: &dyn ViewKind) -> PathBuf {
        kind.default_file(&self.plugin_root)
    }

    pub fn user_path(&self, kind: &dyn ViewKind) -> PathBuf {
        kind.user_file(&self.user_root)
    }

    pub fn styles_path(&self, kind: &dyn ViewKind) -> PathBuf {
        kind.styles_path(&self.plugin_root)
    }

    /// 空骨架：`{"<root_key>": []}`。
    pub fn skeleton(kind: &dyn ViewKind) -> Value {
        let mut map = Map::new();
        map.insert(kind.root_key().to_string(), Value::Array(Vec::new()));
        Value::Object(map)
    }

    /// 读取单个层级。文件缺失或内容为空返回 `Ok(None)`。
    fn read_tier(path: &Path, root_key: &str) -> Result<Option<Value>, IoError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(IoError::ReadError {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let text = strip_bom(&text);
        if text.trim().is_empty() {
            return Ok(None);
        }
        let value: Value = serde_json::from_str(text).map_err(|source| IoError::ParseError {
            path: path.to_path_buf(),
            source,
        })?;
        if is_empty_content(&value, root_key) {
            return Ok(None);
        }
        validate_structure(&value, root_key)?;
        Ok(Some(value))
    }

    /// 按优先级加载：用户文件解析失败时回退到默认文件，默认文件也不可用时返回骨架。
    pub fn load_kind(&self, kind: &dyn ViewKind) -> LoadOutcome {
        self.load_decoded(kind, |_| Ok(())).1
    }

    /// 逐层加载并解码。某一层解码失败与解析失败同样处理，继续回退到下一层。
    ///
    /// 骨架层解码失败时返回 `T::default()`。
    pub fn load_decoded<T, F>(&self, kind: &dyn ViewKind, decode: F) -> (T, LoadOutcome)
    where
        T: Default,
        F: Fn(&Value) -> Result<T, String>,
    {
        let root_key = kind.root_key();
        let user_path = self.user_path(kind);
        let default_path = self.default_path(kind);
        let mut failures: Vec<String> = Vec::new();

        for (path, is_user) in [(&user_path, true), (&default_path, false)] {
            match Self::read_tier(path, root_key) {
                Ok(Some(data)) => match decode(&data) {
                    Ok(value) => {
                        let tier = if is_user {
                            debug!(domain = kind.domain(), path = %path.display(), "使用用户数据文件");
                            SourceTier::User(path.clone())
                        } else {
                            debug!(domain = kind.domain(), path = %path.display(), "使用默认数据文件");
                            SourceTier::Default(path.clone())
                        };
                        return (
                            value,
                            LoadOutcome {
                                data,
                                tier,
                                success: true,
                                message: None,
                            },
                        );
                    }
                    Err(err) => {
                        warn!(domain = kind.domain(), path = %path.display(), error = %err, "数据文件内容无效，回退到下一层");
                        failures.push(format!("invalid content in {}: {err}", path.display()));
                    }
                },
                Ok(None) => {
                    debug!(domain = kind.domain(), path = %path.display(), "数据文件不存在或为空");
                }
                Err(err) => {
                    warn!(domain = kind.domain(), error = %err, "数据文件损坏，回退到下一层");
                    failures.push(err.to_string());
                }
            }
        }

        let message = if failures.is_empty() {
            format!(
                "no data file found for `{}` (looked at {} and {})",
                kind.domain(),
                user_path.display(),
                default_path.display()
            )
        } else {
            failures.join("; ")
        };
        warn!(domain = kind.domain(), "{message}，使用空骨架");
        let data = Self::skeleton(kind);
        let value = decode(&data).unwrap_or_default();
        (
            value,
            LoadOutcome {
                data,
                tier: SourceTier::Skeleton,
                success: false,
                message: Some(message),
            },
        )
    }

    /// 校验结构后美化输出到用户文件。
    pub fn save_kind(&self, kind: &dyn ViewKind, data: &Value) -> Result<PathBuf, IoError> {
        validate_structure(data, kind.root_key())?;
        let path = self.user_path(kind);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| IoError::WriteError {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let mut contents = serde_json::to_string_pretty(data).map_err(IoError::EncodeError)?;
        contents.push('\n');
        write_file_atomic(&path, contents.as_bytes(), self.durability)?;
        info!(domain = kind.domain(), path = %path.display(), "已保存用户数据文件");
        Ok(path)
    }

    /// 删除用户文件，使后续加载回退到默认文件。文件不存在时返回 `false`。
    pub fn reset_user_file(&self, kind: &dyn ViewKind) -> Result<bool, IoError> {
        let path = self.user_path(kind);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(IoError::WriteError { path, source }),
        }
    }
}

impl DocumentLoader for JsonStore {
    fn load(&self, kind: &dyn ViewKind) -> LoadOutcome {
        self.load_kind(kind)
    }
}

impl DocumentSaver for JsonStore {
    fn save(&self, kind: &dyn ViewKind, data: &Value) -> Result<PathBuf, IoError> {
        self.save_kind(kind, data)
    }
}

/// `null`、空对象、缺少顶层键的对象都视为“空内容”。
fn is_empty_content(value: &Value, root_key: &str) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty() || !map.contains_key(root_key),
        _ => false,
    }
}

fn write_file_atomic(
    path: &Path,
    contents: &[u8],
    durability: WriteDurability,
) -> Result<(), IoError> {
    let write_error = |path: &Path, source: io::Error| IoError::WriteError {
        path: path.to_path_buf(),
        source,
    };

    let Some(parent) = path.parent() else {
        return Err(write_error(path, io::Error::other("path has no parent")));
    };
    let Some(file_name) = path.file_name() else {
        return Err(write_error(path, io::Error::other("path has no file name")));
    };

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let tmp_path = parent.join(format!(
        ".vista.tmp.{}.{}",
        file_name.to_string_lossy(),
        nanos
    ));

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&tmp_path)
        .map_err(|source| write_error(&tmp_path, source))?;
    file.write_all(contents)
        .map_err(|source| write_error(&tmp_path, source))?;
    if durability == WriteDurability::Durable {
        file.sync_all()
            .map_err(|source| write_error(&tmp_path, source))?;
    }
    drop(file);

    if let Err(source) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(write_error(path, source));
    }
    Ok(())
}
