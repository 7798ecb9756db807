use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub frontend: FrontendConfig,
    #[serde(default)]
    pub paths: PathConfig,
    #[serde(default)]
    pub levels: LevelConfig,
    #[serde(default)]
    pub sections: SectionConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 自动发现配置文件：优先读取环境变量 `VISTA_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os("VISTA_CONFIG") {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrontendMode {
    #[default]
    Cli,
    Quiet,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FrontendConfig {
    #[serde(default)]
    pub default_mode: FrontendMode,
}

/// 插件数据根目录与用户数据目录。
#[derive(Debug, Clone, Deserialize)]
pub struct PathConfig {
    #[serde(default = "PathConfig::default_plugin_root")]
    pub plugin_root: PathBuf,
    #[serde(default)]
    pub user_data_dir: Option<PathBuf>,
    /// 启动时为缺失的种类复制随附的默认数据。
    #[serde(default = "PathConfig::default_seed_defaults")]
    pub seed_defaults: bool,
}

impl PathConfig {
    fn default_plugin_root() -> PathBuf {
        PathBuf::from(".")
    }

    fn default_seed_defaults() -> bool {
        true
    }

    /// 用户文件所在目录，未配置时与插件根目录相同。
    pub fn user_root(&self) -> &Path {
        self.user_data_dir.as_deref().unwrap_or(&self.plugin_root)
    }
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            plugin_root: Self::default_plugin_root(),
            user_data_dir: None,
            seed_defaults: Self::default_seed_defaults(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LevelConfig {
    #[serde(default = "LevelConfig::default_cut_offset")]
    pub cut_offset: f64,
    #[serde(default = "LevelConfig::default_height_tolerance")]
    pub height_tolerance: f64,
}

impl LevelConfig {
    fn default_cut_offset() -> f64 {
        1.45
    }

    fn default_height_tolerance() -> f64 {
        0.01
    }
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            cut_offset: Self::default_cut_offset(),
            height_tolerance: Self::default_height_tolerance(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SectionConfig {
    #[serde(default = "SectionConfig::default_extend_distance")]
    pub extend_distance: f64,
    #[serde(default = "SectionConfig::default_standard_tag")]
    pub standard_tag: String,
}

impl SectionConfig {
    fn default_extend_distance() -> f64 {
        1.0
    }

    fn default_standard_tag() -> String {
        "SECTIONS".to_string()
    }
}

impl Default for SectionConfig {
    fn default() -> Self {
        Self {
            extend_distance: Self::default_extend_distance(),
            standard_tag: Self::default_standard_tag(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "CacheConfig::default_ttl_seconds")]
    pub ttl_seconds: u64,
}

impl CacheConfig {
    fn default_ttl_seconds() -> u64 {
        30
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: Self::default_ttl_seconds(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}
