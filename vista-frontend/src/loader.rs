use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};
use vista_config::AppConfig;
use vista_engine::memory::{DemoModel, MemoryState};
use vista_engine::{EngineSettings, MemoryHost, SessionContext};
use vista_io::{JsonStore, strip_bom};

use crate::errors::FrontendError;
use crate::resource_locator::DataRootLocator;

const HOST_SNAPSHOT_ENV: &str = "VISTA_HOST_SNAPSHOT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostSource {
    Snapshot(PathBuf),
    Demo,
}

pub struct LoadedHost {
    pub host: MemoryHost,
    pub source: HostSource,
    pub demo: Option<DemoModel>,
}

/// 优先读取 `VISTA_HOST_SNAPSHOT` 指向的宿主快照，失败时回退到内置演示模型。
pub fn load_host_from_env_or_demo() -> LoadedHost {
    if let Some(path) = env::var_os(HOST_SNAPSHOT_ENV) {
        let path = PathBuf::from(path);
        match load_host_snapshot(&path) {
            Ok(host) => {
                info!(path = %path.display(), "从快照加载宿主场景成功");
                return LoadedHost {
                    host,
                    source: HostSource::Snapshot(path),
                    demo: None,
                };
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "加载宿主快照失败，回退到内置示例");
            }
        }
    }

    demo_host()
}

pub fn demo_host() -> LoadedHost {
    let mut host = MemoryHost::new();
    let demo = host.populate_demo();
    LoadedHost {
        host,
        source: HostSource::Demo,
        demo: Some(demo),
    }
}

pub fn load_host_snapshot(path: &Path) -> Result<MemoryHost, FrontendError> {
    let text = fs::read_to_string(path).map_err(|source| FrontendError::SnapshotRead {
        path: path.to_path_buf(),
        source,
    })?;
    let state: MemoryState =
        serde_json::from_str(strip_bom(&text)).map_err(|source| FrontendError::SnapshotParse {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(MemoryHost::with_state(state))
}

pub fn save_host_snapshot(host: &MemoryHost, path: &Path) -> Result<(), FrontendError> {
    let text = serde_json::to_string_pretty(host.state()).map_err(FrontendError::Encode)?;
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| FrontendError::SnapshotWrite {
            path: path.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, text).map_err(|source| FrontendError::SnapshotWrite {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_app_config() -> AppConfig {
    match AppConfig::discover() {
        Ok(cfg) => cfg,
        Err(err) => {
            warn!(error = %err, "读取配置失败，使用默认配置");
            AppConfig::default()
        }
    }
}

pub fn engine_settings(config: &AppConfig) -> EngineSettings {
    EngineSettings {
        cut_offset: config.levels.cut_offset,
        height_tolerance: config.levels.height_tolerance,
        extend_distance: config.sections.extend_distance,
        standard_tag: config.sections.standard_tag.clone(),
        cache_ttl: Duration::from_secs(config.cache.ttl_seconds),
    }
}

/// 按配置构造会话：插件根目录经查找器确定，用户目录未配置时与之相同。
pub fn build_session(config: &AppConfig) -> SessionContext {
    let plugin_root = DataRootLocator::from_config(config).plugin_root();
    let user_root = config
        .paths
        .user_data_dir
        .clone()
        .unwrap_or_else(|| plugin_root.clone());
    info!(
        plugin_root = %plugin_root.display(),
        user_root = %user_root.display(),
        "初始化会话上下文"
    );
    SessionContext::new(
        JsonStore::new(plugin_root, user_root),
        engine_settings(config),
    )
}
