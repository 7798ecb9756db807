use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};
use vista_config::PathConfig;
use vista_core::kind::all_kinds;

const DATA_SOURCE_ENV: &str = "VISTA_DATA_SOURCE";

/// 为插件根目录下缺少 `json_data` 的种类复制随附的默认数据，返回已复制的域名。
pub fn ensure_default_data(config: &PathConfig) -> Result<Vec<&'static str>, RuntimeAssetError> {
    let root = normalize_path(&config.plugin_root)?;
    let missing: Vec<&'static str> = all_kinds()
        .iter()
        .map(|kind| kind.domain())
        .filter(|domain| !root.join(domain).join("json_data").is_dir())
        .collect();
    if missing.is_empty() {
        return Ok(Vec::new());
    }
    if !config.seed_defaults {
        return Err(RuntimeAssetError::SeedingDisabled { target: root });
    }

    let source = locate_data_source().ok_or(RuntimeAssetError::SourceNotFound)?;
    let mut seeded = Vec::new();
    for domain in missing {
        let from = source.join(domain);
        if !from.is_dir() {
            debug!(domain, source = %source.display(), "随附数据中没有该种类");
            continue;
        }
        let to = root.join(domain);
        copy_dir_recursive(&from, &to).map_err(|error| RuntimeAssetError::CopyFailed {
            from: from.clone(),
            to: to.clone(),
            error,
        })?;
        info!(
            domain,
            source = %from.display(),
            target = %to.display(),
            "已复制默认数据"
        );
        seeded.push(domain);
    }
    Ok(seeded)
}

fn normalize_path(path: &Path) -> Result<PathBuf, RuntimeAssetError> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        let cwd = env::current_dir().map_err(|error| RuntimeAssetError::Io { error })?;
        Ok(cwd.join(path))
    }
}

fn locate_data_source() -> Option<PathBuf> {
    if let Some(env_path) = env::var_os(DATA_SOURCE_ENV) {
        let candidate = PathBuf::from(env_path);
        if candidate.is_dir() {
            return Some(candidate);
        }
    }

    let cwd = env::current_dir().ok()?;
    let candidates = [cwd.join("data"), cwd.join("..").join("data")];
    candidates.into_iter().find(|path| path.is_dir())
}

fn copy_dir_recursive(source: &Path, target: &Path) -> std::io::Result<()> {
    fs::create_dir_all(target)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let src_path = entry.path();
        let dst_path = target.join(entry.file_name());
        if file_type.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

#[derive(Debug, Error)]
pub enum RuntimeAssetError {
    #[error("未能找到默认数据源目录")]
    SourceNotFound,
    #[error("目标 {target:?} 缺少默认数据且 seed_defaults 已关闭")]
    SeedingDisabled { target: PathBuf },
    #[error("复制默认数据 {from:?} -> {to:?} 失败: {error}")]
    CopyFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        error: std::io::Error,
    },
    #[error("I/O 错误: {error}")]
    Io {
        #[source]
        error: std::io::Error,
    },
}
