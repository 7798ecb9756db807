use std::env;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};
use vista_config::AppConfig;
use vista_core::kind::all_kinds;

const DATA_ROOTS_ENV: &str = "VISTA_DATA_ROOTS";

/// 插件数据根目录的查找器：配置目录优先，其次为环境变量列出的目录。
pub struct DataRootLocator {
    search_roots: Vec<PathBuf>,
}

impl DataRootLocator {
    pub fn from_config(config: &AppConfig) -> Self {
        let env_roots = env::var_os(DATA_ROOTS_ENV)
            .map(|paths| env::split_paths(&paths).collect::<Vec<_>>())
            .unwrap_or_default();
        Self::with_roots(
            std::iter::once(config.paths.plugin_root.clone()).chain(env_roots),
        )
    }

    pub fn with_roots(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        // 去重，保持靠前优先级。
        let mut deduped: Vec<PathBuf> = Vec::new();
        for root in roots {
            if !deduped.iter().any(|existing| existing == &root) {
                deduped.push(root);
            }
        }
        DataRootLocator {
            search_roots: deduped,
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.search_roots
    }

    /// 第一个带有任一种类 `json_data` 目录的根；都没有时退回首个根目录。
    pub fn plugin_root(&self) -> PathBuf {
        for root in &self.search_roots {
            trace!(candidate = %root.display(), "data root candidate");
            if has_domain_data(root) {
                return root.clone();
            }
        }

        let fallback = self
            .search_roots
            .first()
            .cloned()
            .unwrap_or_else(|| PathBuf::from("."));
        debug!(root = %fallback.display(), "未找到任何种类的默认数据，使用首个根目录");
        fallback
    }
}

pub fn has_domain_data(root: &Path) -> bool {
    all_kinds()
        .iter()
        .any(|kind| root.join(kind.domain()).join("json_data").is_dir())
}
