use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};
use walkdir::WalkDir;

const STYLE_EXTENSION: &str = "style";

/// 在若干样式目录中查找 `<name>.style` 资源文件。
#[derive(Debug, Clone, Default)]
pub struct StyleLibrary {
    search_roots: Vec<PathBuf>,
}

impl StyleLibrary {
    pub fn new<I>(roots: I) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        // 去重，保持靠前优先级。
        let mut deduped: Vec<PathBuf> = Vec::new();
        for root in roots {
            if !deduped.iter().any(|existing| existing == &root) {
                deduped.push(root);
            }
        }
        Self {
            search_roots: deduped,
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.search_roots
    }

    /// 解析样式名到资源文件。名称含路径分隔符时拒绝解析。
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        let name = name.trim();
        if name.is_empty() || name.contains(['/', '\\']) || name == ".." {
            return None;
        }

        for root in self.search_roots.iter().filter(|root| root.is_dir()) {
            let candidate = root.join(format!("{name}.{STYLE_EXTENSION}"));
            trace!(candidate = %candidate.display(), "style library candidate");
            if candidate.is_file() {
                return Some(candidate);
            }
        }

        // 子目录与大小写不一致的文件名
        for root in self.search_roots.iter().filter(|root| root.is_dir()) {
            let found = style_files(root).find(|path| {
                style_stem(path).is_some_and(|stem| stem.eq_ignore_ascii_case(name))
            });
            if found.is_some() {
                return found;
            }
        }

        debug!(style = name, "样式资源未找到");
        None
    }

    /// 列出所有可用样式名，排序且去重。
    pub fn available(&self) -> Vec<String> {
        let mut names = BTreeSet::new();
        for root in self.search_roots.iter().filter(|root| root.is_dir()) {
            for path in style_files(root) {
                if let Some(stem) = style_stem(&path) {
                    names.insert(stem.to_string());
                }
            }
        }
        names.into_iter().collect()
    }
}

fn style_files(root: &Path) -> impl Iterator<Item = PathBuf> + use<> {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(STYLE_EXTENSION))
        })
}

/// 样式文件名（不含扩展名）。
pub fn style_stem(path: &Path) -> Option<&str> {
    path.file_stem().and_then(|stem| stem.to_str())
}
