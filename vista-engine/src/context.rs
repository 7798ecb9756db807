use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::debug;
use vista_core::kind::{SectionKind, ViewKind};
use vista_core::model::SectionDocument;
use vista_io::{IoError, JsonStore, LoadOutcome, SourceTier, StyleLibrary};

use crate::errors::EngineError;

const SHARED_STYLES_DIR: &str = "styles";

/// 引擎层设置，由前端从应用配置映射而来。
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// 全局切高偏移（米）。
    pub cut_offset: f64,
    /// 按标高去重的容差（米）。
    pub height_tolerance: f64,
    /// 剖切面超出包围盒表面的距离（米）。
    pub extend_distance: f64,
    pub standard_tag: String,
    pub cache_ttl: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            cut_offset: 1.45,
            height_tolerance: 0.01,
            extend_distance: 1.0,
            standard_tag: "SECTIONS".to_string(),
            cache_ttl: Duration::from_secs(30),
        }
    }
}

/// 一次加载所用的层级与诊断信息。
#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport {
    pub tier: SourceTier,
    pub success: bool,
    pub message: Option<String>,
}

impl From<&LoadOutcome> for LoadReport {
    fn from(outcome: &LoadOutcome) -> Self {
        Self {
            tier: outcome.tier.clone(),
            success: outcome.success,
            message: outcome.message.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedSections {
    loaded_at: Instant,
    document: SectionDocument,
    report: LoadReport,
}

/// 会话上下文：每个会话构造一次，显式传入每个操作。
#[derive(Debug)]
pub struct SessionContext {
    pub settings: EngineSettings,
    store: JsonStore,
    sections: Option<CachedSections>,
}

impl SessionContext {
    pub fn new(store: JsonStore, settings: EngineSettings) -> Self {
        Self {
            settings,
            store,
            sections: None,
        }
    }

    #[inline]
    pub fn store(&self) -> &JsonStore {
        &self.store
    }

    /// 种类专属样式目录优先，其次为插件根目录下的共享样式目录。
    pub fn styles_for(&self, kind: &dyn ViewKind) -> StyleLibrary {
        StyleLibrary::new([
            self.store.styles_path(kind),
            self.store.plugin_root().join(SHARED_STYLES_DIR),
        ])
    }

    /// 读取剖面分组文档，TTL 内复用缓存。
    pub fn section_document(&mut self) -> (SectionDocument, LoadReport) {
        if let Some(cached) = &self.sections {
            if cached.loaded_at.elapsed() < self.settings.cache_ttl {
                debug!("复用剖面分组缓存");
                return (cached.document.clone(), cached.report.clone());
            }
        }

        let (document, outcome) = self.store.load_decoded(&SectionKind, |value| {
            serde_json::from_value::<SectionDocument>(value.clone())
                .map_err(|err| format!("invalid section document: {err}"))
        });
        let report = LoadReport::from(&outcome);

        self.sections = Some(CachedSections {
            loaded_at: Instant::now(),
            document: document.clone(),
            report: report.clone(),
        });
        (document, report)
    }

    pub fn save_section_document(
        &mut self,
        document: &SectionDocument,
    ) -> Result<PathBuf, EngineError> {
        let value = serde_json::to_value(document).map_err(IoError::EncodeError)?;
        self.invalidate_cache();
        Ok(self.store.save_kind(&SectionKind, &value)?)
    }

    pub fn invalidate_cache(&mut self) {
        self.sections = None;
    }
}
