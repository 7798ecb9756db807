use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;
use vista_core::kind::{CatalogKind, ViewKind};
use vista_core::model::{
    CameraType, ViewConfiguration, ViewTheme, ensure_unique_names, normalize_layers,
};
use vista_io::{IoError, load_external_file};

use crate::context::{LoadReport, SessionContext};
use crate::errors::EngineError;
use crate::host::{SceneHost, ViewpointId, ViewpointState};
use crate::reconciler::{AppliedView, CAMERA_METADATA, Reconciler};
use crate::transaction::atomic;

static LEVEL_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(base|ceiling)_?(\d+)?$").expect("valid level suffix regex"));

/// 从 `Base_2` / `ceiling3` 这类视点名中取出楼层号。
pub fn level_suffix(name: &str) -> Option<u32> {
    LEVEL_SUFFIX_RE
        .captures(name.trim())
        .and_then(|caps| caps.get(2))
        .and_then(|number| number.as_str().parse().ok())
}

/// 新增或更新视图时的输入。`None` 字段在更新时保持原值。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewParams {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub camera_type: Option<CameraType>,
    #[serde(default)]
    pub active_layers: Option<Vec<String>>,
}

impl ViewParams {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    fn into_configuration(self) -> ViewConfiguration {
        let name = self.name.trim().to_string();
        ViewConfiguration {
            id: name.clone(),
            name,
            style: self.style.unwrap_or_default(),
            camera_type: self.camera_type,
            active_layers: normalize_layers(self.active_layers.unwrap_or_default()),
        }
    }
}

/// 由视点快照还原出配置记录。
pub fn record_from_state(state: &ViewpointState) -> ViewConfiguration {
    ViewConfiguration {
        id: state.name.clone(),
        name: state.name.clone(),
        style: state.style.clone().unwrap_or_default(),
        camera_type: state
            .metadata
            .get(CAMERA_METADATA)
            .and_then(|value| value.parse().ok()),
        active_layers: state.visible_tags.clone(),
    }
}

/// 按种类参数化的视图配置注册表。
///
/// `list` 读取宿主中的实时视点；JSON 文件只是暂存目录，见 [`ViewConfigRegistry::catalog`]。
#[derive(Debug, Clone)]
pub struct ViewConfigRegistry<K: ViewKind> {
    kind: K,
    reconciler: Reconciler,
}

impl<K: ViewKind> ViewConfigRegistry<K> {
    pub fn new(kind: K, ctx: &SessionContext) -> Self {
        let reconciler = Reconciler::new(ctx.styles_for(&kind));
        Self {
            kind,
            reconciler,
        }
    }

    #[inline]
    pub fn kind(&self) -> &K {
        &self.kind
    }

    #[inline]
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn list(&self, host: &dyn SceneHost) -> Vec<ViewConfiguration> {
        host.viewpoint_ids()
            .into_iter()
            .filter_map(|id| host.viewpoint(id))
            .map(|state| record_from_state(&state))
            .collect()
    }

    pub fn add(
        &self,
        host: &mut dyn SceneHost,
        params: ViewParams,
    ) -> Result<AppliedView, EngineError> {
        let config = params.into_configuration();
        config.validate()?;
        require_document(host)?;
        if host.find_viewpoint(&config.name).is_some() {
            return Err(EngineError::duplicate("viewpoint", config.name));
        }
        self.reconciler.apply(host, &config, self.kind.domain())
    }

    /// 重新应用给定字段，不支持改名。
    pub fn update(
        &self,
        host: &mut dyn SceneHost,
        name: &str,
        params: ViewParams,
    ) -> Result<AppliedView, EngineError> {
        let (_, current) = self.live(host, name)?;
        let requested = params.name.trim();
        if !requested.is_empty() && !current.is_named(requested) {
            return Err(EngineError::Validation(format!(
                "cannot rename `{}` to `{requested}`; create a new configuration instead",
                current.name
            )));
        }

        let config = ViewConfiguration {
            id: current.name.clone(),
            name: current.name.clone(),
            style: params.style.unwrap_or(current.style),
            camera_type: params.camera_type.or(current.camera_type),
            active_layers: params
                .active_layers
                .map(normalize_layers)
                .unwrap_or(current.active_layers),
        };
        self.reconciler.apply(host, &config, self.kind.domain())
    }

    pub fn delete(
        &self,
        host: &mut dyn SceneHost,
        name: &str,
    ) -> Result<ViewConfiguration, EngineError> {
        let (id, record) = self.live(host, name)?;
        atomic(host, "Delete viewpoint", |host| {
            host.erase_viewpoint(id)?;
            Ok(())
        })?;
        info!(name = %record.name, domain = self.kind.domain(), "已删除视点");
        Ok(record)
    }

    /// 新建或更新：UI 动作的统一入口。
    ///
    /// 当前选中视点名带楼层号（`Base_2`、`ceiling3`）时，目标名追加 `_<n>`。
    pub fn apply_config(
        &self,
        host: &mut dyn SceneHost,
        name: &str,
        config: &ViewConfiguration,
    ) -> Result<AppliedView, EngineError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::Validation("name must not be empty".into()));
        }
        require_document(host)?;

        let target = match self.selected_level(host) {
            Some(number) if level_suffix(name).is_none() => format!("{name}_{number}"),
            _ => name.to_string(),
        };
        let mut resolved = config.clone();
        resolved.id = target.clone();
        resolved.name = target;

        atomic(host, "Apply configuration", |host| {
            host.unhide_all()?;
            self.reconciler
                .reconcile(host, &resolved, self.kind.domain())
        })
    }

    fn selected_level(&self, host: &dyn SceneHost) -> Option<u32> {
        let selected = host.selected_viewpoint()?;
        let state = host.viewpoint(selected)?;
        level_suffix(&state.name)
    }

    fn live(
        &self,
        host: &dyn SceneHost,
        name: &str,
    ) -> Result<(ViewpointId, ViewConfiguration), EngineError> {
        host.find_viewpoint(name)
            .and_then(|id| host.viewpoint(id).map(|state| (id, record_from_state(&state))))
            .ok_or_else(|| EngineError::not_found("viewpoint", name))
    }
}

impl<K: CatalogKind> ViewConfigRegistry<K> {
    /// 读取暂存目录。加载失败时返回空列表并在报告中标记。
    pub fn catalog(&self, ctx: &SessionContext) -> (Vec<ViewConfiguration>, LoadReport) {
        let root_key = self.kind.root_key();
        let (entries, outcome) = ctx.store().load_decoded(&self.kind, |value| {
            let entries = value
                .get(root_key)
                .cloned()
                .unwrap_or(Value::Array(Vec::new()));
            parse_entries(entries).map_err(|err| err.to_string())
        });
        let report = LoadReport::from(&outcome);
        (entries, report)
    }

    pub fn save_catalog(
        &self,
        ctx: &SessionContext,
        entries: &[ViewConfiguration],
    ) -> Result<PathBuf, EngineError> {
        for entry in entries {
            entry.validate()?;
        }
        ensure_unique_names(entries.iter().map(|entry| entry.name.as_str()))?;
        let value = json!({ self.kind.root_key(): entries });
        Ok(ctx.store().save_kind(&self.kind, &value)?)
    }

    /// 导入外部文件，通过结构校验后写为用户文件。
    pub fn import_catalog(
        &self,
        ctx: &SessionContext,
        path: &Path,
    ) -> Result<Vec<ViewConfiguration>, EngineError> {
        let value = load_external_file(path, &self.kind)?;
        let entries = value
            .get(self.kind.root_key())
            .cloned()
            .unwrap_or(Value::Array(Vec::new()));
        let entries = parse_entries(entries)?;
        self.save_catalog(ctx, &entries)?;
        info!(path = %path.display(), count = entries.len(), "已导入暂存配置");
        Ok(entries)
    }

    pub fn apply_catalog_entry(
        &self,
        host: &mut dyn SceneHost,
        ctx: &SessionContext,
        name: &str,
    ) -> Result<AppliedView, EngineError> {
        let (entries, _) = self.catalog(ctx);
        let entry = entries
            .into_iter()
            .find(|entry| entry.is_named(name))
            .ok_or_else(|| EngineError::not_found("catalog entry", name))?;
        self.apply_config(host, &entry.name, &entry)
    }
}

fn parse_entries(value: Value) -> Result<Vec<ViewConfiguration>, IoError> {
    let mut entries: Vec<ViewConfiguration> = serde_json::from_value(value)
        .map_err(|err| IoError::InvalidDocument(format!("invalid configuration entry: {err}")))?;
    for entry in &mut entries {
        if entry.id.is_empty() {
            entry.id = entry.name.clone();
        }
    }
    Ok(entries)
}

fn require_document(host: &dyn SceneHost) -> Result<(), EngineError> {
    if host.has_active_document() {
        Ok(())
    } else {
        Err(EngineError::HostState("no active document".into()))
    }
}
