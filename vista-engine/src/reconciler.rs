//! 把一条视图配置推送到宿主场景图。
//!
//! 顺序固定：样式 → 标签可见性 → 相机 → 查找或创建视点 → 缩放并保存快照。
//! 已存在的视点会先被选中，未指定相机时沿用其保存的相机。
//! 同名重复应用只会更新已有视点，不会产生第二个。

use serde::Serialize;
use tracing::{debug, info};
use vista_core::model::{CameraType, ViewConfiguration, ViewTheme, names_match};
use vista_io::StyleLibrary;

use crate::camera;
use crate::errors::EngineError;
use crate::host::{BoundsScope, Camera, SceneHost, ViewpointId};
use crate::transaction::atomic;

pub const KIND_METADATA: &str = "kind";
pub const CAMERA_METADATA: &str = "camera_type";

/// 一次应用的结果。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedView {
    #[serde(skip)]
    pub id: ViewpointId,
    pub created: bool,
    pub record: ViewConfiguration,
}

#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    styles: StyleLibrary,
}

impl Reconciler {
    pub fn new(styles: StyleLibrary) -> Self {
        Self { styles }
    }

    /// 选择样式：磁盘上有资源则先导入（已存在则跳过），否则选用文档内同名样式。
    /// 无法解析的样式名直接跳过，返回 `None`。
    pub fn apply_style(
        &self,
        host: &mut dyn SceneHost,
        name: &str,
    ) -> Result<Option<String>, EngineError> {
        let live = host.list_styles();
        let present = live.iter().find(|style| names_match(style, name)).cloned();

        if let Some(path) = self.styles.resolve(name) {
            let selected = match present {
                Some(existing) => existing,
                None => {
                    if !host.import_style_file(&path)? {
                        debug!(style = name, path = %path.display(), "样式导入失败，跳过");
                        return Ok(None);
                    }
                    debug!(style = name, path = %path.display(), "已导入样式");
                    vista_io::styles::style_stem(&path)
                        .unwrap_or(name)
                        .to_string()
                }
            };
            host.select_style(&selected)?;
            return Ok(Some(selected));
        }

        match present {
            Some(existing) => {
                host.select_style(&existing)?;
                Ok(Some(existing))
            }
            None => {
                debug!(style = name, "样式不存在，跳过");
                Ok(None)
            }
        }
    }

    /// 全量替换可见标签：先隐藏全部，再只显示 `layers`。未知标签被忽略。
    pub fn apply_layers(
        &self,
        host: &mut dyn SceneHost,
        layers: &[String],
    ) -> Result<(), EngineError> {
        let tags = host.list_tags();
        for tag in &tags {
            host.set_tag_visible(tag, false)?;
        }
        for layer in layers {
            let matched = tags
                .iter()
                .find(|tag| *tag == layer)
                .or_else(|| tags.iter().find(|tag| names_match(tag, layer)));
            match matched {
                Some(tag) => host.set_tag_visible(tag, true)?,
                None => debug!(tag = %layer, "标签不存在，跳过"),
            }
        }
        Ok(())
    }

    pub fn apply_camera(
        &self,
        host: &mut dyn SceneHost,
        camera_type: CameraType,
    ) -> Result<Camera, EngineError> {
        let camera = camera::preset(camera_type, host.bounding_box(BoundsScope::Model));
        host.set_camera(camera)?;
        Ok(camera)
    }

    /// 按名称（大小写不敏感）查找视点，不存在则创建。返回 `(id, 是否新建)`。
    pub fn find_or_create(
        &self,
        host: &mut dyn SceneHost,
        name: &str,
    ) -> Result<(ViewpointId, bool), EngineError> {
        match host.find_viewpoint(name) {
            Some(id) => Ok((id, false)),
            None => Ok((host.create_viewpoint(name)?, true)),
        }
    }

    /// 只应用样式、标签与相机，不触碰视点。调用方负责校验。
    pub fn apply_theme(
        &self,
        host: &mut dyn SceneHost,
        theme: &dyn ViewTheme,
    ) -> Result<(), EngineError> {
        if let Some(style) = theme.style() {
            self.apply_style(host, style)?;
        }
        self.apply_layers(host, theme.active_layers())?;
        if let Some(camera_type) = theme.camera_type() {
            self.apply_camera(host, camera_type)?;
        }
        Ok(())
    }

    /// 不开启事务的完整应用流程，供已处于原子编辑内的调用方组合使用。
    pub fn reconcile(
        &self,
        host: &mut dyn SceneHost,
        config: &ViewConfiguration,
        domain: &str,
    ) -> Result<AppliedView, EngineError> {
        config.validate()?;
        // 已有视点先选中，恢复其保存的切面与相机，再覆盖主题
        let existing = host.find_viewpoint(&config.name);
        if let Some(id) = existing {
            host.select_viewpoint(id)?;
        }
        self.apply_theme(host, config)?;

        let (id, created) = match existing {
            Some(id) => (id, false),
            None => (host.create_viewpoint(&config.name)?, true),
        };
        host.set_viewpoint_metadata(id, KIND_METADATA, domain)?;
        if let Some(camera_type) = config.camera_type {
            host.set_viewpoint_metadata(id, CAMERA_METADATA, camera_type.as_str())?;
        }
        host.zoom_to_fit()?;
        host.update_viewpoint_snapshot(id)?;

        let mut record = config.clone();
        if let Some(state) = host.viewpoint(id) {
            record.name = state.name;
        }
        if record.id.is_empty() {
            record.id = record.name.clone();
        }
        info!(name = %record.name, created, domain, "已应用视图配置");
        Ok(AppliedView {
            id,
            created,
            record,
        })
    }

    /// 在单个原子编辑内执行 [`Reconciler::reconcile`]。
    pub fn apply(
        &self,
        host: &mut dyn SceneHost,
        config: &ViewConfiguration,
        domain: &str,
    ) -> Result<AppliedView, EngineError> {
        atomic(host, "Apply view configuration", |host| {
            self.reconcile(host, config, domain)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{FailPoint, MemoryHost};
    use std::fs;
    use std::path::PathBuf;

    fn demo_host() -> MemoryHost {
        let mut host = MemoryHost::new();
        host.populate_demo();
        host
    }

    fn config() -> ViewConfiguration {
        ViewConfiguration::new("Layout")
            .with_style("Planta")
            .with_camera(CameraType::TopOrtho)
            .with_layers(["walls", "furniture"])
    }

    #[test]
    fn applying_twice_keeps_one_viewpoint() {
        let mut host = demo_host();
        let reconciler = Reconciler::default();

        let first = reconciler.apply(&mut host, &config(), "plans").unwrap();
        let snapshot = host.viewpoint(first.id).unwrap();
        let second = reconciler.apply(&mut host, &config(), "plans").unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.id, second.id);
        assert_eq!(host.viewpoint_ids().len(), 1);
        assert_eq!(host.viewpoint(second.id).unwrap(), snapshot);
        assert_eq!(snapshot.style.as_deref(), Some("Planta"));
        assert_eq!(snapshot.visible_tags, vec!["furniture", "walls"]);
        assert_eq!(
            snapshot.metadata.get(CAMERA_METADATA).map(String::as_str),
            Some("top_ortho")
        );
    }

    #[test]
    fn layers_use_full_replace_semantics() {
        let mut host = demo_host();
        let reconciler = Reconciler::default();
        reconciler
            .apply_layers(&mut host, &["doors".to_string(), "missing".to_string()])
            .unwrap();
        assert_eq!(host.visible_tags(), vec!["doors"]);
        reconciler.apply_layers(&mut host, &["WALLS".to_string()]).unwrap();
        assert_eq!(host.visible_tags(), vec!["walls"]);
    }

    #[test]
    fn unknown_style_is_skipped() {
        let mut host = demo_host();
        let reconciler = Reconciler::default();
        let selected = reconciler.apply_style(&mut host, "Nonexistent").unwrap();
        assert!(selected.is_none());
        assert_eq!(host.active_style(), Some("Default"));
    }

    #[test]
    fn style_asset_is_imported_once() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Corte.style"), b"style").unwrap();
        let reconciler = Reconciler::new(StyleLibrary::new([PathBuf::from(dir.path())]));
        let mut host = demo_host();

        let selected = reconciler.apply_style(&mut host, "Corte").unwrap();
        assert_eq!(selected.as_deref(), Some("Corte"));
        reconciler.apply_style(&mut host, "corte").unwrap();
        let count = host
            .list_styles()
            .iter()
            .filter(|style| style.as_str() == "Corte")
            .count();
        assert_eq!(count, 1);
        assert_eq!(host.active_style(), Some("Corte"));
    }

    #[test]
    fn host_failure_rolls_back_everything() {
        let mut host = demo_host();
        host.fail_on(FailPoint::ZoomToFit);
        let before = host.state().clone();
        let err = Reconciler::default()
            .apply(&mut host, &config(), "plans")
            .unwrap_err();
        assert!(matches!(err, EngineError::Host(_)));
        assert_eq!(host.state(), &before);
    }

    #[test]
    fn empty_name_is_rejected_before_mutation() {
        let mut host = demo_host();
        let before = host.state().clone();
        let err = Reconciler::default()
            .apply(&mut host, &ViewConfiguration::new("  "), "plans")
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(host.state(), &before);
    }
}
