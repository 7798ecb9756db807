//! 楼层管理：从楼面标高与全局切高偏移派生底面/天花两种平面视图。
//!
//! 楼层列表以 JSON 字符串保存在文档属性 `levels` 上，不单独成文件。
//! 派生的切面按模板名（`Base`、`Ceiling_2`……）命名，视点在元数据里记录模板名，
//! 因此即使用户通过平面代码改了视点名，仍可重新定位与删除。

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};
use vista_core::geometry::Point3;
use vista_core::kind::{PlanKind, ViewKind};
use vista_core::model::{Level, LevelCut, ViewConfiguration, names_match};

use crate::camera;
use crate::context::{EngineSettings, SessionContext};
use crate::errors::EngineError;
use crate::host::{BoundsScope, SceneHost, ViewpointId};
use crate::reconciler::{AppliedView, KIND_METADATA, Reconciler};
use crate::registry::ViewConfigRegistry;
use crate::transaction::atomic;

pub const LEVELS_ATTRIBUTE: &str = "levels";
pub const CUT_OFFSET_ATTRIBUTE: &str = "level_cut_offset";
pub const PLAN_CODES_ATTRIBUTE: &str = "plan_codes";
pub const TEMPLATE_METADATA: &str = "template_name";

/// 带派生切高的楼层视图，供列表展示。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelView {
    pub number: u32,
    pub height_meters: f64,
    pub has_base: bool,
    pub has_ceiling: bool,
    pub base_cut_height: f64,
    pub ceiling_cut_height: f64,
    pub base_name: String,
    pub ceiling_name: String,
}

#[derive(Debug, Clone)]
pub struct LevelManager {
    settings: EngineSettings,
    reconciler: Reconciler,
    staged: Vec<ViewConfiguration>,
}

impl LevelManager {
    /// 使用平面种类的样式目录，并读取平面暂存配置作为楼层视图的主题来源。
    pub fn new(ctx: &SessionContext) -> Self {
        let plans = ViewConfigRegistry::new(PlanKind, ctx);
        let (staged, report) = plans.catalog(ctx);
        if !report.success {
            debug!(message = ?report.message, "平面暂存配置不可用");
        }
        Self {
            settings: ctx.settings.clone(),
            reconciler: plans.reconciler().clone(),
            staged,
        }
    }

    pub fn with_staged(mut self, staged: Vec<ViewConfiguration>) -> Self {
        self.staged = staged;
        self
    }

    /// 按楼层号排序的楼层记录。属性内容损坏时按空列表处理。
    pub fn levels(&self, host: &dyn SceneHost) -> Vec<Level> {
        let Some(raw) = host.document_attribute(LEVELS_ATTRIBUTE) else {
            return Vec::new();
        };
        match serde_json::from_str::<Vec<Level>>(&raw) {
            Ok(mut levels) => {
                levels.sort_by_key(|level| level.number);
                levels
            }
            Err(err) => {
                warn!(error = %err, "楼层属性无法解析，按空列表处理");
                Vec::new()
            }
        }
    }

    pub fn level_views(&self, host: &dyn SceneHost) -> Vec<LevelView> {
        let offset = self.cut_offset(host);
        let codes = self.plan_codes(host);
        self.levels(host)
            .into_iter()
            .map(|level| LevelView {
                number: level.number,
                height_meters: level.height_meters,
                has_base: level.has_base,
                has_ceiling: level.has_ceiling,
                base_cut_height: level.base_cut_height(offset),
                ceiling_cut_height: level.ceiling_cut_height(offset),
                base_name: live_name(&codes, &level.template_name(LevelCut::Base)),
                ceiling_name: live_name(&codes, &level.template_name(LevelCut::Ceiling)),
            })
            .collect()
    }

    /// 文档上保存的切高偏移，缺省为配置值。
    pub fn cut_offset(&self, host: &dyn SceneHost) -> f64 {
        host.document_attribute(CUT_OFFSET_ATTRIBUTE)
            .and_then(|raw| raw.trim().parse::<f64>().ok())
            .filter(|value| value.is_finite())
            .unwrap_or(self.settings.cut_offset)
    }

    /// 模板名 → 实际视点名。
    pub fn plan_codes(&self, host: &dyn SceneHost) -> BTreeMap<String, String> {
        host.document_attribute(PLAN_CODES_ATTRIBUTE)
            .and_then(|raw| match serde_json::from_str(&raw) {
                Ok(codes) => Some(codes),
                Err(err) => {
                    warn!(error = %err, "平面代码属性无法解析");
                    None
                }
            })
            .unwrap_or_default()
    }

    /// 新增楼层；与已有楼层标高相差在容差内时改为更新该楼层。
    pub fn add_level(
        &self,
        host: &mut dyn SceneHost,
        height_meters: f64,
    ) -> Result<Level, EngineError> {
        if !height_meters.is_finite() {
            return Err(EngineError::Validation(format!(
                "level height must be a finite number, got {height_meters}"
            )));
        }
        require_document(host)?;

        let mut levels = self.levels(host);
        let tolerance = self.settings.height_tolerance;
        let existing = levels
            .iter()
            .position(|level| (level.height_meters - height_meters).abs() < tolerance);

        let offset = self.cut_offset(host);
        let codes = self.plan_codes(host);
        let level = atomic(host, "Add level", |host| {
            let index = match existing {
                Some(index) => {
                    levels[index].height_meters = height_meters;
                    let level = levels[index].clone();
                    for cut in LevelCut::BOTH {
                        if level.is_materialized(cut) {
                            self.materialize(host, &level, cut, offset, &codes)?;
                        }
                    }
                    index
                }
                None => {
                    let number = levels.iter().map(|level| level.number).max().unwrap_or(0) + 1;
                    levels.push(Level::new(number, height_meters));
                    levels.len() - 1
                }
            };
            let level = levels[index].clone();
            save_levels(host, &levels)?;
            Ok(level)
        })?;

        info!(
            number = level.number,
            height = level.height_meters,
            updated = existing.is_some(),
            "已保存楼层"
        );
        Ok(level)
    }

    pub fn create_base_scene(
        &self,
        host: &mut dyn SceneHost,
        number: u32,
    ) -> Result<AppliedView, EngineError> {
        self.create_scene(host, number, LevelCut::Base)
    }

    pub fn create_ceiling_scene(
        &self,
        host: &mut dyn SceneHost,
        number: u32,
    ) -> Result<AppliedView, EngineError> {
        self.create_scene(host, number, LevelCut::Ceiling)
    }

    /// 创建或更新楼层的底面/天花视图，可重复调用。
    pub fn create_scene(
        &self,
        host: &mut dyn SceneHost,
        number: u32,
        cut: LevelCut,
    ) -> Result<AppliedView, EngineError> {
        require_document(host)?;
        let mut levels = self.levels(host);
        let index = levels
            .iter()
            .position(|level| level.number == number)
            .ok_or_else(|| EngineError::not_found("level", number.to_string()))?;

        let offset = self.cut_offset(host);
        let codes = self.plan_codes(host);
        let label = match cut {
            LevelCut::Base => "Create base scene",
            LevelCut::Ceiling => "Create ceiling scene",
        };
        atomic(host, label, |host| {
            let applied = self.materialize(host, &levels[index], cut, offset, &codes)?;
            levels[index].set_materialized(cut, true);
            save_levels(host, &levels)?;
            Ok(applied)
        })
    }

    /// 删除楼层及其派生的视点与切面。
    pub fn remove_level(
        &self,
        host: &mut dyn SceneHost,
        number: u32,
    ) -> Result<Level, EngineError> {
        let mut levels = self.levels(host);
        let index = levels
            .iter()
            .position(|level| level.number == number)
            .ok_or_else(|| EngineError::not_found("level", number.to_string()))?;
        require_document(host)?;

        let mut codes = self.plan_codes(host);
        let removed = levels.remove(index);
        atomic(host, "Remove level", |host| {
            for cut in LevelCut::BOTH {
                let template = removed.template_name(cut);
                if let Some(id) = find_level_viewpoint(host, &template, &live_name(&codes, &template))
                {
                    host.erase_viewpoint(id)?;
                }
                if let Some(plane) = host.find_cutting_plane(&template) {
                    host.erase_cutting_plane(plane)?;
                }
                // 楼层号会被复用，映射随楼层一起删除
                codes.remove(&template);
            }
            save_plan_codes(host, &codes)?;
            save_levels(host, &levels)
        })?;

        info!(number, "已删除楼层");
        Ok(removed)
    }

    /// 修改全局切高偏移，并在同一原子编辑内重新派生所有已生成的切面。
    pub fn set_cut_offset(
        &self,
        host: &mut dyn SceneHost,
        cut_offset: f64,
    ) -> Result<usize, EngineError> {
        if !cut_offset.is_finite() {
            return Err(EngineError::Validation(format!(
                "cut offset must be a finite number, got {cut_offset}"
            )));
        }
        require_document(host)?;

        let levels = self.levels(host);
        let codes = self.plan_codes(host);
        let refreshed = atomic(host, "Set cut offset", |host| {
            host.set_document_attribute(CUT_OFFSET_ATTRIBUTE, &cut_offset.to_string())?;
            let mut refreshed = 0;
            for level in &levels {
                for cut in LevelCut::BOTH {
                    if level.is_materialized(cut) {
                        self.materialize(host, level, cut, cut_offset, &codes)?;
                        refreshed += 1;
                    }
                }
            }
            Ok(refreshed)
        })?;

        info!(cut_offset, refreshed, "已更新切高偏移");
        Ok(refreshed)
    }

    /// 为模板名设置实际视点名；空代码表示取消映射。已生成的视图立即按新名称重建。
    pub fn set_plan_code(
        &self,
        host: &mut dyn SceneHost,
        template: &str,
        code: &str,
    ) -> Result<BTreeMap<String, String>, EngineError> {
        let levels = self.levels(host);
        let target = levels.iter().find_map(|level| {
            LevelCut::BOTH
                .into_iter()
                .find(|cut| names_match(&level.template_name(*cut), template))
                .map(|cut| (level.clone(), cut))
        });
        let Some((level, cut)) = target else {
            return Err(EngineError::not_found("level template", template));
        };
        require_document(host)?;

        let template = level.template_name(cut);
        let code = code.trim();
        let mut codes = self.plan_codes(host);
        if code.is_empty() || code == template {
            codes.remove(&template);
        } else {
            codes.insert(template.clone(), code.to_string());
        }

        let offset = self.cut_offset(host);
        atomic(host, "Set plan code", |host| {
            save_plan_codes(host, &codes)?;
            if level.is_materialized(cut) {
                self.materialize(host, &level, cut, offset, &codes)?;
            }
            Ok(())
        })?;
        Ok(codes)
    }

    /// 切面 → 相机 → 视点 → 主题 → 快照，不开启事务。
    fn materialize(
        &self,
        host: &mut dyn SceneHost,
        level: &Level,
        cut: LevelCut,
        cut_offset: f64,
        codes: &BTreeMap<String, String>,
    ) -> Result<AppliedView, EngineError> {
        let template = level.template_name(cut);
        let name = live_name(codes, &template);
        let bounds = host.bounding_box(BoundsScope::Model);
        let center = bounds.map(|b| b.center()).unwrap_or_else(Point3::origin);
        let position = Point3::new(center.x(), center.y(), level.cut_height(cut, cut_offset));

        let mut existing = find_level_viewpoint(host, &template, &name);
        if let Some(id) = existing {
            let current = host.viewpoint(id).map(|state| state.name).unwrap_or_default();
            if current == name {
                host.select_viewpoint(id)?;
            } else {
                debug!(from = %current, to = %name, "视点名随平面代码变化，重建视点");
                host.erase_viewpoint(id)?;
                existing = None;
            }
        }

        let plane = match host.find_cutting_plane(&template) {
            Some(plane) => {
                host.update_cutting_plane(plane, position, cut.normal())?;
                plane
            }
            None => host.add_cutting_plane(&template, position, cut.normal())?,
        };
        host.activate_cutting_plane(Some(plane))?;
        host.set_camera(camera::level_camera(cut, bounds))?;

        // 没有暂存配置时保留当前样式与标签
        let theme = self.staged_theme(&template, &name, cut);
        if let Some(theme) = &theme {
            self.reconciler.apply_theme(host, theme)?;
        }

        let (id, created) = match existing {
            Some(id) => (id, false),
            None => (host.create_viewpoint(&name)?, true),
        };
        host.set_viewpoint_metadata(id, TEMPLATE_METADATA, &template)?;
        host.set_viewpoint_metadata(id, KIND_METADATA, PlanKind.domain())?;
        host.zoom_to_fit()?;
        host.update_viewpoint_snapshot(id)?;

        debug!(template = %template, name = %name, created, "已生成楼层视图");
        Ok(AppliedView {
            id,
            created,
            record: ViewConfiguration {
                id: name.clone(),
                name,
                ..theme.unwrap_or_default()
            },
        })
    }

    /// 暂存配置按实际名、模板名、通用名依次查找。相机由楼层决定，不取暂存值。
    fn staged_theme(&self, template: &str, name: &str, cut: LevelCut) -> Option<ViewConfiguration> {
        [name, template, cut.generic_name()]
            .into_iter()
            .find_map(|candidate| self.staged.iter().find(|entry| entry.is_named(candidate)))
            .map(|entry| ViewConfiguration {
                camera_type: None,
                ..entry.clone()
            })
    }
}

fn live_name(codes: &BTreeMap<String, String>, template: &str) -> String {
    codes
        .get(template)
        .cloned()
        .unwrap_or_else(|| template.to_string())
}

fn find_level_viewpoint(host: &dyn SceneHost, template: &str, name: &str) -> Option<ViewpointId> {
    host.find_viewpoint_by_metadata(TEMPLATE_METADATA, template)
        .or_else(|| host.find_viewpoint(name))
}

fn save_levels(host: &mut dyn SceneHost, levels: &[Level]) -> Result<(), EngineError> {
    let encoded =
        serde_json::to_string(levels).map_err(|err| EngineError::Validation(err.to_string()))?;
    host.set_document_attribute(LEVELS_ATTRIBUTE, &encoded)?;
    Ok(())
}

fn save_plan_codes(
    host: &mut dyn SceneHost,
    codes: &BTreeMap<String, String>,
) -> Result<(), EngineError> {
    let encoded =
        serde_json::to_string(codes).map_err(|err| EngineError::Validation(err.to_string()))?;
    host.set_document_attribute(PLAN_CODES_ATTRIBUTE, &encoded)?;
    Ok(())
}

fn require_document(host: &dyn SceneHost) -> Result<(), EngineError> {
    if host.has_active_document() {
        Ok(())
    } else {
        Err(EngineError::HostState("no active document".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryHost;
    use std::time::Duration;
    use vista_io::JsonStore;

    fn manager(dir: &std::path::Path) -> LevelManager {
        let settings = EngineSettings {
            cache_ttl: Duration::ZERO,
            ..EngineSettings::default()
        };
        LevelManager::new(&SessionContext::new(JsonStore::new(dir, dir), settings))
    }

    fn demo_host() -> MemoryHost {
        let mut host = MemoryHost::new();
        host.populate_demo();
        host
    }

    #[test]
    fn numbers_grow_from_one() {
        let dir = tempfile::tempdir().unwrap();
        let levels = manager(dir.path());
        let mut host = demo_host();
        assert_eq!(levels.add_level(&mut host, 0.0).unwrap().number, 1);
        assert_eq!(levels.add_level(&mut host, 2.9).unwrap().number, 2);
        assert_eq!(levels.add_level(&mut host, 2.895).unwrap().number, 2);
        assert_eq!(levels.levels(&host).len(), 2);
    }

    #[test]
    fn corrupt_attribute_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let levels = manager(dir.path());
        let mut host = demo_host();
        host.set_document_attribute(LEVELS_ATTRIBUTE, "not json").unwrap();
        assert!(levels.levels(&host).is_empty());
        assert!((levels.cut_offset(&host) - 1.45).abs() < 1e-12);
    }

    #[test]
    fn staged_theme_ignores_camera() {
        let dir = tempfile::tempdir().unwrap();
        let levels = manager(dir.path()).with_staged(vec![
            ViewConfiguration::new("Base")
                .with_style("Planta")
                .with_camera(vista_core::model::CameraType::IsoPersp),
        ]);
        let theme = levels
            .staged_theme("Base_2", "Base_2", LevelCut::Base)
            .expect("generic fallback");
        assert_eq!(theme.style, "Planta");
        assert!(theme.camera_type.is_none());
        assert!(levels.staged_theme("Ceiling", "Ceiling", LevelCut::Ceiling).is_none());
    }

    #[test]
    fn non_finite_height_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let levels = manager(dir.path());
        let mut host = demo_host();
        assert!(matches!(
            levels.add_level(&mut host, f64::NAN),
            Err(EngineError::Validation(_))
        ));
    }
}
