use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;
use vista_core::geometry::{Bounds3D, Point3, Vector3};
use vista_core::model::names_match;

use crate::host::{
    BoundsScope, Camera, CuttingPlaneState, HostError, PlaneId, SceneHost, ViewpointFlags,
    ViewpointId, ViewpointState,
};

/// 可被注入失败的宿主操作，用于验证事务回滚。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    AddCuttingPlane,
    CreateViewpoint,
    EraseViewpoint,
    SelectStyle,
    SetCamera,
    SetTagVisible,
    SetAttribute,
    UpdateSnapshot,
    ZoomToFit,
}

impl FailPoint {
    fn operation(self) -> &'static str {
        match self {
            FailPoint::AddCuttingPlane => "add_cutting_plane",
            FailPoint::CreateViewpoint => "create_viewpoint",
            FailPoint::EraseViewpoint => "erase_viewpoint",
            FailPoint::SelectStyle => "select_style",
            FailPoint::SetCamera => "set_camera",
            FailPoint::SetTagVisible => "set_tag_visible",
            FailPoint::SetAttribute => "set_document_attribute",
            FailPoint::UpdateSnapshot => "update_viewpoint_snapshot",
            FailPoint::ZoomToFit => "zoom_to_fit",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaneRecord {
    pub id: PlaneId,
    pub state: CuttingPlaneState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewpointRecord {
    pub id: ViewpointId,
    pub state: ViewpointState,
}

/// 内存场景图的完整状态，可序列化为宿主快照文件。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryState {
    #[serde(default = "MemoryState::default_has_document")]
    pub has_document: bool,
    #[serde(default)]
    pub model_bounds: Option<Bounds3D>,
    #[serde(default)]
    pub selection_bounds: Option<Bounds3D>,
    /// 标签名 → 是否可见。
    #[serde(default)]
    pub tags: BTreeMap<String, bool>,
    #[serde(default)]
    pub styles: Vec<String>,
    #[serde(default)]
    pub active_style: Option<String>,
    #[serde(default)]
    pub camera: Option<Camera>,
    #[serde(default)]
    pub hidden_entities: usize,
    #[serde(default)]
    pub planes: Vec<PlaneRecord>,
    #[serde(default)]
    pub active_plane: Option<PlaneId>,
    #[serde(default)]
    pub viewpoints: Vec<ViewpointRecord>,
    #[serde(default)]
    pub selected_viewpoint: Option<ViewpointId>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub zoom_extents: u32,
    #[serde(default)]
    pub next_id: u64,
}

impl MemoryState {
    fn default_has_document() -> bool {
        true
    }
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            has_document: true,
            model_bounds: None,
            selection_bounds: None,
            tags: BTreeMap::new(),
            styles: Vec::new(),
            active_style: None,
            camera: None,
            hidden_entities: 0,
            planes: Vec::new(),
            active_plane: None,
            viewpoints: Vec::new(),
            selected_viewpoint: None,
            attributes: BTreeMap::new(),
            zoom_extents: 0,
            next_id: 0,
        }
    }
}

/// 演示模型的关键信息。
#[derive(Debug, Clone)]
pub struct DemoModel {
    pub bounds: Bounds3D,
    pub tags: Vec<String>,
    pub styles: Vec<String>,
}

/// 内存实现的宿主场景图：CLI 演示与测试共用。
///
/// 原子编辑以整份状态快照实现，`abort_atomic_edit` 恢复到 `begin` 之前。
#[derive(Debug, Default)]
pub struct MemoryHost {
    state: MemoryState,
    pending: Option<(String, MemoryState)>,
    committed: Vec<String>,
    fail_on: Option<FailPoint>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: MemoryState) -> Self {
        Self {
            state,
            ..Self::default()
        }
    }

    /// 没有活动文档的宿主，所有修改都会失败。
    pub fn without_document() -> Self {
        Self::with_state(MemoryState {
            has_document: false,
            ..MemoryState::default()
        })
    }

    /// 以 10×10×3 米、中心在原点的模型填充演示场景。
    pub fn populate_demo(&mut self) -> DemoModel {
        let bounds = Bounds3D::from_center(Point3::origin(), Vector3::new(10.0, 10.0, 3.0));
        let tags = ["walls", "doors", "furniture", "ceiling", "electrical", "annotations"]
            .map(String::from)
            .to_vec();
        let styles = ["Default", "Planta"].map(String::from).to_vec();

        self.state.model_bounds = Some(bounds);
        for tag in &tags {
            self.state.tags.insert(tag.clone(), true);
        }
        for style in &styles {
            if !self.state.styles.iter().any(|s| s == style) {
                self.state.styles.push(style.clone());
            }
        }
        self.state.active_style = Some("Default".to_string());

        debug!(tags = tags.len(), styles = styles.len(), "已创建演示模型");
        DemoModel {
            bounds,
            tags,
            styles,
        }
    }

    #[inline]
    pub fn state(&self) -> &MemoryState {
        &self.state
    }

    #[inline]
    pub fn into_state(self) -> MemoryState {
        self.state
    }

    pub fn set_model_bounds(&mut self, bounds: Option<Bounds3D>) {
        self.state.model_bounds = bounds;
    }

    pub fn set_selection_bounds(&mut self, bounds: Option<Bounds3D>) {
        self.state.selection_bounds = bounds;
    }

    pub fn add_tag(&mut self, name: &str, visible: bool) {
        self.state.tags.insert(name.to_string(), visible);
    }

    pub fn hide_entities(&mut self, count: usize) {
        self.state.hidden_entities += count;
    }

    /// 下一次调用指定操作时返回错误（只触发一次）。
    pub fn fail_on(&mut self, point: FailPoint) {
        self.fail_on = Some(point);
    }

    /// 已提交的原子编辑标签，按提交顺序。
    pub fn committed(&self) -> &[String] {
        &self.committed
    }

    #[inline]
    pub fn in_transaction(&self) -> bool {
        self.pending.is_some()
    }

    pub fn visible_tags(&self) -> Vec<String> {
        self.state
            .tags
            .iter()
            .filter(|(_, visible)| **visible)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn active_style(&self) -> Option<&str> {
        self.state.active_style.as_deref()
    }

    pub fn camera(&self) -> Option<Camera> {
        self.state.camera
    }

    pub fn active_plane(&self) -> Option<PlaneId> {
        self.state.active_plane
    }

    pub fn viewpoint_by_name(&self, name: &str) -> Option<&ViewpointState> {
        self.state
            .viewpoints
            .iter()
            .find(|record| names_match(&record.state.name, name))
            .map(|record| &record.state)
    }

    pub fn plane_by_name(&self, name: &str) -> Option<&CuttingPlaneState> {
        self.state
            .planes
            .iter()
            .find(|record| record.state.name == name)
            .map(|record| &record.state)
    }

    fn check(&mut self, point: FailPoint) -> Result<(), HostError> {
        if !self.state.has_document {
            return Err(HostError::NoActiveDocument);
        }
        if self.fail_on == Some(point) {
            self.fail_on = None;
            return Err(HostError::OperationFailed {
                operation: point.operation().to_string(),
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn require_document(&self) -> Result<(), HostError> {
        if self.state.has_document {
            Ok(())
        } else {
            Err(HostError::NoActiveDocument)
        }
    }

    fn next_id(&mut self) -> u64 {
        self.state.next_id += 1;
        self.state.next_id
    }

    fn viewpoint_mut(&mut self, id: ViewpointId) -> Result<&mut ViewpointState, HostError> {
        self.state
            .viewpoints
            .iter_mut()
            .find(|record| record.id == id)
            .map(|record| &mut record.state)
            .ok_or(HostError::UnknownViewpoint(id.get()))
    }

    fn plane_mut(&mut self, id: PlaneId) -> Result<&mut CuttingPlaneState, HostError> {
        self.state
            .planes
            .iter_mut()
            .find(|record| record.id == id)
            .map(|record| &mut record.state)
            .ok_or(HostError::UnknownPlane(id.get()))
    }

    fn plane_name(&self, id: PlaneId) -> Option<String> {
        self.state
            .planes
            .iter()
            .find(|record| record.id == id)
            .map(|record| record.state.name.clone())
    }
}

impl SceneHost for MemoryHost {
    fn has_active_document(&self) -> bool {
        self.state.has_document
    }

    fn bounding_box(&self, scope: BoundsScope) -> Option<Bounds3D> {
        let bounds = match scope {
            BoundsScope::Model => self.state.model_bounds,
            BoundsScope::Selection => self.state.selection_bounds,
        };
        bounds.filter(|bounds| !bounds.is_empty())
    }

    fn add_cutting_plane(
        &mut self,
        name: &str,
        position: Point3,
        normal: Vector3,
    ) -> Result<PlaneId, HostError> {
        self.check(FailPoint::AddCuttingPlane)?;
        let id = PlaneId::new(self.next_id());
        self.state.planes.push(PlaneRecord {
            id,
            state: CuttingPlaneState {
                name: name.to_string(),
                position,
                normal,
                tag: None,
            },
        });
        Ok(id)
    }

    fn update_cutting_plane(
        &mut self,
        plane: PlaneId,
        position: Point3,
        normal: Vector3,
    ) -> Result<(), HostError> {
        self.require_document()?;
        let state = self.plane_mut(plane)?;
        state.position = position;
        state.normal = normal;
        Ok(())
    }

    fn find_cutting_plane(&self, name: &str) -> Option<PlaneId> {
        self.state
            .planes
            .iter()
            .find(|record| record.state.name == name)
            .map(|record| record.id)
    }

    fn cutting_plane(&self, plane: PlaneId) -> Option<CuttingPlaneState> {
        self.state
            .planes
            .iter()
            .find(|record| record.id == plane)
            .map(|record| record.state.clone())
    }

    fn erase_cutting_plane(&mut self, plane: PlaneId) -> Result<(), HostError> {
        self.require_document()?;
        let before = self.state.planes.len();
        self.state.planes.retain(|record| record.id != plane);
        if self.state.planes.len() == before {
            return Err(HostError::UnknownPlane(plane.get()));
        }
        if self.state.active_plane == Some(plane) {
            self.state.active_plane = None;
        }
        Ok(())
    }

    fn activate_cutting_plane(&mut self, plane: Option<PlaneId>) -> Result<(), HostError> {
        self.require_document()?;
        if let Some(id) = plane {
            self.plane_mut(id)?;
        }
        self.state.active_plane = plane;
        Ok(())
    }

    fn tag_cutting_plane(&mut self, plane: PlaneId, tag: &str) -> Result<(), HostError> {
        self.require_document()?;
        if !self.state.tags.contains_key(tag) {
            return Err(HostError::UnknownTag(tag.to_string()));
        }
        self.plane_mut(plane)?.tag = Some(tag.to_string());
        Ok(())
    }

    fn viewpoint_ids(&self) -> Vec<ViewpointId> {
        self.state.viewpoints.iter().map(|record| record.id).collect()
    }

    fn viewpoint(&self, id: ViewpointId) -> Option<ViewpointState> {
        self.state
            .viewpoints
            .iter()
            .find(|record| record.id == id)
            .map(|record| record.state.clone())
    }

    fn find_viewpoint(&self, name: &str) -> Option<ViewpointId> {
        self.state
            .viewpoints
            .iter()
            .find(|record| names_match(&record.state.name, name))
            .map(|record| record.id)
    }

    fn create_viewpoint(&mut self, name: &str) -> Result<ViewpointId, HostError> {
        self.check(FailPoint::CreateViewpoint)?;
        let id = ViewpointId::new(self.next_id());
        self.state.viewpoints.push(ViewpointRecord {
            id,
            state: ViewpointState {
                name: name.to_string(),
                ..ViewpointState::default()
            },
        });
        self.state.selected_viewpoint = Some(id);
        Ok(id)
    }

    fn select_viewpoint(&mut self, id: ViewpointId) -> Result<(), HostError> {
        self.require_document()?;
        let saved = self
            .viewpoint(id)
            .ok_or(HostError::UnknownViewpoint(id.get()))?;
        let flags = saved.flags;
        if flags.use_camera {
            if let Some(camera) = saved.camera {
                self.state.camera = Some(camera);
            }
        }
        if flags.use_style {
            if let Some(style) = saved.style {
                self.state.active_style = Some(style);
            }
        }
        if flags.use_hidden_layers {
            for (tag, visible) in self.state.tags.iter_mut() {
                *visible = saved.visible_tags.iter().any(|name| name == tag);
            }
        }
        if flags.use_section_planes {
            self.state.active_plane = saved
                .active_plane
                .as_deref()
                .and_then(|name| self.find_cutting_plane(name));
        }
        self.state.selected_viewpoint = Some(id);
        Ok(())
    }

    fn selected_viewpoint(&self) -> Option<ViewpointId> {
        self.state.selected_viewpoint
    }

    fn erase_viewpoint(&mut self, id: ViewpointId) -> Result<(), HostError> {
        self.check(FailPoint::EraseViewpoint)?;
        let before = self.state.viewpoints.len();
        self.state.viewpoints.retain(|record| record.id != id);
        if self.state.viewpoints.len() == before {
            return Err(HostError::UnknownViewpoint(id.get()));
        }
        if self.state.selected_viewpoint == Some(id) {
            self.state.selected_viewpoint = None;
        }
        Ok(())
    }

    fn update_viewpoint_snapshot(&mut self, id: ViewpointId) -> Result<(), HostError> {
        self.check(FailPoint::UpdateSnapshot)?;
        let camera = self.state.camera;
        let style = self.state.active_style.clone();
        let visible_tags = self.visible_tags();
        let active_plane = self.state.active_plane.and_then(|plane| self.plane_name(plane));
        let state = self.viewpoint_mut(id)?;
        state.camera = camera;
        state.style = style;
        state.visible_tags = visible_tags;
        state.active_plane = active_plane;
        Ok(())
    }

    fn set_viewpoint_flags(
        &mut self,
        id: ViewpointId,
        flags: ViewpointFlags,
    ) -> Result<(), HostError> {
        self.require_document()?;
        self.viewpoint_mut(id)?.flags = flags;
        Ok(())
    }

    fn set_viewpoint_metadata(
        &mut self,
        id: ViewpointId,
        key: &str,
        value: &str,
    ) -> Result<(), HostError> {
        self.require_document()?;
        self.viewpoint_mut(id)?
            .metadata
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn list_tags(&self) -> Vec<String> {
        self.state.tags.keys().cloned().collect()
    }

    fn ensure_tag(&mut self, name: &str) -> Result<(), HostError> {
        self.require_document()?;
        self.state.tags.entry(name.to_string()).or_insert(true);
        Ok(())
    }

    fn set_tag_visible(&mut self, name: &str, visible: bool) -> Result<(), HostError> {
        self.check(FailPoint::SetTagVisible)?;
        match self.state.tags.get_mut(name) {
            Some(flag) => {
                *flag = visible;
                Ok(())
            }
            None => Err(HostError::UnknownTag(name.to_string())),
        }
    }

    fn unhide_all(&mut self) -> Result<(), HostError> {
        self.require_document()?;
        self.state.hidden_entities = 0;
        Ok(())
    }

    fn list_styles(&self) -> Vec<String> {
        self.state.styles.clone()
    }

    fn import_style_file(&mut self, path: &Path) -> Result<bool, HostError> {
        self.require_document()?;
        if !path.is_file() {
            return Ok(false);
        }
        let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
            return Ok(false);
        };
        if !self.state.styles.iter().any(|style| style == name) {
            self.state.styles.push(name.to_string());
        }
        Ok(true)
    }

    fn select_style(&mut self, name: &str) -> Result<(), HostError> {
        self.check(FailPoint::SelectStyle)?;
        let Some(style) = self.state.styles.iter().find(|style| names_match(style, name)) else {
            return Err(HostError::UnknownStyle(name.to_string()));
        };
        self.state.active_style = Some(style.clone());
        Ok(())
    }

    fn set_camera(&mut self, camera: Camera) -> Result<(), HostError> {
        self.check(FailPoint::SetCamera)?;
        self.state.camera = Some(camera);
        Ok(())
    }

    fn zoom_to_fit(&mut self) -> Result<(), HostError> {
        self.check(FailPoint::ZoomToFit)?;
        self.state.zoom_extents += 1;
        Ok(())
    }

    fn begin_atomic_edit(&mut self, label: &str) -> Result<(), HostError> {
        self.require_document()?;
        if self.pending.is_some() {
            return Err(HostError::NestedTransaction);
        }
        self.pending = Some((label.to_string(), self.state.clone()));
        Ok(())
    }

    fn commit_atomic_edit(&mut self) -> Result<(), HostError> {
        let Some((label, _)) = self.pending.take() else {
            return Err(HostError::NoTransaction);
        };
        self.committed.push(label);
        Ok(())
    }

    fn abort_atomic_edit(&mut self) {
        if let Some((label, snapshot)) = self.pending.take() {
            debug!(label = %label, "回滚原子编辑");
            self.state = snapshot;
        }
    }

    fn document_attribute(&self, key: &str) -> Option<String> {
        self.state.attributes.get(key).cloned()
    }

    fn set_document_attribute(&mut self, key: &str, value: &str) -> Result<(), HostError> {
        self.check(FailPoint::SetAttribute)?;
        self.state
            .attributes
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_population_creates_model() {
        let mut host = MemoryHost::new();
        let demo = host.populate_demo();
        assert_eq!(host.list_tags().len(), demo.tags.len());
        assert_eq!(host.active_style(), Some("Default"));
        let bounds = host.bounding_box(BoundsScope::Model).expect("model bounds");
        assert!((bounds.size().x() - 10.0).abs() < 1e-12);
        assert!(host.bounding_box(BoundsScope::Selection).is_none());
    }

    #[test]
    fn abort_restores_state_before_begin() {
        let mut host = MemoryHost::new();
        host.populate_demo();
        host.begin_atomic_edit("edit").unwrap();
        host.create_viewpoint("Scratch").unwrap();
        host.set_tag_visible("walls", false).unwrap();
        host.abort_atomic_edit();

        assert!(host.find_viewpoint("Scratch").is_none());
        assert!(host.visible_tags().contains(&"walls".to_string()));
        assert!(!host.in_transaction());
        assert!(host.committed().is_empty());
    }

    #[test]
    fn nested_edits_are_rejected() {
        let mut host = MemoryHost::new();
        host.begin_atomic_edit("outer").unwrap();
        assert_eq!(
            host.begin_atomic_edit("inner"),
            Err(HostError::NestedTransaction)
        );
        host.commit_atomic_edit().unwrap();
        assert_eq!(host.committed(), ["outer".to_string()]);
        assert_eq!(host.commit_atomic_edit(), Err(HostError::NoTransaction));
    }

    #[test]
    fn selecting_viewpoint_restores_snapshot() {
        let mut host = MemoryHost::new();
        host.populate_demo();
        let id = host.create_viewpoint("Base").unwrap();
        host.set_tag_visible("furniture", false).unwrap();
        host.select_style("Planta").unwrap();
        host.update_viewpoint_snapshot(id).unwrap();

        host.set_tag_visible("furniture", true).unwrap();
        host.select_style("Default").unwrap();
        host.select_viewpoint(id).unwrap();

        assert_eq!(host.active_style(), Some("Planta"));
        assert!(!host.visible_tags().contains(&"furniture".to_string()));
        assert_eq!(host.find_viewpoint("BASE"), Some(id));
    }

    #[test]
    fn injected_failure_fires_once() {
        let mut host = MemoryHost::new();
        host.fail_on(FailPoint::ZoomToFit);
        assert!(host.zoom_to_fit().is_err());
        assert!(host.zoom_to_fit().is_ok());
    }

    #[test]
    fn missing_document_rejects_mutation() {
        let mut host = MemoryHost::without_document();
        assert!(!host.has_active_document());
        assert_eq!(
            host.create_viewpoint("Base"),
            Err(HostError::NoActiveDocument)
        );
    }

    #[test]
    fn state_round_trips_through_json() {
        let mut host = MemoryHost::new();
        host.populate_demo();
        host.create_viewpoint("Base").unwrap();
        let json = serde_json::to_string(host.state()).unwrap();
        let restored: MemoryState = serde_json::from_str(&json).unwrap();
        assert_eq!(&restored, host.state());
    }
}
