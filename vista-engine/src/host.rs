//! 宿主场景图的窄接口。
//!
//! 核心只通过 [`SceneHost`] 读写视点、切面、标签、样式与相机；宿主负责原子编辑的回滚。

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vista_core::geometry::{Bounds3D, Point3, Vector3};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ViewpointId(u64);

impl ViewpointId {
    #[inline]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlaneId(u64);

impl PlaneId {
    #[inline]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

/// 包围盒范围：整个模型或当前选择集。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundsScope {
    Model,
    Selection,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub eye: Point3,
    pub target: Point3,
    pub up: Vector3,
    pub perspective: bool,
}

impl Camera {
    /// 视线方向（单位向量），眼点与目标重合时返回 `None`。
    pub fn direction(&self) -> Option<Vector3> {
        self.eye.vector_to(self.target).normalize()
    }
}

/// 视点保存时记录哪些状态，对应宿主页面上的十个 `use_*` 开关。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewpointFlags {
    pub use_axes: bool,
    pub use_camera: bool,
    pub use_hidden: bool,
    pub use_hidden_geometry: bool,
    pub use_hidden_layers: bool,
    pub use_hidden_objects: bool,
    pub use_rendering_options: bool,
    pub use_section_planes: bool,
    pub use_shadow_info: bool,
    pub use_style: bool,
}

impl Default for ViewpointFlags {
    fn default() -> Self {
        Self {
            use_axes: true,
            use_camera: true,
            use_hidden: true,
            use_hidden_geometry: true,
            use_hidden_layers: true,
            use_hidden_objects: true,
            use_rendering_options: true,
            use_section_planes: true,
            use_shadow_info: true,
            use_style: true,
        }
    }
}

/// 视点的已保存快照。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ViewpointState {
    pub name: String,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub camera: Option<Camera>,
    #[serde(default)]
    pub visible_tags: Vec<String>,
    #[serde(default)]
    pub active_plane: Option<String>,
    #[serde(default)]
    pub flags: ViewpointFlags,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CuttingPlaneState {
    pub name: String,
    pub position: Point3,
    pub normal: Vector3,
    #[serde(default)]
    pub tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("no active document")]
    NoActiveDocument,
    #[error("viewpoint {0} does not exist")]
    UnknownViewpoint(u64),
    #[error("cutting plane {0} does not exist")]
    UnknownPlane(u64),
    #[error("tag `{0}` does not exist")]
    UnknownTag(String),
    #[error("style `{0}` does not exist")]
    UnknownStyle(String),
    #[error("an atomic edit is already open")]
    NestedTransaction,
    #[error("no atomic edit is open")]
    NoTransaction,
    #[error("host operation `{operation}` failed: {message}")]
    OperationFailed { operation: String, message: String },
}

pub trait SceneHost {
    fn has_active_document(&self) -> bool;
    fn bounding_box(&self, scope: BoundsScope) -> Option<Bounds3D>;

    fn add_cutting_plane(
        &mut self,
        name: &str,
        position: Point3,
        normal: Vector3,
    ) -> Result<PlaneId, HostError>;
    fn update_cutting_plane(
        &mut self,
        plane: PlaneId,
        position: Point3,
        normal: Vector3,
    ) -> Result<(), HostError>;
    fn find_cutting_plane(&self, name: &str) -> Option<PlaneId>;
    fn cutting_plane(&self, plane: PlaneId) -> Option<CuttingPlaneState>;
    fn erase_cutting_plane(&mut self, plane: PlaneId) -> Result<(), HostError>;
    /// 设置当前激活的切面，`None` 表示关闭剖切。
    fn activate_cutting_plane(&mut self, plane: Option<PlaneId>) -> Result<(), HostError>;
    fn tag_cutting_plane(&mut self, plane: PlaneId, tag: &str) -> Result<(), HostError>;

    fn viewpoint_ids(&self) -> Vec<ViewpointId>;
    fn viewpoint(&self, id: ViewpointId) -> Option<ViewpointState>;
    /// 按名称查找，大小写不敏感。
    fn find_viewpoint(&self, name: &str) -> Option<ViewpointId>;
    /// 新建视点并设为当前视点，不改变当前视图状态。
    fn create_viewpoint(&mut self, name: &str) -> Result<ViewpointId, HostError>;
    /// 选中视点，并按其开关恢复已保存的视图状态。
    fn select_viewpoint(&mut self, id: ViewpointId) -> Result<(), HostError>;
    fn selected_viewpoint(&self) -> Option<ViewpointId>;
    fn erase_viewpoint(&mut self, id: ViewpointId) -> Result<(), HostError>;
    /// 把当前相机/可见标签/样式/切面写入视点快照。
    fn update_viewpoint_snapshot(&mut self, id: ViewpointId) -> Result<(), HostError>;
    fn set_viewpoint_flags(
        &mut self,
        id: ViewpointId,
        flags: ViewpointFlags,
    ) -> Result<(), HostError>;
    fn set_viewpoint_metadata(
        &mut self,
        id: ViewpointId,
        key: &str,
        value: &str,
    ) -> Result<(), HostError>;

    fn list_tags(&self) -> Vec<String>;
    fn ensure_tag(&mut self, name: &str) -> Result<(), HostError>;
    fn set_tag_visible(&mut self, name: &str, visible: bool) -> Result<(), HostError>;
    fn unhide_all(&mut self) -> Result<(), HostError>;

    fn list_styles(&self) -> Vec<String>;
    /// 导入样式文件，返回是否成功加载。
    fn import_style_file(&mut self, path: &Path) -> Result<bool, HostError>;
    fn select_style(&mut self, name: &str) -> Result<(), HostError>;

    fn set_camera(&mut self, camera: Camera) -> Result<(), HostError>;
    fn zoom_to_fit(&mut self) -> Result<(), HostError>;

    fn begin_atomic_edit(&mut self, label: &str) -> Result<(), HostError>;
    fn commit_atomic_edit(&mut self) -> Result<(), HostError>;
    fn abort_atomic_edit(&mut self);

    fn document_attribute(&self, key: &str) -> Option<String>;
    fn set_document_attribute(&mut self, key: &str, value: &str) -> Result<(), HostError>;

    /// 按元数据查找第一个匹配的视点。
    fn find_viewpoint_by_metadata(&self, key: &str, value: &str) -> Option<ViewpointId> {
        self.viewpoint_ids().into_iter().find(|id| {
            self.viewpoint(*id)
                .is_some_and(|state| state.metadata.get(key).is_some_and(|v| v == value))
        })
    }
}
