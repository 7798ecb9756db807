pub mod geometry {
    use glam::DVec3;
    use serde::{Deserialize, Serialize};

    /// 三维点，内部以 `glam::DVec3` 表示。宿主场景统一使用米为单位。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point3(pub DVec3);

    impl Point3 {
        #[inline]
        pub fn new(x: f64, y: f64, z: f64) -> Self {
            Self(DVec3::new(x, y, z))
        }

        #[inline]
        pub fn origin() -> Self {
            Self(DVec3::ZERO)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn z(self) -> f64 {
            self.0.z
        }

        #[inline]
        pub fn translate(self, offset: Vector3) -> Self {
            Self(self.0 + offset.0)
        }

        #[inline]
        pub fn vector_to(self, other: Point3) -> Vector3 {
            Vector3(other.0 - self.0)
        }

        /// 返回替换 Z 坐标后的新点，标高切面常用。
        #[inline]
        pub fn with_z(self, z: f64) -> Self {
            Self(DVec3::new(self.0.x, self.0.y, z))
        }

        #[inline]
        pub fn as_vec3(self) -> DVec3 {
            self.0
        }

        #[inline]
        pub fn distance(self, other: Point3) -> f64 {
            self.0.distance(other.0)
        }
    }

    impl From<DVec3> for Point3 {
        fn from(value: DVec3) -> Self {
            Self(value)
        }
    }

    /// 三维向量，用于切面法线与相机方向。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector3(pub DVec3);

    impl Vector3 {
        pub const X: Vector3 = Vector3(DVec3::X);
        pub const Y: Vector3 = Vector3(DVec3::Y);
        pub const Z: Vector3 = Vector3(DVec3::Z);
        pub const NEG_X: Vector3 = Vector3(DVec3::NEG_X);
        pub const NEG_Y: Vector3 = Vector3(DVec3::NEG_Y);
        pub const NEG_Z: Vector3 = Vector3(DVec3::NEG_Z);

        #[inline]
        pub fn new(x: f64, y: f64, z: f64) -> Self {
            Self(DVec3::new(x, y, z))
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn z(self) -> f64 {
            self.0.z
        }

        #[inline]
        pub fn as_vec3(self) -> DVec3 {
            self.0
        }

        #[inline]
        pub fn length(self) -> f64 {
            self.0.length()
        }

        #[inline]
        pub fn length_squared(self) -> f64 {
            self.0.length_squared()
        }

        #[inline]
        pub fn normalize(self) -> Option<Self> {
            let len = self.0.length();
            if len <= f64::EPSILON {
                None
            } else {
                Some(Self(self.0 / len))
            }
        }

        #[inline]
        pub fn scale(self, factor: f64) -> Self {
            Self(self.0 * factor)
        }

        #[inline]
        pub fn dot(self, other: Vector3) -> f64 {
            self.0.dot(other.0)
        }

        #[inline]
        pub fn cross(self, other: Vector3) -> Vector3 {
            Self(self.0.cross(other.0))
        }
    }

    impl std::ops::Neg for Vector3 {
        type Output = Vector3;

        fn neg(self) -> Self::Output {
            Self(-self.0)
        }
    }

    impl From<DVec3> for Vector3 {
        fn from(value: DVec3) -> Self {
            Self(value)
        }
    }

    /// 轴对齐包围盒，宿主以它描述模型或选择集的范围。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Bounds3D {
        min: Point3,
        max: Point3,
    }

    impl Bounds3D {
        #[inline]
        pub fn new(min: Point3, max: Point3) -> Self {
            Self { min, max }
        }

        /// 以中心点与尺寸构造包围盒。
        pub fn from_center(center: Point3, size: Vector3) -> Self {
            let half = size.as_vec3() * 0.5;
            Self {
                min: Point3(center.0 - half),
                max: Point3(center.0 + half),
            }
        }

        #[inline]
        pub fn empty() -> Self {
            Self {
                min: Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
                max: Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            }
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.min.x() > self.max.x() || self.min.y() > self.max.y() || self.min.z() > self.max.z()
        }

        #[inline]
        pub fn min(&self) -> Point3 {
            self.min
        }

        #[inline]
        pub fn max(&self) -> Point3 {
            self.max
        }

        pub fn include_point(&mut self, point: Point3) {
            if self.is_empty() {
                self.min = point;
                self.max = point;
                return;
            }
            self.min = Point3(self.min.0.min(point.0));
            self.max = Point3(self.max.0.max(point.0));
        }

        pub fn include_bounds(&mut self, other: &Bounds3D) {
            if other.is_empty() {
                return;
            }
            self.include_point(other.min);
            self.include_point(other.max);
        }

        #[inline]
        pub fn center(&self) -> Point3 {
            debug_assert!(!self.is_empty());
            Point3((self.min.0 + self.max.0) * 0.5)
        }

        #[inline]
        pub fn size(&self) -> Vector3 {
            Vector3(self.max.0 - self.min.0)
        }

        /// 对角线长度，空包围盒返回 0。
        pub fn diagonal(&self) -> f64 {
            if self.is_empty() {
                0.0
            } else {
                self.min.distance(self.max)
            }
        }
    }
}

pub mod model {
    use std::collections::HashSet;
    use std::fmt;
    use std::str::FromStr;

    use serde::{Deserialize, Serialize};
    use thiserror::Error;

    use crate::geometry::Vector3;

    /// 标高切面相对于楼层切高的上下偏移（米）。
    pub const LEVEL_CUT_DELTA: f64 = 0.05;

    #[derive(Debug, Clone, PartialEq, Eq, Error)]
    pub enum ModelError {
        #[error("name must not be empty")]
        EmptyName,
        #[error("invalid segment code `{0}`")]
        InvalidCode(String),
        #[error("duplicate name `{0}`")]
        DuplicateName(String),
        #[error("unknown camera type `{0}`")]
        UnknownCameraType(String),
    }

    /// 相机预设。只决定眼点/目标/上方向三元组，不保存用户调整过的相机。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum CameraType {
        IsoPersp,
        IsoOrtho,
        IsoInvertedPersp,
        IsoInvertedOrtho,
        TopPersp,
        TopOrtho,
    }

    impl CameraType {
        pub const ALL: [CameraType; 6] = [
            CameraType::IsoPersp,
            CameraType::IsoOrtho,
            CameraType::IsoInvertedPersp,
            CameraType::IsoInvertedOrtho,
            CameraType::TopPersp,
            CameraType::TopOrtho,
        ];

        pub fn as_str(self) -> &'static str {
            match self {
                CameraType::IsoPersp => "iso_persp",
                CameraType::IsoOrtho => "iso_ortho",
                CameraType::IsoInvertedPersp => "iso_inverted_persp",
                CameraType::IsoInvertedOrtho => "iso_inverted_ortho",
                CameraType::TopPersp => "top_persp",
                CameraType::TopOrtho => "top_ortho",
            }
        }

        #[inline]
        pub fn is_perspective(self) -> bool {
            matches!(
                self,
                CameraType::IsoPersp | CameraType::IsoInvertedPersp | CameraType::TopPersp
            )
        }
    }

    impl fmt::Display for CameraType {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.as_str())
        }
    }

    impl FromStr for CameraType {
        type Err = ModelError;

        fn from_str(value: &str) -> Result<Self, Self::Err> {
            let normalized = value.trim().to_ascii_lowercase();
            CameraType::ALL
                .into_iter()
                .find(|camera| camera.as_str() == normalized)
                .ok_or_else(|| ModelError::UnknownCameraType(value.to_string()))
        }
    }

    /// 可被应用到宿主视点上的“主题”：样式 + 可见标签（+ 可选相机）。
    ///
    /// 平面/剖面/场景配置与剖面分段共享此接口，调和器只依赖它。
    pub trait ViewTheme {
        /// 样式名，`None` 表示保持不变。
        fn style(&self) -> Option<&str>;
        fn active_layers(&self) -> &[String];
        fn camera_type(&self) -> Option<CameraType> {
            None
        }
        fn validate(&self) -> Result<(), ModelError>;
    }

    /// 一个命名视点的配置记录。
    #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ViewConfiguration {
        #[serde(default)]
        pub id: String,
        pub name: String,
        #[serde(default)]
        pub style: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub camera_type: Option<CameraType>,
        #[serde(default)]
        pub active_layers: Vec<String>,
    }

    impl ViewConfiguration {
        pub fn new(name: impl Into<String>) -> Self {
            let name = name.into();
            Self {
                id: name.clone(),
                name,
                ..Self::default()
            }
        }

        pub fn with_style(mut self, style: impl Into<String>) -> Self {
            self.style = style.into();
            self
        }

        pub fn with_camera(mut self, camera: CameraType) -> Self {
            self.camera_type = Some(camera);
            self
        }

        pub fn with_layers<I, S>(mut self, layers: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            self.active_layers = normalize_layers(layers);
            self
        }

        /// 按名称（大小写不敏感）比较。
        #[inline]
        pub fn is_named(&self, name: &str) -> bool {
            names_match(&self.name, name)
        }
    }

    impl ViewTheme for ViewConfiguration {
        fn style(&self) -> Option<&str> {
            non_empty(&self.style)
        }

        fn active_layers(&self) -> &[String] {
            &self.active_layers
        }

        fn camera_type(&self) -> Option<CameraType> {
            self.camera_type
        }

        fn validate(&self) -> Result<(), ModelError> {
            if self.name.trim().is_empty() {
                return Err(ModelError::EmptyName);
            }
            Ok(())
        }
    }

    /// 检查同类配置中名称唯一（大小写不敏感）。
    pub fn ensure_unique_names<'a, I>(names: I) -> Result<(), ModelError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut seen = HashSet::new();
        for name in names {
            if !seen.insert(name.to_lowercase()) {
                return Err(ModelError::DuplicateName(name.to_string()));
            }
        }
        Ok(())
    }

    /// 去重并去除空白项，保持首次出现顺序。
    pub fn normalize_layers<I, S>(layers: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for layer in layers {
            let layer: String = layer.into();
            let trimmed = layer.trim();
            if trimmed.is_empty() {
                continue;
            }
            if seen.insert(trimmed.to_string()) {
                out.push(trimmed.to_string());
            }
        }
        out
    }

    #[inline]
    pub fn names_match(a: &str, b: &str) -> bool {
        a.to_lowercase() == b.to_lowercase()
    }

    fn non_empty(value: &str) -> Option<&str> {
        let trimmed = value.trim();
        if trimmed.is_empty() { None } else { Some(trimmed) }
    }

    /// 楼层切面种类：底面（平面图）或天花（顶棚反射平面）。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum LevelCut {
        Base,
        Ceiling,
    }

    impl LevelCut {
        pub const BOTH: [LevelCut; 2] = [LevelCut::Base, LevelCut::Ceiling];

        fn prefix(self) -> &'static str {
            match self {
                LevelCut::Base => "Base",
                LevelCut::Ceiling => "Ceiling",
            }
        }

        /// 模板名：首层无后缀，其余楼层追加 `_<n>`。
        pub fn template_name(self, number: u32) -> String {
            if number <= 1 {
                self.prefix().to_string()
            } else {
                format!("{}_{number}", self.prefix())
            }
        }

        /// 通用模板名（不含楼层号），用于查找暂存配置。
        pub fn generic_name(self) -> &'static str {
            self.prefix()
        }

        /// 底面切面法线朝下，天花切面法线朝上。
        pub fn normal(self) -> Vector3 {
            match self {
                LevelCut::Base => Vector3::NEG_Z,
                LevelCut::Ceiling => Vector3::Z,
            }
        }
    }

    /// 一个楼层，由楼面标高定义。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Level {
        pub number: u32,
        pub height_meters: f64,
        #[serde(default)]
        pub has_base: bool,
        #[serde(default)]
        pub has_ceiling: bool,
    }

    impl Level {
        pub fn new(number: u32, height_meters: f64) -> Self {
            Self {
                number,
                height_meters,
                has_base: false,
                has_ceiling: false,
            }
        }

        #[inline]
        pub fn base_cut_height(&self, cut_offset: f64) -> f64 {
            self.height_meters + cut_offset + LEVEL_CUT_DELTA
        }

        #[inline]
        pub fn ceiling_cut_height(&self, cut_offset: f64) -> f64 {
            self.height_meters + cut_offset - LEVEL_CUT_DELTA
        }

        pub fn cut_height(&self, cut: LevelCut, cut_offset: f64) -> f64 {
            match cut {
                LevelCut::Base => self.base_cut_height(cut_offset),
                LevelCut::Ceiling => self.ceiling_cut_height(cut_offset),
            }
        }

        pub fn is_materialized(&self, cut: LevelCut) -> bool {
            match cut {
                LevelCut::Base => self.has_base,
                LevelCut::Ceiling => self.has_ceiling,
            }
        }

        pub fn set_materialized(&mut self, cut: LevelCut, value: bool) {
            match cut {
                LevelCut::Base => self.has_base = value,
                LevelCut::Ceiling => self.has_ceiling = value,
            }
        }

        #[inline]
        pub fn template_name(&self, cut: LevelCut) -> String {
            cut.template_name(self.number)
        }
    }

    /// 剖面分段：复制视点时套用的样式 + 标签变体。
    #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct SectionSegment {
        #[serde(default)]
        pub id: String,
        #[serde(default)]
        pub name: String,
        #[serde(default)]
        pub code: String,
        #[serde(default)]
        pub style: String,
        #[serde(default)]
        pub active_layers: Vec<String>,
    }

    impl SectionSegment {
        /// 由分段代码派生副本视点名。
        pub fn derived_name(&self, source: &str) -> String {
            format!("{source}_{}", self.code.trim())
        }
    }

    impl ViewTheme for SectionSegment {
        fn style(&self) -> Option<&str> {
            non_empty(&self.style)
        }

        fn active_layers(&self) -> &[String] {
            &self.active_layers
        }

        fn validate(&self) -> Result<(), ModelError> {
            if self.name.trim().is_empty() {
                return Err(ModelError::EmptyName);
            }
            validate_code(&self.code)
        }
    }

    /// 分段代码只允许 ASCII 字母数字、`_` 与 `-`。
    pub fn validate_code(code: &str) -> Result<(), ModelError> {
        let code = code.trim();
        let valid = !code.is_empty()
            && code
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
        if valid {
            Ok(())
        } else {
            Err(ModelError::InvalidCode(code.to_string()))
        }
    }

    #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
    pub struct SectionGroup {
        pub id: String,
        pub name: String,
        #[serde(default)]
        pub segments: Vec<SectionSegment>,
    }

    impl SectionGroup {
        pub fn segment(&self, id: &str) -> Option<&SectionSegment> {
            self.segments.iter().find(|segment| segment.id == id)
        }

        pub fn segment_mut(&mut self, id: &str) -> Option<&mut SectionSegment> {
            self.segments.iter_mut().find(|segment| segment.id == id)
        }
    }

    /// 剖面分组文档，整体加载与保存。
    #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
    pub struct SectionDocument {
        #[serde(default)]
        pub groups: Vec<SectionGroup>,
    }

    impl SectionDocument {
        pub fn group(&self, id: &str) -> Option<&SectionGroup> {
            self.groups.iter().find(|group| group.id == id)
        }

        pub fn group_mut(&mut self, id: &str) -> Option<&mut SectionGroup> {
            self.groups.iter_mut().find(|group| group.id == id)
        }
    }
}

pub mod kind {
    use std::path::{Path, PathBuf};

    /// 配置种类：决定持久化域名、默认/用户文件位置与样式目录。
    ///
    /// 默认实现遵循 `<root>/<domain>/json_data/<domain>_data.json` 布局。
    pub trait ViewKind {
        fn domain(&self) -> &'static str;

        /// JSON 文档的顶层数组键。
        fn root_key(&self) -> &'static str {
            self.domain()
        }

        fn default_file(&self, plugin_root: &Path) -> PathBuf {
            let domain = self.domain();
            plugin_root
                .join(domain)
                .join("json_data")
                .join(format!("{domain}_data.json"))
        }

        fn user_file(&self, user_root: &Path) -> PathBuf {
            let domain = self.domain();
            user_root
                .join(domain)
                .join("json_data")
                .join(format!("user_{domain}_data.json"))
        }

        fn styles_path(&self, plugin_root: &Path) -> PathBuf {
            plugin_root.join(self.domain()).join("styles")
        }
    }

    /// 以 `ViewConfiguration` 数组暂存配置的种类（平面与场景）。
    ///
    /// 剖面以分组文档存储，不实现此标记。
    pub trait CatalogKind: ViewKind {}

    #[derive(Debug, Clone, Copy, Default)]
    pub struct PlanKind;

    impl ViewKind for PlanKind {
        fn domain(&self) -> &'static str {
            "plans"
        }
    }

    #[derive(Debug, Clone, Copy, Default)]
    pub struct SectionKind;

    impl ViewKind for SectionKind {
        fn domain(&self) -> &'static str {
            "sections"
        }

        fn root_key(&self) -> &'static str {
            "groups"
        }
    }

    #[derive(Debug, Clone, Copy, Default)]
    pub struct SceneKind;

    impl ViewKind for SceneKind {
        fn domain(&self) -> &'static str {
            "scenes"
        }
    }

    impl CatalogKind for PlanKind {}
    impl CatalogKind for SceneKind {}

    /// 全部配置种类，按域名顺序。
    pub fn all_kinds() -> [&'static dyn ViewKind; 3] {
        [&PlanKind, &SceneKind, &SectionKind]
    }
}
