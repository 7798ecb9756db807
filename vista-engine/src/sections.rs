//! 剖面：分组/分段的 JSON 增删改，四向标准剖切，以及按分段复制视点。

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;
use vista_core::geometry::{Bounds3D, Point3, Vector3};
use vista_core::kind::{SectionKind, ViewKind};
use vista_core::model::{
    SectionGroup, SectionSegment, ViewConfiguration, names_match, normalize_layers, validate_code,
};

use crate::camera;
use crate::context::{EngineSettings, LoadReport, SessionContext};
use crate::errors::EngineError;
use crate::host::{BoundsScope, PlaneId, SceneHost, ViewpointId};
use crate::levels::TEMPLATE_METADATA;
use crate::reconciler::{AppliedView, KIND_METADATA, Reconciler};
use crate::registry::record_from_state;
use crate::transaction::atomic;

pub const SOURCE_METADATA: &str = "source_viewpoint";
pub const SEGMENT_METADATA: &str = "segment_code";

/// 四个标准剖切方向。`A` 在 -Y 面外朝 +Y 看，其余按 B/C/D 逆时针排列。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionDirection {
    A,
    B,
    C,
    D,
}

const DIRECTION_KEYWORDS: &[(&str, SectionDirection)] = &[
    ("a", SectionDirection::A),
    ("front", SectionDirection::A),
    ("frente", SectionDirection::A),
    ("frontal", SectionDirection::A),
    ("b", SectionDirection::B),
    ("left", SectionDirection::B),
    ("esquerda", SectionDirection::B),
    ("lateral esquerda", SectionDirection::B),
    ("c", SectionDirection::C),
    ("back", SectionDirection::C),
    ("rear", SectionDirection::C),
    ("fundos", SectionDirection::C),
    ("fundo", SectionDirection::C),
    ("tras", SectionDirection::C),
    ("posterior", SectionDirection::C),
    ("d", SectionDirection::D),
    ("right", SectionDirection::D),
    ("direita", SectionDirection::D),
    ("lateral direita", SectionDirection::D),
];

impl SectionDirection {
    pub const ALL: [SectionDirection; 4] = [
        SectionDirection::A,
        SectionDirection::B,
        SectionDirection::C,
        SectionDirection::D,
    ];

    pub fn letter(self) -> &'static str {
        match self {
            SectionDirection::A => "a",
            SectionDirection::B => "b",
            SectionDirection::C => "c",
            SectionDirection::D => "d",
        }
    }

    pub fn normal(self) -> Vector3 {
        match self {
            SectionDirection::A => Vector3::Y,
            SectionDirection::B => Vector3::X,
            SectionDirection::C => Vector3::NEG_Y,
            SectionDirection::D => Vector3::NEG_X,
        }
    }

    /// 解析中英文方向关键字，大小写与重音不敏感。
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        let normalized = normalize_keyword(keyword);
        DIRECTION_KEYWORDS
            .iter()
            .find(|(word, _)| *word == normalized)
            .map(|(_, direction)| *direction)
    }

    /// 包围盒对应表面外 `extend` 米处的切面位置，其余两轴取中心。
    pub fn position(self, bounds: &Bounds3D, extend: f64) -> Point3 {
        let center = bounds.center();
        let (min, max) = (bounds.min(), bounds.max());
        match self {
            SectionDirection::A => Point3::new(center.x(), min.y() - extend, center.z()),
            SectionDirection::B => Point3::new(min.x() - extend, center.y(), center.z()),
            SectionDirection::C => Point3::new(center.x(), max.y() + extend, center.z()),
            SectionDirection::D => Point3::new(max.x() + extend, center.y(), center.z()),
        }
    }
}

fn normalize_keyword(keyword: &str) -> String {
    let folded: String = keyword
        .trim()
        .to_lowercase()
        .chars()
        .map(|ch| match ch {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            '_' | '-' => ' ',
            other => other,
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 待创建的切面。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionPlaneSpec {
    pub name: String,
    pub direction: SectionDirection,
    pub position: Point3,
    pub normal: Vector3,
}

/// 四向切面；`prefix` 存在时命名为 `<prefix>_<letter>`。
pub fn standard_planes(bounds: &Bounds3D, extend: f64, prefix: Option<&str>) -> Vec<SectionPlaneSpec> {
    SectionDirection::ALL
        .into_iter()
        .map(|direction| SectionPlaneSpec {
            name: match prefix {
                Some(prefix) => format!("{prefix}_{}", direction.letter()),
                None => direction.letter().to_string(),
            },
            direction,
            position: direction.position(bounds, extend),
            normal: direction.normal(),
        })
        .collect()
}

/// 新增或更新分段时的输入。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentParams {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub active_layers: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct SectionGroupManager {
    settings: EngineSettings,
    reconciler: Reconciler,
}

impl SectionGroupManager {
    pub fn new(ctx: &SessionContext) -> Self {
        Self {
            settings: ctx.settings.clone(),
            reconciler: Reconciler::new(ctx.styles_for(&SectionKind)),
        }
    }

    pub fn groups(&self, ctx: &mut SessionContext) -> (Vec<SectionGroup>, LoadReport) {
        let (document, report) = ctx.section_document();
        (document.groups, report)
    }

    pub fn group(&self, ctx: &mut SessionContext, id: &str) -> Result<SectionGroup, EngineError> {
        let (document, _) = ctx.section_document();
        document
            .group(id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("group", id))
    }

    pub fn add_group(
        &self,
        ctx: &mut SessionContext,
        name: &str,
    ) -> Result<SectionGroup, EngineError> {
        let name = required(name, "group name")?;
        let (mut document, _) = ctx.section_document();
        if document.groups.iter().any(|group| names_match(&group.name, name)) {
            return Err(EngineError::duplicate("group", name));
        }
        let group = SectionGroup {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            segments: Vec::new(),
        };
        document.groups.push(group.clone());
        ctx.save_section_document(&document)?;
        info!(id = %group.id, name = %group.name, "已新增剖面分组");
        Ok(group)
    }

    pub fn update_group(
        &self,
        ctx: &mut SessionContext,
        id: &str,
        name: &str,
    ) -> Result<SectionGroup, EngineError> {
        let name = required(name, "group name")?;
        let (mut document, _) = ctx.section_document();
        if document
            .groups
            .iter()
            .any(|group| group.id != id && names_match(&group.name, name))
        {
            return Err(EngineError::duplicate("group", name));
        }
        let group = document
            .group_mut(id)
            .ok_or_else(|| EngineError::not_found("group", id))?;
        group.name = name.to_string();
        let updated = group.clone();
        ctx.save_section_document(&document)?;
        Ok(updated)
    }

    pub fn delete_group(
        &self,
        ctx: &mut SessionContext,
        id: &str,
    ) -> Result<SectionGroup, EngineError> {
        let (mut document, _) = ctx.section_document();
        let index = document
            .groups
            .iter()
            .position(|group| group.id == id)
            .ok_or_else(|| EngineError::not_found("group", id))?;
        let removed = document.groups.remove(index);
        ctx.save_section_document(&document)?;
        info!(id, name = %removed.name, "已删除剖面分组");
        Ok(removed)
    }

    pub fn add_segment(
        &self,
        ctx: &mut SessionContext,
        group_id: &str,
        params: SegmentParams,
    ) -> Result<SectionSegment, EngineError> {
        let name = required(params.name.as_deref().unwrap_or_default(), "segment name")?;
        let code = params.code.as_deref().unwrap_or_default().trim();
        validate_code(code)?;

        let (mut document, _) = ctx.section_document();
        let group = document
            .group_mut(group_id)
            .ok_or_else(|| EngineError::not_found("group", group_id))?;
        if group.segments.iter().any(|segment| names_match(&segment.code, code)) {
            return Err(EngineError::duplicate("segment code", code));
        }
        let segment = SectionSegment {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            code: code.to_string(),
            style: params.style.unwrap_or_default(),
            active_layers: normalize_layers(params.active_layers.unwrap_or_default()),
        };
        group.segments.push(segment.clone());
        ctx.save_section_document(&document)?;
        Ok(segment)
    }

    pub fn update_segment(
        &self,
        ctx: &mut SessionContext,
        group_id: &str,
        segment_id: &str,
        params: SegmentParams,
    ) -> Result<SectionSegment, EngineError> {
        let (mut document, _) = ctx.section_document();
        let group = document
            .group_mut(group_id)
            .ok_or_else(|| EngineError::not_found("group", group_id))?;

        if let Some(code) = params.code.as_deref().map(str::trim) {
            validate_code(code)?;
            if group
                .segments
                .iter()
                .any(|segment| segment.id != segment_id && names_match(&segment.code, code))
            {
                return Err(EngineError::duplicate("segment code", code));
            }
        }

        let segment = group
            .segment_mut(segment_id)
            .ok_or_else(|| EngineError::not_found("segment", segment_id))?;
        if let Some(name) = params.name.as_deref() {
            segment.name = required(name, "segment name")?.to_string();
        }
        if let Some(code) = params.code {
            segment.code = code.trim().to_string();
        }
        if let Some(style) = params.style {
            segment.style = style;
        }
        if let Some(layers) = params.active_layers {
            segment.active_layers = normalize_layers(layers);
        }
        let updated = segment.clone();
        ctx.save_section_document(&document)?;
        Ok(updated)
    }

    pub fn delete_segment(
        &self,
        ctx: &mut SessionContext,
        group_id: &str,
        segment_id: &str,
    ) -> Result<SectionSegment, EngineError> {
        let (mut document, _) = ctx.section_document();
        let group = document
            .group_mut(group_id)
            .ok_or_else(|| EngineError::not_found("group", group_id))?;
        let index = group
            .segments
            .iter()
            .position(|segment| segment.id == segment_id)
            .ok_or_else(|| EngineError::not_found("segment", segment_id))?;
        let removed = group.segments.remove(index);
        ctx.save_section_document(&document)?;
        Ok(removed)
    }

    /// 在整个模型外侧生成 a/b/c/d 四个切面及对齐视点，共用一个可见性标签。
    pub fn create_standard_sections(
        &self,
        host: &mut dyn SceneHost,
    ) -> Result<Vec<AppliedView>, EngineError> {
        require_document(host)?;
        let bounds = host
            .bounding_box(BoundsScope::Model)
            .ok_or_else(|| EngineError::HostState("model is empty".into()))?;
        let specs = standard_planes(&bounds, self.settings.extend_distance, None);
        let tag = self.settings.standard_tag.clone();
        atomic(host, "Create standard sections", |host| {
            self.materialize_all(host, &specs, &tag)
        })
    }

    /// 以当前选择集为范围生成 `<environment>_<letter>` 四个视图，标签为环境名大写。
    pub fn create_auto_views(
        &self,
        host: &mut dyn SceneHost,
        environment: &str,
    ) -> Result<Vec<AppliedView>, EngineError> {
        let environment = required(environment, "environment name")?;
        require_document(host)?;
        let bounds = host
            .bounding_box(BoundsScope::Selection)
            .ok_or_else(|| EngineError::HostState("selection is empty".into()))?;
        let specs = standard_planes(&bounds, self.settings.extend_distance, Some(environment));
        let tag = environment.to_uppercase();
        atomic(host, "Create environment sections", |host| {
            self.materialize_all(host, &specs, &tag)
        })
    }

    /// 按方向关键字在整个模型外侧生成单个切面与视点。
    pub fn create_individual_section(
        &self,
        host: &mut dyn SceneHost,
        keyword: &str,
        name: &str,
    ) -> Result<AppliedView, EngineError> {
        let direction = SectionDirection::from_keyword(keyword).ok_or_else(|| {
            EngineError::Validation(format!("unknown section direction `{}`", keyword.trim()))
        })?;
        let name = required(name, "section name")?;
        require_document(host)?;
        let bounds = host
            .bounding_box(BoundsScope::Model)
            .ok_or_else(|| EngineError::HostState("model is empty".into()))?;
        let spec = SectionPlaneSpec {
            name: name.to_string(),
            direction,
            position: direction.position(&bounds, self.settings.extend_distance),
            normal: direction.normal(),
        };
        let tag = self.settings.standard_tag.clone();
        atomic(host, "Create section", |host| {
            self.materialize_plane(host, &spec, &tag)
        })
    }

    /// 为每个源视点生成 `<源名>_<代码>` 副本：复制十个保存开关，再套用分段的样式与标签。
    ///
    /// 同名副本会被替换，源视点保持不变。源本身是另一源的副本时，先复制它再被替换。
    pub fn duplicate_scenes_with_segment(
        &self,
        host: &mut dyn SceneHost,
        scene_names: &[String],
        segment: &SectionSegment,
    ) -> Result<Vec<AppliedView>, EngineError> {
        validate_code(&segment.code)?;
        if scene_names.iter().all(|name| name.trim().is_empty()) {
            return Err(EngineError::Validation("no scenes selected".into()));
        }
        require_document(host)?;

        let mut sources: Vec<(ViewpointId, String)> = Vec::new();
        for name in scene_names.iter().map(|name| name.trim()).filter(|name| !name.is_empty()) {
            let (id, state) = host
                .find_viewpoint(name)
                .and_then(|id| host.viewpoint(id).map(|state| (id, state)))
                .ok_or_else(|| EngineError::not_found("viewpoint", name))?;
            if !sources.iter().any(|(known, _)| *known == id) {
                sources.push((id, state.name));
            }
        }
        // 副本名总比源名长：先处理名称较长的源，避免其被较短源的副本替换
        let mut order: Vec<usize> = (0..sources.len()).collect();
        order.sort_by_key(|&index| std::cmp::Reverse(sources[index].1.chars().count()));

        let duplicates = atomic(host, "Duplicate scenes with segment", |host| {
            let mut duplicates: Vec<Option<AppliedView>> = vec![None; sources.len()];
            for &index in &order {
                let (source, name) = &sources[index];
                duplicates[index] = Some(self.duplicate_one(host, *source, name, segment)?);
            }
            Ok(duplicates.into_iter().flatten().collect::<Vec<_>>())
        })?;
        info!(
            count = duplicates.len(),
            code = %segment.code,
            "已按分段复制视点"
        );
        Ok(duplicates)
    }

    /// 从分组文档中解析分段后复制。
    pub fn duplicate_with_segment_id(
        &self,
        host: &mut dyn SceneHost,
        ctx: &mut SessionContext,
        scene_names: &[String],
        group_id: &str,
        segment_id: &str,
    ) -> Result<Vec<AppliedView>, EngineError> {
        let group = self.group(ctx, group_id)?;
        let segment = group
            .segment(segment_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("segment", segment_id))?;
        self.duplicate_scenes_with_segment(host, scene_names, &segment)
    }

    fn duplicate_one(
        &self,
        host: &mut dyn SceneHost,
        source: ViewpointId,
        name: &str,
        segment: &SectionSegment,
    ) -> Result<AppliedView, EngineError> {
        let state = host
            .viewpoint(source)
            .ok_or_else(|| EngineError::not_found("viewpoint", name))?;
        let target = segment.derived_name(&state.name);

        if let Some(previous) = host.find_viewpoint(&target) {
            debug!(name = %target, "替换已有副本");
            host.erase_viewpoint(previous)?;
        }

        host.select_viewpoint(source)?;
        let copy = host.create_viewpoint(&target)?;
        host.set_viewpoint_flags(copy, state.flags)?;
        for (key, value) in &state.metadata {
            if key != TEMPLATE_METADATA {
                host.set_viewpoint_metadata(copy, key, value)?;
            }
        }
        host.set_viewpoint_metadata(copy, SOURCE_METADATA, &state.name)?;
        host.set_viewpoint_metadata(copy, SEGMENT_METADATA, segment.code.trim())?;

        self.reconciler.apply_theme(host, segment)?;
        host.update_viewpoint_snapshot(copy)?;

        let record = host
            .viewpoint(copy)
            .map(|state| record_from_state(&state))
            .unwrap_or_else(|| ViewConfiguration::new(target));
        Ok(AppliedView {
            id: copy,
            created: true,
            record,
        })
    }

    fn materialize_all(
        &self,
        host: &mut dyn SceneHost,
        specs: &[SectionPlaneSpec],
        tag: &str,
    ) -> Result<Vec<AppliedView>, EngineError> {
        specs
            .iter()
            .map(|spec| self.materialize_plane(host, spec, tag))
            .collect()
    }

    /// 切面查找或创建并打标签，然后创建沿法线观察的正交视点。
    fn materialize_plane(
        &self,
        host: &mut dyn SceneHost,
        spec: &SectionPlaneSpec,
        tag: &str,
    ) -> Result<AppliedView, EngineError> {
        let plane = self.ensure_plane(host, spec)?;
        host.ensure_tag(tag)?;
        host.tag_cutting_plane(plane, tag)?;

        let existing = host.find_viewpoint(&spec.name);
        if let Some(id) = existing {
            host.select_viewpoint(id)?;
        }
        host.activate_cutting_plane(Some(plane))?;
        host.set_camera(camera::section_camera(spec.position, spec.normal))?;

        let (id, created) = match existing {
            Some(id) => (id, false),
            None => (host.create_viewpoint(&spec.name)?, true),
        };
        host.set_viewpoint_metadata(id, KIND_METADATA, SectionKind.domain())?;
        host.zoom_to_fit()?;
        host.update_viewpoint_snapshot(id)?;

        let record = host
            .viewpoint(id)
            .map(|state| record_from_state(&state))
            .unwrap_or_else(|| ViewConfiguration::new(spec.name.clone()));
        Ok(AppliedView {
            id,
            created,
            record,
        })
    }

    fn ensure_plane(
        &self,
        host: &mut dyn SceneHost,
        spec: &SectionPlaneSpec,
    ) -> Result<PlaneId, EngineError> {
        match host.find_cutting_plane(&spec.name) {
            Some(plane) => {
                host.update_cutting_plane(plane, spec.position, spec.normal)?;
                Ok(plane)
            }
            None => Ok(host.add_cutting_plane(&spec.name, spec.position, spec.normal)?),
        }
    }
}

fn required<'a>(value: &'a str, what: &str) -> Result<&'a str, EngineError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(EngineError::Validation(format!("{what} must not be empty")))
    } else {
        Ok(trimmed)
    }
}

fn require_document(host: &dyn SceneHost) -> Result<(), EngineError> {
    if host.has_active_document() {
        Ok(())
    } else {
        Err(EngineError::HostState("no active document".into()))
    }
}
