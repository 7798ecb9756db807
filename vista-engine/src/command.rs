use std::collections::HashMap;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};
use vista_core::kind::{CatalogKind, PlanKind, SceneKind, SectionKind, ViewKind};
use vista_core::model::{CameraType, SectionSegment, ViewConfiguration};

use crate::context::SessionContext;
use crate::errors::EngineError;
use crate::host::SceneHost;
use crate::levels::LevelManager;
use crate::registry::{ViewConfigRegistry, ViewParams};
use crate::sections::{SectionGroupManager, SegmentParams};

#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub name: String,
    pub params: Value,
}

impl CommandRequest {
    pub fn new(name: impl Into<String>, params: Value) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

/// 所有公开操作的统一结果信封。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResponse {
    pub success: bool,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CommandResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

pub trait CommandHandler: Send + Sync {
    fn name(&self) -> &str;
    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse;
}

pub struct CommandContext<'a> {
    pub host: &'a mut dyn SceneHost,
    pub session: &'a mut SessionContext,
}

type CommandFn = fn(&Value, &mut CommandContext<'_>) -> Result<Value, EngineError>;

/// 以函数指针实现的命令：错误统一转换为失败响应。
pub struct FnCommand {
    name: String,
    summary: &'static str,
    run: CommandFn,
}

impl FnCommand {
    pub fn new(name: impl Into<String>, summary: &'static str, run: CommandFn) -> Self {
        Self {
            name: name.into(),
            summary,
            run,
        }
    }
}

impl CommandHandler for FnCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        match (self.run)(&request.params, context) {
            Ok(data) => CommandResponse::ok(self.summary).with_data(data),
            Err(err) => {
                warn!(command = %self.name, kind = err.kind(), error = %err, "命令执行失败");
                CommandResponse::err(err.to_string()).with_data(json!({ "kind": err.kind() }))
            }
        }
    }
}

pub struct CommandBus {
    handlers: HashMap<String, Box<dyn CommandHandler>>,
}

impl Default for CommandBus {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandBus {
    pub fn new() -> Self {
        let mut bus = Self {
            handlers: HashMap::new(),
        };
        register_registry::<PlanKind>(&mut bus, "plans");
        register_catalog::<PlanKind>(&mut bus, "plans");
        register_registry::<SceneKind>(&mut bus, "scenes");
        register_catalog::<SceneKind>(&mut bus, "scenes");
        register_registry::<SectionKind>(&mut bus, "sections");
        register_sections(&mut bus);
        register_levels(&mut bus);
        bus.register(FnCommand::new("styles.list", "样式列表", styles_list));
        bus
    }

    pub fn register<H: CommandHandler + 'static>(&mut self, handler: H) {
        self.handlers
            .insert(handler.name().to_string(), Box::new(handler));
    }

    pub fn dispatch(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        if let Some(handler) = self.handlers.get(request.name.as_str()) {
            debug!(command = %request.name, "分发命令");
            handler.execute(request, context)
        } else {
            CommandResponse::err(format!("未知命令: {}", request.name))
        }
    }

    /// 已注册命令名，按字母序。
    pub fn available_commands(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn register_registry<K: ViewKind + Default + 'static>(bus: &mut CommandBus, domain: &'static str) {
    let commands: [(&'static str, &'static str, CommandFn); 5] = [
        ("list", "视点列表", registry_list::<K>),
        ("add", "已新增视点", registry_add::<K>),
        ("update", "已更新视点", registry_update::<K>),
        ("delete", "已删除视点", registry_delete::<K>),
        ("apply", "已应用配置", registry_apply::<K>),
    ];
    for (action, summary, run) in commands {
        bus.register(FnCommand::new(format!("{domain}.{action}"), summary, run));
    }
}

fn register_catalog<K: CatalogKind + Default + 'static>(bus: &mut CommandBus, domain: &'static str) {
    let commands: [(&'static str, &'static str, CommandFn); 4] = [
        ("catalog", "暂存配置", catalog_list::<K>),
        ("save_catalog", "已保存暂存配置", catalog_save::<K>),
        ("import", "已导入暂存配置", catalog_import::<K>),
        ("apply_entry", "已应用暂存配置", catalog_apply::<K>),
    ];
    for (action, summary, run) in commands {
        bus.register(FnCommand::new(format!("{domain}.{action}"), summary, run));
    }
}

fn register_sections(bus: &mut CommandBus) {
    let commands: [(&'static str, &'static str, CommandFn); 13] = [
        ("sections.groups", "剖面分组列表", sections_groups),
        ("sections.group", "剖面分组", sections_group),
        ("sections.add_group", "已新增剖面分组", sections_add_group),
        ("sections.update_group", "已更新剖面分组", sections_update_group),
        ("sections.delete_group", "已删除剖面分组", sections_delete_group),
        ("sections.add_segment", "已新增分段", sections_add_segment),
        ("sections.update_segment", "已更新分段", sections_update_segment),
        ("sections.delete_segment", "已删除分段", sections_delete_segment),
        ("sections.standard", "已生成标准剖面", sections_standard),
        ("sections.auto_views", "已生成环境剖面", sections_auto_views),
        ("sections.individual", "已生成剖面", sections_individual),
        ("sections.duplicate", "已按分段复制视点", sections_duplicate),
        ("sections.duplicate_segment", "已按分段复制视点", sections_duplicate_segment),
    ];
    for (name, summary, run) in commands {
        bus.register(FnCommand::new(name, summary, run));
    }
}

fn register_levels(bus: &mut CommandBus) {
    let commands: [(&'static str, &'static str, CommandFn); 7] = [
        ("levels.list", "楼层列表", levels_list),
        ("levels.add", "已保存楼层", levels_add),
        ("levels.create_base", "已生成底面视图", levels_create_base),
        ("levels.create_ceiling", "已生成天花视图", levels_create_ceiling),
        ("levels.remove", "已删除楼层", levels_remove),
        ("levels.set_cut_offset", "已更新切高偏移", levels_set_cut_offset),
        ("levels.set_plan_code", "已更新平面代码", levels_set_plan_code),
    ];
    for (name, summary, run) in commands {
        bus.register(FnCommand::new(name, summary, run));
    }
}

fn parse<T: DeserializeOwned>(params: &Value) -> Result<T, EngineError> {
    let value = if params.is_null() {
        Value::Object(Default::default())
    } else {
        params.clone()
    };
    serde_json::from_value(value)
        .map_err(|err| EngineError::Validation(format!("invalid parameters: {err}")))
}

fn to_data<T: Serialize>(value: &T) -> Result<Value, EngineError> {
    serde_json::to_value(value)
        .map_err(|err| EngineError::Validation(format!("unencodable result: {err}")))
}

#[derive(Debug, Deserialize)]
struct NameParams {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateParams {
    name: String,
    #[serde(default)]
    style: Option<String>,
    #[serde(default)]
    camera_type: Option<CameraType>,
    #[serde(default)]
    active_layers: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ApplyParams {
    name: String,
    #[serde(default)]
    config: Option<ViewConfiguration>,
}

fn registry<K: ViewKind + Default>(context: &CommandContext<'_>) -> ViewConfigRegistry<K> {
    ViewConfigRegistry::new(K::default(), &*context.session)
}

fn registry_list<K: ViewKind + Default>(
    _params: &Value,
    context: &mut CommandContext<'_>,
) -> Result<Value, EngineError> {
    to_data(&registry::<K>(context).list(&*context.host))
}

fn registry_add<K: ViewKind + Default>(
    params: &Value,
    context: &mut CommandContext<'_>,
) -> Result<Value, EngineError> {
    let params: ViewParams = parse(params)?;
    to_data(&registry::<K>(context).add(context.host, params)?)
}

fn registry_update<K: ViewKind + Default>(
    params: &Value,
    context: &mut CommandContext<'_>,
) -> Result<Value, EngineError> {
    let params: UpdateParams = parse(params)?;
    let changes = ViewParams {
        name: String::new(),
        style: params.style,
        camera_type: params.camera_type,
        active_layers: params.active_layers,
    };
    to_data(&registry::<K>(context).update(context.host, &params.name, changes)?)
}

fn registry_delete<K: ViewKind + Default>(
    params: &Value,
    context: &mut CommandContext<'_>,
) -> Result<Value, EngineError> {
    let params: NameParams = parse(params)?;
    to_data(&registry::<K>(context).delete(context.host, &params.name)?)
}

fn registry_apply<K: ViewKind + Default>(
    params: &Value,
    context: &mut CommandContext<'_>,
) -> Result<Value, EngineError> {
    let params: ApplyParams = parse(params)?;
    let config = params
        .config
        .ok_or_else(|| EngineError::Validation("missing `config` parameter".into()))?;
    to_data(&registry::<K>(context).apply_config(context.host, &params.name, &config)?)
}

fn catalog_list<K: CatalogKind + Default>(
    _params: &Value,
    context: &mut CommandContext<'_>,
) -> Result<Value, EngineError> {
    let (entries, report) = registry::<K>(context).catalog(&*context.session);
    Ok(json!({
        "entries": to_data(&entries)?,
        "loaded": report.success,
        "diagnostic": report.message,
    }))
}

#[derive(Debug, Deserialize)]
struct SaveCatalogParams {
    entries: Vec<ViewConfiguration>,
}

fn catalog_save<K: CatalogKind + Default>(
    params: &Value,
    context: &mut CommandContext<'_>,
) -> Result<Value, EngineError> {
    let params: SaveCatalogParams = parse(params)?;
    let path = registry::<K>(context).save_catalog(&*context.session, &params.entries)?;
    Ok(json!({ "path": path.display().to_string() }))
}

#[derive(Debug, Deserialize)]
struct PathParams {
    path: PathBuf,
}

fn catalog_import<K: CatalogKind + Default>(
    params: &Value,
    context: &mut CommandContext<'_>,
) -> Result<Value, EngineError> {
    let params: PathParams = parse(params)?;
    to_data(&registry::<K>(context).import_catalog(&*context.session, &params.path)?)
}

fn catalog_apply<K: CatalogKind + Default>(
    params: &Value,
    context: &mut CommandContext<'_>,
) -> Result<Value, EngineError> {
    let params: NameParams = parse(params)?;
    let registry = registry::<K>(context);
    to_data(&registry.apply_catalog_entry(context.host, &*context.session, &params.name)?)
}

fn sections(context: &CommandContext<'_>) -> SectionGroupManager {
    SectionGroupManager::new(&*context.session)
}

#[derive(Debug, Deserialize)]
struct IdParams {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GroupParams {
    #[serde(default)]
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SegmentTarget {
    group_id: String,
    #[serde(default)]
    segment_id: String,
    #[serde(flatten)]
    fields: SegmentParams,
}

fn sections_groups(
    _params: &Value,
    context: &mut CommandContext<'_>,
) -> Result<Value, EngineError> {
    let (groups, report) = sections(context).groups(context.session);
    Ok(json!({
        "groups": to_data(&groups)?,
        "loaded": report.success,
        "diagnostic": report.message,
    }))
}

fn sections_group(params: &Value, context: &mut CommandContext<'_>) -> Result<Value, EngineError> {
    let params: IdParams = parse(params)?;
    to_data(&sections(context).group(context.session, &params.id)?)
}

fn sections_add_group(
    params: &Value,
    context: &mut CommandContext<'_>,
) -> Result<Value, EngineError> {
    let params: GroupParams = parse(params)?;
    to_data(&sections(context).add_group(context.session, &params.name)?)
}

fn sections_update_group(
    params: &Value,
    context: &mut CommandContext<'_>,
) -> Result<Value, EngineError> {
    let params: GroupParams = parse(params)?;
    to_data(&sections(context).update_group(context.session, &params.id, &params.name)?)
}

fn sections_delete_group(
    params: &Value,
    context: &mut CommandContext<'_>,
) -> Result<Value, EngineError> {
    let params: IdParams = parse(params)?;
    to_data(&sections(context).delete_group(context.session, &params.id)?)
}

fn sections_add_segment(
    params: &Value,
    context: &mut CommandContext<'_>,
) -> Result<Value, EngineError> {
    let params: SegmentTarget = parse(params)?;
    to_data(&sections(context).add_segment(context.session, &params.group_id, params.fields)?)
}

fn sections_update_segment(
    params: &Value,
    context: &mut CommandContext<'_>,
) -> Result<Value, EngineError> {
    let params: SegmentTarget = parse(params)?;
    let segment = sections(context).update_segment(
        context.session,
        &params.group_id,
        &params.segment_id,
        params.fields,
    )?;
    to_data(&segment)
}

fn sections_delete_segment(
    params: &Value,
    context: &mut CommandContext<'_>,
) -> Result<Value, EngineError> {
    let params: SegmentTarget = parse(params)?;
    to_data(&sections(context).delete_segment(
        context.session,
        &params.group_id,
        &params.segment_id,
    )?)
}

fn sections_standard(
    _params: &Value,
    context: &mut CommandContext<'_>,
) -> Result<Value, EngineError> {
    to_data(&sections(context).create_standard_sections(context.host)?)
}

#[derive(Debug, Deserialize)]
struct EnvironmentParams {
    environment: String,
}

fn sections_auto_views(
    params: &Value,
    context: &mut CommandContext<'_>,
) -> Result<Value, EngineError> {
    let params: EnvironmentParams = parse(params)?;
    to_data(&sections(context).create_auto_views(context.host, &params.environment)?)
}

#[derive(Debug, Deserialize)]
struct IndividualParams {
    direction: String,
    name: String,
}

fn sections_individual(
    params: &Value,
    context: &mut CommandContext<'_>,
) -> Result<Value, EngineError> {
    let params: IndividualParams = parse(params)?;
    to_data(&sections(context).create_individual_section(
        context.host,
        &params.direction,
        &params.name,
    )?)
}

#[derive(Debug, Deserialize)]
struct DuplicateParams {
    scenes: Vec<String>,
    segment: SectionSegment,
}

fn sections_duplicate(
    params: &Value,
    context: &mut CommandContext<'_>,
) -> Result<Value, EngineError> {
    let params: DuplicateParams = parse(params)?;
    to_data(&sections(context).duplicate_scenes_with_segment(
        context.host,
        &params.scenes,
        &params.segment,
    )?)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DuplicateSegmentParams {
    scenes: Vec<String>,
    group_id: String,
    segment_id: String,
}

fn sections_duplicate_segment(
    params: &Value,
    context: &mut CommandContext<'_>,
) -> Result<Value, EngineError> {
    let params: DuplicateSegmentParams = parse(params)?;
    let manager = sections(context);
    to_data(&manager.duplicate_with_segment_id(
        context.host,
        context.session,
        &params.scenes,
        &params.group_id,
        &params.segment_id,
    )?)
}

fn levels(context: &CommandContext<'_>) -> LevelManager {
    LevelManager::new(&*context.session)
}

#[derive(Debug, Deserialize)]
struct HeightParams {
    height: f64,
}

#[derive(Debug, Deserialize)]
struct NumberParams {
    number: u32,
}

fn levels_list(_params: &Value, context: &mut CommandContext<'_>) -> Result<Value, EngineError> {
    let manager = levels(context);
    Ok(json!({
        "cutOffset": manager.cut_offset(&*context.host),
        "levels": to_data(&manager.level_views(&*context.host))?,
        "planCodes": to_data(&manager.plan_codes(&*context.host))?,
    }))
}

fn levels_add(params: &Value, context: &mut CommandContext<'_>) -> Result<Value, EngineError> {
    let params: HeightParams = parse(params)?;
    to_data(&levels(context).add_level(context.host, params.height)?)
}

fn levels_create_base(
    params: &Value,
    context: &mut CommandContext<'_>,
) -> Result<Value, EngineError> {
    let params: NumberParams = parse(params)?;
    to_data(&levels(context).create_base_scene(context.host, params.number)?)
}

fn levels_create_ceiling(
    params: &Value,
    context: &mut CommandContext<'_>,
) -> Result<Value, EngineError> {
    let params: NumberParams = parse(params)?;
    to_data(&levels(context).create_ceiling_scene(context.host, params.number)?)
}

fn levels_remove(params: &Value, context: &mut CommandContext<'_>) -> Result<Value, EngineError> {
    let params: NumberParams = parse(params)?;
    to_data(&levels(context).remove_level(context.host, params.number)?)
}

#[derive(Debug, Deserialize)]
struct OffsetParams {
    value: f64,
}

fn levels_set_cut_offset(
    params: &Value,
    context: &mut CommandContext<'_>,
) -> Result<Value, EngineError> {
    let params: OffsetParams = parse(params)?;
    let refreshed = levels(context).set_cut_offset(context.host, params.value)?;
    Ok(json!({ "cutOffset": params.value, "refreshed": refreshed }))
}

#[derive(Debug, Deserialize)]
struct PlanCodeParams {
    template: String,
    #[serde(default)]
    code: String,
}

fn levels_set_plan_code(
    params: &Value,
    context: &mut CommandContext<'_>,
) -> Result<Value, EngineError> {
    let params: PlanCodeParams = parse(params)?;
    to_data(&levels(context).set_plan_code(context.host, &params.template, &params.code)?)
}

#[derive(Debug, Deserialize)]
struct StylesParams {
    #[serde(default = "StylesParams::default_kind")]
    kind: String,
}

impl StylesParams {
    fn default_kind() -> String {
        PlanKind.domain().to_string()
    }
}

fn styles_list(params: &Value, context: &mut CommandContext<'_>) -> Result<Value, EngineError> {
    let params: StylesParams = parse(params)?;
    let library = match params.kind.as_str() {
        "plans" => context.session.styles_for(&PlanKind),
        "sections" => context.session.styles_for(&SectionKind),
        "scenes" => context.session.styles_for(&SceneKind),
        other => {
            return Err(EngineError::Validation(format!("unknown kind `{other}`")));
        }
    };
    Ok(json!({
        "assets": library.available(),
        "live": context.host.list_styles(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EngineSettings;
    use crate::memory::MemoryHost;
    use vista_io::JsonStore;

    fn session(dir: &std::path::Path) -> SessionContext {
        SessionContext::new(JsonStore::new(dir, dir), EngineSettings::default())
    }

    #[test]
    fn add_and_list_through_bus() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());
        let mut host = MemoryHost::new();
        host.populate_demo();
        let bus = CommandBus::new();
        let mut context = CommandContext {
            host: &mut host,
            session: &mut session,
        };

        let add = CommandRequest::new(
            "plans.add",
            json!({ "name": "Layout", "cameraType": "top_ortho", "activeLayers": ["walls"] }),
        );
        let response = bus.dispatch(&add, &mut context);
        assert!(response.success, "{:?}", response.message);

        let again = bus.dispatch(&add, &mut context);
        assert!(!again.success);
        assert_eq!(again.data, Some(json!({ "kind": "duplicate" })));

        let list = bus.dispatch(&CommandRequest::new("plans.list", Value::Null), &mut context);
        let data = list.data.unwrap();
        let names: Vec<_> = data
            .as_array()
            .unwrap()
            .iter()
            .map(|entry| entry["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["Layout"]);
    }

    #[test]
    fn apply_without_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());
        let mut host = MemoryHost::new();
        host.populate_demo();
        let before = host.state().clone();
        let bus = CommandBus::new();

        let response = {
            let mut context = CommandContext {
                host: &mut host,
                session: &mut session,
            };
            bus.dispatch(
                &CommandRequest::new("plans.apply", json!({ "name": "Layout" })),
                &mut context,
            )
        };
        assert!(!response.success);
        assert_eq!(response.data, Some(json!({ "kind": "validation" })));
        assert_eq!(host.state(), &before);
    }

    #[test]
    fn unknown_command_and_bad_params_fail_softly() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());
        let mut host = MemoryHost::new();
        let bus = CommandBus::new();
        let mut context = CommandContext {
            host: &mut host,
            session: &mut session,
        };

        let unknown = bus.dispatch(&CommandRequest::new("plans.rename", Value::Null), &mut context);
        assert!(!unknown.success);

        let bad = bus.dispatch(
            &CommandRequest::new("levels.add", json!({ "height": "tall" })),
            &mut context,
        );
        assert!(!bad.success);
        assert_eq!(bad.data, Some(json!({ "kind": "validation" })));
    }

    #[test]
    fn section_catalog_commands_are_not_registered() {
        let bus = CommandBus::new();
        let names = bus.available_commands();
        assert!(names.contains(&"plans.catalog"));
        assert!(names.contains(&"scenes.apply_entry"));
        assert!(names.contains(&"sections.apply"));
        assert!(!names.contains(&"sections.catalog"));
        assert!(names.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
