use std::path::Path;

use serde_json::{Value, json};
use tracing::{debug, info};
use vista_config::AppConfig;
use vista_engine::command::{CommandBus, CommandContext, CommandRequest, CommandResponse};
use vista_engine::{LevelManager, MemoryHost, SceneHost};

use crate::errors::FrontendError;
use crate::loader::{self, HostSource, LoadedHost};

/// 演示运行后的统计。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoSummary {
    pub executed: usize,
    pub failed: usize,
    pub viewpoints: usize,
    pub planes: usize,
    pub levels: usize,
}

/// 演示流程只修改宿主场景，不写入用户文件。
fn demo_requests() -> Vec<CommandRequest> {
    vec![
        CommandRequest::new("levels.add", json!({ "height": 0.0 })),
        CommandRequest::new("levels.add", json!({ "height": 2.9 })),
        CommandRequest::new("levels.create_base", json!({ "number": 1 })),
        CommandRequest::new("levels.create_ceiling", json!({ "number": 2 })),
        CommandRequest::new("sections.standard", Value::Null),
        CommandRequest::new(
            "scenes.add",
            json!({
                "name": "Iso",
                "style": "Default",
                "cameraType": "iso_persp",
                "activeLayers": ["walls", "furniture"],
            }),
        ),
        CommandRequest::new(
            "plans.apply",
            json!({
                "name": "Layout",
                "config": {
                    "name": "Layout",
                    "style": "Planta",
                    "cameraType": "top_ortho",
                    "activeLayers": ["walls", "doors"],
                },
            }),
        ),
        CommandRequest::new("levels.list", Value::Null),
    ]
}

pub fn run_demo(config: &AppConfig) -> DemoSummary {
    let LoadedHost {
        mut host,
        source,
        demo,
    } = loader::load_host_from_env_or_demo();
    let mut session = loader::build_session(config);
    let bus = CommandBus::new();
    let requests = demo_requests();

    let mut failed = 0;
    {
        let mut context = CommandContext {
            host: &mut host,
            session: &mut session,
        };
        for request in &requests {
            let response = bus.dispatch(request, &mut context);
            print_response(&request.name, &response);
            if !response.success {
                failed += 1;
            }
        }
    }

    println!("支持的命令: {}", bus.available_commands().join(", "));

    let summary = DemoSummary {
        executed: requests.len(),
        failed,
        viewpoints: host.viewpoint_ids().len(),
        planes: host.state().planes.len(),
        levels: LevelManager::new(&session).levels(&host).len(),
    };
    info!(
        executed = summary.executed,
        failed = summary.failed,
        viewpoints = summary.viewpoints,
        "CLI 演示完成"
    );

    println!("=== Vista 演示 ===");
    match &source {
        HostSource::Snapshot(path) => println!("宿主来源: 快照 {}", path.display()),
        HostSource::Demo => println!("宿主来源: 内置示例"),
    }
    if let Some(demo) = &demo {
        println!(
            "示例模型: {} 个标签, {} 种样式",
            demo.tags.len(),
            demo.styles.len()
        );
    }
    println!(
        "命令 {} 条 (失败 {} 条), 视点 {} 个, 剖切面 {} 个, 楼层 {} 个",
        summary.executed, summary.failed, summary.viewpoints, summary.planes, summary.levels
    );
    for id in host.viewpoint_ids() {
        if let Some(state) = host.viewpoint(id) {
            println!(
                "  - {} [样式: {}, 图层: {}]",
                state.name,
                state.style.as_deref().unwrap_or("<无>"),
                state.visible_tags.join("/")
            );
        }
    }

    summary
}

fn print_response(name: &str, response: &CommandResponse) {
    let label = if response.success { "成功" } else { "失败" };
    println!(
        "[{label}] {name}: {}",
        response.message.as_deref().unwrap_or_default()
    );
}

/// 执行单条命令。指定快照路径时在该快照上执行，成功后写回。
pub fn run_command(
    config: &AppConfig,
    name: &str,
    params: &str,
    snapshot: Option<&Path>,
) -> Result<CommandResponse, FrontendError> {
    let params = if params.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(params).map_err(FrontendError::InvalidParams)?
    };

    let mut host = match snapshot {
        Some(path) if path.exists() => loader::load_host_snapshot(path)?,
        Some(path) => {
            debug!(path = %path.display(), "快照不存在，从内置示例开始");
            loader::demo_host().host
        }
        None => loader::load_host_from_env_or_demo().host,
    };
    let mut session = loader::build_session(config);
    let bus = CommandBus::new();

    let response = bus.dispatch(
        &CommandRequest::new(name, params),
        &mut CommandContext {
            host: &mut host,
            session: &mut session,
        },
    );

    if response.success {
        if let Some(path) = snapshot {
            write_back(&host, path)?;
        }
    }
    Ok(response)
}

fn write_back(host: &MemoryHost, path: &Path) -> Result<(), FrontendError> {
    loader::save_host_snapshot(host, path)?;
    debug!(path = %path.display(), "已写回宿主快照");
    Ok(())
}

/// 以缩进 JSON 渲染响应。
pub fn render_response(response: &CommandResponse) -> Result<String, FrontendError> {
    serde_json::to_string_pretty(response).map_err(FrontendError::Encode)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.paths.plugin_root = dir.to_path_buf();
        config
    }

    #[test]
    fn demo_runs_every_step() {
        let dir = tempfile::tempdir().unwrap();
        let summary = run_demo(&config_in(dir.path()));
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.levels, 2);
        // Base、Ceiling_2、a-d、Iso、Layout
        assert_eq!(summary.viewpoints, 8);
        assert_eq!(summary.planes, 6);
    }

    #[test]
    fn command_writes_back_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let snapshot = dir.path().join("host.json");

        let response =
            run_command(&config, "levels.add", r#"{ "height": 3.0 }"#, Some(&snapshot)).unwrap();
        assert!(response.success);
        assert!(snapshot.is_file());

        let response = run_command(&config, "levels.list", "", Some(&snapshot)).unwrap();
        let data = response.data.unwrap();
        assert_eq!(data["levels"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn failed_command_leaves_snapshot_alone() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let snapshot = dir.path().join("host.json");

        let response =
            run_command(&config, "levels.create_base", r#"{ "number": 4 }"#, Some(&snapshot))
                .unwrap();
        assert!(!response.success);
        assert!(!snapshot.exists());
        assert!(matches!(
            run_command(&config, "levels.list", "{", None),
            Err(FrontendError::InvalidParams(_))
        ));
    }
}
