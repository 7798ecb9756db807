#[cfg(feature = "cli")]
pub mod cli;
pub mod errors;
pub mod loader;
pub mod resource_locator;

use errors::FrontendError;
use tracing::info;
use vista_config::AppConfig;

/// 启动 CLI 演示或返回错误。
#[cfg(feature = "cli")]
pub fn run_cli_demo(config: &AppConfig) -> Result<(), FrontendError> {
    info!("启动 CLI 演示前端");
    cli::run_demo(config);
    Ok(())
}

/// 执行单条命令并打印 JSON 响应，返回命令是否成功。
#[cfg(feature = "cli")]
pub fn run_cli_command(
    config: &AppConfig,
    name: &str,
    params: &str,
    snapshot: Option<&std::path::Path>,
) -> Result<bool, FrontendError> {
    info!(command = name, "执行单条命令");
    let response = cli::run_command(config, name, params, snapshot)?;
    println!("{}", cli::render_response(&response)?);
    Ok(response.success)
}

/// 打印全部已注册命令。
pub fn list_commands() {
    let bus = vista_engine::command::CommandBus::new();
    for name in bus.available_commands() {
        println!("{name}");
    }
}
