use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};
use vista_config::{AppConfig, ConfigError, FrontendMode};

mod runtime_assets;

#[derive(Parser)]
#[command(name = "vista")]
#[command(about = "视图配置目录与场景协调工具", long_about = None)]
struct Cli {
    /// 配置文件路径，默认按 `VISTA_CONFIG` 与 `./config/default.toml` 查找
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// 只准备数据，不运行演示
    #[arg(long)]
    quiet: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// 在演示场景上运行一组示例命令
    Demo,
    /// 执行单条命令并以 JSON 输出结果
    Exec {
        /// 命令名，例如 `levels.add`
        name: String,
        /// JSON 参数
        #[arg(default_value = "")]
        params: String,
        /// 宿主快照文件：命令在其上执行，成功后写回
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
    /// 列出全部命令
    Commands,
}

fn main() {
    let cli = Cli::parse();

    let config = load_configuration(cli.config);
    init_logging(&config);
    info!("启动 Vista 应用");

    match runtime_assets::ensure_default_data(&config.paths) {
        Ok(seeded) if !seeded.is_empty() => info!(?seeded, "已准备默认数据"),
        Ok(_) => {}
        Err(err) => warn!(error = %err, "无法准备默认数据"),
    }

    match cli.command {
        Some(Commands::Demo) => run_demo(&config),
        Some(Commands::Exec {
            name,
            params,
            snapshot,
        }) => match vista_frontend::run_cli_command(&config, &name, &params, snapshot.as_deref()) {
            Ok(true) => {}
            Ok(false) => std::process::exit(1),
            Err(err) => {
                error!(error = %err, "执行命令失败");
                std::process::exit(1);
            }
        },
        Some(Commands::Commands) => vista_frontend::list_commands(),
        None => {
            let mode = if cli.quiet {
                FrontendMode::Quiet
            } else {
                config.frontend.default_mode
            };
            match mode {
                FrontendMode::Cli => run_demo(&config),
                FrontendMode::Quiet => info!("静默模式，跳过演示"),
            }
        }
    }
}

fn run_demo(config: &AppConfig) {
    info!("以 CLI 模式启动");
    if let Err(err) = vista_frontend::run_cli_demo(config) {
        error!(error = %err, "执行 CLI 演示失败");
        std::process::exit(1);
    }
}

fn load_configuration(override_path: Option<PathBuf>) -> AppConfig {
    match override_path {
        Some(path) => AppConfig::from_file(&path).unwrap_or_else(|err| {
            eprintln!("加载指定配置 {} 失败，使用默认配置: {err}", path.display());
            AppConfig::default()
        }),
        None => match AppConfig::discover() {
            Ok(cfg) => cfg,
            Err(err) => {
                match &err {
                    ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
                        eprintln!("加载默认配置 {} 失败，使用内建默认值: {err}", path.display());
                    }
                    ConfigError::Context { .. } => {
                        eprintln!("加载默认配置失败，使用内建默认值: {err}");
                    }
                }
                AppConfig::default()
            }
        },
    }
}

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    // 日志写到 stderr，stdout 留给命令输出
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
