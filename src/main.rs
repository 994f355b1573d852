use clap::Parser;
use cloudpush_lib::config::{self, RemoteConfig};
use cloudpush_lib::core::format_size;
use cloudpush_lib::logging::{get_log_dir, LogConfig, SizeRotatingWriter};
use cloudpush_lib::storage::resolve;
use cloudpush_lib::{SyncEngine, SyncOptions};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;

/// 将一个存储位置的目录树推送到另一个存储位置
#[derive(Parser, Debug)]
#[command(name = "cloudpush", version, about)]
struct Args {
    /// 同步成功后删除源文件
    #[arg(short = 'd', long = "delete-local")]
    delete_local: bool,

    /// 文件路径过滤表达式（正则）
    #[arg(short, long, default_value = ".*")]
    filter: String,

    /// 起始目录（相对于源与目标的根）
    #[arg(short, long, default_value = "")]
    path: String,

    /// 配置目录
    #[arg(long, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    /// 输出调试日志
    #[arg(short, long)]
    verbose: bool,

    /// 源位置，例如 file:///data 或 s3://bucket/prefix
    source: String,

    /// 目标位置
    destination: String,
}

/// 初始化日志系统，返回的 guard 需持有到进程结束
fn init_logging(config_dir: &Path, verbose: bool) -> anyhow::Result<Option<WorkerGuard>> {
    let config = LogConfig::load(config_dir);

    if !config.enabled {
        tracing::subscriber::set_global_default(tracing_subscriber::registry())?;
        return Ok(None);
    }

    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        config.tracing_level()
    };
    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("opendal=warn".parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    if !config.file {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .try_init()?;
        return Ok(None);
    }

    let file_writer = SizeRotatingWriter::new(&get_log_dir(config_dir), config.max_size_mb)?;
    let log_file = file_writer.file_path().to_path_buf();
    let (non_blocking, guard) = tracing_appender::non_blocking(file_writer);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;
    tracing::debug!("日志文件: {}", log_file.display());

    Ok(Some(guard))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    let config_dir = config::config_dir(args.config_dir.clone());

    let _guard = match init_logging(&config_dir, args.verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("初始化日志失败: {}", e);
            None
        }
    };

    info!("启动参数: {:?}", args);

    let remote_config = RemoteConfig::load(&config_dir);

    let source = match resolve(&args.source, &remote_config).await {
        Ok(container) => container,
        Err(e) => {
            error!("无法解析源位置 {}: {}", args.source, e);
            return ExitCode::from(1);
        }
    };
    let destination = match resolve(&args.destination, &remote_config).await {
        Ok(container) => container,
        Err(e) => {
            error!("无法解析目标位置 {}: {}", args.destination, e);
            return ExitCode::from(1);
        }
    };

    let options = match SyncOptions::new(&args.filter) {
        Ok(options) => options
            .with_delete_source(args.delete_local)
            .with_checksum_verification(!config::checksum_disabled()),
        Err(e) => {
            error!("过滤表达式无效 {}: {}", args.filter, e);
            return ExitCode::from(1);
        }
    };
    if args.delete_local {
        warn!("已启用同步后删除源文件");
    }

    let engine = SyncEngine::new();
    let report = match engine
        .sync(source.as_ref(), destination.as_ref(), &args.path, &options)
        .await
    {
        Ok(report) => report,
        Err(e) => {
            error!("同步中止: {}", e);
            return ExitCode::from(1);
        }
    };

    let (uploaded, stored) = report.totals();
    info!(
        "Finished: 上传 {}, 目标端共 {}",
        format_size(uploaded),
        format_size(stored)
    );
    for failure in &report.errors {
        warn!("未完成: {}", failure);
    }

    ExitCode::SUCCESS
}
