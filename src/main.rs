//! XJP Model Deploy - 远程模型一键部署服务
//!
//! Usage:
//! - Normal mode: `xjp-model-deploy`
//! - With custom port: `xjp-model-deploy --port 19999`

use std::sync::Arc;

use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use xjp_model_deploy::api;
use xjp_model_deploy::config::env::constants::VERSION;
use xjp_model_deploy::state::AppState;

/// 解析命令行参数，返回端口覆盖值
fn parse_args() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    let mut port_override = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" if i + 1 < args.len() => {
                port_override = args[i + 1].parse().ok();
                i += 2;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                i += 1;
            }
        }
    }

    port_override
}

fn print_help() {
    println!("XJP Model Deploy - 远程模型一键部署服务");
    println!();
    println!("USAGE:");
    println!("    xjp-model-deploy [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --port <PORT>    Override the listening port");
    println!("    -h, --help       Print help information");
    println!();
    println!("EXAMPLES:");
    println!("    xjp-model-deploy                # Normal mode");
    println!("    xjp-model-deploy --port 19999   # Custom port");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let port_override = parse_args();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = VERSION, "XJP Model Deploy starting");

    let state = Arc::new(AppState::new());
    if state.store.load().await {
        info!(
            deployments = state.store.deployment_count().await,
            "Restored deployment records"
        );
    }

    let port = port_override.unwrap_or(state.config.port);
    let app = api::router(state.clone());

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    info!("Shutdown complete");
    Ok(())
}

/// 等待退出信号：Ctrl+C、SIGTERM 或内部关闭令牌
async fn shutdown_signal(state: Arc<AppState>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            info!("received SIGTERM, initiating shutdown");
        }
        () = state.shutdown.cancelled() => {
            info!("shutdown requested");
        }
    }
}
