mod cli;

use std::io::IsTerminal;
use std::process;

use bindwatch::{ForwarderOptions, LogTarget, WatchForwarder};
use clap::Parser;
use cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let options = match cli.forwarder_options() {
        Ok(options) => options,
        Err(error) => {
            eprintln!("Error: {:#}", error);
            process::exit(1);
        }
    };

    // Console only when someone is watching; services and detached runs log to a file.
    let target = LogTarget::resolve(cli.global.log_file.clone(), std::io::stdin().is_terminal());
    let guard = match bindwatch::init_logging(&target, cli.global.debug) {
        Ok(guard) => guard,
        Err(error) => {
            eprintln!("Error: {}", error);
            process::exit(1);
        }
    };

    let code = match run(options).await {
        Ok(()) => 0,
        Err(error) => {
            tracing::error!("{:#}", error);
            eprintln!("Error: {:#}", error);
            1
        }
    };

    // Flush buffered log lines before exiting.
    drop(guard);
    process::exit(code);
}

async fn run(options: ForwarderOptions) -> anyhow::Result<()> {
    let forwarder = WatchForwarder::start(options)?;
    tracing::info!(endpoint = %forwarder.endpoint(), "bindwatch started");

    tokio::select! {
        _ = shutdown_signal() => tracing::info!("Shutdown requested, draining watchers"),
        _ = forwarder.stopped() => {}
    }

    forwarder.stop().await?;
    tracing::info!("bindwatch stopped");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install SIGTERM handler");
            ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    ctrl_c().await;
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
