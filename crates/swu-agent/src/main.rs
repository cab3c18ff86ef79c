use anyhow::{Context, Result};
use clap::Parser;
use swu_core::agent::Agent;
use swu_core::cancel::CancelToken;
use swu_core::download::DownloadEngine;
use swu_core::logging;

mod cli;
mod command_socket;
mod installer;
mod source;
mod status_file;

#[tokio::main]
async fn main() {
    logging::init();

    if let Err(err) = run().await {
        eprintln!("swu-agent error: {:#}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = cli::Cli::parse();

    let installer = installer::CommandInstaller::new(cli.installer.clone());
    installer
        .ensure_available()
        .context("installer preflight failed")?;

    let cancel = CancelToken::new();
    spawn_signal_task(cancel.clone());

    let (publisher, commands) = source::channel();
    command_socket::spawn_listener(publisher, &cli.command_socket, cancel.clone())
        .with_context(|| format!("could not bind {}", cli.command_socket.display()))?;

    let sink = status_file::FileStatusSink::new(&cli.status_file);
    let engine = DownloadEngine::new(&cli.download_dir);
    let agent = Agent::new(commands, sink, installer, engine, cli.update_mode);

    // The loop is synchronous; park it on a blocking thread and keep the
    // runtime free for the socket and signal tasks.
    tokio::task::spawn_blocking(move || agent.run(&cancel))
        .await
        .context("orchestration loop panicked")?;
    Ok(())
}

fn spawn_signal_task(cancel: CancelToken) {
    tokio::spawn(async move {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(e) => {
                    tracing::warn!("could not install SIGTERM handler: {}", e);
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("received SIGINT, shutting down"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
        }
        cancel.cancel();
    });
}
