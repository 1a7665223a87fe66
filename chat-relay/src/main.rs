use anyhow::{Context, Result};
use clap::Parser;
use tokio::{net::TcpListener, sync::watch};
use tracing::{info, warn};

use chat_relay::{
    cli::{Cli, Command, ServeArgs},
    client,
    server::{ChatState, http, tcp::TcpServer},
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => {
            if let Err(err) = serve(args).await {
                warn!("relay exited with error: {err:?}");
                return Err(err);
            }
        }
        Command::Client(args) => client::run(args).await?,
    }

    Ok(())
}

async fn serve(args: ServeArgs) -> Result<()> {
    let state = ChatState::new(args.relay_settings());

    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;
    let server = TcpServer::new(listener, state.clone());
    info!("relay listening on {}", server.local_addr()?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http_task = match args.http_listen {
        Some(addr) => {
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("failed to bind {addr}"))?;
            info!("http listening on {}", listener.local_addr()?);
            Some(tokio::spawn(http::serve(
                listener,
                state.clone(),
                stopped(shutdown_rx.clone()),
            )))
        }
        None => None,
    };

    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = ?err, "failed to install ctrl-c handler");
        }
        let _ = shutdown_tx.send(true);
    });

    server.run_until(stopped(shutdown_rx)).await?;
    if let Some(http_task) = http_task {
        http_task.await??;
    }

    Ok(())
}

async fn stopped(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
