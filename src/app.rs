//! Pipeline wiring
//!
//! Two tasks share one rendezvous queue: the extraction loop runs on the caller's
//! task, the publisher runs on its own. An interrupt cancels the shared shutdown
//! token, which closes the source and ends the server. The publisher drains the
//! queue until the extraction loop drops its sender, so documents go out whole.

use colored::*;
use eyre::{Context, Result};
use log::{info, warn};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, SourceMode};
use crate::engine::Extractor;
use crate::publish::{Hub, Publisher, backlog_len};
use crate::server::{self, ServerState, ViewerConfig};
use crate::source::{LineSource, PollSource, Source};
use crate::spec::Spec;

/// Run until input ends, an error occurs or the process is interrupted
pub async fn run(config: Config, mode: SourceMode, specs: Vec<Spec>) -> Result<()> {
    let shutdown = CancellationToken::new();

    let mut source = match mode {
        SourceMode::Stdin => Source::Line(LineSource::stdin(shutdown.child_token())),
        SourceMode::Poll { url, interval } => Source::Poll(PollSource::new(url, interval, shutdown.child_token())),
    };

    let field_count: usize = specs.iter().map(|spec| spec.fields.len()).sum();
    let backlog = if config.replay { backlog_len(config.steps, field_count) } else { 0 };
    let hub = Hub::new(backlog);

    let listener = TcpListener::bind((config.bind.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to listen on {}:{}", config.bind, config.port))?;
    let addr = listener.local_addr().context("Failed to read listening address")?;
    info!("Listening on http://{}", addr);
    eprintln!("{} listening on {}", "jplot:".bold(), format!("http://{}", addr).cyan());

    let server = tokio::spawn(server::serve(
        listener,
        ServerState {
            hub: hub.clone(),
            viewer: Arc::new(ViewerConfig::new(config.steps, &specs)),
            shutdown: shutdown.clone(),
        },
    ));
    let signals = tokio::spawn(wait_for_signal(shutdown.clone()));

    let (tx, rx) = mpsc::channel(1);
    let publisher = tokio::spawn(Publisher::new(hub).run(rx, shutdown.clone()));

    let result = Extractor::new(specs).run(&mut source, tx).await;

    let published = publisher.await.context("Publisher task failed")?;
    info!("Published {} events", published);

    shutdown.cancel();
    signals.abort();
    match server.await {
        Ok(Err(e)) => warn!("{:?}", e),
        Err(e) => warn!("Server task failed: {}", e),
        Ok(Ok(())) => {}
    }

    let documents = result.context("Data source error")?;
    info!("Processed {} documents", documents);
    Ok(())
}

async fn wait_for_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(terminate) => terminate,
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                interrupted().await;
                shutdown.cancel();
                return;
            }
        };
        tokio::select! {
            _ = interrupted() => {}
            _ = terminate.recv() => info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    interrupted().await;

    shutdown.cancel();
}

async fn interrupted() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received interrupt"),
        // Without a handler the default disposition still ends the process.
        Err(e) => {
            warn!("Failed to listen for interrupt: {}", e);
            std::future::pending::<()>().await
        }
    }
}
