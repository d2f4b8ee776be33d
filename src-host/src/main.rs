mod codec;
mod dispatch;
mod native;
mod panels;
mod state;

use anyhow::Context;
use dispatch::Dispatcher;
use native::NativeMessagingHost;
use state::AppState;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout belongs to the browser.
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;
    runtime.block_on(run())
}

async fn run() -> anyhow::Result<()> {
    // The browser passes the calling extension's origin as the first argument.
    let origin = std::env::args().nth(1).unwrap_or_default();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (panel_tx, mut panel_rx) = mpsc::unbounded_channel();
    let host = Arc::new(NativeMessagingHost::new(outbound_tx, origin.clone()).with_panel_inbox(panel_tx));

    let state = AppState::initialize(host.clone()).context("failed to initialize MailMinder host")?;
    tracing::info!(%origin, config_version = state.config.version, "native messaging host started");
    if state.completion.api_key.is_none() {
        tracing::warn!(model = %state.completion.model, "no completion api key configured");
    }
    let dispatcher = Dispatcher::new(state.coordinator.clone(), state.panels.clone(), host);

    codec::spawn_writer(outbound_rx);
    let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
    codec::spawn_reader(inbound_tx);

    loop {
        tokio::select! {
            body = inbound_rx.recv() => match body {
                Some(body) => {
                    dispatcher.dispatch(&body);
                }
                None => break,
            },
            Some((tab, message)) = panel_rx.recv() => {
                dispatcher.deliver_to_panel(tab, message);
            }
        }
    }

    tracing::info!("browser closed the native messaging pipe");
    Ok(())
}
