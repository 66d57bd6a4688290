/// htmc-ws
///
/// Makes sure the htmc toolchain is installed and current, then serves
/// every HTTP request by running htmc as a CGI program.
mod cgi;
mod routes;

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use htmc_ws_downloader::Synchronizer;
use htmc_ws_shared::config::Config;
use htmc_ws_shared::errors::WsResult;
use htmc_ws_shared::layout::Layout;
use htmc_ws_shared::prompt::{AssumeYes, Confirm, StdinConfirm};

use crate::cgi::{HtmcCgi, RequestExecutor};

/// Shared state for the forwarding handler.
pub struct AppState {
    pub executor: Arc<dyn RequestExecutor>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "htmc_ws=info,htmc_ws_downloader=info,htmc_ws_shared=info,tower_http=info".into()
            }),
        )
        .init();

    // Config (loads .env)
    let mut config = Config::from_env()?;

    // Directory layout
    config.layout = prepare_layout(&config.layout)?;
    info!("Root directory: {}", config.layout.root().display());

    // Install or update htmc
    let confirm: &dyn Confirm = if config.assume_yes {
        &AssumeYes
    } else {
        &StdinConfirm
    };
    let outcome = Synchronizer::new(&config, confirm)?.run().await?;
    if !outcome.should_serve() {
        return Ok(());
    }
    if outcome.is_current() {
        println!("All up to date");
    }

    // Router
    let state = Arc::new(AppState {
        executor: Arc::new(HtmcCgi::new(&config.layout, &config.server)),
    });
    let app = routes::router(state);

    // Bind
    let addr = config.server.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("could not listen on {}", addr))?;
    println!("Listening on {}", addr);
    info!("htmc-ws listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Create the directory tree, then pin the root to an absolute path so
/// htmc can be spawned with it as working directory.
fn prepare_layout(layout: &Layout) -> WsResult<Layout> {
    layout.prepare()?;
    Ok(layout.canonicalize()?)
}
