//! Process entry point: loads configuration, initialises tracing and
//! metrics, resolves the WebRTC engine, wires `AppState`, and serves the
//! router with graceful shutdown (§10.1, §10.2).

use std::net::SocketAddr;

use friday_voice_config::Settings;
use friday_voice_server::{router, AppState};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(error) => {
            eprintln!("failed to load configuration, falling back to defaults: {error}");
            Settings::default()
        }
    };

    init_tracing(&settings);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting friday-voice-server");

    if settings.observability.metrics_enabled {
        let _metrics_handle = friday_voice_server::metrics::init_metrics();
    }

    let webrtc_engine = friday_voice_transport::resolve_engine(settings.server.stun_servers.clone());
    if !webrtc_engine.is_available() {
        tracing::warn!("webrtc engine unavailable; every offer will be answered with wrtc_unavailable");
    }

    let addr = SocketAddr::new(settings.server.host.parse()?, settings.server.port);
    let state = AppState::new(settings, webrtc_engine);
    let app = router(state);

    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
        _ = terminate => tracing::info!("received sigterm, shutting down"),
    }
}

fn init_tracing(settings: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| settings.observability.log_filter.clone().into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if settings.observability.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
