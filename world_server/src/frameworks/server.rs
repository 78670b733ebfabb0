// Framework bootstrap for the world server runtime.

use crate::domain::WorldMap;
use crate::frameworks::config::{self, ServerSettings};
use crate::interface_adapters::broadcast::{ChannelBroadcaster, snapshot_serializer};
use crate::interface_adapters::clients::characters::CharactersClient;
use crate::interface_adapters::event_log::MoveLog;
use crate::interface_adapters::net::{state_handler, ws_handler};
use crate::interface_adapters::state::AppState;
use crate::use_cases::{
    ActorRegistry, EngineSettings, JoinCharacterUseCase, PublishSettings, TickEngine,
    action_queue, spawn_move_publisher,
};

use axum::{Router, extract::ws::Utf8Bytes, routing::get};
use std::future::Future;
use std::net::SocketAddr;
use std::{io::Result, sync::Arc};
use tokio::sync::{Notify, broadcast, watch};

pub(crate) fn init_runtime() {
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

/// Serves with settings from the environment until the process exits.
pub async fn run(listener: tokio::net::TcpListener) -> Result<()> {
    run_with_settings(listener, ServerSettings::from_env()).await
}

pub async fn run_with_settings(
    listener: tokio::net::TcpListener,
    settings: ServerSettings,
) -> Result<()> {
    serve(listener, settings, std::future::pending()).await
}

pub async fn run_with_config() -> Result<()> {
    init_runtime();

    let address = SocketAddr::from(([127, 0, 0, 1], config::http_port()));

    let listener = tokio::net::TcpListener::bind(address)
        .await
        .inspect_err(|e| {
            tracing::error!(%address, error = %e, "failed to bind");
        })?;

    serve(listener, ServerSettings::from_env(), async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown requested");
    })
    .await
}

async fn serve<F>(
    listener: tokio::net::TcpListener,
    settings: ServerSettings,
    shutdown_signal: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let address = listener.local_addr()?;
    let engine_shutdown = Arc::new(Notify::new());
    let state = build_state(&settings, engine_shutdown.clone()).await?;

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/state", get(state_handler))
        .with_state(state);

    tracing::info!(%address, "listening");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .inspect_err(|e| {
            tracing::error!(error = %e, "server error");
        });

    // Stored as a permit, so the engine sees it even mid-tick.
    engine_shutdown.notify_one();
    result
}

fn load_map(settings: &ServerSettings) -> Result<WorldMap> {
    match &settings.world_map_path {
        Some(path) => {
            let map = WorldMap::load(path).map_err(|e| {
                std::io::Error::other(format!("failed to load map {}: {e}", path.display()))
            })?;
            tracing::info!(
                path = %path.display(),
                width = map.width(),
                height = map.height(),
                "world map loaded"
            );
            Ok(map)
        }
        None => {
            tracing::info!("using built-in world map");
            Ok(WorldMap::builtin())
        }
    }
}

async fn build_state(settings: &ServerSettings, engine_shutdown: Arc<Notify>) -> Result<Arc<AppState>> {
    let map = Arc::new(load_map(settings)?);
    let registry = Arc::new(ActorRegistry::new());
    let (intents, queue) = action_queue();

    let characters_url = settings.characters_service_url.clone();
    let characters_timeout = settings.characters_request_timeout;
    let characters = CharactersClient::new(characters_url.clone(), characters_timeout)
        .map_err(|e| std::io::Error::other(format!("failed to initialize characters client: {e}")))?;
    tracing::debug!(
        characters_url = %characters_url,
        characters_timeout_ms = characters_timeout.as_millis() as u64,
        "characters client configured"
    );

    // One long-lived publisher; the tick only hands events to the outbox.
    let move_log_path = &settings.move_log_path;
    let move_log = MoveLog::open(move_log_path).await.inspect_err(|e| {
        tracing::error!(path = %move_log_path.display(), error = %e, "failed to open move log");
    })?;
    tracing::info!(path = %move_log.path().display(), "move log opened");
    let (outbox, _publisher) = spawn_move_publisher(
        Arc::new(move_log),
        PublishSettings {
            max_attempts: config::MOVE_PUBLISH_ATTEMPTS,
            backoff: config::MOVE_PUBLISH_BACKOFF,
        },
    );

    let broadcaster = Arc::new(ChannelBroadcaster::new(
        config::SNAPSHOT_BROADCAST_CAPACITY,
        config::CHAT_BROADCAST_CAPACITY,
    ));
    let (snapshot_bytes_tx, _snapshot_bytes_rx) =
        broadcast::channel::<Utf8Bytes>(config::SNAPSHOT_BROADCAST_CAPACITY);
    let (snapshot_latest_tx, _snapshot_latest_rx) = watch::channel(Utf8Bytes::from_static(""));

    // Subscribe the serializer before the first tick can run.
    tokio::spawn(snapshot_serializer(
        broadcaster.subscribe_snapshots(),
        snapshot_bytes_tx.clone(),
        snapshot_latest_tx.clone(),
    ));

    let engine = TickEngine::new(
        map.clone(),
        registry.clone(),
        queue,
        intents.clone(),
        broadcaster.clone(),
        outbox,
        EngineSettings {
            tick_interval: settings.tick_interval,
        },
    );
    tokio::spawn(engine.run(engine_shutdown));

    let join = JoinCharacterUseCase {
        store: characters,
        registry: registry.clone(),
        map: map.clone(),
        spawn_radius: settings.spawn_search_radius,
    };

    Ok(Arc::new(AppState {
        registry,
        intents,
        join: Arc::new(join),
        broadcaster,
        snapshot_bytes_tx,
        snapshot_latest_tx,
    }))
}
