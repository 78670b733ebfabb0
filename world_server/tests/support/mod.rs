// Boots one world server per test binary and shares its base URL.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, OnceLock},
    time::Duration,
};

use axum::{Json, Router, extract::Path, http::StatusCode, routing::get};
use serde_json::{Value, json};
use uuid::Uuid;
use world_server::ServerSettings;

static SERVER_URL: OnceLock<String> = OnceLock::new();
static SERVER_READY: OnceLock<()> = OnceLock::new();

// Characters served by the fake character service. Unknown ids are 404.
static CHARACTERS: OnceLock<Mutex<HashMap<Uuid, Value>>> = OnceLock::new();

fn characters() -> &'static Mutex<HashMap<Uuid, Value>> {
    CHARACTERS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Stores a character at `(x, y)` and returns its id for `JoinCharacter`.
pub fn register_character(name: &str, x: i32, y: i32) -> Uuid {
    let id = Uuid::new_v4();
    let record = json!({
        "id": id,
        "name": name,
        "level": 1,
        "health": 100,
        "color": "red",
        "bg": "black",
        "position": { "x": x, "y": y, "z": 0 }
    });
    characters()
        .lock()
        .expect("characters mutex poisoned")
        .insert(id, record);
    id
}

async fn get_character(Path(id): Path<Uuid>) -> Result<Json<Value>, StatusCode> {
    characters()
        .lock()
        .expect("characters mutex poisoned")
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn start_characters_service() -> String {
    let app = Router::new().route("/v1/characters/{id}", get(get_character));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind characters service");
    let addr = listener.local_addr().expect("characters service addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

fn test_settings(characters_service_url: String) -> ServerSettings {
    let dir = std::env::temp_dir().join(format!("world-server-it-{}", Uuid::new_v4()));
    ServerSettings {
        characters_service_url,
        characters_request_timeout: Duration::from_millis(500),
        tick_interval: Duration::from_millis(50),
        spawn_search_radius: 10,
        move_log_path: dir.join("accepted_moves.jsonl"),
        world_map_path: None,
    }
}

// Ensure the test server is running and return the shared base URL.
pub fn ensure_server() -> &'static str {
    SERVER_READY.get_or_init(|| {
        let published_url = Arc::new(OnceLock::<String>::new());
        let published_url_thread = Arc::clone(&published_url);
        // An OS thread outlives individual `#[tokio::test]` runtimes.
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().expect("test runtime");
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("bind ephemeral test port");
                let addr = listener.local_addr().expect("get local addr");
                let characters_url = start_characters_service().await;
                let _ = published_url_thread.set(format!("http://{}", addr));
                world_server::run_with_settings(listener, test_settings(characters_url))
                    .await
                    .expect("server failed");
            });
        });
        wait_for_server_url_and_readiness(published_url);
    });

    SERVER_URL
        .get()
        .expect("server url should be initialized")
        .as_str()
}

pub fn ws_url(base_url: &str, query: &str) -> String {
    let host = base_url
        .strip_prefix("http://")
        .expect("base url should use http://");
    format!("ws://{host}/ws{query}")
}

fn wait_for_server_url_and_readiness(published_url: Arc<OnceLock<String>>) {
    let base_url = loop {
        if let Some(url) = published_url.get() {
            break url.clone();
        }
        std::thread::sleep(Duration::from_millis(10));
    };

    let _ = SERVER_URL.set(base_url.clone());

    let addr = base_url
        .strip_prefix("http://")
        .expect("base url should use http://");

    for _ in 0..100 {
        if std::net::TcpStream::connect(addr).is_ok() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    panic!("server did not become ready in time");
}
