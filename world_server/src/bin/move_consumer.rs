// Replays the accepted-move log into the character store.

#[tokio::main]
async fn main() -> std::io::Result<()> {
    world_server::run_consumer().await
}
