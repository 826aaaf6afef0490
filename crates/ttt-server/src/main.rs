//! Process entry point: wires up logging, reads `PORT` from the
//! environment, and runs the room service until the process is killed.

use ttt_server::{ServerError, TttServer};

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    let server = TttServer::builder().bind(format!("0.0.0.0:{port}")).build().await?;
    server.run().await
}
