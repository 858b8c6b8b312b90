//! Swarm Manager binary: serves the REST control plane over a bare
//! host/port pair. Bot processes register themselves
//! and push status samples; operators drive the hijack-lease family and
//! the control-plane endpoints against this process.

use std::env;
use std::sync::Arc;

use tokio::net::TcpListener;

use tw2002_swarm::http::build_router;
use tw2002_swarm::manager::{SwarmManager, SwarmManagerConfig};

const ENV_HOST: &str = "TW2002_SWARM_HOST";
const ENV_PORT: &str = "TW2002_SWARM_PORT";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8900;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let host = env::var(ENV_HOST).unwrap_or_else(|_| DEFAULT_HOST.to_owned());
    let port: u16 = env::var(ENV_PORT).ok().and_then(|p| p.parse().ok()).unwrap_or(DEFAULT_PORT);

    let manager = Arc::new(SwarmManager::new(SwarmManagerConfig::default()));
    let router = build_router(manager);

    let addr = format!("{host}:{port}");
    tracing::info!(%addr, "swarm manager listening");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}
