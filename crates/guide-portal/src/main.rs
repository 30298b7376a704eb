mod cache;
mod config;
mod dashboard;
mod error;
mod server;
mod session;
#[cfg(test)]
mod testing;
mod views;

use std::sync::Arc;

use portal_common::access::{AccessStore, MemoryAccessStore, RedisAccessStore};
use portal_common::memory::InMemoryGuideService;
use portal_common::redis::RedisStore;
use portal_common::remote::GuideService;
use rmcp::{ServiceExt, transport::stdio};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use dashboard::{Dashboard, DashboardEvent};
use error::AppError;
use server::GuidePortalServer;

const REDIS_PREFIX: &str = "guide-portal:";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!("starting guide-portal MCP server");

    let config = Config::from_env()?;
    info!(
        seed_file = ?config.seed_file,
        user = config.user_id.is_some(),
        redis = config.redis_url.is_some(),
        cache_ttl_secs = config.cache_ttl.as_secs(),
        "configuration loaded"
    );

    let redis = RedisStore::new(config.redis_url.as_deref(), REDIS_PREFIX);
    let store: Box<dyn AccessStore> = if redis.is_available().await {
        info!("redis connected");
        Box::new(RedisAccessStore::new(redis.clone()))
    } else {
        info!("redis unavailable, access code kept in memory");
        Box::new(MemoryAccessStore::new())
    };

    let remote = match &config.seed_file {
        Some(path) => Arc::new(InMemoryGuideService::from_seed_file(path)?),
        None => Arc::new(InMemoryGuideService::new()),
    };

    let session = match (&config.user_id, &config.access_code) {
        (None, Some(code)) => {
            session::enter_access_code(remote.as_ref(), store.as_ref(), code).await?
        }
        _ => {
            session::resolve_session(remote.as_ref(), config.user_id.as_deref(), store.as_ref())
                .await?
        }
    };

    let dashboard = Dashboard::open(
        remote as Arc<dyn GuideService>,
        session,
        config.dashboard_settings(),
    )
    .await;

    let mut events = dashboard.events();
    let organization_id = dashboard.session().organization_id.clone();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(DashboardEvent::GuidesChanged(change)) => {
                    info!(guide_id = %change.guide_id, kind = ?change.kind, "guides changed remotely");
                }
                Ok(DashboardEvent::SubscriptionLost) => {
                    let lost = AppError::SubscriptionLost(organization_id.clone());
                    warn!(error = %lost, "listings may be stale until restart");
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let server = GuidePortalServer::new(Arc::new(dashboard), redis);

    if let Ok(addr) = std::env::var("MCP_TCP_LISTEN_ADDR") {
        let listener = TcpListener::bind(&addr).await?;
        info!(listen_addr = %addr, "MCP server ready, serving on TCP");
        loop {
            let (stream, peer) = listener.accept().await?;
            let server = server.clone();
            tokio::spawn(async move {
                tracing::info!(peer = %peer, "MCP client connected");
                let service = server.serve(stream).await.inspect_err(|e| {
                    tracing::error!(error = %e, "MCP server error");
                })?;
                service.waiting().await?;
                tracing::info!(peer = %peer, "MCP client disconnected");
                Ok::<(), anyhow::Error>(())
            });
        }
    } else {
        info!("MCP server ready, serving on stdio");
        let service = server.serve(stdio()).await.inspect_err(|e| {
            tracing::error!(error = %e, "MCP server error");
        })?;
        service.waiting().await?;
        info!("MCP server shut down");
    }
    Ok(())
}
