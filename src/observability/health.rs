//! Health check HTTP server for container orchestration
//!
//! Serves the latest cluster health snapshot produced by the health monitor.
//!
//! - `GET /health` - snapshot; 200 when at least one broker is healthy, else 503
//! - `GET /ready` - 200 once a snapshot exists and the cluster is healthy
//! - `GET /live` - always 200 while the process runs
//! - `GET /` - endpoint list

use crate::health::ClusterHealthSnapshot;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use tokio::sync::watch;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

pub const DEFAULT_HEALTH_PORT: u16 = 8080;

/// Port from `HEALTH_PORT`, falling back to 8080
pub fn health_port_from_env() -> u16 {
    std::env::var("HEALTH_PORT")
        .ok()
        .and_then(|port| port.parse().ok())
        .unwrap_or(DEFAULT_HEALTH_PORT)
}

/// HTTP health server
pub struct HealthServer {
    port: u16,
    snapshots: watch::Receiver<Option<ClusterHealthSnapshot>>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cluster: Option<ClusterHealthSnapshot>,
}

#[derive(Debug, Serialize)]
struct ReadinessResponse {
    ready: bool,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct LivenessResponse {
    alive: bool,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct ApiDocumentationResponse {
    endpoints: BTreeMap<&'static str, &'static str>,
}

fn health_reply(snapshot: Option<ClusterHealthSnapshot>) -> warp::reply::WithStatus<warp::reply::Json> {
    let (status, code) = match &snapshot {
        None => ("pending", StatusCode::SERVICE_UNAVAILABLE),
        Some(s) if s.cluster_healthy() => ("healthy", StatusCode::OK),
        Some(_) => ("unhealthy", StatusCode::SERVICE_UNAVAILABLE),
    };
    let body = HealthResponse {
        status,
        timestamp: Utc::now(),
        cluster: snapshot,
    };
    warp::reply::with_status(warp::reply::json(&body), code)
}

fn ready_reply(snapshot: Option<&ClusterHealthSnapshot>) -> warp::reply::WithStatus<warp::reply::Json> {
    let ready = snapshot.is_some_and(ClusterHealthSnapshot::cluster_healthy);
    let code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = ReadinessResponse {
        ready,
        timestamp: Utc::now(),
    };
    warp::reply::with_status(warp::reply::json(&body), code)
}

impl HealthServer {
    pub fn new(port: u16, snapshots: watch::Receiver<Option<ClusterHealthSnapshot>>) -> Self {
        Self { port, snapshots }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn routes(&self) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
        let health_rx = self.snapshots.clone();
        let health_route = warp::path("health")
            .and(warp::path::end())
            .and(warp::get())
            .map(move || health_reply(health_rx.borrow().clone()));

        let ready_rx = self.snapshots.clone();
        let ready_route = warp::path("ready")
            .and(warp::path::end())
            .and(warp::get())
            .map(move || ready_reply(ready_rx.borrow().as_ref()));

        let live_route = warp::path("live")
            .and(warp::path::end())
            .and(warp::get())
            .map(|| {
                warp::reply::json(&LivenessResponse {
                    alive: true,
                    timestamp: Utc::now(),
                })
            });

        let root_route = warp::path::end().and(warp::get()).map(|| {
            let endpoints = BTreeMap::from([
                ("/health", "Cluster health snapshot"),
                ("/ready", "Readiness probe"),
                ("/live", "Liveness probe"),
            ]);
            warp::reply::json(&ApiDocumentationResponse { endpoints })
        });

        health_route.or(ready_route).or(live_route).or(root_route)
    }

    /// Serve until shutdown is signalled
    pub async fn start(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), warp::Error> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let (bound, server) = warp::serve(self.routes()).try_bind_with_graceful_shutdown(
            addr,
            async move {
                while !*shutdown.borrow() {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                }
            },
        )?;

        tracing::info!(addr = %bound, "Health server listening");
        server.await;
        tracing::info!("Health server stopped");
        Ok(())
    }
}
