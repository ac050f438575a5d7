use std::net::SocketAddr;

use axum::{
    Router,
    routing::{get, post},
};
use ctmatch_core::MatchError;
use ctmatch_query::{ClinicalTrialLookup, configured_registry, create_lookup};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{config::AppConfig, handlers};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub lookup: ClinicalTrialLookup,
}

impl AppState {
    /// Build the lookup described by `cfg` and load its code tables.
    pub async fn from_config(cfg: &AppConfig) -> Result<Self, MatchError> {
        let registry = configured_registry(&cfg.lookup)?;
        let lookup = create_lookup(&cfg.lookup, registry)?;
        lookup.warm_up().await?;
        Ok(Self { lookup })
    }
}

pub fn build_app(state: AppState, cfg: &AppConfig) -> Router {
    let body_limit = cfg.server.body_limit_bytes;
    Router::new()
        .route("/health", get(handlers::health))
        .route("/getClinicalTrial", post(handlers::get_clinical_trial))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = tracing::field::Empty,
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
}

pub struct CtmatchServer {
    addr: SocketAddr,
    app: Router,
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    pub async fn build(self) -> Result<CtmatchServer, MatchError> {
        let state = AppState::from_config(&self.config).await?;
        Ok(CtmatchServer {
            addr: self.addr,
            app: build_app(state, &self.config),
        })
    }
}

impl CtmatchServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
