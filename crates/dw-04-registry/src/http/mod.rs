//! # Registry REST Surface
//!
//! axum router over [`RegistryService`]. Middleware order (outermost
//! first): CORS, tracing, timeout, per-IP rate limit.

mod error;
mod handlers;
pub mod rate_limit;


use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, HeaderValue, Method};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, patch, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::config::RegistryConfig;
use crate::service::{spawn_pointer_sweep, RegistryService};
use rate_limit::{RateLimitState, BUCKET_IDLE_TTL};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RegistryService>,
}

/// CORS layer from the configured origin list. `*` allows any origin.
pub fn create_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static("retry-after")])
        .max_age(Duration::from_secs(3600));

    if allowed_origins.iter().any(|o| o == "*") {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}

/// Build the router with its own rate limiter.
pub fn build_router(service: Arc<RegistryService>, config: &RegistryConfig) -> Router {
    let limiter = Arc::new(RateLimitState::new(config.rate_limit.clone()));
    build_router_with_limiter(service, config, limiter)
}

fn build_router_with_limiter(
    service: Arc<RegistryService>,
    config: &RegistryConfig,
    limiter: Arc<RateLimitState>,
) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(create_cors_layer(&config.cors_allowed_origins))
        .map_response(|res: axum::response::Response<_>| res.map(axum::body::Body::new))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(from_fn_with_state(limiter, rate_limit::rate_limit));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/manifests",
            post(handlers::create_manifest).get(handlers::list_manifests),
        )
        .route("/manifests/:id", get(handlers::get_manifest))
        .route("/manifests/:id/replicas", patch(handlers::update_replicas))
        .route(
            "/manifests/:id/chunks/:index",
            get(handlers::get_chunk).patch(handlers::update_chunk_pointer),
        )
        .route(
            "/manifests/:id/chunks/:index/pointers",
            get(handlers::get_pointer_history),
        )
        .route(
            "/domains",
            post(handlers::register_domain).get(handlers::list_domains),
        )
        .route(
            "/domains/:domain",
            get(handlers::get_domain)
                .patch(handlers::update_domain)
                .delete(handlers::delete_domain),
        )
        .route("/maintenance/prune-pointers", post(handlers::prune_pointers))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(middleware)
        .with_state(AppState { service })
}

/// The registry HTTP server with its background sweep.
pub struct RegistryServer {
    service: Arc<RegistryService>,
    config: RegistryConfig,
}

impl RegistryServer {
    pub fn new(service: Arc<RegistryService>, config: RegistryConfig) -> Self {
        Self { service, config }
    }

    pub fn service(&self) -> Arc<RegistryService> {
        Arc::clone(&self.service)
    }

    /// Bind the configured address and serve until `shutdown` turns true.
    pub async fn serve(self, shutdown: watch::Receiver<bool>) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already bound listener.
    ///
    /// Runs the pointer sweep (first pass immediately) and rate-limit
    /// bucket cleanup alongside the server.
    pub async fn serve_on(
        self,
        listener: TcpListener,
        shutdown: watch::Receiver<bool>,
    ) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        let limiter = Arc::new(RateLimitState::new(self.config.rate_limit.clone()));
        let router =
            build_router_with_limiter(Arc::clone(&self.service), &self.config, Arc::clone(&limiter));

        let sweep = spawn_pointer_sweep(
            Arc::clone(&self.service),
            self.config.prune_interval(),
            shutdown.clone(),
        );
        let cleanup = {
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(BUCKET_IDLE_TTL);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => limiter.cleanup(BUCKET_IDLE_TTL),
                        _ = shutdown.changed() => break,
                    }
                }
            })
        };

        info!(
            addr = %addr,
            prune_interval_secs = self.config.prune_interval().as_secs(),
            "[dw-04] 🚀 Registry listening"
        );

        let mut stop = shutdown;
        let result = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = stop.wait_for(|stopped| *stopped).await;
        })
        .await;

        sweep.abort();
        cleanup.abort();
        debug!("[dw-04] Registry server stopped");
        result
    }
}
