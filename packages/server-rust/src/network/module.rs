//! Network module with deferred startup lifecycle.
//!
//! `new()` takes the composed [`Services`], `start()` binds the TCP listener,
//! and `serve()` accepts connections until the shutdown future resolves. The
//! split lets the binary log the bound port before traffic arrives.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::handlers::{
    call_handler, call_method_not_allowed, chunks_handler, discovery_handler, health_handler,
    liveness_handler, media_data_handler, media_redirect_handler, poll_handler,
    readiness_handler, register_token_handler, stream_upgrade_handler, AppState,
};
use super::middleware::apply_http_layers;
use super::shutdown::ShutdownController;
use crate::app::Services;
use crate::service::worker::{BackgroundWorker, ExpirySweeper};

/// How long `serve` waits for in-flight calls after the listener stops.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Owns the HTTP/WebSocket server lifecycle.
pub struct NetworkModule {
    config: NetworkConfig,
    services: Arc<Services>,
    listener: Option<TcpListener>,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule {
    #[must_use]
    pub fn new(config: NetworkConfig, services: Arc<Services>) -> Self {
        Self {
            config,
            services,
            listener: None,
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    #[must_use]
    pub fn services(&self) -> Arc<Services> {
        Arc::clone(&self.services)
    }

    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    fn state(&self) -> AppState {
        AppState::new(
            Arc::clone(&self.services),
            Arc::clone(&self.shutdown),
            Arc::new(self.config.clone()),
        )
    }

    /// The full router with middleware, without binding anything.
    pub fn build_router(&self) -> Router {
        build_router(self.state())
    }

    /// Binds the listener and returns the actual port (OS-assigned when the
    /// configured port is 0).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();
        info!(host = %self.config.host, port, "listener bound");
        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves until `shutdown` resolves, then drains.
    ///
    /// Draining closes every stream listener with "server shutting down" as
    /// soon as the signal fires, then waits for in-flight `/call` requests.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called, or on a fatal I/O error.
    pub async fn serve(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let state = self.state();
        let Some(listener) = self.listener else {
            anyhow::bail!("start() must be called before serve()");
        };
        let services = self.services;
        let controller = self.shutdown;

        let mut sweeper = self.config.expiry_sweep_interval.map(|every| {
            info!(interval = ?every, "expiry sweeper enabled");
            BackgroundWorker::start(
                ExpirySweeper::new(
                    Arc::clone(&services.instances),
                    Arc::clone(&services.sessions),
                    Arc::clone(&services.clock),
                ),
                every,
            )
        });

        let router = build_router(state);
        controller.set_ready();

        // Open sockets would otherwise hold graceful shutdown open.
        let signal = {
            let controller = Arc::clone(&controller);
            let services = Arc::clone(&services);
            async move {
                shutdown.await;
                controller.begin_drain(&services.broadcaster);
            }
        };

        axum::serve(listener, router)
            .with_graceful_shutdown(signal)
            .await?;

        if let Some(worker) = sweeper.as_mut() {
            worker.stop().await;
        }

        if controller.wait_for_drain(DRAIN_TIMEOUT).await {
            info!("drain complete");
        } else {
            warn!(
                in_flight = controller.in_flight_count(),
                "drain timed out with calls still in flight"
            );
        }
        Ok(())
    }
}

/// Mounts every route on `state`.
///
/// axum's default body cap is disabled so `max_body_bytes` from the
/// middleware stack is the only limit.
pub fn build_router(state: AppState) -> Router {
    let config = Arc::clone(&state.config);

    let mut router: Router<AppState> = Router::new()
        .route("/call", post(call_handler).get(call_method_not_allowed))
        .route("/.well-known/ops", get(discovery_handler))
        .route("/ops/{request_id}", get(poll_handler))
        .route("/ops/{request_id}/chunks", get(chunks_handler))
        .route("/media/{media_id}", get(media_redirect_handler))
        .route("/media/{media_id}/data", get(media_data_handler))
        .route("/streams/{session_id}", get(stream_upgrade_handler))
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler));

    if state.config.expose_token_endpoint {
        router = router.route("/_internal/tokens", post(register_token_handler));
    }

    apply_http_layers(router.layer(DefaultBodyLimit::disable()), &config).with_state(state)
}
