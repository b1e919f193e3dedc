//! API HTTP server.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    routing::get,
    Form, Router,
};
use tokio::net::TcpListener;
use tracing::info;

use super::handlers::{health_handler, index_handler, list_handler, mutate_handler, usage_handler};
use crate::config::{ApiConfig, SecureString};
use crate::policy::{Operation, Params, PolicyEngine};

/// State shared by all handlers.
pub struct ApiState {
    engine: PolicyEngine,
    shared_secret: SecureString,
}

impl ApiState {
    pub fn new(engine: PolicyEngine, shared_secret: SecureString) -> Self {
        Self {
            engine,
            shared_secret,
        }
    }

    pub fn engine(&self) -> &PolicyEngine {
        &self.engine
    }

    /// Secret required in the token header, if one is configured.
    pub fn shared_secret(&self) -> Option<&str> {
        if self.shared_secret.is_empty() {
            None
        } else {
            Some(self.shared_secret.as_str())
        }
    }
}

pub struct ApiServer {
    listen: SocketAddr,
    state: Arc<ApiState>,
}

impl ApiServer {
    pub fn new(config: &ApiConfig, engine: PolicyEngine) -> Self {
        Self {
            listen: config.listen,
            state: Arc::new(ApiState::new(engine, config.get_shared_secret())),
        }
    }

    /// Build the router: one route per operation plus `/` and `/healthz`.
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Serve until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.router();
        let listener = TcpListener::bind(self.listen).await?;

        info!(
            address = %self.listen,
            auth = self.state.shared_secret().is_some(),
            "starting API server"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                info!("API server shutting down");
            })
            .await
    }
}

fn build_router(state: Arc<ApiState>) -> Router {
    let mut router = Router::new()
        .route("/", get(index_handler))
        .route("/healthz", get(health_handler));

    for op in Operation::ALL {
        let path = format!("/{}", op.name());
        let route = if op.is_listing() {
            get(
                move |state: State<Arc<ApiState>>,
                      headers: HeaderMap,
                      query: Option<Query<Params>>| {
                    list_handler(op, state, headers, query)
                },
            )
        } else {
            get(move |state: State<Arc<ApiState>>, headers: HeaderMap| {
                usage_handler(op, state, headers)
            })
            .post(
                move |state: State<Arc<ApiState>>,
                      headers: HeaderMap,
                      form: Option<Form<Params>>| {
                    mutate_handler(op, state, headers, form)
                },
            )
        };
        router = router.route(&path, route);
    }

    router.with_state(state)
}
