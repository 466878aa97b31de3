//! API server for Lexica

use anyhow::Result;
use axum::{
    middleware::from_fn_with_state,
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::AppContext;

use super::middleware::cron_auth_middleware;
use super::routes::{
    backlinks, cache_action, cache_delete, cache_stats, cron_info, cron_regenerate, get_page,
    graph_candidate, graph_orphans, graph_stats, graph_suggestions, health_check, related_pages,
};

/// Build the router over a shared context
pub fn router(ctx: AppContext) -> Router {
    let cron = get(cron_regenerate)
        .post(cron_regenerate)
        .route_layer(from_fn_with_state(ctx.clone(), cron_auth_middleware))
        .options(cron_info);

    Router::new()
        .route("/health", get(health_check))
        .route(
            "/cache",
            get(cache_stats).post(cache_action).delete(cache_delete),
        )
        .route("/pages/:slug", get(get_page))
        .route("/pages/:slug/related", get(related_pages))
        .route("/pages/:slug/backlinks", get(backlinks))
        .route("/graph/stats", get(graph_stats))
        .route("/graph/suggestions", get(graph_suggestions))
        .route("/graph/orphans", get(graph_orphans))
        .route("/graph/candidates/:slug", get(graph_candidate))
        .route("/cron/regenerate", cron)
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// API server
pub struct ApiServer {
    ctx: AppContext,
}

impl ApiServer {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    /// Bind the configured address and serve until the process exits
    pub async fn start(self) -> Result<()> {
        let addr = format!("{}:{}", self.ctx.config.host, self.ctx.config.port);
        let listener = TcpListener::bind(&addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let background = self.ctx.spawn_background();
        info!(
            "Starting API server on {} ({} background task(s))",
            listener.local_addr()?,
            background.len()
        );

        let app = router(self.ctx);
        let served = axum::serve(listener, app).await;

        for task in background {
            task.abort();
        }
        served?;
        Ok(())
    }
}
