//! HTTP handlers
//!
//! Successful responses carry `"success": true` next to their payload;
//! failures go through [`ApiError`].

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::error::ApiError;
use crate::app::AppContext;
use crate::error::LexicaError;
use crate::pages::normalize;

const DEFAULT_LIMIT: usize = 10;
const MAX_LIMIT: usize = 100;

type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub store: lexica_kg::HealthCheckResult,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

impl LimitQuery {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

#[derive(Debug, Deserialize)]
pub struct SlugQuery {
    pub slug: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronQuery {
    pub batch_size: Option<usize>,
}

/// Body of `POST /cache`
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum CacheAction {
    Invalidate {
        slug: Option<String>,
        #[serde(default)]
        all: bool,
    },
    Warm {
        topics: Option<Vec<String>>,
        /// Queue the run and answer 202 instead of waiting for the summary
        #[serde(default)]
        background: bool,
    },
    Regenerate {
        slug: String,
    },
    Cleanup {
        threshold: Option<f64>,
    },
}

/// Service and store health; 503 when the store is unreachable
pub async fn health_check(State(ctx): State<AppContext>) -> impl IntoResponse {
    let store = ctx.health().await;
    let status = StatusCode::from_u16(store.status.to_http_status_code())
        .unwrap_or(StatusCode::SERVICE_UNAVAILABLE);
    let label = if store.status.is_operational() {
        "healthy"
    } else {
        "unhealthy"
    };

    (
        status,
        Json(HealthResponse {
            status: label.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            store,
        }),
    )
}

/// `GET /cache`
pub async fn cache_stats(State(ctx): State<AppContext>) -> ApiResult<impl IntoResponse> {
    let overview = ctx.cache_overview().await?;
    Ok(Json(json!({ "success": true, "stats": overview })))
}

/// `POST /cache`
pub async fn cache_action(
    State(ctx): State<AppContext>,
    payload: Result<Json<CacheAction>, JsonRejection>,
) -> ApiResult<axum::response::Response> {
    let Json(action) = payload?;

    match action {
        CacheAction::Invalidate { slug: _, all: true } => {
            let event = ctx.invalidation.invalidate_all().await?;
            Ok(Json(json!({
                "success": true,
                "message": format!("Invalidated {} page(s)", event.count()),
                "count": event.count(),
            }))
            .into_response())
        }
        CacheAction::Invalidate {
            slug: Some(slug),
            all: false,
        } => {
            let slug = normalize(&slug)?;
            let event = ctx.invalidation.invalidate_one(&slug).await?;
            let message = if event.deleted() {
                format!("Invalidated {}", slug)
            } else {
                format!("{} was not cached", slug)
            };
            Ok(Json(json!({
                "success": true,
                "message": message,
                "deleted": event.deleted(),
            }))
            .into_response())
        }
        CacheAction::Invalidate { .. } => Err(ApiError::bad_request(
            "invalidate needs either `slug` or `all: true`",
        )),
        CacheAction::Warm { topics, background } => {
            let warming = ctx.warming.clone();
            let job = async move {
                match topics {
                    Some(topics) => warming.warm(&topics).await,
                    None => warming.warm_defaults().await,
                }
            };
            let handle = ctx.jobs.submit("warm", job).await?;

            if background {
                let job_id = handle.detach();
                return Ok((
                    StatusCode::ACCEPTED,
                    Json(json!({
                        "success": true,
                        "message": "Warming queued",
                        "jobId": job_id,
                    })),
                )
                    .into_response());
            }

            let summary = handle.wait().await?;
            Ok(Json(json!({
                "success": true,
                "message": format!("Warmed {} of {} topic(s)", summary.success, summary.total),
                "summary": summary,
            }))
            .into_response())
        }
        CacheAction::Regenerate { slug } => {
            let page = ctx.pages.regenerate(&slug).await?;
            Ok(Json(json!({
                "success": true,
                "message": format!("Regenerated {}", page.slug),
                "page": page.summary(),
            }))
            .into_response())
        }
        CacheAction::Cleanup { threshold } => {
            if let Some(t) = threshold {
                if !(0.0..=1.0).contains(&t) {
                    return Err(ApiError::bad_request("threshold must be between 0 and 1"));
                }
            }

            let stale = ctx.invalidation.invalidate_stale().await?;
            let low_confidence = match threshold {
                Some(t) => ctx.invalidation.invalidate_low_confidence(t).await?.count(),
                None => 0,
            };
            Ok(Json(json!({
                "success": true,
                "message": format!(
                    "Removed {} stale and {} low-confidence page(s)",
                    stale.count(),
                    low_confidence
                ),
                "stale": stale.count(),
                "lowConfidence": low_confidence,
            }))
            .into_response())
        }
    }
}

/// `DELETE /cache?slug=`
pub async fn cache_delete(
    State(ctx): State<AppContext>,
    Query(query): Query<SlugQuery>,
) -> ApiResult<impl IntoResponse> {
    let slug = query
        .slug
        .ok_or_else(|| ApiError::bad_request("missing `slug` query parameter"))?;
    let slug = normalize(&slug)?;

    let event = ctx.invalidation.invalidate_one(&slug).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Deleted {}", slug),
        "deleted": event.deleted(),
    })))
}

/// `GET /pages/{slug}`
pub async fn get_page(
    State(ctx): State<AppContext>,
    Path(slug): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let response = ctx.pages.fetch(&slug).await?;
    Ok(Json(json!({ "success": true, "data": response })))
}

/// `GET /pages/{slug}/related`
pub async fn related_pages(
    State(ctx): State<AppContext>,
    Path(slug): Path<String>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<impl IntoResponse> {
    let slug = normalize(&slug)?;
    let related = ctx.graph().related_pages(&slug, query.limit()).await?;
    Ok(Json(json!({ "success": true, "slug": slug, "related": related })))
}

/// `GET /pages/{slug}/backlinks`
pub async fn backlinks(
    State(ctx): State<AppContext>,
    Path(slug): Path<String>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<impl IntoResponse> {
    let slug = normalize(&slug)?;
    let backlinks = ctx.graph().backlinks(&slug, query.limit()).await?;
    Ok(Json(json!({ "success": true, "slug": slug, "backlinks": backlinks })))
}

/// `GET /graph/stats`
pub async fn graph_stats(
    State(ctx): State<AppContext>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<impl IntoResponse> {
    let stats = ctx.graph().graph_stats(query.limit()).await?;
    Ok(Json(json!({ "success": true, "stats": stats })))
}

/// `GET /graph/suggestions`
pub async fn graph_suggestions(
    State(ctx): State<AppContext>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<impl IntoResponse> {
    let suggestions = ctx.graph().suggested_pages(query.limit()).await?;
    Ok(Json(json!({ "success": true, "suggestions": suggestions })))
}

/// `GET /graph/orphans`
pub async fn graph_orphans(State(ctx): State<AppContext>) -> ApiResult<impl IntoResponse> {
    let orphans = ctx.graph().orphaned_pages().await?;
    Ok(Json(json!({ "success": true, "orphans": orphans })))
}

/// `GET /graph/candidates/{slug}`
pub async fn graph_candidate(
    State(ctx): State<AppContext>,
    Path(slug): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let slug = normalize(&slug)?;
    let candidate = ctx
        .graph()
        .candidate(&slug)
        .await?
        .ok_or_else(|| LexicaError::NotFound(format!("no link candidate {}", slug)))?;
    Ok(Json(json!({ "success": true, "candidate": candidate })))
}

/// `GET|POST /cron/regenerate`, behind the bearer check
pub async fn cron_regenerate(
    State(ctx): State<AppContext>,
    query: Result<Query<CronQuery>, axum::extract::rejection::QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(query) = query?;
    let batch_size = query
        .batch_size
        .unwrap_or(ctx.scheduler.config().batch_size)
        .max(1);

    info!("Scheduled regeneration triggered (batch size {})", batch_size);
    let scheduler = ctx.scheduler.clone();
    let summary = ctx
        .jobs
        .submit("cron-regeneration", async move {
            scheduler.run_with_batch_size(batch_size).await
        })
        .await?
        .wait()
        .await??;

    Ok(Json(json!({
        "success": true,
        "message": format!(
            "Regenerated {} of {} page(s)",
            summary.success, summary.total
        ),
        "summary": summary,
    })))
}

/// `OPTIONS /cron/regenerate`
pub async fn cron_info(State(ctx): State<AppContext>) -> impl IntoResponse {
    Json(json!({ "success": true, "scheduler": ctx.scheduler.info() }))
}
