use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::Registry;
use crate::error::{AppResult, DomainError, InfraError};
use crate::models::item::{ItemInstance, MaterialApplication, MaterialSelection};
use crate::models::material::{MaterialStack, StackKey};
use crate::models::stats::Stats;
use crate::models::types::{EnemyTypeId, ItemId, ItemTypeId, MaterialId, StyleId, UserId};
use crate::services::{CraftPreview, CraftedItem, EnemySpawn};

/// Seconds a client should wait before resubmitting a craft whose artwork is
/// still being generated
const RETRY_AFTER_SECS: &str = "5";

#[derive(Clone)]
struct HttpAppCtx {
    registry: Arc<Registry>,
}

pub fn router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/items/{item_id}/materials", post(apply_materials))
        .route("/items/{item_id}/materials/preview", post(preview_materials))
        .route("/items/{item_id}/level", put(set_level))
        .route("/users/{user_id}/items", get(list_items).post(create_item))
        .route("/users/{user_id}/materials", get(list_materials).post(grant_material))
        .route("/users/{user_id}/loadout", post(loadout_stats))
        .route("/enemies/{enemy_type_id}/spawn", post(spawn_enemy))
        .with_state(HttpAppCtx { registry })
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
}

/// Run the HTTP API
pub async fn serve(addr: std::net::SocketAddr, registry: Arc<Registry>) -> AppResult<()> {
    let app = router(registry);

    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(InfraError::from)?;
    axum::serve(listener, app).await.map_err(InfraError::from)?;
    Ok(())
}

// ============================================================================
// PAYLOADS
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApplyMaterialsBody {
    user_id: UserId,
    materials: Vec<MaterialSelection>,
}

#[derive(Debug, Deserialize)]
struct CreateItemBody {
    item_type_id: ItemTypeId,
}

#[derive(Debug, Deserialize)]
struct SetLevelBody {
    user_id: UserId,
    level: i32,
}

#[derive(Debug, Deserialize)]
struct GrantBody {
    material_id: MaterialId,
    style_id: StyleId,
    quantity: i32,
}

#[derive(Debug, Deserialize)]
struct LoadoutBody {
    item_ids: Vec<ItemId>,
}

#[derive(Debug, Serialize)]
struct ItemView {
    id: ItemId,
    item_type_id: ItemTypeId,
    level: i32,
    stats: Stats,
    image_url: Option<String>,
    is_styled: bool,
    craft_count: usize,
    applied: Vec<MaterialApplication>,
}

impl From<ItemInstance> for ItemView {
    fn from(item: ItemInstance) -> Self {
        Self {
            id: item.id,
            item_type_id: item.item_type_id,
            level: item.level,
            stats: item.stats,
            image_url: item.image_url,
            is_styled: item.is_styled,
            craft_count: item.applied.len(),
            applied: item.applied,
        }
    }
}

#[derive(Debug, Serialize)]
struct CraftView {
    item: ItemView,
    first_craft: bool,
    use_count: i64,
    fingerprint: String,
}

impl From<CraftedItem> for CraftView {
    fn from(c: CraftedItem) -> Self {
        Self {
            item: c.item.into(),
            first_craft: c.first_craft,
            use_count: c.use_count,
            fingerprint: c.fingerprint.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct PreviewView {
    item_id: ItemId,
    fingerprint: String,
    stats: Stats,
    is_styled: bool,
    cached: bool,
    image_url: Option<String>,
    affordable: bool,
    slots_left: usize,
}

impl From<CraftPreview> for PreviewView {
    fn from(p: CraftPreview) -> Self {
        Self {
            item_id: p.item_id,
            fingerprint: p.fingerprint.to_string(),
            stats: p.stats,
            is_styled: p.is_styled,
            cached: p.cached_image_url.is_some(),
            image_url: p.cached_image_url,
            affordable: p.affordable,
            slots_left: p.slots_left,
        }
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

async fn health(State(state): State<HttpAppCtx>) -> impl IntoResponse {
    let storage = if state.registry.db.is_some() { "postgres" } else { "memory" };
    Json(json!({ "status": "ok", "storage": storage }))
}

async fn apply_materials(
    State(state): State<HttpAppCtx>,
    Path(item_id): Path<ItemId>,
    Json(body): Json<ApplyMaterialsBody>,
) -> AppResult<Json<CraftView>> {
    // A dropped connection must not abort a craft halfway, so it runs on its
    // own task.
    let crafting = state.registry.services.crafting.clone();
    let crafted = tokio::spawn(async move {
        crafting
            .apply_materials(body.user_id, item_id, &body.materials)
            .await
    })
    .await
    .map_err(|e| InfraError::Task(e.to_string()))??;

    Ok(Json(crafted.into()))
}

async fn preview_materials(
    State(state): State<HttpAppCtx>,
    Path(item_id): Path<ItemId>,
    Json(body): Json<ApplyMaterialsBody>,
) -> AppResult<Json<PreviewView>> {
    let preview = state
        .registry
        .services
        .crafting
        .preview(body.user_id, item_id, &body.materials)
        .await?;
    Ok(Json(preview.into()))
}

async fn set_level(
    State(state): State<HttpAppCtx>,
    Path(item_id): Path<ItemId>,
    Json(body): Json<SetLevelBody>,
) -> AppResult<Json<ItemView>> {
    let item = state
        .registry
        .services
        .item
        .set_level(body.user_id, item_id, body.level)
        .await?;
    Ok(Json(item.into()))
}

async fn list_items(State(state): State<HttpAppCtx>, Path(user_id): Path<UserId>) -> AppResult<Json<Vec<ItemView>>> {
    let items = state.registry.services.item.list(user_id).await?;
    Ok(Json(items.into_iter().map(ItemView::from).collect()))
}

async fn create_item(
    State(state): State<HttpAppCtx>,
    Path(user_id): Path<UserId>,
    Json(body): Json<CreateItemBody>,
) -> AppResult<(StatusCode, Json<ItemView>)> {
    let item = state
        .registry
        .services
        .item
        .create_item(user_id, body.item_type_id)
        .await?;
    Ok((StatusCode::CREATED, Json(item.into())))
}

async fn list_materials(
    State(state): State<HttpAppCtx>,
    Path(user_id): Path<UserId>,
) -> AppResult<Json<Vec<MaterialStack>>> {
    let stacks = state.registry.services.ledger.stacks(user_id).await?;
    Ok(Json(stacks))
}

async fn grant_material(
    State(state): State<HttpAppCtx>,
    Path(user_id): Path<UserId>,
    Json(body): Json<GrantBody>,
) -> AppResult<Json<MaterialStack>> {
    let quantity = state
        .registry
        .services
        .ledger
        .grant(user_id, StackKey::new(body.material_id, body.style_id), body.quantity)
        .await?;
    Ok(Json(MaterialStack {
        user_id,
        material_id: body.material_id,
        style_id: body.style_id,
        quantity,
    }))
}

async fn loadout_stats(
    State(state): State<HttpAppCtx>,
    Path(user_id): Path<UserId>,
    Json(body): Json<LoadoutBody>,
) -> AppResult<Json<Stats>> {
    let stats = state
        .registry
        .services
        .item
        .loadout_stats(user_id, &body.item_ids)
        .await?;
    Ok(Json(stats))
}

async fn spawn_enemy(
    State(state): State<HttpAppCtx>,
    Path(enemy_type_id): Path<EnemyTypeId>,
) -> AppResult<Json<EnemySpawn>> {
    let spawn = state.registry.services.enemy_style.spawn(enemy_type_id).await?;
    Ok(Json(spawn))
}

// ============================================================================
// ERRORS
// ============================================================================

impl DomainError {
    pub fn status(&self) -> StatusCode {
        match self {
            DomainError::Validation { .. } => StatusCode::BAD_REQUEST,
            DomainError::PermissionDenied => StatusCode::FORBIDDEN,
            DomainError::NotFound(_) => StatusCode::NOT_FOUND,
            DomainError::InsufficientMaterial { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            DomainError::ConcurrencyConflict(_) => StatusCode::CONFLICT,
            DomainError::GenerationInProgress(_) => StatusCode::SERVICE_UNAVAILABLE,
            DomainError::GenerationTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            DomainError::GenerationProvider(_) => StatusCode::BAD_GATEWAY,
            DomainError::Configuration(_) | DomainError::Db(_) | DomainError::Infra(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for DomainError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Internal details stay in the logs
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, code = self.code(), "request failed");
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = json!({
            "error": {
                "code": self.code(),
                "message": message,
                "retryable": self.is_retryable(),
            }
        });

        let mut resp = (status, Json(body)).into_response();
        if matches!(self, DomainError::GenerationInProgress(_)) {
            resp.headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
        }
        resp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::artifact::ComboFingerprint;
    use std::time::Duration;

    #[test]
    fn status_codes() {
        let fp = ComboFingerprint::from_hex("aa");
        let cases = [
            (DomainError::validation("materials", "empty"), StatusCode::BAD_REQUEST),
            (DomainError::PermissionDenied, StatusCode::FORBIDDEN),
            (DomainError::NotFound("item".into()), StatusCode::NOT_FOUND),
            (
                DomainError::InsufficientMaterial {
                    material_id: MaterialId::new(),
                    style_id: StyleId::new(),
                    available: 0,
                    requested: 1,
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (DomainError::ConcurrencyConflict(ItemId::new()), StatusCode::CONFLICT),
            (DomainError::GenerationInProgress(fp.clone()), StatusCode::SERVICE_UNAVAILABLE),
            (
                DomainError::GenerationTimeout {
                    fingerprint: fp,
                    after: Duration::from_secs(20),
                },
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (DomainError::GenerationProvider("nope".into()), StatusCode::BAD_GATEWAY),
            (DomainError::Configuration("no base stats".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, want) in cases {
            assert_eq!(err.status(), want, "{err}");
        }
    }

    #[test]
    fn in_progress_sets_retry_after() {
        let resp = DomainError::GenerationInProgress(ComboFingerprint::from_hex("bb")).into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(resp.headers().get(header::RETRY_AFTER).unwrap(), RETRY_AFTER_SECS);
    }

    #[test]
    fn internal_errors_hide_details() {
        let resp = DomainError::Configuration("base stats for sword are NaN".into()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(resp.headers().get(header::RETRY_AFTER).is_none());
    }
}
