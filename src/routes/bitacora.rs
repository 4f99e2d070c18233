use axum::extract::{Query, State};
use axum::http::Method;
use axum::Json;

use crate::app::AppState;
use crate::authz::modelos;
use crate::bitacora;
use crate::errors::AppResult;
use crate::models::bitacora::{Bitacora, BitacoraQuery, Paginated};
use crate::tokens::MaybeUser;

#[utoipa::path(
    get,
    path = "/bitacoras",
    tag = "Bitacora",
    params(
        ("usuario" = Option<uuid::Uuid>, Query, description = "Filter by principal id"),
        ("page" = Option<i64>, Query, description = "1-based page number"),
        ("page_size" = Option<i64>, Query, description = "Page size, clamped to the configured maximum"),
    ),
    responses(
        (status = 200, description = "Paginated audit entries, newest first"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "No permission on bitacora")
    ),
    security(("tokenAuth" = []))
)]
pub async fn listar(
    State(state): State<AppState>,
    MaybeUser(principal): MaybeUser,
    Query(query): Query<BitacoraQuery>,
) -> AppResult<Json<Paginated<Bitacora>>> {
    state
        .engine
        .ensure(principal.as_ref(), modelos::BITACORA, &Method::GET)
        .await?;

    let page = bitacora::consultar(&state.pool, &state.config, &query).await?;
    Ok(Json(page))
}
