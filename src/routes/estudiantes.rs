//! Student records: the representative engine-guarded resource, including the
//! object-level ownership path on single-record reads.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use sqlx::Row;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::modelos;
use crate::bitacora;
use crate::errors::{AppError, AppResult};
use crate::models::estudiante::{
    Estudiante, EstudianteCreateRequest, EstudianteDetalle, EstudianteUpdateRequest,
    VincularTutorRequest,
};
use crate::tokens::MaybeUser;
use crate::utils::client_ip;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(listar).post(crear))
        .route("/:id", get(detalle).put(editar).delete(eliminar))
        .route("/:id/tutores", axum::routing::post(vincular_tutor))
}

#[utoipa::path(
    get,
    path = "/estudiantes",
    tag = "Estudiantes",
    responses(
        (status = 200, description = "List students", body = Vec<EstudianteDetalle>),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("tokenAuth" = []))
)]
async fn listar(
    State(state): State<AppState>,
    MaybeUser(principal): MaybeUser,
    headers: HeaderMap,
) -> AppResult<Json<Vec<EstudianteDetalle>>> {
    state
        .engine
        .ensure(principal.as_ref(), modelos::ESTUDIANTE, &Method::GET)
        .await?;

    let rows = sqlx::query(
        "SELECT e.usuario_id, u.nombre, u.apellido, u.ci, e.curso_id \
         FROM estudiante e JOIN usuario u ON u.id = e.usuario_id \
         ORDER BY u.apellido, u.nombre",
    )
    .fetch_all(&state.pool)
    .await?;

    let estudiantes = rows
        .iter()
        .map(|r| EstudianteDetalle {
            usuario_id: Uuid::parse_str(r.get::<&str, _>("usuario_id")).unwrap_or_default(),
            nombre: r.get("nombre"),
            apellido: r.get("apellido"),
            ci: r.get("ci"),
            curso_id: r
                .get::<Option<&str>, _>("curso_id")
                .and_then(|c| Uuid::parse_str(c).ok()),
        })
        .collect();

    bitacora::registrar(
        &state.pool,
        principal.as_ref().map(|p| p.id()),
        client_ip(&headers),
        "estudiante",
        "ver",
        "Listar estudiantes",
    )
    .await;

    Ok(Json(estudiantes))
}

#[utoipa::path(
    post,
    path = "/estudiantes",
    tag = "Estudiantes",
    request_body = EstudianteCreateRequest,
    responses(
        (status = 201, description = "Student record created", body = Estudiante),
        (status = 404, description = "Account does not exist"),
        (status = 409, description = "Account already has a student record")
    ),
    security(("tokenAuth" = []))
)]
async fn crear(
    State(state): State<AppState>,
    MaybeUser(principal): MaybeUser,
    headers: HeaderMap,
    Json(req): Json<EstudianteCreateRequest>,
) -> AppResult<(StatusCode, Json<Estudiante>)> {
    state
        .engine
        .ensure(principal.as_ref(), modelos::ESTUDIANTE, &Method::POST)
        .await?;

    let existe: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM usuario WHERE id = ?")
        .bind(req.usuario_id.to_string())
        .fetch_one(&state.pool)
        .await?;
    if existe == 0 {
        return Err(AppError::not_found("usuario no encontrado"));
    }

    sqlx::query("INSERT INTO estudiante (usuario_id, curso_id) VALUES (?, ?)")
        .bind(req.usuario_id.to_string())
        .bind(req.curso_id.map(|c| c.to_string()))
        .execute(&state.pool)
        .await
        .map_err(|err| AppError::from_db(err, "el usuario ya es estudiante"))?;

    bitacora::registrar(
        &state.pool,
        principal.as_ref().map(|p| p.id()),
        client_ip(&headers),
        "estudiante",
        "crear",
        &format!("Crear estudiante {}", req.usuario_id),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(Estudiante {
            usuario_id: req.usuario_id,
            curso_id: req.curso_id,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/estudiantes/{id}",
    tag = "Estudiantes",
    params(("id" = Uuid, Path, description = "Student account ID")),
    responses(
        (status = 200, description = "Student detail", body = EstudianteDetalle),
        (status = 403, description = "Not linked to this record"),
        (status = 404, description = "Student not found")
    ),
    security(("tokenAuth" = []))
)]
async fn detalle(
    State(state): State<AppState>,
    MaybeUser(principal): MaybeUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<Json<EstudianteDetalle>> {
    state
        .engine
        .ensure(principal.as_ref(), modelos::ESTUDIANTE, &Method::GET)
        .await?;

    let row = sqlx::query(
        "SELECT e.usuario_id, u.nombre, u.apellido, u.ci, e.curso_id \
         FROM estudiante e JOIN usuario u ON u.id = e.usuario_id WHERE e.usuario_id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::not_found("estudiante no encontrado"))?;

    let objeto = Estudiante {
        usuario_id: Uuid::parse_str(row.get::<&str, _>("usuario_id")).unwrap_or_default(),
        curso_id: row
            .get::<Option<&str>, _>("curso_id")
            .and_then(|c| Uuid::parse_str(c).ok()),
    };

    // Ownership check on top of the generic decision.
    state
        .engine
        .ensure_object(principal.as_ref(), modelos::ESTUDIANTE, &Method::GET, &objeto)
        .await?;

    bitacora::registrar(
        &state.pool,
        principal.as_ref().map(|p| p.id()),
        client_ip(&headers),
        "estudiante",
        "ver",
        &format!("Consultó el estudiante {id}"),
    )
    .await;

    Ok(Json(EstudianteDetalle {
        usuario_id: objeto.usuario_id,
        nombre: row.get("nombre"),
        apellido: row.get("apellido"),
        ci: row.get("ci"),
        curso_id: objeto.curso_id,
    }))
}

#[utoipa::path(
    put,
    path = "/estudiantes/{id}",
    tag = "Estudiantes",
    params(("id" = Uuid, Path, description = "Student account ID")),
    request_body = EstudianteUpdateRequest,
    responses(
        (status = 200, description = "Student updated", body = Estudiante),
        (status = 404, description = "Student not found")
    ),
    security(("tokenAuth" = []))
)]
async fn editar(
    State(state): State<AppState>,
    MaybeUser(principal): MaybeUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<EstudianteUpdateRequest>,
) -> AppResult<Json<Estudiante>> {
    state
        .engine
        .ensure(principal.as_ref(), modelos::ESTUDIANTE, &Method::PUT)
        .await?;

    let result = sqlx::query("UPDATE estudiante SET curso_id = ? WHERE usuario_id = ?")
        .bind(req.curso_id.map(|c| c.to_string()))
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("estudiante no encontrado"));
    }

    bitacora::registrar(
        &state.pool,
        principal.as_ref().map(|p| p.id()),
        client_ip(&headers),
        "estudiante",
        "editar",
        &format!("Editar estudiante {id}"),
    )
    .await;

    Ok(Json(Estudiante {
        usuario_id: id,
        curso_id: req.curso_id,
    }))
}

#[utoipa::path(
    delete,
    path = "/estudiantes/{id}",
    tag = "Estudiantes",
    params(("id" = Uuid, Path, description = "Student account ID")),
    responses(
        (status = 204, description = "Student record removed"),
        (status = 404, description = "Student not found")
    ),
    security(("tokenAuth" = []))
)]
async fn eliminar(
    State(state): State<AppState>,
    MaybeUser(principal): MaybeUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state
        .engine
        .ensure(principal.as_ref(), modelos::ESTUDIANTE, &Method::DELETE)
        .await?;

    let result = sqlx::query("DELETE FROM estudiante WHERE usuario_id = ?")
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("estudiante no encontrado"));
    }

    bitacora::registrar(
        &state.pool,
        principal.as_ref().map(|p| p.id()),
        client_ip(&headers),
        "estudiante",
        "eliminar",
        &format!("Eliminar estudiante {id}"),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/estudiantes/{id}/tutores",
    tag = "Estudiantes",
    params(("id" = Uuid, Path, description = "Student account ID")),
    request_body = VincularTutorRequest,
    responses(
        (status = 201, description = "Guardian linked"),
        (status = 404, description = "Student or guardian not found"),
        (status = 409, description = "Link already exists")
    ),
    security(("tokenAuth" = []))
)]
async fn vincular_tutor(
    State(state): State<AppState>,
    MaybeUser(principal): MaybeUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<VincularTutorRequest>,
) -> AppResult<StatusCode> {
    state
        .engine
        .ensure(principal.as_ref(), modelos::ESTUDIANTE, &Method::POST)
        .await?;

    sqlx::query("INSERT INTO tutor_estudiante (id, tutor_id, estudiante_id) VALUES (?, ?, ?)")
        .bind(Uuid::new_v4().to_string())
        .bind(req.tutor_id.to_string())
        .bind(id.to_string())
        .execute(&state.pool)
        .await
        .map_err(|err| match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::conflict("el tutor ya está vinculado")
            }
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                AppError::not_found("tutor o estudiante no encontrado")
            }
            _ => AppError::Database(err),
        })?;

    bitacora::registrar(
        &state.pool,
        principal.as_ref().map(|p| p.id()),
        client_ip(&headers),
        "estudiante",
        "crear",
        &format!("Vinculó al tutor {} con el estudiante {id}", req.tutor_id),
    )
    .await;

    Ok(StatusCode::CREATED)
}
