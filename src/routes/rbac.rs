//! Permission-matrix management routes.
//!
//! Roles, puestos, resource-kind registry and the two grant tables are
//! ordinary CRUD surfaces, themselves guarded by the engine (modelo names
//! `rol`, `puesto`, `permiso`) and audited on every mutation.

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
use crate::models::rbac::*;
use crate::tokens::MaybeUser;
use crate::utils::client_ip;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/roles", get(listar_roles).post(crear_rol))
        .route("/roles/:id", axum::routing::delete(eliminar_rol))
        .route("/puestos", get(listar_puestos).post(crear_puesto))
        .route("/puestos/:id", axum::routing::delete(eliminar_puesto))
        .route("/acciones", get(listar_acciones))
        .route("/modelos", get(listar_modelos).post(crear_modelo))
        .route("/modelos/:id", axum::routing::delete(eliminar_modelo))
        .route("/permisos-puesto", get(listar_permisos_puesto).post(crear_permiso_puesto))
        .route("/permisos-puesto/:id", axum::routing::delete(eliminar_permiso_puesto))
        .route("/permisos-rol", get(listar_permisos_rol).post(crear_permiso_rol))
        .route("/permisos-rol/:id", axum::routing::delete(eliminar_permiso_rol))
}

// =============================================================================
// ROLES
// =============================================================================

#[utoipa::path(
    get,
    path = "/rbac/roles",
    tag = "RBAC",
    responses((status = 200, description = "List of roles", body = Vec<Rol>)),
    security(("tokenAuth" = []))
)]
async fn listar_roles(
    State(state): State<AppState>,
    MaybeUser(principal): MaybeUser,
) -> AppResult<Json<Vec<Rol>>> {
    state
        .engine
        .ensure(principal.as_ref(), modelos::ROL, &Method::GET)
        .await?;

    let rows = sqlx::query("SELECT id, nombre, descripcion FROM rol ORDER BY nombre")
        .fetch_all(&state.pool)
        .await?;

    let roles = rows
        .iter()
        .map(|r| Rol {
            id: Uuid::parse_str(r.get::<&str, _>("id")).unwrap_or_default(),
            nombre: r.get("nombre"),
            descripcion: r.get("descripcion"),
        })
        .collect();

    Ok(Json(roles))
}

#[utoipa::path(
    post,
    path = "/rbac/roles",
    tag = "RBAC",
    request_body = RolCreateRequest,
    responses(
        (status = 201, description = "Role created", body = Rol),
        (status = 409, description = "Role name already exists")
    ),
    security(("tokenAuth" = []))
)]
async fn crear_rol(
    State(state): State<AppState>,
    MaybeUser(principal): MaybeUser,
    headers: HeaderMap,
    Json(req): Json<RolCreateRequest>,
) -> AppResult<(StatusCode, Json<Rol>)> {
    state
        .engine
        .ensure(principal.as_ref(), modelos::ROL, &Method::POST)
        .await?;

    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO rol (id, nombre, descripcion) VALUES (?, ?, ?)")
        .bind(id.to_string())
        .bind(&req.nombre)
        .bind(&req.descripcion)
        .execute(&state.pool)
        .await
        .map_err(|err| AppError::from_db(err, "rol ya existe"))?;

    bitacora::registrar(
        &state.pool,
        principal.as_ref().map(|p| p.id()),
        client_ip(&headers),
        "rol",
        "crear",
        &format!("Creó el rol {}", req.nombre),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(Rol {
            id,
            nombre: req.nombre,
            descripcion: req.descripcion,
        }),
    ))
}

#[utoipa::path(
    delete,
    path = "/rbac/roles/{id}",
    tag = "RBAC",
    params(("id" = Uuid, Path, description = "Role ID")),
    responses(
        (status = 204, description = "Role deleted"),
        (status = 404, description = "Role not found"),
        (status = 409, description = "Role still referenced by accounts")
    ),
    security(("tokenAuth" = []))
)]
async fn eliminar_rol(
    State(state): State<AppState>,
    MaybeUser(principal): MaybeUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state
        .engine
        .ensure(principal.as_ref(), modelos::ROL, &Method::DELETE)
        .await?;

    // Roles referenced by accounts are protected by the RESTRICT constraint.
    let result = sqlx::query("DELETE FROM rol WHERE id = ?")
        .bind(id.to_string())
        .execute(&state.pool)
        .await
        .map_err(|err| match &err {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                AppError::conflict("rol en uso por usuarios")
            }
            _ => AppError::Database(err),
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("rol no encontrado"));
    }

    bitacora::registrar(
        &state.pool,
        principal.as_ref().map(|p| p.id()),
        client_ip(&headers),
        "rol",
        "eliminar",
        &format!("Eliminó el rol {id}"),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// PUESTOS
// =============================================================================

#[utoipa::path(
    get,
    path = "/rbac/puestos",
    tag = "RBAC",
    responses((status = 200, description = "List of puestos", body = Vec<Puesto>)),
    security(("tokenAuth" = []))
)]
async fn listar_puestos(
    State(state): State<AppState>,
    MaybeUser(principal): MaybeUser,
) -> AppResult<Json<Vec<Puesto>>> {
    state
        .engine
        .ensure(principal.as_ref(), modelos::PUESTO, &Method::GET)
        .await?;

    let rows = sqlx::query("SELECT id, nombre, descripcion FROM puesto ORDER BY nombre")
        .fetch_all(&state.pool)
        .await?;

    let puestos = rows
        .iter()
        .map(|r| Puesto {
            id: Uuid::parse_str(r.get::<&str, _>("id")).unwrap_or_default(),
            nombre: r.get("nombre"),
            descripcion: r.get("descripcion"),
        })
        .collect();

    Ok(Json(puestos))
}

#[utoipa::path(
    post,
    path = "/rbac/puestos",
    tag = "RBAC",
    request_body = PuestoCreateRequest,
    responses(
        (status = 201, description = "Puesto created", body = Puesto),
        (status = 409, description = "Puesto name already exists")
    ),
    security(("tokenAuth" = []))
)]
async fn crear_puesto(
    State(state): State<AppState>,
    MaybeUser(principal): MaybeUser,
    headers: HeaderMap,
    Json(req): Json<PuestoCreateRequest>,
) -> AppResult<(StatusCode, Json<Puesto>)> {
    state
        .engine
        .ensure(principal.as_ref(), modelos::PUESTO, &Method::POST)
        .await?;

    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO puesto (id, nombre, descripcion) VALUES (?, ?, ?)")
        .bind(id.to_string())
        .bind(&req.nombre)
        .bind(&req.descripcion)
        .execute(&state.pool)
        .await
        .map_err(|err| AppError::from_db(err, "puesto ya existe"))?;

    bitacora::registrar(
        &state.pool,
        principal.as_ref().map(|p| p.id()),
        client_ip(&headers),
        "puesto",
        "crear",
        &format!("Creó el puesto {}", req.nombre),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(Puesto {
            id,
            nombre: req.nombre,
            descripcion: req.descripcion,
        }),
    ))
}

#[utoipa::path(
    delete,
    path = "/rbac/puestos/{id}",
    tag = "RBAC",
    params(("id" = Uuid, Path, description = "Puesto ID")),
    responses(
        (status = 204, description = "Puesto deleted"),
        (status = 404, description = "Puesto not found")
    ),
    security(("tokenAuth" = []))
)]
async fn eliminar_puesto(
    State(state): State<AppState>,
    MaybeUser(principal): MaybeUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state
        .engine
        .ensure(principal.as_ref(), modelos::PUESTO, &Method::DELETE)
        .await?;

    let result = sqlx::query("DELETE FROM puesto WHERE id = ?")
        .bind(id.to_string())
        .execute(&state.pool)
        .await
        .map_err(|err| match &err {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                AppError::conflict("puesto en uso por administradores")
            }
            _ => AppError::Database(err),
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("puesto no encontrado"));
    }

    bitacora::registrar(
        &state.pool,
        principal.as_ref().map(|p| p.id()),
        client_ip(&headers),
        "puesto",
        "eliminar",
        &format!("Eliminó el puesto {id}"),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// ACCIONES / MODELOS PERMITIDOS
// =============================================================================

#[utoipa::path(
    get,
    path = "/rbac/acciones",
    tag = "RBAC",
    responses((status = 200, description = "List of actions", body = Vec<Accion>)),
    security(("tokenAuth" = []))
)]
async fn listar_acciones(
    State(state): State<AppState>,
    MaybeUser(principal): MaybeUser,
) -> AppResult<Json<Vec<Accion>>> {
    state
        .engine
        .ensure(principal.as_ref(), modelos::PERMISO, &Method::GET)
        .await?;

    let rows = sqlx::query("SELECT id, nombre FROM accion ORDER BY nombre")
        .fetch_all(&state.pool)
        .await?;

    let acciones = rows
        .iter()
        .map(|r| Accion {
            id: Uuid::parse_str(r.get::<&str, _>("id")).unwrap_or_default(),
            nombre: r.get("nombre"),
        })
        .collect();

    Ok(Json(acciones))
}

#[utoipa::path(
    get,
    path = "/rbac/modelos",
    tag = "RBAC",
    responses((status = 200, description = "Registered resource kinds", body = Vec<ModeloPermitido>)),
    security(("tokenAuth" = []))
)]
async fn listar_modelos(
    State(state): State<AppState>,
    MaybeUser(principal): MaybeUser,
) -> AppResult<Json<Vec<ModeloPermitido>>> {
    state
        .engine
        .ensure(principal.as_ref(), modelos::PERMISO, &Method::GET)
        .await?;

    let rows = sqlx::query("SELECT id, nombre FROM modelo_permitido ORDER BY nombre")
        .fetch_all(&state.pool)
        .await?;

    let modelos = rows
        .iter()
        .map(|r| ModeloPermitido {
            id: Uuid::parse_str(r.get::<&str, _>("id")).unwrap_or_default(),
            nombre: r.get("nombre"),
        })
        .collect();

    Ok(Json(modelos))
}

#[utoipa::path(
    post,
    path = "/rbac/modelos",
    tag = "RBAC",
    request_body = ModeloCreateRequest,
    responses(
        (status = 201, description = "Resource kind registered", body = ModeloPermitido),
        (status = 409, description = "Name already registered")
    ),
    security(("tokenAuth" = []))
)]
async fn crear_modelo(
    State(state): State<AppState>,
    MaybeUser(principal): MaybeUser,
    headers: HeaderMap,
    Json(req): Json<ModeloCreateRequest>,
) -> AppResult<(StatusCode, Json<ModeloPermitido>)> {
    state
        .engine
        .ensure(principal.as_ref(), modelos::PERMISO, &Method::POST)
        .await?;

    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO modelo_permitido (id, nombre) VALUES (?, ?)")
        .bind(id.to_string())
        .bind(&req.nombre)
        .execute(&state.pool)
        .await
        .map_err(|err| AppError::from_db(err, "modelo ya registrado"))?;

    bitacora::registrar(
        &state.pool,
        principal.as_ref().map(|p| p.id()),
        client_ip(&headers),
        "permiso",
        "crear",
        &format!("Registró el modelo {}", req.nombre),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(ModeloPermitido {
            id,
            nombre: req.nombre,
        }),
    ))
}

#[utoipa::path(
    delete,
    path = "/rbac/modelos/{id}",
    tag = "RBAC",
    params(("id" = Uuid, Path, description = "Resource kind ID")),
    responses(
        (status = 204, description = "Resource kind removed"),
        (status = 404, description = "Resource kind not found")
    ),
    security(("tokenAuth" = []))
)]
async fn eliminar_modelo(
    State(state): State<AppState>,
    MaybeUser(principal): MaybeUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state
        .engine
        .ensure(principal.as_ref(), modelos::PERMISO, &Method::DELETE)
        .await?;

    let result = sqlx::query("DELETE FROM modelo_permitido WHERE id = ?")
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("modelo no encontrado"));
    }

    bitacora::registrar(
        &state.pool,
        principal.as_ref().map(|p| p.id()),
        client_ip(&headers),
        "permiso",
        "eliminar",
        &format!("Eliminó el modelo {id}"),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// GRANTS
// =============================================================================

#[utoipa::path(
    get,
    path = "/rbac/permisos-puesto",
    tag = "RBAC",
    responses((status = 200, description = "Position grants", body = Vec<PermisoPuesto>)),
    security(("tokenAuth" = []))
)]
async fn listar_permisos_puesto(
    State(state): State<AppState>,
    MaybeUser(principal): MaybeUser,
) -> AppResult<Json<Vec<PermisoPuesto>>> {
    state
        .engine
        .ensure(principal.as_ref(), modelos::PERMISO, &Method::GET)
        .await?;

    let rows = sqlx::query(
        "SELECT pp.id, p.nombre AS puesto, m.nombre AS modelo, a.nombre AS accion \
         FROM permiso_puesto pp \
         JOIN puesto p ON p.id = pp.puesto_id \
         JOIN modelo_permitido m ON m.id = pp.modelo_id \
         JOIN accion a ON a.id = pp.accion_id \
         ORDER BY p.nombre, m.nombre, a.nombre",
    )
    .fetch_all(&state.pool)
    .await?;

    let permisos = rows
        .iter()
        .map(|r| PermisoPuesto {
            id: Uuid::parse_str(r.get::<&str, _>("id")).unwrap_or_default(),
            puesto: r.get("puesto"),
            modelo: r.get("modelo"),
            accion: r.get("accion"),
        })
        .collect();

    Ok(Json(permisos))
}

#[utoipa::path(
    post,
    path = "/rbac/permisos-puesto",
    tag = "RBAC",
    request_body = PermisoPuestoCreateRequest,
    responses(
        (status = 201, description = "Position grant created", body = PermisoPuesto),
        (status = 404, description = "Puesto, modelo or accion not found"),
        (status = 409, description = "Grant already exists")
    ),
    security(("tokenAuth" = []))
)]
async fn crear_permiso_puesto(
    State(state): State<AppState>,
    MaybeUser(principal): MaybeUser,
    headers: HeaderMap,
    Json(req): Json<PermisoPuestoCreateRequest>,
) -> AppResult<(StatusCode, Json<PermisoPuesto>)> {
    state
        .engine
        .ensure(principal.as_ref(), modelos::PERMISO, &Method::POST)
        .await?;

    let puesto_id = lookup_id(&state, "puesto", &req.puesto).await?;
    let modelo_id = lookup_id(&state, "modelo_permitido", &req.modelo).await?;
    let accion_id = lookup_id(&state, "accion", &req.accion).await?;

    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO permiso_puesto (id, puesto_id, modelo_id, accion_id) VALUES (?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(&puesto_id)
    .bind(&modelo_id)
    .bind(&accion_id)
    .execute(&state.pool)
    .await
    .map_err(|err| AppError::from_db(err, "permiso ya existe"))?;

    bitacora::registrar(
        &state.pool,
        principal.as_ref().map(|p| p.id()),
        client_ip(&headers),
        "permiso",
        "crear",
        &format!(
            "Otorgó {} sobre {} al puesto {}",
            req.accion, req.modelo, req.puesto
        ),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(PermisoPuesto {
            id,
            puesto: req.puesto,
            modelo: req.modelo,
            accion: req.accion,
        }),
    ))
}

#[utoipa::path(
    delete,
    path = "/rbac/permisos-puesto/{id}",
    tag = "RBAC",
    params(("id" = Uuid, Path, description = "Grant ID")),
    responses(
        (status = 204, description = "Grant revoked"),
        (status = 404, description = "Grant not found")
    ),
    security(("tokenAuth" = []))
)]
async fn eliminar_permiso_puesto(
    State(state): State<AppState>,
    MaybeUser(principal): MaybeUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state
        .engine
        .ensure(principal.as_ref(), modelos::PERMISO, &Method::DELETE)
        .await?;

    let result = sqlx::query("DELETE FROM permiso_puesto WHERE id = ?")
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("permiso no encontrado"));
    }

    bitacora::registrar(
        &state.pool,
        principal.as_ref().map(|p| p.id()),
        client_ip(&headers),
        "permiso",
        "eliminar",
        &format!("Revocó el permiso de puesto {id}"),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/rbac/permisos-rol",
    tag = "RBAC",
    responses((status = 200, description = "Role grants", body = Vec<PermisoRol>)),
    security(("tokenAuth" = []))
)]
async fn listar_permisos_rol(
    State(state): State<AppState>,
    MaybeUser(principal): MaybeUser,
) -> AppResult<Json<Vec<PermisoRol>>> {
    state
        .engine
        .ensure(principal.as_ref(), modelos::PERMISO, &Method::GET)
        .await?;

    let rows = sqlx::query(
        "SELECT pr.id, r.nombre AS rol, m.nombre AS modelo, a.nombre AS accion \
         FROM permiso_rol pr \
         JOIN rol r ON r.id = pr.rol_id \
         JOIN modelo_permitido m ON m.id = pr.modelo_id \
         JOIN accion a ON a.id = pr.accion_id \
         ORDER BY r.nombre, m.nombre, a.nombre",
    )
    .fetch_all(&state.pool)
    .await?;

    let permisos = rows
        .iter()
        .map(|r| PermisoRol {
            id: Uuid::parse_str(r.get::<&str, _>("id")).unwrap_or_default(),
            rol: r.get("rol"),
            modelo: r.get("modelo"),
            accion: r.get("accion"),
        })
        .collect();

    Ok(Json(permisos))
}

#[utoipa::path(
    post,
    path = "/rbac/permisos-rol",
    tag = "RBAC",
    request_body = PermisoRolCreateRequest,
    responses(
        (status = 201, description = "Role grant created", body = PermisoRol),
        (status = 404, description = "Rol, modelo or accion not found"),
        (status = 409, description = "Grant already exists")
    ),
    security(("tokenAuth" = []))
)]
async fn crear_permiso_rol(
    State(state): State<AppState>,
    MaybeUser(principal): MaybeUser,
    headers: HeaderMap,
    Json(req): Json<PermisoRolCreateRequest>,
) -> AppResult<(StatusCode, Json<PermisoRol>)> {
    state
        .engine
        .ensure(principal.as_ref(), modelos::PERMISO, &Method::POST)
        .await?;

    let rol_id = lookup_id(&state, "rol", &req.rol).await?;
    let modelo_id = lookup_id(&state, "modelo_permitido", &req.modelo).await?;
    let accion_id = lookup_id(&state, "accion", &req.accion).await?;

    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO permiso_rol (id, rol_id, modelo_id, accion_id) VALUES (?, ?, ?, ?)")
        .bind(id.to_string())
        .bind(&rol_id)
        .bind(&modelo_id)
        .bind(&accion_id)
        .execute(&state.pool)
        .await
        .map_err(|err| AppError::from_db(err, "permiso ya existe"))?;

    bitacora::registrar(
        &state.pool,
        principal.as_ref().map(|p| p.id()),
        client_ip(&headers),
        "permiso",
        "crear",
        &format!(
            "Otorgó {} sobre {} al rol {}",
            req.accion, req.modelo, req.rol
        ),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(PermisoRol {
            id,
            rol: req.rol,
            modelo: req.modelo,
            accion: req.accion,
        }),
    ))
}

#[utoipa::path(
    delete,
    path = "/rbac/permisos-rol/{id}",
    tag = "RBAC",
    params(("id" = Uuid, Path, description = "Grant ID")),
    responses(
        (status = 204, description = "Grant revoked"),
        (status = 404, description = "Grant not found")
    ),
    security(("tokenAuth" = []))
)]
async fn eliminar_permiso_rol(
    State(state): State<AppState>,
    MaybeUser(principal): MaybeUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state
        .engine
        .ensure(principal.as_ref(), modelos::PERMISO, &Method::DELETE)
        .await?;

    let result = sqlx::query("DELETE FROM permiso_rol WHERE id = ?")
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("permiso no encontrado"));
    }

    bitacora::registrar(
        &state.pool,
        principal.as_ref().map(|p| p.id()),
        client_ip(&headers),
        "permiso",
        "eliminar",
        &format!("Revocó el permiso de rol {id}"),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

/// Resolve a unique nombre to its id in one of the matrix dimension tables.
async fn lookup_id(state: &AppState, table: &str, nombre: &str) -> AppResult<String> {
    let id: Option<String> = sqlx::query_scalar(&format!("SELECT id FROM {table} WHERE nombre = ?"))
        .bind(nombre)
        .fetch_optional(&state.pool)
        .await?;

    id.ok_or_else(|| AppError::not_found(format!("{table} '{nombre}' no encontrado")))
}
