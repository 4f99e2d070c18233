use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Serialize;
use sqlx::SqlitePool;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::app::AppState;
use crate::bitacora;
use crate::errors::{AppError, AppResult};
use crate::models::usuario::{
    AuthResponse, DbUsuario, LoginRequest, PerfilResponse, RegisterRequest, Usuario,
};
use crate::tokens::CurrentUser;
use crate::utils::{client_ip, hash_password, utc_now, verify_password};

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    message: String,
}

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Usuario registered", body = Usuario),
        (status = 404, description = "Role does not exist"),
        (status = 409, description = "Username, CI or email already in use")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<Usuario>)> {
    let rol_id: Option<String> = sqlx::query_scalar("SELECT id FROM rol WHERE nombre = ?")
        .bind(&payload.rol)
        .fetch_optional(&state.pool)
        .await?;
    let rol_id = rol_id.ok_or_else(|| AppError::not_found("rol no encontrado"))?;

    let password_hash = hash_password(&payload.password)?;
    let now = utc_now();
    let usuario_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO usuario (id, ci, username, nombre, apellido, email, telefono, sexo, \
                              fecha_nacimiento, password_hash, estado, rol_id, date_joined) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)",
    )
    .bind(usuario_id.to_string())
    .bind(&payload.ci)
    .bind(&payload.username)
    .bind(&payload.nombre)
    .bind(&payload.apellido)
    .bind(&payload.email)
    .bind(&payload.telefono)
    .bind(payload.sexo.as_deref().unwrap_or("M"))
    .bind(payload.fecha_nacimiento)
    .bind(password_hash)
    .bind(&rol_id)
    .bind(now)
    .execute(&state.pool)
    .await
    .map_err(|err| AppError::from_db(err, "username, ci o email ya registrado"))?;

    let usuario = fetch_usuario_by_id(&state.pool, usuario_id).await?;
    Ok((StatusCode::CREATED, Json(usuario)))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account deactivated")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let db_usuario = sqlx::query_as::<_, DbUsuario>(
        "SELECT u.id, u.ci, u.username, u.nombre, u.apellido, u.email, u.telefono, \
                u.sexo, u.fecha_nacimiento, u.password_hash, u.estado, r.nombre AS rol, \
                u.date_joined \
         FROM usuario u JOIN rol r ON r.id = u.rol_id WHERE u.username = ?",
    )
    .bind(&payload.username)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::unauthorized("credenciales inválidas"))?;

    let password_ok = verify_password(&payload.password, &db_usuario.password_hash)?;
    if !password_ok {
        // failed attempts are not audited
        return Err(AppError::unauthorized("credenciales inválidas"));
    }

    if !db_usuario.estado {
        return Err(AppError::forbidden("cuenta desactivada"));
    }

    let usuario: Usuario = db_usuario.try_into()?;

    // Multi-device policy: a fresh token per login, prior tokens stay valid
    // until explicitly revoked by logout.
    let token = state
        .tokens
        .issue(usuario.id, payload.device_name.as_deref())
        .await?;

    bitacora::registrar(
        &state.pool,
        Some(usuario.id),
        client_ip(&headers),
        "usuario",
        "crear",
        "Inicio de sesión exitoso",
    )
    .await;

    Ok(Json(AuthResponse {
        token: token.key,
        usuario,
    }))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Auth",
    responses(
        (status = 200, description = "Session closed"),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("tokenAuth" = []))
)]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    auth: CurrentUser,
) -> AppResult<Json<MessageResponse>> {
    let usuario_id = auth.principal.id();

    // Best-effort: a failed audit write must not keep the token alive.
    if let Err(err) =
        bitacora::cerrar_sesion(&state.pool, usuario_id, client_ip(&headers)).await
    {
        tracing::error!(%err, %usuario_id, "failed to close bitacora entry on logout");
    }

    state.tokens.revoke(&auth.token_key).await?;

    Ok(Json(MessageResponse {
        message: "Sesión cerrada correctamente".to_string(),
    }))
}

#[utoipa::path(
    get,
    path = "/auth/perfil",
    tag = "Auth",
    responses((status = 200, description = "Authenticated profile", body = PerfilResponse)),
    security(("tokenAuth" = []))
)]
pub async fn perfil(
    State(state): State<AppState>,
    headers: HeaderMap,
    auth: CurrentUser,
) -> AppResult<Json<PerfilResponse>> {
    let principal = auth.principal;

    bitacora::registrar(
        &state.pool,
        Some(principal.id()),
        client_ip(&headers),
        "usuario",
        "ver",
        "Consultó su perfil",
    )
    .await;

    let facets = &principal.facets;
    Ok(Json(PerfilResponse {
        superadmin: facets.superadmin,
        admin: facets.admin.is_some(),
        puesto: facets.admin.as_ref().and_then(|a| a.puesto.clone()),
        profesor: facets.profesor,
        estudiante: facets.estudiante,
        tutor: facets.tutor,
        usuario: principal.usuario,
    }))
}

async fn fetch_usuario_by_id(pool: &SqlitePool, usuario_id: Uuid) -> AppResult<Usuario> {
    let db_usuario = sqlx::query_as::<_, DbUsuario>(
        "SELECT u.id, u.ci, u.username, u.nombre, u.apellido, u.email, u.telefono, \
                u.sexo, u.fecha_nacimiento, u.password_hash, u.estado, r.nombre AS rol, \
                u.date_joined \
         FROM usuario u JOIN rol r ON r.id = u.rol_id WHERE u.id = ?",
    )
    .bind(usuario_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("usuario no encontrado"))?;

    db_usuario.try_into()
}
