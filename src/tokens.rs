use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::{DateTime, Utc};
use rand_core::{OsRng, RngCore};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{FacetSet, Principal};
use crate::errors::{AppError, AppResult};
use crate::models::usuario::{DbUsuario, Usuario};

/// Exact scheme prefix of the bearer header: `Authorization: Token <hex-key>`.
const SCHEME_PREFIX: &str = "Token ";

/// 20 random bytes -> 40 hex chars.
const KEY_BYTES: usize = 20;

#[derive(Debug, Clone)]
pub struct Token {
    pub key: String,
    pub usuario_id: Uuid,
    pub created: DateTime<Utc>,
    pub device_name: Option<String>,
}

/// Opaque multi-device bearer tokens. Many tokens may coexist per account,
/// each independently revocable; issuing never invalidates prior tokens.
#[derive(Debug, Clone)]
pub struct TokenService {
    pool: SqlitePool,
}

impl TokenService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn issue(&self, usuario_id: Uuid, device_name: Option<&str>) -> AppResult<Token> {
        let mut bytes = [0u8; KEY_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let key = hex::encode(bytes);
        let created = Utc::now();

        sqlx::query(
            "INSERT INTO multi_token (key, usuario_id, created, device_name) VALUES (?, ?, ?, ?)",
        )
        .bind(&key)
        .bind(usuario_id.to_string())
        .bind(created)
        .bind(device_name)
        .execute(&self.pool)
        .await?;

        Ok(Token {
            key,
            usuario_id,
            created,
            device_name: device_name.map(String::from),
        })
    }

    /// Resolve the bearer header into an authenticated principal.
    ///
    /// - absent header or wrong scheme prefix -> `Ok(None)`: no credential
    ///   supplied, the request proceeds as anonymous;
    /// - present key unknown to the store -> `Err(Unauthorized)`: an
    ///   authentication failure, which never falls through to anonymous.
    pub async fn authenticate(&self, header: Option<&str>) -> AppResult<Option<Principal>> {
        let key = match header.and_then(|h| h.strip_prefix(SCHEME_PREFIX)) {
            Some(k) => k,
            None => return Ok(None),
        };

        let usuario_id: Option<String> =
            sqlx::query_scalar("SELECT usuario_id FROM multi_token WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        let usuario_id = usuario_id.ok_or_else(|| AppError::unauthorized("token inválido"))?;
        let usuario_id = Uuid::parse_str(&usuario_id)
            .map_err(|err| AppError::internal(format!("invalid token owner id: {err}")))?;

        let usuario = self.fetch_usuario(usuario_id).await?;
        let facets = FacetSet::fetch(&self.pool, usuario_id).await?;

        Ok(Some(Principal::new(usuario).with_facets(facets)))
    }

    /// Delete a token. Idempotent: revoking an unknown key is a no-op.
    pub async fn revoke(&self, key: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM multi_token WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn fetch_usuario(&self, usuario_id: Uuid) -> AppResult<Usuario> {
        let db_usuario = sqlx::query_as::<_, DbUsuario>(
            "SELECT u.id, u.ci, u.username, u.nombre, u.apellido, u.email, u.telefono, \
                    u.sexo, u.fecha_nacimiento, u.password_hash, u.estado, r.nombre AS rol, \
                    u.date_joined \
             FROM usuario u JOIN rol r ON r.id = u.rol_id WHERE u.id = ?",
        )
        .bind(usuario_id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::unauthorized("token inválido"))?;

        db_usuario.try_into()
    }
}

fn authorization_header(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
}

/// Extractor for handlers that require an authenticated principal; rejects
/// with 401 when the credential is absent or invalid. Carries the presented
/// token key so logout can revoke exactly that session.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub principal: Principal,
    pub token_key: String,
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = authorization_header(parts);
        let principal = state
            .tokens
            .authenticate(header)
            .await?
            .ok_or_else(|| AppError::unauthorized("credenciales no proporcionadas"))?;

        // The prefix is guaranteed present when authenticate returned a principal.
        let token_key = header
            .and_then(|h| h.strip_prefix(SCHEME_PREFIX))
            .unwrap_or_default()
            .to_string();

        Ok(CurrentUser {
            principal,
            token_key,
        })
    }
}

/// Extractor for engine-guarded handlers whose resources admit anonymous
/// evaluation: absent credential yields `None`, but a present-and-invalid
/// token still rejects with 401.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<Principal>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = authorization_header(parts);
        Ok(MaybeUser(state.tokens.authenticate(header).await?))
    }
}
