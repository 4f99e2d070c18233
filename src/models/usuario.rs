use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

/// Public profile of an account. The password hash never leaves the Db type.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Usuario {
    pub id: Uuid,
    pub ci: String,
    pub username: String,
    pub nombre: String,
    pub apellido: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telefono: Option<String>,
    pub sexo: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fecha_nacimiento: Option<NaiveDate>,
    pub estado: bool,
    pub rol: String,
    pub date_joined: DateTime<Utc>,
}

/// Row shape for `usuario` joined with `rol` on every fetch.
#[derive(Debug, Clone, FromRow)]
pub struct DbUsuario {
    pub id: String,
    pub ci: String,
    pub username: String,
    pub nombre: String,
    pub apellido: String,
    pub email: String,
    pub telefono: Option<String>,
    pub sexo: String,
    pub fecha_nacimiento: Option<NaiveDate>,
    pub password_hash: String,
    pub estado: bool,
    pub rol: String,
    pub date_joined: DateTime<Utc>,
}

impl TryFrom<DbUsuario> for Usuario {
    type Error = AppError;

    fn try_from(value: DbUsuario) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&value.id)
            .map_err(|err| AppError::internal(format!("invalid usuario id: {err}")))?;

        Ok(Usuario {
            id,
            ci: value.ci,
            username: value.username,
            nombre: value.nombre,
            apellido: value.apellido,
            email: value.email,
            telefono: value.telefono,
            sexo: value.sexo,
            fecha_nacimiento: value.fecha_nacimiento,
            estado: value.estado,
            rol: value.rol,
            date_joined: value.date_joined,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    #[schema(example = "12345678")]
    pub ci: String,
    #[schema(example = "ada.lovelace")]
    pub username: String,
    #[schema(example = "Ada")]
    pub nombre: String,
    #[schema(example = "Lovelace")]
    pub apellido: String,
    #[schema(example = "ada@example.com")]
    pub email: String,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: String,
    pub telefono: Option<String>,
    #[schema(example = "F")]
    pub sexo: Option<String>,
    pub fecha_nacimiento: Option<NaiveDate>,
    /// Role name; must already exist.
    #[schema(example = "Profesor")]
    pub rol: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "ada.lovelace")]
    pub username: String,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: String,
    /// Advisory device label stored alongside the issued token.
    #[schema(example = "android-tablet")]
    pub device_name: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub usuario: Usuario,
}

/// Facet summary returned by /auth/perfil.
#[derive(Debug, Serialize, ToSchema)]
pub struct PerfilResponse {
    pub usuario: Usuario,
    pub superadmin: bool,
    pub admin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub puesto: Option<String>,
    pub profesor: bool,
    pub estudiante: bool,
    pub tutor: bool,
}
