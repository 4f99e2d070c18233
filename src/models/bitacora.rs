use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// One audit entry. Append-only: `hora_salida` (and its closing description)
/// is the only field ever mutated after insert.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Bitacora {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usuario_id: Option<Uuid>,
    pub hora_entrada: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hora_salida: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tabla_afectada: Option<String>,
    pub accion: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descripcion: Option<String>,
    pub fecha: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DbBitacora {
    pub id: String,
    pub usuario_id: Option<String>,
    pub hora_entrada: DateTime<Utc>,
    pub hora_salida: Option<DateTime<Utc>>,
    pub ip: Option<String>,
    pub tabla_afectada: Option<String>,
    pub accion: String,
    pub descripcion: Option<String>,
    pub fecha: DateTime<Utc>,
}

impl TryFrom<DbBitacora> for Bitacora {
    type Error = crate::errors::AppError;

    fn try_from(value: DbBitacora) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&value.id)
            .map_err(|err| crate::errors::AppError::internal(format!("invalid bitacora id: {err}")))?;

        Ok(Bitacora {
            id,
            usuario_id: value.usuario_id.and_then(|u| Uuid::parse_str(&u).ok()),
            hora_entrada: value.hora_entrada,
            hora_salida: value.hora_salida,
            ip: value.ip,
            tabla_afectada: value.tabla_afectada,
            accion: value.accion,
            descripcion: value.descripcion,
            fecha: value.fecha,
        })
    }
}

/// Paginated envelope for the bitacora query endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct Paginated<T> {
    pub count: i64,
    pub page: i64,
    pub page_size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<i64>,
    pub results: Vec<T>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BitacoraQuery {
    /// Filter by principal id.
    pub usuario: Option<Uuid>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}
