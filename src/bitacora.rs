//! Audit log ("bitácora") contract: append, close, query.
//!
//! Writes are best-effort at the call sites: a failed audit insert is logged
//! and never blocks the operation that triggered it.

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::AppResult;
use crate::models::bitacora::{Bitacora, BitacoraQuery, DbBitacora, Paginated};

/// Append an entry. Failures are reported via tracing only.
pub async fn registrar(
    pool: &SqlitePool,
    usuario_id: Option<Uuid>,
    ip: Option<String>,
    tabla_afectada: &str,
    accion: &str,
    descripcion: &str,
) {
    if let Err(err) = insertar(pool, usuario_id, ip, tabla_afectada, accion, descripcion).await {
        tracing::error!(%err, tabla_afectada, accion, "failed to write bitacora entry");
    }
}

async fn insertar(
    pool: &SqlitePool,
    usuario_id: Option<Uuid>,
    ip: Option<String>,
    tabla_afectada: &str,
    accion: &str,
    descripcion: &str,
) -> sqlx::Result<()> {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO bitacora (id, usuario_id, hora_entrada, ip, tabla_afectada, accion, descripcion, fecha) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(usuario_id.map(|u| u.to_string()))
    .bind(now)
    .bind(ip)
    .bind(tabla_afectada)
    .bind(accion)
    .bind(descripcion)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

/// Close the account's most recent open entry, pairing a logout to its login.
/// When no open entry exists, synthesize one whose entry and close timestamps
/// are equal.
pub async fn cerrar_sesion(
    pool: &SqlitePool,
    usuario_id: Uuid,
    ip: Option<String>,
) -> sqlx::Result<()> {
    let now = Utc::now();

    let abierta: Option<String> = sqlx::query_scalar(
        "SELECT id FROM bitacora WHERE usuario_id = ? AND hora_salida IS NULL \
         ORDER BY hora_entrada DESC LIMIT 1",
    )
    .bind(usuario_id.to_string())
    .fetch_optional(pool)
    .await?;

    match abierta {
        Some(id) => {
            sqlx::query("UPDATE bitacora SET hora_salida = ?, descripcion = ? WHERE id = ?")
                .bind(now)
                .bind("Cierre de sesión")
                .bind(id)
                .execute(pool)
                .await?;
        }
        None => {
            sqlx::query(
                "INSERT INTO bitacora (id, usuario_id, hora_entrada, hora_salida, ip, tabla_afectada, accion, descripcion, fecha) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(usuario_id.to_string())
            .bind(now)
            .bind(now)
            .bind(ip)
            .bind("usuario")
            .bind("ver")
            .bind("Cierre de sesión sin entrada previa")
            .bind(now)
            .execute(pool)
            .await?;
        }
    }

    Ok(())
}

/// Paginated query ordered by entry-open timestamp descending, optionally
/// filtered by principal.
pub async fn consultar(
    pool: &SqlitePool,
    config: &AppConfig,
    query: &BitacoraQuery,
) -> AppResult<Paginated<Bitacora>> {
    let page = query.page.unwrap_or(1).max(1);
    let page_size = config.clamp_page_size(query.page_size);
    // Saturate: an absurd page number yields an empty page, never a panic.
    let offset = (page - 1).saturating_mul(page_size);
    let usuario = query.usuario.map(|u| u.to_string());

    let count: i64 = match &usuario {
        Some(u) => {
            sqlx::query_scalar("SELECT COUNT(1) FROM bitacora WHERE usuario_id = ?")
                .bind(u)
                .fetch_one(pool)
                .await?
        }
        None => {
            sqlx::query_scalar("SELECT COUNT(1) FROM bitacora")
                .fetch_one(pool)
                .await?
        }
    };

    let rows: Vec<DbBitacora> = match &usuario {
        Some(u) => {
            sqlx::query_as(
                "SELECT id, usuario_id, hora_entrada, hora_salida, ip, tabla_afectada, accion, descripcion, fecha \
                 FROM bitacora WHERE usuario_id = ? ORDER BY hora_entrada DESC LIMIT ? OFFSET ?",
            )
            .bind(u)
            .bind(page_size)
            .bind(offset)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as(
                "SELECT id, usuario_id, hora_entrada, hora_salida, ip, tabla_afectada, accion, descripcion, fecha \
                 FROM bitacora ORDER BY hora_entrada DESC LIMIT ? OFFSET ?",
            )
            .bind(page_size)
            .bind(offset)
            .fetch_all(pool)
            .await?
        }
    };

    let results = rows
        .into_iter()
        .map(Bitacora::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Paginated {
        count,
        page,
        page_size,
        next: (page.saturating_mul(page_size) < count).then(|| page + 1),
        previous: (page > 1).then_some(page - 1),
        results,
    })
}
