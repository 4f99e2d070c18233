use axum::http::Method;
use sqlx::SqlitePool;

use crate::errors::{AppError, AppResult};
use crate::models::estudiante::Estudiante;

use super::principal::{Facet, Principal};

/// Canonical CRUD operation a request maps onto. Names match the `accion`
/// rows of the permission matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Ver,
    Crear,
    Editar,
    Eliminar,
}

impl Operation {
    /// Deterministic verb table. Unrecognized methods degrade to `Ver`, the
    /// least destructive classification.
    pub fn classify(method: &Method) -> Self {
        match *method {
            Method::GET | Method::HEAD | Method::OPTIONS => Operation::Ver,
            Method::POST => Operation::Crear,
            Method::PUT | Method::PATCH => Operation::Editar,
            Method::DELETE => Operation::Eliminar,
            _ => Operation::Ver,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Ver => "ver",
            Operation::Crear => "crear",
            Operation::Editar => "editar",
            Operation::Eliminar => "eliminar",
        }
    }
}

/// Permission-decision engine over the grant tables.
///
/// Ordered rule pipeline, first match wins:
/// 1. anonymous -> deny
/// 2. superadmin -> allow
/// 3. `ver` by any authenticated non-admin -> allow
/// 4. admin -> allow iff a matching position grant exists
/// 5. otherwise -> allow iff a matching role grant exists
///
/// A missing grant row or an unregistered resource-kind name is a normal
/// `false`, never an error; the engine fails closed. Decisions are computed
/// fresh per request against the store.
#[derive(Debug, Clone)]
pub struct Engine {
    pool: SqlitePool,
}

impl Engine {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn authorize(
        &self,
        principal: Option<&Principal>,
        modelo: &str,
        method: &Method,
    ) -> sqlx::Result<bool> {
        let principal = match principal {
            Some(p) => p,
            None => return Ok(false),
        };

        let operation = Operation::classify(method);

        match principal.facet() {
            Facet::SuperAdmin => {
                tracing::debug!(usuario = %principal.id(), modelo, "superadmin bypass");
                Ok(true)
            }
            Facet::Rol => {
                // Read access is open to any authenticated non-admin account.
                // Deliberately permissive; preserved from the observed
                // behavior of every permission class in the system this
                // replaces.
                if operation == Operation::Ver {
                    return Ok(true);
                }

                let allowed = self
                    .role_grant_exists(&principal.usuario.rol, modelo, operation)
                    .await?;
                tracing::debug!(
                    usuario = %principal.id(),
                    rol = %principal.usuario.rol,
                    modelo,
                    accion = operation.as_str(),
                    allowed,
                    "role grant decision"
                );
                Ok(allowed)
            }
            Facet::Admin => {
                // Decided strictly by the position grant table. An admin
                // without an assigned puesto matches no row and is denied.
                let puesto = match principal.puesto() {
                    Some(p) => p,
                    None => {
                        tracing::debug!(
                            usuario = %principal.id(),
                            modelo,
                            "admin without puesto denied"
                        );
                        return Ok(false);
                    }
                };

                let allowed = self.position_grant_exists(puesto, modelo, operation).await?;
                tracing::debug!(
                    usuario = %principal.id(),
                    puesto,
                    modelo,
                    accion = operation.as_str(),
                    allowed,
                    "position grant decision"
                );
                Ok(allowed)
            }
        }
    }

    /// Object-level variant for student records. Generic superadmin/admin
    /// rules short-circuit as in [`Self::authorize`]; other facets are decided
    /// by ownership predicates:
    /// - tutor: a guardian-student link row must connect them to the target;
    /// - profesor: homeroom teacher of the target's section, or assigned to
    ///   teach a subject within it;
    /// - estudiante: only their own record.
    pub async fn authorize_object(
        &self,
        principal: Option<&Principal>,
        modelo: &str,
        method: &Method,
        objeto: &Estudiante,
    ) -> sqlx::Result<bool> {
        let principal = match principal {
            Some(p) => p,
            None => return Ok(false),
        };

        match principal.facet() {
            Facet::SuperAdmin => return Ok(true),
            Facet::Admin => {
                let operation = Operation::classify(method);
                let puesto = match principal.puesto() {
                    Some(p) => p,
                    None => return Ok(false),
                };
                return self.position_grant_exists(puesto, modelo, operation).await;
            }
            Facet::Rol => {}
        }

        if principal.facets.tutor {
            let linked: i64 = sqlx::query_scalar(
                "SELECT COUNT(1) FROM tutor_estudiante WHERE tutor_id = ? AND estudiante_id = ?",
            )
            .bind(principal.id().to_string())
            .bind(objeto.usuario_id.to_string())
            .fetch_one(&self.pool)
            .await?;
            return Ok(linked > 0);
        }

        if principal.facets.profesor {
            let curso_id = match objeto.curso_id {
                Some(id) => id.to_string(),
                None => return Ok(false),
            };

            let teaches: i64 = sqlx::query_scalar(
                "SELECT (SELECT COUNT(1) FROM curso WHERE id = ? AND asesor_id = ?) \
                 + (SELECT COUNT(1) FROM materia_curso WHERE curso_id = ? AND profesor_id = ?)",
            )
            .bind(&curso_id)
            .bind(principal.id().to_string())
            .bind(&curso_id)
            .bind(principal.id().to_string())
            .fetch_one(&self.pool)
            .await?;
            return Ok(teaches > 0);
        }

        if principal.facets.estudiante {
            return Ok(objeto.usuario_id == principal.id());
        }

        Ok(false)
    }

    /// Handler-facing wrapper: anonymous -> 401, denied -> 403.
    pub async fn ensure(
        &self,
        principal: Option<&Principal>,
        modelo: &str,
        method: &Method,
    ) -> AppResult<()> {
        if principal.is_none() {
            return Err(AppError::unauthorized("authentication required"));
        }
        if self.authorize(principal, modelo, method).await? {
            Ok(())
        } else {
            Err(AppError::forbidden(format!(
                "no permission for {} on {}",
                Operation::classify(method).as_str(),
                modelo
            )))
        }
    }

    pub async fn ensure_object(
        &self,
        principal: Option<&Principal>,
        modelo: &str,
        method: &Method,
        objeto: &Estudiante,
    ) -> AppResult<()> {
        if principal.is_none() {
            return Err(AppError::unauthorized("authentication required"));
        }
        if self
            .authorize_object(principal, modelo, method, objeto)
            .await?
        {
            Ok(())
        } else {
            Err(AppError::forbidden("no permission for this record"))
        }
    }

    async fn position_grant_exists(
        &self,
        puesto: &str,
        modelo: &str,
        operation: Operation,
    ) -> sqlx::Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM permiso_puesto pp \
             JOIN puesto p ON p.id = pp.puesto_id \
             JOIN modelo_permitido m ON m.id = pp.modelo_id \
             JOIN accion a ON a.id = pp.accion_id \
             WHERE p.nombre = ? AND m.nombre = ? AND a.nombre = ?",
        )
        .bind(puesto)
        .bind(modelo)
        .bind(operation.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn role_grant_exists(
        &self,
        rol: &str,
        modelo: &str,
        operation: Operation,
    ) -> sqlx::Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM permiso_rol pr \
             JOIN rol r ON r.id = pr.rol_id \
             JOIN modelo_permitido m ON m.id = pr.modelo_id \
             JOIN accion a ON a.id = pr.accion_id \
             WHERE r.nombre = ? AND m.nombre = ? AND a.nombre = ?",
        )
        .bind(rol)
        .bind(modelo)
        .bind(operation.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }
}
