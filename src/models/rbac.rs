use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

// =============================================================================
// ROL / PUESTO: the two independent grant axes
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Rol {
    pub id: Uuid,
    pub nombre: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descripcion: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RolCreateRequest {
    #[schema(example = "Profesor")]
    pub nombre: String,
    pub descripcion: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Puesto {
    pub id: Uuid,
    pub nombre: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descripcion: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PuestoCreateRequest {
    #[schema(example = "Secretaria")]
    pub nombre: String,
    pub descripcion: Option<String>,
}

// =============================================================================
// ACCION / MODELO PERMITIDO: the permission matrix dimensions
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Accion {
    pub id: Uuid,
    pub nombre: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ModeloPermitido {
    pub id: Uuid,
    pub nombre: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ModeloCreateRequest {
    /// Stable resource-kind name the engine matches against, e.g. "estudiante".
    #[schema(example = "estudiante")]
    pub nombre: String,
}

// =============================================================================
// GRANTS: unique (puesto|rol, modelo, accion) triples
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PermisoPuesto {
    pub id: Uuid,
    pub puesto: String,
    pub modelo: String,
    pub accion: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PermisoRol {
    pub id: Uuid,
    pub rol: String,
    pub modelo: String,
    pub accion: String,
}

/// Grant rows are created by name; handlers resolve names to ids.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PermisoPuestoCreateRequest {
    #[schema(example = "Secretaria")]
    pub puesto: String,
    #[schema(example = "estudiante")]
    pub modelo: String,
    #[schema(example = "ver")]
    pub accion: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PermisoRolCreateRequest {
    #[schema(example = "Profesor")]
    pub rol: String,
    #[schema(example = "estudiante")]
    pub modelo: String,
    #[schema(example = "editar")]
    pub accion: String,
}
