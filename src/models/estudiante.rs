use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Student record as the object-level rules see it: who it belongs to and
/// which section it sits in.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Estudiante {
    pub usuario_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub curso_id: Option<Uuid>,
}

/// List/detail shape joined with the owning account.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EstudianteDetalle {
    pub usuario_id: Uuid,
    pub nombre: String,
    pub apellido: String,
    pub ci: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub curso_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EstudianteCreateRequest {
    /// Existing account to attach the student facet to.
    pub usuario_id: Uuid,
    pub curso_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EstudianteUpdateRequest {
    pub curso_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VincularTutorRequest {
    pub tutor_id: Uuid,
}
