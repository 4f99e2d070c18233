//! Authorization module.
//!
//! Two independent grant axes evaluated against a data-driven permission
//! matrix:
//! - position grants (`permiso_puesto`) for admin-facet accounts, keyed by
//!   their job title;
//! - role grants (`permiso_rol`) for everyone else, keyed by the account's
//!   fixed role.
//!
//! Decisions are a single ordered rule pipeline (see [`Engine`]) that returns
//! at the first decisive rule, plus object-level ownership predicates for
//! student records.

mod engine;
mod principal;

pub use engine::{Engine, Operation};
pub use principal::{AdminFacet, Facet, FacetSet, Principal};

/// Stable resource-kind names for the crate's own protected surfaces. Every
/// protected resource registers the name the engine is called with.
pub mod modelos {
    pub const ESTUDIANTE: &str = "estudiante";
    pub const BITACORA: &str = "bitacora";
    pub const ROL: &str = "rol";
    pub const PUESTO: &str = "puesto";
    pub const PERMISO: &str = "permiso";
}
