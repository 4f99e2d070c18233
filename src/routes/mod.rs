pub mod auth;
pub mod bitacora;
pub mod estudiantes;
pub mod health;
pub mod rbac;
