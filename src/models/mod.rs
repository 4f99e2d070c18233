pub mod bitacora;
pub mod estudiante;
pub mod rbac;
pub mod usuario;
