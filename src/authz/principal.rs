use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::usuario::Usuario;

/// Admin capability row: a variable job title (the position grant key) and an
/// optional institution-unit scope.
#[derive(Debug, Clone, Default)]
pub struct AdminFacet {
    pub puesto: Option<String>,
    pub unidad_id: Option<Uuid>,
}

/// The capability rows an account holds, loaded once per request. Multiple
/// facets can coexist; the engine applies them in precedence order.
#[derive(Debug, Clone, Default)]
pub struct FacetSet {
    pub superadmin: bool,
    pub admin: Option<AdminFacet>,
    pub profesor: bool,
    pub estudiante: bool,
    pub tutor: bool,
}

impl FacetSet {
    /// Load the facet rows for an account. One round trip per facet table;
    /// absence of a row is the normal case, never an error.
    pub async fn fetch(pool: &SqlitePool, usuario_id: Uuid) -> sqlx::Result<Self> {
        let id = usuario_id.to_string();

        let superadmin: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM superadmin WHERE usuario_id = ?")
                .bind(&id)
                .fetch_one(pool)
                .await?;

        let admin_row: Option<(Option<String>, Option<String>)> = sqlx::query_as(
            "SELECT p.nombre, a.unidad_id FROM admin a \
             LEFT JOIN puesto p ON p.id = a.puesto_id \
             WHERE a.usuario_id = ? AND a.estado = 1",
        )
        .bind(&id)
        .fetch_optional(pool)
        .await?;

        let admin = admin_row.map(|(puesto, unidad)| AdminFacet {
            puesto,
            unidad_id: unidad.and_then(|u| Uuid::parse_str(&u).ok()),
        });

        let profesor: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM profesor WHERE usuario_id = ?")
                .bind(&id)
                .fetch_one(pool)
                .await?;

        let estudiante: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM estudiante WHERE usuario_id = ?")
                .bind(&id)
                .fetch_one(pool)
                .await?;

        let tutor: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM tutor WHERE usuario_id = ?")
            .bind(&id)
            .fetch_one(pool)
            .await?;

        Ok(Self {
            superadmin: superadmin > 0,
            admin,
            profesor: profesor > 0,
            estudiante: estudiante > 0,
            tutor: tutor > 0,
        })
    }
}

/// Authoritative facet by precedence: SuperAdmin > Admin > role-bearing.
/// Anonymous requests carry no principal at all (`Option<Principal>` at call
/// sites), so there is no variant for them here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facet {
    SuperAdmin,
    Admin,
    /// No privileged capability row; the account acts through its fixed role.
    Rol,
}

/// Authenticated account with its resolved capability facets.
#[derive(Debug, Clone)]
pub struct Principal {
    pub usuario: Usuario,
    pub facets: FacetSet,
}

impl Principal {
    pub fn new(usuario: Usuario) -> Self {
        Self {
            usuario,
            facets: FacetSet::default(),
        }
    }

    pub fn with_facets(mut self, facets: FacetSet) -> Self {
        self.facets = facets;
        self
    }

    pub fn id(&self) -> Uuid {
        self.usuario.id
    }

    /// The facet the engine decides by. Computed from the rows loaded at
    /// authentication time; never stored.
    pub fn facet(&self) -> Facet {
        if self.facets.superadmin {
            Facet::SuperAdmin
        } else if self.facets.admin.is_some() {
            Facet::Admin
        } else {
            Facet::Rol
        }
    }

    pub fn puesto(&self) -> Option<&str> {
        self.facets
            .admin
            .as_ref()
            .and_then(|a| a.puesto.as_deref())
    }
}
