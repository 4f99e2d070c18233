use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use aula_backend::{app, config::AppConfig, db, models, routes};

#[derive(OpenApi)]
#[openapi(
    components(
        schemas(
            models::usuario::Usuario,
            models::usuario::AuthResponse,
            models::usuario::LoginRequest,
            models::usuario::RegisterRequest,
            models::usuario::PerfilResponse,
            models::rbac::Rol,
            models::rbac::RolCreateRequest,
            models::rbac::Puesto,
            models::rbac::PuestoCreateRequest,
            models::rbac::Accion,
            models::rbac::ModeloPermitido,
            models::rbac::ModeloCreateRequest,
            models::rbac::PermisoPuesto,
            models::rbac::PermisoPuestoCreateRequest,
            models::rbac::PermisoRol,
            models::rbac::PermisoRolCreateRequest,
            models::bitacora::Bitacora,
            models::estudiante::Estudiante,
            models::estudiante::EstudianteDetalle,
            models::estudiante::EstudianteCreateRequest,
            models::estudiante::EstudianteUpdateRequest,
            models::estudiante::VincularTutorRequest,
            routes::health::HealthResponse
        )
    ),
    tags(
        (name = "Auth", description = "Token authentication and session bitacora"),
        (name = "RBAC", description = "Permission matrix management"),
        (name = "Bitacora", description = "Audit log queries"),
        (name = "Estudiantes", description = "Student records"),
        (name = "Health", description = "Service health")
    ),
    modifiers(&TokenSecurity)
)]
struct ApiDoc;

/// Registers the `Authorization: Token <hex-key>` scheme so Swagger UI's
/// Authorize dialog sends the header.
struct TokenSecurity;

impl utoipa::Modify for TokenSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};

        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "tokenAuth",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("Authorization"))),
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env();
    init_tracing();

    let config = AppConfig::from_env()?;
    let port = config.port;

    let pool = db::init().await?;
    let app = app::create_app(pool, config).await?;

    let app = app.merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

fn load_env() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    let _ = dotenvy::from_path(crate_env);
}

fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
