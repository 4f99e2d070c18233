//! End-to-end decision-pipeline scenarios: anonymous callers, plain accounts
//! under role grants, admins under position grants, and the superadmin bypass.

use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::json;
use sqlx::SqlitePool;
use tempfile::{tempdir, TempDir};
use tower::util::ServiceExt;
use uuid::Uuid;

use aula_backend::{create_app, AppConfig};

async fn setup() -> Result<(Router, SqlitePool, TempDir)> {
    let dir = tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test_authz.db");
    use sqlx::sqlite::SqliteConnectOptions;
    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(
        std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"),
    )
    .await?;
    migrator.run(&pool).await?;

    for rol in ["Profesor", "Estudiante", "Tutor"] {
        sqlx::query("INSERT INTO rol (id, nombre) VALUES (?, ?)")
            .bind(Uuid::new_v4().to_string())
            .bind(rol)
            .execute(&pool)
            .await?;
    }
    for modelo in ["estudiante", "bitacora", "rol"] {
        sqlx::query("INSERT INTO modelo_permitido (id, nombre) VALUES (?, ?)")
            .bind(Uuid::new_v4().to_string())
            .bind(modelo)
            .execute(&pool)
            .await?;
    }

    let app = create_app(pool.clone(), AppConfig::default()).await?;
    Ok((app, pool, dir))
}

/// Registers an account with the given rol and returns (token, usuario id).
async fn register_login(app: &Router, username: &str, rol: &str) -> Result<(String, String)> {
    let body = json!({
        "ci": format!("ci-{username}"),
        "username": username,
        "nombre": "Test",
        "apellido": "User",
        "email": format!("{username}@example.com"),
        "password": "password123",
        "rol": rol
    });
    let req = Request::builder()
        .method("POST")
        .uri("/auth/register")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))?;
    let resp = app.clone().oneshot(req).await?;
    anyhow::ensure!(resp.status() == StatusCode::CREATED, "register failed");

    let body = json!({ "username": username, "password": "password123" });
    let req = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))?;
    let resp = app.clone().oneshot(req).await?;
    anyhow::ensure!(resp.status() == StatusCode::OK, "login failed");

    let bytes = body::to_bytes(resp.into_body(), usize::MAX).await?;
    let auth: serde_json::Value = serde_json::from_slice(&bytes)?;
    let token = auth["token"].as_str().context("token")?.to_string();
    let id = auth["usuario"]["id"].as_str().context("usuario id")?.to_string();
    Ok((token, id))
}

async fn make_admin(pool: &SqlitePool, usuario_id: &str, puesto: Option<&str>) -> Result<()> {
    let puesto_id = match puesto {
        Some(nombre) => {
            let id = Uuid::new_v4().to_string();
            sqlx::query("INSERT INTO puesto (id, nombre) VALUES (?, ?)")
                .bind(&id)
                .bind(nombre)
                .execute(pool)
                .await?;
            Some(id)
        }
        None => None,
    };

    sqlx::query("INSERT INTO admin (usuario_id, puesto_id, estado) VALUES (?, ?, 1)")
        .bind(usuario_id)
        .bind(puesto_id)
        .execute(pool)
        .await?;
    Ok(())
}

async fn grant_puesto(pool: &SqlitePool, puesto: &str, modelo: &str, accion: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO permiso_puesto (id, puesto_id, modelo_id, accion_id) VALUES (?, \
            (SELECT id FROM puesto WHERE nombre = ?), \
            (SELECT id FROM modelo_permitido WHERE nombre = ?), \
            (SELECT id FROM accion WHERE nombre = ?))",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(puesto)
    .bind(modelo)
    .bind(accion)
    .execute(pool)
    .await?;
    Ok(())
}

async fn grant_rol(pool: &SqlitePool, rol: &str, modelo: &str, accion: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO permiso_rol (id, rol_id, modelo_id, accion_id) VALUES (?, \
            (SELECT id FROM rol WHERE nombre = ?), \
            (SELECT id FROM modelo_permitido WHERE nombre = ?), \
            (SELECT id FROM accion WHERE nombre = ?))",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(rol)
    .bind(modelo)
    .bind(accion)
    .execute(pool)
    .await?;
    Ok(())
}

async fn request(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Result<StatusCode> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(t) = token {
        builder = builder.header("authorization", format!("Token {t}"));
    }
    let req = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))?,
        None => builder.body(Body::empty())?,
    };
    Ok(app.clone().oneshot(req).await?.status())
}

#[tokio::test]
async fn anonymous_callers_are_rejected() -> Result<()> {
    let (app, _pool, _dir) = setup().await?;

    assert_eq!(
        request(&app, "GET", "/estudiantes", None, None).await?,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        request(&app, "GET", "/bitacoras", None, None).await?,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        request(&app, "POST", "/rbac/roles", None, Some(json!({ "nombre": "X" }))).await?,
        StatusCode::UNAUTHORIZED
    );

    Ok(())
}

#[tokio::test]
async fn plain_accounts_view_freely_but_mutate_only_with_role_grants() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let (token, _) = register_login(&app, "profe", "Profesor").await?;
    let (_, target_id) = register_login(&app, "alumno", "Estudiante").await?;

    // reads are open to authenticated non-admins even with an empty matrix
    assert_eq!(
        request(&app, "GET", "/estudiantes", Some(&token), None).await?,
        StatusCode::OK
    );
    assert_eq!(
        request(&app, "GET", "/bitacoras", Some(&token), None).await?,
        StatusCode::OK
    );

    // mutations need an explicit role grant
    let payload = json!({ "usuario_id": target_id });
    assert_eq!(
        request(&app, "POST", "/estudiantes", Some(&token), Some(payload.clone())).await?,
        StatusCode::FORBIDDEN
    );

    grant_rol(&pool, "Profesor", "estudiante", "crear").await?;
    assert_eq!(
        request(&app, "POST", "/estudiantes", Some(&token), Some(payload)).await?,
        StatusCode::CREATED
    );

    // the grant was for crear only
    assert_eq!(
        request(&app, "DELETE", &format!("/estudiantes/{target_id}"), Some(&token), None).await?,
        StatusCode::FORBIDDEN
    );

    Ok(())
}

#[tokio::test]
async fn admins_are_decided_by_position_grants_alone() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let (token, admin_id) = register_login(&app, "secretaria", "Profesor").await?;
    make_admin(&pool, &admin_id, Some("Secretaria")).await?;
    grant_puesto(&pool, "Secretaria", "estudiante", "ver").await?;

    // the ver grant covers reads on that modelo only; the open-view default
    // does not apply to admins
    assert_eq!(
        request(&app, "GET", "/estudiantes", Some(&token), None).await?,
        StatusCode::OK
    );
    assert_eq!(
        request(&app, "GET", "/bitacoras", Some(&token), None).await?,
        StatusCode::FORBIDDEN
    );

    // role grants never apply to an admin holder
    grant_rol(&pool, "Profesor", "estudiante", "crear").await?;
    assert_eq!(
        request(
            &app,
            "POST",
            "/estudiantes",
            Some(&token),
            Some(json!({ "usuario_id": admin_id }))
        )
        .await?,
        StatusCode::FORBIDDEN
    );

    Ok(())
}

#[tokio::test]
async fn admin_without_puesto_is_denied_everything() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let (token, admin_id) = register_login(&app, "sinpuesto", "Profesor").await?;
    make_admin(&pool, &admin_id, None).await?;

    assert_eq!(
        request(&app, "GET", "/estudiantes", Some(&token), None).await?,
        StatusCode::FORBIDDEN
    );
    assert_eq!(
        request(&app, "GET", "/bitacoras", Some(&token), None).await?,
        StatusCode::FORBIDDEN
    );

    Ok(())
}

#[tokio::test]
async fn superadmin_bypasses_the_matrix() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let (token, super_id) = register_login(&app, "root", "Profesor").await?;
    sqlx::query("INSERT INTO superadmin (usuario_id) VALUES (?)")
        .bind(&super_id)
        .execute(&pool)
        .await?;

    // full matrix management without a single grant row
    assert_eq!(
        request(
            &app,
            "POST",
            "/rbac/roles",
            Some(&token),
            Some(json!({ "nombre": "Bibliotecario" }))
        )
        .await?,
        StatusCode::CREATED
    );
    assert_eq!(
        request(
            &app,
            "POST",
            "/rbac/modelos",
            Some(&token),
            Some(json!({ "nombre": "curso" }))
        )
        .await?,
        StatusCode::CREATED
    );
    assert_eq!(
        request(
            &app,
            "POST",
            "/rbac/permisos-rol",
            Some(&token),
            Some(json!({ "rol": "Bibliotecario", "modelo": "curso", "accion": "ver" }))
        )
        .await?,
        StatusCode::CREATED
    );
    assert_eq!(
        request(&app, "GET", "/bitacoras", Some(&token), None).await?,
        StatusCode::OK
    );

    // duplicate grant reports a conflict
    assert_eq!(
        request(
            &app,
            "POST",
            "/rbac/permisos-rol",
            Some(&token),
            Some(json!({ "rol": "Bibliotecario", "modelo": "curso", "accion": "ver" }))
        )
        .await?,
        StatusCode::CONFLICT
    );

    // grant against an unregistered modelo fails with 404, not a silent row
    assert_eq!(
        request(
            &app,
            "POST",
            "/rbac/permisos-rol",
            Some(&token),
            Some(json!({ "rol": "Bibliotecario", "modelo": "inexistente", "accion": "ver" }))
        )
        .await?,
        StatusCode::NOT_FOUND
    );

    Ok(())
}

#[tokio::test]
async fn rol_referenced_by_accounts_cannot_be_deleted() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let (token, super_id) = register_login(&app, "root", "Profesor").await?;
    sqlx::query("INSERT INTO superadmin (usuario_id) VALUES (?)")
        .bind(&super_id)
        .execute(&pool)
        .await?;

    let rol_id: String = sqlx::query_scalar("SELECT id FROM rol WHERE nombre = 'Profesor'")
        .fetch_one(&pool)
        .await?;
    assert_eq!(
        request(&app, "DELETE", &format!("/rbac/roles/{rol_id}"), Some(&token), None).await?,
        StatusCode::CONFLICT
    );

    // an unused rol deletes cleanly
    let tutor_id: String = sqlx::query_scalar("SELECT id FROM rol WHERE nombre = 'Tutor'")
        .fetch_one(&pool)
        .await?;
    assert_eq!(
        request(&app, "DELETE", &format!("/rbac/roles/{tutor_id}"), Some(&token), None).await?,
        StatusCode::NO_CONTENT
    );
    assert_eq!(
        request(&app, "DELETE", &format!("/rbac/roles/{tutor_id}"), Some(&token), None).await?,
        StatusCode::NOT_FOUND
    );

    Ok(())
}
