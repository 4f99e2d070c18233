//! Audit-log behavior: session entries written on login, closed on logout,
//! and the paginated query surface.

use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use serde_json::json;
use sqlx::{Row, SqlitePool};
use tempfile::{tempdir, TempDir};
use tower::util::ServiceExt;
use uuid::Uuid;

use aula_backend::{create_app, AppConfig};

async fn setup() -> Result<(Router, SqlitePool, TempDir)> {
    let dir = tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test_bitacora.db");
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

    sqlx::query("INSERT INTO rol (id, nombre) VALUES (?, 'Profesor')")
        .bind(Uuid::new_v4().to_string())
        .execute(&pool)
        .await?;

    let app = create_app(pool.clone(), AppConfig::default()).await?;
    Ok((app, pool, dir))
}

async fn register_login(app: &Router, username: &str) -> Result<(String, String)> {
    let body = json!({
        "ci": format!("ci-{username}"),
        "username": username,
        "nombre": "Test",
        "apellido": "User",
        "email": format!("{username}@example.com"),
        "password": "password123",
        "rol": "Profesor"
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

/// Register without logging in, so no session entry is written.
async fn register_only(app: &Router, username: &str) -> Result<String> {
    let body = json!({
        "ci": format!("ci-{username}"),
        "username": username,
        "nombre": "Test",
        "apellido": "User",
        "email": format!("{username}@example.com"),
        "password": "password123",
        "rol": "Profesor"
    });
    let req = Request::builder()
        .method("POST")
        .uri("/auth/register")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))?;
    let resp = app.clone().oneshot(req).await?;
    anyhow::ensure!(resp.status() == StatusCode::CREATED, "register failed");
    let bytes = body::to_bytes(resp.into_body(), usize::MAX).await?;
    let usuario: serde_json::Value = serde_json::from_slice(&bytes)?;
    Ok(usuario["id"].as_str().context("usuario id")?.to_string())
}

async fn logout(app: &Router, token: &str) -> Result<StatusCode> {
    let req = Request::builder()
        .method("POST")
        .uri("/auth/logout")
        .header("authorization", format!("Token {token}"))
        .body(Body::empty())?;
    Ok(app.clone().oneshot(req).await?.status())
}

async fn get_json(app: &Router, uri: &str, token: &str) -> Result<serde_json::Value> {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .header("authorization", format!("Token {token}"))
        .body(Body::empty())?;
    let resp = app.clone().oneshot(req).await?;
    anyhow::ensure!(resp.status() == StatusCode::OK, "request failed: {}", resp.status());
    let bytes = body::to_bytes(resp.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[tokio::test]
async fn login_opens_an_entry_and_logout_closes_it() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let (token, usuario_id) = register_login(&app, "ada").await?;

    let row = sqlx::query(
        "SELECT accion, descripcion, hora_salida FROM bitacora WHERE usuario_id = ?",
    )
    .bind(&usuario_id)
    .fetch_one(&pool)
    .await?;
    assert_eq!(row.get::<&str, _>("accion"), "crear");
    assert_eq!(row.get::<&str, _>("descripcion"), "Inicio de sesión exitoso");
    assert!(row.get::<Option<String>, _>("hora_salida").is_none());

    assert_eq!(logout(&app, &token).await?, StatusCode::OK);

    let row = sqlx::query(
        "SELECT descripcion, hora_salida FROM bitacora WHERE usuario_id = ?",
    )
    .bind(&usuario_id)
    .fetch_one(&pool)
    .await?;
    assert_eq!(row.get::<&str, _>("descripcion"), "Cierre de sesión");
    assert!(row.get::<Option<String>, _>("hora_salida").is_some());

    Ok(())
}

#[tokio::test]
async fn failed_logins_leave_no_trace() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    register_login(&app, "ada").await?;

    let body = json!({ "username": "ada", "password": "wrongpassword" });
    let req = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // only the successful login from setup is recorded
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM bitacora")
        .fetch_one(&pool)
        .await?;
    assert_eq!(count, 1);

    Ok(())
}

#[tokio::test]
async fn logout_without_open_entry_synthesizes_a_closed_one() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let (token, usuario_id) = register_login(&app, "ada").await?;

    // close the login entry out-of-band so nothing is left open
    sqlx::query("UPDATE bitacora SET hora_salida = hora_entrada WHERE usuario_id = ?")
        .bind(&usuario_id)
        .execute(&pool)
        .await?;

    assert_eq!(logout(&app, &token).await?, StatusCode::OK);

    let row = sqlx::query(
        "SELECT hora_entrada, hora_salida, descripcion FROM bitacora \
         WHERE usuario_id = ? AND descripcion = 'Cierre de sesión sin entrada previa'",
    )
    .bind(&usuario_id)
    .fetch_one(&pool)
    .await?;
    assert_eq!(
        row.get::<String, _>("hora_entrada"),
        row.get::<String, _>("hora_salida")
    );

    Ok(())
}

#[tokio::test]
async fn query_is_paginated_newest_first() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let (token, viewer_id) = register_login(&app, "root").await?;
    sqlx::query("INSERT INTO superadmin (usuario_id) VALUES (?)")
        .bind(&viewer_id)
        .execute(&pool)
        .await?;
    let target_id = register_only(&app, "observado").await?;

    let base = Utc::now();
    for i in 0..120 {
        let at = base + Duration::seconds(i);
        sqlx::query(
            "INSERT INTO bitacora (id, usuario_id, hora_entrada, tabla_afectada, accion, descripcion, fecha) \
             VALUES (?, ?, ?, 'estudiante', 'ver', ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&target_id)
        .bind(at)
        .bind(format!("entrada {i}"))
        .bind(at)
        .execute(&pool)
        .await?;
    }

    // the filter excludes the viewer's own login entry
    let page = get_json(&app, &format!("/bitacoras?usuario={target_id}"), &token).await?;
    assert_eq!(page["count"], 120);
    assert_eq!(page["page"], 1);
    assert_eq!(page["page_size"], 30);
    assert_eq!(page["results"].as_array().context("results")?.len(), 30);
    assert_eq!(page["next"], 2);
    assert_eq!(page["previous"], serde_json::Value::Null);
    assert_eq!(page["results"][0]["descripcion"], "entrada 119");

    let page = get_json(
        &app,
        &format!("/bitacoras?usuario={target_id}&page=4"),
        &token,
    )
    .await?;
    assert_eq!(page["results"].as_array().context("results")?.len(), 30);
    assert_eq!(page["next"], serde_json::Value::Null);
    assert_eq!(page["previous"], 3);
    assert_eq!(page["results"][29]["descripcion"], "entrada 0");

    // oversized page_size is clamped to the configured maximum
    let page = get_json(
        &app,
        &format!("/bitacoras?usuario={target_id}&page_size=500"),
        &token,
    )
    .await?;
    assert_eq!(page["page_size"], 100);
    assert_eq!(page["results"].as_array().context("results")?.len(), 100);
    assert_eq!(page["next"], 2);

    // and a nonsense page_size is raised to the minimum
    let page = get_json(
        &app,
        &format!("/bitacoras?usuario={target_id}&page_size=0"),
        &token,
    )
    .await?;
    assert_eq!(page["page_size"], 1);
    assert_eq!(page["results"].as_array().context("results")?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn absurd_page_numbers_yield_an_empty_page() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let (token, viewer_id) = register_login(&app, "root").await?;
    sqlx::query("INSERT INTO superadmin (usuario_id) VALUES (?)")
        .bind(&viewer_id)
        .execute(&pool)
        .await?;

    // i64::MAX as the page number must not blow up the offset arithmetic
    let page = get_json(
        &app,
        &format!("/bitacoras?page={}", i64::MAX),
        &token,
    )
    .await?;
    assert_eq!(page["count"], 1);
    assert_eq!(page["results"].as_array().context("results")?.len(), 0);
    assert_eq!(page["next"], serde_json::Value::Null);

    // same for an oversized page_size combined with a huge page
    let page = get_json(
        &app,
        &format!("/bitacoras?page={}&page_size={}", i64::MAX, i64::MAX),
        &token,
    )
    .await?;
    assert_eq!(page["page_size"], 100);
    assert_eq!(page["results"].as_array().context("results")?.len(), 0);

    Ok(())
}

#[tokio::test]
async fn mutations_are_audited_with_the_actor() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let (token, super_id) = register_login(&app, "root").await?;
    sqlx::query("INSERT INTO superadmin (usuario_id) VALUES (?)")
        .bind(&super_id)
        .execute(&pool)
        .await?;

    let req = Request::builder()
        .method("POST")
        .uri("/rbac/roles")
        .header("authorization", format!("Token {token}"))
        .header("content-type", "application/json")
        .header("x-forwarded-for", "203.0.113.7")
        .body(Body::from(json!({ "nombre": "Bibliotecario" }).to_string()))?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let row = sqlx::query(
        "SELECT usuario_id, ip, accion, tabla_afectada FROM bitacora WHERE tabla_afectada = 'rol'",
    )
    .fetch_one(&pool)
    .await?;
    assert_eq!(row.get::<&str, _>("usuario_id"), super_id);
    assert_eq!(row.get::<&str, _>("ip"), "203.0.113.7");
    assert_eq!(row.get::<&str, _>("accion"), "crear");

    Ok(())
}
