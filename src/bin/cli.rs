//! Admin tool: migrations, superadmin bootstrap and grant seeding.

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

use aula_backend::utils::hash_password;

#[derive(Parser, Debug)]
#[command(author, version, about = "aula-backend admin tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply pending migrations
    MigrateRun,
    /// Create a superadmin account (and the SuperAdmin role if missing)
    CreateSuperadmin {
        ci: String,
        username: String,
        nombre: String,
        apellido: String,
        email: String,
        password: String,
    },
    /// Register a resource-kind name the engine can match grants against
    RegistrarModelo { nombre: String },
    /// Grant (accion on modelo) to a puesto; creates the puesto/modelo rows if missing
    GrantPuesto {
        puesto: String,
        modelo: String,
        accion: String,
    },
    /// Grant (accion on modelo) to a rol; creates the rol/modelo rows if missing
    GrantRol {
        rol: String,
        modelo: String,
        accion: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if dotenv().is_err() {
        let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();
    let pool = get_pool().await?;

    match cli.command {
        Commands::MigrateRun => {
            sqlx::migrate!().run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::CreateSuperadmin {
            ci,
            username,
            nombre,
            apellido,
            email,
            password,
        } => {
            let rol_id = get_or_create(&pool, "rol", "SuperAdmin").await?;
            let usuario_id = Uuid::new_v4().to_string();
            let password_hash =
                hash_password(&password).map_err(|err| anyhow::anyhow!(err.to_string()))?;

            sqlx::query(
                "INSERT INTO usuario (id, ci, username, nombre, apellido, email, sexo, \
                                      password_hash, estado, rol_id, date_joined) \
                 VALUES (?, ?, ?, ?, ?, ?, 'M', ?, 1, ?, ?)",
            )
            .bind(&usuario_id)
            .bind(&ci)
            .bind(&username)
            .bind(&nombre)
            .bind(&apellido)
            .bind(&email)
            .bind(&password_hash)
            .bind(&rol_id)
            .bind(Utc::now())
            .execute(&pool)
            .await
            .context("failed to insert usuario")?;

            sqlx::query("INSERT INTO superadmin (usuario_id) VALUES (?)")
                .bind(&usuario_id)
                .execute(&pool)
                .await?;

            println!("Superadmin {username} created ({usuario_id})");
        }
        Commands::RegistrarModelo { nombre } => {
            let id = get_or_create(&pool, "modelo_permitido", &nombre).await?;
            println!("Modelo {nombre} registered ({id})");
        }
        Commands::GrantPuesto {
            puesto,
            modelo,
            accion,
        } => {
            let puesto_id = get_or_create(&pool, "puesto", &puesto).await?;
            let modelo_id = get_or_create(&pool, "modelo_permitido", &modelo).await?;
            let accion_id = lookup(&pool, "accion", &accion)
                .await?
                .context("accion not found (expected one of ver/crear/editar/eliminar)")?;

            sqlx::query(
                "INSERT OR IGNORE INTO permiso_puesto (id, puesto_id, modelo_id, accion_id) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(puesto_id)
            .bind(modelo_id)
            .bind(accion_id)
            .execute(&pool)
            .await?;

            println!("Granted {accion} on {modelo} to puesto {puesto}");
        }
        Commands::GrantRol {
            rol,
            modelo,
            accion,
        } => {
            let rol_id = get_or_create(&pool, "rol", &rol).await?;
            let modelo_id = get_or_create(&pool, "modelo_permitido", &modelo).await?;
            let accion_id = lookup(&pool, "accion", &accion)
                .await?
                .context("accion not found (expected one of ver/crear/editar/eliminar)")?;

            sqlx::query(
                "INSERT OR IGNORE INTO permiso_rol (id, rol_id, modelo_id, accion_id) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(rol_id)
            .bind(modelo_id)
            .bind(accion_id)
            .execute(&pool)
            .await?;

            println!("Granted {accion} on {modelo} to rol {rol}");
        }
    }

    Ok(())
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    let pool = SqlitePoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .context("failed to connect to database")?;
    Ok(pool)
}

async fn lookup(pool: &SqlitePool, table: &str, nombre: &str) -> anyhow::Result<Option<String>> {
    let id: Option<String> = sqlx::query_scalar(&format!("SELECT id FROM {table} WHERE nombre = ?"))
        .bind(nombre)
        .fetch_optional(pool)
        .await?;
    Ok(id)
}

async fn get_or_create(pool: &SqlitePool, table: &str, nombre: &str) -> anyhow::Result<String> {
    if let Some(id) = lookup(pool, table, nombre).await? {
        return Ok(id);
    }

    let id = Uuid::new_v4().to_string();
    sqlx::query(&format!("INSERT INTO {table} (id, nombre) VALUES (?, ?)"))
        .bind(&id)
        .bind(nombre)
        .execute(pool)
        .await?;
    Ok(id)
}
