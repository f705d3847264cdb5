use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

use munidesk::authz::PermissionCatalog;
use munidesk::utils::{hash_password, utc_now};

#[derive(Parser, Debug)]
#[command(author, version, about = "munidesk admin tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scaffold an empty migration file under ./migrations
    MakeMigration { name: String },
    /// Apply every pending migration
    MigrateRun,
    /// List migrations with their applied/pending state
    MigrateStatus,
    /// Undo the most recently applied migration
    MigrateRollback,
    /// Create a user account with an explicit role (e.g. the first administrator)
    CreateUser {
        name: String,
        email: String,
        password: String,
        #[arg(long, default_value = "staff_user")]
        role: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // The tool may run from the repo root or from inside a container; the
    // crate-local `.env` covers the second case.
    if dotenv().is_err() {
        let crate_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    match Cli::parse().command {
        Commands::MakeMigration { name } => {
            let path = make_migration_file(&name)?;
            println!("created {}", path.display());
        }
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            get_migrator().await?.run(&pool).await?;
            println!("migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            print_status(&pool, &migrator).await?;
        }
        Commands::MigrateRollback => {
            let pool = get_pool().await?;
            get_migrator()
                .await?
                .undo(&pool, 1)
                .await
                .context("no migrations were rolled back")?;
            println!("rolled back one migration");
        }
        Commands::CreateUser {
            name,
            email,
            password,
            role,
        } => {
            let pool = get_pool().await?;
            create_user(&pool, &name, &email, &password, &role).await?;
        }
    }

    Ok(())
}

fn make_migration_file(name: &str) -> anyhow::Result<PathBuf> {
    // sqlx reads the version as the digits before the first underscore, so
    // the timestamp has to stay one solid token.
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let path = Path::new("migrations").join(format!("{}_{}.sql", timestamp, sanitize_name(name)));

    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }

    fs::write(&path, "-- Write your migration SQL here\n")
        .with_context(|| format!("could not write {}", path.display()))?;

    Ok(path)
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .with_context(|| format!("could not open {}", database_url))
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    // If the migrations table doesn't exist, nothing is applied yet
    let table: Option<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_optional(pool)
    .await?;

    let applied: HashSet<i64> = if table.is_some() {
        sqlx::query_scalar::<_, i64>("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?
            .into_iter()
            .collect()
    } else {
        HashSet::new()
    };

    println!("{:<8} {:<20} {}", "Status", "Version", "Name");
    for migration in migrator.iter() {
        let status = if applied.contains(&migration.version) {
            "applied"
        } else {
            "pending"
        };
        let description = migration.description.as_ref().trim();
        let name = if description.is_empty() {
            "unknown"
        } else {
            description
        };
        println!("{:<8} {:<20} {}", status, migration.version, name);
    }

    Ok(())
}

async fn create_user(
    pool: &SqlitePool,
    name: &str,
    email: &str,
    password: &str,
    role: &str,
) -> anyhow::Result<()> {
    let catalog = PermissionCatalog::load()?;
    let canonical = catalog.canonical_role(role);
    if !catalog.is_known(&canonical) {
        let known: Vec<&str> = catalog.roles().collect();
        anyhow::bail!("unknown role '{}'; known roles: {}", role, known.join(", "));
    }

    let existing: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE email = ?")
        .bind(email)
        .fetch_one(pool)
        .await?;
    if existing > 0 {
        anyhow::bail!("email already in use: {}", email);
    }

    let password_hash = hash_password(password)?;
    let now = utc_now();

    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, role, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(name)
    .bind(email)
    .bind(password_hash)
    .bind(&canonical)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    println!("Created {} account for {}", canonical, email);
    Ok(())
}

fn sanitize_name(name: &str) -> String {
    name.to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

async fn get_migrator() -> anyhow::Result<sqlx::migrate::Migrator> {
    // Prefer ./migrations when running from the repo root and fall back to the
    // crate-local folder when the CWD differs (containers, IDE runners).
    let local = Path::new("./migrations");
    let migrator_path = if local.exists() {
        local.to_path_buf()
    } else {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    };

    let shown = migrator_path.display().to_string();
    sqlx::migrate::Migrator::new(migrator_path)
        .await
        .with_context(|| format!("failed to load migrations from {}", shown))
}
