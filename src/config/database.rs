//! Database configuration module.
//!
//! Handles connecting to the database and creating the `users` and `payments` tables from the
//! entity definitions with `Schema::create_table_from_entity`, so the schema always matches the
//! Rust structs without hand-written SQL.

use crate::entities::{Payment, User};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema};
use std::path::{Path, PathBuf};
use tracing::info;

/// Connects to the database at `database_url` and makes sure all tables exist.
///
/// For file-backed `SQLite` URLs the parent directory is created first.
pub async fn create_connection(database_url: &str) -> Result<DatabaseConnection> {
    if let Some(dir) = sqlite_parent_dir(database_url) {
        tokio::fs::create_dir_all(&dir).await?;
    }
    let db = Database::connect(database_url).await?;
    create_tables(&db).await?;
    info!("Database ready at {}", database_url);
    Ok(db)
}

/// Creates all tables that do not exist yet. Users first, payments reference them.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut user_table = schema.create_table_from_entity(User);
    let mut payment_table = schema.create_table_from_entity(Payment);

    db.execute(builder.build(user_table.if_not_exists())).await?;
    db.execute(builder.build(payment_table.if_not_exists())).await?;

    Ok(())
}

/// Directory holding a file-backed `SQLite` database, if there is one to create.
fn sqlite_parent_dir(database_url: &str) -> Option<PathBuf> {
    let path = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path.starts_with(":memory:") {
        return None;
    }
    Path::new(path)
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
}
