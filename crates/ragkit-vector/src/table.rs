//! LanceDB connection helpers.

use lancedb::{connect, Connection};

use ragkit_core::error::{Error, Result};

pub async fn open_db(uri: &str) -> Result<Connection> {
    connect(uri)
        .execute()
        .await
        .map_err(|e| Error::IndexUnavailable(format!("cannot open lance database {uri}: {e}")))
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let names = conn
        .table_names()
        .execute()
        .await
        .map_err(|e| Error::IndexUnavailable(e.to_string()))?;
    Ok(names.iter().any(|n| n == name))
}
