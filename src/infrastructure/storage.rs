use crate::infrastructure::error::InfraError;
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");
const BUSY_TIMEOUT: Duration = Duration::from_secs(2);

pub fn initialize_database(path: &Path) -> Result<(), InfraError> {
    let connection = open_database(path)?;
    connection.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

/// Two processes may share one slot file; the later writer waits instead of failing.
pub fn open_database(path: &Path) -> Result<Connection, InfraError> {
    let connection = Connection::open(path)?;
    connection.busy_timeout(BUSY_TIMEOUT)?;
    Ok(connection)
}
