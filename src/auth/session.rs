use rand::Rng;
use rusqlite::{params, OptionalExtension};

use crate::feed::domain::UserId;
use crate::feed::repository::RepositoryError;
use crate::state::DbPool;

/// Create a new session for a user. Returns the bearer token.
pub fn create_session(
    pool: &DbPool,
    user_id: &UserId,
    hours: u64,
) -> Result<String, RepositoryError> {
    let conn = pool.get()?;

    let token = generate_token();
    let id = uuid::Uuid::now_v7().to_string();

    conn.execute(
        "INSERT INTO sessions (id, user_id, token, expires_at) VALUES (?1, ?2, ?3, datetime('now', ?4))",
        params![id, user_id.as_str(), token, format!("+{} hours", hours)],
    )?;

    Ok(token)
}

/// Resolve an unexpired token to its user.
pub fn resolve_token(pool: &DbPool, token: &str) -> Result<Option<UserId>, RepositoryError> {
    let conn = pool.get()?;
    let user_id = conn
        .query_row(
            "SELECT user_id FROM sessions WHERE token = ?1 AND expires_at > datetime('now')",
            params![token],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(user_id.map(UserId::new))
}

/// Delete a session by token.
pub fn delete_session(pool: &DbPool, token: &str) -> Result<(), RepositoryError> {
    let conn = pool.get()?;
    conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(())
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}
