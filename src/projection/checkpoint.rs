use sqlx::{PgConnection, PgPool};

use crate::error::Error;
use crate::types::Position;

/// Per-`(projection, instance)` high-water-mark.
pub(crate) async fn load(pool: &PgPool, projection_name: &str, instance_id: &str) -> Result<Position, Error> {
    let row: Option<i64> = sqlx::query_scalar(
        "SELECT last_position FROM projection_state WHERE projection_name = $1 AND instance_id = $2",
    )
    .bind(projection_name)
    .bind(instance_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.unwrap_or(crate::types::ZERO_POSITION))
}

/// Advances the checkpoint within the caller's transaction. Must only be called after every
/// event in the batch has been applied successfully.
pub(crate) async fn advance(
    connection: &mut PgConnection,
    projection_name: &str,
    instance_id: &str,
    position: Position,
) -> Result<(), Error> {
    sqlx::query(
        "INSERT INTO projection_state (projection_name, instance_id, last_position, last_tick_at)
         VALUES ($1, $2, $3, now())
         ON CONFLICT (projection_name, instance_id)
         DO UPDATE SET last_position = EXCLUDED.last_position, last_tick_at = now()",
    )
    .bind(projection_name)
    .bind(instance_id)
    .bind(position)
    .execute(connection)
    .await?;

    Ok(())
}

/// Deletes every row this projection owns for `instance_id`. Called on `instance.removed`.
pub(crate) async fn delete_instance(
    pool: &PgPool,
    projection_name: &str,
    instance_id: &str,
) -> Result<(), Error> {
    sqlx::query("DELETE FROM projection_state WHERE projection_name = $1 AND instance_id = $2")
        .bind(projection_name)
        .bind(instance_id)
        .execute(pool)
        .await?;
    Ok(())
}
