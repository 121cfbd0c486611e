use chrono::Utc;

/// Reserved prefix that no persisted id ever carries.
pub const TEMP_ID_PREFIX: &str = "temp-";

/// Synthesize a placeholder id for an unconfirmed create.
///
/// Format: `temp-<unix millis>-<uuid v4 simple>`.
pub fn temp_id() -> String {
    format!(
        "{TEMP_ID_PREFIX}{}-{}",
        Utc::now().timestamp_millis(),
        uuid::Uuid::new_v4().simple()
    )
}

/// Returns `true` if `id` was produced by [`temp_id`].
pub fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}
