use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Database model for a known user. Identity and credentials live with the
/// external auth collaborator; this row only carries the role used for
/// volunteer registration bookkeeping.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: String,
    pub display_name: Option<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
