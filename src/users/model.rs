use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: String,
    pub username: Option<String>,
    pub password_hash: Option<String>, // None for social-only accounts
    pub api_key: Option<String>,
    pub image: Option<String>,
    pub role: String,
    pub plan: Option<String>,
    pub plan_status: Option<String>,
    pub reset_token: Option<String>,
    pub reset_token_expires_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

/// Fields supplied when an account is created.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: String,
    pub username: Option<String>,
    pub password_hash: Option<String>,
    pub api_key: Option<String>,
    pub image: Option<String>,
}

/// Column whose unique constraint rejected a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Email,
    Username,
    ApiKey,
    Other,
}

impl UniqueField {
    pub fn from_constraint(name: Option<&str>) -> Self {
        match name {
            Some(n) if n.contains("api_key") => Self::ApiKey,
            Some(n) if n.contains("email") => Self::Email,
            Some(n) if n.contains("username") => Self::Username,
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for UniqueField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Email => "email",
            Self::Username => "username",
            Self::ApiKey => "api_key",
            Self::Other => "unknown",
        };
        f.write_str(s)
    }
}
