use crate::auth::{PasswordHasher, TokenKeys};
use crate::bootstrap::config::AuthConfig;
use sea_orm::DatabaseConnection;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub tokens: TokenKeys,
    pub hasher: PasswordHasher,
}

impl AppState {
    pub fn new(db: DatabaseConnection, auth: &AuthConfig) -> Self {
        Self {
            db,
            tokens: TokenKeys::new(auth),
            hasher: PasswordHasher::new(auth.bcrypt_cost),
        }
    }
}
