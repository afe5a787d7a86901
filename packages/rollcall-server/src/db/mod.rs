pub mod enrollments;
pub mod events;
pub mod initialize;
mod migration;
pub mod token_ops;
pub mod tokens;
pub mod users;

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use tracing::info;

pub use enrollments::Entity as Enrollments;
pub use events::Entity as Events;
pub use tokens::Entity as Tokens;
pub use users::Entity as Users;

/// 建立连接池并执行迁移
///
/// 内存 SQLite 每个连接各自独立，因此连接池固定为单连接
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(database_url.to_owned());
    options.sqlx_logging(false);
    if database_url.contains(":memory:") {
        options.max_connections(1).min_connections(1);
    }

    let db = Database::connect(options).await?;
    initialize::initial(&db).await?;
    info!("Database ready at {}", database_url);
    Ok(db)
}
