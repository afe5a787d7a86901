use crate::db::tokens::{self, Entity as Tokens, Model as TokenModel};
use crate::error::AppError;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

pub async fn create_user_token<C: ConnectionTrait>(
    db: &C,
    token_hash: &str,
    user_id: Uuid,
    expires_at: chrono::DateTime<Utc>,
) -> Result<TokenModel, AppError> {
    let new_token = tokens::ActiveModel {
        token_hash: Set(token_hash.to_string()),
        user_id: Set(user_id),
        created_at: Set(Utc::now()),
        expires_at: Set(expires_at),
        last_used_at: Set(None),
        ..Default::default()
    };

    Ok(new_token.insert(db).await?)
}

/// 返回有效 token 的所属用户，已吊销或过期时返回 `None`
pub async fn find_live_token<C: ConnectionTrait>(
    db: &C,
    token_hash: &str,
) -> Result<Option<TokenModel>, AppError> {
    let token = Tokens::find()
        .filter(tokens::Column::TokenHash.eq(token_hash))
        .filter(tokens::Column::ExpiresAt.gt(Utc::now()))
        .one(db)
        .await?;

    Ok(token)
}

pub async fn update_token_last_used<C: ConnectionTrait>(
    db: &C,
    token: TokenModel,
) -> Result<(), AppError> {
    let mut active_model: tokens::ActiveModel = token.into();
    active_model.last_used_at = Set(Some(Utc::now()));
    active_model.update(db).await?;
    Ok(())
}

pub async fn delete_token_by_hash<C: ConnectionTrait>(
    db: &C,
    token_hash: &str,
) -> Result<u64, AppError> {
    let result = Tokens::delete_many()
        .filter(tokens::Column::TokenHash.eq(token_hash))
        .exec(db)
        .await?;

    Ok(result.rows_affected)
}

pub async fn delete_user_tokens<C: ConnectionTrait>(
    db: &C,
    user_id: Uuid,
) -> Result<u64, AppError> {
    let result = Tokens::delete_many()
        .filter(tokens::Column::UserId.eq(user_id))
        .exec(db)
        .await?;

    Ok(result.rows_affected)
}

pub async fn cleanup_expired_tokens<C: ConnectionTrait>(db: &C) -> Result<u64, AppError> {
    let result = Tokens::delete_many()
        .filter(tokens::Column::ExpiresAt.lt(Utc::now()))
        .exec(db)
        .await?;

    Ok(result.rows_affected)
}
