use chrono::Utc;
use rollcall_core::{LoginRequest, LoginResponse, UserCreateRequest, UserRole, UserUpdateRequest};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{CurrentUser, generate_token_hash};
use crate::db::users::{self, Model as UserModel};
use crate::db::{Enrollments, Events, Users, enrollments, events, token_ops};
use crate::error::{AppError, AppResult};
use crate::services::is_unique_violation;
use crate::state::AppState;

const EMAIL_TAKEN: &str = "email is already registered";

pub async fn register(state: &AppState, request: UserCreateRequest) -> AppResult<UserModel> {
    let email = request.email.trim().to_string();
    if is_email_taken(&state.db, &email).await? {
        return Err(AppError::Conflict(EMAIL_TAKEN.to_string()));
    }

    let now = Utc::now();
    let user = users::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(request.name.trim().to_string()),
        email: Set(email),
        password_hash: Set(state.hasher.hash(&request.password)?),
        role: Set(request.role.into()),
        created_at: Set(now),
        updated_at: Set(now),
    };

    let user = user.insert(&state.db).await.map_err(|err| {
        if is_unique_violation(&err) {
            AppError::Conflict(EMAIL_TAKEN.to_string())
        } else {
            err.into()
        }
    })?;

    info!("Registered user {} as {:?}", user.id, user.role);
    Ok(user)
}

/// 校验凭据并记录新的会话 token
pub async fn login(state: &AppState, request: LoginRequest) -> AppResult<LoginResponse> {
    let user = Users::find()
        .filter(users::Column::Email.eq(request.email.trim()))
        .one(&state.db)
        .await?;

    let verified = match &user {
        Some(user) => state.hasher.verify(&request.password, &user.password_hash),
        None => state.hasher.verify_unknown(&request.password),
    };
    let user = match user {
        Some(user) if verified => user,
        _ => {
            warn!("Failed login attempt for {}", request.email);
            return Err(AppError::Unauthorized(
                "invalid email or password".to_string(),
            ));
        }
    };

    let issued = state
        .tokens
        .issue(user.id, &user.email, &user.name, user.role.into())?;
    token_ops::create_user_token(
        &state.db,
        &generate_token_hash(&issued.token),
        user.id,
        issued.expires_at,
    )
    .await?;

    info!("User {} logged in", user.id);
    Ok(LoginResponse {
        user: (&user).into(),
        token: issued.token,
        expires_at: issued.expires_at,
    })
}

/// 吊销 `token_hash` 对应的会话
pub async fn logout(db: &DatabaseConnection, token_hash: &str) -> AppResult<()> {
    token_ops::delete_token_by_hash(db, token_hash).await?;
    Ok(())
}

pub async fn get_user<C: ConnectionTrait>(db: &C, id: Uuid) -> AppResult<UserModel> {
    Users::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))
}

pub async fn find_by_email(db: &DatabaseConnection, email: &str) -> AppResult<UserModel> {
    Users::find()
        .filter(users::Column::Email.eq(email.trim()))
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user with email {email} not found")))
}

pub async fn list_users(
    db: &DatabaseConnection,
    role: Option<UserRole>,
) -> AppResult<Vec<UserModel>> {
    let mut select = Users::find().order_by_asc(users::Column::CreatedAt);
    if let Some(role) = role {
        select = select.filter(users::Column::Role.eq(users::UserRole::from(role)));
    }
    Ok(select.all(db).await?)
}

/// 按名称做不区分大小写的子串匹配
pub async fn search_by_name(db: &DatabaseConnection, name: &str) -> AppResult<Vec<UserModel>> {
    let users = Users::find()
        .filter(users::Column::Name.contains(name.trim()))
        .order_by_asc(users::Column::Name)
        .all(db)
        .await?;
    Ok(users)
}

pub async fn is_email_taken<C: ConnectionTrait>(db: &C, email: &str) -> AppResult<bool> {
    let count = Users::find()
        .filter(users::Column::Email.eq(email.trim()))
        .count(db)
        .await?;
    Ok(count > 0)
}

fn ensure_self(actor: &CurrentUser, id: Uuid) -> AppResult<()> {
    if actor.id == id {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "users can only manage their own account".to_string(),
        ))
    }
}

/// 更新资料，修改密码会吊销所有会话
pub async fn update_user(
    state: &AppState,
    actor: &CurrentUser,
    id: Uuid,
    patch: UserUpdateRequest,
) -> AppResult<UserModel> {
    ensure_self(actor, id)?;
    let user = get_user(&state.db, id).await?;

    let mut active: users::ActiveModel = user.clone().into();
    if let Some(name) = patch.name {
        active.name = Set(name.trim().to_string());
    }
    if let Some(email) = patch.email.map(|email| email.trim().to_string()) {
        if email != user.email {
            if is_email_taken(&state.db, &email).await? {
                return Err(AppError::Conflict(EMAIL_TAKEN.to_string()));
            }
            active.email = Set(email);
        }
    }
    if let Some(role) = patch.role {
        active.role = Set(role.into());
    }
    let password_changed = match patch.password {
        Some(password) if !password.is_empty() => {
            active.password_hash = Set(state.hasher.hash(&password)?);
            true
        }
        _ => false,
    };
    active.updated_at = Set(Utc::now());

    let txn = state.db.begin().await?;
    let updated = active.update(&txn).await.map_err(|err| {
        if is_unique_violation(&err) {
            AppError::Conflict(EMAIL_TAKEN.to_string())
        } else {
            err.into()
        }
    })?;
    if password_changed {
        let revoked = token_ops::delete_user_tokens(&txn, id).await?;
        info!("Password changed for user {}, revoked {} sessions", id, revoked);
    }
    txn.commit().await?;

    Ok(updated)
}

/// 删除不再拥有活动或报名记录的账户
pub async fn delete_user(state: &AppState, actor: &CurrentUser, id: Uuid) -> AppResult<()> {
    ensure_self(actor, id)?;
    get_user(&state.db, id).await?;

    let owned_events = Events::find()
        .filter(events::Column::OrganizerId.eq(id))
        .count(&state.db)
        .await?;
    let enrollments = Enrollments::find()
        .filter(enrollments::Column::UserId.eq(id))
        .count(&state.db)
        .await?;
    if owned_events > 0 || enrollments > 0 {
        return Err(AppError::Conflict(
            "user still owns events or enrollments".to_string(),
        ));
    }

    let txn = state.db.begin().await?;
    token_ops::delete_user_tokens(&txn, id).await?;
    Users::delete_by_id(id).exec(&txn).await?;
    txn.commit().await?;

    info!("Deleted user {}", id);
    Ok(())
}

pub async fn validate_password(
    state: &AppState,
    actor: &CurrentUser,
    id: Uuid,
    password: &str,
) -> AppResult<bool> {
    ensure_self(actor, id)?;
    let user = get_user(&state.db, id).await?;
    Ok(state.hasher.verify(password, &user.password_hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{event, memory_state, user};

    fn registration(email: &str) -> UserCreateRequest {
        UserCreateRequest {
            name: "Ana Lima".to_string(),
            email: email.to_string(),
            password: "secret1".to_string(),
            role: UserRole::Participant,
        }
    }

    #[tokio::test]
    async fn test_register_hashes_password_and_rejects_duplicates() {
        let state = memory_state().await;
        let created = register(&state, registration("ana@example.com"))
            .await
            .unwrap();
        assert_ne!(created.password_hash, "secret1");
        assert!(is_email_taken(&state.db, "ana@example.com").await.unwrap());

        let duplicate = register(&state, registration("ana@example.com")).await;
        assert!(matches!(duplicate, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_email_is_case_sensitive() {
        let state = memory_state().await;
        register(&state, registration("ana@example.com"))
            .await
            .unwrap();
        assert!(!is_email_taken(&state.db, "ANA@example.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_login_issues_recorded_token() {
        let state = memory_state().await;
        register(&state, registration("ana@example.com"))
            .await
            .unwrap();

        let response = login(
            &state,
            LoginRequest {
                email: "ana@example.com".to_string(),
                password: "secret1".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(response.user.email, "ana@example.com");

        let hash = generate_token_hash(&response.token);
        assert!(token_ops::find_live_token(&state.db, &hash)
            .await
            .unwrap()
            .is_some());

        logout(&state.db, &hash).await.unwrap();
        assert!(token_ops::find_live_token(&state.db, &hash)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_login_rejects_bad_credentials() {
        let state = memory_state().await;
        register(&state, registration("ana@example.com"))
            .await
            .unwrap();

        let wrong_password = login(
            &state,
            LoginRequest {
                email: "ana@example.com".to_string(),
                password: "nope".to_string(),
            },
        )
        .await;
        assert!(matches!(wrong_password, Err(AppError::Unauthorized(_))));

        let unknown = login(
            &state,
            LoginRequest {
                email: "ghost@example.com".to_string(),
                password: "secret1".to_string(),
            },
        )
        .await;
        assert!(matches!(unknown, Err(AppError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_update_keeps_password_when_empty() {
        let state = memory_state().await;
        let ana = user(&state, "Ana", UserRole::Participant).await;
        let before = get_user(&state.db, ana.id).await.unwrap();

        let updated = update_user(
            &state,
            &ana,
            ana.id,
            UserUpdateRequest {
                name: Some("Ana Maria".to_string()),
                password: Some(String::new()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.name, "Ana Maria");
        assert_eq!(updated.email, before.email);
        assert_eq!(updated.password_hash, before.password_hash);

        let updated = update_user(
            &state,
            &ana,
            ana.id,
            UserUpdateRequest {
                password: Some("another1".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_ne!(updated.password_hash, before.password_hash);
        assert!(validate_password(&state, &ana, ana.id, "another1")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_update_is_self_only_and_checks_email() {
        let state = memory_state().await;
        let ana = user(&state, "Ana", UserRole::Participant).await;
        let bob = user(&state, "Bob", UserRole::Participant).await;

        let foreign = update_user(&state, &bob, ana.id, UserUpdateRequest::default()).await;
        assert!(matches!(foreign, Err(AppError::Forbidden(_))));

        let taken = update_user(
            &state,
            &ana,
            ana.id,
            UserUpdateRequest {
                email: Some(bob.email.clone()),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(taken, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_delete_refuses_users_with_events() {
        let state = memory_state().await;
        let org = user(&state, "Olga", UserRole::Organizer).await;
        event(&state, &org, 5).await;

        let result = delete_user(&state, &org, org.id).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));

        let ana = user(&state, "Ana", UserRole::Participant).await;
        delete_user(&state, &ana, ana.id).await.unwrap();
        assert!(matches!(
            get_user(&state.db, ana.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_and_search() {
        let state = memory_state().await;
        user(&state, "Olga", UserRole::Organizer).await;
        user(&state, "Ana", UserRole::Participant).await;
        user(&state, "Anabel", UserRole::Participant).await;

        assert_eq!(list_users(&state.db, None).await.unwrap().len(), 3);
        assert_eq!(
            list_users(&state.db, Some(UserRole::Organizer))
                .await
                .unwrap()
                .len(),
            1
        );
        assert_eq!(search_by_name(&state.db, "ana").await.unwrap().len(), 2);
        assert_eq!(
            find_by_email(&state.db, "olga@example.com")
                .await
                .unwrap()
                .name,
            "Olga"
        );
    }
}
