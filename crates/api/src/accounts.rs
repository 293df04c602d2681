use chrono::Utc;
use entity::app_user;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, QueryFilter,
};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{hash_password, verify_password, AuthError, UserRole};

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("invalid email address")]
    InvalidEmail,
    #[error("a user with email {0} already exists")]
    Duplicate(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Db(#[from] DbErr),
}

pub fn normalize_email(value: &str) -> Result<String, AccountError> {
    let trimmed = value.trim().to_lowercase();
    if trimmed.is_empty() || !trimmed.contains('@') {
        return Err(AccountError::InvalidEmail);
    }
    Ok(trimmed)
}

pub async fn find_by_email<C>(db: &C, email: &str) -> Result<Option<app_user::Model>, DbErr>
where
    C: ConnectionTrait,
{
    app_user::Entity::find()
        .filter(app_user::Column::Email.eq(email))
        .one(db)
        .await
}

pub async fn create_user<C>(
    db: &C,
    email: &str,
    password: &str,
    employee_document: Option<String>,
    role: UserRole,
) -> Result<app_user::Model, AccountError>
where
    C: ConnectionTrait,
{
    let email = normalize_email(email)?;
    if find_by_email(db, &email).await?.is_some() {
        warn!(%email, "user already exists");
        return Err(AccountError::Duplicate(email));
    }
    let user = app_user::ActiveModel {
        id: Set(Uuid::new_v4()),
        email: Set(email),
        password_hash: Set(hash_password(password)?),
        employee_document: Set(employee_document),
        role: Set(role.into()),
        created_at: Set(Utc::now().into()),
    }
    .insert(db)
    .await?;
    info!(user_id = %user.id, email = %user.email, role = role.as_str(), "user registered");
    Ok(user)
}

/// Employee self-service account; the document doubles as the first password.
pub async fn register<C>(
    db: &C,
    email: &str,
    document: &str,
) -> Result<app_user::Model, AccountError>
where
    C: ConnectionTrait,
{
    let document = document.trim();
    create_user(
        db,
        email,
        document,
        Some(document.to_string()),
        UserRole::Employee,
    )
    .await
}

/// `None` for an unknown email or a wrong password.
pub async fn authenticate(
    db: &DatabaseConnection,
    email: &str,
    password: &str,
) -> Result<Option<app_user::Model>, AccountError> {
    let Ok(email) = normalize_email(email) else {
        return Ok(None);
    };
    let Some(user) = find_by_email(db, &email).await? else {
        return Ok(None);
    };
    if verify_password(password, &user.password_hash) {
        Ok(Some(user))
    } else {
        Ok(None)
    }
}
