use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::error::IdentityError;
use crate::auth::providers::Provider;
use crate::auth::repo_types::{NewFederatedUser, NewLocalUser, User, DEFAULT_AVATAR};

const USER_COLUMNS: &str = "id, name, email, password_hash, avatar_url, google_id, twitter_id, \
     github_id, role, status, email_verified, verification_code, verification_code_expires, \
     created_at, updated_at";

fn provider_column(provider: Provider) -> &'static str {
    match provider {
        Provider::Google => "google_id",
        Provider::Twitter => "twitter_id",
        Provider::Github => "github_id",
    }
}

/// Credential store contract. Uniqueness of email and (provider, external id)
/// is enforced here, not by callers; concurrent duplicate creations lose with
/// `EmailTaken` / `ProviderIdTaken`.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, IdentityError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, IdentityError>;
    async fn find_by_provider_id(
        &self,
        provider: Provider,
        external_id: &str,
    ) -> Result<Option<User>, IdentityError>;
    async fn create_local(&self, new: NewLocalUser) -> Result<User, IdentityError>;
    async fn create_federated(&self, new: NewFederatedUser) -> Result<User, IdentityError>;
    async fn save(&self, user: &User) -> Result<(), IdentityError>;
}

pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, IdentityError> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND email <> ''"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(IdentityError::from_sqlx)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, IdentityError> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(IdentityError::from_sqlx)
    }

    async fn find_by_provider_id(
        &self,
        provider: Provider,
        external_id: &str,
    ) -> Result<Option<User>, IdentityError> {
        let column = provider_column(provider);
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {column} = $1"
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(IdentityError::from_sqlx)
    }

    async fn create_local(&self, new: NewLocalUser) -> Result<User, IdentityError> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (name, email, password_hash, email_verified,
                               verification_code, verification_code_expires)
            VALUES ($1, $2, $3, FALSE, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new.name)
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(&new.verification_code)
        .bind(new.verification_code_expires)
        .fetch_one(&self.pool)
        .await
        .map_err(IdentityError::from_sqlx)
    }

    async fn create_federated(&self, new: NewFederatedUser) -> Result<User, IdentityError> {
        let column = provider_column(new.provider);
        let avatar_url = new.avatar_url.unwrap_or_else(|| DEFAULT_AVATAR.to_string());
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (name, email, avatar_url, {column}, email_verified)
            VALUES ($1, $2, $3, $4, TRUE)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new.name)
        .bind(&new.email)
        .bind(&avatar_url)
        .bind(&new.external_id)
        .fetch_one(&self.pool)
        .await
        .map_err(IdentityError::from_sqlx)
    }

    async fn save(&self, user: &User) -> Result<(), IdentityError> {
        sqlx::query(
            r#"
            UPDATE users
            SET name = $2, email = $3, password_hash = $4, avatar_url = $5,
                google_id = $6, twitter_id = $7, github_id = $8,
                role = $9, status = $10, email_verified = $11,
                verification_code = $12, verification_code_expires = $13,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.avatar_url)
        .bind(&user.google_id)
        .bind(&user.twitter_id)
        .bind(&user.github_id)
        .bind(user.role)
        .bind(user.status)
        .bind(user.email_verified)
        .bind(&user.verification_code)
        .bind(user.verification_code_expires)
        .execute(&self.pool)
        .await
        .map_err(IdentityError::from_sqlx)?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use crate::auth::repo_types::{AccountStatus, Role};
    use std::sync::Mutex;
    use time::OffsetDateTime;

    /// In-memory store with the same uniqueness behavior as the database.
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        users: Mutex<Vec<User>>,
    }

    impl MemoryStore {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn get(&self, id: Uuid) -> Option<User> {
            self.users.lock().unwrap().iter().find(|u| u.id == id).cloned()
        }

        /// Test hook for shaping stored state (backdating expiries, clearing
        /// verification flags on legacy records).
        pub(crate) fn update<F: FnOnce(&mut User)>(&self, id: Uuid, mutate: F) {
            let mut users = self.users.lock().unwrap();
            let user = users.iter_mut().find(|u| u.id == id).expect("user exists");
            mutate(user);
        }
    }

    fn blank_user(name: String, email: String) -> User {
        let now = OffsetDateTime::now_utc();
        User {
            id: Uuid::new_v4(),
            name,
            email,
            password_hash: None,
            avatar_url: DEFAULT_AVATAR.to_string(),
            google_id: None,
            twitter_id: None,
            github_id: None,
            role: Role::User,
            status: AccountStatus::Active,
            email_verified: false,
            verification_code: None,
            verification_code_expires: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[async_trait]
    impl UserStore for MemoryStore {
        async fn find_by_email(&self, email: &str) -> Result<Option<User>, IdentityError> {
            if email.is_empty() {
                return Ok(None);
            }
            let users = self.users.lock().unwrap();
            Ok(users.iter().find(|u| u.email == email).cloned())
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, IdentityError> {
            Ok(self.get(id))
        }

        async fn find_by_provider_id(
            &self,
            provider: Provider,
            external_id: &str,
        ) -> Result<Option<User>, IdentityError> {
            let users = self.users.lock().unwrap();
            Ok(users
                .iter()
                .find(|u| u.provider_id(provider) == Some(external_id))
                .cloned())
        }

        async fn create_local(&self, new: NewLocalUser) -> Result<User, IdentityError> {
            let mut users = self.users.lock().unwrap();
            if !new.email.is_empty() && users.iter().any(|u| u.email == new.email) {
                return Err(IdentityError::EmailTaken);
            }
            let mut user = blank_user(new.name, new.email);
            user.password_hash = Some(new.password_hash);
            user.verification_code = Some(new.verification_code);
            user.verification_code_expires = Some(new.verification_code_expires);
            users.push(user.clone());
            Ok(user)
        }

        async fn create_federated(&self, new: NewFederatedUser) -> Result<User, IdentityError> {
            let mut users = self.users.lock().unwrap();
            if users
                .iter()
                .any(|u| u.provider_id(new.provider) == Some(new.external_id.as_str()))
            {
                return Err(IdentityError::ProviderIdTaken);
            }
            if !new.email.is_empty() && users.iter().any(|u| u.email == new.email) {
                return Err(IdentityError::EmailTaken);
            }
            let mut user = blank_user(new.name, new.email);
            if let Some(avatar_url) = new.avatar_url {
                user.avatar_url = avatar_url;
            }
            match new.provider {
                Provider::Google => user.google_id = Some(new.external_id),
                Provider::Twitter => user.twitter_id = Some(new.external_id),
                Provider::Github => user.github_id = Some(new.external_id),
            }
            user.email_verified = true;
            users.push(user.clone());
            Ok(user)
        }

        async fn save(&self, user: &User) -> Result<(), IdentityError> {
            let mut users = self.users.lock().unwrap();
            if let Some(stored) = users.iter_mut().find(|u| u.id == user.id) {
                *stored = user.clone();
                stored.updated_at = OffsetDateTime::now_utc();
            }
            Ok(())
        }
    }
}
