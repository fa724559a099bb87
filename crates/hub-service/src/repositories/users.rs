//! Postgres user repository.

use crate::errors::HubError;
use crate::models::{NewUser, OneTimeToken, ProfileUpdate, User};
use crate::observability::metrics;
use crate::repositories::UserRepository;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

const USER_COLUMNS: &str = r#"
    user_id, username, email, password_hash, refresh_token_hash,
    reset_password_token_hash, reset_password_expires_at,
    email_verification_token_hash, email_verification_expires_at,
    is_email_verified, personal_room_id, firstname, lastname, bio, dob,
    avatar_url, avatar_id, created_at, updated_at
"#;

/// Row shape of the `users` table.
#[derive(Debug, sqlx::FromRow)]
struct UserRecord {
    user_id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    refresh_token_hash: Option<String>,
    reset_password_token_hash: Option<String>,
    reset_password_expires_at: Option<DateTime<Utc>>,
    email_verification_token_hash: Option<String>,
    email_verification_expires_at: Option<DateTime<Utc>>,
    is_email_verified: bool,
    personal_room_id: Option<String>,
    firstname: Option<String>,
    lastname: Option<String>,
    bio: Option<String>,
    dob: Option<NaiveDate>,
    avatar_url: Option<String>,
    avatar_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn one_time_token(
    token_hash: Option<String>,
    expires_at: Option<DateTime<Utc>>,
) -> Option<OneTimeToken> {
    match (token_hash, expires_at) {
        (Some(token_hash), Some(expires_at)) => Some(OneTimeToken {
            token_hash,
            expires_at,
        }),
        _ => None,
    }
}

impl From<UserRecord> for User {
    fn from(r: UserRecord) -> Self {
        User {
            user_id: r.user_id,
            username: r.username,
            email: r.email,
            password_hash: r.password_hash,
            refresh_token_hash: r.refresh_token_hash,
            password_reset: one_time_token(r.reset_password_token_hash, r.reset_password_expires_at),
            email_verification: one_time_token(
                r.email_verification_token_hash,
                r.email_verification_expires_at,
            ),
            is_email_verified: r.is_email_verified,
            personal_room_id: r.personal_room_id,
            firstname: r.firstname,
            lastname: r.lastname,
            bio: r.bio,
            dob: r.dob,
            avatar_url: r.avatar_url,
            avatar_id: r.avatar_id,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Record query timing and translate the driver error.
fn observe<T>(
    operation: &'static str,
    start: Instant,
    result: Result<T, sqlx::Error>,
) -> Result<T, HubError> {
    let duration = start.elapsed();
    match result {
        Ok(value) => {
            metrics::record_db_query(operation, "success", duration);
            Ok(value)
        }
        Err(e) => {
            metrics::record_db_query(operation, "error", duration);
            Err(HubError::Database(format!("{} failed: {}", operation, e)))
        }
    }
}

fn not_found(user: Option<UserRecord>) -> Result<User, HubError> {
    user.map(User::from)
        .ok_or_else(|| HubError::NotFound("User not found".to_string()))
}

/// `UserRepository` backed by Postgres.
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_by(
        &self,
        operation: &'static str,
        column: &str,
        value: &str,
    ) -> Result<Option<User>, HubError> {
        let start = Instant::now();
        let sql = format!("SELECT {} FROM users WHERE {} = $1", USER_COLUMNS, column);
        let result = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await;
        Ok(observe(operation, start, result)?.map(User::from))
    }
}

#[async_trait::async_trait]
impl UserRepository for PgUserRepository {
    #[instrument(skip_all, name = "hub.repo.insert_user")]
    async fn insert(&self, new_user: NewUser) -> Result<User, HubError> {
        let start = Instant::now();
        let sql = format!(
            r#"
            INSERT INTO users (username, email, password_hash, firstname, lastname, avatar_url)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        let result = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(&new_user.username)
            .bind(&new_user.email)
            .bind(&new_user.password_hash)
            .bind(&new_user.firstname)
            .bind(&new_user.lastname)
            .bind(&new_user.avatar_url)
            .fetch_one(&self.pool)
            .await;

        if let Err(sqlx::Error::Database(db_err)) = &result {
            if db_err.is_unique_violation() {
                metrics::record_db_query("insert_user", "conflict", start.elapsed());
                let message = match db_err.constraint() {
                    Some("users_username_unique") => "Username is already taken",
                    _ => "Email is already registered",
                };
                return Err(HubError::Conflict(message.to_string()));
            }
        }

        observe("insert_user", start, result).map(User::from)
    }

    #[instrument(skip_all, name = "hub.repo.find_user_by_id")]
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, HubError> {
        let start = Instant::now();
        let sql = format!("SELECT {} FROM users WHERE user_id = $1", USER_COLUMNS);
        let result = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await;
        Ok(observe("find_user_by_id", start, result)?.map(User::from))
    }

    #[instrument(skip_all, name = "hub.repo.find_user_by_email")]
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, HubError> {
        self.fetch_one_by("find_user_by_email", "email", email).await
    }

    #[instrument(skip_all, name = "hub.repo.find_user_by_username")]
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, HubError> {
        self.fetch_one_by("find_user_by_username", "username", username)
            .await
    }

    #[instrument(skip_all, name = "hub.repo.find_users")]
    async fn find_many(&self, user_ids: &[Uuid]) -> Result<Vec<User>, HubError> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let sql = format!(
            "SELECT {} FROM users WHERE user_id = ANY($1)",
            USER_COLUMNS
        );
        let result = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(user_ids)
            .fetch_all(&self.pool)
            .await;
        Ok(observe("find_users", start, result)?
            .into_iter()
            .map(User::from)
            .collect())
    }

    #[instrument(skip_all, name = "hub.repo.set_refresh_token")]
    async fn set_refresh_token(
        &self,
        user_id: Uuid,
        token_hash: Option<&str>,
    ) -> Result<(), HubError> {
        let start = Instant::now();
        let result = sqlx::query(
            r#"
            UPDATE users
            SET refresh_token_hash = $2, updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(token_hash)
        .execute(&self.pool)
        .await;
        observe("set_refresh_token", start, result)?;
        Ok(())
    }

    #[instrument(skip_all, name = "hub.repo.swap_refresh_token")]
    async fn swap_refresh_token(
        &self,
        user_id: Uuid,
        expected_hash: &str,
        new_hash: &str,
    ) -> Result<bool, HubError> {
        let start = Instant::now();
        let result = sqlx::query(
            r#"
            UPDATE users
            SET refresh_token_hash = $3, updated_at = NOW()
            WHERE user_id = $1 AND refresh_token_hash = $2
            "#,
        )
        .bind(user_id)
        .bind(expected_hash)
        .bind(new_hash)
        .execute(&self.pool)
        .await;
        let done = observe("swap_refresh_token", start, result)?;
        Ok(done.rows_affected() == 1)
    }

    #[instrument(skip_all, name = "hub.repo.set_password_hash")]
    async fn set_password_hash(&self, user_id: Uuid, password_hash: &str) -> Result<(), HubError> {
        let start = Instant::now();
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2, updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(password_hash)
        .execute(&self.pool)
        .await;
        observe("set_password_hash", start, result)?;
        Ok(())
    }

    #[instrument(skip_all, name = "hub.repo.set_password_reset")]
    async fn set_password_reset(
        &self,
        user_id: Uuid,
        reset: Option<OneTimeToken>,
    ) -> Result<(), HubError> {
        let start = Instant::now();
        let (hash, expires_at) = match reset {
            Some(t) => (Some(t.token_hash), Some(t.expires_at)),
            None => (None, None),
        };
        let result = sqlx::query(
            r#"
            UPDATE users
            SET reset_password_token_hash = $2,
                reset_password_expires_at = $3,
                updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await;
        observe("set_password_reset", start, result)?;
        Ok(())
    }

    #[instrument(skip_all, name = "hub.repo.consume_password_reset")]
    async fn consume_password_reset(
        &self,
        token_hash: &str,
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, HubError> {
        let start = Instant::now();
        let result: Result<Option<(Uuid,)>, _> = sqlx::query_as(
            r#"
            UPDATE users
            SET password_hash = $2,
                reset_password_token_hash = NULL,
                reset_password_expires_at = NULL,
                updated_at = NOW()
            WHERE reset_password_token_hash = $1
              AND reset_password_expires_at > $3
            RETURNING user_id
            "#,
        )
        .bind(token_hash)
        .bind(new_password_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await;
        Ok(observe("consume_password_reset", start, result)?.map(|(id,)| id))
    }

    #[instrument(skip_all, name = "hub.repo.set_email_verification")]
    async fn set_email_verification(
        &self,
        user_id: Uuid,
        verification: Option<OneTimeToken>,
    ) -> Result<(), HubError> {
        let start = Instant::now();
        let (hash, expires_at) = match verification {
            Some(t) => (Some(t.token_hash), Some(t.expires_at)),
            None => (None, None),
        };
        let result = sqlx::query(
            r#"
            UPDATE users
            SET email_verification_token_hash = $2,
                email_verification_expires_at = $3,
                updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await;
        observe("set_email_verification", start, result)?;
        Ok(())
    }

    #[instrument(skip_all, name = "hub.repo.find_by_verification_token")]
    async fn find_by_verification_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, HubError> {
        let start = Instant::now();
        let sql = format!(
            r#"
            SELECT {} FROM users
            WHERE email_verification_token_hash = $1
              AND email_verification_expires_at > $2
            "#,
            USER_COLUMNS
        );
        let result = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(token_hash)
            .bind(now)
            .fetch_optional(&self.pool)
            .await;
        Ok(observe("find_by_verification_token", start, result)?.map(User::from))
    }

    #[instrument(skip_all, name = "hub.repo.mark_email_verified")]
    async fn mark_email_verified(&self, user_id: Uuid) -> Result<(), HubError> {
        let start = Instant::now();
        let result = sqlx::query(
            r#"
            UPDATE users
            SET is_email_verified = TRUE,
                email_verification_token_hash = NULL,
                email_verification_expires_at = NULL,
                updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await;
        observe("mark_email_verified", start, result)?;
        Ok(())
    }

    #[instrument(skip_all, name = "hub.repo.set_personal_room")]
    async fn set_personal_room(&self, user_id: Uuid, meeting_id: &str) -> Result<User, HubError> {
        let start = Instant::now();
        let sql = format!(
            r#"
            UPDATE users
            SET personal_room_id = $2, updated_at = NOW()
            WHERE user_id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let result = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(user_id)
            .bind(meeting_id)
            .fetch_optional(&self.pool)
            .await;
        not_found(observe("set_personal_room", start, result)?)
    }

    #[instrument(skip_all, name = "hub.repo.set_avatar")]
    async fn set_avatar(
        &self,
        user_id: Uuid,
        avatar_url: &str,
        avatar_id: &str,
    ) -> Result<User, HubError> {
        let start = Instant::now();
        let sql = format!(
            r#"
            UPDATE users
            SET avatar_url = $2, avatar_id = $3, updated_at = NOW()
            WHERE user_id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let result = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(user_id)
            .bind(avatar_url)
            .bind(avatar_id)
            .fetch_optional(&self.pool)
            .await;
        not_found(observe("set_avatar", start, result)?)
    }

    #[instrument(skip_all, name = "hub.repo.update_profile")]
    async fn update_profile(
        &self,
        user_id: Uuid,
        update: &ProfileUpdate,
    ) -> Result<User, HubError> {
        let start = Instant::now();
        let sql = format!(
            r#"
            UPDATE users
            SET firstname = COALESCE($2, firstname),
                lastname = COALESCE($3, lastname),
                bio = COALESCE($4, bio),
                dob = COALESCE($5, dob),
                updated_at = NOW()
            WHERE user_id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let result = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(user_id)
            .bind(&update.firstname)
            .bind(&update.lastname)
            .bind(&update.bio)
            .bind(update.dob)
            .fetch_optional(&self.pool)
            .await;
        not_found(observe("update_profile", start, result)?)
    }

    async fn ping(&self) -> Result<(), HubError> {
        let start = Instant::now();
        let result = sqlx::query("SELECT 1").execute(&self.pool).await;
        observe("ping", start, result)?;
        Ok(())
    }
}
