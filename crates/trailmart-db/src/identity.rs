//! User projection and processed-event ledger.
//!
//! A registration and its ledger row commit in the same transaction; the
//! ledger insert runs first so a concurrent redelivery of the same uid
//! blocks on the primary key and then observes the conflict.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;

use trailmart_core::{
    Error, IdentityRepository, LoginOutcome, LoginRecord, Registration, RegistrationOutcome,
    Result, UserAccount,
};

/// PostgreSQL implementation of IdentityRepository.
pub struct PgIdentityRepository {
    pool: Pool<Postgres>,
}

impl PgIdentityRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityRepository for PgIdentityRepository {
    async fn apply_registration(
        &self,
        registration: &Registration,
    ) -> Result<RegistrationOutcome> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let recorded = sqlx::query(
            "INSERT INTO processed_event (uid, event_type, processed_at)
             VALUES ($1, $2, now())
             ON CONFLICT (uid) DO NOTHING",
        )
        .bind(&registration.uid)
        .bind(&registration.event_type)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        if recorded.rows_affected() == 0 {
            tx.rollback().await.map_err(Error::Database)?;
            return Ok(RegistrationOutcome::Duplicate);
        }

        let row = sqlx::query(
            r#"
            INSERT INTO user_account (keycloak_id, username, realm_id, created_client_id,
                                      created_from_ip, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (keycloak_id) DO UPDATE
            SET username = EXCLUDED.username,
                realm_id = COALESCE(EXCLUDED.realm_id, user_account.realm_id),
                updated_at = EXCLUDED.created_at
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(&registration.user_id)
        .bind(&registration.username)
        .bind(&registration.realm_id)
        .bind(&registration.client_id)
        .bind(&registration.ip_address)
        .bind(registration.occurred_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;
        let inserted: bool = row.get("inserted");

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "database",
            component = "identity",
            op = "apply_registration",
            user_id = %registration.user_id,
            event_uid = %registration.uid,
            inserted,
            "Registration applied"
        );

        Ok(if inserted {
            RegistrationOutcome::Created
        } else {
            RegistrationOutcome::Updated
        })
    }

    async fn record_login(&self, login: &LoginRecord) -> Result<LoginOutcome> {
        let result = sqlx::query(
            r#"
            UPDATE user_account
            SET last_login_at = $2,
                last_login_ip = $3,
                last_session_id = $4,
                updated_at = $2
            WHERE keycloak_id = $1
            "#,
        )
        .bind(&login.user_id)
        .bind(login.occurred_at)
        .bind(&login.ip_address)
        .bind(&login.session_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(if result.rows_affected() == 0 {
            LoginOutcome::UnknownUser
        } else {
            LoginOutcome::Updated
        })
    }

    async fn get_user(&self, keycloak_id: &str) -> Result<Option<UserAccount>> {
        let row = sqlx::query(
            r#"
            SELECT keycloak_id, username, realm_id, created_client_id, created_from_ip,
                   last_login_ip, last_session_id, created_at, last_login_at, updated_at
            FROM user_account
            WHERE keycloak_id = $1
            "#,
        )
        .bind(keycloak_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(|row| UserAccount {
            keycloak_id: row.get("keycloak_id"),
            username: row.get("username"),
            realm_id: row.get("realm_id"),
            created_client_id: row.get("created_client_id"),
            created_from_ip: row.get("created_from_ip"),
            last_login_ip: row.get("last_login_ip"),
            last_session_id: row.get("last_session_id"),
            created_at: row.get("created_at"),
            last_login_at: row.get("last_login_at"),
            updated_at: row.get("updated_at"),
        }))
    }

    async fn is_processed(&self, uid: &str) -> Result<bool> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM processed_event WHERE uid = $1) AS found")
            .bind(uid)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(row.get("found"))
    }
}
