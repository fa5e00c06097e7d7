//! Identity projection tests against a live PostgreSQL with migrations applied.

use chrono::Utc;
use trailmart_db::{
    create_pool, IdentityRepository, LoginOutcome, LoginRecord, PgIdentityRepository,
    Registration, RegistrationOutcome, DEFAULT_TEST_DATABASE_URL,
};

async fn setup_repo() -> PgIdentityRepository {
    let _ = dotenvy::dotenv();
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_TEST_DATABASE_URL.to_string());
    let pool = create_pool(&database_url)
        .await
        .expect("Failed to create test pool");
    PgIdentityRepository::new(pool)
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_replayed_registration_applies_once() {
    let repo = setup_repo().await;
    let suffix = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let registration = Registration {
        uid: format!("evt-{suffix}"),
        event_type: "register".to_string(),
        user_id: format!("user-{suffix}"),
        username: "alice".to_string(),
        realm_id: Some("shop".to_string()),
        client_id: Some("storefront".to_string()),
        ip_address: Some("10.0.0.1".to_string()),
        occurred_at: Utc::now(),
    };

    assert_eq!(
        repo.apply_registration(&registration).await.unwrap(),
        RegistrationOutcome::Created
    );
    assert_eq!(
        repo.apply_registration(&registration).await.unwrap(),
        RegistrationOutcome::Duplicate
    );
    assert!(repo.is_processed(&registration.uid).await.unwrap());

    let user = repo.get_user(&registration.user_id).await.unwrap().unwrap();
    assert_eq!(user.username, "alice");
    assert_eq!(user.created_client_id.as_deref(), Some("storefront"));
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_login_before_register_is_tolerated() {
    let repo = setup_repo().await;
    let login = LoginRecord {
        user_id: format!("ghost-{}", Utc::now().timestamp_nanos_opt().unwrap_or_default()),
        ip_address: None,
        session_id: None,
        occurred_at: Utc::now(),
    };
    assert_eq!(
        repo.record_login(&login).await.unwrap(),
        LoginOutcome::UnknownUser
    );
}
