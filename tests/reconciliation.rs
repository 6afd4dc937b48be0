//! Integration tests for the ledger core.
//!
//! They need a PostgreSQL instance reachable through DATABASE_URL and are
//! ignored by default:
//!
//!     DATABASE_URL=postgres://localhost/academy_test cargo test -- --ignored
//!
//! Each test creates its own users/courses, so the suite can run against a
//! shared database.

use std::sync::Arc;

use academy_ledger::{
    analytics::AnalyticsRollup,
    audit::AuditLog,
    error::AppError,
    ledger::{Statement, StatementDraft, StatementFilter, StatementLedger, Subject},
    payout::{PayoutConfig, PayoutEngine, PayoutStatus},
    rewards::{condition_keys, ConditionCatalog, RewardService},
};
use chrono::Datelike;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

async fn connect() -> PgPool {
    let url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&url)
        .await
        .expect("failed to connect");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations failed");
    pool
}

async fn create_user(pool: &PgPool, name: &str) -> i64 {
    sqlx::query_scalar("INSERT INTO users (name) VALUES ($1) RETURNING id")
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn create_course(pool: &PgPool, instructor_id: i64, title: &str) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO courses (instructor_id, title, price) VALUES ($1, $2, 0) RETURNING id",
    )
    .bind(instructor_id)
    .bind(title)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn append(ledger: &StatementLedger, drafts: &[StatementDraft]) -> Vec<Statement> {
    let mut tx = ledger.begin_tx().await.unwrap();
    let statements = ledger.append_statements(&mut tx, drafts).await.unwrap();
    tx.commit().await.unwrap();
    statements
}

fn engine(pool: &PgPool) -> PayoutEngine {
    PayoutEngine::new(
        PayoutConfig::default(),
        pool.clone(),
        Arc::new(AuditLog::new(pool.clone())),
    )
}

async fn rewards(pool: &PgPool) -> RewardService {
    let catalog = Arc::new(ConditionCatalog::load(pool).await.unwrap());
    RewardService::new(
        pool.clone(),
        catalog,
        Arc::new(AuditLog::new(pool.clone())),
    )
}

fn draft(user_id: i64, subject: Subject, amount: Decimal) -> StatementDraft {
    StatementDraft {
        user_id,
        subject,
        amount,
        order_id: Uuid::new_v4(),
    }
}

#[tokio::test]
#[ignore = "requires a PostgreSQL instance via DATABASE_URL"]
async fn watermark_advances_without_double_counting() {
    let pool = connect().await;
    let instructor = create_user(&pool, "instructor-watermark").await;
    let buyer = create_user(&pool, "buyer-watermark").await;
    let course = create_course(&pool, instructor, "Watermark 101").await;

    let ledger = StatementLedger::new(pool.clone());
    let engine = engine(&pool);

    let statements = append(
        &ledger,
        &[
            draft(buyer, Subject::Course(course), dec!(10)),
            draft(buyer, Subject::Course(course), dec!(20)),
            draft(buyer, Subject::Course(course), dec!(5)),
        ],
    )
    .await;

    let first = engine.compute_payout(instructor).await.unwrap().unwrap();
    assert_eq!(first.amount, dec!(35));
    assert_eq!(first.watermark, statements[2].id);
    assert_eq!(first.status, PayoutStatus::Pending);

    let late = append(&ledger, &[draft(buyer, Subject::Course(course), dec!(7))]).await;

    // The second computation covers only the late statement - 7, not 42
    let second = engine.compute_payout(instructor).await.unwrap().unwrap();
    assert_eq!(second.amount, dec!(7));
    assert_eq!(second.watermark, late[0].id);

    // Everything is paid; no zero-amount payout row is created
    assert!(engine.compute_payout(instructor).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires a PostgreSQL instance via DATABASE_URL"]
async fn concurrent_computations_pay_exactly_once() {
    let pool = connect().await;
    let instructor = create_user(&pool, "instructor-concurrent").await;
    let buyer = create_user(&pool, "buyer-concurrent").await;
    let course = create_course(&pool, instructor, "Races 201").await;

    let ledger = StatementLedger::new(pool.clone());
    append(
        &ledger,
        &[
            draft(buyer, Subject::Course(course), dec!(12.50)),
            draft(buyer, Subject::Course(course), dec!(37.50)),
        ],
    )
    .await;

    // Two engines on the same store, as two service instances would be
    let a = engine(&pool);
    let b = engine(&pool);
    let (first, second) = tokio::join!(a.compute_payout(instructor), b.compute_payout(instructor));

    let payouts: Vec<_> = [first.unwrap(), second.unwrap()]
        .into_iter()
        .flatten()
        .collect();
    assert_eq!(payouts.len(), 1, "only one call may observe unpaid statements");
    assert_eq!(payouts[0].amount, dec!(50));

    // Invariant 3: Σ payouts == Σ statements for the instructor
    let paid: Decimal = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0) FROM payouts WHERE instructor_id = $1",
    )
    .bind(instructor)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(paid, dec!(50));
}

#[tokio::test]
#[ignore = "requires a PostgreSQL instance via DATABASE_URL"]
async fn retried_append_is_idempotent() {
    let pool = connect().await;
    let instructor = create_user(&pool, "instructor-idem").await;
    let buyer = create_user(&pool, "buyer-idem").await;
    let course = create_course(&pool, instructor, "Retry 301").await;

    let ledger = StatementLedger::new(pool.clone());
    let once = draft(buyer, Subject::Course(course), dec!(19.99));

    let first = append(&ledger, std::slice::from_ref(&once)).await;
    let second = append(&ledger, std::slice::from_ref(&once)).await;

    assert_eq!(first[0].id, second[0].id);

    let listed = ledger
        .list_statements(&StatementFilter {
            user_id: Some(buyer),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].amount, dec!(19.99));
}

#[tokio::test]
#[ignore = "requires a PostgreSQL instance via DATABASE_URL"]
async fn one_shot_condition_awards_once() {
    let pool = connect().await;
    let user = create_user(&pool, "user-oneshot").await;
    let service = rewards(&pool).await;

    let first = service
        .give_reward_points(user, condition_keys::REGISTRATION, None)
        .await
        .unwrap()
        .unwrap();
    let second = service
        .give_reward_points(user, condition_keys::REGISTRATION, None)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(first.id, second.id, "second call returns the prior entry");
    assert_eq!(service.balance(user).await.unwrap(), 50);
    assert_eq!(service.history(user).await.unwrap().len(), 1);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL instance via DATABASE_URL"]
async fn one_shot_condition_is_per_subject() {
    let pool = connect().await;
    let user = create_user(&pool, "user-per-subject").await;
    let service = rewards(&pool).await;

    let course_a = service
        .give_reward_points(user, condition_keys::COURSE_COMPLETION, Some(1001))
        .await
        .unwrap()
        .unwrap();
    let course_b = service
        .give_reward_points(user, condition_keys::COURSE_COMPLETION, Some(1002))
        .await
        .unwrap()
        .unwrap();
    let course_a_again = service
        .give_reward_points(user, condition_keys::COURSE_COMPLETION, Some(1001))
        .await
        .unwrap()
        .unwrap();

    assert_ne!(course_a.id, course_b.id);
    assert_eq!(course_a.id, course_a_again.id);
    assert_eq!(service.balance(user).await.unwrap(), 80);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL instance via DATABASE_URL"]
async fn repeatable_condition_pays_every_occurrence() {
    let pool = connect().await;
    let user = create_user(&pool, "user-repeatable").await;
    let service = rewards(&pool).await;

    let reply_a = service
        .give_reward_points(user, condition_keys::FORUM_REPLY, Some(1))
        .await
        .unwrap()
        .unwrap();
    let reply_b = service
        .give_reward_points(user, condition_keys::FORUM_REPLY, Some(2))
        .await
        .unwrap()
        .unwrap();

    assert_ne!(reply_a.id, reply_b.id);
    assert_eq!(service.balance(user).await.unwrap(), 10);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL instance via DATABASE_URL"]
async fn unknown_condition_is_a_silent_noop() {
    let pool = connect().await;
    let user = create_user(&pool, "user-unknown-condition").await;
    let service = rewards(&pool).await;

    let granted = service
        .give_reward_points(user, "NoSuchCondition", None)
        .await
        .unwrap();
    assert!(granted.is_none());
    assert_eq!(service.balance(user).await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL instance via DATABASE_URL"]
async fn overspending_is_rejected_and_balance_unchanged() {
    let pool = connect().await;
    let user = create_user(&pool, "user-overspend").await;
    let service = rewards(&pool).await;

    service
        .give_reward_points(user, condition_keys::REGISTRATION, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(service.balance(user).await.unwrap(), 50);

    let err = service
        .spend_reward_points(user, 60, "store order #1")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Reward(_)));
    assert_eq!(service.balance(user).await.unwrap(), 50);

    let spent = service
        .spend_reward_points(user, 30, "store order #2")
        .await
        .unwrap();
    assert_eq!(spent.points, 30);
    assert_eq!(service.balance(user).await.unwrap(), 20);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL instance via DATABASE_URL"]
async fn payout_status_follows_the_approval_state_machine() {
    let pool = connect().await;
    let instructor = create_user(&pool, "instructor-status").await;
    let buyer = create_user(&pool, "buyer-status").await;
    let course = create_course(&pool, instructor, "Approvals 401").await;

    let ledger = StatementLedger::new(pool.clone());
    append(&ledger, &[draft(buyer, Subject::Course(course), dec!(99))]).await;

    let engine = engine(&pool);
    let payout = engine.compute_payout(instructor).await.unwrap().unwrap();

    engine
        .update_status(payout.id, PayoutStatus::Pending, PayoutStatus::Approved)
        .await
        .unwrap();
    engine
        .update_status(payout.id, PayoutStatus::Approved, PayoutStatus::Dispatched)
        .await
        .unwrap();

    // Stale transition: the payout is no longer pending
    let stale = engine
        .update_status(payout.id, PayoutStatus::Pending, PayoutStatus::Rejected)
        .await;
    assert!(stale.is_err());

    let current = engine.latest_payout(instructor).await.unwrap().unwrap();
    assert_eq!(current.status, PayoutStatus::Dispatched);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL instance via DATABASE_URL"]
async fn analytics_rollup_buckets_the_year() {
    let pool = connect().await;
    let instructor = create_user(&pool, "instructor-analytics").await;
    let buyer = create_user(&pool, "buyer-analytics").await;
    let course = create_course(&pool, instructor, "Charts 501").await;

    let ledger = StatementLedger::new(pool.clone());
    append(
        &ledger,
        &[
            draft(buyer, Subject::Course(course), dec!(15)),
            draft(buyer, Subject::Course(course), dec!(25)),
        ],
    )
    .await;

    let rollup = AnalyticsRollup::new(pool.clone());
    let now = chrono::Utc::now();
    let totals = rollup
        .revenue_by_month(Some(instructor), now.year())
        .await
        .unwrap();

    assert_eq!(totals.len(), 12);
    let this_month = &totals[now.month() as usize - 1];
    assert_eq!(this_month.total, dec!(40));

    let year_total: Decimal = totals.iter().map(|bucket| bucket.total).sum();
    assert_eq!(year_total, dec!(40));
}
