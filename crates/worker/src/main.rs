//! Praxis Background Worker
//!
//! Scheduled jobs:
//! - Usage aggregation snapshot for operations logs (hourly)
//! - Appointment reminder emails for next-day sessions (daily at 16:00 UTC)
//! - Trial-ending notices (daily at 09:00 UTC)
//!
//! The worker never advances subscription state; expiry is computed at
//! read time by the API.

use std::sync::Arc;
use std::time::Duration;

use praxis_billing::{BillingEmailService, UsageMeter};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Create a database connection pool
async fn create_db_pool() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&database_url)
        .await?;

    info!("Database pool created");
    Ok(pool)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    dotenvy::dotenv().ok();

    info!("Starting Praxis Worker");

    let pool = create_db_pool().await?;
    let email = Arc::new(BillingEmailService::from_env());
    if !email.is_enabled() {
        warn!("Email not configured - reminder and trial notices will be skipped");
    }

    let scheduler = JobScheduler::new().await?;

    // Job 1: Hourly usage aggregation snapshot
    let usage_meter = UsageMeter::new(pool.clone());
    scheduler
        .add(Job::new_async("0 0 * * * *", move |_uuid, _l| {
            let meter = usage_meter.clone();
            Box::pin(async move {
                match meter.platform_month_totals().await {
                    Ok(totals) => info!(
                        active_users = totals.active_users,
                        total_invocations = totals.total_invocations,
                        total_tokens = totals.total_tokens,
                        total_cost_cents = totals.total_cost_cents,
                        "Hourly usage aggregation snapshot"
                    ),
                    Err(e) => error!(error = %e, "Usage aggregation failed"),
                }
            })
        })?)
        .await?;

    // Job 2: Appointment reminders, daily at 16:00 UTC
    let reminder_pool = pool.clone();
    let reminder_email = email.clone();
    scheduler
        .add(Job::new_async("0 0 16 * * *", move |_uuid, _l| {
            let pool = reminder_pool.clone();
            let email = reminder_email.clone();
            Box::pin(async move {
                match send_appointment_reminders(&pool, &email).await {
                    Ok(sent) => info!(sent = sent, "Appointment reminder cycle complete"),
                    Err(e) => error!(error = %e, "Appointment reminder cycle failed"),
                }
            })
        })?)
        .await?;

    // Job 3: Trial-ending notices, daily at 09:00 UTC
    let trial_pool = pool.clone();
    let trial_email = email.clone();
    scheduler
        .add(Job::new_async("0 0 9 * * *", move |_uuid, _l| {
            let pool = trial_pool.clone();
            let email = trial_email.clone();
            Box::pin(async move {
                match send_trial_ending_notices(&pool, &email).await {
                    Ok(sent) => info!(sent = sent, "Trial notice cycle complete"),
                    Err(e) => error!(error = %e, "Trial notice cycle failed"),
                }
            })
        })?)
        .await?;

    scheduler.start().await?;
    info!("Scheduler started with 3 jobs");

    // Keep the process alive; the scheduler runs on background tasks
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        info!("Worker heartbeat");
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReminderRow {
    session_id: Uuid,
    scheduled_at: OffsetDateTime,
    client_name: String,
    recipient: String,
}

/// Email a reminder for every session in the next 24 hours that has not
/// had one yet. Reminders go to the client when an address is on file,
/// otherwise to the therapist.
async fn send_appointment_reminders(
    pool: &PgPool,
    email: &BillingEmailService,
) -> anyhow::Result<u32> {
    let rows: Vec<ReminderRow> = sqlx::query_as(
        r#"
        SELECT s.id AS session_id, s.scheduled_at, c.full_name AS client_name,
               COALESCE(c.email, u.email) AS recipient
        FROM therapy_sessions s
        JOIN clients c ON c.id = s.client_id
        JOIN users u ON u.id = s.user_id
        WHERE s.status = 'scheduled'
          AND s.reminder_sent_at IS NULL
          AND s.scheduled_at BETWEEN NOW() AND NOW() + INTERVAL '24 hours'
        ORDER BY s.scheduled_at
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut sent = 0;
    for row in rows {
        let when = row
            .scheduled_at
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| row.scheduled_at.to_string());

        if let Err(e) = email
            .send_appointment_reminder(&row.recipient, &row.client_name, &when)
            .await
        {
            warn!(session_id = %row.session_id, error = %e, "Reminder email failed");
            continue;
        }

        sqlx::query("UPDATE therapy_sessions SET reminder_sent_at = NOW() WHERE id = $1")
            .bind(row.session_id)
            .execute(pool)
            .await?;
        sent += 1;
    }

    Ok(sent)
}

#[derive(Debug, sqlx::FromRow)]
struct TrialRow {
    user_id: Uuid,
    email: String,
    display_name: String,
    trial_ends_at: OffsetDateTime,
}

/// Notify users whose trial ends within 3 days, once per trial
async fn send_trial_ending_notices(
    pool: &PgPool,
    email: &BillingEmailService,
) -> anyhow::Result<u32> {
    let rows: Vec<TrialRow> = sqlx::query_as(
        r#"
        SELECT id AS user_id, email, display_name, trial_ends_at
        FROM users
        WHERE subscription_status = 'trialing'
          AND trial_notice_sent_at IS NULL
          AND trial_ends_at IS NOT NULL
          AND trial_ends_at BETWEEN NOW() AND NOW() + INTERVAL '3 days'
        "#,
    )
    .fetch_all(pool)
    .await?;

    let now = OffsetDateTime::now_utc();
    let mut sent = 0;
    for row in rows {
        let days_left = ((row.trial_ends_at - now).whole_hours() / 24).max(0) + 1;

        if let Err(e) = email
            .send_trial_ending(&row.email, &row.display_name, days_left)
            .await
        {
            warn!(user_id = %row.user_id, error = %e, "Trial notice email failed");
            continue;
        }

        sqlx::query("UPDATE users SET trial_notice_sent_at = NOW() WHERE id = $1")
            .bind(row.user_id)
            .execute(pool)
            .await?;
        sent += 1;
    }

    Ok(sent)
}
