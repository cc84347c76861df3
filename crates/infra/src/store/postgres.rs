//! Postgres-backed data store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (other) | any other | `Backend` |
//! | PoolClosed / other | N/A | `Backend` |
//!
//! Updates addressed by id that touch no row report `NotFound`.
//!
//! Flag updates are single `UPDATE .. SET flags = flags | $n RETURNING ..`
//! statements, so concurrent writers never lose each other's bits.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Row};
use std::sync::Arc;
use tracing::instrument;

use warmsend_core::{
    Email, EmailId, EmailStatus, FlagSet, IdentityAttrs, IdentityFlag, IdentityId,
    PerformanceSample, Recipient, RecipientFlag, RecipientId, SendingIdentity, Template,
    TemplateId, do_not_email,
};

use super::r#trait::{DataStore, StoreError};

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const IDENTITY_COLUMNS: &str = "id, attrs, flags, created_at";
const TEMPLATE_COLUMNS: &str = "id, subject, preview, body_text, body_html, flags, created_at";
const RECIPIENT_COLUMNS: &str = "id, email, token, flags, validated_at, disabled_at, created_at";
const EMAIL_COLUMNS: &str =
    "id, identity_id, template_id, recipient_id, target_at, sent_at, message_id, status";

/// Postgres-backed store sharing one connection pool across all flows.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect a pool of at most `max_connections`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the bundled schema. Statements are idempotent.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn fetch_recipients(
        &self,
        operation: &str,
        query: sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<Vec<Recipient>, StoreError> {
        let rows = query
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        rows.iter()
            .map(|row| RecipientRow::from_row(row).map(Into::into).map_err(|e| decode_error(operation, e)))
            .collect()
    }

    async fn optional_recipient(
        &self,
        operation: &str,
        query: sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<Option<Recipient>, StoreError> {
        let row = query
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        row.map(|row| RecipientRow::from_row(&row).map(Into::into))
            .transpose()
            .map_err(|e| decode_error(operation, e))
    }

    async fn optional_email(
        &self,
        operation: &str,
        query: sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<Option<Email>, StoreError> {
        let row = query
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        row.map(|row| EmailRow::from_row(&row))
            .transpose()
            .map_err(|e| decode_error(operation, e))?
            .map(Email::try_from)
            .transpose()
    }

    async fn expect_updated(
        &self,
        operation: &str,
        entity: &'static str,
        id: impl ToString,
        query: sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<(), StoreError> {
        let result = query
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(entity, id));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DataStore for PostgresStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ping", e))?;
        Ok(())
    }

    #[instrument(skip(self, identity), fields(identity_id = %identity.id), err)]
    async fn insert_identity(&self, identity: &SendingIdentity) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sending_identities (id, attrs, flags, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(identity.id.as_uuid())
        .bind(Json(&identity.attrs))
        .bind(identity.flags.bits())
        .bind(identity.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_identity", e))?;
        Ok(())
    }

    async fn identity(&self, id: IdentityId) -> Result<SendingIdentity, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM sending_identities WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("identity", e))?
        .ok_or_else(|| StoreError::not_found("identity", id))?;
        IdentityRow::from_row(&row)
            .map(Into::into)
            .map_err(|e| decode_error("identity", e))
    }

    async fn active_identities(&self) -> Result<Vec<SendingIdentity>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM sending_identities WHERE flags & $1 = 0 ORDER BY created_at, id"
        ))
        .bind(SendingIdentity::inactive_flags().bits())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("active_identities", e))?;
        rows.iter()
            .map(|row| {
                IdentityRow::from_row(row)
                    .map(Into::into)
                    .map_err(|e| decode_error("active_identities", e))
            })
            .collect()
    }

    #[instrument(skip(self), fields(identity_id = %id, flags = flags.bits()), err)]
    async fn add_identity_flags(
        &self,
        id: IdentityId,
        flags: FlagSet<IdentityFlag>,
    ) -> Result<SendingIdentity, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE sending_identities SET flags = flags | $2 WHERE id = $1 RETURNING {IDENTITY_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(flags.bits())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("add_identity_flags", e))?
        .ok_or_else(|| StoreError::not_found("identity", id))?;
        IdentityRow::from_row(&row)
            .map(Into::into)
            .map_err(|e| decode_error("add_identity_flags", e))
    }

    async fn insert_template(&self, template: &Template) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO templates (id, subject, preview, body_text, body_html, flags, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(template.id.as_uuid())
        .bind(&template.subject)
        .bind(&template.preview)
        .bind(&template.body_text)
        .bind(&template.body_html)
        .bind(template.flags.bits())
        .bind(template.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_template", e))?;
        Ok(())
    }

    async fn template(&self, id: TemplateId) -> Result<Template, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM templates WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("template", e))?
        .ok_or_else(|| StoreError::not_found("template", id))?;
        TemplateRow::from_row(&row)
            .map(Into::into)
            .map_err(|e| decode_error("template", e))
    }

    async fn active_templates(&self) -> Result<Vec<Template>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM templates WHERE flags & $1 = 0 ORDER BY created_at, id"
        ))
        .bind(Template::inactive_flags().bits())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("active_templates", e))?;
        rows.iter()
            .map(|row| {
                TemplateRow::from_row(row)
                    .map(Into::into)
                    .map_err(|e| decode_error("active_templates", e))
            })
            .collect()
    }

    #[instrument(skip(self, recipient), fields(recipient_id = %recipient.id), err)]
    async fn insert_recipient(&self, recipient: &Recipient) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO recipients (id, email, token, flags, validated_at, disabled_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(recipient.id.as_uuid())
        .bind(&recipient.email)
        .bind(&recipient.token)
        .bind(recipient.flags.bits())
        .bind(recipient.validated_at)
        .bind(recipient.disabled_at)
        .bind(recipient.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_recipient", e))?;
        Ok(())
    }

    async fn recipient(&self, id: RecipientId) -> Result<Recipient, StoreError> {
        let query = format!("SELECT {RECIPIENT_COLUMNS} FROM recipients WHERE id = $1");
        self.optional_recipient("recipient", sqlx::query(&query).bind(id.as_uuid()))
            .await?
            .ok_or_else(|| StoreError::not_found("recipient", id))
    }

    async fn recipient_by_email(&self, email: &str) -> Result<Option<Recipient>, StoreError> {
        let query =
            format!("SELECT {RECIPIENT_COLUMNS} FROM recipients WHERE LOWER(email) = LOWER($1)");
        self.optional_recipient("recipient_by_email", sqlx::query(&query).bind(email.trim()))
            .await
    }

    async fn recipient_by_token(&self, token: &str) -> Result<Option<Recipient>, StoreError> {
        let query = format!("SELECT {RECIPIENT_COLUMNS} FROM recipients WHERE token = $1");
        self.optional_recipient("recipient_by_token", sqlx::query(&query).bind(token))
            .await
    }

    async fn recipients_with_flags(
        &self,
        flags: FlagSet<RecipientFlag>,
    ) -> Result<Vec<Recipient>, StoreError> {
        let query = format!(
            r#"
            SELECT {RECIPIENT_COLUMNS} FROM recipients
            WHERE flags & $1 = $2 AND disabled_at IS NULL
            ORDER BY created_at, id
            "#
        );
        let q = sqlx::query(&query)
            .bind((flags | do_not_email()).bits())
            .bind(flags.bits());
        self.fetch_recipients("recipients_with_flags", q).await
    }

    async fn unreached_recipients(&self, limit: usize) -> Result<Vec<Recipient>, StoreError> {
        let query = format!(
            r#"
            SELECT {RECIPIENT_COLUMNS} FROM recipients r
            WHERE r.disabled_at IS NULL
              AND r.validated_at IS NOT NULL
              AND NOT EXISTS (SELECT 1 FROM emails e WHERE e.recipient_id = r.id)
            ORDER BY r.created_at, r.id
            LIMIT $1
            "#
        );
        let q = sqlx::query(&query).bind(limit as i64);
        self.fetch_recipients("unreached_recipients", q).await
    }

    async fn next_unvalidated_recipient(&self) -> Result<Option<Recipient>, StoreError> {
        let query = format!(
            r#"
            SELECT {RECIPIENT_COLUMNS} FROM recipients
            WHERE validated_at IS NULL AND disabled_at IS NULL
            ORDER BY created_at, id
            LIMIT 1
            "#
        );
        self.optional_recipient("next_unvalidated_recipient", sqlx::query(&query))
            .await
    }

    async fn update_recipient_email(&self, id: RecipientId, email: &str) -> Result<(), StoreError> {
        self.expect_updated(
            "update_recipient_email",
            "recipient",
            id,
            sqlx::query("UPDATE recipients SET email = $2 WHERE id = $1")
                .bind(id.as_uuid())
                .bind(email.trim()),
        )
        .await
    }

    #[instrument(skip(self), fields(recipient_id = %id, flags = flags.bits()), err)]
    async fn add_recipient_flags(
        &self,
        id: RecipientId,
        flags: FlagSet<RecipientFlag>,
    ) -> Result<Recipient, StoreError> {
        let query = format!(
            "UPDATE recipients SET flags = flags | $2 WHERE id = $1 RETURNING {RECIPIENT_COLUMNS}"
        );
        self.optional_recipient(
            "add_recipient_flags",
            sqlx::query(&query).bind(id.as_uuid()).bind(flags.bits()),
        )
        .await?
        .ok_or_else(|| StoreError::not_found("recipient", id))
    }

    #[instrument(skip(self), fields(recipient_id = %id, flags = flags.bits()), err)]
    async fn remove_recipient_flags(
        &self,
        id: RecipientId,
        flags: FlagSet<RecipientFlag>,
    ) -> Result<Recipient, StoreError> {
        let query = format!(
            "UPDATE recipients SET flags = flags & ~$2::BIGINT WHERE id = $1 RETURNING {RECIPIENT_COLUMNS}"
        );
        self.optional_recipient(
            "remove_recipient_flags",
            sqlx::query(&query).bind(id.as_uuid()).bind(flags.bits()),
        )
        .await?
        .ok_or_else(|| StoreError::not_found("recipient", id))
    }

    async fn mark_recipient_validated(
        &self,
        id: RecipientId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.expect_updated(
            "mark_recipient_validated",
            "recipient",
            id,
            sqlx::query("UPDATE recipients SET validated_at = $2 WHERE id = $1")
                .bind(id.as_uuid())
                .bind(at),
        )
        .await
    }

    #[instrument(skip(self), fields(recipient_id = %id), err)]
    async fn mark_recipient_disabled(
        &self,
        id: RecipientId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.expect_updated(
            "mark_recipient_disabled",
            "recipient",
            id,
            sqlx::query("UPDATE recipients SET disabled_at = COALESCE(disabled_at, $2) WHERE id = $1")
                .bind(id.as_uuid())
                .bind(at),
        )
        .await
    }

    async fn insert_email(&self, email: &Email) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO emails (id, identity_id, template_id, recipient_id, target_at, sent_at, message_id, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(email.id.as_uuid())
        .bind(email.identity_id.as_uuid())
        .bind(email.template_id.as_uuid())
        .bind(email.recipient_id.as_uuid())
        .bind(email.target_at)
        .bind(email.sent_at)
        .bind(email.message_id.as_deref())
        .bind(email.status.map(EmailStatus::as_str))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_email", e))?;
        Ok(())
    }

    async fn pending_email_count(&self, identity: IdentityId) -> Result<u64, StoreError> {
        let count: i64 =
            sqlx::query("SELECT COUNT(*) FROM emails WHERE identity_id = $1 AND sent_at IS NULL")
                .bind(identity.as_uuid())
                .fetch_one(&*self.pool)
                .await
                .and_then(|row| row.try_get(0))
                .map_err(|e| map_sqlx_error("pending_email_count", e))?;
        Ok(count.max(0) as u64)
    }

    async fn next_due_email(&self, now: DateTime<Utc>) -> Result<Option<Email>, StoreError> {
        let query = format!(
            r#"
            SELECT {EMAIL_COLUMNS} FROM emails
            WHERE sent_at IS NULL AND target_at < $1
            ORDER BY target_at, id
            LIMIT 1
            "#
        );
        self.optional_email("next_due_email", sqlx::query(&query).bind(now))
            .await
    }

    #[instrument(skip(self), fields(email_id = %id), err)]
    async fn mark_email_sent(&self, id: EmailId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE emails SET sent_at = $2, status = $3 WHERE id = $1 AND sent_at IS NULL",
        )
        .bind(id.as_uuid())
        .bind(at)
        .bind(EmailStatus::Processed.as_str())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("mark_email_sent", e))?;
        if result.rows_affected() > 0 {
            return Ok(());
        }

        let exists = sqlx::query("SELECT 1 FROM emails WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("mark_email_sent", e))?;
        match exists {
            Some(_) => Err(StoreError::conflict(format!("email {id} already sent"))),
            None => Err(StoreError::not_found("email", id)),
        }
    }

    async fn email_by_message_id(&self, message_id: &str) -> Result<Option<Email>, StoreError> {
        let query = format!("SELECT {EMAIL_COLUMNS} FROM emails WHERE message_id = $1");
        self.optional_email("email_by_message_id", sqlx::query(&query).bind(message_id))
            .await
    }

    async fn latest_sent_email_for(
        &self,
        recipient: RecipientId,
    ) -> Result<Option<Email>, StoreError> {
        let query = format!(
            r#"
            SELECT {EMAIL_COLUMNS} FROM emails
            WHERE recipient_id = $1 AND sent_at IS NOT NULL
            ORDER BY sent_at DESC, id DESC
            LIMIT 1
            "#
        );
        self.optional_email("latest_sent_email_for", sqlx::query(&query).bind(recipient.as_uuid()))
            .await
    }

    #[instrument(skip(self), fields(email_id = %id), err)]
    async fn set_email_message_id(&self, id: EmailId, message_id: &str) -> Result<(), StoreError> {
        self.expect_updated(
            "set_email_message_id",
            "email",
            id,
            sqlx::query("UPDATE emails SET message_id = $2 WHERE id = $1")
                .bind(id.as_uuid())
                .bind(message_id),
        )
        .await
    }

    #[instrument(skip(self), fields(email_id = %id, status = %status), err)]
    async fn set_email_status(&self, id: EmailId, status: EmailStatus) -> Result<(), StoreError> {
        self.expect_updated(
            "set_email_status",
            "email",
            id,
            sqlx::query("UPDATE emails SET status = $2 WHERE id = $1")
                .bind(id.as_uuid())
                .bind(status.as_str()),
        )
        .await
    }

    #[instrument(skip(self), fields(identity_id = %identity), err)]
    async fn performance_samples(
        &self,
        identity: IdentityId,
        limit: usize,
    ) -> Result<Vec<PerformanceSample>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT COUNT(*) AS count, status, (sent_at AT TIME ZONE 'UTC')::date AS day
            FROM emails
            WHERE identity_id = $1 AND sent_at IS NOT NULL
            GROUP BY day, status
            ORDER BY day DESC
            LIMIT $2
            "#,
        )
        .bind(identity.as_uuid())
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("performance_samples", e))?;

        rows.iter()
            .map(|row| {
                let count: i64 = row.try_get("count").map_err(|e| decode_error("performance_samples", e))?;
                let day: NaiveDate = row.try_get("day").map_err(|e| decode_error("performance_samples", e))?;
                let status: Option<String> =
                    row.try_get("status").map_err(|e| decode_error("performance_samples", e))?;
                Ok(PerformanceSample::new(day, parse_status(status)?, count))
            })
            .collect()
    }
}

fn parse_status(raw: Option<String>) -> Result<Option<EmailStatus>, StoreError> {
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(s) => s
            .parse()
            .map(Some)
            .map_err(|e| StoreError::backend(format!("bad status column: {e}"))),
    }
}

/// Map SQLx errors to `StoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn decode_error(operation: &str, err: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("failed to decode row in {}: {}", operation, err))
}

// SQLx row types

#[derive(Debug)]
struct IdentityRow {
    id: uuid::Uuid,
    attrs: IdentityAttrs,
    flags: i64,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for IdentityRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(IdentityRow {
            id: row.try_get("id")?,
            attrs: row.try_get::<Json<IdentityAttrs>, _>("attrs")?.0,
            flags: row.try_get("flags")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl From<IdentityRow> for SendingIdentity {
    fn from(row: IdentityRow) -> Self {
        SendingIdentity {
            id: IdentityId::from_uuid(row.id),
            attrs: row.attrs,
            flags: FlagSet::from_bits(row.flags),
            created_at: row.created_at,
        }
    }
}

#[derive(Debug)]
struct TemplateRow {
    id: uuid::Uuid,
    subject: String,
    preview: String,
    body_text: String,
    body_html: String,
    flags: i64,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for TemplateRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(TemplateRow {
            id: row.try_get("id")?,
            subject: row.try_get("subject")?,
            preview: row.try_get("preview")?,
            body_text: row.try_get("body_text")?,
            body_html: row.try_get("body_html")?,
            flags: row.try_get("flags")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl From<TemplateRow> for Template {
    fn from(row: TemplateRow) -> Self {
        Template {
            id: TemplateId::from_uuid(row.id),
            subject: row.subject,
            preview: row.preview,
            body_text: row.body_text,
            body_html: row.body_html,
            flags: FlagSet::from_bits(row.flags),
            created_at: row.created_at,
        }
    }
}

#[derive(Debug)]
struct RecipientRow {
    id: uuid::Uuid,
    email: String,
    token: String,
    flags: i64,
    validated_at: Option<DateTime<Utc>>,
    disabled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for RecipientRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(RecipientRow {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            token: row.try_get("token")?,
            flags: row.try_get("flags")?,
            validated_at: row.try_get("validated_at")?,
            disabled_at: row.try_get("disabled_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl From<RecipientRow> for Recipient {
    fn from(row: RecipientRow) -> Self {
        Recipient {
            id: RecipientId::from_uuid(row.id),
            email: row.email,
            token: row.token,
            flags: FlagSet::from_bits(row.flags),
            validated_at: row.validated_at,
            disabled_at: row.disabled_at,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug)]
struct EmailRow {
    id: uuid::Uuid,
    identity_id: uuid::Uuid,
    template_id: uuid::Uuid,
    recipient_id: uuid::Uuid,
    target_at: DateTime<Utc>,
    sent_at: Option<DateTime<Utc>>,
    message_id: Option<String>,
    status: Option<String>,
}

impl<'r> FromRow<'r, PgRow> for EmailRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(EmailRow {
            id: row.try_get("id")?,
            identity_id: row.try_get("identity_id")?,
            template_id: row.try_get("template_id")?,
            recipient_id: row.try_get("recipient_id")?,
            target_at: row.try_get("target_at")?,
            sent_at: row.try_get("sent_at")?,
            message_id: row.try_get("message_id")?,
            status: row.try_get("status")?,
        })
    }
}

impl TryFrom<EmailRow> for Email {
    type Error = StoreError;

    fn try_from(row: EmailRow) -> Result<Self, Self::Error> {
        Ok(Email {
            id: EmailId::from_uuid(row.id),
            identity_id: IdentityId::from_uuid(row.identity_id),
            template_id: TemplateId::from_uuid(row.template_id),
            recipient_id: RecipientId::from_uuid(row.recipient_id),
            target_at: row.target_at,
            sent_at: row.sent_at,
            message_id: row.message_id,
            status: parse_status(row.status)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_status_column_reads_as_unset() {
        assert_eq!(parse_status(None).unwrap(), None);
        assert_eq!(parse_status(Some(String::new())).unwrap(), None);
        assert_eq!(
            parse_status(Some("group_unsubscribe".into())).unwrap(),
            Some(EmailStatus::GroupUnsubscribe)
        );
        assert!(matches!(
            parse_status(Some("teleported".into())),
            Err(StoreError::Backend(_))
        ));
    }

    #[test]
    fn schema_declares_every_table() {
        for table in ["sending_identities", "templates", "recipients", "emails"] {
            assert!(SCHEMA.contains(&format!("CREATE TABLE IF NOT EXISTS {table}")));
        }
    }

    #[test]
    fn pool_closed_maps_to_backend() {
        let err = map_sqlx_error("ping", sqlx::Error::PoolClosed);
        assert_eq!(err, StoreError::backend("connection pool closed in ping"));
    }
}
