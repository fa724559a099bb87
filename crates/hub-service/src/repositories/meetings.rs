//! Postgres meeting repository.
//!
//! Members are stored as a JSONB array so a meeting is read and written as
//! one row. Every write is guarded by the `version` column.

use crate::errors::HubError;
use crate::models::{Meeting, MeetingStatus, Member};
use crate::observability::metrics;
use crate::repositories::MeetingRepository;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

const MEETING_COLUMNS: &str = r#"
    meeting_id, created_by, members, invited_participants, scheduled_time,
    status, ended_at, ended_by, recording_urls, version, created_at, updated_at
"#;

#[derive(Debug, sqlx::FromRow)]
struct MeetingRecord {
    meeting_id: String,
    created_by: Uuid,
    members: Json<Vec<Member>>,
    invited_participants: Vec<String>,
    scheduled_time: Option<DateTime<Utc>>,
    status: String,
    ended_at: Option<DateTime<Utc>>,
    ended_by: Option<Uuid>,
    recording_urls: Vec<String>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MeetingRecord> for Meeting {
    type Error = HubError;

    fn try_from(r: MeetingRecord) -> Result<Self, Self::Error> {
        let status = r
            .status
            .parse::<MeetingStatus>()
            .map_err(HubError::Database)?;

        Ok(Meeting {
            meeting_id: r.meeting_id,
            created_by: r.created_by,
            members: r.members.0,
            invited_participants: r.invited_participants,
            scheduled_time: r.scheduled_time,
            status,
            ended_at: r.ended_at,
            ended_by: r.ended_by,
            recording_urls: r.recording_urls,
            created_at: r.created_at,
            updated_at: r.updated_at,
            version: r.version,
        })
    }
}

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

fn into_meetings(records: Vec<MeetingRecord>) -> Result<Vec<Meeting>, HubError> {
    records.into_iter().map(Meeting::try_from).collect()
}

/// `MeetingRepository` backed by Postgres.
#[derive(Clone)]
pub struct PgMeetingRepository {
    pool: PgPool,
}

impl PgMeetingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl MeetingRepository for PgMeetingRepository {
    #[instrument(skip_all, name = "hub.repo.insert_meeting")]
    async fn insert(&self, meeting: &Meeting) -> Result<Meeting, HubError> {
        let start = Instant::now();
        let sql = format!(
            r#"
            INSERT INTO meetings (
                meeting_id, created_by, members, invited_participants,
                scheduled_time, status, recording_urls, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 0, $8, $8)
            RETURNING {}
            "#,
            MEETING_COLUMNS
        );

        let result = sqlx::query_as::<_, MeetingRecord>(&sql)
            .bind(&meeting.meeting_id) // $1
            .bind(meeting.created_by) // $2
            .bind(Json(&meeting.members)) // $3
            .bind(&meeting.invited_participants) // $4
            .bind(meeting.scheduled_time) // $5
            .bind(meeting.status.as_str()) // $6
            .bind(&meeting.recording_urls) // $7
            .bind(meeting.created_at) // $8
            .fetch_one(&self.pool)
            .await;

        if let Err(sqlx::Error::Database(db_err)) = &result {
            if db_err.is_unique_violation() {
                metrics::record_db_query("insert_meeting", "conflict", start.elapsed());
                return Err(HubError::Conflict(
                    "Meeting with this ID already exists".to_string(),
                ));
            }
        }

        observe("insert_meeting", start, result)?.try_into()
    }

    #[instrument(skip_all, name = "hub.repo.find_meeting")]
    async fn find(&self, meeting_id: &str) -> Result<Option<Meeting>, HubError> {
        let start = Instant::now();
        let sql = format!(
            "SELECT {} FROM meetings WHERE meeting_id = $1",
            MEETING_COLUMNS
        );
        let result = sqlx::query_as::<_, MeetingRecord>(&sql)
            .bind(meeting_id)
            .fetch_optional(&self.pool)
            .await;
        observe("find_meeting", start, result)?
            .map(Meeting::try_from)
            .transpose()
    }

    #[instrument(skip_all, name = "hub.repo.save_meeting")]
    async fn save(&self, meeting: &Meeting, expected_version: i64) -> Result<bool, HubError> {
        let start = Instant::now();
        let result = sqlx::query(
            r#"
            UPDATE meetings
            SET members = $3,
                invited_participants = $4,
                scheduled_time = $5,
                status = $6,
                ended_at = $7,
                ended_by = $8,
                recording_urls = $9,
                updated_at = $10,
                version = version + 1
            WHERE meeting_id = $1 AND version = $2
            "#,
        )
        .bind(&meeting.meeting_id) // $1
        .bind(expected_version) // $2
        .bind(Json(&meeting.members)) // $3
        .bind(&meeting.invited_participants) // $4
        .bind(meeting.scheduled_time) // $5
        .bind(meeting.status.as_str()) // $6
        .bind(meeting.ended_at) // $7
        .bind(meeting.ended_by) // $8
        .bind(&meeting.recording_urls) // $9
        .bind(meeting.updated_at) // $10
        .execute(&self.pool)
        .await;

        let done = observe("save_meeting", start, result)?;
        Ok(done.rows_affected() == 1)
    }

    #[instrument(skip_all, name = "hub.repo.list_meetings_for_member")]
    async fn list_for_member(&self, user_id: Uuid) -> Result<Vec<Meeting>, HubError> {
        let start = Instant::now();
        let sql = format!(
            r#"
            SELECT {} FROM meetings
            WHERE members @> jsonb_build_array(jsonb_build_object('user_id', $1::text))
            ORDER BY created_at DESC
            "#,
            MEETING_COLUMNS
        );
        let result = sqlx::query_as::<_, MeetingRecord>(&sql)
            .bind(user_id.to_string())
            .fetch_all(&self.pool)
            .await;
        into_meetings(observe("list_meetings_for_member", start, result)?)
    }

    #[instrument(skip_all, name = "hub.repo.list_meetings_with_recordings")]
    async fn list_with_recordings(&self) -> Result<Vec<Meeting>, HubError> {
        let start = Instant::now();
        let sql = format!(
            r#"
            SELECT {} FROM meetings
            WHERE cardinality(recording_urls) > 0
            ORDER BY created_at DESC
            "#,
            MEETING_COLUMNS
        );
        let result = sqlx::query_as::<_, MeetingRecord>(&sql)
            .fetch_all(&self.pool)
            .await;
        into_meetings(observe("list_meetings_with_recordings", start, result)?)
    }
}
