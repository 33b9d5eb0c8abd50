use async_trait::async_trait;
use sqlx::{types::Json, PgPool};
use time::OffsetDateTime;

use super::{Store, StoreError, StoreResult};
use crate::auth::repo_types::User;
use crate::interviews::repo_types::{
    Answer, AnswerRow, FileAttachment, Interview, Question, Score, Session,
};

const INTERVIEW_COLUMNS: &str =
    "id, title, description, start_time, end_time, created_at, updated_at";
const SESSION_COLUMNS: &str =
    "id, role, user_id, interview_id, email, published, published_at, created_at, updated_at";
const QUESTION_COLUMNS: &str =
    r#"id, title, description, kind, "values", "limit", interview_id, created_at, updated_at"#;
const ANSWER_COLUMNS: &str =
    r#"id, text, "values", file, user_id, question_id, interview_id, created_at, updated_at"#;
const SCORE_COLUMNS: &str = "id, value, interview_id, question_id, answer_id, user_id, \
                             created_user_id, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }


    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"SELECT id, email, password_hash, created_at FROM users WHERE email = $1"#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn insert_interview(&self, interview: &Interview) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO interviews (id, title, description, start_time, end_time, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(interview.id)
        .bind(&interview.title)
        .bind(&interview.description)
        .bind(interview.start_time)
        .bind(interview.end_time)
        .bind(interview.created_at)
        .bind(interview.updated_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn delete_interview(&self, id: i64) -> StoreResult<()> {
        sqlx::query("DELETE FROM interviews WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn find_interview(&self, id: i64) -> StoreResult<Option<Interview>> {
        let row = sqlx::query_as::<_, Interview>(&format!(
            "SELECT {INTERVIEW_COLUMNS} FROM interviews WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn list_interviews_for_user(&self, user_id: i64) -> StoreResult<Vec<Interview>> {
        let rows = sqlx::query_as::<_, Interview>(
            r#"
            SELECT i.id, i.title, i.description, i.start_time, i.end_time, i.created_at, i.updated_at
              FROM interviews i
              JOIN sessions s ON s.interview_id = i.id
             WHERE s.user_id = $1
             ORDER BY i.created_at DESC, i.id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn insert_session(&self, session: &Session) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, role, user_id, interview_id, email, published, published_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(session.id)
        .bind(session.role)
        .bind(session.user_id)
        .bind(session.interview_id)
        .bind(&session.email)
        .bind(session.published)
        .bind(session.published_at)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn upsert_session_role(&self, session: &Session) -> StoreResult<Session> {
        let row = sqlx::query_as::<_, Session>(&format!(
            r#"
            INSERT INTO sessions (id, role, user_id, interview_id, email, published, published_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT ON CONSTRAINT sessions_user_interview_key
            DO UPDATE SET
                role = EXCLUDED.role,
                email = EXCLUDED.email,
                updated_at = EXCLUDED.updated_at
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(session.id)
        .bind(session.role)
        .bind(session.user_id)
        .bind(session.interview_id)
        .bind(&session.email)
        .bind(session.published)
        .bind(session.published_at)
        .bind(session.created_at)
        .bind(session.updated_at)
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn find_session(&self, interview_id: i64, user_id: i64) -> StoreResult<Option<Session>> {
        let row = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE interview_id = $1 AND user_id = $2"
        ))
        .bind(interview_id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn find_session_by_id(&self, id: i64) -> StoreResult<Option<Session>> {
        let row = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn list_sessions(&self, interview_id: i64) -> StoreResult<Vec<Session>> {
        let rows = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE interview_id = $1 ORDER BY id ASC"
        ))
        .bind(interview_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn list_sessions_for_user(&self, user_id: i64) -> StoreResult<Vec<Session>> {
        let rows = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn publish_session(&self, id: i64, at: OffsetDateTime) -> StoreResult<Session> {
        let row = sqlx::query_as::<_, Session>(&format!(
            r#"
            UPDATE sessions
               SET published = TRUE,
                   published_at = COALESCE(published_at, $2),
                   updated_at = $2
             WHERE id = $1
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(at)
        .fetch_optional(&self.db)
        .await?;
        row.ok_or(StoreError::Missing("session"))
    }

    async fn insert_question(&self, question: &Question) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO questions (id, title, description, kind, "values", "limit", interview_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(question.id)
        .bind(&question.title)
        .bind(&question.description)
        .bind(question.kind)
        .bind(&question.values)
        .bind(question.limit)
        .bind(question.interview_id)
        .bind(question.created_at)
        .bind(question.updated_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn find_question(&self, id: i64) -> StoreResult<Option<Question>> {
        let row = sqlx::query_as::<_, Question>(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn list_questions(&self, interview_id: i64) -> StoreResult<Vec<Question>> {
        let rows = sqlx::query_as::<_, Question>(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE interview_id = $1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(interview_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn find_answer(&self, id: i64) -> StoreResult<Option<Answer>> {
        let row = sqlx::query_as::<_, AnswerRow>(&format!(
            "SELECT {ANSWER_COLUMNS} FROM answers WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(Answer::from))
    }

    async fn find_answer_by_key(
        &self,
        user_id: i64,
        question_id: i64,
    ) -> StoreResult<Option<Answer>> {
        let row = sqlx::query_as::<_, AnswerRow>(&format!(
            "SELECT {ANSWER_COLUMNS} FROM answers WHERE user_id = $1 AND question_id = $2"
        ))
        .bind(user_id)
        .bind(question_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(Answer::from))
    }

    async fn upsert_answer(&self, answer: &Answer) -> StoreResult<Answer> {
        // The owner's session row is locked for the duration of the write, so a
        // concurrent publish either commits first (and no row is written) or waits.
        let row = sqlx::query_as::<_, AnswerRow>(&format!(
            r#"
            WITH open_session AS (
                SELECT id FROM sessions
                WHERE user_id = $5 AND interview_id = $7 AND NOT published
                FOR UPDATE
            )
            INSERT INTO answers (id, text, "values", file, user_id, question_id, interview_id, created_at, updated_at)
            SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9
            FROM open_session
            ON CONFLICT ON CONSTRAINT answers_user_question_key
            DO UPDATE SET
                text = EXCLUDED.text,
                "values" = EXCLUDED."values",
                updated_at = EXCLUDED.updated_at
            RETURNING {ANSWER_COLUMNS}
            "#
        ))
        .bind(answer.id)
        .bind(&answer.text)
        .bind(&answer.values)
        .bind(answer.file.as_ref().map(Json))
        .bind(answer.user_id)
        .bind(answer.question_id)
        .bind(answer.interview_id)
        .bind(answer.created_at)
        .bind(answer.updated_at)
        .fetch_optional(&self.db)
        .await?;
        row.map(Answer::from).ok_or(StoreError::Locked)
    }

    async fn set_answer_file(
        &self,
        id: i64,
        file: Option<&FileAttachment>,
        at: OffsetDateTime,
    ) -> StoreResult<Answer> {
        let row = sqlx::query_as::<_, AnswerRow>(&format!(
            r#"
            WITH open_session AS (
                SELECT s.id FROM sessions s
                JOIN answers a ON a.user_id = s.user_id AND a.interview_id = s.interview_id
                WHERE a.id = $1 AND NOT s.published
                FOR UPDATE OF s
            )
            UPDATE answers SET file = $2, updated_at = $3
            WHERE id = $1 AND EXISTS (SELECT 1 FROM open_session)
            RETURNING {ANSWER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(file.map(Json))
        .bind(at)
        .fetch_optional(&self.db)
        .await?;
        if let Some(row) = row {
            return Ok(row.into());
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM answers WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.db)
            .await?;
        Err(if exists {
            StoreError::Locked
        } else {
            StoreError::Missing("answer")
        })
    }

    async fn list_answers(&self, interview_id: i64, user_id: i64) -> StoreResult<Vec<Answer>> {
        let rows = sqlx::query_as::<_, AnswerRow>(&format!(
            "SELECT {ANSWER_COLUMNS} FROM answers WHERE interview_id = $1 AND user_id = $2 ORDER BY question_id ASC"
        ))
        .bind(interview_id)
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Answer::from).collect())
    }

    async fn find_score_by_key(
        &self,
        answer_id: i64,
        created_user_id: i64,
    ) -> StoreResult<Option<Score>> {
        let row = sqlx::query_as::<_, Score>(&format!(
            "SELECT {SCORE_COLUMNS} FROM scores WHERE answer_id = $1 AND created_user_id = $2"
        ))
        .bind(answer_id)
        .bind(created_user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn upsert_score(&self, score: &Score) -> StoreResult<Score> {
        let row = sqlx::query_as::<_, Score>(&format!(
            r#"
            INSERT INTO scores (id, value, interview_id, question_id, answer_id, user_id, created_user_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT ON CONSTRAINT scores_answer_scorer_key
            DO UPDATE SET
                value = EXCLUDED.value,
                updated_at = EXCLUDED.updated_at
            RETURNING {SCORE_COLUMNS}
            "#
        ))
        .bind(score.id)
        .bind(score.value)
        .bind(score.interview_id)
        .bind(score.question_id)
        .bind(score.answer_id)
        .bind(score.user_id)
        .bind(score.created_user_id)
        .bind(score.created_at)
        .bind(score.updated_at)
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn list_scores(&self, interview_id: i64) -> StoreResult<Vec<Score>> {
        let rows = sqlx::query_as::<_, Score>(&format!(
            "SELECT {SCORE_COLUMNS} FROM scores WHERE interview_id = $1 ORDER BY user_id ASC, question_id ASC"
        ))
        .bind(interview_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }
}
