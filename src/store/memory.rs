//! Process-local backend with the same uniqueness rules as the Postgres schema.
//! Backs `STORE_BACKEND=memory` and the test suite.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use super::{Store, StoreError, StoreResult};
use crate::auth::repo_types::User;
use crate::interviews::repo_types::{Answer, FileAttachment, Interview, Question, Score, Session};

/// Operations that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    InsertSession,
    DeleteInterview,
    UpsertAnswer,
}

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    interviews: BTreeMap<i64, Interview>,
    sessions: BTreeMap<i64, Session>,
    questions: BTreeMap<i64, Question>,
    answers: BTreeMap<i64, Answer>,
    scores: BTreeMap<i64, Score>,
    faults: HashSet<Fault>,
}

impl Tables {
    fn check(&self, fault: Fault) -> StoreResult<()> {
        if self.faults.contains(&fault) {
            return Err(StoreError::Backend(anyhow::anyhow!(
                "injected failure: {:?}",
                fault
            )));
        }
        Ok(())
    }

    fn session_by_key(&self, interview_id: i64, user_id: i64) -> Option<&Session> {
        self.sessions
            .values()
            .find(|s| s.interview_id == interview_id && s.user_id == user_id)
    }

    fn ensure_unlocked(&self, interview_id: i64, user_id: i64) -> StoreResult<()> {
        match self.session_by_key(interview_id, user_id) {
            Some(s) if !s.published => Ok(()),
            _ => Err(StoreError::Locked),
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later call of `fault`'s operation fail until cleared.
    #[cfg(test)]
    pub async fn inject_fault(&self, fault: Fault) {
        self.tables.lock().await.faults.insert(fault);
    }

    #[cfg(test)]
    pub async fn clear_faults(&self) {
        self.tables.lock().await.faults.clear();
    }
}

fn ensure_unique(taken: bool, key: &str) -> StoreResult<()> {
    if taken {
        return Err(StoreError::Duplicate(key.to_string()));
    }
    Ok(())
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        let mut t = self.tables.lock().await;
        ensure_unique(t.users.contains_key(&user.id), "users_pkey")?;
        ensure_unique(
            t.users.values().any(|u| u.email == user.email),
            "users_email_key",
        )?;
        t.users.insert(user.id, user.clone());
        Ok(())
    }


    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let t = self.tables.lock().await;
        Ok(t.users.values().find(|u| u.email == email).cloned())
    }

    async fn insert_interview(&self, interview: &Interview) -> StoreResult<()> {
        let mut t = self.tables.lock().await;
        ensure_unique(t.interviews.contains_key(&interview.id), "interviews_pkey")?;
        t.interviews.insert(interview.id, interview.clone());
        Ok(())
    }

    async fn delete_interview(&self, id: i64) -> StoreResult<()> {
        let mut t = self.tables.lock().await;
        t.check(Fault::DeleteInterview)?;
        t.interviews.remove(&id);
        t.sessions.retain(|_, s| s.interview_id != id);
        t.questions.retain(|_, q| q.interview_id != id);
        t.answers.retain(|_, a| a.interview_id != id);
        t.scores.retain(|_, s| s.interview_id != id);
        Ok(())
    }

    async fn find_interview(&self, id: i64) -> StoreResult<Option<Interview>> {
        Ok(self.tables.lock().await.interviews.get(&id).cloned())
    }

    async fn list_interviews_for_user(&self, user_id: i64) -> StoreResult<Vec<Interview>> {
        let t = self.tables.lock().await;
        let mut rows: Vec<Interview> = t
            .sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .filter_map(|s| t.interviews.get(&s.interview_id).cloned())
            .collect();
        rows.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(rows)
    }

    async fn insert_session(&self, session: &Session) -> StoreResult<()> {
        let mut t = self.tables.lock().await;
        t.check(Fault::InsertSession)?;
        ensure_unique(t.sessions.contains_key(&session.id), "sessions_pkey")?;
        ensure_unique(
            t.session_by_key(session.interview_id, session.user_id).is_some(),
            "sessions_user_interview_key",
        )?;
        t.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn upsert_session_role(&self, session: &Session) -> StoreResult<Session> {
        let mut t = self.tables.lock().await;
        let existing = t
            .session_by_key(session.interview_id, session.user_id)
            .map(|s| s.id);
        if let Some(row) = existing.and_then(|id| t.sessions.get_mut(&id)) {
            row.role = session.role;
            row.email = session.email.clone();
            row.updated_at = session.updated_at;
            return Ok(row.clone());
        }
        ensure_unique(t.sessions.contains_key(&session.id), "sessions_pkey")?;
        t.sessions.insert(session.id, session.clone());
        Ok(session.clone())
    }

    async fn find_session(&self, interview_id: i64, user_id: i64) -> StoreResult<Option<Session>> {
        let t = self.tables.lock().await;
        Ok(t.session_by_key(interview_id, user_id).cloned())
    }

    async fn find_session_by_id(&self, id: i64) -> StoreResult<Option<Session>> {
        Ok(self.tables.lock().await.sessions.get(&id).cloned())
    }

    async fn list_sessions(&self, interview_id: i64) -> StoreResult<Vec<Session>> {
        let t = self.tables.lock().await;
        Ok(t.sessions
            .values()
            .filter(|s| s.interview_id == interview_id)
            .cloned()
            .collect())
    }

    async fn list_sessions_for_user(&self, user_id: i64) -> StoreResult<Vec<Session>> {
        let t = self.tables.lock().await;
        let mut rows: Vec<Session> = t
            .sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(rows)
    }

    async fn publish_session(&self, id: i64, at: OffsetDateTime) -> StoreResult<Session> {
        let mut t = self.tables.lock().await;
        let row = t.sessions.get_mut(&id).ok_or(StoreError::Missing("session"))?;
        row.published = true;
        row.published_at.get_or_insert(at);
        row.updated_at = at;
        Ok(row.clone())
    }

    async fn insert_question(&self, question: &Question) -> StoreResult<()> {
        let mut t = self.tables.lock().await;
        ensure_unique(t.questions.contains_key(&question.id), "questions_pkey")?;
        t.questions.insert(question.id, question.clone());
        Ok(())
    }

    async fn find_question(&self, id: i64) -> StoreResult<Option<Question>> {
        Ok(self.tables.lock().await.questions.get(&id).cloned())
    }

    async fn list_questions(&self, interview_id: i64) -> StoreResult<Vec<Question>> {
        let t = self.tables.lock().await;
        let mut rows: Vec<Question> = t
            .questions
            .values()
            .filter(|q| q.interview_id == interview_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        Ok(rows)
    }

    async fn find_answer(&self, id: i64) -> StoreResult<Option<Answer>> {
        Ok(self.tables.lock().await.answers.get(&id).cloned())
    }

    async fn find_answer_by_key(
        &self,
        user_id: i64,
        question_id: i64,
    ) -> StoreResult<Option<Answer>> {
        let t = self.tables.lock().await;
        Ok(t.answers
            .values()
            .find(|a| a.user_id == user_id && a.question_id == question_id)
            .cloned())
    }

    async fn upsert_answer(&self, answer: &Answer) -> StoreResult<Answer> {
        let mut t = self.tables.lock().await;
        t.check(Fault::UpsertAnswer)?;
        t.ensure_unlocked(answer.interview_id, answer.user_id)?;
        let existing = t
            .answers
            .values()
            .find(|a| a.user_id == answer.user_id && a.question_id == answer.question_id)
            .map(|a| a.id);
        if let Some(row) = existing.and_then(|id| t.answers.get_mut(&id)) {
            row.text = answer.text.clone();
            row.values = answer.values.clone();
            row.updated_at = answer.updated_at;
            return Ok(row.clone());
        }
        ensure_unique(t.answers.contains_key(&answer.id), "answers_pkey")?;
        t.answers.insert(answer.id, answer.clone());
        Ok(answer.clone())
    }

    async fn set_answer_file(
        &self,
        id: i64,
        file: Option<&FileAttachment>,
        at: OffsetDateTime,
    ) -> StoreResult<Answer> {
        let mut t = self.tables.lock().await;
        let (interview_id, user_id) = t
            .answers
            .get(&id)
            .map(|a| (a.interview_id, a.user_id))
            .ok_or(StoreError::Missing("answer"))?;
        t.ensure_unlocked(interview_id, user_id)?;
        let row = t.answers.get_mut(&id).ok_or(StoreError::Missing("answer"))?;
        row.file = file.cloned();
        row.updated_at = at;
        Ok(row.clone())
    }

    async fn list_answers(&self, interview_id: i64, user_id: i64) -> StoreResult<Vec<Answer>> {
        let t = self.tables.lock().await;
        let mut rows: Vec<Answer> = t
            .answers
            .values()
            .filter(|a| a.interview_id == interview_id && a.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.question_id);
        Ok(rows)
    }

    async fn find_score_by_key(
        &self,
        answer_id: i64,
        created_user_id: i64,
    ) -> StoreResult<Option<Score>> {
        let t = self.tables.lock().await;
        Ok(t.scores
            .values()
            .find(|s| s.answer_id == answer_id && s.created_user_id == created_user_id)
            .cloned())
    }

    async fn upsert_score(&self, score: &Score) -> StoreResult<Score> {
        let mut t = self.tables.lock().await;
        let existing = t
            .scores
            .values()
            .find(|s| s.answer_id == score.answer_id && s.created_user_id == score.created_user_id)
            .map(|s| s.id);
        if let Some(row) = existing.and_then(|id| t.scores.get_mut(&id)) {
            row.value = score.value;
            row.updated_at = score.updated_at;
            return Ok(row.clone());
        }
        ensure_unique(t.scores.contains_key(&score.id), "scores_pkey")?;
        t.scores.insert(score.id, score.clone());
        Ok(score.clone())
    }

    async fn list_scores(&self, interview_id: i64) -> StoreResult<Vec<Score>> {
        let t = self.tables.lock().await;
        let mut rows: Vec<Score> = t
            .scores
            .values()
            .filter(|s| s.interview_id == interview_id)
            .cloned()
            .collect();
        rows.sort_by_key(|s| (s.user_id, s.question_id));
        Ok(rows)
    }
}
