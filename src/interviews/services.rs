//! Interview lifecycle: who may create, invite, join, author, answer, score
//! and publish. Every permission check runs before the first write of its
//! transition; uniqueness races are settled by the store's keys.

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{error, info, warn};

use super::dto::{CreateQuestionRequest, NewInterview, SubmitAnswerRequest};
use super::repo_types::{
    Answer, FileAttachment, Interview, Question, QuestionType, Role, Score, Session,
};
use super::validators;
use crate::auth::extractors::Caller;
use crate::error::{messages, AppError};
use crate::sequence::EntityFactory;
use crate::store::{Store, StoreError};

#[derive(Clone)]
pub struct InterviewWorkflow {
    store: Arc<dyn Store>,
    factory: EntityFactory,
}

impl InterviewWorkflow {
    pub fn new(store: Arc<dyn Store>, factory: EntityFactory) -> Self {
        Self { store, factory }
    }

    async fn interview(&self, id: i64) -> Result<Interview, AppError> {
        self.store
            .find_interview(id)
            .await?
            .ok_or_else(|| AppError::not_found("interviewId", messages::NO_INTERVIEW))
    }

    async fn question(&self, id: i64) -> Result<Question, AppError> {
        self.store
            .find_question(id)
            .await?
            .ok_or_else(|| AppError::not_found("questionId", messages::NO_QUESTION))
    }

    /// The caller's session for `interview_id`, if it satisfies `allowed`.
    async fn session_where(
        &self,
        caller: &Caller,
        interview_id: i64,
        allowed: fn(&Session) -> bool,
        message: &str,
    ) -> Result<Session, AppError> {
        match self.store.find_session(interview_id, caller.user_id).await? {
            Some(session) if allowed(&session) => Ok(session),
            _ => {
                warn!(user_id = caller.user_id, interview_id, reason = message, "permission denied");
                Err(AppError::forbidden("role", message))
            }
        }
    }

    /// Creates the interview and the creator's Master session as one unit.
    ///
    /// Both ids are minted before anything is written. If the session cannot be
    /// saved the interview is deleted again; if that delete also fails the
    /// orphan is reported as `PartialWrite`.
    pub async fn create_interview(
        &self,
        caller: &Caller,
        draft: NewInterview,
    ) -> Result<(Interview, Session), AppError> {
        let interview = self.factory.interview(draft).await?;
        let session = self
            .factory
            .session(None, Role::Master, caller.user_id, interview.id, &caller.email)
            .await?;

        self.store.insert_interview(&interview).await?;
        if let Err(e) = self.store.insert_session(&session).await {
            warn!(error = %e, interview_id = interview.id, "master session insert failed; rolling back interview");
            if let Err(cleanup) = self.store.delete_interview(interview.id).await {
                error!(error = %cleanup, interview_id = interview.id, "interview rollback failed");
                return Err(AppError::PartialWrite {
                    step: "interview",
                    source: cleanup,
                });
            }
            return Err(e.into());
        }

        info!(
            interview_id = interview.id,
            session_id = session.id,
            user_id = caller.user_id,
            "interview created"
        );
        Ok((interview, session))
    }

    /// Interviews the caller takes part in, with the caller's sessions.
    pub async fn list_interviews(
        &self,
        caller: &Caller,
    ) -> Result<(Vec<Interview>, Vec<Session>), AppError> {
        let interviews = self.store.list_interviews_for_user(caller.user_id).await?;
        let sessions = self.store.list_sessions_for_user(caller.user_id).await?;
        Ok((interviews, sessions))
    }

    /// Master-only. Creates or overwrites the invitee's session as Interviewer.
    pub async fn invite(
        &self,
        caller: &Caller,
        interview_id: i64,
        email: &str,
    ) -> Result<Session, AppError> {
        self.interview(interview_id).await?;
        self.session_where(caller, interview_id, Session::is_master, messages::NOT_MASTER)
            .await?;

        let email = email.trim().to_lowercase();
        let invitee = self
            .store
            .find_user_by_email(&email)
            .await?
            .ok_or_else(|| AppError::not_found("email", messages::NO_USER))?;
        if invitee.id == caller.user_id {
            return Err(AppError::conflict("email", messages::INVITE_SELF));
        }

        // An existing session of any role is promoted in place.
        let existing = self.store.find_session(interview_id, invitee.id).await?;
        let candidate = self
            .factory
            .session(
                existing.as_ref(),
                Role::Interviewer,
                invitee.id,
                interview_id,
                &invitee.email,
            )
            .await?;
        let session = self.store.upsert_session_role(&candidate).await?;

        info!(
            interview_id,
            session_id = session.id,
            invitee_id = invitee.id,
            previous_role = ?existing.map(|s| s.role),
            "interviewer invited"
        );
        Ok(session)
    }

    /// Joins as Interviewee. Re-joining returns the existing session unchanged;
    /// holders of any other role are refused.
    pub async fn join(
        &self,
        caller: &Caller,
        interview_id: i64,
    ) -> Result<(Interview, Session), AppError> {
        let interview = self.interview(interview_id).await?;

        if let Some(existing) = self.store.find_session(interview_id, caller.user_id).await? {
            return Self::joined(interview, existing);
        }

        let session = self
            .factory
            .session(None, Role::Interviewee, caller.user_id, interview_id, &caller.email)
            .await?;
        match self.store.insert_session(&session).await {
            Ok(()) => {
                info!(interview_id, session_id = session.id, user_id = caller.user_id, "interviewee joined");
                Ok((interview, session))
            }
            Err(StoreError::Duplicate(_)) => {
                // Lost a race with a concurrent join or invite; settle on the stored row.
                let existing = self
                    .store
                    .find_session(interview_id, caller.user_id)
                    .await?
                    .ok_or_else(|| AppError::not_found("sessionId", messages::NO_SESSION))?;
                Self::joined(interview, existing)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn joined(interview: Interview, existing: Session) -> Result<(Interview, Session), AppError> {
        if existing.is_interviewee() {
            Ok((interview, existing))
        } else {
            warn!(interview_id = interview.id, user_id = existing.user_id, role = ?existing.role, "join refused");
            Err(AppError::conflict("role", messages::CANNOT_JOIN))
        }
    }

    /// Interviewer-only view of everyone in the interview.
    pub async fn list_sessions(
        &self,
        caller: &Caller,
        interview_id: i64,
    ) -> Result<Vec<Session>, AppError> {
        self.interview(interview_id).await?;
        self.session_where(caller, interview_id, Session::is_interviewer, messages::NOT_INTERVIEWER)
            .await?;
        Ok(self.store.list_sessions(interview_id).await?)
    }

    /// Locks an interviewee's answers. Publishing twice is a no-op.
    pub async fn publish(
        &self,
        caller: &Caller,
        interview_id: i64,
        session_id: i64,
    ) -> Result<Session, AppError> {
        self.interview(interview_id).await?;
        self.session_where(caller, interview_id, Session::is_interviewer, messages::NOT_INTERVIEWER)
            .await?;

        let target = self
            .store
            .find_session_by_id(session_id)
            .await?
            .filter(|s| s.interview_id == interview_id)
            .ok_or_else(|| AppError::not_found("sessionId", messages::NO_SESSION))?;
        if !target.is_interviewee() {
            return Err(AppError::conflict("role", messages::PUBLISH_TARGET));
        }
        if target.is_published() {
            return Ok(target);
        }

        let session = self
            .store
            .publish_session(target.id, OffsetDateTime::now_utc())
            .await?;
        info!(interview_id, session_id, by = caller.user_id, "session published");
        Ok(session)
    }

    pub async fn create_question(
        &self,
        caller: &Caller,
        interview_id: i64,
        req: CreateQuestionRequest,
    ) -> Result<Question, AppError> {
        let draft = validators::question(req)?;
        self.interview(interview_id).await?;
        self.session_where(caller, interview_id, Session::is_master, messages::NOT_MASTER)
            .await?;

        let question = self.factory.question(draft, interview_id).await?;
        self.store.insert_question(&question).await?;
        info!(interview_id, question_id = question.id, kind = ?question.kind, "question created");
        Ok(question)
    }

    /// Questions in creation order plus the caller's answers. Any participant.
    pub async fn list_questions(
        &self,
        caller: &Caller,
        interview_id: i64,
    ) -> Result<(Vec<Question>, Vec<Answer>), AppError> {
        self.interview(interview_id).await?;
        self.session_where(caller, interview_id, |_| true, messages::NOT_PARTICIPANT)
            .await?;
        let questions = self.store.list_questions(interview_id).await?;
        let answers = self.store.list_answers(interview_id, caller.user_id).await?;
        Ok((questions, answers))
    }

    /// The caller's unpublished interviewee session for the question's interview.
    async fn answering_session(
        &self,
        caller: &Caller,
        question: &Question,
    ) -> Result<Session, AppError> {
        let session = self
            .session_where(
                caller,
                question.interview_id,
                Session::is_interviewee,
                messages::NOT_INTERVIEWEE,
            )
            .await?;
        if session.is_published() {
            warn!(session_id = session.id, question_id = question.id, "answer after publish refused");
            return Err(AppError::conflict("published", messages::PUBLISHED));
        }
        Ok(session)
    }

    /// Create-or-update keyed by (caller, question).
    pub async fn submit_answer(
        &self,
        caller: &Caller,
        question_id: i64,
        req: SubmitAnswerRequest,
    ) -> Result<Answer, AppError> {
        let question = self.question(question_id).await?;
        self.answering_session(caller, &question).await?;
        let draft = validators::answer(&question, req)?;

        let existing = self
            .store
            .find_answer_by_key(caller.user_id, question.id)
            .await?;
        let candidate = self
            .factory
            .answer(existing.as_ref(), draft, caller.user_id, &question)
            .await?;
        let answer = self.store.upsert_answer(&candidate).await?;

        info!(
            question_id,
            answer_id = answer.id,
            user_id = caller.user_id,
            updated = existing.is_some(),
            "answer saved"
        );
        Ok(answer)
    }

    /// The caller's own answer to a file question, checked for attaching a file.
    /// Call before uploading so that refused requests never reach blob storage.
    pub async fn file_answer_target(
        &self,
        caller: &Caller,
        question_id: i64,
    ) -> Result<Answer, AppError> {
        let question = self.question(question_id).await?;
        if question.kind != QuestionType::File {
            return Err(AppError::invalid("type", messages::NOT_FILE_QUESTION));
        }
        self.answering_session(caller, &question).await?;
        self.store
            .find_answer_by_key(caller.user_id, question.id)
            .await?
            .ok_or_else(|| AppError::forbidden("answerId", messages::NO_OWN_ANSWER))
    }

    /// Stores (or clears, with `None`) the uploaded file on the caller's answer.
    pub async fn attach_file(
        &self,
        caller: &Caller,
        question_id: i64,
        file: Option<FileAttachment>,
    ) -> Result<Answer, AppError> {
        let target = self.file_answer_target(caller, question_id).await?;
        let answer = self
            .store
            .set_answer_file(target.id, file.as_ref(), OffsetDateTime::now_utc())
            .await?;
        info!(answer_id = answer.id, has_file = answer.file.is_some(), "answer file updated");
        Ok(answer)
    }

    /// Create-or-update keyed by (answer, scorer). A missing value scores 0.
    pub async fn submit_score(
        &self,
        caller: &Caller,
        answer_id: i64,
        value: Option<f64>,
    ) -> Result<Score, AppError> {
        let answer = self
            .store
            .find_answer(answer_id)
            .await?
            .ok_or_else(|| AppError::not_found("answerId", messages::NO_ANSWER))?;
        self.session_where(
            caller,
            answer.interview_id,
            Session::is_interviewer,
            messages::NOT_INTERVIEWER,
        )
        .await?;

        let existing = self
            .store
            .find_score_by_key(answer.id, caller.user_id)
            .await?;
        let candidate = self
            .factory
            .score(existing.as_ref(), value.unwrap_or(0.0), &answer, caller.user_id)
            .await?;
        let score = self.store.upsert_score(&candidate).await?;

        info!(
            answer_id,
            score_id = score.id,
            scorer_id = caller.user_id,
            value = score.value,
            "score saved"
        );
        Ok(score)
    }

    pub async fn list_scores(
        &self,
        caller: &Caller,
        interview_id: i64,
    ) -> Result<Vec<Score>, AppError> {
        self.interview(interview_id).await?;
        self.session_where(caller, interview_id, Session::is_interviewer, messages::NOT_INTERVIEWER)
            .await?;
        Ok(self.store.list_scores(interview_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::macros::datetime;

    use super::*;
    use crate::auth::repo_types::User;
    use crate::interviews::dto::CreateInterviewRequest;
    use crate::sequence::MemorySequences;
    use crate::store::memory::Fault;
    use crate::store::MemoryStore;

    struct Harness {
        workflow: InterviewWorkflow,
        store: Arc<MemoryStore>,
        sequences: Arc<MemorySequences>,
        factory: EntityFactory,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let sequences = Arc::new(MemorySequences::new());
        let factory = EntityFactory::new(sequences.clone());
        Harness {
            workflow: InterviewWorkflow::new(store.clone(), factory.clone()),
            store,
            sequences,
            factory,
        }
    }

    impl Harness {
        async fn user(&self, email: &str) -> Caller {
            let user: User = self
                .factory
                .user(email.to_string(), "hash".into())
                .await
                .unwrap();
            self.store.insert_user(&user).await.unwrap();
            Caller {
                user_id: user.id,
                email: user.email,
            }
        }

        async fn interview(&self, master: &Caller) -> Interview {
            self.workflow
                .create_interview(master, draft())
                .await
                .unwrap()
                .0
        }

        async fn question(&self, master: &Caller, interview_id: i64, body: serde_json::Value) -> Question {
            let req: CreateQuestionRequest = serde_json::from_value(body).unwrap();
            self.workflow
                .create_question(master, interview_id, req)
                .await
                .unwrap()
        }
    }

    fn draft() -> NewInterview {
        validators::interview(CreateInterviewRequest {
            title: Some("Backend hiring".into()),
            description: None,
            start_time: Some(datetime!(2026-11-01 09:00 UTC)),
            end_time: Some(datetime!(2026-11-30 18:00 UTC)),
        })
        .unwrap()
    }

    fn text_answer(text: &str) -> SubmitAnswerRequest {
        SubmitAnswerRequest {
            text: Some(text.into()),
            values: None,
        }
    }

    fn field_of(err: &AppError) -> &str {
        match err {
            AppError::NotFound(e)
            | AppError::Forbidden(e)
            | AppError::Conflict(e)
            | AppError::Unavailable(e) => &e.field,
            AppError::Validation(errors) => &errors[0].field,
            other => panic!("no field on {other:?}"),
        }
    }

    #[tokio::test]
    async fn creator_becomes_master() {
        let h = harness();
        let alice = h.user("alice@example.com").await;
        let (interview, session) = h.workflow.create_interview(&alice, draft()).await.unwrap();

        assert_eq!(session.role, Role::Master);
        assert_eq!(session.interview_id, interview.id);
        assert_eq!(session.user_id, alice.user_id);
        assert!(!session.published);
        assert_eq!(h.store.list_sessions(interview.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_master_session_rolls_back_interview() {
        let h = harness();
        let alice = h.user("alice@example.com").await;
        h.store.inject_fault(Fault::InsertSession).await;

        let err = h.workflow.create_interview(&alice, draft()).await.unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
        assert!(h.store.find_interview(1).await.unwrap().is_none());
        let (interviews, _) = h.workflow.list_interviews(&alice).await.unwrap();
        assert!(interviews.is_empty());
    }

    #[tokio::test]
    async fn failed_rollback_reports_partial_write() {
        let h = harness();
        let alice = h.user("alice@example.com").await;
        h.store.inject_fault(Fault::InsertSession).await;
        h.store.inject_fault(Fault::DeleteInterview).await;

        let err = h.workflow.create_interview(&alice, draft()).await.unwrap_err();
        assert!(matches!(err, AppError::PartialWrite { step: "interview", .. }));
    }

    #[tokio::test]
    async fn allocation_failure_writes_nothing() {
        let h = harness();
        let alice = h.user("alice@example.com").await;
        h.sequences.set_unavailable(true);

        let err = h.workflow.create_interview(&alice, draft()).await.unwrap_err();
        assert!(matches!(err, AppError::AllocationFailed { .. }));
        assert!(h.store.list_interviews_for_user(alice.user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn master_invites_interviewer() {
        let h = harness();
        let alice = h.user("alice@example.com").await;
        let bob = h.user("bob@example.com").await;
        let interview = h.interview(&alice).await;

        let session = h
            .workflow
            .invite(&alice, interview.id, "  BOB@example.com ")
            .await
            .unwrap();
        assert_eq!(session.role, Role::Interviewer);
        assert_eq!(session.user_id, bob.user_id);
        assert_eq!(session.email, "bob@example.com");
    }

    #[tokio::test]
    async fn invite_twice_keeps_one_session() {
        let h = harness();
        let alice = h.user("alice@example.com").await;
        h.user("bob@example.com").await;
        let interview = h.interview(&alice).await;

        let first = h.workflow.invite(&alice, interview.id, "bob@example.com").await.unwrap();
        let again = h.workflow.invite(&alice, interview.id, "bob@example.com").await.unwrap();
        assert_eq!(first.id, again.id);
        assert_eq!(h.store.list_sessions(interview.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn invite_promotes_existing_interviewee() {
        let h = harness();
        let alice = h.user("alice@example.com").await;
        let bob = h.user("bob@example.com").await;
        let interview = h.interview(&alice).await;
        let (_, joined) = h.workflow.join(&bob, interview.id).await.unwrap();

        let promoted = h.workflow.invite(&alice, interview.id, "bob@example.com").await.unwrap();
        assert_eq!(promoted.id, joined.id);
        assert_eq!(promoted.role, Role::Interviewer);
    }

    #[tokio::test]
    async fn only_master_invites() {
        let h = harness();
        let alice = h.user("alice@example.com").await;
        let bob = h.user("bob@example.com").await;
        h.user("carol@example.com").await;
        let interview = h.interview(&alice).await;
        h.workflow.invite(&alice, interview.id, "bob@example.com").await.unwrap();

        let err = h
            .workflow
            .invite(&bob, interview.id, "carol@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn invite_edge_cases() {
        let h = harness();
        let alice = h.user("alice@example.com").await;
        let interview = h.interview(&alice).await;

        let unknown = h
            .workflow
            .invite(&alice, interview.id, "nobody@example.com")
            .await
            .unwrap_err();
        assert!(matches!(unknown, AppError::NotFound(_)));
        assert_eq!(field_of(&unknown), "email");

        let own = h
            .workflow
            .invite(&alice, interview.id, "alice@example.com")
            .await
            .unwrap_err();
        assert!(matches!(own, AppError::Conflict(_)));

        let missing = h.workflow.invite(&alice, 999, "alice@example.com").await.unwrap_err();
        assert_eq!(field_of(&missing), "interviewId");
    }

    #[tokio::test]
    async fn join_is_idempotent() {
        let h = harness();
        let alice = h.user("alice@example.com").await;
        let dave = h.user("dave@example.com").await;
        let interview = h.interview(&alice).await;

        let (_, first) = h.workflow.join(&dave, interview.id).await.unwrap();
        let (_, again) = h.workflow.join(&dave, interview.id).await.unwrap();
        assert_eq!(first.role, Role::Interviewee);
        assert_eq!(first.id, again.id);
        assert_eq!(h.sequences.current("Session").await, 2);
    }

    #[tokio::test]
    async fn reviewers_cannot_join() {
        let h = harness();
        let alice = h.user("alice@example.com").await;
        let interview = h.interview(&alice).await;

        let err = h.workflow.join(&alice, interview.id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(h.store.list_sessions(interview.id).await.unwrap()[0].role, Role::Master);
    }

    #[tokio::test]
    async fn concurrent_joins_settle_on_one_session() {
        let h = harness();
        let alice = h.user("alice@example.com").await;
        let dave = h.user("dave@example.com").await;
        let interview = h.interview(&alice).await;

        let (a, b) = tokio::join!(
            h.workflow.join(&dave, interview.id),
            h.workflow.join(&dave, interview.id)
        );
        assert_eq!(a.unwrap().1.id, b.unwrap().1.id);
        assert_eq!(h.store.list_sessions(interview.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn only_master_authors_questions() {
        let h = harness();
        let alice = h.user("alice@example.com").await;
        let bob = h.user("bob@example.com").await;
        let dave = h.user("dave@example.com").await;
        let interview = h.interview(&alice).await;
        h.workflow.invite(&alice, interview.id, "bob@example.com").await.unwrap();
        h.workflow.join(&dave, interview.id).await.unwrap();

        let body = json!({"title": "Why us?", "type": "text", "limit": 200});
        for caller in [&bob, &dave] {
            let req: CreateQuestionRequest = serde_json::from_value(body.clone()).unwrap();
            let err = h
                .workflow
                .create_question(caller, interview.id, req)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Forbidden(_)));
        }

        let q = h.question(&alice, interview.id, body).await;
        assert_eq!(q.kind, QuestionType::Text);
        assert_eq!(q.limit, Some(200));
    }

    #[tokio::test]
    async fn invalid_question_mints_nothing() {
        let h = harness();
        let alice = h.user("alice@example.com").await;
        let interview = h.interview(&alice).await;

        let req: CreateQuestionRequest =
            serde_json::from_value(json!({"title": "Essay", "type": "text"})).unwrap();
        let err = h
            .workflow
            .create_question(&alice, interview.id, req)
            .await
            .unwrap_err();
        assert_eq!(field_of(&err), "limit");
        assert_eq!(h.sequences.current("Question").await, 0);
    }

    #[tokio::test]
    async fn answer_upsert_keeps_id_and_updates_text() {
        let h = harness();
        let alice = h.user("alice@example.com").await;
        let dave = h.user("dave@example.com").await;
        let interview = h.interview(&alice).await;
        h.workflow.join(&dave, interview.id).await.unwrap();
        let q = h
            .question(&alice, interview.id, json!({"title": "Why us?", "type": "text", "limit": 10}))
            .await;

        let first = h.workflow.submit_answer(&dave, q.id, text_answer("hi")).await.unwrap();
        let second = h.workflow.submit_answer(&dave, q.id, text_answer("hello")).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.text, "hello");
        assert_eq!(second.interview_id, interview.id);

        let (questions, answers) = h.workflow.list_questions(&dave, interview.id).await.unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].text, "hello");
    }

    #[tokio::test]
    async fn only_interviewees_answer() {
        let h = harness();
        let alice = h.user("alice@example.com").await;
        let outsider = h.user("eve@example.com").await;
        let interview = h.interview(&alice).await;
        let q = h
            .question(&alice, interview.id, json!({"title": "Why us?", "type": "text", "limit": 10}))
            .await;

        for caller in [&alice, &outsider] {
            let err = h
                .workflow
                .submit_answer(caller, q.id, text_answer("hi"))
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Forbidden(_)));
        }

        let err = h.workflow.submit_answer(&alice, 404, text_answer("hi")).await.unwrap_err();
        assert_eq!(field_of(&err), "questionId");
    }

    #[tokio::test]
    async fn publish_locks_answers() {
        let h = harness();
        let alice = h.user("alice@example.com").await;
        let dave = h.user("dave@example.com").await;
        let interview = h.interview(&alice).await;
        let (_, session) = h.workflow.join(&dave, interview.id).await.unwrap();
        let q = h
            .question(&alice, interview.id, json!({"title": "Why us?", "type": "text", "limit": 10}))
            .await;
        h.workflow.submit_answer(&dave, q.id, text_answer("hi")).await.unwrap();

        let published = h.workflow.publish(&alice, interview.id, session.id).await.unwrap();
        assert!(published.published);
        let again = h.workflow.publish(&alice, interview.id, session.id).await.unwrap();
        assert_eq!(again.published_at, published.published_at);

        let err = h
            .workflow
            .submit_answer(&dave, q.id, text_answer("changed"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        let stored = h.store.find_answer_by_key(dave.user_id, q.id).await.unwrap().unwrap();
        assert_eq!(stored.text, "hi");
    }

    #[tokio::test]
    async fn publish_targets_interviewees_in_same_interview() {
        let h = harness();
        let alice = h.user("alice@example.com").await;
        let dave = h.user("dave@example.com").await;
        let interview = h.interview(&alice).await;
        let other = h.interview(&alice).await;
        let (_, dave_session) = h.workflow.join(&dave, interview.id).await.unwrap();
        let master = h.store.find_session(interview.id, alice.user_id).await.unwrap().unwrap();

        let err = h.workflow.publish(&alice, interview.id, master.id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let err = h.workflow.publish(&alice, other.id, dave_session.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = h.workflow.publish(&dave, interview.id, dave_session.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn answer_store_failure_leaves_previous_answer() {
        let h = harness();
        let alice = h.user("alice@example.com").await;
        let dave = h.user("dave@example.com").await;
        let interview = h.interview(&alice).await;
        h.workflow.join(&dave, interview.id).await.unwrap();
        let q = h
            .question(&alice, interview.id, json!({"title": "Why us?", "type": "text", "limit": 10}))
            .await;
        h.workflow.submit_answer(&dave, q.id, text_answer("hi")).await.unwrap();

        h.store.inject_fault(Fault::UpsertAnswer).await;
        let err = h.workflow.submit_answer(&dave, q.id, text_answer("bye")).await.unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
        h.store.clear_faults().await;

        let stored = h.store.find_answer_by_key(dave.user_id, q.id).await.unwrap().unwrap();
        assert_eq!(stored.text, "hi");
    }

    #[tokio::test]
    async fn file_answers() {
        let h = harness();
        let alice = h.user("alice@example.com").await;
        let dave = h.user("dave@example.com").await;
        let interview = h.interview(&alice).await;
        h.workflow.join(&dave, interview.id).await.unwrap();
        let text_q = h
            .question(&alice, interview.id, json!({"title": "Why us?", "type": "text", "limit": 10}))
            .await;
        let file_q = h
            .question(&alice, interview.id, json!({"title": "CV", "type": "file"}))
            .await;
        let file = FileAttachment {
            name: "cv.pdf".into(),
            url: "http://blobs/cv.pdf".into(),
            size: 42,
            mime_type: "application/pdf".into(),
        };

        let err = h
            .workflow
            .attach_file(&dave, text_q.id, Some(file.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = h
            .workflow
            .attach_file(&dave, file_q.id, Some(file.clone()))
            .await
            .unwrap_err();
        assert_eq!(field_of(&err), "answerId");

        h.workflow
            .submit_answer(&dave, file_q.id, SubmitAnswerRequest::default())
            .await
            .unwrap();
        let attached = h
            .workflow
            .attach_file(&dave, file_q.id, Some(file.clone()))
            .await
            .unwrap();
        assert_eq!(attached.file, Some(file.clone()));

        // Re-submitting the answer body keeps the stored file.
        let resubmitted = h
            .workflow
            .submit_answer(&dave, file_q.id, SubmitAnswerRequest::default())
            .await
            .unwrap();
        assert_eq!(resubmitted.file, Some(file));

        let cleared = h.workflow.attach_file(&dave, file_q.id, None).await.unwrap();
        assert!(cleared.file.is_none());
    }

    #[tokio::test]
    async fn score_upsert_per_scorer() {
        let h = harness();
        let alice = h.user("alice@example.com").await;
        let bob = h.user("bob@example.com").await;
        let dave = h.user("dave@example.com").await;
        let interview = h.interview(&alice).await;
        h.workflow.invite(&alice, interview.id, "bob@example.com").await.unwrap();
        h.workflow.join(&dave, interview.id).await.unwrap();
        let q = h
            .question(&alice, interview.id, json!({"title": "Pick", "type": "radio", "values": ["a", "b"]}))
            .await;
        let answer = h
            .workflow
            .submit_answer(
                &dave,
                q.id,
                SubmitAnswerRequest {
                    text: None,
                    values: Some(json!(["a"])),
                },
            )
            .await
            .unwrap();

        let first = h.workflow.submit_score(&bob, answer.id, Some(3.0)).await.unwrap();
        let again = h.workflow.submit_score(&bob, answer.id, Some(4.5)).await.unwrap();
        assert_eq!(first.id, again.id);
        assert_eq!(again.value, 4.5);
        assert_eq!(again.user_id, dave.user_id);
        assert_eq!(again.created_user_id, bob.user_id);

        let by_master = h.workflow.submit_score(&alice, answer.id, None).await.unwrap();
        assert_ne!(by_master.id, first.id);
        assert_eq!(by_master.value, 0.0);

        let scores = h.workflow.list_scores(&bob, interview.id).await.unwrap();
        assert_eq!(scores.len(), 2);

        let err = h.workflow.submit_score(&dave, answer.id, Some(5.0)).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        let err = h.workflow.list_scores(&dave, interview.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        let err = h.workflow.submit_score(&bob, 999, Some(1.0)).await.unwrap_err();
        assert_eq!(field_of(&err), "answerId");
    }

    #[tokio::test]
    async fn listings_are_scoped_to_participants() {
        let h = harness();
        let alice = h.user("alice@example.com").await;
        let dave = h.user("dave@example.com").await;
        let eve = h.user("eve@example.com").await;
        let first = h.interview(&alice).await;
        let second = h.interview(&alice).await;
        h.workflow.join(&dave, first.id).await.unwrap();

        let (interviews, sessions) = h.workflow.list_interviews(&alice).await.unwrap();
        assert_eq!(interviews.len(), 2);
        assert_eq!(sessions.len(), 2);
        let (interviews, _) = h.workflow.list_interviews(&dave).await.unwrap();
        assert_eq!(interviews.iter().map(|i| i.id).collect::<Vec<_>>(), vec![first.id]);

        assert_eq!(h.workflow.list_sessions(&alice, first.id).await.unwrap().len(), 2);
        assert!(h.workflow.list_sessions(&alice, second.id).await.unwrap().len() == 1);
        let err = h.workflow.list_sessions(&dave, first.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        let err = h.workflow.list_questions(&eve, first.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    /// Delegates to `MemoryStore`, but publishes a session right after the
    /// workflow reads the caller's existing answer, as a reviewer racing the
    /// submission would.
    struct PublishOnAnswerLookup {
        inner: Arc<MemoryStore>,
        session_id: tokio::sync::Mutex<Option<i64>>,
    }

    #[async_trait::async_trait]
    impl Store for PublishOnAnswerLookup {
        async fn insert_user(&self, user: &User) -> crate::store::StoreResult<()> {
            self.inner.insert_user(user).await
        }
        async fn find_user_by_email(&self, email: &str) -> crate::store::StoreResult<Option<User>> {
            self.inner.find_user_by_email(email).await
        }
        async fn insert_interview(&self, interview: &Interview) -> crate::store::StoreResult<()> {
            self.inner.insert_interview(interview).await
        }
        async fn delete_interview(&self, id: i64) -> crate::store::StoreResult<()> {
            self.inner.delete_interview(id).await
        }
        async fn find_interview(&self, id: i64) -> crate::store::StoreResult<Option<Interview>> {
            self.inner.find_interview(id).await
        }
        async fn list_interviews_for_user(&self, user_id: i64) -> crate::store::StoreResult<Vec<Interview>> {
            self.inner.list_interviews_for_user(user_id).await
        }
        async fn insert_session(&self, session: &Session) -> crate::store::StoreResult<()> {
            self.inner.insert_session(session).await
        }
        async fn upsert_session_role(&self, session: &Session) -> crate::store::StoreResult<Session> {
            self.inner.upsert_session_role(session).await
        }
        async fn find_session(&self, interview_id: i64, user_id: i64) -> crate::store::StoreResult<Option<Session>> {
            self.inner.find_session(interview_id, user_id).await
        }
        async fn find_session_by_id(&self, id: i64) -> crate::store::StoreResult<Option<Session>> {
            self.inner.find_session_by_id(id).await
        }
        async fn list_sessions(&self, interview_id: i64) -> crate::store::StoreResult<Vec<Session>> {
            self.inner.list_sessions(interview_id).await
        }
        async fn list_sessions_for_user(&self, user_id: i64) -> crate::store::StoreResult<Vec<Session>> {
            self.inner.list_sessions_for_user(user_id).await
        }
        async fn publish_session(&self, id: i64, at: OffsetDateTime) -> crate::store::StoreResult<Session> {
            self.inner.publish_session(id, at).await
        }
        async fn insert_question(&self, question: &Question) -> crate::store::StoreResult<()> {
            self.inner.insert_question(question).await
        }
        async fn find_question(&self, id: i64) -> crate::store::StoreResult<Option<Question>> {
            self.inner.find_question(id).await
        }
        async fn list_questions(&self, interview_id: i64) -> crate::store::StoreResult<Vec<Question>> {
            self.inner.list_questions(interview_id).await
        }
        async fn find_answer(&self, id: i64) -> crate::store::StoreResult<Option<Answer>> {
            self.inner.find_answer(id).await
        }
        async fn find_answer_by_key(
            &self,
            user_id: i64,
            question_id: i64,
        ) -> crate::store::StoreResult<Option<Answer>> {
            let found = self.inner.find_answer_by_key(user_id, question_id).await;
            if let Some(id) = self.session_id.lock().await.take() {
                self.inner.publish_session(id, OffsetDateTime::now_utc()).await?;
            }
            found
        }
        async fn upsert_answer(&self, answer: &Answer) -> crate::store::StoreResult<Answer> {
            self.inner.upsert_answer(answer).await
        }
        async fn set_answer_file(
            &self,
            id: i64,
            file: Option<&FileAttachment>,
            at: OffsetDateTime,
        ) -> crate::store::StoreResult<Answer> {
            self.inner.set_answer_file(id, file, at).await
        }
        async fn list_answers(&self, interview_id: i64, user_id: i64) -> crate::store::StoreResult<Vec<Answer>> {
            self.inner.list_answers(interview_id, user_id).await
        }
        async fn find_score_by_key(
            &self,
            answer_id: i64,
            created_user_id: i64,
        ) -> crate::store::StoreResult<Option<Score>> {
            self.inner.find_score_by_key(answer_id, created_user_id).await
        }
        async fn upsert_score(&self, score: &Score) -> crate::store::StoreResult<Score> {
            self.inner.upsert_score(score).await
        }
        async fn list_scores(&self, interview_id: i64) -> crate::store::StoreResult<Vec<Score>> {
            self.inner.list_scores(interview_id).await
        }
    }

    impl Harness {
        /// A workflow over the same tables that publishes `session_id` mid-submission.
        fn racing_publish(&self, session_id: i64) -> InterviewWorkflow {
            let store = PublishOnAnswerLookup {
                inner: self.store.clone(),
                session_id: tokio::sync::Mutex::new(Some(session_id)),
            };
            InterviewWorkflow::new(Arc::new(store), self.factory.clone())
        }
    }

    #[tokio::test]
    async fn publish_racing_answer_submission_wins() {
        let h = harness();
        let alice = h.user("alice@example.com").await;
        let dave = h.user("dave@example.com").await;
        let interview = h.interview(&alice).await;
        let (_, session) = h.workflow.join(&dave, interview.id).await.unwrap();
        let q = h
            .question(&alice, interview.id, json!({"title": "Why us?", "type": "text", "limit": 10}))
            .await;
        h.workflow.submit_answer(&dave, q.id, text_answer("before")).await.unwrap();

        let err = h
            .racing_publish(session.id)
            .submit_answer(&dave, q.id, text_answer("after"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(ref e) if e.field == "published"));

        let stored = h.store.find_answer_by_key(dave.user_id, q.id).await.unwrap().unwrap();
        assert_eq!(stored.text, "before");
        assert!(h.store.find_session_by_id(session.id).await.unwrap().unwrap().published);
    }

    #[tokio::test]
    async fn publish_racing_file_attach_wins() {
        let h = harness();
        let alice = h.user("alice@example.com").await;
        let dave = h.user("dave@example.com").await;
        let interview = h.interview(&alice).await;
        let (_, session) = h.workflow.join(&dave, interview.id).await.unwrap();
        let q = h
            .question(&alice, interview.id, json!({"title": "CV", "type": "file"}))
            .await;
        h.workflow
            .submit_answer(&dave, q.id, SubmitAnswerRequest::default())
            .await
            .unwrap();

        let file = FileAttachment {
            name: "cv.pdf".into(),
            url: "http://blobs/cv.pdf".into(),
            size: 42,
            mime_type: "application/pdf".into(),
        };
        let err = h
            .racing_publish(session.id)
            .attach_file(&dave, q.id, Some(file))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(ref e) if e.field == "published"));

        let stored = h.store.find_answer_by_key(dave.user_id, q.id).await.unwrap().unwrap();
        assert!(stored.file.is_none());
    }
}
