use super::repo_types::{Role, Session};

impl Session {
    pub fn is_master(&self) -> bool {
        self.role == Role::Master
    }

    /// Masters hold every interviewer privilege.
    pub fn is_interviewer(&self) -> bool {
        matches!(self.role, Role::Master | Role::Interviewer)
    }

    pub fn is_interviewee(&self) -> bool {
        self.role == Role::Interviewee
    }

    pub fn is_published(&self) -> bool {
        self.published
    }
}
