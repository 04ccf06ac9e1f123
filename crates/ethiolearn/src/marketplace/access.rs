use std::fmt;

use serde::{Deserialize, Serialize};

use super::domain::UserId;

/// Role tag attached to every account by the session provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[serde(alias = "user")]
    Learner,
    Instructor,
    Employer,
    Admin,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Learner, Role::Instructor, Role::Employer, Role::Admin];

    pub const fn label(self) -> &'static str {
        match self {
            Role::Learner => "learner",
            Role::Instructor => "instructor",
            Role::Employer => "employer",
            Role::Admin => "admin",
        }
    }

    pub const fn can_author_courses(self) -> bool {
        matches!(self, Role::Instructor)
    }

    pub const fn can_post_jobs(self) -> bool {
        matches!(self, Role::Employer)
    }

    pub const fn can_purchase(self) -> bool {
        matches!(self, Role::Learner)
    }

    pub const fn can_apply(self) -> bool {
        matches!(self, Role::Learner)
    }

    pub const fn reviews_payments(self) -> bool {
        matches!(self, Role::Admin)
    }

    pub const fn tabs(self) -> &'static [Tab] {
        &[Tab::Welcome, Tab::Courses, Tab::Jobs, Tab::Payments]
    }

    pub const fn headline(self) -> &'static str {
        match self {
            Role::Learner => "Explore courses and job opportunities",
            Role::Instructor => "Manage your courses and create new content",
            Role::Employer => "Post job opportunities and find talent",
            Role::Admin => "Oversee platform operations and approvals",
        }
    }

    /// Landing view: one section per domain tab with the actions this role may take.
    pub fn dashboard(self) -> Dashboard {
        let mut course_actions = vec![SectionAction::BrowseCourses];
        if self.can_author_courses() {
            course_actions.push(SectionAction::AddCourse);
        }

        let mut job_actions = vec![SectionAction::BrowseJobs];
        if self.can_post_jobs() {
            job_actions.push(SectionAction::PostJob);
        }

        let payment_title = if self.reviews_payments() {
            "Payment Receipts to Review"
        } else {
            "My Payment History"
        };

        Dashboard {
            role: self,
            headline: self.headline(),
            tabs: self.tabs().to_vec(),
            sections: vec![
                DashboardSection {
                    tab: Tab::Courses,
                    title: "Courses",
                    description: "Discover and learn from expert-led courses",
                    actions: course_actions,
                },
                DashboardSection {
                    tab: Tab::Jobs,
                    title: "Jobs",
                    description: "Find your next career opportunity",
                    actions: job_actions,
                },
                DashboardSection {
                    tab: Tab::Payments,
                    title: payment_title,
                    description: "Manage your course purchases and receipts",
                    actions: vec![SectionAction::ViewPayments],
                },
            ],
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tab {
    Welcome,
    Courses,
    Jobs,
    Payments,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionAction {
    BrowseCourses,
    AddCourse,
    BrowseJobs,
    PostJob,
    ViewPayments,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardSection {
    pub tab: Tab,
    pub title: &'static str,
    pub description: &'static str,
    pub actions: Vec<SectionAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dashboard {
    pub role: Role,
    pub headline: &'static str,
    pub tabs: Vec<Tab>,
    pub sections: Vec<DashboardSection>,
}

/// Authenticated caller as resolved by the session provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    pub email: String,
    pub role: Role,
}

impl Session {
    pub fn owns(&self, owner: &UserId) -> bool {
        &self.user_id == owner
    }
}

#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        if self.email.trim().is_empty() {
            return Err(SessionError::Validation("email is required"));
        }
        if self.password.is_empty() {
            return Err(SessionError::Validation("password is required"));
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Bearer token plus the session it resolves to.
#[derive(Debug, Clone, Serialize)]
pub struct SessionGrant {
    pub token: String,
    pub session: Session,
}

/// Authentication boundary; the hosted auth service sits behind this trait.
pub trait SessionProvider: Send + Sync {
    fn sign_up(&self, credentials: Credentials, role: Role) -> Result<SessionGrant, SessionError>;
    fn sign_in(&self, credentials: Credentials) -> Result<SessionGrant, SessionError>;
    fn resolve(&self, token: &str) -> Result<Option<Session>, SessionError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("{0}")]
    Validation(&'static str),
    #[error("an account with this email already exists")]
    AlreadyRegistered,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("session provider unavailable: {0}")]
    Unavailable(String),
}
