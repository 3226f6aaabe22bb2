//! The signed-in user's session record.
//!
//! A `Session` is passed into each operation by value and the operation hands
//! back the next one. Only server responses move it forward; the profile
//! controller never edits the user record in place.

use shared::domain::UserRecord;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    current_user: Option<UserRecord>,
    loading: bool,
    error: Option<String>,
}

impl Session {
    pub fn signed_in(user: UserRecord) -> Self {
        Self {
            current_user: Some(user),
            loading: false,
            error: None,
        }
    }

    pub fn current_user(&self) -> Option<&UserRecord> {
        self.current_user.as_ref()
    }

    pub fn avatar(&self) -> Option<&str> {
        self.current_user.as_ref()?.avatar.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn request_started(self) -> Self {
        Self {
            loading: true,
            ..self
        }
    }

    pub fn user_replaced(self, user: UserRecord) -> Self {
        Self {
            current_user: Some(user),
            loading: false,
            error: None,
        }
    }

    pub fn user_cleared(self) -> Self {
        Self::default()
    }

    /// Keeps the user record as it was and records `message` for display.
    pub fn request_failed(self, message: impl Into<String>) -> Self {
        Self {
            loading: false,
            error: Some(message.into()),
            ..self
        }
    }
}
