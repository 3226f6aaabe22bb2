use shared::error::ServerRejection;
use thiserror::Error;

pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong, please try again.";
pub const NOT_SIGNED_IN_MESSAGE: &str = "You must be signed in to do that.";

/// Local checks a selected avatar must pass before any upload starts.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("File size should be less than {}", size_limit_text(.limit))]
    FileTooLarge { size: u64, limit: u64 },
    #[error("Please upload an image file")]
    NotAnImage { mime_type: String },
}

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;

/// Whole MB or KB when the limit divides evenly, one decimal place otherwise.
fn size_limit_text(limit: &u64) -> String {
    let limit = *limit;
    if limit >= MIB {
        if limit % MIB == 0 {
            format!("{}MB", limit / MIB)
        } else {
            format!("{:.1}MB", limit as f64 / MIB as f64)
        }
    } else if limit >= KIB {
        if limit % KIB == 0 {
            format!("{}KB", limit / KIB)
        } else {
            format!("{:.1}KB", limit as f64 / KIB as f64)
        }
    } else {
        format!("{limit} bytes")
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error(transparent)]
    Rejected(#[from] ServerRejection),
    #[error("unexpected response payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("not signed in")]
    NotSignedIn,
}

impl ClientError {
    /// Text shown to the user. Server rejections are passed through verbatim.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(err) => err.to_string(),
            Self::Rejected(rejection) => rejection.message.clone(),
            Self::Transport(_) | Self::Decode(_) => GENERIC_FAILURE_MESSAGE.to_string(),
            Self::NotSignedIn => NOT_SIGNED_IN_MESSAGE.to_string(),
        }
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}
