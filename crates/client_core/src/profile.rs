use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use shared::protocol::UpdateUserRequest;
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    api::BackendApi,
    blob::{avatar_destination_key, progress_percent, BlobStore, SelectedFile, UploadEvent},
    config::DEFAULT_MAX_AVATAR_BYTES,
    error::{ClientError, ValidationError},
    session::Session,
};

pub const DEFAULT_AVATAR_URL: &str =
    "https://cdn.pixabay.com/photo/2015/10/05/22/37/blank-profile-picture-973460_1280.png";
pub const UPLOAD_FAILED_MESSAGE: &str = "Image upload failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileField {
    Username,
    Email,
    Password,
}

/// Profile edits not yet sent to the backend. Only touched fields are set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingProfile {
    username: Option<String>,
    email: Option<String>,
    password: Option<String>,
    avatar: Option<String>,
}

impl PendingProfile {
    pub fn get(&self, field: ProfileField) -> Option<&str> {
        match field {
            ProfileField::Username => self.username.as_deref(),
            ProfileField::Email => self.email.as_deref(),
            ProfileField::Password => self.password.as_deref(),
        }
    }

    pub fn avatar_reference(&self) -> Option<&str> {
        self.avatar.as_deref()
    }

    fn set(&mut self, field: ProfileField, value: String) {
        let slot = match field {
            ProfileField::Username => &mut self.username,
            ProfileField::Email => &mut self.email,
            ProfileField::Password => &mut self.password,
        };
        *slot = Some(value);
    }

    fn to_update_request(&self, fallback_avatar: Option<&str>) -> UpdateUserRequest {
        UpdateUserRequest {
            username: self.username.clone(),
            email: self.email.clone(),
            password: self.password.clone(),
            avatar: self
                .avatar
                .clone()
                .or_else(|| fallback_avatar.map(str::to_string)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadStatus {
    Idle,
    Uploading(u8),
    Uploaded,
    Failed(String),
}

/// Everything the profile form shows besides the session record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileFormState {
    pending: PendingProfile,
    progress: u8,
    upload_error: Option<String>,
    generation: u64,
    update_succeeded: bool,
}

impl ProfileFormState {
    pub fn pending(&self) -> &PendingProfile {
        &self.pending
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn upload_error(&self) -> Option<&str> {
        self.upload_error.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn update_succeeded(&self) -> bool {
        self.update_succeeded
    }

    pub fn upload_status(&self) -> UploadStatus {
        if let Some(message) = &self.upload_error {
            return UploadStatus::Failed(message.clone());
        }
        match self.progress {
            0 => UploadStatus::Idle,
            100 => UploadStatus::Uploaded,
            percent => UploadStatus::Uploading(percent),
        }
    }

    /// Pending avatar, else the session's, else the placeholder image.
    pub fn avatar_display_url<'a>(&'a self, session: &'a Session) -> &'a str {
        self.pending
            .avatar_reference()
            .or_else(|| session.avatar())
            .unwrap_or(DEFAULT_AVATAR_URL)
    }

    /// A new selection supersedes whatever upload was tracked before it.
    fn supersede(&mut self) -> u64 {
        self.generation += 1;
        self.progress = 0;
        self.upload_error = None;
        self.generation
    }

    /// Returns false when `generation` is no longer the tracked upload.
    fn apply_upload_event(&mut self, generation: u64, event: UploadEvent) -> bool {
        if generation != self.generation {
            return false;
        }
        match event {
            UploadEvent::Progress {
                bytes_transferred,
                total_bytes,
            } => {
                self.progress = progress_percent(bytes_transferred, total_bytes);
            }
            UploadEvent::Completed { url } => {
                self.progress = 100;
                self.pending.avatar = Some(url);
            }
            UploadEvent::Failed { reason } => {
                warn!(generation, %reason, "avatar upload failed");
                self.upload_error = Some(UPLOAD_FAILED_MESSAGE.to_string());
            }
        }
        true
    }
}

/// Tracks the spawned task driving one upload.
pub struct UploadHandle {
    generation: u64,
    task: JoinHandle<()>,
}

impl UploadHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits until the transfer has delivered its final event.
    pub async fn finished(self) {
        if let Err(err) = self.task.await {
            warn!(generation = self.generation, error = %err, "upload task aborted");
        }
    }
}

pub struct ProfileController {
    api: Arc<dyn BackendApi>,
    blob_store: Arc<dyn BlobStore>,
    max_avatar_bytes: u64,
    state: Arc<Mutex<ProfileFormState>>,
}

impl ProfileController {
    pub fn new(api: Arc<dyn BackendApi>, blob_store: Arc<dyn BlobStore>) -> Self {
        Self {
            api,
            blob_store,
            max_avatar_bytes: DEFAULT_MAX_AVATAR_BYTES,
            state: Arc::new(Mutex::new(ProfileFormState::default())),
        }
    }

    pub fn with_max_avatar_bytes(mut self, max_avatar_bytes: u64) -> Self {
        self.max_avatar_bytes = max_avatar_bytes;
        self
    }

    pub async fn snapshot(&self) -> ProfileFormState {
        self.state.lock().await.clone()
    }

    pub async fn set_field(&self, field: ProfileField, value: impl Into<String>) {
        self.state.lock().await.pending.set(field, value.into());
    }

    fn validate(&self, file: &SelectedFile) -> Result<(), ValidationError> {
        if file.size() > self.max_avatar_bytes {
            return Err(ValidationError::FileTooLarge {
                size: file.size(),
                limit: self.max_avatar_bytes,
            });
        }
        if !file.mime_type.starts_with("image/") {
            return Err(ValidationError::NotAnImage {
                mime_type: file.mime_type.clone(),
            });
        }
        Ok(())
    }

    /// Validates `file` and starts uploading it.
    ///
    /// Any earlier upload stops affecting the form from this point on, even
    /// when the new file is rejected. Rejected files never reach the blob store.
    pub async fn select_file(&self, file: SelectedFile) -> Result<UploadHandle, ValidationError> {
        let generation = {
            let mut state = self.state.lock().await;
            let generation = state.supersede();
            if let Err(err) = self.validate(&file) {
                info!(
                    generation,
                    file = %file.name,
                    size = file.size(),
                    mime_type = %file.mime_type,
                    "rejected avatar selection"
                );
                state.upload_error = Some(err.to_string());
                return Err(err);
            }
            generation
        };
        Ok(self.upload_file(generation, file))
    }

    fn upload_file(&self, generation: u64, file: SelectedFile) -> UploadHandle {
        let destination_key = avatar_destination_key(&file.name, Utc::now());
        info!(generation, file = %file.name, key = %destination_key, "starting avatar upload");
        let mut events = self.blob_store.upload(file, destination_key);
        let state = Arc::clone(&self.state);

        let task = tokio::spawn(async move {
            let mut saw_terminal = false;
            while let Some(event) = events.next().await {
                let terminal = event.is_terminal();
                if !state.lock().await.apply_upload_event(generation, event) {
                    debug!(generation, "dropping event from superseded upload");
                }
                if terminal {
                    saw_terminal = true;
                    break;
                }
            }
            if !saw_terminal {
                state.lock().await.apply_upload_event(
                    generation,
                    UploadEvent::Failed {
                        reason: "upload stream ended without a result".into(),
                    },
                );
            }
        });

        UploadHandle { generation, task }
    }

    /// Sends the pending edits and returns the next session.
    ///
    /// An unset avatar falls back to the session's current one. On success the
    /// pending avatar is dropped so the form shows the session record again.
    pub async fn submit(&self, session: Session) -> Session {
        let Some(user) = session.current_user().cloned() else {
            return session.request_failed(ClientError::NotSignedIn.user_message());
        };

        let request = {
            let mut state = self.state.lock().await;
            state.update_succeeded = false;
            state.pending.to_update_request(user.avatar.as_deref())
        };
        let session = session.request_started();

        match self.api.update_user(&user.id, &request).await {
            Ok(updated) => {
                info!(user_id = %updated.id, "profile updated");
                let mut state = self.state.lock().await;
                if state.pending.avatar == request.avatar {
                    state.pending.avatar = None;
                }
                state.update_succeeded = true;
                session.user_replaced(updated)
            }
            Err(err) => {
                warn!(user_id = %user.id, error = %err, "profile update failed");
                session.request_failed(err.user_message())
            }
        }
    }

    pub async fn delete_account(&self, session: Session) -> Session {
        let Some(user) = session.current_user().cloned() else {
            return session.request_failed(ClientError::NotSignedIn.user_message());
        };
        let session = session.request_started();
        match self.api.delete_user(&user.id).await {
            Ok(ack) => {
                info!(
                    user_id = %user.id,
                    reply = ack.message().unwrap_or_default(),
                    "account deleted"
                );
                self.reset_form().await;
                session.user_cleared()
            }
            Err(err) => {
                warn!(user_id = %user.id, error = %err, "account deletion failed");
                session.request_failed(err.user_message())
            }
        }
    }

    pub async fn sign_out(&self, session: Session) -> Session {
        let session = session.request_started();
        match self.api.sign_out().await {
            Ok(ack) => {
                info!(reply = ack.message().unwrap_or_default(), "signed out");
                self.reset_form().await;
                session.user_cleared()
            }
            Err(err) => {
                warn!(error = %err, "sign out failed");
                session.request_failed(err.user_message())
            }
        }
    }

    /// Drops pending edits while keeping the generation counter moving forward.
    async fn reset_form(&self) {
        let mut state = self.state.lock().await;
        let generation = state.supersede();
        *state = ProfileFormState {
            generation,
            ..ProfileFormState::default()
        };
    }
}

#[cfg(test)]
#[path = "tests/profile_tests.rs"]
mod tests;
