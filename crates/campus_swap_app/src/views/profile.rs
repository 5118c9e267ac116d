use std::sync::Arc;

use campus_swap_client::{ApiClient, ClientError, Profile, ProfileUpdate};

use super::LoadState;

pub const PROFILE_SAVED: &str = "Profile updated successfully!";

/// Profile screen with an edit mode. The draft has no email field.
#[derive(Debug)]
pub struct ProfileView {
    api: Arc<ApiClient>,
    state: LoadState<Profile>,
    draft: Option<ProfileUpdate>,
    message: Option<String>,
}

impl ProfileView {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self {
            api,
            state: LoadState::Loading,
            draft: None,
            message: None,
        }
    }

    pub async fn mount(&mut self) {
        self.state = LoadState::Loading;
        self.state = match self.api.get_profile().await {
            Ok(profile) => LoadState::Ready(profile),
            Err(e) => {
                tracing::error!(error = %e, "error fetching profile");
                LoadState::Error("Failed to load profile data".into())
            }
        };
    }

    pub fn state(&self) -> &LoadState<Profile> {
        &self.state
    }

    /// Success or failure line from the last save.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn is_editing(&self) -> bool {
        self.draft.is_some()
    }

    /// Enter edit mode with a draft copied from the loaded profile.
    pub fn edit(&mut self) -> Option<&mut ProfileUpdate> {
        let profile = self.state.data()?;
        self.message = None;
        Some(self.draft.insert(ProfileUpdate::from(profile)))
    }

    pub fn draft_mut(&mut self) -> Option<&mut ProfileUpdate> {
        self.draft.as_mut()
    }

    pub fn cancel(&mut self) {
        self.draft = None;
    }

    /// Send the draft. On success the saved profile replaces the loaded one
    /// and edit mode ends; on failure the draft is kept.
    pub async fn save(&mut self) -> Result<(), ClientError> {
        let Some(draft) = self.draft.as_ref() else {
            return Err(ClientError::validation("Nothing to save"));
        };
        if draft.name.trim().is_empty() {
            return Err(ClientError::validation("Name is required"));
        }
        match self.api.update_profile(draft).await {
            Ok(profile) => {
                self.draft = None;
                self.message = Some(PROFILE_SAVED.to_string());
                self.state = LoadState::Ready(profile);
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "error updating profile");
                self.message = Some(format!("Failed to update profile: {}", e));
                Err(e)
            }
        }
    }
}
