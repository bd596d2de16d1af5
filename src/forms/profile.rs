//! Profile editor: the `users` row of the signed-in identity.

use log::{info, warn};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::forms::{require, FieldError, ValidationErrors};
use crate::gateway::{AuthGateway, DataGateway, FileGateway, IdentityChanges};
use crate::models::{Identity, Profile, ProfileUpsert};
use crate::notify::Notifier;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileForm {
    pub name: String,
    pub email: String,
    pub bio: String,
    pub avatar_url: Option<String>,
}

impl From<Profile> for ProfileForm {
    fn from(profile: Profile) -> Self {
        Self {
            name: profile.name.unwrap_or_default(),
            email: profile.email.unwrap_or_default(),
            bio: profile.bio.unwrap_or_default(),
            avatar_url: profile.avatar_url,
        }
    }
}

impl ProfileForm {
    pub fn validate(&self) -> std::result::Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();

        require(&mut errors, "name", &self.name);
        if require(&mut errors, "email", &self.email) && !self.email.contains('@') {
            errors.push(FieldError::InvalidEmail);
        }

        errors.into_result()
    }

    fn to_upsert(&self, user_id: &str) -> ProfileUpsert {
        ProfileUpsert {
            id: user_id.to_string(),
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            bio: self.bio.trim().to_string(),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

pub struct ProfileEditor {
    data: Arc<DataGateway>,
    files: Arc<FileGateway>,
    auth: Arc<AuthGateway>,
    notifier: Notifier,
    identity: Identity,
}

impl ProfileEditor {
    pub fn new(
        data: Arc<DataGateway>,
        files: Arc<FileGateway>,
        auth: Arc<AuthGateway>,
        notifier: Notifier,
        identity: Identity,
    ) -> Self {
        Self {
            data,
            files,
            auth,
            notifier,
            identity,
        }
    }

    /// The stored profile as form values; empty fields when there is no row yet.
    pub async fn load(&self) -> Result<ProfileForm> {
        match self.data.get_profile(&self.identity.id).await {
            Ok(Some(profile)) => Ok(ProfileForm::from(profile)),
            Ok(None) => Ok(ProfileForm::default()),
            Err(err) => {
                self.notifier.error(err.user_message());
                Err(err)
            }
        }
    }

    /// Store the profile row and copy the display name into the identity.
    ///
    /// Saving the same form twice leaves the same row behind.
    pub async fn save(&self, form: &ProfileForm) -> Result<Profile> {
        if let Err(errors) = form.validate() {
            self.notifier.error(errors.to_string());
            return Err(Error::Validation(errors));
        }

        let profile = match self.data.upsert_profile(&form.to_upsert(&self.identity.id)).await {
            Ok(profile) => profile,
            Err(err) => {
                self.notifier.error(err.user_message());
                return Err(err);
            }
        };
        info!("profile {} saved", profile.id);

        let changes = IdentityChanges {
            display_name: Some(form.name.trim().to_string()),
            avatar_url: form.avatar_url.clone(),
            data: None,
        };
        if let Err(err) = self.auth.update_profile(&changes).await {
            warn!("profile saved but identity update failed: {}", err);
            self.notifier.error(err.user_message());
            return Err(err);
        }

        self.notifier.success("Profile updated");
        Ok(profile)
    }

    /// Upload a new picture and point the form at it. Call [`save`] to keep it.
    ///
    /// [`save`]: ProfileEditor::save
    pub async fn upload_avatar(
        &self,
        form: &mut ProfileForm,
        file_name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String> {
        match self
            .files
            .upload_avatar(&self.identity.id, file_name, bytes, content_type)
            .await
        {
            Ok(url) => {
                form.avatar_url = Some(url.clone());
                self.notifier.success("Avatar uploaded");
                Ok(url)
            }
            Err(err) => {
                self.notifier.error(err.user_message());
                Err(err)
            }
        }
    }
}
