use serde::Deserialize;
use validator::Validate;

use super::{Checked, collect, error, failed, field_rules, finish};
use crate::crypto::PasswordSummary;
use crate::error::Result;
use crate::user::{User, UserManager, UserRepository};

fn already_exists(label: &str) -> String {
    format!("User with this {label} already exists.")
}

fn label(field: &str) -> &'static str {
    match field {
        "email" => "Email",
        "username" => "Username",
        _ => "value",
    }
}

/// Form editing an existing user. Absent fields are left untouched.
///
/// `password` is accepted but never applied: the stored hash is only shown
/// through [`UserChangeForm::password_summary`].
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct UserChangeForm {
    #[validate(
        email(message = "Enter a valid email address."),
        length(max = 255, message = "Email must be at most 255 characters long.")
    )]
    pub email: Option<String>,
    #[validate(length(
        min = 1,
        max = 255,
        message = "Username must be 1 to 255 characters long."
    ))]
    pub username: Option<String>,
    pub password: Option<String>,
    pub is_active: Option<bool>,
    pub is_staff: Option<bool>,
    pub is_admin: Option<bool>,
    #[validate(length(max = 500, message = "Biography must be at most 500 characters long."))]
    pub bio: Option<String>,
    pub hide_email: Option<bool>,
    pub profile_image: Option<String>,
}

impl UserChangeForm {
    /// The stored hash, whatever was submitted.
    pub fn clean_password(&self, user: &User) -> String {
        user.password.clone()
    }

    /// Read-only description of the stored hash.
    pub fn password_summary(user: &User) -> Option<PasswordSummary> {
        user.password_summary()
    }

    async fn check_email(
        &self,
        user: &User,
        repo: &dyn UserRepository,
    ) -> Result<Checked<Option<String>>> {
        let Some(email) = self.email.as_deref() else {
            return Ok(Ok(None));
        };
        let email = UserManager::normalize_email(email);

        Ok(match repo.find_by_email(&email).await? {
            Some(other) if other.id != user.id => {
                Err(error("unique", already_exists(label("email"))))
            },
            _ => Ok(Some(email)),
        })
    }

    async fn check_username(
        &self,
        user: &User,
        repo: &dyn UserRepository,
    ) -> Result<Checked<Option<String>>> {
        let Some(username) = self.username.as_deref() else {
            return Ok(Ok(None));
        };

        Ok(match repo.find_by_username(username).await? {
            Some(other) if other.id != user.id => {
                Err(error("unique", already_exists(label("username"))))
            },
            _ => Ok(Some(username.to_owned())),
        })
    }

    /// Validate and return `user` with the submitted changes applied.
    ///
    /// The edited user itself is excluded from uniqueness checks.
    pub async fn clean(&self, user: &User, repo: &dyn UserRepository) -> Result<User> {
        let mut errors = field_rules(self);

        let email = if failed(&errors, "email") {
            None
        } else {
            collect(&mut errors, "email", self.check_email(user, repo).await?)
        };
        let username = if failed(&errors, "username") {
            None
        } else {
            collect(&mut errors, "username", self.check_username(user, repo).await?)
        };
        finish(errors)?;

        let mut changed = user.clone();
        if let Some(email) = email.flatten() {
            changed.email = email;
        }
        if let Some(username) = username.flatten() {
            changed.username = Some(username);
        }
        changed.password = self.clean_password(user);
        if let Some(is_active) = self.is_active {
            changed.is_active = is_active;
        }
        if let Some(is_staff) = self.is_staff {
            changed.is_staff = is_staff;
        }
        if let Some(is_admin) = self.is_admin {
            changed.is_admin = is_admin;
        }
        if let Some(bio) = &self.bio {
            changed.bio = bio.clone();
        }
        if let Some(hide_email) = self.hide_email {
            changed.hide_email = hide_email;
        }
        if let Some(profile_image) = &self.profile_image {
            changed.profile_image = Some(profile_image.clone()).filter(|image| !image.is_empty());
        }

        Ok(changed)
    }

    /// Clean and persist.
    pub async fn save(&self, user: &User, repo: &dyn UserRepository) -> Result<User> {
        let changed = self.clean(user, repo).await?;

        repo.update(&changed)
            .await
            .map_err(|err| err.duplicate_as_field(|field| already_exists(label(field))))?;
        tracing::info!(user_id = changed.id, "user changed");

        Ok(changed)
    }
}
