//! User entity, role flags and the factory that creates them.

mod manager;
mod repository;

pub use manager::*;
pub use repository::*;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Media;
use crate::crypto::{self, PasswordSummary};

/// User as saved on database.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: Option<String>,
    #[serde(skip)]
    pub password: String,
    /// Can log in.
    pub is_active: bool,
    /// Staff user, not a superuser.
    pub is_staff: bool,
    /// Superuser.
    pub is_admin: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub profile_image: Option<String>,
    pub bio: String,
    pub hide_email: bool,
}

impl User {
    /// Maximum length of `email` and `username`.
    pub const MAX_IDENTIFIER_LENGTH: usize = 255;
    /// Maximum length of `bio`, in characters.
    pub const MAX_BIO_LENGTH: usize = 500;

    /// Stored email, as normalized at creation.
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Every permission is granted to every user.
    pub fn has_perm(&self, _perm: &str) -> bool {
        true
    }

    /// Every application is visible to every user.
    pub fn has_module_perms(&self, _app_label: &str) -> bool {
        true
    }

    /// Public path of the profile image, falling back to the placeholder.
    pub fn profile_image_path(&self, media: &Media) -> String {
        let image = self
            .profile_image
            .as_deref()
            .filter(|image| !image.is_empty())
            .unwrap_or(&media.default_profile_image);

        format!("{}{}", media.url, image)
    }

    /// Current role flags.
    pub fn roles(&self) -> Roles {
        Roles {
            is_active: self.is_active,
            is_staff: self.is_staff,
            is_admin: self.is_admin,
        }
    }

    /// Overwrite role flags.
    pub fn set_roles(&mut self, roles: Roles) {
        self.is_active = roles.is_active;
        self.is_staff = roles.is_staff;
        self.is_admin = roles.is_admin;
    }

    /// Whether the stored password can ever match.
    pub fn has_usable_password(&self) -> bool {
        crypto::is_usable(&self.password)
    }

    /// Read-only description of the stored hash.
    pub fn password_summary(&self) -> Option<PasswordSummary> {
        crypto::summarize(&self.password)
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.username.as_deref().unwrap_or_default())
    }
}

/// Role flags. Their combination defines the access tier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roles {
    pub is_active: bool,
    pub is_staff: bool,
    pub is_admin: bool,
}

impl Roles {
    /// Elevated, non-superuser access. Still inactive.
    pub const fn staff() -> Self {
        Self {
            is_active: false,
            is_staff: true,
            is_admin: false,
        }
    }

    /// Every flag set.
    pub const fn superuser() -> Self {
        Self {
            is_active: true,
            is_staff: true,
            is_admin: true,
        }
    }
}

/// User not persisted yet. Password is already hashed.
#[derive(Clone, Debug, PartialEq)]
pub struct NewUser {
    pub email: String,
    pub username: Option<String>,
    pub password: String,
    pub roles: Roles,
    pub date_joined: DateTime<Utc>,
    pub profile_image: Option<String>,
    pub bio: String,
    pub hide_email: bool,
}

impl NewUser {
    /// Create a [`NewUser`] with default flags.
    pub fn new(
        email: impl Into<String>,
        username: Option<String>,
        password: impl Into<String>,
        profile_image: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            username,
            password: password.into(),
            roles: Roles::default(),
            date_joined: Utc::now(),
            profile_image: Some(profile_image.into()),
            bio: String::new(),
            hide_email: true,
        }
    }

    /// Attach the storage identifier.
    pub fn into_user(self, id: i64) -> User {
        User {
            id,
            email: self.email,
            username: self.username,
            password: self.password,
            is_active: self.roles.is_active,
            is_staff: self.roles.is_staff,
            is_admin: self.roles.is_admin,
            date_joined: self.date_joined,
            last_login: None,
            profile_image: self.profile_image,
            bio: self.bio,
            hide_email: self.hide_email,
        }
    }
}
