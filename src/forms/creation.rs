use serde::Deserialize;
use validator::Validate;

use super::{Checked, collect, error, failed, field_rules, finish, raise};
use crate::error::{AccountError, Result};
use crate::user::{NewUser, User, UserManager, UserRepository};

const REQUIRED: &str = "This field is required.";
const USERNAME_TAKEN: &str = "This username is already taken.";
const PASSWORD_MISMATCH: &str = "Passwords don't match";

fn email_in_use(email: &str) -> String {
    format!("Email {email} is already in use.")
}

/// Form creating a user with a repeated password.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct UserCreationForm {
    #[validate(
        email(message = "Enter a valid email address."),
        length(max = 255, message = "Email must be at most 255 characters long.")
    )]
    pub email: String,
    #[validate(length(
        min = 1,
        max = 255,
        message = "Username must be 1 to 255 characters long."
    ))]
    pub username: String,
    #[validate(length(min = 1, message = "This field is required."))]
    pub password1: String,
    #[validate(length(min = 1, message = "This field is required."))]
    pub password2: String,
}

/// Values of a valid [`UserCreationForm`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanedUser {
    pub email: String,
    pub username: String,
    pub password: String,
}

impl UserCreationForm {
    async fn check_username(&self, repo: &dyn UserRepository) -> Result<Checked<String>> {
        if self.username.trim().is_empty() {
            return Ok(Err(error("required", REQUIRED)));
        }
        let username = self.username.to_lowercase();

        Ok(match repo.find_by_username(&username).await? {
            Some(_) => Err(error("unique", USERNAME_TAKEN)),
            None => Ok(username),
        })
    }

    fn check_password2(&self) -> Checked<String> {
        if !self.password1.is_empty()
            && !self.password2.is_empty()
            && self.password1 != self.password2
        {
            return Err(error("password_mismatch", PASSWORD_MISMATCH));
        }

        Ok(self.password2.clone())
    }

    async fn check_email(&self, repo: &dyn UserRepository) -> Result<Checked<String>> {
        let email = UserManager::normalize_email(&self.email);

        Ok(match repo.find_by_email(&email).await? {
            Some(_) => Err(error("unique", email_in_use(&email))),
            None => Ok(email),
        })
    }

    /// Lowercased username, unless it is already taken.
    pub async fn clean_username(&self, repo: &dyn UserRepository) -> Result<String> {
        raise("username", self.check_username(repo).await?)
    }

    /// Confirmation password, unless it differs from the first one.
    pub fn clean_password2(&self) -> Result<String> {
        raise("password2", self.check_password2())
    }

    /// Lowercased email, unless it is already in use.
    pub async fn clean_email(&self, repo: &dyn UserRepository) -> Result<String> {
        raise("email", self.check_email(repo).await?)
    }

    /// Run field rules and every `clean_*` step, reporting all failures.
    ///
    /// A `clean_*` step is skipped when its field already failed.
    pub async fn clean(&self, repo: &dyn UserRepository) -> Result<CleanedUser> {
        let mut errors = field_rules(self);

        let email = if failed(&errors, "email") {
            None
        } else {
            collect(&mut errors, "email", self.check_email(repo).await?)
        };
        let username = if failed(&errors, "username") {
            None
        } else {
            collect(&mut errors, "username", self.check_username(repo).await?)
        };
        let password = if failed(&errors, "password2") {
            None
        } else {
            collect(&mut errors, "password2", self.check_password2())
        };

        let (Some(email), Some(username), Some(password)) = (email, username, password) else {
            return Err(AccountError::Validation(errors));
        };
        finish(errors)?;

        Ok(CleanedUser {
            email,
            username,
            password,
        })
    }

    /// Build the unsaved user, hashing the confirmation password.
    pub async fn instance(&self, manager: &UserManager) -> Result<NewUser> {
        let cleaned = self.clean(manager.repository().as_ref()).await?;

        manager.build(&cleaned.email, &cleaned.username, Some(&cleaned.password))
    }

    /// Clean, hash and persist.
    ///
    /// A concurrent insert of the same email or username is reported as the
    /// matching field error.
    pub async fn save(&self, manager: &UserManager) -> Result<User> {
        let new_user = self.instance(manager).await?;

        manager.save(&new_user, None).await.map_err(|err| {
            err.duplicate_as_field(|field| match field {
                "email" => email_in_use(&new_user.email),
                _ => USERNAME_TAKEN.to_owned(),
            })
        })
    }
}
