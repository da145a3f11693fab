use std::sync::Arc;

use chrono::Utc;

use crate::crypto::PasswordManager;
use crate::error::{AccountError, Result};
use crate::user::{NewUser, Roles, User, UserRepository};

const MISSING_EMAIL: &str = "Users must have an email address";
const MISSING_USERNAME: &str = "User must have a username";

/// Factory for [`User`].
///
/// Validates required identifiers, normalizes the email and hashes the
/// password before handing the user to the repository.
#[derive(Clone)]
pub struct UserManager {
    repo: Arc<dyn UserRepository>,
    crypto: Arc<PasswordManager>,
    default_profile_image: String,
}

impl std::fmt::Debug for UserManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserManager")
            .field("crypto", &self.crypto)
            .field("default_profile_image", &self.default_profile_image)
            .finish_non_exhaustive()
    }
}

impl UserManager {
    /// Create a new [`UserManager`].
    pub fn new(
        repo: Arc<dyn UserRepository>,
        crypto: Arc<PasswordManager>,
        default_profile_image: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            crypto,
            default_profile_image: default_profile_image.into(),
        }
    }

    /// Underlying repository.
    pub fn repository(&self) -> &Arc<dyn UserRepository> {
        &self.repo
    }

    /// Underlying password primitive.
    pub fn crypto(&self) -> &PasswordManager {
        &self.crypto
    }

    /// Trim and lowercase an email.
    pub fn normalize_email(email: &str) -> String {
        email.trim().to_lowercase()
    }

    /// Build an unsaved user with default roles.
    ///
    /// A `None` password stores an unusable one.
    pub fn build(&self, email: &str, username: &str, password: Option<&str>) -> Result<NewUser> {
        if email.trim().is_empty() {
            return Err(AccountError::MissingField(MISSING_EMAIL));
        }
        if username.trim().is_empty() {
            return Err(AccountError::MissingField(MISSING_USERNAME));
        }

        let password = match password {
            Some(raw) => self.crypto.hash_password(raw)?,
            None => self.crypto.unusable_password(),
        };

        Ok(NewUser::new(
            Self::normalize_email(email),
            Some(username.to_owned()),
            password,
            self.default_profile_image.clone(),
        ))
    }

    /// Create and save a user with the given email, username and password.
    pub async fn create_user(
        &self,
        email: &str,
        username: &str,
        password: Option<&str>,
    ) -> Result<User> {
        self.create(email, username, password, None).await
    }

    /// Create and save a staff user. It stays inactive.
    pub async fn create_staff_user(
        &self,
        email: &str,
        username: &str,
        password: Option<&str>,
    ) -> Result<User> {
        self.create(email, username, password, Some(Roles::staff()))
            .await
    }

    /// Create and save a superuser.
    pub async fn create_superuser(
        &self,
        email: &str,
        username: &str,
        password: Option<&str>,
    ) -> Result<User> {
        self.create(email, username, password, Some(Roles::superuser()))
            .await
    }

    async fn create(
        &self,
        email: &str,
        username: &str,
        password: Option<&str>,
        promote: Option<Roles>,
    ) -> Result<User> {
        let new_user = self.build(email, username, password)?;
        self.save(&new_user, promote).await
    }

    /// Persist an already built user, applying `promote` atomically.
    pub async fn save(&self, new_user: &NewUser, promote: Option<Roles>) -> Result<User> {
        let user = self.repo.insert(new_user, promote).await?;

        let kind = match promote {
            Some(roles) if roles.is_admin => "superuser",
            Some(_) => "staff",
            None => "user",
        };
        metrics::counter!("accounts_users_created_total", "kind" => kind).increment(1);
        tracing::info!(user_id = user.id, kind, "user created");

        Ok(user)
    }

    /// Hash `raw` into `user`. `None` makes the password unusable.
    ///
    /// The user is not saved.
    pub fn set_password(&self, user: &mut User, raw: Option<&str>) -> Result<()> {
        user.password = match raw {
            Some(raw) => self.crypto.hash_password(raw)?,
            None => self.crypto.unusable_password(),
        };
        Ok(())
    }

    /// Whether `raw` matches the stored hash.
    pub fn check_password(&self, user: &User, raw: &str) -> bool {
        self.crypto.verify_password(raw, &user.password)
    }

    /// Check credentials and stamp `last_login` on success.
    ///
    /// Unknown emails, wrong passwords and inactive users all yield `None`.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>> {
        let email = Self::normalize_email(email);

        let outcome = match self.repo.find_by_email(&email).await? {
            None => Err("unknown"),
            Some(user) if !self.check_password(&user, password) => Err("password"),
            Some(user) if !user.is_active => Err("inactive"),
            Some(user) => Ok(user),
        };

        match outcome {
            Ok(mut user) => {
                user.last_login = Some(Utc::now());
                self.repo.update(&user).await?;

                metrics::counter!("accounts_authentications_total", "outcome" => "success")
                    .increment(1);
                tracing::debug!(user_id = user.id, "user authenticated");

                Ok(Some(user))
            },
            Err(reason) => {
                metrics::counter!("accounts_authentications_total", "outcome" => reason)
                    .increment(1);
                tracing::debug!(reason, "authentication rejected");

                Ok(None)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_PROFILE_IMAGE;
    use crate::crypto::test_manager;
    use crate::database::memory::MemoryUserRepository;

    fn manager() -> (UserManager, Arc<MemoryUserRepository>) {
        let repo = Arc::new(MemoryUserRepository::default());
        let manager = UserManager::new(
            repo.clone(),
            Arc::new(test_manager()),
            DEFAULT_PROFILE_IMAGE,
        );
        (manager, repo)
    }

    #[tokio::test]
    async fn test_create_user() {
        let (manager, _) = manager();

        let user = manager
            .create_user("testuser@user.com", "username", Some("password"))
            .await
            .unwrap();

        assert_eq!(user.email, "testuser@user.com");
        assert_eq!(user.username.as_deref(), Some("username"));
        assert_ne!(user.password, "password");
        assert!(manager.check_password(&user, "password"));
        assert!(!user.is_active);
        assert!(!user.is_staff);
        assert!(!user.is_admin);
        assert!(user.hide_email);
        assert_eq!(user.profile_image.as_deref(), Some(DEFAULT_PROFILE_IMAGE));
    }

    #[tokio::test]
    async fn test_create_user_lowercases_email() {
        let (manager, repo) = manager();

        let user = manager
            .create_user(" TestUser@USER.com ", "UserName", Some("password"))
            .await
            .unwrap();

        assert_eq!(user.email, "testuser@user.com");
        assert_eq!(user.username.as_deref(), Some("UserName"));
        assert!(repo.find_by_email("testuser@user.com").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_create_user_requires_email_and_username() {
        let (manager, repo) = manager();

        let err = manager
            .create_user("", "username", Some("password"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Users must have an email address");

        let err = manager
            .create_user("testuser@user.com", "", Some("password"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "User must have a username");

        assert_eq!(repo.count(&Default::default()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_privileged_users_require_email_and_username() {
        let (manager, repo) = manager();

        for (email, username, message) in [
            ("", "admin", "Users must have an email address"),
            ("admin@user.com", "", "User must have a username"),
        ] {
            let err = manager
                .create_staff_user(email, username, Some("password"))
                .await
                .unwrap_err();
            assert_eq!(err.to_string(), message);

            let err = manager
                .create_superuser(email, username, Some("password"))
                .await
                .unwrap_err();
            assert_eq!(err.to_string(), message);
        }

        assert_eq!(repo.count(&Default::default()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_staff_user() {
        let (manager, _) = manager();

        let user = manager
            .create_staff_user("staff@user.com", "staff", Some("password"))
            .await
            .unwrap();

        assert!(user.is_staff);
        assert!(!user.is_active);
        assert!(!user.is_admin);
    }

    #[tokio::test]
    async fn test_create_superuser() {
        let (manager, repo) = manager();

        let user = manager
            .create_superuser("root@user.com", "root", Some("password"))
            .await
            .unwrap();

        assert!(user.is_admin && user.is_staff && user.is_active);
        let stored = repo.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.roles(), Roles::superuser());
    }

    #[tokio::test]
    async fn test_promotion_failure_leaves_no_user() {
        let (manager, repo) = manager();
        repo.fail_promotion(true);

        assert!(
            manager
                .create_superuser("root@user.com", "root", Some("password"))
                .await
                .is_err()
        );
        assert!(repo.find_by_email("root@user.com").await.unwrap().is_none());
        assert_eq!(repo.count(&Default::default()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let (manager, _) = manager();

        manager
            .create_user("a@user.com", "a", Some("password"))
            .await
            .unwrap();
        let err = manager
            .create_user("A@user.com", "b", Some("password"))
            .await
            .unwrap_err();

        assert!(matches!(err, AccountError::Duplicate { field: "email" }));
    }

    #[tokio::test]
    async fn test_unusable_password() {
        let (manager, _) = manager();

        let mut user = manager
            .create_user("a@user.com", "a", None)
            .await
            .unwrap();
        assert!(!user.has_usable_password());
        assert!(!manager.check_password(&user, ""));

        manager.set_password(&mut user, Some("secret")).unwrap();
        assert!(user.has_usable_password());
        assert!(manager.check_password(&user, "secret"));
    }

    #[tokio::test]
    async fn test_authenticate() {
        let (manager, repo) = manager();

        let user = manager
            .create_user("a@user.com", "a", Some("password"))
            .await
            .unwrap();
        // Inactive by default.
        assert!(manager.authenticate("a@user.com", "password").await.unwrap().is_none());

        let mut active = user.clone();
        active.is_active = true;
        repo.update(&active).await.unwrap();

        assert!(manager.authenticate("a@user.com", "wrong").await.unwrap().is_none());
        assert!(manager.authenticate("b@user.com", "password").await.unwrap().is_none());

        let logged = manager
            .authenticate("A@User.com", "password")
            .await
            .unwrap()
            .unwrap();
        assert!(logged.last_login.is_some());

        let stored = repo.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.last_login, logged.last_login);
    }
}
