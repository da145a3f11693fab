//! In-process repositories.
//!
//! Uniqueness checks and writes happen under the same write lock, so the
//! constraints hold as they would in PostgreSQL.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{AccountError, Result};
use crate::profile::{NewProfile, Profile, ProfileRepository};
use crate::user::{NewUser, Roles, User, UserQuery, UserRepository};

#[derive(Debug)]
struct Table<T> {
    rows: BTreeMap<i64, T>,
    last_id: i64,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            last_id: 0,
        }
    }
}

impl<T> Table<T> {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }
}

/// In-memory user repository.
#[derive(Debug, Default)]
pub struct MemoryUserRepository {
    users: RwLock<Table<User>>,
    fail_promotion: AtomicBool,
}

impl MemoryUserRepository {
    /// Make the role promotion of the next inserts fail.
    #[cfg(test)]
    pub(crate) fn fail_promotion(&self, fail: bool) {
        self.fail_promotion.store(fail, Ordering::SeqCst);
    }
}

/// First unique field of `email`/`username` already used by another user.
fn conflict(
    table: &Table<User>,
    id: Option<i64>,
    email: &str,
    username: Option<&str>,
) -> Option<&'static str> {
    let others = || table.rows.values().filter(move |user| Some(user.id) != id);

    if others().any(|user| user.email == email) {
        return Some("email");
    }
    if let Some(username) = username {
        if others().any(|user| user.username.as_deref() == Some(username)) {
            return Some("username");
        }
    }
    None
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>> {
        Ok(self.users.read().await.rows.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .rows
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .rows
            .values()
            .find(|user| user.username.as_deref() == Some(username))
            .cloned())
    }

    async fn insert(&self, user: &NewUser, promote: Option<Roles>) -> Result<User> {
        let mut table = self.users.write().await;

        if let Some(field) = conflict(&table, None, &user.email, user.username.as_deref()) {
            return Err(AccountError::Duplicate { field });
        }

        let mut created = user.clone().into_user(table.last_id + 1);
        if let Some(roles) = promote {
            if self.fail_promotion.load(Ordering::SeqCst) {
                return Err(AccountError::Internal {
                    details: "role promotion did not apply".into(),
                });
            }
            created.set_roles(roles);
        }

        let id = table.next_id();
        table.rows.insert(id, created.clone());

        Ok(created)
    }

    async fn update(&self, user: &User) -> Result<()> {
        let mut table = self.users.write().await;

        if !table.rows.contains_key(&user.id) {
            return Err(AccountError::NotFound);
        }
        if let Some(field) = conflict(&table, Some(user.id), &user.email, user.username.as_deref())
        {
            return Err(AccountError::Duplicate { field });
        }

        let mut stored = user.clone();
        if let Some(previous) = table.rows.get(&user.id) {
            stored.date_joined = previous.date_joined;
        }
        table.rows.insert(user.id, stored);

        Ok(())
    }

    async fn list(&self, query: &UserQuery) -> Result<Vec<User>> {
        let table = self.users.read().await;

        let mut users = table
            .rows
            .values()
            .filter(|user| query.matches(user))
            .cloned()
            .collect::<Vec<_>>();
        query.sort(&mut users);

        let users = users.into_iter().skip(query.offset);
        Ok(match query.limit {
            Some(limit) => users.take(limit).collect(),
            None => users.collect(),
        })
    }

    async fn count(&self, query: &UserQuery) -> Result<u64> {
        let table = self.users.read().await;
        Ok(table.rows.values().filter(|user| query.matches(user)).count() as u64)
    }
}

/// In-memory profile repository.
#[derive(Debug, Default)]
pub struct MemoryProfileRepository {
    profiles: RwLock<Table<Profile>>,
}

#[async_trait]
impl ProfileRepository for MemoryProfileRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Profile>> {
        Ok(self.profiles.read().await.rows.get(&id).cloned())
    }

    async fn find_by_user(&self, user_id: i64) -> Result<Option<Profile>> {
        Ok(self
            .profiles
            .read()
            .await
            .rows
            .values()
            .find(|profile| profile.user_id == user_id)
            .cloned())
    }

    async fn insert(&self, profile: &NewProfile) -> Result<Profile> {
        let mut table = self.profiles.write().await;

        if table.rows.values().any(|p| p.user_id == profile.user_id) {
            return Err(AccountError::Duplicate { field: "user" });
        }

        let id = table.next_id();
        let created = profile.clone().into_profile(id);
        table.rows.insert(id, created.clone());

        Ok(created)
    }

    async fn update(&self, profile: &Profile) -> Result<()> {
        let mut table = self.profiles.write().await;

        match table.rows.get_mut(&profile.id) {
            // Ownership never changes.
            Some(stored) => {
                stored.details = profile.details.clone();
                Ok(())
            },
            None => Err(AccountError::NotFound),
        }
    }

    async fn list(&self, limit: Option<usize>, offset: usize) -> Result<Vec<Profile>> {
        let table = self.profiles.read().await;

        let profiles = table.rows.values().skip(offset).cloned();
        Ok(match limit {
            Some(limit) => profiles.take(limit).collect(),
            None => profiles.collect(),
        })
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.profiles.read().await.rows.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileDetails;
    use crate::user::{OrderBy, UserField};

    fn new_user(email: &str, username: &str) -> NewUser {
        NewUser::new(email, Some(username.into()), "hash", "default.png")
    }

    #[tokio::test]
    async fn test_insert_assigns_ids() {
        let repo = MemoryUserRepository::default();

        let a = repo.insert(&new_user("a@x.com", "a"), None).await.unwrap();
        let b = repo.insert(&new_user("b@x.com", "b"), None).await.unwrap();

        assert_eq!((a.id, b.id), (1, 2));
        assert_eq!(repo.find_by_username("b").await.unwrap(), Some(b));
        assert!(repo.find_by_username("B").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unique_constraints() {
        let repo = MemoryUserRepository::default();
        repo.insert(&new_user("a@x.com", "a"), None).await.unwrap();

        let err = repo.insert(&new_user("a@x.com", "b"), None).await.unwrap_err();
        assert!(matches!(err, AccountError::Duplicate { field: "email" }));

        let err = repo.insert(&new_user("b@x.com", "a"), None).await.unwrap_err();
        assert!(matches!(err, AccountError::Duplicate { field: "username" }));

        // Missing usernames never collide.
        let mut first = new_user("c@x.com", "c");
        first.username = None;
        let mut second = new_user("d@x.com", "d");
        second.username = None;
        repo.insert(&first, None).await.unwrap();
        repo.insert(&second, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_excludes_self() {
        let repo = MemoryUserRepository::default();
        let mut a = repo.insert(&new_user("a@x.com", "a"), None).await.unwrap();
        let b = repo.insert(&new_user("b@x.com", "b"), None).await.unwrap();

        a.bio = "hello".into();
        repo.update(&a).await.unwrap();
        assert_eq!(repo.find_by_id(a.id).await.unwrap().unwrap().bio, "hello");

        a.email = b.email.clone();
        assert!(matches!(
            repo.update(&a).await,
            Err(AccountError::Duplicate { field: "email" })
        ));

        let mut ghost = b.clone();
        ghost.id = 42;
        assert!(matches!(repo.update(&ghost).await, Err(AccountError::NotFound)));
    }

    #[tokio::test]
    async fn test_list_paginates_after_sorting() {
        let repo = MemoryUserRepository::default();
        for name in ["d", "b", "c", "a"] {
            repo.insert(&new_user(&format!("{name}@x.com"), name), None)
                .await
                .unwrap();
        }

        let query = UserQuery {
            ordering: vec![OrderBy::asc(UserField::Email)],
            limit: Some(2),
            offset: 1,
            ..Default::default()
        };
        let page = repo.list(&query).await.unwrap();
        let emails = page.iter().map(|u| u.email.as_str()).collect::<Vec<_>>();

        assert_eq!(emails, ["b@x.com", "c@x.com"]);
        assert_eq!(repo.count(&query).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_one_profile_per_user() {
        let repo = MemoryProfileRepository::default();
        let profile = NewProfile {
            user_id: 1,
            details: ProfileDetails::default(),
        };

        let created = repo.insert(&profile).await.unwrap();
        assert_eq!(repo.find_by_user(1).await.unwrap(), Some(created));

        let err = repo.insert(&profile).await.unwrap_err();
        assert!(matches!(err, AccountError::Duplicate { field: "user" }));
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_profile_update_keeps_owner() {
        let repo = MemoryProfileRepository::default();
        let mut profile = repo
            .insert(&NewProfile {
                user_id: 1,
                details: ProfileDetails::default(),
            })
            .await
            .unwrap();

        profile.user_id = 2;
        profile.details.first_name = "Ada".into();
        repo.update(&profile).await.unwrap();

        let stored = repo.find_by_id(profile.id).await.unwrap().unwrap();
        assert_eq!(stored.user_id, 1);
        assert_eq!(stored.details.first_name, "Ada");
    }
}
