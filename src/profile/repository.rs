use async_trait::async_trait;

use crate::error::Result;
use crate::profile::{NewProfile, Profile};

/// Port for profile persistence.
///
/// A second profile for the same user is rejected with
/// [`crate::error::AccountError::Duplicate`] on `user`.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Profile>>;

    async fn find_by_user(&self, user_id: i64) -> Result<Option<Profile>>;

    async fn insert(&self, profile: &NewProfile) -> Result<Profile>;

    async fn update(&self, profile: &Profile) -> Result<()>;

    /// Profiles ordered by id.
    async fn list(&self, limit: Option<usize>, offset: usize) -> Result<Vec<Profile>>;

    async fn count(&self) -> Result<u64>;
}
