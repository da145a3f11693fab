use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;

use super::{ChangeList, ModelAdmin, Payload, SiteActor, require};
use crate::AppState;
use crate::error::{AccountError, Result};
use crate::forms::ProfileForm;
use crate::profile::Profile;

/// Admin configuration of [`Profile`], default registration.
#[derive(Clone, Debug)]
pub struct ProfileAdmin {
    list_per_page: usize,
}

impl ProfileAdmin {
    /// Create a new [`ProfileAdmin`].
    pub fn new(config: &crate::config::Admin) -> Self {
        Self {
            list_per_page: config.list_per_page.max(1),
        }
    }
}

impl ModelAdmin for ProfileAdmin {
    fn model_name(&self) -> &'static str {
        "profile"
    }

    fn list_display(&self) -> &'static [&'static str] {
        &["user_id", "first_name", "last_name"]
    }

    fn list_per_page(&self) -> usize {
        self.list_per_page
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProfileListParams {
    /// Page number, starting at 1.
    pub p: Option<usize>,
}

/// Profile form bound to its owner.
#[derive(Clone, Debug, Deserialize)]
pub struct ProfileCreation {
    pub user_id: i64,
    #[serde(flatten)]
    pub form: ProfileForm,
}

async fn find(state: &AppState, id: i64) -> Result<Profile> {
    state
        .profiles
        .find_by_id(id)
        .await?
        .ok_or(AccountError::NotFound)
}

/// `GET /profiles`.
pub async fn list(
    State(state): State<AppState>,
    SiteActor(actor): SiteActor,
    Query(params): Query<ProfileListParams>,
) -> Result<Json<ChangeList>> {
    let admin = ProfileAdmin::new(&state.config.admin);
    require(admin.has_view_permission(&actor))?;

    let page = params.p.unwrap_or(1).max(1);
    let offset = (page - 1).saturating_mul(admin.list_per_page());
    let count = state.profiles.count().await?;
    let profiles = state
        .profiles
        .list(Some(admin.list_per_page()), offset)
        .await?;

    Ok(Json(ChangeList::new(&admin, &profiles, count, page)?))
}

/// `POST /profiles`.
pub async fn create(
    State(state): State<AppState>,
    SiteActor(actor): SiteActor,
    Payload(body): Payload<ProfileCreation>,
) -> Result<(StatusCode, Json<Profile>)> {
    let admin = ProfileAdmin::new(&state.config.admin);
    require(admin.has_add_permission(&actor))?;

    if state.users.find_by_id(body.user_id).await?.is_none() {
        return Err(AccountError::NotFound);
    }

    let profile = body
        .form
        .create(body.user_id, state.profiles.as_ref(), &state.config.profile)
        .await?;

    Ok((StatusCode::CREATED, Json(profile)))
}

/// `GET /profiles/{id}`.
pub async fn get(
    State(state): State<AppState>,
    SiteActor(actor): SiteActor,
    Path(id): Path<i64>,
) -> Result<Json<Profile>> {
    let admin = ProfileAdmin::new(&state.config.admin);
    require(admin.has_view_permission(&actor))?;

    Ok(Json(find(&state, id).await?))
}

/// `PATCH /profiles/{id}`.
pub async fn update(
    State(state): State<AppState>,
    SiteActor(actor): SiteActor,
    Path(id): Path<i64>,
    Payload(form): Payload<ProfileForm>,
) -> Result<Json<Profile>> {
    let admin = ProfileAdmin::new(&state.config.admin);
    require(admin.has_change_permission(&actor))?;

    let profile = find(&state, id).await?;
    let profile = form
        .save(&profile, state.profiles.as_ref(), &state.config.profile)
        .await?;

    Ok(Json(profile))
}

/// `PUT /profiles/{id}/avatar`, raw image bytes as body.
pub async fn upload_avatar(
    State(state): State<AppState>,
    SiteActor(actor): SiteActor,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<Json<Profile>> {
    let admin = ProfileAdmin::new(&state.config.admin);
    require(admin.has_change_permission(&actor))?;

    let mut profile = find(&state, id).await?;
    let image = state.media.store_avatar(&body).await?;
    profile.details.avatar = Some(image.reference.clone());
    if let Err(err) = state.profiles.update(&profile).await {
        if let Err(cleanup) = state.media.discard(&image).await {
            tracing::warn!(
                error = %cleanup,
                reference = %image.reference,
                "orphaned upload left behind"
            );
        }
        return Err(err);
    }

    Ok(Json(profile))
}
