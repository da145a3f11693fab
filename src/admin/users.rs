use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use super::{Actor, ChangeList, Fieldset, ModelAdmin, Payload, SiteActor, require};
use crate::AppState;
use crate::config::Admin;
use crate::crypto::PasswordSummary;
use crate::error::{AccountError, Result};
use crate::forms::{UserChangeForm, UserCreationForm};
use crate::user::{OrderBy, User, UserFilters, UserQuery};

const FIELDSETS: &[Fieldset] = &[
    Fieldset {
        name: None,
        fields: &["email", "password"],
    },
    Fieldset {
        name: Some("Personal info"),
        fields: &["username"],
    },
    Fieldset {
        name: Some("Permissions"),
        fields: &["is_staff", "is_active"],
    },
];

const ADD_FIELDSETS: &[Fieldset] = &[Fieldset {
    name: None,
    fields: &["email", "username", "password1", "password2"],
}];

/// Admin configuration of [`User`].
#[derive(Clone, Debug)]
pub struct UserAdmin {
    staff_group: String,
    list_per_page: usize,
}

impl UserAdmin {
    /// Create a new [`UserAdmin`].
    pub fn new(config: &Admin) -> Self {
        Self {
            staff_group: config.staff_group.clone(),
            list_per_page: config.list_per_page.max(1),
        }
    }

    /// Fieldsets of the creation page.
    pub fn add_fieldsets(&self) -> &'static [Fieldset] {
        ADD_FIELDSETS
    }

    /// Translate change list parameters into a [`UserQuery`].
    ///
    /// Unknown or non-displayed ordering fields are ignored.
    pub fn query(&self, params: &UserListParams) -> UserQuery {
        let requested = params
            .o
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .filter_map(|term| match term.parse::<OrderBy>() {
                Ok(order) if self.list_display().contains(&order.field.column()) => Some(order),
                _ => {
                    tracing::debug!(term, "ignored ordering");
                    None
                },
            })
            .collect::<Vec<_>>();
        let ordering = if requested.is_empty() {
            self.ordering()
                .iter()
                .filter_map(|term| term.parse().ok())
                .collect()
        } else {
            requested
        };

        UserQuery {
            search: params.q.clone(),
            filters: UserFilters {
                username: params.username.clone(),
                is_staff: params.is_staff,
                is_admin: params.is_admin,
                is_active: params.is_active,
                joined_year: params.year,
                joined_month: params.year.and(params.month),
            },
            ordering,
            limit: Some(self.list_per_page),
            offset: (params.page() - 1).saturating_mul(self.list_per_page),
        }
    }
}

impl ModelAdmin for UserAdmin {
    fn model_name(&self) -> &'static str {
        "user"
    }

    fn list_display(&self) -> &'static [&'static str] {
        &[
            "email",
            "username",
            "is_admin",
            "is_staff",
            "is_active",
            "date_joined",
            "last_login",
        ]
    }

    fn list_filter(&self) -> &'static [&'static str] {
        &["username", "is_staff", "is_admin", "is_active"]
    }

    fn search_fields(&self) -> &'static [&'static str] {
        &["username", "email"]
    }

    fn readonly_fields(&self) -> &'static [&'static str] {
        &["id", "date_joined", "last_login"]
    }

    fn ordering(&self) -> &'static [&'static str] {
        &["email"]
    }

    fn list_per_page(&self) -> usize {
        self.list_per_page
    }

    fn fieldsets(&self) -> &'static [Fieldset] {
        FIELDSETS
    }

    fn date_hierarchy(&self) -> Option<&'static str> {
        Some("date_joined")
    }

    fn has_add_permission(&self, _actor: &Actor) -> bool {
        true
    }

    // Denies members of the staff group, not users flagged `is_staff`.
    fn has_change_permission(&self, actor: &Actor) -> bool {
        !actor.in_group(&self.staff_group)
    }
}

/// Change list query string.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct UserListParams {
    /// Search term.
    pub q: Option<String>,
    pub username: Option<String>,
    pub is_staff: Option<bool>,
    pub is_admin: Option<bool>,
    pub is_active: Option<bool>,
    pub year: Option<i32>,
    pub month: Option<u32>,
    /// Comma separated ordering, `-` prefix for descending.
    pub o: Option<String>,
    /// Page number, starting at 1.
    pub p: Option<usize>,
}

impl UserListParams {
    fn page(&self) -> usize {
        self.p.unwrap_or(1).max(1)
    }
}

/// Detail page of a user.
#[derive(Debug, Serialize)]
pub struct UserDetail {
    pub user: User,
    pub profile_image_url: String,
    /// `None` when the user has no usable password.
    pub password: Option<PasswordSummary>,
    pub fieldsets: &'static [Fieldset],
    pub readonly_fields: &'static [&'static str],
    pub can_change: bool,
    pub can_delete: bool,
}

fn detail(state: &AppState, admin: &UserAdmin, actor: &Actor, user: User) -> UserDetail {
    UserDetail {
        profile_image_url: user.profile_image_path(&state.config.media),
        password: UserChangeForm::password_summary(&user),
        fieldsets: admin.fieldsets(),
        readonly_fields: admin.readonly_fields(),
        can_change: admin.has_change_permission(actor),
        can_delete: admin.has_delete_permission(actor),
        user,
    }
}

async fn find(state: &AppState, id: i64) -> Result<User> {
    state.users.find_by_id(id).await?.ok_or(AccountError::NotFound)
}

/// `GET /users`.
pub async fn list(
    State(state): State<AppState>,
    SiteActor(actor): SiteActor,
    Query(params): Query<UserListParams>,
) -> Result<Json<ChangeList>> {
    let admin = UserAdmin::new(&state.config.admin);
    require(admin.has_view_permission(&actor))?;

    let query = admin.query(&params);
    let count = state.users.count(&query).await?;
    let users = state.users.list(&query).await?;

    Ok(Json(ChangeList::new(&admin, &users, count, params.page())?))
}

/// `POST /users`.
pub async fn create(
    State(state): State<AppState>,
    SiteActor(actor): SiteActor,
    Payload(form): Payload<UserCreationForm>,
) -> Result<(StatusCode, Json<User>)> {
    let admin = UserAdmin::new(&state.config.admin);
    require(admin.has_add_permission(&actor))?;

    let user = form.save(&state.manager).await?;
    tracing::info!(actor = actor.user.id, user_id = user.id, "user added from admin");

    Ok((StatusCode::CREATED, Json(user)))
}

/// `GET /users/{id}`.
pub async fn get(
    State(state): State<AppState>,
    SiteActor(actor): SiteActor,
    Path(id): Path<i64>,
) -> Result<Json<UserDetail>> {
    let admin = UserAdmin::new(&state.config.admin);
    require(admin.has_view_permission(&actor))?;

    let user = find(&state, id).await?;
    Ok(Json(detail(&state, &admin, &actor, user)))
}

/// `PATCH /users/{id}`.
pub async fn update(
    State(state): State<AppState>,
    SiteActor(actor): SiteActor,
    Path(id): Path<i64>,
    Payload(form): Payload<UserChangeForm>,
) -> Result<Json<UserDetail>> {
    let admin = UserAdmin::new(&state.config.admin);
    require(admin.has_change_permission(&actor))?;

    let user = find(&state, id).await?;
    let user = form.save(&user, state.users.as_ref()).await?;

    Ok(Json(detail(&state, &admin, &actor, user)))
}

/// `PUT /users/{id}/image`, raw image bytes as body.
pub async fn upload_image(
    State(state): State<AppState>,
    SiteActor(actor): SiteActor,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<Json<UserDetail>> {
    let admin = UserAdmin::new(&state.config.admin);
    require(admin.has_change_permission(&actor))?;

    let mut user = find(&state, id).await?;
    let image = state.media.store_profile_image(&body).await?;
    user.profile_image = Some(image.reference.clone());
    if let Err(err) = state.users.update(&user).await {
        if let Err(cleanup) = state.media.discard(&image).await {
            tracing::warn!(
                error = %cleanup,
                reference = %image.reference,
                "orphaned upload left behind"
            );
        }
        return Err(err);
    }

    Ok(Json(detail(&state, &admin, &actor, user)))
}
