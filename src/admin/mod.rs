//! Administrative surface: model configuration, access gate and JSON router.
//!
//! The host application authenticates requests and inserts the acting
//! [`Actor`] as a request extension before they reach [`router`].

mod profiles;
mod router;
mod users;

pub use profiles::ProfileAdmin;
pub use router::router;
pub use users::{UserAdmin, UserListParams};

use axum::extract::{FromRequest, FromRequestParts};
use axum::http::request::Parts;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{AccountError, Result};
use crate::user::User;

/// User acting on the admin, with its group names.
#[derive(Clone, Debug)]
pub struct Actor {
    pub user: User,
    pub groups: Vec<String>,
}

impl Actor {
    /// Create a new [`Actor`].
    pub fn new(user: User, groups: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            user,
            groups: groups.into_iter().map(Into::into).collect(),
        }
    }

    /// Membership test, by exact group name.
    pub fn in_group(&self, name: &str) -> bool {
        self.groups.iter().any(|group| group == name)
    }
}

/// Admin site gate: only active staff may use the admin at all.
pub fn has_permission(actor: &Actor) -> bool {
    actor.user.is_active && actor.user.is_staff
}

/// [`Actor`] extractor that passed the site gate.
///
/// Rejects with `401` when no actor was inserted and `403` when the site
/// gate denies it.
#[derive(Clone, Debug)]
pub struct SiteActor(pub Actor);

impl<S: Send + Sync> FromRequestParts<S> for SiteActor {
    type Rejection = AccountError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let actor = parts
            .extensions
            .get::<Actor>()
            .cloned()
            .ok_or(AccountError::Unauthorized)?;

        if !has_permission(&actor) {
            tracing::warn!(user_id = actor.user.id, "admin site access denied");
            return Err(AccountError::Forbidden);
        }

        Ok(SiteActor(actor))
    }
}

/// JSON request body. Rejections render as [`AccountError`].
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AccountError))]
pub struct Payload<T>(pub T);

/// Named group of fields on a detail page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Fieldset {
    pub name: Option<&'static str>,
    pub fields: &'static [&'static str],
}

/// Per-model admin configuration and permissions.
///
/// Permission defaults delegate to [`User::has_perm`] with
/// `"{app_label}.{action}_{model_name}"`.
pub trait ModelAdmin: Send + Sync {
    fn model_name(&self) -> &'static str;

    fn app_label(&self) -> &'static str {
        "accounts"
    }

    /// Fields shown in the change list.
    fn list_display(&self) -> &'static [&'static str] {
        &["id"]
    }

    fn list_filter(&self) -> &'static [&'static str] {
        &[]
    }

    fn search_fields(&self) -> &'static [&'static str] {
        &[]
    }

    fn readonly_fields(&self) -> &'static [&'static str] {
        &[]
    }

    /// Default ordering, `-` prefix for descending.
    fn ordering(&self) -> &'static [&'static str] {
        &["id"]
    }

    fn list_per_page(&self) -> usize {
        100
    }

    fn fieldsets(&self) -> &'static [Fieldset] {
        &[]
    }

    /// Date field driving the year/month drill-down.
    fn date_hierarchy(&self) -> Option<&'static str> {
        None
    }

    /// Permission codename for `action`.
    fn permission(&self, action: &str) -> String {
        format!("{}.{action}_{}", self.app_label(), self.model_name())
    }

    fn has_view_permission(&self, actor: &Actor) -> bool {
        actor.user.has_perm(&self.permission("view"))
    }

    fn has_add_permission(&self, actor: &Actor) -> bool {
        actor.user.has_perm(&self.permission("add"))
    }

    fn has_change_permission(&self, actor: &Actor) -> bool {
        actor.user.has_perm(&self.permission("change"))
    }

    fn has_delete_permission(&self, actor: &Actor) -> bool {
        actor.user.has_perm(&self.permission("delete"))
    }
}

/// Fail with `403` unless `allowed`.
pub(crate) fn require(allowed: bool) -> Result<()> {
    if allowed {
        Ok(())
    } else {
        Err(AccountError::Forbidden)
    }
}

/// Change list column.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Column {
    pub field: &'static str,
    pub label: String,
}

/// Paginated change list.
#[derive(Clone, Debug, Serialize)]
pub struct ChangeList {
    pub model_name: &'static str,
    pub count: u64,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: u64,
    pub results: Vec<Map<String, Value>>,
    pub columns: Vec<Column>,
    pub filters: &'static [&'static str],
    pub search_fields: &'static [&'static str],
    pub date_hierarchy: Option<&'static str>,
}

impl ChangeList {
    /// Build the page of `admin` from `rows`, keeping the `list_display`
    /// fields and `id`.
    pub fn new<T: Serialize>(
        admin: &dyn ModelAdmin,
        rows: &[T],
        count: u64,
        page: usize,
    ) -> Result<Self> {
        let page_size = admin.list_per_page();
        let results = rows
            .iter()
            .map(|row| project(row, admin.list_display()))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            model_name: admin.model_name(),
            count,
            page,
            page_size,
            total_pages: count.div_ceil(page_size.max(1) as u64).max(1),
            results,
            columns: admin
                .list_display()
                .iter()
                .map(|&field| Column {
                    field,
                    label: humanize(field),
                })
                .collect(),
            filters: admin.list_filter(),
            search_fields: admin.search_fields(),
            date_hierarchy: admin.date_hierarchy(),
        })
    }
}

/// Serialize `row` and keep `id` plus `fields`.
fn project<T: Serialize>(row: &T, fields: &[&str]) -> Result<Map<String, Value>> {
    let Value::Object(mut object) =
        serde_json::to_value(row).map_err(|err| AccountError::Internal {
            details: err.to_string(),
        })?
    else {
        return Err(AccountError::Internal {
            details: "row is not an object".into(),
        });
    };

    object.retain(|key, _| key == "id" || fields.contains(&key.as_str()));
    Ok(object)
}

/// `date_joined` → `Date joined`.
pub fn humanize(field: &str) -> String {
    let words = field.replace('_', " ");
    let mut chars = words.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
