//! User persistence port and the change list query it answers.

use std::cmp::Ordering;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::user::{NewUser, Roles, User};

/// Port for user persistence.
///
/// Implementations enforce email and username uniqueness themselves and
/// report violations as [`crate::error::AccountError::Duplicate`].
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Exact, case-sensitive match.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Exact, case-sensitive match.
    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Insert `user`. When `promote` is set, the role flags are written by a
    /// second statement of the same transaction.
    async fn insert(&self, user: &NewUser, promote: Option<Roles>) -> Result<User>;

    /// Update every mutable column of an existing user.
    async fn update(&self, user: &User) -> Result<()>;

    /// Users matching `query`, sorted and paginated.
    async fn list(&self, query: &UserQuery) -> Result<Vec<User>>;

    /// Number of users matching `query`, ignoring pagination.
    async fn count(&self, query: &UserQuery) -> Result<u64>;
}

/// Sortable user column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserField {
    Id,
    Email,
    Username,
    IsAdmin,
    IsStaff,
    IsActive,
    DateJoined,
    LastLogin,
}

impl UserField {
    /// Column name, also used as the public field name.
    pub fn column(&self) -> &'static str {
        match self {
            UserField::Id => "id",
            UserField::Email => "email",
            UserField::Username => "username",
            UserField::IsAdmin => "is_admin",
            UserField::IsStaff => "is_staff",
            UserField::IsActive => "is_active",
            UserField::DateJoined => "date_joined",
            UserField::LastLogin => "last_login",
        }
    }

    fn compare(&self, a: &User, b: &User) -> Ordering {
        match self {
            UserField::Id => a.id.cmp(&b.id),
            UserField::Email => a.email.cmp(&b.email),
            UserField::Username => a.username.cmp(&b.username),
            UserField::IsAdmin => a.is_admin.cmp(&b.is_admin),
            UserField::IsStaff => a.is_staff.cmp(&b.is_staff),
            UserField::IsActive => a.is_active.cmp(&b.is_active),
            UserField::DateJoined => a.date_joined.cmp(&b.date_joined),
            UserField::LastLogin => a.last_login.cmp(&b.last_login),
        }
    }
}

impl FromStr for UserField {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "id" => UserField::Id,
            "email" => UserField::Email,
            "username" => UserField::Username,
            "is_admin" => UserField::IsAdmin,
            "is_staff" => UserField::IsStaff,
            "is_active" => UserField::IsActive,
            "date_joined" => UserField::DateJoined,
            "last_login" => UserField::LastLogin,
            _ => return Err(()),
        })
    }
}

/// One ordering term, `-field` meaning descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    pub field: UserField,
    pub descending: bool,
}

impl OrderBy {
    pub const fn asc(field: UserField) -> Self {
        Self {
            field,
            descending: false,
        }
    }

    pub const fn desc(field: UserField) -> Self {
        Self {
            field,
            descending: true,
        }
    }
}

impl FromStr for OrderBy {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.strip_prefix('-') {
            Some(field) => Ok(Self::desc(field.parse()?)),
            None => Ok(Self::asc(s.parse()?)),
        }
    }
}

/// Exact-match filters, combined with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilters {
    pub username: Option<String>,
    pub is_staff: Option<bool>,
    pub is_admin: Option<bool>,
    pub is_active: Option<bool>,
    /// Date hierarchy on `date_joined`.
    pub joined_year: Option<i32>,
    /// Only honoured together with `joined_year`.
    pub joined_month: Option<u32>,
}

/// Change list query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserQuery {
    /// Case-insensitive substring, OR across username and email.
    pub search: Option<String>,
    pub filters: UserFilters,
    /// Empty means storage order by id. Ties are always broken by id.
    pub ordering: Vec<OrderBy>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl UserQuery {
    /// Search term, trimmed, if any is left.
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
    }

    /// Whether `user` passes search and filters.
    pub fn matches(&self, user: &User) -> bool {
        if let Some(term) = self.search_term() {
            let term = term.to_lowercase();
            let in_username = user
                .username
                .as_deref()
                .is_some_and(|username| username.to_lowercase().contains(&term));
            if !in_username && !user.email.to_lowercase().contains(&term) {
                return false;
            }
        }

        let filters = &self.filters;
        if filters
            .username
            .as_deref()
            .is_some_and(|username| user.username.as_deref() != Some(username))
        {
            return false;
        }
        if filters.is_staff.is_some_and(|v| v != user.is_staff)
            || filters.is_admin.is_some_and(|v| v != user.is_admin)
            || filters.is_active.is_some_and(|v| v != user.is_active)
        {
            return false;
        }
        if let Some(year) = filters.joined_year {
            if user.date_joined.year() != year {
                return false;
            }
            if filters
                .joined_month
                .is_some_and(|month| user.date_joined.month() != month)
            {
                return false;
            }
        }

        true
    }

    /// Sort `users` following `ordering`, then by id.
    pub fn sort(&self, users: &mut [User]) {
        users.sort_by(|a, b| {
            self.ordering
                .iter()
                .map(|order| {
                    let ordering = order.field.compare(a, b);
                    if order.descending { ordering.reverse() } else { ordering }
                })
                .find(|ordering| ordering.is_ne())
                .unwrap_or_else(|| a.id.cmp(&b.id))
        });
    }
}
