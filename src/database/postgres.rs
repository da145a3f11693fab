//! PostgreSQL implementation of the repositories.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::{ToAccountError, escape_like, sql_bound};
use crate::error::{AccountError, Result};
use crate::profile::{NewProfile, Profile, ProfileRepository};
use crate::user::{NewUser, Roles, User, UserQuery, UserRepository};

const USER_COLUMNS: &str = "id, email, username, password, is_active, is_staff, is_admin, \
                            date_joined, last_login, profile_image, bio, hide_email";

const PROFILE_COLUMNS: &str = "id, user_id, first_name, last_name, phonenumber, country, \
                               avatar, address, gender, date_of_birth, pincode, language, \
                               location, website, bio";

/// PostgreSQL user repository.
#[derive(Clone, Debug)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    /// Create a new [`PgUserRepository`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_by(&self, column: &str, value: &str) -> Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {column} = $1"
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await
        .catch()
    }
}

/// Append the `WHERE` clause of `query`.
fn push_conditions(builder: &mut QueryBuilder<'_, Postgres>, query: &UserQuery) {
    builder.push(" WHERE TRUE");

    if let Some(term) = query.search_term() {
        let pattern = format!("%{}%", escape_like(term));
        builder
            .push(" AND (username ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR email ILIKE ")
            .push_bind(pattern)
            .push(")");
    }

    let filters = &query.filters;
    if let Some(username) = &filters.username {
        builder.push(" AND username = ").push_bind(username.clone());
    }
    for (column, value) in [
        ("is_staff", filters.is_staff),
        ("is_admin", filters.is_admin),
        ("is_active", filters.is_active),
    ] {
        if let Some(value) = value {
            builder.push(format!(" AND {column} = ")).push_bind(value);
        }
    }
    if let Some(year) = filters.joined_year {
        builder
            .push(" AND EXTRACT(YEAR FROM date_joined AT TIME ZONE 'UTC') = ")
            .push_bind(year);
        if let Some(month) = filters.joined_month {
            builder
                .push(" AND EXTRACT(MONTH FROM date_joined AT TIME ZONE 'UTC') = ")
                .push_bind(month as i32);
        }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .catch()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.find_by("email", email).await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        self.find_by("username", username).await
    }

    async fn insert(&self, user: &NewUser, promote: Option<Roles>) -> Result<User> {
        let mut tx = self.pool.begin().await?;

        let mut created = sqlx::query_as::<_, User>(&format!(
            r#"INSERT INTO users (
                email, username, password, is_active, is_staff, is_admin,
                date_joined, profile_image, bio, hide_email
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {USER_COLUMNS}"#
        ))
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.password)
        .bind(user.roles.is_active)
        .bind(user.roles.is_staff)
        .bind(user.roles.is_admin)
        .bind(user.date_joined)
        .bind(&user.profile_image)
        .bind(&user.bio)
        .bind(user.hide_email)
        .fetch_one(&mut *tx)
        .await
        .catch()?;

        if let Some(roles) = promote {
            let result = sqlx::query(
                r#"UPDATE users SET is_active = $1, is_staff = $2, is_admin = $3 WHERE id = $4"#,
            )
            .bind(roles.is_active)
            .bind(roles.is_staff)
            .bind(roles.is_admin)
            .bind(created.id)
            .execute(&mut *tx)
            .await
            .catch()?;

            if result.rows_affected() != 1 {
                tx.rollback().await?;
                return Err(AccountError::Internal {
                    details: "role promotion did not apply".into(),
                });
            }
            created.set_roles(roles);
        }

        tx.commit().await?;

        Ok(created)
    }

    async fn update(&self, user: &User) -> Result<()> {
        let result = sqlx::query(
            r#"UPDATE users
                SET email = $2, username = $3, password = $4, is_active = $5,
                    is_staff = $6, is_admin = $7, last_login = $8,
                    profile_image = $9, bio = $10, hide_email = $11
                WHERE id = $1"#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.password)
        .bind(user.is_active)
        .bind(user.is_staff)
        .bind(user.is_admin)
        .bind(user.last_login)
        .bind(&user.profile_image)
        .bind(&user.bio)
        .bind(user.hide_email)
        .execute(&self.pool)
        .await
        .catch()?;

        if result.rows_affected() == 0 {
            return Err(AccountError::NotFound);
        }

        Ok(())
    }

    async fn list(&self, query: &UserQuery) -> Result<Vec<User>> {
        let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT {USER_COLUMNS} FROM users"));
        push_conditions(&mut builder, query);

        builder.push(" ORDER BY ");
        for order in &query.ordering {
            // Matches `Option` ordering: `None` sorts first.
            let direction = if order.descending {
                "DESC NULLS LAST"
            } else {
                "ASC NULLS FIRST"
            };
            builder.push(format!("{} {direction}, ", order.field.column()));
        }
        builder.push("id ASC");

        if let Some(limit) = query.limit {
            builder.push(" LIMIT ").push_bind(sql_bound(limit));
        }
        builder.push(" OFFSET ").push_bind(sql_bound(query.offset));

        builder
            .build_query_as::<User>()
            .fetch_all(&self.pool)
            .await
            .catch()
    }

    async fn count(&self, query: &UserQuery) -> Result<u64> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users");
        push_conditions(&mut builder, query);

        let count = builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .catch()?;

        Ok(count.max(0) as u64)
    }
}

/// PostgreSQL profile repository.
#[derive(Clone, Debug)]
pub struct PgProfileRepository {
    pool: PgPool,
}

impl PgProfileRepository {
    /// Create a new [`PgProfileRepository`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileRepository for PgProfileRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Profile>> {
        sqlx::query_as::<_, Profile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .catch()
    }

    async fn find_by_user(&self, user_id: i64) -> Result<Option<Profile>> {
        sqlx::query_as::<_, Profile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .catch()
    }

    async fn insert(&self, profile: &NewProfile) -> Result<Profile> {
        let details = &profile.details;

        sqlx::query_as::<_, Profile>(&format!(
            r#"INSERT INTO profiles (
                user_id, first_name, last_name, phonenumber, country, avatar,
                address, gender, date_of_birth, pincode, language, location,
                website, bio
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING {PROFILE_COLUMNS}"#
        ))
        .bind(profile.user_id)
        .bind(&details.first_name)
        .bind(&details.last_name)
        .bind(&details.phonenumber)
        .bind(&details.country)
        .bind(&details.avatar)
        .bind(&details.address)
        .bind(details.gender)
        .bind(details.date_of_birth)
        .bind(&details.pincode)
        .bind(&details.language)
        .bind(&details.location)
        .bind(&details.website)
        .bind(&details.bio)
        .fetch_one(&self.pool)
        .await
        .catch()
    }

    async fn update(&self, profile: &Profile) -> Result<()> {
        let details = &profile.details;

        let result = sqlx::query(
            r#"UPDATE profiles
                SET first_name = $2, last_name = $3, phonenumber = $4, country = $5,
                    avatar = $6, address = $7, gender = $8, date_of_birth = $9,
                    pincode = $10, language = $11, location = $12, website = $13,
                    bio = $14
                WHERE id = $1"#,
        )
        .bind(profile.id)
        .bind(&details.first_name)
        .bind(&details.last_name)
        .bind(&details.phonenumber)
        .bind(&details.country)
        .bind(&details.avatar)
        .bind(&details.address)
        .bind(details.gender)
        .bind(details.date_of_birth)
        .bind(&details.pincode)
        .bind(&details.language)
        .bind(&details.location)
        .bind(&details.website)
        .bind(&details.bio)
        .execute(&self.pool)
        .await
        .catch()?;

        if result.rows_affected() == 0 {
            return Err(AccountError::NotFound);
        }

        Ok(())
    }

    async fn list(&self, limit: Option<usize>, offset: usize) -> Result<Vec<Profile>> {
        sqlx::query_as::<_, Profile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles ORDER BY id LIMIT $1 OFFSET $2"
        ))
        .bind(limit.map(sql_bound))
        .bind(sql_bound(offset))
        .fetch_all(&self.pool)
        .await
        .catch()
    }

    async fn count(&self) -> Result<u64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM profiles")
            .fetch_one(&self.pool)
            .await
            .catch()?;

        Ok(count.max(0) as u64)
    }
}
