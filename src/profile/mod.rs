//! Personal details attached to a user.

mod repository;

pub use repository::*;

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Gender choices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "gender")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub const CHOICES: [Gender; 3] = [Gender::Male, Gender::Female, Gender::Other];

    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Other => "Other",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Gender::CHOICES
            .into_iter()
            .find(|gender| gender.as_str() == s)
            .ok_or(())
    }
}

/// Editable part of a profile.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProfileDetails {
    pub first_name: String,
    pub last_name: String,
    /// E.164.
    pub phonenumber: String,
    pub country: String,
    pub avatar: Option<String>,
    pub address: String,
    pub gender: Option<Gender>,
    pub date_of_birth: Option<NaiveDate>,
    pub pincode: String,
    pub language: String,
    pub location: String,
    pub website: Option<String>,
    pub bio: String,
}

impl ProfileDetails {
    pub const MAX_NAME_LENGTH: usize = 150;
    pub const MAX_COUNTRY_LENGTH: usize = 100;
    pub const MAX_ADDRESS_LENGTH: usize = 255;
    pub const MAX_PINCODE_LENGTH: usize = 12;
    pub const MAX_LANGUAGE_LENGTH: usize = 50;
    pub const MAX_LOCATION_LENGTH: usize = 100;
    pub const MAX_WEBSITE_LENGTH: usize = 200;
    pub const MAX_BIO_LENGTH: usize = 500;
}

/// Profile as saved on database. One per user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Profile {
    pub id: i64,
    pub user_id: i64,
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub details: ProfileDetails,
}

impl Profile {
    /// Full name, or an empty string.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.details.first_name, self.details.last_name)
            .trim()
            .to_owned()
    }
}

/// Profile not persisted yet.
#[derive(Clone, Debug, PartialEq)]
pub struct NewProfile {
    pub user_id: i64,
    pub details: ProfileDetails,
}

impl NewProfile {
    /// Attach the storage identifier.
    pub fn into_profile(self, id: i64) -> Profile {
        Profile {
            id,
            user_id: self.user_id,
            details: self.details,
        }
    }
}
