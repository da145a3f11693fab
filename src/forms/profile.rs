use chrono::{NaiveDate, Utc};
use phonenumber::country;
use serde::Deserialize;
use url::Url;
use validator::Validate;

use super::{Checked, collect, error, failed, field_rules, finish};
use crate::config::Profile as ProfileConfig;
use crate::error::Result;
use crate::profile::{Gender, NewProfile, Profile, ProfileDetails, ProfileRepository};

const INVALID_PHONE: &str = "Enter a valid phone number.";
const PROFILE_EXISTS: &str = "Profile with this User already exists.";

/// Form editing the personal details of a user.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct ProfileForm {
    #[validate(length(max = 150, message = "First name must be at most 150 characters long."))]
    pub first_name: String,
    #[validate(length(max = 150, message = "Last name must be at most 150 characters long."))]
    pub last_name: String,
    #[validate(length(min = 1, message = "This field is required."))]
    pub phonenumber: String,
    /// ISO 3166-1 alpha-2 region used when `phonenumber` has no `+` prefix.
    pub phone_region: Option<String>,
    #[validate(length(max = 100, message = "Country must be at most 100 characters long."))]
    pub country: String,
    /// Stored image reference. `None` keeps the current avatar.
    pub avatar: Option<String>,
    #[validate(length(max = 255, message = "Address must be at most 255 characters long."))]
    pub address: String,
    pub gender: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    #[validate(length(max = 12, message = "Pincode must be at most 12 characters long."))]
    pub pincode: String,
    #[validate(length(max = 50, message = "Language must be at most 50 characters long."))]
    pub language: String,
    #[validate(length(max = 100, message = "Location must be at most 100 characters long."))]
    pub location: String,
    pub website: Option<String>,
    #[validate(length(max = 500, message = "Biography must be at most 500 characters long."))]
    pub bio: String,
}

/// Parse `number` and format it as E.164.
pub fn normalize_phone(number: &str, region: &str) -> Checked<String> {
    let region = region
        .trim()
        .to_uppercase()
        .parse::<country::Id>()
        .map_err(|_| error("invalid_region", "Select a valid region."))?;

    let parsed = phonenumber::parse(Some(region), number.trim())
        .map_err(|_| error("invalid_phone", INVALID_PHONE))?;
    if !phonenumber::is_valid(&parsed) {
        return Err(error("invalid_phone", INVALID_PHONE));
    }

    Ok(parsed.format().mode(phonenumber::Mode::E164).to_string())
}

/// Parse a website, defaulting to `https://` when no scheme is given.
pub fn normalize_website(website: &str) -> Checked<Option<String>> {
    let website = website.trim();
    if website.is_empty() {
        return Ok(None);
    }

    let candidate = if website.contains("://") {
        website.to_owned()
    } else {
        format!("https://{website}")
    };

    let url = Url::parse(&candidate).map_err(|_| error("invalid_url", "Enter a valid URL."))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(error("invalid_url", "Enter a valid URL."));
    }

    let url = String::from(url);
    if url.chars().count() > ProfileDetails::MAX_WEBSITE_LENGTH {
        return Err(error(
            "length",
            "Website must be at most 200 characters long.",
        ));
    }

    Ok(Some(url))
}

fn parse_gender(gender: &str) -> Checked<Option<Gender>> {
    if gender.is_empty() {
        return Ok(None);
    }

    gender.parse().map(Some).map_err(|_| {
        error(
            "invalid_choice",
            format!("Select a valid choice. {gender} is not one of the available choices."),
        )
    })
}

fn check_birth_date(date: Option<NaiveDate>) -> Checked<Option<NaiveDate>> {
    match date {
        Some(date) if date > Utc::now().date_naive() => Err(error(
            "future_date",
            "Date of birth cannot be in the future.",
        )),
        date => Ok(date),
    }
}

impl ProfileForm {
    /// Validate every field and return the details to store.
    pub fn clean(&self, config: &ProfileConfig) -> Result<ProfileDetails> {
        let mut errors = field_rules(self);

        let region = self
            .phone_region
            .as_deref()
            .filter(|region| !region.trim().is_empty())
            .unwrap_or(&config.default_country);
        let phonenumber = if failed(&errors, "phonenumber") {
            None
        } else {
            collect(
                &mut errors,
                "phonenumber",
                normalize_phone(&self.phonenumber, region),
            )
        };
        let gender = collect(
            &mut errors,
            "gender",
            parse_gender(self.gender.as_deref().unwrap_or_default()),
        );
        let date_of_birth = collect(
            &mut errors,
            "date_of_birth",
            check_birth_date(self.date_of_birth),
        );
        let website = collect(
            &mut errors,
            "website",
            normalize_website(self.website.as_deref().unwrap_or_default()),
        );
        finish(errors)?;

        Ok(ProfileDetails {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            phonenumber: phonenumber.unwrap_or_default(),
            country: self.country.clone(),
            avatar: self.avatar.clone().filter(|avatar| !avatar.is_empty()),
            address: self.address.clone(),
            gender: gender.flatten(),
            date_of_birth: date_of_birth.flatten(),
            pincode: self.pincode.clone(),
            language: self.language.clone(),
            location: self.location.clone(),
            website: website.flatten(),
            bio: self.bio.clone(),
        })
    }

    /// Create the profile of `user_id`.
    pub async fn create(
        &self,
        user_id: i64,
        repo: &dyn ProfileRepository,
        config: &ProfileConfig,
    ) -> Result<Profile> {
        let details = self.clean(config)?;

        let profile = repo
            .insert(&NewProfile { user_id, details })
            .await
            .map_err(|err| err.duplicate_as_field(|_| PROFILE_EXISTS.to_owned()))?;
        tracing::info!(profile_id = profile.id, user_id, "profile created");

        Ok(profile)
    }

    /// Replace the details of `profile`. The avatar is kept unless submitted.
    pub async fn save(
        &self,
        profile: &Profile,
        repo: &dyn ProfileRepository,
        config: &ProfileConfig,
    ) -> Result<Profile> {
        let mut details = self.clean(config)?;
        if self.avatar.is_none() {
            details.avatar = profile.details.avatar.clone();
        }

        let changed = Profile {
            details,
            ..profile.clone()
        };
        repo.update(&changed).await?;
        tracing::info!(profile_id = changed.id, "profile changed");

        Ok(changed)
    }
}
