//! Configuration manager for accounts.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Public prefix prepended to every stored media reference.
pub const DEFAULT_MEDIA_URL: &str = "media/";
/// Placeholder used when a user never uploaded a profile image.
pub const DEFAULT_PROFILE_IMAGE: &str = "images/profile_pics/default_icon.png";
/// Region used to parse phone numbers submitted without a prefix.
pub const DEFAULT_COUNTRY_CODE: &str = "IN";
/// Group whose members may not change users from the admin.
pub const DEFAULT_STAFF_GROUP: &str = "staff";

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Instance name.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    version: String,
    #[serde(skip)]
    path: PathBuf,
    /// Related to PostgreSQL configuration.
    #[serde(skip_serializing)]
    pub postgres: Option<Postgres>,
    /// Related to Argon2 configuration.
    #[serde(skip_serializing)]
    pub argon2: Option<Argon2>,
    /// Uploaded images and their public paths.
    #[serde(default)]
    pub media: Media,
    /// Profile form defaults.
    #[serde(default)]
    pub profile: Profile,
    /// Administrative surface.
    #[serde(default)]
    pub admin: Admin,
}

/// PostgreSQL configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Postgres {
    /// Hostname:(?port) for PostgreSQL instance.
    pub address: String,
    /// Database name.
    pub database: Option<String>,
    /// Username credential to connect.
    pub username: Option<String>,
    /// Password credential to connect.
    pub password: Option<String>,
    /// Maximum pool connections.
    pub pool_size: Option<u32>,
}

/// Argon2 configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Argon2 {
    /// Memory used while hashing.
    pub memory_cost: u32,
    /// Iterations of hash.
    pub iterations: u32,
    /// Parallelism degree.
    pub parallelism: u32,
    /// Output hash length.
    pub hash_length: usize,
}

impl Default for Argon2 {
    fn default() -> Self {
        Self {
            memory_cost: 1024 * 64, // 64 MiB.
            iterations: 4,
            parallelism: 2,
            hash_length: 32,
        }
    }
}

/// Media storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Media {
    /// Directory where uploads are written.
    pub root: PathBuf,
    /// Public prefix of stored references.
    pub url: String,
    /// Sub-directory for user profile images.
    pub profile_image_upload_to: String,
    /// Sub-directory for profile avatars.
    pub avatar_upload_to: String,
    /// Reference returned when a user has no image.
    pub default_profile_image: String,
    /// Square edge, in pixels, of stored images.
    pub image_size: u32,
    /// JPEG quality of stored images.
    pub image_quality: u8,
    /// Largest accepted upload, in bytes.
    pub max_upload_bytes: usize,
}

impl Default for Media {
    fn default() -> Self {
        Self {
            root: PathBuf::from("media"),
            url: DEFAULT_MEDIA_URL.to_owned(),
            profile_image_upload_to: "images/profile_pics/".to_owned(),
            avatar_upload_to: "images/avatars/".to_owned(),
            default_profile_image: DEFAULT_PROFILE_IMAGE.to_owned(),
            image_size: 320,
            image_quality: 70,
            max_upload_bytes: 5 * 1024 * 1024, // 5 MiB.
        }
    }
}

/// Profile configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    /// ISO 3166-1 alpha-2 region for phone numbers.
    pub default_country: String,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            default_country: DEFAULT_COUNTRY_CODE.to_owned(),
        }
    }
}

/// Administrative surface configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Admin {
    /// Members of this group are denied the change permission.
    pub staff_group: String,
    /// Rows per change list page.
    pub list_per_page: usize,
}

impl Default for Admin {
    fn default() -> Self {
        Self {
            staff_group: DEFAULT_STAFF_GROUP.to_owned(),
            list_per_page: 100,
        }
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Package version the configuration was read by.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    pub fn read(self) -> Arc<Self> {
        let file_path = if self.path.is_file() {
            self.path.clone()
        } else {
            Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        match File::open(&file_path) {
            Ok(file) => match serde_yaml::from_reader::<_, Configuration>(file) {
                Ok(mut config) => {
                    config.version = VERSION.to_owned();
                    config.path = file_path;
                    if !config.media.url.ends_with('/') {
                        config.media.url.push('/');
                    }

                    Arc::new(config)
                },
                Err(err) => Arc::new(self.error(err)),
            },
            Err(err) => Arc::new(self.error(err)),
        }
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, "`config.yaml` file not found or invalid");
        Self {
            version: VERSION.to_owned(),
            ..Default::default()
        }
    }
}
