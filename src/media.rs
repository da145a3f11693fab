//! Image storage for profile pictures and avatars.
//!
//! Uploads are decoded, resized to a square with a centred crop, re-encoded
//! as JPEG and written below the media root. Stored references are relative
//! to that root; [`MediaStorage::url`] turns them into public paths.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType::Lanczos3;
use sha2::{Digest, Sha256};

use crate::config::Media;

type Result<T> = std::result::Result<T, MediaError>;

/// Error type.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    /// Error from `image` crate.
    #[error(transparent)]
    Image(#[from] image::ImageError),
    /// Error from `std::io` (Input/Output).
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("image task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("upload is empty")]
    Empty,
    #[error("upload is {size} bytes while {max} is the limit")]
    TooLarge { size: usize, max: usize },
}

/// File written by [`MediaStorage::store`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    /// Path relative to the media root.
    pub reference: String,
    /// Whether this upload created the file. Identical uploads share one.
    pub created: bool,
}

/// Filesystem-backed image store.
#[derive(Debug, Clone)]
pub struct MediaStorage {
    config: Media,
}

impl MediaStorage {
    /// Create a new [`MediaStorage`].
    pub fn new(config: Media) -> Self {
        Self { config }
    }

    /// Storage configuration.
    pub fn config(&self) -> &Media {
        &self.config
    }

    /// Public path of a stored reference.
    pub fn url(&self, reference: &str) -> String {
        format!("{}{}", self.config.url, reference)
    }

    /// Store a user profile image.
    pub async fn store_profile_image(&self, upload: &[u8]) -> Result<StoredImage> {
        self.store(upload, &self.config.profile_image_upload_to).await
    }

    /// Store a profile avatar.
    pub async fn store_avatar(&self, upload: &[u8]) -> Result<StoredImage> {
        self.store(upload, &self.config.avatar_upload_to).await
    }

    /// Resize `upload` and write it under `upload_to`.
    ///
    /// # Returns
    ///
    /// The stored file, with its reference relative to the media root.
    pub async fn store(&self, upload: &[u8], upload_to: &str) -> Result<StoredImage> {
        if upload.is_empty() {
            return Err(MediaError::Empty);
        }
        if upload.len() > self.config.max_upload_bytes {
            return Err(MediaError::TooLarge {
                size: upload.len(),
                max: self.config.max_upload_bytes,
            });
        }

        let buffer = upload.to_vec();
        let size = self.config.image_size;
        let quality = self.config.image_quality;
        let encoded =
            tokio::task::spawn_blocking(move || resize(&buffer, size, quality)).await??;

        let directory = upload_to.trim_matches('/');
        let name = hex::encode(Sha256::digest(&encoded));
        let reference = if directory.is_empty() {
            format!("{name}.jpg")
        } else {
            format!("{directory}/{name}.jpg")
        };

        let path = self.config.root.join(&reference);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let created = !tokio::fs::try_exists(&path).await?;
        tokio::fs::write(&path, &encoded).await?;

        tracing::info!(%reference, bytes = encoded.len(), created, "image stored");

        Ok(StoredImage { reference, created })
    }

    /// Undo a [`MediaStorage::store`] whose record could not be saved.
    ///
    /// Files that existed before the upload are kept. A missing file is not
    /// an error.
    pub async fn discard(&self, image: &StoredImage) -> Result<()> {
        if !image.created {
            return Ok(());
        }

        let reference = &image.reference;
        match tokio::fs::remove_file(self.config.root.join(reference)).await {
            Ok(()) => {
                tracing::info!(%reference, "image discarded");
                Ok(())
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Resize to a `size`×`size` square, cropping the centre, and encode as JPEG.
pub fn resize(buffer: &[u8], size: u32, quality: u8) -> Result<Vec<u8>> {
    let img = image::load_from_memory(buffer)?
        .resize_to_fill(size, size, Lanczos3)
        .to_rgb8();

    let mut output = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut output, quality);
        encoder.encode_image(&img)?;
    }

    Ok(output)
}

#[cfg(test)]
pub(crate) fn png(width: u32, height: u32) -> Vec<u8> {
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

    let img = RgbImage::from_fn(width, height, |x, _| {
        if x < width / 2 { Rgb([200, 30, 30]) } else { Rgb([30, 30, 200]) }
    });
    let mut cursor = std::io::Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut cursor, ImageFormat::Png)
        .expect("png encoding");
    cursor.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(root: &std::path::Path) -> MediaStorage {
        MediaStorage::new(Media {
            root: root.to_path_buf(),
            ..Default::default()
        })
    }

    #[test]
    fn test_resize_crops_to_square() {
        let resized = resize(&png(640, 480), 320, 70).unwrap();
        let img = image::load_from_memory(&resized).unwrap();

        assert_eq!((img.width(), img.height()), (320, 320));
    }

    #[tokio::test]
    async fn test_store_profile_image() {
        let root = tempfile::tempdir().unwrap();
        let media = storage(root.path());

        let stored = media.store_profile_image(&png(100, 400)).await.unwrap();
        assert!(stored.created);
        let reference = stored.reference;
        assert!(reference.starts_with("images/profile_pics/"));
        assert!(reference.ends_with(".jpg"));
        assert_eq!(media.url(&reference), format!("media/{reference}"));

        let written = std::fs::read(root.path().join(&reference)).unwrap();
        let img = image::load_from_memory(&written).unwrap();
        assert_eq!((img.width(), img.height()), (320, 320));
    }

    #[tokio::test]
    async fn test_rejects_invalid_uploads() {
        let root = tempfile::tempdir().unwrap();
        let media = storage(root.path());

        assert!(matches!(media.store_avatar(&[]).await, Err(MediaError::Empty)));
        assert!(matches!(
            media.store_avatar(b"definitely not an image").await,
            Err(MediaError::Image(_))
        ));

        let not_a_directory = tempfile::NamedTempFile::new().unwrap();
        let broken = storage(not_a_directory.path());
        assert!(matches!(
            broken.store_avatar(&png(10, 10)).await,
            Err(MediaError::Io(_))
        ));

        let small = MediaStorage::new(Media {
            root: root.path().to_path_buf(),
            max_upload_bytes: 8,
            ..Default::default()
        });
        assert!(matches!(
            small.store_avatar(&png(10, 10)).await,
            Err(MediaError::TooLarge { max: 8, .. })
        ));
    }

    #[tokio::test]
    async fn test_discard() {
        let root = tempfile::tempdir().unwrap();
        let media = storage(root.path());

        let first = media.store_avatar(&png(10, 10)).await.unwrap();
        let second = media.store_avatar(&png(10, 10)).await.unwrap();
        assert_eq!(first.reference, second.reference);
        assert!(first.created);
        assert!(!second.created);

        // Shared with the first upload.
        media.discard(&second).await.unwrap();
        let path = root.path().join(&first.reference);
        assert!(path.is_file());

        media.discard(&first).await.unwrap();
        assert!(!path.exists());
        // Already gone.
        media.discard(&first).await.unwrap();
    }
}
