use std::path::PathBuf;

use anyhow::Result;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use tokio::fs;
use tracing::{info, warn};

use dreamvault_db::profiles::AVATAR_URL_MAX_LEN;

pub const AVATAR_BUCKET: &str = "avatars";
pub const MAX_AVATAR_BYTES: usize = 5 * 1024 * 1024;

/// Where an uploaded avatar ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredAvatar {
    /// Written to the bucket, served under `/avatars/`.
    Bucket(String),
    /// Bucket unavailable; the image is embedded as a data URL.
    Inline(String),
}

impl StoredAvatar {
    pub fn url(&self) -> &str {
        match self {
            Self::Bucket(url) | Self::Inline(url) => url,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bucket(_) => "bucket",
            Self::Inline(_) => "inline",
        }
    }
}

/// Avatar bucket on local disk: `{storage_dir}/avatars/{user}-{ts}.{ext}`.
pub struct AvatarStore {
    dir: Option<PathBuf>,
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "img",
    }
}

impl AvatarStore {
    pub fn new(storage_dir: PathBuf) -> Self {
        Self { dir: Some(storage_dir.join(AVATAR_BUCKET)) }
    }

    /// No bucket at all; every upload takes the inline fallback.
    pub fn disabled() -> Self {
        Self { dir: None }
    }

    pub fn bucket_dir(&self) -> Option<&PathBuf> {
        self.dir.as_ref()
    }

    /// Creates the bucket directory if needed. Existing buckets are left alone.
    pub async fn ensure_bucket(&self) -> Result<bool> {
        let Some(dir) = &self.dir else {
            return Ok(false);
        };
        fs::create_dir_all(dir).await?;
        info!("Avatar bucket ready at {}", dir.display());
        Ok(true)
    }

    async fn write_to_bucket(&self, user_id: &str, content_type: &str, data: &[u8]) -> Result<Option<String>> {
        if !self.ensure_bucket().await? {
            return Ok(None);
        }
        let Some(dir) = &self.dir else {
            return Ok(None);
        };
        let file_name = format!(
            "{}-{}.{}",
            user_id,
            chrono::Utc::now().timestamp_millis(),
            extension_for(content_type)
        );
        fs::write(dir.join(&file_name), data).await?;
        Ok(Some(format!("/{}/{}", AVATAR_BUCKET, file_name)))
    }

    /// Stores the image in the bucket, falling back to a base64 data URL.
    /// `None` when the bucket is unusable and the image is too large to inline.
    pub async fn store(&self, user_id: &str, content_type: &str, data: &[u8]) -> Option<StoredAvatar> {
        match self.write_to_bucket(user_id, content_type, data).await {
            Ok(Some(url)) => return Some(StoredAvatar::Bucket(url)),
            Ok(None) => {}
            Err(e) => warn!("Avatar bucket write failed, using inline fallback: {}", e),
        }

        let url = format!("data:{};base64,{}", content_type, B64.encode(data));
        if url.len() > AVATAR_URL_MAX_LEN {
            warn!("Inline avatar for {} is {} bytes, too large to store", user_id, url.len());
            return None;
        }
        Some(StoredAvatar::Inline(url))
    }
}
