use std::path::{Component, Path, PathBuf};

use anyhow::Result;
use axum::{
    Extension, Json,
    extract::{Multipart, State, multipart::MultipartError},
    http::StatusCode,
    response::IntoResponse,
};
use bytes::Bytes;
use chrono::Utc;
use rand::Rng;
use serde_json::json;
use tokio::fs;
use tracing::{error, info, warn};

use hal_types::api::UserProfile;

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::middleware::CurrentUser;

/// Per-file limit for general uploads.
pub const MAX_UPLOAD_SIZE: usize = 50 * 1024 * 1024;
/// Per-request file count for `/upload/images`.
const MAX_FILES: usize = 10;
/// Body limit for the upload routes: a full batch plus form overhead.
pub const MAX_REQUEST_SIZE: usize = MAX_UPLOAD_SIZE * MAX_FILES + 1024 * 1024;

/// Subdirectory for market report images.
pub const REPORTS_DIR: &str = "market-reports";
const PROFILES_DIR: &str = "profiles";

/// What an upload field accepts.
#[derive(Debug, Clone, Copy)]
pub struct FilePolicy {
    pub max_bytes: usize,
    pub allow_video: bool,
}

impl FilePolicy {
    pub const MEDIA: Self = Self {
        max_bytes: MAX_UPLOAD_SIZE,
        allow_video: true,
    };
    pub const REPORT_IMAGE: Self = Self {
        max_bytes: 5 * 1024 * 1024,
        allow_video: false,
    };

    fn rejection(&self) -> &'static str {
        if self.allow_video {
            "Sadece resim ve video dosyaları yüklenebilir!"
        } else {
            "Sadece resim dosyaları yüklenebilir!"
        }
    }

    fn accepts(&self, content_type: &str) -> bool {
        content_type.starts_with("image/") || (self.allow_video && content_type.starts_with("video/"))
    }
}

/// A file part read from a multipart body.
#[derive(Debug)]
pub struct IncomingFile {
    pub content_type: String,
    pub file_name: Option<String>,
    pub data: Bytes,
}

#[derive(Debug, Clone)]
pub struct StoredFile {
    pub filename: String,
    pub url: String,
}

/// Files under the upload directory, served statically at `/uploads`.
pub struct UploadStore {
    dir: PathBuf,
    public_url: String,
}

impl UploadStore {
    pub async fn new(dir: PathBuf, public_url: &str) -> Result<Self> {
        fs::create_dir_all(dir.join(REPORTS_DIR)).await?;
        fs::create_dir_all(dir.join(PROFILES_DIR)).await?;
        info!("Upload directory: {}", dir.display());
        Ok(Self {
            dir,
            public_url: public_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a file as `<prefix>-<millis>-<random>.<ext>` under `subdir`.
    /// Absolute URLs are prefixed with the public base URL.
    pub async fn save(&self, subdir: Option<&str>, prefix: &str, file: &IncomingFile, absolute: bool) -> Result<StoredFile> {
        let filename = format!(
            "{}-{}-{}.{}",
            prefix,
            Utc::now().timestamp_millis(),
            rand::rng().random_range(0..1_000_000_000u32),
            extension(file)
        );
        let (path, relative) = match subdir {
            Some(sub) => (self.dir.join(sub).join(&filename), format!("/uploads/{sub}/{filename}")),
            None => (self.dir.join(&filename), format!("/uploads/{filename}")),
        };
        fs::write(&path, &file.data).await?;
        info!("Stored upload {} ({} bytes)", path.display(), file.data.len());

        let url = if absolute {
            format!("{}{}", self.public_url, relative)
        } else {
            relative
        };
        Ok(StoredFile { filename, url })
    }

    /// Remove a file this store served, given its URL. Foreign URLs are
    /// ignored. Returns whether a file was deleted.
    pub async fn delete_by_url(&self, url: &str) -> bool {
        let Some(relative) = local_path(url) else {
            return false;
        };
        let path = self.dir.join(relative);
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted upload {}", path.display());
                true
            }
            Err(e) => {
                warn!("Could not delete upload {}: {}", path.display(), e);
                false
            }
        }
    }
}

/// Path below the upload dir for a `/uploads/...` URL. Rejects traversal.
fn local_path(url: &str) -> Option<PathBuf> {
    let (_, rest) = url.split_once("/uploads/")?;
    let rest = rest.split(['?', '#']).next().unwrap_or_default();
    let path = PathBuf::from(rest);
    if rest.is_empty() || !path.components().all(|c| matches!(c, Component::Normal(_))) {
        return None;
    }
    Some(path)
}

fn extension(file: &IncomingFile) -> String {
    let from_name = file
        .file_name
        .as_deref()
        .and_then(|n| Path::new(n).extension())
        .and_then(|e| e.to_str());
    let from_type = file.content_type.split_once('/').map(|(_, sub)| sub);
    from_name
        .or(from_type)
        .map(|e| e.to_ascii_lowercase())
        .filter(|e| !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "bin".to_string())
}

pub fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("Dosya boyutu çok büyük".into())
    } else {
        ApiError::bad_request(e.body_text())
    }
}

/// Check one file part against a policy.
pub fn check_file(file: &IncomingFile, policy: FilePolicy) -> ApiResult<()> {
    if !policy.accepts(&file.content_type) {
        return Err(ApiError::bad_request(policy.rejection()));
    }
    if file.data.len() > policy.max_bytes {
        return Err(ApiError::PayloadTooLarge(format!(
            "Dosya boyutu en fazla {} MB olabilir",
            policy.max_bytes / (1024 * 1024)
        )));
    }
    Ok(())
}

/// Collect up to `max` parts named `field`. Other fields are skipped.
async fn read_files(multipart: &mut Multipart, field: &str, max: usize, policy: FilePolicy) -> ApiResult<Vec<IncomingFile>> {
    let mut files = Vec::new();
    while let Some(part) = multipart.next_field().await.map_err(multipart_error)? {
        if part.name() != Some(field) {
            continue;
        }
        if files.len() == max {
            return Err(ApiError::bad_request(format!("En fazla {max} dosya yüklenebilir")));
        }
        let content_type = part.content_type().unwrap_or_default().to_string();
        let file_name = part.file_name().map(str::to_string);
        let data = part.bytes().await.map_err(multipart_error)?;
        let file = IncomingFile {
            content_type,
            file_name,
            data,
        };
        check_file(&file, policy)?;
        files.push(file);
    }
    Ok(files)
}

fn store_error(e: anyhow::Error) -> ApiError {
    error!("Upload write failed: {}", e);
    ApiError::Internal(e)
}

/// POST /upload/image
pub async fn upload_image(State(state): State<AppState>, mut multipart: Multipart) -> ApiResult<impl IntoResponse> {
    let file = read_files(&mut multipart, "image", 1, FilePolicy::MEDIA)
        .await?
        .pop()
        .ok_or_else(|| ApiError::bad_request("Resim dosyası bulunamadı"))?;
    let stored = state.uploads.save(None, "image", &file, true).await.map_err(store_error)?;

    Ok(Json(json!({
        "message": "Resim başarıyla yüklendi",
        "url": stored.url,
        "imageUrl": stored.url,
        "filename": stored.filename,
    })))
}

/// POST /upload/images
pub async fn upload_images(State(state): State<AppState>, mut multipart: Multipart) -> ApiResult<impl IntoResponse> {
    let files = read_files(&mut multipart, "images", MAX_FILES, FilePolicy::MEDIA).await?;
    if files.is_empty() {
        return Err(ApiError::bad_request("Resim dosyaları bulunamadı"));
    }

    let mut images = Vec::with_capacity(files.len());
    for (i, file) in files.iter().enumerate() {
        let stored = state.uploads.save(None, "images", file, true).await.map_err(store_error)?;
        images.push(json!({ "url": stored.url, "filename": stored.filename, "isPrimary": i == 0 }));
    }

    Ok(Json(json!({ "message": "Resimler başarıyla yüklendi", "images": images })))
}

/// POST /upload/profile-image
pub async fn upload_profile_image(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let file = read_files(&mut multipart, "image", 1, FilePolicy::MEDIA)
        .await?
        .pop()
        .ok_or_else(|| ApiError::bad_request("Resim dosyası bulunamadı"))?;
    let stored = state
        .uploads
        .save(Some(PROFILES_DIR), "profile", &file, true)
        .await
        .map_err(store_error)?;

    let url = stored.url.clone();
    let user_id = user.id;
    let updated = state
        .query(move |db| db.set_profile_image(user_id, &url))
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    // Replace, don't accumulate
    if let Some(old) = user.profile_image.as_deref() {
        state.uploads.delete_by_url(old).await;
    }

    Ok((
        StatusCode::OK,
        Json(json!({
            "message": "Profil resmi başarıyla yüklendi",
            "imageUrl": stored.url,
            "user": UserProfile::from(updated),
        })),
    ))
}
