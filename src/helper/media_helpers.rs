use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use actix_multipart::Multipart;
use actix_web::{web, web::BytesMut};
use chrono::Utc;
use futures_util::StreamExt;
use log::warn;
use rand::Rng;

use crate::config::Config;
use crate::helper::OpError;
use crate::models::FileType;

const SNIFF_BYTES: usize = 512;
const THUMBNAIL_WIDTH: u32 = 300;
const THUMBNAIL_HEIGHT: u32 = 200;

/// Extensions that land in the images bucket; everything else goes to
/// documents.
const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "webp"];

/// Everything known about an uploaded file once it sits in its bucket.
#[derive(Debug)]
pub struct SavedFile {
    pub filename: String,
    pub original_filename: String,
    pub file_type: FileType,
    pub mime_type: String,
    pub file_size: i64,
    pub file_path: PathBuf,
    pub thumbnail_path: Option<PathBuf>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub description: Option<String>,
    pub alt_text: Option<String>,
}

/// Streams a multipart upload to disk. The file field is validated
/// against the configured extension allow-list before a single byte is
/// written, size-capped mid-stream, MIME-sniffed from its leading bytes,
/// and measured for dimensions plus a thumbnail when it is an image.
pub async fn save_upload(config: &Config, mut payload: Multipart) -> Result<SavedFile, OpError> {
    let allowed_extensions = config.allowed_extension_set();
    let max_bytes = config.max_upload_bytes;
    let max_mb = max_bytes / (1024 * 1024);

    let mut file_path = PathBuf::new();
    let mut stored_filename = String::new();
    let mut original_filename = String::new();
    let mut file_size: u64 = 0;
    let mut head: Vec<u8> = Vec::with_capacity(SNIFF_BYTES);
    let mut description: Option<String> = None;
    let mut alt_text: Option<String> = None;

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(bad_upload)?;
        let field_name = field
            .content_disposition()
            .get_name()
            .unwrap_or_default()
            .to_string();

        match field_name.as_str() {
            "file" => {
                let client_name = field
                    .content_disposition()
                    .get_filename()
                    .unwrap_or_default()
                    .to_string();
                if client_name.is_empty() {
                    return Err(OpError::Validation("No file selected".to_string()));
                }

                let sanitized = sanitize_filename(&client_name);
                let extension = match file_extension(&sanitized) {
                    Some(ext) => ext,
                    None => {
                        return Err(OpError::Validation("File type not allowed".to_string()))
                    }
                };
                if !allowed_extensions.contains(&extension) {
                    return Err(OpError::Validation("File type not allowed".to_string()));
                }

                original_filename = client_name;
                stored_filename = unique_filename(&sanitized);
                let bucket = bucket_for(config, &extension);

                // Use web::block for ALL blocking file system operations
                web::block({
                    let bucket_clone = bucket.clone();
                    move || fs::create_dir_all(&bucket_clone)
                })
                .await??;

                let final_path = bucket.join(&stored_filename);
                file_path = final_path.clone();

                let mut f = web::block(move || fs::File::create(final_path)).await??;

                while let Some(chunk) = field.next().await {
                    let data = chunk.map_err(bad_upload)?;
                    file_size += data.len() as u64;
                    if file_size > max_bytes {
                        drop(f);
                        let _ = fs::remove_file(&file_path);
                        return Err(OpError::Validation(format!(
                            "File is too large. Maximum size is {}MB.",
                            max_mb
                        )));
                    }
                    if head.len() < SNIFF_BYTES {
                        let take = (SNIFF_BYTES - head.len()).min(data.len());
                        head.extend_from_slice(&data[..take]);
                    }
                    f = web::block(move || f.write_all(&data).map(|_| f)).await??;
                }
            }
            "description" | "alt_text" => {
                let mut data = BytesMut::new();
                while let Some(chunk) = field.next().await {
                    data.extend_from_slice(&chunk.map_err(bad_upload)?);
                }
                let value = String::from_utf8(data.to_vec())
                    .map_err(|_| OpError::Validation("Invalid UTF-8 in form field.".to_string()))?;
                if !value.trim().is_empty() {
                    if field_name == "description" {
                        description = Some(value);
                    } else {
                        alt_text = Some(value);
                    }
                }
            }
            _ => (),
        }
    }

    if file_path.as_os_str().is_empty() {
        return Err(OpError::Validation("No file selected".to_string()));
    }

    let mime_type = sniff_mime(&head, &original_filename);
    let file_type = FileType::from_mime(&mime_type);

    let mut width = None;
    let mut height = None;
    let mut thumbnail_path = None;
    if file_type == FileType::Image {
        let source = file_path.clone();
        let target = config.thumbnails_dir().join(&stored_filename);
        match web::block(move || probe_image(&source, &target)).await? {
            Ok((w, h, thumb)) => {
                width = Some(w as i64);
                height = Some(h as i64);
                thumbnail_path = thumb;
            }
            Err(err) => warn!("Could not process image '{}': {}", stored_filename, err),
        }
    }

    Ok(SavedFile {
        filename: stored_filename,
        original_filename,
        file_type,
        mime_type,
        file_size: file_size as i64,
        file_path,
        thumbnail_path,
        width,
        height,
        description,
        alt_text,
    })
}

fn bad_upload(err: actix_multipart::MultipartError) -> OpError {
    OpError::Validation(format!("Malformed upload: {}", err))
}

/// Keeps only filesystem-safe characters from a client-supplied name.
/// Path components are discarded, anything unusual becomes '_'.
pub fn sanitize_filename(original: &str) -> String {
    let base = original.rsplit(['/', '\\']).next().unwrap_or(original);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches(['.', '_']);
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn file_extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// Prefixes the stored name with the upload timestamp and a short random
/// tag so same-named or same-second uploads never collide.
fn unique_filename(sanitized: &str) -> String {
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let tag: u16 = rand::thread_rng().gen();
    format!("{}_{:04x}_{}", stamp, tag, sanitized)
}

fn bucket_for(config: &Config, extension: &str) -> PathBuf {
    if IMAGE_EXTENSIONS.contains(&extension) {
        config.images_dir()
    } else {
        config.documents_dir()
    }
}

/// Determines the MIME type from the first bytes of the file, falling
/// back to the filename extension when no known signature matches.
fn sniff_mime(head: &[u8], filename: &str) -> String {
    if head.starts_with(b"\x89PNG\r\n\x1a\n") {
        return "image/png".to_string();
    }
    if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return "image/jpeg".to_string();
    }
    if head.starts_with(b"GIF87a") || head.starts_with(b"GIF89a") {
        return "image/gif".to_string();
    }
    if head.len() >= 12 && head.starts_with(b"RIFF") && head[8..12] == *b"WEBP" {
        return "image/webp".to_string();
    }
    if head.starts_with(b"%PDF-") {
        return "application/pdf".to_string();
    }
    if head.starts_with(&[0xD0, 0xCF, 0x11, 0xE0]) {
        return "application/msword".to_string();
    }
    mime_guess::from_path(filename)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string()
}

/// Reads a written image back for its dimensions and renders a bounded
/// thumbnail into the thumbnails bucket. A thumbnail that cannot be
/// written is dropped; the dimensions still count.
fn probe_image(
    source: &Path,
    thumb_target: &Path,
) -> Result<(u32, u32, Option<PathBuf>), image::ImageError> {
    let img = image::open(source)?;
    let (width, height) = (img.width(), img.height());

    if let Some(parent) = thumb_target.parent() {
        fs::create_dir_all(parent)?;
    }
    let thumb = img.thumbnail(THUMBNAIL_WIDTH, THUMBNAIL_HEIGHT);
    match thumb.save(thumb_target) {
        Ok(()) => Ok((width, height, Some(thumb_target.to_path_buf()))),
        Err(err) => {
            warn!(
                "Could not write thumbnail '{}': {}",
                thumb_target.display(),
                err
            );
            Ok((width, height, None))
        }
    }
}

/// Best-effort removal used when the owning row is going away. A missing
/// file is not an error, anything else is logged and skipped.
pub fn remove_file_quietly(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!("Could not remove '{}': {}", path.display(), err);
        }
    }
}

pub fn remove_stored_files(file_path: &str, thumbnail_path: Option<&str>) {
    remove_file_quietly(Path::new(file_path));
    if let Some(thumb) = thumbnail_path {
        remove_file_quietly(Path::new(thumb));
    }
}
