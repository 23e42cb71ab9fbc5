use chrono::Utc;
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use uuid::Uuid;

/// Longest slug used in generated file names.
pub const SLUG_MAX_LEN: usize = 80;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("stored path is empty")]
    EmptyPath,
    #[error("stored path {0:?} is outside the storage root")]
    OutsideRoot(String),
    #[error("storage I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("fetching {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

/// Top-level directories under the storage root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Area {
    Templates,
    Data,
    Generated,
}

impl Area {
    pub const ALL: [Area; 3] = [Area::Templates, Area::Data, Area::Generated];

    pub fn dir(self) -> &'static str {
        match self {
            Area::Templates => "templates",
            Area::Data => "data",
            Area::Generated => "generated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub stored_name: String,
    /// Forward-slashed and relative to the storage root, e.g. `generated/x.pdf`.
    pub relative_path: String,
}

/// Local file storage plus read-only access to remote (http/https) blobs.
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
    http: reqwest::Client,
}

fn is_remote(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            http: reqwest::Client::new(),
        }
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for area in Area::ALL {
            std::fs::create_dir_all(self.root.join(area.dir()))?;
        }
        Ok(())
    }

    /// Absolute location of a stored relative path. Rejects anything that
    /// could climb out of the root.
    pub fn locate(&self, relative: &str) -> Result<PathBuf, StorageError> {
        let trimmed = relative.trim_start_matches('/');
        if trimmed.is_empty() {
            return Err(StorageError::EmptyPath);
        }
        let path = Path::new(trimmed);
        if !path.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(StorageError::OutsideRoot(relative.to_string()));
        }
        Ok(self.root.join(path))
    }

    /// Writes `bytes` as `<stem><extension>` in `area`; a random stem is used
    /// when `stem` is `None`.
    pub async fn save(
        &self,
        area: Area,
        bytes: &[u8],
        extension: &str,
        stem: Option<&str>,
    ) -> Result<StoredFile, StorageError> {
        let stored_name = match stem {
            Some(stem) => format!("{stem}{extension}"),
            None => format!("{}{extension}", Uuid::new_v4()),
        };
        let relative_path = format!("{}/{stored_name}", area.dir());
        let path = self.locate(&relative_path)?;

        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| StorageError::Io {
                path: path.clone(),
                source,
            })?;

        Ok(StoredFile {
            stored_name,
            relative_path,
        })
    }

    /// Reads a stored relative path, or downloads an http(s) URL.
    pub async fn read(&self, reference: &str) -> Result<Vec<u8>, StorageError> {
        if is_remote(reference) {
            return self.fetch(reference).await;
        }
        let path = self.locate(reference)?;
        tokio::fs::read(&path)
            .await
            .map_err(|source| StorageError::Io { path, source })
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, StorageError> {
        let fetch_err = |source| StorageError::Fetch {
            url: url.to_string(),
            source,
        };
        let response = self.http.get(url).send().await.map_err(fetch_err)?;
        if !response.status().is_success() {
            return Err(StorageError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        let body = response.bytes().await.map_err(fetch_err)?;
        Ok(body.to_vec())
    }

    /// Removes a stored file. A file that is already gone is fine, and remote
    /// references are left alone.
    pub async fn delete(&self, reference: &str) -> Result<(), StorageError> {
        if reference.is_empty() || is_remote(reference) {
            return Ok(());
        }
        let path = self.locate(reference)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }
}

/// File name for an attachment or download: the last path segment.
pub fn file_name_of(reference: &str) -> Option<&str> {
    let path = reference.split(['?', '#']).next().unwrap_or(reference);
    path.rsplit('/').next().filter(|name| !name.is_empty())
}

/// Public URL for a stored path. URLs pass through untouched.
pub fn public_url(base: Option<&str>, reference: &str) -> String {
    if is_remote(reference) {
        return reference.to_string();
    }
    let relative = reference.trim_start_matches('/');
    match base {
        Some(base) => format!("{}/storage/{relative}", base.trim_end_matches('/')),
        None => format!("/storage/{relative}"),
    }
}

fn non_alphanumeric() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("slug pattern is a valid regex"))
}

/// Lowercase `[a-z0-9-]` slug without leading or trailing dashes.
pub fn slugify(value: &str) -> String {
    let lowered = value.trim().to_lowercase();
    let dashed = non_alphanumeric().replace_all(&lowered, "-");
    let trimmed = dashed.trim_matches('-');
    let cut: String = trimmed.chars().take(SLUG_MAX_LEN).collect();
    cut.trim_end_matches('-').to_string()
}

/// `<name>-<event>-<participant id>-<unix millis>`, without extension.
///
/// Different names can share a slug, so the participant id keeps two files
/// written in the same millisecond apart.
pub fn certificate_stem(participant_id: i64, name: &str, event: Option<&str>) -> String {
    let name_slug = match slugify(name) {
        slug if slug.is_empty() => "participant".to_string(),
        slug => slug,
    };
    let event_slug = match event.map(slugify) {
        Some(slug) if !slug.is_empty() => slug,
        _ => "certificate".to_string(),
    };
    format!(
        "{name_slug}-{event_slug}-{participant_id}-{}",
        Utc::now().timestamp_millis()
    )
}

/// Extension (with dot) for an accepted template upload.
pub fn template_extension(file_name: &str, content_type: Option<&str>) -> Option<&'static str> {
    let by_mime = |mime: &str| match mime {
        "application/pdf" => Some(".pdf"),
        "image/png" => Some(".png"),
        "image/jpeg" | "image/jpg" => Some(".jpg"),
        _ => None,
    };
    content_type
        .and_then(by_mime)
        .or_else(|| mime_guess::from_path(file_name).first_raw().and_then(by_mime))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_are_lowercase_dashed_and_bounded() {
        assert_eq!(slugify("  Ada Lovelace "), "ada-lovelace");
        assert_eq!(slugify("Rust & Friends: 2024!"), "rust-friends-2024");
        assert_eq!(slugify("---"), "");
        assert_eq!(slugify("Zoë"), "zo");
        let long = "a".repeat(79) + " b";
        assert_eq!(slugify(&long), "a".repeat(79));
        assert_eq!(slugify(&"x".repeat(200)).len(), SLUG_MAX_LEN);
    }

    #[test]
    fn certificate_stem_falls_back_per_part() {
        let stem = certificate_stem(7, "Grace Hopper", Some("Compilers 101"));
        assert!(stem.starts_with("grace-hopper-compilers-101-7-"));

        let stem = certificate_stem(7, "李雷", None);
        assert!(stem.starts_with("participant-certificate-7-"));
        let millis = stem.rsplit('-').next().unwrap();
        assert!(millis.parse::<i64>().is_ok());
    }

    #[test]
    fn names_sharing_a_slug_get_distinct_stems() {
        assert_eq!(slugify("Zoë"), slugify("Zoé"));
        let first = certificate_stem(3, "Zoë", Some("Gala"));
        let second = certificate_stem(4, "Zoé", Some("Gala"));
        assert!(first.starts_with("zo-gala-3-"));
        assert!(second.starts_with("zo-gala-4-"));
        assert_ne!(first, second);
    }

    #[test]
    fn public_urls_use_the_configured_base() {
        assert_eq!(
            public_url(Some("https://certs.example.org/"), "generated/a.pdf"),
            "https://certs.example.org/storage/generated/a.pdf"
        );
        assert_eq!(public_url(None, "/generated/a.pdf"), "/storage/generated/a.pdf");
        assert_eq!(
            public_url(Some("https://x"), "https://blob.example/a.pdf"),
            "https://blob.example/a.pdf"
        );
    }

    #[test]
    fn file_names_come_from_the_last_segment() {
        assert_eq!(file_name_of("generated/a.pdf"), Some("a.pdf"));
        assert_eq!(file_name_of("https://blob.example/x/b.pdf?sig=1"), Some("b.pdf"));
        assert_eq!(file_name_of("generated/"), None);
    }

    #[test]
    fn template_types_are_detected() {
        assert_eq!(template_extension("award.PDF", None), Some(".pdf"));
        assert_eq!(template_extension("blob", Some("image/png")), Some(".png"));
        assert_eq!(template_extension("photo.jpeg", None), Some(".jpg"));
        assert_eq!(template_extension("notes.txt", None), None);
    }

    #[test]
    fn paths_cannot_escape_the_root() {
        let storage = Storage::new("/srv/storage");
        assert!(matches!(
            storage.locate("../etc/passwd"),
            Err(StorageError::OutsideRoot(_))
        ));
        assert!(matches!(storage.locate(""), Err(StorageError::EmptyPath)));
        assert_eq!(
            storage.locate("/templates/a.pdf").unwrap(),
            PathBuf::from("/srv/storage/templates/a.pdf")
        );
    }

    #[tokio::test]
    async fn save_read_and_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path());
        storage.ensure_dirs().unwrap();

        let stored = storage
            .save(Area::Generated, b"%PDF-1.5", ".pdf", Some("ada-demo-1"))
            .await
            .unwrap();
        assert_eq!(stored.relative_path, "generated/ada-demo-1.pdf");
        assert_eq!(storage.read(&stored.relative_path).await.unwrap(), b"%PDF-1.5");

        storage.delete(&stored.relative_path).await.unwrap();
        assert!(storage.read(&stored.relative_path).await.is_err());
        storage.delete(&stored.relative_path).await.unwrap();
    }

    #[tokio::test]
    async fn unnamed_saves_get_unique_names() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path());
        storage.ensure_dirs().unwrap();

        let a = storage.save(Area::Templates, b"a", ".png", None).await.unwrap();
        let b = storage.save(Area::Templates, b"b", ".png", None).await.unwrap();
        assert_ne!(a.stored_name, b.stored_name);
        assert!(a.relative_path.starts_with("templates/"));
    }
}
