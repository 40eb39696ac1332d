use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{Error, Result};

// =============================================================================
// Image Reference
// =============================================================================

/// Tag or content digest selecting one version of a repository.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum ImageVersion {
    Tag(String),
    Digest(String),
}

/// Canonical image identifier (`[registry/]repo[:tag|@digest]`).
///
/// Two references are equal when their canonical names are equal, so
/// `redis` and `redis:latest` address the same cache entry.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ImageReference {
    registry: Option<String>,
    repository: String,
    version: ImageVersion,
}

/// Split `name:tag`, ignoring a `:` in the registry's port.
fn split_tag(raw: &str) -> Option<(&str, &str)> {
    let slash = raw.rfind('/').map(|i| i + 1).unwrap_or(0);
    raw[slash..]
        .rfind(':')
        .map(|i| (&raw[..slash + i], &raw[slash + i + 1..]))
}

impl ImageReference {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() || raw.chars().any(char::is_whitespace) {
            return Err(Error::InvalidReference(format!("'{}'", raw)));
        }

        let (name, version) = match raw.split_once('@') {
            Some((name, digest)) => {
                if !digest.contains(':') {
                    return Err(Error::InvalidReference(format!(
                        "'{}': digest must be algorithm:hex",
                        raw
                    )));
                }
                // The digest pins the image; a tag in front of it is ignored.
                let name = match split_tag(name) {
                    Some((repo, _)) => repo,
                    None => name,
                };
                (name, ImageVersion::Digest(digest.to_string()))
            }
            None => match split_tag(raw) {
                Some((name, tag)) => (name, ImageVersion::Tag(tag.to_string())),
                None => (raw, ImageVersion::Tag("latest".to_string())),
            },
        };

        if let ImageVersion::Tag(tag) = &version {
            if tag.is_empty() {
                return Err(Error::InvalidReference(format!("'{}': empty tag", raw)));
            }
        }

        let (registry, repository) = match name.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (Some(first.to_string()), rest)
            }
            _ => (None, name),
        };

        if repository.is_empty() || repository.split('/').any(str::is_empty) {
            return Err(Error::InvalidReference(format!(
                "'{}': empty repository component",
                raw
            )));
        }

        Ok(Self {
            registry,
            repository: repository.to_string(),
            version,
        })
    }

    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn version(&self) -> &ImageVersion {
        &self.version
    }

    pub fn canonical_name(&self) -> String {
        let mut name = String::new();
        if let Some(registry) = &self.registry {
            name.push_str(registry);
            name.push('/');
        }
        name.push_str(&self.repository);
        match &self.version {
            ImageVersion::Tag(tag) => {
                name.push(':');
                name.push_str(tag);
            }
            ImageVersion::Digest(digest) => {
                name.push('@');
                name.push_str(digest);
            }
        }
        name
    }
}

impl FromStr for ImageReference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical_name())
    }
}

// =============================================================================
// Image Metadata
// =============================================================================

/// One entry of a bulk image listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSummary {
    pub id: String,
    /// Declared repo tags; `None` for dangling images.
    pub repo_tags: Option<Vec<String>>,
    /// Creation time as unix seconds.
    pub created: i64,
    pub raw: serde_json::Value,
}

/// Result of inspecting a single image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInspect {
    pub id: String,
    pub repo_tags: Vec<String>,
    pub created: Option<DateTime<Utc>>,
    pub raw: serde_json::Value,
}

/// Cached metadata for a locally present image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageData {
    pub id: String,
    pub repo_tags: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    /// Engine payload the metadata was derived from.
    pub raw: serde_json::Value,
}

impl From<&ImageSummary> for ImageData {
    fn from(summary: &ImageSummary) -> Self {
        Self {
            id: summary.id.clone(),
            repo_tags: summary.repo_tags.clone().unwrap_or_default(),
            created_at: Utc.timestamp_opt(summary.created, 0).single(),
            raw: summary.raw.clone(),
        }
    }
}

impl From<ImageInspect> for ImageData {
    fn from(inspect: ImageInspect) -> Self {
        Self {
            id: inspect.id,
            repo_tags: inspect.repo_tags,
            created_at: inspect.created,
            raw: inspect.raw,
        }
    }
}
