use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_KEY_LEN: usize = 1024;

/// Name of an object-storage bucket.
///
/// Kept apart from [`ObjectKey`] and from local paths so a bucket handle can
/// only ever come from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct BucketName(String);

impl BucketName {
    /// Parse a bucket name using S3 naming rules.
    pub fn parse(name: impl Into<String>) -> Result<Self, ObjectNameError> {
        let name = name.into();
        let valid_chars = name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.');
        let valid_edges = name
            .chars()
            .next()
            .zip(name.chars().last())
            .is_some_and(|(first, last)| first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric());

        if !(3..=63).contains(&name.len()) || !valid_chars || !valid_edges {
            return Err(ObjectNameError::InvalidBucket(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BucketName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key of an object inside a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Parse an object key. Keys must be relative and free of `.`/`..`
    /// segments because their last segment names a local staged file.
    pub fn parse(key: impl Into<String>) -> Result<Self, ObjectNameError> {
        let key = key.into();
        if key.is_empty() || key.len() > MAX_KEY_LEN || key.starts_with('/') {
            return Err(ObjectNameError::InvalidKey(key));
        }
        if key
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            return Err(ObjectNameError::InvalidKey(key));
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Final `/`-separated segment of the key.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Derive the key of a rescaled rendition: `videos/clip.mp4` at 360
    /// becomes `videos/clip_360p.mp4`. Fails when the longer name no longer
    /// fits the key length limit.
    pub fn rendition(&self, height: u32) -> Result<Self, ObjectNameError> {
        let file_name = self.file_name();
        let prefix = &self.0[..self.0.len() - file_name.len()];
        let renamed = match file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => format!("{stem}_{height}p.{ext}"),
            _ => format!("{file_name}_{height}p"),
        };
        Self::parse(format!("{prefix}{renamed}"))
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ObjectKey {
    type Error = ObjectNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ObjectKey> for String {
    fn from(key: ObjectKey) -> Self {
        key.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ObjectNameError {
    #[error("Invalid bucket name: {0:?}")]
    InvalidBucket(String),

    #[error("Invalid object key: {0:?}")]
    InvalidKey(String),
}
