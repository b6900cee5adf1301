//! Deterministic names linking an image reference to its package file and artifact.
//!
//! Uploading and downloading usually happen in different jobs, so both sides derive
//! the same names from nothing but the image reference.

use std::fmt;

pub const ARTIFACT_PREFIX: &str = "action_image_artifact_";

fn is_invalid(c: char) -> bool {
    c.is_whitespace() || matches!(c, '>' | '<' | ':' | '"' | '|' | '*' | '?' | '/' | '\\')
}

/// Filesystem-safe package file name for `image`, e.g. `foo:latest` -> `foo_latest`.
pub fn resolve_package_name(image: &str) -> String {
    image
        .chars()
        .map(|c| if is_invalid(c) { '_' } else { c })
        .collect()
}

/// Artifact store key for `image`, e.g. `foo:latest` -> `action_image_artifact_foo_latest`.
pub fn resolve_artifact_name(image: &str) -> String {
    format!("{ARTIFACT_PREFIX}{}", resolve_package_name(image))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageNames {
    pub image: String,
    pub package_name: String,
    pub artifact_name: String,
}

impl ImageNames {
    pub fn resolve(image: &str) -> Self {
        Self {
            image: image.to_owned(),
            package_name: resolve_package_name(image),
            artifact_name: resolve_artifact_name(image),
        }
    }
}

impl fmt::Display for ImageNames {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "image={}", self.image)?;
        writeln!(f, "package={}", self.package_name)?;
        write!(f, "artifact={}", self.artifact_name)
    }
}
