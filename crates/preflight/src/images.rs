//! Collaborators the probes consume but do not own: image lookup and the
//! decrypted database connection string.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Logical image names used by the probes.
pub const NGINX: &str = "nginx";
pub const NETCAT: &str = "netcat";
pub const MONGO: &str = "mongo";

/// Maps a logical image name to a pullable reference.
#[cfg_attr(test, mockall::automock)]
pub trait ImageResolver: Send + Sync {
    fn resolve(&self, logical: &str) -> Option<String>;
}

/// Resolve `logical` or fail before any object is created.
///
/// # Errors
///
/// Returns [`Error::Configuration`] when no mapping exists.
pub fn require_image(images: &dyn ImageResolver, logical: &str) -> Result<String> {
    images
        .resolve(logical)
        .filter(|reference| !reference.trim().is_empty())
        .ok_or_else(|| Error::Configuration(format!("no image configured for '{logical}'")))
}

/// Fixed image table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticImages {
    images: BTreeMap<String, String>,
}

impl Default for StaticImages {
    fn default() -> Self {
        Self::empty()
            .with_image(NGINX, "docker.io/library/nginx:1.27-alpine")
            .with_image(NETCAT, "docker.io/subfuzion/netcat:latest")
            .with_image(MONGO, "docker.io/library/mongo:7.0")
    }
}

impl StaticImages {
    /// A table with no mappings at all.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            images: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_image(mut self, logical: &str, reference: &str) -> Self {
        self.images.insert(logical.to_string(), reference.to_string());
        self
    }

    /// Apply `name=reference` overrides, as passed on the command line.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for entries without `=`.
    pub fn with_overrides<'a>(
        mut self,
        overrides: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self> {
        for entry in overrides {
            let (logical, reference) = entry.split_once('=').ok_or_else(|| {
                Error::Configuration(format!("image override '{entry}' must be name=reference"))
            })?;
            self.images
                .insert(logical.trim().to_string(), reference.trim().to_string());
        }
        Ok(self)
    }
}

impl ImageResolver for StaticImages {
    fn resolve(&self, logical: &str) -> Option<String> {
        self.images.get(logical).cloned()
    }
}

/// Yields the decrypted database connection string, if one is configured.
#[cfg_attr(test, mockall::automock)]
pub trait ConnectionSource: Send + Sync {
    /// # Errors
    ///
    /// Implementations fail when the stored secret cannot be decrypted.
    fn connection_string(&self) -> Result<Option<String>>;
}

/// Connection string known up front.
#[derive(Clone, Default)]
pub struct StaticConnection(pub Option<String>);

impl ConnectionSource for StaticConnection {
    fn connection_string(&self) -> Result<Option<String>> {
        Ok(self.0.clone())
    }
}

impl std::fmt::Debug for StaticConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(_) => write!(f, "StaticConnection(<redacted>)"),
            None => write!(f, "StaticConnection(None)"),
        }
    }
}
