//! The fixed list of resources that must be available offline.

use url::Url;

use crate::Error;

/// Ordered, immutable list of absolute resource paths cached at install time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackManifest {
    paths: Vec<String>,
}

impl FallbackManifest {
    /// Build a manifest. Duplicate paths keep their first position.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if the list is empty or a path is not
    /// absolute.
    pub fn new<I, S>(paths: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for path in paths {
            let path = path.into();
            if !path.starts_with('/') {
                return Err(Error::InvalidInput(format!("fallback path must start with '/': {path}")));
            }
            if !unique.contains(&path) {
                unique.push(path);
            }
        }

        if unique.is_empty() {
            return Err(Error::InvalidInput("fallback manifest must not be empty".into()));
        }

        Ok(Self { paths: unique })
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.iter().any(|p| p == path)
    }

    /// Resolve every path against the origin base URL, in manifest order.
    pub fn resolve(&self, base: &Url) -> Result<Vec<Url>, Error> {
        self.paths
            .iter()
            .map(|path| base.join(path).map_err(|e| Error::InvalidUrl(format!("{path}: {e}"))))
            .collect()
    }
}

impl Default for FallbackManifest {
    fn default() -> Self {
        Self { paths: vec!["/maintenance.html".into(), "/404.html".into()] }
    }
}
