//! Cache key derivation.
//!
//! Every cache entry and every action endpoint is addressed by a [`CacheKey`] rendered from a
//! [`PathTemplate`] and a set of [`Params`]. Call sites never build key strings by hand, so two
//! subscribers asking for the same resource always land on the same entry.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use url::Url;

/// Scratch origin used to percent-encode path segments; never requested.
const RENDER_ORIGIN: &str = "http://marketsync.invalid/";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("path template `{template}` is invalid: {reason}")]
    InvalidTemplate { template: String, reason: String },
}

impl KeyError {
    fn invalid(template: &str, reason: impl Into<String>) -> Self {
        Self::InvalidTemplate {
            template: template.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Segment {
    Literal(String),
    Param(String),
}

/// An endpoint path such as `/api/products/{id}/postscript`.
///
/// Placeholders occupy a whole path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathTemplate {
    source: Arc<str>,
    segments: Vec<Segment>,
}

impl PathTemplate {
    pub fn parse(template: &str) -> Result<Self, KeyError> {
        let Some(rest) = template.strip_prefix('/') else {
            return Err(KeyError::invalid(template, "must start with `/`"));
        };

        let mut segments = Vec::new();
        for raw in rest.split('/') {
            if raw.is_empty() {
                return Err(KeyError::invalid(template, "contains an empty segment"));
            }

            let segment = match raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(name) => {
                    if name.is_empty() || name.contains(['{', '}']) {
                        return Err(KeyError::invalid(
                            template,
                            format!("bad placeholder `{raw}`"),
                        ));
                    }
                    Segment::Param(name.to_string())
                }
                None => {
                    if raw.contains(['{', '}']) {
                        return Err(KeyError::invalid(
                            template,
                            format!("placeholder must fill the whole segment: `{raw}`"),
                        ));
                    }
                    Segment::Literal(raw.to_string())
                }
            };
            segments.push(segment);
        }

        Ok(Self {
            source: Arc::from(template),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Names of the placeholders, in path order.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    pub fn derive(&self, params: &Params) -> CacheKey {
        derive_key(self, params)
    }

    fn render(&self, params: &Params) -> Option<String> {
        let mut url = Url::parse(RENDER_ORIGIN).ok()?;
        {
            let mut path = url.path_segments_mut().ok()?;
            path.clear();
            for segment in &self.segments {
                match segment {
                    Segment::Literal(text) => {
                        path.push(text);
                    }
                    Segment::Param(name) => {
                        let value = params.get(name)?;
                        if value.is_empty() || value == "." || value == ".." {
                            return None;
                        }
                        path.push(value);
                    }
                }
            }
        }
        Some(url.path().to_string())
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Dynamic values for a template's placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(BTreeMap<String, String>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.0.insert(name.to_string(), value.into());
        self
    }

    /// Adds `value` when present; a missing route parameter leaves the placeholder unfilled.
    pub fn with_opt(self, name: &str, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(value) => self.with(name, value),
            None => self,
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

/// Identity of one cached resource view.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// A required parameter was missing. Never resolves to cached data.
    Inactive,
    Resource { path: String },
}

impl CacheKey {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Resource { .. })
    }

    /// The percent-encoded request path, or `None` for an inactive key.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Inactive => None,
            Self::Resource { path, .. } => Some(path),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inactive => f.write_str("<inactive>"),
            Self::Resource { path, .. } => f.write_str(path),
        }
    }
}

/// Derive the canonical key for `template` filled with `params`.
///
/// Fails closed: any placeholder without a non-empty value yields [`CacheKey::Inactive`].
pub fn derive_key(template: &PathTemplate, params: &Params) -> CacheKey {
    match template.render(params) {
        Some(path) => CacheKey::Resource { path },
        None => CacheKey::Inactive,
    }
}
