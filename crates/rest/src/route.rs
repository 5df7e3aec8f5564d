//! Routes and rate-limit bucket keys.

use reqwest::Method;

/// A resolved API route.
///
/// The `template` keeps its path parameters unsubstituted; the `path` is
/// the concrete request target. All routes sharing a template share one
/// rate-limit bucket, regardless of the ids substituted into the path.
#[derive(Debug, Clone)]
pub struct Route {
    method: Method,
    template: &'static str,
    path: String,
}

impl Route {
    /// Create a route from a template and its resolved path.
    #[must_use]
    pub fn new(method: Method, template: &'static str, path: impl Into<String>) -> Self {
        Self {
            method,
            template,
            path: path.into(),
        }
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Route template with parameters unsubstituted.
    #[must_use]
    pub const fn template(&self) -> &'static str {
        self.template
    }

    /// Concrete request path, relative to the API base URL.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Rate-limit bucket key for this route.
    ///
    /// The template itself is the key: ids never participate, so
    /// `channels/{id}/messages` is one bucket for every channel.
    #[must_use]
    pub const fn bucket(&self) -> &'static str {
        self.template
    }
}
