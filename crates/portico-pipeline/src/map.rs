//! Path-prefix branching.

use portico_core::{BoxFuture, HandlerResult, HttpContext, RequestHandler};

use crate::middleware::Middleware;

/// Dispatches requests under a path prefix to a separate branch.
#[derive(Debug)]
pub struct MapMiddleware {
    path_match: String,
    branch: RequestHandler,
}

impl MapMiddleware {
    /// Creates a map over `path_match`. A trailing `/` is ignored.
    #[must_use]
    pub fn new(path_match: &str, branch: RequestHandler) -> Self {
        Self {
            path_match: path_match.trim_end_matches('/').to_string(),
            branch,
        }
    }

    /// Returns the prefix this middleware matches.
    #[must_use]
    pub fn path_match(&self) -> &str {
        &self.path_match
    }
}

impl Middleware for MapMiddleware {
    fn name(&self) -> &'static str {
        "map"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut HttpContext,
        next: RequestHandler,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let Some(remaining) = strip_segment_prefix(ctx.path(), &self.path_match) else {
                return next.invoke(ctx).await;
            };

            let original_path = ctx.path().to_string();
            let original_base = ctx.path_base().to_string();
            ctx.set_path_base(format!("{original_base}{}", self.path_match));
            ctx.set_path(remaining);

            let result = self.branch.invoke(ctx).await;

            ctx.set_path(original_path);
            ctx.set_path_base(original_base);
            result
        })
    }
}

/// Strips `prefix` from `path` when it matches whole segments.
///
/// Matching ignores ASCII case. Returns the remainder, which is empty or
/// starts with `/`.
fn strip_segment_prefix(path: &str, prefix: &str) -> Option<String> {
    let head = path.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }
    let rest = &path[prefix.len()..];
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest.to_string())
    } else {
        None
    }
}
