//! The startup error page.
//!
//! When startup errors are captured, the host serves this page for every
//! request instead of failing to start.

use std::fmt::Write as _;

use bytes::Bytes;
use http::header::{CACHE_CONTROL, CONTENT_TYPE};
use http::{HeaderValue, StatusCode};
use portico_core::RequestHandler;

const TITLE: &str = "An error occurred while starting the application.";

/// Builds a handler answering every request with `500` and an HTML page.
///
/// The page always shows the error message. With `detailed` set it also
/// lists each cause.
#[must_use]
pub fn startup_error_page(error: &anyhow::Error, detailed: bool) -> RequestHandler {
    let body = Bytes::from(render(error, detailed));
    RequestHandler::new(move |ctx| {
        let body = body.clone();
        Box::pin(async move {
            let response = ctx.response_mut();
            response.clear();
            response.set_status(StatusCode::INTERNAL_SERVER_ERROR);
            response.insert_header(
                CONTENT_TYPE,
                HeaderValue::from_static("text/html; charset=utf-8"),
            );
            response.insert_header(CACHE_CONTROL, HeaderValue::from_static("no-cache, no-store"));
            response.write(&body[..]);
            Ok(())
        })
    })
}

fn render(error: &anyhow::Error, detailed: bool) -> String {
    let mut html = String::from(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\" />\n\
         <title>Application startup error</title>\n</head>\n<body>\n",
    );
    let _ = writeln!(html, "<h1>{TITLE}</h1>");

    let _ = writeln!(html, "<h2>{}</h2>", escape_html(&error.to_string()));
    if detailed {
        for cause in error.chain().skip(1) {
            let _ = writeln!(html, "<p>Caused by: {}</p>", escape_html(&cause.to_string()));
        }
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use portico_core::HttpContext;

    fn context() -> HttpContext {
        HttpContext::new(http::Request::builder().uri("/").body(Bytes::new()).unwrap())
    }

    #[tokio::test]
    async fn test_detailed_page_lists_causes() {
        let error = anyhow::anyhow!("connection refused").context("database <primary> unavailable");
        let handler = startup_error_page(&error, true);

        let mut ctx = context();
        handler.invoke(&mut ctx).await.unwrap();

        let body = String::from_utf8(ctx.response().body().to_vec()).unwrap();
        assert_eq!(ctx.response().status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("database &lt;primary&gt; unavailable"));
        assert!(body.contains("Caused by: connection refused"));
        assert_eq!(
            ctx.response().headers()[CONTENT_TYPE],
            "text/html; charset=utf-8"
        );
    }

    #[tokio::test]
    async fn test_plain_page_shows_message_without_causes() {
        let error = anyhow::anyhow!("connection refused").context("database unavailable");
        let handler = startup_error_page(&error, false);

        let mut ctx = context();
        handler.invoke(&mut ctx).await.unwrap();

        let body = String::from_utf8(ctx.response().body().to_vec()).unwrap();
        assert_eq!(ctx.response().status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains(TITLE));
        assert!(body.contains("<h2>database unavailable</h2>"));
        assert!(!body.contains("Caused by"));
        assert!(!body.contains("connection refused"));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a<b>&\"c'"), "a&lt;b&gt;&amp;&quot;c&#39;");
    }
}
