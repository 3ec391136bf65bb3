//! Image link repair ahead of PDF rendering.
//!
//! Exports produced on Windows hosts carry path separators URL-encoded as
//! `%5C` inside image links, which wkhtmltopdf cannot resolve. Every `src`
//! and `srcset` on `<img>` and `<source>` elements has `%5C` (any case)
//! replaced with `/`. All other markup is passed through untouched, and
//! running the rewrite twice gives the same result as running it once.

use crate::error::ConvertError;
use lol_html::html_content::Element;
use lol_html::{element, rewrite_str, RewriteStrSettings};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::debug;

static RE_ESCAPED_BACKSLASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)%5c").unwrap());

const LINK_ATTRIBUTES: [&str; 2] = ["src", "srcset"];

fn fix_attributes(el: &mut Element<'_, '_>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    for name in LINK_ATTRIBUTES {
        if let Some(value) = el.get_attribute(name) {
            if RE_ESCAPED_BACKSLASH.is_match(&value) {
                let fixed = RE_ESCAPED_BACKSLASH.replace_all(&value, "/");
                el.set_attribute(name, &fixed)?;
            }
        }
    }
    Ok(())
}

/// Rewrite image links in an HTML string.
pub fn rewrite_image_links(html: &str) -> Result<String, ConvertError> {
    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("img", |el| fix_attributes(el)),
                element!("source", |el| fix_attributes(el)),
            ],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|e| ConvertError::Internal(format!("HTML rewrite failed: {}", e)))
}

/// Rewrite image links in an HTML file in place, returning its path.
pub async fn rewrite_file(html: &Path) -> Result<PathBuf, ConvertError> {
    let text = tokio::fs::read_to_string(html).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ConvertError::MissingArtifact {
            path: html.to_path_buf(),
        },
        _ => ConvertError::io(html, e),
    })?;

    let rewritten = rewrite_image_links(&text)?;
    if rewritten != text {
        tokio::fs::write(html, &rewritten)
            .await
            .map_err(|e| ConvertError::io(html, e))?;
        debug!("Rewrote image links in {}", html.display());
    }
    Ok(html.to_path_buf())
}
