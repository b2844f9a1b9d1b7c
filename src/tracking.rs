//! Tracking tokens, tracking URLs and redirect validation.

use std::sync::OnceLock;

use rand::Rng;
use regex::{Captures, Regex};
use url::Url;

/// Length of generated tracking tokens.
pub const TRACKING_TOKEN_LENGTH: usize = 32;

// No 0/O, 1/l/I.
const TOKEN_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz23456789";

/// 1x1 transparent PNG served by the open-tracking endpoint.
pub const TRANSPARENT_PIXEL_PNG: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f, 0x15, 0xc4,
    0x89, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x44, 0x41, 0x54, 0x78, 0xda, 0x63, 0x64, 0xf8, 0xcf, 0x50,
    0x0f, 0x00, 0x03, 0x86, 0x01, 0x80, 0x5a, 0x34, 0x7d, 0x6b, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45,
    0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

const BLOCKED_SCHEMES: [&str; 5] = ["javascript:", "data:", "vbscript:", "file:", "about:"];

const LOCAL_HOST: &str = "localhost";
const LOCAL_BASE: &str = "http://localhost/";

fn href_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)href=["']([^"']+)["']"#).expect("href pattern is a valid regex")
    })
}

/// Unpredictable token drawn from an unambiguous alphabet.
pub fn generate_tracking_token() -> String {
    let mut rng = rand::thread_rng();
    (0..TRACKING_TOKEN_LENGTH)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

pub fn open_tracking_url(app_url: &str, token: &str) -> String {
    format!("{}/track/open/{token}", app_url.trim_end_matches('/'))
}

pub fn click_tracking_url(app_url: &str, token: &str) -> String {
    format!("{}/track/click/{token}", app_url.trim_end_matches('/'))
}

/// Hidden image tag that reports an open when rendered.
pub fn pixel_html(app_url: &str, token: &str) -> String {
    format!(
        r#"<img src="{}" width="1" height="1" style="display:none;" alt="" />"#,
        open_tracking_url(app_url, token)
    )
}

/// Route every `href` through the click-tracking redirect.
///
/// Links already pointing at a tracking endpoint and `mailto:`/`tel:` links
/// are left as they are, so rewriting twice is a no-op.
pub fn rewrite_links(content: &str, app_url: &str, token: &str) -> String {
    let tracking_url = click_tracking_url(app_url, token);

    href_pattern()
        .replace_all(content, |caps: &Captures| {
            let original = &caps[1];
            let lowered = original.to_ascii_lowercase();
            if original.contains("/track/")
                || lowered.starts_with("mailto:")
                || lowered.starts_with("tel:")
            {
                return caps[0].to_string();
            }

            let encoded: String = url::form_urlencoded::byte_serialize(original.as_bytes()).collect();
            format!(r#"href="{tracking_url}?url={encoded}""#)
        })
        .into_owned()
}

/// Redirect target that is safe to send in a `Location` header.
///
/// Absolute http(s) URLs pass through. Script-capable and other schemes
/// collapse to `/`. Anything else is treated as a path on this host and
/// reduced to `path[?query][#fragment]`; if it would leave the host it
/// collapses to `/`.
pub fn safe_redirect(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return "/".to_string();
    }

    let lowered = trimmed.to_ascii_lowercase();
    if BLOCKED_SCHEMES
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return "/".to_string();
    }

    match Url::parse(trimmed) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.has_host() => {
            parsed.to_string()
        }
        Ok(_) => "/".to_string(),
        Err(_) => local_path(trimmed).unwrap_or_else(|| "/".to_string()),
    }
}

/// Resolve `target` against a fixed local base and keep only the path part.
fn local_path(target: &str) -> Option<String> {
    // Browsers read `\` as `/` and drop tabs and newlines, so either can turn
    // a path into a protocol-relative URL.
    if target.contains('\\') || target.chars().any(|c| c.is_ascii_control()) {
        return None;
    }

    let rooted = if target.starts_with('/') {
        target.to_string()
    } else {
        format!("/{target}")
    };
    if rooted.starts_with("//") {
        return None;
    }

    let resolved = Url::parse(LOCAL_BASE).ok()?.join(&rooted).ok()?;
    if resolved.host_str() != Some(LOCAL_HOST) {
        return None;
    }

    let mut path = resolved.path().to_string();
    if let Some(query) = resolved.query() {
        path.push('?');
        path.push_str(query);
    }
    if let Some(fragment) = resolved.fragment() {
        path.push('#');
        path.push_str(fragment);
    }
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_have_fixed_length_and_alphabet() {
        let token = generate_tracking_token();
        assert_eq!(token.len(), TRACKING_TOKEN_LENGTH);
        assert!(token.bytes().all(|b| TOKEN_ALPHABET.contains(&b)));
        assert_ne!(token, generate_tracking_token());
    }

    #[test]
    fn rewrite_routes_links_through_click_tracking() {
        let html = r#"<a href="https://example.com">x</a>"#;
        let rewritten = rewrite_links(html, "https://app.test/", "tok123");
        assert_eq!(
            rewritten,
            r#"<a href="https://app.test/track/click/tok123?url=https%3A%2F%2Fexample.com">x</a>"#
        );
        assert_eq!(rewrite_links(&rewritten, "https://app.test", "tok123"), rewritten);
    }

    #[test]
    fn rewrite_skips_mailto_tel_and_handles_single_quotes() {
        let html = r#"<a href="mailto:a@b.com">m</a><a HREF='tel:+123'>t</a><a href='https://x.io/?a=1&b=2'>q</a>"#;
        let rewritten = rewrite_links(html, "https://app.test", "t");
        assert!(rewritten.contains(r#"href="mailto:a@b.com""#));
        assert!(rewritten.contains("HREF='tel:+123'"));
        assert!(rewritten.contains(
            r#"href="https://app.test/track/click/t?url=https%3A%2F%2Fx.io%2F%3Fa%3D1%26b%3D2""#
        ));
    }

    #[test]
    fn safe_redirect_blocks_dangerous_schemes() {
        assert_eq!(safe_redirect("javascript:alert(1)"), "/");
        assert_eq!(safe_redirect("  JavaScript:alert(1)"), "/");
        assert_eq!(safe_redirect("data:text/html,<script>alert(1)</script>"), "/");
        assert_eq!(safe_redirect("vbscript:msgbox"), "/");
        assert_eq!(safe_redirect("file:///etc/passwd"), "/");
        assert_eq!(safe_redirect("about:blank"), "/");
        assert_eq!(safe_redirect("ftp://example.com/file"), "/");
        assert_eq!(safe_redirect("mailto:a@b.com"), "/");
        assert_eq!(safe_redirect(""), "/");
    }

    #[test]
    fn safe_redirect_keeps_http_and_roots_relative_paths() {
        assert_eq!(
            safe_redirect("https://example.com/welcome?x=1"),
            "https://example.com/welcome?x=1"
        );
        assert_eq!(safe_redirect("/dashboard"), "/dashboard");
        assert_eq!(safe_redirect("dashboard/settings"), "/dashboard/settings");
        assert_eq!(safe_redirect("//evil.example"), "/");
        assert_eq!(safe_redirect("/a/b?c=1#top"), "/a/b?c=1#top");
        assert_eq!(safe_redirect("/docs/../pricing"), "/pricing");
    }

    #[test]
    fn safe_redirect_never_leaves_the_host() {
        for target in [
            "\\evil.example",
            "\\\\evil.example",
            "/\\evil.example",
            "/\t/evil.example",
            "\t//evil.example",
            "/\n/evil.example",
            "///evil.example",
            "/x\\..\\..\\evil.example",
        ] {
            assert_eq!(safe_redirect(target), "/", "{target:?}");
        }
    }

    #[test]
    fn pixel_html_points_at_open_endpoint() {
        assert_eq!(
            pixel_html("https://app.test/", "abc"),
            r#"<img src="https://app.test/track/open/abc" width="1" height="1" style="display:none;" alt="" />"#
        );
    }

    #[test]
    fn pixel_is_a_png() {
        assert_eq!(&TRANSPARENT_PIXEL_PNG[..8], b"\x89PNG\r\n\x1a\n");
    }
}
