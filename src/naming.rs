//! Destination path resolution for archived screenshots.
//!
//! Pure logic: (capture context, storage settings, save root) in, destination
//! path out. The only outside contact is the existence probe callers hand to
//! [`disambiguate`], which keeps the collision policy testable without a
//! filesystem.

use std::path::{Path, PathBuf};

use chrono::Local;

use crate::capture::CaptureContext;
use crate::config::{OrganizeMode, StorageConfig};

/// Sanitized tokens are cut to this many characters so window titles cannot
/// blow up filename length limits.
const MAX_TOKEN_LEN: usize = 50;

/// Stands in for `{window}`/`{app}` when the context has no usable value.
const FALLBACK_TOKEN: &str = "screen";

/// Resolves the destination path for one capture.
///
/// The filename comes from the configured template: chrono strftime
/// specifiers are expanded against the capture's local time, then the
/// `{window}` and `{app}` placeholders are substituted with sanitized
/// context values. The subdirectory follows the organization mode.
///
/// The result is deterministic for identical inputs; collision handling is
/// a separate step ([`disambiguate`]).
pub fn resolve(context: &CaptureContext, storage: &StorageConfig, root: &Path) -> PathBuf {
    let local_time = context.timestamp.with_timezone(&Local);

    let window = context
        .window_title
        .as_deref()
        .map(sanitize_token)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| FALLBACK_TOKEN.to_string());
    let app = context
        .application_name
        .as_deref()
        .map(sanitize_token)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| FALLBACK_TOKEN.to_string());

    // strftime first, tokens second: token text never reaches the formatter.
    let stem = local_time
        .format(&storage.filename_template)
        .to_string()
        .replace("{window}", &window)
        .replace("{app}", &app);
    let stem = if stem.is_empty() {
        "screenshot".to_string()
    } else {
        stem
    };

    let dir = match storage.organize {
        OrganizeMode::ByDate => root
            .join(local_time.format("%Y").to_string())
            .join(local_time.format("%m").to_string())
            .join(local_time.format("%d").to_string()),
        OrganizeMode::ByApplication => {
            let app_dir = context
                .application_name
                .as_deref()
                .map(sanitize_token)
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "unsorted".to_string());
            root.join(app_dir)
        }
        OrganizeMode::Flat => root.to_path_buf(),
    };

    dir.join(format!("{stem}.{}", storage.format.extension()))
}

/// Finds a free variant of `candidate` by appending `_1`, `_2`, ... before
/// the extension until `exists` says no. Never silently reuses a taken path.
pub fn disambiguate<F>(candidate: PathBuf, mut exists: F) -> PathBuf
where
    F: FnMut(&Path) -> bool,
{
    if !exists(&candidate) {
        return candidate;
    }

    let stem = candidate
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("screenshot")
        .to_string();
    let extension = candidate
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    let parent = candidate
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    let mut suffix = 1u64;
    loop {
        let next = parent.join(format!("{stem}_{suffix}{extension}"));
        if !exists(&next) {
            return next;
        }
        suffix += 1;
    }
}

/// Strips path-unsafe characters from a template token.
///
/// Unsafe characters and whitespace become underscores, runs collapse to a
/// single underscore, and the result is trimmed and truncated.
fn sanitize_token(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_underscore = false;

    for ch in raw.chars() {
        let mapped = match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '%' => '_',
            c if c.is_control() || c.is_whitespace() => '_',
            c => c,
        };

        if mapped == '_' {
            if !last_was_underscore {
                out.push('_');
            }
            last_was_underscore = true;
        } else {
            out.push(mapped);
            last_was_underscore = false;
        }
    }

    out.trim_matches('_').chars().take(MAX_TOKEN_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImageFormat;
    use chrono::{TimeZone, Utc};
    use std::collections::HashSet;

    fn context(window: Option<&str>, app: Option<&str>) -> CaptureContext {
        CaptureContext {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 5, 14, 30, 0).unwrap(),
            monitor_label: "DP-1".into(),
            window_title: window.map(str::to_string),
            application_name: app.map(str::to_string),
            width: 1920,
            height: 1080,
            mode_label: "fullscreen",
        }
    }

    fn storage(organize: OrganizeMode, template: &str) -> StorageConfig {
        StorageConfig {
            save_dir: "/unused".into(),
            organize,
            filename_template: template.into(),
            format: ImageFormat::Png,
        }
    }

    #[test]
    fn test_sanitize_token() {
        assert_eq!(sanitize_token("Fire/fox: Dev?"), "Fire_fox_Dev");
        assert_eq!(sanitize_token("  a   b  "), "a_b");
        assert_eq!(sanitize_token("***"), "");

        let long: String = "x".repeat(120);
        assert_eq!(sanitize_token(&long).len(), MAX_TOKEN_LEN);
    }

    #[test]
    fn window_token_falls_back_to_screen() {
        let path = resolve(
            &context(None, None),
            &storage(OrganizeMode::Flat, "shot_{window}"),
            Path::new("/shots"),
        );
        assert_eq!(path, PathBuf::from("/shots/shot_screen.png"));
    }

    #[test]
    fn by_date_builds_year_month_day_directories() {
        let ctx = context(Some("editor"), None);
        let path = resolve(
            &ctx,
            &storage(OrganizeMode::ByDate, "{window}"),
            Path::new("/shots"),
        );

        let local = ctx.timestamp.with_timezone(&Local);
        let expected = PathBuf::from("/shots")
            .join(local.format("%Y").to_string())
            .join(local.format("%m").to_string())
            .join(local.format("%d").to_string())
            .join("editor.png");
        assert_eq!(path, expected);
    }

    #[test]
    fn by_application_uses_sanitized_app_directory() {
        let path = resolve(
            &context(Some("doc"), Some("Libre Office")),
            &storage(OrganizeMode::ByApplication, "{window}"),
            Path::new("/shots"),
        );
        assert_eq!(path, PathBuf::from("/shots/Libre_Office/doc.png"));

        let fallback = resolve(
            &context(Some("doc"), None),
            &storage(OrganizeMode::ByApplication, "{window}"),
            Path::new("/shots"),
        );
        assert_eq!(fallback, PathBuf::from("/shots/unsorted/doc.png"));
    }

    #[test]
    fn strftime_specifiers_expand_with_local_time() {
        let ctx = context(None, Some("term"));
        let path = resolve(
            &ctx,
            &storage(OrganizeMode::Flat, "%Y%m%d_{app}"),
            Path::new("/shots"),
        );

        let local = ctx.timestamp.with_timezone(&Local);
        let expected = format!("{}_term.png", local.format("%Y%m%d"));
        assert_eq!(path.file_name().unwrap().to_str().unwrap(), expected);
    }

    #[test]
    fn test_disambiguate_appends_numeric_suffix() {
        let taken: HashSet<PathBuf> = [
            PathBuf::from("/shots/a.png"),
            PathBuf::from("/shots/a_1.png"),
        ]
        .into_iter()
        .collect();

        let free = disambiguate(PathBuf::from("/shots/a.png"), |p| taken.contains(p));
        assert_eq!(free, PathBuf::from("/shots/a_2.png"));

        let untouched = disambiguate(PathBuf::from("/shots/b.png"), |p| taken.contains(p));
        assert_eq!(untouched, PathBuf::from("/shots/b.png"));
    }
}
