//! Destination object key computation: the timestamped auto key and the
//! `%...%` template pass.

use chrono::Utc;

/// Per-attempt inputs available to a key template.
#[derive(Debug, Clone, Copy)]
pub struct KeyContext<'a> {
    pub filename: &'a str,
    pub folder: &'a str,
}

/// Epoch milliseconds; the clock behind every date placeholder.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Extension used for generated keys: everything after the last `.`, or the
/// whole name when there is no dot.
pub fn file_extension(filename: &str) -> &str {
    filename.rsplit('.').next().unwrap_or(filename)
}

/// Default key scheme: `{folder}{now_ms}-{token}.{ext}`.
pub fn auto_key(folder: &str, now_ms: i64, token: &str, ext: &str) -> String {
    format!("{folder}{now_ms}-{token}.{ext}")
}

/// Expand a key template in a single left-to-right pass.
///
/// Only the first occurrence of each placeholder is substituted, and every
/// date placeholder samples `clock` independently, so `%uploader.date%` and
/// `%uploader.date_ms%` inside one template can disagree by a few
/// milliseconds.
pub fn expand_template(
    template: &str,
    ctx: &KeyContext<'_>,
    mut clock: impl FnMut() -> i64,
) -> String {
    let mut key = template.replacen("%file.name%", ctx.filename, 1);
    key = key.replacen("%file.ext%", file_extension(ctx.filename), 1);
    key = key.replacen("%uploader.folder%", ctx.folder, 1);
    if key.contains("%uploader.date%") {
        key = key.replacen("%uploader.date%", &clock().to_string(), 1);
    }
    if key.contains("%uploader.date_ms%") {
        key = key.replacen("%uploader.date_ms%", &clock().to_string(), 1);
    }
    if key.contains("%uploader.date_sec%") {
        key = key.replacen("%uploader.date_sec%", &(clock() / 1000).to_string(), 1);
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composes_the_default_key_scheme() {
        assert_eq!(
            auto_key("docs/", 1_700_000_000_000, "abcdef0123456789", "pdf"),
            "docs/1700000000000-abcdef0123456789.pdf"
        );
        assert_eq!(auto_key("", 1, "t", "png"), "1-t.png");
    }

    #[test]
    fn substitutes_folder_and_name_placeholders() {
        let ctx = KeyContext {
            filename: "cat.png",
            folder: "uploads/",
        };
        assert_eq!(
            expand_template("%uploader.folder%%file.name%", &ctx, || 0),
            "uploads/cat.png"
        );
        assert_eq!(expand_template("static/%file.ext%", &ctx, || 0), "static/png");
    }

    #[test]
    fn substitutes_only_the_first_occurrence_per_placeholder() {
        let ctx = KeyContext {
            filename: "cat.png",
            folder: "",
        };
        assert_eq!(
            expand_template("%file.ext%/%file.ext%", &ctx, || 0),
            "png/%file.ext%"
        );
    }

    #[test]
    fn date_placeholders_sample_the_clock_independently() {
        let ctx = KeyContext {
            filename: "cat.png",
            folder: "",
        };
        let mut ticks = [1000_i64, 2000, 5000].into_iter();
        let expanded = expand_template(
            "%uploader.date%-%uploader.date_ms%-%uploader.date_sec%",
            &ctx,
            move || ticks.next().expect("clock sample"),
        );
        assert_eq!(expanded, "1000-2000-5");
    }

    #[test]
    fn extension_is_everything_after_the_last_dot() {
        assert_eq!(file_extension("archive.tar.gz"), "gz");
        assert_eq!(file_extension("report.pdf"), "pdf");
        assert_eq!(file_extension("README"), "README");
        assert_eq!(file_extension(".env"), "env");
        assert_eq!(file_extension("trailing."), "");
    }
}
