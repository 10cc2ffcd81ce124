//! Windows drive paths in free text, rewritten for a POSIX-style shell.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// `X:\` or `X:/` not glued to a preceding word character (so `http://` is left alone).
static DRIVE_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|[^A-Za-z0-9_])([A-Za-z]):[\\/](\S*)").expect("static regex is valid")
});

/// Rewrite every `C:\Users\a` / `C:/Users/a` in `text` to `/c/Users/a`.
pub fn to_posix_drive_paths(text: &str) -> String {
    DRIVE_PATH_RE
        .replace_all(text, |caps: &Captures<'_>| {
            format!(
                "{}/{}/{}",
                &caps[1],
                caps[2].to_ascii_lowercase(),
                caps[3].replace('\\', "/")
            )
        })
        .into_owned()
}
