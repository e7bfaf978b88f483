// ABOUTME: Filesystem path resolution for user-supplied configuration paths.
// ABOUTME: Expands a leading "~" to the home directory and absolutizes the result.

use std::env;
use std::path::{Path, PathBuf};

/// Resolve a user-supplied path to an absolute path.
///
/// A leading `~/` (or `~\` on Windows-style input) is replaced with the
/// user's home directory. The result is made absolute but is not checked
/// for existence; callers decide whether the file must exist.
pub fn resolve(path: &str) -> PathBuf {
    resolve_with_home(path, home_dir)
}

fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME").map(PathBuf::from)
}

/// Resolution with an injectable home lookup, so tests don't depend on
/// the environment.
fn resolve_with_home(path: &str, home: impl FnOnce() -> Option<PathBuf>) -> PathBuf {
    if let Some(rest) = strip_home_prefix(path) {
        if let Some(home) = home() {
            return absolutize(&home.join(rest));
        }
        // No home directory available; fall through and treat the
        // shorthand as a literal path.
    }
    absolutize(Path::new(path))
}

fn strip_home_prefix(path: &str) -> Option<&str> {
    path.strip_prefix("~/")
        .or_else(|| path.strip_prefix("~\\"))
}

fn absolutize(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn home_shorthand_is_expanded() {
        let resolved = resolve_with_home("~/.ssh/known_hosts", || Some(PathBuf::from("/home/alex")));
        assert_eq!(resolved, PathBuf::from("/home/alex/.ssh/known_hosts"));
    }

    #[test]
    fn backslash_shorthand_is_expanded() {
        let resolved = resolve_with_home("~\\keys/id_ed25519", || Some(PathBuf::from("/home/alex")));
        assert_eq!(resolved, PathBuf::from("/home/alex/keys/id_ed25519"));
    }

    #[test]
    fn absolute_path_is_unchanged() {
        let resolved = resolve_with_home("/etc/ssh/key", || Some(PathBuf::from("/home/alex")));
        assert_eq!(resolved, PathBuf::from("/etc/ssh/key"));
    }

    #[test]
    fn tilde_without_separator_is_not_expanded() {
        // "~backup/key" is a literal directory name, not a home shorthand.
        let resolved = resolve_with_home("/srv/~backup/key", || Some(PathBuf::from("/home/alex")));
        assert_eq!(resolved, PathBuf::from("/srv/~backup/key"));
    }

    #[test]
    fn relative_path_is_made_absolute() {
        let resolved = resolve_with_home("keys/id_rsa", || None);
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("keys/id_rsa"));
    }

    #[test]
    fn missing_home_leaves_shorthand_literal() {
        let resolved = resolve_with_home("~/key", || None);
        assert!(resolved.ends_with("~/key"));
    }

    #[test]
    fn resolution_does_not_require_existence() {
        let resolved = resolve_with_home("~/definitely/not/a/real/file", || {
            Some(PathBuf::from("/home/alex"))
        });
        assert_eq!(resolved, PathBuf::from("/home/alex/definitely/not/a/real/file"));
    }
}
