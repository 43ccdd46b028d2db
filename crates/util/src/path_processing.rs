use std::path::PathBuf;

use dirs_next::home_dir;

/// Expands a leading `~` to the current user's home directory.
///
/// Paths without the prefix, or hosts without a resolvable home directory,
/// are returned as written.
pub fn expand_tilde(path: &str) -> PathBuf {
    let trimmed = path.trim();
    let remainder = match trimmed {
        "~" => Some(""),
        other => other.strip_prefix("~/").or_else(|| other.strip_prefix("~\\")),
    };
    match (remainder, home_dir()) {
        (Some(""), Some(home)) => home,
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(trimmed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_absolute_paths_untouched() {
        assert_eq!(expand_tilde("/tmp/hacksmith"), PathBuf::from("/tmp/hacksmith"));
    }

    #[test]
    fn trims_surrounding_whitespace() {
        assert_eq!(expand_tilde("  ./out  "), PathBuf::from("./out"));
    }

    #[test]
    fn expands_home_prefix() {
        let Some(home) = home_dir() else {
            return;
        };
        assert_eq!(expand_tilde("~/.config/hacksmith"), home.join(".config/hacksmith"));
        assert_eq!(expand_tilde("~"), home);
    }
}
