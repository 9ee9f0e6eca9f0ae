//! Executable search-path resolution.
//!
//! Turns a `PATH`-style string into an ordered list of candidate
//! directory prefixes, mirroring execvp's default-search semantics.
//! No I/O happens here: existence and executability are discovered
//! only by attempting execution.

/// Search path used when `PATH` is absent or empty.
pub const DEFAULT_PATH: &str = ":/bin:/usr/bin";

/// Split a search-path string into candidate directory prefixes.
///
/// An empty segment means "current directory". A string of N
/// colon-separated segments yields exactly N candidates.
pub fn search_dirs(path_env: Option<&str>) -> Vec<String> {
    let path = match path_env {
        Some(p) if !p.is_empty() => p,
        _ => DEFAULT_PATH,
    };

    path.split(':')
        .map(|segment| {
            if segment.is_empty() {
                ".".to_string()
            } else {
                segment.to_string()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_segment_count_is_preserved() {
        let dirs = search_dirs(Some("/usr/bin:/bin:/usr/local/bin"));
        assert_eq!(dirs, vec!["/usr/bin", "/bin", "/usr/local/bin"]);
    }

    #[test]
    fn test_empty_segments_mean_current_directory() {
        let dirs = search_dirs(Some(":/bin::/usr/bin:"));
        assert_eq!(dirs, vec![".", "/bin", ".", "/usr/bin", "."]);
    }

    #[test]
    fn test_absent_path_uses_default() {
        let dirs = search_dirs(None);
        assert_eq!(dirs, vec![".", "/bin", "/usr/bin"]);
    }

    #[test]
    fn test_empty_path_uses_default() {
        assert_eq!(search_dirs(Some("")), search_dirs(None));
    }

    #[test]
    fn test_single_segment() {
        assert_eq!(search_dirs(Some("/opt/bin")), vec!["/opt/bin"]);
    }
}
