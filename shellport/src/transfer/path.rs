//! Remote path handling.
//!
//! Remote paths are POSIX strings regardless of the local platform, so they
//! are handled as text rather than through `std::path`.

/// Home directory marker as rendered by shell prompts.
pub const HOME_MARKER: &str = "~";

/// Normalize a POSIX path: collapse `.`/`..` segments and repeated
/// separators, keeping a trailing separator.
///
/// An empty path normalizes to `.`. Leading `..` segments of a relative
/// path are kept; on an absolute path they stop at the root.
pub fn normalize(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }

    let absolute = path.starts_with('/');
    let trailing = path.ends_with('/');

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ if absolute => {}
                _ => segments.push(".."),
            },
            _ => segments.push(segment),
        }
    }

    let mut normalized = segments.join("/");
    if normalized.is_empty() && !absolute {
        normalized.push('.');
    }
    if trailing && !normalized.is_empty() {
        normalized.push('/');
    }
    if absolute {
        normalized.insert(0, '/');
    }
    normalized
}

/// Final segment of a path, ignoring trailing separators.
pub fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(pos) => &trimmed[pos + 1..],
        None => trimmed,
    }
}

/// Combine a user-supplied remote path with the working directory shown by
/// the prompt.
///
/// Absolute paths are only normalized. When the directory is the home
/// marker the path is left relative, since the SFTP server resolves
/// relative paths against the login directory. Otherwise a leading `~` in
/// the directory is replaced by `.` for the same reason and the path is
/// joined onto it, so an empty directory yields a path under `/`.
pub fn resolve_remote_path(path: &str, directory: &str) -> String {
    if path.starts_with('/') || directory == HOME_MARKER {
        return normalize(path);
    }

    let directory = match directory.strip_prefix(HOME_MARKER) {
        Some(rest) => format!(".{rest}"),
        None => directory.to_string(),
    };
    normalize(&format!("{directory}/{path}"))
}
