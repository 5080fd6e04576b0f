//! Pure path arithmetic shared by filesystem backends and the shell.
//!
//! Paths are `/`-separated and absolute after normalization; there is no
//! notion of a host filesystem here.

/// Collapses `.`, `..`, repeated and trailing slashes. Relative input is
/// treated as rooted at `/`. `..` above the root stays at the root.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}

/// Resolves `path` against `base` and normalizes the result.
#[must_use]
pub fn resolve_path(base: &str, path: &str) -> String {
    if path.starts_with('/') {
        normalize_path(path)
    } else if path.is_empty() {
        normalize_path(base)
    } else {
        normalize_path(&format!("{base}/{path}"))
    }
}

/// Parent of a normalized path; `None` for the root.
#[must_use]
pub fn parent_path(path: &str) -> Option<String> {
    let path = normalize_path(path);
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) | None => Some("/".to_string()),
        Some(idx) => Some(path[..idx].to_string()),
    }
}

/// Last component of a path, or `/` for the root.
#[must_use]
pub fn file_name(path: &str) -> String {
    let path = normalize_path(path);
    if path == "/" {
        return path;
    }
    path.rsplit('/').next().unwrap_or_default().to_string()
}

/// Joins a directory and a child name without doubling the separator.
#[must_use]
pub fn join_path(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_components() {
        assert_eq!(normalize_path("/a//b/./c/"), "/a/b/c");
        assert_eq!(normalize_path("/a/b/../c"), "/a/c");
        assert_eq!(normalize_path("/../.."), "/");
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("rel/x"), "/rel/x");
    }

    #[test]
    fn resolve_relative_and_absolute() {
        assert_eq!(resolve_path("/home/user", "docs"), "/home/user/docs");
        assert_eq!(resolve_path("/home/user", "../other"), "/home/other");
        assert_eq!(resolve_path("/home/user", "/etc/hosts"), "/etc/hosts");
        assert_eq!(resolve_path("/home/user", ""), "/home/user");
        assert_eq!(resolve_path("/", "."), "/");
    }

    #[test]
    fn parent_and_name() {
        assert_eq!(parent_path("/a/b"), Some("/a".to_string()));
        assert_eq!(parent_path("/a"), Some("/".to_string()));
        assert_eq!(parent_path("/"), None);
        assert_eq!(file_name("/a/b.txt"), "b.txt");
        assert_eq!(file_name("/"), "/");
    }

    #[test]
    fn join_handles_root() {
        assert_eq!(join_path("/", "etc"), "/etc");
        assert_eq!(join_path("/etc", "hosts"), "/etc/hosts");
    }
}
