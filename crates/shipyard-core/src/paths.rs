use crate::error::{Result, ShipyardError};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Container mount points
// ---------------------------------------------------------------------------

pub const SOURCE_MOUNT: &str = "/src";
pub const GIT_MOUNT: &str = "/app";
pub const CREDENTIALS_FILE: &str = "/auth/gcp-credentials.json";

// ---------------------------------------------------------------------------
// Project files
// ---------------------------------------------------------------------------

pub const PACKAGE_JSON: &str = "package.json";
pub const PACKAGE_LOCK: &str = "package-lock.json";
pub const DOTENV: &str = ".env";
pub const CONFIG_FILE: &str = "shipyard.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// Normalize a tree-relative path: `/`-separated, no leading `./` or `/`,
/// no empty or `.` segments. `..` is rejected.
///
/// The empty string denotes the tree root.
pub fn normalize(path: &str) -> Result<String> {
    let mut parts = Vec::new();
    for seg in path.split(['/', '\\']) {
        match seg {
            "" | "." => continue,
            ".." => return Err(ShipyardError::InvalidPath(path.to_string())),
            s => parts.push(s),
        }
    }
    Ok(parts.join("/"))
}

/// Join two tree-relative paths, either of which may be the root.
pub fn join(base: &str, rel: &str) -> String {
    match (base.is_empty(), rel.is_empty()) {
        (true, _) => rel.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{base}/{rel}"),
    }
}

/// Absolute container path of a project subdirectory under the source mount.
pub fn source_mount(dir: Option<&str>) -> Result<String> {
    match dir {
        Some(d) => {
            let rel = normalize(d)?;
            Ok(absolute(SOURCE_MOUNT, &rel))
        }
        None => Ok(SOURCE_MOUNT.to_string()),
    }
}

/// `mount` joined with a tree-relative path.
pub fn absolute(mount: &str, rel: &str) -> String {
    if rel.is_empty() {
        mount.to_string()
    } else {
        format!("{}/{}", mount.trim_end_matches('/'), rel)
    }
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_noise() {
        assert_eq!(normalize("./web//src/").unwrap(), "web/src");
        assert_eq!(normalize("/functions").unwrap(), "functions");
        assert_eq!(normalize(".").unwrap(), "");
        assert_eq!(normalize("").unwrap(), "");
    }

    #[test]
    fn normalize_rejects_parent_segments() {
        for p in ["..", "web/../..", "../etc/passwd"] {
            assert!(
                matches!(normalize(p), Err(ShipyardError::InvalidPath(_))),
                "expected invalid: {p}"
            );
        }
    }

    #[test]
    fn source_mount_paths() {
        assert_eq!(source_mount(None).unwrap(), "/src");
        assert_eq!(source_mount(Some("web")).unwrap(), "/src/web");
        assert_eq!(source_mount(Some("./apps/web/")).unwrap(), "/src/apps/web");
        assert_eq!(source_mount(Some(".")).unwrap(), "/src");
    }

    #[test]
    fn join_handles_root() {
        assert_eq!(join("", "a"), "a");
        assert_eq!(join("a", ""), "a");
        assert_eq!(join("a", "b/c"), "a/b/c");
    }
}
