//! Immutable, content-addressed snapshots of a directory hierarchy.
//!
//! A [`SourceTree`] never changes after construction. Every "write" returns a
//! new tree that shares unchanged file blobs with its parent, so a stage can
//! hand its output to the next stage without copying file contents and a
//! failed stage never disturbs the tree it was given.

use crate::error::{Result, ShipyardError};
use crate::paths;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

pub type Blob = Arc<[u8]>;

/// Permission bits of files created without an explicit mode.
pub const FILE_MODE: u32 = 0o644;
/// Permission bits of executables such as `node_modules/.bin` targets.
pub const EXEC_MODE: u32 = 0o755;

const MAX_LINK_HOPS: usize = 40;

/// One node of a [`SourceTree`]. Directories are implied by paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    File { contents: Blob, mode: u32 },
    /// Link target exactly as stored on disk, usually relative to the
    /// link's directory.
    Symlink { target: String },
}

impl Entry {
    fn file(contents: impl AsRef<[u8]>, mode: u32) -> Self {
        Entry::File {
            contents: Blob::from(contents.as_ref()),
            mode,
        }
    }
}

#[derive(Clone, Default, PartialEq, Eq)]
pub struct SourceTree {
    files: Arc<BTreeMap<String, Entry>>,
}

impl fmt::Debug for SourceTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceTree")
            .field("entries", &self.files.len())
            .field("digest", &self.digest())
            .finish()
    }
}

impl SourceTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree of regular [`FILE_MODE`] files from `(path, contents)` pairs.
    pub fn from_files<P, C, I>(files: I) -> Result<Self>
    where
        P: AsRef<str>,
        C: AsRef<[u8]>,
        I: IntoIterator<Item = (P, C)>,
    {
        let mut map = BTreeMap::new();
        for (path, contents) in files {
            map.insert(file_key(path.as_ref())?, Entry::file(contents, FILE_MODE));
        }
        Ok(Self {
            files: Arc::new(map),
        })
    }

    /// Snapshot a directory on disk. Directories whose name appears in
    /// `exclude` are skipped at any depth. Symlinks are recorded as links,
    /// never followed, and file permission bits are kept.
    pub fn from_dir(root: &Path, exclude: &[&str]) -> Result<Self> {
        if !root.is_dir() {
            return Err(ShipyardError::NotFound(root.display().to_string()));
        }
        let mut map = BTreeMap::new();
        walk(root, "", exclude, &mut map)?;
        Ok(Self {
            files: Arc::new(map),
        })
    }

    /// Write every entry of the tree below `dest`, creating directories as
    /// needed. Modes and symlinks are restored.
    pub fn materialize(&self, dest: &Path) -> Result<()> {
        std::fs::create_dir_all(dest)?;
        for (path, entry) in self.files.iter() {
            let target = dest.join(path);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            match entry {
                Entry::File { contents, mode } => {
                    std::fs::write(&target, contents)?;
                    disk::set_mode(&target, *mode)?;
                }
                Entry::Symlink { target: link } => disk::symlink(link, &target)?,
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        paths::normalize(path)
            .map(|p| self.files.contains_key(&p))
            .unwrap_or(false)
    }

    /// The entry stored at `path`, without following symlinks.
    pub fn entry(&self, path: &str) -> Option<&Entry> {
        let key = paths::normalize(path).ok()?;
        self.files.get(&key)
    }

    /// Permission bits of the regular file at `path`.
    pub fn mode(&self, path: &str) -> Option<u32> {
        match self.entry(path)? {
            Entry::File { mode, .. } => Some(*mode),
            Entry::Symlink { .. } => None,
        }
    }

    /// Contents of the file at `path`. Relative symlinks inside the tree
    /// are followed; links that leave the tree or dangle are `NotFound`.
    pub fn read_bytes(&self, path: &str) -> Result<Blob> {
        let mut key = paths::normalize(path)?;
        for _ in 0..MAX_LINK_HOPS {
            match self.files.get(&key) {
                Some(Entry::File { contents, .. }) => return Ok(Arc::clone(contents)),
                Some(Entry::Symlink { target }) => {
                    key = resolve_link(&key, target)
                        .ok_or_else(|| ShipyardError::NotFound(key.clone()))?;
                }
                None => return Err(ShipyardError::NotFound(key)),
            }
        }
        Err(ShipyardError::NotFound(key))
    }

    /// Read a UTF-8 file. Fails with `NotFound` if the path is absent.
    pub fn read_file(&self, path: &str) -> Result<String> {
        let blob = self.read_bytes(path)?;
        String::from_utf8(blob.to_vec()).map_err(|e| {
            ShipyardError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("{path}: {e}"),
            ))
        })
    }

    /// A new tree with a [`FILE_MODE`] file at `path`; an existing entry is
    /// replaced.
    pub fn with_new_file(&self, path: &str, contents: impl AsRef<[u8]>) -> Result<Self> {
        self.with_entry(path, Entry::file(contents, FILE_MODE))
    }

    pub fn with_file_mode(&self, path: &str, contents: impl AsRef<[u8]>, mode: u32) -> Result<Self> {
        self.with_entry(path, Entry::file(contents, mode))
    }

    pub fn with_symlink(&self, path: &str, target: impl Into<String>) -> Result<Self> {
        self.with_entry(
            path,
            Entry::Symlink {
                target: target.into(),
            },
        )
    }

    fn with_entry(&self, path: &str, entry: Entry) -> Result<Self> {
        let key = file_key(path)?;
        let mut files = Arc::clone(&self.files);
        Arc::make_mut(&mut files).insert(key, entry);
        Ok(Self { files })
    }

    /// A new tree with every entry of `src` placed under `mount`.
    /// Entries from `src` win on path collision.
    pub fn with_directory(&self, mount: &str, src: &SourceTree) -> Result<Self> {
        let mount = paths::normalize(mount)?;
        if mount.is_empty() && self.is_empty() {
            return Ok(src.clone());
        }
        let mut files = Arc::clone(&self.files);
        let map = Arc::make_mut(&mut files);
        for (path, entry) in src.files.iter() {
            map.insert(paths::join(&mount, path), entry.clone());
        }
        Ok(Self { files })
    }

    /// The subtree rooted at `path`, with paths made relative to it.
    /// A missing directory yields an empty tree.
    pub fn directory(&self, path: &str) -> Result<Self> {
        let dir = paths::normalize(path)?;
        if dir.is_empty() {
            return Ok(self.clone());
        }
        let prefix = format!("{dir}/");
        let map: BTreeMap<String, Entry> = self
            .files
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, v)| (k[prefix.len()..].to_string(), v.clone()))
            .collect();
        Ok(Self {
            files: Arc::new(map),
        })
    }

    /// Hex sha256 over every path, its kind, mode and content, in path order.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for (path, entry) in self.files.iter() {
            hasher.update(path.as_bytes());
            hasher.update([0u8]);
            let (tag, mode, body): (u8, u32, &[u8]) = match entry {
                Entry::File { contents, mode } => (b'f', *mode, &contents[..]),
                Entry::Symlink { target } => (b'l', 0, target.as_bytes()),
            };
            hasher.update([tag]);
            hasher.update(mode.to_le_bytes());
            hasher.update((body.len() as u64).to_le_bytes());
            hasher.update(body);
        }
        hex(&hasher.finalize())
    }
}

fn file_key(path: &str) -> Result<String> {
    let key = paths::normalize(path)?;
    if key.is_empty() {
        return Err(ShipyardError::InvalidPath(path.to_string()));
    }
    Ok(key)
}

/// Tree key a relative link at `link` points to, or `None` when the target
/// is absolute or climbs above the root.
fn resolve_link(link: &str, target: &str) -> Option<String> {
    if target.starts_with('/') {
        return None;
    }
    let mut parts: Vec<&str> = link.split('/').collect();
    parts.pop();
    for seg in target.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            s => parts.push(s),
        }
    }
    Some(parts.join("/"))
}

fn walk(
    dir: &Path,
    prefix: &str,
    exclude: &[&str],
    out: &mut BTreeMap<String, Entry>,
) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let file_type = entry.file_type()?;
        let rel = paths::join(prefix, &name);
        if file_type.is_symlink() {
            let target = std::fs::read_link(entry.path())?;
            out.insert(
                rel,
                Entry::Symlink {
                    target: target.to_string_lossy().into_owned(),
                },
            );
        } else if file_type.is_dir() {
            if exclude.contains(&name.as_str()) {
                continue;
            }
            walk(&entry.path(), &rel, exclude, out)?;
        } else if file_type.is_file() {
            let mode = disk::mode(&entry.metadata()?);
            let data = std::fs::read(entry.path())?;
            out.insert(rel, Entry::file(data, mode));
        } else {
            tracing::debug!(path = %rel, "skipping special file");
        }
    }
    Ok(())
}

#[cfg(unix)]
mod disk {
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    pub fn mode(meta: &std::fs::Metadata) -> u32 {
        meta.permissions().mode() & 0o777
    }

    pub fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
    }

    pub fn symlink(target: &str, link: &Path) -> std::io::Result<()> {
        std::os::unix::fs::symlink(target, link)
    }
}

#[cfg(not(unix))]
mod disk {
    use std::path::Path;

    pub fn mode(_meta: &std::fs::Metadata) -> u32 {
        super::FILE_MODE
    }

    pub fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
        Ok(())
    }

    pub fn symlink(target: &str, link: &Path) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            format!("cannot create symlink {} -> {target}", link.display()),
        ))
    }
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> SourceTree {
        SourceTree::from_files([
            ("firebase.json", "{}"),
            ("web/package.json", "{\"name\":\"web\"}"),
            ("web/src/main.ts", "console.log(1)"),
            ("functions/index.js", "exports.x = 1"),
        ])
        .unwrap()
    }

    #[test]
    fn read_missing_file_is_not_found() {
        let tree = sample();
        assert!(matches!(
            tree.read_file("web/.env"),
            Err(ShipyardError::NotFound(_))
        ));
    }

    #[test]
    fn with_new_file_leaves_original_unchanged() {
        let tree = sample();
        let next = tree.with_new_file("web/.env", "A=1\n").unwrap();
        assert!(!tree.contains("web/.env"));
        assert_eq!(next.read_file("web/.env").unwrap(), "A=1\n");
        assert_ne!(tree.digest(), next.digest());
    }

    #[test]
    fn with_directory_later_merge_wins() {
        let base = sample();
        let overlay = SourceTree::from_files([("package.json", "{\"name\":\"new\"}")]).unwrap();
        let merged = base.with_directory("web", &overlay).unwrap();
        assert_eq!(
            merged.read_file("web/package.json").unwrap(),
            "{\"name\":\"new\"}"
        );
        assert!(merged.contains("web/src/main.ts"));
        assert_eq!(
            base.read_file("web/package.json").unwrap(),
            "{\"name\":\"web\"}"
        );
    }

    #[test]
    fn directory_strips_prefix() {
        let web = sample().directory("./web/").unwrap();
        let paths: Vec<&str> = web.paths().collect();
        assert_eq!(paths, vec!["package.json", "src/main.ts"]);
        assert!(sample().directory("missing").unwrap().is_empty());
    }

    #[test]
    fn directory_does_not_match_sibling_prefixes() {
        let tree = SourceTree::from_files([("web/a", "1"), ("web-admin/b", "2")]).unwrap();
        let web = tree.directory("web").unwrap();
        assert_eq!(web.len(), 1);
    }

    #[test]
    fn digest_depends_on_content_only() {
        let a = SourceTree::from_files([("x", "1"), ("y", "2")]).unwrap();
        let b = SourceTree::from_files([("y", "2"), ("x", "1")]).unwrap();
        assert_eq!(a.digest(), b.digest());
        let c = a.with_new_file("x", "changed").unwrap();
        assert_ne!(a.digest(), c.digest());
    }

    #[test]
    fn root_file_path_is_rejected() {
        assert!(matches!(
            SourceTree::new().with_new_file("/", "x"),
            Err(ShipyardError::InvalidPath(_))
        ));
    }

    #[test]
    fn disk_round_trip_honours_excludes() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("web/node_modules/left-pad")).unwrap();
        std::fs::write(dir.path().join("web/package.json"), "{}").unwrap();
        std::fs::write(dir.path().join("web/node_modules/left-pad/index.js"), "x").unwrap();

        let tree = SourceTree::from_dir(dir.path(), &["node_modules"]).unwrap();
        assert_eq!(tree.paths().collect::<Vec<_>>(), vec!["web/package.json"]);

        let out = TempDir::new().unwrap();
        tree.materialize(out.path()).unwrap();
        assert_eq!(
            std::fs::read_to_string(out.path().join("web/package.json")).unwrap(),
            "{}"
        );
    }

    #[test]
    fn reads_follow_relative_symlinks() {
        let tree = SourceTree::from_files([("node_modules/vite/bin/vite.js", "#!/usr/bin/env node")])
            .unwrap()
            .with_symlink("node_modules/.bin/vite", "../vite/bin/vite.js")
            .unwrap();
        assert_eq!(
            tree.read_file("node_modules/.bin/vite").unwrap(),
            "#!/usr/bin/env node"
        );
        assert_eq!(tree.mode("node_modules/.bin/vite"), None);

        let escaping = tree.with_symlink("outside", "../../etc/passwd").unwrap();
        assert!(matches!(
            escaping.read_file("outside"),
            Err(ShipyardError::NotFound(_))
        ));
        let looped = tree.with_symlink("a", "b").unwrap().with_symlink("b", "a").unwrap();
        assert!(looped.read_bytes("a").is_err());
    }

    #[test]
    fn digest_covers_mode_and_link_targets() {
        let plain = SourceTree::new().with_new_file("run.sh", "echo").unwrap();
        let exec = SourceTree::new().with_file_mode("run.sh", "echo", EXEC_MODE).unwrap();
        assert_ne!(plain.digest(), exec.digest());

        let a = SourceTree::new().with_symlink("l", "x").unwrap();
        let b = SourceTree::new().with_symlink("l", "y").unwrap();
        assert_ne!(a.digest(), b.digest());
    }

    #[cfg(unix)]
    #[test]
    fn disk_round_trip_keeps_symlinks_and_modes() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let bin = dir.path().join("node_modules/vite/bin");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules/.bin")).unwrap();
        std::fs::write(bin.join("vite.js"), "#!/usr/bin/env node").unwrap();
        std::fs::set_permissions(bin.join("vite.js"), std::fs::Permissions::from_mode(0o755))
            .unwrap();
        std::os::unix::fs::symlink(
            "../vite/bin/vite.js",
            dir.path().join("node_modules/.bin/vite"),
        )
        .unwrap();

        let tree = SourceTree::from_dir(dir.path(), &[]).unwrap();
        assert_eq!(
            tree.paths().collect::<Vec<_>>(),
            vec!["node_modules/.bin/vite", "node_modules/vite/bin/vite.js"]
        );
        assert_eq!(tree.mode("node_modules/vite/bin/vite.js"), Some(EXEC_MODE));
        assert_eq!(
            tree.entry("node_modules/.bin/vite"),
            Some(&Entry::Symlink {
                target: "../vite/bin/vite.js".into()
            })
        );

        let out = TempDir::new().unwrap();
        tree.materialize(out.path()).unwrap();
        let script = out.path().join("node_modules/vite/bin/vite.js");
        let mode = std::fs::metadata(&script).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
        let link = out.path().join("node_modules/.bin/vite");
        assert!(std::fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(
            std::fs::read_link(&link).unwrap(),
            std::path::PathBuf::from("../vite/bin/vite.js")
        );
        assert_eq!(std::fs::read_to_string(&link).unwrap(), "#!/usr/bin/env node");
        assert_eq!(SourceTree::from_dir(out.path(), &[]).unwrap(), tree);
    }
}
