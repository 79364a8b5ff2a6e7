//! PC-010: BLAKE3 hashing for cache keys and build outputs.

use std::io::Read;
use std::path::Path;

const STREAM_BUF_SIZE: usize = 65536;

/// Length of a cache key in hex characters.
pub const KEY_LEN: usize = 16;

/// Shorten a digest to a cache key.
pub fn short_key(hash: &blake3::Hash) -> String {
    hash.to_hex()[..KEY_LEN].to_string()
}

/// Hash a file's contents. Returns `"blake3:{hex}"`.
pub fn hash_file(path: &Path) -> Result<String, String> {
    let mut file =
        std::fs::File::open(path).map_err(|e| format!("cannot open {}: {}", path.display(), e))?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = [0u8; STREAM_BUF_SIZE];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| format!("read error {}: {}", path.display(), e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("blake3:{}", hasher.finalize().to_hex()))
}

/// Hash a directory tree. Entries are visited in name order and each
/// contributes its path relative to `root` plus its file hash or link target.
pub fn hash_directory(root: &Path) -> Result<String, String> {
    let mut hasher = blake3::Hasher::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut children: Vec<_> = std::fs::read_dir(&dir)
            .map_err(|e| format!("cannot list {}: {}", dir.display(), e))?
            .collect::<Result<_, _>>()
            .map_err(|e| format!("cannot list {}: {}", dir.display(), e))?;
        children.sort_by_key(|e| e.file_name());

        let mut subdirs = Vec::new();
        for child in children {
            let path = child.path();
            let kind = child
                .file_type()
                .map_err(|e| format!("cannot stat {}: {}", path.display(), e))?;
            let digest = if kind.is_symlink() {
                let target = std::fs::read_link(&path)
                    .map_err(|e| format!("cannot read link {}: {}", path.display(), e))?;
                format!("link:{}", target.display())
            } else if kind.is_dir() {
                subdirs.push(path);
                continue;
            } else {
                hash_file(&path)?
            };
            let rel = path.strip_prefix(root).unwrap_or(&path);
            hasher.update(rel.to_string_lossy().as_bytes());
            hasher.update(b"\0");
            hasher.update(digest.as_bytes());
            hasher.update(b"\n");
        }
        // Reversed so the stack pops them in name order.
        pending.extend(subdirs.into_iter().rev());
    }
    Ok(format!("blake3:{}", hasher.finalize().to_hex()))
}

/// Hash whatever a build left at `path`: a file, a directory, or nothing.
pub fn hash_output(path: &Path) -> Result<Option<String>, String> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => hash_directory(path).map(Some),
        Ok(_) => hash_file(path).map(Some),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(format!("cannot stat {}: {}", path.display(), e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pc010_short_key() {
        let key = short_key(&blake3::hash(b"recipe"));
        assert_eq!(key.len(), KEY_LEN);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_pc010_hash_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out");
        std::fs::write(&path, "hi\n").unwrap();
        let h = hash_file(&path).unwrap();
        assert!(h.starts_with("blake3:"));
        assert_eq!(h.len(), 7 + 64);
        assert_eq!(h, hash_file(&path).unwrap());
    }

    #[test]
    fn test_pc010_hash_directory_creation_order() {
        let d1 = tempfile::tempdir().unwrap();
        std::fs::write(d1.path().join("b"), "bbb").unwrap();
        std::fs::write(d1.path().join("a"), "aaa").unwrap();

        let d2 = tempfile::tempdir().unwrap();
        std::fs::write(d2.path().join("a"), "aaa").unwrap();
        std::fs::write(d2.path().join("b"), "bbb").unwrap();

        assert_eq!(
            hash_directory(d1.path()).unwrap(),
            hash_directory(d2.path()).unwrap()
        );
    }

    #[test]
    fn test_pc010_hash_directory_nested_and_links() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("bin")).unwrap();
        std::fs::write(dir.path().join("bin").join("tool"), "#!/bin/sh").unwrap();
        let before = hash_directory(dir.path()).unwrap();

        #[cfg(unix)]
        {
            std::os::unix::fs::symlink("bin/tool", dir.path().join("tool")).unwrap();
            let after = hash_directory(dir.path()).unwrap();
            assert_ne!(before, after, "symlinks are part of an output");
        }
    }

    #[test]
    fn test_pc010_hash_output_kinds() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(hash_output(&dir.path().join("missing")).unwrap(), None);

        let file = dir.path().join("file");
        std::fs::write(&file, "x").unwrap();
        assert_eq!(hash_output(&file).unwrap(), Some(hash_file(&file).unwrap()));

        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        assert_eq!(
            hash_output(&sub).unwrap(),
            Some(hash_directory(&sub).unwrap())
        );
    }

    #[test]
    fn test_pc010_hash_file_not_found() {
        assert!(hash_file(Path::new("/nonexistent/out")).is_err());
    }
}
