use dirs::data_dir;
use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};
use std::{
    fs,
    path::{Path, PathBuf},
};

static DATA_ROOT: Lazy<PathBuf> = Lazy::new(|| {
    let base = data_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    let root = base.join("gigdog");
    if let Err(err) = fs::create_dir_all(&root) {
        tracing::warn!(path = ?root, error = %err, "failed to create data root");
    }
    root
});

pub fn data_root() -> PathBuf {
    DATA_ROOT.clone()
}

pub fn database_path() -> PathBuf {
    data_root().join("gigdog.sqlite")
}

pub fn config_path() -> PathBuf {
    data_root().join("config.json")
}

pub fn bucket_root() -> PathBuf {
    data_root().join("buckets")
}

pub fn ensure_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Err(err) = fs::create_dir_all(parent) {
            tracing::warn!(path = ?parent, error = %err, "failed to create parent directory");
        }
    }
}

/// Hex sha256 of the parts joined with `|`, used for row ids and object keys.
pub fn stable_id(parts: &[&str]) -> String {
    hex_digest(parts.join("|").as_bytes())
}

pub fn hex_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_ids_are_deterministic() {
        let a = stable_id(&["pup", "the pageant", "2030-05-01"]);
        let b = stable_id(&["pup", "the pageant", "2030-05-01"]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, stable_id(&["pup", "the pageant", "2030-05-02"]));
    }

    #[test]
    fn ensure_parent_creates_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a").join("b").join("file.txt");
        ensure_parent(&path);
        assert!(path.parent().map(Path::exists).unwrap_or(false));
    }
}
