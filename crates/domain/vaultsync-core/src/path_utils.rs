pub struct SyncPath;

impl SyncPath {
    /// Standardize directory separators to forward slashes.
    /// This is the key format shared by local and remote snapshots.
    pub fn normalize(path: &str) -> String {
        path.replace('\\', "/")
    }

    /// Join a parent key and a child name into a snapshot key.
    pub fn join(parent: &str, name: &str) -> String {
        if parent.is_empty() {
            name.to_string()
        } else {
            format!("{parent}/{name}")
        }
    }

    /// Remote names are untrusted: they become local paths on download.
    /// Accepts only relative, non-empty components without `.` or `..`.
    /// A `\` is refused rather than normalized: the file would land under a
    /// different key than the remote name, and the two would never match.
    pub fn verify_safe(rel_path: &str) -> bool {
        if rel_path.is_empty() || rel_path.starts_with('/') || rel_path.contains('\\') {
            return false;
        }
        // Drive letters, e.g. `C:/x`.
        if rel_path.len() > 1 && rel_path.as_bytes()[1] == b':' {
            return false;
        }
        rel_path
            .split('/')
            .all(|c| !c.is_empty() && c != "." && c != "..")
    }
}
