//! Data directory layout.

use std::path::{Path, PathBuf};

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `LEDGERFLOW_DATA_DIR` environment variable
/// 2. `~/.ledgerflow` under the user's home directory
/// 3. `.ledgerflow` in the current directory
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("LEDGERFLOW_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".ledgerflow");
    }

    PathBuf::from(".ledgerflow")
}

/// Create the data directory if it does not exist yet.
pub async fn ensure_data_dir(data_dir: &Path) -> Result<(), std::io::Error> {
    tokio::fs::create_dir_all(data_dir).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_resolve_data_dir_env_override() {
        // SAFETY: test-only; no other thread in this test reads the variable.
        unsafe { std::env::set_var("LEDGERFLOW_DATA_DIR", "/tmp/ledgerflow-test") };
        let dir = resolve_data_dir();
        unsafe { std::env::remove_var("LEDGERFLOW_DATA_DIR") };
        assert_eq!(dir, PathBuf::from("/tmp/ledgerflow-test"));
    }

    #[tokio::test]
    async fn test_ensure_data_dir_creates_nested() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");

        ensure_data_dir(&nested).await.unwrap();
        assert!(nested.is_dir());
        // Second call is a no-op.
        ensure_data_dir(&nested).await.unwrap();
    }
}
