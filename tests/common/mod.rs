//! Shared test helpers.

/// Create a temporary directory that auto-cleans on drop.
pub fn temp_test_dir() -> tempfile::TempDir {
    tempfile::TempDir::new().expect("failed to create temp directory")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_test_dir() {
        let dir = temp_test_dir();
        assert!(dir.path().exists());
    }
}
