use std::path::{Path, PathBuf};

const MARKER_DIR: &str = ".testdrive";
const MARKER_FILE: &str = "config.toml";

/// Walk upward from `start_dir` looking for `.testdrive/config.toml`,
/// stopping at the first match, at a `.git` directory, or at the
/// filesystem root — mirroring this codebase's own config-discovery
/// convention, generalized to testdrive's own marker file.
pub fn discover_config_file_from(start_dir: &Path) -> Option<PathBuf> {
    let mut dir = Some(start_dir.to_path_buf());
    while let Some(current) = dir {
        let candidate = current.join(MARKER_DIR).join(MARKER_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
        if current.join(".git").exists() {
            return None;
        }
        dir = current.parent().map(|p| p.to_path_buf());
    }
    None
}

pub fn discover_config_file() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    discover_config_file_from(&cwd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn finds_marker_in_start_dir() {
        let root = tempdir().unwrap();
        fs::create_dir_all(root.path().join(".testdrive")).unwrap();
        fs::write(root.path().join(".testdrive/config.toml"), "").unwrap();
        let found = discover_config_file_from(root.path()).unwrap();
        assert_eq!(found, root.path().join(".testdrive/config.toml"));
    }

    #[test]
    fn finds_marker_walking_up_from_a_subdirectory() {
        let root = tempdir().unwrap();
        fs::create_dir_all(root.path().join(".testdrive")).unwrap();
        fs::write(root.path().join(".testdrive/config.toml"), "").unwrap();
        let sub = root.path().join("a/b/c");
        fs::create_dir_all(&sub).unwrap();
        let found = discover_config_file_from(&sub).unwrap();
        assert_eq!(found, root.path().join(".testdrive/config.toml"));
    }

    #[test]
    fn stops_at_git_boundary() {
        let root = tempdir().unwrap();
        let sub = root.path().join("repo/a/b");
        fs::create_dir_all(&sub).unwrap();
        fs::create_dir_all(root.path().join("repo/.git")).unwrap();
        // marker lives above the .git boundary and must not be found
        fs::create_dir_all(root.path().join(".testdrive")).unwrap();
        fs::write(root.path().join(".testdrive/config.toml"), "").unwrap();

        assert!(discover_config_file_from(&sub).is_none());
    }

    #[test]
    fn returns_none_when_nothing_found() {
        let root = tempdir().unwrap();
        assert!(discover_config_file_from(root.path()).is_none());
    }
}
