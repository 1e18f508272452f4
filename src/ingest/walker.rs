use walkdir::WalkDir;
use std::path::{Path, PathBuf};
use crate::error::Result;

/// Find every `.json` file under `root`, sorted by path.
pub fn discover_files(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(crate::error::RelgraphError::Config(format!(
            "{} is not a directory",
            root.display()
        )));
    }

    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|s| s.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        })
        .collect();
    files.sort();

    log::info!("Discovered {} resource files in {}", files.len(), root.display());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use std::fs;

    #[test]
    fn test_discover_files() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::create_dir_all(root.join("bundles/2024")).unwrap();
        fs::write(root.join("patient.json"), "{}").unwrap();
        fs::write(root.join("UPPER.JSON"), "{}").unwrap();
        fs::write(root.join("bundles/2024/visit.json"), "{}").unwrap();
        fs::write(root.join("notes.txt"), "skip me").unwrap();

        let files = discover_files(root).unwrap();
        assert_eq!(files.len(), 3);
        assert!(files.iter().any(|f| f.ends_with("bundles/2024/visit.json")));
        assert!(!files.iter().any(|f| f.ends_with("notes.txt")));
    }

    #[test]
    fn test_discover_files_not_a_directory() {
        let temp_dir = TempDir::new().unwrap();
        assert!(discover_files(&temp_dir.path().join("missing")).is_err());
    }
}
