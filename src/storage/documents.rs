//! Local document context
//!
//! Reads a directory of text files into a single string used as prompt context.

use crate::storage::StorageError;
use std::fs;
use std::path::{Path, PathBuf};

/// Concatenate every regular file in `dir`, each followed by a newline.
///
/// Files are read in file-name order. Subdirectories are ignored and files that
/// are not valid UTF-8 are skipped with a warning.
pub fn load_documents(dir: &Path) -> Result<String, StorageError> {
    if !dir.is_dir() {
        return Err(StorageError::NotADirectory(dir.to_path_buf()));
    }

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    let mut content = String::new();
    for path in &paths {
        match fs::read_to_string(path) {
            Ok(text) => {
                content.push_str(&text);
                content.push('\n');
            }
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                tracing::warn!("Skipping non UTF-8 document {}", path.display());
            }
            Err(e) => return Err(e.into()),
        }
    }

    tracing::info!(
        "Loaded {} documents ({} bytes) from {}",
        paths.len(),
        content.len(),
        dir.display()
    );
    Ok(content)
}

/// Prompt asking `question` against the loaded document `content`
pub fn context_prompt(content: &str, question: &str) -> String {
    format!("Context: {content}Question: {question}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documents_are_joined_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), "second").unwrap();
        fs::write(dir.path().join("a.txt"), "first").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("c.txt"), "ignored").unwrap();

        let content = load_documents(dir.path()).unwrap();
        assert_eq!(content, "first\nsecond\n");
    }

    #[test]
    fn test_binary_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.bin"), [0xff, 0xfe, 0x00]).unwrap();
        fs::write(dir.path().join("b.md"), "asset docs").unwrap();

        assert_eq!(load_documents(dir.path()).unwrap(), "asset docs\n");
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("docs");
        assert!(matches!(
            load_documents(&missing),
            Err(StorageError::NotADirectory(p)) if p == missing
        ));
    }

    #[test]
    fn test_context_prompt_format() {
        let prompt = context_prompt("Assets live in /assets.\n", "how to create asset?");
        assert_eq!(
            prompt,
            "Context: Assets live in /assets.\nQuestion: how to create asset?"
        );
    }
}
