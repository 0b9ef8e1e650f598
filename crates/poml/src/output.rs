//! Where encoded payloads are written.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{PomlError, Result};

/// Destination for an encoded payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputDestination {
    /// Write to standard output, newline-terminated.
    #[default]
    Stdout,
    /// Write to a file, replacing its contents.
    File(PathBuf),
}

impl OutputDestination {
    /// `-` means stdout; anything else is a file path.
    pub fn from_arg(arg: Option<&Path>) -> Self {
        match arg {
            Some(path) if path.as_os_str() != "-" => OutputDestination::File(path.to_path_buf()),
            _ => OutputDestination::Stdout,
        }
    }

    pub fn write_text(&self, content: &str) -> Result<()> {
        match self {
            OutputDestination::Stdout => writeln!(std::io::stdout().lock(), "{}", content)
                .map_err(|e| PomlError::io("<stdout>", e)),
            OutputDestination::File(path) => {
                ensure_parent(path)?;
                std::fs::write(path, content).map_err(|e| PomlError::io(path, e))
            }
        }
    }
}

/// Fails when the directory that would hold `path` is missing.
fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() && !dir.is_dir() => Err(PomlError::io(
            path,
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("directory {} does not exist", dir.display()),
            ),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_text_to_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("prompt.txt");
        let dest = OutputDestination::File(file_path.clone());

        dest.write_text("hello").unwrap();

        assert_eq!(std::fs::read_to_string(file_path).unwrap(), "hello");
    }

    #[test]
    fn test_write_to_missing_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("missing").join("prompt.txt");
        let err = OutputDestination::File(file_path.clone())
            .write_text("hello")
            .unwrap_err();
        assert!(matches!(err, PomlError::Io { path, .. } if path == file_path));
    }

    #[test]
    fn test_from_arg() {
        assert_eq!(OutputDestination::from_arg(None), OutputDestination::Stdout);
        assert_eq!(
            OutputDestination::from_arg(Some(Path::new("-"))),
            OutputDestination::Stdout
        );
        assert_eq!(
            OutputDestination::from_arg(Some(Path::new("out.json"))),
            OutputDestination::File(PathBuf::from("out.json"))
        );
    }
}
