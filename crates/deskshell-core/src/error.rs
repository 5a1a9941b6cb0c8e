use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures reported back across the UI boundary.
///
/// Display text is what the UI prints, so `NotFound`/`NotADirectory`/`CommandFailed`
/// read like shell output.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("No such file or directory: {0}")]
    NotFound(String),
    #[error("Not a directory: {0}")]
    NotADirectory(String),
    #[error("File too large to display")]
    FileTooLarge { size: u64, limit: u64 },
    #[error("{0}")]
    ReadError(String),
    #[error("{message}")]
    CommandFailed { message: String },
    #[error("folder dialog failed: {0}")]
    Dialog(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("bad request: {0}")]
    BadRequest(String),
}

/// Stable machine-readable tag sent alongside the message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    NotFound,
    NotADirectory,
    FileTooLarge,
    ReadError,
    CommandFailed,
    Dialog,
    Forbidden,
    BadRequest,
}

impl BridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::NotFound(_) => ErrorKind::NotFound,
            BridgeError::NotADirectory(_) => ErrorKind::NotADirectory,
            BridgeError::FileTooLarge { .. } => ErrorKind::FileTooLarge,
            BridgeError::ReadError(_) => ErrorKind::ReadError,
            BridgeError::CommandFailed { .. } => ErrorKind::CommandFailed,
            BridgeError::Dialog(_) => ErrorKind::Dialog,
            BridgeError::Forbidden(_) => ErrorKind::Forbidden,
            BridgeError::BadRequest(_) => ErrorKind::BadRequest,
        }
    }

    /// Map an I/O failure on `path` to the taxonomy
    pub fn from_io(err: &std::io::Error, path: &str) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => BridgeError::NotFound(path.to_string()),
            std::io::ErrorKind::NotADirectory => BridgeError::NotADirectory(path.to_string()),
            _ => BridgeError::ReadError(format!("{}: {}", path, err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_like_messages() {
        assert_eq!(
            BridgeError::NotFound("src".into()).to_string(),
            "No such file or directory: src"
        );
        assert_eq!(
            BridgeError::NotADirectory("~".into()).to_string(),
            "Not a directory: ~"
        );
        let failed = BridgeError::CommandFailed {
            message: "ls: cannot access 'x'".into(),
        };
        assert_eq!(failed.to_string(), "ls: cannot access 'x'");
    }

    #[test]
    fn test_kind_serializes_camel_case() {
        let kind = BridgeError::FileTooLarge { size: 2, limit: 1 }.kind();
        assert_eq!(serde_json::to_string(&kind).unwrap(), "\"fileTooLarge\"");
        assert_eq!(
            serde_json::to_string(&ErrorKind::NotADirectory).unwrap(),
            "\"notADirectory\""
        );
    }

    #[test]
    fn test_from_io_not_found() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(
            BridgeError::from_io(&err, "/tmp/x"),
            BridgeError::NotFound("/tmp/x".into())
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_from_io_not_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        std::fs::write(&file, "x").unwrap();
        let err = std::fs::read_dir(file.join("inner")).unwrap_err();
        assert_eq!(
            BridgeError::from_io(&err, "notes.txt/inner"),
            BridgeError::NotADirectory("notes.txt/inner".into())
        );
    }
}
