//! Policies and the inputs they can be created from.

use regex::Regex;
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::error::{OpaError, Result};

/// A policy accepted by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub name: String,
    pub url: String,
    pub rego: Vec<u8>,
}

impl Policy {
    /// Rego text, if the payload is valid UTF-8.
    pub fn rego_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.rego).ok()
    }
}

/// Where a Rego payload comes from.
pub enum PolicySource {
    /// A `.rego` file on disk.
    Path(PathBuf),
    /// Inline Rego text.
    Text(String),
    /// Raw payload bytes, sent as-is.
    Bytes(Vec<u8>),
    /// Any open reader, drained to the end.
    Reader(Box<dyn Read + Send>),
}

impl PolicySource {
    /// Treat `value` as a path when such a file exists, otherwise as inline text.
    pub fn detect(value: &str) -> Self {
        if Path::new(value).is_file() {
            PolicySource::Path(PathBuf::from(value))
        } else {
            PolicySource::Text(value.to_string())
        }
    }

    /// Resolve the source into the bytes sent to the server.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        match self {
            PolicySource::Path(path) => read_from_file(&path),
            PolicySource::Text(text) => Ok(text.into_bytes()),
            PolicySource::Bytes(bytes) => Ok(bytes),
            PolicySource::Reader(mut reader) => {
                let mut bytes = Vec::new();
                reader.read_to_end(&mut bytes)?;
                Ok(bytes)
            }
        }
    }
}

impl fmt::Debug for PolicySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicySource::Path(path) => f.debug_tuple("Path").field(path).finish(),
            PolicySource::Text(text) => f.debug_tuple("Text").field(&text.len()).finish(),
            PolicySource::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            PolicySource::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

impl From<&str> for PolicySource {
    fn from(text: &str) -> Self {
        PolicySource::Text(text.to_string())
    }
}

impl From<String> for PolicySource {
    fn from(text: String) -> Self {
        PolicySource::Text(text)
    }
}

impl From<Vec<u8>> for PolicySource {
    fn from(bytes: Vec<u8>) -> Self {
        PolicySource::Bytes(bytes)
    }
}

impl From<&[u8]> for PolicySource {
    fn from(bytes: &[u8]) -> Self {
        PolicySource::Bytes(bytes.to_vec())
    }
}

impl From<PathBuf> for PolicySource {
    fn from(path: PathBuf) -> Self {
        PolicySource::Path(path)
    }
}

impl From<&Path> for PolicySource {
    fn from(path: &Path) -> Self {
        PolicySource::Path(path.to_path_buf())
    }
}

impl From<fs::File> for PolicySource {
    fn from(file: fs::File) -> Self {
        PolicySource::Reader(Box::new(file))
    }
}

/// Read a whole file as a payload blob.
pub fn read_from_file(path: &Path) -> Result<Vec<u8>> {
    Ok(fs::read(path)?)
}

static NAME_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\p{Alphabetic}_]+$").unwrap());

/// Check that a policy name is `/`-separated segments of letters and underscores.
pub fn validate_policy_name(name: &str) -> Result<()> {
    if name.split('/').all(|segment| NAME_SEGMENT.is_match(segment)) {
        Ok(())
    } else {
        Err(OpaError::InvalidPolicyName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tempfile::NamedTempFile;

    mod name_validation {
        use super::*;

        #[test]
        fn accepts_letters_underscores_and_slashes() {
            assert!(validate_policy_name("a/b_c").is_ok());
            assert!(validate_policy_name("mypolicy").is_ok());
            assert!(validate_policy_name("_private/rules").is_ok());
        }

        #[test]
        fn rejects_digits_and_dots() {
            assert!(validate_policy_name("a/1b").is_err());
            assert!(validate_policy_name("a.b").is_err());
            assert!(validate_policy_name("v2").is_err());
        }

        #[test]
        fn rejects_empty_segments() {
            assert!(validate_policy_name("").is_err());
            assert!(validate_policy_name("a//b").is_err());
            assert!(validate_policy_name("/a").is_err());
        }

        #[test]
        fn error_is_validation() {
            let err = validate_policy_name("a-b").unwrap_err();
            assert!(err.is_validation());
        }
    }

    mod sources {
        use super::*;

        #[test]
        fn text_and_bytes_pass_through() {
            let bytes = PolicySource::from("package x").into_bytes().unwrap();
            assert_eq!(bytes, b"package x");

            let bytes = PolicySource::from(vec![1u8, 2, 3]).into_bytes().unwrap();
            assert_eq!(bytes, vec![1, 2, 3]);
        }

        #[test]
        fn path_reads_file() {
            let mut file = NamedTempFile::new().unwrap();
            write!(file, "package from_file").unwrap();

            let bytes = PolicySource::from(file.path()).into_bytes().unwrap();
            assert_eq!(bytes, b"package from_file");
        }

        #[test]
        fn reader_is_drained() {
            let source = PolicySource::Reader(Box::new(Cursor::new(b"package r".to_vec())));
            assert_eq!(source.into_bytes().unwrap(), b"package r");
        }

        #[test]
        fn detect_prefers_existing_file() {
            let mut file = NamedTempFile::new().unwrap();
            write!(file, "package detected").unwrap();
            let path = file.path().to_str().unwrap();

            assert!(matches!(PolicySource::detect(path), PolicySource::Path(_)));
            assert!(matches!(
                PolicySource::detect("package inline"),
                PolicySource::Text(_)
            ));
        }

        #[test]
        fn missing_path_is_io_error() {
            let err = PolicySource::Path(PathBuf::from("/definitely/not/here.rego"))
                .into_bytes()
                .unwrap_err();
            assert!(matches!(err, OpaError::Io(_)));
        }
    }
}
