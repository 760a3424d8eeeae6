//! Opens the byte stream a transactions file is read from.
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source not found: {0}")]
    NotFound(PathBuf),
    #[error("couldn't open source {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub trait SourceOpener: Send + Sync {
    fn open(&self, identifier: &str) -> Result<Box<dyn Read + Send>, SourceError>;
}

/// Reads sources from the local file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskOpener;

impl SourceOpener for DiskOpener {
    fn open(&self, identifier: &str) -> Result<Box<dyn Read + Send>, SourceError> {
        let path = clean_path(Path::new(identifier));
        match File::open(&path) {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(SourceError::NotFound(path)),
            Err(source) => Err(SourceError::Io { path, source }),
        }
    }
}

/// Lexically normalize a path: drop `.` segments and fold `..` into its parent.
fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(out.components().next_back(), Some(Component::Normal(_)))
                    && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn clean_path_normalizes() {
        assert_eq!(clean_path(Path::new("./a/b/../c")), PathBuf::from("a/c"));
        assert_eq!(clean_path(Path::new("../x")), PathBuf::from("../x"));
        assert_eq!(clean_path(Path::new("/../etc")), PathBuf::from("/etc"));
        assert_eq!(clean_path(Path::new("a/..")), PathBuf::from("."));
    }

    #[test]
    fn opens_existing_file() {
        let td = tempdir().unwrap();
        let p = td.path().join("txns.csv");
        fs::write(&p, "accountId,date,amount\n").unwrap();

        let mut reader = DiskOpener.open(p.to_str().unwrap()).unwrap();
        let mut content = String::new();
        reader.read_to_string(&mut content).unwrap();
        assert_eq!(content, "accountId,date,amount\n");
    }

    #[test]
    fn missing_file_is_not_found() {
        let td = tempdir().unwrap();
        let p = td.path().join("nope.csv");
        let err = DiskOpener.open(p.to_str().unwrap()).err().unwrap();
        assert!(matches!(err, SourceError::NotFound(_)));
    }
}
