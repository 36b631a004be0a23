//! Where a template comes from
//!
//! Every source is read into memory when it is handed to the binder, so a
//! reader or file handle is consumed exactly once.

use std::fmt;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{DocMixError, Result};

/// A PDF template in one of the forms callers usually have at hand.
pub enum TemplateSource {
    Bytes(Vec<u8>),
    /// `file://`, `http://` or `https://` URL
    Url(String),
    Reader(Box<dyn Read>),
    Path(PathBuf),
    File(File),
}

impl TemplateSource {
    pub fn url(url: impl Into<String>) -> Self {
        TemplateSource::Url(url.into())
    }

    pub fn path(path: impl AsRef<Path>) -> Self {
        TemplateSource::Path(path.as_ref().to_path_buf())
    }

    pub fn reader(reader: impl Read + 'static) -> Self {
        TemplateSource::Reader(Box::new(reader))
    }

    /// Rejects sources that are known to be unusable without touching them.
    pub(crate) fn validate(&self) -> Result<()> {
        match self {
            TemplateSource::Bytes(bytes) if bytes.is_empty() => {
                Err(DocMixError::invalid("template bytes are empty"))
            }
            TemplateSource::Url(url) if url.trim().is_empty() => {
                Err(DocMixError::invalid("template URL is blank"))
            }
            TemplateSource::Path(path) if path.to_string_lossy().trim().is_empty() => {
                Err(DocMixError::invalid("template path is blank"))
            }
            _ => Ok(()),
        }
    }

    /// Reads the whole template into memory.
    pub fn load(self) -> Result<Vec<u8>> {
        self.validate()?;
        let bytes = match self {
            TemplateSource::Bytes(bytes) => bytes,
            TemplateSource::Url(url) => fetch_url(url.trim())?,
            TemplateSource::Reader(mut reader) => {
                let mut bytes = Vec::new();
                reader.read_to_end(&mut bytes)?;
                bytes
            }
            TemplateSource::Path(path) => fs::read(&path)?,
            TemplateSource::File(mut file) => {
                let mut bytes = Vec::new();
                file.read_to_end(&mut bytes)?;
                bytes
            }
        };

        if bytes.is_empty() {
            return Err(DocMixError::invalid("template is empty"));
        }
        debug!("Loaded template ({} bytes)", bytes.len());
        Ok(bytes)
    }
}

impl fmt::Debug for TemplateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateSource::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            TemplateSource::Url(url) => f.debug_tuple("Url").field(url).finish(),
            TemplateSource::Reader(_) => f.write_str("Reader"),
            TemplateSource::Path(path) => f.debug_tuple("Path").field(path).finish(),
            TemplateSource::File(file) => f.debug_tuple("File").field(file).finish(),
        }
    }
}

impl From<Vec<u8>> for TemplateSource {
    fn from(bytes: Vec<u8>) -> Self {
        TemplateSource::Bytes(bytes)
    }
}

impl From<&[u8]> for TemplateSource {
    fn from(bytes: &[u8]) -> Self {
        TemplateSource::Bytes(bytes.to_vec())
    }
}

impl From<PathBuf> for TemplateSource {
    fn from(path: PathBuf) -> Self {
        TemplateSource::Path(path)
    }
}

impl From<&Path> for TemplateSource {
    fn from(path: &Path) -> Self {
        TemplateSource::Path(path.to_path_buf())
    }
}

impl From<File> for TemplateSource {
    fn from(file: File) -> Self {
        TemplateSource::File(file)
    }
}

fn fetch_url(url: &str) -> Result<Vec<u8>> {
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| DocMixError::invalid(format!("'{url}' is not a URL")))?;

    match scheme.to_ascii_lowercase().as_str() {
        "file" => Ok(fs::read(file_url_path(rest))?),
        "http" | "https" => fetch_remote(url),
        other => Err(DocMixError::invalid(format!(
            "unsupported URL scheme '{other}'"
        ))),
    }
}

/// Local path of a `file://` URL, with `localhost` and percent escapes
/// resolved.
fn file_url_path(rest: &str) -> PathBuf {
    let path = rest.strip_prefix("localhost").unwrap_or(rest);
    let bytes = path.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let escaped = (bytes[i] == b'%')
            .then(|| bytes.get(i + 1..i + 3))
            .flatten()
            .filter(|hex| hex.iter().all(u8::is_ascii_hexdigit))
            .and_then(|hex| std::str::from_utf8(hex).ok())
            .and_then(|hex| u8::from_str_radix(hex, 16).ok());
        match escaped {
            Some(byte) => {
                decoded.push(byte);
                i += 3;
            }
            None => {
                decoded.push(bytes[i]);
                i += 1;
            }
        }
    }
    PathBuf::from(String::from_utf8_lossy(&decoded).into_owned())
}

#[cfg(feature = "remote-templates")]
fn fetch_remote(url: &str) -> Result<Vec<u8>> {
    tracing::info!("Fetching template from {}", url);
    let response = ureq::get(url)
        .call()
        .map_err(|e| DocMixError::Remote(format!("{url}: {e}")))?;
    let mut bytes = Vec::new();
    response.into_reader().read_to_end(&mut bytes)?;
    Ok(bytes)
}

#[cfg(not(feature = "remote-templates"))]
fn fetch_remote(url: &str) -> Result<Vec<u8>> {
    Err(DocMixError::invalid(format!(
        "cannot fetch '{url}': built without the remote-templates feature"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tempfile::{tempdir, NamedTempFile};

    #[test]
    fn test_empty_bytes_are_invalid() {
        let err = TemplateSource::Bytes(Vec::new()).load().unwrap_err();
        assert!(matches!(err, DocMixError::InvalidArgument(_)));
    }

    #[test]
    fn test_blank_url_and_path_are_invalid() {
        assert!(matches!(
            TemplateSource::url("   ").validate(),
            Err(DocMixError::InvalidArgument(_))
        ));
        assert!(matches!(
            TemplateSource::path("").validate(),
            Err(DocMixError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_unknown_scheme_is_invalid() {
        let err = TemplateSource::url("ftp://example.com/t.pdf").load().unwrap_err();
        assert!(matches!(err, DocMixError::InvalidArgument(_)));

        let err = TemplateSource::url("not a url").load().unwrap_err();
        assert!(matches!(err, DocMixError::InvalidArgument(_)));
    }

    #[test]
    fn test_reader_is_read_to_end() {
        let bytes = TemplateSource::reader(Cursor::new(b"%PDF-1.7".to_vec()))
            .load()
            .unwrap();
        assert_eq!(bytes, b"%PDF-1.7");
    }

    #[test]
    fn test_path_file_and_file_url() {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(b"%PDF-1.4 template").unwrap();

        let from_path = TemplateSource::path(tmp.path()).load().unwrap();
        assert_eq!(from_path, b"%PDF-1.4 template");

        let from_file = TemplateSource::from(tmp.reopen().unwrap()).load().unwrap();
        assert_eq!(from_file, from_path);

        let url = format!("file://{}", tmp.path().display());
        let from_url = TemplateSource::url(url).load().unwrap();
        assert_eq!(from_url, from_path);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let err = TemplateSource::path(dir.path().join("missing.pdf"))
            .load()
            .unwrap_err();
        assert!(matches!(err, DocMixError::Io(_)));
    }

    #[test]
    fn test_file_url_path_decoding() {
        assert_eq!(
            file_url_path("/tmp/my%20form.pdf"),
            PathBuf::from("/tmp/my form.pdf")
        );
        assert_eq!(file_url_path("localhost/a.pdf"), PathBuf::from("/a.pdf"));
        assert_eq!(file_url_path("/100%"), PathBuf::from("/100%"));
    }

    #[test]
    fn test_file_url_path_keeps_signed_escapes() {
        assert_eq!(
            file_url_path("/tmp/a%+1.pdf"),
            PathBuf::from("/tmp/a%+1.pdf")
        );
        assert_eq!(file_url_path("/a%-f.pdf"), PathBuf::from("/a%-f.pdf"));
        assert_eq!(file_url_path("/a%2b.pdf"), PathBuf::from("/a+.pdf"));
    }
}
