//! Document information (the PDF `/Info` dictionary)

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, FixedOffset};

use crate::date;
use crate::engine;
use crate::error::{DocMixError, Result};

/// Info dictionary keys, spelled the way PDF readers expect them.
pub mod keys {
    pub const TITLE: &str = "Title";
    pub const AUTHOR: &str = "Author";
    pub const SUBJECT: &str = "Subject";
    pub const KEYWORDS: &str = "Keywords";
    pub const CREATOR: &str = "Creator";
    pub const CREATION_DATE: &str = "CreationDate";
    pub const MOD_DATE: &str = "ModDate";
    pub const PRODUCER: &str = "Producer";
}

/// Title, author, subject, keywords, creator, producer and the creation and
/// modification dates of a PDF document.
///
/// Values are only ever written when present: passing `None` to a setter
/// keeps whatever was stored before. The producer and both dates belong to
/// the engine that writes the file, so they have getters only.
///
/// # Example
///
/// ```rust
/// use docmix::DocInfo;
///
/// let mut info = DocInfo::new();
/// info.set_title("Boleto").set_author("Banco").set_subject(None);
///
/// assert_eq!(info.title(), Some("Boleto"));
/// assert_eq!(info.subject(), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DocInfo {
    entries: BTreeMap<String, String>,
}

impl DocInfo {
    /// Creates an empty holder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a holder over existing key/value pairs. Unknown keys are kept
    /// and written back to the document untouched.
    pub fn from_map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Reads the Info dictionary of an existing PDF.
    ///
    /// # Errors
    ///
    /// Returns [`DocMixError::FatalInit`] if the bytes are not a readable PDF.
    pub fn from_pdf(pdf: &[u8]) -> Result<Self> {
        let entries = engine::read_info(pdf).map_err(|e| DocMixError::FatalInit(e.to_string()))?;
        Ok(Self { entries })
    }

    pub fn set_title<'a>(&mut self, title: impl Into<Option<&'a str>>) -> &mut Self {
        self.put(keys::TITLE, title.into())
    }

    pub fn set_author<'a>(&mut self, author: impl Into<Option<&'a str>>) -> &mut Self {
        self.put(keys::AUTHOR, author.into())
    }

    pub fn set_subject<'a>(&mut self, subject: impl Into<Option<&'a str>>) -> &mut Self {
        self.put(keys::SUBJECT, subject.into())
    }

    pub fn set_keywords<'a>(&mut self, keywords: impl Into<Option<&'a str>>) -> &mut Self {
        self.put(keys::KEYWORDS, keywords.into())
    }

    /// Sets the application that created the original document.
    pub fn set_creator<'a>(&mut self, creator: impl Into<Option<&'a str>>) -> &mut Self {
        self.put(keys::CREATOR, creator.into())
    }

    pub fn title(&self) -> Option<&str> {
        self.get(keys::TITLE)
    }

    pub fn author(&self) -> Option<&str> {
        self.get(keys::AUTHOR)
    }

    pub fn subject(&self) -> Option<&str> {
        self.get(keys::SUBJECT)
    }

    pub fn keywords(&self) -> Option<&str> {
        self.get(keys::KEYWORDS)
    }

    pub fn creator(&self) -> Option<&str> {
        self.get(keys::CREATOR)
    }

    /// The software that actually produced the file. Only the PDF engine
    /// writes this value.
    pub fn producer(&self) -> Option<&str> {
        self.get(keys::PRODUCER)
    }

    /// Creation date exactly as stored, e.g. `D:20240101120000+00'00'`.
    pub fn creation_raw(&self) -> Option<&str> {
        self.get(keys::CREATION_DATE)
    }

    /// Modification date exactly as stored.
    pub fn modification_raw(&self) -> Option<&str> {
        self.get(keys::MOD_DATE)
    }

    /// Decoded creation date.
    ///
    /// # Errors
    ///
    /// Returns [`DocMixError::Decode`] if the date is absent or malformed.
    pub fn creation(&self) -> Result<DateTime<FixedOffset>> {
        decode_entry(self.creation_raw(), keys::CREATION_DATE)
    }

    /// Decoded modification date.
    ///
    /// # Errors
    ///
    /// Returns [`DocMixError::Decode`] if the date is absent or malformed.
    pub fn modification(&self) -> Result<DateTime<FixedOffset>> {
        decode_entry(self.modification_raw(), keys::MOD_DATE)
    }

    /// Raw access to any key, including non-standard ones.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Returns a copy of every stored pair.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.entries.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn put(&mut self, key: &str, value: Option<&str>) -> &mut Self {
        if let Some(value) = value {
            self.entries.insert(key.to_string(), value.to_string());
        }
        self
    }
}

fn decode_entry(raw: Option<&str>, key: &str) -> Result<DateTime<FixedOffset>> {
    let raw = raw.ok_or_else(|| DocMixError::Decode(format!("{key} is not set")))?;
    date::decode(raw)
}

impl fmt::Display for DocInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocInfo [")?;
        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{key}={value}")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn hash_of(info: &DocInfo) -> u64 {
        let mut hasher = DefaultHasher::new();
        info.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_new_is_empty() {
        let info = DocInfo::new();
        assert!(info.is_empty());
        assert!(info.title().is_none());
        assert!(info.producer().is_none());
    }

    #[test]
    fn test_setters_chain() {
        let mut info = DocInfo::new();
        info.set_title("Title")
            .set_author("Author")
            .set_subject("Subject")
            .set_keywords("a, b")
            .set_creator("App");

        assert_eq!(info.title(), Some("Title"));
        assert_eq!(info.author(), Some("Author"));
        assert_eq!(info.subject(), Some("Subject"));
        assert_eq!(info.keywords(), Some("a, b"));
        assert_eq!(info.creator(), Some("App"));
    }

    #[test]
    fn test_none_keeps_previous_value() {
        let mut info = DocInfo::new();
        info.set_title("Kept");
        info.set_title(None);
        assert_eq!(info.title(), Some("Kept"));

        info.set_author(None);
        assert_eq!(info.author(), None);
    }

    #[test]
    fn test_empty_string_is_stored() {
        let mut info = DocInfo::new();
        info.set_keywords("old");
        info.set_keywords("");
        assert_eq!(info.keywords(), Some(""));
    }

    #[test]
    fn test_to_map_is_a_copy() {
        let mut info = DocInfo::new();
        info.set_title("Original");

        let mut map = info.to_map();
        map.insert(keys::TITLE.to_string(), "Changed".to_string());
        map.insert(keys::PRODUCER.to_string(), "Someone".to_string());

        assert_eq!(info.title(), Some("Original"));
        assert_eq!(info.producer(), None);
    }

    #[test]
    fn test_from_map_keeps_unknown_keys() {
        let info = DocInfo::from_map([("Title", "T"), ("Trapped", "False")]);
        assert_eq!(info.title(), Some("T"));
        assert_eq!(info.get("Trapped"), Some("False"));
    }

    #[test]
    fn test_producer_and_dates_from_map() {
        let info = DocInfo::from_map([
            (keys::PRODUCER, "docmix 1.0"),
            (keys::CREATION_DATE, "D:20240101000000Z"),
            (keys::MOD_DATE, "not a date"),
        ]);
        assert_eq!(info.producer(), Some("docmix 1.0"));
        assert_eq!(info.creation_raw(), Some("D:20240101000000Z"));
        assert!(info.creation().is_ok());
        assert!(matches!(info.modification(), Err(DocMixError::Decode(_))));
    }

    #[test]
    fn test_absent_date_is_decode_error() {
        let info = DocInfo::new();
        assert!(matches!(info.creation(), Err(DocMixError::Decode(_))));
    }

    #[test]
    fn test_equality_and_hash() {
        let mut a = DocInfo::new();
        a.set_title("X").set_author("Y");
        let b = DocInfo::from_map([("Author", "Y"), ("Title", "X")]);
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));

        let mut c = b.clone();
        c.set_subject("Z");
        assert_ne!(a, c);
    }

    #[test]
    fn test_display() {
        let info = DocInfo::from_map([("Author", "A"), ("Title", "T")]);
        assert_eq!(info.to_string(), "DocInfo [Author=A, Title=T]");
    }
}
