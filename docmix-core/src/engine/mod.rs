//! PDF engine over the lopdf object model
//!
//! A [`FormSession`] owns one parsed template for one fill cycle. It plays
//! both roles of the classic reader/stamper pair: the reader side parses the
//! template and resolves fields, the writer side edits the object graph and
//! serializes it into an [`OutputBuffer`].

mod appearance;
mod content;
mod fields;
mod flatten;
mod image;
mod normalize;
mod objects;
mod text;

#[cfg(test)]
pub(crate) mod testing;

pub use fields::{FieldInfo, FieldKind, FieldPosition};

use std::collections::BTreeMap;
use std::io::{self, Write};

use ::image::DynamicImage;
use lopdf::{Dictionary, Document, Object, ObjectId, SaveOptions};
use thiserror::Error;
use tracing::{debug, warn};

use crate::geometry::Rectangle;
use crate::info::keys;
use fields::{FieldIndex, FormField};
use objects::{catalog_id, dict_at_path_mut, get_dict, resolve};
use text::{decode_text_string, encode_text_string};

/// Value written to the `/Producer` entry of every emitted document.
pub const PRODUCER: &str = concat!("docmix ", env!("CARGO_PKG_VERSION"));

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("Document is encrypted")]
    Encrypted,

    #[error("Field '{0}' not found")]
    FieldNotFound(String),

    #[error("Value '{value}' is not valid for field '{field}'")]
    InvalidValue { field: String, value: String },

    #[error("Field '{0}' is a {1} field, which cannot be set")]
    Unsupported(String, &'static str),

    #[error("Invalid document structure: {0}")]
    InvalidStructure(String),

    #[error("The {0} is already closed")]
    Closed(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// The interactive form dictionary of the document, if any.
pub(crate) fn acroform(doc: &Document) -> Option<&Dictionary> {
    let catalog = doc.get_dictionary(catalog_id(doc).ok()?).ok()?;
    get_dict(doc, catalog, b"AcroForm")
}

/// Reads the string entries of the `/Info` dictionary of a PDF.
pub(crate) fn read_info(pdf: &[u8]) -> EngineResult<BTreeMap<String, String>> {
    let doc = Document::load_mem(pdf)?;
    let mut entries = BTreeMap::new();

    let info = doc
        .trailer
        .get(b"Info")
        .ok()
        .and_then(|obj| resolve(&doc, obj).ok())
        .and_then(|obj| obj.as_dict().ok());

    if let Some(info) = info {
        for (key, value) in info.iter() {
            if let Ok(Object::String(bytes, _)) = resolve(&doc, value) {
                entries.insert(
                    String::from_utf8_lossy(key).into_owned(),
                    decode_text_string(bytes),
                );
            }
        }
    }
    Ok(entries)
}

/// Accumulates the serialized document.
#[derive(Debug, Default)]
pub(crate) struct OutputBuffer {
    bytes: Vec<u8>,
    closed: bool,
}

impl OutputBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn close(&mut self) -> EngineResult<()> {
        self.flush()?;
        if self.closed {
            return Err(EngineError::Closed("output buffer"));
        }
        self.closed = true;
        Ok(())
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    #[cfg(test)]
    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Write for OutputBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "output buffer is closed",
            ));
        }
        self.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// One open template: reader and writer over the same document.
pub(crate) struct FormSession {
    doc: Document,
    index: Option<FieldIndex>,
    canvas: content::Canvas,
    full_compression: bool,
    reader_open: bool,
    writer_open: bool,
}

impl FormSession {
    pub(crate) fn open(template: &[u8]) -> EngineResult<Self> {
        let doc = Document::load_mem(template)?;
        if doc.is_encrypted() {
            return Err(EngineError::Encrypted);
        }
        catalog_id(&doc)?;

        debug!(
            "Opened template: {} pages, {} objects",
            doc.get_pages().len(),
            doc.objects.len()
        );

        Ok(Self {
            doc,
            index: None,
            canvas: content::Canvas::default(),
            full_compression: false,
            reader_open: true,
            writer_open: true,
        })
    }

    /// Merges `entries` into the `/Info` dictionary.
    ///
    /// Producer and ModDate always come from the engine. An existing
    /// CreationDate is kept, otherwise it is set to `mod_date`.
    pub(crate) fn set_info(
        &mut self,
        entries: &BTreeMap<String, String>,
        mod_date: &str,
    ) -> EngineResult<()> {
        let info_id = self.info_id();
        let info = self.doc.get_object_mut(info_id)?.as_dict_mut()?;

        for (key, value) in entries {
            if key == keys::PRODUCER || key == keys::MOD_DATE {
                continue;
            }
            info.set(key.as_bytes().to_vec(), encode_text_string(value));
        }
        info.set(keys::PRODUCER, encode_text_string(PRODUCER));
        info.set(keys::MOD_DATE, encode_text_string(mod_date));
        if !info.has(keys::CREATION_DATE.as_bytes()) {
            info.set(keys::CREATION_DATE, encode_text_string(mod_date));
        }
        Ok(())
    }

    fn info_id(&mut self) -> ObjectId {
        match self.doc.trailer.get(b"Info") {
            Ok(Object::Reference(id)) if self.doc.get_dictionary(*id).is_ok() => *id,
            existing => {
                let dict = match existing {
                    Ok(Object::Dictionary(dict)) => dict.clone(),
                    _ => Dictionary::new(),
                };
                let id = self.doc.add_object(dict);
                self.doc.trailer.set("Info", id);
                id
            }
        }
    }

    pub(crate) fn set_display_doc_title(&mut self, display: bool) -> EngineResult<()> {
        let root = catalog_id(&self.doc)?;
        dict_at_path_mut(&mut self.doc, root, &[b"ViewerPreferences"])?
            .set("DisplayDocTitle", Object::Boolean(display));
        Ok(())
    }

    /// Builds the field index. Field lookups before this call build it lazily.
    pub(crate) fn open_fields(&mut self) -> EngineResult<usize> {
        self.ensure_reader()?;
        let index = FieldIndex::build(&self.doc);
        let count = index.len();
        self.index = Some(index);
        debug!("Template has {} form fields", count);
        Ok(count)
    }

    pub(crate) fn fields(&self) -> Vec<FieldInfo> {
        match &self.index {
            Some(index) => index.describe(&self.doc),
            None => FieldIndex::build(&self.doc).describe(&self.doc),
        }
    }

    fn field(&mut self, name: &str) -> EngineResult<FormField> {
        self.ensure_reader()?;
        let doc = &self.doc;
        self.index
            .get_or_insert_with(|| FieldIndex::build(doc))
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::FieldNotFound(name.to_string()))
    }

    /// Sets the value of a field and regenerates its appearance.
    pub(crate) fn set_field_text(&mut self, name: &str, value: &str) -> EngineResult<()> {
        self.ensure_writer()?;
        let field = self.field(name)?;

        match field.kind {
            FieldKind::Signature => {
                return Err(EngineError::Unsupported(name.to_string(), "signature"));
            }
            FieldKind::Button => self.set_button_state(&field, value)?,
            FieldKind::Text | FieldKind::Choice | FieldKind::Unknown => {
                self.doc
                    .get_object_mut(field.field_id)?
                    .as_dict_mut()?
                    .set("V", encode_text_string(value));
                for widget in &field.widgets {
                    appearance::write_text_appearance(&mut self.doc, &field, *widget, value)?;
                }
            }
        }

        let root = catalog_id(&self.doc)?;
        dict_at_path_mut(&mut self.doc, root, &[b"AcroForm"])?.remove(b"NeedAppearances");
        Ok(())
    }

    fn set_button_state(&mut self, field: &FormField, value: &str) -> EngineResult<()> {
        let state = value.as_bytes();
        let mut known = state == b"Off";
        let mut stateful = false;
        for widget in &field.widgets {
            let states = appearance::appearance_states(&self.doc, *widget);
            stateful |= !states.is_empty();
            known |= states.iter().any(|s| s.as_slice() == state);
        }
        if !stateful {
            return Err(EngineError::Unsupported(field.name.clone(), "push button"));
        }
        if !known {
            return Err(EngineError::InvalidValue {
                field: field.name.clone(),
                value: value.to_string(),
            });
        }

        for widget in &field.widgets {
            let on = appearance::appearance_states(&self.doc, *widget)
                .iter()
                .any(|s| s.as_slice() == state);
            let shown = if on { state.to_vec() } else { b"Off".to_vec() };
            self.doc
                .get_object_mut(*widget)?
                .as_dict_mut()?
                .set("AS", Object::Name(shown));
        }
        self.doc
            .get_object_mut(field.field_id)?
            .as_dict_mut()?
            .set("V", Object::Name(state.to_vec()));
        Ok(())
    }

    /// Page and rectangle of every widget of a field. Unknown names resolve
    /// to no positions.
    pub(crate) fn field_positions(&mut self, name: &str) -> EngineResult<Vec<FieldPosition>> {
        self.ensure_reader()?;
        let doc = &self.doc;
        let index = self.index.get_or_insert_with(|| FieldIndex::build(doc));
        Ok(index.positions(doc, name))
    }

    /// Draws `img` scaled to `rect` on top of the page content.
    pub(crate) fn draw_image(
        &mut self,
        page: u32,
        rect: &Rectangle,
        img: &DynamicImage,
    ) -> EngineResult<()> {
        self.ensure_writer()?;
        let page_id = *self
            .doc
            .get_pages()
            .get(&page)
            .ok_or_else(|| EngineError::InvalidStructure(format!("page {page} does not exist")))?;

        let xobject = image::add_image_xobject(&mut self.doc, img)?;
        let name = self.canvas.register_xobject(&mut self.doc, page_id, "Img", xobject)?;
        let placement = [
            rect.width(),
            0.0,
            0.0,
            rect.height(),
            rect.lower_left.x,
            rect.lower_left.y,
        ];
        self.canvas
            .append(&mut self.doc, page_id, content::place_xobject(&name, placement))
    }

    pub(crate) fn set_full_compression(&mut self, enabled: bool) {
        self.full_compression = enabled;
    }

    pub(crate) fn remove_fields(&mut self) -> EngineResult<()> {
        self.ensure_writer()?;
        let removed = flatten::remove_fields(&mut self.doc)?;
        debug!("Removed {} widget annotations", removed);
        self.index = None;
        Ok(())
    }

    pub(crate) fn flatten_fields(&mut self) -> EngineResult<()> {
        self.ensure_writer()?;
        let flattened = flatten::flatten_fields(&mut self.doc, &mut self.canvas)?;
        debug!("Flattened {} widget annotations", flattened);
        self.index = None;
        Ok(())
    }

    pub(crate) fn consolidate_named_destinations(&mut self) -> EngineResult<()> {
        self.ensure_writer()?;
        let resolved = normalize::consolidate_named_destinations(&mut self.doc)?;
        if resolved > 0 {
            debug!("Resolved {} named destinations", resolved);
        }
        Ok(())
    }

    pub(crate) fn eliminate_shared_streams(&mut self) -> EngineResult<()> {
        self.ensure_writer()?;
        let copied = normalize::eliminate_shared_streams(&mut self.doc)?;
        if copied > 0 {
            debug!("Copied {} shared content streams", copied);
        }
        Ok(())
    }

    /// Serializes the document into `out`.
    pub(crate) fn write_to(&mut self, out: &mut OutputBuffer) -> EngineResult<()> {
        self.ensure_writer()?;
        self.doc.prune_objects();
        self.doc.renumber_objects();

        if self.full_compression {
            self.doc.compress();
            let options = SaveOptions::builder()
                .use_object_streams(true)
                .use_xref_streams(true)
                .build();
            self.doc.save_with_options(out, options)?;
        } else {
            self.doc.save_to(out)?;
        }
        Ok(())
    }

    pub(crate) fn close_reader(&mut self) -> EngineResult<()> {
        if !self.reader_open {
            return Err(EngineError::Closed("reader"));
        }
        self.reader_open = false;
        self.index = None;
        Ok(())
    }

    pub(crate) fn close_writer(&mut self) -> EngineResult<()> {
        if !self.writer_open {
            return Err(EngineError::Closed("writer"));
        }
        self.writer_open = false;
        Ok(())
    }

    fn ensure_reader(&self) -> EngineResult<()> {
        if self.reader_open {
            Ok(())
        } else {
            Err(EngineError::Closed("reader"))
        }
    }

    fn ensure_writer(&self) -> EngineResult<()> {
        if self.writer_open {
            Ok(())
        } else {
            warn!("Write attempted on a closed session");
            Err(EngineError::Closed("writer"))
        }
    }

    #[cfg(test)]
    pub(crate) fn document(&self) -> &Document {
        &self.doc
    }

    #[cfg(test)]
    pub(crate) fn is_reader_open(&self) -> bool {
        self.reader_open
    }

    #[cfg(test)]
    pub(crate) fn is_writer_open(&self) -> bool {
        self.writer_open
    }
}
