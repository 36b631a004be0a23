//! Template binding and finalization
//!
//! A [`TemplateBinder`] holds a template, the values to bind to its fields,
//! document metadata and finalization options. Every output call runs one
//! full cycle over a fresh copy of the template:
//!
//! ```text
//! Configured --init--> EngineOpen --fill_fields--> Filled --finalize--> Emitted
//! ```
//!
//! The stages can also be driven one at a time. Calling a stage out of order
//! fails with [`DocMixError::InvalidState`], and any failure drops the open
//! session and returns the binder to [`Stage::Configured`].

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use image::DynamicImage;
use tracing::{debug, error, info};

use crate::date;
use crate::engine::{EngineResult, FieldInfo, FormSession, OutputBuffer};
use crate::error::{DocMixError, Result};
use crate::info::{keys, DocInfo};
use crate::options::{FieldMode, FinalizeOptions};
use crate::template::TemplateSource;

/// Appended to the creator of every generated document.
pub const CREATOR_SUFFIX: &str = "by jrimum.org/bopepo";

/// Where a binder is in its fill cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// No session open; ready for [`TemplateBinder::init`].
    Configured,
    /// Template parsed and metadata merged; fields not filled yet.
    EngineOpen,
    /// Fields filled; ready for [`TemplateBinder::finalize`].
    Filled,
    /// A document was produced. [`TemplateBinder::init`] starts a new cycle.
    Emitted,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Configured => "configured",
            Stage::EngineOpen => "open",
            Stage::Filled => "filled",
            Stage::Emitted => "emitted",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Session {
    form: FormSession,
    output: OutputBuffer,
}

enum State {
    Configured,
    EngineOpen(Session),
    Filled(Session),
    Emitted,
}

/// Fills a PDF form template and produces the final document.
///
/// # Example
///
/// ```rust,no_run
/// use docmix::TemplateBinder;
///
/// # fn main() -> docmix::Result<()> {
/// let mut binder = TemplateBinder::from_path("boleto-template.pdf")?;
/// binder
///     .put_text("sacado", "Maria da Silva")?
///     .put_text("valor", "R$ 150,00")?;
/// binder.title("Boleto").creator("Cobranca");
///
/// let path = binder.to_file("boleto.pdf")?;
/// println!("Written {}", path.display());
/// # Ok(())
/// # }
/// ```
pub struct TemplateBinder {
    template: Vec<u8>,
    texts: BTreeMap<String, String>,
    images: BTreeMap<String, DynamicImage>,
    info: DocInfo,
    options: FinalizeOptions,
    mod_date: Option<String>,
    state: State,
}

impl TemplateBinder {
    /// Creates a binder over a template. The source is read completely
    /// before this returns.
    pub fn new(source: impl Into<TemplateSource>) -> Result<Self> {
        let template = source.into().load()?;
        Ok(Self {
            template,
            texts: BTreeMap::new(),
            images: BTreeMap::new(),
            info: DocInfo::new(),
            options: FinalizeOptions::default(),
            mod_date: None,
            state: State::Configured,
        })
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        Self::new(TemplateSource::Bytes(bytes.into()))
    }

    /// `file://`, `http://` or `https://` URL.
    pub fn from_url(url: &str) -> Result<Self> {
        Self::new(TemplateSource::url(url))
    }

    pub fn from_reader(reader: impl Read + 'static) -> Result<Self> {
        Self::new(TemplateSource::reader(reader))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(TemplateSource::path(path))
    }

    pub fn from_file(file: File) -> Result<Self> {
        Self::new(TemplateSource::File(file))
    }

    /// Replaces the template. Bindings, metadata and options are kept; an
    /// open session is dropped.
    pub fn change_template(&mut self, source: impl Into<TemplateSource>) -> Result<&mut Self> {
        self.template = source.into().load()?;
        self.state = State::Configured;
        debug!("Template changed ({} bytes)", self.template.len());
        Ok(self)
    }

    /// A copy of the template bytes.
    pub fn template(&self) -> Vec<u8> {
        self.template.clone()
    }

    /// Binds `value` to the field `name`, replacing any earlier value.
    pub fn put_text(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<&mut Self> {
        let name = field_name(name.into())?;
        self.texts.insert(name, value.into());
        Ok(self)
    }

    /// Binds an image to the field `name`. The image is drawn over every
    /// widget of that field.
    pub fn put_image(
        &mut self,
        name: impl Into<String>,
        image: DynamicImage,
    ) -> Result<&mut Self> {
        let name = field_name(name.into())?;
        self.images.insert(name, image);
        Ok(self)
    }

    /// Replaces all text bindings. An empty set is rejected and leaves the
    /// current bindings untouched.
    pub fn put_all_texts<K, V>(
        &mut self,
        texts: impl IntoIterator<Item = (K, V)>,
    ) -> Result<&mut Self>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let texts = texts
            .into_iter()
            .map(|(k, v)| Ok((field_name(k.into())?, v.into())))
            .collect::<Result<BTreeMap<_, _>>>()?;
        if texts.is_empty() {
            return Err(DocMixError::invalid("text bindings are empty"));
        }
        self.texts = texts;
        Ok(self)
    }

    /// Replaces all image bindings. An empty set is rejected and leaves the
    /// current bindings untouched.
    pub fn put_all_images<K>(
        &mut self,
        images: impl IntoIterator<Item = (K, DynamicImage)>,
    ) -> Result<&mut Self>
    where
        K: Into<String>,
    {
        let images = images
            .into_iter()
            .map(|(k, v)| Ok((field_name(k.into())?, v)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        if images.is_empty() {
            return Err(DocMixError::invalid("image bindings are empty"));
        }
        self.images = images;
        Ok(self)
    }

    pub fn text_fields(&self) -> &BTreeMap<String, String> {
        &self.texts
    }

    pub fn image_fields(&self) -> &BTreeMap<String, DynamicImage> {
        &self.images
    }

    pub fn with_full_compression(&mut self, enabled: bool) -> &mut Self {
        self.options.full_compression = enabled;
        self
    }

    /// `true` removes the form fields from the output, `false` flattens them.
    pub fn remove_fields(&mut self, remove: bool) -> &mut Self {
        self.options = self.options.with_remove_fields(remove);
        self
    }

    pub fn field_mode(&mut self, mode: FieldMode) -> &mut Self {
        self.options.field_mode = mode;
        self
    }

    /// Asks viewers to show the document title instead of the file name.
    pub fn display_doc_title(&mut self, display: bool) -> &mut Self {
        self.options.display_doc_title = Some(display);
        self
    }

    pub fn options(&self) -> FinalizeOptions {
        self.options
    }

    pub fn set_options(&mut self, options: FinalizeOptions) -> &mut Self {
        self.options = options;
        self
    }

    pub fn title<'a>(&mut self, title: impl Into<Option<&'a str>>) -> &mut Self {
        self.info.set_title(title);
        self
    }

    pub fn author<'a>(&mut self, author: impl Into<Option<&'a str>>) -> &mut Self {
        self.info.set_author(author);
        self
    }

    pub fn subject<'a>(&mut self, subject: impl Into<Option<&'a str>>) -> &mut Self {
        self.info.set_subject(subject);
        self
    }

    pub fn keywords<'a>(&mut self, keywords: impl Into<Option<&'a str>>) -> &mut Self {
        self.info.set_keywords(keywords);
        self
    }

    pub fn creator<'a>(&mut self, creator: impl Into<Option<&'a str>>) -> &mut Self {
        self.info.set_creator(creator);
        self
    }

    pub fn info(&self) -> &DocInfo {
        &self.info
    }

    pub fn info_mut(&mut self) -> &mut DocInfo {
        &mut self.info
    }

    /// Replaces the metadata wholesale.
    pub fn with_info(&mut self, info: DocInfo) -> &mut Self {
        self.info = info;
        self
    }

    /// The creator written to the document. The stored creator itself is
    /// never modified.
    pub fn effective_creator(&self) -> String {
        match self.info.creator() {
            Some(creator) if !creator.trim().is_empty() => format!("{creator} {CREATOR_SUFFIX}"),
            _ => CREATOR_SUFFIX.to_string(),
        }
    }

    /// Describes the fields of the current template.
    pub fn fields(&self) -> Result<Vec<FieldInfo>> {
        let session =
            FormSession::open(&self.template).map_err(|e| DocMixError::FatalInit(e.to_string()))?;
        Ok(session.fields())
    }

    pub fn stage(&self) -> Stage {
        match self.state {
            State::Configured => Stage::Configured,
            State::EngineOpen(_) => Stage::EngineOpen,
            State::Filled(_) => Stage::Filled,
            State::Emitted => Stage::Emitted,
        }
    }

    /// Opens a session over the template and merges the metadata.
    ///
    /// # Errors
    ///
    /// [`DocMixError::InvalidState`] unless the binder is configured or has
    /// emitted, [`DocMixError::FatalInit`] if the template cannot be opened.
    pub fn init(&mut self) -> Result<()> {
        if !matches!(self.state, State::Configured | State::Emitted) {
            return Err(self.invalid_state("init"));
        }
        self.state = State::Configured;

        let mod_date = self.modification_date();
        match self.open_session(&mod_date) {
            Ok(session) => {
                self.state = State::EngineOpen(session);
                debug!("Session open, creator '{}'", self.effective_creator());
                Ok(())
            }
            Err(e) => {
                error!("Cannot open template: {}", e);
                Err(DocMixError::FatalInit(e.to_string()))
            }
        }
    }

    /// Binds every text and image to the open session.
    ///
    /// Image bindings whose field does not exist are skipped.
    pub fn fill_fields(&mut self) -> Result<()> {
        let mut session = self.take_session("fill fields", Stage::EngineOpen)?;

        for (name, value) in &self.texts {
            session
                .form
                .set_field_text(name, value)
                .map_err(|e| fill_error(name, e))?;
        }

        for (name, image) in &self.images {
            let positions = session
                .form
                .field_positions(name)
                .map_err(|e| fill_error(name, e))?;
            if positions.is_empty() {
                debug!("No field '{}' for image binding, skipping", name);
                continue;
            }
            for position in positions {
                session
                    .form
                    .draw_image(position.page, &position.rect, image)
                    .map_err(|e| fill_error(name, e))?;
            }
        }

        debug!(
            "Filled {} text and {} image bindings",
            self.texts.len(),
            self.images.len()
        );
        self.state = State::Filled(session);
        Ok(())
    }

    /// Applies the finalization options and serializes the document.
    pub fn finalize(&mut self) -> Result<Vec<u8>> {
        let session = self.take_session("finalize", Stage::Filled)?;
        let bytes = self.close_session(session)?;
        self.state = State::Emitted;
        info!("Emitted document ({} bytes)", bytes.len());
        Ok(bytes)
    }

    /// Runs a full cycle and returns the document. A cycle left open by
    /// earlier stage calls is discarded first.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        if matches!(self.state, State::EngineOpen(_) | State::Filled(_)) {
            debug!("Discarding open session");
            self.state = State::Configured;
        }
        self.init()?;
        self.fill_fields()?;
        self.finalize()
    }

    pub fn to_stream(&mut self) -> Result<Cursor<Vec<u8>>> {
        Ok(Cursor::new(self.to_bytes()?))
    }

    pub fn to_writer(&mut self, writer: &mut impl Write) -> Result<()> {
        let bytes = self.to_bytes()?;
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(())
    }

    /// Writes the document to `path`, creating or overwriting it.
    ///
    /// # Errors
    ///
    /// A blank path is rejected with [`DocMixError::InvalidArgument`] before
    /// the template is touched.
    pub fn to_file(&mut self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        if path.to_string_lossy().trim().is_empty() {
            return Err(DocMixError::invalid("output path is blank"));
        }

        let bytes = self.to_bytes()?;
        fs::write(path, &bytes)?;
        info!("Written {}", path.display());
        Ok(path.to_path_buf())
    }

    fn modification_date(&mut self) -> String {
        self.mod_date
            .get_or_insert_with(|| date::encode(&Local::now().fixed_offset()))
            .clone()
    }

    fn open_session(&self, mod_date: &str) -> EngineResult<Session> {
        let mut form = FormSession::open(&self.template)?;
        let output = OutputBuffer::new();

        let mut entries = self.info.to_map();
        entries.insert(keys::CREATOR.to_string(), self.effective_creator());
        form.set_info(&entries, mod_date)?;

        if let Some(display) = self.options.display_doc_title {
            form.set_display_doc_title(display)?;
        }
        form.open_fields()?;
        Ok(Session { form, output })
    }

    fn close_session(&self, mut session: Session) -> Result<Vec<u8>> {
        self.write_and_close(&mut session)?;
        Ok(session.output.into_bytes())
    }

    /// Post-processes and serializes the session, then closes output, reader
    /// and writer. Every close is attempted even when an earlier step failed.
    fn write_and_close(&self, session: &mut Session) -> Result<()> {
        let Session { form, output } = session;

        let written = self
            .post_process(form)
            .and_then(|()| form.write_to(output));

        let closed = [output.close(), form.close_reader(), form.close_writer()];

        if let Some(e) = written
            .err()
            .or_else(|| closed.into_iter().find_map(|r| r.err()))
        {
            error!("Cannot close document: {}", e);
            return Err(DocMixError::FatalClose(e.to_string()));
        }
        Ok(())
    }

    fn post_process(&self, form: &mut FormSession) -> EngineResult<()> {
        form.set_full_compression(self.options.full_compression);
        match self.options.field_mode {
            FieldMode::Remove => form.remove_fields()?,
            FieldMode::Flatten => form.flatten_fields()?,
        }
        form.consolidate_named_destinations()?;
        form.eliminate_shared_streams()
    }

    fn take_session(&mut self, operation: &'static str, expected: Stage) -> Result<Session> {
        if self.stage() != expected {
            return Err(self.invalid_state(operation));
        }
        match std::mem::replace(&mut self.state, State::Configured) {
            State::EngineOpen(session) | State::Filled(session) => Ok(session),
            _ => Err(self.invalid_state(operation)),
        }
    }

    fn invalid_state(&self, operation: &'static str) -> DocMixError {
        DocMixError::InvalidState {
            operation,
            stage: self.stage().as_str(),
        }
    }
}

impl fmt::Debug for TemplateBinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateBinder")
            .field("template_len", &self.template.len())
            .field("texts", &self.texts)
            .field("images", &self.images.keys().collect::<Vec<_>>())
            .field("info", &self.info)
            .field("options", &self.options)
            .field("stage", &self.stage())
            .finish()
    }
}

fn field_name(name: String) -> Result<String> {
    if name.trim().is_empty() {
        return Err(DocMixError::invalid("field name is blank"));
    }
    Ok(name)
}

fn fill_error(name: &str, err: crate::engine::EngineError) -> DocMixError {
    error!("Cannot fill field '{}': {}", name, err);
    DocMixError::fill(name, err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing;
    use image::{Rgb, RgbImage};

    fn binder() -> TemplateBinder {
        let mut doc = testing::form_document();
        TemplateBinder::from_bytes(testing::to_bytes(&mut doc)).unwrap()
    }

    fn red() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([255, 0, 0])))
    }

    #[test]
    fn test_effective_creator() {
        let mut binder = binder();
        assert_eq!(binder.effective_creator(), "by jrimum.org/bopepo");

        binder.creator("   ");
        assert_eq!(binder.effective_creator(), "by jrimum.org/bopepo");

        binder.creator("MySoft");
        assert_eq!(binder.effective_creator(), "MySoft by jrimum.org/bopepo");
        assert_eq!(binder.info().creator(), Some("MySoft"));
    }

    #[test]
    fn test_blank_names_are_rejected() {
        let mut binder = binder();
        assert!(matches!(
            binder.put_text(" ", "x"),
            Err(DocMixError::InvalidArgument(_))
        ));
        assert!(matches!(
            binder.put_image("", red()),
            Err(DocMixError::InvalidArgument(_))
        ));
        assert!(binder.text_fields().is_empty());
    }

    #[test]
    fn test_put_all_replaces_and_rejects_empty() {
        let mut binder = binder();
        binder.put_text("old", "1").unwrap();

        binder.put_all_texts([("nome", "Ana")]).unwrap();
        assert_eq!(binder.text_fields().len(), 1);
        assert_eq!(binder.text_fields()["nome"], "Ana");

        let empty: Vec<(String, String)> = Vec::new();
        assert!(matches!(
            binder.put_all_texts(empty),
            Err(DocMixError::InvalidArgument(_))
        ));
        assert_eq!(binder.text_fields()["nome"], "Ana");

        let no_images: Vec<(String, DynamicImage)> = Vec::new();
        assert!(binder.put_all_images(no_images).is_err());
    }

    #[test]
    fn test_stage_transitions() {
        let mut binder = binder();
        binder.put_text("nome", "Ana").unwrap();
        assert_eq!(binder.stage(), Stage::Configured);

        binder.init().unwrap();
        assert_eq!(binder.stage(), Stage::EngineOpen);
        binder.fill_fields().unwrap();
        assert_eq!(binder.stage(), Stage::Filled);
        let bytes = binder.finalize().unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert_eq!(binder.stage(), Stage::Emitted);

        binder.init().unwrap();
        assert_eq!(binder.stage(), Stage::EngineOpen);
    }

    #[test]
    fn test_out_of_order_calls_fail() {
        let mut binder = binder();
        assert!(matches!(
            binder.fill_fields(),
            Err(DocMixError::InvalidState {
                operation: "fill fields",
                stage: "configured"
            })
        ));
        assert!(matches!(
            binder.finalize(),
            Err(DocMixError::InvalidState { .. })
        ));

        binder.init().unwrap();
        assert!(matches!(binder.init(), Err(DocMixError::InvalidState { .. })));
        assert_eq!(binder.stage(), Stage::EngineOpen);
    }

    #[test]
    fn test_fill_failure_resets_to_configured() {
        let mut binder = binder();
        binder.put_text("does.not.exist", "x").unwrap();
        binder.init().unwrap();

        match binder.fill_fields() {
            Err(DocMixError::Fill { field, .. }) => assert_eq!(field, "does.not.exist"),
            other => panic!("expected fill error, got {other:?}"),
        }
        assert_eq!(binder.stage(), Stage::Configured);
    }

    #[test]
    fn test_unparseable_template_is_fatal_init() {
        let mut binder = TemplateBinder::from_bytes(b"not a pdf".to_vec()).unwrap();
        assert!(matches!(binder.init(), Err(DocMixError::FatalInit(_))));
        assert_eq!(binder.stage(), Stage::Configured);
    }

    #[test]
    fn test_image_for_missing_field_is_skipped() {
        let mut binder = binder();
        binder.put_text("nome", "Ana").unwrap();
        binder.put_image("nao_existe", red()).unwrap();
        assert!(binder.to_bytes().is_ok());
    }

    #[test]
    fn test_to_bytes_discards_open_session() {
        let mut binder = binder();
        binder.init().unwrap();
        assert!(binder.to_bytes().is_ok());
        assert_eq!(binder.stage(), Stage::Emitted);
    }

    fn open_session(binder: &TemplateBinder) -> Session {
        binder.open_session("D:20240102030405Z").unwrap()
    }

    #[test]
    fn test_failed_post_processing_still_closes_everything() {
        let binder = binder();
        let mut session = open_session(&binder);
        session.form.close_writer().unwrap();

        let err = binder.write_and_close(&mut session).unwrap_err();
        match err {
            DocMixError::FatalClose(message) => assert!(message.contains("writer")),
            other => panic!("expected fatal close, got {other:?}"),
        }
        assert!(session.output.is_closed());
        assert!(!session.form.is_reader_open());
        assert!(!session.form.is_writer_open());
        assert!(session.output.into_bytes().is_empty());
    }

    #[test]
    fn test_failed_reader_close_still_closes_writer() {
        let binder = binder();
        let mut session = open_session(&binder);
        session.form.close_reader().unwrap();

        let err = binder.write_and_close(&mut session).unwrap_err();
        match err {
            DocMixError::FatalClose(message) => assert!(message.contains("reader")),
            other => panic!("expected fatal close, got {other:?}"),
        }
        assert!(session.output.is_closed());
        assert!(!session.form.is_writer_open());
    }

    #[test]
    fn test_successful_close_returns_document() {
        let binder = binder();
        let mut session = open_session(&binder);
        binder.write_and_close(&mut session).unwrap();

        assert!(session.output.is_closed());
        assert!(!session.form.is_reader_open());
        assert!(!session.form.is_writer_open());
        assert!(session.output.into_bytes().starts_with(b"%PDF"));
    }

    #[test]
    fn test_fields_lists_template_fields() {
        let names: Vec<String> = binder()
            .fields()
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["aceito", "logo", "nome", "pagador.cpf"]);
    }
}
