//! # docmix
//!
//! Fill PDF form templates with text, images and document metadata, then
//! remove or flatten the form and emit the final document.
//!
//! The typical use is mass production of documents that share a fixed
//! layout, such as bank payment slips: the layout lives in a PDF template
//! with named AcroForm fields, and every call supplies the values.
//!
//! ## Features
//!
//! - **Text fields**: values are written with a generated appearance, so
//!   the output looks right in every viewer
//! - **Image fields**: any `image::DynamicImage` is scaled into the field's
//!   rectangle on every page the field appears on
//! - **Metadata**: title, author, subject, keywords and creator are merged
//!   into the document information dictionary
//! - **Finalization**: remove or flatten the form, full compression with
//!   object and cross-reference streams, named destination consolidation
//! - **Template sources**: bytes, readers, files, paths and URLs
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docmix::{FieldMode, TemplateBinder};
//!
//! # fn main() -> docmix::Result<()> {
//! let mut binder = TemplateBinder::from_path("template.pdf")?;
//! binder
//!     .put_text("nome", "Maria da Silva")?
//!     .put_text("valor", "R$ 150,00")?;
//! binder.title("Boleto").author("Banco").creator("Cobranca");
//! binder.field_mode(FieldMode::Flatten);
//!
//! let pdf = binder.to_bytes()?;
//! assert!(pdf.starts_with(b"%PDF"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`binder`] - the fill-and-finalize pipeline
//! - [`info`] - document information
//! - [`template`] - template sources
//! - [`options`] - finalization options
//! - [`date`] - PDF date strings
//! - [`geometry`] - points and rectangles

pub mod binder;
pub mod date;
pub mod error;
pub mod geometry;
pub mod info;
pub mod options;
pub mod template;

pub(crate) mod engine;

pub use binder::{Stage, TemplateBinder, CREATOR_SUFFIX};
pub use engine::{FieldInfo, FieldKind, FieldPosition, PRODUCER};
pub use error::{DocMixError, Result};
pub use geometry::{Point, Rectangle};
pub use info::DocInfo;
pub use options::{FieldMode, FinalizeOptions};
pub use template::TemplateSource;

/// Current version of docmix
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_info() {
        assert!(!VERSION.is_empty());
        assert!(PRODUCER.ends_with(VERSION));
    }
}
