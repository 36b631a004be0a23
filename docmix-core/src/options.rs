//! Finalization options

/// What happens to the interactive form when a document is finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldMode {
    /// Delete the fields. Values drawn through appearance streams go too.
    #[default]
    Remove,
    /// Draw every visible field's appearance into the page content, then
    /// delete the fields.
    Flatten,
}

/// Post-processing applied after the fields are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalizeOptions {
    /// Write object streams and a cross-reference stream, and compress
    /// every stream
    pub full_compression: bool,
    /// Remove or flatten the form
    pub field_mode: FieldMode,
    /// `/ViewerPreferences /DisplayDocTitle`; `None` leaves it untouched
    pub display_doc_title: Option<bool>,
}

impl Default for FinalizeOptions {
    fn default() -> Self {
        Self {
            full_compression: true,
            field_mode: FieldMode::Remove,
            display_doc_title: None,
        }
    }
}

impl FinalizeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_full_compression(mut self, enabled: bool) -> Self {
        self.full_compression = enabled;
        self
    }

    pub fn with_field_mode(mut self, mode: FieldMode) -> Self {
        self.field_mode = mode;
        self
    }

    /// `true` removes the fields, `false` flattens them.
    pub fn with_remove_fields(self, remove: bool) -> Self {
        self.with_field_mode(if remove {
            FieldMode::Remove
        } else {
            FieldMode::Flatten
        })
    }

    pub fn with_display_doc_title(mut self, display: bool) -> Self {
        self.display_doc_title = Some(display);
        self
    }
}
