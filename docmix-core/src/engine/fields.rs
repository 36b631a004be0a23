//! AcroForm field tree
//!
//! Fields form a tree under `/AcroForm /Fields`. A field's fully qualified
//! name joins the partial names (`/T`) of its ancestors with `.`. Terminal
//! fields own one or more widget annotations, either as `/Kids` without a
//! `/T` entry or merged into the field dictionary itself.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use lopdf::{Document, Object, ObjectId};
use tracing::warn;

use super::objects::{get_dict, integer, name_is, rectangle, reference_list};
use super::text::text_of;
use crate::geometry::Rectangle;

/// Field type from the `/FT` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Button,
    Choice,
    Signature,
    Unknown,
}

impl FieldKind {
    fn from_name(name: &[u8]) -> Self {
        match name {
            b"Tx" => FieldKind::Text,
            b"Btn" => FieldKind::Button,
            b"Ch" => FieldKind::Choice,
            b"Sig" => FieldKind::Signature,
            _ => FieldKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Button => "button",
            FieldKind::Choice => "choice",
            FieldKind::Signature => "signature",
            FieldKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a widget of a field sits: 1-based page number and `/Rect`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldPosition {
    pub page: u32,
    pub rect: Rectangle,
}

/// Public description of one form field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub name: String,
    pub kind: FieldKind,
    pub value: Option<String>,
    pub positions: Vec<FieldPosition>,
}

/// Field flag bits used by the engine (ISO 32000-1, tables 226 and 228).
pub(crate) mod flags {
    pub const MULTILINE: i64 = 1 << 12;
    pub const PASSWORD: i64 = 1 << 13;
}

#[derive(Debug, Clone)]
pub(crate) struct FormField {
    pub name: String,
    pub kind: FieldKind,
    pub field_id: ObjectId,
    pub widgets: Vec<ObjectId>,
    pub flags: i64,
}

#[derive(Debug, Default)]
pub(crate) struct FieldIndex {
    fields: BTreeMap<String, FormField>,
    widget_pages: BTreeMap<ObjectId, u32>,
}

#[derive(Clone, Default)]
struct Inherited {
    name: Option<String>,
    kind: Option<FieldKind>,
    flags: i64,
}

impl FieldIndex {
    pub(crate) fn build(doc: &Document) -> Self {
        let mut index = FieldIndex::default();

        let pages = doc.get_pages();
        let page_numbers: BTreeMap<ObjectId, u32> =
            pages.iter().map(|(num, id)| (*id, *num)).collect();

        for (number, page_id) in &pages {
            let Ok(page) = doc.get_dictionary(*page_id) else {
                continue;
            };
            for annot in reference_list(doc, page, b"Annots") {
                index.widget_pages.entry(annot).or_insert(*number);
            }
        }

        let Some(acroform) = super::acroform(doc) else {
            return index;
        };

        let mut visited = BTreeSet::new();
        for field_id in reference_list(doc, acroform, b"Fields") {
            visit(doc, field_id, &Inherited::default(), &mut visited, &mut index.fields);
        }

        // Widgets not listed in any /Annots can still point at their page.
        for field in index.fields.values() {
            for widget in &field.widgets {
                if index.widget_pages.contains_key(widget) {
                    continue;
                }
                let page = doc
                    .get_dictionary(*widget)
                    .ok()
                    .and_then(|w| w.get(b"P").ok())
                    .and_then(|p| p.as_reference().ok())
                    .and_then(|p| page_numbers.get(&p).copied());
                if let Some(page) = page {
                    index.widget_pages.insert(*widget, page);
                }
            }
        }

        index
    }

    pub(crate) fn get(&self, name: &str) -> Option<&FormField> {
        self.fields.get(name)
    }

    pub(crate) fn len(&self) -> usize {
        self.fields.len()
    }

    pub(crate) fn positions(&self, doc: &Document, name: &str) -> Vec<FieldPosition> {
        let Some(field) = self.fields.get(name) else {
            return Vec::new();
        };

        field
            .widgets
            .iter()
            .filter_map(|widget| {
                let page = *self.widget_pages.get(widget)?;
                let dict = doc.get_dictionary(*widget).ok()?;
                let rect = rectangle(doc, dict, b"Rect")?;
                Some(FieldPosition { page, rect })
            })
            .collect()
    }

    pub(crate) fn describe(&self, doc: &Document) -> Vec<FieldInfo> {
        self.fields
            .values()
            .map(|field| FieldInfo {
                name: field.name.clone(),
                kind: field.kind,
                value: doc
                    .get_dictionary(field.field_id)
                    .ok()
                    .and_then(|d| d.get(b"V").ok())
                    .and_then(text_of),
                positions: self.positions(doc, &field.name),
            })
            .collect()
    }
}

fn visit(
    doc: &Document,
    id: ObjectId,
    parent: &Inherited,
    visited: &mut BTreeSet<ObjectId>,
    out: &mut BTreeMap<String, FormField>,
) {
    if !visited.insert(id) {
        warn!("Form field {:?} is referenced twice, skipping", id);
        return;
    }
    let Ok(dict) = doc.get_dictionary(id) else {
        warn!("Form field {:?} is not a dictionary", id);
        return;
    };

    let partial = dict.get(b"T").ok().and_then(text_of);
    let name = match (&parent.name, partial) {
        (Some(p), Some(t)) => Some(format!("{p}.{t}")),
        (None, Some(t)) => Some(t),
        (p, None) => p.clone(),
    };
    let kind = match dict.get(b"FT") {
        Ok(Object::Name(ft)) => Some(FieldKind::from_name(ft)),
        _ => parent.kind,
    };
    let inherited = Inherited {
        name,
        kind,
        flags: integer(dict, b"Ff").unwrap_or(parent.flags),
    };

    let mut widgets = Vec::new();
    for kid in reference_list(doc, dict, b"Kids") {
        let is_field = doc
            .get_dictionary(kid)
            .map(|k| k.has(b"T") || (k.has(b"Kids") && !name_is(k, b"Subtype", b"Widget")))
            .unwrap_or(false);
        if is_field {
            visit(doc, kid, &inherited, visited, out);
        } else {
            widgets.push(kid);
        }
    }

    let merged_widget =
        !dict.has(b"Kids") && (name_is(dict, b"Subtype", b"Widget") || dict.has(b"Rect"));
    if merged_widget {
        widgets.push(id);
    }
    if widgets.is_empty() {
        return;
    }

    let Some(name) = inherited.name else {
        warn!("Form field {:?} has no name, skipping", id);
        return;
    };

    match out.get_mut(&name) {
        Some(existing) => existing.widgets.extend(widgets),
        None => {
            out.insert(
                name.clone(),
                FormField {
                    name,
                    kind: inherited.kind.unwrap_or(FieldKind::Unknown),
                    field_id: id,
                    widgets,
                    flags: inherited.flags,
                },
            );
        }
    }
}

/// Widget annotations on the page, in `/Annots` order.
pub(crate) fn page_widgets(doc: &Document, page_id: ObjectId) -> Vec<ObjectId> {
    doc.get_dictionary(page_id)
        .map(|page| {
            reference_list(doc, page, b"Annots")
                .into_iter()
                .filter(|annot| {
                    doc.get_dictionary(*annot)
                        .map(|a| name_is(a, b"Subtype", b"Widget"))
                        .unwrap_or(false)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Default appearance of a field, inherited from its ancestors and finally
/// from the AcroForm.
pub(crate) fn default_appearance(doc: &Document, field_id: ObjectId) -> Option<String> {
    let mut current = Some(field_id);
    let mut hops = 0;
    while let Some(id) = current {
        let dict = doc.get_dictionary(id).ok()?;
        if let Some(da) = dict.get(b"DA").ok().and_then(text_of) {
            return Some(da);
        }
        current = dict.get(b"Parent").ok().and_then(|p| p.as_reference().ok());
        hops += 1;
        if hops > 64 {
            break;
        }
    }
    super::acroform(doc)
        .and_then(|form| form.get(b"DA").ok())
        .and_then(text_of)
}

/// Quadding (`/Q`) of a field, inherited like `/DA`.
pub(crate) fn quadding(doc: &Document, field_id: ObjectId) -> i64 {
    let mut current = Some(field_id);
    let mut hops = 0;
    while let Some(id) = current {
        let Ok(dict) = doc.get_dictionary(id) else {
            break;
        };
        if let Some(q) = integer(dict, b"Q") {
            return q;
        }
        current = dict.get(b"Parent").ok().and_then(|p| p.as_reference().ok());
        hops += 1;
        if hops > 64 {
            break;
        }
    }
    super::acroform(doc)
        .and_then(|form| integer(form, b"Q"))
        .unwrap_or(0)
}

/// The `/AP /N` entry of a widget, if any.
pub(crate) fn normal_appearance<'a>(
    doc: &'a Document,
    widget: &'a lopdf::Dictionary,
) -> Option<&'a Object> {
    let ap = get_dict(doc, widget, b"AP")?;
    ap.get(b"N").ok()
}
