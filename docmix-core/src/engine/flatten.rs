//! Removing and flattening form fields

use lopdf::content::Operation;
use lopdf::{Document, Object, ObjectId};

use super::content::{place_xobject, Canvas};
use super::fields::{normal_appearance, page_widgets};
use super::objects::{catalog_mut, integer, matrix, rectangle};
use super::EngineResult;
use crate::geometry::Rectangle;

/// Annotation flags (ISO 32000-1, table 165).
const HIDDEN: i64 = 1 << 1;
const NO_VIEW: i64 = 1 << 5;

/// Drops every widget annotation and the interactive form itself.
pub(crate) fn remove_fields(doc: &mut Document) -> EngineResult<usize> {
    let mut removed = 0;
    for page_id in doc.get_pages().into_values() {
        let widgets = page_widgets(doc, page_id);
        if widgets.is_empty() {
            continue;
        }
        removed += widgets.len();
        drop_annotations(doc, page_id, &widgets)?;
    }
    catalog_mut(doc)?.remove(b"AcroForm");
    Ok(removed)
}

/// Draws the normal appearance of every visible widget into its page, then
/// removes the form as [`remove_fields`] does.
pub(crate) fn flatten_fields(doc: &mut Document, canvas: &mut Canvas) -> EngineResult<usize> {
    let mut flattened = 0;
    for page_id in doc.get_pages().into_values() {
        let mut operations: Vec<Operation> = Vec::new();
        for widget in page_widgets(doc, page_id) {
            let Some((appearance, placement)) = placement(doc, widget) else {
                continue;
            };
            mark_as_form(doc, appearance)?;
            let name = canvas.register_xobject(doc, page_id, "Fld", appearance)?;
            operations.extend(place_xobject(&name, placement));
            flattened += 1;
        }
        if !operations.is_empty() {
            canvas.append(doc, page_id, operations)?;
        }
    }
    remove_fields(doc)?;
    Ok(flattened)
}

/// The appearance stream of a widget and the matrix that maps it onto the
/// widget rectangle. `None` for hidden widgets and widgets with nothing to
/// draw.
fn placement(doc: &Document, widget: ObjectId) -> Option<(ObjectId, [f64; 6])> {
    let dict = doc.get_dictionary(widget).ok()?;
    let flags = integer(dict, b"F").unwrap_or(0);
    if flags & (HIDDEN | NO_VIEW) != 0 {
        return None;
    }

    let appearance = match normal_appearance(doc, dict)? {
        Object::Reference(id) => match doc.get_object(*id).ok()? {
            // Appearance states: pick the current one.
            Object::Dictionary(states) => {
                let state = dict.get(b"AS").ok()?.as_name().ok()?;
                states.get(state).ok()?.as_reference().ok()?
            }
            _ => *id,
        },
        Object::Dictionary(states) => {
            let state = dict.get(b"AS").ok()?.as_name().ok()?;
            states.get(state).ok()?.as_reference().ok()?
        }
        _ => return None,
    };

    let stream = match doc.get_object(appearance).ok()? {
        Object::Stream(stream) => stream,
        _ => return None,
    };
    let rect = rectangle(doc, dict, b"Rect")?;
    let bbox = rectangle(doc, &stream.dict, b"BBox")?;
    let form_matrix = matrix(doc, &stream.dict);

    let shown = transform_bounds(&bbox, &form_matrix);
    if rect.is_empty() || shown.is_empty() {
        return None;
    }

    let sx = rect.width() / shown.width();
    let sy = rect.height() / shown.height();
    Some((
        appearance,
        [
            sx,
            0.0,
            0.0,
            sy,
            rect.lower_left.x - sx * shown.lower_left.x,
            rect.lower_left.y - sy * shown.lower_left.y,
        ],
    ))
}

/// Bounding box of `rect` after applying `m`.
fn transform_bounds(rect: &Rectangle, m: &[f64; 6]) -> Rectangle {
    let corners = [
        (rect.lower_left.x, rect.lower_left.y),
        (rect.upper_right.x, rect.lower_left.y),
        (rect.lower_left.x, rect.upper_right.y),
        (rect.upper_right.x, rect.upper_right.y),
    ]
    .map(|(x, y)| (m[0] * x + m[2] * y + m[4], m[1] * x + m[3] * y + m[5]));

    let (mut min_x, mut min_y) = corners[0];
    let (mut max_x, mut max_y) = corners[0];
    for (x, y) in &corners[1..] {
        min_x = min_x.min(*x);
        min_y = min_y.min(*y);
        max_x = max_x.max(*x);
        max_y = max_y.max(*y);
    }
    Rectangle::from_corners(min_x, min_y, max_x, max_y)
}

/// Appearance streams may omit `/Type` and `/Subtype`; `Do` needs both.
fn mark_as_form(doc: &mut Document, appearance: ObjectId) -> EngineResult<()> {
    if let Object::Stream(stream) = doc.get_object_mut(appearance)? {
        stream.dict.set("Type", Object::Name(b"XObject".to_vec()));
        stream.dict.set("Subtype", Object::Name(b"Form".to_vec()));
    }
    Ok(())
}

fn drop_annotations(doc: &mut Document, page_id: ObjectId, widgets: &[ObjectId]) -> EngineResult<()> {
    let keep = |obj: &Object| {
        obj.as_reference()
            .map(|id| !widgets.contains(&id))
            .unwrap_or(true)
    };

    let shared = match doc.get_dictionary(page_id)?.get(b"Annots") {
        Ok(Object::Reference(id)) => Some(*id),
        _ => None,
    };
    if let Some(id) = shared {
        if let Object::Array(items) = doc.get_object_mut(id)? {
            items.retain(keep);
        }
        return Ok(());
    }

    let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
    let now_empty = match page.get_mut(b"Annots") {
        Ok(Object::Array(items)) => {
            items.retain(keep);
            items.is_empty()
        }
        _ => false,
    };
    if now_empty {
        page.remove(b"Annots");
    }
    Ok(())
}
