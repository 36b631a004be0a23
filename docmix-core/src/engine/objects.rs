//! Small helpers over the lopdf object model

use lopdf::{Dictionary, Document, Object, ObjectId};

use super::{EngineError, EngineResult};
use crate::geometry::Rectangle;

/// Follows a reference to its target; other objects are returned as-is.
pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> EngineResult<&'a Object> {
    match obj {
        Object::Reference(id) => Ok(doc.get_object(*id)?),
        other => Ok(other),
    }
}

/// Looks up `key` in `dict` and follows a reference if needed.
pub(crate) fn get_resolved<'a>(
    doc: &'a Document,
    dict: &'a Dictionary,
    key: &[u8],
) -> Option<&'a Object> {
    dict.get(key).ok().and_then(|obj| resolve(doc, obj).ok())
}

pub(crate) fn get_dict<'a>(
    doc: &'a Document,
    dict: &'a Dictionary,
    key: &[u8],
) -> Option<&'a Dictionary> {
    get_resolved(doc, dict, key).and_then(|obj| obj.as_dict().ok())
}

pub(crate) fn get_array<'a>(
    doc: &'a Document,
    dict: &'a Dictionary,
    key: &[u8],
) -> Option<&'a Vec<Object>> {
    get_resolved(doc, dict, key).and_then(|obj| obj.as_array().ok())
}

pub(crate) fn name_is(dict: &Dictionary, key: &[u8], expected: &[u8]) -> bool {
    matches!(dict.get(key), Ok(Object::Name(name)) if name.as_slice() == expected)
}

pub(crate) fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

pub(crate) fn real(value: f64) -> Object {
    Object::Real((value as f32).into())
}

pub(crate) fn integer(dict: &Dictionary, key: &[u8]) -> Option<i64> {
    match dict.get(key) {
        Ok(Object::Integer(i)) => Some(*i),
        _ => None,
    }
}

/// Reads a four-number array such as `/Rect` or `/BBox`.
pub(crate) fn rectangle(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<Rectangle> {
    let values: Vec<f64> = get_array(doc, dict, key)?
        .iter()
        .filter_map(|obj| resolve(doc, obj).ok().and_then(number))
        .collect();

    match values.as_slice() {
        [x1, y1, x2, y2] => Some(Rectangle::from_corners(*x1, *y1, *x2, *y2)),
        _ => None,
    }
}

/// Reads a six-number `/Matrix`, defaulting to identity.
pub(crate) fn matrix(doc: &Document, dict: &Dictionary) -> [f64; 6] {
    let values: Vec<f64> = get_array(doc, dict, b"Matrix")
        .map(|arr| {
            arr.iter()
                .filter_map(|obj| resolve(doc, obj).ok().and_then(number))
                .collect()
        })
        .unwrap_or_default();

    match values.as_slice() {
        [a, b, c, d, e, f] => [*a, *b, *c, *d, *e, *f],
        _ => [1.0, 0.0, 0.0, 1.0, 0.0, 0.0],
    }
}

/// Id of the document catalog.
pub(crate) fn catalog_id(doc: &Document) -> EngineResult<ObjectId> {
    doc.trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|_| EngineError::InvalidStructure("trailer has no /Root".to_string()))
}

pub(crate) fn catalog_mut(doc: &mut Document) -> EngineResult<&mut Dictionary> {
    let id = catalog_id(doc)?;
    Ok(doc.get_object_mut(id)?.as_dict_mut()?)
}

/// Walks `path` starting at object `root`, following references and
/// creating missing dictionaries inline, and returns the last dictionary.
pub(crate) fn dict_at_path_mut<'a>(
    doc: &'a mut Document,
    root: ObjectId,
    path: &[&[u8]],
) -> EngineResult<&'a mut Dictionary> {
    let mut owner = root;
    let mut inline: Vec<&[u8]> = Vec::new();
    for &key in path {
        let mut current = Some(doc.get_dictionary(owner)?);
        for step in &inline {
            current = match current.map(|d| d.get(step)) {
                Some(Ok(Object::Dictionary(d))) => Some(d),
                _ => None,
            };
        }
        match current.map(|d| d.get(key)) {
            Some(Ok(Object::Reference(id))) if doc.get_dictionary(*id).is_ok() => {
                owner = *id;
                inline.clear();
            }
            _ => inline.push(key),
        }
    }

    let mut dict = doc.get_object_mut(owner)?.as_dict_mut()?;
    for step in inline {
        if !matches!(dict.get(step), Ok(Object::Dictionary(_))) {
            dict.set(step.to_vec(), Object::Dictionary(Dictionary::new()));
        }
        dict = dict.get_mut(step)?.as_dict_mut()?;
    }
    Ok(dict)
}

/// Object ids referenced from an array entry, skipping inline values.
pub(crate) fn reference_list(doc: &Document, dict: &Dictionary, key: &[u8]) -> Vec<ObjectId> {
    get_array(doc, dict, key)
        .map(|arr| {
            arr.iter()
                .filter_map(|obj| obj.as_reference().ok())
                .collect()
        })
        .unwrap_or_default()
}
