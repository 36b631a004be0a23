//! Drawing on top of existing page content

use std::collections::BTreeSet;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use super::objects::{dict_at_path_mut, real};
use super::EngineResult;

/// Tracks the pages whose original content has been wrapped in `q`/`Q`,
/// so that anything appended later starts from the default graphics state.
#[derive(Debug, Default)]
pub(crate) struct Canvas {
    isolated: BTreeSet<ObjectId>,
    names: usize,
}

impl Canvas {
    /// Registers `xobject` in the page's `/Resources /XObject` under a new
    /// name and returns that name.
    pub(crate) fn register_xobject(
        &mut self,
        doc: &mut Document,
        page_id: ObjectId,
        prefix: &str,
        xobject: ObjectId,
    ) -> EngineResult<String> {
        inherit_resources(doc, page_id)?;
        let xobjects = dict_at_path_mut(doc, page_id, &[b"Resources", b"XObject"])?;

        let name = loop {
            self.names += 1;
            let candidate = format!("Dmx{}{}", prefix, self.names);
            if !xobjects.has(candidate.as_bytes()) {
                break candidate;
            }
        };
        xobjects.set(name.as_bytes().to_vec(), Object::Reference(xobject));
        Ok(name)
    }

    /// Appends `operations` as a new content stream of the page.
    pub(crate) fn append(
        &mut self,
        doc: &mut Document,
        page_id: ObjectId,
        operations: Vec<Operation>,
    ) -> EngineResult<()> {
        if self.isolated.insert(page_id) {
            isolate(doc, page_id)?;
        }
        let bytes = Content { operations }.encode()?;
        doc.add_page_contents(page_id, bytes)?;
        Ok(())
    }
}

/// `q <matrix> cm /name Do Q`
pub(crate) fn place_xobject(name: &str, matrix: [f64; 6]) -> Vec<Operation> {
    vec![
        Operation::new("q", vec![]),
        Operation::new("cm", matrix.iter().map(|v| real(*v)).collect()),
        Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]),
        Operation::new("Q", vec![]),
    ]
}

/// Content stream entries of a page, flattening an indirect array.
pub(crate) fn content_refs(doc: &Document, page_id: ObjectId) -> EngineResult<Vec<Object>> {
    let page = doc.get_dictionary(page_id)?;
    Ok(match page.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id)? {
            Object::Array(items) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    })
}

fn isolate(doc: &mut Document, page_id: ObjectId) -> EngineResult<()> {
    let existing = content_refs(doc, page_id)?;
    if existing.is_empty() {
        return Ok(());
    }

    let save = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let restore = doc.add_object(Stream::new(Dictionary::new(), b"\nQ\n".to_vec()));

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(save));
    contents.extend(existing);
    contents.push(Object::Reference(restore));

    doc.get_object_mut(page_id)?
        .as_dict_mut()?
        .set("Contents", Object::Array(contents));
    Ok(())
}

/// Copies inherited `/Resources` onto the page so edits stay on this page.
fn inherit_resources(doc: &mut Document, page_id: ObjectId) -> EngineResult<()> {
    let page = doc.get_dictionary(page_id)?;
    if page.has(b"Resources") {
        return Ok(());
    }

    let mut inherited = None;
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;
    while let Some(id) = parent {
        let node = doc.get_dictionary(id)?;
        if let Ok(resources) = node.get(b"Resources") {
            inherited = Some(resources.clone());
            break;
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
        depth += 1;
        if depth > 64 {
            break;
        }
    }

    let resources = match inherited {
        Some(Object::Reference(id)) => doc.get_dictionary(id)?.clone(),
        Some(Object::Dictionary(dict)) => dict,
        _ => Dictionary::new(),
    };
    doc.get_object_mut(page_id)?
        .as_dict_mut()?
        .set("Resources", Object::Dictionary(resources));
    Ok(())
}
