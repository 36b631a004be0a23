//! Document clean-up applied before serialization

use std::collections::{BTreeMap, BTreeSet};

use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::warn;

use super::content::content_refs;
use super::objects::{catalog_id, get_dict, name_is, reference_list, resolve};
use super::EngineResult;

const MAX_TREE_DEPTH: usize = 32;

/// Replaces named destinations in links, GoTo actions and outline items with
/// the explicit destination arrays they name. Returns the number of
/// replacements.
pub(crate) fn consolidate_named_destinations(doc: &mut Document) -> EngineResult<usize> {
    let names = named_destinations(doc)?;
    if names.is_empty() {
        return Ok(0);
    }

    let mut targets = BTreeSet::new();
    for page_id in doc.get_pages().into_values() {
        let Ok(page) = doc.get_dictionary(page_id) else {
            continue;
        };
        for annot in reference_list(doc, page, b"Annots") {
            let is_link = doc
                .get_dictionary(annot)
                .map(|a| name_is(a, b"Subtype", b"Link"))
                .unwrap_or(false);
            if is_link {
                targets.insert(annot);
            }
        }
    }
    outline_items(doc, &mut targets)?;

    // Referenced actions are edited in place as well.
    let actions: Vec<ObjectId> = targets
        .iter()
        .filter_map(|id| doc.get_dictionary(*id).ok())
        .filter_map(|dict| dict.get(b"A").ok())
        .filter_map(|a| a.as_reference().ok())
        .collect();
    targets.extend(actions);

    let mut replaced = 0;
    for id in targets {
        if let Ok(Object::Dictionary(dict)) = doc.get_object_mut(id) {
            replaced += explicit_destinations(dict, &names);
        }
    }
    Ok(replaced)
}

fn explicit_destinations(dict: &mut Dictionary, names: &BTreeMap<Vec<u8>, Object>) -> usize {
    let mut replaced = 0;
    if let Some(explicit) = dict.get(b"Dest").ok().and_then(|d| lookup(names, d)) {
        dict.set("Dest", explicit);
        replaced += 1;
    }
    if name_is(dict, b"S", b"GoTo") {
        if let Some(explicit) = dict.get(b"D").ok().and_then(|d| lookup(names, d)) {
            dict.set("D", explicit);
            replaced += 1;
        }
    }
    if let Ok(Object::Dictionary(action)) = dict.get_mut(b"A") {
        replaced += explicit_destinations(action, names);
    }
    replaced
}

fn lookup(names: &BTreeMap<Vec<u8>, Object>, dest: &Object) -> Option<Object> {
    match dest {
        Object::String(name, _) | Object::Name(name) => names.get(name).cloned(),
        _ => None,
    }
}

/// Every named destination, from the catalog `/Dests` dictionary and the
/// `/Names /Dests` name tree.
fn named_destinations(doc: &Document) -> EngineResult<BTreeMap<Vec<u8>, Object>> {
    let catalog = doc.get_dictionary(catalog_id(doc)?)?;
    let mut names = BTreeMap::new();

    if let Some(dests) = get_dict(doc, catalog, b"Dests") {
        for (name, value) in dests.iter() {
            if let Some(explicit) = explicit_array(doc, value) {
                names.insert(name.clone(), explicit);
            }
        }
    }

    if let Some(tree) = get_dict(doc, catalog, b"Names").and_then(|n| get_dict(doc, n, b"Dests")) {
        collect_name_tree(doc, tree, 0, &mut names);
    }
    Ok(names)
}

fn collect_name_tree(
    doc: &Document,
    node: &Dictionary,
    depth: usize,
    names: &mut BTreeMap<Vec<u8>, Object>,
) {
    if depth > MAX_TREE_DEPTH {
        warn!("Name tree is deeper than {} levels, ignoring the rest", MAX_TREE_DEPTH);
        return;
    }

    let pairs = node
        .get(b"Names")
        .ok()
        .and_then(|n| resolve(doc, n).ok())
        .and_then(|n| n.as_array().ok());
    if let Some(pairs) = pairs {
        for pair in pairs.chunks_exact(2) {
            let key = match resolve(doc, &pair[0]) {
                Ok(Object::String(key, _)) => key.clone(),
                _ => continue,
            };
            if let Some(explicit) = explicit_array(doc, &pair[1]) {
                names.entry(key).or_insert(explicit);
            }
        }
    }

    for kid in reference_list(doc, node, b"Kids") {
        if let Ok(kid) = doc.get_dictionary(kid) {
            collect_name_tree(doc, kid, depth + 1, names);
        }
    }
}

/// A destination value is either the array itself or a dictionary whose
/// `/D` entry holds it.
fn explicit_array(doc: &Document, value: &Object) -> Option<Object> {
    match resolve(doc, value).ok()? {
        array @ Object::Array(_) => Some(array.clone()),
        Object::Dictionary(dict) => match resolve(doc, dict.get(b"D").ok()?).ok()? {
            array @ Object::Array(_) => Some(array.clone()),
            _ => None,
        },
        _ => None,
    }
}

fn outline_items(doc: &Document, items: &mut BTreeSet<ObjectId>) -> EngineResult<()> {
    let catalog = doc.get_dictionary(catalog_id(doc)?)?;
    let Some(root) = get_dict(doc, catalog, b"Outlines") else {
        return Ok(());
    };

    let mut pending: Vec<ObjectId> = root
        .get(b"First")
        .and_then(Object::as_reference)
        .into_iter()
        .collect();
    while let Some(id) = pending.pop() {
        if !items.insert(id) {
            continue;
        }
        let Ok(item) = doc.get_dictionary(id) else {
            continue;
        };
        for key in [b"First".as_slice(), b"Next".as_slice()] {
            if let Ok(next) = item.get(key).and_then(Object::as_reference) {
                pending.push(next);
            }
        }
    }
    Ok(())
}

/// Gives every page its own content stream objects. Returns the number of
/// streams copied.
pub(crate) fn eliminate_shared_streams(doc: &mut Document) -> EngineResult<usize> {
    let mut seen = BTreeSet::new();
    let mut copied = 0;

    for page_id in doc.get_pages().into_values() {
        let contents = content_refs(doc, page_id)?;
        let mut changed = false;
        let mut own = Vec::with_capacity(contents.len());

        for entry in contents {
            let Object::Reference(id) = entry else {
                own.push(entry);
                continue;
            };
            if seen.insert(id) {
                own.push(entry);
                continue;
            }
            let copy = doc.get_object(id)?.clone();
            let copy_id = doc.add_object(copy);
            seen.insert(copy_id);
            own.push(Object::Reference(copy_id));
            changed = true;
            copied += 1;
        }

        // An indirect /Contents array may be shared by several pages too.
        let indirect = matches!(
            doc.get_dictionary(page_id)?.get(b"Contents"),
            Ok(Object::Reference(id)) if matches!(doc.get_object(*id), Ok(Object::Array(_)))
        );
        if changed || indirect {
            doc.get_object_mut(page_id)?
                .as_dict_mut()?
                .set("Contents", Object::Array(own));
        }
    }
    Ok(copied)
}
