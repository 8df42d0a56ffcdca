//! Small lopdf helpers shared by the extractor and the compositor.

use lopdf::{Dictionary, Document, Object, ObjectId};

/// Longest reference chain followed before an object is treated as null.
const MAX_REFERENCE_DEPTH: usize = 32;
/// Deepest page tree walked for an inherited attribute.
const MAX_TREE_DEPTH: usize = 64;

static NULL: Object = Object::Null;

/// Follow indirect references until a direct object is reached.
///
/// A chain longer than [`MAX_REFERENCE_DEPTH`] (a reference cycle in a
/// malformed file) resolves to `Object::Null`.
pub(crate) fn resolve<'a>(doc: &'a Document, mut object: &'a Object) -> Result<&'a Object, lopdf::Error> {
    for _ in 0..MAX_REFERENCE_DEPTH {
        match object {
            Object::Reference(id) => object = doc.get_object(*id)?,
            _ => return Ok(object),
        }
    }
    log::warn!("Reference chain deeper than {} objects, treating as null", MAX_REFERENCE_DEPTH);
    Ok(&NULL)
}

/// A page attribute, inherited through the page tree when absent.
pub(crate) fn inherited<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Result<Option<&'a Object>, lopdf::Error> {
    let mut node = doc.get_dictionary(page_id)?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = node.get(key) {
            return resolve(doc, value).map(Some);
        }
        match node.get(b"Parent") {
            Ok(parent) => node = resolve(doc, parent)?.as_dict()?,
            Err(_) => return Ok(None),
        }
    }
    log::warn!(
        "Page tree above {:?} is deeper than {} levels, ignoring /{}",
        page_id,
        MAX_TREE_DEPTH,
        String::from_utf8_lossy(key)
    );
    Ok(None)
}

pub(crate) fn page_resources(doc: &Document, page_id: ObjectId) -> Result<Option<&Dictionary>, lopdf::Error> {
    Ok(inherited(doc, page_id, b"Resources")?.and_then(|object| object.as_dict().ok()))
}

pub(crate) fn first_page(doc: &Document) -> Option<ObjectId> {
    doc.get_pages().values().next().copied()
}
