//! Page tree splicing.
//!
//! [`DocumentAssembler`] owns a flat page tree (one `Pages` node, every page a
//! direct kid) and appends whole documents to it. Appended objects are
//! renumbered past the current maximum id so references never collide.

use lopdf::{Dictionary, Document, Object, ObjectId, dictionary};

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Bound on page tree depth when resolving inherited attributes.
const MAX_TREE_DEPTH: usize = 64;

/// Accumulates documents into one flat page tree.
#[derive(Debug)]
pub struct DocumentAssembler {
    document: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
}

impl DocumentAssembler {
    /// Start an empty document.
    pub fn new() -> Self {
        let mut document = Document::with_version("1.5");
        let pages_id = document.new_object_id();
        let catalog_id = document.new_object_id();

        document.objects.insert(
            catalog_id,
            dictionary! {
                "Type" => "Catalog",
                "Pages" => pages_id,
            }
            .into(),
        );
        document.trailer.set("Root", catalog_id);

        Self {
            document,
            pages_id,
            kids: Vec::new(),
        }
    }

    /// Pages appended so far.
    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    /// Append every page of `doc`, in page order. Returns the number of pages
    /// added.
    pub fn append(&mut self, mut doc: Document) -> usize {
        doc.renumber_objects_with(self.document.max_id + 1);

        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        if page_ids.is_empty() {
            return 0;
        }

        for &page_id in &page_ids {
            let inherited = inherited_attributes(&doc, page_id);
            if let Ok(page) = doc.get_dictionary_mut(page_id) {
                for (key, value) in inherited {
                    page.set(key, value);
                }
                page.set("Parent", self.pages_id);
            }
        }

        // The source catalog would otherwise survive as a second root.
        if let Ok(root) = doc.trailer.get(b"Root").and_then(Object::as_reference) {
            doc.objects.remove(&root);
        }

        self.document.max_id = self.document.max_id.max(doc.max_id);
        self.document.objects.extend(doc.objects);
        self.kids
            .extend(page_ids.iter().copied().map(Object::Reference));

        page_ids.len()
    }

    /// Close the page tree and hand back the document.
    pub fn into_document(mut self) -> Document {
        let count = self.kids.len() as i64;
        let pages: Dictionary = dictionary! {
            "Type" => "Pages",
            "Kids" => self.kids,
            "Count" => count,
        };
        self.document.objects.insert(self.pages_id, pages.into());
        self.document
    }
}

impl Default for DocumentAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Inheritable attributes `page_id` lacks but an ancestor defines, nearest
/// ancestor first.
fn inherited_attributes(doc: &Document, page_id: ObjectId) -> Vec<(&'static [u8], Object)> {
    let Ok(page) = doc.get_dictionary(page_id) else {
        return Vec::new();
    };

    let mut missing: Vec<&'static [u8]> = INHERITABLE
        .iter()
        .copied()
        .filter(|key| !page.has(key))
        .collect();
    let mut found = Vec::new();
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();

    for _ in 0..MAX_TREE_DEPTH {
        let Some(node_id) = parent else { break };
        if missing.is_empty() {
            break;
        }
        let Ok(node) = doc.get_dictionary(node_id) else {
            break;
        };

        missing.retain(|key| match node.get(key) {
            Ok(value) => {
                found.push((*key, value.clone()));
                false
            }
            Err(_) => true,
        });
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }

    found
}
