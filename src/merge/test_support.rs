//! Generated PDF fixtures shared by unit tests.

use lopdf::{Document, Object, dictionary};
use std::path::{Path, PathBuf};

/// A document with one page per entry in `widths`. Each page's MediaBox
/// width identifies it, so ordering survives a merge and can be asserted.
pub(crate) fn multi_page_document(widths: &[i64]) -> Document {
    let mut doc = Document::with_version("1.4");

    let catalog_id = doc.new_object_id();
    let pages_id = doc.new_object_id();

    let mut page_ids = Vec::new();
    for &width in widths {
        let page_id = doc.new_object_id();
        let page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), width.into(), 792.into()],
        };
        doc.objects.insert(page_id, page.into());
        page_ids.push(page_id);
    }

    let catalog = dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    };

    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => page_ids.into_iter().map(|id| id.into()).collect::<Vec<Object>>(),
        "Count" => widths.len() as i64,
    };

    doc.objects.insert(catalog_id, catalog.into());
    doc.objects.insert(pages_id, pages_dict.into());
    doc.trailer.set("Root", catalog_id);

    doc
}

pub(crate) fn single_page_document(width: i64) -> Document {
    multi_page_document(&[width])
}

/// Save a generated document under `dir`.
pub(crate) fn write_pdf(dir: &Path, name: &str, widths: &[i64]) -> PathBuf {
    let path = dir.join(name);
    multi_page_document(widths).save(&path).unwrap();
    path
}

/// MediaBox widths of every page, in page order.
pub(crate) fn page_widths(doc: &Document) -> Vec<i64> {
    doc.get_pages()
        .into_values()
        .map(|id| {
            let page = doc.get_dictionary(id).unwrap();
            let media_box = page.get(b"MediaBox").and_then(Object::as_array).unwrap();
            media_box[2].as_i64().unwrap()
        })
        .collect()
}
