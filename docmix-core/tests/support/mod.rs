//! Templates built in memory for integration tests

#![allow(dead_code)]

use docmix::TemplateBinder;
use image::{DynamicImage, Rgb, RgbImage};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

fn literal(text: &str) -> Object {
    Object::String(text.as_bytes().to_vec(), StringFormat::Literal)
}

fn rect(x1: i64, y1: i64, x2: i64, y2: i64) -> Object {
    Object::Array(vec![
        Object::Integer(x1),
        Object::Integer(y1),
        Object::Integer(x2),
        Object::Integer(y2),
    ])
}

fn text_widget(doc: &mut Document, page_id: ObjectId, name: &str, area: Object) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Widget",
        "FT" => "Tx",
        "T" => literal(name),
        "Rect" => area,
        "DA" => literal("/Helv 10 Tf 0 g"),
        "P" => page_id,
    })
}

/// A two-page payment slip template.
///
/// Page one carries `sacado`, `valor` and the `logo` image placeholder;
/// page two repeats `logo` through a second widget of the same field.
pub fn slip_template() -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let helv = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });

    let mut page_ids = Vec::new();
    for label in ["BT /Helv 12 Tf 50 780 Td (Recibo) Tj ET", "0 0 m 10 10 l S"] {
        let content = doc.add_object(Stream::new(Dictionary::new(), label.as_bytes().to_vec()));
        page_ids.push(doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => rect(0, 0, 595, 842),
            "Contents" => content,
            "Resources" => dictionary! { "Font" => dictionary! { "Helv" => helv } },
        }));
    }

    let sacado = text_widget(&mut doc, page_ids[0], "sacado", rect(50, 700, 350, 720));
    let valor = text_widget(&mut doc, page_ids[0], "valor", rect(400, 700, 550, 720));

    let logo = doc.new_object_id();
    let logo_widgets: Vec<ObjectId> = page_ids
        .iter()
        .map(|page_id| {
            doc.add_object(dictionary! {
                "Type" => "Annot",
                "Subtype" => "Widget",
                "Parent" => logo,
                "Rect" => rect(50, 760, 150, 810),
                "P" => *page_id,
            })
        })
        .collect();
    doc.objects.insert(
        logo,
        Object::Dictionary(dictionary! {
            "FT" => "Btn",
            "Ff" => 1 << 16,
            "T" => literal("logo"),
            "Kids" => logo_widgets.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
        }),
    );

    let first_annots = vec![
        Object::Reference(sacado),
        Object::Reference(valor),
        Object::Reference(logo_widgets[0]),
    ];
    let annots = [first_annots, vec![Object::Reference(logo_widgets[1])]];
    for (page_id, annots) in page_ids.iter().zip(annots) {
        doc.get_object_mut(*page_id)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .set("Annots", annots);
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => page_ids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
            "Count" => page_ids.len() as i64,
        }),
    );

    let acroform = doc.add_object(dictionary! {
        "Fields" => vec![
            Object::Reference(sacado),
            Object::Reference(valor),
            Object::Reference(logo),
        ],
        "DA" => literal("/Helv 0 Tf 0 g"),
        "DR" => dictionary! { "Font" => dictionary! { "Helv" => helv } },
    });
    let catalog = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
        "AcroForm" => acroform,
    });
    doc.trailer.set("Root", catalog);

    let info = doc.add_object(dictionary! {
        "Title" => literal("Modelo"),
        "Author" => literal("Template Author"),
        "CreationDate" => literal("D:20200101000000Z"),
    });
    doc.trailer.set("Info", info);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// A template with no form at all.
pub fn plain_template() -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let content = doc.add_object(Stream::new(Dictionary::new(), b"0 0 m 1 1 l S".to_vec()));
    let page = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => rect(0, 0, 200, 200),
        "Contents" => content,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page)],
            "Count" => 1,
        }),
    );
    let catalog = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

pub fn slip_binder() -> TemplateBinder {
    TemplateBinder::from_bytes(slip_template()).unwrap()
}

pub fn logo() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 4, Rgb([0, 80, 160])))
}

/// The catalog dictionary of a produced document.
pub fn catalog(doc: &Document) -> &Dictionary {
    let root = doc.trailer.get(b"Root").unwrap().as_reference().unwrap();
    doc.get_dictionary(root).unwrap()
}

/// Decoded content of every page, in page order.
pub fn page_contents(doc: &Document) -> Vec<String> {
    doc.get_pages()
        .into_values()
        .map(|id| String::from_utf8_lossy(&doc.get_page_content(id).unwrap()).into_owned())
        .collect()
}

/// Widget annotations left on every page.
pub fn widget_count(doc: &Document) -> usize {
    doc.get_pages()
        .into_values()
        .map(|id| {
            let page = doc.get_dictionary(id).unwrap();
            let annots = match page.get(b"Annots") {
                Ok(Object::Array(annots)) => annots.clone(),
                Ok(Object::Reference(id)) => doc
                    .get_object(*id)
                    .and_then(Object::as_array)
                    .cloned()
                    .unwrap_or_default(),
                _ => Vec::new(),
            };
            annots
                .iter()
                .filter_map(|a| a.as_reference().ok())
                .filter_map(|a| doc.get_dictionary(a).ok())
                .filter(|a| matches!(a.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Widget"))
                .count()
        })
        .sum()
}
