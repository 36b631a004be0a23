//! Small documents built in memory for engine tests

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

/// One page with a line drawn on it and an empty resource dictionary.
pub(crate) fn single_page() -> (Document, ObjectId) {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let content_id = doc.add_object(Stream::new(
        Dictionary::new(),
        b"0 0 m 100 100 l S".to_vec(),
    ));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => rect(0, 0, 612, 792),
        "Contents" => content_id,
        "Resources" => Dictionary::new(),
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    (doc, page_id)
}

/// A one-page form:
///
/// - `nome`: text field with an auto-sized font
/// - `logo`: push button used as an image placeholder
/// - `aceito`: check box with `Yes`/`Off` states
/// - `pagador.cpf`: text field nested under a non-terminal parent
pub(crate) fn form_document() -> Document {
    let (mut doc, page_id) = single_page();

    let helv = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });

    let nome = doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Widget",
        "FT" => "Tx",
        "T" => literal("nome"),
        "Rect" => rect(50, 700, 300, 720),
        "DA" => literal("/Helv 0 Tf 0 g"),
        "P" => page_id,
    });

    let logo = doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Widget",
        "FT" => "Btn",
        "Ff" => 1 << 16,
        "T" => literal("logo"),
        "Rect" => rect(400, 650, 500, 750),
        "P" => page_id,
    });

    let yes = doc.add_object(Stream::new(
        dictionary! { "Type" => "XObject", "Subtype" => "Form", "BBox" => rect(0, 0, 10, 10) },
        b"0 0 10 10 re f".to_vec(),
    ));
    let off = doc.add_object(Stream::new(
        dictionary! { "Type" => "XObject", "Subtype" => "Form", "BBox" => rect(0, 0, 10, 10) },
        Vec::new(),
    ));
    let aceito = doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Widget",
        "FT" => "Btn",
        "T" => literal("aceito"),
        "Rect" => rect(50, 600, 60, 610),
        "AS" => "Off",
        "AP" => dictionary! { "N" => dictionary! { "Yes" => yes, "Off" => off } },
        "P" => page_id,
    });

    let pagador = doc.new_object_id();
    let cpf = doc.add_object(dictionary! {
        "FT" => "Tx",
        "T" => literal("cpf"),
        "Parent" => pagador,
        "Q" => 2,
    });
    let cpf_widget = doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Widget",
        "Parent" => cpf,
        "Rect" => rect(50, 500, 250, 520),
        "P" => page_id,
    });
    doc.get_object_mut(cpf)
        .unwrap()
        .as_dict_mut()
        .unwrap()
        .set("Kids", vec![Object::Reference(cpf_widget)]);
    doc.objects.insert(
        pagador,
        Object::Dictionary(dictionary! {
            "T" => literal("pagador"),
            "Kids" => vec![Object::Reference(cpf)],
        }),
    );

    let page = doc.get_object_mut(page_id).unwrap().as_dict_mut().unwrap();
    page.set(
        "Annots",
        vec![
            Object::Reference(nome),
            Object::Reference(logo),
            Object::Reference(aceito),
            Object::Reference(cpf_widget),
        ],
    );

    let acroform = doc.add_object(dictionary! {
        "Fields" => vec![
            Object::Reference(nome),
            Object::Reference(logo),
            Object::Reference(aceito),
            Object::Reference(pagador),
        ],
        "DA" => literal("/Helv 0 Tf 0 g"),
        "DR" => dictionary! { "Font" => dictionary! { "Helv" => helv } },
        "NeedAppearances" => true,
    });
    let catalog_id = doc.trailer.get(b"Root").unwrap().as_reference().unwrap();
    doc.get_object_mut(catalog_id)
        .unwrap()
        .as_dict_mut()
        .unwrap()
        .set("AcroForm", acroform);

    let info = doc.add_object(dictionary! {
        "Title" => literal("Template"),
        "CreationDate" => literal("D:20200101000000Z"),
    });
    doc.trailer.set("Info", info);

    doc
}

pub(crate) fn to_bytes(doc: &mut Document) -> Vec<u8> {
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}
