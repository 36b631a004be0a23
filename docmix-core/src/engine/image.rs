//! Raster images as image XObjects

use ::image::{DynamicImage, GenericImageView};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use super::{EngineError, EngineResult};

/// Pixel data split into color samples and an optional alpha mask.
struct Samples {
    color: Vec<u8>,
    color_space: &'static str,
    alpha: Option<Vec<u8>>,
}

fn split_samples(img: &DynamicImage) -> Samples {
    let grey = matches!(
        img,
        DynamicImage::ImageLuma8(_)
            | DynamicImage::ImageLumaA8(_)
            | DynamicImage::ImageLuma16(_)
            | DynamicImage::ImageLumaA16(_)
    );
    // Fully opaque images need no mask.
    let alpha = img
        .color()
        .has_alpha()
        .then(|| img.to_luma_alpha8())
        .map(|la| la.pixels().map(|p| p.0[1]).collect::<Vec<u8>>())
        .filter(|mask| mask.iter().any(|&a| a != u8::MAX));

    if grey {
        Samples {
            color: img.to_luma8().into_raw(),
            color_space: "DeviceGray",
            alpha,
        }
    } else {
        Samples {
            color: img.to_rgb8().into_raw(),
            color_space: "DeviceRGB",
            alpha,
        }
    }
}

fn image_dict(width: u32, height: u32, color_space: &str) -> Dictionary {
    Dictionary::from_iter(vec![
        ("Type", Object::Name(b"XObject".to_vec())),
        ("Subtype", Object::Name(b"Image".to_vec())),
        ("Width", Object::Integer(i64::from(width))),
        ("Height", Object::Integer(i64::from(height))),
        ("BitsPerComponent", Object::Integer(8)),
        ("ColorSpace", Object::Name(color_space.as_bytes().to_vec())),
        ("Interpolate", Object::Boolean(false)),
    ])
}

fn compressed(dict: Dictionary, data: Vec<u8>) -> Stream {
    let mut stream = Stream::new(dict, data).with_compression(true);
    let _ = stream.compress();
    stream
}

/// Adds `img` to the document as an 8-bit image XObject. Transparency is
/// written as a separate `/SMask` image.
pub(crate) fn add_image_xobject(doc: &mut Document, img: &DynamicImage) -> EngineResult<ObjectId> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(EngineError::InvalidStructure(
            "image has no pixels".to_string(),
        ));
    }

    let samples = split_samples(img);
    let mut dict = image_dict(width, height, samples.color_space);

    if let Some(alpha) = samples.alpha {
        let mask = compressed(image_dict(width, height, "DeviceGray"), alpha);
        dict.set("SMask", Object::Reference(doc.add_object(mask)));
    }

    Ok(doc.add_object(compressed(dict, samples.color)))
}
