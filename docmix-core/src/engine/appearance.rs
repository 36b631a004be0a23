//! Appearance streams for variable text fields
//!
//! A field's `/DA` string names the font resource, the font size (0 means
//! auto size) and the text color. The generated stream follows the usual
//! `/Tx BMC ... EMC` layout so viewers can regenerate it if they want to.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

use super::fields::{default_appearance, flags, normal_appearance, quadding, FormField};
use super::objects::{
    catalog_id, dict_at_path_mut, get_array, get_dict, number, real, rectangle, resolve,
};
use super::text::win_ansi_bytes;
use super::{EngineError, EngineResult};

const FALLBACK_DA: &str = "/Helv 12 Tf 0 g";
const PADDING: f64 = 2.0;
const AUTO_SIZE_MAX: f64 = 12.0;
const AUTO_SIZE_MIN: f64 = 4.0;
const LEADING: f64 = 1.15;
const ASCENT: f64 = 0.718;
const DESCENT: f64 = 0.207;

/// Helvetica advance widths for codes 32..=126.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // 0..9
    278, 278, 584, 584, 584, 556, 1015, // :..@
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, 667, 778, 722,
    667, 611, 722, 667, 944, 667, 667, 611, // A..Z
    278, 278, 278, 469, 556, 333, // [..`
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, 556, 556, 333,
    500, 278, 556, 500, 722, 500, 500, 500, // a..z
    334, 260, 334, 584, // {..~
];

/// Parsed `/DA` string.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DefaultAppearance {
    pub font: String,
    pub size: f64,
    pub color: Option<(String, Vec<f64>)>,
}

impl DefaultAppearance {
    pub(crate) fn parse(da: &str) -> Self {
        let mut font = None;
        let mut size = 0.0;
        let mut color = None;
        let mut operands: Vec<&str> = Vec::new();

        for token in da.split_whitespace() {
            match token {
                "Tf" => {
                    if let [.., name, points] = operands.as_slice() {
                        font = name.strip_prefix('/').map(str::to_string);
                        size = points.parse().unwrap_or(0.0);
                    }
                    operands.clear();
                }
                "g" | "rg" | "k" => {
                    let arity = match token {
                        "g" => 1,
                        "rg" => 3,
                        _ => 4,
                    };
                    if operands.len() >= arity {
                        let values: Vec<f64> = operands[operands.len() - arity..]
                            .iter()
                            .filter_map(|v| v.parse().ok())
                            .collect();
                        if values.len() == arity {
                            color = Some((token.to_string(), values));
                        }
                    }
                    operands.clear();
                }
                _ if token.starts_with(|c: char| c.is_ascii_alphabetic()) => operands.clear(),
                _ => operands.push(token),
            }
        }

        Self {
            font: font.unwrap_or_else(|| "Helv".to_string()),
            size,
            color,
        }
    }
}

/// Advance widths in thousandths of an em.
#[derive(Debug, Clone)]
struct FontMetrics {
    first_char: usize,
    widths: Vec<f64>,
    missing: f64,
}

impl FontMetrics {
    fn helvetica() -> Self {
        Self {
            first_char: 32,
            widths: HELVETICA_WIDTHS.iter().map(|w| f64::from(*w)).collect(),
            missing: 556.0,
        }
    }

    fn monospace() -> Self {
        Self {
            first_char: 0,
            widths: Vec::new(),
            missing: 600.0,
        }
    }

    fn from_font(doc: &Document, font: &Dictionary) -> Option<Self> {
        let base: &[u8] = match font.get(b"BaseFont") {
            Ok(Object::Name(name)) => name.as_slice(),
            _ => &[],
        };
        if base.starts_with(b"Courier") {
            return Some(Self::monospace());
        }

        let widths = get_array(doc, font, b"Widths")?
            .iter()
            .map(|w| resolve(doc, w).ok().and_then(number).unwrap_or(0.0))
            .collect();
        let first_char = match font.get(b"FirstChar") {
            Ok(Object::Integer(first)) => usize::try_from(*first).ok()?,
            _ => return None,
        };
        let missing = get_dict(doc, font, b"FontDescriptor")
            .and_then(|fd| fd.get(b"MissingWidth").ok())
            .and_then(number)
            .unwrap_or(0.0);

        Some(Self {
            first_char,
            widths,
            missing,
        })
    }

    fn width(&self, bytes: &[u8], size: f64) -> f64 {
        let units: f64 = bytes
            .iter()
            .map(|&b| {
                usize::from(b)
                    .checked_sub(self.first_char)
                    .and_then(|i| self.widths.get(i))
                    .copied()
                    .unwrap_or(self.missing)
            })
            .sum();
        units * size / 1000.0
    }
}

/// Geometry of the widget the text is laid out in.
#[derive(Debug, Clone, Copy)]
struct TextBox {
    width: f64,
    height: f64,
    quadding: i64,
    multiline: bool,
}

impl TextBox {
    fn operations(
        &self,
        da: &DefaultAppearance,
        metrics: &FontMetrics,
        text: &str,
    ) -> Vec<Operation> {
        let inner_width = (self.width - 2.0 * PADDING).max(0.0);

        let (size, lines) = if self.multiline {
            let size = if da.size > 0.0 { da.size } else { AUTO_SIZE_MAX };
            (size, wrap(text, metrics, size, inner_width))
        } else {
            let line = win_ansi_bytes(&text.replace(['\r', '\n'], " "));
            let size = if da.size > 0.0 {
                da.size
            } else {
                self.auto_size(metrics, &line, inner_width)
            };
            (size, vec![line])
        };

        let mut ops = vec![
            Operation::new("BMC", vec![Object::Name(b"Tx".to_vec())]),
            Operation::new("q", vec![]),
            Operation::new(
                "re",
                vec![
                    real(1.0),
                    real(1.0),
                    real((self.width - 2.0).max(0.0)),
                    real((self.height - 2.0).max(0.0)),
                ],
            ),
            Operation::new("W", vec![]),
            Operation::new("n", vec![]),
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![Object::Name(da.font.as_bytes().to_vec()), real(size)],
            ),
        ];
        if let Some((operator, values)) = &da.color {
            ops.push(Operation::new(
                operator,
                values.iter().map(|v| real(*v)).collect(),
            ));
        }

        let leading = size * LEADING;
        let mut y = if self.multiline {
            self.height - PADDING - size * ASCENT
        } else {
            (self.height - size * (ASCENT + DESCENT)) / 2.0 + size * DESCENT
        };
        let (mut last_x, mut last_y) = (0.0, 0.0);
        for line in lines {
            let line_width = metrics.width(&line, size);
            let x = match self.quadding {
                1 => (self.width - line_width) / 2.0,
                2 => self.width - PADDING - line_width,
                _ => PADDING,
            };
            ops.push(Operation::new("Td", vec![real(x - last_x), real(y - last_y)]));
            ops.push(Operation::new(
                "Tj",
                vec![Object::String(line, StringFormat::Literal)],
            ));
            last_x = x;
            last_y = y;
            y -= leading;
        }

        ops.push(Operation::new("ET", vec![]));
        ops.push(Operation::new("Q", vec![]));
        ops.push(Operation::new("EMC", vec![]));
        ops
    }

    /// Largest size up to [`AUTO_SIZE_MAX`] that fits the box.
    fn auto_size(&self, metrics: &FontMetrics, line: &[u8], inner_width: f64) -> f64 {
        let mut size = ((self.height - 2.0 * PADDING) / (ASCENT + DESCENT)).min(AUTO_SIZE_MAX);
        let width = metrics.width(line, size);
        if width > inner_width && width > 0.0 {
            size *= inner_width / width;
        }
        size.max(AUTO_SIZE_MIN)
    }
}

/// Greedy word wrap. Words longer than a line are not broken.
fn wrap(text: &str, metrics: &FontMetrics, size: f64, max_width: f64) -> Vec<Vec<u8>> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let paragraph = paragraph.trim_end_matches('\r');
        let mut line: Vec<u8> = Vec::new();
        for word in paragraph.split(' ') {
            let word = win_ansi_bytes(word);
            let mut candidate = line.clone();
            if !candidate.is_empty() {
                candidate.push(b' ');
            }
            candidate.extend_from_slice(&word);

            if line.is_empty() || metrics.width(&candidate, size) <= max_width {
                line = candidate;
            } else {
                lines.push(std::mem::replace(&mut line, word));
            }
        }
        lines.push(line);
    }
    lines
}

/// Looks up the font named by `/DA` in the form's default resources and
/// adds Helvetica under that name when it is missing.
fn form_font(doc: &mut Document, name: &str) -> EngineResult<Object> {
    let existing = super::acroform(doc)
        .and_then(|form| get_dict(doc, form, b"DR"))
        .and_then(|dr| get_dict(doc, dr, b"Font"))
        .and_then(|fonts| fonts.get(name.as_bytes()).ok())
        .cloned();
    if let Some(font) = existing {
        return Ok(font);
    }

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let root = catalog_id(doc)?;
    dict_at_path_mut(doc, root, &[b"AcroForm", b"DR", b"Font"])?
        .set(name.as_bytes().to_vec(), Object::Reference(font_id));
    Ok(Object::Reference(font_id))
}

fn metrics_for(doc: &Document, font: &Object) -> FontMetrics {
    resolve(doc, font)
        .ok()
        .and_then(|obj| match obj {
            Object::Dictionary(dict) => FontMetrics::from_font(doc, dict),
            _ => None,
        })
        .unwrap_or_else(FontMetrics::helvetica)
}

/// Generates the normal appearance of one widget of a text or choice field.
pub(crate) fn write_text_appearance(
    doc: &mut Document,
    field: &FormField,
    widget: ObjectId,
    value: &str,
) -> EngineResult<()> {
    let rect = rectangle(doc, doc.get_dictionary(widget)?, b"Rect").ok_or_else(|| {
        EngineError::InvalidStructure(format!("widget of '{}' has no /Rect", field.name))
    })?;
    let da = DefaultAppearance::parse(
        &default_appearance(doc, widget).unwrap_or_else(|| FALLBACK_DA.to_string()),
    );
    let text_box = TextBox {
        width: rect.width(),
        height: rect.height(),
        quadding: quadding(doc, widget),
        multiline: field.flags & flags::MULTILINE != 0,
    };

    let font = form_font(doc, &da.font)?;
    let metrics = metrics_for(doc, &font);

    let shown = if field.flags & flags::PASSWORD != 0 {
        "*".repeat(value.chars().count())
    } else {
        value.to_string()
    };
    let content = Content {
        operations: text_box.operations(&da, &metrics, &shown),
    }
    .encode()?;

    let mut font_resources = Dictionary::new();
    font_resources.set(da.font.as_bytes().to_vec(), font);
    let stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => vec![real(0.0), real(0.0), real(text_box.width), real(text_box.height)],
            "Resources" => dictionary! { "Font" => font_resources },
        },
        content,
    );
    let appearance = doc.add_object(stream);

    doc.get_object_mut(widget)?
        .as_dict_mut()?
        .set("AP", dictionary! { "N" => appearance });
    Ok(())
}

/// Names of the normal appearance states of a widget (`/Yes`, `/Off`, ...).
pub(crate) fn appearance_states(doc: &Document, widget: ObjectId) -> Vec<Vec<u8>> {
    let Ok(dict) = doc.get_dictionary(widget) else {
        return Vec::new();
    };
    match normal_appearance(doc, dict).and_then(|n| resolve(doc, n).ok()) {
        Some(Object::Dictionary(states)) => states.iter().map(|(name, _)| name.clone()).collect(),
        _ => Vec::new(),
    }
}
