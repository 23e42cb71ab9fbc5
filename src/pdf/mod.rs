// Certificate stamping on top of uploaded templates.
// PDF templates are edited in place with lopdf; raster templates are first
// wrapped into a one-page PDF sized 1 pt per pixel.
pub mod helvetica;
mod raster;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use thiserror::Error;

use crate::placement::{PageSize, ResolvedDraw};
use helvetica::{HelveticaBold, Unencodable, BASE_FONT};

/// US Letter, used when a page carries no usable MediaBox.
const FALLBACK_PAGE: (f64, f64, f64, f64) = (0.0, 0.0, 612.0, 792.0);

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("failed to parse template PDF: {0}")]
    Parse(#[source] lopdf::Error),
    #[error("template PDF has no pages")]
    NoPages,
    #[error("template is neither a PDF nor a supported image (PNG, JPEG)")]
    UnsupportedFormat,
    #[error("failed to decode template image: {0}")]
    Image(#[from] image::ImageError),
    #[error("malformed PDF object: {0}")]
    Object(#[from] lopdf::Error),
    #[error(transparent)]
    Text(#[from] Unencodable),
    #[error("failed to serialize PDF: {0}")]
    Save(String),
}

/// Template bytes ready for stamping, plus the geometry of the page names
/// are drawn on.
#[derive(Debug, Clone)]
pub struct TemplateSource {
    bytes: Vec<u8>,
    page: PageSize,
    origin: (f64, f64),
}

impl TemplateSource {
    /// Accepts PDF or PNG/JPEG bytes. Fails when the template cannot be
    /// rendered at all, before any participant is processed.
    pub fn load(bytes: Vec<u8>) -> Result<Self, PdfError> {
        let bytes = if looks_like_pdf(&bytes) {
            bytes
        } else if image::guess_format(&bytes).is_ok() {
            raster::image_to_pdf(&bytes)?
        } else {
            return Err(PdfError::UnsupportedFormat);
        };

        let doc = Document::load_mem(&bytes).map_err(PdfError::Parse)?;
        let page_id = first_page(&doc)?;
        let (llx, lly, urx, ury) = media_box(&doc, page_id);

        Ok(Self {
            bytes,
            page: PageSize::new(urx - llx, ury - lly),
            origin: (llx, lly),
        })
    }

    pub fn page_size(&self) -> PageSize {
        self.page
    }

    pub fn font(&self) -> HelveticaBold {
        HelveticaBold
    }

    /// A fresh copy of the template with `text` drawn per `draw`.
    pub fn stamp(&self, text: &str, draw: &ResolvedDraw) -> Result<Vec<u8>, PdfError> {
        let encoded = helvetica::encode(text)?;

        let mut doc = Document::load_mem(&self.bytes).map_err(PdfError::Parse)?;
        let page_id = first_page(&doc)?;

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => BASE_FONT,
            "Encoding" => "WinAnsiEncoding",
        });
        let font_key = register_font(&mut doc, page_id, font_id)?;

        let (r, g, b) = draw.color.to_unit();
        let x = self.origin.0 + draw.draw_x;
        let y = self.origin.1 + draw.draw_y_baseline;
        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new("rg", vec![Object::Real(r), Object::Real(g), Object::Real(b)]),
                Operation::new("BT", vec![]),
                Operation::new(
                    "Tf",
                    vec![Object::Name(font_key.into_bytes()), Object::Integer(i64::from(draw.font_size))],
                ),
                Operation::new("Td", vec![Object::Real(x as f32), Object::Real(y as f32)]),
                Operation::new("Tj", vec![Object::String(encoded, StringFormat::Literal)]),
                Operation::new("ET", vec![]),
                Operation::new("Q", vec![]),
            ],
        };
        append_overlay(&mut doc, page_id, content.encode()?)?;

        let mut output = Vec::new();
        doc.save_to(&mut output)
            .map_err(|e| PdfError::Save(e.to_string()))?;
        Ok(output)
    }
}

fn looks_like_pdf(bytes: &[u8]) -> bool {
    bytes
        .get(..1024.min(bytes.len()))
        .is_some_and(|head| head.windows(5).any(|w| w == b"%PDF-"))
}

fn first_page(doc: &Document) -> Result<ObjectId, PdfError> {
    doc.get_pages().values().next().copied().ok_or(PdfError::NoPages)
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Looks `key` up on the page and then up its `Parent` chain.
fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = Some(page_id);
    let mut depth = 0;
    while let Some(id) = current {
        let dict = doc.get_dictionary(id).ok()?;
        if let Ok(value) = dict.get(key) {
            return resolve(doc, value);
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
        depth += 1;
        if depth > 32 {
            return None;
        }
    }
    None
}

fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(f) => Some(f64::from(*f)),
        _ => None,
    }
}

fn media_box(doc: &Document, page_id: ObjectId) -> (f64, f64, f64, f64) {
    let corners = inherited(doc, page_id, b"MediaBox")
        .and_then(|obj| obj.as_array().ok())
        .filter(|arr| arr.len() == 4)
        .and_then(|arr| {
            let values: Option<Vec<f64>> = arr
                .iter()
                .map(|o| resolve(doc, o).and_then(number))
                .collect();
            values
        });
    match corners.as_deref() {
        Some(&[a, b, c, d]) if (c - a).abs() > 0.0 && (d - b).abs() > 0.0 => {
            (a.min(c), b.min(d), a.max(c), b.max(d))
        }
        _ => FALLBACK_PAGE,
    }
}

fn owned_dictionary(doc: &Document, obj: Option<&Object>) -> Dictionary {
    match obj.and_then(|o| resolve(doc, o)) {
        Some(Object::Dictionary(dict)) => dict.clone(),
        _ => Dictionary::new(),
    }
}

/// Adds `font_id` to the page's font resources under an unused name.
///
/// Inherited or shared resource dictionaries are copied onto the page so
/// other pages are left untouched.
fn register_font(doc: &mut Document, page_id: ObjectId, font_id: ObjectId) -> Result<String, PdfError> {
    let mut resources = owned_dictionary(doc, inherited(doc, page_id, b"Resources"));
    let mut fonts = owned_dictionary(doc, resources.get(b"Font").ok());

    let key = (0..)
        .map(|n| format!("CertName{n}"))
        .find(|candidate| !fonts.has(candidate.as_bytes()))
        .unwrap_or_else(|| "CertName".to_string());
    fonts.set(key.clone(), Object::Reference(font_id));
    resources.set("Font", Object::Dictionary(fonts));

    doc.get_object_mut(page_id)?
        .as_dict_mut()?
        .set("Resources", Object::Dictionary(resources));
    Ok(key)
}

/// Brackets the existing page content in `q`/`Q` and appends `overlay`, so
/// graphics state left behind by the template cannot move the text.
fn append_overlay(doc: &mut Document, page_id: ObjectId, overlay: Vec<u8>) -> Result<(), PdfError> {
    let existing: Vec<Object> = match doc.get_dictionary(page_id)?.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    };

    let open = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let mut closing = b"\nQ\n".to_vec();
    closing.extend(overlay);
    let close = doc.add_object(Stream::new(Dictionary::new(), closing));

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(open));
    contents.extend(existing);
    contents.push(Object::Reference(close));

    doc.get_object_mut(page_id)?
        .as_dict_mut()?
        .set("Contents", Object::Array(contents));
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::RenderDefaults;
    use crate::placement::{resolve, Alignment, Placement, Rgb};

    /// A one-page PDF of the given size with a little existing content.
    pub(crate) fn blank_pdf(width: i64, height: i64) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let content = doc.add_object(Stream::new(
            Dictionary::new(),
            b"0.9 0.9 0.9 rg 0 0 50 50 re f".to_vec(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1i64,
                "MediaBox" => vec![0i64.into(), 0i64.into(), width.into(), height.into()],
                "Resources" => dictionary! {},
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    fn page_text(bytes: &[u8]) -> String {
        let doc = Document::load_mem(bytes).unwrap();
        let page_id = first_page(&doc).unwrap();
        String::from_utf8_lossy(&doc.get_page_content(page_id).unwrap()).into_owned()
    }

    #[test]
    fn page_size_is_inherited_from_the_page_tree() {
        let source = TemplateSource::load(blank_pdf(600, 400)).unwrap();
        assert_eq!(source.page_size(), PageSize::new(600.0, 400.0));
    }

    #[test]
    fn stamping_draws_the_name_at_the_resolved_position() {
        let source = TemplateSource::load(blank_pdf(600, 400)).unwrap();
        let placement = Placement {
            font_size: Some(24),
            alignment: Some(Alignment::Center),
            text_color: Some(Rgb::new(255, 0, 0)),
            ..Placement::with_ratio(0.5, 0.4)
        };
        let draw = resolve(
            &placement,
            &RenderDefaults::default(),
            source.page_size(),
            "Hello",
            &source.font(),
        );
        assert!((draw.draw_x - (300.0 - 58.68 / 2.0)).abs() < 1e-9);

        let stamped = source.stamp("Hello", &draw).unwrap();
        let content = page_text(&stamped);
        assert!(content.starts_with("q"));
        assert!(content.contains("0.9 0.9 0.9 rg"));
        assert!(content.contains("(Hello) Tj"));
        assert!(content.contains("/CertName0 24 Tf"));

        let doc = Document::load_mem(&stamped).unwrap();
        let page_id = first_page(&doc).unwrap();
        let resources = doc.get_dictionary(page_id).unwrap().get(b"Resources").unwrap();
        let fonts = resources.as_dict().unwrap().get(b"Font").unwrap().as_dict().unwrap();
        let font_id = fonts.get(b"CertName0").unwrap().as_reference().unwrap();
        let font = doc.get_dictionary(font_id).unwrap();
        assert_eq!(font.get(b"BaseFont").unwrap().as_name().unwrap(), BASE_FONT.as_bytes());
    }

    #[test]
    fn unencodable_names_fail_to_stamp() {
        let source = TemplateSource::load(blank_pdf(600, 400)).unwrap();
        let draw = resolve(
            &Placement::default(),
            &RenderDefaults::default(),
            source.page_size(),
            "李雷",
            &source.font(),
        );
        assert!(matches!(source.stamp("李雷", &draw), Err(PdfError::Text(_))));
    }

    #[test]
    fn unknown_bytes_are_rejected() {
        assert!(matches!(
            TemplateSource::load(b"plain text, not a template".to_vec()),
            Err(PdfError::UnsupportedFormat)
        ));
    }
}
