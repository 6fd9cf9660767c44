//! Document assembly: one PDF page with the image and an invisible text layer.
//!
//! ## Page layout
//!
//! The normalized image is scaled uniformly by
//! `min(page_w / img_w, page_h / img_h)` and centred on the page. Above it,
//! the OCR text is drawn in Helvetica at `text_font_size` with fill opacity
//! `text_opacity` (0 by default). The text is never visible, but it is real
//! page content, so viewers can search and select it.
//!
//! ## Image embedding
//!
//! JPEG bytes are embedded as-is with `DCTDecode`. PNG (and every
//! unrecognized upload type, which the normalizer re-encoded as PNG) is
//! decoded to RGB and embedded with `FlateDecode`.
//!
//! Whatever happens, the raw and normalized scratch images are deleted
//! before this stage returns. Nothing downstream needs them.

use crate::config::PipelineConfig;
use crate::error::IngestError;
use crate::event::{EmbedFormat, ImageKind, PipelineContext};
use crate::pipeline::normalize::NormalizedImage;
use crate::pipeline::scratch::{ScratchArea, ScratchFile, ScratchKind};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream, StringFormat};
use std::io::Write;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

const IMAGE_NAME: &str = "Im0";
const FONT_NAME: &str = "F1";
const GSTATE_NAME: &str = "GS0";

/// Where the image lands on the page, in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImagePlacement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub scale: f32,
}

/// Scale `img_w × img_h` uniformly to fit the page and centre it.
pub fn fit_centered(page_w: f32, page_h: f32, img_w: u32, img_h: u32) -> ImagePlacement {
    let (iw, ih) = (img_w as f32, img_h as f32);
    let scale = (page_w / iw).min(page_h / ih);
    let width = iw * scale;
    let height = ih * scale;
    ImagePlacement {
        x: (page_w - width) / 2.0,
        y: (page_h - height) / 2.0,
        width,
        height,
        scale,
    }
}

/// The finished PDF, in memory and in the scratch area.
#[derive(Debug)]
pub struct AssembledDocument {
    pub file: ScratchFile,
    pub bytes: Vec<u8>,
    pub placement: ImagePlacement,
}

/// Page and text-layer parameters taken from the config.
#[derive(Debug, Clone, Copy)]
struct Layout {
    page_w: f32,
    page_h: f32,
    font_size: f32,
    opacity: f32,
    margin: f32,
}

impl Layout {
    fn from_config(config: &PipelineConfig) -> Self {
        let (page_w, page_h) = config.page_size.dimensions();
        Self {
            page_w,
            page_h,
            font_size: config.text_font_size,
            opacity: config.text_opacity,
            margin: config.text_margin,
        }
    }
}

#[derive(Debug, Error)]
enum BuildError {
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("image: {0}")]
    Image(#[from] image::ImageError),
    #[error("PDF: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("image has zero width or height")]
    EmptyImage,
}

/// Build the PDF and release both scratch images.
pub async fn assemble(
    ctx: &PipelineContext,
    raw: ScratchFile,
    normalized: NormalizedImage,
    text: &str,
    scratch: &ScratchArea,
    config: &PipelineConfig,
) -> Result<AssembledDocument, IngestError> {
    if ctx.image_kind == ImageKind::Unrecognized {
        warn!(
            "Content type '{}' has no dedicated embedding; falling back to PNG",
            ctx.content_type
        );
    }

    let file = scratch.file(ScratchKind::Document, &format!("{}.pdf", ctx.base_name));
    let layout = Layout::from_config(config);
    let image_path = normalized.file.path().to_path_buf();
    let pdf_path = file.path().to_path_buf();
    let (width, height, format) = (normalized.width, normalized.height, normalized.format);
    let text = text.to_string();
    let title = ctx.base_name.clone();

    let result = tokio::task::spawn_blocking(move || {
        assemble_blocking(&image_path, width, height, format, &text, &title, layout, &pdf_path)
    })
    .await;

    raw.release();
    normalized.file.release();

    let (bytes, placement) = result
        .map_err(|e| IngestError::Internal(format!("Assemble task panicked: {e}")))?
        .map_err(|e| IngestError::AssembleFailed {
            name: format!("{}.pdf", ctx.base_name),
            detail: e.to_string(),
        })?;

    debug!(
        "Assembled {} bytes, image {:.1}x{:.1} pt at ({:.1}, {:.1})",
        bytes.len(),
        placement.width,
        placement.height,
        placement.x,
        placement.y
    );
    Ok(AssembledDocument {
        file,
        bytes,
        placement,
    })
}

#[allow(clippy::too_many_arguments)]
fn assemble_blocking(
    image_path: &Path,
    width: u32,
    height: u32,
    format: EmbedFormat,
    text: &str,
    title: &str,
    layout: Layout,
    pdf_path: &Path,
) -> Result<(Vec<u8>, ImagePlacement), BuildError> {
    let data = std::fs::read(image_path)?;
    let image = image_xobject(&data, width, height, format)?;
    let (bytes, placement) = build_pdf(image, width, height, text, title, layout)?;
    std::fs::write(pdf_path, &bytes)?;
    Ok((bytes, placement))
}

/// The image as a PDF image XObject stream.
fn image_xobject(
    data: &[u8],
    width: u32,
    height: u32,
    format: EmbedFormat,
) -> Result<Stream, BuildError> {
    if width == 0 || height == 0 {
        return Err(BuildError::EmptyImage);
    }
    let (filter, body) = match format {
        EmbedFormat::Jpeg => ("DCTDecode", data.to_vec()),
        EmbedFormat::Png => {
            let rgb = image::load_from_memory_with_format(data, image::ImageFormat::Png)?.to_rgb8();
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(rgb.as_raw())?;
            ("FlateDecode", encoder.finish()?)
        }
    };

    let dict = Dictionary::from_iter(vec![
        ("Type", Object::from("XObject")),
        ("Subtype", Object::from("Image")),
        ("Width", Object::Integer(i64::from(width))),
        ("Height", Object::Integer(i64::from(height))),
        ("ColorSpace", Object::from("DeviceRGB")),
        ("BitsPerComponent", Object::Integer(8)),
        ("Filter", Object::from(filter)),
    ]);
    Ok(Stream::new(dict, body).with_compression(false))
}

fn real(v: f32) -> Object {
    Object::Real(v)
}

fn name(n: &str) -> Object {
    Object::Name(n.as_bytes().to_vec())
}

/// Encode a line for a WinAnsi-encoded standard font. Unencodable characters
/// become `?`.
fn encode_win_ansi(line: &str) -> Vec<u8> {
    line.chars()
        .filter(|c| *c != '\r')
        .map(|c| match c {
            '\t' => b' ',
            ' '..='~' => c as u8,
            '\u{A0}'..='\u{FF}' => c as u32 as u8,
            '€' => 0x80,
            '‚' => 0x82,
            'ƒ' => 0x83,
            '„' => 0x84,
            '…' => 0x85,
            '†' => 0x86,
            '‡' => 0x87,
            'ˆ' => 0x88,
            '‰' => 0x89,
            'Š' => 0x8A,
            '‹' => 0x8B,
            'Œ' => 0x8C,
            'Ž' => 0x8E,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '˜' => 0x98,
            '™' => 0x99,
            'š' => 0x9A,
            '›' => 0x9B,
            'œ' => 0x9C,
            'ž' => 0x9E,
            'Ÿ' => 0x9F,
            _ => b'?',
        })
        .collect()
}

/// Line spacing of the text layer. Long texts are squeezed so the last
/// baseline stays above the bottom margin.
fn text_leading(text: &str, layout: &Layout) -> f32 {
    let lines = text.split('\n').count().max(1) as f32;
    let available = (layout.page_h - 2.0 * layout.margin).max(0.0);
    layout.font_size.min(available / lines)
}

/// Page content: the placed image, then the text layer.
fn page_operations(placement: &ImagePlacement, text: &str, layout: &Layout) -> Vec<Operation> {
    let mut ops = vec![
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![
                real(placement.width),
                real(0.0),
                real(0.0),
                real(placement.height),
                real(placement.x),
                real(placement.y),
            ],
        ),
        Operation::new("Do", vec![name(IMAGE_NAME)]),
        Operation::new("Q", vec![]),
    ];

    if text.is_empty() {
        return ops;
    }

    ops.extend([
        Operation::new("q", vec![]),
        Operation::new("gs", vec![name(GSTATE_NAME)]),
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![name(FONT_NAME), real(layout.font_size)]),
        Operation::new("TL", vec![real(text_leading(text, layout))]),
        Operation::new("rg", vec![real(0.0), real(0.0), real(0.0)]),
        Operation::new(
            "Td",
            vec![real(layout.margin), real(layout.page_h - layout.margin)],
        ),
    ]);
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            ops.push(Operation::new("T*", vec![]));
        }
        ops.push(Operation::new(
            "Tj",
            vec![Object::String(encode_win_ansi(line), StringFormat::Literal)],
        ));
    }
    ops.push(Operation::new("ET", vec![]));
    ops.push(Operation::new("Q", vec![]));
    ops
}

/// Serialise a one-page PDF.
fn build_pdf(
    image: Stream,
    img_w: u32,
    img_h: u32,
    text: &str,
    title: &str,
    layout: Layout,
) -> Result<(Vec<u8>, ImagePlacement), BuildError> {
    let placement = fit_centered(layout.page_w, layout.page_h, img_w, img_h);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let image_id = doc.add_object(image);
    let font_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::from("Font")),
        ("Subtype", Object::from("Type1")),
        ("BaseFont", Object::from("Helvetica")),
        ("Encoding", Object::from("WinAnsiEncoding")),
    ]));
    let gstate_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::from("ExtGState")),
        ("ca", real(layout.opacity)),
        ("CA", real(layout.opacity)),
    ]));

    let resources = Dictionary::from_iter(vec![
        (
            "XObject",
            Object::Dictionary(Dictionary::from_iter(vec![(IMAGE_NAME, Object::Reference(image_id))])),
        ),
        (
            "Font",
            Object::Dictionary(Dictionary::from_iter(vec![(FONT_NAME, Object::Reference(font_id))])),
        ),
        (
            "ExtGState",
            Object::Dictionary(Dictionary::from_iter(vec![(
                GSTATE_NAME,
                Object::Reference(gstate_id),
            )])),
        ),
    ]);

    let content = Content {
        operations: page_operations(&placement, text, &layout),
    };
    let content_id = doc.add_object(Stream::new(Dictionary::new(), content.encode()?));

    let page_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::from("Page")),
        ("Parent", Object::Reference(pages_id)),
        (
            "MediaBox",
            Object::Array(vec![real(0.0), real(0.0), real(layout.page_w), real(layout.page_h)]),
        ),
        ("Contents", Object::Reference(content_id)),
        ("Resources", Object::Dictionary(resources)),
    ]));

    doc.objects.insert(
        pages_id,
        Object::Dictionary(Dictionary::from_iter(vec![
            ("Type", Object::from("Pages")),
            ("Kids", Object::Array(vec![Object::Reference(page_id)])),
            ("Count", Object::Integer(1)),
        ])),
    );

    let catalog_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::from("Catalog")),
        ("Pages", Object::Reference(pages_id)),
    ]));
    let info_id = doc.add_object(Dictionary::from_iter(vec![
        ("Title", Object::String(encode_win_ansi(title), StringFormat::Literal)),
        ("Producer", Object::string_literal("scan2pdf")),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));
    doc.trailer.set("Info", Object::Reference(info_id));

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok((bytes, placement))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn layout() -> Layout {
        Layout::from_config(&PipelineConfig::default())
    }

    fn num(o: &Object) -> f32 {
        match o {
            Object::Real(v) => *v,
            Object::Integer(i) => *i as f32,
            other => panic!("not a number: {other:?}"),
        }
    }

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let mut buf = std::io::Cursor::new(Vec::new());
        RgbImage::from_pixel(w, h, Rgb([10, 20, 30]))
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn page_content(bytes: &[u8]) -> (Document, Content) {
        let doc = Document::load_mem(bytes).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 1);
        let page_id = *pages.values().next().unwrap();
        let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
        (doc, content)
    }

    #[test]
    fn fit_centered_portrait_image_on_a4() {
        let p = fit_centered(595.28, 841.89, 1000, 1333);
        let expected = (595.28f32 / 1000.0).min(841.89 / 1333.0);
        assert!((p.scale - expected).abs() < 1e-6);
        assert!((p.x - (595.28 - 1000.0 * p.scale) / 2.0).abs() < 1e-3);
        assert!((p.y - (841.89 - 1333.0 * p.scale) / 2.0).abs() < 1e-3);
        assert!(p.width <= 595.28 + 1e-3 && p.height <= 841.89 + 1e-3);
    }

    #[test]
    fn fit_centered_landscape_touches_sides() {
        let p = fit_centered(600.0, 800.0, 1000, 500);
        assert!((p.scale - 0.6).abs() < 1e-6);
        assert!((p.x - 0.0).abs() < 1e-4);
        assert!((p.width - 600.0).abs() < 1e-3);
        assert!((p.y - 250.0).abs() < 1e-3);
    }

    #[test]
    fn long_text_stays_on_the_page() {
        let layout = layout();
        let text = vec!["line"; 2000].join("\n");
        let image = image_xobject(&png_bytes(10, 10), 10, 10, EmbedFormat::Png).unwrap();
        let (bytes, _) = build_pdf(image, 10, 10, &text, "doc", layout).unwrap();
        let (_, content) = page_content(&bytes);

        let tl = content.operations.iter().find(|op| op.operator == "TL").unwrap();
        let leading = num(&tl.operands[0]);
        let td = content.operations.iter().find(|op| op.operator == "Td").unwrap();
        let top = num(&td.operands[1]);
        let last_baseline = top - leading * 1999.0;
        assert!(leading > 0.0);
        assert!(last_baseline >= layout.margin - 1e-2, "last line at {last_baseline}");
        assert_eq!(
            content.operations.iter().filter(|op| op.operator == "Tj").count(),
            2000
        );
    }

    #[test]
    fn short_text_keeps_font_size_leading() {
        let layout = layout();
        assert_eq!(text_leading("a\nb\nc", &layout), layout.font_size);
    }

    #[test]
    fn win_ansi_encoding() {
        assert_eq!(encode_win_ansi("Invoice #42"), b"Invoice #42".to_vec());
        assert_eq!(encode_win_ansi("café €5"), vec![b'c', b'a', b'f', 0xE9, b' ', 0x80, b'5']);
        assert_eq!(encode_win_ansi("日本\r"), b"??".to_vec());
    }

    #[test]
    fn pdf_places_image_and_hides_text() {
        let image = image_xobject(&png_bytes(100, 50), 100, 50, EmbedFormat::Png).unwrap();
        let (bytes, placement) =
            build_pdf(image, 100, 50, "Invoice #42\nTotal", "doc", layout()).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let (doc, content) = page_content(&bytes);
        let cm = content.operations.iter().find(|op| op.operator == "cm").unwrap();
        let v: Vec<f32> = cm.operands.iter().map(num).collect();
        assert!((v[0] - placement.width).abs() < 1e-3);
        assert!((v[3] - placement.height).abs() < 1e-3);
        assert!((v[4] - placement.x).abs() < 1e-3);
        assert!((v[5] - placement.y).abs() < 1e-3);

        let shown: Vec<Vec<u8>> = content
            .operations
            .iter()
            .filter(|op| op.operator == "Tj")
            .map(|op| match &op.operands[0] {
                Object::String(s, _) => s.clone(),
                other => panic!("unexpected operand {other:?}"),
            })
            .collect();
        assert_eq!(shown, vec![b"Invoice #42".to_vec(), b"Total".to_vec()]);

        let tf = content.operations.iter().find(|op| op.operator == "Tf").unwrap();
        assert_eq!(num(&tf.operands[1]), 1.0);

        let page_id = *doc.get_pages().values().next().unwrap();
        let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        let gs_ref = resources
            .get(b"ExtGState")
            .unwrap()
            .as_dict()
            .unwrap()
            .get(b"GS0")
            .unwrap()
            .as_reference()
            .unwrap();
        let gs = doc.get_object(gs_ref).unwrap().as_dict().unwrap();
        assert_eq!(num(gs.get(b"ca").unwrap()), 0.0);
    }

    #[test]
    fn empty_text_has_no_text_object() {
        let image = image_xobject(&png_bytes(10, 10), 10, 10, EmbedFormat::Png).unwrap();
        let (bytes, _) = build_pdf(image, 10, 10, "", "doc", layout()).unwrap();
        let (_, content) = page_content(&bytes);
        assert!(!content.operations.iter().any(|op| op.operator == "BT"));
        assert!(content.operations.iter().any(|op| op.operator == "Do"));
    }

    #[test]
    fn jpeg_is_embedded_verbatim() {
        let jpeg = b"\xFF\xD8\xFF\xE0fake-jpeg-body\xFF\xD9".to_vec();
        let stream = image_xobject(&jpeg, 4, 3, EmbedFormat::Jpeg).unwrap();
        assert_eq!(stream.content, jpeg);
        assert_eq!(
            stream.dict.get(b"Filter").unwrap().as_name().unwrap(),
            b"DCTDecode"
        );
    }

    #[test]
    fn output_is_deterministic() {
        let png = png_bytes(40, 80);
        let a = build_pdf(image_xobject(&png, 40, 80, EmbedFormat::Png).unwrap(), 40, 80, "x", "d", layout())
            .unwrap()
            .0;
        let b = build_pdf(image_xobject(&png, 40, 80, EmbedFormat::Png).unwrap(), 40, 80, "x", "d", layout())
            .unwrap()
            .0;
        assert_eq!(a, b);
    }

    #[test]
    fn zero_sized_image_is_rejected() {
        assert!(matches!(
            image_xobject(&[], 0, 10, EmbedFormat::Jpeg),
            Err(BuildError::EmptyImage)
        ));
    }
}
