//! Page layout on top of lopdf
//!
//! Text flows top to bottom from a cursor; when a line or image doesn't fit
//! above the bottom margin a new page is started. Every page, whether started
//! explicitly or by overflow, goes through [PdfCanvas::add_page], which is
//! where the header image gets drawn.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use hazard_report_shared::error::HazardError;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

pub const A4_WIDTH: f32 = 595.28;
pub const A4_HEIGHT: f32 = 841.89;
pub const MARGIN: f32 = 50.0;

const LINE_SPACING: f32 = 1.2;
const ASCENT: f32 = 0.8;
const HEADER_GAP: f32 = 12.0;
const MAX_HEADER_HEIGHT: f32 = A4_HEIGHT / 4.0;
const HEADER_XOBJECT: &str = "Hdr";

#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[rustfmt::skip]
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource_name(&self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }

    fn base_font(&self) -> &'static str {
        match self {
            Font::Regular => "Helvetica",
            Font::Bold => "Helvetica-Bold",
        }
    }

    /// Advance width in thousandths of the font size.
    fn char_width(&self, c: char) -> u16 {
        let table = match self {
            Font::Regular => &HELVETICA_WIDTHS,
            Font::Bold => &HELVETICA_BOLD_WIDTHS,
        };
        match c {
            ' '..='~' => table[c as usize - 0x20],
            _ => 556,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color(pub f32, pub f32, pub f32);

pub const BLACK: Color = Color(0.0, 0.0, 0.0);
pub const GRAY: Color = Color(0.5, 0.5, 0.5);
pub const LINK_BLUE: Color = Color(0.0, 0.0, 1.0);

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Align {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone)]
pub struct TextStyle {
    pub font: Font,
    pub size: f32,
    pub color: Color,
    pub align: Align,
    pub underline: bool,
    pub link: Option<String>,
}

impl TextStyle {
    pub fn new(font: Font, size: f32) -> Self {
        Self {
            font,
            size,
            color: BLACK,
            align: Align::Left,
            underline: false,
            link: None,
        }
    }

    pub fn color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn align(mut self, align: Align) -> Self {
        self.align = align;
        self
    }

    pub fn underline(mut self) -> Self {
        self.underline = true;
        self
    }

    pub fn link(mut self, url: impl Into<String>) -> Self {
        self.link = Some(url.into());
        self
    }
}

pub fn text_width(text: &str, font: Font, size: f32) -> f32 {
    let units: u32 = text.chars().map(|c| font.char_width(c) as u32).sum();
    units as f32 * size / 1000.0
}

/// Greedy word wrap; words longer than a line are split by character.
pub fn wrap_text(text: &str, font: Font, size: f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    if text.is_empty() {
        return lines;
    }
    for paragraph in text.split('\n') {
        let paragraph = paragraph.trim_end_matches('\r');
        if paragraph.trim().is_empty() {
            lines.push(String::new());
            continue;
        }
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = match current.is_empty() {
                true => word.to_string(),
                false => format!("{} {}", current, word),
            };
            if text_width(&candidate, font, size) <= max_width {
                current = candidate;
                continue;
            }
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            // the word alone may still be too wide
            for c in word.chars() {
                current.push(c);
                if text_width(&current, font, size) > max_width && current.chars().count() > 1 {
                    current.pop();
                    lines.push(std::mem::take(&mut current));
                    current.push(c);
                }
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }
    lines
}

/// Map text onto WinAnsiEncoding, the encoding the standard fonts are declared with.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            ' '..='~' => c as u8,
            '\u{a0}'..='\u{ff}' => c as u8,
            '\t' => b' ',
            '€' => 0x80,
            '…' => 0x85,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            _ => b'?',
        })
        .collect()
}

fn real(value: f32) -> Object {
    Object::Real(value.into())
}

fn pdf_err(err: lopdf::Error) -> HazardError {
    HazardError::Pdf(err.to_string())
}

/// An image decoded to RGB and deflated, ready to become an XObject.
#[derive(Debug, Clone)]
pub struct PdfImage {
    pub width: u32,
    pub height: u32,
    data: Vec<u8>,
}

impl PdfImage {
    pub fn decode(bytes: &[u8]) -> Result<Self, HazardError> {
        let decoded = image::load_from_memory(bytes)
            .map_err(|err| HazardError::Pdf(format!("Failed to decode image: {}", err)))?;
        let rgb = decoded.to_rgb8();
        let (width, height) = rgb.dimensions();
        if width == 0 || height == 0 {
            return Err(HazardError::Pdf("Image has no pixels".to_string()));
        }

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(rgb.as_raw())?;
        let data = encoder.finish()?;
        Ok(Self {
            width,
            height,
            data,
        })
    }

    fn to_stream(&self) -> Stream {
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => self.width as i64,
                "Height" => self.height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8_i64,
                "Filter" => "FlateDecode",
            },
            self.data.clone(),
        )
    }

    /// Scale to fit inside `max_width` x `max_height`, keeping the aspect ratio.
    pub fn fit(&self, max_width: f32, max_height: f32) -> (f32, f32) {
        let (w, h) = (self.width as f32, self.height as f32);
        let scale = (max_width / w).min(max_height / h);
        (w * scale, h * scale)
    }
}

#[derive(Default)]
struct PageBuilder {
    operations: Vec<Operation>,
    xobjects: Dictionary,
    annotations: Vec<Object>,
}

struct Header {
    id: ObjectId,
    width: f32,
    height: f32,
}

pub struct PdfCanvas {
    doc: Document,
    pages_id: ObjectId,
    fonts: Dictionary,
    page_ids: Vec<ObjectId>,
    page: Option<PageBuilder>,
    header: Option<Header>,
    cursor: f32,
    font_size: f32,
    image_count: usize,
}

impl PdfCanvas {
    /// Starts the document and its first page.
    pub fn new(header: Option<&PdfImage>) -> Result<Self, HazardError> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut fonts = Dictionary::new();
        for font in [Font::Regular, Font::Bold] {
            let font_id = doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => font.base_font(),
                "Encoding" => "WinAnsiEncoding",
            });
            fonts.set(font.resource_name(), font_id);
        }

        let header = header.map(|img| {
            let (width, height) = img.fit(A4_WIDTH, MAX_HEADER_HEIGHT);
            Header {
                id: doc.add_object(img.to_stream()),
                width,
                height,
            }
        });

        let mut canvas = Self {
            doc,
            pages_id,
            fonts,
            page_ids: Vec::new(),
            page: None,
            header,
            cursor: MARGIN,
            font_size: 12.0,
            image_count: 0,
        };
        canvas.add_page()?;
        Ok(canvas)
    }

    /// One-based number of the page being drawn on.
    pub fn page_number(&self) -> usize {
        self.page_ids.len() + usize::from(self.page.is_some())
    }

    pub fn cursor(&self) -> f32 {
        self.cursor
    }

    fn content_width(&self) -> f32 {
        A4_WIDTH - 2.0 * MARGIN
    }

    fn bottom_limit(&self) -> f32 {
        A4_HEIGHT - MARGIN
    }

    fn page_mut(&mut self) -> &mut PageBuilder {
        self.page.get_or_insert_with(PageBuilder::default)
    }

    /// Finishes the current page and starts a new one, header included.
    pub fn add_page(&mut self) -> Result<(), HazardError> {
        self.flush_page()?;
        self.page = Some(PageBuilder::default());
        self.cursor = MARGIN;
        self.draw_header();
        Ok(())
    }

    fn draw_header(&mut self) {
        let Some((id, width, height)) = self.header.as_ref().map(|h| (h.id, h.width, h.height))
        else {
            return;
        };
        let x = (A4_WIDTH - width) / 2.0;
        let y = A4_HEIGHT - height;
        let page = self.page_mut();
        page.xobjects.set(HEADER_XOBJECT, id);
        page.operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![real(width), real(0.0), real(0.0), real(height), real(x), real(y)],
            ),
            Operation::new("Do", vec![Object::Name(HEADER_XOBJECT.as_bytes().to_vec())]),
            Operation::new("Q", vec![]),
        ]);
        self.cursor = self.cursor.max(height + HEADER_GAP);
    }

    fn flush_page(&mut self) -> Result<(), HazardError> {
        let Some(page) = self.page.take() else {
            return Ok(());
        };
        let content = Content {
            operations: page.operations,
        };
        let content_id = self
            .doc
            .add_object(Stream::new(dictionary! {}, content.encode().map_err(pdf_err)?));
        let resources = dictionary! {
            "Font" => self.fonts.clone(),
            "XObject" => page.xobjects,
        };
        let mut page_dict = dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "Contents" => content_id,
            "Resources" => resources,
        };
        if !page.annotations.is_empty() {
            page_dict.set("Annots", Object::Array(page.annotations));
        }
        let page_id = self.doc.add_object(page_dict);
        self.page_ids.push(page_id);
        Ok(())
    }

    fn show_text(&mut self, line: &str, style: &TextStyle, x: f32, baseline: f32) {
        let Color(r, g, b) = style.color;
        let font = style.font.resource_name();
        self.page_mut().operations.extend([
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![Object::Name(font.as_bytes().to_vec()), real(style.size)],
            ),
            Operation::new("rg", vec![real(r), real(g), real(b)]),
            Operation::new("Td", vec![real(x), real(baseline)]),
            Operation::new(
                "Tj",
                vec![Object::String(encode_win_ansi(line), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
        ]);
    }

    fn draw_rule(&mut self, color: Color, x1: f32, x2: f32, y: f32) {
        let Color(r, g, b) = color;
        self.page_mut().operations.extend([
            Operation::new("q", vec![]),
            Operation::new("RG", vec![real(r), real(g), real(b)]),
            Operation::new("w", vec![real(0.5)]),
            Operation::new("m", vec![real(x1), real(y)]),
            Operation::new("l", vec![real(x2), real(y)]),
            Operation::new("S", vec![]),
            Operation::new("Q", vec![]),
        ]);
    }

    fn add_link(&mut self, url: &str, rect: [f32; 4]) {
        let annotation = dictionary! {
            "Type" => "Annot",
            "Subtype" => "Link",
            "Rect" => rect.iter().map(|v| real(*v)).collect::<Vec<Object>>(),
            "Border" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(0)],
            "A" => dictionary! {
                "Type" => "Action",
                "S" => "URI",
                "URI" => Object::string_literal(url),
            },
        };
        self.page_mut()
            .annotations
            .push(Object::Dictionary(annotation));
    }

    /// Flows `text` from the cursor, wrapping at the margins and breaking
    /// onto new pages as needed.
    pub fn text(&mut self, text: &str, style: &TextStyle) -> Result<(), HazardError> {
        let width = self.content_width();
        let line_height = style.size * LINE_SPACING;
        self.font_size = style.size;

        for line in wrap_text(text, style.font, style.size, width) {
            if self.cursor + line_height > self.bottom_limit() {
                self.add_page()?;
            }
            let line_width = text_width(&line, style.font, style.size);
            let x = match style.align {
                Align::Left => MARGIN,
                Align::Center => MARGIN + (width - line_width) / 2.0,
                Align::Right => MARGIN + width - line_width,
            };
            let baseline = A4_HEIGHT - self.cursor - style.size * ASCENT;
            self.show_text(&line, style, x, baseline);
            if style.underline && line_width > 0.0 {
                self.draw_rule(style.color, x, x + line_width, baseline - 1.5);
            }
            if let Some(url) = style.link.as_deref() {
                self.add_link(
                    url,
                    [
                        x,
                        baseline - style.size * 0.25,
                        x + line_width,
                        baseline + style.size * ASCENT,
                    ],
                );
            }
            self.cursor += line_height;
        }
        Ok(())
    }

    /// Skip `lines` blank lines at the last used font size.
    pub fn move_down(&mut self, lines: f32) {
        self.cursor += lines * self.font_size * LINE_SPACING;
    }

    /// Draws the image centred, scaled into `max_width` x `max_height`.
    pub fn image(
        &mut self,
        img: &PdfImage,
        max_width: f32,
        max_height: f32,
    ) -> Result<(), HazardError> {
        let (width, height) = img.fit(max_width.min(self.content_width()), max_height);
        if self.cursor + height > self.bottom_limit() {
            self.add_page()?;
        }
        let id = self.doc.add_object(img.to_stream());
        self.image_count += 1;
        let name = format!("Im{}", self.image_count);
        let x = MARGIN + (self.content_width() - width) / 2.0;
        let y = A4_HEIGHT - self.cursor - height;

        let page = self.page_mut();
        page.xobjects.set(name.as_str(), id);
        page.operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![real(width), real(0.0), real(0.0), real(height), real(x), real(y)],
            ),
            Operation::new("Do", vec![Object::Name(name.into_bytes())]),
            Operation::new("Q", vec![]),
        ]);
        self.cursor += height;
        Ok(())
    }

    /// A single line pinned `offset` points above the bottom edge, left and
    /// right aligned between the margins. Never breaks the page.
    pub fn footer(&mut self, left: &str, right: &str, offset: f32, style: &TextStyle) {
        let baseline = offset - style.size * ASCENT;
        self.show_text(left, style, MARGIN, baseline);
        let right_x = A4_WIDTH - MARGIN - text_width(right, style.font, style.size);
        self.show_text(right, style, right_x, baseline);
    }

    /// Closes the last page and wires up the page tree.
    pub fn finish(mut self) -> Result<Document, HazardError> {
        self.flush_page()?;
        let kids: Vec<Object> = self.page_ids.iter().map(|id| Object::Reference(*id)).collect();
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => self.page_ids.len() as i64,
            "MediaBox" => vec![real(0.0), real(0.0), real(A4_WIDTH), real(A4_HEIGHT)],
        };
        self.doc
            .objects
            .insert(self.pages_id, Object::Dictionary(pages));

        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        let info_id = self.doc.add_object(dictionary! {
            "Title" => Object::string_literal("Hazard Inspection Reports"),
            "Producer" => Object::string_literal(concat!("hazard-report ", env!("CARGO_PKG_VERSION"))),
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.trailer.set("Info", info_id);
        Ok(self.doc)
    }
}
