//! PDF rendering
//!
//! Makers describe documents as [`PdfDocument`]s made of sections and blocks; a
//! [`PdfRenderer`] turns them into bytes. [`PdfWriter`] is the built-in renderer: it lays
//! out Helvetica text with word wrap, draws QR codes as vector modules and, in archival
//! mode, adds the PDF/A-2b identification (XMP `pdfaid` metadata, sRGB output intent and
//! a document ID). Object graph and serialization go through `lopdf`.

use chrono::{DateTime, Utc};
use labnote_core::models::PdfPageFormat;
use labnote_core::AppError;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream, StringFormat};
use sha2::{Digest, Sha256};

use super::qr::{QrMatrix, QUIET_ZONE};

const MARGIN: f32 = 50.0;
const FOOTER_SIZE: f32 = 8.0;
const TITLE_SIZE: f32 = 18.0;
const HEADING_SIZE: f32 = 13.0;
const TEXT_SIZE: f32 = 10.0;
const LINE_SPACING: f32 = 1.35;

/// Helvetica advance widths for 0x20..=0x7E, in thousandths of an em
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, 556, 556,
    556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, 1015, 667, 667, 722,
    722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, 667, 778, 722, 667, 611, 722,
    667, 944, 667, 667, 611, 278, 278, 278, 469, 556, 333, 556, 556, 500, 556, 556, 278, 556,
    556, 222, 222, 500, 222, 833, 556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500,
    500, 334, 260, 334, 584,
];

/// One unit of page content
#[derive(Debug, Clone)]
pub enum Block {
    Title(String),
    Heading(String),
    /// Paragraphs separated by `\n`, wrapped to the page width
    Text(String),
    /// Bold label followed by a value on the same line
    Field(String, String),
    /// QR code drawn centered, `size` points wide
    Qr(QrMatrix, f32),
    Spacer(f32),
    Rule,
}

/// Blocks that start on a fresh page and flow onto more pages as needed
#[derive(Debug, Clone, Default)]
pub struct PdfSection {
    pub blocks: Vec<Block>,
}

impl PdfSection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, block: Block) -> &mut Self {
        self.blocks.push(block);
        self
    }
}

#[derive(Debug, Clone)]
pub struct PdfDocument {
    pub title: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub sections: Vec<PdfSection>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PdfOptions {
    pub page_format: PdfPageFormat,
    /// Emit PDF/A-2b identification
    pub pdfa: bool,
}

/// Turns a document description into PDF bytes
pub trait PdfRenderer: Send + Sync {
    fn render(&self, document: &PdfDocument, options: &PdfOptions) -> Result<Vec<u8>, AppError>;
}

/// Built-in renderer writing uncompressed PDF with the standard Helvetica fonts
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfWriter;

impl PdfRenderer for PdfWriter {
    fn render(&self, document: &PdfDocument, options: &PdfOptions) -> Result<Vec<u8>, AppError> {
        let (width, height) = options.page_format.dimensions();
        let mut layout = Layout::new(width, height);
        for section in &document.sections {
            layout.new_page();
            for block in &section.blocks {
                layout.block(block);
            }
        }
        if layout.pages.is_empty() {
            layout.new_page();
        }
        let pages = layout.finish();
        assemble(document, options, width, height, pages)
    }
}

/// Width of `text` in points at `size`
pub fn text_width(text: &str, size: f32) -> f32 {
    let units: u32 = text
        .chars()
        .map(|c| match c {
            ' '..='~' => HELVETICA_WIDTHS[c as usize - 0x20] as u32,
            _ => 556,
        })
        .sum();
    units as f32 * size / 1000.0
}

/// Greedy word wrap; words wider than the line are split by character
pub fn wrap(text: &str, size: f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if line.is_empty() {
                word.to_string()
            } else {
                format!("{} {}", line, word)
            };
            if text_width(&candidate, size) <= max_width {
                line = candidate;
                continue;
            }
            if !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            for c in word.chars() {
                line.push(c);
                if text_width(&line, size) > max_width && line.chars().count() > 1 {
                    line.pop();
                    lines.push(std::mem::take(&mut line));
                    line.push(c);
                }
            }
        }
        lines.push(line);
    }
    lines
}

/// Encode to WinAnsi; unmappable characters become `?`
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .filter_map(|c| match c {
            '\t' => Some(b' '),
            ' '..='~' => Some(c as u8),
            '\u{a0}'..='\u{ff}' => Some(c as u32 as u8),
            c if c.is_control() => None,
            _ => Some(b'?'),
        })
        .collect()
}

fn literal(text: &str) -> Object {
    Object::String(win_ansi(text), StringFormat::Literal)
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn render_error(err: lopdf::Error) -> AppError {
    AppError::Render(err.to_string())
}

struct Layout {
    width: f32,
    height: f32,
    pages: Vec<Vec<Operation>>,
    y: f32,
}

impl Layout {
    fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            pages: Vec::new(),
            y: 0.0,
        }
    }

    fn new_page(&mut self) {
        self.pages.push(Vec::new());
        self.y = self.height - MARGIN;
    }

    fn content(&mut self) -> &mut Vec<Operation> {
        if self.pages.is_empty() {
            self.new_page();
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    /// Make room for `needed` points, breaking the page when the bottom margin is hit
    fn reserve(&mut self, needed: f32) {
        if self.pages.is_empty() || self.y - needed < MARGIN + FOOTER_SIZE * 2.0 {
            self.new_page();
        }
    }

    fn text_line(&mut self, x: f32, text: &str, size: f32, bold: bool) {
        let line_height = size * LINE_SPACING;
        self.reserve(line_height);
        self.y -= line_height;
        let font = if bold { "F2" } else { "F1" };
        let y = self.y;
        self.content().extend(show_text(font, size, x, y, text));
    }

    fn block(&mut self, block: &Block) {
        let usable = self.width - 2.0 * MARGIN;
        match block {
            Block::Title(text) => {
                for line in wrap(text, TITLE_SIZE, usable) {
                    self.text_line(MARGIN, &line, TITLE_SIZE, true);
                }
                self.y -= TEXT_SIZE * 0.5;
            }
            Block::Heading(text) => {
                self.y -= HEADING_SIZE * 0.5;
                for line in wrap(text, HEADING_SIZE, usable) {
                    self.text_line(MARGIN, &line, HEADING_SIZE, true);
                }
            }
            Block::Text(text) => {
                for line in wrap(text, TEXT_SIZE, usable) {
                    self.text_line(MARGIN, &line, TEXT_SIZE, false);
                }
            }
            Block::Field(label, value) => {
                let label = format!("{}: ", label);
                let indent = text_width(&label, TEXT_SIZE);
                let lines = wrap(value, TEXT_SIZE, usable - indent);
                for (n, line) in lines.iter().enumerate() {
                    if n == 0 {
                        self.text_line(MARGIN, &label, TEXT_SIZE, true);
                        self.y += TEXT_SIZE * LINE_SPACING;
                    }
                    self.text_line(MARGIN + indent, line, TEXT_SIZE, false);
                }
            }
            Block::Qr(matrix, size) => {
                let size = size.min(usable);
                self.reserve(size);
                let modules = matrix.width_with_quiet_zone() as f32;
                let module = size / modules;
                let left = MARGIN + (usable - size) / 2.0;
                let top = self.y;
                let mut ops = vec![Operation::new("g", vec![Object::Integer(0)])];
                for my in 0..matrix.width() {
                    for mx in 0..matrix.width() {
                        if matrix.is_dark(mx, my) {
                            let x = left + (mx + QUIET_ZONE) as f32 * module;
                            let y = top - (my + QUIET_ZONE + 1) as f32 * module;
                            ops.push(Operation::new(
                                "re",
                                vec![x.into(), y.into(), module.into(), module.into()],
                            ));
                        }
                    }
                }
                ops.push(Operation::new("f", Vec::new()));
                self.content().extend(ops);
                self.y -= size;
            }
            Block::Spacer(points) => {
                self.y -= points;
            }
            Block::Rule => {
                self.reserve(TEXT_SIZE);
                self.y -= TEXT_SIZE * 0.5;
                let (y, right) = (self.y, self.width - MARGIN);
                self.content().extend([
                    Operation::new("w", vec![Object::Real(0.5)]),
                    Operation::new("G", vec![Object::Real(0.6)]),
                    Operation::new("m", vec![MARGIN.into(), y.into()]),
                    Operation::new("l", vec![right.into(), y.into()]),
                    Operation::new("S", Vec::new()),
                    Operation::new("G", vec![Object::Integer(0)]),
                ]);
                self.y -= TEXT_SIZE * 0.5;
            }
        }
    }

    /// Add page numbers and return the content of each page
    fn finish(mut self) -> Vec<Vec<Operation>> {
        let total = self.pages.len();
        for (n, page) in self.pages.iter_mut().enumerate() {
            let label = format!("{} / {}", n + 1, total);
            let x = self.width - MARGIN - text_width(&label, FOOTER_SIZE);
            page.extend(show_text("F1", FOOTER_SIZE, x, MARGIN / 2.0, &label));
        }
        self.pages
    }
}

fn show_text(font: &str, size: f32, x: f32, y: f32, text: &str) -> Vec<Operation> {
    vec![
        Operation::new("BT", Vec::new()),
        Operation::new("Tf", vec![Object::Name(font.as_bytes().to_vec()), size.into()]),
        Operation::new("Td", vec![x.into(), y.into()]),
        Operation::new("Tj", vec![literal(text)]),
        Operation::new("ET", Vec::new()),
    ]
}

fn xmp_packet(document: &PdfDocument) -> String {
    let date = document.created_at.to_rfc3339();
    format!(
        r#"<?xpacket begin="{bom}" id="W5M0MpCehiHzreSzNTczkc9d"?>
<x:xmpmeta xmlns:x="adobe:ns:meta/">
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
<rdf:Description rdf:about="" xmlns:pdfaid="http://www.aiim.org/pdfa/ns/id/">
<pdfaid:part>2</pdfaid:part>
<pdfaid:conformance>B</pdfaid:conformance>
</rdf:Description>
<rdf:Description rdf:about="" xmlns:dc="http://purl.org/dc/elements/1.1/">
<dc:format>application/pdf</dc:format>
<dc:title><rdf:Alt><rdf:li xml:lang="x-default">{title}</rdf:li></rdf:Alt></dc:title>
<dc:creator><rdf:Seq><rdf:li>{author}</rdf:li></rdf:Seq></dc:creator>
</rdf:Description>
<rdf:Description rdf:about="" xmlns:xmp="http://ns.adobe.com/xap/1.0/">
<xmp:CreateDate>{date}</xmp:CreateDate>
<xmp:ModifyDate>{date}</xmp:ModifyDate>
<xmp:CreatorTool>labnote</xmp:CreatorTool>
</rdf:Description>
<rdf:Description rdf:about="" xmlns:pdf="http://ns.adobe.com/pdf/1.3/">
<pdf:Producer>labnote</pdf:Producer>
</rdf:Description>
</rdf:RDF>
</x:xmpmeta>
<?xpacket end="w"?>"#,
        bom = '\u{feff}',
        title = xml_escape(&document.title),
        author = xml_escape(&document.author),
        date = date,
    )
}

fn document_id(document: &PdfDocument, page_count: usize) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(document.title.as_bytes());
    hasher.update(document.author.as_bytes());
    hasher.update(document.created_at.to_rfc3339().as_bytes());
    hasher.update(page_count.to_le_bytes());
    hasher.finalize()[..16].to_vec()
}

fn assemble(
    document: &PdfDocument,
    options: &PdfOptions,
    width: f32,
    height: f32,
    pages: Vec<Vec<Operation>>,
) -> Result<Vec<u8>, AppError> {
    let mut doc = Document::with_version(if options.pdfa { "1.7" } else { "1.4" });
    let pages_id = doc.new_object_id();
    let regular = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => regular, "F2" => bold },
    });

    let page_count = pages.len();
    let mut kids: Vec<Object> = Vec::with_capacity(page_count);
    for operations in pages {
        let content = Content { operations }.encode().map_err(render_error)?;
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content));
        let media_box = vec![Object::Integer(0), Object::Integer(0), width.into(), height.into()];
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => media_box,
            "Resources" => resources,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count as i64,
        }),
    );

    let mut catalog = dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    };
    if options.pdfa {
        let metadata = Stream::new(
            dictionary! { "Type" => "Metadata", "Subtype" => "XML" },
            xmp_packet(document).into_bytes(),
        )
        .with_compression(false);
        let metadata_id = doc.add_object(metadata);
        let intent_id = doc.add_object(dictionary! {
            "Type" => "OutputIntent",
            "S" => "GTS_PDFA1",
            "OutputConditionIdentifier" => Object::string_literal("sRGB IEC61966-2.1"),
            "RegistryName" => Object::string_literal("http://www.color.org"),
            "Info" => Object::string_literal("sRGB IEC61966-2.1"),
        });
        catalog.set("Metadata", metadata_id);
        catalog.set("OutputIntents", vec![Object::Reference(intent_id)]);
    }
    let catalog_id = doc.add_object(catalog);

    let info_id = doc.add_object(dictionary! {
        "Title" => literal(&document.title),
        "Author" => literal(&document.author),
        "Producer" => Object::string_literal("labnote"),
        "Creator" => Object::string_literal("labnote"),
        "CreationDate" => Object::string_literal(format!(
            "D:{}+00'00'",
            document.created_at.format("%Y%m%d%H%M%S")
        )),
    });

    let id = document_id(document, page_count);
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);
    doc.trailer.set(
        "ID",
        vec![
            Object::String(id.clone(), StringFormat::Hexadecimal),
            Object::String(id, StringFormat::Hexadecimal),
        ],
    );

    let mut out = Vec::new();
    doc.save_to(&mut out).map_err(|e| render_error(e.into()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::ObjectId;

    fn document(sections: Vec<PdfSection>) -> PdfDocument {
        PdfDocument {
            title: "Buffer (pH 7.4) prep".to_string(),
            author: "Ada Lovelace".to_string(),
            created_at: Utc::now(),
            sections,
        }
    }

    fn contains(haystack: &[u8], needle: &str) -> bool {
        haystack
            .windows(needle.len())
            .any(|window| window == needle.as_bytes())
    }

    fn page_ids(doc: &Document) -> Vec<ObjectId> {
        doc.get_pages().into_values().collect()
    }

    fn operations(doc: &Document, page: ObjectId) -> Vec<Operation> {
        Content::decode(&doc.get_page_content(page).unwrap())
            .unwrap()
            .operations
    }

    fn shown_text(doc: &Document, page: ObjectId) -> Vec<Vec<u8>> {
        operations(doc, page)
            .into_iter()
            .filter(|op| op.operator == "Tj")
            .map(|op| op.operands[0].as_str().unwrap().to_vec())
            .collect()
    }

    fn trailer_dictionary<'a>(doc: &'a Document, key: &[u8]) -> &'a Dictionary {
        let id = doc.trailer.get(key).and_then(Object::as_reference).unwrap();
        doc.get_dictionary(id).unwrap()
    }

    #[test]
    fn test_plain_pdf_structure() {
        let mut section = PdfSection::new();
        section
            .push(Block::Title("Buffer (pH 7.4) prep".to_string()))
            .push(Block::Field("Date".to_string(), "2024-01-01".to_string()))
            .push(Block::Text("Mix well.".to_string()));
        let bytes = PdfWriter
            .render(&document(vec![section]), &PdfOptions::default())
            .unwrap();

        assert!(bytes.starts_with(b"%PDF-1.4"));
        assert!(!contains(&bytes, "pdfaid:part"));

        let doc = Document::load_mem(&bytes).unwrap();
        let pages = page_ids(&doc);
        assert_eq!(pages.len(), 1);
        let texts = shown_text(&doc, pages[0]);
        assert_eq!(texts[0], b"Buffer (pH 7.4) prep".to_vec());
        assert!(texts.contains(&b"Date: ".to_vec()));
        assert_eq!(texts.last().unwrap(), &b"1 / 1".to_vec());

        let info = trailer_dictionary(&doc, b"Info");
        assert_eq!(
            info.get(b"Title").and_then(Object::as_str).unwrap(),
            b"Buffer (pH 7.4) prep"
        );
        assert!(!trailer_dictionary(&doc, b"Root").has(b"OutputIntents"));
    }

    #[test]
    fn test_pdfa_markers() {
        let bytes = PdfWriter
            .render(
                &document(vec![PdfSection::new()]),
                &PdfOptions {
                    page_format: PdfPageFormat::Letter,
                    pdfa: true,
                },
            )
            .unwrap();

        assert!(bytes.starts_with(b"%PDF-1.7"));
        assert!(contains(&bytes, "<pdfaid:part>2</pdfaid:part>"));
        assert!(contains(&bytes, "<pdfaid:conformance>B</pdfaid:conformance>"));

        let doc = Document::load_mem(&bytes).unwrap();
        let catalog = trailer_dictionary(&doc, b"Root");
        let intents = catalog.get(b"OutputIntents").and_then(Object::as_array).unwrap();
        let intent = doc
            .get_dictionary(intents[0].as_reference().unwrap())
            .unwrap();
        assert_eq!(intent.get(b"S").and_then(Object::as_name).unwrap(), b"GTS_PDFA1");
        assert!(catalog.has(b"Metadata"));
        let id = doc.trailer.get(b"ID").and_then(Object::as_array).unwrap();
        assert_eq!(id.len(), 2);
        assert_eq!(id[0].as_str().unwrap().len(), 16);

        let page = doc.get_dictionary(page_ids(&doc)[0]).unwrap();
        let media_box: Vec<f32> = page
            .get(b"MediaBox")
            .and_then(Object::as_array)
            .unwrap()
            .iter()
            .map(|value| value.as_float().unwrap())
            .collect();
        assert_eq!(media_box, vec![0.0, 0.0, 612.0, 792.0]);
    }

    #[test]
    fn test_sections_start_new_pages_and_overflow() {
        let long_text = "lorem ipsum dolor sit amet ".repeat(800);
        let mut first = PdfSection::new();
        first.push(Block::Text(long_text));
        let mut second = PdfSection::new();
        second.push(Block::Title("Second".to_string()));

        let bytes = PdfWriter
            .render(&document(vec![first, second]), &PdfOptions::default())
            .unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        let pages = page_ids(&doc);
        assert!(pages.len() >= 3);
        let last = shown_text(&doc, *pages.last().unwrap());
        assert_eq!(last[0], b"Second".to_vec());
        assert_eq!(
            last.last().unwrap(),
            &format!("{} / {}", pages.len(), pages.len()).into_bytes()
        );
    }

    #[test]
    fn test_empty_document_has_one_page() {
        let bytes = PdfWriter
            .render(&document(Vec::new()), &PdfOptions::default())
            .unwrap();
        assert!(contains(&bytes, "/Count 1"));
    }

    #[test]
    fn test_qr_block_draws_modules() {
        let matrix = QrMatrix::encode("https://eln.example.org").unwrap();
        let dark = (0..matrix.width())
            .flat_map(|y| (0..matrix.width()).map(move |x| (x, y)))
            .filter(|&(x, y)| matrix.is_dark(x, y))
            .count();
        let mut section = PdfSection::new();
        section.push(Block::Qr(matrix, 200.0));
        let bytes = PdfWriter
            .render(&document(vec![section]), &PdfOptions::default())
            .unwrap();

        let doc = Document::load_mem(&bytes).unwrap();
        let ops = operations(&doc, page_ids(&doc)[0]);
        assert_eq!(ops.iter().filter(|op| op.operator == "re").count(), dark);
        assert_eq!(ops.iter().filter(|op| op.operator == "f").count(), 1);
    }

    #[test]
    fn test_wrap() {
        let lines = wrap("one two three four", TEXT_SIZE, text_width("three four", TEXT_SIZE));
        assert_eq!(lines, vec!["one two", "three four"]);
        let lines = wrap("a\n\nb", TEXT_SIZE, 100.0);
        assert_eq!(lines, vec!["a", "", "b"]);
        let lines = wrap("abcdefghij", TEXT_SIZE, text_width("abcd", TEXT_SIZE));
        assert!(lines.len() >= 3);
    }

    #[test]
    fn test_win_ansi_encoding() {
        assert_eq!(win_ansi("a(b)\\"), b"a(b)\\".to_vec());
        assert_eq!(win_ansi("°"), vec![0xB0]);
        assert_eq!(win_ansi("μ"), b"?".to_vec());
        assert_eq!(win_ansi("a\tb\u{7}"), b"a b".to_vec());
    }
}
