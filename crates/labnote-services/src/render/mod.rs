//! Rendering backends used by the makers

pub mod font;
pub mod html;
pub mod pdf;
pub mod qr;

pub use html::html_to_text;
pub use pdf::{Block, PdfDocument, PdfOptions, PdfRenderer, PdfSection, PdfWriter};
pub use qr::QrMatrix;
