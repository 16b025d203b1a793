use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Page size used for PDF output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PdfPageFormat {
    #[default]
    A4,
    Letter,
}

impl PdfPageFormat {
    /// Page size in PDF points (width, height)
    pub fn dimensions(&self) -> (f32, f32) {
        match self {
            PdfPageFormat::A4 => (595.28, 841.89),
            PdfPageFormat::Letter => (612.0, 792.0),
        }
    }
}

impl FromStr for PdfPageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A4" => Ok(PdfPageFormat::A4),
            "LETTER" => Ok(PdfPageFormat::Letter),
            _ => Err(format!("Unknown PDF format: {}", s)),
        }
    }
}

/// The acting user, resolved once per request and passed down read-only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub user_id: i64,
    /// Team the user is currently logged into
    pub team_id: i64,
    pub fullname: String,
    pub is_sysadmin: bool,
    pub pdf_format: PdfPageFormat,
}
