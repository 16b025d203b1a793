use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use super::entity::EntityType;
use crate::constants::{DEFAULT_REPORT_END, DEFAULT_REPORT_START};
use crate::error::AppError;

/// Output kind requested by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum ExportFormat {
    #[serde(rename = "csv")]
    Csv,
    #[serde(rename = "eln")]
    Eln,
    #[serde(rename = "json")]
    Json,
    #[serde(rename = "pdf")]
    Pdf,
    #[serde(rename = "pdfa")]
    PdfA,
    #[serde(rename = "qrpdf")]
    QrPdf,
    #[serde(rename = "qrpng")]
    QrPng,
    #[serde(rename = "schedulerReport")]
    SchedulerReport,
    #[serde(rename = "sysadminReport")]
    SysadminReport,
    #[serde(rename = "zip")]
    Zip,
    #[serde(rename = "zipa")]
    ZipA,
}

/// How a format delivers its bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Whole artifact built in memory, then sent
    Buffered,
    /// Archive written chunk by chunk into the response body
    Streaming,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 11] = [
        ExportFormat::Csv,
        ExportFormat::Eln,
        ExportFormat::Json,
        ExportFormat::Pdf,
        ExportFormat::PdfA,
        ExportFormat::QrPdf,
        ExportFormat::QrPng,
        ExportFormat::SchedulerReport,
        ExportFormat::SysadminReport,
        ExportFormat::Zip,
        ExportFormat::ZipA,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Eln => "eln",
            ExportFormat::Json => "json",
            ExportFormat::Pdf => "pdf",
            ExportFormat::PdfA => "pdfa",
            ExportFormat::QrPdf => "qrpdf",
            ExportFormat::QrPng => "qrpng",
            ExportFormat::SchedulerReport => "schedulerReport",
            ExportFormat::SysadminReport => "sysadminReport",
            ExportFormat::Zip => "zip",
            ExportFormat::ZipA => "zipa",
        }
    }

    pub fn capability(&self) -> Capability {
        match self {
            ExportFormat::Eln | ExportFormat::Zip | ExportFormat::ZipA => Capability::Streaming,
            _ => Capability::Buffered,
        }
    }

    /// Archival formats render PDF/A and include the changelog by default
    pub fn is_archival(&self) -> bool {
        matches!(self, ExportFormat::PdfA | ExportFormat::ZipA)
    }

    /// Lenient parse used for the `format` query parameter.
    ///
    /// Non-alphabetic characters are stripped first; anything that still does not name
    /// a format (including a missing value) falls back to [`ExportFormat::Json`].
    pub fn from_query(raw: Option<&str>) -> Self {
        raw.map(|value| value.chars().filter(char::is_ascii_alphabetic).collect::<String>())
            .and_then(|value| value.parse().ok())
            .unwrap_or(ExportFormat::Json)
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExportFormat::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| format!("Unknown export format: {}", s))
    }
}

/// Which records the client asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntitySelector {
    Ids(Vec<i64>),
    Category(i64),
    Owner(i64),
    None,
}

/// Fully parsed export request, independent of the HTTP layer
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    pub format: ExportFormat,
    pub entity_type: Option<EntityType>,
    pub selector: EntitySelector,
    /// Explicit `changelog` value; `None` means use the format default
    pub changelog: Option<bool>,
    pub qr_size: i64,
    pub with_title: bool,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub include_json: bool,
    /// Request came in on the procurement requests path
    pub procurement_requests: bool,
}

impl ExportRequest {
    /// Request for `format` with every option at its default
    pub fn new(format: ExportFormat) -> Self {
        Self {
            format,
            entity_type: None,
            selector: EntitySelector::None,
            changelog: None,
            qr_size: 0,
            with_title: false,
            start: default_report_start(),
            end: default_report_end(),
            include_json: false,
            procurement_requests: false,
        }
    }

    pub fn with_selection(mut self, entity_type: EntityType, selector: EntitySelector) -> Self {
        self.entity_type = Some(entity_type);
        self.selector = selector;
        self
    }

    /// Changelog defaults to on for archival formats; an explicit value always wins
    pub fn include_changelog(&self) -> bool {
        self.changelog.unwrap_or_else(|| self.format.is_archival())
    }
}

fn default_report_start() -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(DEFAULT_REPORT_START)
        .unwrap_or_else(|_| DateTime::<Utc>::MIN_UTC.fixed_offset())
}

fn default_report_end() -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(DEFAULT_REPORT_END)
        .unwrap_or_else(|_| DateTime::<Utc>::MAX_UTC.fixed_offset())
}

/// Parse an ISO 8601 date with offset; missing values take `default`.
pub fn parse_report_date(
    raw: Option<&str>,
    default: DateTime<FixedOffset>,
    name: &str,
) -> Result<DateTime<FixedOffset>, AppError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(default),
        Some(value) => DateTime::parse_from_rfc3339(value).map_err(|e| {
            AppError::InvalidInput(format!("Invalid {} date '{}': {}", name, value, e))
        }),
    }
}

/// Integer coercion for query values: optional sign followed by the leading digits.
///
/// `"12abc"` gives 12, `"abc"` or `""` gives 0. Overflow saturates to 0 as well.
pub fn coerce_int(raw: &str) -> i64 {
    let trimmed = raw.trim_start();
    let (sign, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().map(|n| sign * n).unwrap_or(0)
}

/// Boolean coercion for query values: `1`, `true`, `on`, `yes` are true.
pub fn coerce_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}

/// Split a space separated id list; every token yields one id.
pub fn parse_id_list(raw: &str) -> Vec<i64> {
    raw.split(' ').map(coerce_int).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_round_trip() {
        for format in ExportFormat::ALL {
            assert_eq!(format.as_str().parse::<ExportFormat>().unwrap(), format);
        }
    }

    #[test]
    fn test_format_fallback_to_json() {
        assert_eq!(ExportFormat::from_query(None), ExportFormat::Json);
        assert_eq!(ExportFormat::from_query(Some("bogus")), ExportFormat::Json);
        assert_eq!(ExportFormat::from_query(Some("")), ExportFormat::Json);
        assert_eq!(ExportFormat::from_query(Some("PDF")), ExportFormat::Json);
    }

    #[test]
    fn test_format_strips_non_alpha() {
        assert_eq!(ExportFormat::from_query(Some("zip-a")), ExportFormat::ZipA);
        assert_eq!(ExportFormat::from_query(Some(" csv ")), ExportFormat::Csv);
        assert_eq!(
            ExportFormat::from_query(Some("schedulerReport")),
            ExportFormat::SchedulerReport
        );
    }

    #[test]
    fn test_capabilities() {
        assert_eq!(ExportFormat::Eln.capability(), Capability::Streaming);
        assert_eq!(ExportFormat::Zip.capability(), Capability::Streaming);
        assert_eq!(ExportFormat::ZipA.capability(), Capability::Streaming);
        assert_eq!(ExportFormat::Pdf.capability(), Capability::Buffered);
        assert_eq!(ExportFormat::QrPng.capability(), Capability::Buffered);
    }

    #[test]
    fn test_changelog_policy() {
        assert!(!ExportRequest::new(ExportFormat::Pdf).include_changelog());
        assert!(ExportRequest::new(ExportFormat::PdfA).include_changelog());
        assert!(ExportRequest::new(ExportFormat::ZipA).include_changelog());

        let mut request = ExportRequest::new(ExportFormat::PdfA);
        request.changelog = Some(false);
        assert!(!request.include_changelog());

        let mut request = ExportRequest::new(ExportFormat::Zip);
        request.changelog = Some(true);
        assert!(request.include_changelog());
    }

    #[test]
    fn test_coerce_int() {
        assert_eq!(coerce_int("42"), 42);
        assert_eq!(coerce_int("12abc"), 12);
        assert_eq!(coerce_int("abc"), 0);
        assert_eq!(coerce_int(""), 0);
        assert_eq!(coerce_int("-3"), -3);
        assert_eq!(coerce_int("99999999999999999999999"), 0);
    }

    #[test]
    fn test_parse_id_list_keeps_order_and_length() {
        assert_eq!(parse_id_list("3 1 2"), vec![3, 1, 2]);
        assert_eq!(parse_id_list("5 x 7"), vec![5, 0, 7]);
        assert_eq!(parse_id_list("1  2"), vec![1, 0, 2]);
    }

    #[test]
    fn test_coerce_bool() {
        assert!(coerce_bool("1"));
        assert!(coerce_bool("true"));
        assert!(coerce_bool("On"));
        assert!(!coerce_bool("0"));
        assert!(!coerce_bool("nope"));
    }

    #[test]
    fn test_report_dates() {
        let request = ExportRequest::new(ExportFormat::SchedulerReport);
        assert_eq!(request.start.to_rfc3339(), "2018-12-23T00:00:00+01:00");
        assert_eq!(request.end.to_rfc3339(), "2119-12-23T00:00:00+01:00");

        let parsed =
            parse_report_date(Some("2024-01-01T08:00:00+02:00"), request.start, "start").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-01-01T08:00:00+02:00");
        assert!(parse_report_date(Some("yesterday"), request.start, "start").is_err());
        assert_eq!(
            parse_report_date(None, request.end, "end").unwrap(),
            request.end
        );
    }
}
