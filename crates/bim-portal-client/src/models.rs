//! BIM Portal resource records and export formats.
//!
//! Records keep the fields the client relies on as typed members and carry
//! everything else in `extra`, so payload changes on the portal side do not
//! break decoding.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// AIA resource kinds served under `/aia/api/v1/public/<kind>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AiaResource {
    Project,
    Loin,
    DomainSpecificModel,
    ContextInfo,
    Template,
}

impl AiaResource {
    pub const ALL: [AiaResource; 5] = [
        Self::Project,
        Self::Loin,
        Self::DomainSpecificModel,
        Self::ContextInfo,
        Self::Template,
    ];

    /// URL segment, e.g. `aiaProject`.
    #[must_use]
    pub fn path_segment(self) -> &'static str {
        match self {
            Self::Project => "aiaProject",
            Self::Loin => "loin",
            Self::DomainSpecificModel => "domainSpecificModel",
            Self::ContextInfo => "contextInfo",
            Self::Template => "aiaTemplate",
        }
    }

    /// Short name used in export filenames.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Loin => "loin",
            Self::DomainSpecificModel => "domain_model",
            Self::ContextInfo => "context_info",
            Self::Template => "template",
        }
    }

    /// Collection path, e.g. `/aia/api/v1/public/loin`.
    #[must_use]
    pub fn collection_path(self) -> String {
        format!("/aia/api/v1/public/{}", self.path_segment())
    }

    /// Whether the portal offers `format` for this kind.
    #[must_use]
    pub fn supports(self, format: ExportFormat) -> bool {
        match self {
            Self::Project | Self::Loin | Self::DomainSpecificModel => true,
            Self::ContextInfo | Self::Template => {
                matches!(format, ExportFormat::Pdf | ExportFormat::OpenOffice)
            }
        }
    }
}

impl fmt::Display for AiaResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

/// Export formats offered by the AIA endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportFormat {
    Pdf,
    OpenOffice,
    /// OKSTRA zip archive.
    Okstra,
    /// LOIN-XML zip archive.
    LoinXml,
    /// IDS (Information Delivery Specification) XML.
    Ids,
}

impl ExportFormat {
    #[must_use]
    pub fn path_segment(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::OpenOffice => "openOffice",
            Self::Okstra => "okstra",
            Self::LoinXml => "loinXML",
            Self::Ids => "IDS",
        }
    }

    /// File extension used when saving an export.
    #[must_use]
    pub fn file_extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::OpenOffice => "odt",
            Self::Okstra | Self::LoinXml => "zip",
            Self::Ids => "ids",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

/// Unknown export format name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown export format '{0}'")]
pub struct UnknownExportFormat(pub String);

impl FromStr for ExportFormat {
    type Err = UnknownExportFormat;

    /// Case-insensitive; accepts path segments and extensions.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            "openoffice" | "odt" => Ok(Self::OpenOffice),
            "okstra" => Ok(Self::Okstra),
            "loinxml" => Ok(Self::LoinXml),
            "ids" => Ok(Self::Ids),
            _ => Err(UnknownExportFormat(s.to_string())),
        }
    }
}

pub type Extra = serde_json::Map<String, serde_json::Value>;

/// Organisation as listed by `/infrastruktur/api/v1/public/organisation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organisation {
    pub guid: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Property or property group (Merkmal / Merkmalsgruppe).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyOrGroup {
    pub guid: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub version_number: Option<i64>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Any AIA record: project, LOIN, domain model, context info or template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiaRecord {
    pub guid: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub organisation_name: Option<String>,
    #[serde(default)]
    pub version_number: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Filter group from `/merkmale/.../filter` or `/aia/.../filter`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterGroup {
    #[serde(default)]
    pub guid: Option<Uuid>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub filter: Vec<Filter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub guid: Uuid,
    #[serde(default)]
    pub name: Option<String>,
}
