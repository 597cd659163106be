use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Severity of a CVE as reported by the vendor advisory.
///
/// Stored in the database as its lowercase name, which is also the form
/// accepted in query parameters.
#[derive(Serialize, Deserialize, Debug, Eq, PartialEq, Hash, Copy, Clone, PartialOrd, Ord, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    None,
    Low,
    Moderate,
    Important,
    Critical,
}

impl Severity {
    fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::Important => "important",
            Self::Critical => "critical",
        }
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown severity `{0}`")]
pub struct UnknownSeverity(pub String);

impl FromStr for Severity {
    type Err = UnknownSeverity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "low" => Ok(Self::Low),
            "moderate" => Ok(Self::Moderate),
            "important" => Ok(Self::Important),
            "critical" => Ok(Self::Critical),
            _ => Err(UnknownSeverity(s.to_string())),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, ToSchema)]
pub struct Cve {
    /// CVE identifier, e.g. `CVE-2022-0185`
    pub name: String,
    pub description: String,
    pub public_date: NaiveDate,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cvss2_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cvss3_score: Option<f64>,
}

/// A cluster exposed to at least one known CVE.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, ToSchema)]
pub struct Cluster {
    pub uuid: String,
    pub status: String,
    pub version: String,
    pub provider: String,
    pub last_seen: DateTime<Utc>,
}

/// Listing metadata returned alongside every page of results.
///
/// The optional fields echo the normalized value of each filter that was
/// applied to the listing, so clients can see the effective query,
/// including server-side defaults.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, ToSchema)]
pub struct ListMeta {
    pub limit: u64,
    pub offset: u64,
    pub total_items: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub published: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub severity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cvss_score: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub affected_clusters: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub affected_images: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sort: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, ToSchema)]
#[aliases(PagedCves = PagedResponse<Cve>, PagedClusters = PagedResponse<Cluster>)]
pub struct PagedResponse<T> {
    pub data: Vec<T>,
    pub meta: ListMeta,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorInformation {
    pub error: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub details: String,
}
