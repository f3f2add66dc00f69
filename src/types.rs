//! Core types for the observatory client

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Telescope / camera selection as numbered by the site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TelescopeKind {
    Constellation,
    Galaxy,
    Cluster,
    Planet,
    Coast,
    Pirate,
}

impl TelescopeKind {
    pub const ALL: [TelescopeKind; 6] = [
        TelescopeKind::Constellation,
        TelescopeKind::Galaxy,
        TelescopeKind::Cluster,
        TelescopeKind::Planet,
        TelescopeKind::Coast,
        TelescopeKind::Pirate,
    ];

    /// Site telescope id
    pub fn id(self) -> u32 {
        match self {
            TelescopeKind::Constellation => 1,
            TelescopeKind::Galaxy => 2,
            TelescopeKind::Cluster => 3,
            TelescopeKind::Planet => 5,
            TelescopeKind::Coast => 6,
            TelescopeKind::Pirate => 7,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TelescopeKind::Constellation => "constellation",
            TelescopeKind::Galaxy => "galaxy",
            TelescopeKind::Cluster => "cluster",
            TelescopeKind::Planet => "planet",
            TelescopeKind::Coast => "coast",
            TelescopeKind::Pirate => "pirate",
        }
    }

    /// Case-insensitive lookup by name
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.trim().to_lowercase();
        Self::ALL.into_iter().find(|k| k.name() == lower)
    }

    /// Translate a filter name into the vocabulary this telescope's form expects.
    ///
    /// PIRATE names its filters Colour/Blue/Green/Red, COAST uses BVR/B/V/R.
    pub fn filter_name(self, filter: &str) -> String {
        match self {
            TelescopeKind::Pirate => match filter {
                "BVR" => "Colour",
                "B" => "Blue",
                "V" => "Green",
                "R" => "Red",
                other => other,
            },
            TelescopeKind::Coast => match filter {
                "Colour" => "BVR",
                "Blue" => "B",
                "Green" => "V",
                "Red" => "R",
                other => other,
            },
            _ => filter,
        }
        .to_string()
    }
}

impl fmt::Display for TelescopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name().to_uppercase())
    }
}

/// Request life-cycle status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestStatus {
    New,
    NewAllocated,
    Waiting,
    InProgress,
    Reallocate,
    WaitingAgain,
    CompleteOnSite,
    Complete,
    Hold,
    Frozen,
    Expired,
    ExpiredWithJobs,
    Cancelled,
    CancelledWithJobs,
    Invalid,
    NeverRises,
    OtherError,
    Unknown(u32),
}

impl RequestStatus {
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => RequestStatus::New,
            2 => RequestStatus::NewAllocated,
            3 => RequestStatus::Waiting,
            4 => RequestStatus::InProgress,
            5 => RequestStatus::Reallocate,
            6 => RequestStatus::WaitingAgain,
            7 => RequestStatus::CompleteOnSite,
            8 => RequestStatus::Complete,
            9 => RequestStatus::Hold,
            10 => RequestStatus::Frozen,
            20 => RequestStatus::Expired,
            21 => RequestStatus::ExpiredWithJobs,
            22 => RequestStatus::Cancelled,
            23 => RequestStatus::CancelledWithJobs,
            24 => RequestStatus::Invalid,
            25 => RequestStatus::NeverRises,
            26 => RequestStatus::OtherError,
            other => RequestStatus::Unknown(other),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            RequestStatus::New => 1,
            RequestStatus::NewAllocated => 2,
            RequestStatus::Waiting => 3,
            RequestStatus::InProgress => 4,
            RequestStatus::Reallocate => 5,
            RequestStatus::WaitingAgain => 6,
            RequestStatus::CompleteOnSite => 7,
            RequestStatus::Complete => 8,
            RequestStatus::Hold => 9,
            RequestStatus::Frozen => 10,
            RequestStatus::Expired => 20,
            RequestStatus::ExpiredWithJobs => 21,
            RequestStatus::Cancelled => 22,
            RequestStatus::CancelledWithJobs => 23,
            RequestStatus::Invalid => 24,
            RequestStatus::NeverRises => 25,
            RequestStatus::OtherError => 26,
            RequestStatus::Unknown(code) => code,
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            RequestStatus::New => "New",
            RequestStatus::NewAllocated => "New, allocated",
            RequestStatus::Waiting => "Waiting",
            RequestStatus::InProgress => "In progress",
            RequestStatus::Reallocate => "Reallocate",
            RequestStatus::WaitingAgain => "Waiting again",
            RequestStatus::CompleteOnSite => "Complete on site",
            RequestStatus::Complete => "Complete",
            RequestStatus::Hold => "Hold",
            RequestStatus::Frozen => "Frozen",
            RequestStatus::Expired => "Expired",
            RequestStatus::ExpiredWithJobs => "Expired w/CJobs",
            RequestStatus::Cancelled => "Cancelled",
            RequestStatus::CancelledWithJobs => "Cancelled w/CJobs",
            RequestStatus::Invalid => "Invalid",
            RequestStatus::NeverRises => "Never rises",
            RequestStatus::OtherError => "Other error",
            RequestStatus::Unknown(_) => "Unknown",
        }
    }

    /// Still waiting to be observed (anything before Complete)
    pub fn is_queued(self) -> bool {
        self.code() < RequestStatus::Complete.code()
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// Accept numbers that arrive either as JSON numbers or numeric strings
fn de_loose_u64<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    loose_u64(&value).ok_or_else(|| serde::de::Error::custom(format!("expected integer, got {value}")))
}

pub(crate) fn loose_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// One entry of the request-manager listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRequest {
    #[serde(deserialize_with = "de_loose_u64")]
    pub id: u64,
    #[serde(deserialize_with = "de_loose_u64")]
    pub status: u64,
    #[serde(default)]
    pub objectname: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserRequest {
    pub fn status(&self) -> RequestStatus {
        u32::try_from(self.status)
            .map(RequestStatus::from_code)
            .unwrap_or(RequestStatus::Unknown(u32::MAX))
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}

/// Request-manager folder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Folder {
    #[serde(deserialize_with = "de_loose_u64")]
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Sort columns accepted by the request listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestSort {
    #[default]
    Rid,
    Object,
    Completion,
}

impl RequestSort {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestSort::Rid => "rid",
            RequestSort::Object => "object",
            RequestSort::Completion => "completion",
        }
    }
}

impl std::str::FromStr for RequestSort {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "rid" => Ok(RequestSort::Rid),
            "object" => Ok(RequestSort::Object),
            "completion" => Ok(RequestSort::Completion),
            other => Err(format!("unknown sort column '{other}'")),
        }
    }
}

/// Timestamp as shown on request/job pages, e.g. `Completed on Mon 12 Jun 2023 (21:33:12 UTC)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteTime {
    pub day: String,
    pub month: String,
    pub year: String,
    pub clock: String,
    pub zone: String,
}

impl SiteTime {
    /// Parse the cell text. The date occupies words 3..6, the clock word 6 is
    /// opened by a parenthesis and the zone word 7 closes it.
    pub fn parse(text: &str) -> Option<Self> {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.len() < 8 {
            return None;
        }
        Some(Self {
            day: words[3].to_string(),
            month: words[4].to_string(),
            year: words[5].to_string(),
            clock: words[6].trim_start_matches('(').to_string(),
            zone: words[7].trim_end_matches(')').to_string(),
        })
    }

    pub fn parts(&self) -> [&str; 5] {
        [&self.day, &self.month, &self.year, &self.clock, &self.zone]
    }

    /// Best-effort conversion; ordinal suffixes on the day are tolerated
    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        let day: String = self.day.chars().take_while(|c| c.is_ascii_digit()).collect();
        let text = format!("{} {} {} {}", day, self.month, self.year, self.clock);
        ["%d %b %Y %H:%M:%S", "%d %B %Y %H:%M:%S", "%d %b %Y %H:%M", "%d %B %Y %H:%M"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(&text, fmt).ok())
    }
}

impl fmt::Display for SiteTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.parts().join(" "))
    }
}

/// Job page contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
    pub jid: u64,
    /// Raw "Request ID" cell without its leading marker
    pub rid_text: Option<String>,
    pub object_type: Option<String>,
    pub object_id: Option<String>,
    pub telescope: Option<String>,
    pub filter: Option<String>,
    pub exposure: Option<String>,
    pub completion: Option<SiteTime>,
    pub success: Option<bool>,
    pub flat_id: Option<u64>,
}

impl JobInfo {
    /// Request ids mentioned on the page, in order
    pub fn request_ids(&self) -> Vec<u64> {
        self.rid_text
            .as_deref()
            .map(|text| {
                text.split_whitespace()
                    .filter_map(|word| {
                        let digits: String = word.chars().filter(|c| c.is_ascii_digit()).collect();
                        digits.parse().ok()
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn primary_request_id(&self) -> Option<u64> {
        self.request_ids().into_iter().next()
    }
}

/// Request page contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestInfo {
    pub rid: u64,
    pub jid: Option<u64>,
    pub object_type: Option<String>,
    pub object_id: Option<String>,
    pub object_name: Option<String>,
    pub telescope_type: Option<String>,
    pub telescope: Option<String>,
    pub filter: Option<String>,
    pub dark_frame: Option<String>,
    pub exposure: Option<String>,
    pub requested: Option<SiteTime>,
    pub completion: Option<SiteTime>,
    pub status: Option<String>,
    pub flat_id: Option<u64>,
}

impl RequestInfo {
    /// Object name with surrounding whitespace removed
    pub fn target(&self) -> String {
        self.object_name.as_deref().unwrap_or_default().trim().to_string()
    }
}

/// Outcome of a request submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Accepted { rid: u64 },
    Rejected { status: String },
}

/// Observation parameters for a new request
#[derive(Debug, Clone)]
pub struct SubmitOptions {
    /// Exposure in milliseconds, as the site expects
    pub exposure_ms: u64,
    pub telescope: String,
    pub filter: String,
    pub dark_frame: bool,
    pub name: String,
    pub comment: String,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            exposure_ms: 30_000,
            telescope: "COAST".to_string(),
            filter: "BVR".to_string(),
            dark_frame: true,
            name: "RaDec object".to_string(),
            comment: "AutoSubmit".to_string(),
        }
    }
}

impl SubmitOptions {
    /// Resolve the telescope, falling back to COAST for unknown names
    pub fn telescope_kind(&self) -> TelescopeKind {
        TelescopeKind::from_name(&self.telescope).unwrap_or_else(|| {
            tracing::warn!("Wrong telescope: {}; selecting COAST(6)", self.telescope);
            TelescopeKind::Coast
        })
    }
}
