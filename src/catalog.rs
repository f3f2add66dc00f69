//! Variable-star catalogs: GCVS through VizieR and AAVSO comparison charts

use crate::config::CatalogConfig;
use crate::coords::SkyPosition;
use crate::error::{Result, ScopeError};
use crate::solver::SkyExtent;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Whole GCVS catalogue: main table plus the NSV suspected variables
const GCVS_CATALOG: &str = "B/gcvs";
const GCVS_TABLE: &str = "B/gcvs/gcvs_cat";
const GCVS_COLUMNS: &str = "GCVS,VarType,magMax,RAJ2000,DEJ2000";
/// Computed J2000 columns (`_RAJ2000`, `_DEJ2000`, degrees) added to box searches
const COMPUTED_POSITION: &str = "_RAJ,_DEJ";

/// One GCVS hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarStarRecord {
    pub name: String,
    pub position: SkyPosition,
    pub mag_max: Option<f64>,
    pub var_type: Option<String>,
}

/// Photometry of a comparison star in one band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandMag {
    pub band: String,
    pub mag: Option<f64>,
    #[serde(default)]
    pub error: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonStar {
    pub auid: String,
    pub label: String,
    pub position: SkyPosition,
    pub bands: Vec<BandMag>,
}

/// AAVSO comparison sequence of a variable star
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    pub chart_id: String,
    pub stars: Vec<ComparisonStar>,
}

impl Sequence {
    pub fn is_usable(&self) -> bool {
        !self.chart_id.is_empty() && !self.stars.is_empty()
    }
}

/// Collapse whitespace and shorten the GCVS `V0nnn` form to `Vnnn`
pub fn normalize_name(name: &str) -> String {
    let name = name.split_whitespace().collect::<Vec<_>>().join(" ");
    match name.strip_prefix("V0") {
        Some(rest) => format!("V{rest}"),
        None => name,
    }
}

/// GCVS spelling of a star name (`V686 Cyg` -> `V0686 Cyg`)
pub fn gcvs_name(name: &str) -> String {
    let name = name.split_whitespace().collect::<Vec<_>>().join(" ");
    let Some(rest) = name.strip_prefix('V') else {
        return name;
    };
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return name;
    }
    format!("V{:0>4}{}", digits, &rest[digits.len()..])
}

/// Split a multi-table `asu-tsv` reply into one text block per table.
/// A table ends at the first comment or blank line after its own lines.
fn table_blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current = String::new();
    for line in text.lines() {
        let separator = line.starts_with('#') || line.trim().is_empty();
        if separator {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
            continue;
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}

/// Tables of a VizieR `asu-tsv` reply, each as rows keyed by column name
pub fn parse_vizier_tables(text: &str) -> Result<Vec<Vec<HashMap<String, String>>>> {
    table_blocks(text).iter().map(|b| parse_vizier_tsv(b)).collect()
}

/// Rows of a single-table VizieR `asu-tsv` reply keyed by column name.
///
/// Layout: `#` comments, a header line, a units line, a dashes line, data.
pub fn parse_vizier_tsv(text: &str) -> Result<Vec<HashMap<String, String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut header: Option<Vec<String>> = None;
    let mut in_data = false;
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ScopeError::Catalog(format!("VizieR reply: {e}")))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let Some(cols) = &header else {
            header = Some(record.iter().map(str::to_string).collect());
            continue;
        };
        if !in_data {
            in_data = record.iter().all(|f| f.chars().all(|c| c == '-'));
            continue;
        }
        rows.push(
            cols.iter()
                .cloned()
                .zip(record.iter().map(str::to_string))
                .collect(),
        );
    }
    Ok(rows)
}

/// Catalog records from every table of a VizieR reply
pub fn records_from_reply(text: &str) -> Result<Vec<VarStarRecord>> {
    Ok(parse_vizier_tables(text)?
        .iter()
        .flat_map(|rows| records_from_rows(rows))
        .collect())
}

/// VizieR parameters for a box search over all GCVS tables
pub fn box_query(extent: &SkyExtent) -> Vec<(&'static str, String)> {
    let c = &extent.center;
    vec![
        ("-source", GCVS_CATALOG.to_string()),
        ("-out.add", COMPUTED_POSITION.to_string()),
        ("-out.max", "1000".to_string()),
        ("-c", format!("{:.6} {:+.6}", c.ra_deg, c.dec_deg)),
        ("-c.u", "deg".to_string()),
        ("-c.bd", format!("{:.6}x{:.6}", extent.width_deg, extent.height_deg)),
    ]
}

/// VizieR parameters for a named star in the main GCVS table
pub fn name_query(name: &str) -> Vec<(&'static str, String)> {
    vec![
        ("-source", GCVS_TABLE.to_string()),
        ("-out", GCVS_COLUMNS.to_string()),
        ("-out.max", "1000".to_string()),
        ("GCVS", gcvs_name(name)),
    ]
}

/// Build catalog records from the rows of one VizieR table
pub fn records_from_rows(rows: &[HashMap<String, String>]) -> Vec<VarStarRecord> {
    let non_empty = |row: &HashMap<String, String>, key: &str| {
        row.get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    };

    rows.iter()
        .enumerate()
        .filter_map(|(n, row)| {
            let raw = non_empty(row, "Name")
                .or_else(|| non_empty(row, "GCVS"))
                .or_else(|| non_empty(row, "NSV").map(|nsv| format!("NSV_{nsv}")))
                .unwrap_or_else(|| format!("VS_{n}"));
            let name = normalize_name(&raw);

            let position = match (non_empty(row, "RAJ2000"), non_empty(row, "DEJ2000")) {
                (Some(ra), Some(dec)) => SkyPosition::from_hours_degrees(&ra, &dec)
                    .or_else(|_| SkyPosition::from_degrees_text(&ra, &dec)),
                _ => {
                    let (ra, dec) = (non_empty(row, "_RAJ2000")?, non_empty(row, "_DEJ2000")?);
                    SkyPosition::from_degrees_text(&ra, &dec)
                }
            }
            .map_err(|e| tracing::warn!("{}: bad position ({})", name, e))
            .ok()?;

            Some(VarStarRecord {
                name,
                position,
                mag_max: non_empty(row, "magMax").and_then(|m| m.parse().ok()),
                var_type: non_empty(row, "VarType"),
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct VspBand {
    band: String,
    mag: Option<f64>,
    #[serde(default)]
    error: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct VspStar {
    #[serde(default)]
    auid: String,
    ra: String,
    dec: String,
    #[serde(default)]
    label: String,
    #[serde(default)]
    bands: Vec<VspBand>,
}

#[derive(Debug, Deserialize)]
struct VspChart {
    #[serde(default)]
    chartid: String,
    #[serde(default)]
    photometry: Vec<VspStar>,
}

/// Parse a VSP chart reply
pub fn parse_vsp_chart(text: &str) -> Result<Sequence> {
    let chart: VspChart = serde_json::from_str(text)?;
    let stars = chart
        .photometry
        .into_iter()
        .filter_map(|s| {
            let position = SkyPosition::from_hours_degrees(&s.ra, &s.dec)
                .map_err(|e| tracing::warn!("{}: bad position ({})", s.auid, e))
                .ok()?;
            Some(ComparisonStar {
                auid: s.auid,
                label: s.label,
                position,
                bands: s
                    .bands
                    .into_iter()
                    .map(|b| BandMag {
                        band: b.band,
                        mag: b.mag,
                        error: b.error,
                    })
                    .collect(),
            })
        })
        .collect();

    Ok(Sequence {
        chart_id: chart.chartid,
        stars,
    })
}

/// Catalog seam used by the analysis pipeline (allows mocking)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StarCatalog: Send + Sync {
    /// GCVS stars inside the RA/Dec box of an image
    async fn variable_stars_in(&self, extent: &SkyExtent) -> Result<Vec<VarStarRecord>>;
    /// Comparison sequence for a star, `None` when AAVSO has no usable chart
    async fn comparison_sequence(&self, name: &str) -> Result<Option<Sequence>>;
}

/// HTTP client for VizieR and AAVSO VSP
pub struct CatalogClient {
    http: Client,
    config: CatalogConfig,
}

impl CatalogClient {
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        let http = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            http,
            config: config.clone(),
        })
    }

    fn vizier_url(&self) -> String {
        format!("{}/viz-bin/asu-tsv", self.config.vizier_url.trim_end_matches('/'))
    }

    async fn gcvs_query(&self, params: &[(&str, String)]) -> Result<Vec<VarStarRecord>> {
        let text = self
            .http
            .get(self.vizier_url())
            .query(params)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        records_from_reply(&text)
    }

    /// Position of a named star from GCVS
    pub async fn find_variable_star(&self, name: &str) -> Result<VarStarRecord> {
        let records = self.gcvs_query(&name_query(name)).await?;
        records
            .into_iter()
            .next()
            .ok_or_else(|| ScopeError::NotFound(format!("{name} in GCVS")))
    }

    async fn fetch_chart(&self, name: &str) -> std::result::Result<String, reqwest::Error> {
        self.http
            .get(format!("{}/api/chart/", self.config.vsp_url.trim_end_matches('/')))
            .query(&[
                ("star", name.to_string()),
                ("fov", self.config.chart_fov_arcmin.to_string()),
                ("maglimit", self.config.chart_mag_limit.to_string()),
                ("format", "json".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}

#[async_trait]
impl StarCatalog for CatalogClient {
    async fn variable_stars_in(&self, extent: &SkyExtent) -> Result<Vec<VarStarRecord>> {
        let c = &extent.center;
        tracing::debug!(
            "GCVS box {:.4} {:+.4} ({:.3} x {:.3} deg)",
            c.ra_deg,
            c.dec_deg,
            extent.width_deg,
            extent.height_deg
        );
        self.gcvs_query(&box_query(extent)).await
    }

    async fn comparison_sequence(&self, name: &str) -> Result<Option<Sequence>> {
        let text = match self.fetch_chart(name).await {
            Ok(text) => text,
            Err(e) if e.is_connect() || e.is_timeout() => {
                tracing::warn!("VSP connection failed ({}), retrying in 5s", e);
                tokio::time::sleep(Duration::from_secs(5)).await;
                self.fetch_chart(name).await?
            }
            Err(e) if e.status().is_some() => {
                tracing::debug!("No chart for {}: {}", name, e);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let seq = parse_vsp_chart(&text)?;
        Ok(seq.is_usable().then_some(seq))
    }
}
