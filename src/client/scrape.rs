//! HTML page scraping
//!
//! The site has no documented API for job and request details, so these
//! parsers read the label/value table rows, embedded script objects and
//! form fields of the rendered pages. All functions are pure over the page
//! text.

use crate::types::{loose_u64, JobInfo, RequestInfo, SiteTime};
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;

static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("valid selector"));
static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").expect("valid selector"));
static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").expect("valid selector"));
static SCRIPT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("script").expect("valid selector"));
static BUTTON: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("button").expect("valid selector"));
static HEADING: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h3").expect("valid selector"));
static IFRAME: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("iframe").expect("valid selector"));
static TICKET: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"input[name="ticket"]"#).expect("valid selector"));

/// Drop non-ASCII characters (used before logging page text)
pub fn cleanup(text: &str) -> String {
    text.chars().filter(char::is_ascii).collect()
}

fn element_text(el: &ElementRef<'_>) -> String {
    el.text().collect()
}

/// Text nodes of an element, stripped, one per line
fn element_lines(el: &ElementRef<'_>) -> Vec<String> {
    el.text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Leading digits after the first `=` of a query-like string
fn number_after_eq(text: &str, last: bool) -> Option<u64> {
    let tail = if last {
        text.rsplit('=').next()?
    } else {
        text.split('=').nth(1)?
    };
    let digits: String = tail.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

fn digits_in(text: &str) -> Option<u64> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Walk every table row; for each cell, hand the previous cell's text
/// (the label) and this cell's text to `visit`.
fn for_each_labelled_cell(doc: &Html, mut visit: impl FnMut(&str, &str)) {
    for row in doc.select(&ROW) {
        tracing::trace!("{}", cleanup(&element_text(&row)));
        let mut label = String::new();
        for cell in row.select(&CELL) {
            let value = element_text(&cell);
            visit(&label, &value);
            label = value;
        }
    }
}

/// Parse a job view page (`v4request-view.php?jid=`)
pub fn parse_job_page(jid: u64, html: &str) -> JobInfo {
    let doc = Html::parse_document(html);
    let mut job = JobInfo {
        jid,
        ..Default::default()
    };

    for_each_labelled_cell(&doc, |label, value| {
        if label.contains("Request ID") {
            job.rid_text = Some(value.chars().skip(1).collect::<String>().trim().to_string());
        }
        if label.contains("Object Type") {
            job.object_type = Some(value.trim().to_string());
        }
        if label.contains("Object ID") {
            job.object_id = Some(value.trim().to_string());
        }
        if label.contains("Telescope Type Name") {
            job.telescope = Some(value.trim().to_string());
        }
        if label.contains("Filter Type") {
            job.filter = Some(value.trim().to_string());
        }
        if label.contains("Exposure Time") {
            job.exposure = Some(value.trim().to_string());
        }
        if label.contains("Completion Time") {
            job.completion = SiteTime::parse(value);
        }
        if label.contains("Status") {
            job.success = Some(value.trim() == "Success");
        }
    });

    job.flat_id = doc
        .select(&BUTTON)
        .filter_map(|b| b.value().attr("onclick"))
        .find(|onclick| onclick.contains("dl-flat"))
        .and_then(|onclick| number_after_eq(onclick, true));

    job
}

/// Parse a request view page (`v4request-view.php?rid=`)
pub fn parse_request_page(rid: u64, html: &str) -> RequestInfo {
    let doc = Html::parse_document(html);
    let mut req = RequestInfo {
        rid,
        ..Default::default()
    };

    for_each_labelled_cell(&doc, |label, value| {
        if label.contains("Job ID") {
            req.jid = value.split_whitespace().next().and_then(digits_in);
        }
        if label.contains("Object Type") {
            req.object_type = Some(value.trim().to_string());
        }
        if label.contains("Object ID") {
            req.object_id = Some(value.trim().to_string());
        }
        if label.contains("Object Name") {
            req.object_name = Some(value.to_string());
        }
        if label.contains("Telescope Type Name") {
            req.telescope_type = Some(value.trim().to_string());
        }
        if label.contains("Telescope Name") {
            req.telescope = Some(value.trim().to_string());
        }
        if label.contains("Filter Type") {
            req.filter = Some(value.trim().to_string());
        }
        if label.contains("Dark Frame") {
            req.dark_frame = Some(value.trim().to_string());
        }
        if label.contains("Exposure Time") {
            req.exposure = Some(value.trim().to_string());
        }
        if label.contains("Request Time") {
            req.requested = SiteTime::parse(value);
        }
        if label.contains("Completion Time") {
            req.completion = SiteTime::parse(value);
        }
        if label.contains("Status") {
            req.status = Some(value.trim().to_string());
        }
    });

    req.flat_id = doc
        .select(&LINK)
        .filter_map(|a| a.value().attr("href"))
        .find(|href| href.contains("dl-flat"))
        .and_then(|href| number_after_eq(href, false));

    req
}

/// Job id from the `var info = {...}` object embedded in a request page
pub fn parse_info_jid(html: &str) -> Option<u64> {
    let doc = Html::parse_document(html);
    doc.select(&SCRIPT)
        .map(|s| element_text(&s))
        .filter(|text| text.contains("var info = "))
        .flat_map(|text| {
            text.lines()
                .filter(|l| l.contains("var info = "))
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .find_map(|line| {
            let start = line.find('{')?;
            let end = line.rfind('}')?;
            let info: serde_json::Value = serde_json::from_str(&line[start..=end]).ok()?;
            loose_u64(info.get("jid")?)
        })
}

/// Job ids linked from the rows of a job search result page
pub fn parse_job_ids(html: &str) -> Vec<u64> {
    let doc = Html::parse_document(html);
    doc.select(&ROW)
        .filter_map(|row| row.select(&LINK).next())
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| {
            let pos = href.rfind("jid")?;
            if pos == 0 {
                return None;
            }
            let value = href.get(pos + 4..)?.split('&').next()?;
            value.parse().ok()
        })
        .collect()
}

/// "Parameters" and "Results" summaries printed above a job search
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchSummary {
    pub parameters: Vec<String>,
    pub results: Vec<String>,
}

pub fn parse_search_summary(html: &str) -> SearchSummary {
    let doc = Html::parse_document(html);
    let mut summary = SearchSummary::default();

    for heading in doc.select(&HEADING) {
        let title = element_text(&heading);
        let Some(next) = heading.next_siblings().find_map(ElementRef::wrap) else {
            continue;
        };
        if title.contains("Parameters") {
            summary.parameters = element_lines(&next);
        } else if title.contains("Results") && element_text(&next).contains("jobs") {
            summary.results = element_lines(&next);
        }
    }

    summary
}

/// Form ticket threaded through the request-constructor wizard
pub fn extract_ticket(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    doc.select(&TICKET)
        .filter_map(|input| input.value().attr("value"))
        .map(str::to_string)
        .next()
}

/// Download link of a processed-image page, present once the file is ready
pub fn find_iframe_src(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    doc.select(&IFRAME)
        .next()
        .and_then(|f| f.value().attr("src"))
        .map(str::to_string)
}
