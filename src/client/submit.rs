//! New observation requests

use super::{scrape, Telescope};
use crate::coords::SkyPosition;
use crate::error::{Result, ScopeError};
use crate::types::{loose_u64, Submission, SubmitOptions};
use serde_json::json;

const CONSTRUCTOR: &str = "request-constructor.php";

/// Whole and fractional parts of a `SS.ss` seconds field
fn split_seconds(seconds: &str) -> (String, String) {
    match seconds.split_once('.') {
        Some((whole, fract)) => (whole.to_string(), fract.to_string()),
        None => (seconds.to_string(), "00".to_string()),
    }
}

/// Form fields of the wizard's RA/Dec step
pub(crate) fn radec_form(target: &SkyPosition, name: &str) -> Vec<(&'static str, String)> {
    let ra = target.ra_sexagesimal(2).format(" ", 2, false);
    let dec = target.dec_sexagesimal(2).format(" ", 2, true);
    let ra: Vec<&str> = ra.split_whitespace().collect();
    let dec: Vec<&str> = dec.split_whitespace().collect();
    let (ra_secs, ra_fract) = split_seconds(ra[2]);
    let (dec_secs, dec_fract) = split_seconds(dec[2]);

    vec![
        ("raHours", ra[0].to_string()),
        ("raMins", ra[1].to_string()),
        ("raSecs", ra_secs),
        ("raFract", ra_fract),
        ("decDegrees", dec[0].to_string()),
        ("decMins", dec[1].to_string()),
        ("decSecs", dec_secs),
        ("decFract", dec_fract),
        ("newObjectName", name.to_string()),
    ]
}

impl Telescope {
    /// Submit a RA/Dec request through the request-constructor API
    pub async fn submit_job_api(&self, target: &SkyPosition, opts: &SubmitOptions) -> Result<Submission> {
        let tele = opts.telescope_kind();
        let params = json!({
            "telescopeid": tele.id(),
            "telescopetype": 2,
            "exposuretime": opts.exposure_ms,
            "filtertype": tele.filter_name(&opts.filter),
            "objecttype": "RADEC",
            "objectname": opts.name,
            "objectid": format!("{} {}", target.format_ra(":", 2), target.format_dec(":", 2)),
            "usercomments": opts.comment,
        });

        self.rc_api("0-rb-clear", None).await?;

        let mut resp = self.rc_api("0-rb-set", Some(&params)).await?;
        tracing::debug!("Req data: {:?}", resp);
        if resp.success {
            resp = self.rc_api("0-rb-submit", None).await?;
            tracing::debug!("Submission data: {:?}", resp);
        }

        if resp.success {
            let rid = resp
                .data
                .get("id")
                .and_then(loose_u64)
                .ok_or_else(|| ScopeError::Api("submission accepted without an id".to_string()))?;
            Ok(Submission::Accepted { rid })
        } else {
            tracing::warn!("Submission error. Status: {}", resp.status_text());
            Ok(Submission::Rejected {
                status: resp.status_text(),
            })
        }
    }

    /// One wizard step: post `form` with the current ticket, return the next ticket
    async fn wizard_step(&self, ticket: &str, form: Vec<(&'static str, String)>) -> Result<(String, String)> {
        let mut fields = vec![("ticket", ticket.to_string())];
        fields.extend(form);

        let html = self
            .session()?
            .post(self.url(CONSTRUCTOR))
            .form(&fields)
            .send()
            .await?
            .text()
            .await?;
        let next = scrape::extract_ticket(&html).unwrap_or_default();
        Ok((next, html))
    }

    /// Submit a RA/Dec request by walking the HTML request-constructor wizard.
    ///
    /// Returns the final page.
    pub async fn submit_radec_job(&self, target: &SkyPosition, opts: &SubmitOptions) -> Result<String> {
        let tele = opts.telescope_kind();
        let filter = tele.filter_name(&opts.filter);

        let html = self
            .session()?
            .get(self.url(&format!("{CONSTRUCTOR}?action=new")))
            .send()
            .await?
            .text()
            .await?;
        let ticket = scrape::extract_ticket(&html)
            .ok_or_else(|| ScopeError::Scrape("no ticket on request constructor".to_string()))?;

        let action = |a: &str| vec![("action", a.to_string())];

        tracing::debug!("GoTo Part 1 (ticket {})", ticket);
        let (ticket, _) = self.wizard_step(&ticket, action("main-go-part1")).await?;
        tracing::debug!("GoTo RADEC (ticket {})", ticket);
        let (ticket, _) = self.wizard_step(&ticket, action("part1-go-radec")).await?;

        tracing::debug!("Save RADEC (ticket {})", ticket);
        let mut form = action("part1-radec-save");
        form.extend(radec_form(target, &opts.name));
        let (ticket, _) = self.wizard_step(&ticket, form).await?;

        tracing::debug!("GoTo Part 2 (ticket {})", ticket);
        let (ticket, _) = self.wizard_step(&ticket, action("main-go-part2")).await?;
        tracing::debug!("Save Telescope (ticket {})", ticket);
        let mut form = action("part2-save");
        form.extend([
            ("submittype", "Save".to_string()),
            ("newTelescopeSelection", tele.id().to_string()),
        ]);
        let (ticket, _) = self.wizard_step(&ticket, form).await?;

        tracing::debug!("GoTo Part 3 (ticket {})", ticket);
        let (ticket, _) = self.wizard_step(&ticket, action("main-go-part3")).await?;
        tracing::debug!("Save Exposure (ticket {})", ticket);
        let mut form = action("part3-save");
        form.extend([
            ("submittype", "Save".to_string()),
            ("newExposureTime", opts.exposure_ms.to_string()),
            ("newDarkFrame", if opts.dark_frame { "1" } else { "0" }.to_string()),
            ("newFilterSelection", filter),
            ("newRequestComments", opts.comment.clone()),
        ]);
        let (ticket, _) = self.wizard_step(&ticket, form).await?;

        tracing::debug!("Submit (ticket {})", ticket);
        let (_, html) = self.wizard_step(&ticket, action("main-submit")).await?;
        Ok(html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radec_form_splits_fields() {
        let pos = SkyPosition::from_hours_degrees("21 42 42.80", "-05 03 09.90").unwrap();
        let form = radec_form(&pos, "X Cyg");
        let get = |k: &str| form.iter().find(|(key, _)| *key == k).map(|(_, v)| v.as_str());

        assert_eq!(get("raHours"), Some("21"));
        assert_eq!(get("raMins"), Some("42"));
        assert_eq!(get("raSecs"), Some("42"));
        assert_eq!(get("raFract"), Some("80"));
        assert_eq!(get("decDegrees"), Some("-05"));
        assert_eq!(get("decMins"), Some("03"));
        assert_eq!(get("decSecs"), Some("09"));
        assert_eq!(get("decFract"), Some("90"));
        assert_eq!(get("newObjectName"), Some("X Cyg"));
    }

    #[test]
    fn test_split_seconds_without_fraction() {
        assert_eq!(split_seconds("07"), ("07".to_string(), "00".to_string()));
    }
}
