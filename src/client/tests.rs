//! Tests for client module

#[cfg(test)]
mod tests {
    use crate::client::scrape::*;
    use crate::client::download::{check_ready_polls, open_cached, processed_polls, verified_download};
    use crate::client::requests::remaining_page;
    use crate::client::{cache_path, ApiResponse, ObsArchive, ObsQuery};
    use crate::config::TelescopeConfig;
    use crate::error::ScopeError;
    use crate::types::{RequestStatus, SiteTime, TelescopeKind, UserRequest};
    use chrono::NaiveDate;
    use std::io::{Cursor, Write};
    use std::path::Path;

    const JOB_PAGE: &str = r#"
        <html><body><table>
        <tr><td>Request ID</td><td>#123456 </td></tr>
        <tr><td>Object Type</td><td> RADEC </td></tr>
        <tr><td>Object ID</td><td>21:42:42.80 +43:35:09.90</td></tr>
        <tr><td>Telescope Type Name</td><td>COAST</td></tr>
        <tr><td>Filter Type</td><td>BVR</td></tr>
        <tr><td>Exposure Time</td><td>30000 ms</td></tr>
        <tr><td>Completion Time</td><td>Completed on Mon 12 Jun 2023 (21:33:12 UTC)</td></tr>
        <tr><td>Status</td><td>Success</td></tr>
        </table>
        <button onclick="location.href='api.php?a=dl-flat&amp;flatid=778899'">Flat</button>
        </body></html>
    "#;

    const REQUEST_PAGE: &str = r#"
        <html><head><script>
        var x = 1;
        var info = {"rid": 123456, "jid": "654321"};
        </script></head><body><table>
        <tr><td>Job ID</td><td>654321 (view)</td></tr>
        <tr><td>Object Type</td><td>RADEC</td></tr>
        <tr><td>Object Name</td><td> SS Cyg </td></tr>
        <tr><td>Telescope Type Name</td><td>Robotic</td></tr>
        <tr><td>Telescope Name</td><td>PIRATE</td></tr>
        <tr><td>Filter Type</td><td>Colour</td></tr>
        <tr><td>Dark Frame</td><td>Yes</td></tr>
        <tr><td>Exposure Time</td><td>60000 ms</td></tr>
        <tr><td>Request Time</td><td>Requested on Sun 11 Jun 2023 (10:00:00 UTC)</td></tr>
        <tr><td>Status</td><td>Complete</td></tr>
        </table>
        <a href="download.php?flatid=4242&amp;type=dl-flat">flat</a>
        </body></html>
    "#;

    #[test]
    fn test_parse_job_page() {
        let job = parse_job_page(654321, JOB_PAGE);
        assert_eq!(job.jid, 654321);
        assert_eq!(job.rid_text.as_deref(), Some("123456"));
        assert_eq!(job.primary_request_id(), Some(123456));
        assert_eq!(job.object_type.as_deref(), Some("RADEC"));
        assert_eq!(job.telescope.as_deref(), Some("COAST"));
        assert_eq!(job.filter.as_deref(), Some("BVR"));
        assert_eq!(job.success, Some(true));
        assert_eq!(job.flat_id, Some(778899));

        let done = job.completion.unwrap();
        assert_eq!(done.day, "12");
        assert_eq!(done.clock, "21:33:12");
        assert_eq!(done.zone, "UTC");
    }

    #[test]
    fn test_parse_failed_job() {
        let html = "<table><tr><td>Status</td><td>Failed</td></tr></table>";
        let job = parse_job_page(1, html);
        assert_eq!(job.success, Some(false));
        assert_eq!(job.flat_id, None);
    }

    #[test]
    fn test_parse_request_page() {
        let req = parse_request_page(123456, REQUEST_PAGE);
        assert_eq!(req.jid, Some(654321));
        assert_eq!(req.target(), "SS Cyg");
        assert_eq!(req.telescope_type.as_deref(), Some("Robotic"));
        assert_eq!(req.telescope.as_deref(), Some("PIRATE"));
        assert_eq!(req.dark_frame.as_deref(), Some("Yes"));
        assert_eq!(req.status.as_deref(), Some("Complete"));
        assert_eq!(req.flat_id, Some(4242));
        assert!(req.completion.is_none());
        assert_eq!(req.requested.unwrap().month, "Jun");
    }

    #[test]
    fn test_parse_info_jid() {
        assert_eq!(parse_info_jid(REQUEST_PAGE), Some(654321));
        assert_eq!(parse_info_jid("<script>var y = {}</script>"), None);
    }

    #[test]
    fn test_parse_job_ids() {
        let html = r#"<table>
            <tr><th>Job</th></tr>
            <tr><td><a href="v4request-view.php?jid=111&amp;x=1">111</a></td></tr>
            <tr><td><a href="v4request-view.php?jid=222">222</a></td></tr>
            <tr><td><a href="help.php">help</a></td></tr>
        </table>"#;
        assert_eq!(parse_job_ids(html), vec![111, 222]);
    }

    #[test]
    fn test_parse_search_summary() {
        let html = r#"<div>
            <h3>Search Parameters</h3><p>Status: Complete<br/>Filter: any</p>
            <h3>Search Results</h3><p>Found 2 jobs</p>
        </div>"#;
        let summary = parse_search_summary(html);
        assert_eq!(summary.parameters, vec!["Status: Complete", "Filter: any"]);
        assert_eq!(summary.results, vec!["Found 2 jobs"]);
    }

    #[test]
    fn test_extract_ticket_and_iframe() {
        let html = r#"<form><input type="hidden" name="ticket" value="abc123"/></form>
            <iframe src="files/art_1.zip"></iframe>"#;
        assert_eq!(extract_ticket(html).as_deref(), Some("abc123"));
        assert_eq!(find_iframe_src(html).as_deref(), Some("files/art_1.zip"));
        assert_eq!(extract_ticket("<p>none</p>"), None);
        assert_eq!(find_iframe_src("<p>none</p>"), None);
    }

    #[test]
    fn test_cleanup_drops_non_ascii() {
        assert_eq!(cleanup("Zażółć ok"), "Za ok");
    }

    #[test]
    fn test_site_time_to_datetime() {
        let t = SiteTime::parse("Completed on Mon 12 Jun 2023 (21:33:12 UTC)").unwrap();
        let expected = NaiveDate::from_ymd_opt(2023, 6, 12)
            .unwrap()
            .and_hms_opt(21, 33, 12)
            .unwrap();
        assert_eq!(t.to_datetime(), Some(expected));
        assert!(SiteTime::parse("too short").is_none());
    }

    #[test]
    fn test_cache_path_layout() {
        let p = cache_path(Path::new("/tmp/jobs"), "654321.zip");
        assert_eq!(p, Path::new("/tmp/jobs/6/5/654321.zip"));
    }

    #[test]
    fn test_obs_query_form() {
        let end = NaiveDate::from_ymd_opt(2023, 6, 12)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let query = ObsQuery {
            end: Some(end),
            days: 2,
            camera: "pirate".to_string(),
            ..Default::default()
        };
        let form = query.form();
        let values = |k: &str| -> Vec<String> {
            form.iter().filter(|(key, _)| *key == k).map(|(_, v)| v.clone()).collect()
        };

        assert_eq!(values("searchearliestcom[]"), vec!["10", "6", "2023", "16", "0"]);
        assert_eq!(values("searchlatestcom[]"), vec!["12", "6", "2023", "16", "0"]);
        assert_eq!(values("searchtelescope"), vec!["7"]);
        assert_eq!(values("resultsperpage"), vec!["1000"]);
        assert_eq!(values("sort1order"), vec!["desc"]);
    }

    #[test]
    fn test_obs_query_unknown_camera() {
        let query = ObsQuery {
            camera: "hubble".to_string(),
            ..Default::default()
        };
        let form = query.form();
        let tele = form.iter().find(|(k, _)| *k == "searchtelescope").unwrap();
        assert_eq!(tele.1, "");
    }

    #[test]
    fn test_api_response_status_text() {
        let resp: ApiResponse =
            serde_json::from_str(r#"{"success": true, "status": "READY", "data": {"ieID": 5}}"#).unwrap();
        assert!(resp.success);
        assert_eq!(resp.status_text(), "READY");

        let resp: ApiResponse = serde_json::from_str(r#"{"status": 3}"#).unwrap();
        assert!(!resp.success);
        assert_eq!(resp.status_text(), "3");
    }

    #[test]
    fn test_user_request_loose_numbers() {
        let req: UserRequest =
            serde_json::from_str(r#"{"id": "42", "status": "8", "objectname": "X Cyg", "telescope": "COAST"}"#)
                .unwrap();
        assert_eq!(req.id, 42);
        assert_eq!(req.status(), RequestStatus::Complete);
        assert_eq!(req.field("telescope").and_then(|v| v.as_str()), Some("COAST"));
    }

    #[test]
    fn test_user_request_oversized_status() {
        // 2^32 + 8 must not wrap around to Complete
        let req: UserRequest =
            serde_json::from_str(r#"{"id": 1, "status": 4294967304, "objectname": "X Cyg"}"#).unwrap();
        assert_eq!(req.status(), RequestStatus::Unknown(u32::MAX));
        assert!(!req.status().is_queued());
    }

    #[test]
    fn test_status_table() {
        assert_eq!(RequestStatus::from_code(21).text(), "Expired w/CJobs");
        assert!(RequestStatus::from_code(3).is_queued());
        assert!(!RequestStatus::Complete.is_queued());
        assert_eq!(RequestStatus::from_code(99), RequestStatus::Unknown(99));
        assert_eq!(RequestStatus::from_code(99).code(), 99);
    }

    #[test]
    fn test_telescope_filter_translation() {
        assert_eq!(TelescopeKind::from_name("Pirate"), Some(TelescopeKind::Pirate));
        assert_eq!(TelescopeKind::Pirate.filter_name("BVR"), "Colour");
        assert_eq!(TelescopeKind::Pirate.filter_name("V"), "Green");
        assert_eq!(TelescopeKind::Coast.filter_name("Red"), "R");
        assert_eq!(TelescopeKind::Coast.filter_name("BVR"), "BVR");
        assert_eq!(TelescopeKind::Galaxy.filter_name("Blue"), "Blue");
        assert_eq!(TelescopeKind::Coast.id(), 6);
    }

    #[test]
    fn test_zip_archive_skips_non_fits_members() {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            let opts = zip::write::SimpleFileOptions::default();
            zip.start_file("readme.txt", opts).unwrap();
            zip.write_all(b"hello").unwrap();
            zip.finish().unwrap();
        }
        buf.set_position(0);

        let mut archive = ObsArchive::Frames(zip::ZipArchive::new(buf).unwrap());
        assert_eq!(archive.names(), vec!["readme.txt"]);
        assert!(archive.frames().unwrap().is_empty());
    }

    fn telescope_config(timeout_secs: u64, retry_secs: u64) -> TelescopeConfig {
        TelescopeConfig {
            url: "https://www.telescope.org/".to_string(),
            user: "observer".to_string(),
            password: "secret".to_string(),
            timeout_secs,
            retry_secs,
            ready_poll_secs: 2,
            ready_poll_max: 30,
            request_timeout_secs: 120,
        }
    }

    #[test]
    fn test_ready_polls_give_up_after_limit() {
        let config = telescope_config(60, 15);
        assert!(check_ready_polls(654321, 30, &config).is_ok());

        let err = check_ready_polls(654321, 31, &config).unwrap_err();
        match err {
            ScopeError::Timeout { what, secs } => {
                assert!(what.contains("654321"));
                assert_eq!(secs, 60);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_download_size_must_match() {
        assert_eq!(
            verified_download("654321.zip".to_string(), 2048, Some(2048)),
            Some("654321.zip".to_string())
        );
        assert_eq!(verified_download("654321.zip".to_string(), 2047, Some(2048)), None);
        assert_eq!(verified_download("654321.zip".to_string(), 2048, None), None);
    }

    #[test]
    fn test_corrupt_cached_zip_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("654321.zip");
        std::fs::write(&path, b"not a zip archive").unwrap();

        assert!(open_cached(&path, false).unwrap().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_good_cached_zip_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("654321.zip");
        {
            let file = std::fs::File::create(&path).unwrap();
            let mut zip = zip::ZipWriter::new(file);
            zip.start_file("V.fits", zip::write::SimpleFileOptions::default()).unwrap();
            zip.write_all(b"SIMPLE").unwrap();
            zip.finish().unwrap();
        }

        let archive = open_cached(&path, false).unwrap().unwrap();
        assert_eq!(archive.names(), vec!["V.fits"]);
        assert!(path.exists());
    }

    #[test]
    fn test_missing_cache_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_cached(&dir.path().join("nothing.zip"), false).unwrap_err();
        assert!(matches!(err, ScopeError::Io(_)));
    }

    #[test]
    fn test_request_listing_second_page() {
        assert_eq!(remaining_page(100, 250), Some((150, 100)));
        assert_eq!(remaining_page(42, 42), None);
        assert_eq!(remaining_page(0, 0), None);
    }

    #[test]
    fn test_processed_polls_fill_budget() {
        assert_eq!(processed_polls(&telescope_config(60, 15)), 4);
        assert_eq!(processed_polls(&telescope_config(61, 15)), 5);
        assert_eq!(processed_polls(&telescope_config(0, 15)), 0);
        assert_eq!(processed_polls(&telescope_config(3, 0)), 3);
    }
}
