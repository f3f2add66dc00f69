//! Request-manager queries

use super::{scrape, Telescope};
use crate::error::{Result, ScopeError};
use crate::types::{loose_u64, Folder, RequestSort, RequestStatus, UserRequest};
use serde_json::{json, Value};

/// First page size of the request listing
const FIRST_BATCH: u64 = 100;

fn requests_in(data: &Value) -> Result<Vec<UserRequest>> {
    match data.get("requests") {
        Some(list) => Ok(serde_json::from_value(list.clone())?),
        None => Ok(Vec::new()),
    }
}

fn total_in(data: &Value) -> Result<u64> {
    data.get("totalRequests")
        .and_then(loose_u64)
        .ok_or_else(|| ScopeError::Api("request listing without totalRequests".to_string()))
}

/// Limit and start row of the follow-up listing call, when the first page
/// fell short of the total
pub(super) fn remaining_page(fetched: u64, total: u64) -> Option<(u64, u64)> {
    (fetched < total).then(|| (total - fetched, fetched))
}

impl Telescope {
    /// All requests in a folder (Inbox = 1), sorted by `sort`
    pub async fn get_user_requests(&self, folder: u64, sort: RequestSort) -> Result<Vec<UserRequest>> {
        let mut params = json!({
            "limit": FIRST_BATCH,
            "sort": sort.as_str(),
            "folderid": folder,
        });

        let first = self.rm_api("1-get-list-own", Some(&params)).await?;
        let total = total_in(&first.data)?;
        let mut requests = requests_in(&first.data)?;
        tracing::debug!("Fetched {} of {} requests", requests.len(), total);

        if let Some((limit, start_after)) = remaining_page(requests.len() as u64, total) {
            params["limit"] = json!(limit);
            params["startAfterRow"] = json!(start_after);
            let rest = self.rm_api("1-get-list-own", Some(&params)).await?;
            requests.extend(requests_in(&rest.data)?);
        }

        Ok(requests)
    }

    /// All request-manager folders of the user
    pub async fn get_user_folders(&self) -> Result<Vec<Folder>> {
        let resp = self.rm_api("0-get-my-folders", None).await?;
        Ok(serde_json::from_value(resp.data)?)
    }

    /// Job id of a request, read from the request page
    pub async fn get_jid_for_request(&self, rid: u64) -> Result<Option<u64>> {
        let html = self.page(&format!("v4request-view.php?rid={rid}")).await?;
        Ok(scrape::parse_info_jid(&html))
    }

    /// Job id of a listed request; `None` unless the request is complete
    pub async fn get_jid_for_user_request(&self, req: &UserRequest) -> Result<Option<u64>> {
        if req.status() != RequestStatus::Complete {
            return Ok(None);
        }
        self.get_jid_for_request(req.id).await
    }
}
