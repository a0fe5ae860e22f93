//! External boundary: the optional cloud probe that uploads a package to a
//! hosted spreadsheet service and exercises a throwaway workbook session to
//! see whether it opens cleanly. Four HTTP steps, synchronous, never-raising
//! (failures come back as a structured result, never as a propagated error).

use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

const GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";
const ERROR_EXCERPT_BYTES: usize = 500;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Bearer-token credentials supplied by the caller; held only for the
/// duration of one probe call.
#[derive(Debug, Clone)]
pub struct CloudProbeCredentials {
    pub token: String,
}

/// Outcome of a cloud-probe run. Never an `Err` variant of a `Result`: a
/// failed HTTP step is reported structurally, not raised.
#[derive(Debug, Clone, Serialize)]
pub struct CloudProbeResult {
    pub success: bool,
    pub status_code: u16,
    /// Which step failed, or `"complete"` on success.
    pub step: &'static str,
    pub worksheets: Vec<String>,
    pub error: Option<String>,
    pub raw: Value,
}

impl CloudProbeResult {
    fn failure(step: &'static str, status_code: u16, error: impl Into<String>, raw: Value) -> Self {
        Self {
            success: false,
            status_code,
            step,
            worksheets: Vec::new(),
            error: Some(truncate(&error.into())),
            raw,
        }
    }
}

fn truncate(s: &str) -> String {
    if s.len() <= ERROR_EXCERPT_BYTES {
        s.to_string()
    } else {
        s.chars().take(ERROR_EXCERPT_BYTES).collect()
    }
}

fn client() -> reqwest::blocking::Client {
    reqwest::blocking::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .expect("reqwest client with static TLS config builds")
}

/// Upload `local_path` to the caller's OneDrive root under `remote_name`,
/// then run the create-session / list-worksheets / close-session sequence
/// against it.
pub fn probe_upload_and_test(
    creds: &CloudProbeCredentials,
    local_path: impl AsRef<Path>,
    remote_name: &str,
) -> CloudProbeResult {
    let local_path = local_path.as_ref();
    let bytes = match std::fs::read(local_path) {
        Ok(b) => b,
        Err(e) => return CloudProbeResult::failure("upload", 0, e.to_string(), Value::Null),
    };

    let url = format!("{GRAPH_BASE}/me/drive/root:/{remote_name}:/content");
    let response = client()
        .put(&url)
        .bearer_auth(&creds.token)
        .header(
            "Content-Type",
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        )
        .body(bytes)
        .send();

    let (status, body) = match response {
        Ok(resp) => {
            let status = resp.status().as_u16();
            let body = resp.json::<Value>().unwrap_or(Value::Null);
            (status, body)
        }
        Err(e) => return CloudProbeResult::failure("upload", 0, e.to_string(), Value::Null),
    };

    if status >= 400 {
        return CloudProbeResult::failure("upload", status, body.to_string(), body);
    }

    let item_id = body.get("id").and_then(Value::as_str);
    let drive_id = body
        .get("parentReference")
        .and_then(|v| v.get("driveId"))
        .and_then(Value::as_str);

    let (Some(item_id), Some(drive_id)) = (item_id, drive_id) else {
        return CloudProbeResult::failure(
            "upload",
            status,
            "Upload succeeded but driveId/itemId missing in response.",
            body,
        );
    };

    let base = format!("{GRAPH_BASE}/drives/{drive_id}/items/{item_id}/workbook");
    run_probe(creds, &base)
}

/// Probe a file already uploaded, identified by `drive_id` + `item_id`.
pub fn probe_by_item(creds: &CloudProbeCredentials, drive_id: &str, item_id: &str) -> CloudProbeResult {
    let base = format!("{GRAPH_BASE}/drives/{drive_id}/items/{item_id}/workbook");
    run_probe(creds, &base)
}

/// The three-step session sequence shared by every probe entry point:
/// create a non-persistent session, list worksheets, close the session.
fn run_probe(creds: &CloudProbeCredentials, workbook_base_url: &str) -> CloudProbeResult {
    let http = client();

    let create_url = format!("{workbook_base_url}/createSession");
    let session_response = http
        .post(&create_url)
        .bearer_auth(&creds.token)
        .json(&serde_json::json!({ "persistChanges": false }))
        .send();

    let (status, session_body) = match session_response {
        Ok(resp) => {
            let status = resp.status().as_u16();
            let body = resp.json::<Value>().unwrap_or(Value::Null);
            (status, body)
        }
        Err(e) => return CloudProbeResult::failure("createSession", 0, e.to_string(), Value::Null),
    };

    if status >= 400 {
        return CloudProbeResult::failure("createSession", status, session_body.to_string(), session_body);
    }

    let Some(session_id) = session_body.get("id").and_then(Value::as_str) else {
        return CloudProbeResult::failure("createSession", status, "No session id in response.", session_body);
    };
    let session_id = session_id.to_string();

    let list_url = format!("{workbook_base_url}/worksheets?$select=name");
    let list_response = http
        .get(&list_url)
        .bearer_auth(&creds.token)
        .header("workbook-session-id", &session_id)
        .send();

    let (status, list_body) = match list_response {
        Ok(resp) => {
            let status = resp.status().as_u16();
            let body = resp.json::<Value>().unwrap_or(Value::Null);
            (status, body)
        }
        Err(e) => return CloudProbeResult::failure("listWorksheets", 0, e.to_string(), Value::Null),
    };

    if status >= 400 {
        return CloudProbeResult::failure("listWorksheets", status, list_body.to_string(), list_body);
    }

    let worksheets: Vec<String> = list_body
        .get("value")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| row.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    // Best-effort close; a failure here doesn't change the probe's verdict.
    let close_url = format!("{workbook_base_url}/sessions/{session_id}");
    let _ = http
        .delete(&close_url)
        .bearer_auth(&creds.token)
        .header("workbook-session-id", &session_id)
        .send();

    CloudProbeResult {
        success: true,
        status_code: 200,
        step: "complete",
        worksheets: worksheets.clone(),
        error: None,
        raw: serde_json::json!({ "worksheet_count": worksheets.len() }),
    }
}
