//! Stream load response handling.

use log::{debug, error, info};
use reqwest::Response;
use serde::{Deserialize, Serialize};

use crate::error::LoadError;

/// Most of a response body that is ever read.
pub const MAX_RESPONSE_BYTES: usize = 1024 * 1024;

/// Body of a stream load response as reported by the server.
///
/// Every field is optional on the wire and defaults to zero or empty.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
#[serde(default, rename_all = "PascalCase")]
pub struct RespContent {
    pub txn_id: i64,
    pub label: String,
    pub status: String,
    pub two_phase_commit: String,
    pub existing_job_status: String,
    pub message: String,
    pub number_total_rows: i64,
    pub number_loaded_rows: i64,
    pub number_filtered_rows: i64,
    pub number_unselected_rows: i64,
    pub load_bytes: i64,
    pub load_time_ms: i64,
    pub begin_txn_time_ms: i64,
    pub stream_load_put_time_ms: i64,
    pub read_data_time_ms: i64,
    pub write_data_time_ms: i64,
    pub commit_and_publish_time_ms: i64,
    #[serde(rename = "ErrorURL")]
    pub error_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoadStatus {
    Success,
    Failure,
}

/// Outcome of one stream load as reported by the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadResponse {
    pub status: LoadStatus,
    pub resp: RespContent,
    /// Why the load failed. Only set for [`LoadStatus::Failure`].
    pub error_message: Option<String>,
}

impl LoadResponse {
    pub fn is_success(&self) -> bool {
        self.status == LoadStatus::Success
    }

    /// Turns a failed outcome into [`LoadError::LoadFailed`].
    pub fn into_result(self) -> Result<RespContent, LoadError> {
        match self.status {
            LoadStatus::Success => Ok(self.resp),
            LoadStatus::Failure => Err(LoadError::LoadFailed(Box::new(self))),
        }
    }
}

/// Interprets an HTTP response to a stream load request.
///
/// A non-success HTTP status is a transport-level error. A success status
/// carries a JSON body whose `Status` field decides the outcome.
pub async fn interpret_response(response: Response) -> Result<LoadResponse, LoadError> {
    let status = response.status();
    debug!("Received HTTP response with status code: {}", status.as_u16());

    if !status.is_success() {
        let err = LoadError::http_status(status);
        error!("Stream load failed with HTTP status: {}", status);
        return Err(err);
    }

    let body = read_body(response, MAX_RESPONSE_BYTES).await?;
    let body = String::from_utf8_lossy(&body);
    info!("Stream load response: {}", body);

    parse_response(&body)
}

/// Parses a stream load response body.
pub fn parse_response(body: &str) -> Result<LoadResponse, LoadError> {
    let resp: RespContent = serde_json::from_str(body).map_err(|source| {
        error!("Failed to parse stream load response: {}", source);
        LoadError::Parse {
            source,
            body: body.to_string(),
        }
    })?;

    if resp.status.eq_ignore_ascii_case("success") {
        return Ok(LoadResponse {
            status: LoadStatus::Success,
            resp,
            error_message: None,
        });
    }

    error!("Load failed with status: {}", resp.status);
    let error_message = if resp.message.is_empty() {
        body.to_string()
    } else if resp.error_url.is_empty() {
        format!("load failed, cause: {}", resp.message)
    } else {
        format!(
            "load failed, cause: {}, see details at {}",
            resp.message, resp.error_url
        )
    };

    Ok(LoadResponse {
        status: LoadStatus::Failure,
        resp,
        error_message: Some(error_message),
    })
}

/// Reads at most `limit` bytes of the body, dropping the rest.
async fn read_body(mut response: Response, limit: usize) -> Result<Vec<u8>, LoadError> {
    let mut body = Vec::new();

    while let Some(chunk) = response.chunk().await? {
        let remaining = limit - body.len();
        if chunk.len() >= remaining {
            body.extend_from_slice(&chunk[..remaining]);
            break;
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    async fn response_from(status: usize, body: &str) -> (mockito::ServerGuard, Response) {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/")
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await;
        let response = reqwest::Client::new()
            .get(server.url())
            .send()
            .await
            .unwrap();
        (server, response)
    }

    #[test]
    fn test_parse_success_with_missing_fields() {
        let response = parse_response(r#"{"Status":"Success","NumberLoadedRows":100}"#).unwrap();
        assert!(response.is_success());
        assert_eq!(response.resp.number_loaded_rows, 100);
        assert_eq!(response.resp.load_bytes, 0);
        assert!(response.error_message.is_none());
    }

    #[test]
    fn test_parse_success_is_case_insensitive() {
        let response = parse_response(r#"{"Status":"SUCCESS"}"#).unwrap();
        assert_eq!(response.status, LoadStatus::Success);
    }

    #[test]
    fn test_parse_full_response() {
        let body = r#"{
            "TxnId": 1003,
            "Label": "demo_test_orders_1",
            "Status": "Success",
            "TwoPhaseCommit": "false",
            "Message": "OK",
            "NumberTotalRows": 3,
            "NumberLoadedRows": 2,
            "NumberFilteredRows": 1,
            "NumberUnselectedRows": 0,
            "LoadBytes": 40,
            "LoadTimeMs": 12,
            "BeginTxnTimeMs": 1,
            "StreamLoadPutTimeMs": 2,
            "ReadDataTimeMs": 3,
            "WriteDataTimeMs": 4,
            "CommitAndPublishTimeMs": 5,
            "ErrorURL": "http://be1:8040/api/_load_error_log?file=x"
        }"#;
        let response = parse_response(body).unwrap();
        assert_eq!(response.resp.txn_id, 1003);
        assert_eq!(response.resp.label, "demo_test_orders_1");
        assert_eq!(response.resp.number_filtered_rows, 1);
        assert_eq!(response.resp.commit_and_publish_time_ms, 5);
        assert_eq!(
            response.resp.error_url,
            "http://be1:8040/api/_load_error_log?file=x"
        );
    }

    #[test]
    fn test_parse_failure_with_message_and_url() {
        let response = parse_response(
            r#"{"Status":"Fail","Message":"too many filtered rows","ErrorURL":"http://be1/err"}"#,
        )
        .unwrap();
        assert_eq!(response.status, LoadStatus::Failure);
        assert_eq!(
            response.error_message.as_deref(),
            Some("load failed, cause: too many filtered rows, see details at http://be1/err")
        );
    }

    #[test]
    fn test_parse_failure_without_message_uses_body() {
        let body = r#"{"Status":"Fail"}"#;
        let response = parse_response(body).unwrap();
        assert_eq!(response.error_message.as_deref(), Some(body));
    }

    #[test]
    fn test_parse_malformed_body() {
        let result = parse_response("<html>oops</html>");
        assert!(matches!(result, Err(LoadError::Parse { body, .. }) if body.contains("oops")));
    }

    #[test]
    fn test_into_result() {
        let ok = parse_response(r#"{"Status":"Success"}"#).unwrap();
        assert!(ok.into_result().is_ok());

        let failed = parse_response(r#"{"Status":"Fail","Message":"bad data"}"#).unwrap();
        let err = failed.into_result().unwrap_err();
        assert_eq!(err.to_string(), "load failed, cause: bad data");
    }

    #[tokio::test]
    async fn test_interpret_non_success_status() {
        let (_server, response) = response_from(307, "").await;
        let result = interpret_response(response).await;
        match result {
            Err(LoadError::HttpStatus {
                status,
                status_line,
            }) => {
                assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
                assert_eq!(status_line, "307 Temporary Redirect");
            }
            other => panic!("Expected HttpStatus error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_interpret_success_body() {
        let (_server, response) = response_from(200, r#"{"Status":"Success","LoadBytes":7}"#).await;
        let result = interpret_response(response).await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.resp.load_bytes, 7);
    }

    #[tokio::test]
    async fn test_read_body_is_capped() {
        let large = "x".repeat(MAX_RESPONSE_BYTES + 100);
        let (_server, response) = response_from(200, &large).await;
        let body = read_body(response, MAX_RESPONSE_BYTES).await.unwrap();
        assert_eq!(body.len(), MAX_RESPONSE_BYTES);
    }
}
