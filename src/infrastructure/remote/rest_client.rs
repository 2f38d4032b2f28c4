use crate::application::ports::remote_data_api::{
    ObjectRef, RemoteDataApi, RemoteError, RemoteRecord,
};
use crate::domain::value_objects::offline::{EntityPayload, EntityTable, RecordKey};
use crate::shared::config::RemoteConfig;
use crate::shared::error::AppError;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::Value;
use std::time::Duration;

const MAX_ERROR_BODY: usize = 500;

/// Remote Data API over a PostgREST row endpoint plus a storage endpoint.
pub struct RestDataClient {
    client: reqwest::Client,
    base_url: String,
}

impl RestDataClient {
    pub fn new(config: &RemoteConfig) -> Result<Self, AppError> {
        let mut headers = HeaderMap::new();
        headers.insert("apikey", header_value(&config.api_key)?);
        let token = config.access_token.as_deref().unwrap_or(&config.api_key);
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {token}"))?);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| AppError::ConfigurationError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn rows_url(&self, table: &EntityTable) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    pub fn object_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, bucket, path)
    }

    pub fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, bucket, path
        )
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
        operation: &str,
    ) -> Result<String, RemoteError> {
        let response = request
            .send()
            .await
            .map_err(|e| transport_error(e, url, operation))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(e, url, operation))?;

        if (200..300).contains(&status) {
            Ok(body)
        } else {
            tracing::debug!(
                target: "offline::remote",
                status,
                url,
                operation,
                "remote store returned an error status"
            );
            Err(classify_status(status, &body))
        }
    }

    async fn single_row(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
        operation: &str,
    ) -> Result<Option<RemoteRecord>, RemoteError> {
        let body = self.send(request, url, operation).await?;
        if body.trim().is_empty() {
            return Ok(None);
        }

        let value: Value = serde_json::from_str(&body)
            .map_err(|e| RemoteError::InvalidResponse(format!("{operation} {url}: {e}")))?;
        let row = match value {
            Value::Array(mut rows) => {
                if rows.is_empty() {
                    return Ok(None);
                }
                rows.swap_remove(0)
            }
            other => other,
        };
        Ok(Some(RemoteRecord::from_value(row)))
    }
}

#[async_trait]
impl RemoteDataApi for RestDataClient {
    async fn create_entity(
        &self,
        table: &EntityTable,
        payload: &EntityPayload,
    ) -> Result<RemoteRecord, RemoteError> {
        let url = self.rows_url(table);
        let request = self.client.post(&url);
        // A keyed insert is an upsert, so replaying a create whose response was lost
        // merges into the row that already landed.
        let request = if payload.get("id").is_some() {
            request
                .query(&[("on_conflict", "id")])
                .header("Prefer", "resolution=merge-duplicates,return=representation")
        } else {
            request.header("Prefer", "return=representation")
        }
        .json(payload.as_map());

        let record = self.single_row(request, &url, "create").await?;
        Ok(record.unwrap_or_else(|| RemoteRecord::from_value(payload.clone().into_value())))
    }

    async fn update_entity(
        &self,
        table: &EntityTable,
        id: &RecordKey,
        payload: &EntityPayload,
    ) -> Result<RemoteRecord, RemoteError> {
        let url = self.rows_url(table);
        let request = self
            .client
            .patch(&url)
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(payload.as_map());

        self.single_row(request, &url, "update")
            .await?
            .ok_or_else(|| RemoteError::Rejected {
                status: 404,
                message: format!("No {table} row with id {id}"),
            })
    }

    async fn delete_entity(&self, table: &EntityTable, id: &RecordKey) -> Result<(), RemoteError> {
        let url = self.rows_url(table);
        let request = self
            .client
            .delete(&url)
            .query(&[("id", format!("eq.{id}"))]);

        self.send(request, &url, "delete").await?;
        Ok(())
    }

    async fn upload_binary(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<ObjectRef, RemoteError> {
        let url = self.object_url(bucket, path);
        let request = self
            .client
            .post(&url)
            .header(
                CONTENT_TYPE,
                content_type.unwrap_or("application/octet-stream"),
            )
            .header("x-upsert", "true")
            .body(bytes);

        self.send(request, &url, "upload").await?;
        Ok(ObjectRef {
            bucket: bucket.to_string(),
            path: path.to_string(),
        })
    }

    async fn public_reference(&self, bucket: &str, path: &str) -> Result<String, RemoteError> {
        Ok(self.public_url(bucket, path))
    }
}

/// 408 and 429 are worth retrying; any other 4xx is a refusal of the request itself.
pub fn classify_status(status: u16, body: &str) -> RemoteError {
    let message = error_message(body);
    match status {
        408 | 429 => RemoteError::Unreachable(format!("HTTP {status}: {message}")),
        400..=499 => RemoteError::Rejected { status, message },
        _ => RemoteError::Unreachable(format!("HTTP {status}: {message}")),
    }
}

fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for field in ["message", "error_description", "error", "msg"] {
            if let Some(Value::String(message)) = value.get(field) {
                return message.clone();
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated)", &trimmed[..end])
    } else {
        trimmed.to_string()
    }
}

fn transport_error(err: reqwest::Error, url: &str, operation: &str) -> RemoteError {
    let reason = if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connection error"
    } else if err.is_decode() {
        "decode error"
    } else {
        "request error"
    };
    RemoteError::Unreachable(format!("Failed to {operation} {url}: {reason}: {err}"))
}

fn header_value(value: &str) -> Result<HeaderValue, AppError> {
    HeaderValue::from_str(value).map_err(|_| {
        AppError::ConfigurationError("Remote credential contains invalid characters".into())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn config(base_url: &str) -> RemoteConfig {
        RemoteConfig {
            base_url: base_url.to_string(),
            api_key: "anon-key".to_string(),
            access_token: Some("user-token".to_string()),
            request_timeout_secs: 5,
            reports_table: "reports".to_string(),
        }
    }

    /// Serves one canned response and returns the raw request it received.
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|line| {
                            let lower = line.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if raw.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
            }

            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&raw).to_string()
        });

        (format!("http://{addr}"), handle)
    }

    #[test]
    fn test_urls_follow_rest_and_storage_layout() {
        let client = RestDataClient::new(&config("https://demo.supabase.co/")).unwrap();
        assert_eq!(
            client.rows_url(&EntityTable::reports()),
            "https://demo.supabase.co/rest/v1/reports"
        );
        assert_eq!(
            client.object_url("report-photos", "r1/1700000000000.jpg"),
            "https://demo.supabase.co/storage/v1/object/report-photos/r1/1700000000000.jpg"
        );
        assert_eq!(
            client.public_url("report-photos", "r1/1700000000000.jpg"),
            "https://demo.supabase.co/storage/v1/object/public/report-photos/r1/1700000000000.jpg"
        );
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            classify_status(400, r#"{"message":"null value in column \"train_number\""}"#),
            RemoteError::Rejected { status: 400, ref message } if message.contains("train_number")
        ));
        assert!(matches!(classify_status(409, ""), RemoteError::Rejected { status: 409, .. }));
        assert!(matches!(classify_status(408, ""), RemoteError::Unreachable(_)));
        assert!(matches!(classify_status(429, ""), RemoteError::Unreachable(_)));
        assert!(matches!(classify_status(503, "busy"), RemoteError::Unreachable(_)));
    }

    #[tokio::test]
    async fn test_create_posts_payload_with_auth_headers() {
        let (base, server) =
            serve_once("201 Created", r#"[{"id":"r1","train_number":"A100"}]"#).await;
        let client = RestDataClient::new(&config(&base)).unwrap();

        let record = client
            .create_entity(
                &EntityTable::reports(),
                &EntityPayload::new(json!({"id": "r1", "train_number": "A100"})).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(record.id, Some(RecordKey::parse("r1").unwrap()));

        let request = server.await.unwrap().to_ascii_lowercase();
        assert!(request.starts_with("post /rest/v1/reports?on_conflict=id http/1.1"));
        assert!(request.contains("apikey: anon-key"));
        assert!(request.contains("authorization: bearer user-token"));
        assert!(request.contains("prefer: resolution=merge-duplicates,return=representation"));
        assert!(request.contains(r#""train_number":"a100""#));
    }

    #[tokio::test]
    async fn test_create_without_key_is_plain_insert() {
        let (base, server) = serve_once("201 Created", r#"[{"id":"42","report_id":"r1"}]"#).await;
        let client = RestDataClient::new(&config(&base)).unwrap();

        let record = client
            .create_entity(
                &EntityTable::new("photos".to_string()).unwrap(),
                &EntityPayload::new(json!({"report_id": "r1"})).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(record.id, Some(RecordKey::parse("42").unwrap()));

        let request = server.await.unwrap().to_ascii_lowercase();
        assert!(request.starts_with("post /rest/v1/photos http/1.1"));
        assert!(request.contains("prefer: return=representation"));
        assert!(!request.contains("merge-duplicates"));
    }

    #[tokio::test]
    async fn test_upload_overwrites_existing_object() {
        let (base, server) = serve_once("200 OK", r#"{"Key":"report-photos/r1/1.jpg"}"#).await;
        let client = RestDataClient::new(&config(&base)).unwrap();

        let object = client
            .upload_binary("report-photos", "r1/1.jpg", vec![0xFF, 0xD8], Some("image/jpeg"))
            .await
            .unwrap();
        assert_eq!(object.path, "r1/1.jpg");

        let request = server.await.unwrap().to_ascii_lowercase();
        assert!(request.starts_with("post /storage/v1/object/report-photos/r1/1.jpg http/1.1"));
        assert!(request.contains("x-upsert: true"));
        assert!(request.contains("content-type: image/jpeg"));
    }

    #[tokio::test]
    async fn test_update_matching_no_rows_is_rejected() {
        let (base, server) = serve_once("200 OK", "[]").await;
        let client = RestDataClient::new(&config(&base)).unwrap();

        let err = client
            .update_entity(
                &EntityTable::reports(),
                &RecordKey::parse("gone").unwrap(),
                &EntityPayload::new(json!({"status": "Draft"})).unwrap(),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RemoteError::Rejected {
                status: 404,
                message: "No reports row with id gone".to_string()
            }
        );

        let request = server.await.unwrap();
        assert!(request.starts_with("PATCH /rest/v1/reports?id=eq.gone HTTP/1.1"));
    }

    #[tokio::test]
    async fn test_server_error_is_unreachable() {
        let (base, server) = serve_once("502 Bad Gateway", r#"{"message":"upstream"}"#).await;
        let client = RestDataClient::new(&config(&base)).unwrap();

        let err = client
            .delete_entity(&EntityTable::reports(), &RecordKey::parse("r1").unwrap())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        server.await.unwrap();
    }
}
