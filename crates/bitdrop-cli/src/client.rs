//! Thin reqwest client for the bitdropd HTTP API

use anyhow::{Context, Result};
use bitdrop_core::UploadId;
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChunkRequest<'a> {
    file_id: &'a UploadId,
    chunk_index: u64,
    total_chunks: u64,
    encrypted_data: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest<'a> {
    pub file_id: &'a UploadId,
    pub file_hash: &'a str,
    pub email: &'a str,
    pub filename: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_auth_token: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'a str>,
}

/// Finalize response; `message` is only set when the notification failed.
#[derive(Debug, Deserialize)]
pub struct Receipt {
    #[serde(rename = "fileId")]
    pub file_id: UploadId,
    pub filename: String,
    pub timestamp: String,
    #[serde(rename = "MessageId")]
    pub message_id: Option<String>,
    pub link: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadedChunks {
    pub filename: String,
    pub file_hash: String,
    pub total_chunks: usize,
    pub chunks: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    message: String,
}

#[derive(Debug, Clone)]
pub struct BitdropClient {
    http: reqwest::Client,
    base: String,
}

impl BitdropClient {
    pub fn new(base: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    pub async fn upload_chunk(
        &self,
        file_id: &UploadId,
        index: u64,
        total: u64,
        payload: &str,
    ) -> Result<()> {
        let body = ChunkRequest {
            file_id,
            chunk_index: index,
            total_chunks: total,
            encrypted_data: payload,
        };
        let response = self
            .http
            .post(self.url("/upload-chunk"))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("sending chunk {index}/{total}"))?;
        check(response).await?;
        Ok(())
    }

    /// Finalize an upload. A 502 still carries a receipt: the file is stored,
    /// only the notification failed.
    pub async fn complete(&self, request: &CompleteRequest<'_>) -> Result<Receipt> {
        let response = self
            .http
            .post(self.url("/complete-upload"))
            .json(request)
            .send()
            .await
            .context("sending complete-upload")?;
        if response.status() == StatusCode::BAD_GATEWAY {
            return response.json().await.context("decoding receipt");
        }
        check(response)
            .await?
            .json()
            .await
            .context("decoding receipt")
    }

    pub async fn count_chunks(&self, file_id: &UploadId) -> Result<usize> {
        let response = self
            .http
            .get(self.url(&format!("/count-chunks/{file_id}")))
            .send()
            .await?;
        check(response)
            .await?
            .json()
            .await
            .context("decoding chunk count")
    }

    pub async fn download_chunks(&self, file_id: &UploadId) -> Result<DownloadedChunks> {
        let response = self
            .http
            .get(self.url(&format!("/download/{file_id}")))
            .send()
            .await?;
        check(response)
            .await?
            .json()
            .await
            .context("decoding chunk set")
    }

    pub async fn delete(&self, file_id: &UploadId, content_hash: &str) -> Result<String> {
        let response = self
            .http
            .delete(self.url(&format!("/download/{file_id}/{content_hash}")))
            .send()
            .await?;
        let body: MessageBody = check(response).await?.json().await?;
        Ok(body.message)
    }
}

/// Turn a non-success status into an error carrying the server's message.
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<MessageBody>(&text)
        .map(|body| body.message)
        .unwrap_or(text);
    anyhow::bail!("server returned {status}: {message}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Path,
        http::StatusCode as AxumStatus,
        routing::{delete, get},
        Json, Router,
    };
    use serde_json::json;

    async fn serve(app: Router) -> BitdropClient {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        BitdropClient::new(&format!("http://{addr}/"))
    }

    #[tokio::test]
    async fn test_count_and_download() {
        let app = Router::new()
            .route("/count-chunks/{id}", get(|| async { Json(3) }))
            .route(
                "/download/{id}",
                get(|| async {
                    Json(json!({
                        "filename": "a.txt",
                        "fileHash": "abcd",
                        "totalChunks": 2,
                        "chunks": ["x", "y"],
                    }))
                }),
            );
        let client = serve(app).await;
        let id = UploadId::new_v4();

        assert_eq!(client.count_chunks(&id).await.unwrap(), 3);
        let set = client.download_chunks(&id).await.unwrap();
        assert_eq!(set.filename, "a.txt");
        assert_eq!(set.total_chunks, 2);
        assert_eq!(set.chunks, vec!["x", "y"]);
    }

    #[tokio::test]
    async fn test_error_message_is_surfaced() {
        let app = Router::new().route(
            "/download/{id}/{hash}",
            delete(|Path((id, hash)): Path<(String, String)>| async move {
                (
                    AxumStatus::NOT_FOUND,
                    Json(json!({ "message": format!("No file found with ID {id} and hash {hash}") })),
                )
            }),
        );
        let client = serve(app).await;
        let err = client
            .delete(&UploadId::nil(), "beef")
            .await
            .unwrap_err()
            .to_string();
        assert!(err.contains("404"));
        assert!(err.contains("and hash beef"));
    }

    #[tokio::test]
    async fn test_delivery_failure_still_returns_receipt() {
        let id = UploadId::new_v4();
        let app = Router::new().route(
            "/complete-upload",
            axum::routing::post(move || async move {
                (
                    AxumStatus::BAD_GATEWAY,
                    Json(json!({
                        "fileId": id,
                        "filename": "a.txt",
                        "timestamp": "2024-05-01T12:00:00",
                        "MessageId": null,
                        "link": format!("/verify?id={id}"),
                        "message": "Failed to send email: relay down",
                    })),
                )
            }),
        );
        let client = serve(app).await;
        let receipt = client
            .complete(&CompleteRequest {
                file_id: &id,
                file_hash: "abcd",
                email: "b@example.com",
                filename: "a.txt",
                email_auth_token: Some("t"),
                message: None,
            })
            .await
            .unwrap();
        assert_eq!(receipt.file_id, id);
        assert!(receipt.message_id.is_none());
        assert_eq!(
            receipt.message.as_deref(),
            Some("Failed to send email: relay down")
        );
    }
}
