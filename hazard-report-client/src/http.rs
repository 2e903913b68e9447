//! [ReportApi] over HTTP
//!

use async_trait::async_trait;
use futures::StreamExt;
use hazard_report_shared::api::{
    CreatedResponse, DeleteUploadQuery, ErrorResponse, ExportRequest, OkResponse, ReportResponse,
    UploadResponse,
};
use hazard_report_shared::attachment::Attachment;
use hazard_report_shared::report::{Report, ReportFields, ReportPatch};
use hazard_report_shared::API_KEY_HEADER;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::api::{Progress, ReportApi};
use crate::error::ClientError;
use crate::upload::LocalFile;

/// Upload bodies are handed over in pieces this big, one progress report each.
const UPLOAD_CHUNK: usize = 16 * 1024;

#[derive(Debug, Clone)]
pub struct ReportsClient {
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

impl ReportsClient {
    /// `base_url` is the server root, eg `http://localhost:4000`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            client: Client::new(),
        }
    }

    /// Sent as `x-api-key` on every request.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Ensure you prepend a `/` to the endpoint
    pub fn make_url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ClientError> {
        let response = self.authed(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(err) => err.error,
            Err(_) if body.is_empty() => status.to_string(),
            Err(_) => body,
        };
        debug!("Request failed with {}: {}", status, message);
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let bytes = self.send(request).await?.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn percent(sent: u64, total: u64) -> u8 {
    match total {
        0 => 100,
        total => (sent.saturating_mul(100) / total).min(100) as u8,
    }
}

#[async_trait]
impl ReportApi for ReportsClient {
    async fn list_reports(&self) -> Result<Vec<Report>, ClientError> {
        self.send_json(self.client.get(self.make_url("/api/reports")))
            .await
    }

    async fn get_report(&self, id: i64) -> Result<Report, ClientError> {
        self.send_json(self.client.get(self.make_url(&format!("/api/reports/{}", id))))
            .await
    }

    async fn create_report(&self, fields: &ReportFields) -> Result<i64, ClientError> {
        let created: CreatedResponse = self
            .send_json(self.client.post(self.make_url("/api/reports")).json(fields))
            .await?;
        Ok(created.id)
    }

    async fn update_report(&self, id: i64, patch: &ReportPatch) -> Result<Report, ClientError> {
        let updated: ReportResponse = self
            .send_json(
                self.client
                    .put(self.make_url(&format!("/api/reports/{}", id)))
                    .json(patch),
            )
            .await?;
        Ok(updated.report)
    }

    async fn delete_report(&self, id: i64) -> Result<(), ClientError> {
        let _: OkResponse = self
            .send_json(
                self.client
                    .delete(self.make_url(&format!("/api/reports/{}", id))),
            )
            .await?;
        Ok(())
    }

    async fn upload_file(
        &self,
        file: &LocalFile,
        progress: Progress,
    ) -> Result<Attachment, ClientError> {
        file.check()?;
        let total = file.size();
        let chunks: Vec<Vec<u8>> = file
            .bytes
            .chunks(UPLOAD_CHUNK)
            .map(|chunk| chunk.to_vec())
            .collect();
        let mut sent = 0u64;
        let on_chunk = progress.clone();
        let stream = futures::stream::iter(chunks).map(move |chunk| {
            sent += chunk.len() as u64;
            on_chunk(percent(sent, total));
            Ok::<_, std::io::Error>(chunk)
        });

        let part = Part::stream_with_length(Body::wrap_stream(stream), total)
            .file_name(file.name.clone())
            .mime_str(&file.content_type)?;
        let form = Form::new().part("file", part);

        let uploaded: UploadResponse = self
            .send_json(self.client.post(self.make_url("/api/upload")).multipart(form))
            .await?;
        progress(100);
        Ok(uploaded.file)
    }

    async fn delete_upload(
        &self,
        stored_name: &str,
        report_id: Option<i64>,
    ) -> Result<(), ClientError> {
        let _: OkResponse = self
            .send_json(
                self.client
                    .delete(self.make_url(&format!("/api/uploads/{}", stored_name)))
                    .query(&DeleteUploadQuery { report_id }),
            )
            .await?;
        Ok(())
    }

    async fn export_pdf(&self, ids: &[i64]) -> Result<Vec<u8>, ClientError> {
        let response = self
            .send(
                self.client
                    .post(self.make_url("/api/export/pdf"))
                    .json(&ExportRequest::for_ids(ids.to_vec())),
            )
            .await?;
        Ok(response.bytes().await?.to_vec())
    }
}
