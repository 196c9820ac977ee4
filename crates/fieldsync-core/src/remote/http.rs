//! HTTP implementation of the remote API.
//!
//! Every route lives under `{base}/v1`. Create-style requests send the local
//! id as an `Idempotency-Key` header so a retried request that already
//! reached the server is not applied twice.

use reqwest::{Method, RequestBuilder};
use serde::Deserialize;

use crate::db::MediaBlob;
use crate::error::{Error, Result};
use crate::models::{
    CaptureData, CreateFinding, CreateNote, CreateUnit, DeleteFinding, LocalId, SaveUnitCheck,
    SaveUnitGrade, UpdateFindingField, UpdateUnitField, UploadCapture, UploadNotePhoto,
};
use crate::util::{error_excerpt, normalize_base_url};

use super::{RemoteAck, RemoteApi, RemoteError, RemoteResult};

const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// reqwest client for the inspection backend.
#[derive(Clone)]
pub struct HttpRemoteApi {
    base_url: String,
    access_token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpRemoteApi {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpRemoteApi")
            .field("base_url", &self.base_url)
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl HttpRemoteApi {
    /// Builds a client for an explicit API base URL.
    pub fn new(base_url: impl Into<String>, access_token: Option<String>) -> Result<Self> {
        let base_url: String = base_url.into();
        let base_url = normalize_base_url(&base_url).ok_or_else(|| {
            Error::Config("API base URL must be an http:// or https:// URL".to_string())
        })?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|error| Error::Config(format!("Failed to construct HTTP client: {error}")))?;
        Ok(Self {
            base_url,
            access_token,
            client,
        })
    }

    /// Returns the base URL this client was configured with.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, route: &str) -> RequestBuilder {
        let request = self
            .client
            .request(method, format!("{}/v1{}", self.base_url, route))
            .header("Accept", "application/json");
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send_json(
        &self,
        method: Method,
        route: &str,
        idempotency_key: Option<LocalId>,
        body: &serde_json::Value,
    ) -> RemoteResult<RemoteAck> {
        let mut request = self.request(method, route).json(body);
        if let Some(key) = idempotency_key {
            request = request.header(IDEMPOTENCY_HEADER, key.as_str());
        }
        send(request).await
    }

    async fn send_media(
        &self,
        route: &str,
        idempotency_key: LocalId,
        capture: &CaptureData,
        media: &MediaBlob,
    ) -> RemoteResult<RemoteAck> {
        let mut query = format!("filename={}", urlencoding::encode(&capture.filename));
        if let Some(caption) = &capture.caption {
            query.push_str("&caption=");
            query.push_str(&urlencoding::encode(caption));
        }
        let request = self
            .request(Method::POST, &format!("{route}?{query}"))
            .header(reqwest::header::CONTENT_TYPE, media.mime_type.as_str())
            .header(IDEMPOTENCY_HEADER, idempotency_key.as_str())
            .body(media.bytes.clone());
        send(request).await
    }
}

impl RemoteApi for HttpRemoteApi {
    async fn create_finding(&self, request: &CreateFinding) -> RemoteResult<RemoteAck> {
        let route = format!(
            "/inspections/{}/findings",
            urlencoding::encode(&request.inspection_id)
        );
        let body = serde_json::json!(request.finding);
        let ack = self
            .send_json(Method::POST, &route, Some(request.local_id), &body)
            .await?;
        require_remote_id(ack, "finding")
    }

    async fn update_finding_field(
        &self,
        request: &UpdateFindingField,
    ) -> RemoteResult<RemoteAck> {
        let route = format!("/findings/{}", urlencoding::encode(&request.finding_id));
        let body = field_patch(&request.field, &request.value);
        self.send_json(Method::PATCH, &route, None, &body).await?;
        Ok(RemoteAck::empty())
    }

    async fn delete_finding(&self, request: &DeleteFinding) -> RemoteResult<RemoteAck> {
        let route = format!("/findings/{}", urlencoding::encode(&request.finding_id));
        match send(self.request(Method::DELETE, &route)).await {
            // Already gone remotely is the outcome we wanted
            Err(RemoteError::Rejected { status: 404, .. }) | Ok(_) => Ok(RemoteAck::empty()),
            Err(error) => Err(error),
        }
    }

    async fn upload_capture(
        &self,
        request: &UploadCapture,
        media: &MediaBlob,
    ) -> RemoteResult<RemoteAck> {
        let route = format!(
            "/findings/{}/captures",
            urlencoding::encode(&request.finding_id)
        );
        let ack = self
            .send_media(&route, request.local_id, &request.capture, media)
            .await?;
        require_remote_id(ack, "capture")
    }

    async fn create_unit(&self, request: &CreateUnit) -> RemoteResult<RemoteAck> {
        let route = format!("/projects/{}/units", urlencoding::encode(&request.project_id));
        let body = serde_json::json!(request.unit);
        let ack = self
            .send_json(Method::POST, &route, Some(request.local_id), &body)
            .await?;
        require_remote_id(ack, "unit")
    }

    async fn update_unit_field(&self, request: &UpdateUnitField) -> RemoteResult<RemoteAck> {
        let route = format!("/units/{}", urlencoding::encode(&request.unit_id));
        let body = field_patch(&request.field, &request.value);
        self.send_json(Method::PATCH, &route, None, &body).await?;
        Ok(RemoteAck::empty())
    }

    async fn save_unit_check(&self, request: &SaveUnitCheck) -> RemoteResult<RemoteAck> {
        let route = format!(
            "/units/{}/checks/{}",
            urlencoding::encode(&request.unit_id),
            urlencoding::encode(&request.check.checklist_item_id)
        );
        let body = serde_json::json!({
            "answer": request.check.answer,
            "notes": request.check.notes,
        });
        self.send_json(Method::PUT, &route, Some(request.local_id), &body)
            .await
    }

    async fn save_unit_grade(&self, request: &SaveUnitGrade) -> RemoteResult<RemoteAck> {
        let route = format!(
            "/units/{}/grades/{}",
            urlencoding::encode(&request.unit_id),
            urlencoding::encode(&request.grade.category)
        );
        let body = serde_json::json!({ "grade": request.grade.grade });
        self.send_json(Method::PUT, &route, Some(request.local_id), &body)
            .await
    }

    async fn create_note(&self, request: &CreateNote) -> RemoteResult<RemoteAck> {
        let body = serde_json::json!({
            "subject_id": request.subject_id,
            "body": request.note.body,
        });
        let ack = self
            .send_json(Method::POST, "/notes", Some(request.local_id), &body)
            .await?;
        require_remote_id(ack, "note")
    }

    async fn upload_note_photo(
        &self,
        request: &UploadNotePhoto,
        media: &MediaBlob,
    ) -> RemoteResult<RemoteAck> {
        let route = format!("/notes/{}/photos", urlencoding::encode(&request.note_id));
        let ack = self
            .send_media(&route, request.local_id, &request.capture, media)
            .await?;
        require_remote_id(ack, "note photo")
    }
}

#[derive(Debug, Default, Deserialize)]
struct CreatedResponse {
    #[serde(default)]
    id: Option<serde_json::Value>,
}

async fn send(request: RequestBuilder) -> RemoteResult<RemoteAck> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(RemoteError::from_status(
            status.as_u16(),
            error_excerpt(&body),
        ));
    }
    if body.trim().is_empty() {
        return Ok(RemoteAck::empty());
    }
    let payload: CreatedResponse = serde_json::from_str(&body).map_err(|error| {
        RemoteError::InvalidResponse(format!("Failed to parse response body: {error}"))
    })?;
    // Servers disagree on numeric versus string ids
    let remote_id = payload.id.and_then(|id| match id {
        serde_json::Value::String(value) if !value.trim().is_empty() => Some(value),
        serde_json::Value::Number(value) => Some(value.to_string()),
        _ => None,
    });
    Ok(RemoteAck { remote_id })
}

fn field_patch(field: &str, value: &serde_json::Value) -> serde_json::Value {
    let mut body = serde_json::Map::new();
    body.insert(field.to_string(), value.clone());
    serde_json::Value::Object(body)
}

fn require_remote_id(ack: RemoteAck, what: &str) -> RemoteResult<RemoteAck> {
    if ack.remote_id.is_some() {
        Ok(ack)
    } else {
        Err(RemoteError::InvalidResponse(format!(
            "Created {what} response did not include an id"
        )))
    }
}
