//! Blocking client for the remote face indexing service.
//!
//! Wire format:
//! - `POST {endpoint}/collections/{collection}/faces?external_id=..&max_faces=1`
//!   with the raw image as body, answering
//!   `{"face_records": [{"face": {"face_id": "..", "confidence": 99.9}, ...}]}`
//! - `DELETE {endpoint}/collections/{collection}/faces/{face_id}`; 404 means
//!   the face is already gone.

use facesync_core::{FaceIndexer, RegisteredFace, RemoteError};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::CONTENT_TYPE;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct IndexFacesResponse {
    #[serde(default)]
    face_records: Vec<serde_json::Value>,
}

pub struct HttpFaceIndexer {
    client: Client,
    endpoint: Url,
    token: Option<String>,
}

impl HttpFaceIndexer {
    pub fn new(endpoint: &str, token: Option<String>, timeout: Duration) -> Result<Self, RemoteError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| RemoteError::Network(format!("invalid face service URL {endpoint:?}: {e}")))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            token,
        })
    }

    fn faces_url(&self, collection_id: &str, face_id: Option<&str>) -> Result<Url, RemoteError> {
        let mut url = self.endpoint.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                RemoteError::Network(format!("face service URL cannot be a base: {}", self.endpoint))
            })?;
            segments.pop_if_empty().extend(["collections", collection_id, "faces"]);
            if let Some(id) = face_id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl FaceIndexer for HttpFaceIndexer {
    fn register(
        &self,
        image: &[u8],
        external_id: &str,
        collection_id: &str,
    ) -> Result<RegisteredFace, RemoteError> {
        let url = self.faces_url(collection_id, None)?;
        let request = self
            .client
            .post(url)
            .query(&[
                ("external_id", external_id),
                ("max_faces", "1"),
                ("quality_filter", "AUTO"),
            ])
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec());

        let response = self.authorized(request).send().map_err(map_reqwest)?;
        let body = checked_body(response)?;
        let face = parse_index_response(&body)?;

        tracing::info!(
            external_id,
            collection_id,
            face_id = %face.face_id,
            confidence = ?face.confidence,
            "face registered"
        );
        Ok(face)
    }

    fn deregister(&self, face_id: &str, collection_id: &str) -> Result<(), RemoteError> {
        let url = self.faces_url(collection_id, Some(face_id))?;
        let response = self
            .authorized(self.client.delete(url))
            .send()
            .map_err(map_reqwest)?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(face_id, collection_id, "face already absent from collection");
            return Ok(());
        }
        checked_body(response)?;
        Ok(())
    }
}

fn map_reqwest(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Network(err.to_string())
    }
}

fn checked_body(response: Response) -> Result<String, RemoteError> {
    let status = response.status();
    let body = response.text().map_err(map_reqwest)?;
    if !status.is_success() {
        return Err(RemoteError::Rejected {
            status: status.as_u16(),
            message: body,
        });
    }
    Ok(body)
}

/// Pick the first face record; its raw JSON becomes the provider passthrough.
fn parse_index_response(body: &str) -> Result<RegisteredFace, RemoteError> {
    let parsed: IndexFacesResponse =
        serde_json::from_str(body).map_err(|e| RemoteError::BadResponse(e.to_string()))?;

    let record = parsed
        .face_records
        .into_iter()
        .next()
        .ok_or(RemoteError::NoFaceDetected)?;

    let face_id = record
        .pointer("/face/face_id")
        .and_then(|v| v.as_str())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| RemoteError::BadResponse("face record without face_id".into()))?
        .to_string();

    let confidence = record
        .pointer("/face/confidence")
        .and_then(|v| v.as_f64())
        .map(|v| v as f32);

    Ok(RegisteredFace {
        face_id,
        confidence,
        details: record,
    })
}
