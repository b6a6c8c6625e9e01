use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::{ImageId, ImageSize, ObservationId, UserRef};
use crate::error::BackupError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservationPage {
    pub ids: Vec<ObservationId>,
    pub number_of_pages: u32,
}

#[derive(Debug, Clone)]
pub struct ImageDownload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

pub trait CatalogClient: Send + Sync {
    fn list_page(&self, user: &UserRef, page: u32) -> Result<ObservationPage, BackupError>;
    /// Raw `detail=high` response for one or more observations.
    fn fetch_details(&self, ids: &[ObservationId]) -> Result<Value, BackupError>;
    fn fetch_image(&self, id: ImageId, size: ImageSize) -> Result<ImageDownload, BackupError>;
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    results: Vec<ObservationId>,
    #[serde(default = "single_page")]
    number_of_pages: u32,
}

fn single_page() -> u32 {
    1
}

#[derive(Clone)]
pub struct CatalogHttpClient {
    client: Client,
    base_url: String,
}

impl CatalogHttpClient {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, BackupError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("mo-backup/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| BackupError::CatalogHttp(err.to_string()))?,
        );
        let mut builder = Client::builder().default_headers(headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|err| BackupError::CatalogHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn observations_url(&self) -> String {
        format!("{}/api/observations", self.base_url)
    }

    pub fn detail_url(&self, ids: &[ObservationId]) -> String {
        format!(
            "{}?format=json&detail=high&id={}",
            self.observations_url(),
            join_ids(ids)
        )
    }

    pub fn image_url(&self, id: ImageId, size: ImageSize) -> String {
        format!("{}/images/{}/{}.jpg", self.base_url, size, id)
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, BackupError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "catalog request failed".to_string());
        Err(BackupError::CatalogStatus { status, message })
    }
}

impl CatalogClient for CatalogHttpClient {
    fn list_page(&self, user: &UserRef, page: u32) -> Result<ObservationPage, BackupError> {
        let mut request = self
            .client
            .get(self.observations_url())
            .query(&[("format", "json"), ("user", user.as_str())]);
        if page > 1 {
            request = request.query(&[("page", page)]);
        }
        let response = request
            .send()
            .map_err(|err| BackupError::CatalogHttp(err.to_string()))?;
        let response = Self::handle_status(response)?;
        let body: ListResponse = response
            .json()
            .map_err(|err| BackupError::MalformedResponse(err.to_string()))?;
        Ok(ObservationPage {
            ids: body.results,
            number_of_pages: body.number_of_pages,
        })
    }

    fn fetch_details(&self, ids: &[ObservationId]) -> Result<Value, BackupError> {
        let url = self.detail_url(ids);
        debug!(%url, "fetching observation detail");
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| BackupError::CatalogHttp(err.to_string()))?;
        let response = Self::handle_status(response)?;
        response
            .json()
            .map_err(|err| BackupError::MalformedResponse(err.to_string()))
    }

    fn fetch_image(&self, id: ImageId, size: ImageSize) -> Result<ImageDownload, BackupError> {
        let url = self.image_url(id, size);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| BackupError::CatalogHttp(err.to_string()))?;
        let response = Self::handle_status(response)?;
        let bytes = response
            .bytes()
            .map_err(|err| BackupError::CatalogHttp(err.to_string()))?;
        Ok(ImageDownload {
            filename: image_filename(id),
            bytes: bytes.to_vec(),
        })
    }
}

/// Every observation id of `user`, walking pages `2..=number_of_pages` after
/// the first. Only a failure on page 1 is an error; a later page that fails
/// ends the walk with whatever was collected.
pub fn list_observation_ids(
    client: &dyn CatalogClient,
    user: &UserRef,
) -> Result<Vec<ObservationId>, BackupError> {
    let first = client.list_page(user, 1).map_err(|err| match err {
        BackupError::CatalogStatus { status, .. } => BackupError::UserNotFound {
            user: user.to_string(),
            status,
        },
        other => other,
    })?;

    let number_of_pages = first.number_of_pages;
    let mut ids = first.ids;
    debug!(user = %user, number_of_pages, "listed first page");

    for page in 2..=number_of_pages {
        match client.list_page(user, page) {
            Ok(next) => ids.extend(next.ids),
            Err(err) => {
                warn!(user = %user, page, error = %err, "stopping pagination early");
                break;
            }
        }
    }
    Ok(ids)
}

/// Fetches details in requests of at most `batch_size` ids and merges the
/// `results` arrays. A batch that fails is logged and left out.
pub fn fetch_details_batched(
    client: &dyn CatalogClient,
    ids: &[ObservationId],
    batch_size: usize,
) -> Vec<Value> {
    fetch_details_batched_until(client, ids, batch_size, &AtomicBool::new(false))
}

/// Same as [`fetch_details_batched`], but no further batch is requested once
/// `stop` is set.
pub fn fetch_details_batched_until(
    client: &dyn CatalogClient,
    ids: &[ObservationId],
    batch_size: usize,
    stop: &AtomicBool,
) -> Vec<Value> {
    let mut details = Vec::with_capacity(ids.len());
    for batch in ids.chunks(batch_size.max(1)) {
        if stop.load(Ordering::SeqCst) {
            debug!(ids = %join_ids(batch), "stop requested; remaining batches skipped");
            break;
        }
        let response = match client.fetch_details(batch) {
            Ok(response) => response,
            Err(err) => {
                warn!(ids = %join_ids(batch), error = %err, "could not fetch batch");
                continue;
            }
        };
        match response.get("results").and_then(|v| v.as_array()) {
            Some(results) => details.extend(results.iter().cloned()),
            None => warn!(ids = %join_ids(batch), "batch response has no results"),
        }
    }
    details
}

/// Image ids referenced by the first result of a detail response. A result
/// without an `images` list has no photos.
pub fn image_ids(detail: &Value) -> Result<Vec<ImageId>, BackupError> {
    let record = detail
        .get("results")
        .and_then(|v| v.as_array())
        .and_then(|results| results.first())
        .ok_or_else(|| BackupError::MalformedResponse("detail has no results".to_string()))?;

    let Some(images) = record.get("images") else {
        return Ok(Vec::new());
    };
    let images = images
        .as_array()
        .ok_or_else(|| BackupError::MalformedResponse("images is not a list".to_string()))?;

    images
        .iter()
        .map(|image| {
            image
                .get("id")
                .and_then(|v| v.as_u64())
                .map(ImageId::new)
                .ok_or_else(|| BackupError::MalformedResponse(format!("image without id: {image}")))
        })
        .collect()
}

pub fn image_filename(id: ImageId) -> String {
    format!("{id}.jpg")
}

fn join_ids(ids: &[ObservationId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn urls_follow_api_layout() {
        let client = CatalogHttpClient::new("https://mushroomobserver.org/", None).unwrap();
        let ids = [ObservationId::new(1), ObservationId::new(22)];
        assert_eq!(
            client.detail_url(&ids),
            "https://mushroomobserver.org/api/observations?format=json&detail=high&id=1,22"
        );
        assert_eq!(
            client.image_url(ImageId::new(77), ImageSize::Px640),
            "https://mushroomobserver.org/images/640/77.jpg"
        );
    }

    #[test]
    fn list_response_defaults_to_one_page() {
        let body: ListResponse = serde_json::from_value(json!({ "results": [3, 4] })).unwrap();
        assert_eq!(body.number_of_pages, 1);
        assert_eq!(body.results, vec![ObservationId::new(3), ObservationId::new(4)]);
    }

    #[test]
    fn image_ids_from_detail() {
        let detail = json!({
            "results": [{ "id": 9, "images": [{ "id": 100 }, { "id": 101 }] }]
        });
        let ids = image_ids(&detail).unwrap();
        assert_eq!(ids, vec![ImageId::new(100), ImageId::new(101)]);

        let no_images = json!({ "results": [{ "id": 9 }] });
        assert!(image_ids(&no_images).unwrap().is_empty());
    }

    #[test]
    fn image_ids_rejects_empty_results() {
        let err = image_ids(&json!({ "results": [] })).unwrap_err();
        assert_matches!(err, BackupError::MalformedResponse(_));
    }
}
