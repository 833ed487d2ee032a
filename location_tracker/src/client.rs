use crate::sampler::SampleSink;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use shared::models::{
    AttendanceRequest, Batch, Caller, CoachAttendance, Geofence, LiveLocationsDto,
    LocationSample, NewGeofence, TrackReceipt,
};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("server responded {status}: {message}")]
    Api { status: u16, message: String },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    message: String,
}

/// Bearer-authenticated client for the tracking API.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = request.bearer_auth(&self.token).send().await?;
        decode(response).await
    }

    pub async fn track(&self, sample: &LocationSample) -> Result<TrackReceipt, ClientError> {
        self.send(self.client.post(self.url("/api/location/track")).json(sample))
            .await
    }

    pub async fn live(&self, window_minutes: Option<i64>) -> Result<LiveLocationsDto, ClientError> {
        let mut request = self.client.get(self.url("/api/location/live"));
        if let Some(window_minutes) = window_minutes {
            request = request.query(&[("windowMinutes", window_minutes)]);
        }
        self.send(request).await
    }

    pub async fn check_in(&self, req: &AttendanceRequest) -> Result<CoachAttendance, ClientError> {
        self.send(self.client.post(self.url("/api/coach/checkin")).json(req))
            .await
    }

    pub async fn check_out(&self, req: &AttendanceRequest) -> Result<CoachAttendance, ClientError> {
        self.send(self.client.post(self.url("/api/coach/checkout")).json(req))
            .await
    }

    pub async fn geofences(&self) -> Result<Vec<Geofence>, ClientError> {
        self.send(self.client.get(self.url("/api/geofences"))).await
    }

    pub async fn create_geofence(&self, geofence: &NewGeofence) -> Result<Geofence, ClientError> {
        self.send(self.client.post(self.url("/api/geofences")).json(geofence))
            .await
    }

    pub async fn batches(&self, coach_id: Option<Uuid>) -> Result<Vec<Batch>, ClientError> {
        let mut request = self.client.get(self.url("/api/batches"));
        if let Some(coach_id) = coach_id {
            request = request.query(&[("coachId", coach_id)]);
        }
        self.send(request).await
    }

    pub async fn me(&self) -> Result<Caller, ClientError> {
        self.send(self.client.get(self.url("/mobile/auth/me"))).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(ErrorBody { message }) if !message.is_empty() => message,
        _ if !body.is_empty() => body,
        _ => status.canonical_reason().unwrap_or("unknown error").to_string(),
    };
    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}

impl SampleSink for ApiClient {
    async fn submit(&self, sample: LocationSample) -> Result<TrackReceipt, ClientError> {
        self.track(&sample).await
    }
}
