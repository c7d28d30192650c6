//! Client of the SubGram sponsor channel network.

mod model;

use crate::http;
use crate::prelude::*;
use crate::subscription::{SponsorAction, SponsorOffer, SponsorProvider, SponsorRequest};
use crate::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

pub(crate) use model::*;

#[derive(Clone, Deserialize)]
pub(crate) struct Config {
    api_key: String,

    #[serde(default = "default_api_url")]
    api_url: Url,

    #[serde(default = "default_enabled")]
    pub(crate) enabled: bool,

    #[serde(default = "default_max_sponsors")]
    max_sponsors: u8,

    #[serde(default = "default_action")]
    pub(crate) action: SponsorAction,

    #[serde(default = "default_request_timeout_secs")]
    request_timeout_secs: u64,
}

fn default_api_url() -> Url {
    Url::parse("https://api.subgram.ru/request-op/")
        .expect("BUG: default SubGram API url must be valid")
}

fn default_enabled() -> bool {
    true
}

fn default_max_sponsors() -> u8 {
    3
}

fn default_action() -> SponsorAction {
    SponsorAction::Subscribe
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl Config {
    /// The provider rejects requests for more than 10 sponsors.
    pub(crate) fn max_sponsors(&self) -> u8 {
        self.max_sponsors.clamp(1, 10)
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum SubgramError {
    #[error("SubGram rejected the request (status: {status}, code: {code:?}): {message}")]
    Rejected {
        status: String,
        code: Option<i64>,
        message: String,
    },
}

pub(crate) struct SubgramClient {
    http: http::Client,
    cfg: Config,
}

impl SubgramClient {
    pub(crate) fn new(cfg: Config, http: http::Client) -> Self {
        Self { http, cfg }
    }
}

#[async_trait]
impl SponsorProvider for SubgramClient {
    #[instrument(skip_all, fields(user = %request.user_id))]
    async fn request_sponsors(&self, request: SponsorRequest) -> Result<SponsorOffer> {
        let body = RequestOpBody::new(&request);

        let result = self
            .http
            .post(self.cfg.api_url.clone())
            .header("Auth", &self.cfg.api_key)
            .timeout(Duration::from_secs(self.cfg.request_timeout_secs))
            .json(&body)
            .read_json::<RequestOpResponse>()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(err) => return exemption_from_not_found(&err).ok_or(err),
        };

        Ok(response.into_offer()?)
    }
}

/// SubGram answers with 404 and an `ok` status in the body when there are
/// no advertisers suitable for the user.
fn exemption_from_not_found(err: &crate::Error) -> Option<SponsorOffer> {
    let crate::error::ErrorKind::HttpClient {
        source: http::HttpClientError::BadResponseStatusCode { status, body },
    } = err.kind()
    else {
        return None;
    };

    if *status != reqwest::StatusCode::NOT_FOUND {
        return None;
    }

    let response: RequestOpResponse = serde_json::from_str(body).ok()?;

    (response.status == ResponseStatus::Ok).then(|| {
        debug!("SubGram has no suitable advertisers for the user");
        SponsorOffer::Exempt
    })
}
