use super::SubgramError;
use crate::prelude::*;
use crate::subscription::{
    Channel, ChannelId, ChannelKind, Gender, SponsorAction, SponsorOffer, SponsorRequest,
};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Serialize)]
pub(crate) struct RequestOpBody {
    #[serde(rename = "UserId")]
    user_id: String,

    #[serde(rename = "ChatId")]
    chat_id: String,

    #[serde(rename = "MaxOP")]
    max_op: u8,

    action: SponsorAction,

    exclude_channel_ids: Vec<String>,

    #[serde(rename = "Gender", skip_serializing_if = "Option::is_none")]
    gender: Option<Gender>,
}

impl RequestOpBody {
    pub(crate) fn new(request: &SponsorRequest) -> Self {
        Self {
            user_id: request.user_id.to_string(),
            chat_id: request.chat_id.to_string(),
            max_op: request.max_offers,
            action: request.action,
            exclude_channel_ids: vec![],
            gender: request.gender,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub(crate) enum ResponseStatus {
    Ok,
    Warning,

    /// The provider wants to know the user's gender before offering anything.
    Gender,
    Error,

    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RequestOpResponse {
    pub(crate) status: ResponseStatus,

    #[serde(default)]
    code: Option<i64>,

    #[serde(default)]
    message: Option<String>,

    #[serde(default)]
    links: Vec<String>,

    #[serde(default)]
    additional: Option<Additional>,
}

#[derive(Debug, Deserialize)]
struct Additional {
    #[serde(default)]
    sponsors: Option<Vec<Sponsor>>,
}

#[derive(Debug, Deserialize)]
struct Sponsor {
    link: String,

    #[serde(default)]
    resource_name: Option<String>,

    status: SponsorStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum SponsorStatus {
    Subscribed,
    Unsubscribed,
    Notgetted,

    #[serde(other)]
    Unknown,
}

impl SponsorStatus {
    fn needs_subscription(self) -> bool {
        matches!(self, Self::Unsubscribed | Self::Notgetted)
    }
}

impl RequestOpResponse {
    pub(crate) fn into_offer(self) -> Result<SponsorOffer, SubgramError> {
        if self.status == ResponseStatus::Error {
            return Err(SubgramError::Rejected {
                status: self.status.to_string(),
                code: self.code,
                message: self.message.unwrap_or_default(),
            });
        }

        if self.status == ResponseStatus::Gender {
            return Ok(SponsorOffer::NeedsGender);
        }

        // Detailed sponsors take precedence over the bare links
        let offers: Vec<(String, Option<String>)> =
            match self.additional.and_then(|additional| additional.sponsors) {
                Some(sponsors) => sponsors
                    .into_iter()
                    .filter(|sponsor| sponsor.status.needs_subscription())
                    .map(|sponsor| (sponsor.link, sponsor.resource_name))
                    .collect(),
                None => self.links.into_iter().map(|link| (link, None)).collect(),
            };

        let channels: Vec<_> = offers
            .into_iter()
            .enumerate()
            .filter_map(|(i, (link, name))| {
                let id = match ChannelId::parse(&link) {
                    Ok(id) => id,
                    Err(err) => {
                        warn!(%link, err = tracing_err(&err), "Skipping unparseable sponsor link");
                        return None;
                    }
                };
                let name = name.or_else(|| Some(format!("Sponsor {}", i + 1)));
                let link = Url::parse(&link).ok();
                Some(Channel::new(id, name, ChannelKind::Sponsor).with_link(link))
            })
            .collect();

        if !channels.is_empty() {
            return Ok(SponsorOffer::Channels(channels));
        }

        if self.status == ResponseStatus::Ok {
            return Ok(SponsorOffer::Exempt);
        }

        debug!(status = %self.status, message = ?self.message, "SubGram has no offers");

        Ok(SponsorOffer::NoOffers)
    }
}
