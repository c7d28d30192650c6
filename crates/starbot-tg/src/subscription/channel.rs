use lazy_regex::{regex_captures, regex_is_match};
use std::fmt;
use url::Url;

/// Canonical identity of a Telegram channel.
///
/// Every channel reference that enters the system (sponsor links from the
/// provider, rows of the required channels table) is normalized into this
/// form, so that the same channel referenced differently compares equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum ChannelId {
    /// Public handle without the leading `@`, lowercased.
    Username(String),

    /// Numeric chat id, e.g. `-1001234567890`.
    Numeric(i64),

    /// Private invite link (`t.me/+hash` or `t.me/joinchat/hash`). Membership
    /// in channels known only by an invite link can't be verified.
    InviteLink(Url),
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ChannelIdError {
    #[error("Channel reference is empty")]
    Empty,

    #[error("Invalid channel username `{input}`")]
    InvalidUsername { input: String },

    #[error("Invalid channel invite link `{input}`")]
    InvalidInviteLink {
        input: String,
        source: url::ParseError,
    },
}

impl ChannelId {
    /// Accepts `@handle`, `handle`, `t.me/handle` (with or without scheme,
    /// query or trailing path segments), `t.me/s/handle`, private invite
    /// links and numeric chat ids.
    pub(crate) fn parse(input: &str) -> Result<Self, ChannelIdError> {
        let input = input.trim();

        if input.is_empty() {
            return Err(ChannelIdError::Empty);
        }

        if let Ok(id) = input.parse::<i64>() {
            return Ok(Self::Numeric(id));
        }

        if let Some(handle) = input.strip_prefix('@') {
            return Self::username(handle);
        }

        let Some((_, path)) = regex_captures!(
            r"^(?:https?://)?(?:www\.)?(?:t\.me|telegram\.me|telegram\.dog)/(.*)$"i,
            input
        ) else {
            return Self::username(input);
        };

        let path = path
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .trim_end_matches('/');

        if path.starts_with('+') || path.starts_with("joinchat/") {
            return Url::parse(&format!("https://t.me/{path}"))
                .map(Self::InviteLink)
                .map_err(|source| ChannelIdError::InvalidInviteLink {
                    input: input.to_owned(),
                    source,
                });
        }

        let handle = path.strip_prefix("s/").unwrap_or(path);
        let handle = handle.split('/').next().unwrap_or_default();

        Self::username(handle)
    }

    fn username(handle: &str) -> Result<Self, ChannelIdError> {
        if !regex_is_match!(r"^[A-Za-z][A-Za-z0-9_]{4,31}$", handle) {
            return Err(ChannelIdError::InvalidUsername {
                input: handle.to_owned(),
            });
        }
        Ok(Self::Username(handle.to_ascii_lowercase()))
    }

    /// Public link that opens the channel, if one can be derived from the id.
    pub(crate) fn link(&self) -> Option<Url> {
        match self {
            Self::Username(username) => Url::parse(&format!("https://t.me/{username}")).ok(),
            Self::InviteLink(url) => Some(url.clone()),
            Self::Numeric(_) => None,
        }
    }

    /// Whether membership in this channel can be queried via the Bot API.
    pub(crate) fn is_checkable(&self) -> bool {
        !matches!(self, Self::InviteLink(_))
    }
}

/// The output of [`Display`] is accepted back by [`ChannelId::parse`].
impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Username(username) => write!(f, "@{username}"),
            Self::Numeric(id) => write!(f, "{id}"),
            Self::InviteLink(url) => write!(f, "{url}"),
        }
    }
}

/// Which stage of the gate a channel belongs to. Sponsor channels are
/// sometimes called `subgram` channels after the provider that serves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum ChannelKind {
    Sponsor,
    Required,
}

impl ChannelKind {
    /// Subscription status assumed when the membership can't be verified.
    /// Sponsors fail open, required channels fail closed.
    pub(crate) fn subscribed_when_unverifiable(self) -> bool {
        match self {
            Self::Sponsor => true,
            Self::Required => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Channel {
    pub(crate) id: ChannelId,
    pub(crate) name: String,
    pub(crate) kind: ChannelKind,
    pub(crate) link: Option<Url>,
}

impl Channel {
    /// Uses the id as a display name when no name is known and derives the
    /// link from the id.
    pub(crate) fn new(id: ChannelId, name: Option<String>, kind: ChannelKind) -> Self {
        let name = name
            .map(|name| name.trim().to_owned())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| id.to_string());

        let link = id.link();

        Self {
            id,
            name,
            kind,
            link,
        }
    }

    pub(crate) fn with_link(mut self, link: Option<Url>) -> Self {
        if link.is_some() {
            self.link = link;
        }
        self
    }
}

/// A channel together with the result of checking the user's membership in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CheckedChannel {
    pub(crate) channel: Channel,
    pub(crate) subscribed: bool,

    /// `false` if the membership could not be verified, in which case
    /// `subscribed` holds the fail policy of the channel's kind.
    pub(crate) can_check: bool,
}
