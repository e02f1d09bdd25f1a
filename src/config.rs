use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use url::Url;

use crate::error::SessionError;

/// Key of the original link in the target configuration of a remote session.
pub const DEEP_LINK_KEY: &str = "deep_link";

/// How the session is engaged with the verifier.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EngagementMode {
    /// Proximity presentation engaged by displaying a QR code.
    ProximityQr,
    /// Proximity presentation engaged by an NFC tap.
    ProximityNfc,
    /// Remote presentation of a request delivered by link.
    Remote,
}

/// Configuration of one presentation session.
///
/// `target` is specific to the transfer channel and is passed to it unmodified.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub mode: EngagementMode,
    #[serde(default)]
    pub target: Map<String, Json>,
}

impl SessionConfig {
    pub fn new(mode: EngagementMode) -> Self {
        Self {
            mode,
            target: Map::new(),
        }
    }

    pub fn proximity_qr() -> Self {
        Self::new(EngagementMode::ProximityQr)
    }

    pub fn proximity_nfc() -> Self {
        Self::new(EngagementMode::ProximityNfc)
    }

    /// Add a channel specific parameter.
    pub fn with_target_parameter(mut self, key: impl Into<String>, value: Json) -> Self {
        self.target.insert(key.into(), value);
        self
    }

    /// Configure a remote session from a presentation request link, e.g.
    /// `openid4vp://?client_id=...&request_uri=...`.
    ///
    /// The link and its query parameters are passed to the channel. Links that are not
    /// presentation requests are rejected and should be opened externally.
    pub fn from_deep_link(link: &Url) -> Result<Self, SessionError> {
        if DeepLinkKind::parse(link) != DeepLinkKind::OpenId4Vp {
            return Err(SessionError::UnsupportedDeepLink(link.scheme().to_owned()));
        }

        let parameters: Vec<(String, String)> =
            serde_urlencoded::from_str(link.query().unwrap_or_default())
                .context("unable to parse deep link query")?;

        let mut target = parameters
            .into_iter()
            .map(|(key, value)| (key, Json::String(value)))
            .collect::<Map<_, _>>();
        target.insert(DEEP_LINK_KEY.to_owned(), Json::String(link.to_string()));

        Ok(Self {
            mode: EngagementMode::Remote,
            target,
        })
    }
}

/// What a deep link opened in the wallet asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeepLinkKind {
    /// A remote presentation request.
    OpenId4Vp,
    /// Anything else.
    External,
}

impl DeepLinkKind {
    pub fn parse(link: &Url) -> Self {
        if link.scheme().contains("openid4vp") {
            DeepLinkKind::OpenId4Vp
        } else {
            DeepLinkKind::External
        }
    }
}

/// Headers of the disclosure sections.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct DisclosureLabels {
    pub required_fields_title: String,
    pub optional_fields_title: String,
}

impl Default for DisclosureLabels {
    fn default() -> Self {
        Self {
            required_fields_title: "Required fields".to_owned(),
            optional_fields_title: "Optional fields".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn remote_config_from_deep_link() {
        let link: Url =
            "eudi-openid4vp://?client_id=verifier.example.com&request_uri=https%3A%2F%2Fverifier.example.com%2Frequest"
                .parse()
                .unwrap();

        let config = SessionConfig::from_deep_link(&link).unwrap();

        assert_eq!(config.mode, EngagementMode::Remote);
        assert_eq!(config.target["client_id"], json!("verifier.example.com"));
        assert_eq!(
            config.target["request_uri"],
            json!("https://verifier.example.com/request")
        );
        assert_eq!(config.target[DEEP_LINK_KEY], json!(link.as_str()));
    }

    #[test]
    fn external_links_are_rejected() {
        let link: Url = "https://example.com/news".parse().unwrap();
        assert_eq!(DeepLinkKind::parse(&link), DeepLinkKind::External);
        assert!(matches!(
            SessionConfig::from_deep_link(&link),
            Err(SessionError::UnsupportedDeepLink(scheme)) if scheme == "https"
        ));
    }

    #[test]
    fn config_wire_format() {
        let config: SessionConfig = serde_json::from_value(json!({
            "mode": "proximity_nfc",
            "target": {"ble_peripheral_mode": true}
        }))
        .unwrap();
        assert_eq!(
            config,
            SessionConfig::proximity_nfc().with_target_parameter("ble_peripheral_mode", json!(true))
        );
    }
}
