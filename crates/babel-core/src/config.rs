//! Call configuration: languages, translation mode, signaling endpoint and
//! ICE servers.

use std::sync::OnceLock;
use std::time::Duration;

use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::BabelError;

/// Environment variable overriding the signaling server base URL.
pub const SIGNALING_URL_ENV: &str = "BABEL_SIGNALING_URL";

pub const DEFAULT_SIGNALING_URL: &str = "ws://localhost:8000";

/// Quiet period after which a caption is cleared.
pub const DEFAULT_SUBTITLE_WINDOW: Duration = Duration::from_secs(5);

/// Languages offered by the translation backend: (tag, English name).
pub const SUPPORTED_LANGUAGES: &[(&str, &str)] = &[
    ("pt-BR", "Portuguese"),
    ("en-US", "English"),
    ("es-ES", "Spanish"),
    ("fr-FR", "French"),
    ("de-DE", "German"),
    ("ja-JP", "Japanese"),
];

fn language_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z]{2,3}(-[A-Z]{2})?$").expect("static regex"))
}

/// Validate a language tag of the form `xx` or `xx-YY`.
pub fn validate_language(tag: &str) -> Result<String, BabelError> {
    let tag = tag.trim();
    if language_tag_re().is_match(tag) {
        Ok(tag.to_string())
    } else {
        Err(BabelError::InvalidLanguage(tag.to_string()))
    }
}

pub fn language_name(tag: &str) -> Option<&'static str> {
    SUPPORTED_LANGUAGES
        .iter()
        .find(|(t, _)| *t == tag)
        .map(|(_, name)| *name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageSide {
    /// The language the local participant speaks.
    Source,
    /// The language the local participant wants captions in.
    Target,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguagePair {
    pub source: String,
    pub target: String,
}

impl LanguagePair {
    pub fn new(source: &str, target: &str) -> Result<Self, BabelError> {
        Ok(Self {
            source: validate_language(source)?,
            target: validate_language(target)?,
        })
    }

    /// Return a copy with one side replaced.
    pub fn with(&self, side: LanguageSide, value: &str) -> Result<Self, BabelError> {
        let value = validate_language(value)?;
        let mut next = self.clone();
        match side {
            LanguageSide::Source => next.source = value,
            LanguageSide::Target => next.target = value,
        }
        Ok(next)
    }
}

impl Default for LanguagePair {
    fn default() -> Self {
        Self {
            source: "pt-BR".to_string(),
            target: "en-US".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationMode {
    #[default]
    TextOnly,
    AudioAndText,
}

impl TranslationMode {
    pub fn toggled(self) -> Self {
        match self {
            TranslationMode::TextOnly => TranslationMode::AudioAndText,
            TranslationMode::AudioAndText => TranslationMode::TextOnly,
        }
    }

    pub fn plays_audio(self) -> bool {
        self == TranslationMode::AudioAndText
    }
}

/// STUN/TURN server handed to the peer transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn default_stun() -> Vec<Self> {
        vec![Self {
            urls: vec!["stun:stun.l.google.com:19302".to_string()],
            username: None,
            credential: None,
        }]
    }
}

/// Per-call tunables.
#[derive(Debug, Clone)]
pub struct CallConfig {
    pub signaling_url: String,
    pub ice_servers: Vec<IceServer>,
    pub subtitle_window: Duration,
    /// Fixed local participant id; a random one is generated when unset.
    pub participant_id: Option<String>,
    pub display_name: Option<String>,
    pub translation_mode: TranslationMode,
    pub mic_enabled_on_join: bool,
    pub camera_enabled_on_join: bool,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            signaling_url: DEFAULT_SIGNALING_URL.to_string(),
            ice_servers: IceServer::default_stun(),
            subtitle_window: DEFAULT_SUBTITLE_WINDOW,
            participant_id: None,
            display_name: None,
            translation_mode: TranslationMode::default(),
            mic_enabled_on_join: true,
            camera_enabled_on_join: true,
        }
    }
}

impl CallConfig {
    /// Defaults, with the signaling URL taken from `BABEL_SIGNALING_URL`
    /// when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var(SIGNALING_URL_ENV) {
            if !url.trim().is_empty() {
                config.signaling_url = url.trim().to_string();
            }
        }
        config
    }
}

/// `user_` followed by seven base-36 characters.
pub fn generate_participant_id() -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..7)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("user_{suffix}")
}

/// Resolved signaling URI for one `(room, participant)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalingEndpoint {
    pub room_id: String,
    pub participant_id: String,
    url: String,
}

impl SignalingEndpoint {
    /// Build `{base}/ws/{room}/{participant}`.
    ///
    /// A `wss://` base naming port 8000 has the port dropped: TLS is
    /// terminated by a reverse proxy on 443 in front of the backend.
    pub fn new(base: &str, room_id: &str, participant_id: &str) -> Result<Self, BabelError> {
        let mut parsed = url::Url::parse(base.trim())
            .map_err(|e| BabelError::Config(format!("invalid signaling url '{base}': {e}")))?;
        match parsed.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(BabelError::Config(format!(
                    "signaling url must use ws:// or wss://, got '{other}'"
                )));
            }
        }
        if parsed.scheme() == "wss" && parsed.port() == Some(8000) {
            parsed
                .set_port(None)
                .map_err(|_| BabelError::Config(format!("cannot strip port from '{base}'")))?;
        }

        let base = parsed.as_str().trim_end_matches('/');
        let url = format!(
            "{base}/ws/{}/{}",
            urlencoding::encode(room_id),
            urlencoding::encode(participant_id)
        );
        Ok(Self {
            room_id: room_id.to_string(),
            participant_id: participant_id.to_string(),
            url,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_tags() {
        assert_eq!(validate_language("pt-BR").unwrap(), "pt-BR");
        assert_eq!(validate_language(" en ").unwrap(), "en");
        assert!(validate_language("").is_err());
        assert!(validate_language("english").is_err());
        assert!(validate_language("EN-us").is_err());
    }

    #[test]
    fn language_pair_replaces_one_side() {
        let pair = LanguagePair::default();
        let next = pair.with(LanguageSide::Target, "ja-JP").unwrap();
        assert_eq!(next.source, "pt-BR");
        assert_eq!(next.target, "ja-JP");
        assert!(pair.with(LanguageSide::Source, "??").is_err());
    }

    #[test]
    fn catalog_lookup() {
        assert_eq!(language_name("fr-FR"), Some("French"));
        assert_eq!(language_name("xx-XX"), None);
        assert!(SUPPORTED_LANGUAGES.iter().all(|(t, _)| validate_language(t).is_ok()));
    }

    #[test]
    fn translation_mode_wire_names() {
        assert_eq!(
            serde_json::to_string(&TranslationMode::AudioAndText).unwrap(),
            "\"audio_and_text\""
        );
        assert_eq!(TranslationMode::TextOnly.toggled(), TranslationMode::AudioAndText);
        assert!(!TranslationMode::default().plays_audio());
    }

    #[test]
    fn participant_ids_are_prefixed_base36() {
        let id = generate_participant_id();
        assert!(id.starts_with("user_"));
        assert_eq!(id.len(), 12);
        assert!(id[5..].chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn endpoint_url_layout() {
        let ep = SignalingEndpoint::new("ws://localhost:8000", "abc123", "user_1").unwrap();
        assert_eq!(ep.url(), "ws://localhost:8000/ws/abc123/user_1");
    }

    #[test]
    fn endpoint_encodes_segments() {
        let ep = SignalingEndpoint::new("ws://host/", "team room", "a/b").unwrap();
        assert_eq!(ep.url(), "ws://host/ws/team%20room/a%2Fb");
    }

    #[test]
    fn endpoint_strips_backend_port_behind_tls() {
        let ep = SignalingEndpoint::new("wss://meet.example.com:8000", "r", "p").unwrap();
        assert_eq!(ep.url(), "wss://meet.example.com/ws/r/p");
        let plain = SignalingEndpoint::new("ws://meet.example.com:8000", "r", "p").unwrap();
        assert_eq!(plain.url(), "ws://meet.example.com:8000/ws/r/p");
    }

    #[test]
    fn endpoint_rejects_non_websocket_schemes() {
        assert!(SignalingEndpoint::new("https://example.com", "r", "p").is_err());
        assert!(SignalingEndpoint::new("not a url", "r", "p").is_err());
    }
}
