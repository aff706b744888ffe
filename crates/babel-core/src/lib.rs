//! Babel call-session core.
//!
//! Drives a translated video call: offer/answer negotiation against the
//! room coordinator, room membership, translated subtitles and speech, and
//! the in-call controls. Media capture, the RTC transport and audio output
//! are supplied by the host through the traits in [`media`],
//! [`negotiation`] and [`delivery`].

pub mod config;
pub mod delivery;
pub mod errors;
pub mod events;
pub mod logging;
pub mod media;
pub mod membership;
pub mod negotiation;
pub mod session;
pub mod settings;
pub mod signaling;

#[cfg(test)]
mod testing;

pub use config::{CallConfig, LanguagePair, LanguageSide, TranslationMode};
pub use errors::{BabelError, TransportFault};
pub use events::{CallEvent, CallEventListener, CallState, EndReason, NegotiationState};
pub use logging::init_logging;
pub use session::{CallSession, HostServices};
pub use settings::{Settings, SettingsStore};
