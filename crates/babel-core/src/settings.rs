use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::config::{CallConfig, LanguagePair, TranslationMode, validate_language};
use crate::errors::BabelError;

/// User preferences persisted between launches.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_source_language")]
    pub source_language: String,
    #[serde(default = "default_target_language")]
    pub target_language: String,
    #[serde(default)]
    pub translation_mode: TranslationMode,
    #[serde(default = "default_true")]
    pub mic_enabled_on_join: bool,
    #[serde(default = "default_true")]
    pub camera_enabled_on_join: bool,
    /// Overrides the environment / built-in signaling URL when set.
    #[serde(default)]
    pub signaling_url: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_source_language() -> String {
    LanguagePair::default().source
}

fn default_target_language() -> String {
    LanguagePair::default().target
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            display_name: None,
            source_language: default_source_language(),
            target_language: default_target_language(),
            translation_mode: TranslationMode::default(),
            mic_enabled_on_join: true,
            camera_enabled_on_join: true,
            signaling_url: None,
        }
    }
}

impl Settings {
    /// Stored languages, or the default pair if the file holds bad tags.
    pub fn language_pair(&self) -> LanguagePair {
        LanguagePair::new(&self.source_language, &self.target_language).unwrap_or_else(|e| {
            tracing::warn!("ignoring stored languages: {e}");
            LanguagePair::default()
        })
    }

    /// Call configuration for these preferences on top of the environment.
    pub fn call_config(&self) -> CallConfig {
        let mut config = CallConfig::from_env();
        if let Some(url) = self.signaling_url.as_deref().filter(|u| !u.trim().is_empty()) {
            config.signaling_url = url.trim().to_string();
        }
        config.display_name = self.display_name.clone();
        config.translation_mode = self.translation_mode;
        config.mic_enabled_on_join = self.mic_enabled_on_join;
        config.camera_enabled_on_join = self.camera_enabled_on_join;
        config
    }
}

/// `settings.json` in a data directory. Writes go through immediately.
pub struct SettingsStore {
    settings: Mutex<Settings>,
    file_path: PathBuf,
}

impl SettingsStore {
    pub fn new(data_dir: &str) -> Self {
        let file_path = PathBuf::from(data_dir).join("settings.json");
        let settings = Self::load(&file_path);
        Self {
            settings: Mutex::new(settings),
            file_path,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Settings> {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self) -> Settings {
        self.lock().clone()
    }

    pub fn set_display_name(&self, name: Option<String>) {
        self.lock().display_name = name;
        self.save();
    }

    pub fn set_languages(&self, source: &str, target: &str) -> Result<(), BabelError> {
        let source = validate_language(source)?;
        let target = validate_language(target)?;
        {
            let mut settings = self.lock();
            settings.source_language = source;
            settings.target_language = target;
        }
        self.save();
        Ok(())
    }

    pub fn set_translation_mode(&self, mode: TranslationMode) {
        self.lock().translation_mode = mode;
        self.save();
    }

    pub fn set_mic_enabled_on_join(&self, enabled: bool) {
        self.lock().mic_enabled_on_join = enabled;
        self.save();
    }

    pub fn set_camera_enabled_on_join(&self, enabled: bool) {
        self.lock().camera_enabled_on_join = enabled;
        self.save();
    }

    pub fn set_signaling_url(&self, url: Option<String>) {
        self.lock().signaling_url = url;
        self.save();
    }

    fn save(&self) {
        let settings = self.get();
        if let Some(parent) = self.file_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(&settings) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.file_path, json) {
                    tracing::warn!("could not write {}: {e}", self.file_path.display());
                }
            }
            Err(e) => tracing::warn!("could not serialize settings: {e}"),
        }
    }

    fn load(path: &Path) -> Settings {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("corrupt settings at {}, using defaults: {e}", path.display());
                Settings::default()
            }),
            Err(_) => Settings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[test]
    fn test_default_settings() {
        let s = Settings::default();
        assert_eq!(s.display_name, None);
        assert_eq!(s.source_language, "pt-BR");
        assert_eq!(s.target_language, "en-US");
        assert_eq!(s.translation_mode, TranslationMode::TextOnly);
        assert!(s.mic_enabled_on_join);
        assert!(s.camera_enabled_on_join);
        assert_eq!(s.signaling_url, None);
    }

    #[test]
    fn test_new_creates_defaults_when_no_file() {
        let dir = temp_dir();
        let store = SettingsStore::new(dir.path().to_str().unwrap());
        assert_eq!(store.get(), Settings::default());
    }

    #[test]
    fn test_set_display_name_persists() {
        let dir = temp_dir();
        let path = dir.path().to_str().unwrap();
        {
            let store = SettingsStore::new(path);
            store.set_display_name(Some("Alice".to_string()));
        }
        let store = SettingsStore::new(path);
        assert_eq!(store.get().display_name, Some("Alice".to_string()));
    }

    #[test]
    fn test_set_languages_persists_and_validates() {
        let dir = temp_dir();
        let path = dir.path().to_str().unwrap();
        {
            let store = SettingsStore::new(path);
            store.set_languages("es-ES", "ja-JP").unwrap();
            assert!(store.set_languages("english", "ja-JP").is_err());
        }
        let store = SettingsStore::new(path);
        let pair = store.get().language_pair();
        assert_eq!(pair.source, "es-ES");
        assert_eq!(pair.target, "ja-JP");
    }

    #[test]
    fn test_mode_and_join_flags_persist() {
        let dir = temp_dir();
        let path = dir.path().to_str().unwrap();
        {
            let store = SettingsStore::new(path);
            store.set_translation_mode(TranslationMode::AudioAndText);
            store.set_mic_enabled_on_join(false);
            store.set_camera_enabled_on_join(false);
        }
        let s = SettingsStore::new(path).get();
        assert_eq!(s.translation_mode, TranslationMode::AudioAndText);
        assert!(!s.mic_enabled_on_join);
        assert!(!s.camera_enabled_on_join);
    }

    #[test]
    fn test_corrupt_file_returns_defaults() {
        let dir = temp_dir();
        fs::write(dir.path().join("settings.json"), "not json!!!").unwrap();
        let store = SettingsStore::new(dir.path().to_str().unwrap());
        assert_eq!(store.get(), Settings::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = temp_dir();
        fs::write(
            dir.path().join("settings.json"),
            r#"{"display_name":"Bia","translation_mode":"audio_and_text"}"#,
        )
        .unwrap();
        let s = SettingsStore::new(dir.path().to_str().unwrap()).get();
        assert_eq!(s.display_name, Some("Bia".to_string()));
        assert_eq!(s.translation_mode, TranslationMode::AudioAndText);
        assert_eq!(s.source_language, "pt-BR");
        assert!(s.camera_enabled_on_join);
    }

    #[test]
    fn test_bad_stored_languages_fall_back() {
        let s = Settings {
            source_language: "??".into(),
            ..Settings::default()
        };
        assert_eq!(s.language_pair(), LanguagePair::default());
    }

    #[test]
    fn test_call_config_carries_preferences() {
        let s = Settings {
            display_name: Some("Bia".into()),
            signaling_url: Some("wss://babel.example.org".into()),
            translation_mode: TranslationMode::AudioAndText,
            mic_enabled_on_join: false,
            ..Settings::default()
        };
        let config = s.call_config();
        assert_eq!(config.signaling_url, "wss://babel.example.org");
        assert_eq!(config.display_name.as_deref(), Some("Bia"));
        assert_eq!(config.translation_mode, TranslationMode::AudioAndText);
        assert!(!config.mic_enabled_on_join);
        assert!(config.camera_enabled_on_join);
    }

    #[test]
    fn test_creates_data_dir_on_save() {
        let dir = temp_dir();
        let nested = dir.path().join("a").join("b");
        let store = SettingsStore::new(nested.to_str().unwrap());
        store.set_signaling_url(Some("ws://10.0.0.2:8000".into()));
        assert!(nested.join("settings.json").exists());
    }
}
