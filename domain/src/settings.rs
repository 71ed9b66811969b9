//! Application settings with change notification.
//!
//! Settings are a single JSON blob under the `settings` key. Every struct
//! defaults field by field, so data written by an older version deep-merges
//! with the current defaults on load.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use events::{DomainEvent, EventPublisher};
use log::*;
use serde::{Deserialize, Serialize};
use service::store::{KeyValueStore, SETTINGS_KEY};

use crate::error::Error;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

/// Where an unreadable settings blob is copied before defaults take over.
pub const SETTINGS_BACKUP_KEY: &str = "settings-corrupt";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeColor {
    #[default]
    Blue,
    Teal,
    Purple,
    Orange,
    Pink,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DarkMode {
    #[default]
    Default,
    Dark,
    Light,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoShare {
    #[default]
    DontShare,
    ViewOnly,
    Edit,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharePermission {
    #[default]
    Collaborator,
    Viewer,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoJoin {
    #[default]
    HostedMeetings,
    AllMeetings,
    NoMeetings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub my_conversations: bool,
    pub shared_with_me: bool,
    pub live_notes: bool,
    pub highlights: bool,
    pub meeting_summary: bool,
    pub comments: bool,
    pub calendar_events: bool,
    pub activity_stats: bool,
    pub product_tips: bool,
    pub offers: bool,
    pub daily_digest: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            my_conversations: true,
            shared_with_me: true,
            live_notes: true,
            highlights: true,
            meeting_summary: true,
            comments: true,
            calendar_events: true,
            activity_stats: false,
            product_tips: true,
            offers: true,
            daily_digest: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeetingSettings {
    pub auto_share: AutoShare,
    pub default_permission: SharePermission,
    pub collaborators_can_share: bool,
    pub auto_join: AutoJoin,
    pub auto_capture: bool,
    pub email_host: bool,
    pub pre_recording_emails: bool,
    pub send_link_via_chat: bool,
}

impl Default for MeetingSettings {
    fn default() -> Self {
        Self {
            auto_share: AutoShare::DontShare,
            default_permission: SharePermission::Collaborator,
            collaborators_can_share: true,
            auto_join: AutoJoin::HostedMeetings,
            auto_capture: true,
            email_host: false,
            pre_recording_emails: false,
            send_link_via_chat: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvancedSettings {
    pub dark_mode: DarkMode,
    pub sync_photos: bool,
    pub record_bluetooth: bool,
    pub remove_branding: bool,
    pub show_speaker_time: bool,
    pub prevent_auto_lock: bool,
    pub show_bottom_nav: bool,
}

impl Default for AdvancedSettings {
    fn default() -> Self {
        Self {
            dark_mode: DarkMode::Default,
            sync_photos: false,
            record_bluetooth: false,
            remove_branding: false,
            show_speaker_time: false,
            prevent_auto_lock: true,
            show_bottom_nav: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub data_saver: bool,
    pub language: String,
    pub theme_color: ThemeColor,
    /// Custom terms fed to transcription prompts.
    pub vocabulary: Vec<String>,
    /// Free text describing the user, fed to generation prompts.
    pub user_context: String,
    pub gemini_model: String,
    pub notifications: NotificationSettings,
    pub meeting: MeetingSettings,
    pub advanced: AdvancedSettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            data_saver: false,
            language: "English".to_string(),
            theme_color: ThemeColor::Blue,
            vocabulary: Vec::new(),
            user_context: String::new(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            notifications: NotificationSettings::default(),
            meeting: MeetingSettings::default(),
            advanced: AdvancedSettings::default(),
        }
    }
}

/// Partial top-level update. `None` keeps the current value; nested groups are replaced whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsPatch {
    pub data_saver: Option<bool>,
    pub language: Option<String>,
    pub theme_color: Option<ThemeColor>,
    pub vocabulary: Option<Vec<String>>,
    pub user_context: Option<String>,
    pub gemini_model: Option<String>,
    pub notifications: Option<NotificationSettings>,
    pub meeting: Option<MeetingSettings>,
    pub advanced: Option<AdvancedSettings>,
}

pub fn apply_patch(settings: &AppSettings, patch: SettingsPatch) -> AppSettings {
    AppSettings {
        data_saver: patch.data_saver.unwrap_or(settings.data_saver),
        language: patch
            .language
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| settings.language.clone()),
        theme_color: patch.theme_color.unwrap_or(settings.theme_color),
        vocabulary: patch
            .vocabulary
            .unwrap_or_else(|| settings.vocabulary.clone()),
        user_context: patch
            .user_context
            .unwrap_or_else(|| settings.user_context.clone()),
        gemini_model: patch
            .gemini_model
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| settings.gemini_model.clone()),
        notifications: patch
            .notifications
            .unwrap_or_else(|| settings.notifications.clone()),
        meeting: patch.meeting.unwrap_or_else(|| settings.meeting.clone()),
        advanced: patch.advanced.unwrap_or_else(|| settings.advanced.clone()),
    }
}

/// Sole writer of the persisted settings. Publishes `SettingsChanged` after every change.
pub struct SettingsStore<S: KeyValueStore> {
    store: Arc<S>,
    publisher: EventPublisher,
    current: Mutex<AppSettings>,
}

impl<S: KeyValueStore> SettingsStore<S> {
    /// Loads persisted settings. Missing data falls back to defaults; unreadable
    /// data is copied to [`SETTINGS_BACKUP_KEY`] first.
    pub fn load(store: Arc<S>, publisher: EventPublisher) -> Result<Self, Error> {
        let settings = match store.get(SETTINGS_KEY)? {
            Some(blob) => match serde_json::from_str::<AppSettings>(&blob) {
                Ok(settings) => settings,
                Err(e) => {
                    // Keep the unreadable blob; the next write replaces `settings`.
                    store.set(SETTINGS_BACKUP_KEY, &blob)?;
                    warn!(
                        "Stored settings are unreadable, using defaults. Original kept under {SETTINGS_BACKUP_KEY:?}: {e}"
                    );
                    AppSettings::default()
                }
            },
            None => AppSettings::default(),
        };

        Ok(Self {
            store,
            publisher,
            current: Mutex::new(settings),
        })
    }

    pub fn get(&self) -> AppSettings {
        self.lock().clone()
    }

    pub fn vocabulary(&self) -> Vec<String> {
        self.lock().vocabulary.clone()
    }

    pub async fn update(&self, patch: SettingsPatch) -> Result<AppSettings, Error> {
        let updated = self.mutate(|settings| {
            *settings = apply_patch(settings, patch);
            true
        })?;
        self.notify(&updated).await?;
        Ok(updated)
    }

    pub async fn replace(&self, settings: AppSettings) -> Result<(), Error> {
        let replaced = self.mutate(|current| {
            *current = settings;
            true
        })?;
        self.notify(&replaced).await
    }

    /// Adds a vocabulary term. Returns `false` when the term is blank or already present.
    pub async fn add_vocabulary_term(&self, term: &str) -> Result<bool, Error> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(false);
        }

        let mut added = false;
        let updated = self.mutate(|settings| {
            if !settings.vocabulary.iter().any(|t| t == term) {
                settings.vocabulary.push(term.to_string());
                added = true;
            }
            added
        })?;
        if added {
            debug!("Added vocabulary term {term:?}");
            self.notify(&updated).await?;
        }
        Ok(added)
    }

    /// Removes a vocabulary term. Returns `false` when it was not present.
    pub async fn remove_vocabulary_term(&self, term: &str) -> Result<bool, Error> {
        let mut removed = false;
        let updated = self.mutate(|settings| {
            let before = settings.vocabulary.len();
            settings.vocabulary.retain(|t| t != term);
            removed = settings.vocabulary.len() != before;
            removed
        })?;
        if removed {
            debug!("Removed vocabulary term {term:?}");
            self.notify(&updated).await?;
        }
        Ok(removed)
    }

    fn lock(&self) -> MutexGuard<'_, AppSettings> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies `change` to a copy and, if it reports a change, persists and commits it.
    fn mutate(&self, change: impl FnOnce(&mut AppSettings) -> bool) -> Result<AppSettings, Error> {
        let mut current = self.lock();
        let mut next = current.clone();
        if change(&mut next) {
            self.store
                .set(SETTINGS_KEY, &serde_json::to_string(&next)?)?;
            *current = next.clone();
        }
        Ok(next)
    }

    async fn notify(&self, settings: &AppSettings) -> Result<(), Error> {
        let settings = serde_json::to_value(settings)?;
        self.publisher
            .publish(DomainEvent::SettingsChanged { settings })
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use events::EventHandler;
    use serde_json::json;
    use service::store::MemoryStore;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<DomainEvent>>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle(&self, event: &DomainEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn store_with_recorder() -> (SettingsStore<MemoryStore>, Arc<MemoryStore>, Arc<Recorder>) {
        let store = Arc::new(MemoryStore::new());
        let recorder = Arc::new(Recorder::default());
        let settings = SettingsStore::load(
            store.clone(),
            EventPublisher::new().with_handler(recorder.clone()),
        )
        .unwrap();
        (settings, store, recorder)
    }

    #[test]
    fn test_old_data_deep_merges_with_defaults() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(
                SETTINGS_KEY,
                &json!({
                    "language": "Yoruba",
                    "notifications": {"daily_digest": true},
                    "advanced": {"dark_mode": "dark"}
                })
                .to_string(),
            )
            .unwrap();

        let settings = SettingsStore::load(store, EventPublisher::new())
            .unwrap()
            .get();
        assert_eq!(settings.language, "Yoruba");
        assert!(settings.notifications.daily_digest);
        assert!(settings.notifications.my_conversations);
        assert_eq!(settings.advanced.dark_mode, DarkMode::Dark);
        assert!(settings.advanced.prevent_auto_lock);
        assert_eq!(settings.meeting, MeetingSettings::default());
        assert_eq!(settings.gemini_model, DEFAULT_GEMINI_MODEL);
    }

    #[tokio::test]
    async fn test_unreadable_settings_are_backed_up_before_defaults() {
        let store = Arc::new(MemoryStore::new());
        store.set(SETTINGS_KEY, "not json").unwrap();
        let settings = SettingsStore::load(store.clone(), EventPublisher::new()).unwrap();
        assert_eq!(settings.get(), AppSettings::default());
        assert_eq!(
            store.get(SETTINGS_BACKUP_KEY).unwrap(),
            Some("not json".to_string())
        );

        settings
            .update(SettingsPatch {
                data_saver: Some(true),
                ..SettingsPatch::default()
            })
            .await
            .unwrap();
        assert_eq!(
            store.get(SETTINGS_BACKUP_KEY).unwrap(),
            Some("not json".to_string())
        );
    }

    #[test]
    fn test_failed_backup_is_a_storage_error() {
        struct ReadOnlyStore(MemoryStore);

        impl KeyValueStore for ReadOnlyStore {
            fn get(&self, key: &str) -> Result<Option<String>, service::store::Error> {
                self.0.get(key)
            }

            fn set(&self, _key: &str, _value: &str) -> Result<(), service::store::Error> {
                Err(service::store::Error {
                    source: Some("read-only".to_string().into()),
                    error_kind: service::store::StoreErrorKind::Io,
                })
            }

            fn remove(&self, key: &str) -> Result<(), service::store::Error> {
                self.0.remove(key)
            }
        }

        let inner = MemoryStore::new();
        inner.set(SETTINGS_KEY, "not json").unwrap();
        let result = SettingsStore::load(Arc::new(ReadOnlyStore(inner)), EventPublisher::new());
        match result {
            Err(e) => assert_eq!(
                e.error_kind,
                crate::error::DomainErrorKind::Internal(crate::error::InternalErrorKind::Storage)
            ),
            Ok(_) => panic!("expected a storage error"),
        }
    }

    #[test]
    fn test_apply_patch_keeps_unspecified_fields() {
        let defaults = AppSettings::default();
        let updated = apply_patch(
            &defaults,
            SettingsPatch {
                theme_color: Some(ThemeColor::Teal),
                language: Some("   ".to_string()),
                advanced: Some(AdvancedSettings {
                    dark_mode: DarkMode::Light,
                    ..AdvancedSettings::default()
                }),
                ..SettingsPatch::default()
            },
        );

        assert_eq!(updated.theme_color, ThemeColor::Teal);
        assert_eq!(updated.language, defaults.language);
        assert_eq!(updated.advanced.dark_mode, DarkMode::Light);
        assert_eq!(updated.notifications, defaults.notifications);
    }

    #[tokio::test]
    async fn test_update_persists_and_notifies() {
        let (settings, store, recorder) = store_with_recorder();
        let updated = settings
            .update(SettingsPatch {
                advanced: Some(AdvancedSettings {
                    dark_mode: DarkMode::Dark,
                    ..AdvancedSettings::default()
                }),
                ..SettingsPatch::default()
            })
            .await
            .unwrap();
        assert_eq!(updated.advanced.dark_mode, DarkMode::Dark);

        let reloaded = SettingsStore::load(store, EventPublisher::new()).unwrap();
        assert_eq!(reloaded.get(), updated);

        let events = recorder.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            DomainEvent::SettingsChanged { settings } => {
                assert_eq!(settings["advanced"]["dark_mode"], "dark")
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_vocabulary_terms_are_unique_and_trimmed() {
        let (settings, _, recorder) = store_with_recorder();
        assert!(settings.add_vocabulary_term(" Ọlọ́rọ̀ ").await.unwrap());
        assert!(!settings.add_vocabulary_term("Ọlọ́rọ̀").await.unwrap());
        assert!(!settings.add_vocabulary_term("  ").await.unwrap());
        assert!(settings.add_vocabulary_term("Gemini").await.unwrap());
        assert_eq!(settings.vocabulary(), vec!["Ọlọ́rọ̀", "Gemini"]);

        assert!(settings.remove_vocabulary_term("Ọlọ́rọ̀").await.unwrap());
        assert!(!settings.remove_vocabulary_term("missing").await.unwrap());
        assert_eq!(settings.vocabulary(), vec!["Gemini"]);

        // Only real changes notify.
        assert_eq!(recorder.events.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_replace_overwrites_everything() {
        let (settings, _, _) = store_with_recorder();
        settings.add_vocabulary_term("Drive").await.unwrap();

        let replacement = AppSettings {
            data_saver: true,
            ..AppSettings::default()
        };
        settings.replace(replacement.clone()).await.unwrap();
        assert_eq!(settings.get(), replacement);
        assert!(settings.vocabulary().is_empty());
    }
}
