use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::version::CURRENT_VERSION;

/// A prize or a participant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub added_at: String,
}

pub type Prize = Entry;
pub type Participant = Entry;

/// Which entry collection an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Prize,
    Participant,
}

impl EntryKind {
    /// Longest accepted name, in characters.
    pub fn max_name_len(self) -> usize {
        match self {
            EntryKind::Prize => 100,
            EntryKind::Participant => 50,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EntryKind::Prize => "prize",
            EntryKind::Participant => "participant",
        }
    }
}

pub const DEFAULT_BG_COLOR: &str = "#1a1a2e";
pub const DEFAULT_TEXT_COLOR: &str = "#ffffff";
pub const DEFAULT_ACCENT_COLOR: &str = "#0f3460";
pub const DEFAULT_WIN_MESSAGE: &str = "🎉 Congratulations! 🎉";

/// Colors and message used on the draw screen.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct AppearanceConfig {
    pub bg_color: String,
    pub text_color: String,
    pub accent_color: String,
    pub win_message: String,
}

impl Default for AppearanceConfig {
    fn default() -> Self {
        Self {
            bg_color: DEFAULT_BG_COLOR.to_string(),
            text_color: DEFAULT_TEXT_COLOR.to_string(),
            accent_color: DEFAULT_ACCENT_COLOR.to_string(),
            win_message: DEFAULT_WIN_MESSAGE.to_string(),
        }
    }
}

impl AppearanceConfig {
    /// Overlay the string fields of a JSON object onto `self`. Missing or
    /// non-string fields keep their current value.
    pub fn merged_with_value(mut self, value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return self;
        };
        let pick = |field: &str, slot: &mut String| {
            if let Some(s) = obj.get(field).and_then(Value::as_str) {
                *slot = s.to_string();
            }
        };
        pick("bgColor", &mut self.bg_color);
        pick("textColor", &mut self.text_color);
        pick("accentColor", &mut self.accent_color);
        pick("winMessage", &mut self.win_message);
        self
    }

    /// Appearance from a stored value, field by field over the defaults.
    pub fn from_value(value: &Value) -> Self {
        Self::default().merged_with_value(value)
    }

    pub fn apply(&mut self, patch: AppearancePatch) {
        if let Some(v) = patch.bg_color {
            self.bg_color = v;
        }
        if let Some(v) = patch.text_color {
            self.text_color = v;
        }
        if let Some(v) = patch.accent_color {
            self.accent_color = v;
        }
        if let Some(v) = patch.win_message {
            self.win_message = v;
        }
    }
}

/// Partial appearance update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppearancePatch {
    pub bg_color: Option<String>,
    pub text_color: Option<String>,
    pub accent_color: Option<String>,
    pub win_message: Option<String>,
}

impl AppearancePatch {
    pub fn is_empty(&self) -> bool {
        self.bg_color.is_none()
            && self.text_color.is_none()
            && self.accent_color.is_none()
            && self.win_message.is_none()
    }
}

/// The persisted settings document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPayload {
    pub prizes: Vec<Prize>,
    pub participants: Vec<Participant>,
    pub appearance: AppearanceConfig,
    pub version: String,
    pub last_updated: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_migrated: Option<String>,
    /// Fields written by other schema versions, carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SettingsPayload {
    /// Empty payload at the current schema version.
    pub fn fresh(last_updated: String) -> Self {
        Self {
            prizes: Vec::new(),
            participants: Vec::new(),
            appearance: AppearanceConfig::default(),
            version: CURRENT_VERSION.to_string(),
            last_updated,
            last_migrated: None,
            extra: Map::new(),
        }
    }
}

/// Appearance captured when a draw completed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AppearanceSnapshot {
    #[serde(flatten)]
    pub appearance: AppearanceConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
}

impl From<&AppearanceConfig> for AppearanceSnapshot {
    fn from(appearance: &AppearanceConfig) -> Self {
        Self {
            appearance: appearance.clone(),
            theme: None,
        }
    }
}

/// Result of a completed draw, prior to being stamped into the history.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawData {
    pub prize: String,
    pub winner: String,
    pub total_participants: usize,
    pub participants_list: Vec<String>,
    pub settings: AppearanceSnapshot,
}

/// One entry of the draw history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DrawRecord {
    pub id: i64,
    pub timestamp: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
    pub prize: String,
    pub winner: String,
    #[serde(default)]
    pub total_participants: usize,
    #[serde(default)]
    pub participants_list: Vec<String>,
    #[serde(default)]
    pub settings: AppearanceSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_migrated: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Outcome of the most recent migration pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    pub version: String,
    pub migration_date: String,
    #[serde(default)]
    pub migration_errors: Vec<String>,
}
