//! Per-character configuration.
//!
//! A character is described by one JSON file: its name, the system instruction
//! sent with every request, the rendering back-end, and the emotion/costume
//! tables. The file is read once when a session starts and compiled into an
//! immutable [`PresentationTable`].

use crate::ai::presentation::{AnimatorCodes, BlendShapeWeight, ModelType, PresentationTable};
use crate::ai::tags::{CostumeKey, EmotionKey};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionBlendShapeConfig {
    pub emotion_key: String,
    #[serde(default)]
    pub blend_shapes: Vec<BlendShapeWeight>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterProfile {
    pub name: String,
    pub system_instruction: String,
    pub model_type: ModelType,

    /// Emotion used when a reply has no usable tag or names an unknown one.
    #[serde(default)]
    pub fallback_emotion: EmotionKey,
    #[serde(default)]
    pub default_costume: CostumeKey,

    /// Shape names exposed by the face mesh (blend-shape back-end).
    #[serde(default)]
    pub blend_shape_names: Vec<String>,
    #[serde(default)]
    pub blend_shape_emotions: Vec<EmotionBlendShapeConfig>,

    /// Emotion key → (eye, eyebrow, mouth, effect) codes (animator back-end).
    #[serde(default)]
    pub animator_emotions: BTreeMap<String, AnimatorCodes>,
    /// Animator state names, used to pick `<emotion>_Talk` / `<emotion>_Idle`.
    #[serde(default)]
    pub animator_states: Vec<String>,

    #[serde(default)]
    pub costumes: BTreeMap<String, i32>,
}

impl CharacterProfile {
    /// Read and validate a profile. Any failure is a configuration error:
    /// a session cannot start without its character.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let profile: CharacterProfile =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        profile.validate()?;
        tracing::info!(
            "[Character] Loaded '{}' ({:?}) from {}",
            profile.name,
            profile.model_type,
            path.display()
        );
        Ok(profile)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidCharacter("name is empty".to_string()));
        }
        if self.model_type == ModelType::BlendShape && self.blend_shape_names.is_empty() {
            return Err(ConfigError::InvalidCharacter(
                "blend-shape character lists no blend_shape_names".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for config in &self.blend_shape_emotions {
            if let Some(key) = EmotionKey::new(&config.emotion_key) {
                if !seen.insert(key.clone()) {
                    return Err(ConfigError::InvalidCharacter(format!(
                        "duplicate blend-shape emotion '{}'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }

    /// Compile the emotion and costume tables. Entries with blank keys are
    /// ignored; keys are lowercased.
    pub fn presentation_table(&self) -> PresentationTable {
        let mut table = PresentationTable::new(
            self.model_type,
            self.fallback_emotion.clone(),
            self.default_costume.clone(),
        )
        .with_rig_shapes(self.blend_shape_names.iter().cloned())
        .with_animator_states(self.animator_states.iter().cloned());

        for config in &self.blend_shape_emotions {
            if let Some(key) = EmotionKey::new(&config.emotion_key) {
                table = table.with_blend_shapes(key, config.blend_shapes.clone());
            }
        }
        for (raw, codes) in &self.animator_emotions {
            if let Some(key) = EmotionKey::new(raw) {
                table = table.with_animator_codes(key, *codes);
            }
        }
        for (raw, id) in &self.costumes {
            if let Some(key) = CostumeKey::new(raw) {
                table = table.with_costume(key, *id);
            }
        }
        table
    }
}

/// Load every `*.json` profile in `dir`, skipping (and logging) broken ones.
pub fn load_roster(dir: &Path) -> Vec<CharacterProfile> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("[Character] Cannot read roster {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut paths: Vec<_> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("json"))
        .collect();
    paths.sort();

    paths
        .iter()
        .filter_map(|path| match CharacterProfile::load(path) {
            Ok(profile) => Some(profile),
            Err(e) => {
                tracing::warn!("[Character] Skipping {}: {}", path.display(), e);
                None
            }
        })
        .collect()
}

/// Find a character by name, as selected on the menu screen.
pub fn find_character<'a>(
    roster: &'a [CharacterProfile],
    name: &str,
) -> Option<&'a CharacterProfile> {
    roster.iter().find(|profile| profile.name == name)
}
