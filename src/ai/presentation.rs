//! Presentation resolver — turns a response directive into concrete rig
//! parameters.
//!
//! Two back-ends exist. VRM-style models are driven by per-vertex blend-shape
//! weights (0–100); standard animator models by four integer channels (eye,
//! eyebrow, mouth, effect). Costume selection is shared: one integer id on its
//! own channel.
//!
//! Everything here is a pure function of the directive and an immutable
//! [`PresentationTable`] built once per session. Applying the result to a live
//! model is the renderer's job.

use crate::ai::tags::{CostumeKey, EmotionKey, ResponseDirective};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Rendering back-end a character uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    #[serde(alias = "VRM_BLENDSHAPE")]
    BlendShape,
    #[serde(alias = "STANDARD_ANIMATOR")]
    Animator,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendShapeWeight {
    pub name: String,
    /// 0.0–100.0
    #[serde(default = "full_weight")]
    pub weight: f32,
}

fn full_weight() -> f32 {
    100.0
}

/// Integer codes for the four animator expression channels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimatorCodes {
    pub eye: i32,
    pub eyebrow: i32,
    pub mouth: i32,
    pub effect: i32,
}

/// Resolved parameters for one emotion + costume combination.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VisualState {
    /// Weight for every shape the rig exposes; unconfigured shapes are 0.
    BlendShapes {
        weights: Vec<BlendShapeWeight>,
        costume_id: i32,
    },
    Animator {
        codes: AnimatorCodes,
        costume_id: i32,
    },
}

impl VisualState {
    pub fn costume_id(&self) -> i32 {
        match self {
            VisualState::BlendShapes { costume_id, .. }
            | VisualState::Animator { costume_id, .. } => *costume_id,
        }
    }

    /// Weight of a named shape, `None` for animator states or unknown shapes.
    pub fn weight_of(&self, shape: &str) -> Option<f32> {
        match self {
            VisualState::BlendShapes { weights, .. } => {
                weights.iter().find(|w| w.name == shape).map(|w| w.weight)
            }
            VisualState::Animator { .. } => None,
        }
    }
}

/// Talk/idle animator states to cross-fade into, and how long talking lasts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MotionCue {
    pub talk_state: String,
    pub idle_state: String,
    pub talk_seconds: f32,
}

// ── Table ──────────────────────────────────────────────────

/// Immutable per-character emotion and costume tables.
#[derive(Debug, Clone)]
pub struct PresentationTable {
    model_type: ModelType,
    fallback_emotion: EmotionKey,
    default_costume: CostumeKey,
    /// Shape names the rig reports, in rig order.
    rig_shapes: Vec<String>,
    blend_shapes: HashMap<EmotionKey, Vec<BlendShapeWeight>>,
    animator: HashMap<EmotionKey, AnimatorCodes>,
    costumes: HashMap<CostumeKey, i32>,
    /// Animator states available for talk/idle cues.
    animator_states: HashSet<String>,
}

impl PresentationTable {
    pub fn new(
        model_type: ModelType,
        fallback_emotion: EmotionKey,
        default_costume: CostumeKey,
    ) -> Self {
        let mut costumes = HashMap::new();
        costumes.insert(CostumeKey::default(), 0);
        costumes.insert(default_costume.clone(), 0);
        Self {
            model_type,
            fallback_emotion,
            default_costume,
            rig_shapes: Vec::new(),
            blend_shapes: HashMap::new(),
            animator: HashMap::new(),
            costumes,
            animator_states: HashSet::new(),
        }
    }

    pub fn with_rig_shapes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rig_shapes = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_blend_shapes(mut self, emotion: EmotionKey, pairs: Vec<BlendShapeWeight>) -> Self {
        self.blend_shapes.insert(emotion, pairs);
        self
    }

    pub fn with_animator_codes(mut self, emotion: EmotionKey, codes: AnimatorCodes) -> Self {
        self.animator.insert(emotion, codes);
        self
    }

    pub fn with_costume(mut self, costume: CostumeKey, id: i32) -> Self {
        self.costumes.insert(costume, id);
        self
    }

    pub fn with_animator_states<I, S>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.animator_states = states.into_iter().map(Into::into).collect();
        self
    }

    pub fn model_type(&self) -> ModelType {
        self.model_type
    }

    pub fn fallback_emotion(&self) -> &EmotionKey {
        &self.fallback_emotion
    }

    pub fn default_costume(&self) -> &CostumeKey {
        &self.default_costume
    }

    /// Map `emotion` to a key present in the table for `model_type`, falling
    /// back to the character's fallback emotion.
    pub fn resolve_emotion<'a>(
        &'a self,
        model_type: ModelType,
        emotion: &'a EmotionKey,
    ) -> &'a EmotionKey {
        let known = match model_type {
            ModelType::BlendShape => self.blend_shapes.contains_key(emotion),
            ModelType::Animator => self.animator.contains_key(emotion),
        };
        if known {
            emotion
        } else {
            tracing::debug!(
                "[Presentation] Unknown emotion '{}', using fallback '{}'",
                emotion,
                self.fallback_emotion
            );
            &self.fallback_emotion
        }
    }

    /// Costume id for `costume`; unknown keys map to the default costume.
    pub fn resolve_costume(&self, costume: &CostumeKey) -> i32 {
        self.costumes
            .get(costume)
            .or_else(|| self.costumes.get(&self.default_costume))
            .copied()
            .unwrap_or(0)
    }

    /// Resolve a parsed directive with this table's own model type.
    pub fn resolve_directive(&self, directive: &ResponseDirective) -> VisualState {
        resolve(self.model_type, &directive.emotion, &directive.costume, self)
    }

    /// State shown when no directive is available (errors, restored sessions).
    pub fn fallback_state(&self) -> VisualState {
        resolve(
            self.model_type,
            &self.fallback_emotion,
            &self.default_costume,
            self,
        )
    }
}

// ── Resolution ─────────────────────────────────────────────

pub fn resolve(
    model_type: ModelType,
    emotion: &EmotionKey,
    costume: &CostumeKey,
    table: &PresentationTable,
) -> VisualState {
    let costume_id = table.resolve_costume(costume);
    let emotion = table.resolve_emotion(model_type, emotion);
    match model_type {
        ModelType::BlendShape => VisualState::BlendShapes {
            weights: blend_shape_weights(emotion, table),
            costume_id,
        },
        ModelType::Animator => VisualState::Animator {
            codes: table.animator.get(emotion).copied().unwrap_or_default(),
            costume_id,
        },
    }
}

fn blend_shape_weights(emotion: &EmotionKey, table: &PresentationTable) -> Vec<BlendShapeWeight> {
    let mut weights: Vec<BlendShapeWeight> = table
        .rig_shapes
        .iter()
        .map(|name| BlendShapeWeight {
            name: name.clone(),
            weight: 0.0,
        })
        .collect();

    let Some(pairs) = table.blend_shapes.get(emotion) else {
        return weights;
    };
    for pair in pairs {
        if pair.name.trim().is_empty() {
            continue;
        }
        match weights.iter_mut().find(|w| w.name == pair.name) {
            Some(slot) => slot.weight = pair.weight.clamp(0.0, 100.0),
            None => tracing::warn!(
                "[Presentation] BlendShape '{}' (emotion: {}) not found on the rig",
                pair.name,
                emotion
            ),
        }
    }
    weights
}

/// Talk/idle states for `emotion`, preferring `<emotion>_Talk` and
/// `<emotion>_Idle` when the animator has them.
pub fn motion_cue(emotion: &EmotionKey, clean_text: &str, table: &PresentationTable) -> MotionCue {
    let pick = |suffix: &str| {
        let specific = format!("{}_{}", emotion, suffix);
        if table.animator_states.contains(&specific) {
            specific
        } else {
            suffix.to_string()
        }
    };
    MotionCue {
        talk_state: pick("Talk"),
        idle_state: pick("Idle"),
        talk_seconds: (clean_text.chars().count() as f32 * 0.07).clamp(1.0, 1000.0),
    }
}
