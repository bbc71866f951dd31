//! Voice-preset catalog and the rule table that maps features to a preset.
//!
//! ```text
//! label + pitch ──► gender ──► keyword rules ──► feature rules ──► branch default
//! ```
//!
//! The catalog is an immutable value: build it once (built-in or from JSON)
//! and pass it by reference to every mapping call.

mod builtin;

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::analysis::{FeatureKey, FeatureVector};
use crate::error::{Result, VocalisError};

/// Above this pitch an unlabelled voice is treated as female.
pub const FEMALE_PITCH_HZ: f32 = 180.0;
/// Below this pitch an unlabelled voice is treated as male.
pub const MALE_PITCH_HZ: f32 = 150.0;

const FEMALE_WORDS: &[&str] = &["female", "girl", "woman", "lady", "feminine"];
const MALE_WORDS: &[&str] = &["male", "man", "boy", "guy", "masculine"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Female,
    Male,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PitchBand {
    Low,
    Mid,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoicePreset {
    pub id: String,
    pub pitch_band: PitchBand,
    pub style: String,
    pub gender: Gender,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Condition under which a [`PresetRule`] fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "when", rename_all = "snake_case")]
pub enum Predicate {
    /// Any of `words` appears as a whole word in the label (case-insensitive).
    LabelKeyword { words: Vec<String> },
    /// `feature > value`.
    FeatureAbove { feature: FeatureKey, value: f32 },
    /// `feature < value`.
    FeatureBelow { feature: FeatureKey, value: f32 },
}

impl Predicate {
    fn is_label(&self) -> bool {
        matches!(self, Predicate::LabelKeyword { .. })
    }

    fn matches(&self, features: &FeatureVector, words: &[String]) -> bool {
        match self {
            Predicate::LabelKeyword { words: wanted } => wanted
                .iter()
                .any(|w| words.iter().any(|have| have.eq_ignore_ascii_case(w))),
            Predicate::FeatureAbove { feature, value } => features.get(*feature) > *value,
            Predicate::FeatureBelow { feature, value } => features.get(*feature) < *value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetRule {
    pub gender: Gender,
    #[serde(flatten)]
    pub predicate: Predicate,
    pub preset: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchDefaults {
    pub female: String,
    pub male: String,
}

/// Serialised form of a catalog. Validated by [`PresetCatalog::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogDefinition {
    pub presets: Vec<VoicePreset>,
    pub rules: Vec<PresetRule>,
    pub defaults: BranchDefaults,
}

#[derive(Debug, Clone)]
struct ResolvedRule {
    gender: Gender,
    predicate: Predicate,
    preset: usize,
}

/// An immutable, validated preset catalog with its decision rules.
#[derive(Debug, Clone)]
pub struct PresetCatalog {
    presets: Vec<VoicePreset>,
    rules: Vec<ResolvedRule>,
    female_default: usize,
    male_default: usize,
}

impl Default for PresetCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PresetCatalog {
    /// The eight-voice catalog shipped with the crate.
    pub fn builtin() -> Self {
        Self::resolve(builtin::definition())
    }

    /// Validate `definition` and build a catalog from it.
    pub fn new(definition: CatalogDefinition) -> Result<Self> {
        validate(&definition)?;
        Ok(Self::resolve(definition))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let definition: CatalogDefinition = serde_json::from_str(json)
            .map_err(|e| VocalisError::Catalog(format!("parse: {e}")))?;
        Self::new(definition)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let catalog = Self::from_json(&std::fs::read_to_string(path)?)?;
        info!(
            path = %path.display(),
            presets = catalog.presets.len(),
            rules = catalog.rules.len(),
            "loaded preset catalog"
        );
        Ok(catalog)
    }

    /// Index lookups for an already-validated definition.
    fn resolve(definition: CatalogDefinition) -> Self {
        let CatalogDefinition {
            presets,
            rules,
            defaults,
        } = definition;
        let index = |id: &str| presets.iter().position(|p| p.id == id);
        let rules = rules
            .into_iter()
            .filter_map(|r| {
                Some(ResolvedRule {
                    gender: r.gender,
                    preset: index(&r.preset)?,
                    predicate: r.predicate,
                })
            })
            .collect();
        let female_default = index(&defaults.female).unwrap_or(0);
        let male_default = index(&defaults.male).unwrap_or(0);
        Self {
            presets,
            rules,
            female_default,
            male_default,
        }
    }

    pub fn presets(&self) -> &[VoicePreset] {
        &self.presets
    }

    pub fn get(&self, id: &str) -> Option<&VoicePreset> {
        self.presets.iter().find(|p| p.id == id)
    }

    /// The serialisable definition this catalog was built from.
    pub fn definition(&self) -> CatalogDefinition {
        CatalogDefinition {
            presets: self.presets.clone(),
            rules: self
                .rules
                .iter()
                .map(|r| PresetRule {
                    gender: r.gender,
                    predicate: r.predicate.clone(),
                    preset: self.presets[r.preset].id.clone(),
                })
                .collect(),
            defaults: BranchDefaults {
                female: self.presets[self.female_default].id.clone(),
                male: self.presets[self.male_default].id.clone(),
            },
        }
    }

    /// Pick exactly one preset for `features` and the free-text `label`.
    pub fn map_preset(&self, features: &FeatureVector, label: &str) -> &VoicePreset {
        let words = label_words(label);
        let gender = infer_gender(features.pitch_hz, &words);

        let branch = move || self.rules.iter().filter(move |r| r.gender == gender);
        let hit = branch()
            .filter(|r| r.predicate.is_label())
            .chain(branch().filter(|r| !r.predicate.is_label()))
            .find(|r| r.predicate.matches(features, &words));

        let index = match (hit, gender) {
            (Some(rule), _) => rule.preset,
            (None, Gender::Female) => self.female_default,
            (None, Gender::Male) => self.male_default,
        };
        let preset = &self.presets[index];
        debug!(label, ?gender, preset = %preset.id, "preset mapped");
        preset
    }
}

/// Free-function form of [`PresetCatalog::map_preset`].
pub fn map_preset<'a>(
    catalog: &'a PresetCatalog,
    features: &FeatureVector,
    label: &str,
) -> &'a VoicePreset {
    catalog.map_preset(features, label)
}

/// Lower-cased alphanumeric words of `label`.
fn label_words(label: &str) -> Vec<String> {
    label
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Keywords decide when exactly one side matches; otherwise pitch does,
/// and the ambiguous middle band is treated as female.
fn infer_gender(pitch_hz: f32, words: &[String]) -> Gender {
    let has = |set: &[&str]| words.iter().any(|w| set.contains(&w.as_str()));
    match (has(FEMALE_WORDS), has(MALE_WORDS)) {
        (true, false) => Gender::Female,
        (false, true) => Gender::Male,
        _ if pitch_hz > FEMALE_PITCH_HZ => Gender::Female,
        _ if pitch_hz < MALE_PITCH_HZ => Gender::Male,
        _ => Gender::Female,
    }
}

fn validate(definition: &CatalogDefinition) -> Result<()> {
    let bad = |msg: String| Err(VocalisError::Catalog(msg));
    if definition.presets.is_empty() {
        return bad("catalog has no presets".into());
    }

    let mut seen = std::collections::HashSet::new();
    for p in &definition.presets {
        if p.id.trim().is_empty() {
            return bad("preset with empty id".into());
        }
        if !seen.insert(p.id.as_str()) {
            return bad(format!("duplicate preset id {:?}", p.id));
        }
    }

    let gender_of = |id: &str| {
        definition
            .presets
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.gender)
    };

    for (branch, id) in [
        (Gender::Female, &definition.defaults.female),
        (Gender::Male, &definition.defaults.male),
    ] {
        match gender_of(id) {
            None => return bad(format!("default preset {id:?} is not in the catalog")),
            Some(g) if g != branch => {
                return bad(format!("default preset {id:?} is not {branch:?}"));
            }
            Some(_) => {}
        }
    }

    for (i, rule) in definition.rules.iter().enumerate() {
        match gender_of(&rule.preset) {
            None => return bad(format!("rule {i} names unknown preset {:?}", rule.preset)),
            Some(g) if g != rule.gender => {
                return bad(format!(
                    "rule {i} maps a {:?} branch to {:?} preset {:?}",
                    rule.gender, g, rule.preset
                ));
            }
            Some(_) => {}
        }
        match &rule.predicate {
            Predicate::LabelKeyword { words } if words.iter().all(|w| w.trim().is_empty()) => {
                return bad(format!("rule {i} has no keywords"));
            }
            Predicate::FeatureAbove { value, .. } | Predicate::FeatureBelow { value, .. }
                if !value.is_finite() =>
            {
                return bad(format!("rule {i} has a non-finite threshold"));
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(pitch_hz: f32) -> FeatureVector {
        FeatureVector {
            pitch_hz,
            rms_energy: 0.1,
            peak_amplitude: 0.8,
            spectral_centroid_hz: 2000.0,
            spectral_rolloff_hz: 4000.0,
            spectral_bandwidth_hz: 500.0,
            warmth: 0.3,
            breathiness: 0.2,
            clarity: 0.5,
            speaking_rate: 1.0,
        }
    }

    fn id<'a>(catalog: &'a PresetCatalog, f: &FeatureVector, label: &str) -> &'a str {
        catalog.map_preset(f, label).id.as_str()
    }

    #[test]
    fn builtin_definition_is_valid() {
        validate(&builtin::definition()).unwrap();
        let catalog = PresetCatalog::builtin();
        assert_eq!(catalog.presets().len(), 8);
        assert_eq!(catalog.definition(), builtin::definition());
    }

    #[test]
    fn female_is_not_read_as_male() {
        let c = PresetCatalog::builtin();
        // Low pitch would pick the male branch if "female" matched "male".
        assert_eq!(id(&c, &features(120.0), "Female narrator"), "af_sarah");
        assert_eq!(id(&c, &features(240.0), "male narrator"), "am_michael");
    }

    #[test]
    fn conflicting_keywords_defer_to_pitch() {
        let c = PresetCatalog::builtin();
        assert_eq!(id(&c, &features(120.0), "man or woman"), "am_michael");
        assert_eq!(id(&c, &features(220.0), "man or woman"), "af_sarah");
    }

    #[test]
    fn pitch_decides_without_keywords() {
        let c = PresetCatalog::builtin();
        assert_eq!(c.map_preset(&features(200.0), "").gender, Gender::Female);
        assert_eq!(c.map_preset(&features(140.0), "").gender, Gender::Male);
        // Ambiguous band defaults to the female branch.
        assert_eq!(c.map_preset(&features(165.0), "").gender, Gender::Female);
    }

    #[test]
    fn female_rules_in_priority_order() {
        let c = PresetCatalog::builtin();
        let mut clear = features(220.0);
        clear.clarity = 0.9;
        assert_eq!(id(&c, &clear, "Asian woman"), "af_bella");
        assert_eq!(id(&c, &clear, "Russian soprano"), "af_nicole");
        assert_eq!(id(&c, &clear, "high voice"), "af_nicole");
        assert_eq!(id(&c, &clear, "British actress"), "bf_emma");
        assert_eq!(id(&c, &clear, "UK"), "bf_emma");
        // Keywords beat the clarity threshold; without them clarity wins.
        assert_eq!(id(&c, &clear, "newsreader"), "af_sky");
        assert_eq!(id(&c, &features(220.0), "newsreader"), "af_sarah");
    }

    #[test]
    fn male_rules_in_priority_order() {
        let c = PresetCatalog::builtin();
        let mut warm = features(110.0);
        warm.warmth = 0.7;
        assert_eq!(id(&c, &warm, "British gentleman"), "bm_george");
        assert_eq!(id(&c, &warm, "baritone"), "am_adam");
        assert_eq!(id(&c, &features(110.0), "baritone"), "am_michael");
    }

    #[test]
    fn keywords_match_whole_words_only() {
        let c = PresetCatalog::builtin();
        // "highlands" does not contain the word "high".
        assert_eq!(id(&c, &features(220.0), "highlands"), "af_sarah");
        assert_eq!(id(&c, &features(220.0), "high-pitched"), "af_nicole");
    }

    #[test]
    fn mapping_is_total_and_deterministic() {
        let c = PresetCatalog::builtin();
        let labels = ["", "female", "male", "asian", "uk man", "x", "ГОЛОС"];
        for pitch in (50..=500).step_by(10) {
            for label in labels {
                let f = features(pitch as f32);
                let first = c.map_preset(&f, label);
                assert!(c.get(&first.id).is_some());
                assert_eq!(first, c.map_preset(&f, label));
            }
        }
    }

    #[test]
    fn json_catalog_round_trips_and_validates() {
        let json = serde_json::to_string(&builtin::definition()).unwrap();
        let c = PresetCatalog::from_json(&json).unwrap();
        assert_eq!(c.presets().len(), 8);

        let mut def = builtin::definition();
        def.defaults.male = "af_sky".into();
        assert!(matches!(PresetCatalog::new(def), Err(VocalisError::Catalog(_))));

        let mut def = builtin::definition();
        def.rules[0].preset = "nobody".into();
        assert!(matches!(PresetCatalog::new(def), Err(VocalisError::Catalog(_))));

        let mut def = builtin::definition();
        def.presets.push(def.presets[0].clone());
        assert!(matches!(PresetCatalog::new(def), Err(VocalisError::Catalog(_))));
    }

    #[test]
    fn extra_rules_extend_the_table() {
        let mut def = builtin::definition();
        def.rules.insert(
            0,
            PresetRule {
                gender: Gender::Male,
                predicate: Predicate::FeatureBelow {
                    feature: FeatureKey::SpeakingRate,
                    value: 0.7,
                },
                preset: "bm_george".into(),
            },
        );
        let c = PresetCatalog::new(def).unwrap();
        let mut slow = features(110.0);
        slow.speaking_rate = 0.6;
        assert_eq!(id(&c, &slow, ""), "bm_george");
    }
}
