use super::{BranchDefaults, CatalogDefinition, Gender, PitchBand, Predicate, PresetRule, VoicePreset};
use crate::analysis::FeatureKey;

fn preset(id: &str, pitch_band: PitchBand, style: &str, gender: Gender, description: &str) -> VoicePreset {
    VoicePreset {
        id: id.into(),
        pitch_band,
        style: style.into(),
        gender,
        description: Some(description.into()),
    }
}

fn keywords(gender: Gender, words: &[&str], preset: &str) -> PresetRule {
    PresetRule {
        gender,
        predicate: Predicate::LabelKeyword {
            words: words.iter().map(|w| w.to_string()).collect(),
        },
        preset: preset.into(),
    }
}

fn above(gender: Gender, feature: FeatureKey, value: f32, preset: &str) -> PresetRule {
    PresetRule {
        gender,
        predicate: Predicate::FeatureAbove { feature, value },
        preset: preset.into(),
    }
}

pub(super) fn definition() -> CatalogDefinition {
    use Gender::{Female, Male};
    use PitchBand::{High, Low, Mid};

    CatalogDefinition {
        presets: vec![
            preset("af_bella", High, "warm", Female, "Soft, warm American female."),
            preset("af_sarah", Mid, "neutral", Female, "Neutral American female."),
            preset("af_nicole", Mid, "refined", Female, "Refined, precise female."),
            preset("af_sky", High, "bright", Female, "Bright, clear female."),
            preset("am_adam", Low, "warm", Male, "Deep, warm American male."),
            preset("am_michael", Mid, "neutral", Male, "Neutral American male."),
            preset("bf_emma", Mid, "british", Female, "British female."),
            preset("bm_george", Low, "british", Male, "British male."),
        ],
        rules: vec![
            keywords(Female, &["asian"], "af_bella"),
            keywords(Female, &["russian", "high"], "af_nicole"),
            keywords(Female, &["british", "uk"], "bf_emma"),
            above(Female, FeatureKey::Clarity, 0.8, "af_sky"),
            keywords(Male, &["british", "uk"], "bm_george"),
            above(Male, FeatureKey::Warmth, 0.6, "am_adam"),
        ],
        defaults: BranchDefaults {
            female: "af_sarah".into(),
            male: "am_michael".into(),
        },
    }
}
