use crate::math::coordinates::DEFAULT_NORMALIZATION_TOLERANCE;

#[derive(Debug, Clone)]
pub struct TranscodeConfig {
    /// Export host nodes without provenance as new annotations.
    pub include_untracked: bool,
    /// How far a rotation may drift from unit length before it is
    /// renormalized and reported.
    pub normalization_tolerance: f64,
    /// Language key for labels generated from host node names.
    pub label_language: String,
    pub pretty: bool,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            include_untracked: false,
            normalization_tolerance: DEFAULT_NORMALIZATION_TOLERANCE,
            label_language: "en".to_string(),
            pretty: true,
        }
    }
}
