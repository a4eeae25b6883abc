use thiserror::Error;

/// Upstream-contract violations caught at the input boundary.
///
/// Missing-data conditions (empty history, zero possessions, no
/// head-to-head rows) are never reported through this type; they resolve
/// to fallback values inside the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("missing required column `{0}`")]
    MissingColumn(&'static str),

    #[error("row {row}: missing required field `{field}`")]
    MissingField { row: usize, field: &'static str },

    #[error("row {row}: invalid value {value:?} for `{field}`")]
    InvalidField {
        row: usize,
        field: &'static str,
        value: String,
    },

    #[error("unknown team {0:?}")]
    UnknownTeam(String),

    #[error("model `{model}` expects feature `{feature}` which the feature vector does not provide")]
    UnknownFeature { model: String, feature: String },

    #[error("model `{model}` received no value for feature `{feature}`")]
    MissingFeatureValue { model: String, feature: String },

    #[error("model `{model}` artifact is inconsistent: {reason}")]
    InvalidArtifact { model: String, reason: String },
}
