use thiserror::Error;

#[derive(Debug, Error)]
pub enum GlycoraError {
    #[error("incomplete patient data: {0}")]
    IncompletePatientData(String),

    #[error("config validation failed: {0}")]
    ConfigValidation(String),

    #[error("no eligible drug remains after exclusion rules")]
    NoEligibleDrug,

    #[error("no dose rule covers eGFR {egfr} for class {class}")]
    NoDoseRuleForBand { class: String, egfr: f64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, GlycoraError>;
