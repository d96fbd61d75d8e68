use thiserror::Error;

/// Error type of the force-field subsystem.
///
/// Every failure is surfaced synchronously at the call that provoked it;
/// nothing is retried internally. A failing call either commits nothing or
/// reports after leaving the subsystem state unchanged.
#[derive(Debug, Error)]
pub enum ForceFieldError {
    /// A numeric argument fell outside its admissible range.
    #[error("{name} = {value} is out of range: {requirement}")]
    Range {
        name: &'static str,
        value: f64,
        requirement: &'static str,
    },

    /// An index does not refer to a live entity.
    #[error("{kind} index {index} does not refer to a live entry")]
    InvalidKey { kind: &'static str, index: usize },

    /// A registry slot or parameter tuple is already populated.
    #[error("{kind} already defined: {detail}")]
    DuplicateKey { kind: &'static str, detail: String },

    /// An edit would corrupt the cluster tree or the body partition:
    /// cyclic containment, double parentage, overlap, re-attachment.
    #[error("topology violation: {0}")]
    Topology(String),

    /// Realization found a bonded tuple with no matching parameter entry,
    /// or an atom whose parameters are incomplete.
    #[error("missing parameter: {0}")]
    MissingParameter(String),

    /// A stage-dependent operation ran before its stage was realized.
    #[error("'{operation}' requires the {requires} stage to be realized")]
    Stage {
        operation: &'static str,
        requires: &'static str,
    },

    /// A parameter script failed to parse on replay.
    #[error("parameter script parse error: {source}")]
    ScriptParse {
        #[from]
        source: toml::de::Error,
    },

    /// A parameter script failed to serialize on emission.
    #[error("parameter script emission error: {source}")]
    ScriptEmit {
        #[from]
        source: toml::ser::Error,
    },
}
