use thiserror::Error;

/// Errors raised while reading revision scripts or walking the revision graph.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MigrationError {
    #[error("Revision script is missing the '{0}' header")]
    MissingHeader(&'static str),

    #[error("Revision script is missing the '-- {0}' section")]
    MissingSection(&'static str),

    #[error("Unknown header '{key}' on line {line}")]
    UnknownHeader { key: String, line: usize },

    #[error("Revision '{0}' is present more than once")]
    DuplicateRevision(String),

    #[error("Branch label '{0}' is used by more than one revision")]
    DuplicateLabel(String),

    #[error("Revision '{revision}' refers to unknown revision '{missing}'")]
    DanglingReference { revision: String, missing: String },

    #[error("No such revision or branch '{0}'")]
    UnknownRevision(String),

    #[error("Multiple revisions start with '{prefix}': {candidates}")]
    AmbiguousPrefix { prefix: String, candidates: String },

    #[error("Multiple head revisions are present for given argument '{0}'; please specify a specific target revision, '<branchname>@{0}' to narrow to a specific head, or 'heads' for all heads")]
    MultipleHeads(String),

    #[error("Revision graph contains a cycle through '{0}'")]
    Cycle(String),

    #[error("Relative revision '{0}' didn't produce {1} migrations")]
    RelativeOutOfRange(String, u32),

    #[error("Invalid revision range '{0}'; format is [start]:[end]")]
    InvalidRange(String),

    #[error("Revision '{0}' is not a head revision; use --splice to create a new branch from it")]
    NotAHead(String),
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrationError>;
