//! Research sessions for synthflow
//!
//! - [`model`]: the [`Session`] and its per-stage [`StageRecord`]s
//! - [`artifacts`]: typed stage outputs and the required-output rules
//! - [`merge`]: duplicate-suppressing merge used by non-destructive retries
//! - [`validator`]: demotes completed stages whose output is missing
//! - [`store`] / [`file_store`]: the [`SessionStore`] seam with in-memory and
//!   JSON-file implementations

pub mod artifacts;
pub mod file_store;
pub mod merge;
pub mod model;
pub mod store;
pub mod validator;

pub use artifacts::{
    Analysis, Application, Artifacts, GapAnalysis, Paper, Retrieval, Solution, StageOutput, Topic,
};
pub use file_store::JsonFileStore;
pub use model::{
    INITIAL_PROGRESS, INTERRUPTED_ERROR, Session, StageRecord, SubTaskRecord, progress_after,
};
pub use store::{Commit, MemoryStore, Mutation, SessionStore, mutate};
pub use validator::{Correction, reconcile};
