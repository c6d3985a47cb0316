//! Derived clinical state synchronization.
//!
//! ```text
//! field write → detector → request → LlmClient → parser → committer → cases row
//! ```
//!
//! `AssistSync` wraps everything after the detector so a failed generation
//! degrades to stale derived fields plus a warning, never a failed edit.

pub mod committer;
pub mod detector;
pub mod error;
pub mod parser;
pub mod store;
pub mod sync;
pub mod traits;
pub mod types;

pub use committer::commit_derived_state;
pub use detector::{cases_to_sync, value_changed};
pub use error::AssistError;
pub use parser::{extract_fenced_block, parse_assist_response};
pub use store::SqliteCaseStore;
pub use sync::AssistSync;
pub use traits::CaseStore;
pub use types::*;
