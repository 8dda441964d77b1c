//! Worker-written phase journal: the structured result records the
//! reconciler acts on.

pub mod entry;
pub mod reader;

pub use entry::{Escalation, PhaseJournalEntry, PhaseResult};
pub use reader::{JournalRead, JournalReader};
