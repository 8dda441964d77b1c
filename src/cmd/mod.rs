//! CLI command implementations.
//!
//! | Module    | Commands handled                      |
//! |-----------|---------------------------------------|
//! | `project` | `Init`, `List`                        |
//! | `run`     | `Run`                                 |
//! | `status`  | `Status`, `Cancel`, `Reclaim`         |

pub mod project;
pub mod run;
pub mod status;

pub use project::{cmd_init, cmd_list};
pub use run::cmd_run;
pub use status::{cmd_cancel, cmd_reclaim, cmd_status};
