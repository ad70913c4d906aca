//! Interactive review of renamed ebook files.
//!
//! Each file's current name is compared with the original name recorded in
//! its metadata sidecar; the operator then files, moves, renames or skips it
//! from a single-key menu.

pub mod batch;
pub mod config;
pub mod console;
pub mod diff;
pub mod isbn;
pub mod journal;
pub mod keymap;
pub mod normalize;
pub mod relocate;
pub mod review;
pub mod sidecar;
pub mod signal;
pub mod template;
pub mod tokens;
pub mod tools;

pub use batch::{organize, BatchSummary};
pub use config::{Config, SessionState};
pub use console::{Console, Key};
pub use review::{Disposition, Outcome, Reviewer};
pub use tools::{CommandReport, MetadataQuery, SystemTools, Toolbox};
