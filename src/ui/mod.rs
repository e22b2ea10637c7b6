//! UI module for CLI output
//!
//! rbup spends most of its life inside CI jobs, so every helper here
//! degrades to plain line output when stdout is not an interactive
//! terminal. Locally it uses `cliclack` spinners and an `indicatif`
//! byte bar for downloads.

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{key_value, outro_success, step_info, step_ok, step_warn};
pub use progress::{DownloadProgress, TaskSpinner};
