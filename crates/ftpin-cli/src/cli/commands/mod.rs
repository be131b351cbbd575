//! CLI command handlers, one file per command.

mod completions;
mod fetch;
mod list;

pub use completions::run_completions;
pub use fetch::run_fetch;
pub use list::run_list;
