pub mod browser;
pub mod config;
pub mod core;
pub mod error;
pub mod model;

pub mod prelude {
    pub use crate::browser::BrowserSession;
    pub use crate::config::Config;
    pub use crate::core::manage::{extract_archive, extract_archives};
    pub use crate::core::update::{process_mod, run, sync_mods, ModSource};
    pub use crate::core::utils::{ensure_dir, read_mod_list, TempDir};
    pub use crate::core::version::{compare, decide, Decision};
    pub use crate::error::ModsyncError;
    pub use crate::model::{Outcome, RunSummary, VersionIndex};
}

// Important functions and structs
pub use crate::config::Config;
pub use crate::core::update::run;
pub use crate::core::version::{compare, decide, Decision};
pub use crate::model::{Outcome, RunSummary, VersionIndex};
