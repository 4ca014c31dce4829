pub mod manage;
pub mod update;
pub mod utils;
pub mod version;
