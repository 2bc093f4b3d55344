//! Report renderers: JSON, colored terminal text and CSV tables.

pub mod csv;
pub mod json;
pub mod terminal;

pub use json::{to_json, to_json_pretty, write_json};
pub use terminal::format_report;
