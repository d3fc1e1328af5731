// Output module
pub mod table;

pub use table::{OutputFormat, RuleCheckRow};
