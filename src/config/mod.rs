pub mod env;
pub mod settings;

pub use env::{EnvSource, SystemEnv};
pub use settings::Config;
