pub mod status;

pub use status::{router, serve};
