pub mod client;
pub mod error;

pub use client::RollcallClient;
pub use error::{SdkError, SdkResult};
pub use rollcall_core as types;
