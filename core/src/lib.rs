#![allow(missing_docs)]

pub mod providers;

pub use providers::MemoryFs;
pub use vsh_sdk;
