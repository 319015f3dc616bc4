pub mod merge;
pub mod service;
pub mod sources;

pub use merge::*;
pub use service::*;
pub use sources::*;
