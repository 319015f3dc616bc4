pub mod context;
pub mod descriptor;
pub mod image_builder;
pub mod inspect;

pub use context::*;
pub use descriptor::*;
pub use image_builder::*;
pub use inspect::*;
