pub mod config;
pub mod error;
pub mod geojson;
pub mod refresh;

pub use config::*;
pub use error::*;
pub use geojson::*;
pub use refresh::*;
