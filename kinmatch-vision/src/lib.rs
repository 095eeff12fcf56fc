pub mod encoder;
pub mod error;
pub mod model;

pub use encoder::Encoder;
pub use error::ExtractError;
