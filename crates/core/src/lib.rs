pub mod config;
pub mod error;

pub use config::{ComputeConfig, Config, load_dotenv};
pub use error::*;
