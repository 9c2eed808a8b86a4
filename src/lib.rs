pub mod ciphertext;
pub mod config;
pub mod context;
pub mod dataset;
pub mod error;
pub mod keys;
pub mod params;
pub mod pipeline;

pub use ciphertext::{Ciphertext, Plaintext};
pub use context::{CryptoContext, Feature};
pub use error::{ConfigError, DatasetError, Error};
pub use keys::{KeyPair, PublicKey, SecretKey};
pub use params::{select_scheme, Parameters, Scheme, SecurityLevel};
pub use pipeline::{Arithmetic, PipelineConfig, Reduction, Report};
