pub mod echo;
pub mod retry;

use wyre_core::config::ModelConfig;
use wyre_core::error::{Result, WyreError};
use wyre_core::traits::LanguageModel;

pub use echo::EchoModel;
pub use retry::RetryingModel;

/// Create a model based on the provider name.
///
/// Network providers are injected by the host; only the built-in
/// deterministic models are constructible from config alone.
pub fn create_model(config: &ModelConfig) -> Result<Box<dyn LanguageModel>> {
    match config.provider.as_str() {
        "echo" => Ok(Box::new(EchoModel::new())),
        other => Err(WyreError::UnsupportedProvider(other.to_string())),
    }
}
