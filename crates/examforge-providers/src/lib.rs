//! examforge-providers: generation backends and configuration.
//!
//! Implements `GenerationBackend` for the Gemini API and an offline mock,
//! and loads `examforge.toml` into the policies the core engine runs with.

pub mod config;
pub mod gemini;
pub mod mock;

pub use config::{create_backend, load_config, load_config_from, BackendKind, ExamforgeConfig};
pub use examforge_core::error::ProviderError;
pub use gemini::GeminiBackend;
pub use mock::MockBackend;
