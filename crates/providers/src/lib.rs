//! Completion service providers for bashpilot.
//!
//! All providers implement the `bashpilot_core::Provider` trait.
//! The router selects the correct provider based on configuration.

pub mod openai_compat;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use router::{ProviderRouter, build_from_config, is_keyless};
