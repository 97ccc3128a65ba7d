// crates/covenant-config/src/lib.rs
// ============================================================================
// Module: Covenant Configuration
// Description: Strict, fail-closed configuration for the governance runtime.
// Purpose: Load, default, and validate every runtime option in one place.
// Dependencies: covenant-core, serde, toml, thiserror
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size limits and
//! validated field by field before any component starts. Every option has a
//! default so an empty file yields a working development configuration;
//! invalid values fail closed with a stable error.

pub mod config;

pub use config::AuditConfig;
pub use config::BanditConfig;
pub use config::CacheConfig;
pub use config::ConfigError;
pub use config::CovenantConfig;
pub use config::PolicyConfig;
pub use config::ReviewConfig;
pub use config::SandboxConfig;
pub use config::ServerConfig;
pub use config::SynthesisConfig;
pub use config::VerificationConfig;
