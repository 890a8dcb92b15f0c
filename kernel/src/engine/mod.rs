//! Provides an engine implementation that implements the required traits. The engine can
//! optionally be built into the kernel by setting the `tokio` feature flag. See the
//! [`default`] module for more information.

#[cfg(feature = "tokio")]
pub mod default;
