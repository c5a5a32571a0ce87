//! Likeguard Client Library
//!
//! This crate provides identity resolution and a convenient Rust client for
//! the likeguard like service HTTP API.
//!
//! # Examples
//!
//! ```no_run
//! use likeguard_client::{DeviceSignals, IdentityResolver, LikeClient};
//! use likeguard_client::identity::FingerprintSource;
//! use likeguard_core::SubjectKind;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     # struct NoSource;
//!     # impl FingerprintSource for NoSource {
//!     #     fn visitor_id(&self) -> Result<String, likeguard_client::identity::FingerprintError> {
//!     #         Err(likeguard_client::identity::FingerprintError("unavailable".into()))
//!     #     }
//!     # }
//!     let resolver = IdentityResolver::<NoSource>::new(
//!         None,
//!         DeviceSignals {
//!             user_agent: "agent/1.0".to_string(),
//!             screen_width: 1920,
//!             screen_height: 1080,
//!             timezone_offset_minutes: -420,
//!         },
//!     );
//!
//!     let client = LikeClient::new("http://localhost:8080")?;
//!     let outcome = client
//!         .toggle(SubjectKind::Policy, 42, resolver.resolve())
//!         .await?;
//!     println!("{}: {} likes", outcome.action, outcome.count);
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod identity;

// Re-exports
pub use client::{LikeClient, LikeStateResponse, ToggleResponse};
pub use error::{ClientError, Result};
pub use identity::{DeviceSignals, IdentityResolver};
