//! Identity resolution for anonymous like actions.
//!
//! The resolved identity is a weak, spoofable pseudo-identity used to
//! deduplicate likes and feed rate limiting. It is never an authentication
//! credential. Resolution prefers a real fingerprinting source and falls back
//! to a deterministic token derived from low-entropy device signals, so it
//! always produces *some* identity without raising.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use likeguard_core::Identity;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("fingerprint source unavailable: {0}")]
pub struct FingerprintError(pub String);

/// Primary identity mechanism, typically backed by a device-fingerprinting
/// library. May fail to load or execute.
pub trait FingerprintSource {
    fn visitor_id(&self) -> Result<String, FingerprintError>;
}

/// Low-entropy signals available on any client, used for the fallback token.
#[derive(Debug, Clone)]
pub struct DeviceSignals {
    pub user_agent: String,
    pub screen_width: u32,
    pub screen_height: u32,
    pub timezone_offset_minutes: i32,
}

impl DeviceSignals {
    /// Deterministic fixed-length token: base64 of
    /// `"{ua}-{w}x{h}-{tz}"`, truncated to 32 characters.
    pub fn fallback_token(&self) -> String {
        let raw = format!(
            "{}-{}x{}-{}",
            self.user_agent, self.screen_width, self.screen_height, self.timezone_offset_minutes
        );
        let mut token = STANDARD.encode(raw.as_bytes());
        token.truncate(32);
        token
    }
}

/// Resolves and caches one identity for the lifetime of the resolver.
/// Repeated calls are idempotent and never perform I/O beyond the primary
/// source's own work on the first call.
pub struct IdentityResolver<F: FingerprintSource> {
    primary: Option<F>,
    signals: DeviceSignals,
    cached: OnceLock<String>,
}

impl<F: FingerprintSource> IdentityResolver<F> {
    pub fn new(primary: Option<F>, signals: DeviceSignals) -> Self {
        Self {
            primary,
            signals,
            cached: OnceLock::new(),
        }
    }

    /// Never fails: a primary failure or an unusable primary token falls back
    /// to the deterministic device-signal token.
    pub fn resolve(&self) -> &str {
        self.cached.get_or_init(|| {
            if let Some(source) = &self.primary {
                match source.visitor_id() {
                    Ok(id) if Identity::new(id.clone()).is_ok() => return id,
                    Ok(_) | Err(_) => {}
                }
            }
            self.signals.fallback_token()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct FixedSource(&'static str);

    impl FingerprintSource for FixedSource {
        fn visitor_id(&self) -> Result<String, FingerprintError> {
            Ok(self.0.to_string())
        }
    }

    struct FailingSource;

    impl FingerprintSource for FailingSource {
        fn visitor_id(&self) -> Result<String, FingerprintError> {
            Err(FingerprintError("agent blocked".to_string()))
        }
    }

    struct CountingSource(Cell<u32>);

    impl FingerprintSource for CountingSource {
        fn visitor_id(&self) -> Result<String, FingerprintError> {
            let n = self.0.get() + 1;
            self.0.set(n);
            Ok(format!("visitor-{n}"))
        }
    }

    fn signals() -> DeviceSignals {
        DeviceSignals {
            user_agent: "Mozilla/5.0 (X11; Linux x86_64)".to_string(),
            screen_width: 1920,
            screen_height: 1080,
            timezone_offset_minutes: -420,
        }
    }

    #[test]
    fn test_primary_source_wins() {
        let resolver = IdentityResolver::new(Some(FixedSource("abc123")), signals());
        assert_eq!(resolver.resolve(), "abc123");
    }

    #[test]
    fn test_fallback_is_deterministic_and_fixed_length() {
        let resolver = IdentityResolver::<FailingSource>::new(Some(FailingSource), signals());
        let token = resolver.resolve().to_string();
        assert_eq!(token.len(), 32);
        assert_eq!(token, signals().fallback_token());
        // The fallback is a valid identity token.
        assert!(Identity::new(token).is_ok());
    }

    #[test]
    fn test_unusable_primary_token_falls_back() {
        let resolver = IdentityResolver::new(Some(FixedSource("has spaces!")), signals());
        assert_eq!(resolver.resolve(), signals().fallback_token());
    }

    #[test]
    fn test_resolution_is_cached() {
        let resolver = IdentityResolver::new(Some(CountingSource(Cell::new(0))), signals());
        let first = resolver.resolve().to_string();
        let second = resolver.resolve().to_string();
        assert_eq!(first, "visitor-1");
        assert_eq!(first, second);
    }

    #[test]
    fn test_no_primary_uses_fallback() {
        let resolver = IdentityResolver::<FixedSource>::new(None, signals());
        assert_eq!(resolver.resolve(), signals().fallback_token());
    }
}
