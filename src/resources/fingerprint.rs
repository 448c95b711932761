//! Configuration fingerprints for cached resources.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Derived key over every configuration input that affects how a resource
/// must be built. Equality determines reuse eligibility.
///
/// The summary names the non-secret inputs so a drift conflict can be logged
/// without leaking credentials.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    digest: u64,
    summary: String,
}

impl Fingerprint {
    pub fn builder(resource: &str) -> FingerprintBuilder {
        let mut hasher = DefaultHasher::new();
        resource.hash(&mut hasher);
        FingerprintBuilder {
            hasher,
            summary_parts: vec![resource.to_string()],
        }
    }

    /// Redacted, human-readable description of the inputs.
    pub fn summary(&self) -> &str {
        &self.summary
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{:016x}", self.summary, self.digest)
    }
}

/// Accumulates fingerprint inputs.
pub struct FingerprintBuilder {
    hasher: DefaultHasher,
    summary_parts: Vec<String>,
}

impl FingerprintBuilder {
    /// A non-secret input, shown in the summary.
    pub fn input(mut self, name: &str, value: &str) -> Self {
        name.hash(&mut self.hasher);
        value.hash(&mut self.hasher);
        self.summary_parts.push(format!("{name}={value}"));
        self
    }

    /// A secret input. Hashed into the digest, redacted in the summary.
    pub fn secret(mut self, name: &str, value: &str) -> Self {
        name.hash(&mut self.hasher);
        value.hash(&mut self.hasher);
        self.summary_parts.push(format!("{name}=<redacted>"));
        self
    }

    /// A boolean capability flag.
    pub fn flag(mut self, name: &str, value: bool) -> Self {
        name.hash(&mut self.hasher);
        value.hash(&mut self.hasher);
        self.summary_parts.push(format!("{name}={value}"));
        self
    }

    pub fn finish(self) -> Fingerprint {
        Fingerprint {
            digest: self.hasher.finish(),
            summary: self.summary_parts.join(" "),
        }
    }
}
