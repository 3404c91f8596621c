//! Shared-secret password gate.

/// Optional single shared secret guarding the client UI.
#[derive(Debug, Clone, Default)]
pub struct PasswordGate {
    secret: Option<String>,
}

impl PasswordGate {
    /// An empty secret disables the gate.
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    pub fn is_required(&self) -> bool {
        self.secret.is_some()
    }

    /// Compare `candidate` against the secret in time independent of where
    /// the first mismatch occurs. An unconfigured gate rejects everything.
    pub fn verify(&self, candidate: &str) -> bool {
        match &self.secret {
            Some(secret) => constant_time_eq(secret.as_bytes(), candidate.as_bytes()),
            None => false,
        }
    }
}

/// Runs over the full secret regardless of the candidate's length.
fn constant_time_eq(secret: &[u8], candidate: &[u8]) -> bool {
    let mut diff = u8::from(secret.len() != candidate.len());
    for (i, &s) in secret.iter().enumerate() {
        let c = candidate.get(i).copied().unwrap_or(0);
        diff |= s ^ c;
    }
    diff == 0
}
