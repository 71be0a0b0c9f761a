use crate::errors::DKIMError;
use std::fmt;

/// Classification of a single diagnostic, following RFC 6376 section 3.9.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Permfail,
    Tempfail,
    Info,
}

impl fmt::Display for Status {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Permfail => write!(fmt, "PERMFAIL"),
            Status::Tempfail => write!(fmt, "TEMPFAIL"),
            Status::Info => write!(fmt, "INFO"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub status: Status,
    pub reason: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}: {}", self.status, self.reason)
    }
}

/// Everything the verifier found out about one DKIM-Signature header, in
/// the order the checks ran.
#[derive(Debug, Clone, Default)]
pub struct SignatureResult {
    pub domain: Option<String>,
    pub selector: Option<String>,
    pub verified: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl SignatureResult {
    pub(crate) fn info<S: Into<String>>(&mut self, reason: S) {
        self.diagnostics.push(Diagnostic {
            status: Status::Info,
            reason: reason.into(),
        });
    }

    pub(crate) fn fail(&mut self, err: DKIMError) {
        self.diagnostics.push(Diagnostic {
            status: err.status(),
            reason: err.to_string(),
        });
    }

    pub(crate) fn fail_key(&mut self, key_index: usize, err: DKIMError) {
        self.diagnostics.push(Diagnostic {
            status: err.status(),
            reason: format!("key {}: {}", key_index, err),
        });
    }

    pub fn has_permfail(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.status == Status::Permfail)
    }

    pub fn has_tempfail(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.status == Status::Tempfail)
    }

    /// The signature verified and nothing else went wrong along the way.
    pub fn passed(&self) -> bool {
        self.verified && !self.has_permfail() && !self.has_tempfail()
    }

    /// Short Authentication-Results style summary.
    pub fn summary(&self) -> &'static str {
        if self.passed() {
            "pass"
        } else if self.has_tempfail() {
            "temperror"
        } else if self.has_permfail() {
            "permerror"
        } else {
            "neutral"
        }
    }
}

/// Per-signature report for a whole message, one entry per DKIM-Signature
/// header in order of appearance.
#[derive(Debug, Clone, Default)]
pub struct Report {
    pub signatures: Vec<SignatureResult>,
}

impl Report {
    /// The message passes DKIM when it carries exactly one signature and
    /// that signature verified with no permanent or transient failure.
    pub fn passes(&self) -> bool {
        self.signatures.len() == 1 && self.signatures[0].passed()
    }
}
