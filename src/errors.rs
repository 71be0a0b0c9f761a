use crate::result::Status;

quick_error! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum DKIMError {
        InvalidMessage(err: String) {
            display("invalid message: {}", err)
        }
        SignatureSyntaxError(err: String) {
            display("signature syntax error: {}", err)
        }
        SignatureMissingRequiredTag(name: &'static str) {
            display("signature missing required tag ({})", name)
        }
        IncompatibleVersion {
            display("incompatible version")
        }
        DomainMismatch {
            display("domain mismatch")
        }
        FromFieldNotSigned {
            display("From field not signed")
        }
        SignatureExpired {
            display("signature expired")
        }
        UnsupportedQueryMethod {
            display("unsupported query method")
        }
        UnsupportedCanonicalizationType(value: String) {
            display("unsupported canonicalization type: {}", value)
        }
        UnsupportedHashAlgorithm(value: String) {
            display("unsupported hash algorithm: {}", value)
        }
        BodyTooShort(wanted: usize, actual: usize) {
            display("l= tag covers {} bytes but canonical body has only {}", wanted, actual)
        }
        InvalidSelector(selector: String) {
            display("invalid selector: {}", selector)
        }
        BodyHashDidNotVerify {
            display("body hash did not verify")
        }
        SignatureDidNotVerify {
            display("signature did not verify")
        }
        KeyRevoked {
            display("key revoked")
        }
        KeyIncompatibleVersion {
            display("incompatible key record version")
        }
        InappropriateKeyAlgorithm(value: String) {
            display("inappropriate key algorithm: {}", value)
        }
        InappropriateHashAlgorithm(value: String) {
            display("inappropriate hash algorithm for key: {}", value)
        }
        InappropriateServiceType(value: String) {
            display("inappropriate service type: {}", value)
        }
        KeyUnparsable(err: String) {
            display("unparsable public key: {}", err)
        }
        KeySyntaxError(err: String) {
            display("key record syntax error: {}", err)
        }
        KeyUnavailable(err: String) {
            display("key unavailable: {}", err)
        }
        NoKeyRecords {
            display("no key records found")
        }
        UnknownInternalError(err: String) {
            display("internal error: {}", err)
        }
    }
}

impl DKIMError {
    /// Failure class per RFC 6376 section 3.9: transient conditions are
    /// retryable, everything else is permanent.
    pub fn status(&self) -> Status {
        use DKIMError::*;
        match self {
            KeySyntaxError(_) | KeyUnavailable(_) | NoKeyRecords | UnknownInternalError(_) => {
                Status::Tempfail
            }
            InvalidMessage(_)
            | SignatureSyntaxError(_)
            | SignatureMissingRequiredTag(_)
            | IncompatibleVersion
            | DomainMismatch
            | FromFieldNotSigned
            | SignatureExpired
            | UnsupportedQueryMethod
            | UnsupportedCanonicalizationType(_)
            | UnsupportedHashAlgorithm(_)
            | BodyTooShort(_, _)
            | InvalidSelector(_)
            | BodyHashDidNotVerify
            | SignatureDidNotVerify
            | KeyRevoked
            | KeyIncompatibleVersion
            | InappropriateKeyAlgorithm(_)
            | InappropriateHashAlgorithm(_)
            | InappropriateServiceType(_)
            | KeyUnparsable(_) => Status::Permfail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classes() {
        assert_eq!(DKIMError::NoKeyRecords.status(), Status::Tempfail);
        assert_eq!(
            DKIMError::KeyUnavailable("timeout".to_owned()).status(),
            Status::Tempfail
        );
        assert_eq!(DKIMError::BodyHashDidNotVerify.status(), Status::Permfail);
        assert_eq!(
            DKIMError::SignatureMissingRequiredTag("d").status(),
            Status::Permfail
        );
    }
}
