// DKIM (RFC 6376) signature verification: https://datatracker.ietf.org/doc/html/rfc6376

use base64::engine::general_purpose;
use base64::Engine;
use slog::debug;
use trust_dns_resolver::TokioAsyncResolver;

#[macro_use]
extern crate quick_error;

pub mod canonicalization;
pub mod crypto;
pub mod dns;
mod errors;
mod hash;
mod header;
mod message;
mod parser;
pub mod public_key;
mod result;

pub use crypto::{Crypto, CryptoError, HashAlg, RsaVerifier};
pub use dns::{from_tokio_resolver, DnsError, TxtLookup, TxtRecord};
pub use errors::DKIMError;
pub use hash::HashAlgo;
pub use header::DKIMHeader;
pub use message::{Header, Message};
pub use parser::{tag_list as parse_tag_list, Tag};
pub use result::{Diagnostic, Report, SignatureResult, Status};

use header::{HEADER, REQUIRED_TAGS};

pub(crate) const DNS_NAMESPACE: &str = "_domainkey";

/// Run DKIM verification over a raw RFC 5322 message with the provided
/// lookup and crypto capabilities. Returns one result per DKIM-Signature
/// header; only an unparseable message errors out of this function.
pub async fn verify_email_with(
    logger: &slog::Logger,
    raw: &[u8],
    resolver: &dyn TxtLookup,
    crypto: &dyn Crypto,
) -> Result<Report, DKIMError> {
    let message = Message::parse(raw)?;

    let mut signatures = Vec::new();
    for (signature_index, sig_header) in message.headers_named(HEADER).enumerate() {
        debug!(
            logger,
            "checking signature {}: {:?}",
            signature_index,
            sig_header.value_string()
        );
        signatures.push(
            verify_signature_header(logger, &message, sig_header, signature_index, resolver, crypto)
                .await,
        );
    }

    Ok(Report { signatures })
}

/// Like [`verify_email_with`], with the built-in RSA verifier.
pub async fn verify_email_with_resolver(
    logger: &slog::Logger,
    raw: &[u8],
    resolver: &dyn TxtLookup,
) -> Result<Report, DKIMError> {
    verify_email_with(logger, raw, resolver, &RsaVerifier).await
}

/// Like [`verify_email_with_resolver`], with a resolver built from the
/// system DNS configuration.
pub async fn verify_email(logger: &slog::Logger, raw: &[u8]) -> Result<Report, DKIMError> {
    let resolver = TokioAsyncResolver::tokio_from_system_conf().map_err(|err| {
        DKIMError::UnknownInternalError(format!("failed to create DNS resolver: {}", err))
    })?;
    let resolver = from_tokio_resolver(resolver);
    verify_email_with_resolver(logger, raw, resolver.as_ref()).await
}

// https://datatracker.ietf.org/doc/html/rfc6376#section-6.1
async fn verify_signature_header(
    logger: &slog::Logger,
    message: &Message,
    sig_header: &Header,
    signature_index: usize,
    resolver: &dyn TxtLookup,
    crypto: &dyn Crypto,
) -> SignatureResult {
    let mut result = SignatureResult::default();

    let dkim_header = match DKIMHeader::parse(sig_header.raw_value()) {
        Ok(header) => header,
        Err(err) => {
            result.fail(err);
            return result;
        }
    };
    result.domain = dkim_header.get_tag("d").map(|d| d.to_owned());
    result.selector = dkim_header.get_tag("s").map(|s| s.to_owned());

    for name in dkim_header.duplicated_tags() {
        result.info(format!("duplicate tag \"{}\": last occurrence used", name));
    }

    // Required tags, https://datatracker.ietf.org/doc/html/rfc6376#section-6.1.1
    for required in REQUIRED_TAGS {
        match dkim_header.get_tag(required) {
            Some(_) => result.info(format!("required tag \"{}\" present", required)),
            None => result.fail(DKIMError::SignatureMissingRequiredTag(required)),
        }
    }

    // Version
    if let Some(version) = dkim_header.get_tag("v") {
        if version == "1" {
            result.info("version 1");
        } else {
            result.fail(DKIMError::IncompatibleVersion);
        }
    }

    // Canonicalization
    let canonicalization = match parser::parse_canonicalization(dkim_header.get_tag("c")) {
        Ok(types) => Some(types),
        Err(err) => {
            result.fail(err);
            None
        }
    };

    // Signature algorithm
    let hash_algo = match dkim_header.get_tag("a") {
        Some(value) => match parser::parse_hash_algo(value) {
            Ok(algo) => {
                if algo == HashAlgo::RsaSha1 {
                    result.info("weak hash algorithm: sha1");
                }
                Some(algo)
            }
            Err(err) => {
                result.fail(err);
                None
            }
        },
        None => None,
    };

    // Body length tag against the canonical body
    let canonical_body =
        canonicalization.map(|(_, body_type)| hash::canonicalize_body(body_type, message.body()));
    let body_length = match dkim_header.get_tag("l") {
        Some(value) => match value.parse::<usize>() {
            Ok(length) => Some(length),
            Err(err) => {
                result.fail(DKIMError::SignatureSyntaxError(format!(
                    "invalid l= tag: {}",
                    err
                )));
                None
            }
        },
        None => None,
    };
    if let (Some(body), Some(length)) = (&canonical_body, body_length) {
        if length > body.len() {
            result.fail(DKIMError::BodyTooShort(length, body.len()));
        }
    }

    // The i= identity must be under the signing domain
    if let (Some(user), Some(domain)) = (dkim_header.get_tag("i"), dkim_header.get_tag("d")) {
        if !user
            .to_ascii_lowercase()
            .ends_with(&domain.to_ascii_lowercase())
        {
            result.fail(DKIMError::DomainMismatch);
        }
    }

    // The From header must be signed
    if let Some(h_tag) = dkim_header.get_tag("h") {
        if !h_tag
            .split(':')
            .any(|name| name.trim().eq_ignore_ascii_case("from"))
        {
            result.fail(DKIMError::FromFieldNotSigned);
        }
    }

    // Expiry
    if let Some(expiration) = dkim_header.get_tag("x") {
        match expiration.parse::<i64>() {
            Ok(expiration) => {
                let now = chrono::Utc::now().timestamp();
                if expiration < now {
                    result.fail(DKIMError::SignatureExpired);
                }
                if let Some(timestamp) = dkim_header.get_tag("t") {
                    match timestamp.parse::<i64>() {
                        Ok(timestamp) => {
                            if expiration < timestamp {
                                result.fail(DKIMError::SignatureExpired);
                            }
                        }
                        Err(err) => result.fail(DKIMError::SignatureSyntaxError(format!(
                            "invalid t= tag: {}",
                            err
                        ))),
                    }
                }
            }
            Err(err) => result.fail(DKIMError::SignatureSyntaxError(format!(
                "invalid x= tag: {}",
                err
            ))),
        }
    }

    // Query method
    if let Some(query_method) = dkim_header.get_tag("q") {
        if !query_method.is_empty() && query_method != "dns/txt" {
            result.fail(DKIMError::UnsupportedQueryMethod);
        }
    }

    // No point in fetching keys or hashing after a permanent failure
    if result.has_permfail() {
        return result;
    }

    let (header_canon, _) = match canonicalization {
        Some(types) => types,
        None => return result,
    };
    let (hash_algo, canonical_body) = match (hash_algo, canonical_body) {
        (Some(algo), Some(body)) => (algo, body),
        _ => return result,
    };

    // Key fetch
    let domain = dkim_header.get_required_tag("d");
    let selector = dkim_header.get_required_tag("s");
    let key_records =
        match public_key::retrieve_key_records(logger, resolver, domain, selector).await {
            Ok(records) => {
                result.info(format!(
                    "fetched {} key record(s) at {}",
                    records.len(),
                    public_key::query_name(domain, selector)
                ));
                records
            }
            Err(err) => {
                result.fail(err);
                return result;
            }
        };

    // Body hash
    let computed_body_hash = match hash::body_hash(crypto, hash_algo, &canonical_body, body_length)
    {
        Ok(hash) => hash,
        Err(err) => {
            result.fail(err);
            return result;
        }
    };
    let header_body_hash = dkim_header.get_required_tag("bh");
    if !crypto::constant_time_eq(computed_body_hash.as_bytes(), header_body_hash.as_bytes()) {
        debug!(
            logger,
            "body hash mismatch on signature {}: computed {}", signature_index, computed_body_hash
        );
        result.fail(DKIMError::BodyHashDidNotVerify);
        return result;
    }
    result.info("body hash verified");

    // Signature verification over the canonical header stream
    let signed = hash::signed_header_stream(
        header_canon,
        dkim_header.get_required_tag("h"),
        sig_header,
        message,
    );
    let signature = match general_purpose::STANDARD.decode(dkim_header.get_required_tag("b")) {
        Ok(signature) => signature,
        Err(err) => {
            result.fail(DKIMError::SignatureSyntaxError(format!(
                "failed to decode signature: {}",
                err
            )));
            return result;
        }
    };

    // The signature and key loops use distinct indices; diagnostics below
    // are attributed to key_index within this signature.
    for (key_index, record) in key_records.iter().enumerate() {
        for name in &record.duplicated {
            result.info(format!(
                "key {}: duplicate tag \"{}\": last occurrence used",
                key_index, name
            ));
        }
        if let Err(err) = record.check_signature(hash_algo) {
            result.fail_key(key_index, err);
            continue;
        }
        if record.is_testing() {
            result.info(format!("key {} is in testing mode (t=y)", key_index));
        }
        let pem = match record.to_pem() {
            Ok(pem) => pem,
            Err(err) => {
                result.fail_key(key_index, err);
                continue;
            }
        };
        match crypto.verify(hash_algo.hash_alg(), &pem, &signed, &signature) {
            Ok(true) => {
                result.verified = true;
                result.info("signature verified");
                return result;
            }
            Ok(false) => result.fail_key(key_index, DKIMError::SignatureDidNotVerify),
            Err(err) => result.fail_key(key_index, DKIMError::KeyUnparsable(err.to_string())),
        }
    }

    result
}

/// Canonical signed-header stream and canonical body for the nth
/// DKIM-Signature header of a raw message. Debugging aid: these are exactly
/// the bytes the body hash and the signature are computed over.
pub fn canonicalized_for_signature(
    raw: &[u8],
    index: usize,
) -> Result<(Vec<u8>, Vec<u8>), DKIMError> {
    let message = Message::parse(raw)?;
    let sig_header = message.headers_named(HEADER).nth(index).ok_or_else(|| {
        DKIMError::SignatureSyntaxError(format!("no DKIM-Signature header at index {}", index))
    })?;
    let dkim_header = DKIMHeader::parse(sig_header.raw_value())?;
    let (header_canon, body_canon) = parser::parse_canonicalization(dkim_header.get_tag("c"))?;
    let h_tag = dkim_header
        .get_tag("h")
        .ok_or(DKIMError::SignatureMissingRequiredTag("h"))?;

    let signed = hash::signed_header_stream(header_canon, h_tag, sig_header, &message);
    let body = hash::canonicalize_body(body_canon, message.body());
    Ok((signed, body))
}
