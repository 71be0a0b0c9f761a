use crate::canonicalization::{
    self, canonicalize_body_relaxed, canonicalize_body_simple, canonicalize_header_relaxed,
    canonicalize_header_simple, strip_signature_value,
};
use crate::crypto::{Crypto, HashAlg};
use crate::errors::DKIMError;
use crate::message::{Header, Message};
use base64::engine::general_purpose;
use base64::Engine;
use std::collections::HashMap;

/// Signature algorithm from the `a=` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgo {
    RsaSha1,
    RsaSha256,
}

impl HashAlgo {
    pub fn algo_name(&self) -> &'static str {
        match self {
            Self::RsaSha1 => "rsa-sha1",
            Self::RsaSha256 => "rsa-sha256",
        }
    }

    /// Hash half of the algorithm, as named in key record `h=` tags.
    pub fn hash_name(&self) -> &'static str {
        match self {
            Self::RsaSha1 => "sha1",
            Self::RsaSha256 => "sha256",
        }
    }

    /// Key half of the algorithm, as named in key record `k=` tags.
    pub fn key_type(&self) -> &'static str {
        "rsa"
    }

    pub(crate) fn hash_alg(&self) -> HashAlg {
        match self {
            Self::RsaSha1 => HashAlg::Sha1,
            Self::RsaSha256 => HashAlg::Sha256,
        }
    }
}

pub(crate) fn canonicalize_body(
    canonicalization_type: canonicalization::Type,
    body: &[u8],
) -> Vec<u8> {
    match canonicalization_type {
        canonicalization::Type::Simple => canonicalize_body_simple(body),
        canonicalization::Type::Relaxed => canonicalize_body_relaxed(body),
    }
}

/// Hash of the canonical body, truncated to `length` bytes when the
/// signature carries an `l=` tag, base64-encoded for comparison with `bh=`.
/// The caller has already checked `length` against the body size.
pub(crate) fn body_hash(
    crypto: &dyn Crypto,
    hash_algo: HashAlgo,
    canonical_body: &[u8],
    length: Option<usize>,
) -> Result<String, DKIMError> {
    let covered = match length {
        Some(length) if length > canonical_body.len() => {
            return Err(DKIMError::BodyTooShort(length, canonical_body.len()))
        }
        Some(length) => &canonical_body[..length],
        None => canonical_body,
    };
    Ok(general_purpose::STANDARD.encode(crypto.hash(hash_algo.hash_alg(), covered)))
}

/// Pick the message headers covered by the `h=` tag. A name listed more
/// than once selects successive instances from the bottom of the message
/// up, and occurrences beyond the available instances select nothing
/// (RFC 6376 section 5.4.2).
pub(crate) fn select_headers<'a>(h_tag: &str, message: &'a Message) -> Vec<&'a Header> {
    let headers = message.headers();
    let num_headers = headers.len();
    let mut last_index: HashMap<String, usize> = HashMap::new();
    let mut selected = Vec::new();

    'outer: for name in h_tag.split(':').map(|n| n.trim().to_ascii_lowercase()) {
        if name.is_empty() {
            continue;
        }
        let index = *last_index.get(&name).unwrap_or(&num_headers);
        for (header_index, header) in headers
            .iter()
            .enumerate()
            .rev()
            .skip(num_headers - index)
        {
            if header.lower_name() == name {
                selected.push(header);
                last_index.insert(name, header_index);
                continue 'outer;
            }
        }
        last_index.insert(name, 0);
    }

    selected
}

/// The canonical byte stream the signer committed to: every signed header
/// in `h=` order, then the DKIM-Signature header itself with the `b=` value
/// blanked and no trailing CRLF (RFC 6376 section 3.7).
pub(crate) fn signed_header_stream(
    canonicalization_type: canonicalization::Type,
    h_tag: &str,
    dkim_header: &Header,
    message: &Message,
) -> Vec<u8> {
    let mut out = Vec::new();

    for header in select_headers(h_tag, message) {
        match canonicalization_type {
            canonicalization::Type::Simple => {
                canonicalize_header_simple(header.raw_name(), header.raw_value(), &mut out)
            }
            canonicalization::Type::Relaxed => {
                canonicalize_header_relaxed(header.lower_name(), header.raw_value(), &mut out)
            }
        }
    }

    let stripped = strip_signature_value(dkim_header.raw_value());
    let mut signature_header = Vec::new();
    match canonicalization_type {
        canonicalization::Type::Simple => {
            canonicalize_header_simple(dkim_header.raw_name(), &stripped, &mut signature_header)
        }
        canonicalization::Type::Relaxed => {
            canonicalize_header_relaxed(dkim_header.lower_name(), &stripped, &mut signature_header)
        }
    }
    if signature_header.ends_with(b"\r\n") {
        signature_header.truncate(signature_header.len() - 2);
    }
    out.extend_from_slice(&signature_header);

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonicalization::Type;
    use crate::crypto::RsaVerifier;

    fn parse(raw: &str) -> Message {
        Message::parse(raw.replace('\n', "\r\n").as_bytes()).unwrap()
    }

    fn hello_alice() -> Message {
        parse("To: test@sauleau.com\nSubject: subject\nFrom: Sven Sauleau <sven@cloudflare.com>\n\nHello Alice\n        \n")
    }

    #[test]
    fn test_compute_body_hash_simple() {
        let email = hello_alice();
        let body = canonicalize_body(Type::Simple, email.body());
        // the WSP-only trailing line is not an empty line and survives
        assert_eq!(body, b"Hello Alice\r\n        \r\n");
        assert_eq!(
            body_hash(&RsaVerifier, HashAlgo::RsaSha1, &body, None).unwrap(),
            "R5znklLcCKajiick9D4075VP/c4="
        );
        assert_eq!(
            body_hash(&RsaVerifier, HashAlgo::RsaSha256, &body, None).unwrap(),
            "rjgzokZwPODUMdVvVutgDzT2wp3rfsX8YjK4LXFpnQE="
        );
    }

    #[test]
    fn test_compute_body_hash_relaxed() {
        let email = hello_alice();
        let body = canonicalize_body(Type::Relaxed, email.body());
        // the WSP-only line empties out and is dropped as a trailing line
        assert_eq!(body, b"Hello Alice\r\n");
        assert_eq!(
            body_hash(&RsaVerifier, HashAlgo::RsaSha1, &body, None).unwrap(),
            "QKvft7OqaNbRT/nH0Qmc/7mSK7w="
        );
        assert_eq!(
            body_hash(&RsaVerifier, HashAlgo::RsaSha256, &body, None).unwrap(),
            "+kuxulZ7MkxvrZj1LNFkEtOUvi0M2/80KBPP0duHSfw="
        );
    }

    #[test]
    fn test_compute_body_hash_length() {
        let email = hello_alice();
        let body = canonicalize_body(Type::Relaxed, email.body());
        assert_eq!(
            body_hash(&RsaVerifier, HashAlgo::RsaSha1, &body, Some(3)).unwrap(),
            "28LR/tDcN6cK6g83aVjIAu3cBVk="
        );
        assert_eq!(
            body_hash(&RsaVerifier, HashAlgo::RsaSha256, &body, Some(3)).unwrap(),
            "t4nCTc22jEQ3sEwYa/I5pyB+dXP7GyKnSf4ae42W0pI="
        );
    }

    #[test]
    fn test_compute_body_hash_length_too_large() {
        let email = hello_alice();
        let body = canonicalize_body(Type::Relaxed, email.body());
        assert_eq!(
            body_hash(&RsaVerifier, HashAlgo::RsaSha256, &body, Some(body.len() + 1)).unwrap_err(),
            DKIMError::BodyTooShort(body.len() + 1, body.len())
        );
    }

    #[test]
    fn test_compute_body_hash_empty_body() {
        let email = parse("Subject: nothing\n\n");
        // the canonical empty body is a bare CRLF under both algorithms
        for canon in [Type::Simple, Type::Relaxed] {
            let body = canonicalize_body(canon, email.body());
            assert_eq!(body, b"\r\n");
            assert_eq!(
                body_hash(&RsaVerifier, HashAlgo::RsaSha256, &body, None).unwrap(),
                "frcCV1k9oG9oKj3dpUqdJg1PxRT2RSN/XKdLCPjaYaY="
            );
        }
    }

    #[test]
    fn test_select_headers_reverse_order() {
        let message = parse("from: biz\nfoo: bar\nfrom: baz\nsubject: boring\n\ntest");
        let selected = select_headers("from:subject:to:from", &message);
        let values: Vec<&[u8]> = selected.iter().map(|h| h.raw_value()).collect();
        assert_eq!(
            values,
            vec![&b" baz\r\n"[..], &b" boring\r\n"[..], &b" biz\r\n"[..]]
        );
    }

    #[test]
    fn test_select_headers_missing_instances_are_skipped() {
        let message = parse("From: biz\nFoo: bar\nSubject: Boring\n\ntest");
        let selected = select_headers("from:subject:to:from", &message);
        let names: Vec<&[u8]> = selected.iter().map(|h| h.raw_name()).collect();
        assert_eq!(names, vec![&b"From"[..], &b"Subject"[..]]);
    }

    #[test]
    fn test_signed_header_stream_relaxed() {
        let message = parse(
            "From: Joe <joe@example.com>\nSubject:  Hi\t there\nDKIM-Signature: v=1; a=rsa-sha256; c=relaxed/relaxed; d=example.com;\n s=sel; h=from:subject; bh=aGFzaA==;\n b=c2ln\n\nbody\n",
        );
        let sig = message.headers_named("dkim-signature").next().unwrap();
        let stream = signed_header_stream(Type::Relaxed, "from:subject", sig, &message);
        assert_eq!(
            String::from_utf8_lossy(&stream),
            "from:Joe <joe@example.com>\r\nsubject:Hi there\r\ndkim-signature:v=1; a=rsa-sha256; c=relaxed/relaxed; d=example.com; s=sel; h=from:subject; bh=aGFzaA==; b="
        );
    }

    #[test]
    fn test_signed_header_stream_simple() {
        let message = parse(
            "From: Joe <joe@example.com>\nSubject:  Hi\t there\nDKIM-Signature: v=1; a=rsa-sha256; c=simple/simple; d=example.com;\n s=sel; h=from:subject; bh=aGFzaA==; b=c2ln\n\nbody\n",
        );
        let sig = message.headers_named("dkim-signature").next().unwrap();
        let stream = signed_header_stream(Type::Simple, "from:subject", sig, &message);
        assert_eq!(
            String::from_utf8_lossy(&stream),
            "From: Joe <joe@example.com>\r\nSubject:  Hi\t there\r\nDKIM-Signature: v=1; a=rsa-sha256; c=simple/simple; d=example.com;\r\n s=sel; h=from:subject; bh=aGFzaA==; b="
        );
    }
}
