use crate::dns::{DnsError, TxtLookup};
use crate::errors::DKIMError;
use crate::hash::HashAlgo;
use crate::parser;
use regex::Regex;
use slog::debug;

/// Parsed DNS key record from `<selector>._domainkey.<domain>`, per
/// <https://datatracker.ietf.org/doc/html/rfc6376#section-3.6.1>.
#[derive(Debug, Clone, Default)]
pub struct PublicKeyRecord {
    /// `v=` tag; must be "DKIM1" when present.
    pub version: Option<String>,
    /// `h=` tag: acceptable hash algorithms, colon-separated.
    pub acceptable_hashes: Option<Vec<String>>,
    /// `k=` tag; defaults to "rsa".
    pub key_type: String,
    /// `p=` tag: base64 public key. Empty means the key was revoked.
    pub public_key: String,
    /// `s=` tag: service types, colon-separated; `*` matches everything.
    pub services: Option<Vec<String>>,
    /// `t=` tag: flags, colon-separated.
    pub flags: Vec<String>,
    /// Tag names that appeared more than once; last occurrence won.
    pub duplicated: Vec<String>,
}

impl PublicKeyRecord {
    pub fn parse(txt: &str) -> Result<Self, DKIMError> {
        let (rest, tags) = parser::tag_list(txt)
            .map_err(|err| DKIMError::KeySyntaxError(format!("malformed key record: {}", err)))?;
        let leftover = rest.trim_matches(|c| c == ' ' || c == '\t' || c == '\r' || c == '\n');
        if !leftover.is_empty() {
            return Err(DKIMError::KeySyntaxError(format!(
                "malformed key record near {:?}",
                leftover
            )));
        }

        let mut record = PublicKeyRecord {
            key_type: "rsa".to_owned(),
            ..Default::default()
        };
        let mut seen = std::collections::HashSet::new();
        for tag in tags {
            if !seen.insert(tag.name.clone()) {
                record.duplicated.push(tag.name.clone());
            }
            // last occurrence wins, as in signature tag lists
            match tag.name.as_str() {
                "v" => record.version = Some(tag.value),
                "h" => {
                    record.acceptable_hashes =
                        Some(tag.value.split(':').map(|s| s.to_owned()).collect())
                }
                "k" => record.key_type = tag.value,
                "p" => record.public_key = tag.value,
                "s" => record.services = Some(tag.value.split(':').map(|s| s.to_owned()).collect()),
                "t" => record.flags = tag.value.split(':').map(|s| s.to_owned()).collect(),
                // unrecognized tags must be ignored
                _ => {}
            }
        }
        Ok(record)
    }

    /// Check the record against the signature's algorithm, per RFC 6376
    /// section 6.1.2. Any mismatch disqualifies this key only.
    pub fn check_signature(&self, hash_algo: HashAlgo) -> Result<(), DKIMError> {
        if let Some(version) = &self.version {
            if version != "DKIM1" {
                return Err(DKIMError::KeyIncompatibleVersion);
            }
        }

        if let Some(hashes) = &self.acceptable_hashes {
            if !hashes.iter().any(|h| h == hash_algo.hash_name()) {
                return Err(DKIMError::InappropriateHashAlgorithm(
                    hash_algo.hash_name().to_owned(),
                ));
            }
        }

        if !self.key_type.eq_ignore_ascii_case(hash_algo.key_type()) {
            return Err(DKIMError::InappropriateKeyAlgorithm(self.key_type.clone()));
        }

        if let Some(services) = &self.services {
            if !services.iter().any(|s| s == "*" || s == "email") {
                return Err(DKIMError::InappropriateServiceType(services.join(":")));
            }
        }

        Ok(())
    }

    /// The `y` flag marks a domain that is only testing DKIM.
    pub fn is_testing(&self) -> bool {
        self.flags.iter().any(|f| f == "y")
    }

    /// Rebuild a PEM-wrapped SubjectPublicKeyInfo from the `p=` base64,
    /// re-wrapped at 64 columns.
    pub fn to_pem(&self) -> Result<Vec<u8>, DKIMError> {
        if self.public_key.is_empty() {
            return Err(DKIMError::KeyRevoked);
        }
        let mut pem = String::with_capacity(self.public_key.len() + 64);
        pem.push_str("-----BEGIN PUBLIC KEY-----\n");
        for chunk in self.public_key.as_bytes().chunks(64) {
            pem.push_str(&String::from_utf8_lossy(chunk));
            pem.push('\n');
        }
        pem.push_str("-----END PUBLIC KEY-----\n");
        Ok(pem.into_bytes())
    }
}

/// Selector grammar from RFC 5321 section 4.1.2 sub-domain syntax:
/// `let-dig (ldh-str)?` labels joined by `.`.
pub(crate) fn validate_selector(selector: &str) -> Result<(), DKIMError> {
    let pattern = Regex::new(
        r"^[[:alnum:]](?:[[:alnum:]-]*[[:alnum:]])?(?:\.[[:alnum:]](?:[[:alnum:]-]*[[:alnum:]])?)*$",
    )
    .unwrap();
    if pattern.is_match(selector) {
        Ok(())
    } else {
        Err(DKIMError::InvalidSelector(selector.to_owned()))
    }
}

/// DNS query name for a (domain, selector) pair.
pub fn query_name(domain: &str, selector: &str) -> String {
    format!("{}.{}.{}", selector, crate::DNS_NAMESPACE, domain)
}

/// Fetch and parse the candidate key records for a signature. Lookup
/// failures are transient; an invalid selector is permanent.
pub(crate) async fn retrieve_key_records(
    logger: &slog::Logger,
    resolver: &dyn TxtLookup,
    domain: &str,
    selector: &str,
) -> Result<Vec<PublicKeyRecord>, DKIMError> {
    validate_selector(selector)?;

    let name = query_name(domain, selector);
    debug!(logger, "looking up key records at {}", name);

    let records = resolver.lookup_txt(&name).await.map_err(|err| match err {
        DnsError::NoRecords => DKIMError::NoKeyRecords,
        other => DKIMError::KeyUnavailable(other.to_string()),
    })?;
    if records.is_empty() {
        return Err(DKIMError::NoKeyRecords);
    }

    let mut parsed = Vec::with_capacity(records.len());
    let mut last_error = None;
    for record in &records {
        match PublicKeyRecord::parse(&record.concatenated()) {
            Ok(key_record) => parsed.push(key_record),
            Err(err) => {
                debug!(logger, "skipping unparsable key record: {}", err);
                last_error = Some(err);
            }
        }
    }
    if parsed.is_empty() {
        return Err(last_error.unwrap_or(DKIMError::NoKeyRecords));
    }
    Ok(parsed)
}
