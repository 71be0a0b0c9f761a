use crate::errors::DKIMError;
use crate::parser;
use indexmap::map::IndexMap;

/// Lowercased name of the signature header, for case-insensitive lookup.
pub(crate) const HEADER: &str = "dkim-signature";

/// <https://datatracker.ietf.org/doc/html/rfc6376#section-3.5>
pub(crate) const REQUIRED_TAGS: &[&str] = &["v", "a", "b", "bh", "d", "h", "s"];

/// Parsed tag set of one DKIM-Signature header value.
///
/// Only the tag-list syntax is validated here. The semantic checks (version,
/// required tags, expiry, ...) live in the verifier so it can accumulate
/// diagnostics instead of stopping at the first defect.
#[derive(Debug, Clone)]
pub struct DKIMHeader {
    tags: IndexMap<String, String>,
    duplicated: Vec<String>,
}

impl DKIMHeader {
    pub fn parse(raw_value: &[u8]) -> Result<Self, DKIMError> {
        let text = String::from_utf8_lossy(raw_value);
        let (rest, tags) = parser::tag_list(&text)
            .map_err(|err| DKIMError::SignatureSyntaxError(format!("malformed tag list: {}", err)))?;
        let leftover = rest.trim_matches(|c| c == ' ' || c == '\t' || c == '\r' || c == '\n');
        if !leftover.is_empty() {
            return Err(DKIMError::SignatureSyntaxError(format!(
                "malformed tag list near {:?}",
                leftover
            )));
        }

        let mut tags_map = IndexMap::new();
        let mut duplicated = Vec::new();
        for tag in tags {
            // last occurrence wins; the verifier reports the duplicate
            if tags_map.insert(tag.name.clone(), tag.value).is_some() {
                duplicated.push(tag.name);
            }
        }

        Ok(DKIMHeader {
            tags: tags_map,
            duplicated,
        })
    }

    pub fn get_tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(|v| v.as_str())
    }

    /// Get a tag the caller has already established to be present.
    pub fn get_required_tag(&self, name: &str) -> &str {
        match self.get_tag(name) {
            Some(value) => value,
            None => panic!("required tag {} is not present", name),
        }
    }

    /// Required tags absent from this signature, in canonical order.
    pub fn missing_required_tags(&self) -> Vec<&'static str> {
        REQUIRED_TAGS
            .iter()
            .filter(|name| self.get_tag(name).is_none())
            .copied()
            .collect()
    }

    /// Tag names that appeared more than once.
    pub fn duplicated_tags(&self) -> &[String] {
        &self.duplicated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let header = DKIMHeader::parse(
            b"v=1; a=rsa-sha256; d=example.net; s=brisbane;\r\n c=relaxed/simple; q=dns/txt;\r\n h=from:to:subject:date;\r\n bh=MTIzNDU2Nzg5MDEyMzQ1Njc4OTAxMjM0NTY3ODkwMTI=;\r\n b=dzdVyOfAKCdLXdJOc9G2q8LoXSlEniSbav+yuU4zGeeruD00lszZ\r\n      VoG4ZHRNiYzR\r\n",
        )
        .unwrap();
        assert_eq!(header.get_tag("v"), Some("1"));
        assert_eq!(header.get_tag("d"), Some("example.net"));
        assert_eq!(header.get_tag("h"), Some("from:to:subject:date"));
        // folding whitespace is removed from values
        assert_eq!(
            header.get_tag("b"),
            Some("dzdVyOfAKCdLXdJOc9G2q8LoXSlEniSbav+yuU4zGeeruD00lszZVoG4ZHRNiYzR")
        );
        assert!(header.missing_required_tags().is_empty());
    }

    #[test]
    fn test_missing_required_tags() {
        let header = DKIMHeader::parse(b"v=1; a=rsa-sha256; bh=a; b=b").unwrap();
        assert_eq!(header.missing_required_tags(), vec!["d", "h", "s"]);
    }

    #[test]
    fn test_duplicate_tag_last_wins() {
        let header = DKIMHeader::parse(b"v=1; d=first.example; d=second.example").unwrap();
        assert_eq!(header.get_tag("d"), Some("second.example"));
        assert_eq!(header.duplicated_tags(), ["d".to_owned()]);
    }

    #[test]
    fn test_malformed_tag_list() {
        assert!(matches!(
            DKIMHeader::parse(b"v=1; garbage").unwrap_err(),
            DKIMError::SignatureSyntaxError(_)
        ));
        assert!(matches!(
            DKIMHeader::parse(b"").unwrap_err(),
            DKIMError::SignatureSyntaxError(_)
        ));
    }

    #[test]
    fn test_trailing_semicolon_and_crlf() {
        let header = DKIMHeader::parse(b"v=1; d=example.com;\r\n").unwrap();
        assert_eq!(header.get_tag("d"), Some("example.com"));
    }
}
