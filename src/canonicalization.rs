// Canonicalization per https://datatracker.ietf.org/doc/html/rfc6376#section-3.4

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Type {
    Simple,
    Relaxed,
}

impl std::string::ToString for Type {
    fn to_string(&self) -> String {
        match self {
            Self::Simple => "simple".to_owned(),
            Self::Relaxed => "relaxed".to_owned(),
        }
    }
}

/// Simple body canonicalization: strip trailing empty lines, then make sure
/// the body ends with exactly one CRLF. An empty body becomes a single CRLF.
pub(crate) fn canonicalize_body_simple(body: &[u8]) -> Vec<u8> {
    let mut body = body.to_vec();
    while body.ends_with(b"\r\n\r\n") {
        body.truncate(body.len() - 2);
    }
    if !body.ends_with(b"\r\n") {
        body.extend_from_slice(b"\r\n");
    }
    body
}

/// Relaxed body canonicalization, as a single pass over the bytes:
/// runs of WSP within a line become one SP, trailing WSP on a line is
/// dropped, trailing empty lines are dropped, and the result ends with
/// exactly one CRLF. An empty body becomes a single CRLF.
pub(crate) fn canonicalize_body_relaxed(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len());
    let mut wsp_run = false;
    let mut i = 0;
    while i < body.len() {
        let b = body[i];
        if b == b'\r' && body.get(i + 1) == Some(&b'\n') {
            // end of line drops any pending WSP run
            out.extend_from_slice(b"\r\n");
            wsp_run = false;
            i += 2;
        } else if b == b' ' || b == b'\t' {
            wsp_run = true;
            i += 1;
        } else {
            if wsp_run {
                out.push(b' ');
            }
            wsp_run = false;
            out.push(b);
            i += 1;
        }
    }

    while out.ends_with(b"\r\n\r\n") {
        out.truncate(out.len() - 2);
    }
    if !out.ends_with(b"\r\n") {
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// Simple header canonicalization: the field exactly as it appeared on the
/// wire. `raw_value` carries its own leading whitespace, internal folding
/// and terminating CRLF.
pub(crate) fn canonicalize_header_simple(raw_name: &[u8], raw_value: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(raw_name);
    out.push(b':');
    out.extend_from_slice(raw_value);
}

/// Relaxed header canonicalization: lowercased name, unfolded value with
/// WSP runs collapsed to one SP and surrounding WSP stripped.
pub(crate) fn canonicalize_header_relaxed(lower_name: &str, raw_value: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(lower_name.as_bytes());
    out.push(b':');
    out.extend_from_slice(&canonicalize_header_value_relaxed(raw_value));
    out.extend_from_slice(b"\r\n");
}

fn canonicalize_header_value_relaxed(value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    let mut wsp_run = false;
    for &b in value {
        match b {
            // unfolding: the CRLF vanishes and the WSP that follows it
            // collapses with any adjacent run
            b'\r' | b'\n' => {}
            b' ' | b'\t' => wsp_run = true,
            _ => {
                if wsp_run && !out.is_empty() {
                    out.push(b' ');
                }
                wsp_run = false;
                out.push(b);
            }
        }
    }
    out
}

/// Blank the value of the `b=` tag in a DKIM-Signature value, keeping the
/// tag name, the `=` and the delimiter (`;` or the terminating CRLF)
/// byte-for-byte. Runs on the raw value, before canonicalization.
pub(crate) fn strip_signature_value(value: &[u8]) -> Vec<u8> {
    let mut i = 0;
    while i + 1 < value.len() {
        if value[i] == b'b' && value[i + 1] == b'=' && at_tag_boundary(&value[..i]) {
            let value_start = i + 2;
            let mut out = value[..value_start].to_vec();
            match value[value_start..].iter().position(|&b| b == b';') {
                Some(rel) => out.extend_from_slice(&value[value_start + rel..]),
                None => {
                    if value.ends_with(b"\r\n") {
                        out.extend_from_slice(b"\r\n");
                    }
                }
            }
            return out;
        }
        i += 1;
    }
    value.to_vec()
}

// A tag name starts at the beginning of the value or right after `;`,
// with only (folding) whitespace in between.
fn at_tag_boundary(prefix: &[u8]) -> bool {
    for &b in prefix.iter().rev() {
        match b {
            b' ' | b'\t' | b'\r' | b'\n' => continue,
            b';' => return true,
            _ => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relaxed_header(name: &str, value: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        canonicalize_header_relaxed(name, value, &mut out);
        out
    }

    #[test]
    fn test_canonicalize_header_relaxed() {
        assert_eq!(relaxed_header("subject", b" AbC\r\n"), b"subject:AbC\r\n");
        assert_eq!(
            relaxed_header("subject", b"\t Your Name\t \r\n"),
            b"subject:Your Name\r\n"
        );
        assert_eq!(
            relaxed_header("subject", b"\t Kimi \t \r\n No \t\r\n Na Wa\r\n"),
            b"subject:Kimi No Na Wa\r\n"
        );
    }

    // Debian #840015: a header whose value starts on the continuation line
    #[test]
    fn test_canonicalize_header_relaxed_early_fold() {
        assert_eq!(
            relaxed_header(
                "subject",
                b"\r\n    long subject text continued on subsequent lines ...\r\n"
            ),
            &b"subject:long subject text continued on subsequent lines ...\r\n"[..]
        );
    }

    #[test]
    fn test_canonicalize_header_relaxed_idempotent() {
        let inputs: &[&[u8]] = &[
            b" AbC\r\n",
            b"\t Kimi \t \r\n No \t\r\n Na Wa\r\n",
            b"\r\n    early fold\r\n",
            b"plain\r\n",
        ];
        for input in inputs {
            let once = canonicalize_header_value_relaxed(input);
            assert_eq!(canonicalize_header_value_relaxed(&once), once);
        }
    }

    #[test]
    fn test_canonicalize_header_simple_verbatim() {
        let mut out = Vec::new();
        canonicalize_header_simple(b"SUBJect", b" folded\r\n\tvalue\r\n", &mut out);
        assert_eq!(out, b"SUBJect: folded\r\n\tvalue\r\n");
    }

    #[test]
    fn test_canonicalize_body_relaxed() {
        assert_eq!(canonicalize_body_relaxed(b"\r\n"), b"\r\n");
        assert_eq!(canonicalize_body_relaxed(b"hey        \r\n"), b"hey\r\n");
        assert_eq!(canonicalize_body_relaxed(b"hey \t you\r\n"), b"hey you\r\n");
        assert_eq!(canonicalize_body_relaxed(b"text\r\n\r\n\r\n"), b"text\r\n");
        // body without a final CRLF gets one
        assert_eq!(canonicalize_body_relaxed(b"text"), b"text\r\n");
        // leading whitespace collapses but is not removed
        assert_eq!(canonicalize_body_relaxed(b"  \tx\r\n"), b" x\r\n");
    }

    #[test]
    fn test_canonicalize_body_simple() {
        assert_eq!(canonicalize_body_simple(b"text\r\n\r\n\r\n"), b"text\r\n");
        assert_eq!(canonicalize_body_simple(b"text\r\n"), b"text\r\n");
        assert_eq!(canonicalize_body_simple(b"text"), b"text\r\n");
        // trailing whitespace survives simple canonicalization
        assert_eq!(canonicalize_body_simple(b"text   \r\n"), b"text   \r\n");
    }

    #[test]
    fn test_empty_body_contract() {
        assert_eq!(canonicalize_body_simple(b""), b"\r\n");
        assert_eq!(canonicalize_body_relaxed(b""), b"\r\n");
    }

    #[test]
    fn test_canonicalize_body_idempotent() {
        let inputs: &[&[u8]] = &[b"", b"hello  world \r\n\r\n", b"a\r\nb\r\n", b"trailing"];
        for input in inputs {
            let simple = canonicalize_body_simple(input);
            assert_eq!(canonicalize_body_simple(&simple), simple);
            let relaxed = canonicalize_body_relaxed(input);
            assert_eq!(canonicalize_body_relaxed(&relaxed), relaxed);
        }
    }

    #[test]
    fn test_strip_signature_value() {
        assert_eq!(
            strip_signature_value(b"v=1; a=rsa-sha256; bh=abc; b=Zm9vYmFy; h=from:to\r\n"),
            &b"v=1; a=rsa-sha256; bh=abc; b=; h=from:to\r\n"[..]
        );
        // b= as the last tag: the terminating CRLF is kept
        assert_eq!(
            strip_signature_value(b"v=1; bh=abc; b=Zm9v\r\n YmFy\r\n"),
            &b"v=1; bh=abc; b=\r\n"[..]
        );
        // no b= tag at all
        assert_eq!(
            strip_signature_value(b"v=1; bh=abc\r\n"),
            &b"v=1; bh=abc\r\n"[..]
        );
        // "b=" inside another tag's value is not a tag boundary
        assert_eq!(
            strip_signature_value(b"v=1; z=xb=y; b=sig; d=example.com\r\n"),
            &b"v=1; z=xb=y; b=; d=example.com\r\n"[..]
        );
    }

    #[test]
    fn test_strip_then_relaxed_multiline_signature() {
        let value = b" v=1; a=rsa-sha256; c=relaxed/relaxed; d=example.com; s=20161025;\r\n h=from:content-transfer-encoding:mime-version:subject:message-id:date\r\n :to; bh=g3zLYH4xKxcPrHOD18z9YfpQcnk/GaJedfustWU5uGs=;\r\n b=AAAA\r\n BBBB\r\n";
        let stripped = strip_signature_value(value);
        let mut out = Vec::new();
        canonicalize_header_relaxed("dkim-signature", &stripped, &mut out);
        assert_eq!(
            String::from_utf8_lossy(&out),
            "dkim-signature:v=1; a=rsa-sha256; c=relaxed/relaxed; d=example.com; s=20161025; h=from:content-transfer-encoding:mime-version:subject:message-id:date :to; bh=g3zLYH4xKxcPrHOD18z9YfpQcnk/GaJedfustWU5uGs=; b=\r\n"
        );
    }

    #[test]
    fn test_strip_then_simple_multiline_signature() {
        // simple form keeps all folding and case; only the b= value goes
        let value = b" v=1; a=rsa-sha256; c=simple/simple; d=example.com;\r\n bh=g3zLYH4xKxcPrHOD18z9YfpQcnk/GaJedfustWU5uGs=;\r\n b=AAAA\r\n BBBB\r\n";
        let stripped = strip_signature_value(value);
        let mut out = Vec::new();
        canonicalize_header_simple(b"DKIM-Signature", &stripped, &mut out);
        assert_eq!(
            String::from_utf8_lossy(&out),
            "DKIM-Signature: v=1; a=rsa-sha256; c=simple/simple; d=example.com;\r\n bh=g3zLYH4xKxcPrHOD18z9YfpQcnk/GaJedfustWU5uGs=;\r\n b=\r\n"
        );
    }

    // Stripping only blanks the b= value: the stripped header parses to
    // the same tag map with b mapped to the empty string.
    #[test]
    fn test_strip_preserves_other_tags() {
        let values: &[&[u8]] = &[
            b"v=1; a=rsa-sha256; d=example.com; s=sel; h=from:to; bh=aGFzaA==; b=c2ln\r\n",
            b"v=1; b=AAAA\r\n BBBB; d=example.com; bh=aGFzaA==\r\n",
            b" v=1;\r\n bh=aGFzaA==;\r\n b=c2ln\r\n",
        ];
        for value in values {
            let stripped = strip_signature_value(value);
            let (_, original) =
                crate::parser::tag_list(&String::from_utf8_lossy(value)).unwrap();
            let (_, after) =
                crate::parser::tag_list(&String::from_utf8_lossy(&stripped)).unwrap();
            assert_eq!(original.len(), after.len());
            for (a, b) in original.iter().zip(after.iter()) {
                assert_eq!(a.name, b.name);
                if a.name == "b" {
                    assert_eq!(b.value, "");
                } else {
                    assert_eq!(a.value, b.value);
                }
            }
        }
    }

    #[test]
    fn test_strip_signature_value_folded_boundary() {
        assert_eq!(
            strip_signature_value(b"v=1; bh=abc;\r\n b=Zm9v+/=\r\n"),
            &b"v=1; bh=abc;\r\n b=\r\n"[..]
        );
    }
}
