use crate::canonicalization;
use crate::errors::DKIMError;
use crate::hash::HashAlgo;
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::alpha1;
use nom::combinator::opt;
use nom::multi::fold_many0;
use nom::sequence::{delimited, preceded, terminated};
use nom::IResult;

/// DKIM tag, with folding whitespace already removed from the value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

/// Parses a `tag=value; tag=value` list as specified in
/// <https://datatracker.ietf.org/doc/html/rfc6376#section-3.2>.
/// tag-list = tag-spec *( ";" tag-spec ) [ ";" ]
pub fn tag_list(input: &str) -> IResult<&str, Vec<Tag>> {
    let (input, start) = tag_spec(input)?;

    terminated(
        fold_many0(
            preceded(tag(";"), tag_spec),
            move || vec![start.clone()],
            |mut acc: Vec<Tag>, item| {
                acc.push(item);
                acc
            },
        ),
        opt(tag(";")),
    )(input)
}

/// tag-spec = [FWS] tag-name [FWS] "=" [FWS] tag-value [FWS]
fn tag_spec(input: &str) -> IResult<&str, Tag> {
    let (input, name) = delimited(opt(fws), tag_name, opt(fws))(input)?;
    let (input, _) = tag("=")(input)?;
    let (input, value) = delimited(opt(fws), tag_value, opt(fws))(input)?;

    Ok((
        input,
        Tag {
            name: name.to_owned(),
            value,
        },
    ))
}

/// tag-name = ALPHA *ALNUMPUNC
fn tag_name(input: &str) -> IResult<&str, &str> {
    alpha1(input)
}

/// tag-value =  [ tval *( 1*(WSP / FWS) tval ) ]
/// tval      =  1*VALCHAR
/// VALCHAR   =  %x21-3A / %x3C-7E
fn tag_value(input: &str) -> IResult<&str, String> {
    let is_valchar = |c| ('!'..=':').contains(&c) || ('<'..='~').contains(&c);
    match opt(take_while1(is_valchar))(input)? {
        (input, Some(start)) => fold_many0(
            preceded(fws, take_while1(is_valchar)),
            || start.to_owned(),
            |mut acc: String, item| {
                acc += item;
                acc
            },
        )(input),
        (input, None) => Ok((input, "".to_string())),
    }
}

/// FWS: whitespace, possibly spanning folded lines.
fn fws(input: &str) -> IResult<&str, &str> {
    take_while1(|c| c == ' ' || c == '\t' || c == '\r' || c == '\n')(input)
}

/// Parses the `c=` tag into (header, body) canonicalization. Defaults to
/// simple/simple when absent; a single algorithm names the header side and
/// the body side defaults to simple, per RFC 6376 section 3.5.
pub(crate) fn parse_canonicalization(
    value: Option<&str>,
) -> Result<(canonicalization::Type, canonicalization::Type), DKIMError> {
    let value = match value {
        None => return Ok((canonicalization::Type::Simple, canonicalization::Type::Simple)),
        Some(value) => value,
    };
    let (header, body) = match value.split_once('/') {
        Some((header, body)) => (header, body),
        None => (value, "simple"),
    };
    let one = |side: &str| match side {
        "simple" => Ok(canonicalization::Type::Simple),
        "relaxed" => Ok(canonicalization::Type::Relaxed),
        other => Err(DKIMError::UnsupportedCanonicalizationType(other.to_owned())),
    };
    Ok((one(header)?, one(body)?))
}

/// Parses the `a=` tag. Only RSA signatures are supported.
pub(crate) fn parse_hash_algo(value: &str) -> Result<HashAlgo, DKIMError> {
    match value {
        "rsa-sha1" => Ok(HashAlgo::RsaSha1),
        "rsa-sha256" => Ok(HashAlgo::RsaSha256),
        e => Err(DKIMError::UnsupportedHashAlgorithm(e.to_string())),
    }
}
