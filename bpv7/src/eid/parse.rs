use super::*;
use percent_encoding::percent_decode_str;
use winnow::{
    ModalResult, Parser,
    ascii::dec_uint,
    combinator::{alt, delimited, preceded, separated_pair, terminated},
    stream::AsChar,
    token::{rest, take_while},
};

/// The pieces of a `dtn` scheme-specific part, before any CLA dispatch.
/// Percent-escapes are already decoded.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum DtnSsp<'a> {
    None,
    Api(Box<str>),
    Cla {
        scheme: &'a str,
        specific: Box<str>,
        demux: Box<str>,
    },
    Node {
        node_name: Box<str>,
        demux: Box<str>,
    },
}

fn scheme_name<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    (
        take_while(1, AsChar::is_alpha),
        take_while(0.., (AsChar::is_alphanum, '+', '-', '.')),
    )
        .take()
        .parse_next(input)
}

/// Is `s`, in its entirety, a valid URI scheme name
pub(crate) fn is_scheme_name(s: &str) -> bool {
    scheme_name.parse(s).is_ok()
}

fn scheme_and_ssp<'a>(input: &mut &'a str) -> ModalResult<(&'a str, &'a str)> {
    separated_pair(scheme_name, ":", rest).parse_next(input)
}

/// Splits `<scheme>:<ssp>`
pub(crate) fn split_scheme(s: &str) -> Result<(&str, &str), Error> {
    scheme_and_ssp
        .parse(s)
        .map_err(|_| Error::MalformedScheme(s.to_string()))
}

fn ipn_parts(input: &mut &str) -> ModalResult<Eid> {
    separated_pair(dec_uint, ".", dec_uint)
        .try_map(|(node, service): (u64, u64)| {
            if node == 0 && service != 0 {
                Err(Error::malformed("ipn", "node number 0 has no services"))
            } else {
                Ok(Eid::ipn(node, service))
            }
        })
        .parse_next(input)
}

pub(crate) fn parse_ipn_ssp(ssp: &str) -> Result<Eid, Error> {
    ipn_parts
        .parse(ssp)
        .map_err(|e| Error::malformed("ipn", e))
}

fn decode(v: &str) -> Result<Box<str>, core::str::Utf8Error> {
    percent_decode_str(v)
        .decode_utf8()
        .map(|s| s.as_ref().into())
}

fn parse_regname(input: &mut &str) -> ModalResult<Box<str>> {
    take_while(
        1..,
        (
            AsChar::is_alphanum,
            ('-', '.', '_', '~', '%'),
            ('!', '$', '&', '\'', '(', ')'),
            ('*', '+', ',', ';', '='),
        ),
    )
    .try_map(decode)
    .parse_next(input)
}

fn parse_demux(input: &mut &str) -> ModalResult<Box<str>> {
    take_while(0.., '\x21'..='\x7e')
        .try_map(decode)
        .parse_next(input)
}

fn parse_cla_authority<'a>(input: &mut &'a str) -> ModalResult<(&'a str, Box<str>)> {
    delimited(
        "[",
        separated_pair(
            scheme_name,
            ":",
            take_while(1.., |c: char| c != ']' && ('\x21'..='\x7e').contains(&c))
                .try_map(decode),
        ),
        "]",
    )
    .parse_next(input)
}

fn parse_dtn_parts<'a>(input: &mut &'a str) -> ModalResult<DtnSsp<'a>> {
    alt((
        (terminated(parse_cla_authority, "/"), parse_demux).map(
            |((scheme, specific), demux)| DtnSsp::Cla {
                scheme,
                specific,
                demux,
            },
        ),
        preceded((API_AUTHORITY, "/"), parse_demux).map(DtnSsp::Api),
        (terminated(parse_regname, "/"), parse_demux)
            .map(|(node_name, demux)| DtnSsp::Node { node_name, demux }),
    ))
    .parse_next(input)
}

fn dtn_ssp<'a>(input: &mut &'a str) -> ModalResult<DtnSsp<'a>> {
    alt((
        "none".map(|_| DtnSsp::None),
        preceded("//", parse_dtn_parts),
    ))
    .parse_next(input)
}

pub(crate) fn parse_dtn_ssp(ssp: &str) -> Result<DtnSsp<'_>, Error> {
    dtn_ssp
        .parse(ssp)
        .map_err(|e| Error::malformed("dtn", e))
}
