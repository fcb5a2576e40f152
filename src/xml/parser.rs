//! The tolerant XML subset parser. Handles exactly what Parallels Desktop
//! emits: an optional `<?xml ... ?>` processing instruction, no DTD, no
//! namespaces, no CDATA, the five predefined entity references, self-closing
//! tags, single- or double-quoted attribute values, and whitespace-only text
//! nodes discarded.

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, take_until, take_while, take_while1},
    character::complete::{char, multispace0},
    combinator::{map, opt, value},
    multi::many0,
    sequence::tuple,
    IResult,
};

use super::{Document, Tag, TagId};
use crate::error::{PhdiError, Result};

const MAX_NAME_LEN: usize = 256;

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' || c == ':'
}

fn name(input: &str) -> IResult<&str, &str> {
    take_while1(is_name_char)(input)
}

fn processing_instruction(input: &str) -> IResult<&str, ()> {
    value(
        (),
        tuple((tag("<?"), take_until("?>"), tag("?>"))),
    )(input)
}

fn comment(input: &str) -> IResult<&str, ()> {
    value((), tuple((tag("<!--"), take_until("-->"), tag("-->"))))(input)
}

fn skippable(input: &str) -> IResult<&str, ()> {
    // multispace1 (not multispace0) so each alternative makes progress;
    // otherwise many0 would spin forever on a zero-width match.
    value(
        (),
        many0(alt((
            value((), nom::character::complete::multispace1),
            comment,
            processing_instruction,
        ))),
    )(input)
}

fn quoted_value(input: &str) -> IResult<&str, String> {
    alt((quoted_with('"'), quoted_with('\'')))(input)
}

fn quoted_with(quote: char) -> impl Fn(&str) -> IResult<&str, String> {
    move |input: &str| {
        let (input, _) = char(quote)(input)?;
        let (input, raw) = take_while(|c| c != quote)(input)?;
        let (input, _) = char(quote)(input)?;
        Ok((input, decode_entities(raw)))
    }
}

fn decode_entities(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        if let Some(semi) = tail.find(';') {
            let entity = &tail[..=semi];
            let replacement = match entity {
                "&amp;" => Some('&'),
                "&lt;" => Some('<'),
                "&gt;" => Some('>'),
                "&quot;" => Some('"'),
                "&apos;" => Some('\''),
                _ => None,
            };
            match replacement {
                Some(c) => {
                    out.push(c);
                    rest = &tail[semi + 1..];
                }
                None => {
                    out.push('&');
                    rest = &tail[1..];
                }
            }
        } else {
            out.push('&');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

struct RawAttr {
    name: String,
    value: String,
}

fn attribute(input: &str) -> IResult<&str, RawAttr> {
    map(
        tuple((
            multispace0,
            name,
            multispace0,
            char('='),
            multispace0,
            quoted_value,
        )),
        |(_, n, _, _, _, v)| RawAttr {
            name: n.to_string(),
            value: v,
        },
    )(input)
}

enum Opening<'a> {
    SelfClosed { name: &'a str, attrs: Vec<RawAttr> },
    Open { name: &'a str, attrs: Vec<RawAttr> },
}

fn opening_tag(input: &str) -> IResult<&str, Opening> {
    let (input, _) = char('<')(input)?;
    let (input, name) = name(input)?;
    let (input, attrs) = many0(attribute)(input)?;
    let (input, _) = multispace0(input)?;
    let (input, self_closed) = opt(tag("/"))(input)?;
    let (input, _) = char('>')(input)?;
    Ok((
        input,
        match self_closed {
            Some(_) => Opening::SelfClosed { name, attrs },
            None => Opening::Open { name, attrs },
        },
    ))
}

fn closing_tag<'a>(input: &'a str, expected: &str) -> IResult<&'a str, ()> {
    let (input, _) = tag("</")(input)?;
    let (input, closed_name) = name(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = char('>')(input)?;
    if closed_name != expected {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Tag,
        )));
    }
    Ok((input, ()))
}

fn text_node(input: &str) -> IResult<&str, Option<String>> {
    let (input, raw) = is_not("<")(input)?;
    let decoded = decode_entities(raw);
    if decoded.trim().is_empty() {
        Ok((input, None))
    } else {
        Ok((input, Some(decoded)))
    }
}

/// Parses one element (and its subtree) starting at `input`, appending new
/// tags to `arena`. Returns the id of the parsed tag and the remaining input.
fn parse_element<'a>(
    input: &'a str,
    arena: &mut Vec<Tag>,
    parent: Option<TagId>,
) -> IResult<&'a str, TagId> {
    let (input, _) = skippable(input)?;
    let (input, opening) = opening_tag(input)?;

    match opening {
        Opening::SelfClosed { name, attrs } => {
            if name.len() > MAX_NAME_LEN {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    input,
                    nom::error::ErrorKind::TooLarge,
                )));
            }
            let mut tag = Tag::new(name.to_string());
            tag.attributes = attrs.into_iter().map(|a| (a.name, a.value)).collect();
            tag.parent = parent;
            let id = arena.len();
            arena.push(tag);
            Ok((input, id))
        }
        Opening::Open { name, attrs } => {
            if name.len() > MAX_NAME_LEN {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    input,
                    nom::error::ErrorKind::TooLarge,
                )));
            }
            let mut tag = Tag::new(name.to_string());
            tag.attributes = attrs.into_iter().map(|a| (a.name, a.value)).collect();
            tag.parent = parent;
            let id = arena.len();
            arena.push(tag);

            let mut rest = input;
            loop {
                let (after_ws, _) = skippable(rest)?;
                if let Ok((after_close, _)) = closing_tag(after_ws, name) {
                    rest = after_close;
                    break;
                }
                if after_ws.starts_with('<') && !after_ws.starts_with("</") {
                    let (after_child, child_id) = parse_element(after_ws, arena, Some(id))?;
                    arena[id].children.push(child_id);
                    rest = after_child;
                } else {
                    let (after_text, maybe_text) = text_node(after_ws)?;
                    if let Some(text) = maybe_text {
                        arena[id].value = Some(text);
                    }
                    rest = after_text;
                    if rest.is_empty() {
                        return Err(nom::Err::Error(nom::error::Error::new(
                            rest,
                            nom::error::ErrorKind::Eof,
                        )));
                    }
                }
            }
            Ok((rest, id))
        }
    }
}

/// Parses a whole descriptor document from UTF-8 text.
pub fn parse_document(input: &str) -> Result<Document> {
    let mut arena = Vec::new();
    let (_rest, root) =
        parse_element(input, &mut arena, None).map_err(|e| malformed(input, &e))?;
    Ok(Document { tags: arena, root })
}

fn malformed(original: &str, err: &nom::Err<nom::error::Error<&str>>) -> PhdiError {
    let offset = match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => original.len() - e.input.len(),
        nom::Err::Incomplete(_) => original.len(),
    };
    PhdiError::MalformedXml {
        offset,
        detail: format!("{err}"),
    }
}
