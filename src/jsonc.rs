//! JSON with comments and trailing commas, reduced to plain JSON before it
//! reaches serde_json.

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, take_until},
    character::complete::{anychar, char, multispace0, one_of},
    combinator::{map, opt, peek, recognize},
    multi::{fold_many0, many0},
    sequence::{pair, terminated, tuple},
    IResult,
};
use serde::de::DeserializeOwned;

enum Piece<'a> {
    Keep(&'a str),
    Comment(&'a str),
    Drop,
}

fn string_literal(i: &str) -> IResult<&str, &str> {
    recognize(tuple((
        char('"'),
        many0(alt((is_not("\\\""), recognize(pair(char('\\'), anychar))))),
        char('"'),
    )))(i)
}

fn line_comment(i: &str) -> IResult<&str, &str> {
    recognize(pair(alt((tag("//"), tag("#"))), opt(is_not("\n"))))(i)
}

fn block_comment(i: &str) -> IResult<&str, &str> {
    recognize(tuple((tag("/*"), take_until("*/"), tag("*/"))))(i)
}

fn comment_piece(i: &str) -> IResult<&str, Piece> {
    alt((
        map(string_literal, Piece::Keep),
        map(alt((line_comment, block_comment)), Piece::Comment),
        map(is_not("\"/#"), Piece::Keep),
        map(tag("/"), Piece::Keep),
    ))(i)
}

fn comma_piece(i: &str) -> IResult<&str, Piece> {
    alt((
        map(string_literal, Piece::Keep),
        map(
            terminated(char(','), peek(pair(multispace0, one_of("}]")))),
            |_| Piece::Drop,
        ),
        map(is_not("\","), Piece::Keep),
        map(tag(","), Piece::Keep),
    ))(i)
}

fn rebuild<'a>(
    text: &'a str,
    piece: impl FnMut(&'a str) -> IResult<&'a str, Piece<'a>>,
) -> String {
    let folded: IResult<&str, String> = fold_many0(
        piece,
        || String::with_capacity(text.len()),
        |mut acc, piece| {
            match piece {
                Piece::Keep(s) => acc.push_str(s),
                // Keep newlines so serde_json positions still line up.
                Piece::Comment(s) => acc.extend(s.chars().filter(|c| *c == '\n')),
                Piece::Drop => {}
            }
            acc
        },
    )(text);

    match folded {
        // Anything left over (an unterminated string or comment) is passed
        // through for serde_json to report.
        Ok((rest, mut acc)) => {
            acc.push_str(rest);
            acc
        }
        Err(_) => text.to_owned(),
    }
}

pub fn strip(text: &str) -> String {
    let without_comments = rebuild(text, comment_piece);
    rebuild(&without_comments, comma_piece)
}

pub fn from_str<T: DeserializeOwned>(text: &str) -> serde_json::Result<T> {
    serde_json::from_str(&strip(text))
}
