//! S-expression parsing from text.
//!
//! Produces syntax trees over the [`Value`] model: parenthesized forms
//! become proper, EmptyList-terminated pair chains; digit runs become
//! integers (decimal or `#x` hexadecimal, with an optional leading minus);
//! `#t`/`#f` become booleans; tick-prefixed atoms become opaque symbols and
//! `'()` the empty list; every other bare token becomes an identifier to be
//! resolved at evaluation time. `;` starts a line comment.
//!
//! Malformed input fails before any node reaches the evaluator. Unclosed
//! parentheses classify as [`ParseErrorKind::Incomplete`] so an interactive
//! driver can keep accumulating lines; an unexpected closing parenthesis or
//! an illegal character is [`ParseErrorKind::InvalidSyntax`].

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::char,
    combinator::{opt, recognize, value},
    error::ErrorKind,
    multi::separated_list0,
    sequence::pair,
};

use crate::ast::{IDENT_SPECIAL_CHARS, NumberType, Value, is_valid_identifier, proper_list};
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

/// Consume whitespace and `;` line comments
fn skip_trivia(input: &str) -> &str {
    let mut rest = input.trim_start();
    while let Some(comment) = rest.strip_prefix(';') {
        rest = match comment.find('\n') {
            Some(newline) => &comment[newline + 1..],
            None => "",
        };
        rest = rest.trim_start();
    }
    rest
}

/// Zero or more trivia characters
fn trivia0(input: &str) -> IResult<&str, ()> {
    Ok((skip_trivia(input), ()))
}

/// At least one trivia character; the separator between list members
fn trivia1(input: &str) -> IResult<&str, ()> {
    let rest = skip_trivia(input);
    if rest.len() == input.len() {
        Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::MultiSpace,
        )))
    } else {
        Ok((rest, ()))
    }
}

/// Parse a number (integer only, decimal or hexadecimal)
fn parse_number(input: &str) -> IResult<&str, Value> {
    alt((parse_hexadecimal, parse_decimal)).parse(input)
}

/// Parse a decimal number
fn parse_decimal(input: &str) -> IResult<&str, Value> {
    let (input, number_str) = recognize(pair(
        opt(char('-')),
        take_while1(|c: char| c.is_ascii_digit()),
    ))
    .parse(input)?;

    match number_str.parse::<NumberType>() {
        Ok(n) => Ok((input, Value::Integer(n))),
        // Digits that overflow the number type are a hard failure, not a
        // candidate identifier
        Err(_) => Err(nom::Err::Failure(nom::error::Error::new(
            input,
            ErrorKind::Digit,
        ))),
    }
}

/// Parse a hexadecimal number (#x or #X prefix)
fn parse_hexadecimal(input: &str) -> IResult<&str, Value> {
    let (input, _) = char('#').parse(input)?;
    let (input, _) = alt((char('x'), char('X'))).parse(input)?;
    let (input, hex_digits) = take_while1(|c: char| c.is_ascii_hexdigit()).parse(input)?;

    match NumberType::from_str_radix(hex_digits, 16) {
        Ok(n) => Ok((input, Value::Integer(n))),
        Err(_) => Err(nom::Err::Failure(nom::error::Error::new(
            input,
            ErrorKind::HexDigit,
        ))),
    }
}

/// Parse a boolean (#t or #f)
fn parse_bool(input: &str) -> IResult<&str, Value> {
    alt((
        value(Value::Boolean(true), tag("#t")),
        value(Value::Boolean(false), tag("#f")),
    ))
    .parse(input)
}

/// Parse a bare token as an identifier
fn parse_identifier(input: &str) -> IResult<&str, Value> {
    let mut token_chars =
        take_while1(|c: char| c.is_alphanumeric() || IDENT_SPECIAL_CHARS.contains(c));

    let (remaining, candidate) = token_chars.parse(input)?;

    if is_valid_identifier(candidate) {
        Ok((remaining, Value::Identifier(candidate.into())))
    } else {
        Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Alpha,
        )))
    }
}

/// Parse a tick-quoted form: `'atom` is an opaque symbol, `'()` the empty
/// list. Ticks do not nest and do not quote general lists.
fn parse_quoted(input: &str) -> IResult<&str, Value> {
    let (input, _) = char('\'').parse(input)?;

    let empty: IResult<&str, (char, (), char)> =
        (char('('), trivia0, char(')')).parse(input);
    if let Ok((rest, _)) = empty {
        return Ok((rest, Value::EmptyList));
    }

    let (input, name) =
        take_while1(|c: char| c.is_alphanumeric() || IDENT_SPECIAL_CHARS.contains(c))
            .parse(input)?;
    Ok((input, Value::Symbol(name.into())))
}

/// Parse a parenthesized form into a proper pair chain
fn parse_list(input: &str, depth: usize) -> IResult<&str, Value> {
    let (input, _) = char('(').parse(input)?;
    let (input, _) = trivia0.parse(input)?;

    let (input, elements) =
        separated_list0(trivia1, |input| parse_sexpr(input, depth + 1)).parse(input)?;

    let (input, _) = trivia0.parse(input)?;
    let (input, _) = char(')').parse(input)?;

    Ok((input, proper_list(elements)))
}

/// Parse one S-expression at the given nesting depth
fn parse_sexpr(input: &str, depth: usize) -> IResult<&str, Value> {
    if depth >= MAX_PARSE_DEPTH {
        // A hard failure: no alternative or enclosing list can recover
        return Err(nom::Err::Failure(nom::error::Error::new(
            input,
            ErrorKind::TooLarge,
        )));
    }
    let (input, _) = trivia0.parse(input)?;
    alt((
        parse_quoted,
        |input| parse_list(input, depth),
        parse_number,
        parse_bool,
        parse_identifier,
    ))
    .parse(input)
}

/// Convert nom parsing errors to structured ParseErrors
fn parse_failure(input: &str, error: nom::Err<nom::error::Error<&str>>) -> ParseError {
    match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let position = input.len().saturating_sub(e.input.len());
            match e.code {
                ErrorKind::TooLarge => ParseError::with_context(
                    ParseErrorKind::TooDeeplyNested,
                    format!("expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
                    input,
                    position,
                ),
                ErrorKind::Digit | ErrorKind::HexDigit => ParseError::with_context(
                    ParseErrorKind::ImplementationLimit,
                    "integer literal out of range",
                    input,
                    position,
                ),
                _ => {
                    if position < input.len() {
                        let found: String = input.chars().skip(position).take(10).collect();
                        ParseError::with_context_and_found(
                            ParseErrorKind::InvalidSyntax,
                            format!("invalid syntax near '{found}'"),
                            input,
                            position,
                            Some(found),
                        )
                    } else {
                        ParseError::from_message(
                            ParseErrorKind::Incomplete,
                            "unexpected end of input",
                        )
                    }
                }
            }
        }
        nom::Err::Incomplete(_) => {
            ParseError::from_message(ParseErrorKind::Incomplete, "incomplete input")
        }
    }
}

/// Pre-scan for structural problems: an unexpected closing parenthesis is
/// invalid, unclosed parentheses mean the input is still incomplete.
/// Comments are skipped.
fn scan_structure(input: &str) -> Result<(), ParseError> {
    let mut balance: i64 = 0;
    let mut in_comment = false;
    for (offset, c) in input.char_indices() {
        if in_comment {
            if c == '\n' {
                in_comment = false;
            }
            continue;
        }
        match c {
            ';' => in_comment = true,
            '(' => balance += 1,
            ')' => {
                balance -= 1;
                if balance < 0 {
                    return Err(ParseError::with_context_and_found(
                        ParseErrorKind::InvalidSyntax,
                        "unexpected closing parenthesis",
                        input,
                        offset,
                        Some(")".into()),
                    ));
                }
            }
            _ => {}
        }
    }
    if balance > 0 {
        return Err(ParseError::from_message(
            ParseErrorKind::Incomplete,
            "unclosed parenthesis",
        ));
    }
    Ok(())
}

/// Parse exactly one complete S-expression from input.
pub fn parse_expression(input: &str) -> Result<Value, Error> {
    scan_structure(input).map_err(Error::MalformedSyntax)?;

    match parse_sexpr(input, 0) {
        Ok((rest, parsed)) => {
            let rest = skip_trivia(rest);
            if rest.is_empty() {
                Ok(parsed)
            } else {
                Err(Error::MalformedSyntax(ParseError::with_context_and_found(
                    ParseErrorKind::TrailingContent,
                    "unexpected content after expression",
                    input,
                    input.len() - rest.len(),
                    Some(rest.chars().take(10).collect()),
                )))
            }
        }
        Err(e) => Err(Error::MalformedSyntax(parse_failure(input, e))),
    }
}

/// Parse a whole input batch: zero or more top-level S-expressions.
///
/// Blank (or comment-only) input yields an empty batch. Unclosed
/// parentheses report `Incomplete` so a driver can accumulate more lines.
pub fn parse_program(input: &str) -> Result<Vec<Value>, Error> {
    scan_structure(input).map_err(Error::MalformedSyntax)?;

    let mut forms = Vec::new();
    let mut rest = skip_trivia(input);
    while !rest.is_empty() {
        match parse_sexpr(rest, 0) {
            Ok((next, parsed)) => {
                forms.push(parsed);
                let after = skip_trivia(next);
                // Tokens must be separated by trivia unless the next form
                // opens with a paren or a tick
                if after.len() == next.len()
                    && !(next.is_empty() || next.starts_with('(') || next.starts_with('\''))
                {
                    let position = input.len() - next.len();
                    let found: String = next.chars().take(10).collect();
                    return Err(Error::MalformedSyntax(ParseError::with_context_and_found(
                        ParseErrorKind::InvalidSyntax,
                        format!("invalid syntax near '{found}'"),
                        input,
                        position,
                        Some(found),
                    )));
                }
                rest = after;
            }
            Err(e) => return Err(Error::MalformedSyntax(parse_failure(rest, e))),
        }
    }
    Ok(forms)
}
