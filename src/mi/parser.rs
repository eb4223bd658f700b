//! Output record tokenizer.
use crate::mi::{
    AsyncKind, AsyncRecord, Record, ResultClass, ResultRecord, Results, StreamKind, Token, Value,
    PROMPT,
};
use anyhow::anyhow;
use chumsky::prelude::*;
use chumsky::Parser;
use std::str::FromStr;

type Err<'a> = extra::Err<Rich<'a, char>>;

fn variable<'a>() -> impl Parser<'a, &'a str, &'a str, Err<'a>> + Clone {
    any()
        .filter(|c: &char| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .repeated()
        .at_least(1)
        .to_slice()
        .labelled("variable")
}

fn cstring<'a>() -> impl Parser<'a, &'a str, String, Err<'a>> + Clone {
    let escape = just('\\').then(any()).ignored();
    let plain = none_of("\\\"").ignored();
    plain
        .or(escape)
        .repeated()
        .to_slice()
        .map(unescape)
        .delimited_by(just('"'), just('"'))
        .labelled("c-string")
}

fn value<'a>() -> impl Parser<'a, &'a str, Value, Err<'a>> + Clone {
    recursive(|value| {
        let result = variable()
            .then_ignore(just('='))
            .then(value.clone())
            .map(|(k, v): (&str, Value)| (k.to_string(), v));

        let tuple = result
            .clone()
            .separated_by(just(','))
            .collect::<Vec<_>>()
            .delimited_by(just('{'), just('}'))
            .map(|pairs| Value::Tuple(Results(pairs)));

        // a list holds either values or `variable=value` pairs
        let list_item = result
            .map(|pair| Value::Tuple(Results(vec![pair])))
            .or(value);
        let list = list_item
            .separated_by(just(','))
            .collect::<Vec<_>>()
            .delimited_by(just('['), just(']'))
            .map(Value::List);

        choice((cstring().map(Value::Const), tuple, list))
    })
    .labelled("value")
}

fn result<'a>() -> impl Parser<'a, &'a str, (String, Value), Err<'a>> + Clone {
    variable()
        .then_ignore(just('='))
        .then(value())
        .map(|(k, v): (&str, Value)| (k.to_string(), v))
}

fn token<'a>() -> impl Parser<'a, &'a str, Option<Token>, Err<'a>> + Clone {
    text::int(10)
        .try_map(|s: &str, span| s.parse::<Token>().map_err(|e| Rich::custom(span, e)))
        .or_not()
}

fn record<'a>() -> impl Parser<'a, &'a str, Record, Err<'a>> {
    let results = just(',')
        .ignore_then(result())
        .repeated()
        .collect::<Vec<_>>()
        .map(Results);

    let result_class = variable().try_map(|s: &str, span| {
        ResultClass::from_str(s)
            .map_err(|_| Rich::custom(span, format!("unknown result class `{s}`")))
    });
    let result_record = token()
        .then_ignore(just('^'))
        .then(result_class)
        .then(results.clone())
        .map(|((token, class), results)| {
            Record::Result(ResultRecord {
                token,
                class,
                results,
            })
        })
        .labelled("result record");

    let async_kind = one_of("*+=").map(|c: char| match c {
        '*' => AsyncKind::Exec,
        '+' => AsyncKind::Status,
        _ => AsyncKind::Notify,
    });
    let async_record = token()
        .then(async_kind)
        .then(variable())
        .then(results)
        .map(|(((token, kind), class), results)| {
            Record::Async(AsyncRecord {
                token,
                kind,
                class: class.to_string(),
                results,
            })
        })
        .labelled("async record");

    let stream_kind = one_of("~@&").map(|c: char| match c {
        '~' => StreamKind::Console,
        '@' => StreamKind::Target,
        _ => StreamKind::Log,
    });
    let stream_record = stream_kind
        .then(cstring())
        .map(|(kind, text)| Record::Stream(kind, text))
        .labelled("stream record");

    let prompt = just(PROMPT).padded().to(Record::Prompt);

    choice((prompt, stream_record, result_record, async_record)).then_ignore(end())
}

/// Decode C-string escapes. Octal escapes are raw bytes of (usually) UTF-8 text.
fn unescape(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' || i + 1 == bytes.len() {
            out.push(bytes[i]);
            i += 1;
            continue;
        }

        let next = bytes[i + 1];
        i += 2;
        match next {
            b'n' => out.push(b'\n'),
            b't' => out.push(b'\t'),
            b'r' => out.push(b'\r'),
            b'e' => out.push(0x1b),
            b'0'..=b'7' => {
                let mut code = (next - b'0') as u32;
                let mut digits = 1;
                while digits < 3 && i < bytes.len() && (b'0'..=b'7').contains(&bytes[i]) {
                    code = code * 8 + (bytes[i] - b'0') as u32;
                    digits += 1;
                    i += 1;
                }
                out.push((code & 0xff) as u8);
            }
            other => out.push(other),
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

pub(super) fn parse_record(line: &str) -> anyhow::Result<Record> {
    record()
        .parse(line)
        .into_result()
        .map_err(|errors| match errors.first() {
            Some(e) => anyhow!("{e}"),
            None => anyhow!("malformed record"),
        })
}
