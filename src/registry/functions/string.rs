//! String manipulation functions
//!
//! Positions and lengths count characters, not bytes. Every function takes a
//! single String input; an empty input or an empty argument yields empty.

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use regex::Regex;

use crate::core::{EvaluationError, EvaluationResult};
use crate::evaluator::FunctionContext;
use crate::model::{Collection, FhirPathValue};
use crate::registry::function::{FunctionKind, FunctionRegistry, FunctionResult};
use crate::registry::signature::{FunctionSignature, ParameterInfo, ParameterKind};

fn input_string<'a>(ctx: &FunctionContext<'a, '_>) -> EvaluationResult<Option<&'a str>> {
    match ctx.input_singleton()? {
        None => Ok(None),
        Some(FhirPathValue::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(ctx.input_mismatch("String", other)),
    }
}

fn compile(pattern: &str) -> EvaluationResult<Regex> {
    Regex::new(pattern).map_err(|e| {
        EvaluationError::type_mismatch(format!("invalid regular expression '{pattern}': {e}"))
    })
}

fn char_index(haystack: &str, byte_index: usize) -> usize {
    haystack[..byte_index].chars().count()
}

/// Register a function over a String input and a fixed number of String arguments
fn register_string_fn<F>(
    registry: &mut FunctionRegistry,
    name: &'static str,
    params: &[&'static str],
    doc: &'static str,
    body: F,
) where
    F: Fn(&str, &[String]) -> FunctionResult + Send + Sync + 'static,
{
    let parameters = params.iter().map(|p| ParameterInfo::value(*p)).collect();
    let arity = params.len();
    registry.register_closure(
        FunctionSignature::new(name, parameters),
        FunctionKind::CollectionWise,
        doc,
        move |ctx| {
            let Some(input) = input_string(ctx)? else {
                return Ok(Collection::empty());
            };
            let mut args = Vec::with_capacity(arity);
            for i in 0..arity {
                match ctx.string_arg(i)? {
                    Some(arg) => args.push(arg),
                    None => return Ok(Collection::empty()),
                }
            }
            body(input, &args)
        },
    );
}

fn encode(input: &str, format: &str) -> Option<String> {
    match format {
        "hex" => Some(hex::encode(input.as_bytes())),
        "base64" => Some(STANDARD.encode(input.as_bytes())),
        "urlbase64" => Some(URL_SAFE.encode(input.as_bytes())),
        _ => None,
    }
}

fn decode(input: &str, format: &str) -> Option<String> {
    let bytes = match format {
        "hex" => hex::decode(input).ok()?,
        "base64" => STANDARD.decode(input).ok()?,
        "urlbase64" => URL_SAFE.decode(input).ok()?,
        _ => return None,
    };
    String::from_utf8(bytes).ok()
}

fn optional_string(value: Option<String>) -> Collection {
    value.map(Collection::singleton).unwrap_or_default()
}

/// Register string functions
pub fn register(registry: &mut FunctionRegistry) {
    register_string_fn(
        registry,
        "indexOf",
        &["substring"],
        "Returns the 0-based index of the first position substring is found in the input string, or -1 if it is not found.",
        |s, args| {
            let index = match s.find(args[0].as_str()) {
                Some(byte_index) => char_index(s, byte_index) as i32,
                None => -1,
            };
            Ok(Collection::singleton(index))
        },
    );
    register_string_fn(
        registry,
        "startsWith",
        &["prefix"],
        "Returns true when the input string starts with the given prefix.",
        |s, args| Ok(Collection::singleton(s.starts_with(args[0].as_str()))),
    );
    register_string_fn(
        registry,
        "endsWith",
        &["suffix"],
        "Returns true when the input string ends with the given suffix.",
        |s, args| Ok(Collection::singleton(s.ends_with(args[0].as_str()))),
    );
    register_string_fn(
        registry,
        "contains",
        &["substring"],
        "Returns true when the given substring is a substring of the input string.",
        |s, args| Ok(Collection::singleton(s.contains(args[0].as_str()))),
    );
    register_string_fn(
        registry,
        "upper",
        &[],
        "Returns the input string with all characters converted to upper case.",
        |s, _| Ok(Collection::singleton(s.to_uppercase())),
    );
    register_string_fn(
        registry,
        "lower",
        &[],
        "Returns the input string with all characters converted to lower case.",
        |s, _| Ok(Collection::singleton(s.to_lowercase())),
    );
    register_string_fn(
        registry,
        "replace",
        &["pattern", "substitution"],
        "Returns the input string with all instances of pattern replaced with substitution.",
        |s, args| Ok(Collection::singleton(s.replace(args[0].as_str(), &args[1]))),
    );
    register_string_fn(
        registry,
        "matches",
        &["regex"],
        "Returns true when the value matches the given regular expression.",
        |s, args| Ok(Collection::singleton(compile(&args[0])?.is_match(s))),
    );
    register_string_fn(
        registry,
        "replaceMatches",
        &["regex", "substitution"],
        "Matches the input using the regular expression and replaces each match with the substitution string, which may reference capture groups.",
        |s, args| {
            if args[0].is_empty() {
                return Ok(Collection::singleton(s));
            }
            let regex = compile(&args[0])?;
            Ok(Collection::singleton(
                regex.replace_all(s, args[1].as_str()).into_owned(),
            ))
        },
    );
    register_string_fn(
        registry,
        "length",
        &[],
        "Returns the length of the input string.",
        |s, _| Ok(Collection::singleton(s.chars().count() as i32)),
    );
    register_string_fn(
        registry,
        "toChars",
        &[],
        "Returns the list of characters in the input string.",
        |s, _| Ok(s.chars().map(|c| FhirPathValue::String(c.to_string())).collect()),
    );
    register_string_fn(
        registry,
        "trim",
        &[],
        "Returns the input string with leading and trailing whitespace removed.",
        |s, _| Ok(Collection::singleton(s.trim())),
    );
    register_string_fn(
        registry,
        "split",
        &["separator"],
        "Splits the input string around instances of the separator.",
        |s, args| {
            Ok(s.split(args[0].as_str())
                .map(|part| FhirPathValue::String(part.to_string()))
                .collect())
        },
    );
    register_string_fn(
        registry,
        "encode",
        &["format"],
        "Encodes the input string in the given format: hex, base64 or urlbase64.",
        |s, args| Ok(optional_string(encode(s, &args[0]))),
    );
    register_string_fn(
        registry,
        "decode",
        &["format"],
        "Decodes the input string from the given format: hex, base64 or urlbase64.",
        |s, args| Ok(optional_string(decode(s, &args[0]))),
    );

    registry.register_closure(
        FunctionSignature::new(
            "substring",
            vec![
                ParameterInfo::value("start"),
                ParameterInfo::optional("length", ParameterKind::Value),
            ],
        ),
        FunctionKind::CollectionWise,
        "Returns the part of the string starting at position start (zero-based), up to length characters when given.",
        |ctx| {
            let Some(input) = input_string(ctx)? else {
                return Ok(Collection::empty());
            };
            let Some(start) = ctx.integer_arg(0)? else {
                return Ok(Collection::empty());
            };
            let chars = input.chars().count();
            let Some(start) = usize::try_from(start).ok().filter(|s| *s < chars) else {
                return Ok(Collection::empty());
            };
            let take = match ctx.integer_arg(1)? {
                Some(length) => usize::try_from(length.max(0)).unwrap_or(usize::MAX),
                None => usize::MAX,
            };
            let result: String = input.chars().skip(start).take(take).collect();
            Ok(Collection::singleton(result))
        },
    );

    registry.register_closure(
        FunctionSignature::new(
            "join",
            vec![ParameterInfo::optional("separator", ParameterKind::Value)],
        ),
        FunctionKind::CollectionWise,
        "Joins the input collection of strings using the separator, or no separator when omitted.",
        |ctx| {
            let input = ctx.input();
            if input.is_empty() {
                return Ok(Collection::empty());
            }
            let separator = ctx.string_arg(0)?.unwrap_or_default();
            let parts = input
                .iter()
                .map(|item| match item {
                    FhirPathValue::String(s) => Ok(s.as_str()),
                    other => Err(ctx.input_mismatch("String", other)),
                })
                .collect::<EvaluationResult<Vec<_>>>()?;
            Ok(Collection::singleton(parts.join(&separator)))
        },
    );
}

#[cfg(test)]
mod tests {
    use super::super::test_support::eval;
    use crate::core::EvalErrorKind;
    use crate::model::{Collection, FhirPathValue};
    use rstest::rstest;

    #[rstest]
    #[case("'abcdef'.substring(2)", "cdef")]
    #[case("'abcdef'.substring(2, 3)", "cde")]
    #[case("'abc'.upper()", "ABC")]
    #[case("'  x '.trim()", "x")]
    #[case("'a-b-c'.replace('-', '+')", "a+b+c")]
    #[case("'abc123'.replaceMatches('[0-9]+', 'N')", "abcN")]
    #[case("'abc'.replaceMatches('', 'x')", "abc")]
    #[case("'héllo'.encode('hex').decode('hex')", "héllo")]
    #[case("'hello'.encode('base64')", "aGVsbG8=")]
    #[case("('a' | 'b' | 'c').join(',')", "a,b,c")]
    fn test_string_results(#[case] expr: &str, #[case] expected: &str) {
        assert_eq!(eval(expr).unwrap(), Collection::singleton(expected));
    }

    #[test]
    fn test_positions_count_characters() {
        assert_eq!(eval("'héllo'.indexOf('l')").unwrap(), Collection::singleton(2));
        assert_eq!(eval("'héllo'.length()").unwrap(), Collection::singleton(5));
        assert_eq!(eval("'abc'.indexOf('z')").unwrap(), Collection::singleton(-1));
    }

    #[test]
    fn test_out_of_range_substring_is_empty() {
        assert!(eval("'abc'.substring(5)").unwrap().is_empty());
        assert!(eval("'abc'.substring(-1)").unwrap().is_empty());
    }

    #[test]
    fn test_split_and_chars() {
        assert_eq!(
            eval("'a,b'.split(',')").unwrap(),
            Collection::from_vec(vec![FhirPathValue::from("a"), FhirPathValue::from("b")])
        );
        assert_eq!(eval("'ab'.toChars().count()").unwrap(), Collection::singleton(2));
    }

    #[test]
    fn test_matches() {
        assert_eq!(eval("'2024-01'.matches('^\\\\d{4}')").unwrap(), Collection::singleton(true));
        let err = eval("'x'.matches('(')").unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::TypeMismatch);
    }

    #[test]
    fn test_non_string_input() {
        let err = eval("1.upper()").unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::TypeMismatch);
        let err = eval("('a' | 'b').upper()").unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::NonSingleton);
    }
}
