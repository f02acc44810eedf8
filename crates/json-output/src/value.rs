//! Type-aware rendering of column values as JSON.

use relfeed_types::TypeCategory;

/// Why a value could not be rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// Numeric-typed text that is not a number
    NotANumber,
    /// No output routine for the type
    UnknownType,
}

/// Append the JSON rendering of one non-null value.
///
/// - numeric types: unquoted if the text consists only of digits, sign,
///   decimal point and exponent characters; NaN and infinities become `null`
/// - booleans: `t` is `true`, anything else `false`
/// - everything else: a quoted, escaped string
pub fn write_value(out: &mut String, category: TypeCategory, text: &str) -> Result<(), ValueError> {
    match category {
        TypeCategory::Numeric => {
            if is_special_number(text) {
                out.push_str("null");
            } else if !text.is_empty()
                && text
                    .chars()
                    .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | 'e' | 'E' | '.'))
            {
                out.push_str(text);
            } else {
                return Err(ValueError::NotANumber);
            }
        }
        TypeCategory::Boolean => out.push_str(if text == "t" { "true" } else { "false" }),
        TypeCategory::Text => quote_escape_json(out, text),
        TypeCategory::Unknown => return Err(ValueError::UnknownType),
    }
    Ok(())
}

/// NaN and infinities have no JSON representation
pub fn is_special_number(text: &str) -> bool {
    let starts_with = |prefix: &str| {
        text.get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
    };
    starts_with("NaN") || starts_with("Infinity") || starts_with("-Infinity")
}

/// Append `text` as a JSON string literal.
///
/// A backslash followed by `x` marks raw bytes that cannot be represented
/// and is dropped. Control characters without a short escape are written as
/// `\u00XX`.
pub fn quote_escape_json(out: &mut String, text: &str) {
    out.push('"');
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\' && chars.peek() == Some(&'x') {
            chars.next();
            continue;
        }

        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0C}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

/// `quote_escape_json` into a fresh string
pub fn quoted(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    quote_escape_json(&mut out, text);
    out
}
