// Exhibitor Search - core/response.rs
//
// Response body decoding.
//
// Exhibition APIs are not always well behaved. Besides plain JSON the
// decoder accepts:
//   - double-encoded JSON (a JSON string whose content is JSON)
//   - Python literal syntax ({'name': 'Acme', 'ok': True, 'fax': None}),
//     produced by backends that print a dict instead of serialising it

use crate::core::extract::describe;
use crate::util::constants;
use crate::util::logging::preview;
use serde_json::{Map, Number, Value};

/// Decode a response body into a JSON value.
///
/// On failure the error text lists the reason each decoder gave up and the
/// start of the body.
pub fn decode_body(text: &str) -> Result<Value, String> {
    let body = text.trim_start_matches('\u{feff}').trim();

    let json_error = match serde_json::from_str::<Value>(body) {
        Ok(Value::String(inner)) => {
            return Ok(serde_json::from_str::<Value>(&inner).unwrap_or(Value::String(inner)));
        }
        Ok(value) => return Ok(value),
        Err(e) => e.to_string(),
    };

    let literal_error = match parse_python_literal(body) {
        Ok(value @ Value::Object(_)) => return Ok(value),
        Ok(Value::String(inner)) => match serde_json::from_str::<Value>(&inner) {
            Ok(value) => return Ok(value),
            Err(e) => format!("literal is a string that is not JSON: {e}"),
        },
        Ok(other) => format!("literal is {}, expected a dict", describe(&other)),
        Err(e) => e,
    };

    Err(format!(
        "not JSON ({json_error}); not a Python literal ({literal_error}); body starts: {}",
        preview(body, constants::RESPONSE_PREVIEW_CHARS)
    ))
}

/// Parse a single Python literal expression into JSON.
///
/// Supports dicts, lists, tuples (as arrays), str with single or double
/// quotes, int, float, True, False and None. Dict keys that are not strings
/// are converted to their text.
pub fn parse_python_literal(text: &str) -> Result<Value, String> {
    let mut parser = LiteralParser {
        chars: text.chars().collect(),
        pos: 0,
        depth: 0,
    };
    let value = parser.value()?;
    parser.skip_ws();
    if parser.pos < parser.chars.len() {
        return Err(format!("unexpected trailing input at offset {}", parser.pos));
    }
    Ok(value)
}

/// Deepest container nesting accepted, the same bound serde_json applies.
const MAX_LITERAL_DEPTH: usize = 128;

struct LiteralParser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl LiteralParser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, wanted: char) -> Result<(), String> {
        match self.bump() {
            Some(c) if c == wanted => Ok(()),
            Some(c) => Err(format!("expected '{wanted}' at offset {}, found '{c}'", self.pos - 1)),
            None => Err(format!("expected '{wanted}', found end of input")),
        }
    }

    fn value(&mut self) -> Result<Value, String> {
        self.skip_ws();
        match self.peek() {
            None => Err("empty input".to_string()),
            Some('{') => self.nested(Self::dict),
            Some('[') => self.nested(|p| p.sequence('[', ']')),
            Some('(') => self.nested(|p| p.sequence('(', ')')),
            Some('\'') | Some('"') => self.string().map(Value::String),
            Some(c) if c == 'u' || c == 'U' => {
                // u'...' prefix
                if matches!(self.chars.get(self.pos + 1), Some('\'') | Some('"')) {
                    self.pos += 1;
                    self.string().map(Value::String)
                } else {
                    self.word()
                }
            }
            Some(c) if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => self.number(),
            Some(_) => self.word(),
        }
    }

    fn nested(&mut self, parse: impl FnOnce(&mut Self) -> Result<Value, String>) -> Result<Value, String> {
        if self.depth >= MAX_LITERAL_DEPTH {
            return Err(format!("nesting too deep at offset {}", self.pos));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn dict(&mut self) -> Result<Value, String> {
        self.expect('{')?;
        let mut map = Map::new();
        loop {
            self.skip_ws();
            if self.peek() == Some('}') {
                self.pos += 1;
                return Ok(Value::Object(map));
            }
            let key = match self.value()? {
                Value::String(s) => s,
                other => other.to_string(),
            };
            self.skip_ws();
            self.expect(':')?;
            let value = self.value()?;
            map.insert(key, value);
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some('}') => return Ok(Value::Object(map)),
                Some(c) => return Err(format!("expected ',' or '}}' in dict, found '{c}'")),
                None => return Err("unterminated dict".to_string()),
            }
        }
    }

    fn sequence(&mut self, open: char, close: char) -> Result<Value, String> {
        self.expect(open)?;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok(Value::Array(items));
            }
            items.push(self.value()?);
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some(c) if c == close => return Ok(Value::Array(items)),
                Some(c) => return Err(format!("expected ',' or '{close}', found '{c}'")),
                None => return Err(format!("unterminated sequence, expected '{close}'")),
            }
        }
    }

    fn string(&mut self) -> Result<String, String> {
        let quote = self.bump().ok_or("expected string")?;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err("unterminated string".to_string()),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => {
                    let escaped = self.bump().ok_or("unterminated escape")?;
                    match escaped {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '0' => out.push('\0'),
                        '\\' | '\'' | '"' => out.push(escaped),
                        '\n' => {}
                        'x' => out.push(self.hex_char(2)?),
                        'u' => out.push(self.hex_char(4)?),
                        'U' => out.push(self.hex_char(8)?),
                        other => {
                            out.push('\\');
                            out.push(other);
                        }
                    }
                }
                Some(c) => out.push(c),
            }
        }
    }

    fn hex_char(&mut self, digits: usize) -> Result<char, String> {
        let end = self.pos + digits;
        if end > self.chars.len() {
            return Err("truncated escape sequence".to_string());
        }
        let hex: String = self.chars[self.pos..end].iter().collect();
        self.pos = end;
        u32::from_str_radix(&hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| format!("invalid escape '\\{hex}'"))
    }

    fn number(&mut self) -> Result<Value, String> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '.' | '_')) {
            self.pos += 1;
        }
        let raw: String = self.chars[start..self.pos].iter().filter(|c| **c != '_').collect();
        if let Ok(i) = raw.parse::<i64>() {
            return Ok(Value::Number(i.into()));
        }
        raw.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| format!("invalid number '{raw}'"))
    }

    fn word(&mut self) -> Result<Value, String> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match word.as_str() {
            "True" => Ok(Value::Bool(true)),
            "False" => Ok(Value::Bool(false)),
            "None" => Ok(Value::Null),
            "" => Err(format!(
                "unexpected character '{}' at offset {start}",
                self.peek().unwrap_or(' ')
            )),
            other => Err(format!("unknown name '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_json() {
        assert_eq!(decode_body(r#"{"code": 0, "rows": [1]}"#).unwrap(), json!({"code": 0, "rows": [1]}));
    }

    #[test]
    fn test_json_with_bom_and_whitespace() {
        assert_eq!(decode_body("\u{feff}  [1, 2]\n").unwrap(), json!([1, 2]));
    }

    #[test]
    fn test_double_encoded_json() {
        let body = r#""{\"data\": {\"list\": []}}""#;
        assert_eq!(decode_body(body).unwrap(), json!({"data": {"list": []}}));
    }

    #[test]
    fn test_plain_json_string_is_kept() {
        assert_eq!(decode_body(r#""hello""#).unwrap(), json!("hello"));
    }

    #[test]
    fn test_python_literal_dict() {
        let body = "{'name': 'Acme', 'ok': True, 'fax': None, 'tags': ('a', 'b'), 'n': -3, 'r': 1.5}";
        assert_eq!(
            decode_body(body).unwrap(),
            json!({"name": "Acme", "ok": true, "fax": null, "tags": ["a", "b"], "n": -3, "r": 1.5})
        );
    }

    #[test]
    fn test_python_literal_escapes() {
        let body = r#"{'msg': 'it\'s 展会', u'k': "x\ny"}"#;
        assert_eq!(decode_body(body).unwrap(), json!({"msg": "it's 展会", "k": "x\ny"}));
    }

    #[test]
    fn test_python_literal_non_string_keys() {
        assert_eq!(
            parse_python_literal("{1: 'a', None: 'b'}").unwrap(),
            json!({"1": "a", "null": "b"})
        );
    }

    #[test]
    fn test_python_literal_list_is_rejected() {
        let err = decode_body("['a', 'b']").unwrap_err();
        assert!(err.contains("expected a dict"), "{err}");
    }

    #[test]
    fn test_html_is_rejected_with_preview() {
        let err = decode_body("<html><body>502 Bad Gateway</body></html>").unwrap_err();
        assert!(err.contains("not JSON"));
        assert!(err.contains("502 Bad Gateway"));
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        assert!(parse_python_literal("{'a': 1} extra").is_err());
    }

    #[test]
    fn test_deep_nesting_is_rejected_without_overflow() {
        let body = "[".repeat(20_000);
        let err = decode_body(&body).unwrap_err();
        assert!(err.contains("nesting too deep"), "{err}");

        let dict = format!("{}{}", "{'a': ".repeat(5_000), "}".repeat(5_000));
        assert!(parse_python_literal(&dict).is_err());
    }

    #[test]
    fn test_nesting_within_limit_is_accepted() {
        let text = format!("{{'a': {}1{}}}", "[".repeat(100), "]".repeat(100));
        assert!(parse_python_literal(&text).is_ok());
    }
}
