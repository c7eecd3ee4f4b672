//! Parser for the Python literal subset gogrepo's manifest uses.
//!
//! Supports dicts, lists, tuples, strings (any quote style, `u`/`b`/`r`
//! prefixes, adjacent-literal concatenation as emitted by `pprint`),
//! integers, floats, `True`, `False` and `None`. Tuples become arrays and
//! non-string dict keys are stringified.

use serde_json::{Map, Number, Value};

use crate::error::ManifestError;

/// Deepest container nesting accepted. gogrepo's manifest nests four levels.
const MAX_DEPTH: usize = 128;

/// Parses a Python literal into a JSON value.
pub fn parse_python_literal(input: &str) -> Result<Value, ManifestError> {
    let mut parser = Parser {
        src: input,
        pos: 0,
        depth: 0,
    };
    parser.skip_ws();
    let value = parser.value()?;
    parser.skip_ws();
    if parser.pos < parser.src.len() {
        return Err(parser.error("trailing characters after value"));
    }
    Ok(value)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn error(&self, msg: impl Into<String>) -> ManifestError {
        ManifestError::Parse {
            offset: self.pos,
            msg: msg.into(),
        }
    }

    fn rest(&self) -> &str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<(), ManifestError> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{c}'")))
        }
    }

    fn skip_ws(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('#') => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                _ => return,
            }
        }
    }

    fn value(&mut self) -> Result<Value, ManifestError> {
        match self.peek() {
            None => Err(self.error("unexpected end of input")),
            Some('{') => self.nested(Self::dict),
            Some('[') => self.nested(Self::list),
            Some('(') => self.nested(Self::paren),
            Some('\'' | '"') => self.strings(),
            Some(c) if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => self.number(),
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                if self.string_prefix_len().is_some() {
                    return self.strings();
                }
                self.keyword()
            }
            Some(c) => Err(self.error(format!("unexpected character '{c}'"))),
        }
    }

    fn nested(
        &mut self,
        container: fn(&mut Self) -> Result<Value, ManifestError>,
    ) -> Result<Value, ManifestError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error(format!("nesting deeper than {MAX_DEPTH} levels")));
        }
        self.depth += 1;
        let value = container(self);
        self.depth -= 1;
        value
    }

    fn dict(&mut self) -> Result<Value, ManifestError> {
        self.expect('{')?;
        let mut map = Map::new();
        loop {
            self.skip_ws();
            if self.eat('}') {
                return Ok(Value::Object(map));
            }
            let key_pos = self.pos;
            let key = match self.value()? {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(true) => "True".into(),
                Value::Bool(false) => "False".into(),
                Value::Null => "None".into(),
                _ => {
                    self.pos = key_pos;
                    return Err(self.error("unsupported dict key"));
                }
            };
            self.skip_ws();
            self.expect(':')?;
            self.skip_ws();
            let value = self.value()?;
            map.insert(key, value);
            self.skip_ws();
            if !self.eat(',') {
                self.skip_ws();
                self.expect('}')?;
                return Ok(Value::Object(map));
            }
        }
    }

    fn list(&mut self) -> Result<Value, ManifestError> {
        self.expect('[')?;
        let items = self.sequence(']')?;
        Ok(Value::Array(items))
    }

    /// Tuple, or a parenthesized expression when there is no comma.
    fn paren(&mut self) -> Result<Value, ManifestError> {
        self.expect('(')?;
        self.skip_ws();
        if self.eat(')') {
            return Ok(Value::Array(Vec::new()));
        }
        let first = self.value()?;
        self.skip_ws();
        if self.eat(')') {
            return Ok(first);
        }
        self.expect(',')?;
        let mut items = vec![first];
        items.extend(self.sequence(')')?);
        Ok(Value::Array(items))
    }

    /// Comma-separated values up to `close`, trailing comma allowed.
    fn sequence(&mut self, close: char) -> Result<Vec<Value>, ManifestError> {
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.eat(close) {
                return Ok(items);
            }
            items.push(self.value()?);
            self.skip_ws();
            if !self.eat(',') {
                self.skip_ws();
                self.expect(close)?;
                return Ok(items);
            }
        }
    }

    fn keyword(&mut self) -> Result<Value, ManifestError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.bump();
        }
        let src = self.src;
        match &src[start..self.pos] {
            "True" => Ok(Value::Bool(true)),
            "False" => Ok(Value::Bool(false)),
            "None" => Ok(Value::Null),
            word => {
                let msg = format!("unknown name '{word}'");
                self.pos = start;
                Err(self.error(msg))
            }
        }
    }

    fn number(&mut self) -> Result<Value, ManifestError> {
        let start = self.pos;
        if matches!(self.peek(), Some('-' | '+')) {
            self.bump();
        }
        let mut float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' | '_' => {}
                '.' => float = true,
                'e' | 'E' => {
                    float = true;
                    self.bump();
                    if matches!(self.peek(), Some('-' | '+')) {
                        self.bump();
                    }
                    continue;
                }
                _ => break,
            }
            self.bump();
        }
        let text: String = self.src[start..self.pos].chars().filter(|&c| c != '_').collect();
        let parsed = if float {
            text.parse::<f64>().ok().and_then(Number::from_f64)
        } else {
            text.parse::<i64>()
                .map(Number::from)
                .ok()
                .or_else(|| text.parse::<u64>().ok().map(Number::from))
        };
        parsed.map(Value::Number).ok_or_else(|| {
            let msg = format!("invalid number '{text}'");
            ManifestError::Parse { offset: start, msg }
        })
    }

    /// Length of a string prefix (`u`, `b`, `r`, `rb`, ...) directly
    /// followed by a quote, if one starts here.
    fn string_prefix_len(&self) -> Option<usize> {
        let rest = self.rest().as_bytes();
        let mut n = 0;
        while n < 2 && rest.get(n).is_some_and(|b| b"uUbBrR".contains(b)) {
            n += 1;
        }
        (n > 0 && matches!(rest.get(n), Some(b'\'' | b'"'))).then_some(n)
    }

    /// One or more adjacent string literals, concatenated.
    fn strings(&mut self) -> Result<Value, ManifestError> {
        let mut out = self.string()?;
        loop {
            let save = self.pos;
            self.skip_ws();
            let next_is_string = matches!(self.peek(), Some('\'' | '"'))
                || self.string_prefix_len().is_some();
            if !next_is_string {
                self.pos = save;
                return Ok(Value::String(out));
            }
            out.push_str(&self.string()?);
        }
    }

    fn string(&mut self) -> Result<String, ManifestError> {
        let prefix = self.string_prefix_len().unwrap_or(0);
        let raw = self.src[self.pos..self.pos + prefix]
            .chars()
            .any(|c| c.eq_ignore_ascii_case(&'r'));
        self.pos += prefix;

        let start = self.pos;
        let Some(quote) = self.bump() else {
            return Err(self.error("expected string"));
        };
        let triple = self.rest().starts_with(&format!("{quote}{quote}"));
        if triple {
            self.pos += 2;
        }

        let mut out = String::new();
        loop {
            let Some(c) = self.bump() else {
                self.pos = start;
                return Err(self.error("unterminated string"));
            };
            if c == quote {
                if !triple {
                    return Ok(out);
                }
                if self.rest().starts_with(&format!("{quote}{quote}")) {
                    self.pos += 2;
                    return Ok(out);
                }
                out.push(c);
                continue;
            }
            if c == '\n' && !triple {
                self.pos = start;
                return Err(self.error("newline in string"));
            }
            if c != '\\' {
                out.push(c);
                continue;
            }
            if raw {
                out.push('\\');
                if let Some(next) = self.bump() {
                    out.push(next);
                }
                continue;
            }
            self.escape(&mut out)?;
        }
    }

    fn escape(&mut self, out: &mut String) -> Result<(), ManifestError> {
        let Some(c) = self.bump() else {
            return Err(self.error("unterminated escape"));
        };
        match c {
            '\n' => {}
            '\\' | '\'' | '"' => out.push(c),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'a' => out.push('\u{07}'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0c}'),
            'v' => out.push('\u{0b}'),
            '0'..='7' => {
                let mut code = c.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match self.peek().and_then(|d| d.to_digit(8)) {
                        Some(d) => {
                            code = code * 8 + d;
                            self.bump();
                        }
                        None => break,
                    }
                }
                out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
            }
            'x' => out.push(self.hex_escape(2)?),
            'u' => out.push(self.hex_escape(4)?),
            'U' => out.push(self.hex_escape(8)?),
            other => {
                out.push('\\');
                out.push(other);
            }
        }
        Ok(())
    }

    fn hex_escape(&mut self, digits: usize) -> Result<char, ManifestError> {
        let hex = self
            .rest()
            .get(..digits)
            .filter(|h| h.chars().all(|c| c.is_ascii_hexdigit()))
            .ok_or_else(|| self.error("truncated hex escape"))?;
        let code = u32::from_str_radix(hex, 16).map_err(|e| self.error(e.to_string()))?;
        self.pos += digits;
        Ok(char::from_u32(code).unwrap_or('\u{fffd}'))
    }
}
