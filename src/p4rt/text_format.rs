//! Protobuf text format, as `p4c --p4runtime-files foo.p4info.txt` writes it.
//!
//! [parse] turns a document into a generic [TextMessage] tree; [parse_p4info]
//! maps that tree onto the generated P4Info types. Fields the P4Info
//! bindings do not carry (type_info, registers, digests, externs, ...) are
//! skipped.

use crate::proto::p4config::{
    action, controller_packet_metadata, counter_spec, match_field, meter_spec, table,
    action_ref, Action, ActionProfile, ActionRef, ControllerPacketMetadata, Counter, CounterSpec,
    DirectCounter, DirectMeter, Documentation, MatchField, Meter, MeterSpec, P4Info, P4NamedType,
    PkgInfo, Preamble, Table,
};
use log::debug;
use std::iter::Peekable;
use std::str::Chars;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TextFormatError {
    #[error("line {}, column {}: {}", line, column, message)]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("field '{}': {}", field, message)]
    Schema { field: String, message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Str(String),
    Int(i128),
    Float(f64),
    Ident(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TextValue {
    Scalar(Scalar),
    Message(TextMessage),
}

/// Fields in document order. Repeated fields appear once per element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextMessage {
    pub fields: Vec<(String, TextValue)>,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(String),
    Punct(char),
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Lexer {
            chars: text.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    fn error<T>(&self, message: String) -> Result<T, TextFormatError> {
        Err(TextFormatError::Syntax {
            line: self.line,
            column: self.column,
            message,
        })
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c == '#' {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else if c.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    /// Returns the next token with the position it started at.
    fn next_token(&mut self) -> Result<Option<(Token, usize, usize)>, TextFormatError> {
        self.skip_trivia();
        let (line, column) = (self.line, self.column);
        let c = match self.chars.peek() {
            Some(&c) => c,
            None => return Ok(None),
        };
        let token = if c == '"' || c == '\'' {
            self.bump();
            Token::Str(self.string(c)?)
        } else if c.is_ascii_digit() || c == '-' || c == '.' {
            Token::Number(self.number())
        } else if c.is_ascii_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&c) = self.chars.peek() {
                if c.is_ascii_alphanumeric() || c == '_' {
                    ident.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
            Token::Ident(ident)
        } else if "{}<>[]:,;".contains(c) {
            self.bump();
            Token::Punct(c)
        } else {
            return self.error(format!("unexpected character '{}'", c));
        };
        Ok(Some((token, line, column)))
    }

    fn number(&mut self) -> String {
        let mut raw = String::new();
        if let Some(&'-') = self.chars.peek() {
            raw.push('-');
            self.bump();
        }
        let mut prev = ' ';
        while let Some(&c) = self.chars.peek() {
            let exponent_sign = (c == '+' || c == '-')
                && (prev == 'e' || prev == 'E')
                && !raw.starts_with("0x")
                && !raw.starts_with("-0x");
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || exponent_sign {
                raw.push(c);
                prev = c;
                self.bump();
            } else {
                break;
            }
        }
        raw
    }

    fn string(&mut self, quote: char) -> Result<String, TextFormatError> {
        let mut bytes: Vec<u8> = Vec::new();
        loop {
            let c = match self.bump() {
                Some(c) => c,
                None => return self.error("unterminated string".to_owned()),
            };
            if c == quote {
                break;
            }
            if c == '\n' {
                return self.error("newline in string".to_owned());
            }
            if c != '\\' {
                let mut buf = [0u8; 4];
                bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                continue;
            }
            let escaped = match self.bump() {
                Some(e) => e,
                None => return self.error("unterminated escape".to_owned()),
            };
            match escaped {
                'n' => bytes.push(b'\n'),
                't' => bytes.push(b'\t'),
                'r' => bytes.push(b'\r'),
                'a' => bytes.push(0x07),
                'b' => bytes.push(0x08),
                'f' => bytes.push(0x0c),
                'v' => bytes.push(0x0b),
                '\\' | '\'' | '"' | '?' => bytes.push(escaped as u8),
                'x' | 'X' => {
                    let mut value = 0u32;
                    let mut digits = 0;
                    while digits < 2 {
                        match self.chars.peek().and_then(|c| c.to_digit(16)) {
                            Some(d) => {
                                value = value * 16 + d;
                                digits += 1;
                                self.bump();
                            }
                            None => break,
                        }
                    }
                    if digits == 0 {
                        return self.error("\\x without hex digits".to_owned());
                    }
                    bytes.push(value as u8);
                }
                '0'..='7' => {
                    let mut value = escaped.to_digit(8).unwrap_or(0);
                    let mut digits = 1;
                    while digits < 3 {
                        match self.chars.peek().and_then(|c| c.to_digit(8)) {
                            Some(d) => {
                                value = value * 8 + d;
                                digits += 1;
                                self.bump();
                            }
                            None => break,
                        }
                    }
                    bytes.push(value as u8);
                }
                other => return self.error(format!("unknown escape '\\{}'", other)),
            }
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    peeked: Option<(Token, usize, usize)>,
}

impl<'a> Parser<'a> {
    fn peek(&mut self) -> Result<Option<&Token>, TextFormatError> {
        if self.peeked.is_none() {
            self.peeked = self.lexer.next_token()?;
        }
        Ok(self.peeked.as_ref().map(|(t, _, _)| t))
    }

    fn next(&mut self) -> Result<Option<(Token, usize, usize)>, TextFormatError> {
        match self.peeked.take() {
            Some(t) => Ok(Some(t)),
            None => self.lexer.next_token(),
        }
    }

    fn error_at<T>(line: usize, column: usize, message: String) -> Result<T, TextFormatError> {
        Err(TextFormatError::Syntax {
            line,
            column,
            message,
        })
    }

    fn eat_punct(&mut self, c: char) -> Result<bool, TextFormatError> {
        if self.peek()? == Some(&Token::Punct(c)) {
            self.next()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn message(&mut self, close: Option<char>) -> Result<TextMessage, TextFormatError> {
        let mut message = TextMessage::default();
        loop {
            let (token, line, column) = match self.next()? {
                Some(t) => t,
                None => match close {
                    None => return Ok(message),
                    Some(c) => {
                        return self.lexer.error(format!("expected '{}' before end of input", c))
                    }
                },
            };
            let name = match token {
                Token::Punct(c) if Some(c) == close => return Ok(message),
                Token::Ident(name) => name,
                other => {
                    let message = format!("expected field name, got {:?}", other);
                    return Self::error_at(line, column, message);
                }
            };
            let had_colon = self.eat_punct(':')?;
            match self.peek()? {
                Some(Token::Punct('{')) | Some(Token::Punct('<')) => {
                    let value = self.nested()?;
                    message.fields.push((name, TextValue::Message(value)));
                }
                Some(Token::Punct('[')) if had_colon => {
                    self.next()?;
                    self.list(&name, &mut message)?;
                }
                _ if had_colon => {
                    let value = self.scalar()?;
                    message.fields.push((name, TextValue::Scalar(value)));
                }
                _ => {
                    let message = format!("expected ':' or '{{' after '{}'", name);
                    return Self::error_at(line, column, message);
                }
            }
            if !self.eat_punct(',')? {
                self.eat_punct(';')?;
            }
        }
    }

    fn nested(&mut self) -> Result<TextMessage, TextFormatError> {
        let close = match self.next()? {
            Some((Token::Punct('{'), _, _)) => '}',
            Some((Token::Punct('<'), _, _)) => '>',
            _ => return self.lexer.error("expected '{' or '<'".to_owned()),
        };
        self.message(Some(close))
    }

    fn list(&mut self, name: &str, message: &mut TextMessage) -> Result<(), TextFormatError> {
        if self.eat_punct(']')? {
            return Ok(());
        }
        loop {
            let value = match self.peek()? {
                Some(Token::Punct('{')) | Some(Token::Punct('<')) => {
                    TextValue::Message(self.nested()?)
                }
                _ => TextValue::Scalar(self.scalar()?),
            };
            message.fields.push((name.to_owned(), value));
            if self.eat_punct(']')? {
                return Ok(());
            }
            if !self.eat_punct(',')? {
                return self.lexer.error(format!("expected ',' or ']' in list '{}'", name));
            }
        }
    }

    fn scalar(&mut self) -> Result<Scalar, TextFormatError> {
        let (token, line, column) = match self.next()? {
            Some(t) => t,
            None => return self.lexer.error("expected a value".to_owned()),
        };
        match token {
            Token::Str(mut s) => {
                while let Some(Token::Str(_)) = self.peek()? {
                    if let Some((Token::Str(more), _, _)) = self.next()? {
                        s.push_str(&more);
                    }
                }
                Ok(Scalar::Str(s))
            }
            Token::Ident(ident) => Ok(Scalar::Ident(ident)),
            Token::Number(raw) => match parse_number(&raw) {
                Some(n) => Ok(n),
                None => Self::error_at(line, column, format!("bad number '{}'", raw)),
            },
            Token::Punct(c) => {
                Self::error_at(line, column, format!("expected a value, got '{}'", c))
            }
        }
    }
}

fn parse_number(raw: &str) -> Option<Scalar> {
    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let sign = if negative { -1 } else { 1 };
    if digits == "inf" || digits == "infinity" {
        return Some(Scalar::Float(sign as f64 * f64::INFINITY));
    }
    let int = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        i128::from_str_radix(hex, 16).ok()
    } else if digits.len() > 1
        && digits.starts_with('0')
        && digits.bytes().all(|b| b.is_ascii_digit())
    {
        i128::from_str_radix(&digits[1..], 8).ok()
    } else {
        digits.parse::<i128>().ok()
    };
    if let Some(i) = int {
        return Some(Scalar::Int(sign * i));
    }
    let float = digits.trim_end_matches(|c: char| c == 'f' || c == 'F');
    float.parse::<f64>().ok().map(|f| Scalar::Float(sign as f64 * f))
}

/// Parses a text-format document into a generic message tree.
pub fn parse(text: &str) -> Result<TextMessage, TextFormatError> {
    let mut parser = Parser {
        lexer: Lexer::new(text),
        peeked: None,
    };
    parser.message(None)
}

fn schema_error<T>(field: &str, message: String) -> Result<T, TextFormatError> {
    Err(TextFormatError::Schema {
        field: field.to_owned(),
        message,
    })
}

impl TextValue {
    fn as_message(&self, field: &str) -> Result<&TextMessage, TextFormatError> {
        match self {
            TextValue::Message(m) => Ok(m),
            TextValue::Scalar(s) => schema_error(field, format!("expected a message, got {:?}", s)),
        }
    }

    fn as_int(&self, field: &str, min: i128, max: i128) -> Result<i128, TextFormatError> {
        match self {
            TextValue::Scalar(Scalar::Int(i)) if *i >= min && *i <= max => Ok(*i),
            other => schema_error(
                field,
                format!("expected an integer in {}..={}, got {:?}", min, max, other),
            ),
        }
    }

    fn as_u32(&self, field: &str) -> Result<u32, TextFormatError> {
        self.as_int(field, 0, u32::MAX as i128).map(|i| i as u32)
    }

    fn as_i32(&self, field: &str) -> Result<i32, TextFormatError> {
        self.as_int(field, i32::MIN as i128, i32::MAX as i128).map(|i| i as i32)
    }

    fn as_i64(&self, field: &str) -> Result<i64, TextFormatError> {
        self.as_int(field, i64::MIN as i128, i64::MAX as i128).map(|i| i as i64)
    }

    fn as_bool(&self, field: &str) -> Result<bool, TextFormatError> {
        match self {
            TextValue::Scalar(Scalar::Ident(s)) => match s.as_str() {
                "true" | "True" | "t" => Ok(true),
                "false" | "False" | "f" => Ok(false),
                _ => schema_error(field, format!("expected a bool, got '{}'", s)),
            },
            TextValue::Scalar(Scalar::Int(1)) => Ok(true),
            TextValue::Scalar(Scalar::Int(0)) => Ok(false),
            other => schema_error(field, format!("expected a bool, got {:?}", other)),
        }
    }

    fn as_string(&self, field: &str) -> Result<String, TextFormatError> {
        match self {
            TextValue::Scalar(Scalar::Str(s)) => Ok(s.clone()),
            other => schema_error(field, format!("expected a string, got {:?}", other)),
        }
    }

    fn as_enum(&self, field: &str, values: &[(&str, i32)]) -> Result<i32, TextFormatError> {
        match self {
            TextValue::Scalar(Scalar::Ident(s)) => values
                .iter()
                .find(|(name, _)| name == s)
                .map(|(_, v)| *v)
                .map_or_else(|| schema_error(field, format!("unknown enum value '{}'", s)), Ok),
            TextValue::Scalar(Scalar::Int(_)) => self.as_i32(field),
            other => schema_error(field, format!("expected an enum value, got {:?}", other)),
        }
    }
}

fn skipped(message: &str, field: &str) {
    debug!(target: "pipeconf", "skipping unsupported field {}.{}", message, field);
}

fn documentation(m: &TextMessage) -> Result<Documentation, TextFormatError> {
    let mut doc = Documentation::default();
    for (name, value) in &m.fields {
        match name.as_str() {
            "brief" => doc.brief = value.as_string(name)?,
            "description" => doc.description = value.as_string(name)?,
            other => skipped("Documentation", other),
        }
    }
    Ok(doc)
}

fn named_type(m: &TextMessage) -> Result<P4NamedType, TextFormatError> {
    let mut t = P4NamedType::default();
    for (name, value) in &m.fields {
        match name.as_str() {
            "name" => t.name = value.as_string(name)?,
            other => skipped("P4NamedType", other),
        }
    }
    Ok(t)
}

fn pkg_info(m: &TextMessage) -> Result<PkgInfo, TextFormatError> {
    let mut pkg = PkgInfo::default();
    for (name, value) in &m.fields {
        match name.as_str() {
            "name" => pkg.name = value.as_string(name)?,
            "version" => pkg.version = value.as_string(name)?,
            "doc" => pkg.doc = Some(documentation(value.as_message(name)?)?),
            "annotations" => pkg.annotations.push(value.as_string(name)?),
            "arch" => pkg.arch = value.as_string(name)?,
            "organization" => pkg.organization = value.as_string(name)?,
            "contact" => pkg.contact = value.as_string(name)?,
            "url" => pkg.url = value.as_string(name)?,
            other => skipped("PkgInfo", other),
        }
    }
    Ok(pkg)
}

fn preamble(m: &TextMessage) -> Result<Preamble, TextFormatError> {
    let mut pre = Preamble::default();
    for (name, value) in &m.fields {
        match name.as_str() {
            "id" => pre.id = value.as_u32(name)?,
            "name" => pre.name = value.as_string(name)?,
            "alias" => pre.alias = value.as_string(name)?,
            "annotations" => pre.annotations.push(value.as_string(name)?),
            "doc" => pre.doc = Some(documentation(value.as_message(name)?)?),
            other => skipped("Preamble", other),
        }
    }
    Ok(pre)
}

const MATCH_TYPES: &[(&str, i32)] = &[
    ("UNSPECIFIED", match_field::MatchType::Unspecified as i32),
    ("EXACT", match_field::MatchType::Exact as i32),
    ("LPM", match_field::MatchType::Lpm as i32),
    ("TERNARY", match_field::MatchType::Ternary as i32),
    ("RANGE", match_field::MatchType::Range as i32),
    ("OPTIONAL", match_field::MatchType::Optional as i32),
];

fn match_field(m: &TextMessage) -> Result<MatchField, TextFormatError> {
    let mut mf = MatchField::default();
    for (name, value) in &m.fields {
        match name.as_str() {
            "id" => mf.id = value.as_u32(name)?,
            "name" => mf.name = value.as_string(name)?,
            "annotations" => mf.annotations.push(value.as_string(name)?),
            "bitwidth" => mf.bitwidth = value.as_i32(name)?,
            "match_type" => {
                mf.r#match = Some(match_field::Match::MatchType(value.as_enum(name, MATCH_TYPES)?))
            }
            "other_match_type" => {
                mf.r#match = Some(match_field::Match::OtherMatchType(value.as_string(name)?))
            }
            "doc" => mf.doc = Some(documentation(value.as_message(name)?)?),
            "type_name" => mf.type_name = Some(named_type(value.as_message(name)?)?),
            other => skipped("MatchField", other),
        }
    }
    Ok(mf)
}

fn action_ref(m: &TextMessage) -> Result<ActionRef, TextFormatError> {
    const SCOPES: &[(&str, i32)] = &[
        ("TABLE_AND_DEFAULT", action_ref::Scope::TableAndDefault as i32),
        ("TABLE_ONLY", action_ref::Scope::TableOnly as i32),
        ("DEFAULT_ONLY", action_ref::Scope::DefaultOnly as i32),
    ];
    let mut ar = ActionRef::default();
    for (name, value) in &m.fields {
        match name.as_str() {
            "id" => ar.id = value.as_u32(name)?,
            "scope" => ar.scope = value.as_enum(name, SCOPES)?,
            "annotations" => ar.annotations.push(value.as_string(name)?),
            other => skipped("ActionRef", other),
        }
    }
    Ok(ar)
}

fn table(m: &TextMessage) -> Result<Table, TextFormatError> {
    const IDLE: &[(&str, i32)] = &[
        ("NO_TIMEOUT", table::IdleTimeoutBehavior::NoTimeout as i32),
        ("NOTIFY_CONTROL", table::IdleTimeoutBehavior::NotifyControl as i32),
    ];
    let mut t = Table::default();
    for (name, value) in &m.fields {
        match name.as_str() {
            "preamble" => t.preamble = Some(preamble(value.as_message(name)?)?),
            "match_fields" => t.match_fields.push(match_field(value.as_message(name)?)?),
            "action_refs" => t.action_refs.push(action_ref(value.as_message(name)?)?),
            "const_default_action_id" => t.const_default_action_id = value.as_u32(name)?,
            "implementation_id" => t.implementation_id = value.as_u32(name)?,
            "direct_resource_ids" => t.direct_resource_ids.push(value.as_u32(name)?),
            "size" => t.size = value.as_i64(name)?,
            "idle_timeout_behavior" => t.idle_timeout_behavior = value.as_enum(name, IDLE)?,
            "is_const_table" => t.is_const_table = value.as_bool(name)?,
            other => skipped("Table", other),
        }
    }
    Ok(t)
}

fn action_param(m: &TextMessage) -> Result<action::Param, TextFormatError> {
    let mut p = action::Param::default();
    for (name, value) in &m.fields {
        match name.as_str() {
            "id" => p.id = value.as_u32(name)?,
            "name" => p.name = value.as_string(name)?,
            "annotations" => p.annotations.push(value.as_string(name)?),
            "bitwidth" => p.bitwidth = value.as_i32(name)?,
            "doc" => p.doc = Some(documentation(value.as_message(name)?)?),
            "type_name" => p.type_name = Some(named_type(value.as_message(name)?)?),
            other => skipped("Action.Param", other),
        }
    }
    Ok(p)
}

fn action(m: &TextMessage) -> Result<Action, TextFormatError> {
    let mut a = Action::default();
    for (name, value) in &m.fields {
        match name.as_str() {
            "preamble" => a.preamble = Some(preamble(value.as_message(name)?)?),
            "params" => a.params.push(action_param(value.as_message(name)?)?),
            other => skipped("Action", other),
        }
    }
    Ok(a)
}

fn action_profile(m: &TextMessage) -> Result<ActionProfile, TextFormatError> {
    let mut ap = ActionProfile::default();
    for (name, value) in &m.fields {
        match name.as_str() {
            "preamble" => ap.preamble = Some(preamble(value.as_message(name)?)?),
            "table_ids" => ap.table_ids.push(value.as_u32(name)?),
            "with_selector" => ap.with_selector = value.as_bool(name)?,
            "size" => ap.size = value.as_i64(name)?,
            "max_group_size" => ap.max_group_size = value.as_i32(name)?,
            other => skipped("ActionProfile", other),
        }
    }
    Ok(ap)
}

fn counter_spec(m: &TextMessage) -> Result<CounterSpec, TextFormatError> {
    const UNITS: &[(&str, i32)] = &[
        ("UNSPECIFIED", counter_spec::Unit::Unspecified as i32),
        ("BYTES", counter_spec::Unit::Bytes as i32),
        ("PACKETS", counter_spec::Unit::Packets as i32),
        ("BOTH", counter_spec::Unit::Both as i32),
    ];
    let mut spec = CounterSpec::default();
    for (name, value) in &m.fields {
        match name.as_str() {
            "unit" => spec.unit = value.as_enum(name, UNITS)?,
            other => skipped("CounterSpec", other),
        }
    }
    Ok(spec)
}

fn meter_spec(m: &TextMessage) -> Result<MeterSpec, TextFormatError> {
    const UNITS: &[(&str, i32)] = &[
        ("UNSPECIFIED", meter_spec::Unit::Unspecified as i32),
        ("BYTES", meter_spec::Unit::Bytes as i32),
        ("PACKETS", meter_spec::Unit::Packets as i32),
    ];
    let mut spec = MeterSpec::default();
    for (name, value) in &m.fields {
        match name.as_str() {
            "unit" => spec.unit = value.as_enum(name, UNITS)?,
            other => skipped("MeterSpec", other),
        }
    }
    Ok(spec)
}

fn counter(m: &TextMessage) -> Result<Counter, TextFormatError> {
    let mut c = Counter::default();
    for (name, value) in &m.fields {
        match name.as_str() {
            "preamble" => c.preamble = Some(preamble(value.as_message(name)?)?),
            "spec" => c.spec = Some(counter_spec(value.as_message(name)?)?),
            "size" => c.size = value.as_i64(name)?,
            "index_type_name" => c.index_type_name = Some(named_type(value.as_message(name)?)?),
            other => skipped("Counter", other),
        }
    }
    Ok(c)
}

fn direct_counter(m: &TextMessage) -> Result<DirectCounter, TextFormatError> {
    let mut c = DirectCounter::default();
    for (name, value) in &m.fields {
        match name.as_str() {
            "preamble" => c.preamble = Some(preamble(value.as_message(name)?)?),
            "spec" => c.spec = Some(counter_spec(value.as_message(name)?)?),
            "direct_table_id" => c.direct_table_id = value.as_u32(name)?,
            other => skipped("DirectCounter", other),
        }
    }
    Ok(c)
}

fn meter(m: &TextMessage) -> Result<Meter, TextFormatError> {
    let mut meter = Meter::default();
    for (name, value) in &m.fields {
        match name.as_str() {
            "preamble" => meter.preamble = Some(preamble(value.as_message(name)?)?),
            "spec" => meter.spec = Some(meter_spec(value.as_message(name)?)?),
            "size" => meter.size = value.as_i64(name)?,
            "index_type_name" => meter.index_type_name = Some(named_type(value.as_message(name)?)?),
            other => skipped("Meter", other),
        }
    }
    Ok(meter)
}

fn direct_meter(m: &TextMessage) -> Result<DirectMeter, TextFormatError> {
    let mut meter = DirectMeter::default();
    for (name, value) in &m.fields {
        match name.as_str() {
            "preamble" => meter.preamble = Some(preamble(value.as_message(name)?)?),
            "spec" => meter.spec = Some(meter_spec(value.as_message(name)?)?),
            "direct_table_id" => meter.direct_table_id = value.as_u32(name)?,
            other => skipped("DirectMeter", other),
        }
    }
    Ok(meter)
}

fn packet_metadata(m: &TextMessage) -> Result<ControllerPacketMetadata, TextFormatError> {
    let mut cpm = ControllerPacketMetadata::default();
    for (name, value) in &m.fields {
        match name.as_str() {
            "preamble" => cpm.preamble = Some(preamble(value.as_message(name)?)?),
            "metadata" => {
                let mut md = controller_packet_metadata::Metadata::default();
                for (name, value) in &value.as_message(name)?.fields {
                    match name.as_str() {
                        "id" => md.id = value.as_u32(name)?,
                        "name" => md.name = value.as_string(name)?,
                        "annotations" => md.annotations.push(value.as_string(name)?),
                        "bitwidth" => md.bitwidth = value.as_i32(name)?,
                        "type_name" => md.type_name = Some(named_type(value.as_message(name)?)?),
                        other => skipped("ControllerPacketMetadata.Metadata", other),
                    }
                }
                cpm.metadata.push(md);
            }
            other => skipped("ControllerPacketMetadata", other),
        }
    }
    Ok(cpm)
}

/// Parses a text-format P4Info document.
pub fn parse_p4info(text: &str) -> Result<P4Info, TextFormatError> {
    let root = parse(text)?;
    let mut p4info = P4Info::default();
    for (name, value) in &root.fields {
        match name.as_str() {
            "pkg_info" => p4info.pkg_info = Some(pkg_info(value.as_message(name)?)?),
            "tables" => p4info.tables.push(table(value.as_message(name)?)?),
            "actions" => p4info.actions.push(action(value.as_message(name)?)?),
            "action_profiles" => p4info
                .action_profiles
                .push(action_profile(value.as_message(name)?)?),
            "counters" => p4info.counters.push(counter(value.as_message(name)?)?),
            "direct_counters" => p4info
                .direct_counters
                .push(direct_counter(value.as_message(name)?)?),
            "meters" => p4info.meters.push(meter(value.as_message(name)?)?),
            "direct_meters" => p4info.direct_meters.push(direct_meter(value.as_message(name)?)?),
            "controller_packet_metadata" => p4info
                .controller_packet_metadata
                .push(packet_metadata(value.as_message(name)?)?),
            other => skipped("P4Info", other),
        }
    }
    Ok(p4info)
}

#[cfg(test)]
mod tests {
    use super::*;

    impl TextMessage {
        fn get(&self, name: &str) -> Option<&TextValue> {
            self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
        }

        fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a TextValue> + 'a {
            self.fields
                .iter()
                .filter(move |(n, _)| n == name)
                .map(|(_, v)| v)
        }
    }

    const SNIPPET: &str = r#"
# proto-file: p4/config/v1/p4info.proto
# proto-message: p4.config.v1.P4Info

pkg_info {
  arch: "v1model"
}
tables {
  preamble {
    id: 37375156
    name: "MyIngress.ipv4_lpm"
    alias: "ipv4_lpm"
  }
  match_fields {
    id: 1
    name: "hdr.ipv4.dstAddr"
    bitwidth: 32
    match_type: LPM
  }
  action_refs {
    id: 28792405
  }
  action_refs {
    id: 21257015
    annotations: "@defaultonly"
    scope: DEFAULT_ONLY
  }
  size: 1024
}
actions {
  preamble {
    id: 28792405
    name: "MyIngress.ipv4_forward"
    alias: "ipv4_forward"
  }
  params {
    id: 1
    name: "dstAddr"
    bitwidth: 48
  }
  params {
    id: 2
    name: "port"
    bitwidth: 9
  }
}
type_info {
}
"#;

    #[test]
    fn parse_generic_tree() {
        let text = r#"a: 1 b { c: "x" 'y' } d: [1, 2, 3] e < f: -0x10 >; g: ENUM, h: 1.5"#;
        let m = parse(text).unwrap();
        assert_eq!(m.get("a"), Some(&TextValue::Scalar(Scalar::Int(1))));
        let b = m.get("b").unwrap().as_message("b").unwrap();
        assert_eq!(b.get("c"), Some(&TextValue::Scalar(Scalar::Str("xy".to_owned()))));
        assert_eq!(m.get_all("d").count(), 3);
        let e = m.get("e").unwrap().as_message("e").unwrap();
        assert_eq!(e.get("f"), Some(&TextValue::Scalar(Scalar::Int(-16))));
        assert_eq!(m.get("g"), Some(&TextValue::Scalar(Scalar::Ident("ENUM".to_owned()))));
        assert_eq!(m.get("h"), Some(&TextValue::Scalar(Scalar::Float(1.5))));
    }

    #[test]
    fn string_escapes() {
        let m = parse(r#"s: "a\"b\n\x41\101""#).unwrap();
        assert_eq!(m.get("s"), Some(&TextValue::Scalar(Scalar::Str("a\"b\nAA".to_owned()))));
    }

    #[test]
    fn syntax_errors_carry_position() {
        match parse("tables {\n  id: 1\n").unwrap_err() {
            TextFormatError::Syntax { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error {:?}", other),
        }
        assert!(parse("a: }").is_err());
        assert!(parse("a 1").is_err());
    }

    #[test]
    fn map_p4info_tables_and_actions() {
        let p4info = parse_p4info(SNIPPET).unwrap();
        assert_eq!(p4info.pkg_info.as_ref().unwrap().arch, "v1model");
        assert_eq!(p4info.tables.len(), 1);
        let t = &p4info.tables[0];
        assert_eq!(t.preamble.as_ref().unwrap().name, "MyIngress.ipv4_lpm");
        assert_eq!(t.size, 1024);
        assert_eq!(
            t.match_fields[0].r#match,
            Some(match_field::Match::MatchType(match_field::MatchType::Lpm as i32))
        );
        assert_eq!(t.action_refs[1].scope, action_ref::Scope::DefaultOnly as i32);
        assert_eq!(p4info.actions[0].params[1].bitwidth, 9);
    }

    #[test]
    fn reject_wrong_scalar_type() {
        let err = parse_p4info("tables { size: \"big\" }").unwrap_err();
        assert!(matches!(err, TextFormatError::Schema { .. }));
    }
}
