use std::fmt::{Debug, Display, Formatter};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::p4rt::pure::adjust_value;

#[derive(Eq, Hash, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct MAC(pub [u8; 6]);

impl MAC {
    pub fn parse(s: &str) -> Option<MAC> {
        let groups: Vec<&str> = s.split(|c: char| c == ':' || c == '-').collect();
        if groups.len() != 6 || groups.iter().any(|g| g.len() != 2) {
            return None;
        }
        let vec = hex::decode(groups.concat()).ok()?;
        Some(MAC(vec_to_mac(vec)))
    }
}

impl FromStr for MAC {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MAC::parse(s).ok_or_else(|| format!("'{}' is not a MAC address", s))
    }
}

impl Display for MAC {
    fn fmt(&self, f: &mut Formatter) -> Result<(), std::fmt::Error> {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl Debug for MAC {
    fn fmt(&self, f: &mut Formatter) -> Result<(), std::fmt::Error> {
        Display::fmt(self, f)
    }
}

fn vec_to_mac(vec: Vec<u8>) -> [u8; 6] {
    let mut mac = [0u8; 6];
    mac.copy_from_slice(&vec);
    mac
}

/// A scalar as written in a rule: a number, or a string in one of the
/// notations P4 controllers commonly accept (MAC, IPv4, IPv6, `0x` hex,
/// decimal).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(u64),
    Text(String),
}

impl Value {
    /// Minimal big-endian representation, not yet sized to a field.
    pub fn to_bytes(&self) -> Result<Bytes, String> {
        match self {
            Value::Int(v) => {
                let mut buf = [0u8; 8];
                BigEndian::write_u64(&mut buf, *v);
                Ok(Bytes::copy_from_slice(&buf))
            }
            Value::Text(s) => parse_text(s.trim()),
        }
    }

    /// Encodes to exactly `(bitwidth + 7) / 8` bytes, rejecting values that
    /// do not fit in `bitwidth` bits.
    pub fn encode(&self, bitwidth: i32) -> Result<Bytes, String> {
        adjust_value(self.to_bytes()?, bitwidth)
    }
}

fn parse_text(s: &str) -> Result<Bytes, String> {
    if let Some(mac) = MAC::parse(s) {
        return Ok(Bytes::copy_from_slice(&mac.0));
    }
    if let Ok(ip) = s.parse::<Ipv4Addr>() {
        return Ok(Bytes::copy_from_slice(&ip.octets()));
    }
    if let Ok(ip) = s.parse::<Ipv6Addr>() {
        return Ok(Bytes::copy_from_slice(&ip.octets()));
    }
    if let Some(digits) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        if digits.is_empty() {
            return Err(format!("bad hex literal '{}': no digits", s));
        }
        let digits = if digits.len() % 2 == 1 {
            format!("0{}", digits)
        } else {
            digits.to_owned()
        };
        return hex::decode(&digits)
            .map(Bytes::from)
            .map_err(|e| format!("bad hex literal '{}': {}", s, e));
    }
    if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
        return s
            .parse::<u128>()
            .map(|v| Bytes::copy_from_slice(&v.to_be_bytes()))
            .map_err(|e| format!("bad number '{}': {}", s, e));
    }
    Err(format!(
        "'{}' is neither a number, a MAC address nor an IP address",
        s
    ))
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{:?}", s),
        }
    }
}

macro_rules! value_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(v as u64)
            }
        })*
    };
}

value_from_int!(u8, u16, u32, u64);

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

/// The value of one match field, tagged with its P4Runtime match kind.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InnerValue {
    Exact(Value),
    Lpm(Value, /*prefix_len*/ i32),
    Ternary(Value, /*mask*/ Value),
    Range(/*low*/ Value, /*high*/ Value),
    Optional(Value),
}

impl InnerValue {
    pub fn kind(&self) -> &'static str {
        match self {
            InnerValue::Exact(_) => "exact",
            InnerValue::Lpm(..) => "LPM",
            InnerValue::Ternary(..) => "ternary",
            InnerValue::Range(..) => "range",
            InnerValue::Optional(_) => "optional",
        }
    }
}

pub fn exact<T: Into<Value>>(v: T) -> InnerValue {
    InnerValue::Exact(v.into())
}

pub fn lpm<T: Into<Value>>(v: T, prefix_len: i32) -> InnerValue {
    InnerValue::Lpm(v.into(), prefix_len)
}

pub fn ternary<T: Into<Value>, P: Into<Value>>(v: T, mask: P) -> InnerValue {
    InnerValue::Ternary(v.into(), mask.into())
}

pub fn range<T: Into<Value>, P: Into<Value>>(low: T, high: P) -> InnerValue {
    InnerValue::Range(low.into(), high.into())
}

pub fn optional<T: Into<Value>>(v: T) -> InnerValue {
    InnerValue::Optional(v.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_parse_and_display() {
        let mac = MAC::parse("00:00:00:00:01:02").unwrap();
        assert_eq!(mac.0, [0, 0, 0, 0, 1, 2]);
        assert_eq!(mac.to_string(), "00:00:00:00:01:02");
        assert!(MAC::parse("10.0.0.1").is_none());
        assert!(MAC::parse("00:00:00:00:01").is_none());
    }

    #[test]
    fn encode_address_notations() {
        let ip = Value::from("10.0.2.2").encode(32).unwrap();
        assert_eq!(ip.as_ref(), &[10, 0, 2, 2]);
        let mac = Value::from("08:00:00:00:03:00").encode(48).unwrap();
        assert_eq!(mac.as_ref(), &[8, 0, 0, 0, 3, 0]);
    }

    #[test]
    fn encode_numbers_to_field_width() {
        assert_eq!(Value::Int(2).encode(9).unwrap().as_ref(), &[0, 2]);
        assert_eq!(Value::Int(1).encode(14).unwrap().as_ref(), &[0, 1]);
        assert_eq!(Value::from("0x1ff").encode(9).unwrap().as_ref(), &[1, 0xff]);
        assert_eq!(Value::from("300").encode(16).unwrap().as_ref(), &[1, 44]);
    }

    #[test]
    fn reject_values_wider_than_field() {
        assert!(Value::Int(512).encode(9).is_err());
        assert!(Value::Int(256).encode(8).is_err());
        assert!(Value::from("10.0.0.1").encode(16).is_err());
        assert!(Value::from("not-a-value").encode(8).is_err());
    }

    #[test]
    fn reject_hex_prefix_without_digits() {
        assert!(Value::from("0x").encode(8).is_err());
        assert!(Value::from("0X").to_bytes().is_err());
        assert_eq!(Value::from("0x0").encode(8).unwrap().as_ref(), &[0]);
    }

    #[test]
    fn match_values_from_json() {
        let v: InnerValue = serde_json::from_str(r#"{"lpm": ["10.0.0.1", 32]}"#).unwrap();
        assert_eq!(v, lpm("10.0.0.1", 32));
        let v: InnerValue = serde_json::from_str(r#"{"exact": 1}"#).unwrap();
        assert_eq!(v, exact(1u32));
    }
}
