//! Smallcaps capdata codec.
//!
//! Chain-storage values and wallet spend actions travel as `{ body: "#<json>", slots: [...] }`.
//! Inside the body, strings beginning with one of `!"#$%&'()*+,-` carry a type prefix:
//! `$N.iface` is a remotable in slot `N`, `+n`/`-n` a bigint, `!...` an escaped plain string,
//! and `#undefined` and friends are special numbers.
//!
//! Decoding yields plain JSON: remotables become `{"boardId", "iface"}` objects (see
//! [`BoardRef`]) and bigints become decimal strings.

use crate::amount::BaseAmount;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

const SPECIAL_PREFIXES: &str = "!\"#$%&'()*+,-";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapData {
    pub body: String,
    #[serde(default)]
    pub slots: Vec<Value>,
}

/// A reference to an on-chain object published on the board (brands, instances, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardRef {
    pub board_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iface: Option<String>,
}

impl BoardRef {
    pub fn from_value(v: &Value) -> Option<Self> {
        serde_json::from_value(v.clone()).ok()
    }
}

/// Values that can be marshalled into a spend action.
#[derive(Debug, Clone, PartialEq)]
pub enum Passable {
    Null,
    Bool(bool),
    Number(Number),
    BigInt(BaseAmount),
    String(String),
    Remotable(BoardRef),
    Array(Vec<Passable>),
    Record(BTreeMap<String, Passable>),
}

impl Passable {
    pub fn str(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    pub fn record<const N: usize>(entries: [(&str, Self); N]) -> Self {
        Self::Record(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_owned(), v))
                .collect(),
        )
    }

    /// Plain JSON from the embedding application; strings are never interpreted as references.
    pub fn from_json(v: &Value) -> Self {
        match v {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => Self::Number(n.clone()),
            Value::String(s) => Self::String(s.clone()),
            Value::Array(items) => Self::Array(items.iter().map(Self::from_json).collect()),
            Value::Object(m) => Self::Record(
                m.iter()
                    .map(|(k, val)| (k.clone(), Self::from_json(val)))
                    .collect(),
            ),
        }
    }
}

pub fn decode(cap: &CapData) -> eyre::Result<Value> {
    let Some(json) = cap.body.strip_prefix('#') else {
        eyre::bail!("unsupported capdata body encoding (expected smallcaps '#')");
    };
    let raw: Value = serde_json::from_str(json)
        .map_err(|e| eyre::eyre!("capdata body is not json: {e}"))?;
    decode_value(raw, &cap.slots)
}

/// Decode a capdata JSON string, as stored in a vstorage stream cell.
pub fn decode_str(s: &str) -> eyre::Result<Value> {
    let cap: CapData =
        serde_json::from_str(s).map_err(|e| eyre::eyre!("value is not capdata: {e}"))?;
    decode(&cap)
}

fn slot_at(slots: &[Value], index: &str) -> eyre::Result<Value> {
    let i: usize = index
        .parse()
        .map_err(|e| eyre::eyre!("bad slot index {index:?}: {e}"))?;
    slots
        .get(i)
        .cloned()
        .ok_or_else(|| eyre::eyre!("slot index {i} out of range ({} slots)", slots.len()))
}

fn decode_string(s: String, slots: &[Value]) -> eyre::Result<Value> {
    let Some(first) = s.chars().next() else {
        return Ok(Value::String(s));
    };
    if !SPECIAL_PREFIXES.contains(first) {
        return Ok(Value::String(s));
    }
    let rest = s.get(first.len_utf8()..).unwrap_or_default();
    match first {
        '!' | '%' | '+' => Ok(Value::String(rest.to_owned())),
        '-' => Ok(Value::String(s)),
        '$' => {
            let (index, iface) = match rest.split_once('.') {
                Some((i, iface)) => (i, Some(iface)),
                None => (rest, None),
            };
            let mut m = Map::new();
            m.insert("boardId".into(), slot_at(slots, index)?);
            if let Some(iface) = iface {
                m.insert("iface".into(), Value::String(iface.to_owned()));
            }
            Ok(Value::Object(m))
        }
        '&' => {
            let mut m = Map::new();
            m.insert("boardId".into(), slot_at(slots, rest)?);
            Ok(Value::Object(m))
        }
        '#' => match rest {
            "undefined" | "NaN" | "Infinity" | "-Infinity" => Ok(Value::Null),
            other => eyre::bail!("unknown special value #{other}"),
        },
        other => eyre::bail!("unsupported smallcaps prefix {other:?}"),
    }
}

fn decode_value(v: Value, slots: &[Value]) -> eyre::Result<Value> {
    match v {
        Value::String(s) => decode_string(s, slots),
        Value::Array(items) => items
            .into_iter()
            .map(|item| decode_value(item, slots))
            .collect::<eyre::Result<Vec<_>>>()
            .map(Value::Array),
        Value::Object(m) => {
            let mut out = Map::new();
            for (k, val) in m {
                out.insert(k, decode_value(val, slots)?);
            }
            Ok(Value::Object(out))
        }
        scalar @ (Value::Null | Value::Bool(_) | Value::Number(_)) => Ok(scalar),
    }
}

#[derive(Default)]
struct Encoder {
    slots: Vec<String>,
}

impl Encoder {
    fn encode(&mut self, p: &Passable) -> Value {
        match p {
            Passable::Null => Value::Null,
            Passable::Bool(b) => Value::Bool(*b),
            Passable::Number(n) => Value::Number(n.clone()),
            Passable::BigInt(n) => Value::String(format!("+{n}")),
            Passable::String(s) => {
                let special = s.chars().next().is_some_and(|c| SPECIAL_PREFIXES.contains(c));
                if special {
                    Value::String(format!("!{s}"))
                } else {
                    Value::String(s.clone())
                }
            }
            Passable::Remotable(r) => {
                if let Some(i) = self.slots.iter().position(|s| *s == r.board_id) {
                    return Value::String(format!("${i}"));
                }
                let i = self.slots.len();
                self.slots.push(r.board_id.clone());
                match &r.iface {
                    Some(iface) => Value::String(format!("${i}.{iface}")),
                    None => Value::String(format!("${i}")),
                }
            }
            Passable::Array(items) => Value::Array(items.iter().map(|i| self.encode(i)).collect()),
            Passable::Record(m) => Value::Object(
                m.iter()
                    .map(|(k, v)| (k.clone(), self.encode(v)))
                    .collect(),
            ),
        }
    }
}

pub fn encode(p: &Passable) -> CapData {
    let mut enc = Encoder::default();
    let body = enc.encode(p);
    CapData {
        body: format!("#{body}"),
        slots: enc.slots.into_iter().map(Value::String).collect(),
    }
}
