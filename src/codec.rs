/// Filter tree persistence: one JSON string per radar profile.
///
/// Each node is a JSON object whose `"type"` tag names the variant, followed
/// by its fields in a fixed order, so the same tree always encodes to the
/// same string. Composite nodes carry their encoded children inline.
///
/// Decoding goes through a flat [`RawNode`] and is converted by hand. The
/// tag is read as a plain string, so a tag written by a newer app version
/// becomes [`Filter::Unknown`] instead of failing the whole tree. A node whose fields are malformed degrades the
/// same way, and its siblings decode normally.
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::error::Result;
use crate::filter::Filter;

/// Encode a filter tree to its canonical string.
pub fn encode(filter: &Filter) -> String {
    // Serializing borrowed wire types into a String cannot fail: every map
    // key is a string and no custom serializer reports errors.
    serde_json::to_string(&Encoded(filter)).unwrap_or_default()
}

/// Decode a stored filter string.
///
/// Never fails. A string that is not JSON at all becomes a single
/// [`Filter::Unknown`] holding the text.
pub fn decode(encoded: &str) -> Filter {
    match try_decode(encoded) {
        Ok(filter) => filter,
        Err(e) => {
            log::warn!("Stored filter is not valid JSON, keeping it as unknown: {}", e);
            Filter::Unknown(Value::String(encoded.into()))
        }
    }
}

/// Decode a stored filter string, reporting a string that is not JSON.
///
/// Individual malformed nodes still degrade to [`Filter::Unknown`]. Trees
/// nest as deep as the editor allows, so the parser's recursion limit is
/// lifted.
pub fn try_decode(encoded: &str) -> Result<Filter> {
    let mut de = serde_json::Deserializer::from_str(encoded);
    de.disable_recursion_limit();
    let value = Value::deserialize(&mut de)?;
    de.end()?;
    Ok(node_from_value(value))
}

// ── Encoding ──────────────────────────────────────────────────────────

/// Wire form of a node, borrowing from the tree being encoded.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireNode<'a> {
    NameIs {
        name: &'a str,
        ignore_case: bool,
    },
    AddressIs {
        address: &'a str,
    },
    ManufacturerIs {
        #[serde(skip_serializing_if = "Option::is_none")]
        manufacturer_id: Option<u16>,
    },
    IsFavorite {
        favorite: bool,
    },
    FirstDetectionIn {
        #[serde(skip_serializing_if = "Option::is_none")]
        from: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        to: Option<i64>,
    },
    LastDetectionIn {
        #[serde(skip_serializing_if = "Option::is_none")]
        from: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        to: Option<i64>,
    },
    MinLostTime {
        min_lost_time_ms: i64,
    },
    IsFollowing,
    All {
        filters: Vec<Encoded<'a>>,
    },
    Any {
        filters: Vec<Encoded<'a>>,
    },
    Not {
        #[serde(skip_serializing_if = "Option::is_none")]
        filter: Option<Encoded<'a>>,
    },
}

/// A node to encode. Unknown nodes are written back exactly as they were read.
struct Encoded<'a>(&'a Filter);

impl Serialize for Encoded<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        let node = match self.0 {
            Filter::NameIs {
                pattern,
                ignore_case,
            } => WireNode::NameIs {
                name: pattern,
                ignore_case: *ignore_case,
            },
            Filter::AddressIs { address } => WireNode::AddressIs { address },
            Filter::ManufacturerIs { manufacturer_id } => WireNode::ManufacturerIs {
                manufacturer_id: *manufacturer_id,
            },
            Filter::IsFavorite { expected } => WireNode::IsFavorite {
                favorite: *expected,
            },
            Filter::FirstDetectionIn { from, to } => WireNode::FirstDetectionIn {
                from: *from,
                to: *to,
            },
            Filter::LastDetectionIn { from, to } => WireNode::LastDetectionIn {
                from: *from,
                to: *to,
            },
            Filter::MinLostTime { min_millis } => WireNode::MinLostTime {
                min_lost_time_ms: *min_millis,
            },
            Filter::IsFollowing => WireNode::IsFollowing,
            Filter::All(children) => WireNode::All {
                filters: children.iter().map(Encoded).collect(),
            },
            Filter::Any(children) => WireNode::Any {
                filters: children.iter().map(Encoded).collect(),
            },
            Filter::Not(child) => WireNode::Not {
                filter: child.as_deref().map(Encoded),
            },
            Filter::Unknown(raw) => return raw.serialize(serializer),
        };
        node.serialize(serializer)
    }
}

// ── Decoding ──────────────────────────────────────────────────────────

/// Flat decoding target covering the fields of every variant.
///
/// Children stay as raw JSON values so that each one is decoded on its own.
#[derive(Deserialize)]
struct RawNode {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    ignore_case: Option<bool>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    manufacturer_id: Option<u16>,
    #[serde(default)]
    favorite: Option<bool>,
    #[serde(default, deserialize_with = "lenient_number")]
    from: Option<i64>,
    #[serde(default, deserialize_with = "lenient_number")]
    to: Option<i64>,
    #[serde(default, deserialize_with = "lenient_number")]
    min_lost_time_ms: Option<i64>,
    #[serde(default)]
    filters: Vec<Value>,
    #[serde(default)]
    filter: Option<Value>,
}

impl RawNode {
    /// Convert to a tree node. `None` when the tag is unknown or a required
    /// field is missing.
    fn into_filter(self) -> Option<Filter> {
        let filter = match self.kind.as_str() {
            "name_is" => Filter::NameIs {
                pattern: self.name?,
                ignore_case: self.ignore_case.unwrap_or(true),
            },
            "address_is" => Filter::AddressIs {
                address: self.address?,
            },
            "manufacturer_is" => Filter::ManufacturerIs {
                manufacturer_id: self.manufacturer_id,
            },
            "is_favorite" => Filter::IsFavorite {
                expected: self.favorite?,
            },
            "first_detection_in" => Filter::FirstDetectionIn {
                from: self.from,
                to: self.to,
            },
            "last_detection_in" => Filter::LastDetectionIn {
                from: self.from,
                to: self.to,
            },
            "min_lost_time" => Filter::MinLostTime {
                min_millis: self.min_lost_time_ms?,
            },
            "is_following" => Filter::IsFollowing,
            "all" => Filter::All(self.filters.into_iter().map(node_from_value).collect()),
            "any" => Filter::Any(self.filters.into_iter().map(node_from_value).collect()),
            "not" => Filter::Not(self.filter.map(|v| Box::new(node_from_value(v)))),
            _ => return None,
        };
        Some(filter)
    }
}

/// Decode one node, isolating failures to that node.
fn node_from_value(value: Value) -> Filter {
    match RawNode::deserialize(&value) {
        Ok(raw) => {
            let kind = raw.kind.clone();
            match raw.into_filter() {
                Some(filter) => filter,
                None => {
                    log::warn!("Unrecognized or incomplete filter node '{}'", kind);
                    Filter::Unknown(value)
                }
            }
        }
        Err(e) => {
            log::warn!("Malformed filter node: {}", e);
            Filter::Unknown(value)
        }
    }
}

/// Optional number that also accepts `null`, an empty string or a numeric
/// string. Absent and empty both mean "no value", never zero.
fn lenient_number<'de, D, T>(deserializer: D) -> core::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + core::str::FromStr,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lenient<T> {
        Number(T),
        Text(String),
    }

    match Option::<Lenient<T>>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Lenient::Number(n)) => Ok(Some(n)),
        Some(Lenient::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Lenient::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| de::Error::custom(format_args!("invalid number '{}'", s))),
    }
}
