/// Radar filter trees and their evaluation against device observations.
///
/// A filter is a user-authored boolean expression: leaf predicates over one
/// device attribute, composed with `All`/`Any`/`Not`. Trees are immutable
/// snapshots; authoring goes through [`crate::draft::FilterDraft`].
///
/// Evaluation is total. A missing observation field, an empty combinator,
/// a negation without a child or an undecodable node all evaluate to a
/// definite answer and never to an error.
use crate::device::DeviceObservation;

/// A node in a filter tree.
///
/// Children of `All`/`Any` keep their insertion order. Order does not change
/// the verdict but is preserved so that re-encoding a loaded tree yields the
/// same string.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Device name equals `pattern`. False when the device has no name.
    NameIs { pattern: String, ignore_case: bool },
    /// Device address equals `address`, ignoring case.
    AddressIs { address: String },
    /// Device manufacturer id equals `manufacturer_id`. False when either
    /// side is absent.
    ManufacturerIs { manufacturer_id: Option<u16> },
    /// Device favorite flag equals `expected`.
    IsFavorite { expected: bool },
    /// First detection time lies within `[from, to]`. Either bound may be open.
    FirstDetectionIn { from: Option<i64>, to: Option<i64> },
    /// Last detection time lies within `[from, to]`. Either bound may be open.
    LastDetectionIn { from: Option<i64>, to: Option<i64> },
    /// The device has not been seen for at least `min_millis`.
    MinLostTime { min_millis: i64 },
    /// The following heuristic flagged this device.
    IsFollowing,
    /// AND over children. Empty matches.
    All(Vec<Filter>),
    /// OR over children. Empty never matches.
    Any(Vec<Filter>),
    /// Negation of the child. A missing child never matches.
    Not(Option<Box<Filter>>),
    /// A node that could not be decoded, kept verbatim so that saving the
    /// profile again does not destroy it. Never matches.
    Unknown(serde_json::Value),
}

/// Per-device inputs that are not part of the observation itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckContext {
    /// Current epoch milliseconds, used by `MinLostTime`
    pub now_ms: i64,
    /// Following verdict for the device, computed once per scan batch
    pub is_following: bool,
}

impl CheckContext {
    pub const fn new(now_ms: i64, is_following: bool) -> Self {
        Self {
            now_ms,
            is_following,
        }
    }
}

impl Filter {
    pub fn name(pattern: &str, ignore_case: bool) -> Self {
        Filter::NameIs {
            pattern: pattern.into(),
            ignore_case,
        }
    }

    pub fn address(address: &str) -> Self {
        Filter::AddressIs {
            address: address.into(),
        }
    }

    pub fn manufacturer(manufacturer_id: u16) -> Self {
        Filter::ManufacturerIs {
            manufacturer_id: Some(manufacturer_id),
        }
    }

    pub fn favorite(expected: bool) -> Self {
        Filter::IsFavorite { expected }
    }

    pub fn first_detection(from: Option<i64>, to: Option<i64>) -> Self {
        Filter::FirstDetectionIn { from, to }
    }

    pub fn last_detection(from: Option<i64>, to: Option<i64>) -> Self {
        Filter::LastDetectionIn { from, to }
    }

    pub fn min_lost_time(min_millis: i64) -> Self {
        Filter::MinLostTime { min_millis }
    }

    pub fn all(children: impl IntoIterator<Item = Filter>) -> Self {
        Filter::All(children.into_iter().collect())
    }

    pub fn any(children: impl IntoIterator<Item = Filter>) -> Self {
        Filter::Any(children.into_iter().collect())
    }

    pub fn negate(child: Filter) -> Self {
        Filter::Not(Some(Box::new(child)))
    }

    /// Evaluate this tree against one device. See [`evaluate`].
    pub fn matches(&self, device: &DeviceObservation, ctx: &CheckContext) -> bool {
        evaluate(self, device, ctx)
    }

    /// Whether any node in the tree needs the following verdict.
    ///
    /// Lets the batch checker skip the history lookup entirely when no
    /// active profile asks for it.
    pub fn uses_following(&self) -> bool {
        match self {
            Filter::IsFollowing => true,
            Filter::All(children) | Filter::Any(children) => {
                children.iter().any(Filter::uses_following)
            }
            Filter::Not(child) => child.as_deref().is_some_and(Filter::uses_following),
            _ => false,
        }
    }

    /// Whether the tree contains a node that failed to decode.
    pub fn has_unknown(&self) -> bool {
        match self {
            Filter::Unknown(_) => true,
            Filter::All(children) | Filter::Any(children) => children.iter().any(Filter::has_unknown),
            Filter::Not(child) => child.as_deref().is_some_and(Filter::has_unknown),
            _ => false,
        }
    }
}

/// Evaluate a filter tree against a device observation.
///
/// `All` stops at the first child that does not match and `Any` at the first
/// child that does; children are visited in order.
pub fn evaluate(filter: &Filter, device: &DeviceObservation, ctx: &CheckContext) -> bool {
    match filter {
        Filter::NameIs {
            pattern,
            ignore_case,
        } => match &device.name {
            Some(name) if *ignore_case => eq_ignore_case(name, pattern),
            Some(name) => name == pattern,
            None => false,
        },
        Filter::AddressIs { address } => eq_ignore_case(&device.address, address),
        Filter::ManufacturerIs { manufacturer_id } => match (manufacturer_id, device.manufacturer_id) {
            (Some(wanted), Some(actual)) => *wanted == actual,
            _ => false,
        },
        Filter::IsFavorite { expected } => device.favorite == *expected,
        Filter::FirstDetectionIn { from, to } => in_range(device.first_detect_time_ms, *from, *to),
        Filter::LastDetectionIn { from, to } => in_range(device.last_detect_time_ms, *from, *to),
        Filter::MinLostTime { min_millis } => device.lost_time_ms(ctx.now_ms) >= *min_millis,
        Filter::IsFollowing => ctx.is_following,
        Filter::All(children) => children.iter().all(|c| evaluate(c, device, ctx)),
        Filter::Any(children) => children.iter().any(|c| evaluate(c, device, ctx)),
        Filter::Not(child) => child.as_deref().is_some_and(|c| !evaluate(c, device, ctx)),
        Filter::Unknown(_) => false,
    }
}

/// Inclusive range check with open bounds.
fn in_range(value: i64, from: Option<i64>, to: Option<i64>) -> bool {
    from.map_or(true, |f| value >= f) && to.map_or(true, |t| value <= t)
}

/// Case-insensitive comparison that also folds non-ASCII names.
fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}
