/// Mutable authoring state for filter trees.
///
/// The profile editor builds a [`FilterDraft`] leaf by leaf, with every
/// field optional or empty while the user is still typing. Saving takes an
/// immutable [`Filter`] snapshot with [`FilterDraft::build`]; loading a saved
/// profile for editing goes the other way with `FilterDraft::from(&filter)`.
///
/// `Not` behaves as a composite with room for one child, so the same
/// push/insert/remove calls edit all three combinators.
use serde_json::Value;

use crate::error::{RadarError, Result};
use crate::filter::Filter;

/// Filter kinds offered when adding a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Name,
    Address,
    Manufacturer,
    IsFavorite,
    FirstDetectionInterval,
    LastDetectionInterval,
    MinLostTime,
    IsFollowing,
    Any,
    All,
    Not,
}

impl FilterKind {
    pub const ALL: [FilterKind; 11] = [
        FilterKind::Name,
        FilterKind::Address,
        FilterKind::Manufacturer,
        FilterKind::IsFavorite,
        FilterKind::FirstDetectionInterval,
        FilterKind::LastDetectionInterval,
        FilterKind::MinLostTime,
        FilterKind::IsFollowing,
        FilterKind::Any,
        FilterKind::All,
        FilterKind::Not,
    ];
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterDraft {
    Name { name: String, ignore_case: bool },
    Address { address: String },
    Manufacturer { manufacturer_id: Option<u16> },
    IsFavorite { favorite: bool },
    FirstDetectionInterval { from: Option<i64>, to: Option<i64> },
    LastDetectionInterval { from: Option<i64>, to: Option<i64> },
    MinLostTime { min_lost_time_ms: Option<i64> },
    IsFollowing,
    Any(Vec<FilterDraft>),
    All(Vec<FilterDraft>),
    Not(Option<Box<FilterDraft>>),
    /// A loaded node this version cannot edit. Kept so it survives a save.
    Unknown(Value),
}

impl FilterDraft {
    /// A fresh node of `kind` with the editor's default values.
    pub fn new(kind: FilterKind) -> Self {
        match kind {
            FilterKind::Name => FilterDraft::Name {
                name: String::new(),
                ignore_case: true,
            },
            FilterKind::Address => FilterDraft::Address {
                address: String::new(),
            },
            FilterKind::Manufacturer => FilterDraft::Manufacturer {
                manufacturer_id: None,
            },
            FilterKind::IsFavorite => FilterDraft::IsFavorite { favorite: false },
            FilterKind::FirstDetectionInterval => FilterDraft::FirstDetectionInterval {
                from: None,
                to: None,
            },
            FilterKind::LastDetectionInterval => FilterDraft::LastDetectionInterval {
                from: None,
                to: None,
            },
            FilterKind::MinLostTime => FilterDraft::MinLostTime {
                min_lost_time_ms: None,
            },
            FilterKind::IsFollowing => FilterDraft::IsFollowing,
            FilterKind::Any => FilterDraft::Any(Vec::new()),
            FilterKind::All => FilterDraft::All(Vec::new()),
            FilterKind::Not => FilterDraft::Not(None),
        }
    }

    /// Child nodes, or `None` for leaves.
    pub fn children(&self) -> Option<&[FilterDraft]> {
        match self {
            FilterDraft::Any(children) | FilterDraft::All(children) => Some(children),
            FilterDraft::Not(child) => Some(child.as_deref().map_or(&[][..], core::slice::from_ref)),
            _ => None,
        }
    }

    /// Append a child. Gives the child back if this node is a leaf or a
    /// `Not` that already has one.
    pub fn push_child(&mut self, child: FilterDraft) -> core::result::Result<(), FilterDraft> {
        let len = self.children().map_or(0, <[FilterDraft]>::len);
        self.insert_child(len, child)
    }

    /// Insert a child at `index`, shifting later children right.
    pub fn insert_child(&mut self, index: usize, child: FilterDraft) -> core::result::Result<(), FilterDraft> {
        match self {
            FilterDraft::Any(children) | FilterDraft::All(children) if index <= children.len() => {
                children.insert(index, child);
                Ok(())
            }
            FilterDraft::Not(slot) if index == 0 && slot.is_none() => {
                *slot = Some(Box::new(child));
                Ok(())
            }
            _ => Err(child),
        }
    }

    /// Remove and return the child at `index`.
    pub fn remove_child(&mut self, index: usize) -> Option<FilterDraft> {
        match self {
            FilterDraft::Any(children) | FilterDraft::All(children) if index < children.len() => {
                Some(children.remove(index))
            }
            FilterDraft::Not(slot) if index == 0 => slot.take().map(|child| *child),
            _ => None,
        }
    }

    /// Mutable access to the child at `index`, for editing nested nodes.
    pub fn child_mut(&mut self, index: usize) -> Option<&mut FilterDraft> {
        match self {
            FilterDraft::Any(children) | FilterDraft::All(children) => children.get_mut(index),
            FilterDraft::Not(slot) if index == 0 => slot.as_deref_mut(),
            _ => None,
        }
    }

    /// Whether every node has its value filled in and every combinator has
    /// something to combine. Used to flag a profile before saving.
    pub fn is_complete(&self) -> bool {
        match self {
            FilterDraft::Name { name, .. } => !name.is_empty(),
            FilterDraft::Address { address } => !address.is_empty(),
            FilterDraft::Manufacturer { manufacturer_id } => manufacturer_id.is_some(),
            FilterDraft::IsFavorite { .. } | FilterDraft::IsFollowing => true,
            FilterDraft::FirstDetectionInterval { from, to }
            | FilterDraft::LastDetectionInterval { from, to } => from.is_some() || to.is_some(),
            FilterDraft::MinLostTime { min_lost_time_ms } => min_lost_time_ms.is_some(),
            FilterDraft::Any(children) | FilterDraft::All(children) => {
                !children.is_empty() && children.iter().all(FilterDraft::is_complete)
            }
            FilterDraft::Not(child) => child.as_deref().is_some_and(FilterDraft::is_complete),
            FilterDraft::Unknown(_) => false,
        }
    }

    /// Take an immutable snapshot of the draft.
    ///
    /// Incomplete combinators and empty strings are allowed through, since
    /// the evaluator has defined answers for them. Fails only when a value
    /// the tree cannot represent is missing.
    pub fn build(&self) -> Result<Filter> {
        let filter = match self {
            FilterDraft::Name { name, ignore_case } => Filter::name(name, *ignore_case),
            FilterDraft::Address { address } => Filter::address(address),
            FilterDraft::Manufacturer { manufacturer_id } => Filter::ManufacturerIs {
                manufacturer_id: *manufacturer_id,
            },
            FilterDraft::IsFavorite { favorite } => Filter::favorite(*favorite),
            FilterDraft::FirstDetectionInterval { from, to } => Filter::first_detection(*from, *to),
            FilterDraft::LastDetectionInterval { from, to } => Filter::last_detection(*from, *to),
            FilterDraft::MinLostTime { min_lost_time_ms } => match min_lost_time_ms {
                Some(ms) => Filter::min_lost_time(*ms),
                None => return Err(RadarError::IncompleteFilter("min lost time has no duration")),
            },
            FilterDraft::IsFollowing => Filter::IsFollowing,
            FilterDraft::Any(children) => Filter::Any(build_all(children)?),
            FilterDraft::All(children) => Filter::All(build_all(children)?),
            FilterDraft::Not(child) => match child {
                Some(c) => Filter::negate(c.build()?),
                None => Filter::Not(None),
            },
            FilterDraft::Unknown(raw) => Filter::Unknown(raw.clone()),
        };
        Ok(filter)
    }
}

fn build_all(children: &[FilterDraft]) -> Result<Vec<Filter>> {
    children.iter().map(FilterDraft::build).collect()
}

impl From<&Filter> for FilterDraft {
    fn from(filter: &Filter) -> Self {
        match filter {
            Filter::NameIs {
                pattern,
                ignore_case,
            } => FilterDraft::Name {
                name: pattern.clone(),
                ignore_case: *ignore_case,
            },
            Filter::AddressIs { address } => FilterDraft::Address {
                address: address.clone(),
            },
            Filter::ManufacturerIs { manufacturer_id } => FilterDraft::Manufacturer {
                manufacturer_id: *manufacturer_id,
            },
            Filter::IsFavorite { expected } => FilterDraft::IsFavorite { favorite: *expected },
            Filter::FirstDetectionIn { from, to } => FilterDraft::FirstDetectionInterval {
                from: *from,
                to: *to,
            },
            Filter::LastDetectionIn { from, to } => FilterDraft::LastDetectionInterval {
                from: *from,
                to: *to,
            },
            Filter::MinLostTime { min_millis } => FilterDraft::MinLostTime {
                min_lost_time_ms: Some(*min_millis),
            },
            Filter::IsFollowing => FilterDraft::IsFollowing,
            Filter::All(children) => FilterDraft::All(children.iter().map(FilterDraft::from).collect()),
            Filter::Any(children) => FilterDraft::Any(children.iter().map(FilterDraft::from).collect()),
            Filter::Not(child) => FilterDraft::Not(child.as_deref().map(|c| Box::new(FilterDraft::from(c)))),
            Filter::Unknown(raw) => FilterDraft::Unknown(raw.clone()),
        }
    }
}
