//! Grouped frames
//!
//! A group is indexed by an outer key; every member is a frame (or a nested
//! group) keyed by the first of the descendant keys.

use indexmap::IndexMap;

use dv_core::value::key_str;
use dv_core::{Row, Space};

use super::DataFrame;

/// A member of a group: a leaf frame or a nested group
#[derive(Debug, Clone, PartialEq)]
pub enum GroupMember {
    Frame(DataFrame),
    Group(DataFrameGroup),
}

impl GroupMember {
    pub fn rows(&self) -> Box<dyn Iterator<Item = &Row> + '_> {
        match self {
            GroupMember::Frame(frame) => Box::new(frame.rows()),
            GroupMember::Group(group) => group.rows(),
        }
    }

    /// Whether the member holds a row with the given key string
    pub fn has_by_str(&self, key: &str) -> bool {
        match self {
            GroupMember::Frame(frame) => frame.has_by_str(key),
            GroupMember::Group(group) => group.has(key),
        }
    }

    pub fn as_frame(&self) -> Option<&DataFrame> {
        match self {
            GroupMember::Frame(frame) => Some(frame),
            GroupMember::Group(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            GroupMember::Frame(frame) => frame.len(),
            GroupMember::Group(group) => group.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Frames partitioned by an outer key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataFrameGroup {
    key: Space,
    descendant_keys: Vec<Space>,
    members: IndexMap<String, GroupMember>,
}

impl DataFrameGroup {
    /// Create an empty group. `descendant_keys[0]` keys the members.
    pub fn new(key: Space, descendant_keys: Vec<Space>) -> Self {
        Self {
            key,
            descendant_keys,
            members: IndexMap::new(),
        }
    }

    /// Partition a frame by `key`. Members are keyed by `member_key`, or by the
    /// frame key without the group dimensions when not given.
    pub fn group_by(frame: &DataFrame, key: Space, member_key: Option<Space>) -> Self {
        let member_key = member_key.unwrap_or_else(|| {
            Space::new(frame.key().iter().filter(|dim| !key.contains(dim)).cloned())
        });
        let mut group = Self::new(key, vec![member_key]);
        for row in frame.rows() {
            let group_key = group.key_fn(row);
            if let GroupMember::Frame(member) = group.create_member(&group_key) {
                member.set(row.clone());
            }
        }
        group
    }

    pub fn key(&self) -> &Space {
        &self.key
    }

    pub fn descendant_keys(&self) -> &[Space] {
        &self.descendant_keys
    }

    /// Key string of a row within the outer key
    pub fn key_fn(&self, row: &Row) -> String {
        key_str(row, &self.key)
    }

    pub fn set(&mut self, key: impl Into<String>, member: GroupMember) {
        self.members.insert(key.into(), member);
    }

    /// Get the member for `key`, creating an empty one of the right shape first
    pub fn create_member(&mut self, key: &str) -> &mut GroupMember {
        let descendant_keys = &self.descendant_keys;
        self.members.entry(key.to_string()).or_insert_with(|| {
            match descendant_keys.split_first() {
                Some((first, rest)) if !rest.is_empty() => {
                    GroupMember::Group(DataFrameGroup::new(first.clone(), rest.to_vec()))
                }
                Some((first, _)) => GroupMember::Frame(DataFrame::new(first.clone())),
                None => GroupMember::Frame(DataFrame::new(Space::default())),
            }
        })
    }

    pub fn get(&self, key: &str) -> Option<&GroupMember> {
        self.members.get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.members.contains_key(key)
    }

    pub fn members(&self) -> impl Iterator<Item = (&String, &GroupMember)> {
        self.members.iter()
    }

    pub fn values(&self) -> impl Iterator<Item = &GroupMember> {
        self.members.values()
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Every row of every member, in member order
    pub fn rows(&self) -> Box<dyn Iterator<Item = &Row> + '_> {
        Box::new(self.members.values().flat_map(|member| member.rows()))
    }
}
