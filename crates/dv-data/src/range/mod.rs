//! Range and distinct-value analysis
//!
//! Continuous concepts get a `[min, max]` extent, everything else the set of
//! distinct values in first-seen order. [`range_of_group_key_per_member`] is a
//! fast path for ordered, interpolated series grouped by their frame concept.

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use dv_core::value::key_str;
use dv_core::{Row, Space, Value};

use crate::frame::{GroupMember, Tabular};
use crate::DataError;

/// A `[min, max]` pair. Both ends stay `None` until a comparable value is seen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extent {
    pub min: Option<Value>,
    pub max: Option<Value>,
}

impl Extent {
    pub fn new(min: impl Into<Value>, max: impl Into<Value>) -> Self {
        Self {
            min: Some(min.into()),
            max: Some(max.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.is_none()
    }

    /// Fold a value into the extent. Nulls are ignored and the first value
    /// must order against itself, so NaN never becomes an end.
    pub fn update(&mut self, value: &Value) {
        if value.is_null() {
            return;
        }
        match (&self.min, &self.max) {
            (Some(min), Some(max)) => {
                if min > value {
                    self.min = Some(value.clone());
                }
                if max < value {
                    self.max = Some(value.clone());
                }
            }
            _ => {
                if value.is_self_comparable() {
                    self.min = Some(value.clone());
                    self.max = Some(value.clone());
                }
            }
        }
    }

    /// Element-wise min/max of two extents
    pub fn combine(self, other: Extent) -> Extent {
        let min = match (self.min, other.min) {
            (Some(a), Some(b)) => Some(if b < a { b } else { a }),
            (a, b) => a.or(b),
        };
        let max = match (self.max, other.max) {
            (Some(a), Some(b)) => Some(if b > a { b } else { a }),
            (a, b) => a.or(b),
        };
        Extent { min, max }
    }

    /// The extent as a two-element vector, for domain output
    pub fn to_vec(&self) -> Vec<Value> {
        vec![
            self.min.clone().unwrap_or_default(),
            self.max.clone().unwrap_or_default(),
        ]
    }
}

/// Extent of `concept` over rows
pub fn range<'a, I>(rows: I, concept: &str) -> Extent
where
    I: IntoIterator<Item = &'a Row>,
{
    let mut extent = Extent::default();
    for row in rows {
        if let Some(value) = row.get(concept) {
            extent.update(value);
        }
    }
    extent
}

/// Extent of `concept` over any tabular shape. Groups are ranged per member
/// and combined, recursing through nested groups.
pub fn range_of(data: &Tabular, concept: &str) -> Extent {
    match data {
        Tabular::Grouped(group) => group
            .values()
            .map(|member| member_range(member, concept))
            .fold(Extent::default(), Extent::combine),
        other => range(other.rows(), concept),
    }
}

fn member_range(member: &GroupMember, concept: &str) -> Extent {
    match member {
        GroupMember::Frame(frame) => range(frame.rows(), concept),
        GroupMember::Group(group) => group
            .values()
            .map(|member| member_range(member, concept))
            .fold(Extent::default(), Extent::combine),
    }
}

/// Extent of `concept` per group of rows sharing their `group_by` key.
/// With a subset, only the listed group keys are ranged.
pub fn range_by_group<'a, I>(
    rows: I,
    concept: &str,
    group_by: &Space,
    subset: Option<&[String]>,
) -> IndexMap<String, Extent>
where
    I: IntoIterator<Item = &'a Row>,
{
    let mut groups: IndexMap<String, Extent> = IndexMap::new();
    for row in rows {
        let group = key_str(row, group_by);
        if let Some(subset) = subset {
            if !subset.contains(&group) {
                continue;
            }
        }
        let extent = groups.entry(group).or_default();
        if let Some(value) = row.get(concept) {
            extent.update(value);
        }
    }
    groups
}

/// Distinct non-null values of `concept`, in first-seen order
pub fn unique<'a, I>(rows: I, concept: &str) -> Vec<Value>
where
    I: IntoIterator<Item = &'a Row>,
{
    let mut seen = IndexSet::new();
    for row in rows {
        if let Some(value) = row.get(concept) {
            if !value.is_null() && !seen.contains(value) {
                seen.insert(value.clone());
            }
        }
    }
    seen.into_iter().collect()
}

/// Per-member extent of the group concept over a frame-grouped series.
///
/// Requires `data` to be grouped by exactly `[concept]`, one level deep, with
/// members keyed by `member_key`. Groups must be ordered by the concept and
/// interpolated: once a member is missing from a group after having been seen,
/// it is assumed not to come back. Neither property is checked.
///
/// `concept` and `member_key` default to the group key and the member key.
pub fn range_of_group_key_per_member(
    data: &Tabular,
    subset: &[String],
    concept: Option<&str>,
    member_key: Option<&Space>,
) -> Result<IndexMap<String, Extent>, DataError> {
    let Tabular::Grouped(group) = data else {
        return Err(DataError::Precondition(
            "fast range needs a grouped frame".to_string(),
        ));
    };

    let concept = match concept {
        Some(concept) => concept,
        None => group
            .key()
            .dims()
            .first()
            .map(String::as_str)
            .ok_or_else(|| DataError::Precondition("group has an empty key".to_string()))?,
    };
    if group.key().len() != 1 || group.key().dims()[0] != concept {
        return Err(DataError::Precondition(format!(
            "grouping {} is not by {concept}",
            group.key()
        )));
    }

    let descendant_keys = group.descendant_keys();
    if descendant_keys.len() != 1 {
        return Err(DataError::Precondition(format!(
            "grouping is {} levels deep, expected 1",
            descendant_keys.len()
        )));
    }
    if let Some(member_key) = member_key {
        if &descendant_keys[0] != member_key {
            return Err(DataError::Precondition(format!(
                "member key {} differs from {member_key}",
                descendant_keys[0]
            )));
        }
    }

    let mut extents = IndexMap::with_capacity(subset.len());
    for member in subset {
        let mut first: Option<&GroupMember> = None;
        let mut last: Option<&GroupMember> = None;
        for frame in group.values() {
            if frame.has_by_str(member) {
                if first.is_none() {
                    first = Some(frame);
                }
                last = Some(frame);
            } else if first.is_some() {
                break;
            }
        }

        let end = |frame: Option<&GroupMember>| {
            frame
                .and_then(GroupMember::as_frame)
                .and_then(|frame| frame.get_by_str(member))
                .and_then(|row| row.get(concept))
                .cloned()
        };
        extents.insert(
            member.clone(),
            Extent {
                min: end(first),
                max: end(last),
            },
        );
    }

    debug!("Ranged {} members over {} groups", extents.len(), group.len());
    Ok(extents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dv_core::value::row;

    use crate::frame::{DataFrame, DataFrameGroup};

    fn v_rows(values: Vec<Value>) -> Vec<Row> {
        values.into_iter().map(|v| row([("v", v)])).collect()
    }

    #[test]
    fn test_range_basic() {
        let rows = v_rows(vec![3.into(), 1.into(), 5.into()]);
        assert_eq!(range(&rows, "v"), Extent::new(1, 5));

        let rows = v_rows(vec![Value::Null, 2.into()]);
        assert_eq!(range(&rows, "v"), Extent::new(2, 2));

        let rows: Vec<Row> = Vec::new();
        assert_eq!(range(&rows, "v"), Extent { min: None, max: None });
    }

    #[test]
    fn test_range_skips_leading_nan() {
        let rows = v_rows(vec![f64::NAN.into(), 4.into(), 2.into()]);
        assert_eq!(range(&rows, "v"), Extent::new(2, 4));
    }

    #[test]
    fn test_unique_keeps_first_seen_order() {
        let rows = vec![row([("c", "a")]), row([("c", "b")]), row([("c", "a")])];
        assert_eq!(unique(&rows, "c"), vec![Value::from("a"), Value::from("b")]);
    }

    #[test]
    fn test_range_of_nested_groups() {
        let frame = DataFrame::from_rows(
            vec![
                row([("geo", Value::from("swe")), ("time", Value::from(2000)), ("pop", Value::from(9))]),
                row([("geo", Value::from("nor")), ("time", Value::from(2001)), ("pop", Value::from(5))]),
                row([("geo", Value::from("fin")), ("time", Value::from(2001)), ("pop", Value::from(6))]),
            ],
            Space::new(["geo", "time"]),
        );
        let grouped = Tabular::Grouped(DataFrameGroup::group_by(&frame, Space::new(["time"]), None));
        assert_eq!(range_of(&grouped, "pop"), Extent::new(5, 9));
    }

    #[test]
    fn test_range_by_group_with_subset() {
        let rows = vec![
            row([("geo", Value::from("swe")), ("pop", Value::from(1))]),
            row([("geo", Value::from("swe")), ("pop", Value::from(3))]),
            row([("geo", Value::from("nor")), ("pop", Value::from(2))]),
        ];
        let geo = Space::new(["geo"]);

        let all = range_by_group(&rows, "pop", &geo, None);
        assert_eq!(all["swe"], Extent::new(1, 3));
        assert_eq!(all["nor"], Extent::new(2, 2));

        let subset = vec!["nor".to_string()];
        let some = range_by_group(&rows, "pop", &geo, Some(subset.as_slice()));
        assert_eq!(some.len(), 1);
    }

    fn frames_2000_2005() -> Tabular {
        let mut rows = Vec::new();
        for year in 2000..=2005 {
            rows.push(row([("geo", Value::from("swe")), ("time", Value::from(year))]));
            if (2001..=2003).contains(&year) {
                rows.push(row([("geo", Value::from("usa")), ("time", Value::from(year))]));
            }
        }
        let frame = DataFrame::from_rows(rows, Space::new(["geo", "time"]));
        Tabular::Grouped(DataFrameGroup::group_by(&frame, Space::new(["time"]), None))
    }

    #[test]
    fn test_group_key_per_member() {
        let frames = frames_2000_2005();
        let subset = vec!["usa".to_string(), "swe".to_string(), "chn".to_string()];
        let extents = range_of_group_key_per_member(&frames, &subset, None, None).unwrap();

        assert_eq!(extents["usa"], Extent::new(2001, 2003));
        assert_eq!(extents["swe"], Extent::new(2000, 2005));
        assert!(extents["chn"].is_empty());

        let geo = Space::new(["geo"]);
        assert!(range_of_group_key_per_member(&frames, &subset, Some("time"), Some(&geo)).is_ok());
    }

    #[test]
    fn test_group_key_per_member_preconditions() {
        let frame = DataFrame::from_rows(
            vec![row([("geo", Value::from("usa")), ("time", Value::from(2001))])],
            Space::new(["geo", "time"]),
        );
        let subset = vec!["usa".to_string()];

        let ungrouped = Tabular::Frame(frame.clone());
        assert!(matches!(
            range_of_group_key_per_member(&ungrouped, &subset, None, None),
            Err(DataError::Precondition(_))
        ));

        let frames = frames_2000_2005();
        assert!(range_of_group_key_per_member(&frames, &subset, Some("geo"), None).is_err());
        let wrong_member = Space::new(["gender"]);
        assert!(range_of_group_key_per_member(&frames, &subset, None, Some(&wrong_member)).is_err());

        let nested = Tabular::Grouped(DataFrameGroup::new(
            Space::new(["time"]),
            vec![Space::new(["gender"]), Space::new(["geo"])],
        ));
        assert!(range_of_group_key_per_member(&nested, &subset, None, None).is_err());
    }
}
