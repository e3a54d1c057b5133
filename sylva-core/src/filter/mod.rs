//! Tag-based filter expressions.
//!
//! Filters restrict search results to a set of point IDs. They are built from
//! tag lookups and ID sets, combined with boolean operators, and resolved
//! against a [`TagIndex`] into an allow-list bitmap that the search engine
//! consults after candidate collection. Filters never influence tree shape.

pub mod bitmap_index;

pub use bitmap_index::{TagIndex, TagValue};

use std::ops::Range;

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use crate::store::PointId;

/// A filter expression over point tags and IDs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub(crate) condition: FilterCondition,
}

impl Filter {
    /// Points carrying `value`.
    ///
    /// # Example
    ///
    /// ```
    /// use sylva_core::{Filter, TagIndex};
    ///
    /// let mut tags = TagIndex::new();
    /// tags.insert(0, "alice");
    /// tags.insert(1, "bob");
    ///
    /// let allow = Filter::tag("alice").resolve(&tags, 2);
    /// assert!(allow.contains(0));
    /// assert!(!allow.contains(1));
    /// ```
    pub fn tag<V: Into<TagValue>>(value: V) -> Self {
        Self::from_condition(FilterCondition::Tag(value.into()))
    }

    /// Points carrying any of `values`.
    pub fn any_of<V: Into<TagValue>>(values: Vec<V>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        Self::from_condition(FilterCondition::AnyOf(values))
    }

    /// Exactly the listed points.
    pub fn ids<I: IntoIterator<Item = PointId>>(ids: I) -> Self {
        Self::from_condition(FilterCondition::Ids(ids.into_iter().collect()))
    }

    /// Points whose ID lies in `range`.
    pub fn id_range(range: Range<PointId>) -> Self {
        Self::from_condition(FilterCondition::IdRange {
            start: range.start,
            end: range.end,
        })
    }

    /// Creates a filter from a condition.
    pub fn from_condition(condition: FilterCondition) -> Self {
        Self { condition }
    }

    /// Combines this filter with another using AND.
    pub fn and(self, other: Filter) -> Self {
        Self {
            condition: FilterCondition::And(Box::new(self.condition), Box::new(other.condition)),
        }
    }

    /// Combines this filter with another using OR.
    pub fn or(self, other: Filter) -> Self {
        Self {
            condition: FilterCondition::Or(Box::new(self.condition), Box::new(other.condition)),
        }
    }

    /// Negates this filter.
    #[allow(clippy::should_implement_trait)]
    pub fn negate(self) -> Self {
        Self {
            condition: FilterCondition::Not(Box::new(self.condition)),
        }
    }

    /// The filter's condition tree.
    pub fn condition(&self) -> &FilterCondition {
        &self.condition
    }

    /// Resolves the filter into the set of allowed IDs in `0..n_items`.
    pub fn resolve(&self, tags: &TagIndex, n_items: usize) -> RoaringBitmap {
        tags.query(self, n_items)
    }
}

/// The actual filter condition variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterCondition {
    /// Point carries the tag
    Tag(TagValue),
    /// Point carries at least one of the tags
    AnyOf(Vec<TagValue>),
    /// Point is one of the listed IDs
    Ids(Vec<PointId>),
    /// Point ID is in `start..end`
    IdRange { start: PointId, end: PointId },
    /// Logical AND
    And(Box<FilterCondition>, Box<FilterCondition>),
    /// Logical OR
    Or(Box<FilterCondition>, Box<FilterCondition>),
    /// Logical NOT
    Not(Box<FilterCondition>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders_produce_conditions() {
        assert_eq!(
            Filter::tag(7i64).condition(),
            &FilterCondition::Tag(TagValue::Int(7))
        );
        assert_eq!(
            Filter::id_range(2..5).condition(),
            &FilterCondition::IdRange { start: 2, end: 5 }
        );
        assert_eq!(
            Filter::ids([3, 1]).condition(),
            &FilterCondition::Ids(vec![3, 1])
        );
    }

    #[test]
    fn test_combinators_nest() {
        let filter = Filter::tag("a").and(Filter::tag("b")).negate();
        match filter.condition() {
            FilterCondition::Not(inner) => {
                assert!(matches!(**inner, FilterCondition::And(_, _)));
            }
            other => panic!("unexpected condition {:?}", other),
        }
    }

    #[test]
    fn test_filter_serde_roundtrip() {
        let filter = Filter::any_of(vec!["x", "y"]).or(Filter::id_range(0..10));
        let json = serde_json::to_string(&filter).unwrap();
        let back: Filter = serde_json::from_str(&json).unwrap();
        assert_eq!(back, filter);
    }
}
