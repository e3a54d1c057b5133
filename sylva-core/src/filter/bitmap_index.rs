//! Bitmap-based tag index for pre-filtering search results.
//!
//! Uses roaring bitmaps to track which point IDs carry each tag value, so
//! filter evaluation is a handful of set operations.

use std::collections::HashMap;
use std::fmt;

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use crate::filter::{Filter, FilterCondition};
use crate::store::PointId;

/// A tag attached to a point, such as an owning user ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Int(i64),
    Str(String),
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Int(v) => write!(f, "{}", v),
            TagValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for TagValue {
    fn from(v: i64) -> Self {
        TagValue::Int(v)
    }
}

impl From<u32> for TagValue {
    fn from(v: u32) -> Self {
        TagValue::Int(v as i64)
    }
}

impl From<&str> for TagValue {
    fn from(v: &str) -> Self {
        TagValue::Str(v.to_string())
    }
}

impl From<String> for TagValue {
    fn from(v: String) -> Self {
        TagValue::Str(v)
    }
}

/// Inverted index from tag values to point IDs.
///
/// A point may carry any number of tags. The index lives beside an
/// [`AnnIndex`](crate::AnnIndex) and is only consulted at query time.
///
/// # Example
///
/// ```
/// use sylva_core::{Filter, TagIndex};
///
/// let mut tags = TagIndex::new();
/// tags.insert(1, "electronics");
/// tags.insert(2, "books");
/// tags.insert(3, "electronics");
///
/// let matches = tags.query(&Filter::tag("electronics"), 4);
/// assert!(matches.contains(1));
/// assert!(matches.contains(3));
/// assert!(!matches.contains(2));
/// ```
#[derive(Debug, Clone, Default)]
pub struct TagIndex {
    /// tag value -> bitmap of point IDs
    tags: HashMap<TagValue, RoaringBitmap>,
    /// every point carrying at least one tag
    tagged: RoaringBitmap,
}

impl TagIndex {
    /// Creates a new empty tag index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of tagged points.
    pub fn len(&self) -> u64 {
        self.tagged.len()
    }

    /// Returns true if no point is tagged.
    pub fn is_empty(&self) -> bool {
        self.tagged.is_empty()
    }

    /// Tags point `id` with `value`.
    pub fn insert<V: Into<TagValue>>(&mut self, id: PointId, value: V) {
        self.tagged.insert(id);
        self.tags.entry(value.into()).or_default().insert(id);
    }

    /// Tags every point in `ids` with `value`.
    pub fn insert_many<V, I>(&mut self, ids: I, value: V)
    where
        V: Into<TagValue>,
        I: IntoIterator<Item = PointId>,
    {
        let bitmap: RoaringBitmap = ids.into_iter().collect();
        self.tagged |= &bitmap;
        *self.tags.entry(value.into()).or_default() |= bitmap;
    }

    /// Removes `value` from point `id`. Returns true if the tag was present.
    pub fn remove(&mut self, id: PointId, value: &TagValue) -> bool {
        let Some(bitmap) = self.tags.get_mut(value) else {
            return false;
        };
        let removed = bitmap.remove(id);
        if bitmap.is_empty() {
            self.tags.remove(value);
        }
        if removed && !self.tags.values().any(|b| b.contains(id)) {
            self.tagged.remove(id);
        }
        removed
    }

    /// Points carrying `value`, if any.
    pub fn get(&self, value: &TagValue) -> Option<&RoaringBitmap> {
        self.tags.get(value)
    }

    /// Tags carried by point `id`, sorted.
    pub fn tags_of(&self, id: PointId) -> Vec<&TagValue> {
        let mut found: Vec<&TagValue> = self
            .tags
            .iter()
            .filter(|(_, bitmap)| bitmap.contains(id))
            .map(|(value, _)| value)
            .collect();
        found.sort();
        found
    }

    /// Every distinct tag value.
    pub fn values(&self) -> impl Iterator<Item = &TagValue> {
        self.tags.keys()
    }

    /// Evaluates a filter over the points `0..n_items` and returns the
    /// matching IDs as a bitmap.
    pub fn query(&self, filter: &Filter, n_items: usize) -> RoaringBitmap {
        let universe = universe(n_items);
        let mut result = self.eval_condition(&filter.condition, &universe);
        result &= &universe;
        result
    }

    /// Evaluates a filter condition recursively.
    fn eval_condition(&self, condition: &FilterCondition, universe: &RoaringBitmap) -> RoaringBitmap {
        match condition {
            FilterCondition::Tag(value) => self.get_bitmap(value),
            FilterCondition::AnyOf(values) => {
                let mut result = RoaringBitmap::new();
                for value in values {
                    if let Some(bitmap) = self.tags.get(value) {
                        result |= bitmap;
                    }
                }
                result
            }
            FilterCondition::Ids(ids) => ids.iter().copied().collect(),
            FilterCondition::IdRange { start, end } => {
                let mut result = RoaringBitmap::new();
                if start < end {
                    result.insert_range(*start..*end);
                }
                result
            }
            FilterCondition::And(left, right) => {
                self.eval_condition(left, universe) & self.eval_condition(right, universe)
            }
            FilterCondition::Or(left, right) => {
                self.eval_condition(left, universe) | self.eval_condition(right, universe)
            }
            FilterCondition::Not(inner) => universe - self.eval_condition(inner, universe),
        }
    }

    /// Gets the bitmap for a tag value.
    fn get_bitmap(&self, value: &TagValue) -> RoaringBitmap {
        self.tags.get(value).cloned().unwrap_or_default()
    }

    /// Combines the tags of two indexes about to be merged: `a`'s IDs are kept
    /// and `b`'s are shifted up by `offset`.
    pub fn merge(a: &TagIndex, b: &TagIndex, offset: u32) -> TagIndex {
        let mut merged = a.clone();
        for (value, bitmap) in &b.tags {
            let shifted: RoaringBitmap = bitmap.iter().map(|id| id + offset).collect();
            merged.tagged |= &shifted;
            *merged.tags.entry(value.clone()).or_default() |= shifted;
        }
        merged
    }

    /// Clears all indexed data.
    pub fn clear(&mut self) {
        self.tags.clear();
        self.tagged.clear();
    }
}

/// All IDs in `0..n_items`.
fn universe(n_items: usize) -> RoaringBitmap {
    let mut all = RoaringBitmap::new();
    if n_items > 0 {
        all.insert_range(0..n_items.min(u32::MAX as usize) as u32);
    }
    all
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TagIndex {
        let mut index = TagIndex::new();
        index.insert(0, "alice");
        index.insert(1, "bob");
        index.insert(2, "alice");
        index.insert(3, 42i64);
        index.insert(3, "bob");
        index
    }

    #[test]
    fn test_insert_and_query_tag() {
        let index = sample();
        let matches = index.query(&Filter::tag("alice"), 5);

        assert_eq!(matches.len(), 2);
        assert!(matches.contains(0));
        assert!(matches.contains(2));
        assert!(!matches.contains(1));
    }

    #[test]
    fn test_query_any_of() {
        let index = sample();
        let matches = index.query(&Filter::any_of(vec![TagValue::Int(42), "alice".into()]), 5);
        assert_eq!(matches.iter().collect::<Vec<_>>(), vec![0, 2, 3]);
    }

    #[test]
    fn test_query_and() {
        let index = sample();
        let filter = Filter::tag("bob").and(Filter::tag(42i64));
        let matches = index.query(&filter, 5);
        assert_eq!(matches.iter().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn test_query_or() {
        let index = sample();
        let filter = Filter::tag("alice").or(Filter::ids([4]));
        let matches = index.query(&filter, 5);
        assert_eq!(matches.iter().collect::<Vec<_>>(), vec![0, 2, 4]);
    }

    #[test]
    fn test_query_not_includes_untagged() {
        let index = sample();
        let matches = index.query(&Filter::tag("alice").negate(), 6);
        assert_eq!(matches.iter().collect::<Vec<_>>(), vec![1, 3, 4, 5]);
    }

    #[test]
    fn test_results_clipped_to_item_count() {
        let index = sample();
        let matches = index.query(&Filter::id_range(2..100), 4);
        assert_eq!(matches.iter().collect::<Vec<_>>(), vec![2, 3]);

        let matches = index.query(&Filter::ids([1, 9]), 4);
        assert_eq!(matches.iter().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_empty_range() {
        let index = sample();
        assert!(index.query(&Filter::id_range(3..3), 5).is_empty());
    }

    #[test]
    fn test_unknown_tag() {
        let index = sample();
        assert!(index.query(&Filter::tag("carol"), 5).is_empty());
    }

    #[test]
    fn test_remove() {
        let mut index = sample();
        assert_eq!(index.len(), 4);

        assert!(index.remove(1, &"bob".into()));
        assert!(!index.remove(1, &"bob".into()));
        assert_eq!(index.len(), 3);

        assert!(index.remove(3, &"bob".into()));
        assert_eq!(index.len(), 3, "point 3 still carries 42");
    }

    #[test]
    fn test_tags_of() {
        let index = sample();
        let tags = index.tags_of(3);
        assert_eq!(tags, vec![&TagValue::Int(42), &TagValue::Str("bob".into())]);
        assert!(index.tags_of(9).is_empty());
    }

    #[test]
    fn test_insert_many() {
        let mut index = TagIndex::new();
        index.insert_many(0..4, "batch");
        assert_eq!(index.len(), 4);
        assert_eq!(index.get(&"batch".into()).map(|b| b.len()), Some(4));
    }

    #[test]
    fn test_merge_shifts_b() {
        let mut a = TagIndex::new();
        a.insert(0, "alice");
        a.insert(1, "bob");
        let mut b = TagIndex::new();
        b.insert(0, "bob");
        b.insert(2, "carol");

        let merged = TagIndex::merge(&a, &b, 10);
        let bob = merged.query(&Filter::tag("bob"), 20);
        assert_eq!(bob.iter().collect::<Vec<_>>(), vec![1, 10]);
        let carol = merged.query(&Filter::tag("carol"), 20);
        assert_eq!(carol.iter().collect::<Vec<_>>(), vec![12]);
        assert_eq!(merged.len(), 4);
    }

    #[test]
    fn test_tag_value_display_and_serde() {
        assert_eq!(TagValue::Int(5).to_string(), "5");
        assert_eq!(TagValue::from("u1").to_string(), "u1");
        let json = serde_json::to_string(&TagValue::Int(5)).unwrap();
        assert_eq!(json, "5");
        let back: TagValue = serde_json::from_str("\"u1\"").unwrap();
        assert_eq!(back, TagValue::Str("u1".into()));
    }

    #[test]
    fn test_clear() {
        let mut index = sample();
        index.clear();
        assert!(index.is_empty());
        assert!(index.query(&Filter::tag("alice"), 5).is_empty());
    }
}
