//! Request keys. A key describes one unit of data a resolver wants, and is
//! the only thing a resolver hands to a [`Loader`][crate::Loader].
//!
//! Keys are immutable once built. Equality and hashing cover every field,
//! and `time_ranges` compare as an ordered sequence: upstream services treat
//! ranges positionally, so `[T1, T2]` and `[T2, T1]` are different keys.

use std::fmt::{self, Display, Formatter};

/// A half-open `[from, to)` window, in unix milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeRange {
    pub from: i64,
    pub to: i64,
}

impl TimeRange {
    #[inline]
    pub fn new(from: i64, to: i64) -> Self {
        Self { from, to }
    }
}

impl Display for TimeRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.from, self.to)
    }
}

/// A point or aggregate value: column `column_id` of machine `machine_id`
/// over `time_ranges`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnKey {
    machine_id: String,
    column_id: String,
    time_ranges: Vec<TimeRange>,
}

impl ColumnKey {
    pub fn new(
        machine_id: impl Into<String>,
        column_id: impl Into<String>,
        time_ranges: impl IntoIterator<Item = TimeRange>,
    ) -> Self {
        Self {
            machine_id: machine_id.into(),
            column_id: column_id.into(),
            time_ranges: time_ranges.into_iter().collect(),
        }
    }

    #[inline]
    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    #[inline]
    pub fn column_id(&self) -> &str {
        &self.column_id
    }

    #[inline]
    pub fn time_ranges(&self) -> &[TimeRange] {
        &self.time_ranges
    }
}

/// A [`ColumnKey`] whose result set is capped at `limit` entries. Two
/// limited keys are only equal if their limits are equal, and a limited key
/// never equals a plain `ColumnKey`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LimitedColumnKey {
    column: ColumnKey,
    limit: u32,
}

impl LimitedColumnKey {
    pub fn new(
        machine_id: impl Into<String>,
        column_id: impl Into<String>,
        time_ranges: impl IntoIterator<Item = TimeRange>,
        limit: u32,
    ) -> Self {
        Self {
            column: ColumnKey::new(machine_id, column_id, time_ranges),
            limit,
        }
    }

    #[inline]
    pub fn machine_id(&self) -> &str {
        self.column.machine_id()
    }

    #[inline]
    pub fn column_id(&self) -> &str {
        self.column.column_id()
    }

    #[inline]
    pub fn time_ranges(&self) -> &[TimeRange] {
        self.column.time_ranges()
    }

    #[inline]
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// The same request without its limit.
    #[inline]
    pub fn as_column_key(&self) -> &ColumnKey {
        &self.column
    }
}

/// A pair of columns for a grouped sum: values of `value_column_id` are
/// summed per distinct value of `key_column_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupAssignment {
    pub key_column_id: String,
    pub value_column_id: String,
}

impl GroupAssignment {
    pub fn new(key_column_id: impl Into<String>, value_column_id: impl Into<String>) -> Self {
        Self {
            key_column_id: key_column_id.into(),
            value_column_id: value_column_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupedSumKey {
    machine_id: String,
    time_ranges: Vec<TimeRange>,
    assignment: GroupAssignment,
}

impl GroupedSumKey {
    pub fn new(
        machine_id: impl Into<String>,
        time_ranges: impl IntoIterator<Item = TimeRange>,
        assignment: GroupAssignment,
    ) -> Self {
        Self {
            machine_id: machine_id.into(),
            time_ranges: time_ranges.into_iter().collect(),
            assignment,
        }
    }

    #[inline]
    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    #[inline]
    pub fn time_ranges(&self) -> &[TimeRange] {
        &self.time_ranges
    }

    #[inline]
    pub fn assignment(&self) -> &GroupAssignment {
        &self.assignment
    }
}

/// How a [`MetadataKey`] picks its item out of a metadata listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupKind {
    /// The item's path ends with the lookup value.
    LastPathSegment,
    /// The item's variable identifier equals the lookup value.
    VariableIdentifier,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetadataKey {
    machine_id: String,
    lookup_value: String,
    kind: LookupKind,
}

impl MetadataKey {
    pub fn new(
        machine_id: impl Into<String>,
        lookup_value: impl Into<String>,
        kind: LookupKind,
    ) -> Self {
        Self {
            machine_id: machine_id.into(),
            lookup_value: lookup_value.into(),
            kind,
        }
    }

    #[inline]
    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    #[inline]
    pub fn lookup_value(&self) -> &str {
        &self.lookup_value
    }

    #[inline]
    pub fn kind(&self) -> LookupKind {
        self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::collections::HashSet;
    use std::hash::{Hash, Hasher};

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn identical_keys_are_equal_and_hash_equal() {
        let ranges = vec![TimeRange::new(0, 10), TimeRange::new(20, 30)];
        let a = ColumnKey::new("m1", "speed", ranges.clone());
        let b = ColumnKey::new(String::from("m1"), String::from("speed"), ranges);

        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn reordered_time_ranges_are_a_different_key() {
        let a = ColumnKey::new("m1", "speed", vec![TimeRange::new(0, 10), TimeRange::new(20, 30)]);
        let b = ColumnKey::new("m1", "speed", vec![TimeRange::new(20, 30), TimeRange::new(0, 10)]);

        assert_ne!(a, b);

        let set: HashSet<_> = vec![a, b].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn limit_participates_in_equality() {
        let ranges = vec![TimeRange::new(0, 10)];
        let a = LimitedColumnKey::new("m1", "alarms", ranges.clone(), 10);
        let b = LimitedColumnKey::new("m1", "alarms", ranges.clone(), 10);
        let c = LimitedColumnKey::new("m1", "alarms", ranges, 20);

        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_ne!(a, c);
        assert_eq!(a.as_column_key(), c.as_column_key());
    }

    #[test]
    fn grouped_sum_keys_compare_assignments() {
        let ranges = vec![TimeRange::new(0, 10)];
        let a = GroupedSumKey::new("m1", ranges.clone(), GroupAssignment::new("product", "count"));
        let b = GroupedSumKey::new("m1", ranges.clone(), GroupAssignment::new("product", "count"));
        let c = GroupedSumKey::new("m1", ranges, GroupAssignment::new("product", "scrap"));

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn metadata_keys_compare_lookup_kind() {
        let a = MetadataKey::new("m1", "temperature", LookupKind::LastPathSegment);
        let b = MetadataKey::new("m1", "temperature", LookupKind::VariableIdentifier);

        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }
}
