//! Request batches. A batch accumulates every key of one family that can be
//! answered by a single upstream call. It owns the shared dimensions, which
//! are copied from the seed key and never change, plus a growing list of
//! discriminators contributed by compatible keys.

use crate::key::{
    ColumnKey, GroupAssignment, GroupedSumKey, LimitedColumnKey, LookupKind, MetadataKey,
    TimeRange,
};

/// The batch side of a key family.
///
/// The two predicates are deliberately asymmetric. While grouping, a batch
/// accepts any key whose shared dimensions match, whether or not its
/// discriminator has been recorded yet. While resolving, a batch only claims
/// a key whose discriminator it actually carries; claiming anything else
/// would look the key up in the wrong response.
pub trait RequestBatch: Sized {
    type Key;

    /// Start a new batch from `key`, copying its shared dimensions and
    /// recording its discriminator.
    fn seed(key: &Self::Key) -> Self;

    /// True if `key` shares this batch's dimensions.
    fn is_compatible_for_grouping(&self, key: &Self::Key) -> bool;

    /// True if `key` shares this batch's dimensions *and* its discriminator
    /// has been recorded.
    fn contains_key(&self, key: &Self::Key) -> bool;

    /// Record the discriminator of a compatible key. No-op if it is already
    /// present.
    fn record(&mut self, key: &Self::Key);
}

fn push_unique<T>(items: &mut Vec<T::Owned>, item: &T)
where
    T: ToOwned + ?Sized,
    T::Owned: PartialEq<T>,
{
    if !items.iter().any(|existing| existing == item) {
        items.push(item.to_owned());
    }
}

/// Columns of one machine over one ordered set of time ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnBatch {
    machine_id: String,
    time_ranges: Vec<TimeRange>,
    column_ids: Vec<String>,
}

impl ColumnBatch {
    #[inline]
    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    #[inline]
    pub fn time_ranges(&self) -> &[TimeRange] {
        &self.time_ranges
    }

    /// Every requested column, in the order it was first requested.
    #[inline]
    pub fn column_ids(&self) -> &[String] {
        &self.column_ids
    }

    fn shares_dimensions(&self, key: &ColumnKey) -> bool {
        self.machine_id == key.machine_id() && self.time_ranges == key.time_ranges()
    }
}

impl RequestBatch for ColumnBatch {
    type Key = ColumnKey;

    fn seed(key: &ColumnKey) -> Self {
        Self {
            machine_id: key.machine_id().to_owned(),
            time_ranges: key.time_ranges().to_vec(),
            column_ids: vec![key.column_id().to_owned()],
        }
    }

    fn is_compatible_for_grouping(&self, key: &ColumnKey) -> bool {
        self.shares_dimensions(key)
    }

    fn contains_key(&self, key: &ColumnKey) -> bool {
        self.shares_dimensions(key) && self.column_ids.iter().any(|id| id == key.column_id())
    }

    fn record(&mut self, key: &ColumnKey) {
        push_unique(&mut self.column_ids, key.column_id())
    }
}

/// A [`ColumnBatch`] whose call is capped at `limit` results. The limit is
/// a shared dimension: keys with different limits never share a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitedColumnBatch {
    columns: ColumnBatch,
    limit: u32,
}

impl LimitedColumnBatch {
    #[inline]
    pub fn machine_id(&self) -> &str {
        self.columns.machine_id()
    }

    #[inline]
    pub fn time_ranges(&self) -> &[TimeRange] {
        self.columns.time_ranges()
    }

    #[inline]
    pub fn column_ids(&self) -> &[String] {
        self.columns.column_ids()
    }

    #[inline]
    pub fn limit(&self) -> u32 {
        self.limit
    }
}

impl RequestBatch for LimitedColumnBatch {
    type Key = LimitedColumnKey;

    fn seed(key: &LimitedColumnKey) -> Self {
        Self {
            columns: ColumnBatch::seed(key.as_column_key()),
            limit: key.limit(),
        }
    }

    fn is_compatible_for_grouping(&self, key: &LimitedColumnKey) -> bool {
        self.limit == key.limit()
            && self
                .columns
                .is_compatible_for_grouping(key.as_column_key())
    }

    fn contains_key(&self, key: &LimitedColumnKey) -> bool {
        self.limit == key.limit() && self.columns.contains_key(key.as_column_key())
    }

    fn record(&mut self, key: &LimitedColumnKey) {
        self.columns.record(key.as_column_key())
    }
}

/// Group assignments of one machine over one ordered set of time ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupedSumBatch {
    machine_id: String,
    time_ranges: Vec<TimeRange>,
    assignments: Vec<GroupAssignment>,
}

impl GroupedSumBatch {
    #[inline]
    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    #[inline]
    pub fn time_ranges(&self) -> &[TimeRange] {
        &self.time_ranges
    }

    #[inline]
    pub fn assignments(&self) -> &[GroupAssignment] {
        &self.assignments
    }

    fn shares_dimensions(&self, key: &GroupedSumKey) -> bool {
        self.machine_id == key.machine_id() && self.time_ranges == key.time_ranges()
    }
}

impl RequestBatch for GroupedSumBatch {
    type Key = GroupedSumKey;

    fn seed(key: &GroupedSumKey) -> Self {
        Self {
            machine_id: key.machine_id().to_owned(),
            time_ranges: key.time_ranges().to_vec(),
            assignments: vec![key.assignment().clone()],
        }
    }

    fn is_compatible_for_grouping(&self, key: &GroupedSumKey) -> bool {
        self.shares_dimensions(key)
    }

    fn contains_key(&self, key: &GroupedSumKey) -> bool {
        self.shares_dimensions(key) && self.assignments.contains(key.assignment())
    }

    fn record(&mut self, key: &GroupedSumKey) {
        push_unique(&mut self.assignments, key.assignment())
    }
}

/// Metadata lookups of one machine. Metadata has no time dimension, so the
/// machine is the only shared dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataBatch {
    machine_id: String,
    lookups: Vec<(String, LookupKind)>,
}

impl MetadataBatch {
    #[inline]
    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    /// Every distinct lookup value, in the order it was first requested. A
    /// value requested under both lookup kinds appears once.
    pub fn lookup_values(&self) -> Vec<&str> {
        let mut values: Vec<&str> = Vec::with_capacity(self.lookups.len());
        for (value, _kind) in &self.lookups {
            if !values.contains(&value.as_str()) {
                values.push(value);
            }
        }
        values
    }

    fn holds(&self, key: &MetadataKey) -> bool {
        self.lookups
            .iter()
            .any(|(value, kind)| value == key.lookup_value() && *kind == key.kind())
    }
}

impl RequestBatch for MetadataBatch {
    type Key = MetadataKey;

    fn seed(key: &MetadataKey) -> Self {
        Self {
            machine_id: key.machine_id().to_owned(),
            lookups: vec![(key.lookup_value().to_owned(), key.kind())],
        }
    }

    fn is_compatible_for_grouping(&self, key: &MetadataKey) -> bool {
        self.machine_id == key.machine_id()
    }

    fn contains_key(&self, key: &MetadataKey) -> bool {
        self.machine_id == key.machine_id() && self.holds(key)
    }

    fn record(&mut self, key: &MetadataKey) {
        if !self.holds(key) {
            self.lookups
                .push((key.lookup_value().to_owned(), key.kind()));
        }
    }
}
