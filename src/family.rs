//! Key families. Each family ties together a key type, the batch that
//! coalesces it, the payload its upstream call returns, and the rule for
//! finding one key's value inside that payload.
//!
//! Families are zero-sized marker types chosen at the call site, e.g.
//! `coalescing::<ColumnValues<f64>, _>(client, cancel)`.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;

use futures::future::BoxFuture;

use crate::{
    batch::{ColumnBatch, GroupedSumBatch, LimitedColumnBatch, MetadataBatch, RequestBatch},
    cancel::CancelSignal,
    key::{ColumnKey, GroupedSumKey, LimitedColumnKey, LookupKind, MetadataKey},
    outcome::{LoadError, Outcome, UpstreamError},
};

pub trait Family: 'static {
    type Key: Eq + Hash + Debug + Send + Sync + 'static;
    type Batch: RequestBatch<Key = Self::Key> + Debug + Send + Sync + 'static;
    type Payload: Send + Sync + 'static;
    type Value: Clone + Send + Sync + 'static;

    /// Find `key`'s outcome in the successful `payload` of the batch that
    /// contains it.
    fn resolve(batch: &Self::Batch, payload: &Self::Payload, key: &Self::Key)
        -> Outcome<Self::Value>;
}

/// An upstream client able to answer a whole batch of family `F` in one
/// call. The call fails or succeeds as a unit. `cancel` is the query's
/// cancellation signal; the dispatcher also races the call against it, so
/// honoring it is optional.
pub trait Fetch<F: Family> {
    fn fetch<'a>(
        &'a self,
        batch: &'a F::Batch,
        cancel: &'a CancelSignal,
    ) -> BoxFuture<'a, Result<F::Payload, UpstreamError>>;
}

/// Point or aggregate column values. The payload maps column id to value.
pub struct ColumnValues<V>(PhantomData<fn() -> V>);

impl<V: Clone + Send + Sync + 'static> Family for ColumnValues<V> {
    type Key = ColumnKey;
    type Batch = ColumnBatch;
    type Payload = HashMap<String, V>;
    type Value = V;

    fn resolve(_batch: &ColumnBatch, payload: &HashMap<String, V>, key: &ColumnKey) -> Outcome<V> {
        resolve_column(payload, key.column_id(), key.machine_id())
    }
}

/// Column values with a result-size limit. The payload maps column id to
/// value, as for [`ColumnValues`].
pub struct LimitedColumnValues<V>(PhantomData<fn() -> V>);

impl<V: Clone + Send + Sync + 'static> Family for LimitedColumnValues<V> {
    type Key = LimitedColumnKey;
    type Batch = LimitedColumnBatch;
    type Payload = HashMap<String, V>;
    type Value = V;

    fn resolve(
        _batch: &LimitedColumnBatch,
        payload: &HashMap<String, V>,
        key: &LimitedColumnKey,
    ) -> Outcome<V> {
        resolve_column(payload, key.column_id(), key.machine_id())
    }
}

// A successful call that omits a requested column means the column doesn't
// exist for this machine.
fn resolve_column<V: Clone>(
    payload: &HashMap<String, V>,
    column_id: &str,
    machine_id: &str,
) -> Outcome<V> {
    match payload.get(column_id) {
        Some(value) => Outcome::Value(value.clone()),
        None => Outcome::Failed(LoadError::ColumnNotFound {
            column_id: column_id.to_owned(),
            machine_id: machine_id.to_owned(),
        }),
    }
}

/// Grouped sums, keyed by key-column id and then value-column id. `None`
/// means the upstream returned no payload object at all.
pub type GroupedSumPayload<V> = Option<HashMap<String, HashMap<String, V>>>;

/// Grouped sums. Unlike the column families, a missing entry is an absence
/// rather than a failure: upstream omits the value column when the value
/// column is invalid, and omits the key column when the key column is
/// invalid, and neither is an error to the caller.
pub struct GroupedSums<V>(PhantomData<fn() -> V>);

impl<V: Clone + Send + Sync + 'static> Family for GroupedSums<V> {
    type Key = GroupedSumKey;
    type Batch = GroupedSumBatch;
    type Payload = GroupedSumPayload<V>;
    type Value = V;

    fn resolve(
        _batch: &GroupedSumBatch,
        payload: &GroupedSumPayload<V>,
        key: &GroupedSumKey,
    ) -> Outcome<V> {
        let assignment = key.assignment();

        payload
            .as_ref()
            .and_then(|groups| groups.get(&assignment.key_column_id))
            .and_then(|sums| sums.get(&assignment.value_column_id))
            .map_or(Outcome::Missing, |value| Outcome::Value(value.clone()))
    }
}

/// One entry of a metadata listing.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataItem<V> {
    pub path: String,
    pub variable_identifier: Option<String>,
    pub data: V,
}

impl<V> MetadataItem<V> {
    fn matches(&self, lookup_value: &str, kind: LookupKind) -> bool {
        match kind {
            LookupKind::LastPathSegment => self.path.ends_with(lookup_value),
            LookupKind::VariableIdentifier => {
                self.variable_identifier.as_deref() == Some(lookup_value)
            }
        }
    }
}

/// Metadata lookups. The payload is the listing for every lookup value in
/// the batch; a key resolves to the data of the first item it matches.
pub struct Metadata<V>(PhantomData<fn() -> V>);

impl<V: Clone + Send + Sync + 'static> Family for Metadata<V> {
    type Key = MetadataKey;
    type Batch = MetadataBatch;
    type Payload = Vec<MetadataItem<V>>;
    type Value = V;

    fn resolve(
        _batch: &MetadataBatch,
        payload: &Vec<MetadataItem<V>>,
        key: &MetadataKey,
    ) -> Outcome<V> {
        match payload
            .iter()
            .find(|item| item.matches(key.lookup_value(), key.kind()))
        {
            Some(item) => Outcome::Value(item.data.clone()),
            None => Outcome::Failed(LoadError::MetadataNotFound {
                lookup_value: key.lookup_value().to_owned(),
                machine_id: key.machine_id().to_owned(),
            }),
        }
    }
}
