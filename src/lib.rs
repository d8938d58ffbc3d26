//! Request coalescing for machine data lookups, built on the
//! [dataloader pattern](https://github.com/graphql/dataloader).
//!
//! A query layer that resolves one field at a time would naively make one
//! upstream call per field per machine: a page of 100 machines, each asking
//! for 5 snapshot columns over the same window, would make 500 calls. This
//! crate collects every request made during one *tick* of resolution,
//! groups compatible requests into as few upstream calls as possible, runs
//! those calls concurrently, and hands each caller back exactly the outcome
//! for the key it asked for.
//!
//! ## Overview
//!
//! Callers describe what they want with a request key. There are four key
//! families:
//!
//! | family                    | key                  | shared dimensions              | discriminator    |
//! |---------------------------|----------------------|--------------------------------|------------------|
//! | [`ColumnValues`]          | [`ColumnKey`]        | machine, time ranges           | column id        |
//! | [`LimitedColumnValues`]   | [`LimitedColumnKey`] | machine, time ranges, limit    | column id        |
//! | [`GroupedSums`]           | [`GroupedSumKey`]    | machine, time ranges           | group assignment |
//! | [`Metadata`]              | [`MetadataKey`]      | machine                        | lookup value     |
//!
//! Keys that share their dimensions are answered by one upstream call. Each
//! family has its own upstream client, which implements [`Fetch`] for it:
//!
//! ```
//! use std::collections::HashMap;
//! use futures::future::{BoxFuture, FutureExt};
//! use machine_loader::{CancelSignal, ColumnBatch, ColumnValues, Fetch, UpstreamError};
//!
//! struct SnapshotClient;
//!
//! impl Fetch<ColumnValues<f64>> for SnapshotClient {
//!     fn fetch<'a>(
//!         &'a self,
//!         batch: &'a ColumnBatch,
//!         _cancel: &'a CancelSignal,
//!     ) -> BoxFuture<'a, Result<HashMap<String, f64>, UpstreamError>> {
//!         async move {
//!             // One HTTP call for batch.machine_id(), batch.column_ids() and
//!             // batch.time_ranges() goes here.
//!             Ok(batch.column_ids().iter().map(|id| (id.clone(), 0.0)).collect())
//!         }
//!         .boxed()
//!     }
//! }
//! ```
//!
//! A [`Loader`] is configured with [`LoaderRules`]: a tick function and a
//! window. [`coalescing`] builds the tick function of the batch loader for a
//! family; [`deduplicating`] builds the tick function of the cache loader,
//! for upstreams that take one key per call. The window decides how long a
//! tick collects keys; the default, [`next_tick`], yields to the executor
//! once.
//!
//! ```
//! # use std::collections::HashMap;
//! # use futures::future::{BoxFuture, FutureExt};
//! # use machine_loader::{CancelSignal, ColumnBatch, ColumnValues, Fetch, UpstreamError};
//! # struct SnapshotClient;
//! # impl Fetch<ColumnValues<f64>> for SnapshotClient {
//! #     fn fetch<'a>(&'a self, batch: &'a ColumnBatch, _cancel: &'a CancelSignal)
//! #         -> BoxFuture<'a, Result<HashMap<String, f64>, UpstreamError>> {
//! #         async move {
//! #             Ok(batch.column_ids().iter().map(|id| (id.clone(), 0.0)).collect())
//! #         }.boxed()
//! #     }
//! # }
//! use std::sync::Arc;
//! use futures::{executor, future};
//! use machine_loader::{coalescing, ColumnKey, Loader, LoaderRules, TimeRange};
//!
//! let rules = LoaderRules::new(coalescing::<ColumnValues<f64>, _>(
//!     Arc::new(SnapshotClient),
//!     CancelSignal::never(),
//! ));
//! let loader = Loader::new(&rules);
//!
//! let window = vec![TimeRange::new(0, 3_600_000)];
//! let speed = loader.request(ColumnKey::new("press-7", "speed", window.clone()));
//! let temp = loader.request(ColumnKey::new("press-7", "temperature", window));
//!
//! // Both keys share one upstream call.
//! let (speed, temp) = executor::block_on(future::join(speed, temp));
//! assert_eq!(speed.into_result(), Ok(Some(0.0)));
//! assert_eq!(temp.into_result(), Ok(Some(0.0)));
//! ```
//!
//! Every request resolves to an [`Outcome`]: a value, an explicit absence,
//! or a [`LoadError`]. Outcomes are values, never panics or early returns;
//! whether an absence is an error is up to the caller.
//!
//! ## Design notes
//!
//! ### Grouping and demultiplexing
//!
//! When a tick closes, its unique keys are grouped: each key joins the batch
//! whose shared dimensions it matches, or seeds a new one. Two batches of one
//! tick never share dimensions. After the calls return, each key is matched
//! back to the one batch that *contains* it (dimensions and discriminator),
//! and its outcome is read out of that batch's response. A failed call fails
//! only the keys of its own batch.
//!
//! ### Poll-driven ticks
//!
//! All of the asynchronous work is driven by polling the [`PendingOutcome`]
//! futures. Nothing is spawned onto a runtime. Only one pending caller
//! drives a tick at a time; the others are woken when outcomes are ready, or
//! when the driving caller is dropped and one of them has to take over.
//!
//! ### Cancellation
//!
//! Every tick function takes a [`CancelSignal`]. If it fires before a tick is
//! dispatched, the whole tick fails with [`LoadError::Cancelled`]; if it
//! fires while calls are in flight, they are abandoned and their keys fail
//! with [`LoadError::Cancelled`]. Either way, every caller gets an outcome.

mod batch;
mod cancel;
mod data;
mod demux;
mod dispatch;
mod family;
mod group;
mod key;
mod loader;
mod outcome;
mod rules;
mod waiters;

pub use batch::{ColumnBatch, GroupedSumBatch, LimitedColumnBatch, MetadataBatch, RequestBatch};
pub use cancel::{cancel_pair, CancelHandle, CancelSignal, Cancelled};
pub use data::{KeySet, ValueSet};
pub use demux::{demultiplex, BatchResponse};
pub use dispatch::dispatch;
pub use family::{
    ColumnValues, Family, Fetch, GroupedSumPayload, GroupedSums, LimitedColumnValues, Metadata,
    MetadataItem,
};
pub use group::group_keys;
pub use key::{
    ColumnKey, GroupAssignment, GroupedSumKey, LimitedColumnKey, LookupKind, MetadataKey,
    TimeRange,
};
pub use loader::{Loader, PendingOutcome, TickResult};
pub use outcome::{LoadError, Outcome, UpstreamError};
pub use rules::{
    coalescing, debounce, deduplicating, next_tick, LoaderRules, Lookup, NextTick, TickFuture,
};
