use crate::batch::RequestBatch;

/// Partition `keys` into the fewest batches such that every key is
/// compatible with exactly one of them.
///
/// Keys are scanned in order; each one joins the batch sharing its
/// dimensions, or seeds a new one. Because a batch is only ever seeded when
/// no compatible batch exists, two batches never share dimensions, which is
/// what lets [`demultiplex`][crate::demux::demultiplex] assume a unique
/// match. This is `O(keys * batches)`; the number of batches is bounded by
/// the distinct dimension combinations in one tick, which is small.
pub fn group_keys<'k, B>(keys: impl IntoIterator<Item = &'k B::Key>) -> Vec<B>
where
    B: RequestBatch,
    B::Key: 'k,
{
    let mut batches: Vec<B> = Vec::new();

    for key in keys {
        match batches
            .iter()
            .position(|batch| batch.is_compatible_for_grouping(key))
        {
            Some(index) => {
                debug_assert!(
                    batches[index + 1..]
                        .iter()
                        .all(|batch| !batch.is_compatible_for_grouping(key)),
                    "two batches share the same dimensions"
                );
                batches[index].record(key);
            }
            None => batches.push(B::seed(key)),
        }
    }

    batches
}
