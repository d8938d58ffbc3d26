use crate::{
    batch::RequestBatch,
    family::Family,
    outcome::{LoadError, Outcome},
};

/// A finished batch paired with the result of its upstream call.
pub type BatchResponse<F> = (
    <F as Family>::Batch,
    Result<<F as Family>::Payload, LoadError>,
);

/// Produce `key`'s outcome from the responses of one tick.
///
/// The key is matched to the unique batch that contains it. If that batch's
/// call failed, the key fails with the same error; otherwise the family
/// decides how the key is found in the payload.
///
/// # Panics
///
/// Panics if no batch, or more than one batch, contains `key`. Either means
/// the grouping step produced an invalid batch set.
pub fn demultiplex<F: Family>(responses: &[BatchResponse<F>], key: &F::Key) -> Outcome<F::Value> {
    let mut matching = responses
        .iter()
        .filter(|(batch, _response)| batch.contains_key(key));

    let (batch, response) = match (matching.next(), matching.next()) {
        (Some(found), None) => found,
        (None, _) => panic!("no batch contains {:?}", key),
        (Some(_), Some(_)) => panic!("more than one batch contains {:?}", key),
    };

    match response {
        Ok(payload) => F::resolve(batch, payload, key),
        Err(err) => Outcome::Failed(err.clone()),
    }
}
