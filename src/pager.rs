use crate::continuation::{ContinuationFactory, ContinuationKey};

/// Sort one source's entities by `factory` and keep the first `size`.
///
/// The returned key belongs to the last kept entity and is only `Some` when the input
/// held at least `size` entities. That guess is for single-source callers; the merger
/// relies on the backend's own next cursor instead.
pub fn page<T>(
    entities: Vec<T>,
    size: usize,
    factory: &dyn ContinuationFactory<T>,
) -> (Vec<T>, Option<ContinuationKey>) {
    let full = entities.len() >= size;

    let mut keyed: Vec<(ContinuationKey, T)> =
        entities.into_iter().map(|e| (factory.key(&e), e)).collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    keyed.truncate(size);

    let continuation = if full && size > 0 {
        keyed.last().map(|(k, _)| k.clone())
    } else {
        None
    };

    (keyed.into_iter().map(|(_, e)| e).collect(), continuation)
}
