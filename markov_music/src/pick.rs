// Random selection primitives shared by the generator.
//
// `pick` is the weighted draw used at every step of the walk: a uniform
// integer in [1, total] is walked down the list in stored order. `choose_uniform`
// ignores weights entirely and is used only for seed selection.

use crate::error::ModelError;
use markov_music_prng::MarkovRng;

/// Pick one item with probability proportional to its weight.
///
/// Draws `r` uniformly in `[1, sum of weights]`, then walks the list in
/// order, returning the first item whose weight is `>= r` after the
/// preceding weights have been subtracted. Zero-weight items are never
/// picked. Fails with `EmptyDistribution` when the list is empty or all
/// weights are zero.
pub fn pick<'a, T>(
    items: &'a [T],
    weight_of: impl Fn(&T) -> u32,
    rng: &mut MarkovRng,
) -> Result<&'a T, ModelError> {
    let total: u64 = items.iter().map(|item| u64::from(weight_of(item))).sum();
    if total == 0 {
        return Err(ModelError::EmptyDistribution);
    }

    let mut remaining = rng.range_u64_inclusive(1, total);
    for item in items {
        let weight = u64::from(weight_of(item));
        if remaining <= weight {
            return Ok(item);
        }
        remaining -= weight;
    }
    // The draw never exceeds the total, so the walk always returns above.
    Err(ModelError::EmptyDistribution)
}

/// Pick one item uniformly by position.
pub fn choose_uniform<'a, T>(items: &'a [T], rng: &mut MarkovRng) -> Result<&'a T, ModelError> {
    if items.is_empty() {
        return Err(ModelError::EmptyDistribution);
    }
    Ok(&items[rng.index(items.len())])
}
