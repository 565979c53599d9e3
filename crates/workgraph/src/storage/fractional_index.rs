//! Order-key generation for sibling positioning.
//!
//! Keys are hex-encoded fractional indices: opaque strings whose
//! lexicographic order is the sibling order. The generator guarantees a
//! key strictly between its two neighbours (either side may be open) and
//! key length grows no worse than logarithmically under repeated insertion
//! at the same point. A generation failure is fatal to the caller.

use anyhow::{Context, Result};
use loro_fractional_index::FractionalIndex;

/// Generate an order key strictly between two optional neighbours.
///
/// `prev == None` means "before everything", `next == None` means "after
/// everything"; both `None` yields an initial key.
pub fn key_between(prev: Option<&str>, next: Option<&str>) -> Result<String> {
    let prev_index = prev.map(FractionalIndex::from_hex_string);
    let next_index = next.map(FractionalIndex::from_hex_string);

    let index = FractionalIndex::new(prev_index.as_ref(), next_index.as_ref())
        .context("failed to generate an order key between the given neighbours")?;

    Ok(index.to_string())
}

/// Generate `count` evenly spaced keys strictly between two optional
/// neighbours. Used when inserting whole sibling runs at once.
pub fn keys_between(prev: Option<&str>, next: Option<&str>, count: usize) -> Result<Vec<String>> {
    if count == 0 {
        return Ok(Vec::new());
    }

    let prev_index = prev.map(FractionalIndex::from_hex_string);
    let next_index = next.map(FractionalIndex::from_hex_string);

    let indices =
        FractionalIndex::generate_n_evenly(prev_index.as_ref(), next_index.as_ref(), count)
            .context("failed to generate evenly spaced order keys")?;

    Ok(indices.into_iter().map(|idx| idx.to_string()).collect())
}
