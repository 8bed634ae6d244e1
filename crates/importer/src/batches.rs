/// Split `total` leads into upload batches of at most `batch_size`.
///
/// The last batch carries the remainder. A zero `batch_size` yields a
/// single batch holding everything.
pub fn batch_sizes(total: u64, batch_size: u64) -> Vec<u64> {
    if total == 0 {
        return Vec::new();
    }
    if batch_size == 0 {
        return vec![total];
    }
    let full = total / batch_size;
    let mut sizes = vec![batch_size; full as usize];
    let rest = total % batch_size;
    if rest > 0 {
        sizes.push(rest);
    }
    sizes
}
