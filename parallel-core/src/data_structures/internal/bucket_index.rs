// Mapping from a flat element index to (bucket, offset) for storage made of
// doubling buckets.
//
//   bucket 0:   8 slots   elements     0 ..     7
//   bucket 1:  16 slots   elements     8 ..    23
//   bucket 2:  32 slots   elements    24 ..    55
//   ...
//   bucket i:  8 * 2^i    elements 8 * (2^i - 1) ..
//
// Shifting the index by FIRST_BUCKET_SIZE makes the bucket number the
// position of the highest set bit (minus that of FIRST_BUCKET_SIZE) and the
// offset the remaining low bits:
//
//   element 11 → pos 19 = 0b10011 → hibit 4 → bucket 1, offset 0b0011 = 3
//

/// Slots in the first bucket. Must be a power of two.
pub const FIRST_BUCKET_SIZE: usize = 8;

/// Number of buckets, enough for `FIRST_BUCKET_SIZE * (2^29 - 1)` elements.
pub const BUCKET_COUNT: usize = 29;

const FIRST_BUCKET_BIT: u32 = FIRST_BUCKET_SIZE.trailing_zeros();

/// Highest set bit of a non-zero value.
#[inline]
pub(crate) fn hibit(value: usize) -> u32 {
    debug_assert!(value != 0);
    usize::BITS - 1 - value.leading_zeros()
}

#[inline]
pub(crate) fn locate(index: usize) -> (usize, usize) {
    let pos = index + FIRST_BUCKET_SIZE;
    let hi = hibit(pos);

    ((hi - FIRST_BUCKET_BIT) as usize, pos ^ (1 << hi))
}

#[inline]
pub(crate) fn bucket_len(bucket: usize) -> usize {
    FIRST_BUCKET_SIZE << bucket
}

/// Total slots held by the first `buckets` buckets.
#[inline]
pub(crate) fn capacity_of(buckets: usize) -> usize {
    FIRST_BUCKET_SIZE * ((1 << buckets) - 1)
}

/// Number of leading buckets needed to hold `len` elements.
#[inline]
pub(crate) fn buckets_for(len: usize) -> usize {
    if len == 0 { 0 } else { locate(len - 1).0 + 1 }
}

/// Largest number of elements the bucket layout can address.
pub(crate) const MAX_CAPACITY: usize = FIRST_BUCKET_SIZE * ((1 << BUCKET_COUNT) - 1);
