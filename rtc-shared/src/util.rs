/// Guard band used around the 16-bit wraparound point, 1% of the sequence space.
pub const SEQ_ROUND_GUARD: u16 = 655;

/// Reports whether sequence number `a` is the same as or follows `b` in
/// transmission order.
///
/// Plain numeric order is used away from the wrap point. When `b` sits in the
/// top guard band and `a` in the bottom one, `a` is taken to have wrapped past
/// 0xFFFF and is newer.
pub fn is_newer_seq(a: u16, b: u16) -> bool {
    (a >= b && (b >= SEQ_ROUND_GUARD || a <= u16::MAX - SEQ_ROUND_GUARD))
        || (a <= SEQ_ROUND_GUARD && b >= u16::MAX - SEQ_ROUND_GUARD)
}

/// Number of sequence steps from `b` forward to `a`.
pub fn seq_gap(a: u16, b: u16) -> u16 {
    a.wrapping_sub(b)
}

/// Reports whether the 32-bit timestamp `a` is at or after `b`, treating
/// differences under 2^31 as forward distance.
pub fn ts_at_or_after(a: u32, b: u32) -> bool {
    a.wrapping_sub(b) < 1 << 31
}

/// Reports whether `seq` lies inside the inclusive window `[begin, end]`,
/// following the window across the 16-bit wrap point.
pub fn seq_in_window(seq: u16, begin: u16, end: u16) -> bool {
    seq.wrapping_sub(begin) <= end.wrapping_sub(begin)
}
