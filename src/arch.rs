use crate::result::*;

/// A checked cast from u64 to usize
///
/// Offsets and sizes are 64 bits on disk,
/// but we need them as slice indexes.
pub fn usize<I: Into<u64>>(i: I) -> AafResult<usize> {
    let i: u64 = i.into();
    ::core::primitive::usize::try_from(i).map_err(|_| AafError::InsufficientAddressSpace)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn small_values_fit() {
        assert_eq!(usize(14u64).unwrap(), 14);
        assert_eq!(usize(0u32).unwrap(), 0);
    }
}
