/// Rounds `value` up to the payload alignment unit (a pair of machine words).
///
/// # Examples
///
/// ```rust
/// use segalloc::align;
///
/// match std::mem::size_of::<usize>() {
///     8 => assert_eq!(align!(13), 16), // 64 bit machine.
///     4 => assert_eq!(align!(11), 16), // 32 bit machine.
///     _ => {},
/// };
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + $crate::config::ALIGNMENT - 1) & !($crate::config::ALIGNMENT - 1)
  };
}

/// Same as [`align!`] but returns `None` instead of wrapping around `usize::MAX`.
pub(crate) fn checked_align(value: usize) -> Option<usize> {
  value
    .checked_add(crate::config::ALIGNMENT - 1)
    .map(|v| v & !(crate::config::ALIGNMENT - 1))
}

#[cfg(test)]
mod tests {
  use super::checked_align;
  use crate::config::ALIGNMENT;

  #[test]
  fn test_align() {
    let mut alignments = Vec::new();

    for i in 0..10 {
      let sizes = (ALIGNMENT * i + 1)..=(ALIGNMENT * (i + 1));

      let expected_alignment = ALIGNMENT * (i + 1);

      alignments.push((sizes, expected_alignment));
    }

    for (sizes, expected) in alignments {
      for size in sizes {
        assert_eq!(expected, align!(size));
        assert_eq!(Some(expected), checked_align(size));
      }
    }
  }

  #[test]
  fn test_align_zero_and_overflow() {
    assert_eq!(align!(0), 0);
    assert_eq!(checked_align(usize::MAX), None);

    let near_max = usize::MAX - ALIGNMENT * 2;
    let aligned = checked_align(near_max).unwrap();
    assert_eq!(aligned % ALIGNMENT, 0);
    assert!(aligned >= near_max);
  }
}
