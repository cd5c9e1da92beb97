/// Counters kept by the allocator. Byte figures are block sizes, overhead included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocatorStats {
  pub allocs: u64,
  pub frees: u64,
  pub reallocs: u64,
  /// Reallocations served without moving the payload.
  pub in_place_reallocs: u64,
  /// Number of successful provider growths, including the initial chunk.
  pub heap_extensions: u64,
  pub live_bytes: usize,
  pub peak_live_bytes: usize,
}

impl AllocatorStats {
  pub const fn new() -> Self {
    Self {
      allocs: 0,
      frees: 0,
      reallocs: 0,
      in_place_reallocs: 0,
      heap_extensions: 0,
      live_bytes: 0,
      peak_live_bytes: 0,
    }
  }

  pub fn update_peak(&mut self) {
    if self.live_bytes > self.peak_live_bytes {
      self.peak_live_bytes = self.live_bytes;
    }
  }

  /// Share of `heap_size` held by live blocks.
  pub fn utilization(
    &self,
    heap_size: usize,
  ) -> f64 {
    if heap_size == 0 {
      0.0
    } else {
      self.live_bytes as f64 / heap_size as f64
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_peak_and_utilization() {
    let mut stats = AllocatorStats::new();
    assert_eq!(stats.utilization(0), 0.0);

    stats.live_bytes = 512;
    stats.update_peak();
    stats.live_bytes = 256;
    stats.update_peak();

    assert_eq!(stats.peak_live_bytes, 512);
    assert_eq!(stats.utilization(1024), 0.25);
  }
}
