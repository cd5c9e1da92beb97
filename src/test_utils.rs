use std::sync::{Mutex, MutexGuard};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static SBRK_LOCK: Mutex<()> = Mutex::new(());

/// Installs a global `fmt` subscriber once; later calls are no-ops.
pub fn init_tracing() {
  let _ = tracing_subscriber::registry()
    .with(tracing_subscriber::fmt::layer().with_test_writer())
    .with(EnvFilter::from_default_env())
    .try_init();
}

/// Serializes tests that move the program break.
pub fn sbrk_guard() -> MutexGuard<'static, ()> {
  SBRK_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
