// Output - hardware abstraction for the latched bit register
// The real driver (a serial-in shift register behind GPIO) lives outside this
// crate; everything here talks to it through the Sink trait

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Renders the aggregated register. Called once per refresh tick from the
/// refresh task's thread; implementations handle their own interior
/// mutability and must never block the caller for long.
pub trait Sink: Send + Sync {
    fn enable(&self);
    fn disable(&self);
    fn update(&self, register: u64);
}

/// Development stand-in for the hardware driver: logs register transitions
/// as a fixed-width bit string at trace level.
pub struct ConsoleSink {
    width: u32,
    last: AtomicU64,
}

impl ConsoleSink {
    /// `width` is the channel count; it sets the printed register width.
    pub fn new(width: u32) -> Self {
        Self {
            width,
            // Not a valid register value, so the first update always logs
            last: AtomicU64::new(u64::MAX),
        }
    }
}

impl Sink for ConsoleSink {
    fn enable(&self) {
        tracing::info!("output enabled");
    }

    fn disable(&self) {
        tracing::info!("output disabled");
    }

    fn update(&self, register: u64) {
        if self.last.swap(register, Ordering::Relaxed) != register {
            tracing::trace!(
                register = format!("{register:0width$b}", width = self.width as usize),
                "register latched"
            );
        }
    }
}

/// Records what the grid forwarded, for tests and diagnostics.
#[derive(Default)]
pub struct CaptureSink {
    enabled: AtomicBool,
    register: AtomicU64,
    updates: AtomicU64,
}

impl CaptureSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn register(&self) -> u64 {
        self.register.load(Ordering::Relaxed)
    }

    pub fn update_count(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }
}

impl Sink for CaptureSink {
    fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    fn update(&self, register: u64) {
        self.register.store(register, Ordering::Relaxed);
        self.updates.fetch_add(1, Ordering::Relaxed);
    }
}

/// Forwards every call to a shared sink instance. Lets a test hold on to a
/// [`CaptureSink`] while the grid owns the boxed trait object.
impl<S: Sink + ?Sized> Sink for Arc<S> {
    fn enable(&self) {
        (**self).enable();
    }

    fn disable(&self) {
        (**self).disable();
    }

    fn update(&self, register: u64) {
        (**self).update(register);
    }
}
