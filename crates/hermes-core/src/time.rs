//! The clock provider.
//!
//! Methods and validators read time through a [`Clock`] required from the
//! context instead of calling the system clock directly, so tests can pin
//! or move time. Production setups install [`TimeProvider::new`]; tests
//! install [`TimeProvider::fixed`].

use crate::context::Context;
use crate::error::Error;
use crate::factory::{Factory, ProviderSet};
use crate::value::ContextValue;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A per-call clock, real or pinned.
#[derive(Debug)]
pub struct Clock {
    source: Source,
}

#[derive(Debug)]
enum Source {
    Real,
    Fixed(AtomicI64),
}

impl Clock {
    /// A clock backed by the system time.
    #[must_use]
    pub fn real() -> Self {
        Self {
            source: Source::Real,
        }
    }

    /// A clock pinned to the given unix timestamp (seconds).
    #[must_use]
    pub fn fixed(unix_seconds: i64) -> Self {
        Self {
            source: Source::Fixed(AtomicI64::new(unix_seconds)),
        }
    }

    /// The current unix timestamp in seconds.
    #[must_use]
    pub fn now_unix(&self) -> i64 {
        match &self.source {
            Source::Real => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs() as i64)
                .unwrap_or_default(),
            Source::Fixed(at) => at.load(Ordering::SeqCst),
        }
    }

    /// The current time as a [`SystemTime`].
    #[must_use]
    pub fn now(&self) -> SystemTime {
        match &self.source {
            Source::Real => SystemTime::now(),
            Source::Fixed(at) => {
                let seconds = at.load(Ordering::SeqCst);
                if seconds >= 0 {
                    UNIX_EPOCH + Duration::from_secs(seconds as u64)
                } else {
                    UNIX_EPOCH - Duration::from_secs(seconds.unsigned_abs())
                }
            }
        }
    }

    /// Moves a pinned clock forward (or back). No effect on a real clock.
    pub fn advance(&self, seconds: i64) {
        if let Source::Fixed(at) = &self.source {
            at.fetch_add(seconds, Ordering::SeqCst);
        }
    }

    /// Sleeps for the given duration. A pinned clock advances instantly
    /// instead of waiting, keeping tests fast.
    pub async fn sleep(&self, duration: Duration) {
        match &self.source {
            Source::Real => tokio::time::sleep(duration).await,
            Source::Fixed(_) => self.advance(duration.as_secs() as i64),
        }
    }
}

impl ContextValue for Clock {
    const SHAREABLE: bool = true;
    const SHAREABLE_ACROSS_IMPERSONATION: bool = true;
}

/// Installs a [`Clock`] provider into the factory.
pub struct TimeProvider {
    make: Arc<dyn Fn() -> Clock + Send + Sync>,
}

impl TimeProvider {
    /// Provides the real system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with(Clock::real)
    }

    /// Provides a clock pinned to the given unix timestamp.
    #[must_use]
    pub fn fixed(unix_seconds: i64) -> Self {
        Self::with(move || Clock::fixed(unix_seconds))
    }

    /// Provides clocks built by the given closure, one per context.
    #[must_use]
    pub fn with(make: impl Fn() -> Clock + Send + Sync + 'static) -> Self {
        Self {
            make: Arc::new(make),
        }
    }

    async fn new_clock(&self, _ctx: &Context) -> Result<Arc<Clock>, Error> {
        Ok(Arc::new((self.make)()))
    }
}

impl Default for TimeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderSet for TimeProvider {
    fn register(self: Arc<Self>, factory: &mut Factory) {
        factory.bind_member(&self, TimeProvider::new_clock);
    }
}
