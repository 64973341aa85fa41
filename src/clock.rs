/// Wall-clock source, seconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_seconds(&self) -> i64;
}

/// `chrono::Utc` backed clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_seconds(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}
