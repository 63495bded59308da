// Second-granularity countdowns: the 60s preparation window and the 5s
// auto-advance grace period both run on this.

use std::time::Duration;
use tokio::task::JoinHandle;

pub struct Countdown {
    task: JoinHandle<()>,
}

impl Countdown {
    /// Count down from `duration_secs`, invoking `on_tick` with the
    /// remaining seconds after each elapsed second and `on_expire` exactly
    /// once at zero. Cancel by dropping or calling [`Countdown::cancel`];
    /// a cancelled countdown never fires `on_expire`.
    pub fn start<T, E>(duration_secs: u32, on_tick: T, on_expire: E) -> Self
    where
        T: Fn(u32) + Send + 'static,
        E: FnOnce() + Send + 'static,
    {
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.tick().await; // first tick completes immediately
            let mut remaining = duration_secs;
            while remaining > 0 {
                interval.tick().await;
                remaining -= 1;
                on_tick(remaining);
            }
            on_expire();
        });

        Self { task }
    }

    pub fn cancel(self) {
        self.task.abort();
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.task.abort();
    }
}
