use std::time::Duration;

const INITIAL_MS: u64 = 20;
const FREE_LIMIT_MS: u64 = 100;
const GROWTH_LIMIT_MS: u64 = 500;

/// Delay schedule for compare-and-replace retries.
///
/// The first two attempts run immediately, later ones wait 160, 320, then 640 ms
/// per attempt from there on.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    delay_ms: u64,
}

impl Backoff {
    pub(crate) fn new() -> Self {
        Self {
            delay_ms: INITIAL_MS,
        }
    }

    /// Delay to wait before the next attempt, `None` when it may run right away.
    pub(crate) fn next_delay(&mut self) -> Option<Duration> {
        if self.delay_ms <= GROWTH_LIMIT_MS {
            self.delay_ms *= 2;
            if self.delay_ms <= FREE_LIMIT_MS {
                return None;
            }
        }
        Some(Duration::from_millis(self.delay_ms))
    }

    pub(crate) fn wait(&mut self) {
        if let Some(delay) = self.next_delay() {
            tracing::debug!(delay_ms = delay.as_millis() as u64, "backing off before retry");
            std::thread::sleep(delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_starts_free_then_doubles_to_a_cap() {
        let mut backoff = Backoff::new();
        let delays: Vec<Option<u64>> = (0..7)
            .map(|_| backoff.next_delay().map(|delay| delay.as_millis() as u64))
            .collect();
        assert_eq!(
            delays,
            vec![None, None, Some(160), Some(320), Some(640), Some(640), Some(640)]
        );
    }
}
