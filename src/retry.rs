// Copyright 2024, The Tremor Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! retry logic for record submission

use crate::config::Behaviour;
use crate::errors::ApiError;
use log::warn;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use std::future::Future;
use std::time::Duration;

const GROWTH_RATE: f64 = 2.0;
/// no single wait is longer than this
const MAX_INTERVAL: Duration = Duration::from_secs(30);

/// Retries failed attempts up to `max_attempts` times overall, waiting `start_interval`
/// before the first retry and growing the interval by `growth_rate` after each one,
/// up to [`MAX_INTERVAL`].
/// With `randomized` the grown interval is the upper bound of a random pick.
pub(crate) struct RetryWithBackoff {
    start_interval: Duration,
    growth_rate: f64,
    max_attempts: u32,
    random: Option<SmallRng>,
}

impl RetryWithBackoff {
    pub(crate) fn new(
        start_interval: Duration,
        growth_rate: f64,
        max_attempts: u32,
        randomized: bool,
    ) -> Self {
        let random = if randomized {
            Some(SmallRng::from_entropy())
        } else {
            None
        };
        Self {
            start_interval: start_interval.min(MAX_INTERVAL),
            growth_rate,
            max_attempts,
            random,
        }
    }

    pub(crate) fn from_behaviour(behaviour: &Behaviour) -> Self {
        Self::new(
            behaviour.retry_interval,
            GROWTH_RATE,
            behaviour.max_attempts,
            behaviour.retry_jitter,
        )
    }

    /// Interval to wait before the next retry, `current` being the previous interval.
    fn next_interval(&mut self, current: Option<Duration>) -> Duration {
        match current {
            Some(interval) => {
                let interval = interval.min(MAX_INTERVAL);
                let grown = Duration::try_from_secs_f64(interval.as_secs_f64() * self.growth_rate)
                    .map_or(MAX_INTERVAL, |grown| grown.min(MAX_INTERVAL));
                if let Some(prng) = &mut self.random {
                    // interpret the grown interval as maximum growth
                    let (low, high) = if grown >= interval {
                        (interval, grown)
                    } else {
                        (grown, interval)
                    };
                    prng.gen_range(low..=high)
                } else {
                    grown
                }
            }
            None => self.start_interval,
        }
    }

    /// Runs `op` until it succeeds, fails with a non transient error or the attempts are used up.
    ///
    /// Returns the result together with the number of attempts made.
    pub(crate) async fn run<T, F, Fut>(
        &mut self,
        ctx: &str,
        mut op: F,
    ) -> (Result<T, ApiError>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt = 0;
        let mut interval = None;
        loop {
            attempt += 1;
            match op().await {
                Ok(v) => return (Ok(v), attempt),
                Err(e) if e.kind.is_transient() && attempt < self.max_attempts => {
                    let wait = self.next_interval(interval);
                    warn!(
                        "{ctx} Attempt {attempt}/{} failed: {e}. Retrying after {} ms",
                        self.max_attempts,
                        wait.as_millis()
                    );
                    interval = Some(wait);
                    tokio::time::sleep(wait).await;
                }
                Err(e) => return (Err(e), attempt),
            }
        }
    }
}
