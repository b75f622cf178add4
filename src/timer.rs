use rand::Rng;
use std::time::Duration;

use crate::config::Timings;

/// Generates a random election timeout within the configured range.
///
/// Drawn independently on every reset so followers that lose the same leader
/// at the same instant desynchronize their candidacies.
pub(crate) fn random_election_timeout(timings: &Timings) -> Duration {
    let min = timings.min_election_timeout.as_millis() as u64;
    let max = timings.max_election_timeout.as_millis() as u64;
    let mut rng = rand::thread_rng();
    Duration::from_millis(rng.gen_range(min..=max))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_stays_within_range() {
        let timings = Timings::default();
        for _ in 0..1000 {
            let t = random_election_timeout(&timings);
            assert!(t >= timings.min_election_timeout);
            assert!(t <= timings.max_election_timeout);
        }
    }
}
