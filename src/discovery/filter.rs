use std::collections::HashSet;

use crate::models::Sighting;

/// Who "we" are on the air, for filtering our own broadcasts back out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfIdentity {
    /// Radio identifier of this device, when the platform exposes it.
    pub device_id: Option<String>,
    /// Current user's display token, e.g. their handle.
    pub display_token: String,
    /// Token put on the air when advertising.
    pub broadcast_token: String,
}

impl SelfIdentity {
    pub fn new(display_token: impl Into<String>) -> Self {
        let display_token = display_token.into();
        Self {
            device_id: None,
            broadcast_token: display_token.clone(),
            display_token,
        }
    }

    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn with_broadcast_token(mut self, token: impl Into<String>) -> Self {
        self.broadcast_token = token.into();
        self
    }

    /// Substring match against both the device id and the advertised name.
    /// Known to be heuristic: a peer whose name happens to contain our token is dropped too.
    pub fn matches(&self, sighting: &Sighting) -> bool {
        [self.device_id.as_deref(), Some(self.display_token.as_str())]
            .into_iter()
            .flatten()
            .filter(|needle| !needle.is_empty())
            .any(|needle| {
                sighting.device_id.contains(needle) || sighting.advertised_name.contains(needle)
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    Accepted,
    OwnBroadcast,
    Duplicate,
}

/// Per-cycle sighting gate: drops our own broadcasts and repeat reports of a device.
#[derive(Debug)]
pub struct SightingFilter {
    identity: SelfIdentity,
    seen: HashSet<String>,
}

impl SightingFilter {
    pub fn new(identity: SelfIdentity) -> Self {
        Self {
            identity,
            seen: HashSet::new(),
        }
    }

    pub fn identity(&self) -> &SelfIdentity {
        &self.identity
    }

    pub fn check(&mut self, sighting: &Sighting) -> FilterVerdict {
        if self.identity.matches(sighting) {
            return FilterVerdict::OwnBroadcast;
        }
        if !self.seen.insert(sighting.device_id.clone()) {
            return FilterVerdict::Duplicate;
        }
        FilterVerdict::Accepted
    }

    /// Forget every device seen so far; called when a new cycle starts.
    pub fn reset_cycle(&mut self) {
        self.seen.clear();
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn filter() -> SightingFilter {
        SightingFilter::new(SelfIdentity::new("maya").with_device_id("AA:BB:CC"))
    }

    #[test]
    fn repeat_report_is_dropped_until_cycle_reset() {
        let mut f = filter();
        assert_eq!(f.check(&Sighting::new("dev-1", "alice", -40)), FilterVerdict::Accepted);
        assert_eq!(f.check(&Sighting::new("dev-1", "alice", -42)), FilterVerdict::Duplicate);
        f.reset_cycle();
        assert_eq!(f.check(&Sighting::new("dev-1", "alice", -41)), FilterVerdict::Accepted);
    }

    #[test]
    fn own_device_and_own_name_are_rejected() {
        let mut f = filter();
        assert_eq!(
            f.check(&Sighting::new("AA:BB:CC", "whatever", -30)),
            FilterVerdict::OwnBroadcast
        );
        assert_eq!(
            f.check(&Sighting::new("dev-9", "maya@app", -30)),
            FilterVerdict::OwnBroadcast
        );
        // Own broadcasts do not occupy a dedup slot.
        assert_eq!(f.seen_count(), 0);
    }

    #[test]
    fn empty_identity_does_not_swallow_everything() {
        let mut f = SightingFilter::new(SelfIdentity::new(""));
        assert_eq!(f.check(&Sighting::new("dev-1", "", -50)), FilterVerdict::Accepted);
    }

    #[test]
    fn random_streams_never_emit_duplicates_or_self() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let mut f = filter();
            let mut emitted: Vec<Sighting> = Vec::new();
            for _ in 0..200 {
                let device = match rng.gen_range(0..12) {
                    0 => "AA:BB:CC".to_string(),
                    n => format!("dev-{n}"),
                };
                let name = if rng.gen_bool(0.1) { "maya".to_string() } else { format!("peer{}", rng.gen_range(0..5)) };
                let sighting = Sighting::new(device, name, rng.gen_range(-90..-30));
                if f.check(&sighting) == FilterVerdict::Accepted {
                    emitted.push(sighting);
                }
            }
            let mut ids: Vec<&str> = emitted.iter().map(|s| s.device_id.as_str()).collect();
            ids.sort_unstable();
            let before = ids.len();
            ids.dedup();
            assert_eq!(before, ids.len());
            assert!(emitted
                .iter()
                .all(|s| !s.device_id.contains("AA:BB:CC") && !s.advertised_name.contains("maya")));
        }
    }
}
