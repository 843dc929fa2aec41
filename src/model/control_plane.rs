#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExchangePolicy {
    pub periodic_interval_s: Option<f64>,
    pub min_trigger_spacing_s: f64,
}

impl ExchangePolicy {
    pub fn periodic(interval_s: f64) -> Self {
        Self {
            periodic_interval_s: Some(interval_s.max(0.0)),
            min_trigger_spacing_s: 0.0,
        }
    }

    pub fn hybrid(interval_s: f64, min_trigger_spacing_s: f64) -> Self {
        Self {
            periodic_interval_s: Some(interval_s.max(0.0)),
            min_trigger_spacing_s: min_trigger_spacing_s.max(0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExchangeState {
    last_periodic_at: f64,
    last_triggered_at: f64,
}

impl Default for ExchangeState {
    fn default() -> Self {
        Self {
            last_periodic_at: -1e9,
            last_triggered_at: -1e9,
        }
    }
}

impl ExchangeState {
    pub fn periodic_due(&mut self, now: f64, policy: ExchangePolicy) -> bool {
        let Some(interval_s) = policy.periodic_interval_s else {
            return false;
        };
        if (now - self.last_periodic_at) < interval_s {
            return false;
        }
        self.last_periodic_at = now;
        true
    }

    pub fn trigger_due(&mut self, now: f64, policy: ExchangePolicy) -> bool {
        if (now - self.last_triggered_at) < policy.min_trigger_spacing_s {
            return false;
        }
        self.last_triggered_at = now;
        true
    }

    pub fn mark_periodic(&mut self, now: f64) {
        self.last_periodic_at = now;
    }

    pub fn mark_triggered(&mut self, now: f64) {
        self.last_triggered_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_state_gates_periodic_and_trigger() {
        let mut state = ExchangeState::default();
        let policy = ExchangePolicy::hybrid(3.0, 1.0);

        assert!(state.periodic_due(0.0, policy));
        assert!(!state.periodic_due(2.0, policy));
        assert!(state.periodic_due(3.1, policy));

        assert!(state.trigger_due(5.0, policy));
        assert!(!state.trigger_due(5.5, policy));
        assert!(state.trigger_due(6.1, policy));
    }
}
