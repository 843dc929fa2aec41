use crate::model::routing::Route;

/// Context handed to a `DecisionEngine` alongside the protocol's raw route
/// proposals. Kept separate from `ProtocolContext` since policy decisions are
/// a daemon-level concern, not something protocols themselves see.
#[derive(Debug, Clone)]
pub struct DecisionContext {
    pub router_id: u32,
    pub protocol: String,
    pub now: f64,
}

/// Seam for post-processing a protocol's route proposals before they are
/// installed into the FIB. The default wiring is a passthrough; this exists
/// so alternate policies (admin distance overrides, route dampening, traffic
/// engineering overrides) can be swapped in without touching protocol code.
pub trait DecisionEngine: Send {
    fn choose_routes(&self, ctx: &DecisionContext, routes: &[Route]) -> Vec<Route>;
}

/// Installs whatever the protocol proposed, unmodified.
pub struct PassthroughDecisionEngine;

impl DecisionEngine for PassthroughDecisionEngine {
    fn choose_routes(&self, _ctx: &DecisionContext, routes: &[Route]) -> Vec<Route> {
        routes.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_returns_routes_unchanged() {
        let engine = PassthroughDecisionEngine;
        let ctx = DecisionContext {
            router_id: 1,
            protocol: "ospf".to_string(),
            now: 0.0,
        };
        let routes = vec![Route::new_host(4, 2, 10.0, "ospf")];
        let chosen = engine.choose_routes(&ctx, &routes);
        assert_eq!(chosen, routes);
    }
}
