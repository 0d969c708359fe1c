use super::*;
use cla::ClaAddress;
use std::sync::RwLock;

#[async_trait]
pub trait RoutingTable: Send + Sync {
    /// Candidate next hops for `destination`, best first
    async fn resolve_eid(&self, destination: &Eid) -> Vec<ClaAddress>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Matches this endpoint and anything beneath it
    pub to: Eid,
    pub via: ClaAddress,
    /// Lower is preferred
    pub priority: u32,
}

/// Routes configured by hand.  A destination that is itself a CLA endpoint
/// id is routed straight to the address it carries.
#[derive(Debug, Default)]
pub struct StaticRoutes {
    routes: RwLock<Vec<Route>>,
}

impl StaticRoutes {
    pub fn add(&self, route: Route) {
        let mut routes = self.routes.write().trace_expect("Failed to lock routes");
        let at = routes.partition_point(|r| r.priority <= route.priority);
        info!("Route to {} via {} at priority {}", route.to, route.via, route.priority);
        routes.insert(at, route);
    }

    /// Removes every route to `to`
    pub fn remove(&self, to: &Eid) -> usize {
        let mut routes = self.routes.write().trace_expect("Failed to lock routes");
        let before = routes.len();
        routes.retain(|r| &r.to != to);
        before - routes.len()
    }
}

#[async_trait]
impl RoutingTable for StaticRoutes {
    async fn resolve_eid(&self, destination: &Eid) -> Vec<ClaAddress> {
        let mut next_hops: Vec<ClaAddress> =
            ClaAddress::from_eid(destination).into_iter().collect();
        for route in self
            .routes
            .read()
            .trace_expect("Failed to lock routes")
            .iter()
            .filter(|r| r.to.is_authoritative_over(destination))
        {
            if !next_hops.contains(&route.via) {
                next_hops.push(route.via.clone());
            }
        }
        next_hops
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tcp(s: &str) -> ClaAddress {
        ClaAddress::Tcp(s.parse().unwrap())
    }

    #[tokio::test]
    async fn resolve() {
        let routes = StaticRoutes::default();
        routes.add(Route {
            to: Eid::ipn(5, 0),
            via: tcp("192.0.2.5:4556"),
            priority: 10,
        });
        routes.add(Route {
            to: Eid::ipn(5, 0),
            via: tcp("192.0.2.1:4556"),
            priority: 1,
        });
        routes.add(Route {
            to: Eid::dtn("elsewhere", "").unwrap(),
            via: tcp("192.0.2.9:4556"),
            priority: 0,
        });

        assert_eq!(
            routes.resolve_eid(&Eid::ipn(5, 12)).await,
            [tcp("192.0.2.1:4556"), tcp("192.0.2.5:4556")]
        );
        assert!(routes.resolve_eid(&Eid::ipn(6, 1)).await.is_empty());
        assert_eq!(
            routes
                .resolve_eid(&"dtn://[tcp:192.0.2.7:4556]/svc".parse().unwrap())
                .await,
            [tcp("192.0.2.7:4556")]
        );

        assert_eq!(routes.remove(&Eid::ipn(5, 0)), 2);
        assert!(routes.resolve_eid(&Eid::ipn(5, 12)).await.is_empty());
    }
}
