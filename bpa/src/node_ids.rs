use super::*;
use rand::Rng;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Node Ids must not be api endpoints")]
    ApiEndpoint,

    #[error("Node Ids must not be the Null Endpoint")]
    NullEndpoint,

    #[error("Administrative endpoints must not have a dtn demux part")]
    DtnWithDemux,

    #[error("Administrative endpoints must have ipn service number 0, not {0}")]
    IpnWithService(u64),

    #[error("No Node Ids given")]
    Empty,
}

/// The endpoints this node answers for.
///
/// The first `ipn` and first `dtn` node id are the node's administrative
/// endpoints, any other node ids are aliases the node also receives for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIds {
    ipn: Option<u64>,
    dtn: Option<Box<str>>,
    aliases: Vec<Eid>,
}

impl NodeIds {
    /// The administrative endpoint to use when talking about `destination`,
    /// in the same scheme where possible
    pub fn admin_endpoint(&self, destination: &Eid) -> Eid {
        match (destination, self.ipn, &self.dtn) {
            (Eid::Ipn { .. }, Some(node), _) => Eid::ipn(node, 0),
            (Eid::Dtn { .. }, _, Some(node_name)) | (_, None, Some(node_name)) => Eid::Dtn {
                node_name: node_name.clone(),
                demux: "".into(),
            },
            (_, Some(node), _) => Eid::ipn(node, 0),
            (_, None, None) => self.aliases.first().cloned().unwrap_or_default(),
        }
    }

    /// Every node id, administrative endpoints first
    pub fn ids(&self) -> Vec<Eid> {
        let mut v = Vec::with_capacity(2 + self.aliases.len());
        if let Some(node) = self.ipn {
            v.push(Eid::ipn(node, 0));
        }
        if let Some(node_name) = &self.dtn {
            v.push(Eid::Dtn {
                node_name: node_name.clone(),
                demux: "".into(),
            });
        }
        v.extend(self.aliases.iter().cloned());
        v
    }

    /// Is `eid` an endpoint on this node
    pub fn is_local(&self, eid: &Eid) -> bool {
        if matches!(eid, Eid::Api { .. }) {
            return true;
        }
        self.ids().iter().any(|id| id.is_authoritative_over(eid))
    }
}

impl Default for NodeIds {
    fn default() -> Self {
        Self {
            ipn: Some(rand::rng().random_range(0x40000000..=u32::MAX as u64)),
            dtn: None,
            aliases: Vec::new(),
        }
    }
}

impl TryFrom<&[Eid]> for NodeIds {
    type Error = Error;

    fn try_from(eids: &[Eid]) -> Result<Self, Self::Error> {
        let mut ipn = None;
        let mut dtn = None;
        let mut aliases = Vec::new();
        for eid in eids {
            match eid {
                Eid::Ipn { node, service: 0 } => {
                    if ipn.is_none() {
                        ipn = Some(*node);
                    } else if ipn != Some(*node) {
                        aliases.push(eid.clone());
                    }
                }
                Eid::Dtn { node_name, demux } if demux.is_empty() => {
                    if dtn.is_none() {
                        dtn = Some(node_name.clone());
                    } else if dtn.as_ref() != Some(node_name) {
                        aliases.push(eid.clone());
                    }
                }
                Eid::Cla { demux, .. } if demux.is_empty() => aliases.push(eid.clone()),
                Eid::Ipn { service, .. } => return Err(Error::IpnWithService(*service)),
                Eid::Dtn { .. } | Eid::Cla { .. } => return Err(Error::DtnWithDemux),
                Eid::Ext { .. } => aliases.push(eid.clone()),
                Eid::Null => return Err(Error::NullEndpoint),
                Eid::Api { .. } => return Err(Error::ApiEndpoint),
            }
        }
        if ipn.is_none() && dtn.is_none() && aliases.is_empty() {
            return Err(Error::Empty);
        }
        Ok(Self { ipn, dtn, aliases })
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for NodeIds {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let ids = self.ids();
        match ids.as_slice() {
            [id] => serializer.serialize_str(&id.to_string()),
            ids => serializer.collect_seq(ids.iter().map(|id| id.to_string())),
        }
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for NodeIds {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct NodeIdsVisitor;

        impl<'de> Visitor<'de> for NodeIdsVisitor {
            type Value = NodeIds;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a single EID or a sequence of EIDs")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                let eid: Eid = value.parse().map_err(E::custom)?;
                [eid].as_slice().try_into().map_err(E::custom)
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: de::SeqAccess<'de>,
            {
                let mut endpoints: Vec<Eid> = Vec::new();
                while let Some(eid) = seq.next_element::<String>()? {
                    endpoints.push(eid.parse().map_err(de::Error::custom)?);
                }
                endpoints.as_slice().try_into().map_err(de::Error::custom)
            }

            fn visit_none<E>(self) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(NodeIds::default())
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(NodeIds::default())
            }
        }

        deserializer.deserialize_any(NodeIdsVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_ids(ids: &[&str]) -> Result<NodeIds, Error> {
        let eids: Vec<Eid> = ids.iter().map(|s| s.parse().unwrap()).collect();
        eids.as_slice().try_into()
    }

    #[test]
    fn locality() {
        let ids = node_ids(&["ipn:12.0", "dtn://node/"]).unwrap();
        assert!(ids.is_local(&Eid::ipn(12, 0)));
        assert!(ids.is_local(&Eid::ipn(12, 7)));
        assert!(!ids.is_local(&Eid::ipn(13, 7)));
        assert!(ids.is_local(&Eid::dtn("node", "inbox").unwrap()));
        assert!(!ids.is_local(&Eid::dtn("other", "inbox").unwrap()));
        assert!(ids.is_local(&Eid::api("app")));
        assert!(!ids.is_local(&Eid::Null));
    }

    #[test]
    fn aliases() {
        let ids = node_ids(&["ipn:12.0", "ipn:40.0", "dtn://node/"]).unwrap();
        assert!(ids.is_local(&Eid::ipn(40, 1)));
        assert_eq!(ids.admin_endpoint(&Eid::ipn(99, 1)), Eid::ipn(12, 0));
        assert_eq!(ids.ids().len(), 3);
    }

    #[test]
    fn admin_endpoint() {
        let ids = node_ids(&["ipn:12.0", "dtn://node/"]).unwrap();
        assert_eq!(ids.admin_endpoint(&Eid::ipn(5, 1)), Eid::ipn(12, 0));
        assert_eq!(ids.admin_endpoint(&Eid::dtn("x", "y").unwrap()), Eid::dtn("node", "").unwrap());
        assert_eq!(ids.admin_endpoint(&Eid::Null), Eid::ipn(12, 0));

        let ids = node_ids(&["dtn://node/"]).unwrap();
        assert_eq!(ids.admin_endpoint(&Eid::ipn(5, 1)), Eid::dtn("node", "").unwrap());
    }

    #[test]
    fn invalid() {
        assert!(matches!(node_ids(&["ipn:12.3"]), Err(Error::IpnWithService(3))));
        assert!(matches!(node_ids(&["dtn://node/svc"]), Err(Error::DtnWithDemux)));
        assert!(matches!(node_ids(&["dtn:none"]), Err(Error::NullEndpoint)));
        assert!(matches!(node_ids(&[]), Err(Error::Empty)));
    }

    #[test]
    fn serde() {
        let ids: NodeIds = serde_json::from_str(r#""ipn:12.0""#).unwrap();
        assert_eq!(serde_json::to_string(&ids).unwrap(), r#""ipn:12.0""#);

        let ids: NodeIds = serde_json::from_str(r#"["ipn:12.0","dtn://node/"]"#).unwrap();
        assert_eq!(
            serde_json::to_string(&ids).unwrap(),
            r#"["ipn:12.0","dtn://node/"]"#
        );
    }
}
