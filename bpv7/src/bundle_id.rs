use super::*;
use base64::prelude::*;
use std::sync::Arc;
use terra_cbor::decode::{Array, BoxedItem, Custom, Parser, Progress, Registers, Uint};
use thiserror::Error;

/// The identity of a bundle: source, creation timestamp and, for a
/// fragment, its position within the original payload
#[derive(Default, Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BundleId {
    pub source: Eid,
    pub timestamp: CreationTimestamp,
    pub fragment_info: Option<FragmentInfo>,
}

#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FragmentInfo {
    pub offset: u64,
    pub total_len: u64,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Bad bundle id key")]
    BadKey,

    #[error("Bad base64 encoding")]
    BadBase64(#[from] base64::DecodeError),

    #[error(transparent)]
    Invalid(#[from] crate::Error),
}

#[derive(Default)]
struct KeyRegisters {
    id: BundleId,
    offset: u64,
}

impl Registers for KeyRegisters {}

type KeyItem = BoxedItem<KeyRegisters, crate::Error>;

fn field(f: fn(&mut KeyRegisters, u64)) -> KeyItem {
    Box::new(Uint::new(move |r: &mut KeyRegisters, v| -> Result<(), crate::Error> {
        f(r, v);
        Ok(())
    }))
}

impl BundleId {
    /// Parse a key produced by [`BundleId::to_key`]
    pub fn from_key(k: &str, registry: &Arc<ExtensionRegistry>) -> Result<Self, Error> {
        let data = BASE64_URL_SAFE_NO_PAD.decode(k)?;
        let registry = registry.clone();
        let root = Array::with(
            move |_: &mut KeyRegisters, index, len| -> Result<Option<KeyItem>, crate::Error> {
                if !matches!(len, Some(2) | Some(4)) {
                    return Err(terra_cbor::decode::Error::IncorrectType(
                        "Bundle id array of 2 or 4 items",
                        "Array",
                    )
                    .into());
                }
                Ok(match index {
                    0 => Some(Box::new(Custom::new(
                        eid::eid_parser(&registry),
                        |r: &mut KeyRegisters, e: eid::EidRegisters| -> Result<(), crate::Error> {
                            r.id.source = e.take().map_field_err("source EID")?;
                            Ok(())
                        },
                    )) as KeyItem),
                    1 => Some(Box::new(Array::fixed(vec![
                        field(|r, t| {
                            r.id.timestamp.creation_time = (t != 0).then(|| DtnTime::new(t))
                        }),
                        field(|r, s| r.id.timestamp.sequence_number = s),
                    ])) as KeyItem),
                    2 => Some(field(|r, offset| r.offset = offset)),
                    3 => Some(field(|r, total_len| {
                        r.id.fragment_info = Some(FragmentInfo {
                            offset: r.offset,
                            total_len,
                        })
                    })),
                    _ => None,
                })
            },
        );

        let mut parser = Parser::new(Box::new(root), KeyRegisters::default());
        match parser.feed(&data)? {
            (Progress::Complete, used) if used == data.len() => Ok(parser.into_registers().id),
            _ => Err(Error::BadKey),
        }
    }

    /// A compact, URL-safe string form, stable across restarts
    pub fn to_key(&self) -> String {
        BASE64_URL_SAFE_NO_PAD.encode(if let Some(fragment_info) = &self.fragment_info {
            terra_cbor::encode::emit_array(Some(4), |array| {
                array.emit(&self.source);
                array.emit(&self.timestamp);
                array.emit(&fragment_info.offset);
                array.emit(&fragment_info.total_len);
            })
        } else {
            terra_cbor::encode::emit_array(Some(2), |array| {
                array.emit(&self.source);
                array.emit(&self.timestamp);
            })
        })
    }
}

impl core::fmt::Display for BundleId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}/{}.{}",
            self.source,
            self.timestamp.millisecs(),
            self.timestamp.sequence_number
        )?;
        if let Some(fi) = &self.fragment_info {
            write!(f, "/{}:{}", fi.offset, fi.total_len)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_round_trip() {
        let registry = Arc::new(ExtensionRegistry::new());
        for id in [
            BundleId {
                source: Eid::dtn("source", "").unwrap(),
                timestamp: CreationTimestamp::new(735_000_000_000, 7),
                fragment_info: None,
            },
            BundleId {
                source: Eid::ipn(12, 3),
                timestamp: CreationTimestamp::new(0, 99),
                fragment_info: Some(FragmentInfo {
                    offset: 1000,
                    total_len: 4000,
                }),
            },
        ] {
            let key = id.to_key();
            assert_eq!(BundleId::from_key(&key, &registry).unwrap(), id);
        }
    }

    #[test]
    fn bad_keys() {
        let registry = Arc::new(ExtensionRegistry::new());
        assert!(matches!(
            BundleId::from_key("not base64!", &registry),
            Err(Error::BadBase64(_))
        ));
        // [[1, 0]] has the wrong arity
        let key = BASE64_URL_SAFE_NO_PAD.encode(hex_literal::hex!("81820100"));
        assert!(BundleId::from_key(&key, &registry).is_err());
        // Truncated
        let key = BASE64_URL_SAFE_NO_PAD.encode(hex_literal::hex!("82820100"));
        assert!(matches!(
            BundleId::from_key(&key, &registry),
            Err(Error::BadKey)
        ));
    }
}
