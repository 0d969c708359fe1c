use super::*;
use std::sync::Arc;
use terra_cbor::decode::{
    Array, BoxedItem, Dynamic, Item, Parser, Registers, Scalar, Text, Uint, Value,
};
use terra_cbor::encode::{Encoder, ToCbor};

impl ToCbor for Eid {
    fn to_cbor(&self, encoder: &mut Encoder) {
        encoder.emit_array(Some(2), |a| match self {
            Eid::Null => {
                a.emit(&DTN_IANA);
                a.emit(&0u64);
            }
            Eid::Ipn { node, service } => {
                a.emit(&IPN_IANA);
                a.emit_array(Some(2), |a| {
                    a.emit(node);
                    a.emit(service);
                });
            }
            eid => {
                a.emit(&eid.iana());
                a.emit(eid.ssp().as_str());
            }
        })
    }
}

#[derive(Default)]
pub(crate) struct EidRegisters {
    iana: u64,
    node: u64,
    pub eid: Option<Eid>,
}

impl Registers for EidRegisters {}

impl EidRegisters {
    pub fn take(self) -> Result<Eid, crate::Error> {
        self.eid
            .ok_or(terra_cbor::decode::Error::MissingItems(1).into())
    }
}

type EidItem = BoxedItem<EidRegisters, crate::Error>;

fn boxed<I: Item<EidRegisters, crate::Error> + 'static>(item: I) -> EidItem {
    Box::new(item)
}

fn ssp_item(iana: u64, registry: Arc<ExtensionRegistry>) -> Result<EidItem, crate::Error> {
    match iana {
        DTN_IANA => Ok(boxed(
            Scalar::new(move |r: &mut EidRegisters, v: Value| -> Result<(), crate::Error> {
                r.eid = Some(match v {
                    Value::Unsigned(0) => Eid::Null,
                    Value::Text(ssp) => registry.eid_from_ssp("dtn", &ssp)?,
                    _ => return Err(Error::malformed("dtn", "expected 0 or a text string").into()),
                });
                Ok(())
            })
            .with_limit(MAX_SSP_LEN),
        )),
        IPN_IANA => Ok(boxed(Array::fixed(vec![
            boxed(Uint::new(|r: &mut EidRegisters, node| {
                r.node = node;
                Ok::<_, crate::Error>(())
            })),
            boxed(Uint::new(|r: &mut EidRegisters, service| -> Result<(), crate::Error> {
                if r.node == 0 && service != 0 {
                    return Err(Error::malformed("ipn", "node number 0 has no services").into());
                }
                r.eid = Some(Eid::ipn(r.node, service));
                Ok(())
            })),
        ]))),
        iana => {
            let scheme = registry
                .eid_scheme(iana)
                .ok_or(Error::UnknownIanaNumber(iana))?
                .to_string();
            Ok(boxed(
                Text::new(move |r: &mut EidRegisters, ssp: String| -> Result<(), crate::Error> {
                    r.eid = Some(registry.eid_from_ssp(&scheme, &ssp)?);
                    Ok(())
                })
                .with_limit(MAX_SSP_LEN),
            ))
        }
    }
}

/// A resumable parser for one wire-encoded EID, `[scheme, ssp]`
pub(crate) fn eid_parser(registry: &Arc<ExtensionRegistry>) -> Parser<EidRegisters, crate::Error> {
    let registry = registry.clone();
    let root = Array::fixed(vec![
        boxed(Uint::new(|r: &mut EidRegisters, iana| {
            r.iana = iana;
            Ok::<_, crate::Error>(())
        })),
        boxed(Dynamic::new(move |r: &mut EidRegisters| {
            ssp_item(r.iana, registry)
        })),
    ]);
    Parser::new(boxed(root), EidRegisters::default())
}

impl ExtensionRegistry {
    /// Decode a complete wire-encoded EID
    pub fn eid_from_cbor(self: &Arc<Self>, data: &[u8]) -> Result<Eid, crate::Error> {
        let mut parser = eid_parser(self);
        match parser.feed(data)? {
            (terra_cbor::decode::Progress::NeedMore, _) => {
                Err(terra_cbor::decode::Error::NotEnoughData.into())
            }
            (_, used) if used != data.len() => Err(crate::Error::AdditionalData),
            _ => parser.into_registers().take(),
        }
    }
}
