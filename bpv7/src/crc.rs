use thiserror::Error;

static X25: ::crc::Crc<u16> = ::crc::Crc::<u16>::new(&::crc::CRC_16_IBM_SDLC);
static CASTAGNOLI: ::crc::Crc<u32> = ::crc::Crc::<u32>::new(&::crc::CRC_32_ISCSI);

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid CRC Type {0}")]
    InvalidType(u64),

    #[error("Block has unexpected CRC value length {0}")]
    InvalidLength(usize),
}

#[allow(non_camel_case_types)]
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CrcType {
    #[default]
    None,
    CRC16_X25,
    CRC32_CASTAGNOLI,
}

impl CrcType {
    /// Length of the CRC value on the wire, excluding its byte string head
    pub fn value_len(&self) -> usize {
        match self {
            CrcType::None => 0,
            CrcType::CRC16_X25 => 2,
            CrcType::CRC32_CASTAGNOLI => 4,
        }
    }

    pub fn digest(&self) -> Digest {
        match self {
            CrcType::None => Digest::None,
            CrcType::CRC16_X25 => Digest::X25(X25.digest()),
            CrcType::CRC32_CASTAGNOLI => Digest::Castagnoli(CASTAGNOLI.digest()),
        }
    }
}

impl TryFrom<u64> for CrcType {
    type Error = Error;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::CRC16_X25),
            2 => Ok(Self::CRC32_CASTAGNOLI),
            v => Err(Error::InvalidType(v)),
        }
    }
}

impl From<CrcType> for u64 {
    fn from(value: CrcType) -> Self {
        match value {
            CrcType::None => 0,
            CrcType::CRC16_X25 => 1,
            CrcType::CRC32_CASTAGNOLI => 2,
        }
    }
}

impl terra_cbor::encode::ToCbor for CrcType {
    fn to_cbor(&self, encoder: &mut terra_cbor::encode::Encoder) {
        encoder.emit(&u64::from(*self))
    }
}

/// A running CRC over the bytes of one block
pub enum Digest {
    None,
    X25(::crc::Digest<'static, u16>),
    Castagnoli(::crc::Digest<'static, u32>),
}

impl Digest {
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Digest::None => {}
            Digest::X25(d) => d.update(data),
            Digest::Castagnoli(d) => d.update(data),
        }
    }

    /// The big-endian CRC value, empty for [`CrcType::None`]
    pub fn finalize(self) -> Vec<u8> {
        match self {
            Digest::None => Vec::new(),
            Digest::X25(d) => d.finalize().to_be_bytes().to_vec(),
            Digest::Castagnoli(d) => d.finalize().to_be_bytes().to_vec(),
        }
    }
}

/// Observes the bytes of a block as they are parsed, starting before the
/// CRC type is known.
///
/// Bytes seen before [`CrcTap::start`] are held back, as the CRC algorithm is
/// only decided by the block's CRC type field.  The CRC value itself must be
/// fed as zeros.
#[derive(Default)]
pub struct CrcTap {
    pending: Vec<u8>,
    digest: Option<Digest>,
}

impl CrcTap {
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.digest {
            Some(digest) => digest.update(data),
            None => self.pending.extend_from_slice(data),
        }
    }

    pub fn start(&mut self, crc_type: CrcType) {
        let mut digest = crc_type.digest();
        digest.update(&self.pending);
        self.pending = Vec::new();
        self.digest = Some(digest);
    }

    /// Compares the computed CRC against `value`
    pub fn check(&mut self, crc_type: CrcType, value: &[u8]) -> Result<bool, Error> {
        if value.len() != crc_type.value_len() {
            return Err(Error::InvalidLength(value.len()));
        }
        let Some(digest) = self.digest.take() else {
            return Ok(false);
        };
        Ok(digest.finalize() == value)
    }
}

/// Completes an encoded block whose CRC value is still to be written:
/// emits the CRC byte string head, then the value computed over the
/// whole block with the value zeroed.
pub fn append_crc_value(crc_type: CrcType, digest: &mut Digest, out: &mut Vec<u8>) {
    let len = crc_type.value_len();
    if len == 0 {
        return;
    }
    let head = 0x40 | len as u8;
    out.push(head);
    digest.update(&[head]);
    digest.update(&[0u8; 4][..len]);
    let digest = core::mem::replace(digest, Digest::None);
    out.extend_from_slice(&digest.finalize());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_values() {
        // Catalogue check values
        let mut digest = CrcType::CRC16_X25.digest();
        digest.update(b"123456789");
        assert_eq!(digest.finalize(), 0x906eu16.to_be_bytes());

        let mut digest = CrcType::CRC32_CASTAGNOLI.digest();
        digest.update(b"123456789");
        assert_eq!(digest.finalize(), 0xe3069283u32.to_be_bytes());
    }

    #[test]
    fn tap_buffers_until_started() {
        let mut tap = CrcTap::default();
        tap.update(b"1234");
        tap.start(CrcType::CRC32_CASTAGNOLI);
        tap.update(b"56789");
        assert!(tap.check(CrcType::CRC32_CASTAGNOLI, &0xe3069283u32.to_be_bytes()).unwrap());

        let mut tap = CrcTap::default();
        tap.start(CrcType::CRC16_X25);
        assert!(tap.check(CrcType::CRC16_X25, &[0, 0, 0]).is_err());
    }

    #[test]
    fn append() {
        let mut out = b"abc".to_vec();
        let mut digest = CrcType::CRC16_X25.digest();
        digest.update(&out);
        append_crc_value(CrcType::CRC16_X25, &mut digest, &mut out);
        assert_eq!(out.len(), 6);
        assert_eq!(out[3], 0x42);

        let mut tap = CrcTap::default();
        tap.start(CrcType::CRC16_X25);
        tap.update(&out[..4]);
        tap.update(&[0, 0]);
        assert!(tap.check(CrcType::CRC16_X25, &out[4..]).unwrap());
    }
}
