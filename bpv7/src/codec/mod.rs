/*!
The BPv7 wire format.

Decoding is incremental: bytes may arrive in chunks of any size, and every
block's data is handed to the parser for its type as it is read, so a
payload goes straight into a blob.  Encoding is lazy in the same way, see
[`Chunks`].

Malformed input is rejected with an [`Error`].  A CRC that does not match is
not an error at this level: it is recorded in the `crc_check` tag of the
bundle or block, and left for the caller to act on.
*/

use super::*;

mod decode;
mod encode;

pub use decode::{BundleDecoder, DecodeOptions, StreamDecoder, parse};
pub use encode::Chunks;
