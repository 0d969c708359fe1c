/*!
A canonical CBOR (RFC 8949) encoder, and a toolkit of resumable item parsers
for decoding CBOR that arrives in arbitrarily segmented chunks.
*/

pub mod decode;
pub mod encode;

mod decode_seq;
