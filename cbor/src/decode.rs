/*!
Resumable CBOR item parsers.

A parse is described by composing [`Item`]s, which consume as much of the
input as they can and report [`Progress::NeedMore`] when the input runs out
part way through a value.  The caller keeps the same items alive and feeds
the next chunk, so a value split across any number of chunks decodes the
same as one delivered whole.

State shared between items lives in a caller-defined set of registers (any
type implementing [`Registers`]), threaded through every call.  Items write
their results into the registers via callbacks, and later items may be
chosen based on what earlier ones stored.
*/
use thiserror::Error;

pub use super::decode_seq::{Array, Container, Custom, Dynamic, Map};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Not enough data for encoded value")]
    NotEnoughData,

    #[error("Invalid minor-type value {0}")]
    InvalidMinorValue(u8),

    #[error("Incorrect type, expecting {0}, found {1}")]
    IncorrectType(&'static str, &'static str),

    #[error("Integer value out of range")]
    IntegerOverflow,

    #[error("Chunked string contains an invalid chunk")]
    InvalidChunk,

    #[error("Text string is not valid UTF-8")]
    InvalidUtf8,

    #[error("Value of {0} bytes exceeds the limit of {1} bytes")]
    TooLong(u64, u64),

    #[error("Additional items after the expected end of the container")]
    AdditionalItems,

    #[error("Container ended after {0} items, more were expected")]
    MissingItems(u64),

    #[error("Map has a key with no value")]
    PartialMap,

    #[error("Break where a value was expected")]
    UnexpectedBreak,

    #[error("Parser has already completed")]
    Finished,
}

/// The outcome of feeding input to an item
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Progress {
    /// The item is complete, any remaining input belongs to what follows
    Complete,
    /// All input was consumed and the item needs more
    NeedMore,
}

/// A decoded item head
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Header {
    Unsigned(u64),
    Negative(u64),
    /// `None` for indefinite length
    Bytes(Option<u64>),
    Text(Option<u64>),
    Array(Option<u64>),
    Map(Option<u64>),
    Tag(u64),
    Simple(u8),
    Float(f64),
    Break,
}

impl Header {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Unsigned(_) => "Unsigned Integer",
            Self::Negative(_) => "Negative Integer",
            Self::Bytes(Some(_)) => "Definite-length Byte String",
            Self::Bytes(None) => "Indefinite-length Byte String",
            Self::Text(Some(_)) => "Definite-length Text String",
            Self::Text(None) => "Indefinite-length Text String",
            Self::Array(_) => "Array",
            Self::Map(_) => "Map",
            Self::Tag(_) => "Tag",
            Self::Simple(20 | 21) => "Boolean",
            Self::Simple(22) => "Null",
            Self::Simple(23) => "Undefined",
            Self::Simple(_) => "Simple Value",
            Self::Float(_) => "Float",
            Self::Break => "Break",
        }
    }
}

/// Scratch state threaded through a parse
pub trait Registers {
    /// Observes every byte as it is consumed
    fn consumed(&mut self, _data: &[u8]) {}
}

impl Registers for () {}

/// A resumable parser for one CBOR item
pub trait Item<R, E>: Send {
    fn parse(&mut self, input: &mut &[u8], regs: &mut R) -> Result<Progress, E>;
}

pub type BoxedItem<R, E> = Box<dyn Item<R, E>>;

fn take<'a, R: Registers>(input: &mut &'a [u8], n: usize, regs: &mut R) -> &'a [u8] {
    let data: &'a [u8] = *input;
    let (head, rest) = data.split_at(n);
    regs.consumed(head);
    *input = rest;
    head
}

fn consume_masked<R: Registers>(regs: &mut R, mut n: usize) {
    const ZEROS: [u8; 16] = [0; 16];
    while n > 0 {
        let k = n.min(ZEROS.len());
        regs.consumed(&ZEROS[..k]);
        n -= k;
    }
}

fn decode_header(buf: &[u8]) -> Result<Header, Error> {
    let minor = buf[0] & 0x1F;
    let val = buf[1..].iter().fold(0u64, |v, b| (v << 8) | *b as u64);
    let arg = match minor {
        0..=23 => Some(minor as u64),
        31 => None,
        _ => Some(val),
    };
    let definite = |arg: Option<u64>| arg.ok_or(Error::InvalidMinorValue(minor));
    Ok(match buf[0] >> 5 {
        0 => Header::Unsigned(definite(arg)?),
        1 => Header::Negative(definite(arg)?),
        2 => Header::Bytes(arg),
        3 => Header::Text(arg),
        4 => Header::Array(arg),
        5 => Header::Map(arg),
        6 => Header::Tag(definite(arg)?),
        _ => match minor {
            0..=23 => Header::Simple(minor),
            24 if val < 32 => return Err(Error::InvalidMinorValue(val as u8)),
            24 => Header::Simple(val as u8),
            25 => Header::Float(half::f16::from_bits(val as u16).to_f64()),
            26 => Header::Float(f32::from_bits(val as u32) as f64),
            27 => Header::Float(f64::from_bits(val)),
            _ => Header::Break,
        },
    })
}

/// Reads one item head, possibly across several chunks.  Tags are skipped.
#[derive(Debug, Default)]
pub struct HeaderReader {
    buf: [u8; 9],
    len: usize,
}

impl HeaderReader {
    pub fn read<R: Registers>(
        &mut self,
        input: &mut &[u8],
        regs: &mut R,
    ) -> Result<Option<Header>, Error> {
        loop {
            if self.len == 0 {
                if input.is_empty() {
                    return Ok(None);
                }
                self.buf[0] = take(input, 1, regs)[0];
                self.len = 1;
            }

            let need = 1 + match self.buf[0] & 0x1F {
                0..=23 | 31 => 0,
                24 => 1,
                25 => 2,
                26 => 4,
                27 => 8,
                minor => {
                    self.len = 0;
                    return Err(Error::InvalidMinorValue(minor));
                }
            };
            if self.len < need {
                let n = (need - self.len).min(input.len());
                let head = take(input, n, regs);
                self.buf[self.len..self.len + n].copy_from_slice(head);
                self.len += n;
                if self.len < need {
                    return Ok(None);
                }
            }

            self.len = 0;
            match decode_header(&self.buf[..need])? {
                Header::Tag(_) => continue,
                header => return Ok(Some(header)),
            }
        }
    }
}

pub(crate) enum StringEvent<'a> {
    Start(Option<u64>),
    Data(&'a [u8]),
    End,
    NeedMore,
}

#[derive(Clone, Copy)]
enum Chunking {
    Header,
    Definite(u64),
    ChunkHeader,
    Chunk(u64),
    Done,
}

/// Walks the content of a byte or text string, definite or chunked
pub(crate) struct StringReader {
    text: bool,
    header: HeaderReader,
    state: Chunking,
}

impl StringReader {
    pub(crate) fn new(text: bool) -> Self {
        Self {
            text,
            header: HeaderReader::default(),
            state: Chunking::Header,
        }
    }

    /// Start after a head that has already been read
    pub(crate) fn resume_after(text: bool, len: Option<u64>) -> Self {
        Self {
            text,
            header: HeaderReader::default(),
            state: match len {
                Some(len) => Chunking::Definite(len),
                None => Chunking::ChunkHeader,
            },
        }
    }

    fn expected(&self) -> &'static str {
        if self.text { "Text String" } else { "Byte String" }
    }

    fn length_of(&self, header: Header) -> Option<Option<u64>> {
        match (self.text, header) {
            (false, Header::Bytes(len)) | (true, Header::Text(len)) => Some(len),
            _ => None,
        }
    }

    pub(crate) fn next<'a, R: Registers>(
        &mut self,
        input: &mut &'a [u8],
        regs: &mut R,
        masked: bool,
    ) -> Result<StringEvent<'a>, Error> {
        loop {
            match self.state {
                Chunking::Header => {
                    let Some(header) = self.header.read(input, regs)? else {
                        return Ok(StringEvent::NeedMore);
                    };
                    let len = self
                        .length_of(header)
                        .ok_or(Error::IncorrectType(self.expected(), header.type_name()))?;
                    self.state = match len {
                        Some(len) => Chunking::Definite(len),
                        None => Chunking::ChunkHeader,
                    };
                    return Ok(StringEvent::Start(len));
                }
                Chunking::Definite(0) => {
                    self.state = Chunking::Done;
                    return Ok(StringEvent::End);
                }
                Chunking::Chunk(0) => self.state = Chunking::ChunkHeader,
                Chunking::Definite(remaining) | Chunking::Chunk(remaining) => {
                    if input.is_empty() {
                        return Ok(StringEvent::NeedMore);
                    }
                    let n = remaining.min(input.len() as u64) as usize;
                    let data: &'a [u8] = *input;
                    let (head, rest) = data.split_at(n);
                    if masked {
                        consume_masked(regs, n);
                    } else {
                        regs.consumed(head);
                    }
                    *input = rest;

                    let remaining = remaining - n as u64;
                    self.state = match self.state {
                        Chunking::Definite(_) => Chunking::Definite(remaining),
                        _ => Chunking::Chunk(remaining),
                    };
                    return Ok(StringEvent::Data(head));
                }
                Chunking::ChunkHeader => {
                    let Some(header) = self.header.read(input, regs)? else {
                        return Ok(StringEvent::NeedMore);
                    };
                    match (header, self.length_of(header)) {
                        (Header::Break, _) => {
                            self.state = Chunking::Done;
                            return Ok(StringEvent::End);
                        }
                        (_, Some(Some(len))) => self.state = Chunking::Chunk(len),
                        _ => return Err(Error::InvalidChunk),
                    }
                }
                Chunking::Done => return Err(Error::Finished),
            }
        }
    }
}

/// An unsigned integer
pub struct Uint<F> {
    header: HeaderReader,
    f: F,
}

impl<F> Uint<F> {
    pub fn new<R, E>(f: F) -> Self
    where
        F: FnMut(&mut R, u64) -> Result<(), E>,
    {
        Self {
            header: HeaderReader::default(),
            f,
        }
    }
}

impl<R, E, F> Item<R, E> for Uint<F>
where
    R: Registers,
    E: From<Error>,
    F: FnMut(&mut R, u64) -> Result<(), E> + Send,
{
    fn parse(&mut self, input: &mut &[u8], regs: &mut R) -> Result<Progress, E> {
        match self.header.read(input, regs)? {
            None => Ok(Progress::NeedMore),
            Some(Header::Unsigned(v)) => {
                (self.f)(regs, v)?;
                Ok(Progress::Complete)
            }
            Some(header) => {
                Err(Error::IncorrectType("Unsigned Integer", header.type_name()).into())
            }
        }
    }
}

/// A signed integer, either major type 0 or 1
pub struct Int<F> {
    header: HeaderReader,
    f: F,
}

impl<F> Int<F> {
    pub fn new<R, E>(f: F) -> Self
    where
        F: FnMut(&mut R, i64) -> Result<(), E>,
    {
        Self {
            header: HeaderReader::default(),
            f,
        }
    }
}

impl<R, E, F> Item<R, E> for Int<F>
where
    R: Registers,
    E: From<Error>,
    F: FnMut(&mut R, i64) -> Result<(), E> + Send,
{
    fn parse(&mut self, input: &mut &[u8], regs: &mut R) -> Result<Progress, E> {
        let v = match self.header.read(input, regs)? {
            None => return Ok(Progress::NeedMore),
            Some(Header::Unsigned(v)) => i64::try_from(v).map_err(|_| Error::IntegerOverflow)?,
            Some(Header::Negative(v)) => {
                -1 - i64::try_from(v).map_err(|_| Error::IntegerOverflow)?
            }
            Some(header) => {
                return Err(Error::IncorrectType("Integer", header.type_name()).into());
            }
        };
        (self.f)(regs, v)?;
        Ok(Progress::Complete)
    }
}

pub struct Bool<F> {
    header: HeaderReader,
    f: F,
}

impl<F> Bool<F> {
    pub fn new<R, E>(f: F) -> Self
    where
        F: FnMut(&mut R, bool) -> Result<(), E>,
    {
        Self {
            header: HeaderReader::default(),
            f,
        }
    }
}

impl<R, E, F> Item<R, E> for Bool<F>
where
    R: Registers,
    E: From<Error>,
    F: FnMut(&mut R, bool) -> Result<(), E> + Send,
{
    fn parse(&mut self, input: &mut &[u8], regs: &mut R) -> Result<Progress, E> {
        let v = match self.header.read(input, regs)? {
            None => return Ok(Progress::NeedMore),
            Some(Header::Simple(20)) => false,
            Some(Header::Simple(21)) => true,
            Some(header) => {
                return Err(Error::IncorrectType("Boolean", header.type_name()).into());
            }
        };
        (self.f)(regs, v)?;
        Ok(Progress::Complete)
    }
}

/// A byte string collected into memory, up to a length limit.
///
/// A masked string is reported to [`Registers::consumed`] as zeros, which is
/// how a CRC field is excluded from its own computation.
pub struct Bytes<F> {
    reader: StringReader,
    limit: u64,
    masked: bool,
    buf: Vec<u8>,
    f: F,
}

impl<F> Bytes<F> {
    pub fn new<R, E>(f: F) -> Self
    where
        F: FnMut(&mut R, Vec<u8>) -> Result<(), E>,
    {
        Self {
            reader: StringReader::new(false),
            limit: u64::MAX,
            masked: false,
            buf: Vec::new(),
            f,
        }
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    pub fn masked(mut self) -> Self {
        self.masked = true;
        self
    }
}

fn collect<R: Registers>(
    reader: &mut StringReader,
    buf: &mut Vec<u8>,
    limit: u64,
    masked: bool,
    input: &mut &[u8],
    regs: &mut R,
) -> Result<Progress, Error> {
    loop {
        match reader.next(input, regs, masked)? {
            StringEvent::Start(Some(len)) if len > limit => return Err(Error::TooLong(len, limit)),
            StringEvent::Start(_) => {}
            StringEvent::Data(data) => {
                let len = (buf.len() + data.len()) as u64;
                if len > limit {
                    return Err(Error::TooLong(len, limit));
                }
                buf.extend_from_slice(data);
            }
            StringEvent::End => return Ok(Progress::Complete),
            StringEvent::NeedMore => return Ok(Progress::NeedMore),
        }
    }
}

impl<R, E, F> Item<R, E> for Bytes<F>
where
    R: Registers,
    E: From<Error>,
    F: FnMut(&mut R, Vec<u8>) -> Result<(), E> + Send,
{
    fn parse(&mut self, input: &mut &[u8], regs: &mut R) -> Result<Progress, E> {
        match collect(
            &mut self.reader,
            &mut self.buf,
            self.limit,
            self.masked,
            input,
            regs,
        )? {
            Progress::NeedMore => Ok(Progress::NeedMore),
            Progress::Complete => {
                (self.f)(regs, core::mem::take(&mut self.buf))?;
                Ok(Progress::Complete)
            }
        }
    }
}

/// A text string collected into memory, up to a length limit in bytes
pub struct Text<F> {
    reader: StringReader,
    limit: u64,
    buf: Vec<u8>,
    f: F,
}

impl<F> Text<F> {
    pub fn new<R, E>(f: F) -> Self
    where
        F: FnMut(&mut R, String) -> Result<(), E>,
    {
        Self {
            reader: StringReader::new(true),
            limit: u64::MAX,
            buf: Vec::new(),
            f,
        }
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }
}

impl<R, E, F> Item<R, E> for Text<F>
where
    R: Registers,
    E: From<Error>,
    F: FnMut(&mut R, String) -> Result<(), E> + Send,
{
    fn parse(&mut self, input: &mut &[u8], regs: &mut R) -> Result<Progress, E> {
        match collect(
            &mut self.reader,
            &mut self.buf,
            self.limit,
            false,
            input,
            regs,
        )? {
            Progress::NeedMore => Ok(Progress::NeedMore),
            Progress::Complete => {
                let s = String::from_utf8(core::mem::take(&mut self.buf))
                    .map_err(|_| Error::InvalidUtf8)?;
                (self.f)(regs, s)?;
                Ok(Progress::Complete)
            }
        }
    }
}

/// Receives the content of a streamed byte string
pub trait ByteSink<R, E>: Send {
    /// Called once with the declared length, `None` if indefinite
    fn start(&mut self, regs: &mut R, len: Option<u64>) -> Result<(), E>;

    fn chunk(&mut self, regs: &mut R, data: &[u8]) -> Result<(), E>;

    fn end(&mut self, regs: &mut R) -> Result<(), E>;
}

/// A byte string of any size, handed to a [`ByteSink`] as it arrives rather
/// than collected
pub struct ByteStream<S> {
    reader: StringReader,
    sink: S,
}

impl<S> ByteStream<S> {
    pub fn new(sink: S) -> Self {
        Self {
            reader: StringReader::new(false),
            sink,
        }
    }
}

impl<R, E, S> Item<R, E> for ByteStream<S>
where
    R: Registers,
    E: From<Error>,
    S: ByteSink<R, E>,
{
    fn parse(&mut self, input: &mut &[u8], regs: &mut R) -> Result<Progress, E> {
        loop {
            match self.reader.next(input, regs, false)? {
                StringEvent::Start(len) => self.sink.start(regs, len)?,
                StringEvent::Data(data) => self.sink.chunk(regs, data)?,
                StringEvent::End => {
                    self.sink.end(regs)?;
                    return Ok(Progress::Complete);
                }
                StringEvent::NeedMore => return Ok(Progress::NeedMore),
            }
        }
    }
}

/// Any non-container value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unsigned(u64),
    Negative(u64),
    Bytes(Vec<u8>),
    Text(String),
    Bool(bool),
    Null,
    Undefined,
    Simple(u8),
    Float(f64),
}

/// Accepts any scalar value, strings are collected up to a length limit
pub struct Scalar<F> {
    header: HeaderReader,
    string: Option<StringReader>,
    limit: u64,
    buf: Vec<u8>,
    f: F,
}

impl<F> Scalar<F> {
    pub fn new<R, E>(f: F) -> Self
    where
        F: FnMut(&mut R, Value) -> Result<(), E>,
    {
        Self {
            header: HeaderReader::default(),
            string: None,
            limit: u64::MAX,
            buf: Vec::new(),
            f,
        }
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }
}

impl<R, E, F> Item<R, E> for Scalar<F>
where
    R: Registers,
    E: From<Error>,
    F: FnMut(&mut R, Value) -> Result<(), E> + Send,
{
    fn parse(&mut self, input: &mut &[u8], regs: &mut R) -> Result<Progress, E> {
        if self.string.is_none() {
            let value = match self.header.read(input, regs)? {
                None => return Ok(Progress::NeedMore),
                Some(Header::Unsigned(v)) => Value::Unsigned(v),
                Some(Header::Negative(v)) => Value::Negative(v),
                Some(Header::Simple(20)) => Value::Bool(false),
                Some(Header::Simple(21)) => Value::Bool(true),
                Some(Header::Simple(22)) => Value::Null,
                Some(Header::Simple(23)) => Value::Undefined,
                Some(Header::Simple(v)) => Value::Simple(v),
                Some(Header::Float(v)) => Value::Float(v),
                Some(Header::Bytes(len)) => {
                    self.string = Some(StringReader::resume_after(false, len));
                    Value::Null
                }
                Some(Header::Text(len)) => {
                    self.string = Some(StringReader::resume_after(true, len));
                    Value::Null
                }
                Some(Header::Break) => return Err(Error::UnexpectedBreak.into()),
                Some(header) => {
                    return Err(Error::IncorrectType("Scalar", header.type_name()).into());
                }
            };
            if self.string.is_none() {
                (self.f)(regs, value)?;
                return Ok(Progress::Complete);
            }
        }

        let Some(reader) = self.string.as_mut() else {
            return Err(Error::Finished.into());
        };
        if let Progress::NeedMore =
            collect(reader, &mut self.buf, self.limit, false, input, regs)?
        {
            return Ok(Progress::NeedMore);
        }
        let buf = core::mem::take(&mut self.buf);
        let value = if reader.text {
            Value::Text(String::from_utf8(buf).map_err(|_| Error::InvalidUtf8)?)
        } else {
            Value::Bytes(buf)
        };
        (self.f)(regs, value)?;
        Ok(Progress::Complete)
    }
}

/// A resumable parse of one top-level item, owning its registers
pub struct Parser<R, E> {
    root: BoxedItem<R, E>,
    regs: R,
    finished: bool,
}

impl<R, E> Parser<R, E>
where
    R: Registers,
    E: From<Error>,
{
    pub fn new(root: BoxedItem<R, E>, regs: R) -> Self {
        Self {
            root,
            regs,
            finished: false,
        }
    }

    /// Continue parsing, advancing `input` past the consumed bytes.
    ///
    /// After an error or completion the parser must not be resumed again.
    pub fn resume(&mut self, input: &mut &[u8]) -> Result<Progress, E> {
        if self.finished {
            return Err(Error::Finished.into());
        }
        let r = self.root.parse(input, &mut self.regs);
        if !matches!(r, Ok(Progress::NeedMore)) {
            self.finished = true;
        }
        r
    }

    /// Feed one chunk, returning the progress and the number of bytes used
    pub fn feed(&mut self, chunk: &[u8]) -> Result<(Progress, usize), E> {
        let mut input = chunk;
        let progress = self.resume(&mut input)?;
        Ok((progress, chunk.len() - input.len()))
    }

    pub fn registers(&self) -> &R {
        &self.regs
    }

    pub fn registers_mut(&mut self) -> &mut R {
        &mut self.regs
    }

    pub fn into_registers(self) -> R {
        self.regs
    }
}
