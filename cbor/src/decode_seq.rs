use super::decode::*;
use std::collections::VecDeque;

type Factory<R, E> =
    Box<dyn FnMut(&mut R, u64, Option<u64>) -> Result<Option<BoxedItem<R, E>>, E> + Send>;
type OpenHook<R, E> = Box<dyn FnMut(&mut R, Option<u64>) -> Result<(), E> + Send>;
type CloseHook<R, E> = Box<dyn FnMut(&mut R, u64) -> Result<(), E> + Send>;

enum Layout<R, E> {
    Fixed(VecDeque<BoxedItem<R, E>>),
    Factory(Factory<R, E>),
}

/// An array (`D == 1`) or map (`D == 2`) whose members are parsed by
/// child items.
///
/// Children come either from a fixed list, which must match the container
/// length exactly, or from a factory called with the member index and the
/// declared member count (`None` if indefinite).  A factory returns `None`
/// when no further members are acceptable.
pub struct Container<R, E, const D: usize> {
    header: HeaderReader,
    opened: bool,
    len: Option<u64>,
    index: u64,
    layout: Layout<R, E>,
    current: Option<BoxedItem<R, E>>,
    on_open: Option<OpenHook<R, E>>,
    on_close: Option<CloseHook<R, E>>,
}

pub type Array<R, E> = Container<R, E, 1>;
pub type Map<R, E> = Container<R, E, 2>;

impl<R, E, const D: usize> Container<R, E, D> {
    fn new(layout: Layout<R, E>) -> Self {
        Self {
            header: HeaderReader::default(),
            opened: false,
            len: None,
            index: 0,
            layout,
            current: None,
            on_open: None,
            on_close: None,
        }
    }

    /// Members parsed by exactly these items, in order.  For a map, keys
    /// and values alternate.
    pub fn fixed(items: Vec<BoxedItem<R, E>>) -> Self {
        Self::new(Layout::Fixed(items.into()))
    }

    pub fn with<F>(factory: F) -> Self
    where
        F: FnMut(&mut R, u64, Option<u64>) -> Result<Option<BoxedItem<R, E>>, E> + Send + 'static,
    {
        Self::new(Layout::Factory(Box::new(factory)))
    }

    /// Called after the head is read, with the declared number of entries
    pub fn on_open<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut R, Option<u64>) -> Result<(), E> + Send + 'static,
    {
        self.on_open = Some(Box::new(f));
        self
    }

    /// Called after the last member, with the number of members parsed
    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut R, u64) -> Result<(), E> + Send + 'static,
    {
        self.on_close = Some(Box::new(f));
        self
    }

    fn type_name() -> &'static str {
        if D == 1 { "Array" } else { "Map" }
    }

    fn close(&mut self, regs: &mut R) -> Result<Progress, E>
    where
        E: From<Error>,
    {
        if let Layout::Fixed(items) = &self.layout {
            if !items.is_empty() {
                return Err(Error::MissingItems(self.index).into());
            }
        }
        if let Some(f) = &mut self.on_close {
            f(regs, self.index)?;
        }
        Ok(Progress::Complete)
    }
}

impl<R, E, const D: usize> Item<R, E> for Container<R, E, D>
where
    R: Registers,
    E: From<Error>,
{
    fn parse(&mut self, input: &mut &[u8], regs: &mut R) -> Result<Progress, E> {
        if !self.opened {
            let Some(header) = self.header.read(input, regs)? else {
                return Ok(Progress::NeedMore);
            };
            let len = match (D, header) {
                (1, Header::Array(len)) | (2, Header::Map(len)) => len,
                _ => return Err(Error::IncorrectType(Self::type_name(), header.type_name()).into()),
            };
            let members = len
                .map(|len| len.checked_mul(D as u64).ok_or(Error::IntegerOverflow))
                .transpose()?;
            if let (Layout::Fixed(items), Some(members)) = (&self.layout, members) {
                if members > items.len() as u64 {
                    return Err(Error::AdditionalItems.into());
                }
                if members < items.len() as u64 {
                    return Err(Error::MissingItems(members).into());
                }
            }
            self.len = members;
            self.opened = true;
            if let Some(f) = &mut self.on_open {
                f(regs, len)?;
            }
        }

        loop {
            if let Some(item) = self.current.as_mut() {
                if let Progress::NeedMore = item.parse(input, regs)? {
                    return Ok(Progress::NeedMore);
                }
                self.current = None;
                self.index += 1;
            }

            match self.len {
                Some(len) if self.index == len => return self.close(regs),
                Some(_) => {}
                None => {
                    let Some(&b) = input.first() else {
                        return Ok(Progress::NeedMore);
                    };
                    if b == 0xFF {
                        let data: &[u8] = *input;
                        regs.consumed(&data[..1]);
                        *input = &data[1..];
                        if D == 2 && self.index % 2 == 1 {
                            return Err(Error::PartialMap.into());
                        }
                        return self.close(regs);
                    }
                }
            }

            let next = match &mut self.layout {
                Layout::Fixed(items) => items.pop_front(),
                Layout::Factory(f) => f(regs, self.index, self.len.map(|len| len / D as u64))?,
            };
            self.current = Some(next.ok_or(Error::AdditionalItems)?);
        }
    }
}

type Selector<R, E> = Box<dyn FnOnce(&mut R) -> Result<BoxedItem<R, E>, E> + Send>;

/// An item chosen at the point it is reached, from what the registers hold
pub struct Dynamic<R, E> {
    select: Option<Selector<R, E>>,
    item: Option<BoxedItem<R, E>>,
}

impl<R, E> Dynamic<R, E> {
    pub fn new<F>(select: F) -> Self
    where
        F: FnOnce(&mut R) -> Result<BoxedItem<R, E>, E> + Send + 'static,
    {
        Self {
            select: Some(Box::new(select)),
            item: None,
        }
    }
}

impl<R, E> Item<R, E> for Dynamic<R, E>
where
    R: Registers,
    E: From<Error>,
{
    fn parse(&mut self, input: &mut &[u8], regs: &mut R) -> Result<Progress, E> {
        if let Some(select) = self.select.take() {
            self.item = Some(select(regs)?);
        }
        match self.item.as_mut() {
            Some(item) => item.parse(input, regs),
            None => Err(Error::Finished.into()),
        }
    }
}

/// An item parsed by a nested [`Parser`] with its own registers.
///
/// Bytes consumed by the nested parse are reported to the outer registers,
/// and when it completes the inner registers are handed to `f`.
pub struct Custom<RI, E, F> {
    parser: Option<Parser<RI, E>>,
    f: Option<F>,
}

impl<RI, E, F> Custom<RI, E, F> {
    pub fn new<R>(parser: Parser<RI, E>, f: F) -> Self
    where
        F: FnOnce(&mut R, RI) -> Result<(), E>,
    {
        Self {
            parser: Some(parser),
            f: Some(f),
        }
    }
}

impl<R, RI, E, F> Item<R, E> for Custom<RI, E, F>
where
    R: Registers,
    RI: Registers + Send,
    E: From<Error>,
    F: FnOnce(&mut R, RI) -> Result<(), E> + Send,
    Parser<RI, E>: Send,
{
    fn parse(&mut self, input: &mut &[u8], regs: &mut R) -> Result<Progress, E> {
        let Some(parser) = self.parser.as_mut() else {
            return Err(Error::Finished.into());
        };
        let start: &[u8] = *input;
        let progress = parser.resume(input);
        regs.consumed(&start[..start.len() - input.len()]);
        if let Progress::NeedMore = progress? {
            return Ok(Progress::NeedMore);
        }

        let (Some(parser), Some(f)) = (self.parser.take(), self.f.take()) else {
            return Err(Error::Finished.into());
        };
        f(regs, parser.into_registers())?;
        Ok(Progress::Complete)
    }
}
