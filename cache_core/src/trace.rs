use std::io::BufRead;

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{hex_digit1, multispace0, multispace1, one_of},
    combinator::{map_res, opt},
    IResult,
};
use thiserror::Error;

use crate::addr::Addr;

/// Kind of one simulated memory reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
}

/// One trace line: an operation letter and a hexadecimal address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TraceRecord {
    pub op: Operation,
    pub addr: Addr,
}

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("failed to read trace: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed trace record at line {line}: `{content}`")]
    Malformed { line: usize, content: String },
}

pub type Result<T> = std::result::Result<T, TraceError>;

fn parse_record(input: &str) -> IResult<&str, TraceRecord> {
    let (input, _) = multispace0(input)?;
    let (input, op) = one_of("rw")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, _) = opt(alt((tag("0x"), tag("0X"))))(input)?;
    let (input, addr) = map_res(hex_digit1, |d: &str| u64::from_str_radix(d, 16))(input)?;
    let (input, _) = multispace0(input)?;
    let op = match op {
        'r' => Operation::Read,
        _ => Operation::Write,
    };
    Ok((
        input,
        TraceRecord {
            op,
            addr: Addr::new(addr),
        },
    ))
}

impl TraceRecord {
    /// Parses a single non-empty trace line; the whole line must be
    /// consumed.
    pub fn parse(line: &str) -> Option<Self> {
        match parse_record(line) {
            Ok(("", record)) => Some(record),
            _ => None,
        }
    }
}

/// Streams trace records out of any buffered reader, one per line. Blank
/// lines are skipped; malformed ones surface with their line number.
pub struct TraceReader<R> {
    inner: R,
    line: usize,
    buf: String,
}

impl<R: BufRead> TraceReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            line: 0,
            buf: String::new(),
        }
    }
}

impl<R: BufRead> Iterator for TraceReader<R> {
    type Item = Result<TraceRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            self.line += 1;
            match self.inner.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {
                    let content = self.buf.trim();
                    if content.is_empty() {
                        continue;
                    }
                    return Some(TraceRecord::parse(content).ok_or_else(|| {
                        TraceError::Malformed {
                            line: self.line,
                            content: content.to_string(),
                        }
                    }));
                }
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}
