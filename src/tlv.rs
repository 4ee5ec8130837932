//! Tag-length-value framing used by the archive sections.
//!
//! ```text
//! [tag: u8][length: u32][value: length bytes] ...
//! ```
//!
//! The byte order of `length` (and of every integer carried in a value) is
//! fixed per archive and chosen by the caller.

use std::fmt;
use std::io::{self, Read, Write};
use std::marker::PhantomData;

use byteorder::{ByteOrder, WriteBytesExt};

use error::ArchiveError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Stat,
    Name,
    Data,
    Magic,
    /// Closes the current directory or file; with a 4-byte value it carries an errno.
    End,
    Unknown(u8),
}

impl Tag {
    pub fn from_u8(x: u8) -> Tag {
        match x {
            1 => Tag::Stat,
            2 => Tag::Name,
            3 => Tag::Data,
            4 => Tag::Magic,
            5 => Tag::End,
            x => Tag::Unknown(x),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Tag::Stat => 1,
            Tag::Name => 2,
            Tag::Data => 3,
            Tag::Magic => 4,
            Tag::End => 5,
            Tag::Unknown(x) => x,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Tag::Stat => f.write_str("STAT"),
            Tag::Name => f.write_str("FNAME"),
            Tag::Data => f.write_str("DATA"),
            Tag::Magic => f.write_str("MAGIC"),
            Tag::End => f.write_str("END"),
            Tag::Unknown(x) => write!(f, "tag {}", x),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub tag: Tag,
    pub value: Vec<u8>,
}

impl Record {
    pub fn new(tag: Tag, value: Vec<u8>) -> Self {
        Record { tag, value }
    }

    /// The value as a single 32-bit word, if it is exactly four bytes long.
    pub fn word<B: ByteOrder>(&self) -> Option<u32> {
        if self.value.len() == 4 {
            Some(B::read_u32(&self.value))
        } else {
            None
        }
    }
}

/// Pulls records off a reader one at a time. Running out of input exactly at a
/// record boundary ends the sequence; running out anywhere else is a framing
/// error.
pub struct Records<R, B> {
    inner: R,
    done: bool,
    order: PhantomData<B>,
}

impl<R: Read, B: ByteOrder> Records<R, B> {
    pub fn new(inner: R) -> Self {
        Records {
            inner,
            done: false,
            order: PhantomData,
        }
    }

    pub fn next_record(&mut self) -> Result<Option<Record>, ArchiveError> {
        if self.done {
            return Ok(None);
        }
        match self.read_record() {
            Ok(None) => {
                self.done = true;
                Ok(None)
            }
            Ok(Some(record)) => Ok(Some(record)),
            Err(e) => {
                self.done = true;
                Err(e)
            }
        }
    }

    fn read_record(&mut self) -> Result<Option<Record>, ArchiveError> {
        let mut tag = [0u8; 1];
        loop {
            match self.inner.read(&mut tag) {
                Ok(0) => return Ok(None),
                Ok(_) => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        let tag = Tag::from_u8(tag[0]);

        let length = self.read_exactly("length", 4)?;
        let length = B::read_u32(&length);
        let value = self.read_exactly("value", length)?;
        debug!("{} record, {} bytes", tag, length);
        Ok(Some(Record { tag, value }))
    }

    fn read_exactly(&mut self, field: &'static str, length: u32) -> Result<Vec<u8>, ArchiveError> {
        let mut buf = Vec::new();
        (&mut self.inner).take(u64::from(length)).read_to_end(&mut buf)?;
        if buf.len() as u64 != u64::from(length) {
            return Err(ArchiveError::Framing {
                field,
                expected: u64::from(length),
                actual: buf.len() as u64,
            });
        }
        Ok(buf)
    }
}

impl<R: Read, B: ByteOrder> Iterator for Records<R, B> {
    type Item = Result<Record, ArchiveError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

pub fn write_record<B: ByteOrder, W: Write>(w: &mut W, record: &Record) -> io::Result<()> {
    if record.value.len() > u32::max_value() as usize {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "record value too long"));
    }
    w.write_u8(record.tag.to_u8())?;
    w.write_u32::<B>(record.value.len() as u32)?;
    w.write_all(&record.value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{BigEndian, LittleEndian};
    use proptest::prelude::*;

    fn serialize<B: ByteOrder>(records: &[Record]) -> Vec<u8> {
        let mut out = Vec::new();
        for r in records {
            write_record::<B, _>(&mut out, r).unwrap();
        }
        out
    }

    fn parse<B: ByteOrder>(data: &[u8]) -> Result<Vec<Record>, ArchiveError> {
        Records::<_, B>::new(data).collect()
    }

    #[test]
    fn reads_magic_in_both_orders() {
        let le = [4u8, 4, 0, 0, 0, 2, 0, 0, 0];
        let be = [4u8, 0, 0, 0, 4, 0, 0, 0, 2];
        let r = parse::<LittleEndian>(&le).unwrap();
        assert_eq!(r, vec![Record::new(Tag::Magic, vec![2, 0, 0, 0])]);
        assert_eq!(r[0].word::<LittleEndian>(), Some(2));
        let r = parse::<BigEndian>(&be).unwrap();
        assert_eq!(r[0].tag, Tag::Magic);
        assert_eq!(r[0].word::<BigEndian>(), Some(2));
    }

    #[test]
    fn empty_input_is_empty_sequence() {
        assert_eq!(parse::<BigEndian>(&[]).unwrap(), vec![]);
    }

    #[test]
    fn zero_length_value() {
        let r = parse::<BigEndian>(&[5, 0, 0, 0, 0]).unwrap();
        assert_eq!(r, vec![Record::new(Tag::End, vec![])]);
        assert_eq!(r[0].word::<BigEndian>(), None);
    }

    #[test]
    fn short_length_is_framing_error() {
        match parse::<LittleEndian>(&[3, 1, 0]) {
            Err(ArchiveError::Framing { field: "length", expected: 4, actual: 2 }) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn short_value_is_framing_error() {
        let data = [3u8, 0, 0, 0, 10, b'a', b'b', b'c'];
        match parse::<BigEndian>(&data) {
            Err(ArchiveError::Framing { field: "value", expected: 10, actual: 3 }) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn stops_after_error() {
        let mut records = Records::<_, BigEndian>::new(&[3u8, 0, 0][..]);
        assert!(records.next().unwrap().is_err());
        assert!(records.next().is_none());
    }

    #[test]
    fn unknown_tags_pass_through() {
        let r = parse::<BigEndian>(&[9, 0, 0, 0, 1, 7]).unwrap();
        assert_eq!(r, vec![Record::new(Tag::Unknown(9), vec![7])]);
        assert_eq!(Tag::Unknown(9).to_string(), "tag 9");
    }

    fn arb_record() -> impl Strategy<Value = Record> {
        (any::<u8>(), prop::collection::vec(any::<u8>(), 0..32))
            .prop_map(|(tag, value)| Record::new(Tag::from_u8(tag), value))
    }

    proptest! {
        #[test]
        fn reserializing_reproduces_input(records in prop::collection::vec(arb_record(), 0..16)) {
            let le = serialize::<LittleEndian>(&records);
            prop_assert_eq!(serialize::<LittleEndian>(&parse::<LittleEndian>(&le).unwrap()), le);
            let be = serialize::<BigEndian>(&records);
            prop_assert_eq!(serialize::<BigEndian>(&parse::<BigEndian>(&be).unwrap()), be);
        }
    }
}
