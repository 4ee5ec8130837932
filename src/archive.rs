//! Rebuilds the directory trees that some sections carry.
//!
//! An archive is a flat stream of TLV records (see `tlv`):
//!
//! ```text
//! MAGIC(2)
//! FNAME(name) STAT(mode)                      directory, children follow until END()
//! FNAME(name) STAT(mode) DATA(..)* END()      regular file or symlink
//! FNAME(name) STAT(mode) DATA(..)* END(errno) contents cut short
//! FNAME(name) END(errno)                      entry could not be stat'ed
//! END()                                       closes the current directory
//! ```
//!
//! Symlinks are written out as regular files holding `linkto: <target>`.

use std::fmt;
use std::fs;
use std::io::{BufWriter, Write};
use std::iter;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use error::ArchiveError;
use meta::{self, Data, Errno, Kind, Mode, Outcome};
use outdir::OutputRoot;
use tlv::{Record, Records, Tag};

pub const LITTLE_ENDIAN_SIGNATURE: [u8; 9] = [4, 4, 0, 0, 0, 2, 0, 0, 0];
pub const BIG_ENDIAN_SIGNATURE: [u8; 9] = [4, 0, 0, 0, 4, 0, 0, 0, 2];

/// The only archive version in existence.
pub const VERSION: u32 = 2;

pub const LINK_PREFIX: &[u8] = b"linkto: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    /// Recognizes an archive by the MAGIC record it starts with.
    pub fn probe(payload: &[u8]) -> Option<Endian> {
        if payload.starts_with(&LITTLE_ENDIAN_SIGNATURE) {
            Some(Endian::Little)
        } else if payload.starts_with(&BIG_ENDIAN_SIGNATURE) {
            Some(Endian::Big)
        } else {
            None
        }
    }
}

impl fmt::Display for Endian {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            Endian::Little => "LE",
            Endian::Big => "BE",
        })
    }
}

/// Recreates the tree encoded in `blob` as a new directory `root`, writing one
/// report line per entry. Entries the capture tool failed on are reported and
/// returned with their errno; every other problem aborts the whole blob.
pub fn reconstruct<W: Write>(
    blob: &[u8],
    order: Endian,
    root: &Path,
    report: &mut W,
) -> Result<Vec<meta::File>, ArchiveError> {
    match order {
        Endian::Little => Extractor::<LittleEndian, W>::new(blob, report).run(root),
        Endian::Big => Extractor::<BigEndian, W>::new(blob, report).run(root),
    }
}

enum State {
    AtEntry,
    HaveName(String),
    HaveStat(OpenFile),
}

impl State {
    fn describe(&self) -> &'static str {
        match *self {
            State::AtEntry => "between entries",
            State::HaveName(_) => "after a file name",
            State::HaveStat(_) => "inside a file body",
        }
    }
}

struct OpenFile {
    path: String,
    mode: Mode,
    out: BufWriter<fs::File>,
    length: u64,
    started: bool,
    /// Accumulated link target; `None` for regular files.
    target: Option<Vec<u8>>,
}

impl OpenFile {
    fn write(&mut self, data: &[u8]) -> Result<(), ArchiveError> {
        if let Some(ref mut target) = self.target {
            if !self.started {
                self.out.write_all(LINK_PREFIX)?;
            }
            target.extend_from_slice(data);
        }
        self.started = true;
        self.out.write_all(data)?;
        self.length += data.len() as u64;
        Ok(())
    }

    fn close(mut self, outcome: Outcome) -> Result<meta::File, ArchiveError> {
        self.out.flush()?;
        let meta = match self.target {
            Some(target) => Data::Link { mode: self.mode, target },
            None => Data::Regular { mode: self.mode, length: self.length },
        };
        Ok(meta::File { path: self.path, meta, outcome })
    }
}

struct Extractor<'a, B, W: 'a> {
    records: Records<&'a [u8], B>,
    report: &'a mut W,
    /// Names of the directories enclosing the next entry.
    tree: Vec<String>,
    files: Vec<meta::File>,
}

impl<'a, B: ByteOrder, W: Write> Extractor<'a, B, W> {
    fn new(blob: &'a [u8], report: &'a mut W) -> Self {
        Extractor {
            records: Records::new(blob),
            report,
            tree: Vec::new(),
            files: Vec::new(),
        }
    }

    fn run(mut self, root: &Path) -> Result<Vec<meta::File>, ArchiveError> {
        self.check_magic()?;
        fs::create_dir(root)?;
        let root = OutputRoot::open(root)?;

        let mut state = State::AtEntry;
        loop {
            let record = match self.records.next_record()? {
                Some(record) => record,
                None => match state {
                    State::AtEntry => break,
                    _ => return Err(ArchiveError::premature_end(state.describe())),
                },
            };
            state = match state {
                State::AtEntry => self.at_entry(record)?,
                State::HaveName(name) => self.have_name(&root, name, record)?,
                State::HaveStat(file) => self.have_stat(file, record)?,
            };
        }

        if !self.tree.is_empty() {
            warn!("archive ended inside {}", self.tree.join("/"));
        }
        Ok(self.files)
    }

    fn check_magic(&mut self) -> Result<(), ArchiveError> {
        match self.records.next_record()? {
            Some(ref r) if r.tag == Tag::Magic => match r.word::<B>() {
                Some(VERSION) => Ok(()),
                Some(v) => Err(ArchiveError::Format(format!("unsupported version {}", v))),
                None => Err(ArchiveError::Format(format!(
                    "{} byte version field",
                    r.value.len()
                ))),
            },
            Some(r) => Err(ArchiveError::Format(format!("starts with {} record", r.tag))),
            None => Err(ArchiveError::Format("empty archive".to_owned())),
        }
    }

    fn at_entry(&mut self, record: Record) -> Result<State, ArchiveError> {
        match record.tag {
            Tag::End if record.value.is_empty() => match self.tree.pop() {
                Some(dir) => {
                    debug!("leaving {}", dir);
                    Ok(State::AtEntry)
                }
                None => Err(ArchiveError::Structure {
                    found: "END record".to_owned(),
                    state: "with no open directory",
                }),
            },
            Tag::Name => Ok(State::HaveName(decode_name(record.value)?)),
            tag => Err(ArchiveError::unexpected(tag, "between entries")),
        }
    }

    fn have_name(&mut self, root: &OutputRoot, name: String, record: Record) -> Result<State, ArchiveError> {
        let path = self.compose(&name);
        match (record.tag, record.word::<B>()) {
            (Tag::End, Some(err)) => {
                let errno = Errno(err);
                writeln!(self.report, "==> ?????????? {} !!!! {}", path, errno)?;
                self.files.push(meta::File {
                    path,
                    meta: Data::Unknown,
                    outcome: Outcome::Failed(errno),
                });
                Ok(State::AtEntry)
            }
            (Tag::Stat, Some(st_mode)) => {
                let mode = Mode(st_mode);
                match mode.kind() {
                    Kind::Directory => {
                        // Created writable whatever the captured mode says.
                        self.tree.push(name);
                        root.create_dir(&self.tree)?;
                        writeln!(self.report, "==> {} {}", mode, path)?;
                        self.files.push(meta::File {
                            path,
                            meta: Data::Directory { mode },
                            outcome: Outcome::Complete,
                        });
                        Ok(State::AtEntry)
                    }
                    kind @ Kind::Regular | kind @ Kind::Link => {
                        let out = root.create_file(self.tree.iter().chain(iter::once(&name)))?;
                        Ok(State::HaveStat(OpenFile {
                            path,
                            mode,
                            out: BufWriter::new(out),
                            length: 0,
                            started: false,
                            target: if kind == Kind::Link { Some(Vec::new()) } else { None },
                        }))
                    }
                    Kind::Other(kind) => Err(ArchiveError::UnsupportedType { kind, path }),
                }
            }
            (tag, _) => Err(ArchiveError::unexpected(tag, "after a file name")),
        }
    }

    fn have_stat(&mut self, mut file: OpenFile, record: Record) -> Result<State, ArchiveError> {
        let outcome = match record.tag {
            Tag::Data => {
                file.write(&record.value)?;
                return Ok(State::HaveStat(file));
            }
            Tag::End if record.value.is_empty() => Outcome::Complete,
            Tag::End => match record.word::<B>() {
                Some(err) => Outcome::Partial(Errno(err)),
                None => return Err(ArchiveError::unexpected(Tag::End, "with a malformed errno")),
            },
            tag => return Err(ArchiveError::unexpected(tag, "inside a file body")),
        };

        let mode = file.mode;
        let file = file.close(outcome)?;
        match file.outcome {
            Outcome::Partial(errno) => writeln!(self.report, "==> {} {} !!!! {}", mode, file.path, errno)?,
            _ => writeln!(self.report, "==> {} {}", mode, file.path)?,
        }
        self.files.push(file);
        Ok(State::AtEntry)
    }

    fn compose(&self, name: &str) -> String {
        if self.tree.is_empty() {
            name.to_owned()
        } else {
            format!("{}/{}", self.tree.join("/"), name)
        }
    }
}

fn decode_name(raw: Vec<u8>) -> Result<String, ArchiveError> {
    if !raw.is_ascii() {
        return Err(ArchiveError::Decode(String::from_utf8_lossy(&raw).into_owned()));
    }
    Ok(raw.into_iter().map(char::from).collect())
}
