extern crate base64;
extern crate bincode;
extern crate byteorder;
extern crate clap;
extern crate env_logger;
#[macro_use]
extern crate failure;
extern crate flate2;
#[macro_use]
extern crate log;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate termion;
extern crate walkdir;
extern crate yapb;

#[cfg(test)]
extern crate proptest;
#[cfg(test)]
extern crate tempfile;

use std::fmt;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::iter;
use std::path::{Path, PathBuf};

use clap::{App, Arg};
use failure::{Error, Fail, ResultExt};
use termion::{clear, cursor};
use walkdir::WalkDir;

mod archive;
mod error;
mod meta;
mod outdir;
mod section;
mod tlv;
mod tribit;

use archive::Endian;
use outdir::OutputRoot;

type Result<T> = std::result::Result<T, Error>;

pub struct PrettyErr<'a>(&'a dyn Fail);
impl<'a> fmt::Display for PrettyErr<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)?;
        let mut x: &dyn Fail = self.0;
        while let Some(cause) = x.cause() {
            f.write_str(": ")?;
            fmt::Display::fmt(&cause, f)?;
            x = cause;
        }
        Ok(())
    }
}

pub trait ErrorExt {
    fn pretty(&self) -> PrettyErr;
}

impl ErrorExt for Error {
    fn pretty(&self) -> PrettyErr { PrettyErr(self.as_fail()) }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = App::new("supout")
        .version("0.1")
        .about("Unpacks the sections of a RouterOS supout.rif file")
        .arg(Arg::with_name("INPUT")
             .help("supout.rif file to unpack")
             .required(true))
        .arg(Arg::with_name("OUTPUT")
             .help("empty directory to unpack into [default: INPUT_contents]"))
        .arg(Arg::with_name("INDEX")
             .long("index")
             .short("i")
             .takes_value(true)
             .help("also write a catalog of every section and archive entry to this file"))
        .get_matches();

    match run(&args) {
        Ok(0) => {}
        Ok(failed) => {
            eprintln!("{} section(s) could not be unpacked", failed);
            ::std::process::exit(1);
        }
        Err(e) => {
            eprintln!("FATAL: {}", e.pretty());
            ::std::process::exit(1);
        }
    }
}

/// Unpacks every section, returning how many of them failed.
fn run<'a>(args: &clap::ArgMatches<'a>) -> Result<usize> {
    let input = args.value_of_os("INPUT").map(PathBuf::from)
        .ok_or_else(|| format_err!("no input file given"))?;
    let output = match args.value_of_os("OUTPUT") {
        Some(x) => PathBuf::from(x),
        None => {
            let mut x = input.clone().into_os_string();
            x.push("_contents");
            PathBuf::from(x)
        }
    };

    let text = fs::read_to_string(&input)
        .with_context(|_| format!("can't read {}", input.display()))?;
    let output = prepare_output(&output)?;
    let root = OutputRoot::open(&output)
        .with_context(|_| format!("failed to open {}", output.display()))?;

    let tty = termion::is_tty(&io::stdout());
    let stdout = io::stdout();
    let mut stdout = stdout.lock();

    let mut catalog = Vec::new();
    let mut failed = 0;
    for (i, body) in section::split(&text).iter().enumerate() {
        let index = i + 1;
        if tty {
            write!(stdout, "{}{}decoding section {:02}", cursor::Left(!0), clear::CurrentLine, index)?;
            stdout.flush()?;
        }
        let decoded = section::decode(body)
            .with_context(|_| format!("failed to decode section {:02}", index));
        if tty {
            write!(stdout, "{}{}", cursor::Left(!0), clear::CurrentLine)?;
        }
        let result = decoded.map_err(Error::from)
            .and_then(|s| unpack(&mut stdout, &root, index, s));
        match result {
            Ok(entry) => {
                if entry.archive.as_ref().map_or(false, |a| a.error.is_some()) {
                    failed += 1;
                }
                catalog.push(entry);
            }
            Err(e) => {
                eprintln!("ERROR: {}", e.pretty());
                failed += 1;
            }
        }
    }

    if let Some(path) = args.value_of_os("INDEX") {
        let path = Path::new(path);
        let file = fs::File::create(path)
            .with_context(|_| format!("failed to create {}", path.display()))?;
        let mut out = BufWriter::new(file);
        bincode::serialize_into(&mut out, &catalog)
            .with_context(|_| format!("failed to write {}", path.display()))?;
        out.flush()?;
    }

    let (files, bytes) = WalkDir::new(&output).into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .fold((0u64, 0u64), |(n, b), e| (n + 1, b + e.metadata().map(|m| m.len()).unwrap_or(0)));
    writeln!(stdout, "wrote {} files, {}B to {}",
             files, yapb::prefix::Binary(bytes as f64), output.display())?;

    Ok(failed)
}

/// Creates `dir` if needed and checks that it is an empty directory.
fn prepare_output(dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|_| format!("can't create {}", dir.display()))?;
    let dir = fs::canonicalize(dir).with_context(|_| format!("can't resolve {}", dir.display()))?;
    let mut entries = fs::read_dir(&dir).with_context(|_| format!("can't list {}", dir.display()))?;
    if entries.next().is_some() {
        bail!("directory {} not empty", dir.display());
    }
    Ok(dir)
}

/// Stores the payload of section number `index` and, for archives, rebuilds
/// the tree next to it. Archive failures are printed and recorded in the
/// returned entry; only failing to store the payload is an error.
fn unpack<W: Write>(out: &mut W, root: &OutputRoot, index: usize, section: section::Section) -> Result<meta::Section> {
    let name = section::output_name(index, &section.name);
    write!(out, "{:02} {}B(z) {:25} -> {}B(raw) {}",
           index,
           yapb::prefix::Binary(section.compressed as f64),
           section.name,
           yapb::prefix::Binary(section.payload.len() as f64),
           name)?;

    root.create_file(iter::once(&name))
        .and_then(|mut f| f.write_all(&section.payload).map_err(Into::into))
        .with_context(|_| format!("failed to write {}", name))?;

    let mut entry = meta::Section {
        index,
        name: section.name.clone(),
        output: name.clone(),
        compressed: section.compressed as u64,
        raw: section.payload.len() as u64,
        archive: None,
    };

    let order = match Endian::probe(&section.payload) {
        Some(order) => order,
        None => {
            writeln!(out)?;
            return Ok(entry);
        }
    };
    writeln!(out, ", archive{{{}}}", order)?;

    let contents = root.path().join(format!("{}_contents", name));
    entry.archive = Some(match archive::reconstruct(&section.payload, order, &contents, out) {
        Ok(files) => meta::Archive { order, files, error: None },
        Err(e) => {
            let e: Error = e.context(format!("failed to unpack archive {}", name)).into();
            eprintln!("ERROR: {}", e.pretty());
            meta::Archive { order, files: Vec::new(), error: Some(e.pretty().to_string()) }
        }
    });
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use bincode;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use tempfile::tempdir;

    #[test]
    fn refuses_non_empty_output() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        assert_eq!(prepare_output(&out).unwrap(), fs::canonicalize(&out).unwrap());
        fs::write(out.join("leftover"), b"x").unwrap();
        assert!(prepare_output(&out).is_err());
    }

    fn decode(name: &str, payload: &[u8]) -> section::Section {
        let mut z = ZlibEncoder::new(Vec::new(), Compression::default());
        z.write_all(payload).unwrap();
        let mut raw = name.as_bytes().to_vec();
        raw.push(0);
        raw.extend(z.finish().unwrap());
        while raw.len() % 3 != 0 {
            raw.push(0);
        }
        section::decode(&STANDARD.encode(&tribit::encode(&raw))).unwrap()
    }

    #[test]
    fn unpacks_plain_section() {
        let dir = tempdir().unwrap();
        let root = OutputRoot::open(dir.path()).unwrap();
        let mut out = Vec::new();
        let entry = unpack(&mut out, &root, 3, decode("log/messages", b"boot ok")).unwrap();
        assert_eq!(entry.output, "03_log#messages");
        assert!(entry.archive.is_none());
        assert_eq!(fs::read(dir.path().join("03_log#messages")).unwrap(), b"boot ok");
        let line = String::from_utf8(out).unwrap();
        assert!(line.contains("log/messages"));
        assert!(line.ends_with("03_log#messages\n"));
    }

    #[test]
    fn unpacks_archive_section() {
        let mut blob = archive::BIG_ENDIAN_SIGNATURE.to_vec();
        blob.extend_from_slice(&[2, 0, 0, 0, 3, b'c', b'f', b'g']);
        blob.extend_from_slice(&[1, 0, 0, 0, 4, 0, 0, 0o201, 0o244]);
        blob.extend_from_slice(&[3, 0, 0, 0, 2, b'o', b'k']);
        blob.extend_from_slice(&[5, 0, 0, 0, 0]);

        let dir = tempdir().unwrap();
        let root = OutputRoot::open(dir.path()).unwrap();
        let mut out = Vec::new();
        let entry = unpack(&mut out, &root, 1, decode("proc", &blob)).unwrap();
        let archive = entry.archive.unwrap();
        assert_eq!(archive.order, Endian::Big);
        assert!(archive.error.is_none());
        assert_eq!(archive.files.len(), 1);
        assert_eq!(fs::read(dir.path().join("01_proc")).unwrap(), blob);
        assert_eq!(fs::read(dir.path().join("01_proc_contents").join("cfg")).unwrap(), b"ok");
        let report = String::from_utf8(out).unwrap();
        assert!(report.contains(", archive{BE}\n==> -rw-r--r-- cfg\n"));
    }

    #[test]
    fn broken_archive_is_recorded() {
        let mut blob = archive::LITTLE_ENDIAN_SIGNATURE.to_vec();
        blob.extend_from_slice(&[5, 0, 0, 0, 0]);

        let dir = tempdir().unwrap();
        let root = OutputRoot::open(dir.path()).unwrap();
        let mut out = Vec::new();
        let entry = unpack(&mut out, &root, 2, decode("x", &blob)).unwrap();
        let archive = entry.archive.unwrap();
        assert!(archive.files.is_empty());
        assert!(archive.error.unwrap().contains("no open directory"));
    }

    #[test]
    fn catalog_round_trips_through_bincode() {
        let catalog = vec![meta::Section {
            index: 1,
            name: "proc".to_owned(),
            output: "01_proc".to_owned(),
            compressed: 10,
            raw: 20,
            archive: Some(meta::Archive {
                order: Endian::Little,
                files: vec![meta::File {
                    path: "a".to_owned(),
                    meta: meta::Data::Directory { mode: meta::Mode(0o040755) },
                    outcome: meta::Outcome::Complete,
                }],
                error: None,
            }),
        }];
        let bytes = bincode::serialize(&catalog).unwrap();
        let back: Vec<meta::Section> = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back[0].output, "01_proc");
        assert_eq!(back[0].archive.as_ref().unwrap().files[0].meta,
                   meta::Data::Directory { mode: meta::Mode(0o040755) });
    }
}
