use std::fmt;

use archive::Endian;

pub const S_IFMT: u32 = 0o170000;
pub const S_IFSOCK: u32 = 0o140000;
pub const S_IFLNK: u32 = 0o120000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFBLK: u32 = 0o060000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFCHR: u32 = 0o020000;
pub const S_IFIFO: u32 = 0o010000;

const S_ISUID: u32 = 0o4000;
const S_ISGID: u32 = 0o2000;
const S_ISVTX: u32 = 0o1000;

/// A raw `st_mode` word as captured on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mode(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Directory,
    Regular,
    Link,
    /// Any other `S_IFMT` value; the archive has no way to carry these.
    Other(u32),
}

impl Mode {
    pub fn kind(self) -> Kind {
        match self.0 & S_IFMT {
            S_IFDIR => Kind::Directory,
            S_IFREG => Kind::Regular,
            S_IFLNK => Kind::Link,
            x => Kind::Other(x),
        }
    }

    pub fn permissions(self) -> u32 {
        self.0 & 0o7777
    }
}

/// Renders the mode the way `ls -l` does, e.g. `drwxr-xr-x`.
impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.0 & S_IFMT {
            S_IFLNK => 'l',
            S_IFSOCK => 's',
            S_IFREG => '-',
            S_IFBLK => 'b',
            S_IFDIR => 'd',
            S_IFCHR => 'c',
            S_IFIFO => 'p',
            _ => '?',
        };
        let mut s = String::with_capacity(10);
        s.push(kind);
        for &(shift, special, set, unset) in [
            (6, S_ISUID, 's', 'S'),
            (3, S_ISGID, 's', 'S'),
            (0, S_ISVTX, 't', 'T'),
        ].iter() {
            let bits = (self.0 >> shift) & 0o7;
            s.push(if bits & 0o4 != 0 { 'r' } else { '-' });
            s.push(if bits & 0o2 != 0 { 'w' } else { '-' });
            s.push(match (bits & 0o1 != 0, self.0 & special != 0) {
                (true, true) => set,
                (false, true) => unset,
                (true, false) => 'x',
                (false, false) => '-',
            });
        }
        f.write_str(&s)
    }
}

/// An errno value recorded by the capture tool. The numbering is the device's
/// (Linux), not necessarily the host's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Errno(pub u32);

static ERRNO_NAMES: [&str; 134] = [
    "", "EPERM", "ENOENT", "ESRCH", "EINTR", "EIO", "ENXIO", "E2BIG", "ENOEXEC", "EBADF",
    "ECHILD", "EAGAIN", "ENOMEM", "EACCES", "EFAULT", "ENOTBLK", "EBUSY", "EEXIST", "EXDEV",
    "ENODEV", "ENOTDIR", "EISDIR", "EINVAL", "ENFILE", "EMFILE", "ENOTTY", "ETXTBSY", "EFBIG",
    "ENOSPC", "ESPIPE", "EROFS", "EMLINK", "EPIPE", "EDOM", "ERANGE", "EDEADLK",
    "ENAMETOOLONG", "ENOLCK", "ENOSYS", "ENOTEMPTY", "ELOOP", "", "ENOMSG", "EIDRM", "ECHRNG",
    "EL2NSYNC", "EL3HLT", "EL3RST", "ELNRNG", "EUNATCH", "ENOCSI", "EL2HLT", "EBADE", "EBADR",
    "EXFULL", "ENOANO", "EBADRQC", "EBADSLT", "", "EBFONT", "ENOSTR", "ENODATA", "ETIME",
    "ENOSR", "ENONET", "ENOPKG", "EREMOTE", "ENOLINK", "EADV", "ESRMNT", "ECOMM", "EPROTO",
    "EMULTIHOP", "EDOTDOT", "EBADMSG", "EOVERFLOW", "ENOTUNIQ", "EBADFD", "EREMCHG",
    "ELIBACC", "ELIBBAD", "ELIBSCN", "ELIBMAX", "ELIBEXEC", "EILSEQ", "ERESTART", "ESTRPIPE",
    "EUSERS", "ENOTSOCK", "EDESTADDRREQ", "EMSGSIZE", "EPROTOTYPE", "ENOPROTOOPT",
    "EPROTONOSUPPORT", "ESOCKTNOSUPPORT", "EOPNOTSUPP", "EPFNOSUPPORT", "EAFNOSUPPORT",
    "EADDRINUSE", "EADDRNOTAVAIL", "ENETDOWN", "ENETUNREACH", "ENETRESET", "ECONNABORTED",
    "ECONNRESET", "ENOBUFS", "EISCONN", "ENOTCONN", "ESHUTDOWN", "ETOOMANYREFS", "ETIMEDOUT",
    "ECONNREFUSED", "EHOSTDOWN", "EHOSTUNREACH", "EALREADY", "EINPROGRESS", "ESTALE",
    "EUCLEAN", "ENOTNAM", "ENAVAIL", "EISNAM", "EREMOTEIO", "EDQUOT", "ENOMEDIUM",
    "EMEDIUMTYPE", "ECANCELED", "ENOKEY", "EKEYEXPIRED", "EKEYREVOKED", "EKEYREJECTED",
    "EOWNERDEAD", "ENOTRECOVERABLE", "ERFKILL", "EHWPOISON",
];

impl Errno {
    pub fn name(self) -> Option<&'static str> {
        ERRNO_NAMES
            .get(self.0 as usize)
            .cloned()
            .filter(|x| !x.is_empty())
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "errno={} (maybe {})", self.0, name),
            None => write!(f, "errno={}", self.0),
        }
    }
}

/// How much of an entry the capture tool managed to record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Complete,
    /// Contents were cut short; what was captured is on disk.
    Partial(Errno),
    /// The entry could not even be stat'ed; nothing was written.
    Failed(Errno),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    /// Path relative to the archive root, `/`-separated.
    pub path: String,
    pub meta: Data,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Data {
    Regular {
        mode: Mode,
        length: u64,
    },
    Link {
        mode: Mode,
        target: Vec<u8>,
    },
    Directory {
        mode: Mode,
    },
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub index: usize,
    pub name: String,
    pub output: String,
    pub compressed: u64,
    pub raw: u64,
    pub archive: Option<Archive>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Archive {
    pub order: Endian,
    pub files: Vec<File>,
    /// Set when reconstruction was abandoned; `files` is then empty.
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(Mode(0o040755).kind(), Kind::Directory);
        assert_eq!(Mode(0o100644).kind(), Kind::Regular);
        assert_eq!(Mode(0o120777).kind(), Kind::Link);
        assert_eq!(Mode(0o020620).kind(), Kind::Other(S_IFCHR));
        assert_eq!(Mode(0o104755).permissions(), 0o4755);
    }

    #[test]
    fn filemode_strings() {
        assert_eq!(Mode(0o040755).to_string(), "drwxr-xr-x");
        assert_eq!(Mode(0o100644).to_string(), "-rw-r--r--");
        assert_eq!(Mode(0o120777).to_string(), "lrwxrwxrwx");
        assert_eq!(Mode(0o104755).to_string(), "-rwsr-xr-x");
        assert_eq!(Mode(0o102644).to_string(), "-rw-r-Sr--");
        assert_eq!(Mode(0o041777).to_string(), "drwxrwxrwt");
        assert_eq!(Mode(0o041776).to_string(), "drwxrwxrwT");
        assert_eq!(Mode(0o020620).to_string(), "crw--w----");
        assert_eq!(Mode(0o000644).to_string(), "?rw-r--r--");
    }

    #[test]
    fn errno_names() {
        assert_eq!(Errno(2).name(), Some("ENOENT"));
        assert_eq!(Errno(13).to_string(), "errno=13 (maybe EACCES)");
        assert_eq!(Errno(133).name(), Some("EHWPOISON"));
        assert_eq!(Errno(41).name(), None);
        assert_eq!(Errno(0).to_string(), "errno=0");
        assert_eq!(Errno(4096).to_string(), "errno=4096");
    }
}
