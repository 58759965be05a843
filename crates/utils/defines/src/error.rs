use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Error(core::ffi::c_int);

impl Error {
    #[inline]
    pub fn as_isize(self) -> isize {
        self.0 as isize
    }

    #[inline]
    pub fn info(self) -> &'static str {
        errno::error_info(self.as_isize())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.info())
    }
}

impl core::error::Error for Error {}

pub type KResult<T = ()> = core::result::Result<T, Error>;

pub mod errno {
    macro_rules! declare_errno {
        ($($name:tt, $errno:literal, $desc:literal,)*) => {
            $(#[doc = $desc]
            pub const $name: super::Error = super::Error($errno);)*
            pub fn error_info(errno: isize) -> &'static str {
                match errno {
                    $($errno => ::core::concat!(stringify!($name), ", ", $desc),)*
                    _ => "UNKNOWN, Unknown error.",
                }
            }
        };
    }

    // 块设备只会用到其中很少的一部分
    #[rustfmt::skip]
    declare_errno!(
        EIO,            -5,     "I/O error.",
        ENXIO,          -6,     "No such device or address.",
        ENOMEM,         -12,    "Out of memory",
        EINVAL,         -22,    "Invalid argument.",
        ERANGE,         -34,    "Exceed range.",
        ESHUTDOWN,      -108,   "Cannot send after transport endpoint shutdown.",
    );
}
