use core::fmt;

/// Errors returned by the PCAPNG codec and PHY primitive codec.
#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// A block or primitive specified an invalid length value, or was too short.
    InvalidLength,

    /// Invalid value supplied for a field (e.g. an out-of-range channel number).
    InvalidValue,

    /// Unexpectedly reached EOF while reading or writing data.
    ///
    /// Returned when the caller tries to fit too much data into a fixed-size buffer, and also
    /// when reaching EOF prematurely while reading data from a buffer.
    Eof,

    /// Parsing didn't consume the entire buffer.
    IncompleteParse,

    /// A PCAPNG block type was not one of SHB/IDB/EPB.
    UnknownBlockType,

    /// A PHY primitive's `type` byte did not match any known SAP primitive.
    UnknownPrimitiveType,

    /// A PLME-GET/SET primitive referenced an attribute outside `phy_pib_attr`.
    UnknownAttribute,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Error::InvalidLength => "invalid length value specified",
            Error::InvalidValue => "invalid value for field",
            Error::Eof => "end of buffer",
            Error::IncompleteParse => "excess data in buffer",
            Error::UnknownBlockType => "unrecognized pcapng block type",
            Error::UnknownPrimitiveType => "unrecognized phy primitive type",
            Error::UnknownAttribute => "unrecognized phy pib attribute",
        })
    }
}
