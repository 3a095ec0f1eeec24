// error.rs — error taxonomy shared by the map tools
//
// Everything the tools used to treat as Com_Error(ERR_FATAL, ...) surfaces
// here as a typed value. The binary decides whether that ends the process.

use std::path::PathBuf;

use crate::q_shared::Vec3;

/// Result alias used across the map tool crates.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Capacity(#[from] CapacityError),
    #[error("no major axis for plane normal {normal:?}")]
    DegeneratePlane { normal: Vec3 },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

/// Malformed file contents. Never recoverable for the file in question.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("not an IBSP file (ident {0:#010x})")]
    BadIdent(i32),
    #[error("unsupported version {0}")]
    UnsupportedVersion(i32),
    #[error("file is {len} bytes, too short for a {need} byte header")]
    TruncatedHeader { len: usize, need: usize },
    #[error("funny lump size in {lump}: {len} is not a multiple of {size}")]
    FunnyLumpSize {
        lump: &'static str,
        len: usize,
        size: usize,
    },
    #[error("lump {lump} ({ofs}, {len}) lies outside a {file_len} byte file")]
    LumpOutOfBounds {
        lump: &'static str,
        ofs: i32,
        len: i32,
        file_len: usize,
    },
    #[error("0 repeat in compressed vis row")]
    ZeroRepeat,
    #[error("compressed vis row ended after {got} of {row} bytes")]
    VisTruncated { got: usize, row: usize },
    #[error("vis offset {offset} for cluster {cluster} lies outside the {len} byte lump")]
    BadVisOffset {
        cluster: usize,
        offset: i32,
        len: usize,
    },
    #[error("{what} index {index} out of range (count {count})")]
    BadIndex {
        what: &'static str,
        index: i64,
        count: usize,
    },
    #[error("token too long: {0:?}")]
    TokenTooLong(String),
    #[error("entity text: {0}")]
    Entity(&'static str),
}

/// An array or winding outgrew its ceiling. Signals malformed input geometry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{what}: {count} exceeds limit of {max}")]
pub struct CapacityError {
    pub what: &'static str,
    pub count: usize,
    pub max: usize,
}

impl CapacityError {
    /// `Ok(())` when `count <= max`.
    pub fn check(what: &'static str, count: usize, max: usize) -> Result<(), CapacityError> {
        if count > max {
            return Err(CapacityError { what, count, max });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_check_bounds() {
        assert!(CapacityError::check("points", 64, 64).is_ok());
        let err = CapacityError::check("points", 65, 64).unwrap_err();
        assert_eq!(err.count, 65);
        assert_eq!(err.to_string(), "points: 65 exceeds limit of 64");
    }

    #[test]
    fn format_error_converts() {
        let err: Error = FormatError::ZeroRepeat.into();
        assert!(matches!(err, Error::Format(FormatError::ZeroRepeat)));
    }

    #[test]
    fn io_error_names_path() {
        let err = Error::io(
            "maps/missing.bsp",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("maps/missing.bsp"));
    }
}
