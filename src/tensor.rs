//! Numeric tensors and their portable binary encoding
//!
//! Tracked arrays are stored in NumPy's NPY v1.0 layout so that any consumer
//! of the run log (Rust or otherwise) can recover dtype and shape:
//!
//! ```text
//! \x93NUMPY | major | minor | header_len (u16 LE) | header dict | raw data
//! ```
//!
//! The header is padded with spaces and terminated by `\n` so the data
//! section starts on a 64-byte boundary. Data is little-endian, C order.

use crate::{Error, Result};

const MAGIC: &[u8; 6] = b"\x93NUMPY";
const ALIGNMENT: usize = 64;

/// Element type of a [`Tensor`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// 32-bit float
    F32,
    /// 64-bit float
    F64,
    /// 32-bit signed integer
    I32,
    /// 64-bit signed integer
    I64,
    /// Unsigned byte
    U8,
    /// Boolean stored as one byte (0 or 1)
    Bool,
}

impl DType {
    /// NPY type descriptor (`<f8`, `|u1`, ...)
    #[must_use]
    pub const fn descr(self) -> &'static str {
        match self {
            Self::F32 => "<f4",
            Self::F64 => "<f8",
            Self::I32 => "<i4",
            Self::I64 => "<i8",
            Self::U8 => "|u1",
            Self::Bool => "|b1",
        }
    }

    /// Size of one element in bytes
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::F32 | Self::I32 => 4,
            Self::F64 | Self::I64 => 8,
            Self::U8 | Self::Bool => 1,
        }
    }

    /// Parse an NPY type descriptor
    #[must_use]
    pub fn from_descr(descr: &str) -> Option<Self> {
        match descr {
            "<f4" => Some(Self::F32),
            "<f8" => Some(Self::F64),
            "<i4" => Some(Self::I32),
            "<i8" => Some(Self::I64),
            "|u1" | "<u1" => Some(Self::U8),
            "|b1" => Some(Self::Bool),
            _ => None,
        }
    }
}

/// Dense n-dimensional numeric array
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tensor {
    dtype: DType,
    shape: Vec<usize>,
    data: Vec<u8>,
}

macro_rules! tensor_ctor {
    ($name:ident, $ty:ty, $dtype:expr) => {
        /// Build a tensor from row-major values.
        ///
        /// # Errors
        /// Returns error if the element count does not match `shape`
        pub fn $name(shape: Vec<usize>, values: &[$ty]) -> Result<Self> {
            let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
            Self::from_raw($dtype, shape, data)
        }
    };
}

impl Tensor {
    tensor_ctor!(from_f32, f32, DType::F32);
    tensor_ctor!(from_f64, f64, DType::F64);
    tensor_ctor!(from_i32, i32, DType::I32);
    tensor_ctor!(from_i64, i64, DType::I64);
    tensor_ctor!(from_u8, u8, DType::U8);

    /// Build a boolean tensor from row-major values.
    ///
    /// # Errors
    /// Returns error if the element count does not match `shape`
    pub fn from_bool(shape: Vec<usize>, values: &[bool]) -> Result<Self> {
        let data = values.iter().map(|&b| u8::from(b)).collect();
        Self::from_raw(DType::Bool, shape, data)
    }

    /// Build a tensor from little-endian raw bytes.
    ///
    /// # Errors
    /// Returns error if `data.len()` is not `product(shape) * dtype.size()`
    pub fn from_raw(dtype: DType, shape: Vec<usize>, data: Vec<u8>) -> Result<Self> {
        let expected = shape
            .iter()
            .try_fold(dtype.size(), |acc, &dim| acc.checked_mul(dim))
            .ok_or_else(|| {
                Error::InvalidTensor(format!("shape {shape:?} of {} overflows", dtype.descr()))
            })?;
        if data.len() != expected {
            return Err(Error::InvalidTensor(format!(
                "shape {shape:?} of {} needs {expected} bytes, got {}",
                dtype.descr(),
                data.len()
            )));
        }
        Ok(Self { dtype, shape, data })
    }

    /// Element type
    #[must_use]
    pub const fn dtype(&self) -> DType {
        self.dtype
    }

    /// Dimensions, outermost first
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of elements
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len() / self.dtype.size()
    }

    /// True if the tensor has no elements
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw little-endian element bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Widen every element to `f64`
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_f64_vec(&self) -> Vec<f64> {
        let chunks = self.data.chunks_exact(self.dtype.size());
        match self.dtype {
            DType::F32 => chunks.map(|c| f64::from(f32::from_le_bytes(le(c)))).collect(),
            DType::F64 => chunks.map(|c| f64::from_le_bytes(le(c))).collect(),
            DType::I32 => chunks.map(|c| f64::from(i32::from_le_bytes(le(c)))).collect(),
            DType::I64 => chunks.map(|c| i64::from_le_bytes(le(c)) as f64).collect(),
            DType::U8 | DType::Bool => self.data.iter().map(|&b| f64::from(b)).collect(),
        }
    }

    /// Encode as NPY v1.0 bytes.
    ///
    /// # Errors
    /// Returns error if the header does not fit the v1.0 16-bit length field
    pub fn to_npy(&self) -> Result<Vec<u8>> {
        let shape = match self.shape.as_slice() {
            [] => "()".to_string(),
            [n] => format!("({n},)"),
            dims => {
                let parts: Vec<String> = dims.iter().map(ToString::to_string).collect();
                format!("({})", parts.join(", "))
            }
        };
        let mut header = format!(
            "{{'descr': '{}', 'fortran_order': False, 'shape': {shape}, }}",
            self.dtype.descr()
        );
        // magic(6) + version(2) + len(2) + header + '\n'
        let unpadded = MAGIC.len() + 4 + header.len() + 1;
        let padding = (ALIGNMENT - unpadded % ALIGNMENT) % ALIGNMENT;
        header.extend(std::iter::repeat(' ').take(padding));
        header.push('\n');

        let header_len = u16::try_from(header.len()).map_err(|_| {
            Error::InvalidTensor(format!("NPY header too long ({} bytes)", header.len()))
        })?;

        let mut out = Vec::with_capacity(MAGIC.len() + 4 + header.len() + self.data.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&[1, 0]);
        out.extend_from_slice(&header_len.to_le_bytes());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(&self.data);
        Ok(out)
    }

    /// Decode NPY v1.0 / v2.0 bytes.
    ///
    /// # Errors
    /// Returns error on bad magic, unsupported dtype, Fortran order, or a
    /// data section that does not match the declared shape
    pub fn from_npy(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < MAGIC.len() + 4 || &bytes[..MAGIC.len()] != MAGIC {
            return Err(Error::InvalidTensor("missing NPY magic".to_string()));
        }
        let major = bytes[6];
        let (header_start, header_len) = match major {
            1 => (10, usize::from(u16::from_le_bytes([bytes[8], bytes[9]]))),
            2 if bytes.len() >= 12 => {
                let len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
                let len = usize::try_from(len)
                    .map_err(|_| Error::InvalidTensor("NPY header length overflow".to_string()))?;
                (12, len)
            }
            v => return Err(Error::InvalidTensor(format!("unsupported NPY version {v}"))),
        };
        let data_start = header_start + header_len;
        if bytes.len() < data_start {
            return Err(Error::InvalidTensor(format!(
                "NPY header length {header_len} exceeds input of {} bytes",
                bytes.len()
            )));
        }
        let header = std::str::from_utf8(&bytes[header_start..data_start])
            .map_err(|e| Error::InvalidTensor(format!("NPY header is not UTF-8: {e}")))?;

        let descr = header_field(header, "descr")
            .and_then(|rest| rest.strip_prefix('\''))
            .and_then(|rest| rest.split('\'').next())
            .ok_or_else(|| Error::InvalidTensor("NPY header missing descr".to_string()))?;
        let dtype = DType::from_descr(descr)
            .ok_or_else(|| Error::InvalidTensor(format!("unsupported dtype {descr}")))?;

        if header_field(header, "fortran_order").is_some_and(|rest| rest.starts_with("True")) {
            return Err(Error::InvalidTensor("Fortran-ordered arrays are not supported".to_string()));
        }

        let dims = header_field(header, "shape")
            .and_then(|rest| rest.strip_prefix('('))
            .and_then(|rest| rest.split(')').next())
            .ok_or_else(|| Error::InvalidTensor("NPY header missing shape".to_string()))?;
        let shape = dims
            .split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(|d| {
                d.parse::<usize>()
                    .map_err(|e| Error::InvalidTensor(format!("bad dimension '{d}': {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        Self::from_raw(dtype, shape, bytes[data_start..].to_vec())
    }
}

/// Text following `'name':` in an NPY header dict, leading spaces trimmed
fn header_field<'h>(header: &'h str, name: &str) -> Option<&'h str> {
    let needle = format!("'{name}':");
    let at = header.find(&needle)?;
    Some(header[at + needle.len()..].trim_start())
}

fn le<const N: usize>(chunk: &[u8]) -> [u8; N] {
    let mut buf = [0u8; N];
    buf.copy_from_slice(chunk);
    buf
}
