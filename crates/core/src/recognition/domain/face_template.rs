//! Versioned recognition templates and their fixed binary layout.
//!
//! Layout: magic `FTPL`, layout byte `1`, version tag (i32 LE),
//! element count (u32 LE), elements (f32 LE).

use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAGIC: &[u8; 4] = b"FTPL";
const LAYOUT: u8 = 1;
const HEADER_LEN: usize = 4 + 1 + 4 + 4;

pub const V16_DIMENSION: usize = 128;
pub const V20_DIMENSION: usize = 512;

/// Template family. The numeric tags are part of the stored format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateVersion {
    V16,
    V20,
    V20A,
    Other,
}

impl TemplateVersion {
    pub const fn tag(self) -> i32 {
        match self {
            TemplateVersion::V16 => 16,
            TemplateVersion::V20 => 20,
            TemplateVersion::V20A => -20,
            TemplateVersion::Other => -1,
        }
    }

    /// Unknown tags map to `Other`.
    pub const fn from_tag(tag: i32) -> Self {
        match tag {
            16 => TemplateVersion::V16,
            20 => TemplateVersion::V20,
            -20 => TemplateVersion::V20A,
            _ => TemplateVersion::Other,
        }
    }

    /// Payload length; `None` for `Other`, which has no fixed length.
    pub const fn dimension(self) -> Option<usize> {
        match self {
            TemplateVersion::V16 => Some(V16_DIMENSION),
            TemplateVersion::V20 | TemplateVersion::V20A => Some(V20_DIMENSION),
            TemplateVersion::Other => None,
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum TemplateError {
    #[error("template data does not start with the FTPL magic")]
    BadMagic,
    #[error("unsupported template layout {0}")]
    UnsupportedLayout(u8),
    #[error("template data truncated: expected {expected} bytes, found {found}")]
    Truncated { expected: usize, found: usize },
    #[error("{version:?} templates hold {expected} values, found {found}")]
    DimensionMismatch {
        version: TemplateVersion,
        expected: usize,
        found: usize,
    },
    #[error("template values must be finite")]
    NonFinite,
}

/// A recognition template. Fixed-size families are stored inline so their
/// length is part of the type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(into = "TemplateRecord", try_from = "TemplateRecord")]
pub enum FaceTemplate {
    V16(Box<[f32; V16_DIMENSION]>),
    V20(Box<[f32; V20_DIMENSION]>),
    V20A(Box<[f32; V20_DIMENSION]>),
    Other(Vec<f32>),
}

impl FaceTemplate {
    pub fn from_values(version: TemplateVersion, values: Vec<f32>) -> Result<Self, TemplateError> {
        if values.iter().any(|v| !v.is_finite()) {
            return Err(TemplateError::NonFinite);
        }
        let found = values.len();
        let mismatch = |expected| TemplateError::DimensionMismatch {
            version,
            expected,
            found,
        };
        Ok(match version {
            TemplateVersion::V16 => FaceTemplate::V16(
                values
                    .into_boxed_slice()
                    .try_into()
                    .map_err(|_| mismatch(V16_DIMENSION))?,
            ),
            TemplateVersion::V20 => FaceTemplate::V20(
                values
                    .into_boxed_slice()
                    .try_into()
                    .map_err(|_| mismatch(V20_DIMENSION))?,
            ),
            TemplateVersion::V20A => FaceTemplate::V20A(
                values
                    .into_boxed_slice()
                    .try_into()
                    .map_err(|_| mismatch(V20_DIMENSION))?,
            ),
            TemplateVersion::Other => FaceTemplate::Other(values),
        })
    }

    pub fn version(&self) -> TemplateVersion {
        match self {
            FaceTemplate::V16(_) => TemplateVersion::V16,
            FaceTemplate::V20(_) => TemplateVersion::V20,
            FaceTemplate::V20A(_) => TemplateVersion::V20A,
            FaceTemplate::Other(_) => TemplateVersion::Other,
        }
    }

    /// Raw template vector.
    pub fn values(&self) -> &[f32] {
        match self {
            FaceTemplate::V16(v) => &v[..],
            FaceTemplate::V20(v) | FaceTemplate::V20A(v) => &v[..],
            FaceTemplate::Other(v) => v,
        }
    }

    pub fn len(&self) -> usize {
        self.values().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values().is_empty()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let values = self.values();
        let mut out = Vec::with_capacity(HEADER_LEN + values.len() * 4);
        out.extend_from_slice(MAGIC);
        out.push(LAYOUT);
        out.extend_from_slice(&self.version().tag().to_le_bytes());
        out.extend_from_slice(&(values.len() as u32).to_le_bytes());
        for v in values {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, TemplateError> {
        if data.len() < HEADER_LEN {
            return Err(TemplateError::Truncated {
                expected: HEADER_LEN,
                found: data.len(),
            });
        }
        if &data[..4] != MAGIC {
            return Err(TemplateError::BadMagic);
        }
        if data[4] != LAYOUT {
            return Err(TemplateError::UnsupportedLayout(data[4]));
        }
        let tag = i32::from_le_bytes([data[5], data[6], data[7], data[8]]);
        let count = u32::from_le_bytes([data[9], data[10], data[11], data[12]]) as usize;
        let expected = HEADER_LEN + count * 4;
        if data.len() != expected {
            return Err(TemplateError::Truncated {
                expected,
                found: data.len(),
            });
        }
        let values = data[HEADER_LEN..]
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        Self::from_values(TemplateVersion::from_tag(tag), values)
    }
}

/// Serialized form of a [`FaceTemplate`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TemplateRecord {
    pub version: TemplateVersion,
    pub values: Vec<f32>,
}

impl From<FaceTemplate> for TemplateRecord {
    fn from(template: FaceTemplate) -> Self {
        Self {
            version: template.version(),
            values: template.values().to_vec(),
        }
    }
}

impl TryFrom<TemplateRecord> for FaceTemplate {
    type Error = TemplateError;

    fn try_from(record: TemplateRecord) -> Result<Self, Self::Error> {
        FaceTemplate::from_values(record.version, record.values)
    }
}

pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity; 0 when either vector is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut na = 0.0f64;
    let mut nb = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}
