use std::fmt;

use vole_core::error::{Error, Result};
use vole_core::{DType, MemoryDesc, MemoryFormat};
use vole_conv::Algorithm;

/// Sizes of one convolution case.
///
/// `padh`/`padw` are the nominal (left) paddings; the harness derives the
/// right padding that makes `oh`/`ow` come out exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConvSizes {
    pub mb: usize,
    pub ng: usize,
    pub ic: usize,
    pub ih: usize,
    pub iw: usize,
    pub oc: usize,
    pub oh: usize,
    pub ow: usize,
    pub kh: usize,
    pub kw: usize,
    pub padh: usize,
    pub padw: usize,
    pub strh: usize,
    pub strw: usize,
}

impl fmt::Display for ConvSizes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mb{}g{}ic{}ih{}iw{}oc{}oh{}ow{}kh{}kw{}ph{}pw{}sh{}sw{}",
            self.mb,
            self.ng,
            self.ic,
            self.ih,
            self.iw,
            self.oc,
            self.oh,
            self.ow,
            self.kh,
            self.kw,
            self.padh,
            self.padw,
            self.strh,
            self.strw
        )
    }
}

/// Physical formats of the three operands.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConvFormats {
    pub src: MemoryFormat,
    pub weights: MemoryFormat,
    pub dst: MemoryFormat,
}

impl ConvFormats {
    pub fn new(src: MemoryFormat, weights: MemoryFormat, dst: MemoryFormat) -> Self {
        ConvFormats { src, weights, dst }
    }

    /// Row-major formats; grouped weights carry a leading group axis.
    pub fn dense(grouped: bool) -> Self {
        let weights = if grouped {
            MemoryFormat::Goihw
        } else {
            MemoryFormat::Oihw
        };
        ConvFormats::new(MemoryFormat::Nchw, weights, MemoryFormat::Nchw)
    }
}

impl fmt::Display for ConvFormats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.src, self.weights, self.dst)
    }
}

/// One verification case: sizes, formats and the algorithm to request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvCase {
    pub name: String,
    pub sizes: ConvSizes,
    pub formats: ConvFormats,
    pub algorithm: Algorithm,
}

impl ConvCase {
    pub fn new(name: impl Into<String>, sizes: ConvSizes, formats: ConvFormats) -> Self {
        ConvCase {
            name: name.into(),
            sizes,
            formats,
            algorithm: Algorithm::Direct,
        }
    }

    /// Case with row-major formats.
    pub fn dense(name: impl Into<String>, sizes: ConvSizes) -> Self {
        let formats = ConvFormats::dense(sizes.ng > 1);
        Self::new(name, sizes, formats)
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_formats(mut self, formats: ConvFormats) -> Self {
        self.formats = formats;
        self
    }

    /// `[mb, ic, ih, iw]`
    pub fn src_desc(&self) -> Result<MemoryDesc> {
        let s = &self.sizes;
        MemoryDesc::new(
            (s.mb, s.ic, s.ih, s.iw),
            DType::F32,
            self.formats.src.clone(),
        )
    }

    /// `[ng, oc/ng, ic/ng, kh, kw]` when grouped, else `[oc, ic, kh, kw]`.
    pub fn weights_desc(&self) -> Result<MemoryDesc> {
        let s = &self.sizes;
        if s.ng == 0 {
            return Err(Error::InvalidGroups {
                groups: 0,
                channels: s.ic,
                role: "input",
            });
        }
        let format = self.formats.weights.clone();
        if s.ng > 1 {
            MemoryDesc::new(
                (s.ng, s.oc / s.ng, s.ic / s.ng, s.kh, s.kw),
                DType::F32,
                format,
            )
        } else {
            MemoryDesc::new((s.oc, s.ic, s.kh, s.kw), DType::F32, format)
        }
    }

    /// `[mb, oc, oh, ow]`
    pub fn dst_desc(&self) -> Result<MemoryDesc> {
        let s = &self.sizes;
        MemoryDesc::new(
            (s.mb, s.oc, s.oh, s.ow),
            DType::F32,
            self.formats.dst.clone(),
        )
    }
}

impl fmt::Display for ConvCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{} {} {}]",
            self.name, self.sizes, self.formats, self.algorithm
        )
    }
}
