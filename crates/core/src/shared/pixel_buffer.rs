use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::shared::frame::Frame;

/// Pixel layouts accepted at the engine boundary.
///
/// `Yuv` is bi-planar 4:2:0 (NV12): a full-resolution luma plane followed by
/// an interleaved Cb/Cr plane at half resolution, both sharing the row stride.
/// `Unknown` is only ever reported, never accepted as input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Grayscale,
    Argb,
    Rgb,
    Bgr,
    Bgra,
    Abgr,
    Rgba,
    Yuv,
    Unknown,
}

impl ImageFormat {
    pub const ALL: [ImageFormat; 9] = [
        ImageFormat::Grayscale,
        ImageFormat::Argb,
        ImageFormat::Rgb,
        ImageFormat::Bgr,
        ImageFormat::Bgra,
        ImageFormat::Abgr,
        ImageFormat::Rgba,
        ImageFormat::Yuv,
        ImageFormat::Unknown,
    ];

    /// Bytes per pixel of the (first) plane, `None` for `Unknown`.
    pub fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            ImageFormat::Grayscale | ImageFormat::Yuv => Some(1),
            ImageFormat::Rgb | ImageFormat::Bgr => Some(3),
            ImageFormat::Argb | ImageFormat::Bgra | ImageFormat::Abgr | ImageFormat::Rgba => {
                Some(4)
            }
            ImageFormat::Unknown => None,
        }
    }

    /// Byte offsets of (R, G, B) within one packed color pixel.
    fn rgb_offsets(self) -> Option<(usize, usize, usize)> {
        match self {
            ImageFormat::Rgb | ImageFormat::Rgba => Some((0, 1, 2)),
            ImageFormat::Bgr | ImageFormat::Bgra => Some((2, 1, 0)),
            ImageFormat::Argb => Some((1, 2, 3)),
            ImageFormat::Abgr => Some((3, 2, 1)),
            _ => None,
        }
    }
}

/// Borrowed, read-only view of caller-owned pixel data.
///
/// The orientation is an EXIF orientation tag (1..=8) describing how the
/// stored pixels must be transformed to appear upright.
#[derive(Clone, Copy, Debug)]
pub struct PixelBuffer<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
    bytes_per_row: u32,
    format: ImageFormat,
    orientation: u32,
}

impl<'a> PixelBuffer<'a> {
    pub fn new(
        data: &'a [u8],
        width: u32,
        height: u32,
        bytes_per_row: u32,
        format: ImageFormat,
    ) -> Self {
        Self {
            data,
            width,
            height,
            bytes_per_row,
            format,
            orientation: 1,
        }
    }

    /// Buffer whose rows carry no padding.
    ///
    /// A row too long to describe in `u32` gets a stride that [`validate`]
    /// rejects.
    ///
    /// [`validate`]: PixelBuffer::validate
    pub fn packed(data: &'a [u8], width: u32, height: u32, format: ImageFormat) -> Self {
        let stride = u32::try_from(min_row_len(format, width as usize)).unwrap_or(u32::MAX);
        Self::new(data, width, height, stride, format)
    }

    pub fn with_orientation(mut self, exif_orientation: u32) -> Self {
        self.orientation = exif_orientation;
        self
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bytes_per_row(&self) -> u32 {
        self.bytes_per_row
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn orientation(&self) -> u32 {
        self.orientation
    }

    pub(crate) fn ensure_supported(&self) -> Result<(), EngineError> {
        if self.format == ImageFormat::Unknown {
            return Err(EngineError::UnsupportedImageFormat(self.format));
        }
        Ok(())
    }

    /// Checks dimensions, stride and length against the pixel format.
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.format.bytes_per_pixel().is_none() {
            return Err("pixel format is unknown".to_string());
        }
        if self.width == 0 || self.height == 0 {
            return Err(format!(
                "buffer dimensions must be non-zero, got {}x{}",
                self.width, self.height
            ));
        }
        if self.data.is_empty() {
            return Err("buffer is empty".to_string());
        }
        let row_len = min_row_len(self.format, self.width as usize);
        let stride = self.bytes_per_row as usize;
        if stride < row_len {
            return Err(format!(
                "bytes per row {stride} is smaller than a row of {row_len} bytes"
            ));
        }
        let required = self.required_len();
        if self.data.len() < required {
            return Err(format!(
                "buffer holds {} bytes, {required} required",
                self.data.len()
            ));
        }
        Ok(())
    }

    fn required_len(&self) -> usize {
        let w = self.width as usize;
        let h = self.height as usize;
        let stride = self.bytes_per_row as usize;
        let bpp = self.format.bytes_per_pixel().unwrap_or(1);
        let luma_or_packed = stride * (h - 1) + w * bpp;
        if self.format == ImageFormat::Yuv {
            let chroma_rows = h.div_ceil(2);
            stride * h + stride * (chroma_rows - 1) + 2 * w.div_ceil(2)
        } else {
            luma_or_packed
        }
    }

    /// Converts to a packed RGB frame in stored (not yet oriented) layout.
    pub(crate) fn to_rgb_frame(&self) -> Result<Frame, String> {
        self.validate()?;
        let w = self.width as usize;
        let h = self.height as usize;
        let stride = self.bytes_per_row as usize;
        let mut rgb = Vec::with_capacity(w * h * 3);

        match self.format {
            ImageFormat::Grayscale => {
                for row in self.data.chunks(stride).take(h) {
                    for &v in &row[..w] {
                        rgb.extend_from_slice(&[v, v, v]);
                    }
                }
            }
            ImageFormat::Yuv => {
                let chroma = &self.data[stride * h..];
                for y in 0..h {
                    let luma_row = &self.data[y * stride..y * stride + w];
                    let chroma_row = &chroma[(y / 2) * stride..];
                    for (x, &luma) in luma_row.iter().enumerate() {
                        let cb = chroma_row[(x / 2) * 2];
                        let cr = chroma_row[(x / 2) * 2 + 1];
                        rgb.extend_from_slice(&ycbcr_to_rgb(luma, cb, cr));
                    }
                }
            }
            format => {
                let (r, g, b) = format.rgb_offsets().ok_or("pixel format is unknown")?;
                let bpp = format.bytes_per_pixel().unwrap_or(3);
                for row in self.data.chunks(stride).take(h) {
                    for px in row[..w * bpp].chunks_exact(bpp) {
                        rgb.extend_from_slice(&[px[r], px[g], px[b]]);
                    }
                }
            }
        }

        Ok(Frame::new(rgb, self.width, self.height, 3))
    }

    /// Converts to a packed RGB frame with the EXIF orientation applied.
    pub(crate) fn to_upright_frame(&self) -> Result<Frame, String> {
        let orientation = u8::try_from(self.orientation)
            .ok()
            .and_then(image::metadata::Orientation::from_exif)
            .ok_or_else(|| {
                format!(
                    "EXIF orientation must be between 1 and 8, got {}",
                    self.orientation
                )
            })?;
        let frame = self.to_rgb_frame()?;
        if orientation == image::metadata::Orientation::NoTransforms {
            return Ok(frame);
        }
        let img = image::RgbImage::from_raw(frame.width(), frame.height(), frame.into_data())
            .ok_or("RGB frame does not match its dimensions")?;
        let mut dynamic = image::DynamicImage::ImageRgb8(img);
        dynamic.apply_orientation(orientation);
        let upright = dynamic.into_rgb8();
        let (w, h) = upright.dimensions();
        Ok(Frame::new(upright.into_raw(), w, h, 3))
    }

    /// Single-channel luma plane in stored layout, as `(pixels, width, height)`.
    pub(crate) fn to_luma(&self) -> Result<(Vec<u8>, u32, u32), String> {
        self.validate()?;
        let w = self.width as usize;
        let h = self.height as usize;
        let stride = self.bytes_per_row as usize;
        let luma = match self.format {
            ImageFormat::Grayscale | ImageFormat::Yuv => self
                .data
                .chunks(stride)
                .take(h)
                .flat_map(|row| row[..w].iter().copied())
                .collect(),
            _ => self.to_rgb_frame()?.luma(),
        };
        Ok((luma, self.width, self.height))
    }
}

/// Full-range BT.601 YCbCr to RGB.
fn ycbcr_to_rgb(y: u8, cb: u8, cr: u8) -> [u8; 3] {
    let y = y as f32;
    let cb = cb as f32 - 128.0;
    let cr = cr as f32 - 128.0;
    let r = y + 1.402 * cr;
    let g = y - 0.344_136 * cb - 0.714_136 * cr;
    let b = y + 1.772 * cb;
    [clamp_u8(r), clamp_u8(g), clamp_u8(b)]
}

fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Shortest row that holds `width` pixels. NV12 chroma rows interleave
/// one Cb/Cr pair per two columns, so an odd width needs one extra byte.
fn min_row_len(format: ImageFormat, width: usize) -> usize {
    match format {
        ImageFormat::Yuv => width.div_ceil(2) * 2,
        format => width * format.bytes_per_pixel().unwrap_or(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_all_has_nine_formats() {
        assert_eq!(ImageFormat::ALL.len(), 9);
    }

    #[rstest]
    #[case::rgb(ImageFormat::Rgb, vec![10, 20, 30])]
    #[case::bgr(ImageFormat::Bgr, vec![30, 20, 10])]
    #[case::rgba(ImageFormat::Rgba, vec![10, 20, 30, 255])]
    #[case::bgra(ImageFormat::Bgra, vec![30, 20, 10, 255])]
    #[case::argb(ImageFormat::Argb, vec![255, 10, 20, 30])]
    #[case::abgr(ImageFormat::Abgr, vec![255, 30, 20, 10])]
    fn test_color_formats_convert_to_rgb(#[case] format: ImageFormat, #[case] pixel: Vec<u8>) {
        let buffer = PixelBuffer::packed(&pixel, 1, 1, format);
        let frame = buffer.to_rgb_frame().unwrap();
        assert_eq!(frame.data(), &[10, 20, 30]);
    }

    #[test]
    fn test_grayscale_replicates_channels() {
        let data = [7u8, 200];
        let frame = PixelBuffer::packed(&data, 2, 1, ImageFormat::Grayscale)
            .to_rgb_frame()
            .unwrap();
        assert_eq!(frame.data(), &[7, 7, 7, 200, 200, 200]);
    }

    #[test]
    fn test_stride_padding_is_skipped() {
        // 2x2 RGB with 2 padding bytes per row
        let data = [
            1, 1, 1, 2, 2, 2, 99, 99, //
            3, 3, 3, 4, 4, 4, 99, 99,
        ];
        let frame = PixelBuffer::new(&data, 2, 2, 8, ImageFormat::Rgb)
            .to_rgb_frame()
            .unwrap();
        assert_eq!(frame.data(), &[1, 1, 1, 2, 2, 2, 3, 3, 3, 4, 4, 4]);
    }

    #[test]
    fn test_yuv_neutral_chroma_is_gray() {
        // 2x2 luma + one CbCr pair
        let data = [50u8, 100, 150, 200, 128, 128];
        let frame = PixelBuffer::packed(&data, 2, 2, ImageFormat::Yuv)
            .to_rgb_frame()
            .unwrap();
        assert_eq!(&frame.data()[..3], &[50, 50, 50]);
        assert_eq!(&frame.data()[9..], &[200, 200, 200]);
    }

    #[test]
    fn test_odd_width_yuv_reads_its_own_chroma() {
        // 3x2 luma with one padding byte per row, then one chroma row of two pairs
        let data = [
            10u8, 20, 30, 0, //
            40, 50, 60, 0, //
            128, 128, 128, 128,
        ];
        let packed = PixelBuffer::packed(&data, 3, 2, ImageFormat::Yuv);
        assert_eq!(packed.bytes_per_row(), 4);
        let frame = packed.to_rgb_frame().unwrap();
        assert_eq!(&frame.data()[6..9], &[30, 30, 30]);
        assert_eq!(&frame.data()[15..], &[60, 60, 60]);
    }

    #[test]
    fn test_yuv_luma_uses_first_plane() {
        let data = [50u8, 100, 150, 200, 0, 255];
        let (luma, w, h) = PixelBuffer::packed(&data, 2, 2, ImageFormat::Yuv)
            .to_luma()
            .unwrap();
        assert_eq!((w, h), (2, 2));
        assert_eq!(luma, vec![50, 100, 150, 200]);
    }

    #[rstest]
    #[case::zero_width(PixelBuffer::new(&[0u8; 12], 0, 2, 6, ImageFormat::Rgb))]
    #[case::zero_height(PixelBuffer::new(&[0u8; 12], 2, 0, 6, ImageFormat::Rgb))]
    #[case::empty(PixelBuffer::new(&[], 2, 2, 6, ImageFormat::Rgb))]
    #[case::short(PixelBuffer::new(&[0u8; 11], 2, 2, 6, ImageFormat::Rgb))]
    #[case::narrow_stride(PixelBuffer::new(&[0u8; 12], 2, 2, 5, ImageFormat::Rgb))]
    #[case::short_yuv(PixelBuffer::new(&[0u8; 4], 2, 2, 2, ImageFormat::Yuv))]
    #[case::odd_yuv_without_chroma_room(PixelBuffer::new(&[0u8; 12], 3, 2, 3, ImageFormat::Yuv))]
    #[case::row_overflows_u32(PixelBuffer::packed(&[0u8; 16], u32::MAX, 1, ImageFormat::Rgba))]
    fn test_malformed_buffers_rejected(#[case] buffer: PixelBuffer<'static>) {
        assert!(buffer.validate().is_err());
    }

    #[test]
    fn test_unknown_format_is_unsupported() {
        let buffer = PixelBuffer::new(&[0u8; 4], 2, 2, 2, ImageFormat::Unknown);
        let err = buffer.ensure_supported().unwrap_err();
        assert!(matches!(
            err,
            EngineError::UnsupportedImageFormat(ImageFormat::Unknown)
        ));
    }

    #[test]
    fn test_orientation_6_rotates_clockwise() {
        // 2x1 RGB: red then green; rotated 90° CW becomes 1x2 with red on top
        let data = [255u8, 0, 0, 0, 255, 0];
        let frame = PixelBuffer::packed(&data, 2, 1, ImageFormat::Rgb)
            .with_orientation(6)
            .to_upright_frame()
            .unwrap();
        assert_eq!((frame.width(), frame.height()), (1, 2));
        assert_eq!(frame.data(), &[255, 0, 0, 0, 255, 0]);
    }

    #[test]
    fn test_orientation_2_mirrors() {
        let data = [255u8, 0, 0, 0, 255, 0];
        let frame = PixelBuffer::packed(&data, 2, 1, ImageFormat::Rgb)
            .with_orientation(2)
            .to_upright_frame()
            .unwrap();
        assert_eq!(frame.data(), &[0, 255, 0, 255, 0, 0]);
    }

    #[rstest]
    #[case(0)]
    #[case(9)]
    #[case(1000)]
    fn test_invalid_orientation_rejected(#[case] tag: u32) {
        let data = [0u8; 3];
        let result = PixelBuffer::packed(&data, 1, 1, ImageFormat::Rgb)
            .with_orientation(tag)
            .to_upright_frame();
        assert!(result.is_err());
    }
}
