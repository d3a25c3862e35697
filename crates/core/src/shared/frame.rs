use ndarray::Array2;

use crate::shared::region::Rect;

/// An upright image: contiguous bytes in row-major order.
///
/// Pixel format conversion happens once at the engine boundary
/// ([`PixelBuffer`](crate::shared::pixel_buffer::PixelBuffer)); everything
/// downstream sees packed RGB or single-channel luma.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width as f64, self.height as f64)
    }

    /// Luma plane, BT.601 weights for color frames.
    pub fn luma(&self) -> Vec<u8> {
        match self.channels {
            1 => self.data.clone(),
            c => self
                .data
                .chunks_exact(c as usize)
                .map(|px| luma_of(px[0], px[1], px[2]))
                .collect(),
        }
    }

    /// Luma plane as a `(height, width)` array.
    pub fn luma_array(&self) -> Array2<u8> {
        let luma = self.luma();
        let w = self.width as usize;
        Array2::from_shape_fn((self.height as usize, w), |(y, x)| luma[y * w + x])
    }

    /// Integer crop of the part of `rect` that lies inside the frame.
    ///
    /// Returns `None` when the intersection is empty.
    pub fn crop(&self, rect: &Rect) -> Option<Frame> {
        let clamped = rect.clamped(self.width as f64, self.height as f64)?;
        let x0 = clamped.x.floor() as usize;
        let y0 = clamped.y.floor() as usize;
        let x1 = (clamped.right().ceil() as usize).min(self.width as usize);
        let y1 = (clamped.bottom().ceil() as usize).min(self.height as usize);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        let c = self.channels as usize;
        let stride = self.width as usize * c;
        let mut data = Vec::with_capacity((x1 - x0) * (y1 - y0) * c);
        for y in y0..y1 {
            data.extend_from_slice(&self.data[y * stride + x0 * c..y * stride + x1 * c]);
        }
        Some(Frame::new(data, (x1 - x0) as u32, (y1 - y0) as u32, self.channels))
    }

    /// Horizontally mirrored copy.
    pub fn mirrored(&self) -> Frame {
        let c = self.channels as usize;
        let stride = self.width as usize * c;
        let mut data = Vec::with_capacity(self.data.len());
        for row in self.data.chunks_exact(stride.max(1)) {
            for px in row.chunks_exact(c).rev() {
                data.extend_from_slice(px);
            }
        }
        Frame::new(data, self.width, self.height, self.channels)
    }

    /// Samples a `size` × `size` square centred on `center`, `side` source
    /// pixels wide and rotated by `roll` degrees, with bilinear filtering.
    ///
    /// Samples outside the frame repeat the nearest edge pixel.
    pub fn sample_square(&self, center: (f64, f64), side: f64, roll: f64, size: usize) -> Frame {
        let c = self.channels as usize;
        let mut data = vec![0u8; size * size * c];
        if self.width == 0 || self.height == 0 || size == 0 {
            return Frame::new(data, size as u32, size as u32, self.channels);
        }
        let step = side / size as f64;
        let (sin, cos) = roll.to_radians().sin_cos();
        let half = size as f64 / 2.0;

        for oy in 0..size {
            for ox in 0..size {
                let u = (ox as f64 + 0.5 - half) * step;
                let v = (oy as f64 + 0.5 - half) * step;
                let sx = center.0 + u * cos - v * sin - 0.5;
                let sy = center.1 + u * sin + v * cos - 0.5;
                let out = (oy * size + ox) * c;
                self.bilinear(sx, sy, &mut data[out..out + c]);
            }
        }
        Frame::new(data, size as u32, size as u32, self.channels)
    }

    fn bilinear(&self, x: f64, y: f64, out: &mut [u8]) {
        let max_x = (self.width - 1) as f64;
        let max_y = (self.height - 1) as f64;
        let x = x.clamp(0.0, max_x);
        let y = y.clamp(0.0, max_y);
        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let x1 = (x0 + 1).min(self.width as usize - 1);
        let y1 = (y0 + 1).min(self.height as usize - 1);
        let fx = x - x0 as f64;
        let fy = y - y0 as f64;
        let c = self.channels as usize;
        let stride = self.width as usize * c;

        for (ch, o) in out.iter_mut().enumerate() {
            let p = |xx: usize, yy: usize| self.data[yy * stride + xx * c + ch] as f64;
            let top = p(x0, y0) * (1.0 - fx) + p(x1, y0) * fx;
            let bottom = p(x0, y1) * (1.0 - fx) + p(x1, y1) * fx;
            *o = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
        }
    }
}

pub(crate) fn luma_of(r: u8, g: u8, b: u8) -> u8 {
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000) as u8
}
