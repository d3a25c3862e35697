use crate::shared::region::Rect;

/// Smoothing parameters: [cx, cy, half_w, half_h].
type SmoothParams = [f64; 4];

/// EMA smoother for the bounds of one face lineage.
///
/// Formula: `ema[t] = alpha * current + (1 - alpha) * ema[t-1]`, applied to
/// the box center and half extents so the box does not drift toward a corner.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundsSmoother {
    alpha: f64,
    state: Option<SmoothParams>,
}

impl BoundsSmoother {
    /// `alpha` is clamped to `[0, 1]`; 1 disables smoothing.
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            state: None,
        }
    }

    pub fn smooth(&mut self, bounds: Rect) -> Rect {
        let params = to_params(&bounds);
        let smoothed = match self.state {
            None => params,
            Some(prev) => {
                let mut result = [0.0; 4];
                for i in 0..4 {
                    result[i] = self.alpha * params[i] + (1.0 - self.alpha) * prev[i];
                }
                result
            }
        };
        self.state = Some(smoothed);
        from_params(smoothed)
    }

    pub fn reset(&mut self) {
        self.state = None;
    }
}

fn to_params(r: &Rect) -> SmoothParams {
    let (cx, cy) = r.center();
    [cx, cy, r.width / 2.0, r.height / 2.0]
}

fn from_params(p: SmoothParams) -> Rect {
    Rect::new(p[0] - p[2], p[1] - p[3], p[2] * 2.0, p[3] * 2.0)
}
