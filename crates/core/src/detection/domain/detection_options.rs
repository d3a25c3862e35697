/// Per-call detection flags. Each flag composes independently.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DetectionOptions {
    /// Bypass the coarse pre-filter that rejects featureless frames.
    pub skip_prefilter: bool,
    /// Attach a default-version template to every returned face.
    pub extract_templates: bool,
    /// Accept only the small roll/yaw ranges.
    pub disable_pose_compensation: bool,
    /// Double the minimum accepted face size.
    pub reduce_size_range: bool,
}

impl DetectionOptions {
    pub const SKIP_PREFILTER: u32 = 1;
    pub const EXTRACT_TEMPLATES: u32 = 2;
    pub const DISABLE_POSE_COMPENSATION: u32 = 4;
    pub const REDUCE_SIZE_RANGE: u32 = 8;

    /// Unknown bits are ignored.
    pub fn from_bits(bits: u32) -> Self {
        Self {
            skip_prefilter: bits & Self::SKIP_PREFILTER != 0,
            extract_templates: bits & Self::EXTRACT_TEMPLATES != 0,
            disable_pose_compensation: bits & Self::DISABLE_POSE_COMPENSATION != 0,
            reduce_size_range: bits & Self::REDUCE_SIZE_RANGE != 0,
        }
    }

    pub fn bits(&self) -> u32 {
        let mut bits = 0;
        if self.skip_prefilter {
            bits |= Self::SKIP_PREFILTER;
        }
        if self.extract_templates {
            bits |= Self::EXTRACT_TEMPLATES;
        }
        if self.disable_pose_compensation {
            bits |= Self::DISABLE_POSE_COMPENSATION;
        }
        if self.reduce_size_range {
            bits |= Self::REDUCE_SIZE_RANGE;
        }
        bits
    }
}
