use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::recognition::domain::face_template::{FaceTemplate, TemplateVersion};

/// Anything that can be compared: serialized template bytes plus the
/// version the owner declares for them.
///
/// Storage layers implement this for their own records; the comparator
/// never needs to know where the bytes came from.
pub trait Recognizable {
    fn recognition_data(&self) -> Cow<'_, [u8]>;
    fn version(&self) -> TemplateVersion;
}

/// Template bytes as they come back from external storage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionData {
    pub data: Vec<u8>,
    pub version: TemplateVersion,
}

impl RecognitionData {
    pub fn new(data: Vec<u8>, version: TemplateVersion) -> Self {
        Self { data, version }
    }
}

impl From<&FaceTemplate> for RecognitionData {
    fn from(template: &FaceTemplate) -> Self {
        Self::new(template.to_bytes(), template.version())
    }
}

impl Recognizable for RecognitionData {
    fn recognition_data(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(&self.data)
    }

    fn version(&self) -> TemplateVersion {
        self.version
    }
}

impl Recognizable for FaceTemplate {
    fn recognition_data(&self) -> Cow<'_, [u8]> {
        Cow::Owned(self.to_bytes())
    }

    fn version(&self) -> TemplateVersion {
        FaceTemplate::version(self)
    }
}

impl<T: Recognizable + ?Sized> Recognizable for &T {
    fn recognition_data(&self) -> Cow<'_, [u8]> {
        (**self).recognition_data()
    }

    fn version(&self) -> TemplateVersion {
        (**self).version()
    }
}
