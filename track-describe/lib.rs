//! Keypoint descriptors. Binary variants pack comparison bits LSB-first into
//! bytes; float variants return `f32` rows. Every variant clamps its sampling
//! at the image border, so each keypoint gets exactly one row.

pub mod akaze;
pub mod brief;
pub mod brisk;
pub mod freak;
pub mod orb;
pub mod sampling;
pub mod sift;
pub mod surf;

use image::GrayImage;
use track_core::{DescriptorKind, Descriptors, ElementType, Keypoint};

pub use akaze::AkazeExtractor;
pub use brief::BriefExtractor;
pub use brisk::BriskExtractor;
pub use freak::FreakExtractor;
pub use orb::OrbExtractor;
pub use sift::SiftExtractor;
pub use surf::SurfExtractor;

/// A descriptor computation strategy.
///
/// `describe` returns rows aligned index-for-index with `keypoints` and never
/// modifies the image.
pub trait DescriptorExtractor: Send + Sync {
    fn kind(&self) -> DescriptorKind;

    fn describe(&self, img: &GrayImage, keypoints: &[Keypoint]) -> Descriptors;

    fn element_type(&self) -> ElementType {
        self.kind().element_type()
    }
}

pub fn create_extractor(kind: DescriptorKind) -> Box<dyn DescriptorExtractor> {
    match kind {
        DescriptorKind::Brief => Box::new(BriefExtractor::default()),
        DescriptorKind::Orb => Box::new(OrbExtractor::default()),
        DescriptorKind::Brisk => Box::new(BriskExtractor::default()),
        DescriptorKind::Freak => Box::new(FreakExtractor::default()),
        DescriptorKind::Akaze => Box::new(AkazeExtractor),
        DescriptorKind::Sift => Box::new(SiftExtractor),
        DescriptorKind::Surf => Box::new(SurfExtractor),
    }
}

/// Row length of a variant, in bytes for binary and elements for float
pub fn descriptor_size(kind: DescriptorKind) -> usize {
    match kind {
        DescriptorKind::Brief => brief::DESCRIPTOR_SIZE,
        DescriptorKind::Orb => orb::DESCRIPTOR_SIZE,
        DescriptorKind::Brisk => brisk::DESCRIPTOR_SIZE,
        DescriptorKind::Freak => freak::DESCRIPTOR_SIZE,
        DescriptorKind::Akaze => akaze::DESCRIPTOR_SIZE,
        DescriptorKind::Sift => sift::DESCRIPTOR_SIZE,
        DescriptorKind::Surf => surf::DESCRIPTOR_SIZE,
    }
}
