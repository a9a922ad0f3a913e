//! Feature-flag filtering of resolved image lists

use crate::config::{HARDENED_MARKER, WORKER_A_MARKER, WORKER_B_MARKER};
use crate::image::reference::ImageReference;

/// Which optional image groups the operator asked for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterCriteria {
    pub include_extra_worker_a: bool,
    pub include_extra_worker_b: bool,
    pub include_hardened_variant: bool,
}

/// Substrings that place an image in one of the optional groups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterMarkers {
    pub hardened: String,
    pub worker_a: String,
    pub worker_b: String,
}

impl Default for FilterMarkers {
    fn default() -> Self {
        Self {
            hardened: HARDENED_MARKER.to_string(),
            worker_a: WORKER_A_MARKER.to_string(),
            worker_b: WORKER_B_MARKER.to_string(),
        }
    }
}

/// Group an image belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageCategory {
    Hardened,
    WorkerA,
    WorkerB,
    Core,
}

impl ImageCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hardened => "hardened",
            Self::WorkerA => "worker-a",
            Self::WorkerB => "worker-b",
            Self::Core => "core",
        }
    }

    /// Inclusion table. Workers follow their own flags; in hardened mode the
    /// hardened variants replace the core images.
    pub fn is_included(&self, criteria: &FilterCriteria) -> bool {
        let hardened = criteria.include_hardened_variant;
        match self {
            Self::Hardened => hardened,
            Self::WorkerA => criteria.include_extra_worker_a,
            Self::WorkerB => criteria.include_extra_worker_b,
            Self::Core => !hardened,
        }
    }
}

/// Image that matches more than one marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerOverlap {
    pub image: ImageReference,
    pub categories: Vec<ImageCategory>,
    /// Category the first-match rule settled on
    pub chosen: ImageCategory,
}

/// Pure filter over resolved image lists
#[derive(Debug, Clone, Default)]
pub struct ImageFilter {
    markers: FilterMarkers,
}

impl ImageFilter {
    pub fn new(markers: FilterMarkers) -> Self {
        Self { markers }
    }

    pub fn markers(&self) -> &FilterMarkers {
        &self.markers
    }

    /// Every marker category the image name matches, in precedence order
    pub fn matching_categories(&self, image: &ImageReference) -> Vec<ImageCategory> {
        let name = image.name_and_tag();
        [
            (ImageCategory::Hardened, &self.markers.hardened),
            (ImageCategory::WorkerA, &self.markers.worker_a),
            (ImageCategory::WorkerB, &self.markers.worker_b),
        ]
        .into_iter()
        .filter(|(_, marker)| !marker.is_empty() && name.contains(marker.as_str()))
        .map(|(category, _)| category)
        .collect()
    }

    /// First matching marker wins; no match means a core image
    pub fn classify(&self, image: &ImageReference) -> ImageCategory {
        self.matching_categories(image)
            .first()
            .copied()
            .unwrap_or(ImageCategory::Core)
    }

    /// Images claimed by more than one marker category
    pub fn overlaps(&self, images: &[ImageReference]) -> Vec<MarkerOverlap> {
        images
            .iter()
            .filter_map(|image| {
                let categories = self.matching_categories(image);
                if categories.len() > 1 {
                    Some(MarkerOverlap {
                        image: image.clone(),
                        chosen: categories[0],
                        categories,
                    })
                } else {
                    None
                }
            })
            .collect()
    }

    /// Keep the images the criteria select, preserving order
    pub fn apply(&self, images: &[ImageReference], criteria: &FilterCriteria) -> Vec<ImageReference> {
        images
            .iter()
            .filter(|image| self.classify(image).is_included(criteria))
            .cloned()
            .collect()
    }
}
