use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::catalog::DetailShape;

/// Public reference to an uploaded photo.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(pub String);

impl ImageRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputerBlock {
    pub brand: String,
    pub serial_number: String,
    #[serde(default)]
    pub accessories: BTreeSet<String>,
    #[serde(default)]
    pub images: Vec<ImageRef>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MobileBlock {
    pub brand: String,
    pub imei_number: String,
    #[serde(default)]
    pub accessories: BTreeSet<String>,
    #[serde(default)]
    pub images: Vec<ImageRef>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimBlock {
    pub sim_number: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandBlock {
    pub brand: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptionBlock {
    pub description: String,
}

/// Validated details for one selected asset type.
///
/// Serialized untagged so the stored JSON is the plain field object; variant order
/// matters for deserialization because `Brand` is a subset of the structured shapes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AssetBlock {
    Computer(ComputerBlock),
    Mobile(MobileBlock),
    Sim(SimBlock),
    Brand(BrandBlock),
    Description(DescriptionBlock),
}

impl AssetBlock {
    pub fn shape(&self) -> DetailShape {
        match self {
            Self::Computer(_) => DetailShape::Computer,
            Self::Mobile(_) => DetailShape::Mobile,
            Self::Sim(_) => DetailShape::Sim,
            Self::Brand(_) => DetailShape::Brand,
            Self::Description(_) => DetailShape::Description,
        }
    }

    pub fn brand(&self) -> Option<&str> {
        match self {
            Self::Computer(block) => Some(&block.brand),
            Self::Mobile(block) => Some(&block.brand),
            Self::Brand(block) => Some(&block.brand),
            Self::Sim(_) | Self::Description(_) => None,
        }
    }

    /// Serial number, IMEI or SIM number, whichever identifies this block.
    pub fn identifier(&self) -> Option<&str> {
        match self {
            Self::Computer(block) => Some(&block.serial_number),
            Self::Mobile(block) => Some(&block.imei_number),
            Self::Sim(block) => Some(&block.sim_number),
            Self::Brand(_) | Self::Description(_) => None,
        }
    }

    pub fn images(&self) -> &[ImageRef] {
        match self {
            Self::Computer(block) => &block.images,
            Self::Mobile(block) => &block.images,
            Self::Sim(_) | Self::Brand(_) | Self::Description(_) => &[],
        }
    }

    pub fn accessories(&self) -> Option<&BTreeSet<String>> {
        match self {
            Self::Computer(block) => Some(&block.accessories),
            Self::Mobile(block) => Some(&block.accessories),
            Self::Sim(_) | Self::Brand(_) | Self::Description(_) => None,
        }
    }
}
