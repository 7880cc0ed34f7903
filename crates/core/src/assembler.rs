//! Per-asset-type sub-forms on the details step.
//!
//! The assembler keeps one editable [`BlockDraft`] per selected asset type, in
//! selection order, and turns them into validated [`AssetBlock`]s when the wizard
//! advances. Upload completions are routed by asset key and a generation counter, so
//! results that arrive after the type was deselected are dropped.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{AssetCatalog, AssetKey, DetailShape};
use crate::domain::asset::{AssetBlock, ImageRef};
use crate::schema::{FieldErrors, FieldSchemas};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum BlockDraft {
    Computer {
        brand: String,
        serial_number: String,
        accessories: BTreeSet<String>,
        images: Vec<ImageRef>,
    },
    Mobile {
        brand: String,
        imei_number: String,
        accessories: BTreeSet<String>,
        images: Vec<ImageRef>,
    },
    Sim {
        sim_number: String,
    },
    Brand {
        brand: String,
    },
    Description {
        description: String,
    },
}

impl BlockDraft {
    pub fn empty(shape: DetailShape) -> Self {
        match shape {
            DetailShape::Computer => Self::Computer {
                brand: String::new(),
                serial_number: String::new(),
                accessories: BTreeSet::new(),
                images: Vec::new(),
            },
            DetailShape::Mobile => Self::Mobile {
                brand: String::new(),
                imei_number: String::new(),
                accessories: BTreeSet::new(),
                images: Vec::new(),
            },
            DetailShape::Sim => Self::Sim { sim_number: String::new() },
            DetailShape::Brand => Self::Brand { brand: String::new() },
            DetailShape::Description => Self::Description { description: String::new() },
        }
    }

    pub fn shape(&self) -> DetailShape {
        match self {
            Self::Computer { .. } => DetailShape::Computer,
            Self::Mobile { .. } => DetailShape::Mobile,
            Self::Sim { .. } => DetailShape::Sim,
            Self::Brand { .. } => DetailShape::Brand,
            Self::Description { .. } => DetailShape::Description,
        }
    }

    pub fn accessories(&self) -> Option<&BTreeSet<String>> {
        match self {
            Self::Computer { accessories, .. } | Self::Mobile { accessories, .. } => {
                Some(accessories)
            }
            Self::Sim { .. } | Self::Brand { .. } | Self::Description { .. } => None,
        }
    }

    pub fn images(&self) -> &[ImageRef] {
        match self {
            Self::Computer { images, .. } | Self::Mobile { images, .. } => images,
            Self::Sim { .. } | Self::Brand { .. } | Self::Description { .. } => &[],
        }
    }

    fn field_mut(&mut self, field: BlockField) -> Option<&mut String> {
        match (self, field) {
            (Self::Computer { brand, .. }, BlockField::Brand)
            | (Self::Mobile { brand, .. }, BlockField::Brand)
            | (Self::Brand { brand }, BlockField::Brand) => Some(brand),
            (Self::Computer { serial_number, .. }, BlockField::SerialNumber) => Some(serial_number),
            (Self::Mobile { imei_number, .. }, BlockField::ImeiNumber) => Some(imei_number),
            (Self::Sim { sim_number }, BlockField::SimNumber) => Some(sim_number),
            (Self::Description { description }, BlockField::Description) => Some(description),
            _ => None,
        }
    }

    fn accessories_mut(&mut self) -> Option<&mut BTreeSet<String>> {
        match self {
            Self::Computer { accessories, .. } | Self::Mobile { accessories, .. } => {
                Some(accessories)
            }
            Self::Sim { .. } | Self::Brand { .. } | Self::Description { .. } => None,
        }
    }

    fn images_mut(&mut self) -> Option<&mut Vec<ImageRef>> {
        match self {
            Self::Computer { images, .. } | Self::Mobile { images, .. } => Some(images),
            Self::Sim { .. } | Self::Brand { .. } | Self::Description { .. } => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockField {
    Brand,
    SerialNumber,
    ImeiNumber,
    SimNumber,
    Description,
}

/// How the details step reports failing blocks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockValidation {
    /// Validate every selected block and report all failures.
    #[default]
    CollectAll,
    /// Stop at the first failing block, in selection order.
    FailFast,
}

impl FromStr for BlockValidation {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "collect_all" => Ok(Self::CollectAll),
            "fail_fast" => Ok(Self::FailFast),
            other => Err(format!(
                "unsupported block validation `{other}` (expected collect_all|fail_fast)"
            )),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AssemblerError {
    #[error("asset type `{0}` is not selected")]
    NotSelected(AssetKey),
    #[error("asset type `{key}` has no `{field:?}` field")]
    FieldNotApplicable { key: AssetKey, field: BlockField },
    #[error("asset type `{0}` does not take accessories")]
    AccessoriesNotApplicable(AssetKey),
    #[error("asset type `{0}` does not take images")]
    ImagesNotApplicable(AssetKey),
    #[error("image index {index} is out of range for `{key}` ({len} images)")]
    ImageOutOfRange { key: AssetKey, index: usize, len: usize },
}

/// Handle for one in-flight upload batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTicket {
    pub key: AssetKey,
    pub files: usize,
    generation: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UploadCompletion {
    Applied { appended: usize },
    /// The asset type was deselected while the batch was running.
    Discarded,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockState {
    pub key: AssetKey,
    pub draft: BlockDraft,
    pub pending_uploads: usize,
    #[serde(skip)]
    generation: u64,
}

#[derive(Clone, Debug, Default)]
pub struct AssetDetailAssembler {
    blocks: Vec<BlockState>,
    next_generation: u64,
}

impl AssetDetailAssembler {
    /// Aligns sub-forms with the selection: new types get an empty draft for their
    /// shape, deselected types lose their draft. Order follows the selection.
    pub fn sync_selection(&mut self, catalog: &AssetCatalog, selection: &[AssetKey]) {
        let mut previous = std::mem::take(&mut self.blocks);
        for key in selection {
            if let Some(position) = previous.iter().position(|block| &block.key == key) {
                self.blocks.push(previous.swap_remove(position));
                continue;
            }
            let Some(kind) = catalog.get(key) else {
                continue;
            };
            self.next_generation += 1;
            self.blocks.push(BlockState {
                key: key.clone(),
                draft: BlockDraft::empty(kind.shape),
                pending_uploads: 0,
                generation: self.next_generation,
            });
        }
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
    }

    pub fn blocks(&self) -> &[BlockState] {
        &self.blocks
    }

    pub fn block(&self, key: &AssetKey) -> Option<&BlockDraft> {
        self.state(key).map(|state| &state.draft)
    }

    pub fn pending_uploads(&self, key: &AssetKey) -> usize {
        self.state(key).map(|state| state.pending_uploads).unwrap_or_default()
    }

    pub fn set_field(
        &mut self,
        key: &AssetKey,
        field: BlockField,
        value: impl Into<String>,
    ) -> Result<(), AssemblerError> {
        let state = self.state_mut(key)?;
        let slot = state
            .draft
            .field_mut(field)
            .ok_or_else(|| AssemblerError::FieldNotApplicable { key: key.clone(), field })?;
        *slot = value.into();
        Ok(())
    }

    /// Flips membership of `accessory` and returns whether it is now selected.
    pub fn toggle_accessory(
        &mut self,
        key: &AssetKey,
        accessory: &str,
    ) -> Result<bool, AssemblerError> {
        let state = self.state_mut(key)?;
        let accessories = state
            .draft
            .accessories_mut()
            .ok_or_else(|| AssemblerError::AccessoriesNotApplicable(key.clone()))?;
        if accessories.remove(accessory) {
            Ok(false)
        } else {
            accessories.insert(accessory.to_string());
            Ok(true)
        }
    }

    pub fn remove_image(&mut self, key: &AssetKey, index: usize) -> Result<ImageRef, AssemblerError> {
        let state = self.state_mut(key)?;
        let images = state
            .draft
            .images_mut()
            .ok_or_else(|| AssemblerError::ImagesNotApplicable(key.clone()))?;
        if index >= images.len() {
            return Err(AssemblerError::ImageOutOfRange {
                key: key.clone(),
                index,
                len: images.len(),
            });
        }
        Ok(images.remove(index))
    }

    pub fn begin_upload(
        &mut self,
        key: &AssetKey,
        files: usize,
    ) -> Result<UploadTicket, AssemblerError> {
        let state = self.state_mut(key)?;
        if state.draft.images_mut().is_none() {
            return Err(AssemblerError::ImagesNotApplicable(key.clone()));
        }
        state.pending_uploads += files;
        Ok(UploadTicket { key: key.clone(), files, generation: state.generation })
    }

    /// Appends uploaded references to the block named by the ticket, whichever step
    /// is active.
    pub fn complete_upload(
        &mut self,
        ticket: UploadTicket,
        uploaded: Vec<ImageRef>,
    ) -> UploadCompletion {
        let Some(state) = self
            .blocks
            .iter_mut()
            .find(|state| state.key == ticket.key && state.generation == ticket.generation)
        else {
            return UploadCompletion::Discarded;
        };

        state.pending_uploads = state.pending_uploads.saturating_sub(ticket.files);
        let appended = uploaded.len();
        match state.draft.images_mut() {
            Some(images) => {
                images.extend(uploaded);
                UploadCompletion::Applied { appended }
            }
            None => UploadCompletion::Discarded,
        }
    }

    /// Validates every block in selection order. Error keys are `<asset key>.<field>`.
    pub fn validate_all(
        &self,
        schemas: &FieldSchemas,
        mode: BlockValidation,
    ) -> Result<BTreeMap<AssetKey, AssetBlock>, FieldErrors> {
        let mut blocks = BTreeMap::new();
        let mut errors = FieldErrors::new();

        for state in &self.blocks {
            let result = if state.pending_uploads > 0 {
                Err(FieldErrors::from([(
                    "images".to_string(),
                    "Wait for image uploads to finish".to_string(),
                )]))
            } else {
                schemas.validate_block(&state.draft)
            };

            match result {
                Ok(block) => {
                    blocks.insert(state.key.clone(), block);
                }
                Err(block_errors) => {
                    errors.extend(
                        block_errors
                            .into_iter()
                            .map(|(field, message)| (format!("{}.{field}", state.key), message)),
                    );
                    if mode == BlockValidation::FailFast {
                        break;
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(blocks)
        } else {
            Err(errors)
        }
    }

    fn state(&self, key: &AssetKey) -> Option<&BlockState> {
        self.blocks.iter().find(|state| &state.key == key)
    }

    fn state_mut(&mut self, key: &AssetKey) -> Result<&mut BlockState, AssemblerError> {
        self.blocks
            .iter_mut()
            .find(|state| &state.key == key)
            .ok_or_else(|| AssemblerError::NotSelected(key.clone()))
    }
}
