//! Per-cell coordinates for aggregated datasets.

use std::path::Path;

use serde::Serialize;

use crate::error::AggregateError;
use crate::field::{FieldArray, read_field};

/// Cell-centre coordinates, one entry per cell
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CellCoordinates {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
}

impl CellCoordinates {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

/// Source of cell coordinates for a case directory
pub trait MeshReader: Send + Sync {
    fn cell_centres(&self, case_dir: &Path) -> Result<CellCoordinates, AggregateError>;
}

/// Reads cell centres from a written vector field, `0/C` by default
/// (as produced by `postProcess -func writeCellCentres`).
#[derive(Debug, Clone)]
pub struct CellCentreField {
    time: String,
    field: String,
}

impl CellCentreField {
    pub fn new(time: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            time: time.into(),
            field: field.into(),
        }
    }
}

impl Default for CellCentreField {
    fn default() -> Self {
        Self::new("0", "C")
    }
}

impl MeshReader for CellCentreField {
    fn cell_centres(&self, case_dir: &Path) -> Result<CellCoordinates, AggregateError> {
        let mesh_err = |message: String| AggregateError::Mesh {
            case_dir: case_dir.to_path_buf(),
            message,
        };

        let path = case_dir.join(&self.time).join(&self.field);
        let parsed = read_field(&path).map_err(|e| mesh_err(e.to_string()))?;
        if !parsed.skipped.is_empty() {
            return Err(mesh_err(format!(
                "{} unreadable entries in {}",
                parsed.skipped.len(),
                path.display()
            )));
        }

        match parsed.values {
            FieldArray::Vector {
                components: 3,
                values,
            } => {
                let mut coords = CellCoordinates {
                    x: Vec::with_capacity(values.len() / 3),
                    y: Vec::with_capacity(values.len() / 3),
                    z: Vec::with_capacity(values.len() / 3),
                };
                for xyz in values.chunks_exact(3) {
                    coords.x.push(xyz[0]);
                    coords.y.push(xyz[1]);
                    coords.z.push(xyz[2]);
                }
                Ok(coords)
            }
            other => Err(mesh_err(format!(
                "{} is not a 3-component vector field (shape {:?})",
                path.display(),
                other.shape()
            ))),
        }
    }
}
