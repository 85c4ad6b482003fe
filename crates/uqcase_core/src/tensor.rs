use serde::Serialize;

/// Dense `f64` array with a name for every axis.
///
/// Values are row-major: the last axis varies fastest. Gaps are NaN and
/// serialize as `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tensor {
    dims: Vec<String>,
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl Tensor {
    /// `None` unless there is one dim per axis and `data` fills `shape` exactly
    pub fn from_data<S: Into<String>>(
        dims: impl IntoIterator<Item = S>,
        shape: Vec<usize>,
        data: Vec<f64>,
    ) -> Option<Self> {
        let dims: Vec<String> = dims.into_iter().map(Into::into).collect();
        if dims.len() != shape.len() || data.len() != shape.iter().product::<usize>() {
            return None;
        }
        Some(Self { dims, shape, data })
    }

    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Length of the axis called `dim`
    pub fn dim_len(&self, dim: &str) -> Option<usize> {
        self.dims
            .iter()
            .position(|d| d == dim)
            .map(|axis| self.shape[axis])
    }

    /// Value at one index per axis; `None` when out of bounds
    pub fn get(&self, indices: &[usize]) -> Option<&f64> {
        if indices.len() != self.shape.len() {
            return None;
        }
        let mut flat = 0;
        for (&idx, &size) in indices.iter().zip(&self.shape) {
            if idx >= size {
                return None;
            }
            flat = flat * size + idx;
        }
        self.data.get(flat)
    }

    /// Stack tensors with equal dims and shape along a new leading `axis`.
    ///
    /// Returns `None` for an empty input or when the parts disagree.
    pub fn stack(axis: &str, parts: Vec<Tensor>) -> Option<Self> {
        let first = parts.first()?;
        if parts
            .iter()
            .any(|p| p.shape != first.shape || p.dims != first.dims)
        {
            return None;
        }

        let mut dims = Vec::with_capacity(first.dims.len() + 1);
        dims.push(axis.to_string());
        dims.extend(first.dims.iter().cloned());
        let mut shape = Vec::with_capacity(first.shape.len() + 1);
        shape.push(parts.len());
        shape.extend(first.shape.iter().copied());

        let data = parts.into_iter().flat_map(|p| p.data).collect();
        Some(Self { dims, shape, data })
    }
}
