//! Neural network inference.
//!
//! Inference runs on the CPU via [tract]. The network input height is fixed by the pipeline, but
//! the width follows the aspect ratio of the source, so optimized execution plans are compiled
//! per input resolution and cached.
//!
//! [tract]: https://github.com/sonos/tract

use std::{collections::HashMap, fmt, ops::Index, path::Path};

use anyhow::{bail, Context};
use tract_onnx::prelude::{Tensor as TractTensor, *};

use crate::image::{Frame, Resolution};

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Input normalization applied before inference: `(value - 128) / 255`.
const INPUT_MEAN: f32 = 128.0;
const INPUT_SCALE: f32 = 1.0 / 255.0;

/// A loaded network that maps frames to raw output tensors.
pub trait Infer {
    fn run(&mut self, image: &Frame) -> anyhow::Result<Outputs>;
}

/// A pose estimation network loaded from an ONNX file.
#[derive(Debug)]
pub struct OnnxEngine {
    model: InferenceModel,
    plans: HashMap<Resolution, Plan>,
    stride: u32,
}

impl OnnxEngine {
    /// Loads a pre-trained model from an ONNX file path.
    ///
    /// `device` selects the inference device. Only `CPU` is supported.
    pub fn load(path: impl AsRef<Path>, device: &str, stride: u32) -> anyhow::Result<Self> {
        Self::load_impl(path.as_ref(), device, stride)
    }

    fn load_impl(path: &Path, device: &str, stride: u32) -> anyhow::Result<Self> {
        if device != "CPU" {
            bail!("inference device '{device}' is not supported (only 'CPU' is)");
        }
        match path.extension() {
            Some(ext) if ext == "onnx" => {}
            _ => bail!("model path '{}' must have an `.onnx` extension", path.display()),
        }

        let data = std::fs::read(path)
            .with_context(|| format!("failed to read model from '{}'", path.display()))?;
        let model = tract_onnx::onnx()
            .model_for_read(&mut &*data)
            .with_context(|| format!("failed to parse model '{}'", path.display()))?;
        if model.inputs.len() != 1 {
            bail!(
                "model has to take 1 input tensor, this one takes {}",
                model.inputs.len()
            );
        }
        log::info!(
            "loaded model '{}' ({} outputs)",
            path.display(),
            model.outputs.len(),
        );

        Ok(Self {
            model,
            plans: HashMap::new(),
            stride,
        })
    }

    fn plan_for(&mut self, res: Resolution) -> anyhow::Result<&Plan> {
        if !self.plans.contains_key(&res) {
            let plan = self
                .model
                .clone()
                .with_input_fact(
                    0,
                    f32::fact([1, 3, res.height() as usize, res.width() as usize]).into(),
                )?
                .into_optimized()?
                .into_runnable()?;
            log::debug!("compiled inference plan for {res} input");
            self.plans.insert(res, plan);
        }
        Ok(&self.plans[&res])
    }
}

impl Infer for OnnxEngine {
    fn run(&mut self, image: &Frame) -> anyhow::Result<Outputs> {
        // The network downsamples by `stride`, so trailing rows and columns that don't fill a
        // whole stride cell are cut off.
        let width = image.width() - image.width() % self.stride;
        let height = image.height() - image.height() % self.stride;
        if width == 0 || height == 0 {
            bail!(
                "input of {} is smaller than the network stride ({})",
                image.resolution(),
                self.stride
            );
        }

        let data = image.data();
        let row_bytes = image.width() as usize * 4;
        let input = Tensor::from_shape_fn(
            [1, 3, height as usize, width as usize],
            |[_, c, y, x]| {
                // The network was trained on BGR frames.
                let value = data[y * row_bytes + x * 4 + (2 - c)];
                (f32::from(value) - INPUT_MEAN) * INPUT_SCALE
            },
        );

        let plan = self.plan_for(Resolution::new(width, height))?;
        let result = plan.run(tvec!(input.to_tract()?.into()))?;
        result.iter().map(|value| Tensor::from_tract(value)).collect()
    }
}

/// An owned n-dimensional array of `f32` values in row-major order.
#[derive(Clone)]
pub struct Tensor {
    shape: Vec<usize>,
    strides: Vec<usize>,
    data: Vec<f32>,
}

impl Tensor {
    /// Creates a tensor by invoking `f` with every index, in row-major order.
    pub fn from_shape_fn<const R: usize>(
        shape: [usize; R],
        mut f: impl FnMut([usize; R]) -> f32,
    ) -> Self {
        let len: usize = shape.iter().product();
        let mut data = Vec::with_capacity(len);
        if len != 0 {
            let mut index = [0; R];
            'odometer: loop {
                data.push(f(index));
                for i in (0..R).rev() {
                    index[i] += 1;
                    if index[i] < shape[i] {
                        continue 'odometer;
                    }
                    index[i] = 0;
                }
                break;
            }
        }
        Self::from_parts(shape.to_vec(), data)
    }

    /// Creates a tensor of the given shape from row-major data.
    ///
    /// # Panics
    ///
    /// `iter` must yield exactly as many values as `shape` has elements.
    pub fn from_iter<I: IntoIterator<Item = f32>>(shape: &[usize], iter: I) -> Self {
        let data: Vec<_> = iter.into_iter().collect();
        assert_eq!(data.len(), shape.iter().product::<usize>());
        Self::from_parts(shape.to_vec(), data)
    }

    fn from_parts(shape: Vec<usize>, data: Vec<f32>) -> Self {
        debug_assert_eq!(shape.iter().product::<usize>(), data.len());
        let mut strides = vec![1; shape.len()];
        for i in (0..shape.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * shape[i + 1];
        }
        Self {
            shape,
            strides,
            data,
        }
    }

    fn from_tract(tensor: &TractTensor) -> anyhow::Result<Self> {
        let data = tensor.as_slice::<f32>()?.to_vec();
        Ok(Self::from_parts(tensor.shape().to_vec(), data))
    }

    fn to_tract(&self) -> anyhow::Result<TractTensor> {
        Ok(TractTensor::from_shape(&self.shape, &self.data)?)
    }

    /// Returns the dimensions of this tensor.
    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns a view of the whole tensor.
    pub fn view(&self) -> TensorView<'_> {
        TensorView {
            shape: &self.shape,
            strides: &self.strides,
            data: &self.data,
        }
    }

    /// Returns a view of the sub-tensor selected by fixing the first `N` dimensions to `index`.
    pub fn index<const N: usize>(&self, index: [usize; N]) -> TensorView<'_> {
        self.view().index(index)
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor({:?})", self.shape)
    }
}

/// Borrowed view of a [`Tensor`] with zero or more leading dimensions fixed.
#[derive(Clone, Copy)]
pub struct TensorView<'a> {
    shape: &'a [usize],
    strides: &'a [usize],
    data: &'a [f32],
}

impl<'a> TensorView<'a> {
    /// Returns the dimensions of this view.
    #[inline]
    pub fn shape(&self) -> &'a [usize] {
        self.shape
    }

    /// Returns a view with the first `N` remaining dimensions fixed to `index`.
    pub fn index<const N: usize>(self, index: [usize; N]) -> TensorView<'a> {
        assert!(
            N <= self.shape.len(),
            "cannot index {N} dimensions of a view with shape {:?}",
            self.shape
        );
        let mut offset = 0;
        for i in 0..N {
            assert!(
                index[i] < self.shape[i],
                "index {index:?} out of bounds for shape {:?}",
                self.shape
            );
            offset += index[i] * self.strides[i];
        }
        let len = self.shape[N..].iter().product::<usize>();
        TensorView {
            shape: &self.shape[N..],
            strides: &self.strides[N..],
            data: &self.data[offset..offset + len],
        }
    }

    /// Returns the underlying data in row-major order.
    #[inline]
    pub fn as_slice(&self) -> &'a [f32] {
        self.data
    }

    /// Returns the value of a zero-dimensional view.
    pub fn as_singular(&self) -> f32 {
        assert!(
            self.shape.is_empty(),
            "as_singular called on view with shape {:?}",
            self.shape
        );
        self.data[0]
    }

    /// Iterates over the data in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = f32> + 'a {
        self.data.iter().copied()
    }
}

/// The result of an inference pass.
///
/// A list of tensors corresponding to the network's output nodes.
#[derive(Debug)]
pub struct Outputs {
    inner: Vec<Tensor>,
}

impl Outputs {
    /// Returns the number of output tensors.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns an iterator over the output tensors.
    pub fn iter(&self) -> std::slice::Iter<'_, Tensor> {
        self.inner.iter()
    }
}

impl Index<usize> for Outputs {
    type Output = Tensor;

    fn index(&self, index: usize) -> &Tensor {
        &self.inner[index]
    }
}

impl From<Vec<Tensor>> for Outputs {
    fn from(inner: Vec<Tensor>) -> Self {
        Self { inner }
    }
}

impl FromIterator<Tensor> for Outputs {
    fn from_iter<I: IntoIterator<Item = Tensor>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Outputs {
    type Item = &'a Tensor;
    type IntoIter = std::slice::Iter<'a, Tensor>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_fn_fills_row_major() {
        let tensor = Tensor::from_shape_fn([2, 3], |[y, x]| (y * 3 + x) as f32);
        assert_eq!(tensor.shape(), [2, 3]);
        assert_eq!(tensor.view().as_slice(), [0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn view_indexing() {
        let tensor = Tensor::from_shape_fn([2, 3], |[y, x]| (y * 3 + x) as f32);
        let row = tensor.index([1]);
        assert_eq!(row.shape(), [3]);
        assert_eq!(row.as_slice(), [3.0, 4.0, 5.0]);
        assert_eq!(tensor.index([1, 2]).as_singular(), 5.0);
        assert_eq!(row.index([0]).as_singular(), 3.0);
    }

    #[test]
    #[should_panic]
    fn view_indexing_is_bounds_checked() {
        let tensor = Tensor::from_shape_fn([2, 3], |_| 0.0);
        tensor.index([0, 3]);
    }

    #[test]
    fn tract_roundtrip() {
        let tensor = Tensor::from_iter(&[1, 2, 2], [1.0, 2.0, 3.0, 4.0]);
        let back = Tensor::from_tract(&tensor.to_tract().unwrap()).unwrap();
        assert_eq!(back.shape(), [1, 2, 2]);
        assert_eq!(back.view().as_slice(), [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn unsupported_device_is_rejected_before_model_load() {
        let err = OnnxEngine::load("does-not-exist.onnx", "MYRIAD", 8).unwrap_err();
        assert!(err.to_string().contains("MYRIAD"));

        // Lowercase is rejected as well.
        assert!(OnnxEngine::load("does-not-exist.onnx", "cpu", 8).is_err());
    }

    #[test]
    fn model_path_needs_onnx_extension() {
        let err = OnnxEngine::load("model.xml", "CPU", 8).unwrap_err();
        assert!(err.to_string().contains(".onnx"));
    }
}
