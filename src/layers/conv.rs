//! 2D convolution over `[batch, channels, height, width]` feature maps.
//!
//! The convolution is lowered to a matrix product: every receptive field is
//! unrolled into a row of a patch matrix (`im2col`), multiplied with the
//! flattened kernels, and the input gradient is folded back (`col2im`).

use ndarray::{s, Array1, Array2, Array4, ArrayD, ArrayViewD, ArrayViewMutD, Axis, Ix4};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::initialization::WeightInit;
use super::traits::Layer;
use crate::activations::Activation;
use crate::error::{DqnError, Result};

/// Zero-padding policy, following the TensorFlow conventions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Padding {
    /// Output size is `ceil(input / stride)`; odd padding puts the extra row/column after.
    #[default]
    Same,
    /// No padding; output size is `(input - kernel) / stride + 1`.
    Valid,
}

impl Padding {
    /// Output size and `(before, after)` padding along one spatial axis.
    pub fn resolve(&self, input: usize, kernel: usize, stride: usize) -> Result<(usize, usize, usize)> {
        match self {
            Padding::Same => {
                let out = (input + stride - 1) / stride;
                let total = ((out.max(1) - 1) * stride + kernel).saturating_sub(input);
                let before = total / 2;
                Ok((out, before, total - before))
            }
            Padding::Valid => {
                if input < kernel {
                    return Err(DqnError::invalid_parameter(
                        "kernel_size".to_string(),
                        format!("kernel {} larger than input {} with valid padding", kernel, input),
                    ));
                }
                Ok(((input - kernel) / stride + 1, 0, 0))
            }
        }
    }
}

#[derive(Clone)]
struct ConvCache {
    input_dim: (usize, usize, usize, usize),
    padded_dim: (usize, usize),
    pads: (usize, usize),
    out_dim: (usize, usize),
    patches: Array2<f32>,
    pre_activation: Array2<f32>,
}

/// 2D Convolutional Layer
#[derive(Serialize, Deserialize, Clone)]
pub struct Conv2DLayer {
    /// Convolution kernels `[out_channels, in_channels, kernel_height, kernel_width]`
    pub kernels: Array4<f32>,

    /// Bias terms for each output channel
    pub biases: Array1<f32>,

    pub activation: Activation,
    pub stride: (usize, usize),
    pub padding: Padding,

    #[serde(skip)]
    cache: Option<ConvCache>,

    #[serde(skip)]
    kernel_gradients: Option<Array4<f32>>,

    #[serde(skip)]
    bias_gradients: Option<Array1<f32>>,
}

impl Conv2DLayer {
    pub fn new<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        kernel_size: (usize, usize),
        stride: (usize, usize),
        padding: Padding,
        activation: Activation,
        rng: &mut R,
    ) -> Result<Self> {
        if stride.0 == 0 || stride.1 == 0 || kernel_size.0 == 0 || kernel_size.1 == 0 {
            return Err(DqnError::invalid_parameter(
                "conv2d".to_string(),
                format!("kernel {:?} and stride {:?} must be positive", kernel_size, stride),
            ));
        }
        let fan_in = in_channels * kernel_size.0 * kernel_size.1;
        let fan_out = out_channels * kernel_size.0 * kernel_size.1;
        let kernels = WeightInit::for_activation(&activation)
            .initialize(
                &[out_channels, in_channels, kernel_size.0, kernel_size.1],
                fan_in,
                fan_out,
                rng,
            )?
            .into_dimensionality::<Ix4>()?;

        Ok(Conv2DLayer {
            kernels,
            biases: Array1::zeros(out_channels),
            activation,
            stride,
            padding,
            cache: None,
            kernel_gradients: None,
            bias_gradients: None,
        })
    }

    pub fn in_channels(&self) -> usize {
        self.kernels.dim().1
    }

    pub fn out_channels(&self) -> usize {
        self.kernels.dim().0
    }

    pub fn kernel_size(&self) -> (usize, usize) {
        let (_, _, kh, kw) = self.kernels.dim();
        (kh, kw)
    }

    /// Kernels flattened to `[out_channels, in_channels * kh * kw]`
    fn kernel_matrix(&self) -> Result<Array2<f32>> {
        let (oc, ic, kh, kw) = self.kernels.dim();
        Ok(self.kernels.as_standard_layout().into_owned().into_shape((oc, ic * kh * kw))?)
    }

    fn pad_input(input: &Array4<f32>, pads_h: (usize, usize), pads_w: (usize, usize)) -> Array4<f32> {
        if pads_h == (0, 0) && pads_w == (0, 0) {
            return input.clone();
        }
        let (batch, channels, height, width) = input.dim();
        let mut padded = Array4::zeros((
            batch,
            channels,
            height + pads_h.0 + pads_h.1,
            width + pads_w.0 + pads_w.1,
        ));
        padded
            .slice_mut(s![.., .., pads_h.0..pads_h.0 + height, pads_w.0..pads_w.0 + width])
            .assign(input);
        padded
    }

    /// Unroll receptive fields into rows of `[batch * out_h * out_w, in_channels * kh * kw]`
    fn im2col(&self, padded: &Array4<f32>, out_h: usize, out_w: usize) -> Array2<f32> {
        let (batch, channels, _, _) = padded.dim();
        let (kh, kw) = self.kernel_size();
        let mut patches = Array2::zeros((batch * out_h * out_w, channels * kh * kw));
        for b in 0..batch {
            for oh in 0..out_h {
                for ow in 0..out_w {
                    let row = (b * out_h + oh) * out_w + ow;
                    let h0 = oh * self.stride.0;
                    let w0 = ow * self.stride.1;
                    let window = padded.slice(s![b, .., h0..h0 + kh, w0..w0 + kw]);
                    for (dst, &src) in patches.row_mut(row).iter_mut().zip(window.iter()) {
                        *dst = src;
                    }
                }
            }
        }
        patches
    }

    fn compute(&self, inputs: ArrayViewD<f32>) -> Result<(Array4<f32>, ConvCache)> {
        let input = inputs
            .into_dimensionality::<Ix4>()
            .map_err(|_| {
                DqnError::dimension_mismatch(
                    "[batch, channels, height, width]".to_string(),
                    "tensor of another rank".to_string(),
                )
            })?
            .to_owned();
        let (batch, channels, height, width) = input.dim();
        if channels != self.in_channels() {
            return Err(DqnError::dimension_mismatch(
                format!("{} input channels", self.in_channels()),
                format!("{}", channels),
            ));
        }
        let (kh, kw) = self.kernel_size();
        let (out_h, top, bottom) = self.padding.resolve(height, kh, self.stride.0)?;
        let (out_w, left, right) = self.padding.resolve(width, kw, self.stride.1)?;

        let padded = Self::pad_input(&input, (top, bottom), (left, right));
        let patches = self.im2col(&padded, out_h, out_w);
        let pre_activation = patches.dot(&self.kernel_matrix()?.t()) + &self.biases.view().insert_axis(Axis(0));

        let mut activated = pre_activation.clone();
        self.activation.apply(&mut activated);
        let output = activated
            .into_shape((batch, out_h, out_w, self.out_channels()))?
            .permuted_axes([0, 3, 1, 2])
            .as_standard_layout()
            .into_owned();

        let cache = ConvCache {
            input_dim: (batch, channels, height, width),
            padded_dim: (padded.dim().2, padded.dim().3),
            pads: (top, left),
            out_dim: (out_h, out_w),
            patches,
            pre_activation,
        };
        Ok((output, cache))
    }
}

impl Layer for Conv2DLayer {
    fn forward_batch(&mut self, inputs: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        let (output, cache) = self.compute(inputs)?;
        self.cache = Some(cache);
        Ok(output.into_dyn())
    }

    fn infer_batch(&self, inputs: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        Ok(self.compute(inputs)?.0.into_dyn())
    }

    fn backward_batch(&mut self, output_gradient: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        let cache = self.cache.as_ref().ok_or_else(|| {
            DqnError::Numerical("forward_batch() must be called before backward_batch()".to_string())
        })?;
        let (batch, channels, height, width) = cache.input_dim;
        let (out_h, out_w) = cache.out_dim;
        let (kh, kw) = self.kernel_size();
        let out_channels = self.out_channels();

        // [batch, oc, oh, ow] -> [batch * oh * ow, oc], matching the patch rows
        let grad = output_gradient
            .into_dimensionality::<Ix4>()?
            .permuted_axes([0, 2, 3, 1])
            .as_standard_layout()
            .into_owned()
            .into_shape((batch * out_h * out_w, out_channels))?;
        let grad = grad * &self.activation.derivative(cache.pre_activation.view());

        let kernel_gradients = grad.t().dot(&cache.patches).into_shape(self.kernels.raw_dim())?;
        let bias_gradients = grad.sum_axis(Axis(0));
        let patch_gradients = grad.dot(&self.kernel_matrix()?);

        let mut padded_gradient = Array4::<f32>::zeros((batch, channels, cache.padded_dim.0, cache.padded_dim.1));
        for b in 0..batch {
            for oh in 0..out_h {
                for ow in 0..out_w {
                    let row = (b * out_h + oh) * out_w + ow;
                    let h0 = oh * self.stride.0;
                    let w0 = ow * self.stride.1;
                    let contribution = patch_gradients.row(row).into_shape((channels, kh, kw))?;
                    let mut window = padded_gradient.slice_mut(s![b, .., h0..h0 + kh, w0..w0 + kw]);
                    window += &contribution;
                }
            }
        }

        let (top, left) = cache.pads;
        let input_gradient = padded_gradient
            .slice(s![.., .., top..top + height, left..left + width])
            .to_owned();

        self.kernel_gradients = Some(kernel_gradients);
        self.bias_gradients = Some(bias_gradients);
        Ok(input_gradient.into_dyn())
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        match input_shape {
            [channels, height, width] if *channels == self.in_channels() => {
                let (kh, kw) = self.kernel_size();
                let (out_h, _, _) = self.padding.resolve(*height, kh, self.stride.0)?;
                let (out_w, _, _) = self.padding.resolve(*width, kw, self.stride.1)?;
                Ok(vec![self.out_channels(), out_h, out_w])
            }
            _ => Err(DqnError::dimension_mismatch(
                format!("[{}, height, width]", self.in_channels()),
                format!("{:?}", input_shape),
            )),
        }
    }

    fn parameters(&self) -> Vec<ArrayD<f32>> {
        vec![self.kernels.clone().into_dyn(), self.biases.clone().into_dyn()]
    }

    fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, f32>> {
        vec![self.kernels.view_mut().into_dyn(), self.biases.view_mut().into_dyn()]
    }

    fn gradients(&self) -> Vec<ArrayD<f32>> {
        match (&self.kernel_gradients, &self.bias_gradients) {
            (Some(k), Some(b)) => vec![k.clone().into_dyn(), b.clone().into_dyn()],
            _ => Vec::new(),
        }
    }

    fn name(&self) -> &'static str {
        "conv2d"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_same_padding_output_shape() {
        assert_eq!(Padding::Same.resolve(210, 7, 2).unwrap(), (105, 2, 3));
        assert_eq!(Padding::Same.resolve(5, 3, 1).unwrap(), (5, 1, 1));
        assert_eq!(Padding::Same.resolve(5, 2, 2).unwrap(), (3, 0, 1));
        assert_eq!(Padding::Valid.resolve(5, 3, 1).unwrap(), (3, 0, 0));
        assert!(Padding::Valid.resolve(2, 3, 1).is_err());
    }

    #[test]
    fn test_conv2d_forward_shape() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut layer = Conv2DLayer::new(1, 2, (3, 3), (2, 2), Padding::Same, Activation::Relu, &mut rng).unwrap();
        let input = ArrayD::<f32>::ones(ndarray::IxDyn(&[2, 1, 5, 4]));
        let output = layer.forward_batch(input.view()).unwrap();
        assert_eq!(output.shape(), &[2, 2, 3, 2]);
        assert_eq!(layer.output_shape(&[1, 5, 4]).unwrap(), vec![2, 3, 2]);
    }

    #[test]
    fn test_identity_kernel_copies_input() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut layer = Conv2DLayer::new(1, 1, (3, 3), (1, 1), Padding::Same, Activation::Linear, &mut rng).unwrap();
        layer.kernels.fill(0.0);
        layer.kernels[[0, 0, 1, 1]] = 1.0;
        let input = Array4::from_shape_fn((1, 1, 3, 4), |(_, _, h, w)| (h * 4 + w) as f32).into_dyn();
        let output = layer.infer_batch(input.view()).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_conv2d_gradient_matches_finite_difference() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut layer = Conv2DLayer::new(2, 2, (3, 3), (2, 2), Padding::Same, Activation::Linear, &mut rng).unwrap();
        let input = Array4::from_shape_fn((1, 2, 5, 5), |(_, c, h, w)| ((c + 2 * h + 3 * w) % 7) as f32 / 7.0).into_dyn();

        let output = layer.forward_batch(input.view()).unwrap();
        let input_grad = layer.backward_batch(ArrayD::ones(output.raw_dim()).view()).unwrap();
        let kernel_grad = layer.gradients()[0].clone();

        let h = 1e-2;
        for &(oc, ic, i, j) in &[(0, 0, 0, 0), (1, 1, 2, 1), (0, 1, 1, 2)] {
            let mut plus = layer.clone();
            plus.kernels[[oc, ic, i, j]] += h;
            let mut minus = layer.clone();
            minus.kernels[[oc, ic, i, j]] -= h;
            let numeric = (plus.infer_batch(input.view()).unwrap().sum()
                - minus.infer_batch(input.view()).unwrap().sum())
                / (2.0 * h);
            assert!((numeric - kernel_grad[[oc, ic, i, j]]).abs() < 1e-2);
        }

        for &(c, y, x) in &[(0, 0, 0), (1, 4, 4), (0, 2, 3)] {
            let mut plus = input.clone();
            plus[[0, c, y, x]] += h;
            let mut minus = input.clone();
            minus[[0, c, y, x]] -= h;
            let numeric = (layer.infer_batch(plus.view()).unwrap().sum()
                - layer.infer_batch(minus.view()).unwrap().sum())
                / (2.0 * h);
            assert!((numeric - input_grad[[0, c, y, x]]).abs() < 1e-2);
        }
    }
}
