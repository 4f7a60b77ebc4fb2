use burn::config::Config;
use burn::module::{Module, Param};
use burn::nn::{Linear, LinearConfig};
use burn::prelude::Backend;
use burn::tensor::{Distribution, Tensor, TensorData};

/// SquarePlus 活性化関数 `σ(x) = (x + √(x² + 4)) / 2`。
pub fn squareplus<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    let root = x.clone().powf_scalar(2.0).add_scalar(4.0).sqrt();
    (x + root).div_scalar(2.0)
}

/// SquarePlus の導関数 `σ'(x) = (1 + x / √(x² + 4)) / 2`。
pub fn squareplus_derivative<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    let root = x.clone().powf_scalar(2.0).add_scalar(4.0).sqrt();
    x.div(root).add_scalar(1.0).div_scalar(2.0)
}

/// SquarePlus を活性化に使う多層パーセプトロン（MLP）。
#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    linears: Vec<Linear<B>>,
}

impl<B: Backend> Mlp<B> {
    /// 各層の幅 `sizes = [入力, 隠れ..., 出力]` からモデルを初期化します。
    ///
    /// # Panics
    ///
    /// `sizes` の要素が 2 個未満のとき。
    pub fn new(sizes: &[usize], device: &B::Device) -> Self {
        assert!(sizes.len() >= 2, "MLP には入力と出力の幅が必要です");
        let linears = sizes
            .windows(2)
            .map(|w| LinearConfig::new(w[0], w[1]).init(device))
            .collect();
        Self { linears }
    }

    /// モデルの順伝播を実行します。
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = input;
        for i in 0..(self.linears.len() - 1) {
            x = self.linears[i].forward(x);
            x = squareplus(x);
        }
        self.linears[self.linears.len() - 1].forward(x)
    }

    /// 順伝播の出力と、出力の和の入力に関する勾配を返します。
    ///
    /// 勾配は逆伝播をテンソル演算で書き下したものなので、
    /// 結果はパラメータについてさらに微分できます。
    pub fn forward_with_input_grad(&self, input: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let (hidden, last) = self.linears.split_at(self.linears.len() - 1);
        let last = &last[0];

        let mut pre_activations = Vec::with_capacity(hidden.len());
        let mut x = input;
        for linear in hidden {
            let z = linear.forward(x);
            x = squareplus(z.clone());
            pre_activations.push(z);
        }
        let output = last.forward(x);

        let [batch, _] = output.dims();
        let [_, d_out] = last.weight.val().dims();
        let mut grad = Tensor::<B, 2>::ones([batch, d_out], &output.device())
            .matmul(last.weight.val().transpose());
        for (linear, z) in hidden.iter().zip(pre_activations).rev() {
            grad = (grad * squareplus_derivative(z)).matmul(linear.weight.val().transpose());
        }
        (output, grad)
    }
}

/// 学習対象のハミルトニアン
///
/// ```text
/// H(x, v) = Σ_i ke_i |v_i|² + PE(flatten(x))
/// ```
///
/// `PE` はMLP、`ke` は粒子ごとの運動エネルギー係数です。
/// 抵抗を有効にした場合は、運動量成分ごとに `-|mlp(v_k)| v_k` を加えます。
#[derive(Module, Debug)]
pub struct HamiltonianModel<B: Backend> {
    potential: Mlp<B>,
    kinetic: Param<Tensor<B, 1>>,
    drag: Option<Mlp<B>>,
    train_kinetic: bool,
}

#[derive(Config, Debug)]
pub struct HamiltonianModelConfig {
    pub n_particles: usize,
    pub dim: usize,
    #[config(default = 256)]
    pub hidden: usize,
    #[config(default = 2)]
    pub n_hidden: usize,
    /// `false` のとき運動エネルギー係数を 0.5（単位質量）に固定します
    #[config(default = true)]
    pub train_kinetic: bool,
    #[config(default = false)]
    pub drag: bool,
}

impl HamiltonianModelConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> HamiltonianModel<B> {
        let width = self.n_particles * self.dim;
        let mut sizes = vec![width];
        sizes.extend(std::iter::repeat_n(self.hidden, self.n_hidden));
        sizes.push(1);

        let kinetic = if self.train_kinetic {
            Tensor::random([self.n_particles], Distribution::Normal(0.0, 1.0), device)
        } else {
            Tensor::full([self.n_particles], 0.5, device)
        };

        HamiltonianModel {
            potential: Mlp::new(&sizes, device),
            kinetic: Param::from_tensor(kinetic),
            drag: self.drag.then(|| Mlp::new(&[1, 5, 5, 1], device)),
            train_kinetic: self.train_kinetic,
        }
    }
}

impl<B: Backend> HamiltonianModel<B> {
    /// 粒子ごとの係数を座標成分ごとに並べた `[1, N*dim]` のテンソル。
    fn kinetic_per_coordinate(&self, width: usize) -> Tensor<B, 2> {
        let ke = self.kinetic.val();
        let ke = if self.train_kinetic { ke } else { ke.detach() };
        let [n] = ke.dims();
        let dim = width / n;
        let mut expand = vec![0.0f32; n * width];
        for i in 0..n {
            for k in 0..dim {
                expand[i * width + i * dim + k] = 1.0;
            }
        }
        let expand = Tensor::<B, 2>::from_data(TensorData::new(expand, [n, width]), &ke.device());
        ke.unsqueeze::<2>().matmul(expand)
    }

    pub fn kinetic_coefficients(&self) -> Tensor<B, 1> {
        self.kinetic.val()
    }

    /// バッチの各状態におけるエネルギー `[batch, 1]`。
    pub fn energy(&self, positions: Tensor<B, 2>, momenta: Tensor<B, 2>) -> Tensor<B, 2> {
        let [_, width] = momenta.dims();
        let kinetic = (momenta.clone() * momenta)
            .mul(self.kinetic_per_coordinate(width))
            .sum_dim(1);
        kinetic + self.potential.forward(positions)
    }

    /// 位相空間の右辺 `zdot = [∂H/∂v ; -∂H/∂x + drag(v)]` を `[batch, 2N*dim]` で返します。
    pub fn zdot(&self, positions: Tensor<B, 2>, momenta: Tensor<B, 2>) -> Tensor<B, 2> {
        let [_, width] = momenta.dims();
        let dh_dv = momenta
            .clone()
            .mul(self.kinetic_per_coordinate(width))
            .mul_scalar(2.0);
        let (_, dh_dx) = self.potential.forward_with_input_grad(positions);
        let mut pdot = dh_dx.neg();
        if let Some(drag) = &self.drag {
            pdot = pdot + drag_force(drag, momenta);
        }
        Tensor::cat(vec![dh_dv, pdot], 1)
    }
}

fn drag_force<B: Backend>(drag: &Mlp<B>, momenta: Tensor<B, 2>) -> Tensor<B, 2> {
    let [batch, width] = momenta.dims();
    let scale = drag
        .forward(momenta.clone().reshape([batch * width, 1]))
        .abs()
        .reshape([batch, width]);
    scale.mul(momenta).neg()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray<f32>>;

    fn to_vec<B: Backend, const D: usize>(t: Tensor<B, D>) -> Vec<f32> {
        t.into_data().to_vec::<f32>().unwrap()
    }

    fn assert_close(a: &[f32], b: &[f32], tol: f32) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() <= tol * (1.0 + y.abs()), "{x} vs {y}");
        }
    }

    #[test]
    #[should_panic(expected = "入力と出力の幅")]
    fn mlp_needs_input_and_output_sizes() {
        let device = Default::default();
        let _ = Mlp::<NdArray<f32>>::new(&[4], &device);
    }

    #[test]
    fn squareplus_values() {
        let device = Default::default();
        let x = Tensor::<NdArray<f32>, 1>::from_floats([-2.0, 0.0, 1.5], &device);
        let y = to_vec(squareplus(x.clone()));
        assert_close(&y, &[(-2.0 + 8f32.sqrt()) / 2.0, 1.0, 2.0], 1e-5);
        let dy = to_vec(squareplus_derivative(x));
        assert_close(&dy, &[(1.0 - 2.0 / 8f32.sqrt()) / 2.0, 0.5, 0.8], 1e-5);
    }

    #[test]
    fn hand_written_input_grad_matches_autodiff() {
        let device = Default::default();
        let mlp = Mlp::<TestBackend>::new(&[4, 8, 8, 1], &device);
        let input = Tensor::<TestBackend, 2>::random([3, 4], Distribution::Normal(0.0, 1.0), &device)
            .require_grad();
        let (output, grad) = mlp.forward_with_input_grad(input.clone());
        let grads = output.sum().backward();
        let expected = input.grad(&grads).unwrap();
        assert_close(&to_vec(grad), &to_vec(expected), 1e-4);
    }

    #[test]
    fn input_grad_is_differentiable_in_weights() {
        let device = Default::default();
        let mlp = Mlp::<TestBackend>::new(&[2, 4, 1], &device);
        let input = Tensor::<TestBackend, 2>::ones([5, 2], &device);
        let (_, grad) = mlp.forward_with_input_grad(input);
        let grads = grad.powf_scalar(2.0).sum().backward();
        assert!(mlp.linears[0].weight.grad(&grads).is_some());
        assert!(mlp.linears[1].weight.grad(&grads).is_some());
    }

    #[test]
    fn fixed_kinetic_term_gives_unit_mass_velocity() {
        let device = Default::default();
        let model = HamiltonianModelConfig::new(2, 2)
            .with_hidden(8)
            .with_train_kinetic(false)
            .init::<NdArray<f32>>(&device);
        let positions = Tensor::<NdArray<f32>, 2>::zeros([1, 4], &device);
        let momenta = Tensor::<NdArray<f32>, 2>::from_floats([[1.0, -2.0, 0.5, 3.0]], &device);
        let zdot = model.zdot(positions, momenta);
        assert_eq!(zdot.dims(), [1, 8]);
        let values = to_vec(zdot);
        assert_close(&values[..4], &[1.0, -2.0, 0.5, 3.0], 1e-5);
    }

    #[test]
    fn kinetic_coefficients_are_per_particle() {
        let device = Default::default();
        let model = HamiltonianModelConfig::new(2, 3)
            .with_hidden(4)
            .init::<NdArray<f32>>(&device);
        let ke = to_vec(model.kinetic_coefficients());
        let positions = Tensor::<NdArray<f32>, 2>::zeros([1, 6], &device);
        let momenta = Tensor::<NdArray<f32>, 2>::ones([1, 6], &device);
        let zdot = to_vec(model.zdot(positions, momenta));
        let expected: Vec<f32> = ke.iter().flat_map(|k| [2.0 * k; 3]).collect();
        assert_close(&zdot[..6], &expected, 1e-5);
    }

    #[test]
    fn energy_has_one_value_per_state() {
        let device = Default::default();
        let model = HamiltonianModelConfig::new(3, 2)
            .with_hidden(4)
            .init::<NdArray<f32>>(&device);
        let positions = Tensor::<NdArray<f32>, 2>::zeros([5, 6], &device);
        let momenta = Tensor::<NdArray<f32>, 2>::ones([5, 6], &device);
        assert_eq!(model.energy(positions, momenta).dims(), [5, 1]);
    }

    #[test]
    fn drag_opposes_momentum() {
        let device = Default::default();
        let mlp = Mlp::<NdArray<f32>>::new(&[1, 5, 5, 1], &device);
        let momenta = Tensor::<NdArray<f32>, 2>::from_floats([[1.0, -1.0]], &device);
        let force = to_vec(drag_force(&mlp, momenta));
        assert!(force[0] <= 0.0);
        assert!(force[1] >= 0.0);
    }
}
