//! Adam with L2 weight decay.
//!
//! ```text
//! g ← g + λ·θ
//! m ← β₁·m + (1 − β₁)·g
//! v ← β₂·v + (1 − β₂)·g²
//! θ ← θ − lr · m̂ / (√v̂ + ε)      m̂ = m / (1 − β₁ᵗ),  v̂ = v / (1 − β₂ᵗ)
//! ```
use ndarray::{Array, Dimension};

#[derive(Debug, Clone)]
pub struct Adam {
    pub lr: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
    pub weight_decay: f64,
    t: i32,
    /// First and second moments per parameter slot.
    slots: Vec<(Vec<f32>, Vec<f32>)>,
}

impl Adam {
    pub fn new(lr: f64, weight_decay: f64) -> Self {
        Self {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay,
            t: 0,
            slots: Vec::new(),
        }
    }

    /// Advance the step counter. Call once per optimisation step, before the
    /// [`Adam::update`] calls of that step.
    pub fn begin_step(&mut self) {
        self.t += 1;
    }

    pub fn steps(&self) -> i32 {
        self.t
    }

    /// Update one parameter tensor in place. `slot` identifies the tensor
    /// across steps.
    pub fn update<D: Dimension>(&mut self, slot: usize, param: &mut Array<f32, D>, grad: &Array<f32, D>) {
        debug_assert_eq!(param.shape(), grad.shape());
        if self.slots.len() <= slot {
            self.slots.resize_with(slot + 1, Default::default);
        }
        let (b1, b2, eps, wd) = (self.beta1, self.beta2, self.eps, self.weight_decay);
        let t = self.t.max(1);
        let bc1 = 1.0 - b1.powi(t);
        let bc2 = 1.0 - b2.powi(t);
        let lr = self.lr;

        let (m, v) = &mut self.slots[slot];
        if m.len() != param.len() {
            *m = vec![0.0; param.len()];
            *v = vec![0.0; param.len()];
        }

        for ((p, &g), (m, v)) in param
            .iter_mut()
            .zip(grad.iter())
            .zip(m.iter_mut().zip(v.iter_mut()))
        {
            let g = g as f64 + wd * *p as f64;
            let mn = b1 * *m as f64 + (1.0 - b1) * g;
            let vn = b2 * *v as f64 + (1.0 - b2) * g * g;
            *m = mn as f32;
            *v = vn as f32;
            let step = lr * (mn / bc1) / ((vn / bc2).sqrt() + eps);
            *p = (*p as f64 - step) as f32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    #[test]
    fn first_step_moves_by_lr() {
        // With bias correction the first Adam step is lr · sign(g).
        let mut opt = Adam::new(0.1, 0.0);
        let mut p = Array1::from(vec![1.0_f32, -1.0]);
        let g = Array1::from(vec![3.0_f32, -0.5]);
        opt.begin_step();
        opt.update(0, &mut p, &g);
        approx::assert_abs_diff_eq!(p[0], 0.9, epsilon = 1e-5);
        approx::assert_abs_diff_eq!(p[1], -0.9, epsilon = 1e-5);
    }

    #[test]
    fn minimises_a_quadratic() {
        let mut opt = Adam::new(0.05, 0.0);
        let mut p = Array1::from(vec![4.0_f32]);
        for _ in 0..500 {
            let g = p.mapv(|x| 2.0 * (x - 1.0));
            opt.begin_step();
            opt.update(0, &mut p, &g);
        }
        approx::assert_abs_diff_eq!(p[0], 1.0, epsilon = 5e-2);
    }

    #[test]
    fn weight_decay_shrinks_without_gradient() {
        let mut opt = Adam::new(0.01, 0.1);
        let mut p = Array1::from(vec![2.0_f32]);
        let g = Array1::zeros(1);
        for _ in 0..10 {
            opt.begin_step();
            opt.update(0, &mut p, &g);
        }
        assert!(p[0] < 2.0);
    }
}
