//! Secure Triplet Loss.
//!
//! Every triplet is embedded four times: anchor, positive and negative under
//! key `k1`, and the positive again under a second key `k2`. With Euclidean
//! distances
//!
//! ```text
//! d_ap  = ‖a − p‖     d_an = ‖a − n‖     d_ap2 = ‖a − p₂‖
//! ```
//!
//! the loss is
//!
//! ```text
//! L = γ · mean( max(0, d_ap − min(d_an, d_ap2) + margin) )   discriminative + cancelable
//!   + (1 − γ) · link(SI, DI)                                 non-linkability
//! ```
//!
//! where `SI = d_ap2` (same identity, different keys) and `DI = d_an`
//! (different identities). Two `link` penalties are provided:
//!
//! | variant                 | link(SI, DI)                                   |
//! |-------------------------|------------------------------------------------|
//! | [`SecureTripletLossKld`] | KL( N(μ_SI, σ_SI) ‖ N(μ_DI, σ_DI) )            |
//! | [`SecureTripletLossSl`]  | \|μ_SI − μ_DI\| + \|σ_SI − σ_DI\|              |
//!
//! [`SecureTripletLoss::compute`] also returns the gradient of `L` with
//! respect to each of the four embedding matrices so that a model can
//! back-propagate through its own layers.
use ndarray::{Array2, ArrayView1, Zip};
use serde::{Deserialize, Serialize};

/// Added to variances before taking square roots.
pub const VAR_EPS: f64 = 1e-4;
/// Lower bound on a distance when normalising its direction.
const DIST_EPS: f64 = 1e-12;

/// The four embeddings of a batch, each `[B, D]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SecureEmbeddings {
    pub anchor: Array2<f32>,
    pub positive: Array2<f32>,
    pub negative: Array2<f32>,
    /// Positive sample embedded with the second key.
    pub positive_rekeyed: Array2<f32>,
}

impl SecureEmbeddings {
    pub fn batch_size(&self) -> usize {
        self.anchor.nrows()
    }

    fn zeros_like(&self) -> Self {
        let z = Array2::zeros(self.anchor.raw_dim());
        Self {
            anchor: z.clone(),
            positive: z.clone(),
            negative: z.clone(),
            positive_rekeyed: z,
        }
    }
}

/// Loss value, its gradient and a batch accuracy figure.
#[derive(Debug, Clone)]
pub struct LossOutput {
    pub loss: f32,
    /// ∂L/∂embedding, same shapes as the input.
    pub grads: SecureEmbeddings,
    /// Fraction of triplets with `d_ap < d_an`.
    pub triplet_accuracy: f32,
}

/// Value of a linkability penalty and its gradient w.r.t. each distance.
#[derive(Debug, Clone)]
pub struct Linkability {
    pub value: f64,
    pub d_si: Vec<f64>,
    pub d_di: Vec<f64>,
}

/// Mean and (population) standard deviation with [`VAR_EPS`].
#[derive(Debug, Clone, Copy)]
pub struct Moments {
    pub mean: f64,
    pub std: f64,
}

impl Moments {
    pub fn of(x: &[f64]) -> Self {
        let n = x.len().max(1) as f64;
        let mean = x.iter().sum::<f64>() / n;
        let var = x.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        Self { mean, std: (var + VAR_EPS).sqrt() }
    }

    /// Chain `∂L/∂μ` and `∂L/∂σ` down to every sample.
    fn backprop(&self, x: &[f64], d_mean: f64, d_std: f64) -> Vec<f64> {
        let n = x.len().max(1) as f64;
        x.iter()
            .map(|&v| d_mean / n + d_std * (v - self.mean) / (n * self.std))
            .collect()
    }
}

/// A Secure Triplet Loss variant.
///
/// Implementors supply the linkability penalty; the discriminative term and
/// the gradient plumbing are shared.
pub trait SecureTripletLoss {
    fn name(&self) -> &'static str;
    fn margin(&self) -> f32;
    /// Weight of the discriminative term.
    fn gamma(&self) -> f32;

    /// Penalty on the SI / DI distance distributions.
    fn linkability(&self, si: &[f64], di: &[f64]) -> Linkability;

    fn compute(&self, emb: &SecureEmbeddings) -> LossOutput {
        let b = emb.batch_size();
        let mut grads = emb.zeros_like();
        if b == 0 {
            return LossOutput { loss: 0.0, grads, triplet_accuracy: 0.0 };
        }
        let gamma = self.gamma() as f64;
        let margin = self.margin() as f64;

        let d_ap = distances(&emb.anchor, &emb.positive);
        let d_an = distances(&emb.anchor, &emb.negative);
        let d_ap2 = distances(&emb.anchor, &emb.positive_rekeyed);

        // ∂L/∂d for the three distance vectors.
        let mut g_ap = vec![0.0_f64; b];
        let mut g_an = vec![0.0_f64; b];
        let mut g_ap2 = vec![0.0_f64; b];

        let mut hinge = 0.0;
        for i in 0..b {
            let h = d_ap[i] - d_an[i].min(d_ap2[i]) + margin;
            if h > 0.0 {
                hinge += h;
                let w = gamma / b as f64;
                g_ap[i] += w;
                if d_an[i] <= d_ap2[i] {
                    g_an[i] -= w;
                } else {
                    g_ap2[i] -= w;
                }
            }
        }
        let hinge = hinge / b as f64;

        let link = self.linkability(&d_ap2, &d_an);
        for i in 0..b {
            g_ap2[i] += (1.0 - gamma) * link.d_si[i];
            g_an[i] += (1.0 - gamma) * link.d_di[i];
        }

        let loss = gamma * hinge + (1.0 - gamma) * link.value;

        for i in 0..b {
            let a = emb.anchor.row(i);
            accumulate(a, emb.positive.row(i), d_ap[i], g_ap[i], &mut grads.anchor, &mut grads.positive, i);
            accumulate(a, emb.negative.row(i), d_an[i], g_an[i], &mut grads.anchor, &mut grads.negative, i);
            accumulate(
                a,
                emb.positive_rekeyed.row(i),
                d_ap2[i],
                g_ap2[i],
                &mut grads.anchor,
                &mut grads.positive_rekeyed,
                i,
            );
        }

        let correct = d_ap.iter().zip(&d_an).filter(|(p, n)| p < n).count();
        LossOutput {
            loss: loss as f32,
            grads,
            triplet_accuracy: correct as f32 / b as f32,
        }
    }
}

/// Row-wise Euclidean distances.
fn distances(x: &Array2<f32>, y: &Array2<f32>) -> Vec<f64> {
    x.rows()
        .into_iter()
        .zip(y.rows())
        .map(|(a, b)| {
            a.iter()
                .zip(b.iter())
                .map(|(&u, &v)| {
                    let d = u as f64 - v as f64;
                    d * d
                })
                .sum::<f64>()
                .sqrt()
        })
        .collect()
}

/// Add `g · ∂d/∂u` to the gradient of `u` (row `i` of `gu`) and `g · ∂d/∂v` to
/// that of `v`, where `d = ‖u − v‖`.
fn accumulate(
    u: ArrayView1<f32>,
    v: ArrayView1<f32>,
    d: f64,
    g: f64,
    gu: &mut Array2<f32>,
    gv: &mut Array2<f32>,
    i: usize,
) {
    if g == 0.0 {
        return;
    }
    let scale = g / d.max(DIST_EPS);
    Zip::from(gu.row_mut(i))
        .and(gv.row_mut(i))
        .and(&u)
        .and(&v)
        .for_each(|gu, gv, &a, &b| {
            let step = (scale * (a as f64 - b as f64)) as f32;
            *gu += step;
            *gv -= step;
        });
}

// ── Variants ──────────────────────────────────────────────────────────────

/// Secure Triplet Loss with a Kullback–Leibler linkability penalty.
#[derive(Debug, Clone, Copy)]
pub struct SecureTripletLossKld {
    pub margin: f32,
    pub gamma: f32,
}

impl SecureTripletLossKld {
    pub fn new(margin: f32, gamma: f32) -> Self {
        Self { margin, gamma }
    }
}

impl SecureTripletLoss for SecureTripletLossKld {
    fn name(&self) -> &'static str {
        "kld"
    }

    fn margin(&self) -> f32 {
        self.margin
    }

    fn gamma(&self) -> f32 {
        self.gamma
    }

    fn linkability(&self, si: &[f64], di: &[f64]) -> Linkability {
        let s = Moments::of(si);
        let d = Moments::of(di);
        let dm = s.mean - d.mean;
        let vd = d.std * d.std;

        let value = (d.std / s.std).ln() + (s.std * s.std + dm * dm) / (2.0 * vd) - 0.5;

        let d_mean_s = dm / vd;
        let d_mean_d = -dm / vd;
        let d_std_s = -1.0 / s.std + s.std / vd;
        let d_std_d = 1.0 / d.std - (s.std * s.std + dm * dm) / (vd * d.std);

        Linkability {
            value,
            d_si: s.backprop(si, d_mean_s, d_std_s),
            d_di: d.backprop(di, d_mean_d, d_std_d),
        }
    }
}

/// Secure Triplet Loss with a simple-statistics linkability penalty.
#[derive(Debug, Clone, Copy)]
pub struct SecureTripletLossSl {
    pub margin: f32,
    pub gamma: f32,
}

impl SecureTripletLossSl {
    pub fn new(margin: f32, gamma: f32) -> Self {
        Self { margin, gamma }
    }
}

impl SecureTripletLoss for SecureTripletLossSl {
    fn name(&self) -> &'static str {
        "sl"
    }

    fn margin(&self) -> f32 {
        self.margin
    }

    fn gamma(&self) -> f32 {
        self.gamma
    }

    fn linkability(&self, si: &[f64], di: &[f64]) -> Linkability {
        let s = Moments::of(si);
        let d = Moments::of(di);
        let sm = sign(s.mean - d.mean);
        let ss = sign(s.std - d.std);
        Linkability {
            value: (s.mean - d.mean).abs() + (s.std - d.std).abs(),
            d_si: s.backprop(si, sm, ss),
            d_di: d.backprop(di, -sm, -ss),
        }
    }
}

fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

// ── Selection ─────────────────────────────────────────────────────────────

/// Loss variant chosen by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LossKind {
    /// Kullback–Leibler linkability.
    Kld,
    /// Mean/std linkability.
    Sl,
}

impl LossKind {
    pub fn build(self, margin: f32, gamma: f32) -> Box<dyn SecureTripletLoss> {
        match self {
            LossKind::Kld => Box::new(SecureTripletLossKld::new(margin, gamma)),
            LossKind::Sl => Box::new(SecureTripletLossSl::new(margin, gamma)),
        }
    }
}
