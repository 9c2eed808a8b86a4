//! Encrypt, reduce, derive statistics, decrypt: each phase timed.

use std::time::{Duration, Instant};

use clap::ValueEnum;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::ciphertext::Ciphertext;
use crate::context::{CryptoContext, Feature};
use crate::error::Error;
use crate::params::{Parameters, Scheme};

/// How slots are folded into slot 0.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Reduction {
    /// `acc += rot(acc, 2^k)`: ceil(log2 n) rotations.
    #[default]
    Doubling,
    /// n - 1 rotate-by-one steps.
    Linear,
}

impl Reduction {
    /// Rotation offsets whose keys the reduction needs, plus +-1.
    pub fn rotation_indices(&self, width: usize) -> Vec<i64> {
        let mut indices = vec![1, -1];
        if *self == Reduction::Doubling {
            let mut shift = 2;
            while shift < width {
                indices.push(shift as i64);
                shift <<= 1;
            }
        }
        indices
    }
}

/// `Corrected` divides by n and takes a real square root; `Legacy`
/// multiplies the sum by n and halves the variance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Arithmetic {
    #[default]
    Corrected,
    Legacy,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    pub params: Parameters,
    pub reduction: Reduction,
    pub arithmetic: Arithmetic,
    /// Also compute variance and standard deviation.
    pub variance: bool,
}

impl PipelineConfig {
    /// Levels consumed on the deepest path.
    pub fn required_depth(&self) -> usize {
        match (self.params.scheme, self.variance, self.arithmetic) {
            (Scheme::Bgv, _, _) => 1,
            (Scheme::Ckks, false, _) => 1,
            (Scheme::Ckks, true, Arithmetic::Corrected) => 2,
            (Scheme::Ckks, true, Arithmetic::Legacy) => 3,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        let required = self.required_depth();
        let available = self.params.multiplicative_depth;
        if available < required {
            return Err(Error::InsufficientDepth { required, available });
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Timings {
    pub setup: Duration,
    pub encryption: Duration,
    pub computation: Duration,
    pub decryption: Duration,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Report {
    pub scheme: Scheme,
    pub values: usize,
    pub ciphertexts: usize,
    pub rotations: usize,
    pub sum: f64,
    pub mean: f64,
    pub variance: Option<f64>,
    pub stddev: Option<f64>,
    pub timings: Timings,
}

pub fn timed<T>(f: impl FnOnce() -> T) -> (T, Duration) {
    let start = Instant::now();
    let out = f();
    (out, start.elapsed())
}

/// Folds the first `width` slots of `ct` into slot 0. Returns the result and
/// the number of rotate-and-add steps.
pub fn rotate_and_sum(
    cc: &CryptoContext,
    ct: Ciphertext,
    width: usize,
    reduction: Reduction,
) -> Result<(Ciphertext, usize), Error> {
    let mut steps = 0;
    match reduction {
        Reduction::Linear => {
            let mut acc: Option<Ciphertext> = None;
            let mut rotated: Option<Ciphertext> = None;
            for _ in 1..width {
                let next = cc.eval_rotate(rotated.as_ref().unwrap_or(&ct), 1)?;
                acc = Some(cc.eval_add(acc.as_ref().unwrap_or(&ct), &next)?);
                rotated = Some(next);
                steps += 1;
            }
            Ok((acc.unwrap_or(ct), steps))
        }
        Reduction::Doubling => {
            let mut acc = ct;
            let mut shift = 1;
            while shift < width {
                let rotated = cc.eval_rotate(&acc, shift as i64)?;
                acc = cc.eval_add(&acc, &rotated)?;
                shift <<= 1;
                steps += 1;
            }
            Ok((acc, steps))
        }
    }
}

/// Plaintext mean and population variance.
pub fn reference_stats(dataset: &[f64]) -> (f64, f64) {
    let n = dataset.len() as f64;
    let mean = dataset.iter().sum::<f64>() / n;
    let variance = dataset.iter().map(|v| v * v).sum::<f64>() / n - mean * mean;
    (mean, variance)
}

#[derive(Default)]
struct Outputs {
    sum: Option<Ciphertext>,
    mean: Option<Ciphertext>,
    sum_squares: Option<Ciphertext>,
    variance: Option<Ciphertext>,
    stddev: Option<Ciphertext>,
}

fn add_all(cc: &CryptoContext, cts: Vec<Ciphertext>) -> Result<Ciphertext, Error> {
    let mut cts = cts.into_iter();
    let first = cts.next().ok_or(Error::EmptyDataset)?;
    cts.try_fold(first, |acc, ct| cc.eval_add(&acc, &ct))
}

#[instrument(level = "debug", skip_all, fields(values = dataset.len()))]
pub fn run(config: &PipelineConfig, dataset: &[f64]) -> Result<Report, Error> {
    if dataset.is_empty() {
        return Err(Error::EmptyDataset);
    }
    config.validate()?;
    let scheme = config.params.scheme;

    if scheme == Scheme::Bgv && dataset.iter().any(|v| v.fract() != 0.0) {
        warn!("BGV packs integers, fractional values are rounded");
    }

    let (setup, setup_time) = timed(|| -> Result<_, Error> {
        let mut cc = CryptoContext::new(config.params.clone())?;
        cc.enable(Feature::Pke);
        cc.enable(Feature::KeySwitch);
        cc.enable(Feature::LeveledShe);

        let keys = cc.key_gen()?;
        cc.eval_mult_key_gen(&keys.secret_key)?;
        let width = dataset.len().min(cc.batch_size());
        cc.eval_rotate_key_gen(&keys.secret_key, &config.reduction.rotation_indices(width))?;
        Ok((cc, keys, width))
    });
    let (cc, keys, width) = setup?;
    info!(elapsed = ?setup_time, "context and keys ready");

    let (chunks, encryption_time) = timed(|| {
        dataset
            .chunks(cc.batch_size())
            .map(|chunk| {
                let pt = cc.make_packed_plaintext(chunk)?;
                cc.encrypt(&keys.public_key, &pt)
            })
            .collect::<Result<Vec<_>, Error>>()
    });
    let chunks = chunks?;
    let ciphertexts = chunks.len();
    info!(ciphertexts, elapsed = ?encryption_time, "encrypted");

    let n = dataset.len() as f64;
    let (computed, computation_time) = timed(|| -> Result<_, Error> {
        let mut out = Outputs::default();
        let squares = if config.variance {
            Some(
                chunks
                    .iter()
                    .map(|ct| cc.eval_mult(ct, ct))
                    .collect::<Result<Vec<_>, Error>>()?,
            )
        } else {
            None
        };
        let (sum, mut rotations) = rotate_and_sum(&cc, add_all(&cc, chunks)?, width, config.reduction)?;

        let homomorphic_mean = match (scheme, config.arithmetic) {
            (Scheme::Ckks, Arithmetic::Corrected) => Some(cc.eval_mult_scalar(&sum, 1.0 / n)?),
            (_, Arithmetic::Legacy) => Some(cc.eval_mult_plain(&sum, &cc.make_packed_plaintext(&[n])?)?),
            (Scheme::Bgv, Arithmetic::Corrected) => None,
        };

        if let Some(squares) = squares {
            let (sum_squares, steps) = rotate_and_sum(&cc, add_all(&cc, squares)?, width, config.reduction)?;
            rotations += steps;

            match (&homomorphic_mean, config.arithmetic) {
                (Some(mean), Arithmetic::Corrected) => {
                    let mean_squared = cc.eval_mult(mean, mean)?;
                    let second_moment = cc.eval_mult_scalar(&sum_squares, 1.0 / n)?;
                    out.variance = Some(cc.eval_sub(&second_moment, &mean_squared)?);
                }
                (Some(mean), Arithmetic::Legacy) => {
                    let mean_squared = cc.eval_mult(mean, mean)?;
                    let variance = cc.eval_sub(&sum_squares, &mean_squared)?;
                    if scheme == Scheme::Ckks {
                        let half = cc.make_packed_plaintext(&[0.5])?;
                        out.stddev = Some(cc.eval_mult_plain(&variance, &half)?);
                    }
                    out.variance = Some(variance);
                }
                (None, _) => {}
            }
            out.sum_squares = Some(sum_squares);
        }

        out.sum = Some(sum);
        out.mean = homomorphic_mean;
        Ok((out, rotations))
    });
    let (outputs, rotations) = computed?;
    info!(rotations, elapsed = ?computation_time, "homomorphic computation done");

    let (decrypted, decryption_time) = timed(|| -> Result<_, Error> {
        let slot0 = |ct: &Option<Ciphertext>| -> Result<Option<f64>, Error> {
            ct.as_ref()
                .map(|ct| {
                    cc.decrypt(&keys.secret_key, ct, 1)
                        .map(|slots| slots.first().copied().unwrap_or_default())
                })
                .transpose()
        };
        Ok([
            slot0(&outputs.sum)?,
            slot0(&outputs.mean)?,
            slot0(&outputs.sum_squares)?,
            slot0(&outputs.variance)?,
            slot0(&outputs.stddev)?,
        ])
    });
    let [sum, mean, sum_squares, variance, stddev] = decrypted?;
    info!(elapsed = ?decryption_time, "decrypted");

    let sum = sum.unwrap_or_default();
    let mean = mean.unwrap_or(sum / n);
    let (variance, stddev) = match config.arithmetic {
        Arithmetic::Corrected if config.variance => {
            let variance = variance.or_else(|| sum_squares.map(|s| s / n - mean * mean));
            (variance, variance.map(|v| v.max(0.0).sqrt()))
        }
        _ => (variance, stddev),
    };
    debug!(sum, mean, ?variance, ?stddev, "decrypted statistics");

    Ok(Report {
        scheme,
        values: dataset.len(),
        ciphertexts,
        rotations,
        sum,
        mean,
        variance,
        stddev,
        timings: Timings {
            setup: setup_time,
            encryption: encryption_time,
            computation: computation_time,
            decryption: decryption_time,
        },
    })
}
