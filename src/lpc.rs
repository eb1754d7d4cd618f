// Copyright 2022 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Algorithms for quantized linear-prediction coding (QLPC).

#[cfg(feature = "serde")]
use serde::Deserialize;
#[cfg(feature = "serde")]
use serde::Serialize;

use super::component::needs_wide_accumulator;
use super::component::QuantizedParameters;
use super::constant::panic_msg;
use super::constant::qlpc::MAX_ORDER as MAX_LPC_ORDER;
use super::constant::qlpc::MAX_SHIFT;
use super::constant::qlpc::MAX_WINDOWS;
use super::constant::qlpc::MIN_WINDOW_SIZE;

/// Analysis window function.
///
/// This enum is `Serializable` and `Deserializable` because this will be
/// directly used in config structs.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum WindowFunction {
    Welch,
    /// Tukey window with the taper ratio 0.5.
    Tukey,
    Flattop,
    Hann,
    Bartlett,
}

impl WindowFunction {
    /// All the window functions in the order an encoder evaluates them.
    pub const ALL: [Self; 5] = [
        Self::Welch,
        Self::Tukey,
        Self::Flattop,
        Self::Hann,
        Self::Bartlett,
    ];

    /// Computes the window weights for a block of `len` samples.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flakecodec::lpc::*;
    /// let w = WindowFunction::Bartlett.weights(5);
    /// assert_eq!(w, vec![0.0, 0.5, 1.0, 0.5, 0.0]);
    /// ```
    pub fn weights(self, len: usize) -> Vec<f32> {
        if len < 2 {
            return vec![1.0; len];
        }
        let n_max = (len - 1) as f64;
        let two_pi = 2.0 * std::f64::consts::PI;
        match self {
            Self::Welch => {
                let half = n_max / 2.0;
                (0..len)
                    .map(|n| {
                        let k = (n as f64 - half) / half;
                        (1.0 - k * k) as f32
                    })
                    .collect()
            }
            Self::Tukey => {
                let mut ret = vec![1.0f32; len];
                let taper = (0.5 / 2.0 * len as f64) as usize;
                if taper > 1 {
                    let np = taper - 1;
                    let np_f = np as f64;
                    for n in 0..=np {
                        let t = n as f64;
                        ret[n] = (0.5 - 0.5 * (std::f64::consts::PI * t / np_f).cos()) as f32;
                        ret[len - np - 1 + n] =
                            (0.5 - 0.5 * (std::f64::consts::PI * (t + np_f) / np_f).cos()) as f32;
                    }
                }
                ret
            }
            Self::Flattop => (0..len)
                .map(|n| {
                    let m = two_pi * n as f64 / n_max;
                    (1.0 - 1.93 * m.cos() + 1.29 * (2.0 * m).cos() - 0.388 * (3.0 * m).cos()
                        + 0.0322 * (4.0 * m).cos()) as f32
                })
                .collect(),
            Self::Hann => (0..len)
                .map(|n| (0.5 - 0.5 * (two_pi * n as f64 / n_max).cos()) as f32)
                .collect(),
            Self::Bartlett => (0..len)
                .map(|n| (1.0 - (2.0 * n as f64 / n_max - 1.0).abs()) as f32)
                .collect(),
        }
    }
}

/// Window weights for one block size.
#[derive(Clone, Debug)]
struct WindowLevel {
    weights: Vec<f32>,
    scale: f64,
}

/// Window weights of a single function for a block size and its halvings.
#[derive(Clone, Debug)]
struct WindowLevels {
    function: WindowFunction,
    levels: Vec<WindowLevel>,
}

/// Encoder-owned set of analysis windows.
///
/// Windows are kept in the canonical order of [`WindowFunction::ALL`]
/// regardless of the order they are requested in. For each function, weights
/// are computed for the active block size, and then for the halved sizes as
/// long as the size stays even and at least 32.
#[derive(Clone, Debug)]
pub struct WindowCache {
    windows: heapless::Vec<WindowLevels, MAX_WINDOWS>,
    block_size: usize,
}

impl WindowCache {
    /// Constructs an empty cache for the given set of functions.
    pub fn new(functions: &[WindowFunction]) -> Self {
        let mut windows = heapless::Vec::new();
        for function in WindowFunction::ALL {
            if functions.contains(&function) {
                windows
                    .push(WindowLevels {
                        function,
                        levels: vec![],
                    })
                    .expect(panic_msg::WINDOW_OVERFLOW);
            }
        }
        Self {
            windows,
            block_size: 0,
        }
    }

    /// Recomputes the weights if `block_size` differs from the current one.
    pub fn prepare(&mut self, block_size: usize) {
        if block_size == self.block_size {
            return;
        }
        self.block_size = block_size;
        for win in &mut self.windows {
            win.levels.clear();
            let mut size = block_size;
            loop {
                let weights = win.function.weights(size);
                let scale = weights.iter().map(|w| f64::from(*w) * f64::from(*w)).sum();
                win.levels.push(WindowLevel { weights, scale });
                if size % 2 != 0 || size / 2 < MIN_WINDOW_SIZE {
                    break;
                }
                size /= 2;
            }
        }
    }

    /// Returns the number of windows.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Returns true if no window function is enabled.
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Returns the window function of the `idx`-th window.
    pub fn function(&self, idx: usize) -> Option<WindowFunction> {
        self.windows.get(idx).map(|w| w.function)
    }

    /// Returns the weights and their energy for the `idx`-th window of `size`.
    pub fn weights(&self, idx: usize, size: usize) -> Option<(&[f32], f64)> {
        self.windows.get(idx).and_then(|w| {
            w.levels
                .iter()
                .find(|level| level.weights.len() == size)
                .map(|level| (level.weights.as_slice(), level.scale))
        })
    }
}

/// Per-window LPC analysis state of a channel.
///
/// Holds the autocorrelation, the reflection coefficients, the prediction
/// error and the unquantized coefficients for every order up to the computed
/// order. It also remembers which (order, precision) pairs were already
/// evaluated in the current frame.
#[derive(Clone, Debug)]
pub struct LpcContext {
    windowed: Vec<f64>,
    autocorr: [f64; MAX_LPC_ORDER + 1],
    reflection: [f64; MAX_LPC_ORDER],
    errors: [f64; MAX_LPC_ORDER],
    // Row `order - 1` holds the coefficients for `order`.
    coefs: Vec<f64>,
    computed_order: usize,
    best_orders: heapless::Vec<usize, MAX_LPC_ORDER>,
    done: [u32; 2],
}

impl Default for LpcContext {
    fn default() -> Self {
        Self::new()
    }
}

impl LpcContext {
    pub fn new() -> Self {
        Self {
            windowed: vec![],
            autocorr: [0.0; MAX_LPC_ORDER + 1],
            reflection: [0.0; MAX_LPC_ORDER],
            errors: [0.0; MAX_LPC_ORDER],
            coefs: vec![0.0; MAX_LPC_ORDER * MAX_LPC_ORDER],
            computed_order: 0,
            best_orders: heapless::Vec::new(),
            done: [0; 2],
        }
    }

    /// Forgets the analysis and the evaluated pairs.
    pub fn reset(&mut self) {
        self.computed_order = 0;
        self.best_orders.clear();
        self.done = [0; 2];
    }

    /// Returns the highest order analyzed since the last reset.
    pub const fn computed_order(&self) -> usize {
        self.computed_order
    }

    /// Analyzes `signal` up to `order`.
    ///
    /// The autocorrelation of the windowed signal is normalized by the window
    /// energy `scale` and then solved with the Levinson-Durbin recursion. The
    /// analysis is skipped when the context already holds `order`.
    ///
    /// # Panics
    ///
    /// Panics if `window` is shorter than `signal`, or `order` is not smaller
    /// than the signal length.
    pub fn analyze(&mut self, signal: &[i32], window: &[f32], scale: f64, order: usize) {
        assert!(order <= MAX_LPC_ORDER && order < signal.len());
        assert!(window.len() >= signal.len());
        if self.computed_order >= order {
            return;
        }
        self.windowed.clear();
        self.windowed.extend(
            signal
                .iter()
                .zip(window)
                .map(|(x, w)| f64::from(*x) * f64::from(*w)),
        );

        let norm = if scale > 0.0 { 1.0 / scale } else { 1.0 };
        let n = self.windowed.len();
        for lag in 0..=order {
            let mut acc = 0.0f64;
            for t in lag..n {
                acc += self.windowed[t] * self.windowed[t - lag];
            }
            self.autocorr[lag] = acc * norm;
        }
        self.levinson(order);
        self.computed_order = order;
    }

    fn levinson(&mut self, order: usize) {
        let mut err = self.autocorr[0];
        let mut prev = [0.0f64; MAX_LPC_ORDER];
        for i in 0..order {
            let row = i * MAX_LPC_ORDER;
            if err <= 0.0 {
                self.reflection[i] = 0.0;
                self.errors[i] = 0.0;
                self.coefs[row..row + i].copy_from_slice(&prev[..i]);
                self.coefs[row + i] = 0.0;
                continue;
            }
            let mut acc = self.autocorr[i + 1];
            for j in 0..i {
                acc -= prev[j] * self.autocorr[i - j];
            }
            let k = acc / err;
            self.reflection[i] = k;

            let row_slice = &mut self.coefs[row..=row + i];
            for j in 0..i {
                row_slice[j] = prev[j] - k * prev[i - 1 - j];
            }
            row_slice[i] = k;
            prev[..=i].copy_from_slice(row_slice);

            err *= 1.0 - k * k;
            self.errors[i] = err.max(0.0);
        }
    }

    /// Returns the autocorrelation at `lag`.
    pub fn autocorr(&self, lag: usize) -> f64 {
        self.autocorr[lag]
    }

    /// Returns the reflection coefficient of the `order`-th stage.
    pub fn reflection(&self, order: usize) -> f64 {
        self.reflection[order - 1]
    }

    /// Returns the prediction error energy of `order`.
    pub fn prediction_error(&self, order: usize) -> f64 {
        self.errors[order - 1]
    }

    /// Returns the unquantized coefficients of `order`.
    ///
    /// # Panics
    ///
    /// Panics if `order` is larger than the analyzed order.
    pub fn coefs(&self, order: usize) -> &[f64] {
        assert!(order >= 1 && order <= self.computed_order);
        let row = (order - 1) * MAX_LPC_ORDER;
        &self.coefs[row..row + order]
    }

    /// Akaike-style score of `order` for a block of `n` samples. Lower is better.
    pub fn akaike(&self, n: usize, order: usize, alpha: f64, beta: f64) -> f64 {
        let n = n as f64;
        let err = self.errors[order - 1].max(f64::MIN_POSITIVE);
        (order as f64).mul_add(n.ln() * beta.mul_add(order as f64, alpha), n * err.ln())
    }

    /// Ranks the orders in `min_order..=max_order` by their Akaike score.
    ///
    /// Only the first `depth` entries are sorted; the returned slice holds
    /// them.
    pub fn sort_orders_akaike(
        &mut self,
        n: usize,
        depth: usize,
        min_order: usize,
        max_order: usize,
        alpha: f64,
        beta: f64,
    ) -> &[usize] {
        assert!(min_order >= 1 && max_order <= self.computed_order);
        self.best_orders.clear();
        for order in min_order..=max_order {
            self.best_orders
                .push(order)
                .expect(panic_msg::DATA_INCONSISTENT);
        }
        let len = self.best_orders.len();
        let depth = std::cmp::min(depth, len);
        for i in 0..depth {
            for j in (i + 1)..len {
                if self.akaike(n, self.best_orders[j], alpha, beta)
                    < self.akaike(n, self.best_orders[i], alpha, beta)
                {
                    self.best_orders.swap(i, j);
                }
            }
        }
        &self.best_orders[..depth]
    }

    /// Marks the pair evaluated. Returns false if it was already marked.
    pub fn mark_done(&mut self, order: usize, precision_offset: usize) -> bool {
        let bit = 1u32 << (order - 1);
        let mask = &mut self.done[precision_offset];
        if *mask & bit != 0 {
            return false;
        }
        *mask |= bit;
        true
    }
}

/// Quantizes LPC coefficients with `precision` bits.
///
/// The shift is the largest value not above 15 that keeps every coefficient
/// within `±(2^(precision - 1) - 1)`. Coefficients are rounded with error
/// feedback so the quantization error doesn't accumulate over taps.
///
/// # Examples
///
/// ```
/// # use flakecodec::lpc::*;
/// let params = quantize_coefficients(&[0.5, -0.25], 8);
/// assert_eq!(params.coefs(), &[64, -32]);
/// assert_eq!(params.shift(), 7);
/// ```
pub fn quantize_coefficients(coefs: &[f64], precision: usize) -> QuantizedParameters {
    assert!((1..=15).contains(&precision) && !coefs.is_empty());
    let mut q = heapless::Vec::<i16, MAX_LPC_ORDER>::new();
    let cmax = coefs.iter().fold(0.0f64, |acc, c| acc.max(c.abs()));
    let max_shift = i32::from(MAX_SHIFT);
    if cmax * f64::from(1 << max_shift) < 1.0 {
        for _ in coefs {
            q.push(0).expect(panic_msg::DATA_INCONSISTENT);
        }
        return QuantizedParameters::from_parts(&q, 0, precision);
    }

    let qmax = f64::from((1i32 << (precision - 1)) - 1);
    let mut shift = max_shift;
    while shift > 0 && cmax * f64::from(1 << shift) > qmax {
        shift -= 1;
    }
    let gain = if shift == 0 && cmax > qmax {
        qmax / cmax
    } else {
        1.0
    };

    let mut error = 0.0f64;
    for c in coefs {
        error += c * gain * f64::from(1 << shift);
        let v = error.round().clamp(-qmax, qmax);
        q.push(v as i16).expect(panic_msg::DATA_INCONSISTENT);
        error -= v;
    }
    QuantizedParameters::from_parts(&q, shift as i8, precision)
}

/// Computes the prediction residual of `signal` into `dest`.
///
/// The first `order` elements of `dest` are set to zero. The arithmetic wraps
/// in the same way as the decoder, and switches to a 64-bit accumulator under
/// the same condition.
///
/// # Panics
///
/// Panics if `dest` is shorter than `signal`.
pub fn compute_residual(
    params: &QuantizedParameters,
    bits_per_sample: usize,
    signal: &[i32],
    dest: &mut [i32],
) {
    assert!(dest.len() >= signal.len());
    let coefs = params.coefs();
    let order = coefs.len();
    let shift = params.shift().max(0) as u32;
    dest[..order].fill(0);
    if needs_wide_accumulator(coefs, bits_per_sample) {
        for t in order..signal.len() {
            let mut pred = 0i64;
            for (tau, w) in coefs.iter().enumerate() {
                pred = pred.wrapping_add(i64::from(*w).wrapping_mul(i64::from(signal[t - 1 - tau])));
            }
            dest[t] = signal[t].wrapping_sub((pred >> shift) as i32);
        }
    } else {
        for t in order..signal.len() {
            let mut pred = 0i32;
            for (tau, w) in coefs.iter().enumerate() {
                pred = pred.wrapping_add(i32::from(*w).wrapping_mul(signal[t - 1 - tau]));
            }
            dest[t] = signal[t].wrapping_sub(pred >> shift);
        }
    }
}

#[cfg(test)]
#[allow(clippy::pedantic, clippy::nursery, clippy::needless_range_loop)]
mod tests {
    use super::*;
    use crate::assert_close;
    use crate::component::Decode;
    use crate::component::Lpc;
    use crate::component::Residual;
    use crate::rice::find_partitioned_rice_parameter;

    use rand::rngs::StdRng;
    use rand::Rng;
    use rand::SeedableRng;
    use rstest::rstest;

    fn ar2_signal(len: usize, seed: u64) -> Vec<i32> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut signal = vec![0i32; len];
        let (mut x1, mut x2) = (0.0f64, 0.0f64);
        for v in &mut signal {
            let x = 1.6 * x1 - 0.8 * x2 + rng.gen_range(-256.0..256.0);
            *v = x.round() as i32;
            x2 = x1;
            x1 = x;
        }
        signal
    }

    #[test]
    fn window_shapes() {
        for (actual, expected) in WindowFunction::Hann
            .weights(5)
            .iter()
            .zip([0.0f32, 0.5, 1.0, 0.5, 0.0])
        {
            assert_close!(*actual, expected);
        }
        assert_eq!(
            WindowFunction::Welch.weights(5),
            vec![0.0, 0.75, 1.0, 0.75, 0.0]
        );

        let tukey = WindowFunction::Tukey.weights(16);
        assert_close!(tukey[0], 0.0f32);
        assert_close!(tukey[3], 1.0f32);
        for t in 3..=12 {
            assert_close!(tukey[t], 1.0f32);
        }
        assert_close!(tukey[15], 0.0f32);
        assert_close!(tukey[1], tukey[14]);

        let flattop = WindowFunction::Flattop.weights(33);
        assert_close!(flattop[0], 0.0042f32, rtol = 0.0, atol = 0.0001);
        assert!(flattop[16] > 4.0);
        assert_close!(flattop[10], flattop[22], rtol = 0.0001, atol = 0.0001);
    }

    #[test]
    fn window_cache_levels() {
        let mut cache = WindowCache::new(&[WindowFunction::Hann, WindowFunction::Welch]);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.function(0), Some(WindowFunction::Welch));
        assert_eq!(cache.function(1), Some(WindowFunction::Hann));
        assert_eq!(cache.function(2), None);

        cache.prepare(4096);
        for size in [4096, 2048, 1024, 64, 32] {
            let (weights, scale) = cache.weights(1, size).expect("level should exist");
            assert_eq!(weights.len(), size);
            let energy: f64 = weights.iter().map(|w| f64::from(*w).powi(2)).sum();
            assert_close!(scale, energy);
        }
        assert!(cache.weights(1, 16).is_none());

        cache.prepare(1152);
        assert!(cache.weights(0, 576).is_some());
        assert!(cache.weights(0, 36).is_some());
        assert!(cache.weights(0, 18).is_none());
        assert!(cache.weights(0, 4096).is_none());
    }

    #[test]
    fn levinson_recovers_ar2_process() {
        let signal = ar2_signal(8192, 1);
        let mut cache = WindowCache::new(&[WindowFunction::Tukey]);
        cache.prepare(signal.len());
        let (window, scale) = cache.weights(0, signal.len()).unwrap();

        let mut ctx = LpcContext::new();
        ctx.analyze(&signal, window, scale, 8);
        assert_eq!(ctx.computed_order(), 8);
        let coefs = ctx.coefs(2);
        assert_close!(coefs[0], 1.6f64, rtol = 0.0, atol = 0.05);
        assert_close!(coefs[1], -0.8f64, rtol = 0.0, atol = 0.05);
        assert_close!(ctx.reflection(2), coefs[1]);

        assert!(ctx.prediction_error(1) < ctx.autocorr(0));
        assert!(ctx.prediction_error(2) < ctx.prediction_error(1));
        for order in 3..=8 {
            assert!(ctx.prediction_error(order) <= ctx.prediction_error(order - 1) * 1.0001);
        }
    }

    #[test]
    fn analysis_is_cached_until_reset() {
        let signal = ar2_signal(256, 2);
        let window = vec![1.0f32; 256];
        let mut ctx = LpcContext::new();
        ctx.analyze(&signal, &window, 1.0, 2);
        let err2 = ctx.prediction_error(2);

        // Lower orders are answered from the cached analysis.
        ctx.analyze(&[0i32; 256], &window, 1.0, 1);
        assert_eq!(ctx.prediction_error(2), err2);

        ctx.reset();
        ctx.analyze(&[0i32; 256], &window, 1.0, 1);
        assert_eq!(ctx.prediction_error(1), 0.0);
        assert_eq!(ctx.coefs(1), &[0.0]);
    }

    #[test]
    fn akaike_ranking() {
        let mut ctx = LpcContext::new();
        ctx.errors[..4].copy_from_slice(&[100.0, 10.0, 9.9, 9.89]);
        ctx.computed_order = 4;
        assert_eq!(ctx.sort_orders_akaike(1000, 4, 1, 4, 4.5, 0.0), &[2, 3, 4, 1]);
        assert_eq!(ctx.sort_orders_akaike(1000, 1, 1, 4, 4.5, 0.0), &[2]);
        assert_eq!(ctx.sort_orders_akaike(1000, 2, 3, 4, 4.5, 0.0), &[3, 4]);
        assert!(ctx.akaike(1000, 1, 4.5, 0.0) > ctx.akaike(1000, 2, 4.5, 0.0));
    }

    #[test]
    fn done_marks() {
        let mut ctx = LpcContext::new();
        assert!(ctx.mark_done(32, 0));
        assert!(!ctx.mark_done(32, 0));
        assert!(ctx.mark_done(32, 1));
        assert!(ctx.mark_done(1, 0));
        ctx.reset();
        assert!(ctx.mark_done(32, 0));
    }

    #[rstest]
    #[case(&[0.5, -0.25], 8, &[64, -32], 7)]
    #[case(&[1e-6, -1e-6], 12, &[0, 0], 0)]
    #[case(&[300.0, 1.0], 8, &[127, 0], 0)]
    #[case(&[0.3, 0.3, 0.3], 2, &[1, 0, 1], 1)]
    fn coefficient_quantizer(
        #[case] coefs: &[f64],
        #[case] precision: usize,
        #[case] expected: &[i16],
        #[case] shift: i8,
    ) {
        let params = quantize_coefficients(coefs, precision);
        assert_eq!(params.coefs(), expected);
        assert_eq!(params.shift(), shift);
        assert_eq!(params.precision(), precision);
    }

    #[rstest]
    fn residual_is_reversible(#[values(8, 16, 24)] bits_per_sample: usize) {
        let shift = 16 - bits_per_sample.min(16);
        let limit = 1i32 << (bits_per_sample - 1);
        let signal: Vec<i32> = ar2_signal(1024, 3)
            .iter()
            .map(|x| (x >> shift).clamp(-limit, limit - 1))
            .collect();
        let window = vec![1.0f32; signal.len()];
        let mut ctx = LpcContext::new();
        ctx.analyze(&signal, &window, 1.0, 8);
        let params = quantize_coefficients(ctx.coefs(8), 14);

        let mut residual = vec![0i32; signal.len()];
        compute_residual(&params, bits_per_sample, &signal, &mut residual);
        let prc = find_partitioned_rice_parameter(&residual, 8, 0, 8, bits_per_sample > 16);
        let residual = Residual::new(prc.order, prc.method, &prc.codes, 8, &residual).unwrap();
        let lpc = Lpc::new(&signal[..8], params, residual, bits_per_sample).unwrap();
        assert_eq!(lpc.decode(), signal);
    }

    #[test]
    fn wide_accumulator_residual() {
        let params = QuantizedParameters::new(&[16383, -16383], 0, 15).unwrap();
        assert!(needs_wide_accumulator(params.coefs(), 24));
        let signal = [8_388_607, -8_388_608, 8_388_607, 0, -1, 5];
        let mut residual = [0i32; 6];
        compute_residual(&params, 24, &signal, &mut residual);
        let expected_2 = {
            let pred = 16383i64 * -8_388_608 - 16383 * 8_388_607;
            (8_388_607i64 - pred) as i32
        };
        assert_eq!(residual[..2], [0, 0]);
        assert_eq!(residual[2], expected_2);
    }
}
