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

//! Controller connecting coding algorithms.

use super::component::BitRepr;
use super::component::ChannelAssignment;
use super::component::Constant;
use super::component::FixedLpc;
use super::component::Lpc;
use super::component::QuantizedParameters;
use super::component::Residual;
use super::component::SubFrame;
use super::component::Verbatim;
use super::config;
use super::config::PredictionType;
use super::config::StereoMethod;
use super::config::WindowMethod;
use super::constant::block::MIN_PREDICTED_BLOCK_SIZE;
use super::constant::fixed::COEFFICIENTS as FIXED_LPC_COEFS;
use super::constant::fixed::MAX_LPC_ORDER as MAX_FIXED_LPC_ORDER;
use super::constant::panic_msg;
use super::constant::MAX_CHANNELS;
use super::constant::qlpc::AKAIKE_ALPHA;
use super::constant::qlpc::AKAIKE_BETA;
use super::constant::qlpc::DEFAULT_PRECISION;
use super::constant::qlpc::ESTIMATE_ORDER;
use super::constant::qlpc::ESTIMATE_ORDER_FACTOR;
use super::constant::qlpc::MAX_ORDER as MAX_LPC_ORDER;
use super::constant::qlpc::MAX_PRECISION;
use super::constant::qlpc::PRECISION_BITS;
use super::constant::qlpc::PRECISION_TABLE;
use super::constant::qlpc::SHIFT_BITS;
use super::constant::rice::HEADER_BITS as RICE_HEADER_BITS;
use super::lpc::compute_residual;
use super::lpc::quantize_coefficients;
use super::lpc::LpcContext;
use super::lpc::WindowCache;
use super::rice::PrcParameter;
use super::rice::PrcParameterFinder;

/// Returns true if samples are all same.
pub fn is_constant<T: PartialEq>(samples: &[T]) -> bool {
    for t in 1..samples.len() {
        if samples[0] != samples[t] {
            return false;
        }
    }
    true
}

/// Returns the number of trailing zero bits shared by all the samples.
pub fn wasted_bits(samples: &[i32]) -> usize {
    let acc = samples.iter().fold(0i32, |acc, v| acc | v);
    if acc == 0 {
        0
    } else {
        acc.trailing_zeros() as usize
    }
}

/// Computes the residual of the fixed predictor of `order`.
///
/// The first `order` elements of `dest` are set to zero.
pub fn fixed_residual(order: usize, signal: &[i32], dest: &mut [i32]) {
    let coefs = &FIXED_LPC_COEFS[order][0..order];
    dest[..order].fill(0);
    for t in order..signal.len() {
        let mut pred = 0i32;
        for (tau, w) in coefs.iter().enumerate() {
            pred = pred.wrapping_add(w.wrapping_mul(signal[t - 1 - tau]));
        }
        dest[t] = signal[t].wrapping_sub(pred);
    }
}

/// Returns the base precision of LPC coefficients for the block size.
pub fn base_precision(block_size: usize) -> usize {
    PRECISION_TABLE
        .iter()
        .find(|(limit, _)| block_size <= *limit)
        .map_or(DEFAULT_PRECISION, |(_, bits)| *bits)
}

/// Kind of the predictor of a candidate.
#[derive(Clone, Debug)]
enum Predictor {
    Constant,
    Verbatim,
    Fixed(usize),
    Lpc {
        window: usize,
        params: QuantizedParameters,
    },
}

/// Subframe candidate with its estimated size in bits.
#[derive(Clone, Debug)]
struct Candidate {
    predictor: Predictor,
    size: usize,
    prc: Option<PrcParameter>,
    residual: Vec<i32>,
}

impl Candidate {
    const fn new() -> Self {
        Self {
            predictor: Predictor::Verbatim,
            size: usize::MAX,
            prc: None,
            residual: vec![],
        }
    }
}

/// Search state of a channel (or a stereo candidate channel) in a frame.
#[derive(Clone, Debug)]
pub(crate) struct ChannelEncoder {
    samples: Vec<i32>,
    bits_per_sample: usize,
    wasted_bits: usize,
    best: Candidate,
    current: Candidate,
    done_fixed: u32,
    lpc: Vec<LpcContext>,
}

impl ChannelEncoder {
    pub fn new(windows: usize) -> Self {
        Self {
            samples: vec![],
            bits_per_sample: 0,
            wasted_bits: 0,
            best: Candidate::new(),
            current: Candidate::new(),
            done_fixed: 0,
            lpc: (0..windows).map(|_| LpcContext::new()).collect(),
        }
    }

    fn reset(&mut self, block_size: usize) {
        self.best.predictor = Predictor::Verbatim;
        self.best.size = usize::MAX;
        self.best.prc = None;
        self.best.residual.resize(block_size, 0);
        self.current.residual.resize(block_size, 0);
        self.done_fixed = 0;
        for ctx in &mut self.lpc {
            ctx.reset();
        }
    }

    /// Loads samples of `bits_per_sample` bits and strips the wasted bits.
    pub fn load(&mut self, bits_per_sample: usize, fill: impl FnOnce(&mut Vec<i32>)) {
        self.samples.clear();
        fill(&mut self.samples);
        let wasted = wasted_bits(&self.samples);
        if wasted > 0 {
            for v in &mut self.samples {
                *v >>= wasted;
            }
        }
        self.wasted_bits = wasted;
        self.bits_per_sample = bits_per_sample - wasted;
        self.reset(self.samples.len());
    }

    /// Loads a part of the already-stripped samples of `parent`.
    fn load_part(&mut self, parent: &Self, offset: usize, len: usize) {
        self.samples.clear();
        self.samples
            .extend_from_slice(&parent.samples[offset..offset + len]);
        self.wasted_bits = parent.wasted_bits;
        self.bits_per_sample = parent.bits_per_sample;
        self.reset(len);
    }

    /// Returns the estimated size of the best candidate.
    pub const fn best_size(&self) -> usize {
        self.best.size
    }

    fn choose_best(&mut self) {
        if self.current.size < self.best.size {
            std::mem::swap(&mut self.current, &mut self.best);
        }
    }

    fn set_current(&mut self, predictor: Predictor, size: usize, prc: Option<PrcParameter>) {
        self.current.predictor = predictor;
        self.current.size = size;
        self.current.prc = prc;
        self.choose_best();
    }

    fn verbatim(&self) -> SubFrame {
        SubFrame::from(Verbatim::from_samples(
            &self.samples,
            self.bits_per_sample as u8,
        ))
        .with_wasted_bits(self.wasted_bits)
    }

    fn make_residual(&self, prc: &PrcParameter, order: usize) -> Residual {
        Residual::from_parts(
            prc.order as u8,
            prc.method,
            prc.codes.clone(),
            order,
            self.best.residual[..self.samples.len()].to_vec(),
        )
    }

    /// Materializes the best candidate as a subframe.
    ///
    /// The subframe is replaced by `Verbatim` if it would be larger.
    pub fn to_subframe(&self) -> SubFrame {
        let bps = self.bits_per_sample as u8;
        let subframe: SubFrame = match (&self.best.predictor, &self.best.prc) {
            (Predictor::Constant, _) => {
                Constant::from_parts(self.samples.len(), self.samples[0], bps).into()
            }
            (Predictor::Fixed(order), Some(prc)) => FixedLpc::from_parts(
                &self.samples[..*order],
                self.make_residual(prc, *order),
                bps,
            )
            .into(),
            (Predictor::Lpc { params, .. }, Some(prc)) => Lpc::from_parts(
                &self.samples[..params.order()],
                params.clone(),
                self.make_residual(prc, params.order()),
                bps,
            )
            .into(),
            _ => return self.verbatim(),
        };
        let subframe = subframe.with_wasted_bits(self.wasted_bits);
        let verbatim_bits = Verbatim::count_bits_from_metadata(
            self.samples.len(),
            self.bits_per_sample,
            self.wasted_bits,
        );
        if subframe.count_bits() > verbatim_bits {
            #[cfg(feature = "log")]
            log::trace!(
                target: "flakecodec::coding",
                "{{ msg: \"subframe replaced by verbatim\", bits: {}, verbatim_bits: {} }}",
                subframe.count_bits(),
                verbatim_bits,
            );
            return self.verbatim();
        }
        subframe
    }
}

/// Parameters of a predictor search pass.
#[derive(Clone, Copy, Debug)]
struct SearchParams {
    prediction: PredictionType,
    min_fixed_order: usize,
    max_fixed_order: usize,
    min_prediction_order: usize,
    max_prediction_order: usize,
    min_precision_search: usize,
    max_precision_search: usize,
    min_partition_order: usize,
    max_partition_order: usize,
    estimation_depth: usize,
    first_pass: bool,
}

impl SearchParams {
    fn full(config: &config::Encoder) -> Self {
        Self {
            prediction: config.prediction,
            min_fixed_order: config.min_fixed_order,
            max_fixed_order: config.max_fixed_order,
            min_prediction_order: config.min_prediction_order,
            max_prediction_order: config.max_prediction_order,
            min_precision_search: config.lpc_min_precision_search,
            max_precision_search: config.lpc_max_precision_search,
            min_partition_order: config.min_partition_order,
            max_partition_order: config.max_partition_order,
            estimation_depth: config.estimation_depth,
            first_pass: false,
        }
    }

    /// Narrowed parameters used for the quick first pass.
    fn first_pass(config: &config::Encoder) -> Self {
        let full = Self::full(config);
        let max_prediction_order = std::cmp::min(full.max_prediction_order, 8);
        Self {
            min_fixed_order: 2,
            max_fixed_order: 2,
            min_prediction_order: std::cmp::min(full.min_prediction_order, max_prediction_order),
            max_prediction_order,
            min_precision_search: full.max_precision_search,
            estimation_depth: 1,
            first_pass: true,
            ..full
        }
    }
}

/// Predictor search shared by all the channels of an encoder.
#[derive(Clone, Debug)]
pub(crate) struct Searcher {
    full: SearchParams,
    first: SearchParams,
    window_method: WindowMethod,
    stereo_method: StereoMethod,
    windows: WindowCache,
    finder: PrcParameterFinder,
    allow_extended: bool,
    variable_blocking: bool,
}

impl Searcher {
    /// Constructs a searcher for a stream of `bits_per_sample` bits.
    pub fn new(config: &config::Encoder, bits_per_sample: usize) -> Self {
        Self {
            full: SearchParams::full(config),
            first: SearchParams::first_pass(config),
            window_method: config.window_method,
            stereo_method: config.stereo_method,
            windows: WindowCache::new(&config.window_functions),
            finder: PrcParameterFinder::new(),
            allow_extended: bits_per_sample > 16,
            variable_blocking: config.variable_block_size > 0,
        }
    }

    /// Returns the number of analysis windows.
    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    /// Returns the stereo method.
    pub const fn stereo_method(&self) -> StereoMethod {
        self.stereo_method
    }

    /// Prepares the analysis windows for the block size.
    pub fn prepare(&mut self, block_size: usize) {
        self.windows.prepare(block_size);
    }

    fn fixed_sub(&mut self, ch: &mut ChannelEncoder, order: usize, params: &SearchParams) {
        if ch.done_fixed & (1u32 << order) != 0 {
            return;
        }
        fixed_residual(order, &ch.samples, &mut ch.current.residual);
        let prc = self.finder.find(
            &ch.current.residual,
            order,
            params.min_partition_order,
            params.max_partition_order,
            self.allow_extended,
        );
        let size = order * ch.bits_per_sample + RICE_HEADER_BITS + prc.bits;
        ch.done_fixed |= 1u32 << order;
        ch.set_current(Predictor::Fixed(order), size, Some(prc));
    }

    fn lpc_sub(
        &mut self,
        ch: &mut ChannelEncoder,
        window: usize,
        order: usize,
        params: &SearchParams,
    ) {
        let base = base_precision(ch.samples.len());
        for offset in params.min_precision_search..=params.max_precision_search {
            let precision = base + offset;
            if precision > MAX_PRECISION {
                break;
            }
            if !ch.lpc[window].mark_done(order, offset) {
                continue;
            }
            let qparams = quantize_coefficients(ch.lpc[window].coefs(order), precision);
            compute_residual(
                &qparams,
                ch.bits_per_sample,
                &ch.samples,
                &mut ch.current.residual,
            );
            let prc = self.finder.find(
                &ch.current.residual,
                order,
                params.min_partition_order,
                params.max_partition_order,
                self.allow_extended,
            );
            let size = order * ch.bits_per_sample
                + PRECISION_BITS
                + SHIFT_BITS
                + order * precision
                + RICE_HEADER_BITS
                + prc.bits;
            ch.set_current(
                Predictor::Lpc {
                    window,
                    params: qparams,
                },
                size,
                Some(prc),
            );
        }
    }

    /// Searches predictors for a channel and updates its best candidate.
    ///
    /// `best_window` restricts LPC analysis to a single window.
    fn encode_residual(
        &mut self,
        ch: &mut ChannelEncoder,
        params: &SearchParams,
        best_window: Option<usize>,
    ) {
        let n = ch.samples.len();
        if is_constant(&ch.samples) {
            ch.best.predictor = Predictor::Constant;
            ch.best.size = ch.bits_per_sample;
            ch.best.prc = None;
            return;
        }

        ch.set_current(Predictor::Verbatim, ch.bits_per_sample * n, None);

        if n < MIN_PREDICTED_BLOCK_SIZE || params.prediction == PredictionType::None {
            return;
        }

        let search = params.prediction == PredictionType::Search;
        if params.prediction == PredictionType::Fixed
            || (search && !params.first_pass)
            || n <= params.max_prediction_order
        {
            let max_order = std::cmp::min(params.max_fixed_order, MAX_FIXED_LPC_ORDER);
            let min_order = std::cmp::min(params.min_fixed_order, max_order);
            for order in min_order..=max_order {
                self.fixed_sub(ch, order, params);
            }
        }

        if n > params.max_prediction_order
            && (search || params.prediction == PredictionType::Levinson)
        {
            let max_order = params.max_prediction_order;
            for window in 0..self.windows.len() {
                if best_window.is_some_and(|w| w != window) {
                    continue;
                }
                let orders: heapless::Vec<usize, MAX_LPC_ORDER> = {
                    let (weights, scale) = self
                        .windows
                        .weights(window, n)
                        .expect(panic_msg::DATA_INCONSISTENT);
                    let ctx = &mut ch.lpc[window];
                    ctx.analyze(&ch.samples, weights, scale, max_order);
                    let ranked = ctx.sort_orders_akaike(
                        n,
                        params.estimation_depth,
                        params.min_prediction_order,
                        max_order,
                        AKAIKE_ALPHA,
                        AKAIKE_BETA,
                    );
                    heapless::Vec::from_slice(ranked).expect(panic_msg::DATA_INCONSISTENT)
                };
                for order in orders {
                    self.lpc_sub(ch, window, order, params);
                }
            }
        }
    }

    /// Picks the window used for the full pass, or `None` for all windows.
    fn estimate_best_window(&mut self, ch: &mut ChannelEncoder) -> Option<usize> {
        let n = ch.samples.len();
        if self.windows.len() == 1 || n < MIN_PREDICTED_BLOCK_SIZE {
            return Some(0);
        }
        match self.window_method {
            WindowMethod::Estimate => {
                let order = 2;
                let mut best: Option<(usize, f64)> = None;
                for window in 0..self.windows.len() {
                    let (weights, scale) = self
                        .windows
                        .weights(window, n)
                        .expect(panic_msg::DATA_INCONSISTENT);
                    let ctx = &mut ch.lpc[window];
                    ctx.analyze(&ch.samples, weights, scale, order);
                    let err = ctx.prediction_error(order) / ctx.autocorr(0);
                    if best.map_or(true, |(_, best_err)| best_err > err) {
                        best = Some((window, err));
                    }
                }
                best.map(|(window, _)| window)
            }
            WindowMethod::Evaluate => {
                self.pass1(ch, None);
                if let Predictor::Lpc { window, .. } = ch.best.predictor {
                    Some(window)
                } else {
                    None
                }
            }
            WindowMethod::Search => None,
        }
    }

    /// Runs the narrowed first search pass.
    fn pass1(&mut self, ch: &mut ChannelEncoder, best_window: Option<usize>) {
        let params = self.first;
        self.encode_residual(ch, &params, best_window);
    }

    /// Runs the full search pass.
    pub fn pass2(&mut self, ch: &mut ChannelEncoder) {
        let best_window = self.estimate_best_window(ch);
        let params = self.full;
        self.encode_residual(ch, &params, best_window);
    }

    /// Sets a rough size estimate from an order-4 analysis on the first window.
    fn estimate_channel(&mut self, ch: &mut ChannelEncoder) {
        let n = ch.samples.len();
        let (weights, scale) = self
            .windows
            .weights(0, n)
            .expect(panic_msg::DATA_INCONSISTENT);
        let ctx = &mut ch.lpc[0];
        ctx.analyze(&ch.samples, weights, scale, ESTIMATE_ORDER);
        let best_order = ctx.sort_orders_akaike(
            n,
            1,
            1,
            ESTIMATE_ORDER,
            AKAIKE_ALPHA,
            AKAIKE_BETA,
        )[0];
        let estimate = ESTIMATE_ORDER_FACTOR.mul_add(
            (ch.bits_per_sample * self.full.max_prediction_order) as f64,
            ctx.akaike(n, best_order, AKAIKE_ALPHA, AKAIKE_BETA),
        );
        ch.best.size = estimate.max(0.0) as usize;
    }

    /// Fills the best sizes of all the channels of `frame` for mode decision.
    pub fn estimate_frame(&mut self, frame: &mut TrialFrame) {
        for ch in frame.active_channels_mut() {
            match self.stereo_method {
                StereoMethod::Estimate => self.estimate_channel(ch),
                StereoMethod::Evaluate => self.pass1(ch, Some(0)),
                StereoMethod::Search => self.pass2(ch),
                StereoMethod::Independent => {}
            }
        }
    }

    /// Finishes the search on the channels selected by the mode decision.
    pub fn encode_estimated_frame(&mut self, frame: &mut TrialFrame) {
        for idx in frame.selected_channels() {
            let ch = &mut frame.channels[idx];
            match self.stereo_method {
                StereoMethod::Estimate => {
                    ch.best.size = usize::MAX;
                    self.pass2(ch);
                }
                StereoMethod::Evaluate => self.pass2(ch),
                StereoMethod::Search | StereoMethod::Independent => {}
            }
        }
    }

    /// Estimates the frame size in bits and decides the channel assignment.
    ///
    /// `counter` is the frame or sample number written in the header.
    pub fn measure_frame(&self, frame: &mut TrialFrame, counter: u64) -> usize {
        let counter_bits = ((counter.max(1).ilog2() as usize + 4) / 5) * 8;
        let total = 32 + counter_bits + if self.variable_blocking { 16 } else { 0 } + 16;

        if !frame.stereo {
            return frame.channels[..frame.active]
                .iter()
                .fold(total, |acc, ch| acc.saturating_add(ch.best_size()));
        }

        let size = |a: usize, b: usize| {
            frame.channels[a]
                .best_size()
                .saturating_add(frame.channels[b].best_size())
        };
        let mut best_bits = usize::MAX;
        let mut best_mode = ChannelAssignment::Independent(2);
        for mode in [
            ChannelAssignment::MidSide,
            ChannelAssignment::RightSide,
            ChannelAssignment::LeftSide,
            ChannelAssignment::Independent(2),
        ] {
            let (a, b) = mode.select_channels(0, 1, 2, 3);
            let bits = size(a, b);
            if best_bits > bits {
                best_bits = bits;
                best_mode = mode;
            }
        }
        frame.assignment = best_mode;
        total.saturating_add(best_bits)
    }
}

/// A frame under construction: per-channel search states and the channel
/// assignment.
///
/// For stereo decorrelation, four candidate channels are kept in the order
/// left, right, mid, side.
#[derive(Clone, Debug)]
pub(crate) struct TrialFrame {
    block_size: usize,
    channels: Vec<ChannelEncoder>,
    active: usize,
    stereo: bool,
    assignment: ChannelAssignment,
}

impl TrialFrame {
    /// Constructs an empty frame.
    pub fn new(channels: usize, windows: usize) -> Self {
        let stereo = channels == 2;
        let slots = if stereo { 4 } else { channels };
        Self {
            block_size: 0,
            channels: (0..slots).map(|_| ChannelEncoder::new(windows)).collect(),
            active: slots,
            stereo,
            assignment: ChannelAssignment::Independent(channels as u8),
        }
    }

    /// Returns the block size.
    pub const fn block_size(&self) -> usize {
        self.block_size
    }

    /// Returns the channel assignment.
    pub const fn assignment(&self) -> ChannelAssignment {
        self.assignment
    }

    /// Returns the mutable search state of a channel.
    pub fn channel_mut(&mut self, idx: usize) -> &mut ChannelEncoder {
        &mut self.channels[idx]
    }

    fn active_channels_mut(&mut self) -> &mut [ChannelEncoder] {
        &mut self.channels[..self.active]
    }

    /// Loads independent channels of `bits_per_sample` bits.
    pub fn load_independent<'a, I>(&mut self, channels: I, bits_per_sample: usize)
    where
        I: IntoIterator<Item = &'a [i32]>,
    {
        let mut count = 0;
        for (ch, src) in self.channels.iter_mut().zip(channels) {
            ch.load(bits_per_sample, |dest| dest.extend_from_slice(src));
            self.block_size = src.len();
            count += 1;
        }
        self.active = count;
        self.stereo = false;
        self.assignment = ChannelAssignment::Independent(count as u8);
    }

    /// Loads the four stereo candidates computed from `left` and `right`.
    pub fn load_stereo(&mut self, left: &[i32], right: &[i32], bits_per_sample: usize) {
        assert!(self.channels.len() == 4, "{}", panic_msg::DATA_INCONSISTENT);
        self.block_size = left.len();
        self.active = 4;
        self.stereo = true;
        self.assignment = ChannelAssignment::Independent(2);
        self.channels[0].load(bits_per_sample, |dest| dest.extend_from_slice(left));
        self.channels[1].load(bits_per_sample, |dest| dest.extend_from_slice(right));
        self.channels[2].load(bits_per_sample, |dest| {
            dest.extend(left.iter().zip(right).map(|(l, r)| (l + r) >> 1));
        });
        self.channels[3].load(bits_per_sample + 1, |dest| {
            dest.extend(left.iter().zip(right).map(|(l, r)| l - r));
        });
    }

    /// Loads `len` samples from `offset` of `parent`, sharing its wasted bits.
    pub fn load_part(&mut self, parent: &Self, offset: usize, len: usize) {
        self.block_size = len;
        self.active = parent.active;
        self.stereo = parent.stereo;
        self.assignment = parent.assignment;
        for (ch, src) in self.channels.iter_mut().zip(&parent.channels[..parent.active]) {
            ch.load_part(src, offset, len);
        }
    }

    /// Returns the indices of the channels stored in the frame.
    pub fn selected_channels(&self) -> heapless::Vec<usize, MAX_CHANNELS> {
        let mut ret = heapless::Vec::new();
        if self.stereo {
            let (a, b) = self.assignment.select_channels(0, 1, 2, 3);
            ret.push(a).expect(panic_msg::DATA_INCONSISTENT);
            ret.push(b).expect(panic_msg::DATA_INCONSISTENT);
        } else {
            for ch in 0..self.active {
                ret.push(ch).expect(panic_msg::DATA_INCONSISTENT);
            }
        }
        ret
    }

    /// Materializes the subframes of the selected channels.
    pub fn subframes(&self) -> Vec<SubFrame> {
        self.selected_channels()
            .into_iter()
            .map(|idx| self.channels[idx].to_subframe())
            .collect()
    }
}
