// DSP utilities applied by the mixer to every output sample

/// Values below this are treated as silence
const DENORMAL_THRESHOLD: f32 = 1e-15;

/// Replace denormal-range values with zero
///
/// Decaying click tails approach zero asymptotically; arithmetic on denormals
/// is very slow on some CPUs.
#[inline]
pub fn flush_denormals_to_zero(x: f32) -> f32 {
    if x.abs() < DENORMAL_THRESHOLD { 0.0 } else { x }
}

/// Bound summed clicks to [-1, 1]
///
/// Near-linear for quiet signals, so a single click passes almost unchanged.
#[inline]
pub fn soft_clip(x: f32) -> f32 {
    x.tanh()
}

/// First-order low-pass used to glide the master gain
///
/// `y[n] = y[n-1] + a * (x[n] - y[n-1])` with `a = 1 - exp(-1 / tau)`,
/// `tau` being the time constant in samples.
#[derive(Debug, Clone)]
pub struct OnePoleSmoother {
    current: f32,
    coefficient: f32,
}

impl OnePoleSmoother {
    /// Start at `initial_value`, reaching ~63% of a step after
    /// `time_constant_ms`
    ///
    /// ```
    /// use beatkeeper::audio::dsp_utils::OnePoleSmoother;
    ///
    /// let mut gain = OnePoleSmoother::new(1.0, 10.0, 48000.0);
    /// let next = gain.process(0.0);
    /// assert!(next < 1.0 && next > 0.99);
    /// ```
    pub fn new(initial_value: f32, time_constant_ms: f32, sample_rate: f32) -> Self {
        let tau = time_constant_ms * 0.001 * sample_rate;
        let coefficient = if tau > 1.0 { 1.0 - (-1.0 / tau).exp() } else { 1.0 };

        Self {
            current: initial_value,
            coefficient,
        }
    }

    #[inline]
    pub fn process(&mut self, target: f32) -> f32 {
        self.current = flush_denormals_to_zero(self.current + self.coefficient * (target - self.current));
        self.current
    }

    /// Jump straight to `value`
    #[inline]
    pub fn reset(&mut self, value: f32) {
        self.current = value;
    }

    #[inline]
    pub fn get(&self) -> f32 {
        self.current
    }
}
