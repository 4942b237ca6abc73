/// One-pole filter primitives for the output stage.
///
/// 1-pole HPF via bilinear transform: H(s) = s/(s + wc)
#[derive(Clone, Debug)]
pub struct OnePoleHpf {
    a1: f64,
    b0: f64,
    x_prev: f64,
    y_prev: f64,
}

impl OnePoleHpf {
    pub fn new(cutoff_hz: f64, sample_rate: f64) -> Self {
        let wc = 2.0 * sample_rate * (std::f64::consts::PI * cutoff_hz / sample_rate).tan();
        let k = 2.0 * sample_rate;
        let norm = 1.0 / (k + wc);
        Self {
            b0: k * norm,
            a1: (wc - k) * norm,
            x_prev: 0.0,
            y_prev: 0.0,
        }
    }

    pub fn process(&mut self, x: f64) -> f64 {
        let y = self.b0 * (x - self.x_prev) - self.a1 * self.y_prev;
        self.x_prev = x;
        self.y_prev = y;
        y
    }

    pub fn reset(&mut self) {
        self.x_prev = 0.0;
        self.y_prev = 0.0;
    }
}

/// DC blocker: 1-pole HPF at a few Hz.
///
/// Displacement taps on a struck or bowed object drift with its rigid offset;
/// this keeps the output centred without touching the audible band.
#[derive(Clone, Debug)]
pub struct DcBlocker {
    hpf: OnePoleHpf,
}

impl DcBlocker {
    pub const CUTOFF_HZ: f64 = 10.0;

    pub fn new(sample_rate: f64) -> Self {
        Self {
            hpf: OnePoleHpf::new(Self::CUTOFF_HZ, sample_rate),
        }
    }

    pub fn process(&mut self, x: f64) -> f64 {
        self.hpf.process(x)
    }

    pub fn reset(&mut self) {
        self.hpf.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_dc_blocker_removes_dc() {
        let sr = 44100.0;
        let mut dc = DcBlocker::new(sr);

        // Feed DC offset for a while
        let n = sr as usize;
        let mut last = 0.0;
        for _ in 0..n {
            last = dc.process(1.0);
        }
        assert!(last.abs() < 0.01, "DC blocker didn't remove DC: {last}");
    }

    #[test]
    fn test_dc_blocker_passes_audio() {
        let sr = 44100.0;
        let mut dc = DcBlocker::new(sr);
        let freq = 220.0;
        let n = (sr * 0.5) as usize;
        let mut peak = 0.0f64;
        for i in 0..n {
            let x = (2.0 * PI * freq * i as f64 / sr).sin();
            let y = dc.process(x);
            if i > n / 2 {
                peak = peak.max(y.abs());
            }
        }
        assert!(peak > 0.99, "220 Hz attenuated to {peak}");
    }

    #[test]
    fn test_reset_clears_state() {
        let mut dc = DcBlocker::new(48000.0);
        dc.process(1.0);
        dc.reset();
        assert_eq!(dc.process(0.0), 0.0);
    }
}
