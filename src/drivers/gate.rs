use crate::types::Sample;

/// Minimum step, in ADC counts, that gets through when filtering is on.
pub const DEFAULT_NOISE_THRESHOLD: Sample = 2;

/// Drops samples that differ from the displayed one by no more than the
/// threshold. The trace then holds its last value, which reads as flat
/// segments under noise suppression.
#[derive(Clone, Copy, Debug)]
pub struct NoiseGate {
    threshold: Sample,
}

impl NoiseGate {
    pub fn new(threshold: Sample) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> Sample {
        self.threshold
    }

    pub fn accept(&self, new_value: Sample, previous: Sample, enabled: bool) -> bool {
        !enabled || new_value.abs_diff(previous) > self.threshold
    }
}

impl Default for NoiseGate {
    fn default() -> Self {
        Self::new(DEFAULT_NOISE_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_gate_accepts_everything() {
        let gate = NoiseGate::default();
        assert!(gate.accept(100, 100, false));
        assert!(gate.accept(101, 100, false));
    }

    #[test]
    fn enabled_gate_needs_step_above_threshold() {
        let gate = NoiseGate::default();
        assert!(!gate.accept(100, 100, true));
        assert!(!gate.accept(102, 100, true));
        assert!(!gate.accept(98, 100, true));
        assert!(gate.accept(103, 100, true));
        assert!(gate.accept(97, 100, true));
        assert!(gate.accept(0, 1023, true));
    }

    #[test]
    fn custom_threshold() {
        let gate = NoiseGate::new(10);
        assert!(!gate.accept(510, 500, true));
        assert!(gate.accept(511, 500, true));
    }
}
