//! Trigger primitives for the sync detector

/// Hysteresis comparator.
#[derive(Debug, Clone)]
pub struct SchmittTrigger {
    low: f32,
    high: f32,
    previous: bool,
}

impl SchmittTrigger {
    pub fn new(low: f32, high: f32) -> Self {
        Self {
            low,
            high,
            previous: false,
        }
    }

    pub fn process(&mut self, input: f32) -> bool {
        if self.previous {
            if input < self.low {
                self.previous = false;
            }
        } else if input > self.high {
            self.previous = true;
        }
        self.previous
    }
}

/// True for exactly one call when the input goes from true to false.
#[derive(Debug, Clone, Default)]
pub struct FallingEdgeTrigger {
    previous: bool,
}

impl FallingEdgeTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, input: bool) -> bool {
        let tmp = self.previous;
        self.previous = input;
        tmp && !input
    }
}
