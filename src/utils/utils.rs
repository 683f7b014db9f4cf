use std::time::Instant;

/// Index of the largest value, first index winning ties. None when empty.
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, &value) in values.iter().enumerate() {
        match best {
            Some((_, top)) if value <= top => {}
            _ => best = Some((idx, value)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Instantaneous frames-per-second from the gap between consecutive ticks.
///
/// Reports 0.0 on the first tick and whenever the clock has not advanced.
#[derive(Debug)]
pub struct FpsCounter {
    last: Option<Instant>,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self { last: None }
    }

    pub fn tick(&mut self) -> f32 {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> f32 {
        let fps = match self.last {
            Some(last) => {
                let elapsed = now.duration_since(last).as_secs_f32();
                if elapsed > 0.0 {
                    1.0 / elapsed
                } else {
                    0.0
                }
            }
            None => 0.0,
        };
        self.last = Some(now);
        fps
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn argmax_picks_largest() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), Some(1));
    }

    #[test]
    fn argmax_breaks_ties_toward_first_index() {
        assert_eq!(argmax(&[0.4, 0.4, 0.1]), Some(0));
        assert_eq!(argmax(&[0.2, 0.5, 0.5]), Some(1));
    }

    #[test]
    fn argmax_of_empty_slice_is_none() {
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn fps_counter_first_tick_is_zero() {
        let mut counter = FpsCounter::new();
        assert_eq!(counter.tick_at(Instant::now()), 0.0);
    }

    #[test]
    fn fps_counter_inverts_frame_gap() {
        let mut counter = FpsCounter::new();
        let t0 = Instant::now();
        counter.tick_at(t0);
        let fps = counter.tick_at(t0 + Duration::from_millis(100));
        assert!((fps - 10.0).abs() < 0.1, "fps was {fps}");
    }

    #[test]
    fn fps_counter_reports_zero_when_clock_stalls() {
        let mut counter = FpsCounter::new();
        let t0 = Instant::now();
        counter.tick_at(t0);
        assert_eq!(counter.tick_at(t0), 0.0);
    }
}
