// Bounded back-and-forth position generator for one servo
//
// Pure state: no timing and no hardware access. The cyclic controller calls
// advance() once per tick and writes the result to the bus.

use super::MotionError;

/// Travel direction of an oscillator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Increasing,
    Decreasing,
}

impl Direction {
    fn reversed(self) -> Self {
        match self {
            Direction::Increasing => Direction::Decreasing,
            Direction::Decreasing => Direction::Increasing,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Oscillator {
    min_position: i32,
    max_position: i32,
    step: i32,
    start_position: i32,
    enabled: bool,
    current_position: i32,
    direction: Direction,
}

impl Oscillator {
    /// Create an oscillator seeded at `start_position`
    ///
    /// The start may lie outside `[min, max]`; the first advance pulls it back
    /// inside. A `step` of 0 is accepted and never moves.
    pub fn new(
        min_position: i32,
        max_position: i32,
        step: i32,
        start_position: i32,
        enabled: bool,
    ) -> Result<Self, MotionError> {
        if min_position > max_position {
            return Err(MotionError::InvalidBounds {
                min: min_position,
                max: max_position,
            });
        }
        if step < 0 {
            return Err(MotionError::NegativeStep { step });
        }

        Ok(Self {
            min_position,
            max_position,
            step,
            start_position,
            enabled,
            current_position: start_position,
            direction: Direction::Increasing,
        })
    }

    /// Step one position along the current direction
    ///
    /// Direction is re-evaluated first: at or beyond max it turns down, at or
    /// beyond min it turns up, and with equal bounds it flips every call. The
    /// result is clamped into the bounds, so the oscillator reverses exactly at
    /// the edges. Returns `None` when disabled.
    pub fn advance(&mut self) -> Option<i32> {
        if !self.enabled {
            return None;
        }

        let at_max = self.current_position >= self.max_position;
        let at_min = self.current_position <= self.min_position;
        self.direction = match (at_max, at_min) {
            // Pinned between equal bounds: keep flipping, the clamp holds the position
            (true, true) => self.direction.reversed(),
            (true, false) => Direction::Decreasing,
            (false, true) => Direction::Increasing,
            (false, false) => self.direction,
        };

        let next = match self.direction {
            Direction::Increasing => self.current_position.saturating_add(self.step),
            Direction::Decreasing => self.current_position.saturating_sub(self.step),
        };
        self.current_position = next.clamp(self.min_position, self.max_position);
        Some(self.current_position)
    }

    /// Assign the position unconditionally, bounds are not checked
    pub fn set(&mut self, position: i32) {
        self.current_position = position;
    }

    /// Return to the start position and return it
    pub fn home(&mut self) -> i32 {
        self.set(self.start_position);
        self.start_position
    }

    pub fn position(&self) -> i32 {
        self.current_position
    }

    pub fn start_position(&self) -> i32 {
        self.start_position
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advance_n(osc: &mut Oscillator, n: usize) -> Vec<i32> {
        (0..n).filter_map(|_| osc.advance()).collect()
    }

    #[test]
    fn test_bounces_at_upper_edge() {
        let center = -8500;
        let mut osc = Oscillator::new(center - 700, center + 700, 350, center, true).unwrap();

        let positions = advance_n(&mut osc, 4);
        assert_eq!(
            positions,
            vec![center + 350, center + 700, center + 350, center]
        );
        assert_eq!(osc.direction(), Direction::Decreasing);
    }

    #[test]
    fn test_full_cycle_returns_to_start() {
        let mut osc = Oscillator::new(-700, 700, 350, 0, true).unwrap();
        let positions = advance_n(&mut osc, 8);
        assert_eq!(positions, vec![350, 700, 350, 0, -350, -700, -350, 0]);
    }

    #[test]
    fn test_stays_within_bounds() {
        // Steps that do not divide the range still never leave [min, max]
        for &(min, max, step, start) in &[
            (0, 10, 3, 0),
            (-7000, 1000, 150, 1000),
            (-700, 700, 350, 0),
            (5, 6, 100, 5),
            (-100, 100, 7, -100),
        ] {
            let mut osc = Oscillator::new(min, max, step, start, true).unwrap();
            let mut previous = osc.position();
            for _ in 0..500 {
                let pos = osc.advance().unwrap();
                assert!(pos >= min && pos <= max, "{} outside [{}, {}]", pos, min, max);
                assert!((pos - previous).abs() <= step, "moved more than one step");
                previous = pos;
            }
        }
    }

    #[test]
    fn test_reaches_both_edges() {
        let mut osc = Oscillator::new(0, 10, 3, 0, true).unwrap();
        let positions = advance_n(&mut osc, 10);
        assert_eq!(positions, vec![3, 6, 9, 10, 7, 4, 1, 0, 3, 6]);
    }

    #[test]
    fn test_start_outside_bounds_corrected_on_first_advance() {
        let mut osc = Oscillator::new(-9200, -7800, 350, 0, true).unwrap();
        assert_eq!(osc.position(), 0);
        assert_eq!(osc.advance(), Some(-7800));
        assert_eq!(osc.advance(), Some(-8150));

        let mut osc = Oscillator::new(-9200, -7800, 350, -20_000, true).unwrap();
        assert_eq!(osc.advance(), Some(-9200));
        assert_eq!(osc.advance(), Some(-8850));
    }

    #[test]
    fn test_equal_bounds_hold_position() {
        let mut osc = Oscillator::new(500, 500, 100, 500, true).unwrap();
        let mut previous = osc.direction();
        for _ in 0..100 {
            assert_eq!(osc.advance(), Some(500));
            assert_ne!(osc.direction(), previous, "direction flips every advance");
            previous = osc.direction();
        }
    }

    #[test]
    fn test_zero_step_never_moves() {
        let mut osc = Oscillator::new(-700, 700, 0, 200, true).unwrap();
        for _ in 0..100 {
            assert_eq!(osc.advance(), Some(200));
        }
    }

    #[test]
    fn test_disabled_never_moves() {
        let mut osc = Oscillator::new(-7000, 1000, 150, 1000, false).unwrap();
        for _ in 0..100 {
            assert_eq!(osc.advance(), None);
        }
        assert_eq!(osc.position(), 1000);
    }

    #[test]
    fn test_set_ignores_bounds() {
        let mut osc = Oscillator::new(-700, 700, 350, 0, true).unwrap();
        osc.set(5000);
        assert_eq!(osc.position(), 5000);
        assert_eq!(osc.advance(), Some(700));
        assert_eq!(osc.home(), 0);
        assert_eq!(osc.position(), 0);
    }

    #[test]
    fn test_rejects_inverted_bounds() {
        assert!(matches!(
            Oscillator::new(10, -10, 1, 0, true),
            Err(MotionError::InvalidBounds { min: 10, max: -10 })
        ));
    }

    #[test]
    fn test_rejects_negative_step() {
        assert!(matches!(
            Oscillator::new(-10, 10, -1, 0, true),
            Err(MotionError::NegativeStep { step: -1 })
        ));
    }
}
