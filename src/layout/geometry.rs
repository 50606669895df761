use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

/// Point on the layout surface, `[0, S] × [0, S]`, y growing downwards.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Displacement between two positions.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Offset {
    pub dx: f64,
    pub dy: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// `angle` in radians, 0 pointing right, increasing clockwise on screen.
    pub fn from_polar(center: Position, radius: f64, angle: f64) -> Self {
        Self {
            x: center.x + radius * angle.cos(),
            y: center.y + radius * angle.sin(),
        }
    }

    pub fn distance_to(&self, other: Position) -> f64 {
        (*self - other).length()
    }

    /// Angle of `self` as seen from `center`.
    pub fn angle_from(&self, center: Position) -> f64 {
        (self.y - center.y).atan2(self.x - center.x)
    }
}

impl Offset {
    pub const fn new(dx: f64, dy: f64) -> Self {
        Self { dx, dy }
    }

    pub fn length(&self) -> f64 {
        self.dx.hypot(self.dy)
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self::new(self.dx * factor, self.dy * factor)
    }

    /// Unit vector in the same direction; zero stays zero.
    pub fn normalized(&self) -> Self {
        let len = self.length();
        if len <= f64::EPSILON {
            Self::default()
        } else {
            self.scaled(1.0 / len)
        }
    }
}

impl Sub for Position {
    type Output = Offset;

    fn sub(self, rhs: Position) -> Offset {
        Offset::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Add<Offset> for Position {
    type Output = Position;

    fn add(self, rhs: Offset) -> Position {
        Position::new(self.x + rhs.dx, self.y + rhs.dy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn polar_top_is_negative_half_pi() {
        let c = Position::new(100.0, 100.0);
        let top = Position::from_polar(c, 50.0, -FRAC_PI_2);
        assert!((top.x - 100.0).abs() < 1e-9);
        assert!((top.y - 50.0).abs() < 1e-9);
        assert!((top.angle_from(c) + FRAC_PI_2).abs() < 1e-9);
    }

    #[test]
    fn offsets_compose_with_positions() {
        let a = Position::new(3.0, 4.0);
        let o = a - Position::default();
        assert_eq!(o.length(), 5.0);
        assert_eq!(Position::default() + o, a);
        assert_eq!(Offset::default().normalized(), Offset::default());
    }
}
