//! Constraint kinds and how each one is brought back to satisfaction.

use crate::variable::{Pos, VarId};
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};
use std::fmt;
use umbra_core::geometry::{Point, project_on_segment};

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConstraintId(pub u32);

impl fmt::Debug for ConstraintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// A relation between variables, kept true by the [`Solver`](crate::Solver).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constraint {
    /// `a + delta == b`
    Equals { a: VarId, b: VarId, delta: f64 },
    /// `smaller + delta <= bigger`
    LessThan {
        smaller: VarId,
        bigger: VarId,
        delta: f64,
    },
    /// `point` lies on the segment `start..end`; only `point` moves.
    Line { start: Pos, end: Pos, point: Pos },
    /// `point` sits on `target`; only `point` moves.
    Coincident { target: Pos, point: Pos },
}

/// New values for the variables a constraint decided to move.
pub type Adjustment = SmallVec<[(VarId, f64); 2]>;

impl Constraint {
    /// Both positions share the same x.
    pub fn vertical(a: Pos, b: Pos) -> Self {
        Constraint::Equals {
            a: a.x,
            b: b.x,
            delta: 0.0,
        }
    }

    /// Both positions share the same y.
    pub fn horizontal(a: Pos, b: Pos) -> Self {
        Constraint::Equals {
            a: a.y,
            b: b.y,
            delta: 0.0,
        }
    }

    /// `top` is at least `delta` above `bottom`.
    pub fn above(top: Pos, bottom: Pos, delta: f64) -> Self {
        Constraint::LessThan {
            smaller: top.y,
            bigger: bottom.y,
            delta,
        }
    }

    /// Every variable the constraint reads.
    pub fn variables(&self) -> SmallVec<[VarId; 6]> {
        match *self {
            Constraint::Equals { a, b, .. } => smallvec![a, b],
            Constraint::LessThan {
                smaller, bigger, ..
            } => smallvec![smaller, bigger],
            Constraint::Line { start, end, point } => {
                smallvec![start.x, start.y, end.x, end.y, point.x, point.y]
            }
            Constraint::Coincident { target, point } => {
                smallvec![target.x, target.y, point.x, point.y]
            }
        }
    }

    /// Variables the solver may pick from when the constraint is violated.
    pub fn candidates(&self) -> SmallVec<[VarId; 2]> {
        match *self {
            Constraint::Equals { a, b, .. } => smallvec![a, b],
            Constraint::LessThan {
                smaller, bigger, ..
            } => smallvec![smaller, bigger],
            Constraint::Line { point, .. } | Constraint::Coincident { point, .. } => {
                smallvec![point.x, point.y]
            }
        }
    }

    pub fn is_satisfied(&self, value: impl Fn(VarId) -> f64, tolerance: f64) -> bool {
        match *self {
            Constraint::Equals { a, b, delta } => (value(a) + delta - value(b)).abs() <= tolerance,
            Constraint::LessThan {
                smaller,
                bigger,
                delta,
            } => value(smaller) + delta <= value(bigger) + tolerance,
            Constraint::Line { start, end, point } => {
                let p = point_of(&value, point);
                let q = project_on_segment(p, point_of(&value, start), point_of(&value, end));
                p.distance(q) <= tolerance
            }
            Constraint::Coincident { target, point } => {
                let p = point_of(&value, point);
                let t = point_of(&value, target);
                (p.x - t.x).abs() <= tolerance && (p.y - t.y).abs() <= tolerance
            }
        }
    }

    /// Values that satisfy the constraint, moving `target` for the
    /// two-variable kinds. The point kinds ignore `target`.
    pub fn solve(&self, value: impl Fn(VarId) -> f64, target: VarId) -> Adjustment {
        match *self {
            Constraint::Equals { a, b, delta } => {
                if target == b {
                    smallvec![(b, value(a) + delta)]
                } else {
                    smallvec![(a, value(b) - delta)]
                }
            }
            Constraint::LessThan {
                smaller,
                bigger,
                delta,
            } => {
                if target == bigger {
                    smallvec![(bigger, value(smaller) + delta)]
                } else {
                    smallvec![(smaller, value(bigger) - delta)]
                }
            }
            Constraint::Line { start, end, point } => {
                let p = project_on_segment(
                    point_of(&value, point),
                    point_of(&value, start),
                    point_of(&value, end),
                );
                smallvec![(point.x, p.x), (point.y, p.y)]
            }
            Constraint::Coincident { target: t, point } => {
                smallvec![(point.x, value(t.x)), (point.y, value(t.y))]
            }
        }
    }
}

fn point_of(value: &impl Fn(VarId) -> f64, pos: Pos) -> Point {
    Point::new(value(pos.x), value(pos.y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lookup(values: &[f64]) -> impl Fn(VarId) -> f64 + '_ {
        move |v: VarId| values[v.0 as usize]
    }

    #[test]
    fn equals_moves_the_chosen_side() {
        let values = [10.0, 20.0];
        let c = Constraint::Equals {
            a: VarId(0),
            b: VarId(1),
            delta: 0.0,
        };
        assert!(!c.is_satisfied(lookup(&values), 1e-6));
        assert_eq!(c.solve(lookup(&values), VarId(1)).to_vec(), vec![(VarId(1), 10.0)]);
        assert_eq!(c.solve(lookup(&values), VarId(0)).to_vec(), vec![(VarId(0), 20.0)]);
    }

    #[test]
    fn less_than_enforces_minimum_distance() {
        let values = [0.0, 5.0];
        let c = Constraint::LessThan {
            smaller: VarId(0),
            bigger: VarId(1),
            delta: 10.0,
        };
        assert!(!c.is_satisfied(lookup(&values), 1e-6));
        assert_eq!(c.solve(lookup(&values), VarId(1)).to_vec(), vec![(VarId(1), 10.0)]);
        assert!(c.is_satisfied(lookup(&[0.0, 30.0]), 1e-6));
    }

    #[test]
    fn line_projects_point_onto_segment() {
        // start (0,0), end (0,100), point (7, 40)
        let values = [0.0, 0.0, 0.0, 100.0, 7.0, 40.0];
        let pos = |x, y| Pos {
            x: VarId(x),
            y: VarId(y),
        };
        let c = Constraint::Line {
            start: pos(0, 1),
            end: pos(2, 3),
            point: pos(4, 5),
        };
        assert!(!c.is_satisfied(lookup(&values), 1e-6));
        assert_eq!(
            c.solve(lookup(&values), VarId(4)).to_vec(),
            vec![(VarId(4), 0.0), (VarId(5), 40.0)]
        );
        assert_eq!(c.candidates().to_vec(), vec![VarId(4), VarId(5)]);
    }
}
