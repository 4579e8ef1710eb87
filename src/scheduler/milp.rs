// shp-scheduler: self-healing schedule synthesis for time-triggered networks
// Copyright (C) 2024 The shp-scheduler developers
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Gadgets to express logical constraints in a purely linear MILP model.
//!
//! CBC offers neither general indicator constraints nor a native OR over booleans, so both are
//! linearized here with the usual big-M encoding. The big-M value must dominate the range of the
//! constrained expressions; the schedulers pass a multiple of the hyperperiod.

use good_lp::{constraint, Expression, SolverModel, Variable};

/// Constrain the binary variable `x` to be the disjunction of `vars`:
///
/// ```text
/// x >= v    for every v
/// x <= sum(vars)
/// ```
///
/// Fixing `x` to 1 therefore forces at least one of `vars` to 1.
pub fn or_all(problem: &mut impl SolverModel, x: Variable, vars: &[Variable]) {
    for v in vars.iter() {
        problem.add_constraint(constraint!(x >= *v));
    }
    let sum: Expression = vars.iter().copied().sum();
    problem.add_constraint(constraint!(x <= sum));
}

/// Add the indicator `b = 1  =>  lhs >= rhs`, linearized as
///
/// ```text
/// lhs >= rhs - M * (1 - b)
/// ```
///
/// With `b == 0` the row is vacuous as long as `M` exceeds `rhs` minus the smallest value `lhs`
/// can take.
pub fn indicator(problem: &mut impl SolverModel, b: Variable, lhs: Expression, rhs: f64, big_m: f64) {
    problem.add_constraint(constraint!(lhs >= rhs - big_m * (1 - b)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use good_lp::{solvers::coin_cbc::coin_cbc, variable, ProblemVariables, Solution, SolverModel};

    #[test]
    fn or_forces_a_choice() {
        let mut p = ProblemVariables::new();
        let x = p.add(variable().integer().min(1).max(1));
        let a = p.add(variable().binary());
        let b = p.add(variable().binary());
        // minimize a + 2 b: with x = a or b fixed to one, the optimum picks a
        let mut model = coin_cbc(p.minimise(a + 2 * b));
        model.set_parameter("logLevel", "0");
        or_all(&mut model, x, &[a, b]);
        let solution = model.solve().unwrap();
        assert_eq!(solution.value(a).round() as i64, 1);
        assert_eq!(solution.value(b).round() as i64, 0);
    }

    #[test]
    fn indicator_binds_only_when_active() {
        let mut p = ProblemVariables::new();
        let s = p.add(variable().integer().min(0).max(10));
        let b = p.add(variable().binary());
        let mut model = coin_cbc(p.minimise(s - 10 * b));
        model.set_parameter("logLevel", "0");
        // b = 1 => s >= 7; the objective rewards b = 1 but pays for s
        indicator(&mut model, b, s.into(), 7.0, 100.0);
        let solution = model.solve().unwrap();
        assert_eq!(solution.value(b).round() as i64, 1);
        assert!(solution.value(s).round() as i64 >= 7);
    }
}
