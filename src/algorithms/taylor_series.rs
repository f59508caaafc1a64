//! Taylor-series (Gauss-Newton) TDOA solver
//!
//! Each iteration linearises the range-difference model
//! `f_i(p) = |P_i − p| − |P_ref − p|` around the current estimate and solves
//! the weighted normal equations `(JᵀWJ + λ·tr/2·I)·δ = JᵀW·r` for the
//! correction `δ`. The damping `λ` stays at zero while full steps reduce the
//! residual and grows tenfold on every rejected step, so far from the
//! stations the solver falls back from Gauss-Newton towards gradient descent.
//!
//! A solve tries several starting points in turn (closed-form candidates,
//! station centroid, reference station) until one converges. All starts share
//! the one iteration budget.

use crate::algorithms::closed_form::closed_form_candidates;
use crate::processing::observation_set::ObservationSet;
use crate::utils::config::{InitialGuess, SolverConfig};
use crate::validation::error::{GeometryIssue, LocationError};
use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};
use std::iter;
use tracing::debug;

/// Distance below which the estimate is considered to sit on a station (m)
const ON_STATION_EPSILON_M: f64 = 1e-6;

/// Offset applied to a starting point that lands on a station (m)
const START_OFFSET_M: (f64, f64) = (-1000.0, 1000.0);

/// Starting points closer than this to a station or an earlier start are moved or dropped (m)
const START_SEPARATION_M: f64 = 1.0;

/// Snapshot of one solver iteration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// Index of the starting point this iteration belongs to
    pub start: usize,
    pub iteration: usize,
    pub x_m: f64,
    pub y_m: f64,
    pub step_m: f64,
    pub residual_norm: f64,
    /// Damping factor the step was computed with
    pub damping: f64,
    /// Whether the step reduced the residual and was taken
    pub accepted: bool,
}

/// Mutable estimate owned by a single solve
#[derive(Debug, Clone, PartialEq)]
pub struct PositionEstimate {
    pub position: Vector2<f64>,
    /// Iterations spent so far, including earlier starts
    pub iterations: usize,
    pub residual_history: Vec<f64>,
    pub step_history: Vec<f64>,
    pub damping: f64,
    start: usize,
    growing_steps: usize,
    trace: Vec<IterationRecord>,
}

impl PositionEstimate {
    pub fn new(position: Vector2<f64>) -> Self {
        Self::starting_at(position, 0, 0)
    }

    fn starting_at(position: Vector2<f64>, start: usize, iterations: usize) -> Self {
        Self {
            position,
            iterations,
            residual_history: Vec::new(),
            step_history: Vec::new(),
            damping: 0.0,
            start,
            growing_steps: 0,
            trace: Vec::new(),
        }
    }

    fn record_step(&mut self, step_norm: f64, residual_norm: f64) {
        match self.step_history.last() {
            Some(&previous) if step_norm > previous => self.growing_steps += 1,
            _ => self.growing_steps = 0,
        }
        self.step_history.push(step_norm);
        self.residual_history.push(residual_norm);
    }

    /// Residual norm stopped changing between the last two accepted steps
    fn residual_stagnated(&self, ratio: f64) -> bool {
        match self.residual_history.as_slice() {
            [.., previous, current] => (previous - current).abs() <= ratio * previous,
            _ => false,
        }
    }
}

/// Successful terminal state
#[derive(Debug, Clone, PartialEq)]
pub struct Convergence {
    pub position: Vector2<f64>,
    pub iterations: usize,
    /// Weighted residual norm at the final estimate (m)
    pub residual_norm: f64,
    pub trace: Vec<IterationRecord>,
}

/// Divergent terminal state; carries no usable estimate
#[derive(Debug, Clone, PartialEq)]
pub struct Divergence {
    pub iterations: usize,
    pub reason: String,
    pub trace: Vec<IterationRecord>,
}

/// Solver state machine
#[derive(Debug, Clone, PartialEq)]
pub enum SolverState {
    Initializing,
    Iterating(PositionEstimate),
    Converged(Convergence),
    Diverged(Divergence),
    Failed(LocationError),
}

impl SolverState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SolverState::Converged(_) | SolverState::Diverged(_) | SolverState::Failed(_)
        )
    }

    /// Collapse a terminal state into the convergence or its typed failure
    pub fn into_result(self) -> Result<Convergence, LocationError> {
        match self {
            SolverState::Converged(convergence) => Ok(convergence),
            SolverState::Diverged(divergence) => Err(LocationError::divergence(
                divergence.iterations,
                divergence.reason,
            )),
            SolverState::Failed(error) => Err(error),
            SolverState::Initializing | SolverState::Iterating(_) => Err(LocationError::divergence(
                0,
                "solver stopped before reaching a terminal state",
            )),
        }
    }

    fn with_trace(self, trace: Vec<IterationRecord>) -> Self {
        match self {
            SolverState::Converged(convergence) => SolverState::Converged(Convergence { trace, ..convergence }),
            SolverState::Diverged(divergence) => SolverState::Diverged(Divergence { trace, ..divergence }),
            other => other,
        }
    }
}

/// Linearised system at one estimate
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct NormalEquations {
    pub normal: Matrix2<f64>,
    pub rhs: Vector2<f64>,
    pub residual_norm: f64,
}

impl NormalEquations {
    /// Solve for the undamped correction; `None` when the normal matrix is singular
    pub fn solve(&self, tolerance: f64) -> Option<Vector2<f64>> {
        self.solve_damped(tolerance, 0.0)
    }

    /// Solve `(N + λ·tr(N)/2·I)·δ = rhs`.
    ///
    /// Singularity is judged on the undamped matrix via `det / trace²`, which
    /// lies in (0, 1/4] for a positive-definite 2x2 matrix and is scale-free.
    pub fn solve_damped(&self, tolerance: f64, damping: f64) -> Option<Vector2<f64>> {
        let trace = self.normal.trace();
        let det = self.normal.determinant();
        if !(trace > 0.0) || !(det / (trace * trace) >= tolerance) {
            return None;
        }
        let damped = self.normal + Matrix2::identity() * (damping * 0.5 * trace);
        damped.try_inverse().map(|inverse| inverse * self.rhs)
    }
}

/// Build the weighted normal equations around `position`
pub(crate) fn linearize(
    set: &ObservationSet,
    position: &Vector2<f64>,
) -> Result<NormalEquations, LocationError> {
    let stations = set.stations();
    let reference = set.reference();

    let to_reference = position - reference.position;
    let d_ref = to_reference.norm();
    if d_ref < ON_STATION_EPSILON_M {
        return Err(on_station(&reference.station_id));
    }

    let mut normal = Matrix2::<f64>::zeros();
    let mut rhs = Vector2::<f64>::zeros();
    let mut weighted_sum_sq = 0.0;

    for row in set.range_differences() {
        let station = &stations[row.station];
        let to_station = position - station.position;
        let d_i = to_station.norm();
        if d_i < ON_STATION_EPSILON_M {
            return Err(on_station(&station.station_id));
        }

        let predicted = d_i - d_ref;
        let residual = row.meters - predicted;
        let jacobian = to_station / d_i - to_reference / d_ref;

        normal += row.weight * jacobian * jacobian.transpose();
        rhs += row.weight * residual * jacobian;
        weighted_sum_sq += row.weight * residual * residual;
    }

    Ok(NormalEquations {
        normal,
        rhs,
        residual_norm: weighted_sum_sq.sqrt(),
    })
}

/// Weighted residual norm of the range-difference model at `position`
pub fn weighted_residual_norm(set: &ObservationSet, position: &Vector2<f64>) -> f64 {
    let stations = set.stations();
    let d_ref = (position - set.reference().position).norm();

    set.range_differences()
        .iter()
        .map(|row| {
            let d_i = (position - stations[row.station].position).norm();
            let residual = row.meters - (d_i - d_ref);
            row.weight * residual * residual
        })
        .sum::<f64>()
        .sqrt()
}

fn on_station(station_id: &str) -> LocationError {
    LocationError::degenerate(
        GeometryIssue::EstimateOnStation,
        format!("estimate coincides with station '{}'", station_id),
    )
}

/// Iterative least-squares solver for one observation set
#[derive(Debug, Clone)]
pub struct TaylorSeriesSolver<'a> {
    config: &'a SolverConfig,
    initial_guess: InitialGuess,
    trace: bool,
}

impl<'a> TaylorSeriesSolver<'a> {
    pub fn new(config: &'a SolverConfig, initial_guess: InitialGuess) -> Self {
        Self {
            config,
            initial_guess,
            trace: false,
        }
    }

    /// Record every iteration and emit it at DEBUG level
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// Run each starting point in turn until one converges.
    ///
    /// When every start fails, the failure of the first start is reported
    /// with the iterations spent across all of them.
    pub fn solve(&self, set: &ObservationSet) -> SolverState {
        let mut spent = 0;
        let mut trace = Vec::new();
        let mut first_failure = None;

        for (start, point) in self.starting_points(set).into_iter().enumerate() {
            if spent >= self.config.max_iterations {
                break;
            }
            if start > 0 {
                debug!(start, spent, x_m = point.x, y_m = point.y, "restarting from next starting point");
            }

            let mut estimate = PositionEstimate::starting_at(point, start, spent);
            let terminal = loop {
                if let Some(terminal) = self.step(&mut estimate, set) {
                    break terminal;
                }
            };
            spent = estimate.iterations;
            trace.append(&mut estimate.trace);

            if let SolverState::Converged(_) = terminal {
                return terminal.with_trace(trace);
            }
            if first_failure.is_none() {
                first_failure = Some(terminal);
            }
        }

        match first_failure {
            Some(SolverState::Diverged(divergence)) => SolverState::Diverged(Divergence {
                iterations: spent,
                ..divergence
            })
            .with_trace(trace),
            Some(failure) => failure,
            None => SolverState::Diverged(self.budget_exhausted(spent)).with_trace(trace),
        }
    }

    /// Perform a single state transition from the preferred starting point
    pub fn advance(&self, state: SolverState, set: &ObservationSet) -> SolverState {
        match state {
            SolverState::Initializing => {
                let start = self
                    .starting_points(set)
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| set.centroid());
                SolverState::Iterating(PositionEstimate::new(start))
            }
            SolverState::Iterating(mut estimate) => match self.step(&mut estimate, set) {
                Some(terminal) => terminal.with_trace(estimate.trace),
                None => SolverState::Iterating(estimate),
            },
            terminal => terminal,
        }
    }

    /// Starting points in trial order, moved off stations and deduplicated
    fn starting_points(&self, set: &ObservationSet) -> Vec<Vector2<f64>> {
        let closed_form = closed_form_candidates(set, self.config.singularity_tolerance);
        let centroid = set.centroid();
        let reference = set.reference().position;

        let ordered: Vec<Vector2<f64>> = match self.initial_guess {
            InitialGuess::ClosedForm => closed_form
                .into_iter()
                .chain([centroid, reference])
                .collect(),
            InitialGuess::Centroid => iter::once(centroid)
                .chain(closed_form)
                .chain(iter::once(reference))
                .collect(),
            InitialGuess::ReferenceStation => iter::once(reference)
                .chain(closed_form)
                .chain(iter::once(centroid))
                .collect(),
        };

        let mut starts: Vec<Vector2<f64>> = Vec::with_capacity(ordered.len());
        for point in ordered {
            let point = off_station(set, point);
            if starts.iter().all(|s| (s - point).norm() >= START_SEPARATION_M) {
                starts.push(point);
            }
        }
        starts
    }

    fn budget_exhausted(&self, iterations: usize) -> Divergence {
        Divergence {
            iterations,
            reason: format!("no convergence within {} iterations", self.config.max_iterations),
            trace: Vec::new(),
        }
    }

    /// One damped step. Returns the terminal state once the start is finished;
    /// terminal states leave the trace in `estimate`.
    fn step(&self, estimate: &mut PositionEstimate, set: &ObservationSet) -> Option<SolverState> {
        if estimate.iterations >= self.config.max_iterations {
            return Some(SolverState::Diverged(self.budget_exhausted(estimate.iterations)));
        }

        let equations = match linearize(set, &estimate.position) {
            Ok(equations) => equations,
            Err(error) => return Some(SolverState::Failed(error)),
        };

        let damping = estimate.damping;
        let Some(step) = equations.solve_damped(self.config.singularity_tolerance, damping) else {
            return Some(SolverState::Failed(LocationError::degenerate(
                GeometryIssue::SingularNormalMatrix,
                format!("normal matrix singular at iteration {}", estimate.iterations + 1),
            )));
        };

        estimate.iterations += 1;
        let candidate = estimate.position + step;
        let step_norm = step.norm();

        if !candidate.iter().all(|v| v.is_finite()) {
            return Some(SolverState::Diverged(Divergence {
                iterations: estimate.iterations,
                reason: "estimate became non-finite".to_string(),
                trace: Vec::new(),
            }));
        }

        if step_norm < self.config.convergence_threshold_m {
            estimate.position = candidate;
            self.record(estimate, step_norm, equations.residual_norm, damping, true);
            return Some(self.converged(estimate, set));
        }

        // Rejected steps leave the estimate in place and raise the damping
        let accepted = weighted_residual_norm(set, &candidate) < equations.residual_norm;
        if accepted {
            estimate.position = candidate;
        }
        self.record(estimate, step_norm, equations.residual_norm, damping, accepted);

        if !accepted {
            estimate.damping = (damping * 10.0).max(self.config.initial_damping);
            return None;
        }

        estimate.damping = if damping <= self.config.initial_damping {
            0.0
        } else {
            damping / 10.0
        };
        estimate.record_step(step_norm, equations.residual_norm);

        if estimate.residual_stagnated(self.config.residual_stagnation_ratio) {
            return Some(self.converged(estimate, set));
        }

        if estimate.growing_steps >= self.config.max_growing_steps {
            return Some(SolverState::Diverged(Divergence {
                iterations: estimate.iterations,
                reason: format!(
                    "correction grew for {} consecutive iterations (last {:.1} m)",
                    estimate.growing_steps, step_norm
                ),
                trace: Vec::new(),
            }));
        }

        None
    }

    fn converged(&self, estimate: &PositionEstimate, set: &ObservationSet) -> SolverState {
        SolverState::Converged(Convergence {
            position: estimate.position,
            iterations: estimate.iterations,
            residual_norm: weighted_residual_norm(set, &estimate.position),
            trace: Vec::new(),
        })
    }

    fn record(
        &self,
        estimate: &mut PositionEstimate,
        step_norm: f64,
        residual_norm: f64,
        damping: f64,
        accepted: bool,
    ) {
        if !self.trace {
            return;
        }
        let record = IterationRecord {
            start: estimate.start,
            iteration: estimate.iterations,
            x_m: estimate.position.x,
            y_m: estimate.position.y,
            step_m: step_norm,
            residual_norm,
            damping,
            accepted,
        };
        debug!(
            start = record.start,
            iteration = record.iteration,
            x_m = record.x_m,
            y_m = record.y_m,
            step_m = record.step_m,
            residual = record.residual_norm,
            damping = record.damping,
            accepted = record.accepted,
            "taylor-series iteration"
        );
        estimate.trace.push(record);
    }
}

/// Move a starting point that sits on a station by a fixed offset
fn off_station(set: &ObservationSet, point: Vector2<f64>) -> Vector2<f64> {
    let on_station = set
        .stations()
        .iter()
        .any(|station| (station.position - point).norm() < START_SEPARATION_M);

    if on_station {
        point + Vector2::new(START_OFFSET_M.0, START_OFFSET_M.1)
    } else {
        point
    }
}
