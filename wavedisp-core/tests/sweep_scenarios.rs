use wavedisp_core::sparse::{diagonal, TripletMatrix};
use wavedisp_core::{
    CancelToken, ConstraintMap, DispersionRecord, Error, FailurePolicy, MemoryRecorder, ModeShape,
    NullRecorder, Recorder, SolverKind, Sweep, SweepConfig, SweepStatus, SystemMatrices,
    WaveDirection, WaveRange,
};

const TOL: f64 = 1e-6;

/// K = M = S = I, R = [[0, 1], [-1, 0]]. Eigenvalues are 1 + κ² ± κ.
fn identity_cell() -> SystemMatrices {
    let eye = diagonal(&[1.0, 1.0]);
    let mut r = TripletMatrix::new(2, 2);
    r.add_pair(0, 1, 1.0, -1.0);
    SystemMatrices::new(eye.clone(), eye.clone(), eye, r.to_csr().unwrap()).unwrap()
}

/// Banded cell with SPD K + κ²S and a tridiagonal antisymmetric R.
fn banded_cell(n: usize) -> SystemMatrices {
    let mut k = TripletMatrix::new(n, n);
    let mut m = TripletMatrix::new(n, n);
    let mut s = TripletMatrix::new(n, n);
    let mut r = TripletMatrix::new(n, n);
    for i in 0..n {
        k.add(i, i, 2.5 + 0.1 * i as f64);
        m.add(i, i, 4.0);
        s.add(i, i, 1.0);
    }
    for i in 0..n - 1 {
        k.add_pair(i, i + 1, -1.0, 1.0);
        m.add_pair(i, i + 1, 1.0, 1.0);
        s.add_pair(i, i + 1, 0.25, 1.0);
        r.add_pair(i, i + 1, 0.5, -1.0);
    }
    SystemMatrices::new(
        k.to_csr().unwrap(),
        m.to_csr().unwrap(),
        s.to_csr().unwrap(),
        r.to_csr().unwrap(),
    )
    .unwrap()
}

fn config(start: f64, stop: f64, count: usize, n_eigs: usize) -> SweepConfig {
    SweepConfig::new(
        WaveRange::new(start, stop, count).unwrap(),
        WaveDirection::new(&[1.0, 0.0]).unwrap(),
        n_eigs,
    )
}

#[test]
fn identity_cell_matches_closed_form() {
    let system = identity_cell();
    for kind in [SolverKind::Dense, SolverKind::ShiftInvert] {
        let mut cfg = config(0.0, 1.0, 2, 2);
        cfg.solver.kind = kind;
        let sweep = Sweep::new(&system, None, cfg).unwrap();
        let mut recorder = MemoryRecorder::new();
        let result = sweep.run(&mut recorder, None).unwrap();

        assert_eq!(result.status, SweepStatus::Completed);
        assert_eq!(result.records.len(), 2);

        let at_zero = &result.records[0].eigenvalues;
        assert!((at_zero[0] - 1.0).abs() < TOL, "{kind:?}: {at_zero:?}");
        assert!((at_zero[1] - 1.0).abs() < TOL, "{kind:?}: {at_zero:?}");

        // A(1) = [[2, i], [-i, 2]]
        let at_one = &result.records[1].eigenvalues;
        assert!((at_one[0] - 1.0).abs() < TOL, "{kind:?}: {at_one:?}");
        assert!((at_one[1] - 3.0).abs() < TOL, "{kind:?}: {at_one:?}");
        assert!((result.records[1].frequencies[1] - 3f64.sqrt()).abs() < TOL);
    }
}

#[test]
fn eigenvalues_only_sweep_skips_reconstruction() {
    let system = banded_cell(8);
    let map = ConstraintMap::from_constraints(9, &[], &[(8, 0)]).unwrap();
    let mut cfg = config(10.0, 100.0, 10, 3);
    cfg.want_vectors = false;

    let sweep = Sweep::new(&system, Some(&map), cfg).unwrap();
    let mut recorder = MemoryRecorder::new();
    let result = sweep.run(&mut recorder, None).unwrap();

    assert_eq!(result.status, SweepStatus::Completed);
    assert_eq!(result.records.len(), 10);
    assert_eq!(result.expanded_steps, 0);
    assert!(recorder.modes.is_empty());
    for (i, record) in result.records.iter().enumerate() {
        assert_eq!(record.step, i);
        assert_eq!(record.eigenvalues.len(), 3);
        assert_eq!(record.frequencies.len(), 3);
    }
    for pair in result.records.windows(2) {
        assert!(pair[1].wave_magnitude > pair[0].wave_magnitude);
    }
    assert_eq!(result.records[0].wave_magnitude, 10.0);
    assert_eq!(result.records[9].wave_magnitude, 100.0);
}

#[test]
fn eigenvalues_are_sorted_and_non_negative() {
    let system = banded_cell(10);
    let mut cfg = config(0.0, 3.0, 7, 4);
    cfg.want_vectors = false;
    let sweep = Sweep::new(&system, None, cfg).unwrap();
    let result = sweep.run(&mut MemoryRecorder::new(), None).unwrap();

    for record in &result.records {
        assert!(record.nan_modes.is_empty());
        for pair in record.eigenvalues.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        assert!(record.eigenvalues[0] >= 0.0);
        assert!(record.hermitian_deviation <= 1e-12);
    }
}

#[test]
fn asymmetric_stiffness_is_reported_but_sweep_completes() {
    let mut k = TripletMatrix::new(2, 2);
    k.add(0, 0, 2.0);
    k.add(1, 1, 2.0);
    k.add(0, 1, -1.0);
    k.add(1, 0, -0.5);
    let eye = diagonal(&[1.0, 1.0]);
    let mut r = TripletMatrix::new(2, 2);
    r.add_pair(0, 1, 1.0, -1.0);
    let system =
        SystemMatrices::new(k.to_csr().unwrap(), eye.clone(), eye, r.to_csr().unwrap()).unwrap();

    let mut cfg = config(0.0, 1.0, 3, 2);
    cfg.symmetry_threshold = 1e-6;
    let sweep = Sweep::new(&system, None, cfg).unwrap();
    assert!(sweep.blocks().k.deviation >= 0.5);

    let mut recorder = MemoryRecorder::new();
    let result = sweep.run(&mut recorder, None).unwrap();
    assert_eq!(result.blocks.violations(1e-6), vec!["K - K^T"]);
    assert_eq!(result.status, SweepStatus::Completed);
    assert_eq!(result.records.len(), 3);
    assert!(result.records.iter().all(|r| r.hermitian_deviation > 0.0));
    let header = recorder.header.unwrap();
    assert_eq!(header.blocks, result.blocks);
}

#[test]
fn too_many_eigenvalues_fail_before_solving() {
    let system = identity_cell();
    let err = Sweep::new(&system, None, config(0.0, 1.0, 2, 3));
    assert!(matches!(err, Err(Error::InvalidConfig(_))));
}

/// Shift 3 hits an eigenvalue at κ = 1 and κ = 2.
fn singular_shift_config(policy: FailurePolicy) -> SweepConfig {
    let mut cfg = config(0.0, 2.0, 5, 2);
    cfg.solver.kind = SolverKind::ShiftInvert;
    cfg.solver.shift = 3.0;
    cfg.policy = policy;
    cfg
}

#[test]
fn abort_policy_keeps_completed_records() {
    let system = identity_cell();
    let sweep = Sweep::new(&system, None, singular_shift_config(FailurePolicy::Abort)).unwrap();
    let mut recorder = MemoryRecorder::new();
    let result = sweep.run(&mut recorder, None).unwrap();

    assert_eq!(result.records.len(), 2);
    match &result.status {
        SweepStatus::Aborted {
            step,
            wave_magnitude,
            error,
        } => {
            assert_eq!(*step, 2);
            assert_eq!(*wave_magnitude, 1.0);
            assert!(error.contains("singular"));
        }
        other => panic!("expected abort, got {other:?}"),
    }
    assert_eq!(recorder.status.as_ref(), Some(&result.status));
    assert_eq!(recorder.records.len(), 2);
}

#[test]
fn skip_policy_continues_after_failure() {
    let system = identity_cell();
    let sweep = Sweep::new(&system, None, singular_shift_config(FailurePolicy::Skip)).unwrap();
    let result = sweep.run(&mut MemoryRecorder::new(), None).unwrap();

    assert_eq!(result.status, SweepStatus::Completed);
    let steps: Vec<usize> = result.records.iter().map(|r| r.step).collect();
    assert_eq!(steps, vec![0, 1, 3]);
    let skipped: Vec<usize> = result.skipped.iter().map(|s| s.step).collect();
    assert_eq!(skipped, vec![2, 4]);

    // κ = 1.5: 1 + κ² ± κ
    let eigs = &result.records[2].eigenvalues;
    assert!((eigs[0] - 1.75).abs() < TOL);
    assert!((eigs[1] - 4.75).abs() < TOL);
}

#[test]
fn parallel_abort_counts_only_emitted_steps() {
    let system = identity_cell();
    let map = ConstraintMap::from_constraints(3, &[], &[(2, 0)]).unwrap();
    let mut cfg = singular_shift_config(FailurePolicy::Abort);
    cfg.parallel = true;
    let sweep = Sweep::new(&system, Some(&map), cfg).unwrap();
    let result = sweep.run(&mut NullRecorder, None).unwrap();

    assert!(matches!(result.status, SweepStatus::Aborted { step: 2, .. }));
    let steps: Vec<usize> = result.records.iter().map(|r| r.step).collect();
    assert_eq!(steps, vec![0, 1]);
    // step 3 solves fine but comes after the abort
    assert_eq!(result.expanded_steps, result.records.len());
}

#[test]
fn parallel_and_sequential_logs_are_identical() {
    let system = banded_cell(12);
    let map = ConstraintMap::from_constraints(13, &[], &[(12, 0)]).unwrap();

    let run = |parallel: bool| {
        let mut cfg = config(0.0, 5.0, 8, 4);
        cfg.parallel = parallel;
        let sweep = Sweep::new(&system, Some(&map), cfg).unwrap();
        let mut recorder = MemoryRecorder::new();
        let result = sweep.run(&mut recorder, None).unwrap();
        assert_eq!(result.status, SweepStatus::Completed);
        assert_eq!(result.expanded_steps, 8);
        recorder
    };

    let sequential = run(false);
    let parallel = run(true);
    assert_eq!(sequential.records, parallel.records);
    assert_eq!(sequential.modes, parallel.modes);
}

#[test]
fn mode_shapes_are_expanded_to_full_space() {
    let system = banded_cell(6);
    let map = ConstraintMap::from_constraints(8, &[7], &[(6, 0)]).unwrap();
    let sweep = Sweep::new(&system, Some(&map), config(0.5, 1.0, 2, 2)).unwrap();
    let mut recorder = MemoryRecorder::new();
    let result = sweep.run(&mut recorder, None).unwrap();

    assert_eq!(result.expanded_steps, 2);
    assert_eq!(recorder.modes.len(), 4);
    for shape in &recorder.modes {
        assert_eq!(shape.values.len(), 8);
        assert_eq!(shape.values[6], shape.values[0]);
        assert_eq!(shape.values[7].norm(), 0.0);
    }
    let first = recorder.mode(1, 1).unwrap();
    assert_eq!(first.eigenvalue, result.records[1].eigenvalues[1]);
}

/// Cancels the sweep once `after` steps were recorded.
struct CancellingRecorder {
    inner: MemoryRecorder,
    token: CancelToken,
    after: usize,
}

impl Recorder for CancellingRecorder {
    fn record_step(&mut self, record: &DispersionRecord) -> wavedisp_core::Result<()> {
        self.inner.record_step(record)?;
        if self.inner.records.len() == self.after {
            self.token.cancel();
        }
        Ok(())
    }

    fn record_modes(&mut self, step: usize, modes: &[ModeShape]) -> wavedisp_core::Result<()> {
        self.inner.record_modes(step, modes)
    }

    fn finish(&mut self, status: &SweepStatus) -> wavedisp_core::Result<()> {
        self.inner.finish(status)
    }
}

#[test]
fn cancellation_returns_completed_records() {
    let system = banded_cell(5);
    let sweep = Sweep::new(&system, None, config(0.0, 1.0, 6, 2)).unwrap();
    let token = CancelToken::new();
    let mut recorder = CancellingRecorder {
        inner: MemoryRecorder::new(),
        token: token.clone(),
        after: 2,
    };

    let result = sweep.run(&mut recorder, Some(&token)).unwrap();
    assert_eq!(result.status, SweepStatus::Cancelled { completed: 2 });
    assert_eq!(result.records.len(), 2);
    assert_eq!(recorder.inner.status, Some(result.status.clone()));
}

#[test]
fn reference_waves_are_logged_per_step() {
    use wavedisp_core::{Material, Phase, ReferenceWaves};

    let system = identity_cell();
    let waves = ReferenceWaves::from_phases(&[Phase::new(Material::aluminium(), 1.0)]).unwrap();
    let mut cfg = config(0.0, 2.0, 3, 1);
    cfg.reference_waves = Some(waves);
    cfg.want_vectors = false;
    let result = Sweep::new(&system, None, cfg)
        .unwrap()
        .run(&mut MemoryRecorder::new(), None)
        .unwrap();

    let [wp, ws] = result.records[2].reference_frequencies.unwrap();
    assert!((wp - 2.0 * waves.p_wave_speed).abs() < 1e-9 * wp);
    assert!((ws - 2.0 * waves.shear_wave_speed).abs() < 1e-9 * ws);
}
