//! The run loop: drives the timestepper, the collision pipeline, output
//! sinks, diagnostics and statistics until the configured end of the
//! phase.

use std::sync::Arc;
use std::time::Instant;

use crate::diagnostics::run_diagnostics;
use crate::error::{Error, Result};
use crate::logger::{create_logger, log_step, Logger};
use crate::output::{create_output, Output};
use crate::quantity::QuantityId;
use crate::scheduler::Scheduler;
use crate::settings::{RunSettings, RunSettingsId};
use crate::solver::{create_solver, Solver};
use crate::stats::{Statistics, StatisticsId};
use crate::storage::Storage;
use crate::timestepping::{create_timestepping, TimeStepping};

/// Feedback interface of a running phase. All callbacks run on the thread
/// driving the run loop.
pub trait RunCallbacks: Send {
    fn on_start(&mut self, _name: &str) {}

    fn on_time_step(&mut self, _storage: &Storage, _stats: &mut Statistics) {}

    fn on_end(&mut self, _storage: &Storage, _stats: &Statistics) {}

    /// Polled between steps and at particle-batch boundaries; returning
    /// true stops the run at the next check.
    fn should_abort_run(&self) -> bool {
        false
    }
}

/// Callbacks ignoring everything.
pub struct NullCallbacks;

impl RunCallbacks for NullCallbacks {}

/// Bookkeeping carried over when a phase resumes from a saved state. The
/// semantics are explicit: a state file without a time stamp cannot be
/// resumed.
#[derive(Clone, Copy, Debug)]
pub struct ResumeInfo {
    pub start_time: f64,
    pub timestep: f64,
    pub output_index: usize,
}

/// One simulation phase: owns the settings, assembles the components and
/// loops until the end time, the step limit or the wallclock limit.
pub struct Run {
    settings: RunSettings,
    solver: Option<Box<dyn Solver>>,
    resume: Option<ResumeInfo>,
    scheduler: Arc<Scheduler>,
}

impl Run {
    pub fn new(settings: RunSettings) -> Result<Self> {
        let scheduler = Arc::new(Scheduler::from_settings(&settings)?);
        Ok(Self {
            settings,
            solver: None,
            resume: None,
            scheduler,
        })
    }

    /// Replaces the solver created from the settings; used by phases that
    /// wrap the solver (e.g. stabilization).
    pub fn with_solver(mut self, solver: Box<dyn Solver>) -> Self {
        self.solver = Some(solver);
        self
    }

    /// Marks the run as resumed from a saved state.
    pub fn with_resume(mut self, resume: ResumeInfo) -> Self {
        self.resume = Some(resume);
        self
    }

    pub fn scheduler(&self) -> Arc<Scheduler> {
        Arc::clone(&self.scheduler)
    }

    fn check_setup(&self, output: &Option<Box<dyn Output>>) -> Result<()> {
        let max_dt = self.settings.get::<f64>(RunSettingsId::TimesteppingMaxTimestep)?;
        let interval = self.settings.get::<f64>(RunSettingsId::RunOutputInterval)?;
        if output.is_some() && interval > 0. && max_dt > interval {
            return Err(Error::InvalidSetup(format!(
                "maximal timestep {} is larger than the output interval {}",
                max_dt, interval
            )));
        }
        Ok(())
    }

    /// Runs the phase to completion. The storage is modified in place;
    /// statistics of the last step are returned.
    pub fn run(
        &mut self,
        storage: &mut Storage,
        callbacks: &mut dyn RunCallbacks,
    ) -> Result<Statistics> {
        let settings = self.settings.clone();
        let logger: Box<dyn Logger> = create_logger(&settings)?;
        let mut output = create_output(&settings)?;
        self.check_setup(&output)?;

        let mut solver = match self.solver.take() {
            Some(solver) => solver,
            None => create_solver(&settings, Arc::clone(&self.scheduler))?,
        };
        let mut stepper: Box<dyn TimeStepping> = create_timestepping(&settings)?;

        let time_range = settings.get::<crate::math::Interval>(RunSettingsId::RunTimeRange)?;
        let mut time = time_range.lower();
        if let Some(resume) = self.resume {
            time = resume.start_time;
            stepper.set_dt(resume.timestep);
        }

        let step_limit = settings.get::<i64>(RunSettingsId::RunTimestepCnt)?;
        let wallclock_limit = settings.get::<f64>(RunSettingsId::RunWallclockTime)?;
        let output_interval = settings.get::<f64>(RunSettingsId::RunOutputInterval)?;
        let diagnostics_interval = settings.get::<i64>(RunSettingsId::RunDiagnosticsInterval)?;

        solver.create(storage)?;

        let run_name = settings.get::<String>(RunSettingsId::RunName)?;
        logger.write_line(&format!(
            "Running '{}' with {} particles",
            run_name,
            storage.particle_cnt()
        ));
        callbacks.on_start(&run_name);

        let started = Instant::now();
        let mut stats = Statistics::new();
        let mut iteration: i64 = 0;
        let mut next_output = if output_interval > 0. {
            time
        } else {
            f64::INFINITY
        };

        let result = loop {
            if time >= time_range.upper() {
                break Ok(());
            }
            if step_limit > 0 && iteration >= step_limit {
                break Ok(());
            }
            if wallclock_limit > 0. && started.elapsed().as_secs_f64() >= wallclock_limit {
                logger.write_line("wallclock limit reached, stopping");
                break Ok(());
            }
            if callbacks.should_abort_run() || self.scheduler.should_abort() {
                break Err(Error::RunAborted);
            }

            stats.set_float(StatisticsId::RunTime, time);
            stats.set_float(
                StatisticsId::Progress,
                ((time - time_range.lower()) / time_range.size()).clamp(0., 1.),
            );
            stats.set_int(StatisticsId::ParticleCount, storage.particle_cnt() as i64);
            stats.set_int(StatisticsId::IterationCount, iteration);

            // snapshots are written for the state the step starts from
            if time >= next_output {
                if let Some(sink) = &mut output {
                    match sink.dump(storage, &stats) {
                        Ok(path) => logger.write_line(&format!("Output written to {}", path)),
                        Err(e) => logger.warning(&format!("cannot write output: {}", e)),
                    }
                }
                next_output += output_interval;
            }

            let step_start = Instant::now();
            let dt = stepper.current_dt();
            if let Err(e) = stepper.step(storage, solver.as_mut(), &mut stats) {
                break Err(e);
            }
            if let Err(e) = solver.collide(storage, &mut stats, dt) {
                break Err(e);
            }
            advance_attractors(storage, dt);

            time += dt;
            iteration += 1;
            stats.set_float(StatisticsId::RunTime, time);
            stats.set_int(
                StatisticsId::StepElapsed,
                step_start.elapsed().as_millis() as i64,
            );

            if diagnostics_interval > 0 && iteration % diagnostics_interval == 0 {
                run_diagnostics(storage, logger.as_ref());
            }

            log_step(logger.as_ref(), &stats);
            callbacks.on_time_step(storage, &mut stats);
        };

        // the final snapshot is written even when the run was aborted
        if let Some(sink) = &mut output {
            if let Err(e) = sink.dump(storage, &stats) {
                logger.warning(&format!("cannot write the final output: {}", e));
            }
        }

        match result {
            Ok(()) => {
                logger.write_line(&format!("Run '{}' finished at t = {:.6e}", run_name, time));
                callbacks.on_end(storage, &stats);
                self.solver = Some(solver);
                Ok(stats)
            }
            Err(e) => {
                stats.set(
                    StatisticsId::RunError,
                    crate::stats::StatValue::Text(e.to_string()),
                );
                callbacks.on_end(storage, &stats);
                Err(e)
            }
        }
    }
}

fn advance_attractors(storage: &mut Storage, dt: f64) {
    for attractor in storage.attractors_mut() {
        attractor.position += attractor.velocity * dt;
    }
}

/// Hands an SPH storage over to an N-body phase: the smoothing length is
/// reinterpreted as the physical radius of a sphere conserving the
/// particle mass, and the SPH-only quantities are dropped.
pub fn handoff_sph_to_nbody(storage: &mut Storage) -> Result<()> {
    let n = storage.particle_cnt();
    if n == 0 {
        return Ok(());
    }
    let m = storage.value::<f64>(QuantityId::Mass)?.to_vec();
    let rho = if storage.has(QuantityId::Density) {
        storage.value::<f64>(QuantityId::Density)?.to_vec()
    } else {
        vec![0.; n]
    };
    {
        let h = storage.value_mut::<f64>(QuantityId::SmoothingLength)?;
        for i in 0..n {
            if rho[i] > 0. {
                // mass-conserving equivalent radius
                h[i] = (3. * m[i] / (4. * std::f64::consts::PI * rho[i])).cbrt();
            }
        }
    }
    for id in [
        QuantityId::Pressure,
        QuantityId::SoundSpeed,
        QuantityId::DeviatoricStress,
        QuantityId::Damage,
        QuantityId::YieldReduction,
        QuantityId::VelocityDivergence,
        QuantityId::VelocityRotation,
        QuantityId::AvAlpha,
        QuantityId::NeighbourCnt,
        QuantityId::Density,
        QuantityId::Energy,
    ] {
        storage.remove_quantity(id);
    }
    Ok(())
}
