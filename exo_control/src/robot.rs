//! Robot orchestrator: actuators + controller + the periodic control
//! thread.
//!
//! The robot owns one controller and one actuator per joint. While
//! enabled, a dedicated thread runs the hot loop: fuse joint measures,
//! invoke the controller, publish joint/axis records for the dispatcher,
//! push joint setpoints to the actuators, sleep out the period. All
//! per-tick buffers are allocated at construction — the loop itself never
//! allocates.
//!
//! Shared state with the dispatcher thread (`measures`, `setpoints`,
//! `hasChanged` per DoF) sits behind one mutex per robot, held only
//! during the snapshot and publish steps of each tick, so an external
//! reader always observes whole records.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use exo_common::config::{self, RobotConfig};
use exo_common::consts::{
    CONTROL_JOIN_TIMEOUT_MS, DEFAULT_CONTROL_PERIOD_S, DEVICE_ERROR_STREAK_LIMIT,
};
use exo_common::log::SampleLog;
use exo_common::state::{ControlState, RobotState};
use exo_common::types::DofVariables;
use exo_common::Environment;
use exo_hal::DeviceManager;

use crate::actuator::Actuator;
use crate::controllers::{self, RobotController};
use crate::{rt, ControlError};

/// One joint or axis record shared with the dispatcher.
#[derive(Debug, Clone, Copy, Default)]
struct DofEntry {
    measures: DofVariables,
    setpoints: DofVariables,
    changed: bool,
}

#[derive(Default)]
struct DofBuffers {
    joints: Vec<DofEntry>,
    axes: Vec<DofEntry>,
}

/// State shared between the control thread and the dispatcher.
struct SharedState {
    running: AtomicBool,
    fault: AtomicBool,
    ticks: AtomicU64,
    dof: Mutex<DofBuffers>,
}

enum WorkerCommand {
    SetState(RobotState),
    Reset,
}

/// Everything the control thread owns while running.
struct ControlWorker {
    actuators: Vec<Actuator>,
    controller: Box<dyn RobotController>,
    period: Duration,
    shared: Arc<SharedState>,
    commands: Receiver<WorkerCommand>,
    log: Option<SampleLog>,

    // Tick buffers, preallocated.
    joint_measures: Vec<DofVariables>,
    axis_measures: Vec<DofVariables>,
    joint_setpoints: Vec<DofVariables>,
    axis_setpoints: Vec<DofVariables>,
    log_line: Vec<f64>,
    error_streak: u32,
}

/// A configured robot and its control-loop lifecycle.
pub struct Robot {
    name: String,
    joint_names: Vec<String>,
    axis_names: Vec<String>,
    period: Duration,
    state: RobotState,
    shared: Arc<SharedState>,
    commands: Sender<WorkerCommand>,
    worker: Option<ControlWorker>,
    thread: Option<JoinHandle<ControlWorker>>,
}

impl Robot {
    /// Build the robot named `name` from `config/robot/<name>.toml`.
    ///
    /// The controller decides the joint and axis counts; the actuator
    /// list must match the joint count exactly.
    pub fn from_name(
        env: &Environment,
        manager: &DeviceManager,
        name: &str,
    ) -> Result<Self, ControlError> {
        let cfg = config::load_robot(env, name)?;
        Self::from_config(env, manager, name, &cfg)
    }

    /// Build a robot from an already loaded configuration.
    pub fn from_config(
        env: &Environment,
        manager: &DeviceManager,
        name: &str,
        cfg: &RobotConfig,
    ) -> Result<Self, ControlError> {
        let controller = controllers::create_controller(&cfg.controller.kind, &cfg.controller.config)?;

        let joints_number = controller.joints_number();
        let axes_number = controller.axes_number();
        if controller.joint_names().len() != joints_number
            || controller.axis_names().len() != axes_number
        {
            return Err(ControlError::Contract(format!(
                "controller '{}' reports inconsistent name lists",
                cfg.controller.kind
            )));
        }
        if cfg.actuators.len() != joints_number {
            return Err(ControlError::Contract(format!(
                "robot '{name}' configures {} actuators, controller '{}' drives {} joints",
                cfg.actuators.len(),
                cfg.controller.kind,
                joints_number
            )));
        }

        let mut actuators = Vec::with_capacity(joints_number);
        for (index, reference) in cfg.actuators.iter().enumerate() {
            let fallback = format!("{name}_actuator{index}");
            actuators.push(Actuator::from_ref(env, manager, reference, &fallback)?);
        }

        let period = Duration::from_secs_f64(
            cfg.controller
                .time_step
                .filter(|step| *step > 0.0)
                .unwrap_or(DEFAULT_CONTROL_PERIOD_S),
        );

        let log = match &cfg.log {
            Some(log_config) if log_config.file => {
                match SampleLog::create(env, name, Some(log_config.precision)) {
                    Ok(log) => Some(log),
                    Err(log_error) => {
                        warn!(robot = name, %log_error, "sample log unavailable");
                        None
                    }
                }
            }
            _ => None,
        };

        let shared = Arc::new(SharedState {
            running: AtomicBool::new(false),
            fault: AtomicBool::new(false),
            ticks: AtomicU64::new(0),
            dof: Mutex::new(DofBuffers {
                joints: vec![DofEntry::default(); joints_number],
                axes: vec![DofEntry::default(); axes_number],
            }),
        });

        let (commands, command_rx) = mpsc::channel();
        let joint_names = controller.joint_names().to_vec();
        let axis_names = controller.axis_names().to_vec();

        let worker = ControlWorker {
            actuators,
            controller,
            period,
            shared: Arc::clone(&shared),
            commands: command_rx,
            log,
            joint_measures: vec![DofVariables::default(); joints_number],
            axis_measures: vec![DofVariables::default(); axes_number],
            joint_setpoints: vec![DofVariables::default(); joints_number],
            axis_setpoints: vec![DofVariables::default(); axes_number],
            log_line: vec![0.0; joints_number * 4],
            error_streak: 0,
        };

        info!(
            robot = name,
            joints = joints_number,
            axes = axes_number,
            period_ms = period.as_secs_f64() * 1e3,
            "robot created"
        );

        Ok(Self {
            name: name.to_string(),
            joint_names,
            axis_names,
            period,
            state: RobotState::Passive,
            shared,
            commands,
            worker: Some(worker),
            thread: None,
        })
    }

    /// Robot configuration name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Joint names, in joint order.
    pub fn joint_names(&self) -> &[String] {
        &self.joint_names
    }

    /// Axis names, in axis order.
    pub fn axis_names(&self) -> &[String] {
        &self.axis_names
    }

    /// Number of joints.
    pub fn joints_number(&self) -> usize {
        self.joint_names.len()
    }

    /// Number of axes.
    pub fn axes_number(&self) -> usize {
        self.axis_names.len()
    }

    /// Control loop period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Current robot lifecycle state.
    pub fn control_state(&self) -> RobotState {
        self.state
    }

    /// True while the control thread is running.
    pub fn is_enabled(&self) -> bool {
        self.thread.is_some()
    }

    /// Control ticks executed since construction.
    pub fn ticks(&self) -> u64 {
        self.shared.ticks.load(Ordering::Acquire)
    }

    /// Read and clear the fault condition.
    pub fn take_fault(&self) -> bool {
        self.shared.fault.swap(false, Ordering::SeqCst)
    }

    /// Bring the robot up: offset transition, motor enables (fail fast,
    /// rolling back the ones already enabled), then the control thread.
    pub fn enable(&mut self) -> Result<(), ControlError> {
        let mut worker = self
            .worker
            .take()
            .ok_or(ControlError::Refused("robot already enabled"))?;

        worker.apply_state(RobotState::Offset);
        self.state = RobotState::Offset;

        for index in 0..worker.actuators.len() {
            if !worker.actuators[index].enable() {
                let failed = worker.actuators[index].name().to_string();
                for prior in &mut worker.actuators[..index] {
                    prior.disable();
                }
                self.worker = Some(worker);
                return Err(ControlError::EnableFailed(failed));
            }
        }

        self.shared.running.store(true, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name(format!("control-{}", self.name))
            .spawn(move || worker.run());
        match spawned {
            Ok(handle) => {
                self.thread = Some(handle);
                info!(robot = %self.name, "control thread started");
                Ok(())
            }
            Err(spawn_error) => {
                // The worker is gone with the rejected closure; nothing
                // left to drive this robot.
                self.shared.running.store(false, Ordering::SeqCst);
                self.shared.fault.store(true, Ordering::SeqCst);
                error!(robot = %self.name, %spawn_error, "control thread spawn failed");
                Err(ControlError::Refused("control thread spawn failed"))
            }
        }
    }

    /// Take the robot down: stop the loop, join it within the bounded
    /// timeout, write one zero setpoint per motor and release them.
    ///
    /// A join timeout is fatal: the fault condition is raised and the
    /// robot cannot be re-enabled.
    pub fn disable(&mut self) -> Result<(), ControlError> {
        let thread = self
            .thread
            .take()
            .ok_or(ControlError::Refused("robot not enabled"))?;

        self.shared.running.store(false, Ordering::SeqCst);
        let deadline = Instant::now() + Duration::from_millis(CONTROL_JOIN_TIMEOUT_MS);
        while !thread.is_finished() {
            if Instant::now() >= deadline {
                self.shared.fault.store(true, Ordering::SeqCst);
                error!(robot = %self.name, "control thread did not stop in time");
                return Err(ControlError::JoinTimeout);
            }
            thread::sleep(Duration::from_millis(1));
        }

        let mut worker = thread.join().map_err(|_| {
            self.shared.fault.store(true, Ordering::SeqCst);
            error!(robot = %self.name, "control thread panicked");
            ControlError::JoinTimeout
        })?;

        for actuator in &mut worker.actuators {
            actuator.disable();
        }
        self.worker = Some(worker);
        info!(robot = %self.name, "control thread stopped");
        Ok(())
    }

    /// Robot lifecycle transition. No-ops and (while faulted without a
    /// worker) unreachable workers are refused.
    pub fn set_control_state(&mut self, new_state: RobotState) -> bool {
        if new_state == self.state {
            return false;
        }
        if let Some(worker) = &mut self.worker {
            worker.apply_state(new_state);
        } else if self.commands.send(WorkerCommand::SetState(new_state)).is_err() {
            return false;
        }
        self.state = new_state;
        true
    }

    /// Clear errors, estimator state and calibration accumulators.
    pub fn reset(&mut self) {
        self.shared.fault.store(false, Ordering::SeqCst);
        if let Some(worker) = &mut self.worker {
            worker.reset_all();
        } else {
            let _ = self.commands.send(WorkerCommand::Reset);
        }
    }

    /// Store the setpoints for one axis. Out-of-range indices are
    /// silently ignored.
    pub fn set_axis_setpoints(&self, index: usize, setpoints: &DofVariables) {
        let mut dof = self.shared.dof.lock();
        if let Some(entry) = dof.axes.get_mut(index) {
            entry.setpoints = *setpoints;
        }
    }

    /// Read one axis measure record, consuming its changed flag.
    pub fn axis_measures(&self, index: usize) -> Option<(DofVariables, bool)> {
        let mut dof = self.shared.dof.lock();
        dof.axes.get_mut(index).map(|entry| {
            let changed = entry.changed;
            entry.changed = false;
            (entry.measures, changed)
        })
    }

    /// Read one joint measure record, consuming its changed flag.
    pub fn joint_measures(&self, index: usize) -> Option<(DofVariables, bool)> {
        let mut dof = self.shared.dof.lock();
        dof.joints.get_mut(index).map(|entry| {
            let changed = entry.changed;
            entry.changed = false;
            (entry.measures, changed)
        })
    }
}

impl Drop for Robot {
    fn drop(&mut self) {
        if self.thread.is_some() {
            let _ = self.disable();
        }
    }
}

impl ControlWorker {
    /// Forward a lifecycle transition to the controller and every
    /// actuator.
    fn apply_state(&mut self, state: RobotState) {
        debug!(?state, "robot state change");
        self.controller.set_control_state(state);
        let actuator_state = ControlState::from(state);
        for actuator in &mut self.actuators {
            actuator.set_control_state(actuator_state);
        }
    }

    fn reset_all(&mut self) {
        for actuator in &mut self.actuators {
            actuator.reset();
        }
    }

    /// The hot loop. Returns the worker to the orchestrator on exit.
    fn run(mut self) -> Self {
        if let Err(rt_error) = rt::elevate_current_thread() {
            warn!(%rt_error, "control thread keeps normal scheduling");
        }

        // First tick sees the configured period as its delta.
        let mut last_tick = Instant::now()
            .checked_sub(self.period)
            .unwrap_or_else(Instant::now);

        while self.shared.running.load(Ordering::Acquire) {
            let tick_start = Instant::now();
            let dt = tick_start.duration_since(last_tick).as_secs_f64();
            last_tick = tick_start;

            while let Ok(command) = self.commands.try_recv() {
                match command {
                    WorkerCommand::SetState(state) => self.apply_state(state),
                    WorkerCommand::Reset => self.reset_all(),
                }
            }

            // Fuse sensors into joint measures.
            for index in 0..self.actuators.len() {
                self.actuators[index].get_measures(dt, &mut self.joint_measures[index]);
            }

            // Snapshot the client-facing axis setpoints.
            {
                let dof = self.shared.dof.lock();
                for (local, entry) in self.axis_setpoints.iter_mut().zip(dof.axes.iter()) {
                    *local = entry.setpoints;
                }
            }

            let (joints_changed, axes_changed) = self.controller.run_control_step(
                &mut self.joint_measures,
                &mut self.axis_measures,
                &mut self.joint_setpoints,
                &mut self.axis_setpoints,
                dt,
            );

            // Publish whole records for the dispatcher.
            {
                let mut dof = self.shared.dof.lock();
                for (index, entry) in dof.joints.iter_mut().enumerate() {
                    entry.measures = self.joint_measures[index];
                    entry.setpoints = self.joint_setpoints[index];
                    if joints_changed.get(index).copied().unwrap_or(false) {
                        entry.changed = true;
                    }
                }
                for (index, entry) in dof.axes.iter_mut().enumerate() {
                    entry.measures = self.axis_measures[index];
                    if axes_changed.get(index).copied().unwrap_or(false) {
                        entry.changed = true;
                    }
                }
            }

            // Recover faulted devices between ticks, then drive.
            let mut any_error = false;
            for index in 0..self.actuators.len() {
                if self.actuators[index].has_error() {
                    any_error = true;
                    self.actuators[index].reset();
                }
                self.actuators[index].set_setpoints(&self.joint_setpoints[index]);
            }
            if any_error {
                self.error_streak += 1;
                if self.error_streak >= DEVICE_ERROR_STREAK_LIMIT {
                    warn!("persistent device errors, raising fault");
                    self.shared.fault.store(true, Ordering::SeqCst);
                    self.error_streak = 0;
                }
            } else {
                self.error_streak = 0;
            }

            if let Some(log) = &mut self.log {
                for (index, measures) in self.joint_measures.iter().enumerate() {
                    let base = index * 4;
                    self.log_line[base] = measures.position;
                    self.log_line[base + 1] = measures.velocity;
                    self.log_line[base + 2] = measures.acceleration;
                    self.log_line[base + 3] = measures.force;
                }
                log.record(&self.log_line);
            }

            self.shared.ticks.fetch_add(1, Ordering::Release);

            let elapsed = tick_start.elapsed();
            if elapsed < self.period {
                thread::sleep(self.period - elapsed);
            }
        }

        self
    }
}
