//! System dispatcher: the single-threaded event loop bridging clients to
//! the robot.
//!
//! Each `update` drains the event channel (lifecycle and configuration),
//! applies inbound axis setpoints, and — at most once per
//! [`TELEMETRY_MIN_INTERVAL_MS`] — broadcasts axis and joint measures.
//! The dispatcher never blocks and never touches the control thread's
//! data except through the robot's guarded accessors.

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use exo_common::config;
use exo_common::consts::{AXES_PORT, EVENTS_PORT, JOINTS_PORT, MAX_MESSAGE_LENGTH,
    TELEMETRY_MIN_INTERVAL_MS};
use exo_common::state::RobotState;
use exo_common::types::DofVariables;
use exo_common::Environment;
use exo_control::{ControlError, Robot};
use exo_hal::DeviceManager;

use crate::ipc::{ClientId, DatagramEndpoint, EventsEndpoint};
use crate::messages::{self, Frame, RequestCode, REPLY_REFUSED};

/// Startup failures of the network surface.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Socket binding failed.
    #[error("network setup: {0}")]
    Io(#[from] std::io::Error),

    /// The initial robot configuration could not be brought up.
    #[error("initial configuration: {0}")]
    Control(#[from] ControlError),
}

/// Bind parameters for the three endpoints.
#[derive(Debug, Clone)]
pub struct NetworkOptions {
    pub host: String,
    pub events_port: u16,
    pub axes_port: u16,
    pub joints_port: u16,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            events_port: EVENTS_PORT,
            axes_port: AXES_PORT,
            joints_port: JOINTS_PORT,
        }
    }
}

impl NetworkOptions {
    /// Loopback with ephemeral ports, for tests.
    pub fn loopback() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            events_port: 0,
            axes_port: 0,
            joints_port: 0,
        }
    }
}

/// The dispatcher: endpoints, the configured robot, telemetry cadence.
pub struct System {
    env: Environment,
    manager: DeviceManager,
    events: EventsEndpoint,
    axes: DatagramEndpoint,
    joints: DatagramEndpoint,
    robot: Option<Robot>,
    config_name: Option<String>,
    last_telemetry: Instant,
}

impl System {
    /// Bind the three endpoints; no robot is configured yet.
    pub fn new(
        env: Environment,
        manager: DeviceManager,
        net: &NetworkOptions,
    ) -> Result<Self, ServerError> {
        let events = EventsEndpoint::bind(&net.host, net.events_port)?;
        let axes = DatagramEndpoint::bind(&net.host, net.axes_port)?;
        let joints = DatagramEndpoint::bind(&net.host, net.joints_port)?;
        info!(
            events = %events.local_addr()?,
            axes = %axes.local_addr()?,
            joints = %joints.local_addr()?,
            "network surface up"
        );
        Ok(Self {
            env,
            manager,
            events,
            axes,
            joints,
            robot: None,
            config_name: None,
            last_telemetry: Instant::now()
                .checked_sub(Duration::from_millis(TELEMETRY_MIN_INTERVAL_MS))
                .unwrap_or_else(Instant::now),
        })
    }

    /// Load the configuration requested on the command line. Failure
    /// here is a startup failure.
    pub fn set_initial_config(&mut self, name: &str) -> Result<(), ServerError> {
        let robot = Robot::from_name(&self.env, &self.manager, name)?;
        self.robot = Some(robot);
        self.config_name = Some(name.to_string());
        Ok(())
    }

    /// Bound event endpoint address.
    pub fn events_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.events.local_addr()
    }

    /// Bound axes endpoint address.
    pub fn axes_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.axes.local_addr()
    }

    /// Bound joints endpoint address.
    pub fn joints_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.joints.local_addr()
    }

    /// Name of the currently loaded configuration.
    pub fn config_name(&self) -> Option<&str> {
        self.config_name.as_deref()
    }

    /// One dispatcher pass: events, axis setpoints, fault surface,
    /// telemetry.
    pub fn update(&mut self) {
        self.update_events();
        self.update_axis_setpoints();
        self.update_joint_subscribers();
        self.surface_faults();
        self.update_telemetry();
    }

    /// Disable the robot and say goodbye on the streaming channels.
    pub fn shutdown(&mut self) {
        if let Some(robot) = &mut self.robot {
            if robot.is_enabled() {
                if let Err(error) = robot.disable() {
                    warn!(%error, "robot did not shut down cleanly");
                }
            }
        }
        self.axes.close();
        self.joints.close();
        info!("network surface closed");
    }

    // ─── Event channel ──────────────────────────────────────────────

    fn update_events(&mut self) {
        self.events.accept_pending();
        let mut request = [0u8; MAX_MESSAGE_LENGTH];
        for id in self.events.client_ids() {
            while let Some(read) = self.events.receive_from(id, &mut request) {
                self.handle_request(id, &request[..read]);
            }
        }
    }

    fn handle_request(&mut self, client: ClientId, request: &[u8]) {
        let mut reply = Frame::new();
        let code = request.first().copied().unwrap_or(0);
        let payload = request.get(1..).unwrap_or(&[]);

        match RequestCode::from_u8(code) {
            Some(RequestCode::ListConfigs) => {
                let names = config::list_robots(&self.env);
                let body = serde_json::json!({ "robots": names }).to_string();
                let _ = reply.push(code);
                let _ = reply.extend_from_slice(body.as_bytes());
            }
            Some(RequestCode::GetConfig) => {
                let _ = reply.push(code);
                self.describe_config(&mut reply);
            }
            Some(RequestCode::SetConfig) => {
                let name = text_payload(payload);
                self.set_config(&name);
                let _ = reply.push(code);
                self.describe_config(&mut reply);
            }
            Some(RequestCode::SetUser) => {
                let user = text_payload(payload);
                info!(user = %user, "log user set");
                self.env.set_user(user);
                let _ = reply.push(code);
            }
            Some(RequestCode::Enable) => {
                let accepted = match &mut self.robot {
                    Some(robot) => match robot.enable() {
                        Ok(()) => true,
                        Err(error) => {
                            debug!(%error, "enable refused");
                            false
                        }
                    },
                    None => false,
                };
                let _ = reply.push(if accepted { code } else { REPLY_REFUSED });
            }
            Some(RequestCode::Disable) => {
                let accepted = match &mut self.robot {
                    Some(robot) => match robot.disable() {
                        Ok(()) => true,
                        Err(error) => {
                            debug!(%error, "disable refused");
                            false
                        }
                    },
                    None => false,
                };
                let _ = reply.push(if accepted { code } else { REPLY_REFUSED });
            }
            Some(RequestCode::Reset) => {
                let accepted = match &mut self.robot {
                    Some(robot) => {
                        robot.reset();
                        true
                    }
                    None => false,
                };
                let _ = reply.push(if accepted { code } else { REPLY_REFUSED });
            }
            Some(command) => {
                let state = match command {
                    RequestCode::Passivate => RobotState::Passive,
                    RequestCode::Offset => RobotState::Offset,
                    RequestCode::Calibrate => RobotState::Calibration,
                    RequestCode::Operate => RobotState::Operation,
                    RequestCode::Preprocess => RobotState::Preprocessing,
                    _ => unreachable!("lifecycle commands handled above"),
                };
                let accepted = self
                    .robot
                    .as_mut()
                    .map(|robot| robot.set_control_state(state))
                    .unwrap_or(false);
                let _ = reply.push(if accepted { code } else { REPLY_REFUSED });
            }
            None => {
                debug!(code, "unknown event request");
                let _ = reply.push(REPLY_REFUSED);
            }
        }

        self.events.send_to(client, &reply);
    }

    /// Append the `{id, axes, joints}` description of the current
    /// configuration.
    fn describe_config(&self, reply: &mut Frame) {
        let body = match &self.robot {
            Some(robot) => serde_json::json!({
                "id": self.config_name.as_deref().unwrap_or(""),
                "axes": robot.axis_names(),
                "joints": robot.joint_names(),
            }),
            None => serde_json::json!({ "id": "", "axes": [], "joints": [] }),
        };
        let _ = reply.extend_from_slice(body.to_string().as_bytes());
    }

    /// Replace the robot configuration, rolling back to the previous one
    /// when the new one cannot be built.
    fn set_config(&mut self, name: &str) {
        let previous = self.config_name.take();
        if let Some(mut robot) = self.robot.take() {
            if robot.is_enabled() {
                let _ = robot.disable();
            }
            // Old devices release their channels before the rebuild.
        }

        if name.is_empty() {
            info!("robot configuration cleared");
            return;
        }

        match Robot::from_name(&self.env, &self.manager, name) {
            Ok(robot) => {
                info!(robot = name, "configuration loaded");
                self.robot = Some(robot);
                self.config_name = Some(name.to_string());
            }
            Err(error) => {
                warn!(robot = name, %error, "configuration failed");
                if let Some(previous_name) = previous {
                    match Robot::from_name(&self.env, &self.manager, &previous_name) {
                        Ok(robot) => {
                            info!(robot = %previous_name, "previous configuration restored");
                            self.robot = Some(robot);
                            self.config_name = Some(previous_name);
                        }
                        Err(rollback_error) => {
                            warn!(robot = %previous_name, %rollback_error,
                                "rollback failed, robot left unconfigured");
                        }
                    }
                }
            }
        }
    }

    // ─── Streaming channels ─────────────────────────────────────────

    fn update_axis_setpoints(&mut self) {
        let mut datagram = [0u8; MAX_MESSAGE_LENGTH];
        while let Some(received) = self.axes.receive(&mut datagram) {
            let Some(robot) = &self.robot else { continue };
            let axes_number = robot.axes_number();
            for (index, setpoints) in messages::RecordIter::new(&datagram[..received]) {
                if (index as usize) < axes_number {
                    robot.set_axis_setpoints(index as usize, &setpoints);
                }
            }
        }
    }

    /// The joints channel is outbound-only, but inbound datagrams still
    /// register their source for the broadcast set.
    fn update_joint_subscribers(&mut self) {
        let mut datagram = [0u8; MAX_MESSAGE_LENGTH];
        while self.joints.receive(&mut datagram).is_some() {}
    }

    fn surface_faults(&mut self) {
        let faulted = self
            .robot
            .as_ref()
            .map(|robot| robot.take_fault())
            .unwrap_or(false);
        if faulted {
            warn!("hardware fault surfaced to clients");
            self.events.broadcast(&[RequestCode::Reset as u8]);
        }
    }

    fn update_telemetry(&mut self) {
        if self.last_telemetry.elapsed() < Duration::from_millis(TELEMETRY_MIN_INTERVAL_MS) {
            return;
        }
        let Some(robot) = &self.robot else { return };

        let mut sent = false;
        let mut frame = Frame::new();

        // Axes: only the records that changed since the last consume.
        messages::begin_frame(&mut frame);
        for index in 0..robot.axes_number() {
            if let Some((measures, changed)) = robot.axis_measures(index) {
                if changed && !messages::push_record(&mut frame, index as u8, &measures) {
                    break;
                }
            }
        }
        if messages::record_count(&frame) > 0 {
            self.axes.broadcast(&frame);
            sent = true;
        }

        // Joints: every record, zeroed when unchanged.
        messages::begin_frame(&mut frame);
        for index in 0..robot.joints_number() {
            if let Some((measures, changed)) = robot.joint_measures(index) {
                let record = if changed {
                    measures
                } else {
                    DofVariables::default()
                };
                if !messages::push_record(&mut frame, index as u8, &record) {
                    break;
                }
            }
        }
        if messages::record_count(&frame) > 0 {
            self.joints.broadcast(&frame);
            sent = true;
        }

        if sent {
            self.last_telemetry = Instant::now();
        }
    }
}

/// Decode a request payload as a trimmed name string.
fn text_payload(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload)
        .trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_payload_strips_nul_and_whitespace() {
        assert_eq!(text_payload(b"dual_motors\0\0"), "dual_motors");
        assert_eq!(text_payload(b"  anna \n"), "anna");
        assert_eq!(text_payload(b""), "");
    }

    #[test]
    fn loopback_options_use_ephemeral_ports() {
        let net = NetworkOptions::loopback();
        let system = System::new(
            Environment::default(),
            DeviceManager::default(),
            &net,
        )
        .unwrap();
        assert_ne!(system.events_addr().unwrap().port(), 0);
        assert_ne!(system.axes_addr().unwrap().port(), 0);
        assert_ne!(system.joints_addr().unwrap().port(), 0);
        assert!(system.config_name().is_none());
    }

    #[test]
    fn default_options_use_the_published_ports() {
        let net = NetworkOptions::default();
        assert_eq!(net.events_port, 50000);
        assert_eq!(net.axes_port, 50001);
        assert_eq!(net.joints_port, 50002);
    }
}
