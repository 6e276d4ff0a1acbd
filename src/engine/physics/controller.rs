// Single-axis actuators driving a joint's child body towards a destination value

use glam::{Quat, Vec3};
use std::collections::VecDeque;

use super::body::BodyHandle;
use super::handle::Handle;
use super::joint::JointHandle;
use super::PhysicsError;

/// Handle to a controller owned by the physics world
pub type ControllerHandle = Handle<PhysicsController>;

/// Number of error samples kept for the integral term
pub const DEFAULT_PID_HISTORY: usize = 20;

/// Distance to the destination under which `EndCondition::OnDestination` triggers
pub const DESTINATION_EPSILON: f32 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerType {
    /// Gains are P, I and D
    #[default]
    Pid,
    /// `a * error - b * value`
    Proportional,
}

/// Measurement a controller reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerInput {
    /// Joint angle in radians (the axis is ignored)
    #[default]
    JointAngle,
    /// Slider or screw travel from the creation pose (the axis is ignored)
    JointDistance,
    LinearSpeed,
    AngularSpeed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerOutput {
    #[default]
    Force,
    Torque,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Axis {
    #[default]
    X,
    Y,
    Z,
}

impl Axis {
    pub fn unit(self) -> Vec3 {
        match self {
            Axis::X => Vec3::X,
            Axis::Y => Vec3::Y,
            Axis::Z => Vec3::Z,
        }
    }

    pub fn component(self, v: Vec3) -> f32 {
        match self {
            Axis::X => v.x,
            Axis::Y => v.y,
            Axis::Z => v.z,
        }
    }
}

/// When a controller switches itself off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndCondition {
    #[default]
    Null,
    OnDestination,
    /// The owning joint reached its lower limit
    OnMin,
    /// The owning joint reached its upper limit
    OnMax,
}

/// Frame speed inputs are read in.
///
/// `World` reads velocities as the backend reports them and is the legacy
/// behaviour; `BodyLocal` rotates them into the target body's frame first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerInputSpace {
    #[default]
    World,
    BodyLocal,
}

/// Controller settings
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerDesc {
    pub name: String,
    pub controller_type: ControllerType,
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub destination: f32,
    pub input: ControllerInput,
    pub input_axis: Axis,
    pub output: ControllerOutput,
    /// Axis in the body's local frame
    pub output_axis: Axis,
    /// Output magnitude cap, 0 for none
    pub max_output: f32,
    pub mul_mass_with_output: bool,
    pub end_condition: EndCondition,
    /// Controller on the same joint to activate when this one ends
    pub next_controller: Option<String>,
    pub active: bool,
    /// Overrides the world's input space
    pub input_space: Option<ControllerInputSpace>,
    pub history_size: usize,
}

impl Default for ControllerDesc {
    fn default() -> Self {
        Self {
            name: String::new(),
            controller_type: ControllerType::Pid,
            a: 1.0,
            b: 0.0,
            c: 0.0,
            destination: 0.0,
            input: ControllerInput::JointAngle,
            input_axis: Axis::X,
            output: ControllerOutput::Torque,
            output_axis: Axis::Y,
            max_output: 0.0,
            mul_mass_with_output: false,
            end_condition: EndCondition::Null,
            next_controller: None,
            active: true,
            input_space: None,
            history_size: DEFAULT_PID_HISTORY,
        }
    }
}

impl ControllerDesc {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn pid(mut self, p: f32, i: f32, d: f32) -> Self {
        self.controller_type = ControllerType::Pid;
        self.a = p;
        self.b = i;
        self.c = d;
        self
    }

    pub fn proportional(mut self, a: f32, b: f32) -> Self {
        self.controller_type = ControllerType::Proportional;
        self.a = a;
        self.b = b;
        self.c = 0.0;
        self
    }

    pub fn destination(mut self, destination: f32) -> Self {
        self.destination = destination;
        self
    }

    pub fn input(mut self, input: ControllerInput, axis: Axis) -> Self {
        self.input = input;
        self.input_axis = axis;
        self
    }

    pub fn output(mut self, output: ControllerOutput, axis: Axis) -> Self {
        self.output = output;
        self.output_axis = axis;
        self
    }

    pub fn max_output(mut self, max_output: f32) -> Self {
        self.max_output = max_output;
        self
    }

    pub fn mul_mass_with_output(mut self, mul: bool) -> Self {
        self.mul_mass_with_output = mul;
        self
    }

    pub fn end_condition(mut self, end: EndCondition) -> Self {
        self.end_condition = end;
        self
    }

    pub fn next_controller(mut self, name: &str) -> Self {
        self.next_controller = Some(name.to_string());
        self
    }

    pub fn active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn input_space(mut self, space: ControllerInputSpace) -> Self {
        self.input_space = Some(space);
        self
    }

    pub fn validate(&self) -> Result<(), PhysicsError> {
        if self.name.is_empty() {
            return Err(PhysicsError::InvalidConfig(
                "controller name must not be empty".to_string(),
            ));
        }
        if self.max_output < 0.0 {
            return Err(PhysicsError::InvalidConfig(format!(
                "controller '{}' has a negative output cap",
                self.name
            )));
        }
        if self.controller_type == ControllerType::Pid && self.history_size == 0 {
            return Err(PhysicsError::InvalidConfig(format!(
                "controller '{}' needs a non-empty integral window",
                self.name
            )));
        }
        Ok(())
    }
}

/// PID loop with a sliding integral window
#[derive(Debug, Clone)]
pub struct PidController {
    pub p: f32,
    pub i: f32,
    pub d: f32,
    /// (error, dt) samples, newest last
    history: VecDeque<(f32, f32)>,
    history_size: usize,
}

impl PidController {
    pub fn new(p: f32, i: f32, d: f32, history_size: usize) -> Self {
        Self {
            p,
            i,
            d,
            history: VecDeque::with_capacity(history_size),
            history_size: history_size.max(1),
        }
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    pub fn output(&mut self, error: f32, dt: f32) -> f32 {
        let derivative = match self.history.back() {
            Some(&(last, _)) if dt > 0.0 => (error - last) / dt,
            _ => 0.0,
        };

        if self.history.len() == self.history_size {
            self.history.pop_front();
        }
        self.history.push_back((error, dt));
        let integral: f32 = self.history.iter().map(|(e, t)| e * t).sum();

        self.p * error + self.i * integral + self.d * derivative
    }
}

/// Measurements gathered by the world before a controller runs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerSample {
    pub joint_angle: f32,
    pub joint_distance: f32,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub body_rotation: Quat,
    pub body_mass: f32,
}

impl Default for ControllerSample {
    fn default() -> Self {
        Self {
            joint_angle: 0.0,
            joint_distance: 0.0,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            body_rotation: Quat::IDENTITY,
            body_mass: 0.0,
        }
    }
}

/// What one controller update produced
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControllerStep {
    /// World-space force or torque to apply this step
    pub output: Option<(ControllerOutput, Vec3)>,
    /// The destination end condition fired; the controller is now inactive
    pub finished: bool,
}

pub struct PhysicsController {
    name: String,
    joint: JointHandle,
    body: BodyHandle,
    controller_type: ControllerType,
    pid: PidController,
    a: f32,
    b: f32,
    destination: f32,
    input: ControllerInput,
    input_axis: Axis,
    input_space: ControllerInputSpace,
    output: ControllerOutput,
    output_axis: Axis,
    max_output: f32,
    mul_mass_with_output: bool,
    end_condition: EndCondition,
    next_controller: Option<String>,
    active: bool,
    paused: bool,
    last_value: f32,
}

impl PhysicsController {
    pub(crate) fn new(
        desc: &ControllerDesc,
        joint: JointHandle,
        body: BodyHandle,
        world_space: ControllerInputSpace,
    ) -> Self {
        Self {
            name: desc.name.clone(),
            joint,
            body,
            controller_type: desc.controller_type,
            pid: PidController::new(desc.a, desc.b, desc.c, desc.history_size),
            a: desc.a,
            b: desc.b,
            destination: desc.destination,
            input: desc.input,
            input_axis: desc.input_axis,
            input_space: desc.input_space.unwrap_or(world_space),
            output: desc.output,
            output_axis: desc.output_axis,
            max_output: desc.max_output,
            mul_mass_with_output: desc.mul_mass_with_output,
            end_condition: desc.end_condition,
            next_controller: desc.next_controller.clone(),
            active: desc.active,
            paused: false,
            last_value: 0.0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn joint(&self) -> JointHandle {
        self.joint
    }

    pub fn body(&self) -> BodyHandle {
        self.body
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Activating resets the integral window
    pub fn set_active(&mut self, active: bool) {
        if active && !self.active {
            self.pid.reset();
        }
        self.active = active;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn destination(&self) -> f32 {
        self.destination
    }

    pub fn set_destination(&mut self, destination: f32) {
        self.destination = destination;
    }

    pub fn end_condition(&self) -> EndCondition {
        self.end_condition
    }

    pub fn next_controller(&self) -> Option<&str> {
        self.next_controller.as_deref()
    }

    pub fn input_space(&self) -> ControllerInputSpace {
        self.input_space
    }

    pub fn set_input_space(&mut self, space: ControllerInputSpace) {
        self.input_space = space;
    }

    pub fn set_gains(&mut self, a: f32, b: f32, c: f32) {
        self.a = a;
        self.b = b;
        self.pid.p = a;
        self.pid.i = b;
        self.pid.d = c;
    }

    /// Value measured on the last update
    pub fn last_value(&self) -> f32 {
        self.last_value
    }

    fn measure(&self, sample: &ControllerSample) -> f32 {
        let local = |v: Vec3| match self.input_space {
            ControllerInputSpace::World => v,
            ControllerInputSpace::BodyLocal => sample.body_rotation.inverse() * v,
        };
        match self.input {
            ControllerInput::JointAngle => sample.joint_angle,
            ControllerInput::JointDistance => sample.joint_distance,
            ControllerInput::LinearSpeed => {
                self.input_axis.component(local(sample.linear_velocity))
            }
            ControllerInput::AngularSpeed => {
                self.input_axis.component(local(sample.angular_velocity))
            }
        }
    }

    /// Run one control step. Inactive or paused controllers produce nothing.
    pub fn update(&mut self, sample: &ControllerSample, dt: f32) -> ControllerStep {
        if !self.active || self.paused {
            return ControllerStep::default();
        }

        let value = self.measure(sample);
        self.last_value = value;
        let error = self.destination - value;

        let mut output = match self.controller_type {
            ControllerType::Pid => self.pid.output(error, dt),
            ControllerType::Proportional => self.a * error - self.b * value,
        };
        if self.max_output > 0.0 {
            output = output.clamp(-self.max_output, self.max_output);
        }

        let mut vector = self.output_axis.unit() * output;
        if self.mul_mass_with_output {
            vector *= sample.body_mass;
        }
        let vector = sample.body_rotation * vector;

        let finished = self.end_condition == EndCondition::OnDestination
            && (value - self.destination).abs() < DESTINATION_EPSILON;
        if finished {
            self.active = false;
        }

        ControllerStep {
            output: Some((self.output, vector)),
            finished,
        }
    }
}

impl std::fmt::Debug for PhysicsController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsController")
            .field("name", &self.name)
            .field("type", &self.controller_type)
            .field("input", &self.input)
            .field("output", &self.output)
            .field("destination", &self.destination)
            .field("active", &self.active)
            .finish()
    }
}
