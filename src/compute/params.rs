//! Parameter binding - marshals [`SimulationParameters`] into a compute program.
//!
//! Each kernel parameter has a fixed bind name. The mapping from
//! [`ParamName`] to bind name and to the field it is read from is a static
//! table, so every binding call writes the complete set for the next dispatch.

use std::fmt;

use super::ComputeProgram;
use crate::schema::SimulationParameters;

/// A value written to the program's parameter table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Float(f32),
    Int(i32),
    Vector([f32; 4]),
}

/// Every parameter a kernel may read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamName {
    FeedRate,
    RemoveRate,
    DiffuseRateA,
    DiffuseRateB,
    DiffuseRadius,
    ColorA,
    ColorB,
    Width,
    Height,
    DisplayMode,
}

impl ParamName {
    /// Parameters read by the Step kernel.
    pub const TUNABLE: [ParamName; 7] = [
        ParamName::FeedRate,
        ParamName::RemoveRate,
        ParamName::DiffuseRateA,
        ParamName::DiffuseRateB,
        ParamName::DiffuseRadius,
        ParamName::ColorA,
        ParamName::ColorB,
    ];

    /// Domain size, bound at Init and on geometry change.
    pub const DOMAIN: [ParamName; 2] = [ParamName::Width, ParamName::Height];

    /// Parameters read by the Display kernel.
    pub const DISPLAY: [ParamName; 3] = [
        ParamName::ColorA,
        ParamName::ColorB,
        ParamName::DisplayMode,
    ];

    /// Name the program knows the parameter by.
    pub fn bind_name(self) -> &'static str {
        match self {
            ParamName::FeedRate => "feedRate",
            ParamName::RemoveRate => "removeRate",
            ParamName::DiffuseRateA => "diffuseRateA",
            ParamName::DiffuseRateB => "diffuseRateB",
            ParamName::DiffuseRadius => "diffuseRadius",
            ParamName::ColorA => "colorA",
            ParamName::ColorB => "colorB",
            ParamName::Width => "width",
            ParamName::Height => "height",
            ParamName::DisplayMode => "displayMode",
        }
    }

    /// Read this parameter's value out of `params`.
    pub fn read(self, params: &SimulationParameters) -> ParamValue {
        match self {
            ParamName::FeedRate => ParamValue::Float(params.feed_rate),
            ParamName::RemoveRate => ParamValue::Float(params.remove_rate),
            ParamName::DiffuseRateA => ParamValue::Float(params.diffuse_rate_a),
            ParamName::DiffuseRateB => ParamValue::Float(params.diffuse_rate_b),
            ParamName::DiffuseRadius => ParamValue::Int(params.diffuse_radius),
            ParamName::ColorA => ParamValue::Vector(params.color_a.to_array()),
            ParamName::ColorB => ParamValue::Vector(params.color_b.to_array()),
            ParamName::Width => ParamValue::Int(params.width as i32),
            ParamName::Height => ParamValue::Int(params.height as i32),
            ParamName::DisplayMode => ParamValue::Int(params.display_mode.index() as i32),
        }
    }
}

impl fmt::Display for ParamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.bind_name())
    }
}

/// Parameter block as the kernels see it.
///
/// Layout matches the `Params` uniform struct in the shader.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct KernelUniforms {
    pub color_a: [f32; 4],
    pub color_b: [f32; 4],
    pub feed_rate: f32,
    pub remove_rate: f32,
    pub diffuse_rate_a: f32,
    pub diffuse_rate_b: f32,
    pub diffuse_radius: i32,
    pub width: u32,
    pub height: u32,
    pub display_mode: u32,
}

impl KernelUniforms {
    /// Store `value` under `name`. Returns false if the value has the wrong shape.
    pub fn set(&mut self, name: ParamName, value: ParamValue) -> bool {
        match (name, value) {
            (ParamName::FeedRate, ParamValue::Float(v)) => self.feed_rate = v,
            (ParamName::RemoveRate, ParamValue::Float(v)) => self.remove_rate = v,
            (ParamName::DiffuseRateA, ParamValue::Float(v)) => self.diffuse_rate_a = v,
            (ParamName::DiffuseRateB, ParamValue::Float(v)) => self.diffuse_rate_b = v,
            (ParamName::DiffuseRadius, ParamValue::Int(v)) => self.diffuse_radius = v,
            (ParamName::ColorA, ParamValue::Vector(v)) => self.color_a = v,
            (ParamName::ColorB, ParamValue::Vector(v)) => self.color_b = v,
            (ParamName::Width, ParamValue::Int(v)) => self.width = v.max(0) as u32,
            (ParamName::Height, ParamValue::Int(v)) => self.height = v.max(0) as u32,
            (ParamName::DisplayMode, ParamValue::Int(v)) => self.display_mode = v.max(0) as u32,
            _ => return false,
        }
        true
    }
}

fn bind_all<P: ComputeProgram>(program: &mut P, names: &[ParamName], params: &SimulationParameters) {
    for &name in names {
        program.set_param(name, name.read(params));
    }
}

/// Write every tunable parameter.
pub fn bind_parameters<P: ComputeProgram>(program: &mut P, params: &SimulationParameters) {
    bind_all(program, &ParamName::TUNABLE, params);
}

/// Write the domain width and height.
pub fn bind_domain<P: ComputeProgram>(program: &mut P, params: &SimulationParameters) {
    bind_all(program, &ParamName::DOMAIN, params);
}

/// Write the display mode and palette; done right before a Display dispatch.
pub fn bind_display<P: ComputeProgram>(program: &mut P, params: &SimulationParameters) {
    bind_all(program, &ParamName::DISPLAY, params);
}
