//! Records shared byte-for-byte with the kernels.
//!
//! Field order and widths here must match the struct declarations in
//! `src/shaders/*.wgsl`. The layout is pinned with compile-time assertions
//! below, so an accidental reorder or an extra field fails the build instead
//! of silently corrupting every device-side read.

use std::mem::{align_of, offset_of, size_of};

use bytemuck::{Pod, Zeroable};

use crate::config::Settings;

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct SimulationParameters {
    pub move_speed: f32,
    pub turn_speed: f32,
    pub sensor_angle: f32,
    pub sensor_distance: f32,

    pub width: i32,
    pub height: i32,

    /// Normalized 0..=1 channels.
    pub trail_color: [f32; 3],

    pub decay_rate: f32,
    pub diffuse_rate: f32,
}

impl SimulationParameters {
    /// Builds the record in declaration order. Colour channels are scaled
    /// from 0..=255 to 0..=1; everything else passes through unchanged.
    pub fn from_settings(settings: &Settings) -> Self {
        let [r, g, b] = settings.trail_color;
        SimulationParameters {
            move_speed: settings.move_speed,
            turn_speed: settings.turn_speed,
            sensor_angle: settings.sensor_angle,
            sensor_distance: settings.sensor_distance,

            // `Settings::validate` keeps both dimensions within i32.
            width: settings.map_width as i32,
            height: settings.map_height as i32,

            trail_color: [r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0],

            decay_rate: settings.decay_rate,
            diffuse_rate: settings.diffuse_rate,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

/// One simulated entity. Owned by the simulate kernel once uploaded.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Agent {
    pub x: f32,
    pub y: f32,
    /// Heading in radians.
    pub angle: f32,
}

impl Agent {
    pub fn new(x: f32, y: f32, angle: f32) -> Self {
        Agent { x, y, angle }
    }
}

/// Per-frame kernel inputs.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct FrameData {
    /// Seconds since startup.
    pub time: f32,
    pub frame: u32,
}

pub const PARAMETERS_SIZE: usize = 44;
pub const AGENT_SIZE: usize = 12;
pub const FRAME_DATA_SIZE: usize = 8;

const _: () = {
    assert!(size_of::<SimulationParameters>() == PARAMETERS_SIZE);
    assert!(align_of::<SimulationParameters>() == 4);
    assert!(offset_of!(SimulationParameters, move_speed) == 0);
    assert!(offset_of!(SimulationParameters, turn_speed) == 4);
    assert!(offset_of!(SimulationParameters, sensor_angle) == 8);
    assert!(offset_of!(SimulationParameters, sensor_distance) == 12);
    assert!(offset_of!(SimulationParameters, width) == 16);
    assert!(offset_of!(SimulationParameters, height) == 20);
    assert!(offset_of!(SimulationParameters, trail_color) == 24);
    assert!(offset_of!(SimulationParameters, decay_rate) == 36);
    assert!(offset_of!(SimulationParameters, diffuse_rate) == 40);

    assert!(size_of::<Agent>() == AGENT_SIZE);
    assert!(align_of::<Agent>() == 4);
    assert!(offset_of!(Agent, x) == 0);
    assert!(offset_of!(Agent, y) == 4);
    assert!(offset_of!(Agent, angle) == 8);

    assert!(size_of::<FrameData>() == FRAME_DATA_SIZE);
};

/// Exact byte size of the device agent buffer for `count` agents.
pub fn agent_buffer_size(count: u32) -> u64 {
    count as u64 * AGENT_SIZE as u64
}
