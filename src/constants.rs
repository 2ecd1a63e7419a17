pub const WINDOW_TITLE: &str = "Slime sim";

/// Top-left corner the window returns to when leaving fullscreen.
pub const WINDOWED_POSITION: (i32, i32) = (100, 100);

pub const PRESETS_DIR: &str = "presets";
pub const PRESET_EXTENSION: &str = "json";

/// Agents handled by one simulate work-group unless a preset overrides it.
pub const DEFAULT_DISPATCH_DIVISOR: u32 = 32;
/// Upper bound on invocations per work-group guaranteed by the default device limits.
pub const MAX_DISPATCH_DIVISOR: u32 = 256;

pub const FIELD_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;
/// Bytes per RGBA32F texel.
pub const FIELD_TEXEL_SIZE: u32 = 4 * 4;

/// Name of the module constant carrying the work-group size.
pub const WORKGROUP_SIZE_CONSTANT: &str = "WORKGROUP_SIZE";

pub const SIMULATE_ENTRY_POINT: &str = "update";
pub const VISUALIZE_VERTEX_ENTRY_POINT: &str = "vs_main";
pub const VISUALIZE_FRAGMENT_ENTRY_POINT: &str = "fs_main";

/// Two triangles covering the whole field.
pub const FULL_FIELD_VERTICES: u32 = 6;
