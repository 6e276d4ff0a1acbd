// Debug geometry for contacts found by world queries

use glam::Vec3;

/// Line-list vertex a renderer can upload as-is
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DebugVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

const CONTACT_COLOR: [f32; 4] = [1.0, 0.2, 0.2, 0.9];
const NORMAL_COLOR: [f32; 4] = [1.0, 1.0, 0.0, 0.9];
const CROSS_SIZE: f32 = 0.05;
const MIN_NORMAL_LENGTH: f32 = 0.1;

/// Contact points accumulated during a step, cleared when the next one begins
#[derive(Debug, Default)]
pub struct DebugContacts {
    vertices: Vec<DebugVertex>,
    contacts: usize,
    enabled: bool,
}

impl DebugContacts {
    pub fn new(enabled: bool) -> Self {
        Self {
            vertices: Vec::new(),
            contacts: 0,
            enabled,
        }
    }

    /// Enable or disable recording
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.clear();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
        self.contacts = 0;
    }

    /// Record a contact as a cross at the point plus a line along the push normal
    pub fn add_contact(&mut self, point: Vec3, normal: Vec3, depth: f32) {
        if !self.enabled {
            return;
        }
        self.contacts += 1;
        self.draw_cross(point, CROSS_SIZE, CONTACT_COLOR);
        let tip = point + normal * depth.max(MIN_NORMAL_LENGTH);
        self.draw_line(point, tip, NORMAL_COLOR);
    }

    pub fn contact_count(&self) -> usize {
        self.contacts
    }

    pub fn vertices(&self) -> &[DebugVertex] {
        &self.vertices
    }

    /// Raw vertex bytes for a GPU buffer
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    fn draw_line(&mut self, a: Vec3, b: Vec3, color: [f32; 4]) {
        self.vertices.push(DebugVertex {
            position: a.to_array(),
            color,
        });
        self.vertices.push(DebugVertex {
            position: b.to_array(),
            color,
        });
    }

    /// Draw a cross (three axis-aligned segments)
    fn draw_cross(&mut self, center: Vec3, size: f32, color: [f32; 4]) {
        for axis in [Vec3::X, Vec3::Y, Vec3::Z] {
            self.draw_line(center - axis * size, center + axis * size, color);
        }
    }
}
