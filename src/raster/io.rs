//! Debug export of the id raster and JSON reports.

use std::path::Path;

use image::{Rgba, RgbaImage};
use serde::Serialize;

use super::encoding::{is_path_id, is_visible_id, length_byte};
use super::idbuffer::IdBuffer;

/// Save the id raster as an RGBA PNG: red encodes the id's low bits, green
/// the length byte, and blue the channel (visible bright, hidden dim).
/// Background stays black.
pub fn save_id_raster(buffer: &IdBuffer, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create {}: {e}", parent.display()))?;
        }
    }
    let mut out = RgbaImage::new(buffer.width() as u32, buffer.height() as u32);
    for y in 0..buffer.height() {
        for x in 0..buffer.width() {
            let word = buffer.read(x as i64, y as i64);
            let px = if is_path_id(word) {
                Rgba([
                    ((word >> 16) & 0xFF) as u8,
                    length_byte(word),
                    if is_visible_id(word) { 255 } else { 96 },
                    255,
                ])
            } else {
                Rgba([0, 0, 0, 255])
            };
            out.put_pixel(x as u32, y as u32, px);
        }
    }
    out.save(path)
        .map_err(|e| format!("Failed to save {}: {e}", path.display()))
}

/// Serialize `value` as pretty-printed JSON at `path`.
pub fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| format!("Failed to serialize {}: {e}", path.display()))?;
    std::fs::write(path, json).map_err(|e| format!("Failed to write {}: {e}", path.display()))
}
