// SPDX-License-Identifier: GPL-3.0-only
//! Pixel format conversion to RGBA
//!
//! The pipeline itself never converts frames; these helpers exist for
//! consumers that need a uniform layout, like PNG snapshots.

use super::{CapturedFrame, PixelFormat};

/// Convert any supported frame to packed RGBA
///
/// Returns `None` if the buffer does not match the declared geometry.
pub fn to_rgba(frame: &CapturedFrame) -> Option<Vec<u8>> {
    if !frame.is_well_formed() {
        return None;
    }
    let (data, width, height) = (frame.data.as_slice(), frame.width, frame.height);
    let rgba = match frame.format {
        PixelFormat::RGBA => data.to_vec(),
        PixelFormat::BGRA => bgra_to_rgba(data),
        PixelFormat::RGB24 => rgb_to_rgba(data),
        PixelFormat::Gray8 => gray_to_rgba(data),
        PixelFormat::NV12 => nv12_to_rgba(data, width, height),
        PixelFormat::I420 => i420_to_rgba(data, width, height),
    };
    Some(rgba)
}

/// Swap the red and blue channels
pub fn bgra_to_rgba(bgra: &[u8]) -> Vec<u8> {
    let mut rgba = bgra.to_vec();
    for px in rgba.chunks_exact_mut(4) {
        px.swap(0, 2);
    }
    rgba
}

/// Convert RGB to RGBA by adding alpha=255
pub fn rgb_to_rgba(rgb: &[u8]) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(rgb.len() / 3 * 4);
    for chunk in rgb.chunks_exact(3) {
        rgba.extend_from_slice(chunk);
        rgba.push(255);
    }
    rgba
}

/// Expand 8-bit grayscale to opaque RGBA
pub fn gray_to_rgba(gray: &[u8]) -> Vec<u8> {
    gray.iter().flat_map(|&l| [l, l, l, 255]).collect()
}

/// Convert NV12 (Y plane, interleaved UV at quarter resolution) to RGBA
fn nv12_to_rgba(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    let chroma_width = w.div_ceil(2);
    let (y_plane, uv_plane) = data.split_at(w * h);

    yuv420_to_rgba(y_plane, w, h, |cx, cy| {
        let i = (cy * chroma_width + cx) * 2;
        (uv_plane[i], uv_plane[i + 1])
    })
}

/// Convert I420 (Y, U, V planes, chroma at quarter resolution) to RGBA
fn i420_to_rgba(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    let chroma_width = w.div_ceil(2);
    let chroma_len = chroma_width * h.div_ceil(2);
    let (y_plane, chroma) = data.split_at(w * h);
    let (u_plane, v_plane) = chroma.split_at(chroma_len);

    yuv420_to_rgba(y_plane, w, h, |cx, cy| {
        let i = cy * chroma_width + cx;
        (u_plane[i], v_plane[i])
    })
}

fn yuv420_to_rgba<F>(y_plane: &[u8], width: usize, height: usize, chroma_at: F) -> Vec<u8>
where
    F: Fn(usize, usize) -> (u8, u8),
{
    let mut rgba = Vec::with_capacity(width * height * 4);
    for row in 0..height {
        for col in 0..width {
            let y = y_plane[row * width + col] as f32;
            let (u, v) = chroma_at(col / 2, row / 2);
            let u = u as f32 - 128.0;
            let v = v as f32 - 128.0;

            // BT.601
            rgba.push((y + 1.402 * v).round().clamp(0.0, 255.0) as u8);
            rgba.push((y - 0.344 * u - 0.714 * v).round().clamp(0.0, 255.0) as u8);
            rgba.push((y + 1.772 * u).round().clamp(0.0, 255.0) as u8);
            rgba.push(255);
        }
    }
    rgba
}
