//! Cursor compositing.
//!
//! Overlays the server's current cursor image onto a captured frame. The
//! cursor image is queried fresh from XFixes for every composite so shape
//! changes are always reflected.

use x11rb::connection::Connection;
use x11rb::protocol::xfixes::ConnectionExt as _;

use crate::capture::frame::Frame;
use crate::error::CaptureError;

/// A cursor image as reported by the display server.
///
/// `pixels` holds one packed 32-bit value per pixel with alpha in the high
/// byte; stored little-endian the low three bytes line up with the frame's
/// B, G, R channel order.
#[derive(Debug, Clone)]
pub struct CursorImage {
    pub x: i16,
    pub y: i16,
    pub xhot: u16,
    pub yhot: u16,
    pub width: u16,
    pub height: u16,
    pub pixels: Vec<u32>,
}

/// Fetch the current cursor image and composite it onto `frame`.
///
/// The connection must have negotiated an XFixes version beforehand.
pub fn blend_cursor<C: Connection>(conn: &C, frame: &mut Frame) -> Result<(), CaptureError> {
    let reply = conn.xfixes_get_cursor_image()?.reply()?;
    let cursor = CursorImage {
        x: reply.x,
        y: reply.y,
        xhot: reply.xhot,
        yhot: reply.yhot,
        width: reply.width,
        height: reply.height,
        pixels: reply.cursor_image,
    };
    overlay_cursor(frame, &cursor);
    Ok(())
}

/// Composite `cursor` onto `frame` in place.
///
/// The reported position is adjusted by the hotspot and pinned to the frame
/// origin; rows and columns that would fall outside the frame are dropped.
/// Fully opaque cursor pixels replace the frame pixel outright. For partial
/// alpha the cursor channels are applied at full weight and alpha only
/// attenuates the underlying pixel, with 8-bit wrapping on overflow; the
/// frame's fourth byte is left untouched on that path.
pub fn overlay_cursor(frame: &mut Frame, cursor: &CursorImage) {
    let x = (i32::from(cursor.x) - i32::from(cursor.xhot)).max(0);
    let y = (i32::from(cursor.y) - i32::from(cursor.yhot)).max(0);

    let rows = i32::from(cursor.height).min((frame.height as i32 - y).max(0));
    let cols = i32::from(cursor.width).min((frame.width as i32 - x).max(0));

    for row in 0..rows {
        for col in 0..cols {
            let src = cursor.pixels[(row * i32::from(cursor.width) + col) as usize];
            let src_bytes = src.to_le_bytes();
            let alpha = src_bytes[3];

            let offset = (((y + row) * frame.width as i32 + x + col) * 4) as usize;
            let dst = &mut frame.data[offset..offset + 4];

            if alpha == 255 {
                dst.copy_from_slice(&src_bytes);
            } else {
                for ch in 0..3 {
                    let kept = (u16::from(dst[ch]) * u16::from(255 - alpha) + 127) / 255;
                    dst[ch] = (u16::from(src_bytes[ch]) + kept) as u8;
                }
            }
        }
    }
}
