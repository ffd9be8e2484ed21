//! Render pairing payloads as PNG data URIs for the browser page.

use std::io::Cursor;

use {
    base64::{Engine, engine::general_purpose::STANDARD},
    image::{ImageBuffer, ImageFormat, Luma},
    qrcode::{Color, EcLevel, QrCode},
};

use crate::error::{Error, Result};

const MODULE_SIZE: u32 = 8;
const QUIET_ZONE: u32 = 4;

/// Encode `payload` as a QR code and return `data:image/png;base64,...`.
pub fn render_data_uri(payload: &str) -> Result<String> {
    let png = render_png(payload)?;
    Ok(format!("data:image/png;base64,{}", STANDARD.encode(png)))
}

/// Encode `payload` as a QR code PNG.
pub fn render_png(payload: &str) -> Result<Vec<u8>> {
    let code = QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::L)
        .map_err(|e| Error::Qr(e.to_string()))?;

    let modules = code.width() as u32;
    let size = (modules + QUIET_ZONE * 2) * MODULE_SIZE;

    let img = ImageBuffer::from_fn(size, size, |x, y| {
        let (cx, cy) = (x / MODULE_SIZE, y / MODULE_SIZE);
        if cx < QUIET_ZONE || cy < QUIET_ZONE {
            return Luma([255u8]);
        }
        let (mx, my) = (cx - QUIET_ZONE, cy - QUIET_ZONE);
        if mx >= modules || my >= modules {
            return Luma([255u8]);
        }
        match code[(mx as usize, my as usize)] {
            Color::Dark => Luma([0u8]),
            Color::Light => Luma([255u8]),
        }
    });

    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| Error::Qr(format!("PNG encoding failed: {e}")))?;
    Ok(buf.into_inner())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn renders_png() {
        let png = render_png("2@abc,def,ghi,jkl").unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn data_uri_prefix() {
        let uri = render_data_uri("2@abc").unwrap();
        let encoded = uri.strip_prefix("data:image/png;base64,").unwrap();
        let decoded = STANDARD.decode(encoded).unwrap();
        assert_eq!(&decoded[1..4], b"PNG");
    }

    #[test]
    fn oversized_payload_fails() {
        let payload = "x".repeat(8000);
        assert!(matches!(render_data_uri(&payload), Err(Error::Qr(_))));
    }
}
