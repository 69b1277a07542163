//! QR rendering to PNG data URIs.

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine};
use image::{DynamicImage, ImageFormat, Luma};
use qrcode::QrCode;

use crate::error::ChallengeError;

/// Encode `content` as a QR code and return a `data:image/png;base64,...` URI.
pub fn qr_data_uri(content: &str, module_px: u32) -> Result<String, ChallengeError> {
    let code = QrCode::new(content.as_bytes()).map_err(|e| ChallengeError::QrEncoding(e.to_string()))?;
    let image = code
        .render::<Luma<u8>>()
        .module_dimensions(module_px.max(1), module_px.max(1))
        .build();

    let mut png = Vec::new();
    DynamicImage::ImageLuma8(image)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| ChallengeError::QrEncoding(e.to_string()))?;

    Ok(format!("data:image/png;base64,{}", STANDARD.encode(png)))
}
