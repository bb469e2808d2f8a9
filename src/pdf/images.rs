//! Image XObjects: raw pixel buffers, PNG and JPEG passthrough.

use super::content::{clip_to, concat, matrix_operands, name, op};
use super::paint::image_placement;
use super::resources::ResourceKind;
use super::writer::{DocumentWriter, compressed_stream};
use crate::errors::{PrinterError, Result};
use crate::types::{Image, ImageKind, Rectangle, Transform};
use image::ImageDecoder;
use image::codecs::jpeg::JpegDecoder;
use lopdf::content::Operation;
use lopdf::{ObjectId, Stream, dictionary};
use std::io::Cursor;

/// Kind, size, alpha handling, byte length and hash of the pixel data.
pub(crate) type ImageKey = (ImageKind, u32, u32, bool, usize, u64);

/// Decoded samples ready to be written as an image XObject.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Samples {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
    /// 8-bit soft mask.
    pub alpha: Option<Vec<u8>>,
    /// 1-bit stencil, rows padded to whole bytes, 1 marks a masked pixel.
    pub mask: Option<Vec<u8>>,
}

pub(crate) fn decode_samples(image: &Image<'_>, exclude_alpha: bool) -> Result<Samples> {
    match image.kind {
        ImageKind::Png => decode_png(image.data, exclude_alpha),
        ImageKind::RawXrgb | ImageKind::RawMrgb | ImageKind::RawArgb => {
            decode_raw(image, exclude_alpha)
        }
        other => Err(PrinterError::UnsupportedImage(other)),
    }
}

fn decode_png(data: &[u8], exclude_alpha: bool) -> Result<Samples> {
    let decoded = image::load_from_memory_with_format(data, image::ImageFormat::Png)
        .map_err(|e| PrinterError::InvalidImage(e.to_string()))?
        .to_rgba8();
    let (width, height) = decoded.dimensions();
    let pixels = width as usize * height as usize;
    let mut rgb = Vec::with_capacity(pixels * 3);
    let mut alpha = Vec::with_capacity(pixels);
    for pixel in decoded.pixels() {
        rgb.extend_from_slice(&pixel.0[..3]);
        alpha.push(pixel.0[3]);
    }
    let opaque = alpha.iter().all(|a| *a == 0xff);
    Ok(Samples {
        width,
        height,
        rgb,
        alpha: (!exclude_alpha && !opaque).then_some(alpha),
        mask: None,
    })
}

fn decode_raw(image: &Image<'_>, exclude_alpha: bool) -> Result<Samples> {
    let (width, height) = (image.width as usize, image.height as usize);
    if width == 0 || height == 0 {
        return Err(PrinterError::InvalidImage(format!(
            "empty {} x {} image",
            width, height
        )));
    }
    let stride = image.data.len() / height;
    if stride < width * 4 {
        return Err(PrinterError::InvalidImage(format!(
            "{} bytes cannot hold {} x {} pixels",
            image.data.len(),
            width,
            height
        )));
    }

    let mut rgb = Vec::with_capacity(width * height * 3);
    let mut alpha = Vec::with_capacity(width * height);
    for row in image.data.chunks_exact(stride).take(height) {
        for px in row[..width * 4].chunks_exact(4) {
            let argb = u32::from_ne_bytes([px[0], px[1], px[2], px[3]]);
            rgb.extend_from_slice(&[(argb >> 16) as u8, (argb >> 8) as u8, argb as u8]);
            alpha.push((argb >> 24) as u8);
        }
    }

    let mut samples = Samples {
        width: image.width,
        height: image.height,
        rgb,
        alpha: None,
        mask: None,
    };
    if exclude_alpha {
        return Ok(samples);
    }
    match image.kind {
        ImageKind::RawArgb if alpha.iter().any(|a| *a != 0xff) => samples.alpha = Some(alpha),
        ImageKind::RawMrgb if alpha.contains(&0) => {
            let row_bytes = width.div_ceil(8);
            let mut bits = vec![0u8; row_bytes * height];
            for (i, a) in alpha.iter().enumerate() {
                if *a == 0 {
                    let (row, col) = (i / width, i % width);
                    bits[row * row_bytes + col / 8] |= 0x80 >> (col % 8);
                }
            }
            samples.mask = Some(bits);
        }
        _ => {}
    }
    Ok(samples)
}

impl DocumentWriter {
    /// Image XObject for `image`, embedded once per document.
    pub(crate) fn image_xobject(&mut self, image: &Image<'_>, exclude_alpha: bool) -> Result<ObjectId> {
        let key: ImageKey = (
            image.kind,
            image.width,
            image.height,
            exclude_alpha,
            image.data.len(),
            fxhash::hash64(image.data),
        );
        if let Some(id) = self.images.get(&key) {
            return Ok(*id);
        }
        let id = match image.kind {
            ImageKind::Jpeg if self.config.jpeg_passthrough => self.jpeg_xobject(image.data)?,
            _ => {
                let samples = decode_samples(image, exclude_alpha)?;
                self.samples_xobject(&samples)?
            }
        };
        self.images.insert(key, id);
        Ok(id)
    }

    fn samples_xobject(&mut self, samples: &Samples) -> Result<ObjectId> {
        let mut dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => samples.width as i64,
            "Height" => samples.height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        };
        if let Some(alpha) = &samples.alpha {
            let smask = compressed_stream(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => samples.width as i64,
                    "Height" => samples.height as i64,
                    "ColorSpace" => "DeviceGray",
                    "BitsPerComponent" => 8,
                },
                alpha,
            )?;
            dict.set("SMask", self.doc.add_object(smask));
        }
        if let Some(mask) = &samples.mask {
            let stencil = compressed_stream(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => samples.width as i64,
                    "Height" => samples.height as i64,
                    "ImageMask" => true,
                    "BitsPerComponent" => 1,
                },
                mask,
            )?;
            dict.set("Mask", self.doc.add_object(stencil));
        }
        let stream = compressed_stream(dict, &samples.rgb)?;
        Ok(self.doc.add_object(stream))
    }

    /// JPEG data goes into the file untouched; only the header is read.
    fn jpeg_xobject(&mut self, data: &[u8]) -> Result<ObjectId> {
        let decoder = JpegDecoder::new(Cursor::new(data))
            .map_err(|e| PrinterError::InvalidImage(e.to_string()))?;
        let (width, height) = decoder.dimensions();
        let color_space = match decoder.color_type() {
            image::ColorType::L8 | image::ColorType::L16 => "DeviceGray",
            _ => "DeviceRGB",
        };
        let dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => color_space,
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        };
        Ok(self.doc.add_object(Stream::new(dict, data.to_vec())))
    }

    pub(crate) fn draw_image(
        &mut self,
        image: &Image<'_>,
        transform: &Transform,
        clip: &Rectangle,
    ) -> Result<()> {
        let id = self.image_xobject(image, false)?;
        let xobject = self.resources.register(ResourceKind::XObject, id);
        let placement = image_placement(image.width as f64, image.height as f64);

        let mut ops = vec![op("q")];
        clip_to(&mut ops, clip);
        concat(&mut ops, transform);
        ops.push(Operation::new("cm", matrix_operands(&placement)));
        ops.push(Operation::new("Do", vec![name(&xobject)]));
        ops.push(op("Q"));
        self.emit(ops)
    }
}
