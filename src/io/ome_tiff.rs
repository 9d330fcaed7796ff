//! OME-TIFF reading and writing of PSF stacks

use crate::io::error::{IoContext, LoadError, WriteError, encode_error};
use crate::io::ome::OmeMetadata;
use crate::io::output::write_atomic;
use crate::optics::stack::PsfStack;
use ndarray::Array3;
use num_traits::ToPrimitive;
use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::Path;
use tiff::TiffError;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{TiffEncoder, colortype};
use tiff::tags::Tag;

/// Source of PSF stacks
pub trait StackDecoder {
    /// Read a complete stack; never returns a partial one
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] when the file is missing, unreadable, of an
    /// unsupported format, truncated or lacks required metadata
    fn decode(&self, path: &Path) -> Result<PsfStack, LoadError>;
}

/// Decoder for single-file OME-TIFF stacks
#[derive(Clone, Copy, Debug, Default)]
pub struct OmeTiffDecoder;

/// Load a PSF stack from an OME-TIFF file
///
/// # Errors
///
/// See [`StackDecoder::decode`]
pub fn load_stack(path: &Path) -> Result<PsfStack, LoadError> {
    OmeTiffDecoder.decode(path)
}

impl StackDecoder for OmeTiffDecoder {
    fn decode(&self, path: &Path) -> Result<PsfStack, LoadError> {
        let file = File::open(path).load_context(path)?;
        let mut decoder = Decoder::new(BufReader::new(file)).map_err(|e| match e {
            TiffError::IoError(source) => LoadError::Io {
                path: path.to_path_buf(),
                source,
            },
            other => LoadError::UnsupportedFormat {
                path: path.to_path_buf(),
                reason: format!("not a TIFF file: {other}"),
            },
        })?;

        let description = decoder
            .get_tag_ascii_string(Tag::ImageDescription)
            .map_err(|e| {
                log::debug!("no image description in '{}': {e}", path.display());
                LoadError::MissingMetadata {
                    path: path.to_path_buf(),
                    field: "ImageDescription",
                }
            })?;
        if !description.contains("<OME") {
            return Err(LoadError::UnsupportedFormat {
                path: path.to_path_buf(),
                reason: "only OME-TIFF files are supported".to_string(),
            });
        }
        let metadata = OmeMetadata::parse(&description, path)?;

        let plane_len = metadata
            .size_x
            .checked_mul(metadata.size_y)
            .filter(|len| len.checked_mul(metadata.size_z).is_some())
            .ok_or_else(|| LoadError::InvalidMetadata {
                path: path.to_path_buf(),
                reason: format!(
                    "declared size {}x{}x{} overflows",
                    metadata.size_x, metadata.size_y, metadata.size_z
                ),
            })?;

        // Grown plane by plane so a lying header cannot force a huge allocation
        let mut samples = Vec::new();
        for plane in 0..metadata.size_z {
            if plane > 0 {
                if !decoder.more_images() {
                    return Err(LoadError::Truncated {
                        path: path.to_path_buf(),
                        expected: metadata.size_z,
                        found: plane,
                    });
                }
                decoder.next_image().map_err(|source| decode_error(path, source))?;
            }

            let (width, height) = decoder
                .dimensions()
                .map_err(|source| decode_error(path, source))?;
            if (width as usize, height as usize) != (metadata.size_x, metadata.size_y) {
                return Err(LoadError::InvalidMetadata {
                    path: path.to_path_buf(),
                    reason: format!(
                        "plane {plane} is {width}x{height}, metadata declares {}x{}",
                        metadata.size_x, metadata.size_y
                    ),
                });
            }

            let decoded = decoder
                .read_image()
                .map_err(|source| decode_error(path, source))?;
            let values = widen(decoded).ok_or_else(|| LoadError::UnsupportedFormat {
                path: path.to_path_buf(),
                reason: "unsupported sample type".to_string(),
            })?;
            if values.len() != plane_len {
                return Err(LoadError::InvalidMetadata {
                    path: path.to_path_buf(),
                    reason: format!(
                        "plane {plane} holds {} samples, expected {plane_len} (single-sample pixels)",
                        values.len()
                    ),
                });
            }
            samples.reserve_exact(plane_len);
            samples.extend(values);
        }

        let data = Array3::from_shape_vec(
            (metadata.size_z, metadata.size_y, metadata.size_x),
            samples,
        )
        .map_err(|e| LoadError::InvalidMetadata {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let stack = PsfStack::new(data, metadata.acquisition())?.with_source(path);
        log::info!(
            "loaded {} ({} planes of {}x{} px, {} nm lateral, {} nm axial, NA {})",
            path.display(),
            stack.size_z(),
            stack.size_xy(),
            stack.size_xy(),
            metadata.physical_size_xy_nm,
            metadata.physical_size_z_nm,
            metadata.numerical_aperture
        );
        Ok(stack)
    }
}

fn decode_error(path: &Path, source: TiffError) -> LoadError {
    LoadError::Decode {
        path: path.to_path_buf(),
        source,
    }
}

fn to_f64<T: ToPrimitive>(values: &[T]) -> Vec<f64> {
    values.iter().map(|v| v.to_f64().unwrap_or(f64::NAN)).collect()
}

/// Samples of any integer or float type as `f64`
fn widen(decoded: DecodingResult) -> Option<Vec<f64>> {
    match decoded {
        DecodingResult::U8(v) => Some(to_f64(&v)),
        DecodingResult::U16(v) => Some(to_f64(&v)),
        DecodingResult::U32(v) => Some(to_f64(&v)),
        DecodingResult::U64(v) => Some(to_f64(&v)),
        DecodingResult::I8(v) => Some(to_f64(&v)),
        DecodingResult::I16(v) => Some(to_f64(&v)),
        DecodingResult::I32(v) => Some(to_f64(&v)),
        DecodingResult::I64(v) => Some(to_f64(&v)),
        DecodingResult::F32(v) => Some(to_f64(&v)),
        DecodingResult::F64(v) => Some(v),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

/// Write a stack as a 16-bit OME-TIFF, one page per plane
///
/// Samples are rounded and clamped to the `u16` range.
///
/// # Errors
///
/// Returns [`WriteError`] when encoding fails or the file cannot be written
pub fn write_ome_tiff(path: &Path, stack: &PsfStack) -> Result<(), WriteError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let metadata = OmeMetadata::from_acquisition(stack.metadata(), stack.size_xy(), stack.size_z());
    let xml = metadata.to_xml(&name);
    let size = stack.size_xy() as u32;

    let mut buffer = Cursor::new(Vec::new());
    {
        let mut encoder =
            TiffEncoder::new(&mut buffer).map_err(|e| encode_error(path, "TIFF", &e))?;
        for (index, plane) in stack.data().outer_iter().enumerate() {
            let pixels: Vec<u16> = plane
                .iter()
                .map(|v| v.round().clamp(0.0, f64::from(u16::MAX)) as u16)
                .collect();
            let mut image = encoder
                .new_image::<colortype::Gray16>(size, size)
                .map_err(|e| encode_error(path, "TIFF", &e))?;
            if index == 0 {
                image
                    .encoder()
                    .write_tag(Tag::ImageDescription, xml.as_str())
                    .map_err(|e| encode_error(path, "TIFF", &e))?;
            }
            image
                .write_data(&pixels)
                .map_err(|e| encode_error(path, "TIFF", &e))?;
        }
    }

    write_atomic(path, buffer.get_ref())?;
    log::info!("wrote {} planes to {}", stack.size_z(), path.display());
    Ok(())
}
