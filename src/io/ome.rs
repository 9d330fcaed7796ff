//! OME-XML acquisition metadata: parsing the subset the loader needs and writing it back

use crate::io::configuration::{
    AIR_REFRACTIVE_INDEX, GLYCEROL_REFRACTIVE_INDEX, OIL_REFRACTIVE_INDEX, WATER_REFRACTIVE_INDEX,
};
use crate::io::error::LoadError;
use crate::optics::stack::AcquisitionMetadata;
use roxmltree::{Document, Node};
use std::path::Path;

const OME_NAMESPACE: &str = "http://www.openmicroscopy.org/Schemas/OME/2016-06";

/// Image geometry and optics recorded in an OME-XML header
#[derive(Clone, Debug, PartialEq)]
pub struct OmeMetadata {
    /// Samples per row
    pub size_x: usize,
    /// Rows per plane
    pub size_y: usize,
    /// Axial planes
    pub size_z: usize,
    /// Channels
    pub size_c: usize,
    /// Time points
    pub size_t: usize,
    /// Lateral pixel size in nanometres
    pub physical_size_xy_nm: f64,
    /// Axial step in nanometres
    pub physical_size_z_nm: f64,
    /// Objective numerical aperture, rounded as the acquisition software reports it
    pub numerical_aperture: f64,
    /// Immersion refractive index, explicit or derived from the immersion medium
    pub refractive_index: Option<f64>,
    /// Emission wavelength of the single channel in nanometres
    pub emission_wavelength_nm: Option<f64>,
}

impl OmeMetadata {
    /// Describe an acquisition of `size_xy × size_xy × size_z` samples
    pub const fn from_acquisition(
        metadata: &AcquisitionMetadata,
        size_xy: usize,
        size_z: usize,
    ) -> Self {
        Self {
            size_x: size_xy,
            size_y: size_xy,
            size_z,
            size_c: 1,
            size_t: 1,
            physical_size_xy_nm: metadata.pixel_size_xy_nm,
            physical_size_z_nm: metadata.pixel_size_z_nm,
            numerical_aperture: metadata.numerical_aperture,
            refractive_index: metadata.refractive_index,
            emission_wavelength_nm: metadata.wavelength_nm,
        }
    }

    /// Acquisition settings for the PSF stack
    pub const fn acquisition(&self) -> AcquisitionMetadata {
        AcquisitionMetadata {
            pixel_size_xy_nm: self.physical_size_xy_nm,
            pixel_size_z_nm: self.physical_size_z_nm,
            numerical_aperture: self.numerical_aperture,
            refractive_index: self.refractive_index,
            wavelength_nm: self.emission_wavelength_nm,
        }
    }

    /// Parse and validate an OME-XML document read from `path`
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::UnsupportedFormat`] for malformed XML,
    /// [`LoadError::MissingMetadata`] when a required attribute is absent and
    /// [`LoadError::InvalidMetadata`] when the acquisition is not a single
    /// channel, single time point stack of square planes with square pixels
    pub fn parse(xml: &str, path: &Path) -> Result<Self, LoadError> {
        let document = Document::parse(xml).map_err(|e| LoadError::UnsupportedFormat {
            path: path.to_path_buf(),
            reason: format!("image description is not valid OME-XML: {e}"),
        })?;
        let reader = Reader { path };

        let pixels = find(document.root(), "Pixels").ok_or_else(|| reader.missing("Pixels"))?;
        let size_x = reader.count(pixels, "SizeX")?;
        let size_y = reader.count(pixels, "SizeY")?;
        let size_z = reader.count(pixels, "SizeZ")?;
        let size_c = reader.count(pixels, "SizeC")?;
        let size_t = reader.count(pixels, "SizeT")?;

        if size_c != 1 {
            return Err(reader.invalid(format!("expected a single channel, found {size_c}")));
        }
        if size_t != 1 {
            return Err(reader.invalid(format!("expected a single time point, found {size_t}")));
        }
        if size_x != size_y {
            return Err(reader.invalid(format!(
                "planes must be square, found {size_x}x{size_y}"
            )));
        }

        let physical_x = reader.length(pixels, "PhysicalSizeX")?;
        let physical_y = reader.length(pixels, "PhysicalSizeY")?;
        if (physical_x - physical_y).abs() > 1e-9 * physical_x.abs().max(1.0) {
            return Err(reader.invalid(format!(
                "pixels must be square, found {physical_x} nm x {physical_y} nm"
            )));
        }
        let physical_z = reader.length(pixels, "PhysicalSizeZ")?;

        let settings = find(document.root(), "ObjectiveSettings");
        let objective = settings
            .and_then(|s| s.attribute("ID"))
            .and_then(|id| {
                document
                    .descendants()
                    .find(|n| n.tag_name().name() == "Objective" && n.attribute("ID") == Some(id))
            })
            .or_else(|| find(document.root(), "Objective"))
            .ok_or_else(|| reader.missing("Objective"))?;

        let numerical_aperture = round_numerical_aperture(reader.number(objective, "LensNA")?);

        let refractive_index = match settings.and_then(|s| s.attribute("RefractiveIndex")) {
            Some(value) => Some(parse_number(value).ok_or_else(|| {
                reader.invalid(format!("RefractiveIndex '{value}' is not a number"))
            })?),
            None => objective.attribute("Immersion").and_then(immersion_index),
        };

        let emission_wavelength_nm = match find(pixels, "Channel")
            .and_then(|c| c.attribute("EmissionWavelength").map(|v| (c, v)))
        {
            Some((channel, value)) => {
                let number = parse_number(value).ok_or_else(|| {
                    reader.invalid(format!("EmissionWavelength '{value}' is not a number"))
                })?;
                let unit = channel.attribute("EmissionWavelengthUnit").or(Some("nm"));
                Some(length_to_nm(number, unit).ok_or_else(|| {
                    reader.invalid(format!(
                        "unsupported EmissionWavelengthUnit '{}'",
                        unit.unwrap_or_default()
                    ))
                })?)
            }
            None => None,
        };

        Ok(Self {
            size_x,
            size_y,
            size_z,
            size_c,
            size_t,
            physical_size_xy_nm: physical_x,
            physical_size_z_nm: physical_z,
            numerical_aperture,
            refractive_index,
            emission_wavelength_nm,
        })
    }

    /// Minimal OME-XML document describing a 16-bit single-file stack
    pub fn to_xml(&self, name: &str) -> String {
        let refractive_index = self
            .refractive_index
            .map(|index| format!(r#" RefractiveIndex="{index}""#))
            .unwrap_or_default();
        let emission = self
            .emission_wavelength_nm
            .map(|wavelength| {
                format!(r#" EmissionWavelength="{wavelength}" EmissionWavelengthUnit="nm""#)
            })
            .unwrap_or_default();
        let name = escape(name);
        let Self {
            size_x,
            size_y,
            size_z,
            size_c,
            size_t,
            physical_size_xy_nm: physical_xy,
            physical_size_z_nm: physical_z,
            numerical_aperture,
            ..
        } = self;

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<OME xmlns="{OME_NAMESPACE}">
  <Instrument ID="Instrument:0">
    <Objective ID="Objective:0" LensNA="{numerical_aperture}"/>
  </Instrument>
  <Image ID="Image:0" Name="{name}">
    <ObjectiveSettings ID="Objective:0"{refractive_index}/>
    <Pixels ID="Pixels:0" DimensionOrder="XYZCT" Type="uint16" SizeX="{size_x}" SizeY="{size_y}" SizeZ="{size_z}" SizeC="{size_c}" SizeT="{size_t}" PhysicalSizeX="{physical_xy}" PhysicalSizeXUnit="nm" PhysicalSizeY="{physical_xy}" PhysicalSizeYUnit="nm" PhysicalSizeZ="{physical_z}" PhysicalSizeZUnit="nm">
      <Channel ID="Channel:0:0" SamplesPerPixel="1"{emission}/>
      <TiffData IFD="0" PlaneCount="{size_z}"/>
    </Pixels>
  </Image>
</OME>"#
        )
    }
}

/// Attribute access bound to the file being parsed, for error context
struct Reader<'p> {
    path: &'p Path,
}

impl Reader<'_> {
    fn missing(&self, field: &'static str) -> LoadError {
        LoadError::MissingMetadata {
            path: self.path.to_path_buf(),
            field,
        }
    }

    fn invalid(&self, reason: String) -> LoadError {
        LoadError::InvalidMetadata {
            path: self.path.to_path_buf(),
            reason,
        }
    }

    fn count(&self, node: Node<'_, '_>, name: &'static str) -> Result<usize, LoadError> {
        let value = node.attribute(name).ok_or_else(|| self.missing(name))?;
        value
            .trim()
            .parse()
            .map_err(|e| self.invalid(format!("{name} '{value}' is not a count: {e}")))
    }

    fn number(&self, node: Node<'_, '_>, name: &'static str) -> Result<f64, LoadError> {
        let value = node.attribute(name).ok_or_else(|| self.missing(name))?;
        parse_number(value).ok_or_else(|| self.invalid(format!("{name} '{value}' is not a number")))
    }

    /// Length attribute converted to nanometres using its `<name>Unit` sibling
    fn length(&self, node: Node<'_, '_>, name: &'static str) -> Result<f64, LoadError> {
        let value = self.number(node, name)?;
        if value <= 0.0 {
            return Err(self.invalid(format!("{name} must be positive, found {value}")));
        }
        let unit = match name {
            "PhysicalSizeX" => node.attribute("PhysicalSizeXUnit"),
            "PhysicalSizeY" => node.attribute("PhysicalSizeYUnit"),
            _ => node.attribute("PhysicalSizeZUnit"),
        };
        length_to_nm(value, unit).ok_or_else(|| {
            self.invalid(format!(
                "unsupported unit '{}' for {name}, expected µm or nm",
                unit.unwrap_or_default()
            ))
        })
    }
}

fn find<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.descendants().find(|n| n.tag_name().name() == name)
}

fn parse_number(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Convert a length to nanometres; an absent unit means micrometres
pub fn length_to_nm(value: f64, unit: Option<&str>) -> Option<f64> {
    match unit.map(str::trim) {
        None | Some("um" | "µm" | "μm" | "micron" | "microns") => Some(value * 1000.0),
        Some("nm") => Some(value),
        Some(_) => None,
    }
}

/// Round to 3 decimals at or above 1, otherwise to 2
pub fn round_numerical_aperture(value: f64) -> f64 {
    let scale = if value >= 1.0 { 1000.0 } else { 100.0 };
    (value * scale).round() / scale
}

/// Refractive index of a named immersion medium
pub fn immersion_index(medium: &str) -> Option<f64> {
    match medium.trim().to_ascii_lowercase().as_str() {
        "oil" => Some(OIL_REFRACTIVE_INDEX),
        "glycerol" => Some(GLYCEROL_REFRACTIVE_INDEX),
        "water" => Some(WATER_REFRACTIVE_INDEX),
        "air" => Some(AIR_REFRACTIVE_INDEX),
        _ => None,
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
