//! Tests for OME-XML parsing and writing

#[cfg(test)]
mod tests {
    use psf_retrieval::LoadError;
    use psf_retrieval::io::ome::{
        OmeMetadata, immersion_index, length_to_nm, round_numerical_aperture,
    };
    use psf_retrieval::optics::stack::AcquisitionMetadata;
    use std::path::Path;

    const MICROSCOPE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<OME xmlns="http://www.openmicroscopy.org/Schemas/OME/2016-06">
  <Instrument ID="Instrument:0">
    <Objective ID="Objective:0:0" LensNA="1.4000000000000001" Immersion="Oil"/>
  </Instrument>
  <Image ID="Image:0">
    <ObjectiveSettings ID="Objective:0:0"/>
    <Pixels DimensionOrder="XYZCT" SizeX="64" SizeY="64" SizeZ="31" SizeC="1" SizeT="1"
            PhysicalSizeX="0.065" PhysicalSizeY="0.065" PhysicalSizeZ="0.2" Type="uint16">
      <Channel ID="Channel:0:0" EmissionWavelength="520" EmissionWavelengthUnit="nm"/>
    </Pixels>
  </Image>
</OME>"#;

    fn parse(xml: &str) -> Result<OmeMetadata, LoadError> {
        OmeMetadata::parse(xml, Path::new("bead.ome.tif"))
    }

    // Tests geometry, units, rounded NA and immersion-derived index
    // Verified by reading sizes in micrometres as nanometres
    #[test]
    fn test_parse_microscope_header() {
        let metadata = parse(MICROSCOPE_XML).unwrap();

        assert_eq!((metadata.size_x, metadata.size_y, metadata.size_z), (64, 64, 31));
        assert!((metadata.physical_size_xy_nm - 65.0).abs() < 1e-9);
        assert!((metadata.physical_size_z_nm - 200.0).abs() < 1e-9);
        assert_eq!(metadata.numerical_aperture, 1.4);
        assert_eq!(metadata.refractive_index, Some(1.518));
        assert_eq!(metadata.emission_wavelength_nm, Some(520.0));
    }

    // Tests written headers parse back to the same acquisition
    // Verified by writing the axial step into PhysicalSizeY
    #[test]
    fn test_written_header_parses() {
        let acquisition = AcquisitionMetadata {
            pixel_size_xy_nm: 100.0,
            pixel_size_z_nm: 250.0,
            numerical_aperture: 1.2,
            refractive_index: Some(1.333),
            wavelength_nm: Some(520.0),
        };
        let metadata = OmeMetadata::from_acquisition(&acquisition, 32, 21);

        let parsed = parse(&metadata.to_xml("bead <1> & co")).unwrap();

        assert_eq!(parsed, metadata);
        assert_eq!(parsed.acquisition(), acquisition);
    }

    // Tests headers without index or wavelength omit those attributes and stay well formed
    // Verified by writing empty RefractiveIndex and EmissionWavelength attributes
    #[test]
    fn test_written_header_without_optics() {
        let acquisition = AcquisitionMetadata {
            pixel_size_xy_nm: 80.0,
            pixel_size_z_nm: 200.0,
            numerical_aperture: 1.0,
            refractive_index: None,
            wavelength_nm: None,
        };
        let metadata = OmeMetadata::from_acquisition(&acquisition, 16, 9);

        let xml = metadata.to_xml("plain");
        let parsed = parse(&xml).unwrap();

        assert!(!xml.contains("RefractiveIndex"));
        assert!(!xml.contains("EmissionWavelength"));
        assert!(xml.contains(r#"<TiffData IFD="0" PlaneCount="9"/>"#));
        assert_eq!(parsed, metadata);
    }

    // Tests unsupported acquisitions are rejected with the right kind
    // Verified by accepting multi-channel stacks
    #[test]
    fn test_parse_rejections() {
        assert!(matches!(parse("not xml"), Err(LoadError::UnsupportedFormat { .. })));
        assert!(matches!(
            parse(&MICROSCOPE_XML.replace("SizeC=\"1\"", "SizeC=\"2\"")),
            Err(LoadError::InvalidMetadata { .. })
        ));
        assert!(matches!(
            parse(&MICROSCOPE_XML.replace("SizeY=\"64\"", "SizeY=\"32\"")),
            Err(LoadError::InvalidMetadata { .. })
        ));
        assert!(matches!(
            parse(&MICROSCOPE_XML.replace(" LensNA=\"1.4000000000000001\"", "")),
            Err(LoadError::MissingMetadata { field: "LensNA", .. })
        ));
        assert!(matches!(
            parse(&MICROSCOPE_XML.replace("PhysicalSizeY=\"0.065\"", "PhysicalSizeY=\"0.1\"")),
            Err(LoadError::InvalidMetadata { .. })
        ));
    }

    // Tests unit conversion and NA rounding helpers
    // Verified by rounding every NA to two decimals
    #[test]
    fn test_helpers() {
        assert_eq!(length_to_nm(0.1, None), Some(100.0));
        assert_eq!(length_to_nm(0.1, Some("µm")), Some(100.0));
        assert_eq!(length_to_nm(80.0, Some("nm")), Some(80.0));
        assert_eq!(length_to_nm(1.0, Some("mm")), None);
        assert_eq!(round_numerical_aperture(1.4567), 1.457);
        assert_eq!(round_numerical_aperture(0.956), 0.96);
        assert_eq!(immersion_index("Water"), Some(1.333));
        assert_eq!(immersion_index("Silicone"), None);
    }
}
