use serde::{Deserialize, Serialize};

use crate::grid::MeshKind;

/// Metres per degree of longitude/latitude at the equator, the constant
/// behind every geographic unit conversion below.
const M_PER_DEGREE: f64 = 1000.0 * 1.852 * 60.0;

/// Pointwise transform between a field's native (source) units and the
/// mesh's coordinate units (target), applied at every sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitConverter {
    /// No conversion: the field's units already match the mesh.
    Identity,
    /// m -> degree, used for meridional (V-like) quantities.
    Geographic,
    /// m -> degree with a 1/cos(lat) correction, used for zonal (U-like)
    /// quantities, which narrow towards the poles on a spherical mesh.
    GeographicPolar,
    /// Square of `Geographic`, for diffusivities (m^2 -> degree^2).
    GeographicSquare,
    /// Square of `GeographicPolar`.
    GeographicPolarSquare,
}

impl UnitConverter {
    /// Auto-assign a converter from a field's name, as the source library
    /// does for `U`, `V`, `Kh_zonal`, `Kh_meridional`. Flat meshes and any
    /// other field name always get `Identity`.
    pub fn for_field(name: &str, mesh: MeshKind) -> Self {
        if mesh == MeshKind::Flat {
            return UnitConverter::Identity;
        }
        match name {
            "U" => UnitConverter::GeographicPolar,
            "V" => UnitConverter::Geographic,
            "Kh_zonal" => UnitConverter::GeographicPolarSquare,
            "Kh_meridional" => UnitConverter::GeographicSquare,
            _ => UnitConverter::Identity,
        }
    }

    pub fn to_target(&self, value: f64, _x: f64, y: f64, _z: f64) -> f64 {
        match self {
            UnitConverter::Identity => value,
            UnitConverter::Geographic => value / M_PER_DEGREE,
            UnitConverter::GeographicPolar => value / M_PER_DEGREE / (y * std::f64::consts::PI / 180.0).cos(),
            UnitConverter::GeographicSquare => value / M_PER_DEGREE.powi(2),
            UnitConverter::GeographicPolarSquare => {
                value / (M_PER_DEGREE * (y * std::f64::consts::PI / 180.0).cos()).powi(2)
            }
        }
    }

    pub fn to_source(&self, value: f64, _x: f64, y: f64, _z: f64) -> f64 {
        match self {
            UnitConverter::Identity => value,
            UnitConverter::Geographic => value * M_PER_DEGREE,
            UnitConverter::GeographicPolar => value * M_PER_DEGREE * (y * std::f64::consts::PI / 180.0).cos(),
            UnitConverter::GeographicSquare => value * M_PER_DEGREE.powi(2),
            UnitConverter::GeographicPolarSquare => {
                value * (M_PER_DEGREE * (y * std::f64::consts::PI / 180.0).cos()).powi(2)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips_for_every_variant() {
        let variants = [
            UnitConverter::Identity,
            UnitConverter::Geographic,
            UnitConverter::GeographicPolar,
            UnitConverter::GeographicSquare,
            UnitConverter::GeographicPolarSquare,
        ];
        for u in variants {
            let v = 12.34;
            let (x, y, z) = (10.0, 42.0, 0.0);
            let round_tripped = u.to_source(u.to_target(v, x, y, z), x, y, z);
            assert!((round_tripped - v).abs() < 1e-9, "{:?} failed round trip", u);
        }
    }

    #[test]
    fn auto_assignment_matches_field_names() {
        assert_eq!(UnitConverter::for_field("U", MeshKind::Spherical), UnitConverter::GeographicPolar);
        assert_eq!(UnitConverter::for_field("V", MeshKind::Spherical), UnitConverter::Geographic);
        assert_eq!(UnitConverter::for_field("temp", MeshKind::Spherical), UnitConverter::Identity);
        assert_eq!(UnitConverter::for_field("U", MeshKind::Flat), UnitConverter::Identity);
    }
}
