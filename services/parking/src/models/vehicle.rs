//! Vehicle model and related functionality

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ParkingError;

/// Vehicle classification deciding which slots a vehicle may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VehicleCategory {
    #[serde(rename = "2-wheeler")]
    TwoWheeler,
    #[serde(rename = "4-wheeler")]
    FourWheeler,
    #[serde(rename = "heavy-load")]
    HeavyLoad,
}

impl VehicleCategory {
    pub const ALL: [VehicleCategory; 3] = [
        VehicleCategory::TwoWheeler,
        VehicleCategory::FourWheeler,
        VehicleCategory::HeavyLoad,
    ];

    /// Storage and wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleCategory::TwoWheeler => "2-wheeler",
            VehicleCategory::FourWheeler => "4-wheeler",
            VehicleCategory::HeavyLoad => "heavy-load",
        }
    }
}

impl fmt::Display for VehicleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleCategory {
    type Err = ParkingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "2-wheeler" => Ok(VehicleCategory::TwoWheeler),
            "4-wheeler" => Ok(VehicleCategory::FourWheeler),
            "heavy-load" => Ok(VehicleCategory::HeavyLoad),
            other => Err(ParkingError::Validation(format!(
                "Unknown vehicle category: {}",
                other
            ))),
        }
    }
}

/// Registered vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: Uuid,
    pub owner_id: Uuid,
    /// Upper-cased licence plate, unique across the facility
    pub license_plate: String,
    pub category: VehicleCategory,
    pub created_at: DateTime<Utc>,
}

/// How a caller identifies a vehicle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VehicleRef {
    Id(Uuid),
    /// Plate lookup; when `owner_id` is set the vehicle must belong to that user
    Plate {
        license_plate: String,
        owner_id: Option<Uuid>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_round_trips_through_str() {
        for category in VehicleCategory::ALL {
            assert_eq!(category.as_str().parse::<VehicleCategory>().unwrap(), category);
        }
    }

    #[test]
    fn test_category_parse_is_case_insensitive() {
        assert_eq!(
            " Heavy-Load ".parse::<VehicleCategory>().unwrap(),
            VehicleCategory::HeavyLoad
        );
        assert!(matches!(
            "tricycle".parse::<VehicleCategory>(),
            Err(ParkingError::Validation(_))
        ));
    }

    #[test]
    fn test_category_serializes_with_wire_names() {
        let json = serde_json::to_string(&VehicleCategory::FourWheeler).unwrap();
        assert_eq!(json, "\"4-wheeler\"");
    }
}
