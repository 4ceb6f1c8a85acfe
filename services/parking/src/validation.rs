//! Input validation utilities

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{ParkingError, ParkingResult};

const MAX_PLATE_LEN: usize = 20;

/// Trim, upper-case and validate a licence plate
pub fn normalize_license_plate(plate: &str) -> ParkingResult<String> {
    let plate = plate.trim();

    if plate.is_empty() {
        return Err(ParkingError::Validation(
            "License plate is required".to_string(),
        ));
    }

    if !plate.is_ascii() {
        return Err(ParkingError::Validation(
            "License plate must be ASCII".to_string(),
        ));
    }

    let plate = plate.to_ascii_uppercase();

    if plate.len() > MAX_PLATE_LEN {
        return Err(ParkingError::Validation(format!(
            "License plate must be at most {} characters long",
            MAX_PLATE_LEN
        )));
    }

    static PLATE_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = PLATE_REGEX.get_or_init(|| {
        Regex::new(r"^[A-Z0-9][A-Z0-9 -]*$").expect("Failed to compile license plate regex")
    });

    if !regex.is_match(&plate) {
        return Err(ParkingError::Validation(
            "License plate can only contain letters, digits, spaces and dashes".to_string(),
        ));
    }

    Ok(plate)
}

/// Slot numbers start at 1 on every level
pub fn validate_slot_number(slot_number: i32) -> ParkingResult<()> {
    if slot_number < 1 {
        return Err(ParkingError::Validation(format!(
            "Slot number must be positive, got {}",
            slot_number
        )));
    }
    Ok(())
}
