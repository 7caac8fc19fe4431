//! Field rules and per-user limits shared by every entry point.

use crate::domain::WeekdayMask;
use crate::ports::{PortError, PortResult};

/// How many locations a user can have at one time.
pub const MAX_LOCATIONS: usize = 5;
/// How many routes a user can have at one time.
pub const MAX_ROUTES: usize = 5;

pub const MAX_NAME_LENGTH: usize = 32;
pub const MAX_ADDRESS_LENGTH: usize = 255;
pub const MAX_PHONE_LENGTH: usize = 10;

fn invalid(message: impl Into<String>) -> PortError {
    PortError::Invalid(message.into())
}

pub fn location_limit_reached() -> PortError {
    invalid("Location limit has been reached.")
}

pub fn route_limit_reached() -> PortError {
    invalid("Route limit has been reached.")
}

pub fn validate_location_name(name: &str) -> PortResult<()> {
    if name.trim().is_empty() {
        return Err(invalid("Location name cannot be blank."));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(invalid(format!(
            "Location name cannot be longer than {MAX_NAME_LENGTH} characters."
        )));
    }
    Ok(())
}

pub fn validate_address(address: &str) -> PortResult<()> {
    if address.trim().is_empty() {
        return Err(invalid("Location address cannot be blank."));
    }
    if address.chars().count() > MAX_ADDRESS_LENGTH {
        return Err(invalid(format!(
            "Location address cannot be longer than {MAX_ADDRESS_LENGTH} characters."
        )));
    }
    Ok(())
}

pub fn validate_route_name(name: &str) -> PortResult<()> {
    if name.trim().is_empty() {
        return Err(invalid("Route name must be a non-empty string."));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(invalid(format!(
            "Route name cannot be longer than {MAX_NAME_LENGTH} characters."
        )));
    }
    Ok(())
}

/// Turns a list of day indices (0 = Monday .. 6 = Sunday) into a mask.
pub fn parse_route_days(days: &[i64]) -> PortResult<WeekdayMask> {
    if days.is_empty() {
        return Err(invalid("Days are required."));
    }
    WeekdayMask::from_day_indices(days).map_err(|_| {
        invalid("Encountered day in list that was outside of allowable range [0-6]")
    })
}

/// Phone numbers are stored as up to ten bare digits.
/// Expects the name already trimmed.
pub fn validate_user_name(name: &str) -> PortResult<()> {
    if name.is_empty() || name.chars().count() > MAX_NAME_LENGTH {
        return Err(invalid(format!(
            "Name must be 1 to {MAX_NAME_LENGTH} characters."
        )));
    }
    Ok(())
}

pub fn validate_phone(phone: &str) -> PortResult<()> {
    if phone.is_empty()
        || phone.len() > MAX_PHONE_LENGTH
        || !phone.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid(format!(
            "Phone number must be 1 to {MAX_PHONE_LENGTH} digits."
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_fields() {
        assert!(validate_location_name("Ray's House").is_ok());
        assert_eq!(
            validate_location_name("  "),
            Err(PortError::Invalid("Location name cannot be blank.".into()))
        );
        assert!(validate_location_name(&"x".repeat(33)).is_err());
        assert!(validate_location_name(&"x".repeat(32)).is_ok());

        assert!(validate_address("1720 2nd Ave S, Birmingham, AL 35294").is_ok());
        assert!(validate_address("").is_err());
        assert!(validate_address(&"a".repeat(256)).is_err());
    }

    #[test]
    fn route_days() {
        assert_eq!(
            parse_route_days(&[]),
            Err(PortError::Invalid("Days are required.".into()))
        );
        assert!(parse_route_days(&[0, 7]).is_err());
        assert_eq!(parse_route_days(&[0, 6]).unwrap().day_indices(), vec![0, 6]);
    }

    #[test]
    fn user_names() {
        assert!(validate_user_name("Ray").is_ok());
        assert_eq!(
            validate_user_name(""),
            Err(PortError::Invalid("Name must be 1 to 32 characters.".into()))
        );
        assert!(validate_user_name(&"x".repeat(33)).is_err());
    }

    #[test]
    fn phone_numbers() {
        assert!(validate_phone("2055551234").is_ok());
        assert!(validate_phone("205-555-1234").is_err());
        assert!(validate_phone("20555512345").is_err());
        assert!(validate_phone("").is_err());
    }
}
