use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::data::time::ClockTime;

pub static AVAILABILITY_COLLECTION_NAME: &str = "teacher.availability";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("day of week must be 0-6, got {0}")]
pub struct BadDayOfWeek(u8);

/// Day of the week as the source system counts them: 0 (Sunday) through 6.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(try_from = "u8", into = "u8")]
#[schema(value_type = u8)]
pub struct DayOfWeek(#[schema(minimum = 0, maximum = 6)] u8);

impl DayOfWeek {
    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for DayOfWeek {
    type Error = BadDayOfWeek;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value > 6 {
            return Err(BadDayOfWeek(value));
        }
        Ok(DayOfWeek(value))
    }
}

impl From<DayOfWeek> for u8 {
    fn from(value: DayOfWeek) -> Self {
        value.0
    }
}

/// A recurring weekly open window for a teacher. Read-only reference data:
/// the scheduling core reports these alongside booked slots but does not
/// prevent booking outside of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilitySlot {
    #[serde(
        default = "Uuid::new_v4",
        rename = "_id",
        with = "bson::serde_helpers::uuid_1_as_binary"
    )]
    pub id: Uuid,
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    pub teacher_id: Uuid,
    pub day_of_week: DayOfWeek,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AvailabilitySlotResponse {
    pub id: Uuid,
    pub teacher_id: Uuid,
    pub day_of_week: DayOfWeek,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
}

impl From<AvailabilitySlot> for AvailabilitySlotResponse {
    fn from(slot: AvailabilitySlot) -> Self {
        AvailabilitySlotResponse {
            id: slot.id,
            teacher_id: slot.teacher_id,
            day_of_week: slot.day_of_week,
            start_time: slot.start_time,
            end_time: slot.end_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_of_week_accepts_the_source_range() {
        for d in 0..=6u8 {
            assert!(DayOfWeek::try_from(d).is_ok());
        }
        assert!(DayOfWeek::try_from(7).is_err());
        assert!(DayOfWeek::try_from(255).is_err());
    }

    #[test]
    fn day_of_week_serializes_as_bare_number() {
        let d = DayOfWeek::try_from(3).unwrap();
        assert_eq!(serde_json::to_string(&d).unwrap(), "3");
        assert!(serde_json::from_str::<DayOfWeek>("9").is_err());
    }
}
