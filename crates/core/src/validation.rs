//! Slot validation for dining reservations.
//!
//! Rules run in a fixed order (location, cuisine, date, time, party size,
//! phone) and stop at the first violation, so a result names at most one
//! slot. Absent slots are never judged. Every outcome is a value; malformed
//! input never produces an error.

use chrono::{NaiveDate, NaiveDateTime, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::domain::reservation::{ReservationSlots, Slot};

pub const OPENING_HOUR: i64 = 10;
pub const CLOSING_HOUR: i64 = 22;
pub const MIN_LEAD_HOURS: i64 = 2;
pub const PHONE_DIGITS: usize = 10;

pub const DEFAULT_SUPPORTED_CUISINES: [&str; 7] =
    ["mexican", "italian", "french", "british", "chinese", "brazilian", "japanese"];

/// Wall-clock source in the restaurant's local timezone.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZonedClock {
    timezone: Tz,
}

impl ZonedClock {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }
}

impl Default for ZonedClock {
    fn default() -> Self {
        Self::new(chrono_tz::America::New_York)
    }
}

impl Clock for ZonedClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.timezone).naive_local()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationRules {
    pub supported_location: String,
    pub supported_cuisines: Vec<String>,
    pub suggested_cuisine: String,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            supported_location: "manhattan".to_owned(),
            supported_cuisines: DEFAULT_SUPPORTED_CUISINES.iter().map(|c| (*c).to_owned()).collect(),
            suggested_cuisine: "Italian".to_owned(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub violated_slot: Option<Slot>,
    pub message: Option<String>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self { is_valid: true, violated_slot: None, message: None }
    }

    pub fn invalid(slot: Slot, message: impl Into<String>) -> Self {
        Self { is_valid: false, violated_slot: Some(slot), message: Some(message.into()) }
    }
}

#[derive(Clone, Debug)]
pub struct ReservationValidator<C = ZonedClock> {
    rules: ValidationRules,
    clock: C,
}

impl Default for ReservationValidator<ZonedClock> {
    fn default() -> Self {
        Self::new(ValidationRules::default(), ZonedClock::default())
    }
}

impl<C> ReservationValidator<C>
where
    C: Clock,
{
    pub fn new(rules: ValidationRules, clock: C) -> Self {
        Self { rules, clock }
    }

    pub fn rules(&self) -> &ValidationRules {
        &self.rules
    }

    pub fn validate(&self, slots: &ReservationSlots) -> ValidationResult {
        let now = self.clock.now();

        self.check_location(slots.location.as_deref())
            .or_else(|| self.check_cuisine(slots.cuisine.as_deref()))
            .or_else(|| check_date(slots.date.as_deref(), now))
            .or_else(|| check_time(slots.time.as_deref(), slots.date.as_deref(), now))
            .or_else(|| check_party_size(slots.num_of_people.as_deref()))
            .or_else(|| check_phone(slots.phone_number.as_deref()))
            .unwrap_or_else(ValidationResult::valid)
    }

    fn check_location(&self, location: Option<&str>) -> Option<ValidationResult> {
        let location = location?;
        if location.eq_ignore_ascii_case(&self.rules.supported_location) {
            return None;
        }
        Some(ValidationResult::invalid(
            Slot::Location,
            format!(
                "We do not have business in {location}, would you like a different location?  \
                 Our most popular dining area is {}",
                title_case(&self.rules.supported_location)
            ),
        ))
    }

    fn check_cuisine(&self, cuisine: Option<&str>) -> Option<ValidationResult> {
        let cuisine = cuisine?;
        let supported =
            self.rules.supported_cuisines.iter().any(|known| known.eq_ignore_ascii_case(cuisine));
        if supported {
            return None;
        }
        Some(ValidationResult::invalid(
            Slot::Cuisine,
            format!(
                "We do not have {cuisine}, would you like a different type of cuisine?  \
                 Our most popular cuisine is {}",
                self.rules.suggested_cuisine
            ),
        ))
    }
}

fn check_date(date: Option<&str>, now: NaiveDateTime) -> Option<ValidationResult> {
    let raw = date?;
    let Some(date) = parse_date(raw) else {
        return Some(ValidationResult::invalid(
            Slot::Date,
            "I did not understand that, what date would you like to make the reservation?",
        ));
    };

    (date < now.date()).then(|| {
        ValidationResult::invalid(
            Slot::Date,
            "You can reserve table from today onwards. What date would you like to make the reservation?",
        )
    })
}

fn check_time(time: Option<&str>, date: Option<&str>, now: NaiveDateTime) -> Option<ValidationResult> {
    let raw = time?;
    let invalid_time = || ValidationResult::invalid(Slot::Time, "Please enter a valid time.");

    if raw.chars().count() != 5 {
        return Some(invalid_time());
    }
    let Some((hour, minute)) = raw.split_once(':') else {
        return Some(invalid_time());
    };
    let (Ok(hour), Ok(_minute)) = (hour.parse::<i64>(), minute.parse::<i64>()) else {
        return Some(invalid_time());
    };

    if !(OPENING_HOUR..=CLOSING_HOUR).contains(&hour) {
        return Some(ValidationResult::invalid(
            Slot::Time,
            "Our business hours are from 10 a m. to 10 p m. Can you specify a time during this range?",
        ));
    }

    let same_day = date.and_then(parse_date).is_some_and(|date| date == now.date());
    if same_day && hour - i64::from(now.hour()) < MIN_LEAD_HOURS {
        return Some(ValidationResult::invalid(Slot::Time, "Please reserve at least 2 hours from now"));
    }

    None
}

fn check_party_size(party_size: Option<&str>) -> Option<ValidationResult> {
    let raw = party_size?;
    match raw.trim().parse::<i64>() {
        Ok(people) if people > 0 => None,
        _ => Some(ValidationResult::invalid(
            Slot::NumOfPeople,
            "Please enter a valid number for people.",
        )),
    }
}

fn check_phone(phone: Option<&str>) -> Option<ValidationResult> {
    let raw = phone?;
    let well_formed = raw.len() == PHONE_DIGITS && raw.chars().all(|ch| ch.is_ascii_digit());
    (!well_formed).then(|| {
        ValidationResult::invalid(Slot::PhoneNumber, "Please enter a valid 10-digit phone number.")
    })
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

fn title_case(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
