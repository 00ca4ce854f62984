use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

pub const DINING_SUGGESTION_INTENT: &str = "DiningSuggestionIntent";
/// Body of every queued reservation; the slots travel as message attributes.
pub const RESERVATION_MESSAGE_BODY: &str = "User reservation info";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Slot {
    Location,
    Cuisine,
    Date,
    Time,
    NumOfPeople,
    PhoneNumber,
}

impl Slot {
    pub const ALL: [Slot; 6] = [
        Slot::Location,
        Slot::Cuisine,
        Slot::Date,
        Slot::Time,
        Slot::NumOfPeople,
        Slot::PhoneNumber,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Location => "Location",
            Self::Cuisine => "Cuisine",
            Self::Date => "Date",
            Self::Time => "Time",
            Self::NumOfPeople => "NumOfPeople",
            Self::PhoneNumber => "PhoneNumber",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|slot| slot.as_str().eq_ignore_ascii_case(raw.trim()))
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvocationSource {
    DialogCodeHook,
    FulfillmentCodeHook,
}

/// Slot values collected so far. Every slot stays `None` until the NLU engine
/// fills it; empty strings are normalized to `None` on the way in.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct ReservationSlots {
    #[serde(default, deserialize_with = "slot_value")]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "slot_value")]
    pub cuisine: Option<String>,
    #[serde(default, deserialize_with = "slot_value")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "slot_value")]
    pub time: Option<String>,
    #[serde(default, deserialize_with = "slot_value")]
    pub num_of_people: Option<String>,
    #[serde(default, deserialize_with = "slot_value")]
    pub phone_number: Option<String>,
}

impl ReservationSlots {
    pub fn get(&self, slot: Slot) -> Option<&str> {
        match slot {
            Slot::Location => self.location.as_deref(),
            Slot::Cuisine => self.cuisine.as_deref(),
            Slot::Date => self.date.as_deref(),
            Slot::Time => self.time.as_deref(),
            Slot::NumOfPeople => self.num_of_people.as_deref(),
            Slot::PhoneNumber => self.phone_number.as_deref(),
        }
    }

    pub fn set(&mut self, slot: Slot, value: Option<String>) {
        let value = value.map(|value| value.trim().to_owned()).filter(|value| !value.is_empty());
        match slot {
            Slot::Location => self.location = value,
            Slot::Cuisine => self.cuisine = value,
            Slot::Date => self.date = value,
            Slot::Time => self.time = value,
            Slot::NumOfPeople => self.num_of_people = value,
            Slot::PhoneNumber => self.phone_number = value,
        }
    }

    pub fn clear(&mut self, slot: Slot) {
        self.set(slot, None);
    }

    pub fn missing(&self) -> Vec<Slot> {
        Slot::ALL.into_iter().filter(|slot| self.get(*slot).is_none()).collect()
    }

    /// Queue message attributes for a fulfilled reservation, keyed by slot name.
    pub fn to_message_attributes(&self) -> BTreeMap<String, String> {
        Slot::ALL
            .into_iter()
            .filter_map(|slot| self.get(slot).map(|value| (slot.as_str().to_owned(), value.to_owned())))
            .collect()
    }

    /// Rebuilds slots from queue message attributes. Attributes that do not
    /// name a slot are ignored.
    pub fn from_message_attributes(attributes: &BTreeMap<String, String>) -> Self {
        let mut slots = Self::default();
        for (key, value) in attributes {
            if let Some(slot) = Slot::parse(key) {
                slots.set(slot, Some(value.clone()));
            }
        }
        slots
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRequest {
    pub intent_name: String,
    pub user_id: String,
    pub invocation_source: InvocationSource,
    pub slots: ReservationSlots,
    pub session_attributes: BTreeMap<String, String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSlotValue {
    Text(String),
    Number(serde_json::Number),
}

fn slot_value<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawSlotValue>::deserialize(deserializer)?;
    Ok(raw
        .map(|value| match value {
            RawSlotValue::Text(text) => text.trim().to_owned(),
            RawSlotValue::Number(number) => number.to_string(),
        })
        .filter(|value| !value.is_empty()))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{ReservationSlots, Slot};

    #[test]
    fn missing_and_null_slots_deserialize_as_none() {
        let slots: ReservationSlots = serde_json::from_value(serde_json::json!({
            "Location": "Manhattan",
            "Cuisine": null,
            "Date": "  ",
            "NumOfPeople": 4
        }))
        .expect("slots should decode");

        assert_eq!(slots.location.as_deref(), Some("Manhattan"));
        assert_eq!(slots.cuisine, None);
        assert_eq!(slots.date, None);
        assert_eq!(slots.time, None);
        assert_eq!(slots.num_of_people.as_deref(), Some("4"));
        assert_eq!(slots.missing(), vec![Slot::Cuisine, Slot::Date, Slot::Time, Slot::PhoneNumber]);
    }

    #[test]
    fn unknown_slot_names_are_rejected() {
        let result = serde_json::from_value::<ReservationSlots>(serde_json::json!({
            "Location": "Manhattan",
            "Budget": "cheap"
        }));

        assert!(result.is_err(), "unknown slot keys should fail to decode");
    }

    #[test]
    fn slots_serialize_with_wire_names_and_nulls() {
        let slots = ReservationSlots {
            cuisine: Some("Italian".to_owned()),
            phone_number: Some("5551234567".to_owned()),
            ..ReservationSlots::default()
        };

        let value = serde_json::to_value(&slots).expect("slots should encode");
        assert_eq!(value["Cuisine"], "Italian");
        assert_eq!(value["PhoneNumber"], "5551234567");
        assert!(value["NumOfPeople"].is_null());
    }

    #[test]
    fn message_attributes_carry_only_present_slots() {
        let mut slots = ReservationSlots::default();
        slots.set(Slot::Cuisine, Some("japanese".to_owned()));
        slots.set(Slot::NumOfPeople, Some("2".to_owned()));

        let attributes = slots.to_message_attributes();
        assert_eq!(attributes.len(), 2);
        assert_eq!(attributes.get("Cuisine").map(String::as_str), Some("japanese"));

        let mut with_extra = attributes.clone();
        with_extra.insert("Source".to_owned(), "chat".to_owned());
        assert_eq!(ReservationSlots::from_message_attributes(&with_extra), slots);
    }

    #[test]
    fn clear_resets_a_single_slot() {
        let mut slots = ReservationSlots {
            location: Some("manhattan".to_owned()),
            cuisine: Some("thai".to_owned()),
            ..ReservationSlots::default()
        };
        slots.clear(Slot::Cuisine);

        assert_eq!(slots.cuisine, None);
        assert_eq!(slots.location.as_deref(), Some("manhattan"));
        assert_eq!(slots.get(Slot::Cuisine), None);
        let empty = BTreeMap::new();
        assert_eq!(ReservationSlots::from_message_attributes(&empty), ReservationSlots::default());
    }
}
