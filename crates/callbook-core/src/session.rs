//! Booking session model: per-connection conversation state.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque session identifier issued when a connection is accepted.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Reference to a persisted booking record.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The fixed set of booking fields collected during a conversation.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BookingField {
    Name,
    Date,
    Time,
    Location,
    Preferences,
}

impl BookingField {
    pub const ALL: [BookingField; 5] = [
        BookingField::Name,
        BookingField::Date,
        BookingField::Time,
        BookingField::Location,
        BookingField::Preferences,
    ];

    /// Field name as used in extraction output and persisted records.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Name => "Name",
            Self::Date => "Date",
            Self::Time => "Time",
            Self::Location => "Location",
            Self::Preferences => "Preferences",
        }
    }

    /// Lower-case label used when asking for missing fields.
    pub fn label(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Date => "date",
            Self::Time => "time",
            Self::Location => "location",
            Self::Preferences => "preferences",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == name)
    }
}

/// Field values returned by one extraction call. Absent and empty mean "not mentioned".
pub type ExtractedFields = BTreeMap<BookingField, String>;

/// Booking data accumulated across turns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingData {
    fields: BTreeMap<BookingField, String>,
}

impl BookingData {
    pub fn get(&self, field: BookingField) -> &str {
        self.fields.get(&field).map(String::as_str).unwrap_or("")
    }

    /// Merge extracted values. A field is overwritten only by a value that is
    /// non-empty after trimming; returns the fields whose value changed.
    pub fn apply(&mut self, extracted: &ExtractedFields) -> Vec<BookingField> {
        let mut changed = Vec::new();
        for field in BookingField::ALL {
            let Some(value) = extracted.get(&field) else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            if self.get(field) != value {
                self.fields.insert(field, value.to_string());
                changed.push(field);
            }
        }
        changed
    }

    /// Fields still empty, in canonical order.
    pub fn missing(&self) -> Vec<BookingField> {
        BookingField::ALL
            .into_iter()
            .filter(|f| self.get(*f).is_empty())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }

    /// Filled fields only.
    pub fn filled(&self) -> impl Iterator<Item = (BookingField, &str)> {
        BookingField::ALL
            .into_iter()
            .map(|f| (f, self.get(f)))
            .filter(|(_, v)| !v.is_empty())
    }
}

/// Server-side state for one conversation.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub booking: BookingData,
    record_id: Option<RecordId>,
    pub turns: u64,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            booking: BookingData::default(),
            record_id: None,
            turns: 0,
        }
    }

    pub fn record_id(&self) -> Option<&RecordId> {
        self.record_id.as_ref()
    }

    /// Set the record id if none is set yet. Returns false when one already exists.
    pub fn assign_record_id(&mut self, id: RecordId) -> bool {
        if self.record_id.is_some() {
            return false;
        }
        self.record_id = Some(id);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extracted(pairs: &[(BookingField, &str)]) -> ExtractedFields {
        pairs.iter().map(|(f, v)| (*f, v.to_string())).collect()
    }

    #[test]
    fn test_apply_fills_only_non_empty() {
        let mut booking = BookingData::default();
        let changed = booking.apply(&extracted(&[
            (BookingField::Name, "Sam"),
            (BookingField::Date, ""),
            (BookingField::Time, "   "),
        ]));
        assert_eq!(changed, vec![BookingField::Name]);
        assert_eq!(booking.get(BookingField::Name), "Sam");
        assert_eq!(booking.get(BookingField::Date), "");
    }

    #[test]
    fn test_empty_never_replaces_filled() {
        let mut booking = BookingData::default();
        booking.apply(&extracted(&[(BookingField::Name, "Sam")]));
        let changed = booking.apply(&extracted(&[(BookingField::Name, "")]));
        assert!(changed.is_empty());
        assert_eq!(booking.get(BookingField::Name), "Sam");
    }

    #[test]
    fn test_last_non_empty_wins_and_trims() {
        let mut booking = BookingData::default();
        booking.apply(&extracted(&[(BookingField::Location, "North clinic")]));
        booking.apply(&extracted(&[(BookingField::Location, "  South clinic ")]));
        assert_eq!(booking.get(BookingField::Location), "South clinic");
    }

    #[test]
    fn test_unchanged_value_not_reported() {
        let mut booking = BookingData::default();
        booking.apply(&extracted(&[(BookingField::Name, "Sam")]));
        assert!(booking.apply(&extracted(&[(BookingField::Name, "Sam ")])).is_empty());
    }

    #[test]
    fn test_monotonic_over_sequence() {
        let sequence = [
            extracted(&[(BookingField::Name, "Sam"), (BookingField::Date, "")]),
            extracted(&[(BookingField::Name, ""), (BookingField::Date, "2025-03-01")]),
            extracted(&[]),
            extracted(&[(BookingField::Time, "3:00 PM"), (BookingField::Date, " ")]),
        ];
        let mut booking = BookingData::default();
        let mut seen_filled = Vec::new();
        for step in &sequence {
            booking.apply(step);
            for field in &seen_filled {
                assert!(!booking.get(*field).is_empty());
            }
            seen_filled = booking.filled().map(|(f, _)| f).collect();
        }
        assert_eq!(
            booking.missing(),
            vec![BookingField::Location, BookingField::Preferences]
        );
    }

    #[test]
    fn test_complete_booking() {
        let mut booking = BookingData::default();
        booking.apply(&extracted(&[
            (BookingField::Name, "Sam"),
            (BookingField::Date, "2025-03-01"),
            (BookingField::Time, "3:00 PM"),
            (BookingField::Location, "North clinic"),
            (BookingField::Preferences, "window seat"),
        ]));
        assert!(booking.is_complete());
    }

    #[test]
    fn test_record_id_assigned_once() {
        let mut session = Session::new(SessionId::new());
        assert!(session.record_id().is_none());
        assert!(session.assign_record_id(RecordId("rec1".into())));
        assert!(!session.assign_record_id(RecordId("rec2".into())));
        assert_eq!(session.record_id(), Some(&RecordId("rec1".into())));
    }

    #[test]
    fn test_field_names() {
        assert_eq!(BookingField::from_name("Preferences"), Some(BookingField::Preferences));
        assert_eq!(BookingField::from_name("preferences"), None);
        assert_eq!(BookingField::Date.label(), "date");
    }

    #[test]
    fn test_session_ids_unique() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b);
        assert_eq!(SessionId::parse(&a.to_string()), Some(a));
    }
}
