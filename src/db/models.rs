//! Raw rows as stored in SQLite, before dates and JSON columns are decoded.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::broker::{DataBroker, ExtractedProfile};
use crate::jobs::{HistoryEvent, OptOutJobData, ScanJobData};

pub fn format_date(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_date(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

fn parse_optional_date(raw: Option<&str>) -> anyhow::Result<Option<DateTime<Utc>>> {
    raw.map(parse_date).transpose()
}

#[derive(Debug, Clone)]
pub struct BrokerRow {
    pub id: String,
    pub descriptor_json: String,
}

impl BrokerRow {
    pub fn decode(&self) -> anyhow::Result<DataBroker> {
        let mut broker: DataBroker = serde_json::from_str(&self.descriptor_json)?;
        broker.id.clone_from(&self.id);
        Ok(broker)
    }
}

#[derive(Debug, Clone)]
pub struct ScanJobRow {
    pub broker_id: String,
    pub profile_query_id: i64,
    pub preferred_run_date: Option<String>,
    pub last_run_date: Option<String>,
}

impl ScanJobRow {
    pub fn decode(self, history_events: Vec<HistoryEvent>) -> anyhow::Result<ScanJobData> {
        Ok(ScanJobData {
            preferred_run_date: parse_optional_date(self.preferred_run_date.as_deref())?,
            last_run_date: parse_optional_date(self.last_run_date.as_deref())?,
            broker_id: self.broker_id,
            profile_query_id: self.profile_query_id,
            history_events,
        })
    }
}

#[derive(Debug, Clone)]
pub struct OptOutJobRow {
    pub extracted_profile_id: i64,
    pub broker_id: String,
    pub profile_query_id: i64,
    pub preferred_run_date: Option<String>,
    pub last_run_date: Option<String>,
    pub attempt_count: u32,
    pub removed_by_user: bool,
    pub profile_json: String,
    pub removed_date: Option<String>,
}

impl OptOutJobRow {
    pub fn decode(self, history_events: Vec<HistoryEvent>) -> anyhow::Result<OptOutJobData> {
        let mut extracted_profile: ExtractedProfile = serde_json::from_str(&self.profile_json)?;
        extracted_profile.id = Some(self.extracted_profile_id);
        extracted_profile.removed_date = parse_optional_date(self.removed_date.as_deref())?;
        Ok(OptOutJobData {
            preferred_run_date: parse_optional_date(self.preferred_run_date.as_deref())?,
            last_run_date: parse_optional_date(self.last_run_date.as_deref())?,
            broker_id: self.broker_id,
            profile_query_id: self.profile_query_id,
            history_events,
            attempt_count: self.attempt_count,
            extracted_profile,
            is_removed_by_user: self.removed_by_user,
        })
    }
}

#[derive(Debug, Clone)]
pub struct HistoryEventRow {
    pub broker_id: String,
    pub profile_query_id: i64,
    pub extracted_profile_id: Option<i64>,
    pub event_json: String,
    pub date: String,
}

impl HistoryEventRow {
    pub fn decode(self) -> anyhow::Result<HistoryEvent> {
        Ok(HistoryEvent {
            event_type: serde_json::from_str(&self.event_json)?,
            date: parse_date(&self.date)?,
            broker_id: self.broker_id,
            profile_query_id: self.profile_query_id,
            extracted_profile_id: self.extracted_profile_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dates_sort_as_text() {
        let earlier = parse_date("2024-01-01T00:00:00Z").unwrap();
        let later = earlier + chrono::Duration::milliseconds(1500);
        assert!(format_date(earlier) < format_date(later));
        assert_eq!(parse_date(&format_date(later)).unwrap(), later);
    }

    #[test]
    fn test_broker_row_keeps_column_id() {
        let row = BrokerRow {
            id: "acme".into(),
            descriptor_json: r#"{"id":"other","name":"Acme","url":"https://acme.test","version":"2","steps":[]}"#.into(),
        };
        let broker = row.decode().unwrap();
        assert_eq!(broker.id, "acme");
        assert_eq!(broker.scheduling_config.retry_error, 48);
    }
}
