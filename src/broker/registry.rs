use std::path::Path;

use super::DataBroker;
use crate::error::AppError;

/// Upper bound for any rescheduling interval, about a century.
const MAX_INTERVAL_HOURS: i64 = 876_000;

/// Fetch broker descriptors from the remote registry.
pub async fn fetch_registry(url: &str) -> anyhow::Result<Vec<DataBroker>> {
    let client = reqwest::Client::new();
    let resp = client
        .get(url)
        .header("User-Agent", "dbp-scheduler")
        .send()
        .await?;

    if !resp.status().is_success() {
        return Err(AppError::Registry(format!("HTTP {} from {url}", resp.status())).into());
    }

    let body = resp.text().await?;
    Ok(parse_registry(&body)?)
}

/// Read broker descriptors from a local JSON file.
pub fn load_registry_file(path: &Path) -> anyhow::Result<Vec<DataBroker>> {
    let body = std::fs::read_to_string(path)?;
    Ok(parse_registry(&body)?)
}

fn parse_registry(body: &str) -> Result<Vec<DataBroker>, AppError> {
    let brokers: Vec<DataBroker> = serde_json::from_str(body)?;
    for broker in &brokers {
        if broker.id.is_empty() {
            return Err(AppError::Registry(format!(
                "broker '{}' has an empty id",
                broker.name
            )));
        }
        let schedule = &broker.scheduling_config;
        for (name, hours) in [
            ("retryError", schedule.retry_error),
            ("confirmOptOutScan", schedule.confirm_opt_out_scan),
            ("maintenanceScan", schedule.maintenance_scan),
        ] {
            if !(0..=MAX_INTERVAL_HOURS).contains(&hours) {
                return Err(AppError::Registry(format!(
                    "broker '{}' has {name} of {hours}h",
                    broker.id
                )));
            }
        }
        if broker.scan_step().is_none() {
            tracing::warn!("Broker {} has no scan step", broker.id);
        }
    }
    Ok(brokers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_registry() {
        let body = r#"[
            {"id": "a", "name": "A", "url": "https://a.example.com", "version": "1.0"},
            {"id": "b", "name": "B", "url": "https://b.example.com", "version": "2.0", "steps": []}
        ]"#;
        let brokers = parse_registry(body).unwrap();
        assert_eq!(brokers.len(), 2);
        assert_eq!(brokers[1].version, "2.0");
    }

    #[test]
    fn test_empty_id_rejected() {
        let body = r#"[{"id": "", "name": "Nameless", "url": "https://x", "version": "1"}]"#;
        assert!(matches!(parse_registry(body), Err(AppError::Registry(_))));
    }

    #[test]
    fn test_out_of_range_interval_rejected() {
        for config in [
            r#"{"maintenanceScan": 10000000000}"#,
            r#"{"retryError": -1}"#,
        ] {
            let body = format!(
                r#"[{{"id": "a", "name": "A", "url": "https://a", "version": "1", "schedulingConfig": {config}}}]"#
            );
            assert!(matches!(parse_registry(&body), Err(AppError::Registry(_))));
        }
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(parse_registry("{"), Err(AppError::Json(_))));
    }
}
