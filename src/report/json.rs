use super::StatusReport;

pub fn render(report: &StatusReport) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}
