//! Rank candidate hosts for a workload instance

use anyhow::Result;
use balance_lib::models::{HostScore, WorkloadInstance};
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, PrioritizeRequest};
use crate::output::{color_score, print_rows, OutputFormat};

/// Row for the ranking table
#[derive(Tabled)]
struct RankRow {
    #[tabled(rename = "Rank")]
    rank: usize,
    #[tabled(rename = "Host")]
    host: String,
    #[tabled(rename = "Score")]
    score: String,
}

/// Parse a `key=value` label argument
pub fn parse_label(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("invalid label '{}', expected key=value", raw)),
    }
}

/// Order by descending score, then host name
pub fn rank(mut scores: Vec<HostScore>) -> Vec<HostScore> {
    scores.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.host.cmp(&b.host)));
    scores
}

pub async fn prioritize(
    client: &ApiClient,
    instance: WorkloadInstance,
    hosts: Vec<String>,
    timeout_ms: Option<u64>,
    format: OutputFormat,
) -> Result<()> {
    let request = PrioritizeRequest {
        instance,
        hosts,
        timeout_ms,
    };
    let ranked = rank(client.prioritize(&request).await?);

    if format == OutputFormat::Table {
        println!(
            "{} {}",
            "Host ranking for".bold(),
            request.instance.reference().to_string().cyan()
        );
    }

    let best = ranked.first().map(|s| s.score).unwrap_or(0);
    let rows: Vec<RankRow> = ranked
        .iter()
        .enumerate()
        .map(|(i, s)| RankRow {
            rank: i + 1,
            host: s.host.clone(),
            score: color_score(s.score, best),
        })
        .collect();

    print_rows(rows, &ranked, format);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_label() {
        assert_eq!(
            parse_label("app=web"),
            Ok(("app".to_string(), "web".to_string()))
        );
        assert_eq!(
            parse_label("tier="),
            Ok(("tier".to_string(), String::new()))
        );
        assert!(parse_label("app").is_err());
        assert!(parse_label("=web").is_err());
    }

    #[test]
    fn test_rank_orders_by_score_then_name() {
        let ranked = rank(vec![
            HostScore::new("node-c", 40),
            HostScore::new("node-b", 100),
            HostScore::new("node-a", 40),
        ]);

        let hosts: Vec<_> = ranked.iter().map(|s| s.host.as_str()).collect();
        assert_eq!(hosts, vec!["node-b", "node-a", "node-c"]);
    }
}
