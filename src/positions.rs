use std::collections::HashSet;

use alloy::primitives::Address;
use reqwest::Client;
use serde::Deserialize;

use crate::constants::POSITIONS_PAGE_LIMIT;

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemablePosition {
    #[serde(default)]
    pub condition_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub size: Option<f64>,
}

pub async fn fetch_redeemable_positions(
    client: &Client,
    data_api_url: &str,
    user: Address,
) -> eyre::Result<Vec<RedeemablePosition>> {
    let url = format!("{}/positions", data_api_url.trim_end_matches('/'));
    let limit = POSITIONS_PAGE_LIMIT.to_string();

    let positions = client
        .get(url)
        .query(&[
            ("user", user.to_string().as_str()),
            ("redeemable", "true"),
            ("limit", limit.as_str()),
        ])
        .send()
        .await
        .inspect_err(|e| tracing::error!("Positions request failed: {}", e))?
        .error_for_status()
        .inspect_err(|e| tracing::error!("Non-successful status code: {}", e))?
        .json::<Vec<RedeemablePosition>>()
        .await?;

    Ok(positions)
}

/// Unique, non-blank condition ids in first-seen order.
pub fn unique_condition_ids(positions: &[RedeemablePosition]) -> Vec<String> {
    let mut seen = HashSet::new();

    positions
        .iter()
        .map(|p| p.condition_id.trim())
        .filter(|cid| !cid.is_empty() && seen.insert(cid.to_lowercase()))
        .map(str::to_string)
        .collect()
}
