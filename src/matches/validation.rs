use rust_decimal::Decimal;
use url::Url;

use super::error::MatchError;
use super::types::{CreateMatchRequest, DisputeRequest, LobbyFilter, PageRequest};

pub const MIN_DISPUTE_REASON: usize = 10;
pub const MAX_PAGE_LIMIT: u32 = 50;
pub const MAX_EMOJI_CHARS: usize = 16;

pub fn validate_create_request(request: &CreateMatchRequest) -> Result<(), MatchError> {
    if request.entry_fee < Decimal::ZERO {
        return Err(MatchError::validation("Entry fee must be non-negative"));
    }
    if request.entry_fee.normalize().scale() > 2 {
        return Err(MatchError::validation(
            "Entry fee supports at most two decimal places",
        ));
    }
    Ok(())
}

pub fn validate_lobby_filter(filter: &LobbyFilter) -> Result<(), MatchError> {
    let negative = |value: Option<Decimal>| value.is_some_and(|v| v < Decimal::ZERO);
    if negative(filter.entry_fee_min) || negative(filter.entry_fee_max) {
        return Err(MatchError::validation("Entry fee bounds must be non-negative"));
    }
    if let (Some(min), Some(max)) = (filter.entry_fee_min, filter.entry_fee_max) {
        if min > max {
            return Err(MatchError::validation(
                "entry_fee_min must not exceed entry_fee_max",
            ));
        }
    }
    Ok(())
}

pub fn validate_page(page: PageRequest) -> Result<PageRequest, MatchError> {
    if page.page == 0 {
        return Err(MatchError::validation("page must be at least 1"));
    }
    if page.limit == 0 || page.limit > MAX_PAGE_LIMIT {
        return Err(MatchError::validation(format!(
            "limit must be between 1 and {MAX_PAGE_LIMIT}"
        )));
    }
    Ok(page)
}

pub fn validate_dispute(request: &DisputeRequest) -> Result<(), MatchError> {
    if request.reason.trim().chars().count() < MIN_DISPUTE_REASON {
        return Err(MatchError::validation(format!(
            "Reason must be at least {MIN_DISPUTE_REASON} characters"
        )));
    }
    for raw in &request.evidence_urls {
        let parsed = Url::parse(raw)
            .map_err(|_| MatchError::validation(format!("Invalid evidence URL: {raw}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(MatchError::validation(format!(
                "Evidence URL must use http or https: {raw}"
            )));
        }
    }
    Ok(())
}

pub fn validate_emoji(emoji: &str) -> Result<(), MatchError> {
    let count = emoji.chars().count();
    if count == 0 || count > MAX_EMOJI_CHARS {
        return Err(MatchError::validation("Emoji must be 1-16 characters"));
    }
    Ok(())
}
