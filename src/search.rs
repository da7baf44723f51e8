use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::constants::{DEFAULT_SEARCH_WINDOW_DAYS, RCRA_DATE_FORMAT};
use crate::error::{Result, SyncError};

/// Which manifest date the search window applies to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DateType {
    CertifiedDate,
    ReceivedDate,
    ShippedDate,
    UpdatedDate,
}

impl FromStr for DateType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "CertifiedDate" => Ok(DateType::CertifiedDate),
            "ReceivedDate" => Ok(DateType::ReceivedDate),
            "ShippedDate" => Ok(DateType::ShippedDate),
            "UpdatedDate" => Ok(DateType::UpdatedDate),
            other => Err(SyncError::Validation(format!(
                "unknown date type '{}', expected CertifiedDate|ReceivedDate|ShippedDate|UpdatedDate",
                other
            ))),
        }
    }
}

/// Role of the searched site on the manifest
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SearchSiteType {
    Generator,
    Tsdf,
    Transporter,
    #[serde(rename = "RejectionInfo_AlternateTsdf")]
    RejectionInfoAlternateTsdf,
}

impl FromStr for SearchSiteType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Generator" => Ok(SearchSiteType::Generator),
            "Tsdf" => Ok(SearchSiteType::Tsdf),
            "Transporter" => Ok(SearchSiteType::Transporter),
            "RejectionInfo_AlternateTsdf" => Ok(SearchSiteType::RejectionInfoAlternateTsdf),
            other => Err(SyncError::Validation(format!(
                "unknown site type '{}', expected Generator|Tsdf|Transporter|RejectionInfo_AlternateTsdf",
                other
            ))),
        }
    }
}

/// Caller-facing search filters; everything is optional
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub site_id: Option<String>,
    pub status: Option<String>,
    pub date_type: Option<DateType>,
    pub state_code: Option<String>,
    pub site_type: Option<SearchSiteType>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// The search payload RCRAInfo expects. Unset filters are left out of the
/// serialized JSON entirely.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_type: Option<DateType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_type: Option<SearchSiteType>,
    pub end_date: String,
    pub start_date: String,
}

#[derive(Debug, Clone)]
pub struct SearchQueryBuilder {
    window: Duration,
}

impl Default for SearchQueryBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_SEARCH_WINDOW_DAYS)
    }
}

impl SearchQueryBuilder {
    /// `window_days` is how far back an unset start date reaches
    pub fn new(window_days: i64) -> Self {
        Self {
            window: Duration::days(window_days),
        }
    }

    pub fn build(&self, filters: &SearchFilters) -> Result<SearchQuery> {
        self.build_at(filters, Utc::now())
    }

    /// Same as [`build`](Self::build) with an explicit "now"
    pub fn build_at(&self, filters: &SearchFilters, now: DateTime<Utc>) -> Result<SearchQuery> {
        // Only a window the caller spelled out in full can be inverted
        if let (Some(start), Some(end)) = (filters.start_date, filters.end_date) {
            if start > end {
                return Err(SyncError::Validation(format!(
                    "search start date {} is after end date {}",
                    start.format(RCRA_DATE_FORMAT),
                    end.format(RCRA_DATE_FORMAT)
                )));
            }
        }
        let end = filters.end_date.unwrap_or(now);
        let start = filters.start_date.unwrap_or(now - self.window);

        Ok(SearchQuery {
            state_code: filters
                .state_code
                .as_deref()
                .map(normalize_state_code)
                .transpose()?,
            site_id: filters.site_id.clone(),
            status: filters.status.clone(),
            date_type: filters.date_type,
            site_type: filters.site_type,
            end_date: end.format(RCRA_DATE_FORMAT).to_string(),
            start_date: start.format(RCRA_DATE_FORMAT).to_string(),
        })
    }
}

fn normalize_state_code(code: &str) -> Result<String> {
    let code = code.trim();
    if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code.to_ascii_uppercase())
    } else {
        Err(SyncError::Validation(format!(
            "state code '{}' must be two letters",
            code
        )))
    }
}
